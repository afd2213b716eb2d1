use super::*;
use crate::client::request;
use crate::config::DEFAULT_RESPONSE;
use crate::reactor::constants::ReactorState;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn test_config(acceptor_size: usize, io_reactor_size: usize) -> Config {
    let mut config = Config::default();
    _ = config
        .set_acceptor_size(acceptor_size)
        .set_io_reactor_size(io_reactor_size)
        .set_worker_size(2)
        .set_select_timeout(Duration::from_millis(100));
    config
}

/// Send `ping` on a connection that stays open and wait for the response.
fn ping(addr: &SocketAddr) -> std::io::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(TIMEOUT))?;
    stream.write_all(b"ping")?;
    let mut response = vec![0; DEFAULT_RESPONSE.len()];
    stream.read_exact(&mut response)?;
    assert_eq!(DEFAULT_RESPONSE, &response[..]);
    Ok(stream)
}

#[test]
fn test_ping() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 2))?;
    let addr = server.listen("127.0.0.1:0")?;
    assert_ne!(0, addr.port());
    assert_eq!(vec![addr], server.local_addrs());
    assert_eq!(DEFAULT_RESPONSE, &request(&addr, b"ping", TIMEOUT)?[..]);
    server.stop(TIMEOUT)
}

#[test]
fn test_response_per_request() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 1))?;
    let addr = server.listen("127.0.0.1:0")?;
    let mut stream = ping(&addr)?;
    // the connection is left open, every later request is answered too
    for _ in 0..3 {
        stream.write_all(b"again")?;
        let mut response = vec![0; DEFAULT_RESPONSE.len()];
        stream.read_exact(&mut response)?;
        assert_eq!(DEFAULT_RESPONSE, &response[..]);
    }
    server.stop(TIMEOUT)
}

#[test]
fn test_concurrent_clients() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 4))?;
    let addr = server.listen("127.0.0.1:0")?;
    let clients: Vec<_> = (0..32)
        .map(|i| {
            std::thread::spawn(move || request(&addr, format!("ping-{i}").as_bytes(), TIMEOUT))
        })
        .collect();
    for client in clients {
        let response = client
            .join()
            .map_err(|_| std::io::Error::new(ErrorKind::Other, "client panicked"))??;
        assert_eq!(DEFAULT_RESPONSE, &response[..]);
    }
    server.stop(TIMEOUT)
}

#[test]
fn test_silent_client() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 1))?;
    let addr = server.listen("127.0.0.1:0")?;
    let mut silent = TcpStream::connect(addr)?;
    assert!(wait_until(TIMEOUT, || {
        server.io_reactors()[0].registered_count() == 1
    }));
    // the silent connection does not hold up the others
    assert_eq!(DEFAULT_RESPONSE, &request(&addr, b"ping", TIMEOUT)?[..]);

    silent.set_read_timeout(Some(Duration::from_millis(200)))?;
    let mut buffer = [0; 8];
    let error = silent.read(&mut buffer).unwrap_err();
    assert!(matches!(
        error.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut
    ));
    server.stop(TIMEOUT)
}

#[test]
fn test_abrupt_disconnects() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 2))?;
    let addr = server.listen("127.0.0.1:0")?;
    for i in 0..16 {
        let stream = TcpStream::connect(addr)?;
        if i % 2 == 0 {
            let mut stream = stream;
            stream.write_all(b"bye")?;
        } else {
            stream.shutdown(Shutdown::Both)?;
        }
    }
    // connections are handed off in accept order, so all of them are
    // registered once this one is answered
    assert_eq!(DEFAULT_RESPONSE, &request(&addr, b"ping", TIMEOUT)?[..]);
    assert!(wait_until(TIMEOUT, || {
        server
            .io_reactors()
            .iter()
            .all(|reactor| reactor.registered_count() == 0)
    }));
    assert!(server
        .io_reactors()
        .iter()
        .all(|reactor| ReactorState::Running == reactor.get_state()));
    server.stop(TIMEOUT)
}

#[test]
fn test_round_robin_dispatch() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 3))?;
    let addr = server.listen("127.0.0.1:0")?;
    let connections = (0..8)
        .map(|_| ping(&addr))
        .collect::<std::io::Result<Vec<_>>>()?;
    assert!(wait_until(TIMEOUT, || {
        server
            .io_reactors()
            .iter()
            .map(|reactor| reactor.registered_count())
            .sum::<usize>()
            == connections.len()
    }));
    let mut counts: Vec<_> = server
        .io_reactors()
        .iter()
        .map(|reactor| reactor.registered_count())
        .collect();
    counts.sort_unstable();
    assert_eq!(vec![2, 3, 3], counts);
    assert_eq!(1, server.acceptors()[0].registered_count());
    server.stop(TIMEOUT)
}

#[test]
fn test_listeners_spread_over_acceptors() -> std::io::Result<()> {
    let server = Server::new(test_config(2, 2))?;
    let first = server.listen("127.0.0.1:0")?;
    let second = server.listen("127.0.0.1:0")?;
    assert_eq!(vec![first, second], server.local_addrs());
    for acceptor in server.acceptors() {
        assert_eq!(ReactorState::Running, acceptor.get_state());
        assert!(wait_until(TIMEOUT, || acceptor.registered_count() == 1));
    }
    assert_eq!(DEFAULT_RESPONSE, &request(&first, b"ping", TIMEOUT)?[..]);
    assert_eq!(DEFAULT_RESPONSE, &request(&second, b"ping", TIMEOUT)?[..]);
    server.stop(TIMEOUT)
}

#[test]
fn test_lazy_start() -> std::io::Result<()> {
    let server = Server::new(test_config(2, 2))?;
    assert!(server
        .acceptors()
        .iter()
        .chain(server.io_reactors())
        .all(|reactor| ReactorState::NotStarted == reactor.get_state()));
    let addr = server.listen("127.0.0.1:0")?;
    assert_eq!(ReactorState::Running, server.acceptors()[0].get_state());
    assert_eq!(ReactorState::NotStarted, server.acceptors()[1].get_state());
    let _connection = ping(&addr)?;
    assert_eq!(ReactorState::Running, server.io_reactors()[0].get_state());
    assert_eq!(ReactorState::NotStarted, server.io_reactors()[1].get_state());
    server.stop(TIMEOUT)
}

#[test]
fn test_stop() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 2))?;
    let addr = server.listen("127.0.0.1:0")?;
    let mut connection = ping(&addr)?;
    server.stop(TIMEOUT)?;
    assert!(server
        .acceptors()
        .iter()
        .chain(server.io_reactors())
        .all(|reactor| ReactorState::Stopped == reactor.get_state()));
    assert!(server.local_addrs().is_empty());

    let mut buffer = [0; 8];
    assert!(matches!(connection.read(&mut buffer), Ok(0) | Err(_)));
    assert!(request(&addr, b"ping", Duration::from_millis(500)).is_err());
    assert_eq!(
        ErrorKind::BrokenPipe,
        server.listen("127.0.0.1:0").unwrap_err().kind()
    );
    Ok(())
}

#[test]
fn test_business_handler() -> std::io::Result<()> {
    #[derive(Debug, Default)]
    struct Counter(std::sync::atomic::AtomicUsize);

    impl BusinessHandler for Counter {
        fn handle(&self, _: Option<SocketAddr>, data: &[u8]) {
            _ = self
                .0
                .fetch_add(data.len(), std::sync::atomic::Ordering::Release);
        }
    }

    let counter = Arc::new(Counter::default());
    let server = Server::with_business(test_config(1, 1), counter.clone())?;
    let addr = server.listen("127.0.0.1:0")?;
    for _ in 0..4 {
        _ = request(&addr, b"ping", TIMEOUT)?;
    }
    server.stop(TIMEOUT)?;
    assert_eq!(16, counter.0.load(std::sync::atomic::Ordering::Acquire));
    Ok(())
}

#[test]
fn test_stopped_io_reactor_is_skipped() -> std::io::Result<()> {
    let server = Server::new(test_config(1, 2))?;
    let addr = server.listen("127.0.0.1:0")?;
    server.io_reactors()[1].stop(TIMEOUT)?;
    for _ in 0..6 {
        assert_eq!(DEFAULT_RESPONSE, &request(&addr, b"ping", TIMEOUT)?[..]);
    }
    assert_eq!(ReactorState::Running, server.io_reactors()[0].get_state());
    server.stop(TIMEOUT)
}
