use polling::{Event, Events, Poller};
use std::io::{Error, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

const KEY: usize = 0;

/// The size of the buffer a response burst is read into.
pub const RESPONSE_BUFFER_SIZE: usize = 1024;

/// Send `payload` to `addr` and return the first burst of the response.
///
/// The exchange runs on a non-blocking socket driven by a [`Poller`], the
/// whole of it (connecting included) must finish within `timeout`.
///
/// # Errors
/// `TimedOut` if nothing arrives in time, `UnexpectedEof` if the server closed
/// the connection without answering.
pub fn request(addr: &SocketAddr, payload: &[u8], timeout: Duration) -> std::io::Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let stream = TcpStream::connect_timeout(addr, timeout)?;
    stream.set_nonblocking(true)?;
    let poller = Poller::new()?;
    // deleted below, before the stream is dropped
    unsafe { poller.add(&stream, Event::none(KEY))? };
    let result = write_all(&poller, &stream, payload, deadline)
        .and_then(|()| read_burst(&poller, &stream, deadline));
    _ = poller.delete(&stream);
    crate::debug!("{addr} responded {result:?}");
    result
}

fn write_all(
    poller: &Poller,
    mut stream: &TcpStream,
    payload: &[u8],
    deadline: Instant,
) -> std::io::Result<()> {
    let mut events = Events::new();
    let mut written = 0;
    while written < payload.len() {
        match stream.write(&payload[written..]) {
            Ok(0) => return Err(Error::new(ErrorKind::WriteZero, "server stopped reading")),
            Ok(n) => written += n,
            Err(e) if ErrorKind::WouldBlock == e.kind() => {
                wait(poller, &mut events, stream, Event::writable(KEY), deadline)?;
            }
            Err(e) if ErrorKind::Interrupted == e.kind() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read until at least one byte arrived.
fn read_burst(
    poller: &Poller,
    mut stream: &TcpStream,
    deadline: Instant,
) -> std::io::Result<Vec<u8>> {
    let mut events = Events::new();
    let mut buffer = vec![0; RESPONSE_BUFFER_SIZE];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) => {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed before any response",
                ))
            }
            Ok(n) => {
                buffer.truncate(n);
                return Ok(buffer);
            }
            Err(e) if ErrorKind::WouldBlock == e.kind() => {
                wait(poller, &mut events, stream, Event::readable(KEY), deadline)?;
            }
            Err(e) if ErrorKind::Interrupted == e.kind() => {}
            Err(e) => return Err(e),
        }
    }
}

/// Arm the one-shot registration with `interest` and wait for it to fire.
fn wait(
    poller: &Poller,
    events: &mut Events,
    stream: &TcpStream,
    interest: Event,
    deadline: Instant,
) -> std::io::Result<()> {
    poller.modify(stream, interest)?;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::new(ErrorKind::TimedOut, "no response in time"));
        }
        events.clear();
        if poller.wait(events, Some(deadline - now))? > 0 {
            return Ok(());
        }
    }
}
