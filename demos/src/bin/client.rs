use nio_reactor_core::client::request;
use nio_reactor_core::config::DEFAULT_PORT;
use std::io::BufRead;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Sends every stdin line to a local server and prints what comes back.
fn main() -> std::io::Result<()> {
    nio_reactor_core::log::init();
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT));
    log::info!("nio client connects to {addr}, type a line and press enter");
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match request(&addr, line.as_bytes(), Duration::from_secs(5)) {
            Ok(response) => println!("{}", String::from_utf8_lossy(&response)),
            Err(e) => log::error!("request failed:{e}"),
        }
    }
    Ok(())
}
