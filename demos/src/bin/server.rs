use nio_reactor_core::config::Config;
use nio_reactor_core::server::Server;

fn main() -> std::io::Result<()> {
    nio_reactor_core::log::init();
    let server = Server::new(Config::default())?;
    let addr = server.bind()?;
    log::info!("nio server started on {addr}");
    loop {
        std::thread::park();
    }
}
