mod broadcast;
mod messages;
mod quiz;
mod server;
mod session;

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use clap::Parser;
use log::info;
use warp::Filter;

use quiz::default_questions;
use server::Server;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(long, default_value = "0.0.0.0")]
    host: IpAddr,
    /// Port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Directory of static participant assets
    #[clap(long, default_value = "public")]
    public_dir: String,
    /// HTML file served at /admin
    #[clap(long, default_value = "admin/index.html")]
    admin_page: String,
    /// Initial number of players expected to join
    #[clap(long, default_value = "14")]
    expected_players: i64,
}

/// Address of the first non-loopback IPv4 interface, found by asking
/// the OS which source address it would route from. Best effort; the
/// probe never sends a packet.
fn local_ipv4() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    let addr = socket.local_addr().ok()?;
    if addr.ip().is_loopback() {
        return None;
    }
    Some(addr.ip())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let server = Server::new(default_questions(), args.expected_players);

    let ws_route = warp::path("ws").and(warp::ws()).map(move |ws: warp::ws::Ws| {
        let server = server.clone();
        ws.on_upgrade(move |socket| async move {
            server.handle_connection(socket).await;
        })
    });

    let admin_route = warp::path("admin")
        .and(warp::fs::file(args.admin_page.clone()))
        .map(|reply| {
            info!("admin page requested");
            reply
        });

    let static_files = warp::fs::dir(args.public_dir.clone());

    let routes = ws_route
        .or(admin_route)
        .or(static_files)
        .with(warp::cors().allow_any_origin());

    info!("Server version: {}", env!("CARGO_PKG_VERSION"));
    info!("Server listening on http://{}:{}", args.host, args.port);
    if let Some(ip) = local_ipv4() {
        info!("Server listening on http://{}:{}", ip, args.port);
    }

    warp::serve(routes).run((args.host, args.port)).await;
}
