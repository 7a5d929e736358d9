use log::*;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use ws_endpoint::{Endpoint, Outcome, ServerConfig};

async fn handle_connection(peer: SocketAddr, stream: TcpStream) {
    let mut endpoint = match Endpoint::accept(stream, &ServerConfig::default()).await {
        Ok(endpoint) => endpoint,
        Err(err) => {
            error!("handshake with {peer} failed: {err}");
            return;
        }
    };

    loop {
        match endpoint.next_message().await {
            Ok(Outcome::Message(message)) => {
                if let Err(err) = endpoint.send(message).await {
                    error!("failed to echo message to {peer}: {err}");
                    break;
                }
            }
            Ok(Outcome::Closed(code)) => {
                info!("{peer} closed the connection with code {code}");
                break;
            }
            Err(err) => {
                error!("error reading from {peer}: {err}");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let addr = "127.0.0.1:9002";
    let listener = TcpListener::bind(&addr).await.expect("can't listen");
    info!("listening on: {addr}");

    while let Ok((stream, _)) = listener.accept().await {
        let peer = stream
            .peer_addr()
            .expect("connected streams should have a peer address");
        info!("peer address: {peer}");

        tokio::spawn(handle_connection(peer, stream));
    }
}
