use log::*;
use rand::distr::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::net::TcpStream;
use tokio::select;
use tokio::time::{interval, Duration};
use ws_endpoint::{ClientConfig, Endpoint, Message, Outcome};

async fn handle_connection(addr: &str, url: &str) {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(err) => {
            error!("couldn't dial {addr}: {err}");
            return;
        }
    };

    let mut endpoint = match Endpoint::connect(stream, url, &ClientConfig::default()).await {
        Ok(endpoint) => endpoint,
        Err(err) => {
            error!("handshake with {url} failed: {err}");
            return;
        }
    };

    let mut ticker = interval(Duration::from_secs(5));
    let mut received = 0;

    loop {
        select! {
            result = endpoint.next_message() => {
                match result {
                    Ok(Outcome::Message(message)) => {
                        info!("received message: {:?}", message);
                        received += 1;
                        if received >= 3 {
                            if let Err(err) = endpoint.send_close(1000).await {
                                error!("error occurred when closing connection: {err}");
                            }
                            break;
                        }
                    }
                    Ok(Outcome::Closed(code)) => {
                        info!("server closed the connection with code {code}");
                        break;
                    }
                    Err(err) => {
                        error!("received error from the stream: {err}");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let random_string = generate_random_string();
                if endpoint.send(Message::Text(random_string)).await.is_err() {
                    error!("failed to send message");
                    break;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    handle_connection("127.0.0.1:9002", "ws://127.0.0.1:9002").await;
}

fn generate_random_string() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
