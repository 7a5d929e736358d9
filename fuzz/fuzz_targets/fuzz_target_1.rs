#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio::io::{duplex, AsyncWriteExt};
use tokio::runtime::Runtime;
use ws_endpoint::{Endpoint, ServerConfig};

// Feeds arbitrary bytes as an inbound handshake request through
// `Endpoint::accept` over an in-memory duplex stream, exercising the HTTP
// parser and header validation without a real socket.
fuzz_target!(|data: &[u8]| {
    let runtime = Runtime::new().unwrap();
    let data = data.to_vec();

    runtime.block_on(async move {
        let (mut client_side, server_side) = duplex(64 * 1024);
        let _ = client_side.write_all(&data).await;
        drop(client_side);

        let _ = Endpoint::accept(server_side, &ServerConfig::default()).await;
    });
});
