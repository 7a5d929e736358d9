use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::time::error::Elapsed;
use url::ParseError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO error: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    // Handshake errors (§4.7)
    #[error("Host header missing in the request")]
    NoHostHeaderPresent,

    #[error("Upgrade: websocket header missing or mismatched in the request")]
    NoUpgradeHeaderPresent,

    #[error("Connection: Upgrade header missing or mismatched in the request")]
    NoConnectionHeaderPresent,

    #[error("Sec-WebSocket-Version must be 13")]
    InvalidWebsocketVersion,

    #[error("Sec-WebSocket-Key header missing or not 16 bytes once base64-decoded")]
    InvalidSecWebsocketKey,

    #[error("server didn't respond with HTTP 101 Switching Protocols")]
    NoUpgrade,

    #[error("server's Sec-WebSocket-Accept didn't match the expected accept key")]
    InvalidAcceptKey,

    #[error("incomplete or malformed HTTP request line")]
    IncompleteHTTPRequest,

    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("invalid scheme in WebSocket URL, expected ws or wss")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    // Framing errors (§4.3, §7)
    #[error("RSV bits set without a negotiated extension")]
    UnnegotiatedRSV,

    #[error("control frames must not be fragmented")]
    FragmentedControl,

    #[error("control frame payload larger than 125 bytes")]
    LargeControlFrame,

    #[error("invalid opcode")]
    InvalidOpcode,

    #[error("non-control frame opcode while a fragmented message is in progress")]
    InvalidContinuationOpcode,

    #[error("continuation frame with no message in progress")]
    HeadlessContinuation,

    #[error("expected a masked frame from the client")]
    Unmasked,

    #[error("client received a masked frame from the server")]
    UnexpectedMask,

    #[error("close frame payload shorter than 2 bytes")]
    InvalidClosePayload,

    #[error("invalid close code")]
    InvalidCloseCode,

    #[error("illegal 7-bit length indicator")]
    IllegalLength,

    #[error("frame payload exceeds the configured max_frame_size")]
    MaxFrameSize,

    #[error("accumulated message exceeds the configured max_message_size")]
    MaxMessageSize,

    #[error("Text message payload is not valid UTF-8")]
    InvalidUTF8,

    #[error("the endpoint is already closed")]
    AlreadyClosed,
}
