use crate::assembler::MessageAssembler;
use crate::close;
use crate::config::{ClientConfig, ServerConfig};
use crate::error::Error;
use crate::frame::OpCode;
use crate::handshake;
use crate::message::Message;
use crate::reader::FrameReader;
use crate::role::Role;
use crate::split::{EndpointReader, EndpointWriter};
use crate::state::EndpointState;
use crate::writer::FrameWriter;
use std::io;
use std::sync::Arc;
use tokio::io::{split, AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::sync::Mutex;

pub type CloseCode = u16;

/// What [`Endpoint::next_message`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Message(Message),
    Closed(CloseCode),
}

/// A live RFC 6455 connection: a framing codec, a message assembler, and the
/// `Open`/`Closing`/`Closed` state machine layered over an
/// `AsyncRead + AsyncWrite` stream.
pub struct Endpoint<S> {
    reader: FrameReader<tokio::io::ReadHalf<S>>,
    writer: FrameWriter<tokio::io::WriteHalf<S>>,
    assembler: MessageAssembler,
    state: EndpointState,
    role: Role,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Endpoint<S> {
    /// Server-side construction over an already-accepted stream: validates
    /// the inbound upgrade request and writes the 101 response.
    pub async fn accept(stream: S, config: &ServerConfig) -> Result<Self, Error> {
        let (read_half, write_half) = split(stream);
        let mut buf_reader = BufReader::new(read_half);
        let mut buf_writer = BufWriter::new(write_half);

        let request = handshake::parse_http_request(&mut buf_reader).await?;
        let key = handshake::validate_client_headers(&request).inspect_err(|err| {
            log::warn!("rejecting upgrade request: {err}");
        })?;
        let accept = handshake::generate_websocket_accept_value(&key);
        let response = handshake::render_accept_response(&accept);

        use tokio::io::AsyncWriteExt;
        buf_writer.write_all(response.as_bytes()).await?;
        buf_writer.flush().await?;

        Ok(Self::new(
            buf_reader,
            buf_writer,
            Role::Server,
            &config.web_socket_config,
        ))
    }

    /// Client-side construction over an already-dialed stream: writes the
    /// GET upgrade request and verifies the server's 101 response.
    pub async fn connect(stream: S, url: &str, config: &ClientConfig) -> Result<Self, Error> {
        let (read_half, write_half) = split(stream);
        let mut buf_reader = BufReader::new(read_half);
        let mut buf_writer = BufWriter::new(write_half);

        let key = handshake::generate_websocket_key();
        let (request, _host_and_port, _use_tls) = handshake::build_client_request(url, &key)?;

        use tokio::io::AsyncWriteExt;
        buf_writer.write_all(request.as_bytes()).await?;
        buf_writer.flush().await?;

        let response = handshake::read_response(&mut buf_reader).await?;
        handshake::verify_accept_response(&response, &key)?;

        Ok(Self::new(
            buf_reader,
            buf_writer,
            Role::Client,
            &config.web_socket_config,
        ))
    }

    fn new(
        buf_reader: BufReader<tokio::io::ReadHalf<S>>,
        buf_writer: BufWriter<tokio::io::WriteHalf<S>>,
        role: Role,
        config: &crate::config::WebSocketConfig,
    ) -> Self {
        Self {
            reader: FrameReader::new(buf_reader, role, config.max_frame_size),
            writer: FrameWriter::new(buf_writer, role, config.write_buffer_size),
            assembler: MessageAssembler::new(config.max_message_size),
            state: EndpointState::Open,
            role,
        }
    }

    /// Pulls frames off the stream until a complete message is assembled or
    /// the peer closes the connection. Ping frames are answered with Pong
    /// transparently; Pong frames are dropped. Any protocol error or I/O
    /// failure transitions the endpoint to `Closed`.
    pub async fn next_message(&mut self) -> Result<Outcome, Error> {
        if self.state.is_closed() {
            return Err(Error::AlreadyClosed);
        }

        loop {
            let frame = match self.reader.read_frame().await {
                Ok(frame) => frame,
                Err(Error::IOError { source }) if source.kind() == io::ErrorKind::UnexpectedEof => {
                    self.state = EndpointState::Closed;
                    return Ok(Outcome::Closed(close::NORMAL_CLOSURE));
                }
                Err(err) => {
                    self.fail(&err).await;
                    return Err(err);
                }
            };

            match frame.opcode {
                OpCode::Ping => {
                    if let Err(err) = self.writer.write_control(OpCode::Pong, &frame.payload).await {
                        self.state = EndpointState::Closed;
                        return Err(err);
                    }
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    let payload_is_valid_utf8 = std::str::from_utf8(&frame.payload).is_ok();
                    let echo = EndpointState::echo_code(frame.close_code, payload_is_valid_utf8);
                    // A peer Close answering our own send_close must not be echoed again.
                    let already_closing = self.state == EndpointState::Closing;
                    self.state = EndpointState::Closing;
                    if !already_closing {
                        let _ = self
                            .writer
                            .write_control(OpCode::Close, &echo.to_be_bytes())
                            .await;
                    }
                    self.state = EndpointState::Closed;
                    return Ok(Outcome::Closed(echo));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    match self.assembler.accept(frame) {
                        Ok(Some(message)) => return Ok(Outcome::Message(message)),
                        Ok(None) => {}
                        Err(err) => {
                            self.fail(&err).await;
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// Closes the endpoint's accumulator and, for protocol errors, sends a
    /// 1002 Close before marking the endpoint `Closed`.
    async fn fail(&mut self, err: &Error) {
        let code = match err {
            Error::InvalidUTF8 => close::INVALID_PAYLOAD_DATA,
            Error::IOError { .. } | Error::Timeout { .. } => {
                log::warn!("endpoint I/O failure, closing without a Close frame: {err}");
                self.state = EndpointState::Closed;
                return;
            }
            _ => close::PROTOCOL_ERROR,
        };
        log::warn!("protocol error, closing with code {code}: {err}");
        let _ = self.writer.write_control(OpCode::Close, &code.to_be_bytes()).await;
        self.state = EndpointState::Closed;
    }

    /// Sends a complete message, fragmenting it across frames as the
    /// writer's buffer requires.
    pub async fn send(&mut self, message: Message) -> Result<(), Error> {
        if self.state.is_closed() {
            return Err(Error::AlreadyClosed);
        }
        let opcode = message.opcode();
        self.writer.write_message(opcode, message.as_binary()).await
    }

    /// Initiates the closing handshake by sending `code`, advancing the
    /// state machine. Does not wait for the peer's echoing Close frame;
    /// call `next_message` to observe it.
    pub async fn send_close(&mut self, code: CloseCode) -> Result<(), Error> {
        if !close::is_valid(code) {
            return Err(Error::InvalidCloseCode);
        }
        match self.state {
            EndpointState::Closed => return Ok(()),
            EndpointState::Open => self.state = EndpointState::Closing,
            EndpointState::Closing => self.state = EndpointState::Closed,
        }
        self.writer
            .write_control(OpCode::Close, &code.to_be_bytes())
            .await
    }

    /// Splits the endpoint into an owning reader/writer pair for concurrent
    /// read and write tasks. The two halves share the writer (so the reader
    /// can still answer Pings and echo Close frames) and the closing state,
    /// both behind async mutexes.
    pub fn split(self) -> (EndpointReader<S>, EndpointWriter<S>) {
        let state = Arc::new(Mutex::new(self.state));
        let writer = Arc::new(Mutex::new(self.writer));
        let reader = EndpointReader::new(self.reader, self.assembler, Arc::clone(&writer), Arc::clone(&state));
        let writer = EndpointWriter::new(writer, state, self.role);
        (reader, writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::{timeout, Duration};

    fn test_endpoint(stream: DuplexStream, role: Role) -> Endpoint<DuplexStream> {
        let (read_half, write_half) = split(stream);
        Endpoint::new(
            BufReader::new(read_half),
            BufWriter::new(write_half),
            role,
            &crate::config::WebSocketConfig::default(),
        )
    }

    fn close_frame_bytes(code: u16) -> Vec<u8> {
        let mut wire = vec![0x88u8, 0x82u8, 0, 0, 0, 0];
        wire.extend_from_slice(&code.to_be_bytes());
        wire
    }

    #[tokio::test]
    async fn peer_close_while_open_is_echoed() {
        let (mut client, server) = duplex(1024);
        let mut endpoint = test_endpoint(server, Role::Server);

        client.write_all(&close_frame_bytes(1001)).await.unwrap();

        let outcome = endpoint.next_message().await.unwrap();
        assert_eq!(outcome, Outcome::Closed(1001));

        let mut echoed = [0u8; 2];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed[0], 0x88);
    }

    #[tokio::test]
    async fn peer_close_answering_our_send_close_is_not_echoed_again() {
        let (mut client, server) = duplex(1024);
        let mut endpoint = test_endpoint(server, Role::Server);

        endpoint.send_close(1000).await.unwrap();
        let mut our_close = [0u8; 4];
        client.read_exact(&mut our_close).await.unwrap();

        client.write_all(&close_frame_bytes(1000)).await.unwrap();
        let outcome = endpoint.next_message().await.unwrap();
        assert_eq!(outcome, Outcome::Closed(1000));

        let mut unexpected = [0u8; 1];
        let result = timeout(Duration::from_millis(50), client.read_exact(&mut unexpected)).await;
        assert!(result.is_err(), "peer's reply Close must not be echoed again");
    }

    #[tokio::test]
    async fn eof_is_reported_as_a_clean_close_not_an_error() {
        let (client, server) = duplex(1024);
        let mut endpoint = test_endpoint(server, Role::Server);
        drop(client);

        let outcome = endpoint.next_message().await.unwrap();
        assert_eq!(outcome, Outcome::Closed(close::NORMAL_CLOSURE));
    }

    #[tokio::test]
    async fn send_close_rejects_an_invalid_code() {
        let (_client, server) = duplex(1024);
        let mut endpoint = test_endpoint(server, Role::Server);
        assert!(matches!(
            endpoint.send_close(1).await,
            Err(Error::InvalidCloseCode)
        ));
    }
}
