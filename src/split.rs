use crate::assembler::MessageAssembler;
use crate::close;
use crate::endpoint::{CloseCode, Outcome};
use crate::error::Error;
use crate::frame::OpCode;
use crate::message::Message;
use crate::reader::FrameReader;
use crate::role::Role;
use crate::state::EndpointState;
use crate::writer::FrameWriter;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

/// The receiving half of a split [`crate::endpoint::Endpoint`]. Holds the
/// writer behind the same mutex as [`EndpointWriter`] — grounded in the
/// teacher's `split.rs`, which gave its `WSReader` a handle to the shared
/// `Writer` for exactly this reason: a reader that can't answer a Ping would
/// stall the ping/pong keepalive as soon as the endpoint is split.
pub struct EndpointReader<S> {
    reader: FrameReader<tokio::io::ReadHalf<S>>,
    assembler: MessageAssembler,
    writer: Arc<Mutex<FrameWriter<tokio::io::WriteHalf<S>>>>,
    shared_state: Arc<Mutex<EndpointState>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> EndpointReader<S> {
    pub(crate) fn new(
        reader: FrameReader<tokio::io::ReadHalf<S>>,
        assembler: MessageAssembler,
        writer: Arc<Mutex<FrameWriter<tokio::io::WriteHalf<S>>>>,
        shared_state: Arc<Mutex<EndpointState>>,
    ) -> Self {
        Self {
            reader,
            assembler,
            writer,
            shared_state,
        }
    }

    /// Same contract as [`crate::endpoint::Endpoint::next_message`].
    pub async fn next_message(&mut self) -> Result<Outcome, Error> {
        if self.shared_state.lock().await.is_closed() {
            return Err(Error::AlreadyClosed);
        }

        loop {
            let frame = match self.reader.read_frame().await {
                Ok(frame) => frame,
                Err(Error::IOError { source }) if source.kind() == io::ErrorKind::UnexpectedEof => {
                    *self.shared_state.lock().await = EndpointState::Closed;
                    return Ok(Outcome::Closed(close::NORMAL_CLOSURE));
                }
                Err(err) => {
                    *self.shared_state.lock().await = EndpointState::Closed;
                    return Err(err);
                }
            };

            match frame.opcode {
                OpCode::Ping => {
                    let mut writer = self.writer.lock().await;
                    if let Err(err) = writer.write_control(OpCode::Pong, &frame.payload).await {
                        drop(writer);
                        *self.shared_state.lock().await = EndpointState::Closed;
                        return Err(err);
                    }
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    let payload_is_valid_utf8 = std::str::from_utf8(&frame.payload).is_ok();
                    let echo = EndpointState::echo_code(frame.close_code, payload_is_valid_utf8);
                    // A peer Close answering our own send_close must not be echoed again.
                    let already_closing = *self.shared_state.lock().await == EndpointState::Closing;
                    *self.shared_state.lock().await = EndpointState::Closing;
                    if !already_closing {
                        let _ = self
                            .writer
                            .lock()
                            .await
                            .write_control(OpCode::Close, &echo.to_be_bytes())
                            .await;
                    }
                    *self.shared_state.lock().await = EndpointState::Closed;
                    return Ok(Outcome::Closed(echo));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    match self.assembler.accept(frame) {
                        Ok(Some(message)) => return Ok(Outcome::Message(message)),
                        Ok(None) => {}
                        Err(err) => {
                            *self.shared_state.lock().await = EndpointState::Closed;
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}

/// The sending half of a split [`crate::endpoint::Endpoint`].
pub struct EndpointWriter<S> {
    writer: Arc<Mutex<FrameWriter<tokio::io::WriteHalf<S>>>>,
    shared_state: Arc<Mutex<EndpointState>>,
    role: Role,
}

impl<S: AsyncWrite + Unpin> EndpointWriter<S> {
    pub(crate) fn new(
        writer: Arc<Mutex<FrameWriter<tokio::io::WriteHalf<S>>>>,
        shared_state: Arc<Mutex<EndpointState>>,
        role: Role,
    ) -> Self {
        Self {
            writer,
            shared_state,
            role,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub async fn send(&mut self, message: Message) -> Result<(), Error> {
        if self.shared_state.lock().await.is_closed() {
            return Err(Error::AlreadyClosed);
        }
        let opcode = message.opcode();
        self.writer
            .lock()
            .await
            .write_message(opcode, message.as_binary())
            .await
    }

    pub async fn send_close(&mut self, code: CloseCode) -> Result<(), Error> {
        if !close::is_valid(code) {
            return Err(Error::InvalidCloseCode);
        }
        {
            let mut state = self.shared_state.lock().await;
            *state = match *state {
                EndpointState::Closed => return Ok(()),
                EndpointState::Open => EndpointState::Closing,
                EndpointState::Closing => EndpointState::Closed,
            };
        }
        self.writer
            .lock()
            .await
            .write_control(OpCode::Close, &code.to_be_bytes())
            .await
    }
}
