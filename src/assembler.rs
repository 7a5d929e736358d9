use crate::error::Error;
use crate::frame::{Frame, OpCode};
use crate::message::Message;

struct Accumulator {
    opcode: OpCode,
    buffer: Vec<u8>,
}

/// Glues a sequence of data frames (Text/Binary/Continuation) into complete
/// [`Message`]s. Control frames never reach this type; the endpoint handles
/// Ping/Pong/Close itself since those require writing a reply.
///
/// Pure and synchronous on purpose: no I/O, so it can be unit-tested without
/// a runtime and reused identically on the client and server paths.
pub struct MessageAssembler {
    max_message_size: usize,
    accumulator: Option<Accumulator>,
}

impl MessageAssembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            accumulator: None,
        }
    }

    /// Feeds one data frame in. Returns `Some(message)` once a complete
    /// message has been assembled, or `None` if more fragments are needed.
    /// On any error the in-progress accumulator is discarded; the caller is
    /// expected to tear the connection down.
    pub fn accept(&mut self, frame: Frame) -> Result<Option<Message>, Error> {
        let result = self.accept_inner(frame);
        if result.is_err() {
            self.accumulator = None;
        }
        result
    }

    fn accept_inner(&mut self, frame: Frame) -> Result<Option<Message>, Error> {
        match frame.opcode {
            OpCode::Text | OpCode::Binary => {
                let mut buffer = frame.payload;
                if buffer.len() > self.max_message_size {
                    return Err(Error::MaxMessageSize);
                }
                if frame.final_fragment {
                    return Ok(Some(finalize(frame.opcode, std::mem::take(&mut buffer))?));
                }
                self.accumulator = Some(Accumulator {
                    opcode: frame.opcode,
                    buffer: std::mem::take(&mut buffer),
                });
                Ok(None)
            }
            OpCode::Continuation => {
                let acc = self
                    .accumulator
                    .as_mut()
                    .expect("reader rejects headless continuation frames");
                acc.buffer.extend_from_slice(&frame.payload);
                if acc.buffer.len() > self.max_message_size {
                    return Err(Error::MaxMessageSize);
                }
                if frame.final_fragment {
                    let acc = self.accumulator.take().unwrap();
                    return Ok(Some(finalize(acc.opcode, acc.buffer)?));
                }
                Ok(None)
            }
            _ => unreachable!("control frames are handled by the endpoint, not the assembler"),
        }
    }
}

fn finalize(opcode: OpCode, buffer: Vec<u8>) -> Result<Message, Error> {
    match opcode {
        OpCode::Text => {
            let text = String::from_utf8(buffer).map_err(|_| Error::InvalidUTF8)?;
            Ok(Message::Text(text))
        }
        OpCode::Binary => Ok(Message::Binary(buffer)),
        _ => unreachable!("finalize is only ever called with Text or Binary"),
    }
}
