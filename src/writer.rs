use crate::error::Error;
use crate::frame::OpCode;
use crate::role::Role;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Once a write fails, the stream is in an unknown state and every future
/// write must fail the same way without touching the socket again.
#[derive(Debug, Clone, Copy)]
enum WriterState {
    Ready,
    Broken(io::ErrorKind),
}

/// Writes frames to the wire, fragmenting a message across as many frames
/// as needed to keep each frame's header + payload within `write_buffer_size`.
///
/// The split point is recomputed every frame rather than chunked by a fixed
/// payload size, because the header itself grows by up to 12 bytes once the
/// payload crosses the 126-byte and 65535-byte length-encoding thresholds.
pub struct FrameWriter<W> {
    buf_writer: BufWriter<W>,
    role: Role,
    write_buffer_size: usize,
    state: WriterState,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(buf_writer: BufWriter<W>, role: Role, write_buffer_size: usize) -> Self {
        Self {
            buf_writer,
            role,
            write_buffer_size,
            state: WriterState::Ready,
        }
    }

    pub fn into_inner(self) -> BufWriter<W> {
        self.buf_writer
    }

    /// Writes `payload` as one or more frames starting with `opcode`,
    /// splitting it across `Continuation` frames as the output buffer
    /// requires. Must not be called with a control opcode; use
    /// [`Self::write_control`] for those.
    pub async fn write_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        debug_assert!(!opcode.is_control());
        self.check_broken()?;

        let mut remaining = payload;
        let mut current_opcode = opcode;
        loop {
            let overhead = header_overhead(remaining.len(), self.role.is_client());
            let available = self.write_buffer_size.saturating_sub(overhead).max(1);

            let (chunk, rest, is_final) = if remaining.len() <= available {
                (remaining, &remaining[remaining.len()..], true)
            } else {
                let (head, tail) = remaining.split_at(available);
                (head, tail, false)
            };

            self.write_frame(is_final, current_opcode, chunk).await?;

            if is_final {
                break;
            }
            remaining = rest;
            current_opcode = OpCode::Continuation;
        }
        Ok(())
    }

    /// Writes a control frame (Ping, Pong, or Close) as a single, final,
    /// unfragmented frame. `payload` must already be 125 bytes or fewer.
    pub async fn write_control(&mut self, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        debug_assert!(opcode.is_control());
        debug_assert!(payload.len() <= 125);
        self.check_broken()?;
        self.write_frame(true, opcode, payload).await
    }

    fn check_broken(&self) -> Result<(), Error> {
        match self.state {
            WriterState::Ready => Ok(()),
            WriterState::Broken(kind) => Err(Error::IOError {
                source: io::Error::from(kind),
            }),
        }
    }

    async fn write_frame(&mut self, is_final: bool, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        match self.write_frame_inner(is_final, opcode, payload).await {
            Ok(()) => Ok(()),
            Err(Error::IOError { source }) => {
                self.state = WriterState::Broken(source.kind());
                Err(Error::IOError { source })
            }
            Err(other) => Err(other),
        }
    }

    async fn write_frame_inner(&mut self, is_final: bool, opcode: OpCode, payload: &[u8]) -> Result<(), Error> {
        let first_byte = ((is_final as u8) << 7) | opcode.as_u8();
        self.buf_writer.write_all(&[first_byte]).await?;

        let masked = self.role.is_client();
        let len = payload.len();
        let len_byte_flag = if masked { 0b1000_0000 } else { 0 };

        match len {
            0..=125 => {
                self.buf_writer
                    .write_all(&[len_byte_flag | len as u8])
                    .await?;
            }
            126..=65535 => {
                let be = (len as u16).to_be_bytes();
                self.buf_writer
                    .write_all(&[len_byte_flag | 126, be[0], be[1]])
                    .await?;
            }
            _ => {
                let be = (len as u64).to_be_bytes();
                let mut header = [len_byte_flag | 127, 0, 0, 0, 0, 0, 0, 0, 0];
                header[1..].copy_from_slice(&be);
                self.buf_writer.write_all(&header).await?;
            }
        }

        if masked {
            let mut rng = StdRng::from_rng(rand::thread_rng());
            let key = [
                rng.random::<u8>(),
                rng.random::<u8>(),
                rng.random::<u8>(),
                rng.random::<u8>(),
            ];
            self.buf_writer.write_all(&key).await?;
            let mut masked_payload = payload.to_vec();
            crate::mask::apply(key, &mut masked_payload);
            self.buf_writer.write_all(&masked_payload).await?;
        } else {
            self.buf_writer.write_all(payload).await?;
        }

        self.buf_writer.flush().await?;
        Ok(())
    }
}

fn header_overhead(payload_len: usize, masked: bool) -> usize {
    let mut overhead = 2;
    if payload_len > 65535 {
        overhead += 8;
    } else if payload_len >= 126 {
        overhead += 2;
    }
    if masked {
        overhead += 4;
    }
    overhead
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::FrameReader;
    use tokio::io::BufReader;

    fn writer(role: Role, write_buffer_size: usize) -> FrameWriter<Vec<u8>> {
        FrameWriter::new(BufWriter::new(Vec::new()), role, write_buffer_size)
    }

    #[tokio::test]
    async fn small_message_is_a_single_final_frame() {
        let mut w = writer(Role::Server, 4096);
        w.write_message(OpCode::Text, b"hello").await.unwrap();
        let bytes = w.into_inner().into_inner();

        let mut r = FrameReader::new(BufReader::new(std::io::Cursor::new(bytes)), Role::Server, 1 << 20);
        let frame = r.read_frame().await.unwrap();
        assert!(frame.final_fragment);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn oversized_message_fragments_with_continuation() {
        let mut w = writer(Role::Server, 32);
        let payload = vec![0x41u8; 100];
        w.write_message(OpCode::Binary, &payload).await.unwrap();
        let bytes = w.into_inner().into_inner();

        let mut r = FrameReader::new(BufReader::new(std::io::Cursor::new(bytes)), Role::Server, 1 << 20);
        let first = r.read_frame().await.unwrap();
        assert!(!first.final_fragment);
        assert_eq!(first.opcode, OpCode::Binary);

        let mut reassembled = first.payload;
        loop {
            let frame = r.read_frame().await.unwrap();
            assert_eq!(frame.opcode, OpCode::Continuation);
            reassembled.extend(frame.payload);
            if frame.final_fragment {
                break;
            }
        }
        assert_eq!(reassembled, payload);
    }

    #[tokio::test]
    async fn client_frames_are_masked() {
        let mut w = writer(Role::Client, 4096);
        w.write_message(OpCode::Text, b"hi").await.unwrap();
        let bytes = w.into_inner().into_inner();
        assert_eq!(bytes[1] & 0b1000_0000, 0b1000_0000);
    }
}
