use crate::error::Error;
use crate::frame::{Frame, OpCode};
use crate::mask;
use crate::role::Role;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Parses one RFC 6455 frame at a time off a buffered byte stream.
///
/// The reader tracks only the bookkeeping needed to validate a *single*
/// frame against its immediate predecessor (whether that predecessor was
/// final, and which opcode a fragmented message started with); gluing
/// frames into a complete message is the [`crate::assembler::MessageAssembler`]'s job.
pub struct FrameReader<R> {
    buf_reader: BufReader<R>,
    role: Role,
    max_frame_size: usize,
    last_was_final: bool,
    fragmented_opcode: Option<OpCode>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(buf_reader: BufReader<R>, role: Role, max_frame_size: usize) -> Self {
        Self {
            buf_reader,
            role,
            max_frame_size,
            last_was_final: true,
            fragmented_opcode: None,
        }
    }

    pub fn into_inner(self) -> BufReader<R> {
        self.buf_reader
    }

    /// Parses and returns the next frame, or propagates an I/O error
    /// (including a clean EOF, which surfaces as `io::Error` with kind
    /// `UnexpectedEof` from the underlying `read_exact` calls).
    pub async fn read_frame(&mut self) -> Result<Frame, Error> {
        let mut header = [0u8; 2];
        self.buf_reader.read_exact(&mut header).await?;

        let final_fragment = (header[0] & 0b1000_0000) != 0;
        let rsv = header[0] & 0b0111_0000;
        let opcode = OpCode::from_byte(header[0] & 0b0000_1111)?;

        if rsv != 0 {
            return Err(Error::UnnegotiatedRSV);
        }

        if opcode.is_control() && !final_fragment {
            return Err(Error::FragmentedControl);
        }

        if !opcode.is_control() {
            if !self.last_was_final && opcode != OpCode::Continuation {
                return Err(Error::InvalidContinuationOpcode);
            }
            if opcode == OpCode::Continuation && self.fragmented_opcode.is_none() {
                return Err(Error::HeadlessContinuation);
            }
        }

        let masked = (header[1] & 0b1000_0000) != 0;
        match self.role {
            Role::Server if !masked => return Err(Error::Unmasked),
            Role::Client if masked => return Err(Error::UnexpectedMask),
            _ => {}
        }

        let length_indicator = header[1] & 0b0111_1111;
        if opcode.is_control() && length_indicator as usize > 125 {
            return Err(Error::LargeControlFrame);
        }

        let payload_len = match length_indicator {
            0..=125 => length_indicator as u64,
            126 => {
                let mut buf = [0u8; 2];
                self.buf_reader.read_exact(&mut buf).await?;
                u16::from_be_bytes(buf) as u64
            }
            127 => {
                let mut buf = [0u8; 8];
                self.buf_reader.read_exact(&mut buf).await?;
                u64::from_be_bytes(buf)
            }
            _ => return Err(Error::IllegalLength),
        };

        if payload_len > self.max_frame_size as u64 {
            return Err(Error::MaxFrameSize);
        }
        let payload_len = payload_len as usize;

        let key = if masked {
            let mut key = [0u8; 4];
            self.buf_reader.read_exact(&mut key).await?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; payload_len];
        self.buf_reader.read_exact(&mut payload).await?;

        if let Some(key) = key {
            mask::apply(key, &mut payload);
        }

        let mut close_code = None;
        if opcode == OpCode::Close && !payload.is_empty() {
            if payload.len() < 2 {
                return Err(Error::InvalidClosePayload);
            }
            let code_bytes: [u8; 2] = [payload[0], payload[1]];
            close_code = Some(u16::from_be_bytes(code_bytes));
            payload.drain(0..2);
        }

        if !opcode.is_control() {
            if opcode == OpCode::Continuation {
                // still reassembling; leave fragmented_opcode as-is
            } else {
                self.fragmented_opcode = Some(opcode);
            }
            if final_fragment {
                self.fragmented_opcode = None;
            }
        }
        self.last_was_final = final_fragment;

        Ok(Frame {
            final_fragment,
            opcode,
            masked,
            payload,
            close_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>, role: Role) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::new(BufReader::new(Cursor::new(bytes)), role, 16 << 20)
    }

    #[tokio::test]
    async fn parses_masked_text_frame() {
        let wire = vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let mut r = reader(wire, Role::Server);
        let frame = r.read_frame().await.unwrap();
        assert!(frame.final_fragment);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"Hello");
    }

    #[tokio::test]
    async fn server_rejects_unmasked_frame() {
        let wire = vec![0x81, 0x00];
        let mut r = reader(wire, Role::Server);
        assert!(matches!(r.read_frame().await, Err(Error::Unmasked)));
    }

    #[tokio::test]
    async fn client_rejects_masked_frame() {
        let wire = vec![0x81, 0x80, 0, 0, 0, 0];
        let mut r = reader(wire, Role::Client);
        assert!(matches!(r.read_frame().await, Err(Error::UnexpectedMask)));
    }

    #[tokio::test]
    async fn rejects_large_control_frame() {
        let mut wire = vec![0x89u8, 0xFEu8, 0x00, 0x80];
        wire.extend(std::iter::repeat(0u8).take(128));
        let mut r = reader(wire, Role::Client);
        assert!(matches!(r.read_frame().await, Err(Error::LargeControlFrame)));
    }

    #[tokio::test]
    async fn rejects_rsv_bits() {
        let wire = vec![0xC1, 0x80, 0, 0, 0, 0];
        let mut r = reader(wire, Role::Server);
        assert!(matches!(r.read_frame().await, Err(Error::UnnegotiatedRSV)));
    }

    #[tokio::test]
    async fn rejects_headless_continuation() {
        let wire = vec![0x80, 0x80, 0, 0, 0, 0];
        let mut r = reader(wire, Role::Server);
        assert!(matches!(r.read_frame().await, Err(Error::HeadlessContinuation)));
    }

    #[tokio::test]
    async fn rejects_fragmented_control_frame() {
        let wire = vec![0x09, 0x80, 0, 0, 0, 0];
        let mut r = reader(wire, Role::Server);
        assert!(matches!(r.read_frame().await, Err(Error::FragmentedControl)));
    }

    #[tokio::test]
    async fn close_frame_extracts_code_and_strips_it_from_payload() {
        // Close with payload 0x03 0xE9 (1001), masked, no reason string.
        let mut wire = vec![0x88u8, 0x82u8];
        let key = [0u8, 0u8, 0u8, 0u8];
        wire.extend_from_slice(&key);
        wire.extend_from_slice(&1001u16.to_be_bytes());
        let mut r = reader(wire, Role::Server);
        let frame = r.read_frame().await.unwrap();
        assert_eq!(frame.close_code, Some(1001));
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn close_frame_with_short_payload_is_rejected() {
        let mut wire = vec![0x88u8, 0x81u8];
        wire.extend_from_slice(&[0, 0, 0, 0]);
        wire.push(0xAB);
        let mut r = reader(wire, Role::Server);
        assert!(matches!(r.read_frame().await, Err(Error::InvalidClosePayload)));
    }
}
