//! Stream framing for OSC over TCP.
//!
//! Wire format: `[u32 length (big-endian)][OSC packet]`

use std::io::{self, Write};

/// Reject frames larger than this; OSC control traffic is tiny.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one length-prefixed packet to a stream.
pub fn write_frame<W: Write>(writer: &mut W, packet: &[u8]) -> io::Result<()> {
    let len = u32::try_from(packet.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "packet too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(packet)?;
    writer.flush()
}

/// Incremental decoder: feed it whatever the socket returned, get back every
/// complete packet. Partial frames stay buffered until the rest arrives.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> io::Result<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            if self.buf.len() < 4 {
                break;
            }
            let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
            if len > MAX_FRAME_LEN {
                self.buf.clear();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame too large: {} bytes", len),
                ));
            }
            if self.buf.len() < 4 + len {
                break;
            }
            frames.push(self.buf[4..4 + len].to_vec());
            self.buf.drain(..4 + len);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_reassembles_split_frames() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"hello").unwrap();
        write_frame(&mut wire, b"world!").unwrap();

        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(&wire[..3]).unwrap().is_empty());
        let frames = decoder.push(&wire[3..12]).unwrap();
        assert_eq!(frames, vec![b"hello".to_vec()]);
        let frames = decoder.push(&wire[12..]).unwrap();
        assert_eq!(frames, vec![b"world!".to_vec()]);
    }

    #[test]
    fn decoder_rejects_oversized_frame() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push(&u32::MAX.to_be_bytes()).is_err());
    }
}
