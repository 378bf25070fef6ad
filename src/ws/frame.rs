//! WebSocket frame codec, the subset used here: single-frame messages with
//! 7- or 16-bit lengths. Client frames must be masked; server frames never are.

use crate::error::FrameError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }
}

/// Largest header this codec emits: 2 base bytes plus a 16-bit length.
pub const MAX_SERVER_HEADER: usize = 4;

/// Header of a complete inbound frame sitting at the front of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    /// Raw opcode nibble; unknown values are the caller's call.
    pub opcode: u8,
    pub mask: [u8; 4],
    pub header_len: usize,
    pub payload_len: usize,
}

impl FrameHeader {
    pub fn frame_len(&self) -> usize {
        self.header_len + self.payload_len
    }
}

/// Parse the frame at the head of `buf`.
///
/// `Ok(None)` until the whole frame has arrived. `capacity` is the size of the
/// receive buffer; a frame that could never fit is an error.
pub fn parse(buf: &[u8], capacity: usize) -> Result<Option<FrameHeader>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let fin = buf[0] & 0x80 != 0;
    let opcode = buf[0] & 0x0F;
    let masked = buf[1] & 0x80 != 0;
    let len7 = (buf[1] & 0x7F) as usize;

    if len7 == 127 {
        return Err(FrameError::Unsupported64BitLength);
    }
    if !masked {
        return Err(FrameError::Unmasked);
    }
    let (payload_len, mask_at) = if len7 == 126 {
        if buf.len() < 4 {
            return Ok(None);
        }
        (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
    } else {
        (len7, 2)
    };
    let header_len = mask_at + 4;
    let needed = header_len + payload_len;
    if needed > capacity {
        return Err(FrameError::TooLarge { needed, capacity });
    }
    if buf.len() < needed {
        return Ok(None);
    }
    let mut mask = [0u8; 4];
    mask.copy_from_slice(&buf[mask_at..header_len]);
    Ok(Some(FrameHeader {
        fin,
        opcode,
        mask,
        header_len,
        payload_len,
    }))
}

/// XOR the payload with the mask key, cycled by index.
pub fn unmask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= mask[i % 4];
    }
}

/// Unmasked server header with FIN set. Returns the used prefix of `out`.
pub fn encode_header(opcode: Opcode, payload_len: usize, out: &mut [u8; MAX_SERVER_HEADER]) -> Result<&[u8], FrameError> {
    out[0] = 0x80 | opcode.bits();
    if payload_len < 126 {
        out[1] = payload_len as u8;
        Ok(&out[..2])
    } else if payload_len <= u16::MAX as usize {
        out[1] = 126;
        out[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
        Ok(&out[..4])
    } else {
        Err(FrameError::PayloadTooLong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Masked client frame as a browser would send it.
    fn client_frame(opcode: u8, payload: &[u8], mask: [u8; 4]) -> std::vec::Vec<u8> {
        let mut out = std::vec![0x80 | opcode];
        if payload.len() < 126 {
            out.push(0x80 | payload.len() as u8);
        } else {
            out.push(0x80 | 126);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(&mask);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        out
    }

    #[test]
    fn masked_text_frame_decodes() {
        let mask = [1, 2, 3, 4];
        let mut raw = client_frame(0x1, b"Hello", mask);
        assert_eq!(&raw[6..], &[b'H' ^ 1, b'e' ^ 2, b'l' ^ 3, b'l' ^ 4, b'o' ^ 1]);

        let hdr = parse(&raw, 256).unwrap().unwrap();
        assert!(hdr.fin);
        assert_eq!(Opcode::from_u8(hdr.opcode), Some(Opcode::Text));
        assert_eq!(hdr.header_len, 6);
        assert_eq!(hdr.payload_len, 5);
        assert_eq!(hdr.mask, mask);

        let payload = &mut raw[hdr.header_len..hdr.frame_len()];
        unmask(payload, hdr.mask);
        assert_eq!(payload, b"Hello");
    }

    #[test]
    fn partial_frames_wait() {
        let raw = client_frame(0x1, &[7u8; 200], [9, 9, 9, 9]);
        assert_eq!(parse(&raw[..1], 256), Ok(None));
        assert_eq!(parse(&raw[..3], 256), Ok(None));
        assert_eq!(parse(&raw[..150], 256), Ok(None));
        let hdr = parse(&raw, 256).unwrap().unwrap();
        assert_eq!((hdr.header_len, hdr.payload_len), (8, 200));
    }

    #[test]
    fn rejected_frames() {
        assert_eq!(
            parse(&[0x81, 0x85, 0, 0, 0, 0], 256).map(|_| ()),
            Ok(())
        );
        assert_eq!(parse(&[0x81, 0x05, b'H'], 256), Err(FrameError::Unmasked));
        assert_eq!(
            parse(&[0x82, 0xFF, 0, 0], 256),
            Err(FrameError::Unsupported64BitLength)
        );
        let big = client_frame(0x2, &[0u8; 300], [1, 1, 1, 1]);
        assert_eq!(
            parse(&big[..20], 256),
            Err(FrameError::TooLarge { needed: 308, capacity: 256 })
        );
    }

    #[test]
    fn server_headers() {
        let mut out = [0u8; MAX_SERVER_HEADER];
        assert_eq!(encode_header(Opcode::Text, 5, &mut out), Ok(&[0x81, 5][..]));
        assert_eq!(
            encode_header(Opcode::Binary, 1000, &mut out),
            Ok(&[0x82, 126, 0x03, 0xE8][..])
        );
        assert_eq!(encode_header(Opcode::Ping, 0, &mut out), Ok(&[0x89, 0][..]));
        assert_eq!(
            encode_header(Opcode::Text, 70_000, &mut out),
            Err(FrameError::PayloadTooLong)
        );
    }
}
