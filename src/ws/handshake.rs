//! Opening handshake.
//!
//! The upgrade request is consumed one byte at a time through a short line
//! buffer. Only the `Sec-WebSocket-Key` value is kept; every other header is
//! discarded as soon as its line ends.

use core::fmt::Write;

use heapless::{String, Vec};
use sha1::{Digest, Sha1};

pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const LINE_BUFFER: usize = 128;
const KEY_LEN: usize = 64;
/// base64 of a 20-byte SHA-1 digest.
pub const ACCEPT_LEN: usize = 28;

/// `base64(sha1(key + GUID))`.
pub fn accept_key(client_key: &str) -> String<ACCEPT_LEN> {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(GUID.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::new();
    base64_encode(&digest, &mut out);
    out
}

/// Standard alphabet with padding (RFC 4648 §4).
pub fn base64_encode<const N: usize>(data: &[u8], out: &mut String<N>) {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = if chunk.len() > 1 { chunk[1] } else { 0 };
        let b2 = if chunk.len() > 2 { chunk[2] } else { 0 };

        let i0 = (b0 >> 2) as usize;
        let i1 = (((b0 & 0x03) << 4) | (b1 >> 4)) as usize;
        let i2 = (((b1 & 0x0F) << 2) | (b2 >> 6)) as usize;
        let i3 = (b2 & 0x3F) as usize;

        out.push(ALPHABET[i0] as char).ok();
        out.push(ALPHABET[i1] as char).ok();
        out.push(if chunk.len() > 1 { ALPHABET[i2] as char } else { '=' }).ok();
        out.push(if chunk.len() > 2 { ALPHABET[i3] as char } else { '=' }).ok();
    }
}

/// The `101 Switching Protocols` response for an accepted key.
pub fn response(accept: &str) -> String<160> {
    let mut out = String::new();
    write!(
        out,
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept
    )
    .ok();
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    NeedMore,
    /// Blank line seen; the header block is over.
    Done,
}

pub struct HandshakeParser {
    line: Vec<u8, LINE_BUFFER>,
    overflow: bool,
    key: String<KEY_LEN>,
}

impl HandshakeParser {
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflow: false,
            key: String::new(),
        }
    }

    pub fn reset(&mut self) {
        self.line.clear();
        self.overflow = false;
        self.key.clear();
    }

    pub fn feed(&mut self, byte: u8) -> Progress {
        match byte {
            b'\n' => {
                let blank = self.line.is_empty() && !self.overflow;
                if !self.overflow {
                    self.take_line();
                }
                self.line.clear();
                self.overflow = false;
                if blank {
                    return Progress::Done;
                }
            }
            b'\r' => {}
            _ => {
                if self.line.push(byte).is_err() {
                    // Longer than any header we care about; drop the rest.
                    self.overflow = true;
                }
            }
        }
        Progress::NeedMore
    }

    fn take_line(&mut self) {
        const NAME: &[u8] = b"sec-websocket-key:";
        if self.line.len() < NAME.len() || !self.line[..NAME.len()].eq_ignore_ascii_case(NAME) {
            return;
        }
        let value = core::str::from_utf8(&self.line[NAME.len()..]).unwrap_or("").trim();
        self.key.clear();
        if self.key.push_str(value).is_err() {
            log::warn!("ws: handshake key too long");
            self.key.clear();
        }
    }

    pub fn key(&self) -> Option<&str> {
        if self.key.is_empty() {
            None
        } else {
            Some(self.key.as_str())
        }
    }
}

impl Default for HandshakeParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_accept_vector() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ==").as_str(),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn base64_padding() {
        let mut s: String<16> = String::new();
        base64_encode(b"Ma", &mut s);
        assert_eq!(s.as_str(), "TWE=");
        s.clear();
        base64_encode(b"M", &mut s);
        assert_eq!(s.as_str(), "TQ==");
        s.clear();
        base64_encode(b"Man", &mut s);
        assert_eq!(s.as_str(), "TWFu");
    }

    fn feed_all(p: &mut HandshakeParser, raw: &[u8]) -> Option<usize> {
        raw.iter()
            .position(|&b| p.feed(b) == Progress::Done)
    }

    #[test]
    fn key_extracted_case_insensitively() {
        let raw = b"GET /ws HTTP/1.1\r\nHost: ioc\r\nUpgrade: websocket\r\n\
                    sec-WEBSOCKET-key:  dGhlIHNhbXBsZSBub25jZQ== \r\n\
                    Sec-WebSocket-Version: 13\r\n\r\n";
        let mut p = HandshakeParser::new();
        assert_eq!(feed_all(&mut p, raw), Some(raw.len() - 1));
        assert_eq!(p.key(), Some("dGhlIHNhbXBsZSBub25jZQ=="));
    }

    #[test]
    fn long_lines_are_skipped_not_fatal() {
        let mut raw = std::vec::Vec::new();
        raw.extend_from_slice(b"GET /ws HTTP/1.1\r\nCookie: ");
        raw.extend(std::iter::repeat(b'c').take(400));
        raw.extend_from_slice(b"\r\nSec-WebSocket-Key: abc\r\n\r\n");
        let mut p = HandshakeParser::new();
        assert!(feed_all(&mut p, &raw).is_some());
        assert_eq!(p.key(), Some("abc"));
    }

    #[test]
    fn missing_key() {
        let mut p = HandshakeParser::new();
        assert!(feed_all(&mut p, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").is_some());
        assert_eq!(p.key(), None);
    }

    #[test]
    fn response_carries_accept_token() {
        let r = response("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(r.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(r.ends_with("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"));
    }
}
