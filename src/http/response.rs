//! Response writer handed to endpoint handlers.
//!
//! Handlers run to completion in one call, but the NIC only takes what fits
//! in its transmit buffer. Output goes through an [`Outbox`] that the server
//! keeps feeding to the socket on later updates until the peer has taken it.

use core::fmt::{self, Write};

use heapless::{String, Vec};

use crate::link::NetworkStatus;
use crate::nic::{NicDriver, SocketId};

use super::ServerStats;

/// Largest single write issued to the NIC.
pub const MAX_CHUNK: usize = 2048;
/// Handler output held back while the NIC's transmit buffer drains.
pub const OUTBOX_SIZE: usize = 4096;

/// Response bytes the NIC has not taken yet.
///
/// Handler output is copied in. A static file body is kept by reference and
/// goes out after it.
pub struct Outbox {
    buf: Vec<u8, OUTBOX_SIZE>,
    tail: &'static [u8],
    sent: usize,
    overflowed: bool,
}

impl Outbox {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            tail: &[],
            sent: 0,
            overflowed: false,
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.tail = &[];
        self.sent = 0;
        self.overflowed = false;
    }

    pub fn pending(&self) -> usize {
        self.buf.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Bytes the NIC accepted since the last reset.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Some handler output was lost because the outbox was full.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    fn stage(&mut self, data: &[u8]) -> usize {
        if !self.tail.is_empty() {
            return 0;
        }
        let n = data.len().min(OUTBOX_SIZE - self.buf.len());
        self.buf.extend_from_slice(&data[..n]).ok();
        n
    }

    /// Move queued bytes to the NIC in writes of at most `chunk`, until it
    /// stops taking them. Returns the bytes moved.
    pub fn pump<N: NicDriver + ?Sized>(&mut self, nic: &mut N, sock: SocketId, chunk: usize) -> usize {
        let chunk = chunk.clamp(1, MAX_CHUNK);
        let mut moved = 0;
        loop {
            let from_buf = !self.buf.is_empty();
            let src: &[u8] = if from_buf { &self.buf[..] } else { self.tail };
            let n = src.len().min(chunk).min(nic.tx_free(sock));
            if n == 0 {
                break;
            }
            let sent = nic.send(sock, &src[..n]).min(n);
            if from_buf {
                let left = self.buf.len() - sent;
                self.buf.copy_within(sent.., 0);
                self.buf.truncate(left);
            } else {
                self.tail = &self.tail[sent..];
            }
            moved += sent;
            if sent < n {
                break;
            }
        }
        self.sent += moved;
        moved
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Responder<'a> {
    nic: &'a mut dyn NicDriver,
    sock: SocketId,
    chunk: usize,
    out: &'a mut Outbox,
    network: &'a NetworkStatus,
    stats: ServerStats,
    status: Option<u16>,
    produced: usize,
}

impl<'a> Responder<'a> {
    pub(crate) fn new(
        nic: &'a mut dyn NicDriver,
        sock: SocketId,
        chunk: usize,
        out: &'a mut Outbox,
        network: &'a NetworkStatus,
        stats: ServerStats,
    ) -> Self {
        Self {
            nic,
            sock,
            chunk: chunk.clamp(1, MAX_CHUNK),
            out,
            network,
            stats,
            status: None,
            produced: 0,
        }
    }

    /// Complete response with `Content-Length`.
    pub fn send(&mut self, code: u16, content_type: &str, body: &[u8]) {
        self.send_header(code, content_type, Some(body.len()));
        self.write(body);
    }

    pub fn send_str(&mut self, code: u16, content_type: &str, body: &str) {
        self.send(code, content_type, body.as_bytes());
    }

    /// Like [`Responder::send`], without copying `body` into the outbox.
    pub fn send_static(&mut self, code: u16, content_type: &str, body: &'static [u8]) {
        if self.status.is_some() {
            log::warn!("http: response header sent twice");
            return;
        }
        self.send_header(code, content_type, Some(body.len()));
        self.out.tail = body;
        self.produced += body.len();
    }

    /// Status line and headers. Without a length the body runs to the close.
    pub fn send_header(&mut self, code: u16, content_type: &str, content_length: Option<usize>) {
        if self.status.is_some() {
            log::warn!("http: response header sent twice");
            return;
        }
        self.status = Some(code);
        let mut head: String<192> = String::new();
        let reason = if (200..300).contains(&code) { "OK" } else { "NOT OK" };
        write!(head, "HTTP/1.1 {} {}\r\nContent-Type: {}\r\n", code, reason, content_type).ok();
        if let Some(len) = content_length {
            write!(head, "Content-Length: {}\r\n", len).ok();
        }
        head.push_str("Connection: close\r\n\r\n").ok();
        self.write(head.as_bytes());
    }

    /// Append body bytes. Sent in chunk-sized writes as the NIC has room, the
    /// rest waits in the outbox.
    pub fn write(&mut self, mut data: &[u8]) {
        self.produced += data.len();
        while !data.is_empty() {
            let n = self.out.stage(data);
            data = &data[n..];
            if n == 0 || self.out.buf.len() >= self.chunk {
                let moved = self.out.pump(&mut *self.nic, self.sock, self.chunk);
                if n == 0 && moved == 0 {
                    if !self.out.overflowed {
                        log::warn!("http: socket {} outbox full, {} bytes lost", self.sock, data.len());
                    }
                    self.out.overflowed = true;
                    return;
                }
            }
        }
    }

    /// Hand the NIC what it will take now; returns the status and the bytes
    /// produced, sent or not.
    pub(crate) fn finish(mut self) -> (Option<u16>, usize) {
        self.out.pump(&mut *self.nic, self.sock, self.chunk);
        (self.status, self.produced)
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn network(&self) -> &NetworkStatus {
        self.network
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Direct NIC access for handlers that report on the chip itself.
    pub fn nic(&mut self) -> &mut dyn NicDriver {
        &mut *self.nic
    }
}

impl fmt::Write for Responder<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkState;
    use crate::nic::LinkStatus;
    use crate::sim::SimNic;
    use smoltcp::wire::{EthernetAddress, Ipv4Address};

    fn ready_status() -> NetworkStatus {
        NetworkStatus {
            state: LinkState::Idle,
            ready: true,
            busy: false,
            link: LinkStatus::On,
            server: true,
            ip: Ipv4Address([10, 0, 0, 42]),
            mac: EthernetAddress([0x1E, 0x07, 1, 2, 3, 4]),
            init_cycles: 1,
            retries: 0,
            hard_resets: 0,
            soft_resets: 0,
        }
    }

    fn connected() -> (SimNic, SocketId) {
        let mut nic = SimNic::new();
        nic.listen(80).ok();
        let sock = nic.connect(80, Ipv4Address([10, 0, 0, 9]), b"").unwrap();
        (nic, sock)
    }

    #[test]
    fn header_then_body() {
        let (mut nic, sock) = connected();
        let net = ready_status();
        let mut out = Outbox::new();
        let mut resp = Responder::new(&mut nic, sock, 2048, &mut out, &net, ServerStats::new());
        resp.send_str(200, "text/plain", "hello");
        assert_eq!(resp.finish(), (Some(200), 88));
        assert!(out.is_empty());
        assert_eq!(
            nic.socket(sock).sent(),
            &b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\
               Connection: close\r\n\r\nhello"[..]
        );
    }

    #[test]
    fn error_status_and_streamed_body() {
        let (mut nic, sock) = connected();
        let net = ready_status();
        let mut out = Outbox::new();
        let mut resp = Responder::new(&mut nic, sock, 16, &mut out, &net, ServerStats::new());
        resp.send_header(404, "application/json", None);
        write!(resp, "{{\"error\":\"{}\"}}", "missing").unwrap();
        resp.finish();
        let sent = nic.socket(sock).sent();
        assert!(sent.starts_with(b"HTTP/1.1 404 NOT OK\r\n"));
        assert!(sent.ends_with(b"Connection: close\r\n\r\n{\"error\":\"missing\"}"));
    }

    #[test]
    fn writes_are_chunked() {
        let (mut nic, sock) = connected();
        nic.socket_mut(sock).tx_free = 100;
        let net = ready_status();
        let mut out = Outbox::new();
        let mut resp = Responder::new(&mut nic, sock, 100, &mut out, &net, ServerStats::new());
        resp.write(&[b'x'; 350]);
        assert_eq!(resp.finish(), (None, 350));
        assert_eq!(out.sent(), 350);
    }

    #[test]
    fn output_waits_in_the_outbox_until_the_nic_has_room() {
        let (mut nic, sock) = connected();
        nic.hold_tx = true;
        nic.socket_mut(sock).tx_free = 100;
        let net = ready_status();
        let mut out = Outbox::new();
        let mut resp = Responder::new(&mut nic, sock, 64, &mut out, &net, ServerStats::new());
        resp.write(&[b'x'; 300]);
        assert_eq!(resp.finish(), (None, 300));
        assert_eq!(out.sent(), 100);
        assert_eq!(out.pending(), 200);

        assert_eq!(out.pump(&mut nic, sock, 64), 0);
        nic.ack(sock);
        assert_eq!(out.pump(&mut nic, sock, 64), 200);
        assert!(out.is_empty());
        assert_eq!(nic.socket(sock).sent(), &[b'x'; 300][..]);
    }

    #[test]
    fn static_body_follows_the_header_by_reference() {
        static PAGE: [u8; 3000] = [b'p'; 3000];
        let (mut nic, sock) = connected();
        nic.hold_tx = true;
        let net = ready_status();
        let mut out = Outbox::new();
        let mut resp = Responder::new(&mut nic, sock, 2048, &mut out, &net, ServerStats::new());
        resp.send_static(200, "text/html", &PAGE);
        let (status, produced) = resp.finish();
        assert_eq!(status, Some(200));
        // Header plus the first part of the body fill the 2048-byte buffer.
        assert_eq!(out.sent(), 2048);
        assert_eq!(out.pending(), produced - 2048);

        nic.ack(sock);
        out.pump(&mut nic, sock, 2048);
        assert!(out.is_empty());
        let sent = nic.socket(sock).sent();
        assert!(sent.starts_with(b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 3000\r\n"));
        assert!(sent.ends_with(&PAGE));
    }

    #[test]
    fn full_outbox_is_flagged() {
        let (mut nic, sock) = connected();
        nic.socket_mut(sock).tx_free = 0;
        let net = ready_status();
        let mut out = Outbox::new();
        let mut resp = Responder::new(&mut nic, sock, 2048, &mut out, &net, ServerStats::new());
        resp.write(&[b'y'; 5000]);
        resp.finish();
        assert!(out.overflowed());
        assert_eq!(out.pending(), OUTBOX_SIZE);
        assert!(nic.socket(sock).sent().is_empty());
    }
}
