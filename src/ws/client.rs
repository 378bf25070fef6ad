//! One WebSocket connection slot.

use heapless::Vec;
use smoltcp::wire::Ipv4Address;

use super::frame::{self, Opcode, MAX_SERVER_HEADER};
use super::handshake::HandshakeParser;
use super::pubsub::{Property, Subscription, Subscriptions};
use super::ring::TxRing;
use crate::nic::SocketId;

/// Receive buffer; inbound frames larger than this are refused.
pub const RX_BUFFER: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    HandshakeReceive,
    Connected,
    /// Close frame queued; the socket goes once the ring drains.
    Closing,
}

pub struct WsClient {
    id: u8,
    pub(crate) state: ClientState,
    pub(crate) sock: Option<SocketId>,
    pub(crate) remote: Ipv4Address,
    pub(crate) since: u32,
    pub(crate) last_active: u32,
    pub(crate) last_ping: u32,
    pub(crate) stall_since: Option<u32>,
    pub(crate) handshake: HandshakeParser,
    pub(crate) rx: Vec<u8, RX_BUFFER>,
    pub(crate) tx: TxRing,
    subs: Subscriptions,
    dropped: u32,
}

impl WsClient {
    pub const fn new(id: u8) -> Self {
        Self {
            id,
            state: ClientState::Disconnected,
            sock: None,
            remote: Ipv4Address::UNSPECIFIED,
            since: 0,
            last_active: 0,
            last_ping: 0,
            stall_since: None,
            handshake: HandshakeParser::new(),
            rx: Vec::new(),
            tx: TxRing::new(),
            subs: Subscriptions::new(),
            dropped: 0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    pub fn socket(&self) -> Option<SocketId> {
        self.sock
    }

    pub fn remote(&self) -> Ipv4Address {
        self.remote
    }

    /// Bytes queued for the NIC.
    pub fn tx_pending(&self) -> usize {
        self.tx.available()
    }

    pub fn tx_free(&self) -> usize {
        self.tx.free_space()
    }

    /// Frames refused because the ring was full.
    pub fn dropped_frames(&self) -> u32 {
        self.dropped
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subs
    }

    pub fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subs
    }

    pub fn subscribe(&mut self, topic: &str) -> bool {
        match Subscription::new(topic) {
            Some(sub) => self.subs.add(sub),
            None => false,
        }
    }

    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        self.subs.remove(topic) > 0
    }

    pub fn wants(&self, topic: &str, props: &[Property<'_>]) -> bool {
        self.is_connected() && self.subs.matches(topic, props)
    }

    pub fn send_text(&mut self, text: &str) -> bool {
        self.queue_frame(Opcode::Text, text.as_bytes())
    }

    pub fn send_binary(&mut self, data: &[u8]) -> bool {
        self.queue_frame(Opcode::Binary, data)
    }

    /// Queue one whole frame, or drop it when the ring cannot take it.
    pub fn queue_frame(&mut self, opcode: Opcode, payload: &[u8]) -> bool {
        let open = match opcode {
            Opcode::Close => matches!(self.state, ClientState::Connected | ClientState::Closing),
            _ => self.state == ClientState::Connected,
        };
        if !open {
            return false;
        }
        let mut hdr = [0u8; MAX_SERVER_HEADER];
        let queued = match frame::encode_header(opcode, payload.len(), &mut hdr) {
            Ok(head) => self.tx.push_all(&[head, payload]),
            Err(_) => false,
        };
        if !queued {
            self.dropped += 1;
            log::debug!(
                "ws: client {} dropped {:?} frame of {} bytes ({} free)",
                self.id,
                opcode,
                payload.len(),
                self.tx.free_space()
            );
        }
        queued
    }

    pub(crate) fn attach(&mut self, sock: SocketId, remote: Ipv4Address, now: u32) {
        self.reset();
        self.state = ClientState::HandshakeReceive;
        self.sock = Some(sock);
        self.remote = remote;
        self.since = now;
        self.last_active = now;
        self.last_ping = now;
    }

    /// Back to an empty, disconnected slot.
    pub(crate) fn reset(&mut self) {
        self.state = ClientState::Disconnected;
        self.sock = None;
        self.remote = Ipv4Address::UNSPECIFIED;
        self.stall_since = None;
        self.handshake.reset();
        self.rx.clear();
        self.tx.clear();
        self.subs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> WsClient {
        let mut c = WsClient::new(0);
        c.attach(3, Ipv4Address([10, 0, 0, 9]), 0);
        c.state = ClientState::Connected;
        c
    }

    #[test]
    fn frames_only_queue_when_connected() {
        let mut c = WsClient::new(0);
        assert!(!c.send_text("hi"));
        c.attach(3, Ipv4Address([10, 0, 0, 9]), 0);
        assert!(!c.send_text("hi"));
        c.state = ClientState::Connected;
        assert!(c.send_text("hi"));
        assert_eq!(c.tx_pending(), 4);
        c.state = ClientState::Closing;
        assert!(!c.send_text("late"));
        assert!(c.queue_frame(Opcode::Close, &[]));
    }

    #[test]
    fn full_ring_drops_whole_frames() {
        let mut c = connected();
        let payload = [0x55u8; 1000];
        let mut sent = 0;
        while c.send_binary(&payload) {
            sent += 1;
        }
        // 1004 bytes per frame, 4095 usable.
        assert_eq!(sent, 4);
        assert_eq!(c.tx_pending(), 4016);
        assert_eq!(c.dropped_frames(), 1);
        assert!(c.send_text("small"));
        assert_eq!(c.tx_pending(), 4023);
    }

    #[test]
    fn reset_clears_everything() {
        let mut c = connected();
        assert!(c.subscribe("temp"));
        assert!(c.wants("temp", &[]));
        c.send_text("x");
        c.reset();
        assert_eq!(c.state(), ClientState::Disconnected);
        assert_eq!(c.tx_pending(), 0);
        assert!(c.subscriptions().is_empty());
        assert!(c.socket().is_none());
    }
}
