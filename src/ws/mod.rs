//! Multi-client WebSocket server with topic pub/sub.
//!
//! Every slot owns a transmit ring. Application code only ever queues into
//! it; [`WsServer::update`] moves queued bytes to the NIC in bounded chunks
//! as the socket's transmit buffer frees up. A peer that stops reading is
//! cut off after a short stall instead of blocking the loop.

pub mod client;
pub mod frame;
pub mod handshake;
pub mod pubsub;
pub mod ring;

use crate::config::WsConfig;
use crate::link::NetworkStatus;
use crate::nic::{self, LinkStatus, NicDriver, SocketId, SocketStatus, MAX_SOCKETS};
use crate::time::elapsed;

pub use client::{ClientState, WsClient};
pub use frame::Opcode;
pub use pubsub::{Property, Subscription};

pub const MAX_CLIENTS: usize = 4;
/// Upper bound on a single NIC write from the ring.
pub const MAX_TX_CHUNK: usize = 1024;

/// Called for every inbound text message, before subscription commands are
/// applied.
pub type MessageHandler<C> = fn(&mut WsClient, &str, &mut C);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WsStats {
    pub accepted: u32,
    pub rejected: u32,
    pub handshake_failures: u32,
    pub force_closed: u32,
    pub messages: u32,
}

pub struct WsServer<C> {
    config: WsConfig,
    clients: [WsClient; MAX_CLIENTS],
    on_message: Option<MessageHandler<C>>,
    stats: WsStats,
}

impl<C> WsServer<C> {
    pub fn new(config: WsConfig) -> Self {
        Self {
            config,
            clients: core::array::from_fn(|i| WsClient::new(i as u8)),
            on_message: None,
            stats: WsStats::default(),
        }
    }

    pub fn set_message_handler(&mut self, handler: MessageHandler<C>) {
        self.on_message = Some(handler);
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn stats(&self) -> &WsStats {
        &self.stats
    }

    pub fn clients(&self) -> &[WsClient] {
        &self.clients
    }

    pub fn client_mut(&mut self, id: u8) -> Option<&mut WsClient> {
        self.clients.get_mut(id as usize)
    }

    pub fn connected_count(&self) -> usize {
        self.clients.iter().filter(|c| c.is_connected()).count()
    }

    /// Queue `text` to every client subscribed to `topic`.
    pub fn emit(&mut self, topic: &str, text: &str) -> usize {
        self.emit_with_props(topic, text, &[])
    }

    /// Like [`WsServer::emit`], honouring each subscription's property filters.
    pub fn emit_with_props(&mut self, topic: &str, text: &str, props: &[Property<'_>]) -> usize {
        self.broadcast_frame(Opcode::Text, text.as_bytes(), |c| c.wants(topic, props))
    }

    pub fn emit_binary(&mut self, topic: &str, data: &[u8]) -> usize {
        self.broadcast_frame(Opcode::Binary, data, |c| c.wants(topic, &[]))
    }

    /// Queue `text` to every connected client accepted by `filter`.
    pub fn broadcast<F: Fn(&WsClient) -> bool>(&mut self, text: &str, filter: F) -> usize {
        self.broadcast_frame(Opcode::Text, text.as_bytes(), filter)
    }

    pub fn broadcast_binary<F: Fn(&WsClient) -> bool>(&mut self, data: &[u8], filter: F) -> usize {
        self.broadcast_frame(Opcode::Binary, data, filter)
    }

    pub fn send_to(&mut self, id: u8, text: &str) -> bool {
        match self.clients.get_mut(id as usize) {
            Some(c) => c.send_text(text),
            None => false,
        }
    }

    fn broadcast_frame<F: Fn(&WsClient) -> bool>(&mut self, opcode: Opcode, payload: &[u8], filter: F) -> usize {
        let mut queued = 0;
        for c in self.clients.iter_mut() {
            if c.is_connected() && filter(c) && c.queue_frame(opcode, payload) {
                queued += 1;
            }
        }
        queued
    }

    pub fn update<N: NicDriver + ?Sized>(&mut self, nic: &mut N, net: &NetworkStatus, ctx: &mut C, now: u32) {
        // Checked here as well as in the supervisor so clients go the same
        // loop iteration the cable does.
        if nic.link_status() != LinkStatus::On {
            self.drop_all(nic, "link lost");
            return;
        }
        if !net.ready {
            self.drop_all(nic, "network not ready");
            return;
        }

        self.accept(nic, now);
        for i in 0..MAX_CLIENTS {
            self.service(i, nic, ctx, now);
        }
    }

    fn drop_all<N: NicDriver + ?Sized>(&mut self, nic: &mut N, why: &str) {
        for c in self.clients.iter_mut() {
            if c.state() == ClientState::Disconnected {
                continue;
            }
            log::warn!("ws: client {} dropped, {}", c.id(), why);
            force_close(c, nic, &mut self.stats);
        }
    }

    fn accept<N: NicDriver + ?Sized>(&mut self, nic: &mut N, now: u32) {
        let port = self.config.port;
        let mut took_any = false;
        for _ in 0..MAX_SOCKETS {
            let clients = &self.clients;
            let untracked = |_: &mut N, s: SocketId| !clients.iter().any(|c| c.socket() == Some(s));
            let Some(sock) = nic::find_connected(nic, port, untracked) else {
                break;
            };
            took_any = true;
            let remote = nic.remote_ip(sock);
            match self.clients.iter_mut().find(|c| c.state() == ClientState::Disconnected) {
                Some(client) => {
                    log::info!("ws: client {} connecting from {} on socket {}", client.id(), remote, sock);
                    client.attach(sock, remote, now);
                    self.stats.accepted += 1;
                }
                None => {
                    log::warn!("ws: all {} slots busy, refusing {}", MAX_CLIENTS, remote);
                    nic.close(sock);
                    self.stats.rejected += 1;
                }
            }
        }

        if took_any && !nic::is_listening(nic, port) {
            if let Err(err) = nic.listen(port) {
                log::warn!("ws: relisten on {}: {}", port, err);
            }
        }
    }

    fn service<N: NicDriver + ?Sized>(&mut self, i: usize, nic: &mut N, ctx: &mut C, now: u32) {
        let cfg = self.config;
        let handler = self.on_message;
        let stats = &mut self.stats;
        let client = &mut self.clients[i];
        let Some(sock) = client.socket() else {
            return;
        };

        let status = nic.socket_status(sock);
        let peer_gone = !status.is_connected()
            || (status == SocketStatus::CloseWait
                && client.state() != ClientState::Closing
                && nic.rx_available(sock) == 0);
        if peer_gone {
            log::info!("ws: client {} gone ({})", client.id(), status);
            if status != SocketStatus::Closed {
                nic.close(sock);
            }
            client.reset();
            return;
        }

        if client.state() == ClientState::HandshakeReceive && !upgrade(client, nic, sock, &cfg, stats, now) {
            return;
        }

        if client.state() == ClientState::Connected {
            if !receive(client, nic, sock, handler, ctx, stats, now) {
                force_close(client, nic, stats);
                return;
            }
            if client.state() == ClientState::Connected && !keepalive(client, &cfg, now) {
                force_close(client, nic, stats);
                return;
            }
        }

        if matches!(client.state(), ClientState::Connected | ClientState::Closing)
            && !drain(client, nic, sock, &cfg, now)
        {
            force_close(client, nic, stats);
            return;
        }

        if client.state() == ClientState::Closing && client.tx.is_empty() {
            log::info!("ws: client {} closed", client.id());
            nic.disconnect(sock);
            client.reset();
        }
    }
}

fn force_close<N: NicDriver + ?Sized>(client: &mut WsClient, nic: &mut N, stats: &mut WsStats) {
    if let Some(sock) = client.socket() {
        nic.close(sock);
    }
    client.reset();
    stats.force_closed += 1;
}

/// Feed the upgrade request through the line parser. False once the slot
/// has been released.
fn upgrade<N: NicDriver + ?Sized>(
    client: &mut WsClient,
    nic: &mut N,
    sock: SocketId,
    cfg: &WsConfig,
    stats: &mut WsStats,
    now: u32,
) -> bool {
    let mut buf = [0u8; client::RX_BUFFER];
    let avail = nic.rx_available(sock).min(buf.len());
    let n = if avail > 0 { nic.recv(sock, &mut buf[..avail]) } else { 0 };

    let done = buf[..n]
        .iter()
        .position(|&b| client.handshake.feed(b) == handshake::Progress::Done);
    let Some(end) = done else {
        if elapsed(now, client.since) > cfg.handshake_timeout_ms {
            log::warn!("ws: client {} handshake timed out", client.id());
            stats.handshake_failures += 1;
            force_close(client, nic, stats);
            return false;
        }
        return true;
    };

    let Some(key) = client.handshake.key() else {
        log::warn!("ws: client {} upgrade without Sec-WebSocket-Key", client.id());
        stats.handshake_failures += 1;
        nic.disconnect(sock);
        client.reset();
        return false;
    };
    let reply = handshake::response(&handshake::accept_key(key));
    if nic.send(sock, reply.as_bytes()) < reply.len() {
        log::warn!("ws: client {} could not take the upgrade response", client.id());
        stats.handshake_failures += 1;
        force_close(client, nic, stats);
        return false;
    }

    // Anything after the blank line is already frame data.
    client.rx.extend_from_slice(&buf[end + 1..n]).ok();
    client.state = ClientState::Connected;
    client.last_active = now;
    client.last_ping = now;
    log::info!("ws: client {} connected from {}", client.id(), client.remote());
    true
}

/// Read and dispatch complete frames. False on a protocol violation.
fn receive<C, N: NicDriver + ?Sized>(
    client: &mut WsClient,
    nic: &mut N,
    sock: SocketId,
    handler: Option<MessageHandler<C>>,
    ctx: &mut C,
    stats: &mut WsStats,
    now: u32,
) -> bool {
    let room = client::RX_BUFFER - client.rx.len();
    let avail = nic.rx_available(sock).min(room);
    if avail > 0 {
        let mut buf = [0u8; client::RX_BUFFER];
        let n = nic.recv(sock, &mut buf[..avail]);
        client.rx.extend_from_slice(&buf[..n]).ok();
    }

    loop {
        let hdr = match frame::parse(&client.rx, client::RX_BUFFER) {
            Ok(Some(hdr)) => hdr,
            Ok(None) => return true,
            Err(err) => {
                log::warn!("ws: client {} sent a bad frame: {}", client.id(), err);
                return false;
            }
        };

        let len = hdr.payload_len;
        let mut payload = [0u8; client::RX_BUFFER];
        payload[..len].copy_from_slice(&client.rx[hdr.header_len..hdr.frame_len()]);
        frame::unmask(&mut payload[..len], hdr.mask);
        compact(&mut client.rx, hdr.frame_len());
        client.last_active = now;

        if !hdr.fin {
            log::warn!("ws: client {} sent a fragmented message", client.id());
            return false;
        }
        match Opcode::from_u8(hdr.opcode) {
            Some(Opcode::Text) => {
                let Ok(text) = core::str::from_utf8(&payload[..len]) else {
                    log::warn!("ws: client {} sent invalid UTF-8", client.id());
                    return false;
                };
                stats.messages += 1;
                if let Some(handler) = handler {
                    handler(client, text, ctx);
                }
                pubsub::apply_command(client.subscriptions_mut(), text);
            }
            Some(Opcode::Binary) => {
                log::debug!("ws: client {} binary message ignored ({} bytes)", client.id(), len);
            }
            Some(Opcode::Ping) => {
                client.queue_frame(Opcode::Pong, &payload[..len]);
            }
            Some(Opcode::Pong) => {}
            Some(Opcode::Close) => {
                client.queue_frame(Opcode::Close, &payload[..len.min(2)]);
                client.state = ClientState::Closing;
                return true;
            }
            Some(Opcode::Continuation) | None => {
                log::warn!("ws: client {} sent opcode {:#x}", client.id(), hdr.opcode);
                return false;
            }
        }
    }
}

fn compact(rx: &mut heapless::Vec<u8, { client::RX_BUFFER }>, used: usize) {
    let len = rx.len();
    rx.copy_within(used..len, 0);
    rx.truncate(len - used);
}

/// Ping on schedule; false once the peer has been silent too long.
fn keepalive(client: &mut WsClient, cfg: &WsConfig, now: u32) -> bool {
    if elapsed(now, client.last_active) > cfg.idle_timeout_ms {
        log::warn!("ws: client {} silent for {} ms", client.id(), elapsed(now, client.last_active));
        return false;
    }
    if elapsed(now, client.last_ping) > cfg.ping_interval_ms {
        client.queue_frame(Opcode::Ping, &[]);
        client.last_ping = now;
    }
    true
}

/// Move queued bytes to the NIC. False when the peer has not accepted a
/// byte for longer than the stall timeout.
fn drain<N: NicDriver + ?Sized>(client: &mut WsClient, nic: &mut N, sock: SocketId, cfg: &WsConfig, now: u32) -> bool {
    if client.tx.is_empty() {
        client.stall_since = None;
        return true;
    }

    let mut buf = [0u8; MAX_TX_CHUNK];
    for _ in 0..cfg.max_chunks_per_poll {
        let free = nic.tx_free(sock);
        if free == 0 {
            let since = *client.stall_since.get_or_insert(now);
            if elapsed(now, since) > cfg.tx_stall_timeout_ms {
                log::warn!(
                    "ws: client {} stalled with {} bytes queued",
                    client.id(),
                    client.tx.available()
                );
                return false;
            }
            return true;
        }
        client.stall_since = None;

        let want = cfg.tx_chunk.min(MAX_TX_CHUNK).min(free).min(client.tx.available());
        if want == 0 {
            break;
        }
        let n = client.tx.peek(&mut buf[..want]);
        let sent = nic.send(sock, &buf[..n]);
        client.tx.consume(sent);
        if sent < n {
            break;
        }
    }
    true
}
