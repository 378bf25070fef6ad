//! In-memory stand-ins for the NIC and GPIO lines.
//!
//! Lets the supervisor and both engines run on the host: bring-up, socket
//! leaks, link loss and backpressure are all scripted by poking the public
//! fields between `update` calls.

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;
use heapless::Vec;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use crate::config::NetworkConfig;
use crate::error::NicError;
use crate::nic::{Lease, LeaseUpkeep, LinkStatus, NicDriver, SocketId, SocketStatus, MAX_SOCKETS};

const RX_CAPACITY: usize = 2048;
const TX_LOG_CAPACITY: usize = 8192;
/// W5500 default per-socket TX buffer.
const DEFAULT_TX_FREE: usize = 2048;

// ── GPIO ────────────────────────────────────────────────────────

/// Observable state of a simulated output line.
pub struct PinProbe {
    high: Cell<bool>,
    falling: Cell<u32>,
}

impl PinProbe {
    pub const fn new() -> Self {
        Self {
            high: Cell::new(false),
            falling: Cell::new(0),
        }
    }

    pub fn pin(&self) -> SimPin<'_> {
        SimPin(self)
    }

    pub fn is_high(&self) -> bool {
        self.high.get()
    }

    pub fn falling_edges(&self) -> u32 {
        self.falling.get()
    }
}

impl Default for PinProbe {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SimPin<'a>(&'a PinProbe);

impl OutputPin for SimPin<'_> {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.0.high.get() {
            self.0.falling.set(self.0.falling.get() + 1);
        }
        self.0.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.high.set(true);
        Ok(())
    }
}

// ── NIC ─────────────────────────────────────────────────────────

pub struct SimSocket {
    pub status: SocketStatus,
    pub port: u16,
    pub remote: Ipv4Address,
    /// Reported by `tx_free`. Shrinks as bytes are sent only when the NIC
    /// holds transmit data until [`SimNic::ack`].
    pub tx_free: usize,
    pub closes: u32,
    pub disconnects: u32,
    rx: Vec<u8, RX_CAPACITY>,
    rx_pos: usize,
    tx: Vec<u8, TX_LOG_CAPACITY>,
}

impl SimSocket {
    fn new() -> Self {
        Self {
            status: SocketStatus::Closed,
            port: 0,
            remote: Ipv4Address::UNSPECIFIED,
            tx_free: DEFAULT_TX_FREE,
            closes: 0,
            disconnects: 0,
            rx: Vec::new(),
            rx_pos: 0,
            tx: Vec::new(),
        }
    }

    fn shut(&mut self) {
        self.status = SocketStatus::Closed;
        self.port = 0;
        self.rx.clear();
        self.rx_pos = 0;
    }

    /// Everything the firmware sent on this socket since the last `take_sent`.
    pub fn sent(&self) -> &[u8] {
        &self.tx
    }
}

pub struct SimNic {
    pub link: LinkStatus,
    pub probe_ok: bool,
    /// Polls before the reset bit clears; `u32::MAX` never clears.
    pub soft_reset_delay: u32,
    pub soft_resets: u32,
    /// Lease handed out by `dhcp_lease`; `None` makes every attempt fail.
    pub dhcp: Option<Lease>,
    pub dhcp_attempts: u32,
    /// Returned once by the next `maintain_lease`.
    pub upkeep: LeaseUpkeep,
    pub static_accepted: bool,
    /// `disconnect` completes at once instead of lingering in FIN_WAIT.
    pub graceful_close: bool,
    pub listen_fails: bool,
    /// Sent bytes occupy the socket's transmit buffer until `ack`, the way
    /// the chip keeps them until the peer acknowledges.
    pub hold_tx: bool,
    reset_pending: u32,
    ip: Ipv4Address,
    sockets: [SimSocket; MAX_SOCKETS],
}

impl SimNic {
    pub fn new() -> Self {
        Self {
            link: LinkStatus::On,
            probe_ok: true,
            soft_reset_delay: 1,
            soft_resets: 0,
            dhcp: Some(Lease {
                ip: Ipv4Address([10, 0, 0, 42]),
                subnet: Ipv4Address([255, 255, 255, 0]),
                gateway: Ipv4Address([10, 0, 0, 1]),
                dns: Ipv4Address([10, 0, 0, 1]),
            }),
            dhcp_attempts: 0,
            upkeep: LeaseUpkeep::Nothing,
            static_accepted: true,
            graceful_close: true,
            listen_fails: false,
            hold_tx: false,
            reset_pending: 0,
            ip: Ipv4Address::UNSPECIFIED,
            sockets: core::array::from_fn(|_| SimSocket::new()),
        }
    }

    pub fn socket(&self, sock: SocketId) -> &SimSocket {
        &self.sockets[sock as usize]
    }

    pub fn socket_mut(&mut self, sock: SocketId) -> &mut SimSocket {
        &mut self.sockets[sock as usize]
    }

    /// A peer connects to the listener on `port` and sends `data`, the way
    /// the chip turns its LISTEN socket into the ESTABLISHED one.
    pub fn connect(&mut self, port: u16, remote: Ipv4Address, data: &[u8]) -> Option<SocketId> {
        let sock = self
            .sockets
            .iter()
            .position(|s| s.status == SocketStatus::Listen && s.port == port)?;
        let s = &mut self.sockets[sock];
        s.status = SocketStatus::Established;
        s.remote = remote;
        s.rx.clear();
        s.rx_pos = 0;
        s.tx.clear();
        s.rx.extend_from_slice(data).ok();
        Some(sock as SocketId)
    }

    pub fn push_rx(&mut self, sock: SocketId, data: &[u8]) {
        let s = &mut self.sockets[sock as usize];
        if s.rx_pos == s.rx.len() {
            s.rx.clear();
            s.rx_pos = 0;
        }
        s.rx.extend_from_slice(data).ok();
    }

    pub fn take_sent(&mut self, sock: SocketId) -> Vec<u8, TX_LOG_CAPACITY> {
        core::mem::take(&mut self.sockets[sock as usize].tx)
    }

    /// The peer acknowledged everything in flight on `sock`.
    pub fn ack(&mut self, sock: SocketId) {
        self.sockets[sock as usize].tx_free = DEFAULT_TX_FREE;
    }

    pub fn set_status(&mut self, sock: SocketId, status: SocketStatus, port: u16) {
        let s = &mut self.sockets[sock as usize];
        s.status = status;
        s.port = port;
    }
}

impl Default for SimNic {
    fn default() -> Self {
        Self::new()
    }
}

impl NicDriver for SimNic {
    fn probe(&mut self) -> Result<(), NicError> {
        if self.probe_ok {
            Ok(())
        } else {
            Err(NicError::Bus)
        }
    }

    fn link_status(&mut self) -> LinkStatus {
        self.link
    }

    fn begin_soft_reset(&mut self) {
        self.soft_resets += 1;
        self.reset_pending = self.soft_reset_delay;
        self.ip = Ipv4Address::UNSPECIFIED;
        for s in self.sockets.iter_mut() {
            s.shut();
        }
    }

    fn poll_soft_reset(&mut self) -> nb::Result<(), NicError> {
        match self.reset_pending {
            0 => Ok(()),
            u32::MAX => Err(nb::Error::WouldBlock),
            _ => {
                self.reset_pending -= 1;
                Err(nb::Error::WouldBlock)
            }
        }
    }

    fn dhcp_lease(&mut self, _mac: EthernetAddress, _timeout_ms: u32) -> Result<Lease, NicError> {
        self.dhcp_attempts += 1;
        match self.dhcp {
            Some(lease) => {
                self.ip = lease.ip;
                Ok(lease)
            }
            None => Err(NicError::Dhcp),
        }
    }

    fn maintain_lease(&mut self) -> LeaseUpkeep {
        let upkeep = core::mem::replace(&mut self.upkeep, LeaseUpkeep::Nothing);
        if let LeaseUpkeep::Renewed(lease) | LeaseUpkeep::Rebound(lease) = upkeep {
            self.ip = lease.ip;
        }
        upkeep
    }

    fn configure_static(&mut self, _mac: EthernetAddress, cfg: &NetworkConfig) {
        self.ip = if self.static_accepted {
            cfg.ip
        } else {
            Ipv4Address::UNSPECIFIED
        };
    }

    fn local_ip(&mut self) -> Ipv4Address {
        self.ip
    }

    fn socket_count(&self) -> usize {
        MAX_SOCKETS
    }

    fn socket_status(&mut self, sock: SocketId) -> SocketStatus {
        self.sockets[sock as usize].status
    }

    fn socket_port(&mut self, sock: SocketId) -> u16 {
        self.sockets[sock as usize].port
    }

    fn remote_ip(&mut self, sock: SocketId) -> Ipv4Address {
        self.sockets[sock as usize].remote
    }

    fn rx_available(&mut self, sock: SocketId) -> usize {
        let s = &self.sockets[sock as usize];
        s.rx.len() - s.rx_pos
    }

    fn tx_free(&mut self, sock: SocketId) -> usize {
        self.sockets[sock as usize].tx_free
    }

    fn recv(&mut self, sock: SocketId, buf: &mut [u8]) -> usize {
        let s = &mut self.sockets[sock as usize];
        let n = buf.len().min(s.rx.len() - s.rx_pos);
        buf[..n].copy_from_slice(&s.rx[s.rx_pos..s.rx_pos + n]);
        s.rx_pos += n;
        n
    }

    fn send(&mut self, sock: SocketId, data: &[u8]) -> usize {
        let hold = self.hold_tx;
        let s = &mut self.sockets[sock as usize];
        if !s.status.is_connected() {
            return 0;
        }
        let room = TX_LOG_CAPACITY - s.tx.len();
        let n = data.len().min(s.tx_free).min(room);
        s.tx.extend_from_slice(&data[..n]).ok();
        if hold {
            s.tx_free -= n;
        }
        n
    }

    fn listen(&mut self, port: u16) -> Result<SocketId, NicError> {
        if self.listen_fails {
            return Err(NicError::NoFreeSocket);
        }
        let sock = self
            .sockets
            .iter()
            .position(|s| s.status == SocketStatus::Closed)
            .ok_or(NicError::NoFreeSocket)?;
        let s = &mut self.sockets[sock];
        s.status = SocketStatus::Listen;
        s.port = port;
        s.tx.clear();
        Ok(sock as SocketId)
    }

    fn disconnect(&mut self, sock: SocketId) {
        let graceful = self.graceful_close;
        let s = &mut self.sockets[sock as usize];
        s.disconnects += 1;
        if graceful {
            s.shut();
        } else {
            s.status = SocketStatus::FinWait;
        }
    }

    fn close(&mut self, sock: SocketId) {
        let s = &mut self.sockets[sock as usize];
        s.closes += 1;
        s.shut();
    }
}
