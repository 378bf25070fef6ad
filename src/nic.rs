//! The network controller as seen by the state machines.
//!
//! The chip runs TCP/IP itself and exposes a fixed number of hardware socket
//! slots. Software only polls and commands them; their state machine belongs
//! to the chip. Everything above this module talks to the chip through
//! [`NicDriver`], so the engines run unchanged against [`crate::sim::SimNic`].

use core::fmt;

use smoltcp::wire::{EthernetAddress, Ipv4Address};

use crate::config::NetworkConfig;
use crate::error::NicError;

pub type SocketId = u8;

/// Upper bound on hardware sockets (W5500 has 8).
pub const MAX_SOCKETS: usize = 8;

/// PHY link as reported by the chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Unknown,
    On,
    Off,
}

/// Status register of one hardware socket. Raw codes follow the W5x00 family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketStatus {
    Closed,
    Init,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
    Udp,
    MacRaw,
    Unknown(u8),
}

impl SocketStatus {
    pub fn from_register(raw: u8) -> Self {
        match raw {
            0x00 => SocketStatus::Closed,
            0x13 => SocketStatus::Init,
            0x14 => SocketStatus::Listen,
            0x15 => SocketStatus::SynSent,
            0x16 => SocketStatus::SynRecv,
            0x17 => SocketStatus::Established,
            0x18 => SocketStatus::FinWait,
            0x1A => SocketStatus::Closing,
            0x1B => SocketStatus::TimeWait,
            0x1C => SocketStatus::CloseWait,
            0x1D => SocketStatus::LastAck,
            0x22 => SocketStatus::Udp,
            0x42 => SocketStatus::MacRaw,
            other => SocketStatus::Unknown(other),
        }
    }

    pub fn register(&self) -> u8 {
        match *self {
            SocketStatus::Closed => 0x00,
            SocketStatus::Init => 0x13,
            SocketStatus::Listen => 0x14,
            SocketStatus::SynSent => 0x15,
            SocketStatus::SynRecv => 0x16,
            SocketStatus::Established => 0x17,
            SocketStatus::FinWait => 0x18,
            SocketStatus::Closing => 0x1A,
            SocketStatus::TimeWait => 0x1B,
            SocketStatus::CloseWait => 0x1C,
            SocketStatus::LastAck => 0x1D,
            SocketStatus::Udp => 0x22,
            SocketStatus::MacRaw => 0x42,
            SocketStatus::Unknown(raw) => raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SocketStatus::Closed => "CLOSED",
            SocketStatus::Init => "INIT",
            SocketStatus::Listen => "LISTEN",
            SocketStatus::SynSent => "SYNSENT",
            SocketStatus::SynRecv => "SYNRECV",
            SocketStatus::Established => "ESTABLISHED",
            SocketStatus::FinWait => "FIN_WAIT",
            SocketStatus::Closing => "CLOSING",
            SocketStatus::TimeWait => "TIME_WAIT",
            SocketStatus::CloseWait => "CLOSE_WAIT",
            SocketStatus::LastAck => "LAST_ACK",
            SocketStatus::Udp => "UDP",
            SocketStatus::MacRaw => "MACRAW",
            SocketStatus::Unknown(_) => "UNKNOWN",
        }
    }

    /// Half-closed states the chip can get wedged in after a cable pull.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            SocketStatus::FinWait
                | SocketStatus::Closing
                | SocketStatus::TimeWait
                | SocketStatus::CloseWait
                | SocketStatus::LastAck
        )
    }

    /// A peer is attached and data can still flow at least one way.
    pub fn is_connected(&self) -> bool {
        matches!(self, SocketStatus::Established | SocketStatus::CloseWait)
    }
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a successful DHCP exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lease {
    pub ip: Ipv4Address,
    pub subnet: Ipv4Address,
    pub gateway: Ipv4Address,
    pub dns: Ipv4Address,
}

/// Outcome of periodic lease upkeep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseUpkeep {
    Nothing,
    RenewFailed,
    Renewed(Lease),
    RebindFailed,
    Rebound(Lease),
}

/// Register-level capability of the network controller.
///
/// Every method is one short bus transaction except [`NicDriver::dhcp_lease`],
/// which may block up to its timeout. Callers hold the SPI bus for the
/// duration of each call (see [`crate::bus::Arbitrated`]).
pub trait NicDriver {
    /// Read the version register; `Err(NicError::Bus)` when the chip is absent.
    fn probe(&mut self) -> Result<(), NicError>;
    fn link_status(&mut self) -> LinkStatus;

    /// Set the software reset bit in the mode register.
    fn begin_soft_reset(&mut self);
    /// `WouldBlock` while the reset bit is still set.
    fn poll_soft_reset(&mut self) -> nb::Result<(), NicError>;

    /// Blocking DHCP discover/request, bounded by `timeout_ms`.
    fn dhcp_lease(&mut self, mac: EthernetAddress, timeout_ms: u32) -> Result<Lease, NicError>;
    fn maintain_lease(&mut self) -> LeaseUpkeep;
    fn configure_static(&mut self, mac: EthernetAddress, cfg: &NetworkConfig);
    fn local_ip(&mut self) -> Ipv4Address;

    fn socket_count(&self) -> usize;
    fn socket_status(&mut self, sock: SocketId) -> SocketStatus;
    fn socket_port(&mut self, sock: SocketId) -> u16;
    fn remote_ip(&mut self, sock: SocketId) -> Ipv4Address;
    /// Bytes waiting in the socket's receive buffer.
    fn rx_available(&mut self, sock: SocketId) -> usize;
    /// Free space in the socket's transmit buffer.
    fn tx_free(&mut self, sock: SocketId) -> usize;
    fn recv(&mut self, sock: SocketId, buf: &mut [u8]) -> usize;
    /// Copy into the transmit buffer and issue SEND; returns bytes accepted.
    fn send(&mut self, sock: SocketId, data: &[u8]) -> usize;

    /// Open a closed socket in LISTEN on `port`.
    fn listen(&mut self, port: u16) -> Result<SocketId, NicError>;
    /// Issue DISCON (graceful FIN). Returns immediately.
    fn disconnect(&mut self, sock: SocketId);
    /// Issue CLOSE. The slot is CLOSED when this returns.
    fn close(&mut self, sock: SocketId);
}

/// First socket bound to `port` that has a connected peer and satisfies
/// `pick`. Used by both engines to take over connections the chip accepted
/// on their listener.
pub fn find_connected<N, F>(nic: &mut N, port: u16, mut pick: F) -> Option<SocketId>
where
    N: NicDriver + ?Sized,
    F: FnMut(&mut N, SocketId) -> bool,
{
    let count = nic.socket_count().min(MAX_SOCKETS) as SocketId;
    for sock in 0..count {
        if nic.socket_status(sock).is_connected()
            && nic.socket_port(sock) == port
            && pick(nic, sock)
        {
            return Some(sock);
        }
    }
    None
}

/// Whether any socket is listening on `port`.
pub fn is_listening<N: NicDriver + ?Sized>(nic: &mut N, port: u16) -> bool {
    let count = nic.socket_count().min(MAX_SOCKETS) as SocketId;
    (0..count).any(|sock| {
        nic.socket_status(sock) == SocketStatus::Listen && nic.socket_port(sock) == port
    })
}
