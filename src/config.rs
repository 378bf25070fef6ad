//! Persisted network settings and the tuning knobs of the three engines.

use smoltcp::wire::Ipv4Address;

use crate::error::ConfigError;

// ── Persisted network record ────────────────────────────────────

const RECORD_MAGIC: u8 = 0xA5;
pub const RECORD_LEN: usize = 18;

/// Addressing that survives a reboot. Owned by the link supervisor; written
/// back through [`crate::link::LinkHooks::store_network_config`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub dhcp_enabled: bool,
    pub ip: Ipv4Address,
    pub subnet: Ipv4Address,
    pub gateway: Ipv4Address,
    pub dns: Ipv4Address,
}

impl NetworkConfig {
    /// Factory default: DHCP on, static fallback 192.168.1.100/24.
    pub const fn factory() -> Self {
        Self {
            dhcp_enabled: true,
            ip: Ipv4Address([192, 168, 1, 100]),
            subnet: Ipv4Address([255, 255, 255, 0]),
            gateway: Ipv4Address([192, 168, 1, 1]),
            dns: Ipv4Address([8, 8, 8, 8]),
        }
    }

    /// Fixed-size layout: magic, dhcp flag, ip, subnet, gateway, dns.
    pub fn to_record(&self) -> [u8; RECORD_LEN] {
        let mut rec = [0u8; RECORD_LEN];
        rec[0] = RECORD_MAGIC;
        rec[1] = self.dhcp_enabled as u8;
        rec[2..6].copy_from_slice(&self.ip.0);
        rec[6..10].copy_from_slice(&self.subnet.0);
        rec[10..14].copy_from_slice(&self.gateway.0);
        rec[14..18].copy_from_slice(&self.dns.0);
        rec
    }

    pub fn from_record(rec: &[u8]) -> Result<Self, ConfigError> {
        if rec.len() != RECORD_LEN {
            return Err(ConfigError::BadLength);
        }
        if rec[0] != RECORD_MAGIC {
            return Err(ConfigError::BadMagic);
        }
        let addr = |at: usize| Ipv4Address([rec[at], rec[at + 1], rec[at + 2], rec[at + 3]]);
        Ok(Self {
            dhcp_enabled: rec[1] != 0,
            ip: addr(2),
            subnet: addr(6),
            gateway: addr(10),
            dns: addr(14),
        })
    }

    /// Decode a stored record, falling back to the factory default on garbage
    /// (fresh flash reads as all 0xFF).
    pub fn load_or_default(rec: &[u8]) -> Self {
        match Self::from_record(rec) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("network config: {}, using defaults", err);
                Self::factory()
            }
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::factory()
    }
}

// ── Engine tuning ───────────────────────────────────────────────

pub const HTTP_PORT: u16 = 80;
pub const WS_PORT: u16 = 81;

/// Link supervisor timing, all in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupervisorTimings {
    pub reset_low_ms: u32,
    pub reset_settle_ms: u32,
    pub hard_reset_min_interval_ms: u32,
    pub soft_reset_timeout_ms: u32,
    pub link_unknown_timeout_ms: u32,
    pub dhcp_timeout_ms: u32,
    pub dhcp_max_retries: u8,
    pub server_settle_ms: u32,
    pub idle_poll_ms: u32,
    pub disconnected_poll_ms: u32,
    pub error_retry_ms: u32,
    pub max_error_retries: u8,
}

impl SupervisorTimings {
    pub const fn new() -> Self {
        Self {
            reset_low_ms: 2,
            reset_settle_ms: 3_000,
            hard_reset_min_interval_ms: 90_000,
            soft_reset_timeout_ms: 1_000,
            link_unknown_timeout_ms: 5_000,
            dhcp_timeout_ms: 4_000,
            dhcp_max_retries: 3,
            server_settle_ms: 50,
            idle_poll_ms: 1_000,
            disconnected_poll_ms: 2_000,
            error_retry_ms: 5_000,
            max_error_retries: 3,
        }
    }
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    pub port: u16,
    /// Measured from connection acceptance.
    pub request_timeout_ms: u32,
    /// Measured from the end of the header block.
    pub body_timeout_ms: u32,
    pub close_timeout_ms: u32,
    /// A response the peer stops taking is abandoned after this long.
    pub send_timeout_ms: u32,
    pub response_chunk: usize,
    pub monitor_interval_ms: u32,
    pub stale_socket_ms: u32,
}

impl HttpConfig {
    pub const fn new() -> Self {
        Self {
            port: HTTP_PORT,
            request_timeout_ms: 500,
            body_timeout_ms: 100,
            close_timeout_ms: 50,
            send_timeout_ms: 2_000,
            response_chunk: 2048,
            monitor_interval_ms: 5_000,
            stale_socket_ms: 10_000,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WsConfig {
    pub port: u16,
    pub ping_interval_ms: u32,
    pub idle_timeout_ms: u32,
    pub handshake_timeout_ms: u32,
    pub tx_stall_timeout_ms: u32,
    pub tx_chunk: usize,
    pub max_chunks_per_poll: u8,
}

impl WsConfig {
    pub const fn new() -> Self {
        Self {
            port: WS_PORT,
            ping_interval_ms: 10_000,
            idle_timeout_ms: 30_000,
            handshake_timeout_ms: 5_000,
            tx_stall_timeout_ms: 2_000,
            tx_chunk: 1024,
            max_chunks_per_poll: 4,
        }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self::new()
    }
}
