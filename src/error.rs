use core::fmt;

/// Failures reported by the NIC driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NicError {
    /// The chip did not answer on the SPI bus (wrong version register, stuck MISO).
    Bus,
    /// A bounded operation (DHCP, reset) ran out of time.
    Timeout,
    /// Every hardware socket is in use.
    NoFreeSocket,
    /// No lease could be obtained.
    Dhcp,
}

impl fmt::Display for NicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NicError::Bus => f.write_str("NIC not responding on bus"),
            NicError::Timeout => f.write_str("NIC operation timed out"),
            NicError::NoFreeSocket => f.write_str("no free hardware socket"),
            NicError::Dhcp => f.write_str("DHCP lease failed"),
        }
    }
}

/// Rejected WebSocket frames. Each one terminates the offending connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Length code 127 (64-bit payload length).
    Unsupported64BitLength,
    /// Client frames must carry a mask key.
    Unmasked,
    /// Header plus payload exceeds the receive buffer.
    TooLarge { needed: usize, capacity: usize },
    /// Outbound payload does not fit a 16-bit length.
    PayloadTooLong,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Unsupported64BitLength => f.write_str("64-bit frame length not supported"),
            FrameError::Unmasked => f.write_str("client frame without mask"),
            FrameError::TooLarge { needed, capacity } => {
                write!(f, "frame of {} bytes exceeds buffer of {}", needed, capacity)
            }
            FrameError::PayloadTooLong => f.write_str("payload longer than 65535 bytes"),
        }
    }
}

/// Registration into a fixed-size table failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteError {
    TableFull,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::TableFull => f.write_str("route table full"),
        }
    }
}

/// A persisted configuration record could not be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    BadLength,
    BadMagic,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BadLength => f.write_str("config record has wrong length"),
            ConfigError::BadMagic => f.write_str("config record magic mismatch"),
        }
    }
}
