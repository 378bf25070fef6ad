//! Device identity: MAC address and network name from the MCU unique ID.

use core::fmt::Write;

use heapless::String;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

/// Vendor prefix for all boards of this family. Bit 1 of the first byte marks
/// the address as locally administered.
pub const VENDOR_PREFIX: u8 = 0x1E;

pub const NAME_LEN: usize = 24;

/// Derive a unicast MAC from the 96-bit MCU unique ID.
///
/// Format: 1E:bb:xx:xx:xx:xx where `bb` identifies the board and the 4 payload
/// bytes are an XOR fold of the UID, so boards from the same wafer lot still
/// differ.
pub fn derive_mac(uid: &[u8; 12], board: u8) -> EthernetAddress {
    let mut mac = [VENDOR_PREFIX, board, 0, 0, 0, 0];
    for i in 0..4 {
        mac[i + 2] = uid[i] ^ uid[i + 4] ^ uid[i + 8];
    }
    EthernetAddress(mac)
}

/// `<MODEL>-XXXXXXXXXX`: the model name and the last five MAC bytes in hex.
pub fn device_name(model: &str, mac: &EthernetAddress) -> String<NAME_LEN> {
    let mut name = String::new();
    let m = mac.0;
    write!(
        name,
        "{}-{:02X}{:02X}{:02X}{:02X}{:02X}",
        model, m[1], m[2], m[3], m[4], m[5]
    )
    .ok();
    name
}

pub fn format_mac(mac: &EthernetAddress) -> String<17> {
    let mut s = String::new();
    let m = mac.0;
    write!(
        s,
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        m[0], m[1], m[2], m[3], m[4], m[5]
    )
    .ok();
    s
}

pub fn format_ip(ip: &Ipv4Address) -> String<15> {
    let mut s = String::new();
    let a = ip.0;
    write!(s, "{}.{}.{}.{}", a[0], a[1], a[2], a[3]).ok();
    s
}
