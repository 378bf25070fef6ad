//! Shared SPI bus arbitration.
//!
//! The NIC, the configuration flash and the expansion port hang off one SPI
//! bus with separate chip selects. Exactly one chip select may be asserted at
//! a time and a transaction must never be interleaved with another device's.

use embedded_hal::digital::v2::OutputPin;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use crate::config::NetworkConfig;
use crate::error::NicError;
use crate::nic::{Lease, LeaseUpkeep, LinkStatus, NicDriver, SocketId, SocketStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peripheral {
    None,
    Nic,
    Flash,
    Expansion,
}

pub trait Bus {
    /// Deassert every other chip select, then assert `device`'s.
    fn select(&mut self, device: Peripheral);

    fn release(&mut self) {
        self.select(Peripheral::None);
    }

    fn selected(&self) -> Peripheral;

    /// Run `f` with `device` selected, releasing afterwards.
    fn transaction<R>(&mut self, device: Peripheral, f: impl FnOnce() -> R) -> R
    where
        Self: Sized,
    {
        self.select(device);
        let r = f();
        self.release();
        r
    }
}

/// Chip-select driver for the three bus devices. Chip selects are active low.
pub struct BusArbiter<P> {
    nic_cs: P,
    flash_cs: Option<P>,
    expansion_cs: Option<P>,
    selected: Peripheral,
}

impl<P: OutputPin> BusArbiter<P> {
    pub fn new(mut nic_cs: P, mut flash_cs: Option<P>, mut expansion_cs: Option<P>) -> Self {
        nic_cs.set_high().ok();
        if let Some(cs) = flash_cs.as_mut() {
            cs.set_high().ok();
        }
        if let Some(cs) = expansion_cs.as_mut() {
            cs.set_high().ok();
        }
        Self {
            nic_cs,
            flash_cs,
            expansion_cs,
            selected: Peripheral::None,
        }
    }

    fn pin(&mut self, device: Peripheral) -> Option<&mut P> {
        match device {
            Peripheral::None => None,
            Peripheral::Nic => Some(&mut self.nic_cs),
            Peripheral::Flash => self.flash_cs.as_mut(),
            Peripheral::Expansion => self.expansion_cs.as_mut(),
        }
    }
}

impl<P: OutputPin> Bus for BusArbiter<P> {
    fn select(&mut self, device: Peripheral) {
        for other in [Peripheral::Nic, Peripheral::Flash, Peripheral::Expansion] {
            if other != device {
                if let Some(cs) = self.pin(other) {
                    cs.set_high().ok();
                }
            }
        }
        if let Some(cs) = self.pin(device) {
            cs.set_low().ok();
        }
        self.selected = device;
    }

    fn selected(&self) -> Peripheral {
        self.selected
    }
}

/// A [`NicDriver`] whose every call is bracketed by NIC select and release.
///
/// Built fresh each main-loop iteration from the bus and the raw driver, and
/// handed to the engines in place of the raw driver.
pub struct Arbitrated<'a, B, D> {
    bus: &'a mut B,
    driver: &'a mut D,
}

impl<'a, B: Bus, D: NicDriver> Arbitrated<'a, B, D> {
    pub fn new(bus: &'a mut B, driver: &'a mut D) -> Self {
        Self { bus, driver }
    }

    fn with<R>(&mut self, f: impl FnOnce(&mut D) -> R) -> R {
        let driver = &mut *self.driver;
        self.bus.transaction(Peripheral::Nic, || f(driver))
    }
}

impl<'a, B: Bus, D: NicDriver> NicDriver for Arbitrated<'a, B, D> {
    fn probe(&mut self) -> Result<(), NicError> {
        self.with(|d| d.probe())
    }

    fn link_status(&mut self) -> LinkStatus {
        self.with(|d| d.link_status())
    }

    fn begin_soft_reset(&mut self) {
        self.with(|d| d.begin_soft_reset())
    }

    fn poll_soft_reset(&mut self) -> nb::Result<(), NicError> {
        self.with(|d| d.poll_soft_reset())
    }

    fn dhcp_lease(&mut self, mac: EthernetAddress, timeout_ms: u32) -> Result<Lease, NicError> {
        self.with(|d| d.dhcp_lease(mac, timeout_ms))
    }

    fn maintain_lease(&mut self) -> LeaseUpkeep {
        self.with(|d| d.maintain_lease())
    }

    fn configure_static(&mut self, mac: EthernetAddress, cfg: &NetworkConfig) {
        self.with(|d| d.configure_static(mac, cfg))
    }

    fn local_ip(&mut self) -> Ipv4Address {
        self.with(|d| d.local_ip())
    }

    fn socket_count(&self) -> usize {
        self.driver.socket_count()
    }

    fn socket_status(&mut self, sock: SocketId) -> SocketStatus {
        self.with(|d| d.socket_status(sock))
    }

    fn socket_port(&mut self, sock: SocketId) -> u16 {
        self.with(|d| d.socket_port(sock))
    }

    fn remote_ip(&mut self, sock: SocketId) -> Ipv4Address {
        self.with(|d| d.remote_ip(sock))
    }

    fn rx_available(&mut self, sock: SocketId) -> usize {
        self.with(|d| d.rx_available(sock))
    }

    fn tx_free(&mut self, sock: SocketId) -> usize {
        self.with(|d| d.tx_free(sock))
    }

    fn recv(&mut self, sock: SocketId, buf: &mut [u8]) -> usize {
        self.with(|d| d.recv(sock, buf))
    }

    fn send(&mut self, sock: SocketId, data: &[u8]) -> usize {
        self.with(|d| d.send(sock, data))
    }

    fn listen(&mut self, port: u16) -> Result<SocketId, NicError> {
        self.with(|d| d.listen(port))
    }

    fn disconnect(&mut self, sock: SocketId) {
        self.with(|d| d.disconnect(sock))
    }

    fn close(&mut self, sock: SocketId) {
        self.with(|d| d.close(sock))
    }
}
