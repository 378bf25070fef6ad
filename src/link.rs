//! Link supervisor: NIC bring-up, addressing and recovery.
//!
//! One bounded step per [`LinkSupervisor::update`]. Every wait is a state plus
//! a stopwatch checked on the next call; the DHCP exchange is the only call
//! that blocks, and only up to `dhcp_timeout_ms`.

use core::fmt;

use embedded_hal::digital::v2::OutputPin;
use heapless::Vec;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

use crate::config::{NetworkConfig, SupervisorTimings};
use crate::nic::{self, Lease, LeaseUpkeep, LinkStatus, NicDriver};
use crate::time::{self, Stopwatch};

pub const MAX_SERVICE_PORTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    HardResetStart,
    HardResetLow,
    HardResetWait,
    SoftResetStart,
    SoftResetWait,
    InitStart,
    InitCheckLink,
    InitDhcp,
    InitStatic,
    InitServerStart,
    InitComplete,
    Idle,
    Disconnected,
    Error,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::HardResetStart => "HARD_RESET_START",
            LinkState::HardResetLow => "HARD_RESET_LOW",
            LinkState::HardResetWait => "HARD_RESET_WAIT",
            LinkState::SoftResetStart => "SOFT_RESET_START",
            LinkState::SoftResetWait => "SOFT_RESET_WAIT",
            LinkState::InitStart => "INIT_START",
            LinkState::InitCheckLink => "INIT_CHECK_LINK",
            LinkState::InitDhcp => "INIT_DHCP",
            LinkState::InitStatic => "INIT_STATIC",
            LinkState::InitServerStart => "INIT_SERVER_START",
            LinkState::InitComplete => "INIT_COMPLETE",
            LinkState::Idle => "IDLE",
            LinkState::Disconnected => "DISCONNECTED",
            LinkState::Error => "ERROR",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators the supervisor notifies. All methods default to no-ops.
#[cfg_attr(test, mockall::automock)]
pub trait LinkHooks {
    /// Persist the addressing record (DHCP lease taken, mode switched).
    fn store_network_config(&mut self, _cfg: &NetworkConfig) {}
    /// Link up, addressed and listening. OTA and time sync re-bind here.
    fn on_network_ready(&mut self, _ip: Ipv4Address) {}
    fn on_link_lost(&mut self) {}
    /// The NIC stopped answering on the bus while the link was down.
    fn recover_bus(&mut self) {}
}

/// Hooks for boards with nothing to notify.
pub struct NoHooks;

impl LinkHooks for NoHooks {}

/// Snapshot of the supervisor for the engines and the status endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkStatus {
    pub state: LinkState,
    pub ready: bool,
    pub busy: bool,
    pub link: LinkStatus,
    pub server: bool,
    pub ip: Ipv4Address,
    pub mac: EthernetAddress,
    pub init_cycles: u32,
    pub retries: u8,
    pub hard_resets: u32,
    pub soft_resets: u32,
}

pub struct LinkSupervisor<R> {
    reset_pin: R,
    mac: EthernetAddress,
    config: NetworkConfig,
    timings: SupervisorTimings,
    ports: Vec<u16, MAX_SERVICE_PORTS>,

    state: LinkState,
    timer: Stopwatch,
    last_hard_reset: Option<u32>,
    link: LinkStatus,
    ip: Ipv4Address,
    link_established: bool,
    server_ready: bool,

    retries: u8,
    errors: u8,
    init_cycles: u32,
    hard_resets: u32,
    soft_resets: u32,
}

impl<R: OutputPin> LinkSupervisor<R> {
    /// `ports` are the service ports that get a listener once addressed.
    pub fn new(
        mut reset_pin: R,
        mac: EthernetAddress,
        config: NetworkConfig,
        timings: SupervisorTimings,
        ports: &[u16],
    ) -> Self {
        reset_pin.set_high().ok();
        let mut list = Vec::new();
        for &port in ports {
            if list.push(port).is_err() {
                log::warn!("link: service port {} ignored, table full", port);
            }
        }
        Self {
            reset_pin,
            mac,
            config,
            timings,
            ports: list,
            state: LinkState::InitStart,
            timer: Stopwatch::default(),
            last_hard_reset: None,
            link: LinkStatus::Unknown,
            ip: Ipv4Address::UNSPECIFIED,
            link_established: false,
            server_ready: false,
            retries: 0,
            errors: 0,
            init_cycles: 0,
            hard_resets: 0,
            soft_resets: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Idle && self.link_established && self.server_ready
    }

    pub fn is_busy(&self) -> bool {
        !matches!(
            self.state,
            LinkState::Idle | LinkState::Disconnected | LinkState::Error
        )
    }

    pub fn status(&self) -> NetworkStatus {
        NetworkStatus {
            state: self.state,
            ready: self.is_ready(),
            busy: self.is_busy(),
            link: self.link,
            server: self.server_ready,
            ip: self.ip,
            mac: self.mac,
            init_cycles: self.init_cycles,
            retries: self.retries,
            hard_resets: self.hard_resets,
            soft_resets: self.soft_resets,
        }
    }

    /// Pulse the NIC reset line. Without `force`, a request within
    /// `hard_reset_min_interval_ms` of the previous pulse soft-resets instead.
    pub fn request_hard_reset(&mut self, force: bool, now: u32) {
        let throttled = self
            .last_hard_reset
            .map_or(false, |at| time::elapsed(now, at) < self.timings.hard_reset_min_interval_ms);
        if throttled && !force {
            log::warn!("link: hard reset rate limited, soft reset instead");
            self.enter(LinkState::SoftResetStart, now);
        } else {
            self.enter(LinkState::HardResetStart, now);
        }
    }

    /// Replace the addressing, persist it and restart bring-up.
    pub fn apply_config(&mut self, cfg: NetworkConfig, hooks: &mut impl LinkHooks, now: u32) {
        self.config = cfg;
        hooks.store_network_config(&self.config);
        self.drop_service();
        self.enter(LinkState::SoftResetStart, now);
    }

    pub fn update<N, H>(&mut self, nic: &mut N, hooks: &mut H, now: u32)
    where
        N: NicDriver + ?Sized,
        H: LinkHooks + ?Sized,
    {
        let t = self.timings;
        match self.state {
            LinkState::HardResetStart => {
                self.drop_service();
                self.reset_pin.set_low().ok();
                self.hard_resets += 1;
                self.last_hard_reset = Some(now);
                self.enter(LinkState::HardResetLow, now);
            }
            LinkState::HardResetLow => {
                if self.timer.elapsed(now) >= t.reset_low_ms {
                    self.reset_pin.set_high().ok();
                    self.enter(LinkState::HardResetWait, now);
                }
            }
            LinkState::HardResetWait => {
                if self.timer.elapsed(now) >= t.reset_settle_ms {
                    self.enter(LinkState::SoftResetStart, now);
                }
            }
            LinkState::SoftResetStart => {
                self.drop_service();
                nic.begin_soft_reset();
                self.soft_resets += 1;
                self.enter(LinkState::SoftResetWait, now);
            }
            LinkState::SoftResetWait => match nic.poll_soft_reset() {
                Ok(()) => self.enter(LinkState::InitStart, now),
                Err(nb::Error::WouldBlock) => {
                    if self.timer.expired(now, t.soft_reset_timeout_ms) {
                        log::error!("link: soft reset did not complete");
                        self.fail(now);
                    }
                }
                Err(nb::Error::Other(err)) => {
                    log::error!("link: soft reset: {}", err);
                    self.fail(now);
                }
            },
            LinkState::InitStart => {
                self.init_cycles += 1;
                match nic.probe() {
                    Ok(()) => {
                        self.retries = 0;
                        self.enter(LinkState::InitCheckLink, now);
                    }
                    Err(err) => {
                        log::error!("link: probe: {}", err);
                        self.fail(now);
                    }
                }
            }
            LinkState::InitCheckLink => {
                self.link = nic.link_status();
                match self.link {
                    LinkStatus::On if self.config.dhcp_enabled => {
                        self.enter(LinkState::InitDhcp, now)
                    }
                    LinkStatus::On => self.enter(LinkState::InitStatic, now),
                    LinkStatus::Off => self.enter(LinkState::Disconnected, now),
                    LinkStatus::Unknown => {
                        if self.timer.expired(now, t.link_unknown_timeout_ms) {
                            log::warn!("link: PHY status unknown, forcing hard reset");
                            self.request_hard_reset(true, now);
                        }
                    }
                }
            }
            LinkState::InitDhcp => match nic.dhcp_lease(self.mac, t.dhcp_timeout_ms) {
                Ok(lease) => {
                    log::info!("link: DHCP lease {}", lease.ip);
                    self.retries = 0;
                    self.ip = lease.ip;
                    if self.take_lease(&lease) {
                        hooks.store_network_config(&self.config);
                    }
                    self.enter(LinkState::InitServerStart, now);
                }
                Err(err) => {
                    self.retries += 1;
                    log::warn!("link: {} (attempt {}/{})", err, self.retries, t.dhcp_max_retries);
                    if self.retries >= t.dhcp_max_retries {
                        self.retries = 0;
                        self.config.dhcp_enabled = false;
                        hooks.store_network_config(&self.config);
                        self.enter(LinkState::InitStatic, now);
                    }
                }
            },
            LinkState::InitStatic => {
                nic.configure_static(self.mac, &self.config);
                self.ip = nic.local_ip();
                if self.ip.is_unspecified() {
                    log::warn!("link: static address rejected, switching to DHCP");
                    self.config.dhcp_enabled = true;
                    hooks.store_network_config(&self.config);
                    self.enter(LinkState::InitDhcp, now);
                } else {
                    log::info!("link: static address {}", self.ip);
                    self.enter(LinkState::InitServerStart, now);
                }
            }
            LinkState::InitServerStart => {
                if self.timer.elapsed(now) < t.server_settle_ms {
                    return;
                }
                for i in 0..self.ports.len() {
                    let port = self.ports[i];
                    if nic::is_listening(nic, port) {
                        continue;
                    }
                    if let Err(err) = nic.listen(port) {
                        log::error!("link: listen on {}: {}", port, err);
                        self.fail(now);
                        return;
                    }
                }
                self.server_ready = true;
                self.enter(LinkState::InitComplete, now);
            }
            LinkState::InitComplete => {
                self.link_established = true;
                self.errors = 0;
                log::info!("link: network ready at {}", self.ip);
                hooks.on_network_ready(self.ip);
                self.enter(LinkState::Idle, now);
            }
            LinkState::Idle => {
                if self.timer.elapsed(now) < t.idle_poll_ms {
                    return;
                }
                self.timer.restart(now);
                self.link = nic.link_status();
                if self.link != LinkStatus::On {
                    log::warn!("link: cable lost");
                    self.drop_service();
                    hooks.on_link_lost();
                    self.enter(LinkState::Disconnected, now);
                } else if self.config.dhcp_enabled {
                    self.maintain_lease(nic, hooks);
                }
            }
            LinkState::Disconnected => {
                if self.timer.elapsed(now) < t.disconnected_poll_ms {
                    return;
                }
                self.timer.restart(now);
                if let Err(err) = nic.probe() {
                    log::warn!("link: {}, recovering bus", err);
                    hooks.recover_bus();
                    return;
                }
                self.link = nic.link_status();
                if self.link == LinkStatus::On {
                    log::info!("link: cable back");
                    self.enter(LinkState::InitStart, now);
                }
            }
            LinkState::Error => {
                if self.timer.elapsed(now) < t.error_retry_ms {
                    return;
                }
                if self.errors >= t.max_error_retries {
                    log::error!("link: {} consecutive failures, hard reset", self.errors);
                    self.errors = 0;
                    self.request_hard_reset(true, now);
                } else {
                    self.enter(LinkState::InitStart, now);
                }
            }
        }
    }

    fn maintain_lease<N, H>(&mut self, nic: &mut N, hooks: &mut H)
    where
        N: NicDriver + ?Sized,
        H: LinkHooks + ?Sized,
    {
        match nic.maintain_lease() {
            LeaseUpkeep::Renewed(lease) | LeaseUpkeep::Rebound(lease) => {
                self.ip = lease.ip;
                if self.take_lease(&lease) {
                    log::info!("link: lease changed to {}", lease.ip);
                    hooks.store_network_config(&self.config);
                }
            }
            LeaseUpkeep::RenewFailed => log::warn!("link: DHCP renew failed"),
            LeaseUpkeep::RebindFailed => log::warn!("link: DHCP rebind failed"),
            LeaseUpkeep::Nothing => {}
        }
    }

    /// Copy lease addressing into the config; true if anything changed.
    fn take_lease(&mut self, lease: &Lease) -> bool {
        let next = NetworkConfig {
            dhcp_enabled: true,
            ip: lease.ip,
            subnet: lease.subnet,
            gateway: lease.gateway,
            dns: lease.dns,
        };
        let changed = next != self.config;
        self.config = next;
        changed
    }

    fn drop_service(&mut self) {
        self.link_established = false;
        self.server_ready = false;
    }

    fn fail(&mut self, now: u32) {
        self.errors = self.errors.saturating_add(1);
        self.drop_service();
        self.enter(LinkState::Error, now);
    }

    fn enter(&mut self, next: LinkState, now: u32) {
        if next != self.state {
            log::info!("link: {} -> {}", self.state, next);
        }
        self.state = next;
        self.timer.restart(now);
    }
}
