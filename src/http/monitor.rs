//! Hardware socket health monitor.
//!
//! The chip runs its own TCP state machine and a cable pull can leave slots
//! wedged in half-closed states, or "established" to a peer that is gone.
//! Nothing else reclaims them, so every slot's status is shadowed with the
//! time it was first seen, and slots that sit still too long are closed.

use crate::config::HttpConfig;
use crate::nic::{self, NicDriver, SocketId, SocketStatus, MAX_SOCKETS};
use crate::time::{self, Stopwatch};

#[derive(Clone, Copy)]
struct Shadow {
    status: SocketStatus,
    port: u16,
    since: u32,
}

/// What one scan did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    pub closed: u8,
    pub listener_restarted: bool,
}

pub struct SocketMonitor {
    shadows: [Shadow; MAX_SOCKETS],
    timer: Stopwatch,
}

impl SocketMonitor {
    pub const fn new() -> Self {
        Self {
            shadows: [Shadow {
                status: SocketStatus::Closed,
                port: 0,
                since: 0,
            }; MAX_SOCKETS],
            timer: Stopwatch::started_at(0),
        }
    }

    /// Scan once every `monitor_interval_ms`.
    pub fn poll<N: NicDriver + ?Sized>(
        &mut self,
        nic: &mut N,
        cfg: &HttpConfig,
        active: Option<SocketId>,
        now: u32,
    ) -> Option<Sweep> {
        if self.timer.elapsed(now) < cfg.monitor_interval_ms {
            return None;
        }
        self.timer.restart(now);
        Some(self.check(nic, cfg, active, now))
    }

    /// One unthrottled scan. `active` is the socket currently serving a
    /// request, which is never reclaimed.
    pub fn check<N: NicDriver + ?Sized>(
        &mut self,
        nic: &mut N,
        cfg: &HttpConfig,
        active: Option<SocketId>,
        now: u32,
    ) -> Sweep {
        let mut sweep = Sweep::default();
        let count = nic.socket_count().min(MAX_SOCKETS);
        for (i, shadow) in self.shadows.iter_mut().enumerate().take(count) {
            let sock = i as SocketId;
            let status = nic.socket_status(sock);
            let port = nic.socket_port(sock);
            if status != shadow.status || port != shadow.port {
                *shadow = Shadow { status, port, since: now };
                continue;
            }
            if Some(sock) == active {
                continue;
            }
            let age = time::elapsed(now, shadow.since);
            let stale = if status.is_transitional() {
                age > cfg.stale_socket_ms
            } else {
                status == SocketStatus::Established
                    && port == cfg.port
                    && age > 2 * cfg.stale_socket_ms
                    && nic.rx_available(sock) == 0
            };
            if stale {
                log::warn!("http: socket {} stuck in {} for {} ms, closing", sock, status, age);
                nic.close(sock);
                *shadow = Shadow {
                    status: SocketStatus::Closed,
                    port: 0,
                    since: now,
                };
                sweep.closed += 1;
            }
        }
        if !nic::is_listening(nic, cfg.port) {
            match nic.listen(cfg.port) {
                Ok(sock) => {
                    log::warn!("http: no listener on {}, restarted on socket {}", cfg.port, sock);
                    sweep.listener_restarted = true;
                }
                Err(err) => log::error!("http: listener restart failed: {}", err),
            }
        }
        sweep
    }
}

impl Default for SocketMonitor {
    fn default() -> Self {
        Self::new()
    }
}
