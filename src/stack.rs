//! The whole network side of the firmware main loop.
//!
//! ```ignore
//! loop {
//!     let net = stack.poll(&mut bus, &mut w5500, &mut hooks, &mut app, millis());
//!     if net.ready {
//!         stack.ws.emit("temp", &reading);
//!     }
//!     // rest of the firmware
//! }
//! ```

use embedded_hal::digital::v2::OutputPin;
use smoltcp::wire::EthernetAddress;

use crate::bus::{Arbitrated, Bus};
use crate::config::{HttpConfig, NetworkConfig, SupervisorTimings, WsConfig};
use crate::error::RouteError;
use crate::http::{status, HttpServer};
use crate::link::{LinkHooks, LinkSupervisor, NetworkStatus};
use crate::nic::NicDriver;
use crate::ws::WsServer;

/// Supervisor plus both engines, sharing one NIC behind the bus arbiter.
///
/// `C` is the application context handed to HTTP handlers and WebSocket
/// message callbacks.
pub struct NetStack<R, C> {
    pub link: LinkSupervisor<R>,
    pub http: HttpServer<C>,
    pub ws: WsServer<C>,
}

impl<R: OutputPin, C> NetStack<R, C> {
    /// Builds the stack with the status endpoints already routed.
    pub fn new(
        reset_pin: R,
        mac: EthernetAddress,
        config: NetworkConfig,
        timings: SupervisorTimings,
        http: HttpConfig,
        ws: WsConfig,
    ) -> Result<Self, RouteError> {
        let link = LinkSupervisor::new(reset_pin, mac, config, timings, &[http.port, ws.port]);
        let mut http = HttpServer::new(http);
        status::install(http.router())?;
        Ok(Self {
            link,
            http,
            ws: WsServer::new(ws),
        })
    }

    /// One main-loop step: supervisor first, then HTTP, then WebSocket.
    /// Every NIC access inside goes through the bus arbiter.
    pub fn poll<B, D, H>(&mut self, bus: &mut B, driver: &mut D, hooks: &mut H, ctx: &mut C, now: u32) -> NetworkStatus
    where
        B: Bus,
        D: NicDriver,
        H: LinkHooks,
    {
        let mut nic = Arbitrated::new(bus, driver);
        self.link.update(&mut nic, hooks, now);
        let net = self.link.status();
        self.http.update(&mut nic, &net, ctx, now);
        self.ws.update(&mut nic, &net, ctx, now);
        net
    }
}
