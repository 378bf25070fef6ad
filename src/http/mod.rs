//! Single-connection HTTP/1.0-style server.
//!
//! One request in flight, `Connection: close` on every response. Each
//! [`HttpServer::update`] performs one state transition at most, so no call
//! waits on the network. A response larger than the socket's transmit buffer
//! is fed out from `Sending` over as many updates as the peer needs.

pub mod monitor;
pub mod request;
pub mod response;
pub mod router;
pub mod status;

use crate::config::HttpConfig;
use crate::link::NetworkStatus;
use crate::nic::{self, NicDriver, SocketId, SocketStatus};
use crate::time::Stopwatch;

pub use monitor::{SocketMonitor, Sweep};
pub use request::{Method, Parse, Request};
pub use response::{Outbox, Responder};
pub use router::{Handler, Route, Router, StaticFile};

const READ_CHUNK: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpState {
    Waiting,
    Receiving,
    Processing,
    Handling,
    Sending,
    Failed,
    Closing,
    ForceClosing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub requests_success: u32,
    pub requests_failed: u32,
    pub server_restarts: u32,
    /// Stale or half-closed sockets closed by the health monitor.
    pub sockets_reclaimed: u32,
}

impl ServerStats {
    pub const fn new() -> Self {
        Self {
            requests_success: 0,
            requests_failed: 0,
            server_restarts: 0,
            sockets_reclaimed: 0,
        }
    }
}

pub struct HttpServer<C> {
    config: HttpConfig,
    router: Router<C>,
    monitor: SocketMonitor,
    stats: ServerStats,

    state: HttpState,
    timer: Stopwatch,
    accepted: Stopwatch,
    head_done: Option<Stopwatch>,
    sock: Option<SocketId>,
    request: Request,
    route: Option<Route<C>>,
    out: Outbox,
    /// Status of a handled request whose response is still going out.
    reply: Option<u16>,
    disconnect_sent: bool,
}

impl<C> HttpServer<C> {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            monitor: SocketMonitor::new(),
            stats: ServerStats::new(),
            state: HttpState::Waiting,
            timer: Stopwatch::default(),
            accepted: Stopwatch::default(),
            head_done: None,
            sock: None,
            request: Request::new(),
            route: None,
            out: Outbox::new(),
            reply: None,
            disconnect_sent: false,
        }
    }

    pub fn router(&mut self) -> &mut Router<C> {
        &mut self.router
    }

    pub fn state(&self) -> HttpState {
        self.state
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Run the socket health scan now, regardless of its interval.
    pub fn check_sockets<N: NicDriver + ?Sized>(&mut self, nic: &mut N, now: u32) -> Sweep {
        let sweep = self.monitor.check(nic, &self.config, self.sock, now);
        self.count_sweep(sweep);
        sweep
    }

    fn count_sweep(&mut self, sweep: Sweep) {
        self.stats.sockets_reclaimed += sweep.closed as u32;
        if sweep.listener_restarted {
            self.stats.server_restarts += 1;
        }
    }

    pub fn update<N: NicDriver>(&mut self, nic: &mut N, net: &NetworkStatus, ctx: &mut C, now: u32) {
        if !net.ready {
            if let Some(sock) = self.sock.take() {
                log::warn!("http: network down, dropping socket {}", sock);
                nic.close(sock);
            }
            self.abandon_reply();
            if self.state != HttpState::Waiting {
                self.enter(HttpState::Waiting, now);
            }
            return;
        }

        if let Some(sweep) = self.monitor.poll(nic, &self.config, self.sock, now) {
            self.count_sweep(sweep);
        }

        match self.state {
            HttpState::Waiting => self.accept(nic, now),
            HttpState::Receiving => self.receive(nic, net, now),
            HttpState::Processing => {
                self.route = self.router.lookup(self.request.method(), self.request.path());
                if self.route.is_some() {
                    self.enter(HttpState::Handling, now);
                } else {
                    self.enter(HttpState::Failed, now);
                }
            }
            HttpState::Handling => self.handle(nic, net, ctx, now),
            HttpState::Sending => self.send_rest(nic, now),
            HttpState::Failed => {
                self.stats.requests_failed += 1;
                log::info!("http: {} {} not found", self.request.method().as_str(), self.request.uri());
                if let Some(sock) = self.sock {
                    let mut resp =
                        Responder::new(nic, sock, self.config.response_chunk, &mut self.out, net, self.stats);
                    match self.router.not_found() {
                        Some(handler) => handler(&self.request, &mut resp, ctx),
                        None => resp.send_str(404, "text/plain", "Not Found"),
                    }
                    resp.finish();
                }
                self.deliver(now);
            }
            HttpState::Closing => self.close(nic, now),
            HttpState::ForceClosing => {
                if let Some(sock) = self.sock.take() {
                    log::warn!("http: socket {} did not close, forcing", sock);
                    nic.close(sock);
                }
                self.abandon_reply();
                self.enter(HttpState::Waiting, now);
            }
        }
    }

    fn accept<N: NicDriver>(&mut self, nic: &mut N, now: u32) {
        let port = self.config.port;
        let Some(sock) = nic::find_connected(nic, port, |n, s| n.rx_available(s) > 0) else {
            return;
        };
        let remote = nic.remote_ip(sock);
        log::debug!("http: socket {} accepted from {}", sock, remote);
        self.sock = Some(sock);
        self.request.reset(remote);
        self.head_done = None;
        self.route = None;
        self.out.reset();
        self.reply = None;
        self.accepted.restart(now);
        self.enter(HttpState::Receiving, now);

        // The accepted slot was the listener; open another for the next client.
        if !nic::is_listening(nic, port) {
            if let Err(err) = nic.listen(port) {
                log::warn!("http: relisten on {}: {}", port, err);
            }
        }
    }

    fn receive<N: NicDriver>(&mut self, nic: &mut N, net: &NetworkStatus, now: u32) {
        let Some(sock) = self.sock else {
            self.enter(HttpState::Waiting, now);
            return;
        };

        let mut buf = [0u8; READ_CHUNK];
        let mut outcome = Parse::NeedMore;
        while outcome == Parse::NeedMore {
            let avail = nic.rx_available(sock);
            if avail == 0 {
                break;
            }
            let n = nic.recv(sock, &mut buf[..avail.min(READ_CHUNK)]);
            if n == 0 {
                break;
            }
            outcome = self.request.feed(&buf[..n]);
        }
        if self.head_done.is_none() && self.request.head_complete() {
            self.head_done = Some(Stopwatch::started_at(now));
        }

        match outcome {
            Parse::Complete => self.enter(HttpState::Processing, now),
            Parse::Reject(code) => {
                log::info!("http: socket {} rejected with {}", sock, code);
                self.reject(nic, net, sock, code, now);
            }
            Parse::NeedMore => {
                if let Some(body) = self.head_done {
                    if body.expired(now, self.config.body_timeout_ms) {
                        log::debug!("http: body short of {} bytes, handling what arrived", self.request.content_length());
                        self.enter(HttpState::Processing, now);
                    }
                } else if self.accepted.expired(now, self.config.request_timeout_ms) {
                    log::info!("http: socket {} request timeout", sock);
                    self.reject(nic, net, sock, 408, now);
                } else if !nic.socket_status(sock).is_connected() {
                    log::debug!("http: socket {} left mid-request", sock);
                    self.stats.requests_failed += 1;
                    self.enter(HttpState::Closing, now);
                }
            }
        }
    }

    fn reject<N: NicDriver>(&mut self, nic: &mut N, net: &NetworkStatus, sock: SocketId, code: u16, now: u32) {
        self.stats.requests_failed += 1;
        let text = match code {
            400 => "Bad Request",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            _ => "Error",
        };
        let mut resp = Responder::new(nic, sock, self.config.response_chunk, &mut self.out, net, self.stats);
        resp.send_str(code, "text/plain", text);
        resp.finish();
        self.deliver(now);
    }

    fn handle<N: NicDriver>(&mut self, nic: &mut N, net: &NetworkStatus, ctx: &mut C, now: u32) {
        let (Some(sock), Some(route)) = (self.sock, self.route.take()) else {
            self.enter(HttpState::Closing, now);
            return;
        };
        let mut resp = Responder::new(nic, sock, self.config.response_chunk, &mut self.out, net, self.stats);
        match route {
            Route::Handler(handler) => handler(&self.request, &mut resp, ctx),
            Route::File(file) => resp.send_static(200, file.content_type, file.body),
        }
        let (status, _) = resp.finish();
        self.reply = Some(status.unwrap_or(0));
        self.deliver(now);
    }

    /// Close once the NIC holds the whole response, otherwise keep feeding it.
    fn deliver(&mut self, now: u32) {
        if self.out.is_empty() {
            self.complete(now);
        } else {
            log::debug!("http: {} response bytes wait for the socket", self.out.pending());
            self.enter(HttpState::Sending, now);
        }
    }

    fn send_rest<N: NicDriver>(&mut self, nic: &mut N, now: u32) {
        let Some(sock) = self.sock else {
            self.abandon_reply();
            self.enter(HttpState::Waiting, now);
            return;
        };
        if !nic.socket_status(sock).is_connected() {
            log::info!("http: socket {} left with {} bytes unsent", sock, self.out.pending());
            self.abandon_reply();
            self.enter(HttpState::Closing, now);
            return;
        }
        if self.out.pump(nic, sock, self.config.response_chunk) > 0 {
            self.timer.restart(now);
        }
        if self.out.is_empty() {
            self.complete(now);
        } else if self.timer.expired(now, self.config.send_timeout_ms) {
            log::warn!("http: socket {} stopped reading, {} bytes unsent", sock, self.out.pending());
            self.abandon_reply();
            self.enter(HttpState::ForceClosing, now);
        }
    }

    /// The whole response is with the NIC.
    fn complete(&mut self, now: u32) {
        if let Some(status) = self.reply.take() {
            if self.out.overflowed() {
                self.stats.requests_failed += 1;
                log::warn!("http: {} response cut short", self.request.uri());
            } else {
                self.stats.requests_success += 1;
                log::info!(
                    "http: {} {} -> {} ({} bytes, {} ms)",
                    self.request.method().as_str(),
                    self.request.uri(),
                    status,
                    self.out.sent(),
                    self.accepted.elapsed(now)
                );
            }
        }
        self.enter(HttpState::Closing, now);
    }

    fn abandon_reply(&mut self) {
        if self.reply.take().is_some() {
            self.stats.requests_failed += 1;
        }
        self.out.reset();
    }

    fn close<N: NicDriver>(&mut self, nic: &mut N, now: u32) {
        let Some(sock) = self.sock else {
            self.enter(HttpState::Waiting, now);
            return;
        };
        if !self.disconnect_sent {
            nic.disconnect(sock);
            self.disconnect_sent = true;
        }
        if nic.socket_status(sock) == SocketStatus::Closed {
            self.sock = None;
            self.enter(HttpState::Waiting, now);
        } else if self.timer.expired(now, self.config.close_timeout_ms) {
            self.enter(HttpState::ForceClosing, now);
        }
    }

    fn enter(&mut self, next: HttpState, now: u32) {
        log::trace!("http: {:?} -> {:?}", self.state, next);
        if next == HttpState::Closing {
            self.disconnect_sent = false;
        }
        self.state = next;
        self.timer.restart(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkState;
    use crate::nic::LinkStatus;
    use crate::sim::SimNic;
    use smoltcp::wire::{EthernetAddress, Ipv4Address};

    const PEER: Ipv4Address = Ipv4Address([10, 0, 0, 9]);

    #[derive(Default)]
    struct Ctx {
        hits: u32,
        body: heapless::String<64>,
    }

    fn hello(_: &Request, resp: &mut Responder<'_>, ctx: &mut Ctx) {
        ctx.hits += 1;
        resp.send_str(200, "text/plain", "hello");
    }

    fn echo(req: &Request, resp: &mut Responder<'_>, ctx: &mut Ctx) {
        ctx.hits += 1;
        ctx.body.push_str(req.body_str()).ok();
        resp.send(200, "application/json", req.body());
    }

    fn teapot(_: &Request, resp: &mut Responder<'_>, _: &mut Ctx) {
        resp.send_str(418, "text/plain", "short and stout");
    }

    fn net(ready: bool) -> NetworkStatus {
        NetworkStatus {
            state: LinkState::Idle,
            ready,
            busy: false,
            link: LinkStatus::On,
            server: ready,
            ip: Ipv4Address([10, 0, 0, 42]),
            mac: EthernetAddress([0x1E, 0x07, 1, 2, 3, 4]),
            init_cycles: 1,
            retries: 0,
            hard_resets: 0,
            soft_resets: 0,
        }
    }

    fn server() -> HttpServer<Ctx> {
        let mut srv = HttpServer::new(HttpConfig::new());
        srv.router().get("/hello", hello).unwrap();
        srv.router().post("/echo", echo).unwrap();
        srv.router().alias("/", "/hello").unwrap();
        srv.router().serve_file("/app.css", b"body{}").unwrap();
        status::install(srv.router()).unwrap();
        srv
    }

    fn listening_nic() -> SimNic {
        let mut nic = SimNic::new();
        nic.listen(80).ok();
        nic
    }

    /// Step every ms until the server is back in `Waiting` (or `limit`).
    fn run_until_waiting(
        srv: &mut HttpServer<Ctx>,
        nic: &mut SimNic,
        ctx: &mut Ctx,
        mut now: u32,
        limit: u32,
    ) -> u32 {
        let n = net(true);
        srv.update(nic, &n, ctx, now);
        while srv.state() != HttpState::Waiting && now < limit {
            now += 1;
            srv.update(nic, &n, ctx, now);
        }
        now
    }

    fn sent_text(nic: &SimNic, sock: SocketId) -> std::string::String {
        std::string::String::from_utf8_lossy(nic.socket(sock).sent()).into_owned()
    }

    #[test]
    fn handler_runs_once_and_server_returns_to_waiting() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

        run_until_waiting(&mut srv, &mut nic, &mut ctx, 0, 100);

        assert_eq!(ctx.hits, 1);
        assert_eq!(srv.state(), HttpState::Waiting);
        assert_eq!(srv.stats().requests_success, 1);
        assert!(sent_text(&nic, sock).ends_with("\r\n\r\nhello"));
        assert_eq!(nic.socket_status(sock), SocketStatus::Closed);
        assert!(nic::is_listening(&mut nic, 80));
    }

    #[test]
    fn alias_and_post_body() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let now = run_until_waiting(&mut srv, &mut nic, &mut ctx, 0, 100);
        assert!(sent_text(&nic, sock).ends_with("hello"));

        let sock = nic
            .connect(80, PEER, b"POST /echo HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"a\":1}")
            .unwrap();
        run_until_waiting(&mut srv, &mut nic, &mut ctx, now + 1, now + 100);
        assert_eq!(ctx.hits, 2);
        assert_eq!(ctx.body.as_str(), "{\"a\":1}");
        assert!(sent_text(&nic, sock).contains("Content-Type: application/json"));
    }

    #[test]
    fn static_file_served_with_type() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /app.css HTTP/1.1\r\n\r\n").unwrap();
        run_until_waiting(&mut srv, &mut nic, &mut ctx, 0, 100);
        let text = sent_text(&nic, sock);
        assert!(text.contains("Content-Type: text/css\r\n"));
        assert!(text.contains("Content-Length: 6\r\n"));
        assert!(text.ends_with("body{}"));
    }

    #[test]
    fn unknown_uri_gets_404_then_custom_handler() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /nope HTTP/1.1\r\n\r\n").unwrap();
        let now = run_until_waiting(&mut srv, &mut nic, &mut ctx, 0, 100);
        assert!(sent_text(&nic, sock).starts_with("HTTP/1.1 404 NOT OK\r\n"));
        assert_eq!(srv.stats().requests_failed, 1);
        assert_eq!(srv.state(), HttpState::Waiting);

        srv.router().set_not_found(teapot);
        let sock = nic.connect(80, PEER, b"GET /nope HTTP/1.1\r\n\r\n").unwrap();
        run_until_waiting(&mut srv, &mut nic, &mut ctx, now + 1, now + 100);
        assert!(sent_text(&nic, sock).starts_with("HTTP/1.1 418 NOT OK\r\n"));
        assert_eq!(srv.stats().requests_failed, 2);
        assert_eq!(ctx.hits, 0);
    }

    #[test]
    fn stalled_request_times_out_with_408() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /hel").unwrap();

        let n = net(true);
        srv.update(&mut nic, &n, &mut ctx, 0);
        assert_eq!(srv.state(), HttpState::Receiving);
        srv.update(&mut nic, &n, &mut ctx, 500);
        assert_eq!(srv.state(), HttpState::Receiving);
        srv.update(&mut nic, &n, &mut ctx, 501);
        assert_eq!(srv.state(), HttpState::Closing);
        run_until_waiting(&mut srv, &mut nic, &mut ctx, 502, 600);

        assert_eq!(srv.stats().requests_failed, 1);
        assert_eq!(ctx.hits, 0);
        assert!(sent_text(&nic, sock).starts_with("HTTP/1.1 408 NOT OK\r\n"));
    }

    #[test]
    fn unsupported_method_gets_405() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"PUT /hello HTTP/1.1\r\n\r\n").unwrap();
        run_until_waiting(&mut srv, &mut nic, &mut ctx, 0, 100);
        assert!(sent_text(&nic, sock).starts_with("HTTP/1.1 405 NOT OK\r\n"));
        assert_eq!(srv.stats().requests_failed, 1);
        assert_eq!(ctx.hits, 0);
    }

    #[test]
    fn lingering_close_is_forced() {
        let mut srv = server();
        let mut nic = listening_nic();
        nic.graceful_close = false;
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /hello HTTP/1.1\r\n\r\n").unwrap();

        let n = net(true);
        let mut now = 0;
        while srv.state() != HttpState::Closing {
            srv.update(&mut nic, &n, &mut ctx, now);
            now += 1;
        }
        srv.update(&mut nic, &n, &mut ctx, now);
        assert_eq!(nic.socket_status(sock), SocketStatus::FinWait);
        srv.update(&mut nic, &n, &mut ctx, now + 51);
        assert_eq!(srv.state(), HttpState::ForceClosing);
        srv.update(&mut nic, &n, &mut ctx, now + 52);
        assert_eq!(srv.state(), HttpState::Waiting);
        assert_eq!(nic.socket(sock).closes, 1);
        assert_eq!(nic.socket(sock).disconnects, 1);
    }

    #[test]
    fn nothing_happens_until_network_ready() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        nic.connect(80, PEER, b"GET /hello HTTP/1.1\r\n\r\n").unwrap();
        srv.update(&mut nic, &net(false), &mut ctx, 0);
        assert_eq!(srv.state(), HttpState::Waiting);
        srv.update(&mut nic, &net(true), &mut ctx, 1);
        assert_eq!(srv.state(), HttpState::Receiving);
        srv.update(&mut nic, &net(false), &mut ctx, 2);
        assert_eq!(srv.state(), HttpState::Waiting);
    }

    #[test]
    fn status_endpoints() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /api/network-status HTTP/1.1\r\n\r\n").unwrap();
        let now = run_until_waiting(&mut srv, &mut nic, &mut ctx, 0, 100);
        let text = sent_text(&nic, sock);
        assert!(text.contains(r#""state":"IDLE","ready":true"#));
        assert!(text.contains(r#""link":"up""#));
        assert!(text.contains(r#""ip":"10.0.0.42","mac":"1e:07:01:02:03:04""#));

        let sock = nic.connect(80, PEER, b"GET /api/socket-status HTTP/1.1\r\n\r\n").unwrap();
        let now = run_until_waiting(&mut srv, &mut nic, &mut ctx, now + 1, now + 100);
        let text = sent_text(&nic, sock);
        assert!(text.contains(r#""requests":{"success":1,"failed":0}"#));
        assert!(text.contains(r#"{"id":0,"status":"LISTEN","port":80}"#));
        assert!(text.contains(r#"{"id":1,"status":"ESTABLISHED","port":80}"#));

        let sock = nic.connect(80, PEER, b"GET /ping HTTP/1.1\r\n\r\n").unwrap();
        run_until_waiting(&mut srv, &mut nic, &mut ctx, now + 1, now + 100);
        assert!(sent_text(&nic, sock).ends_with("pong"));
    }

    #[test]
    fn monitor_restarts_missing_listener_once() {
        let mut srv = server();
        let mut nic = SimNic::new();
        let mut ctx = Ctx::default();
        let n = net(true);
        srv.update(&mut nic, &n, &mut ctx, 4_999);
        assert_eq!(srv.stats().server_restarts, 0);
        srv.update(&mut nic, &n, &mut ctx, 5_000);
        assert_eq!(srv.stats().server_restarts, 1);
        assert!(nic::is_listening(&mut nic, 80));
        srv.check_sockets(&mut nic, 5_001);
        assert_eq!(srv.stats().server_restarts, 1);
    }

    static BUNDLE: [u8; 5000] = [b'z'; 5000];

    fn body_of(text: &str) -> &str {
        text.split_once("\r\n\r\n").map_or("", |(_, body)| body)
    }

    #[test]
    fn large_file_goes_out_as_the_tx_buffer_frees() {
        let mut srv = server();
        srv.router().serve_file("/bundle.js", &BUNDLE).unwrap();
        let mut nic = listening_nic();
        nic.hold_tx = true;
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /bundle.js HTTP/1.1\r\n\r\n").unwrap();

        let n = net(true);
        let mut now = 0;
        let mut sending_updates = 0;
        srv.update(&mut nic, &n, &mut ctx, now);
        while srv.state() != HttpState::Waiting && now < 100 {
            now += 1;
            srv.update(&mut nic, &n, &mut ctx, now);
            if srv.state() == HttpState::Sending {
                sending_updates += 1;
            }
            // The peer acknowledges once per loop.
            nic.ack(sock);
        }

        assert_eq!(srv.state(), HttpState::Waiting);
        assert!(sending_updates >= 2);
        let text = sent_text(&nic, sock);
        assert!(text.contains("Content-Length: 5000\r\n"));
        assert_eq!(body_of(&text).len(), 5000);
        assert_eq!(srv.stats().requests_success, 1);
        assert_eq!(srv.stats().requests_failed, 0);
    }

    #[test]
    fn response_abandoned_when_peer_stops_reading() {
        let mut srv = server();
        srv.router().serve_file("/bundle.js", &BUNDLE).unwrap();
        let mut nic = listening_nic();
        nic.hold_tx = true;
        let mut ctx = Ctx::default();
        let sock = nic.connect(80, PEER, b"GET /bundle.js HTTP/1.1\r\n\r\n").unwrap();

        let n = net(true);
        let mut now = 0;
        while srv.state() != HttpState::Sending && now < 10 {
            srv.update(&mut nic, &n, &mut ctx, now);
            now += 1;
        }
        assert_eq!(srv.state(), HttpState::Sending);
        let entered = now - 1;

        srv.update(&mut nic, &n, &mut ctx, entered + 2_000);
        assert_eq!(srv.state(), HttpState::Sending);
        srv.update(&mut nic, &n, &mut ctx, entered + 2_001);
        assert_eq!(srv.state(), HttpState::ForceClosing);
        srv.update(&mut nic, &n, &mut ctx, entered + 2_002);
        assert_eq!(srv.state(), HttpState::Waiting);

        assert_eq!(nic.socket(sock).closes, 1);
        assert_eq!(srv.stats().requests_success, 0);
        assert_eq!(srv.stats().requests_failed, 1);
        assert!(body_of(&sent_text(&nic, sock)).len() < 5000);
    }

    #[test]
    fn reclaimed_sockets_are_reported() {
        let mut srv = server();
        let mut nic = listening_nic();
        let mut ctx = Ctx::default();
        nic.set_status(3, SocketStatus::CloseWait, 80);
        assert_eq!(srv.check_sockets(&mut nic, 1_000).closed, 0);
        assert_eq!(srv.check_sockets(&mut nic, 11_001).closed, 1);

        let sock = nic.connect(80, PEER, b"GET /api/socket-status HTTP/1.1\r\n\r\n").unwrap();
        run_until_waiting(&mut srv, &mut nic, &mut ctx, 11_002, 11_100);
        assert!(sent_text(&nic, sock).contains(r#""sockets_reclaimed":1,"sockets":["#));
    }
}
