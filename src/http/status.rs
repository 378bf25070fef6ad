//! Built-in observability endpoints.

use core::fmt::Write;

use heapless::String;

use crate::error::RouteError;
use crate::identity::{format_ip, format_mac};
use crate::nic::{LinkStatus, SocketId, MAX_SOCKETS};

use super::request::Request;
use super::response::Responder;
use super::router::Router;

const JSON: &str = "application/json";

/// Register `/api/network-status`, `/api/socket-status` and `/ping`.
pub fn install<C>(router: &mut Router<C>) -> Result<(), RouteError> {
    router.get("/api/network-status", network_status::<C>)?;
    router.get("/api/socket-status", socket_status::<C>)?;
    router.get("/ping", ping::<C>)
}

pub fn ping<C>(_req: &Request, resp: &mut Responder<'_>, _ctx: &mut C) {
    resp.send_str(200, "text/plain", "pong");
}

pub fn network_status<C>(_req: &Request, resp: &mut Responder<'_>, _ctx: &mut C) {
    let n = *resp.network();
    let link = match n.link {
        LinkStatus::On => "up",
        LinkStatus::Off => "down",
        LinkStatus::Unknown => "unknown",
    };
    let mut body: String<512> = String::new();
    write!(body, r#"{{"state":"{}","ready":{},"busy":{},"#, n.state, n.ready, n.busy).ok();
    write!(body, r#""link":"{}","server":{},"#, link, n.server).ok();
    write!(body, r#""ip":"{}","mac":"{}","#, format_ip(&n.ip), format_mac(&n.mac)).ok();
    write!(body, r#""init_cycles":{},"retries":{},"#, n.init_cycles, n.retries).ok();
    write!(body, r#""hard_resets":{},"soft_resets":{}}}"#, n.hard_resets, n.soft_resets).ok();
    resp.send(200, JSON, body.as_bytes());
}

pub fn socket_status<C>(_req: &Request, resp: &mut Responder<'_>, _ctx: &mut C) {
    let stats = *resp.stats();
    let mut body: String<768> = String::new();
    write!(body, r#"{{"requests":{{"success":{},"failed":{}}},"#,
        stats.requests_success, stats.requests_failed).ok();
    write!(body, r#""server_restarts":{},"sockets_reclaimed":{},"sockets":["#,
        stats.server_restarts, stats.sockets_reclaimed).ok();
    let nic = resp.nic();
    let count = nic.socket_count().min(MAX_SOCKETS) as SocketId;
    for sock in 0..count {
        if sock > 0 {
            body.push(',').ok();
        }
        let status = nic.socket_status(sock);
        let port = nic.socket_port(sock);
        write!(body, r#"{{"id":{},"status":"{}","port":{}}}"#, sock, status, port).ok();
    }
    body.push_str("]}").ok();
    resp.send(200, JSON, body.as_bytes());
}
