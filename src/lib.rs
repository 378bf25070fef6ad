#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod json;
pub mod link;
pub mod nic;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod stack;
pub mod time;
pub mod ws;

pub use config::{HttpConfig, NetworkConfig, SupervisorTimings, WsConfig};
pub use link::{LinkHooks, LinkState, LinkSupervisor, NetworkStatus};
pub use nic::{LinkStatus, NicDriver, SocketId, SocketStatus};
pub use stack::NetStack;
