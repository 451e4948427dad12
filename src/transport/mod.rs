//! Transport endpoints for the halrcmd and halrcomp services.
//!
//! This module provides the two low-level endpoints the component runtime
//! is built on: [`RpcClient`], a request/reply DEALER endpoint with
//! ping-driven liveness detection, and [`Subscriber`], a SUB endpoint with
//! topic management and publisher-driven keepalive. Both expose the same
//! [`LinkState`] lifecycle and deliver decoded messages as pull-style
//! events to their owner.

mod link;
mod rpc;
mod socket;
mod subscriber;

#[cfg(test)]
pub(crate) mod mock;

pub use link::LinkState;
pub use rpc::{RpcClient, RpcEvent, DEFAULT_HEARTBEAT_PERIOD_MS, DEFAULT_PING_ERROR_THRESHOLD};
pub use socket::{CommandTransport, TransportError, UpdateTransport, ZmqCommand, ZmqUpdate};
pub use subscriber::{SubEvent, Subscriber};
