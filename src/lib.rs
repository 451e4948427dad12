//! # halremote
//!
//! A client-side runtime that couples a process-local set of named signal
//! endpoints ("pins") to a remote HAL component hosted in a real-time
//! process. The remote side exposes two services: a request/reply command
//! channel (halrcmd) used to bind the component and push outbound pin
//! changes, and a publish/subscribe channel (halrcomp) that delivers full
//! and incremental pin updates keyed by component name.
//!
//! ## Architecture
//!
//! Three components compose, leaves first:
//!
//! - [`transport::RpcClient`] — a DEALER endpoint to the halrcmd service
//!   with ping-driven liveness detection.
//! - [`transport::Subscriber`] — a SUB endpoint to the halrcomp service
//!   with topic management and publisher-driven keepalive.
//! - [`halremote::HalRemoteComponent`] — the protocol state machine on top
//!   of both: it binds the component, merges pin updates, propagates local
//!   pin mutations, and derives a single connection state.
//!
//! The runtime is single-threaded and cooperative; [`halremote::Runtime`]
//! multiplexes socket readiness and heartbeat timers on one zmq poll loop.

pub mod config;
pub mod halremote;
pub mod plugins;
pub mod protocol;
pub mod transport;
