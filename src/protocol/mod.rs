//! Wire protocol for the halrcmd/halrcomp services.
//!
//! A single [`Container`] envelope carries every message in both
//! directions, discriminated by [`MsgType`]. The schema mirrors the remote
//! authority's proto2 layout: optional scalars decode to `Option<T>`, and
//! pin values are mutually exclusive across the four typed fields.

mod container;

pub use container::{Component, Container, MsgType, Pin, PinDir, ProtocolParameters, ValueType};
