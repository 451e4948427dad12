//! # HAL remote components
//!
//! The client-side counterpart of a HAL remote component hosted in a
//! real-time environment. A [`HalRemoteComponent`] scans a host-provided
//! [`PinContainer`] for [`HalPin`]s when made ready, binds itself on the
//! halrcmd service, subscribes to its own name on the halrcomp service,
//! and then mirrors pin values in both directions until made not-ready.
//!
//! ## Example
//!
//! ```rust,ignore
//! use halremote::halremote::{HalPin, HalRemoteComponent, PinContainer, PinDirection, PinType, Runtime};
//!
//! let enable = HalPin::new_shared("enable", PinType::Bit, PinDirection::Out);
//! let mut container = PinContainer::new();
//! container.add_pin(enable.clone());
//!
//! let mut component = HalRemoteComponent::new();
//! component.set_name("myComponent");
//! component.set_halrcmd_uri("tcp://192.168.1.2:5001");
//! component.set_halrcomp_uri("tcp://192.168.1.2:5002");
//! component.set_container(container);
//! component.set_ready(true);
//!
//! let mut runtime = Runtime::new(component);
//! runtime.run()?;
//! ```

mod component;
mod pin;
mod runtime;

pub use component::{ComponentError, ConnectionState, HalRemoteComponent};
pub use pin::{HalPin, PinContainer, PinDirection, PinError, PinType, PinValue, SharedPin};
pub use runtime::{Runtime, ZmqRemoteComponent};
