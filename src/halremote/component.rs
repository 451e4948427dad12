//! The remote-component protocol state machine.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::RemoteComponentConfig;
use crate::protocol::{self, Container, MsgType};
use crate::transport::{
    CommandTransport, LinkState, RpcClient, RpcEvent, SubEvent, Subscriber, UpdateTransport,
};

use super::pin::{HalPin, PinChange, PinContainer, PinDirection, PinValue, SharedPin};

/// High-level state of the remote component, derived from both link
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected; also the resting state after Stop.
    #[default]
    Disconnected,

    /// Either channel is still establishing, or the bind is outstanding.
    Connecting,

    /// Both channels are up; pin changes flow in both directions.
    Connected,

    /// Either channel exhausted its liveness budget.
    Timeout,

    /// A protocol or transport error occurred; see the error kind and
    /// text.
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Error classification exposed to the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentError {
    /// No error.
    #[default]
    NoError,

    /// Binding the remote component failed.
    BindError,

    /// A pin change was rejected after a successful bind.
    PinChangeError,

    /// A command was rejected by the server.
    CommandError,

    /// A transport-level socket error occurred.
    SocketError,

    /// Reserved for timeout classification; timeouts currently surface as
    /// [`ConnectionState::Timeout`] without an error kind.
    TimeoutError,
}

impl std::fmt::Display for ComponentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "no error"),
            Self::BindError => write!(f, "bind error"),
            Self::PinChangeError => write!(f, "pin change error"),
            Self::CommandError => write!(f, "command error"),
            Self::SocketError => write!(f, "socket error"),
            Self::TimeoutError => write!(f, "timeout error"),
        }
    }
}

/// Client-side counterpart of a HAL remote component.
///
/// Owns the two transport endpoints and the local pin registry. Readiness
/// toggling starts the command channel; the command channel reaching Up
/// triggers the bind; a confirmed bind starts the subscription; the first
/// full update completes the connection. See the module documentation for
/// the full data flow.
pub struct HalRemoteComponent<R: CommandTransport, S: UpdateTransport> {
    name: String,
    debug_name: String,
    create: bool,
    ready: bool,
    state: ConnectionState,
    error: ComponentError,
    error_string: String,
    rpc: RpcClient<R>,
    subscriber: Subscriber<S>,
    container: Option<PinContainer>,
    pins_by_name: BTreeMap<String, Weak<RefCell<HalPin>>>,
    pins_by_handle: HashMap<u32, Weak<RefCell<HalPin>>>,
    change_tx: Sender<PinChange>,
    change_rx: Receiver<PinChange>,
    tx: Container,
    state_observers: Vec<Box<dyn FnMut(ConnectionState)>>,
    error_observers: Vec<Box<dyn FnMut(ComponentError, &str)>>,
}

impl<R: CommandTransport, S: UpdateTransport> HalRemoteComponent<R, S> {
    /// Creates a component around pre-built endpoints.
    pub fn with_endpoints(rpc: RpcClient<R>, subscriber: Subscriber<S>) -> Self {
        let (change_tx, change_rx) = channel();
        Self {
            name: "default".to_string(),
            debug_name: String::new(),
            create: true,
            ready: false,
            state: ConnectionState::Disconnected,
            error: ComponentError::NoError,
            error_string: String::new(),
            rpc,
            subscriber,
            container: None,
            pins_by_name: BTreeMap::new(),
            pins_by_handle: HashMap::new(),
            change_tx,
            change_rx,
            tx: Container::default(),
            state_observers: Vec::new(),
            error_observers: Vec::new(),
        }
    }

    /// Component name. Ignored while not disconnected.
    pub fn set_name(&mut self, name: impl Into<String>) {
        if self.state != ConnectionState::Disconnected {
            warn!("{}: cannot rename while {}", self.name, self.state);
            return;
        }
        self.name = name.into();
    }

    /// Tag used in log output; defaults to the component name.
    pub fn set_debug_name(&mut self, name: impl Into<String>) {
        self.debug_name = name.into();
    }

    /// URI of the halrcmd service.
    pub fn set_halrcmd_uri(&mut self, uri: impl Into<String>) {
        self.rpc.set_uri(uri);
    }

    /// URI of the halrcomp service.
    pub fn set_halrcomp_uri(&mut self, uri: impl Into<String>) {
        self.subscriber.set_uri(uri);
    }

    /// Heartbeat period for the command channel, in milliseconds; zero
    /// disables the heartbeat. The update channel always learns its period
    /// from the publisher.
    pub fn set_heartbeat_period_ms(&mut self, period_ms: u64) {
        self.rpc.set_heartbeat_period_ms(period_ms);
    }

    /// Whether the remote side may create the component on bind if it does
    /// not exist yet.
    pub fn set_create(&mut self, create: bool) {
        self.create = create;
    }

    /// Container scanned for pins at Start.
    pub fn set_container(&mut self, container: PinContainer) {
        self.container = Some(container);
    }

    /// Applies a full configuration in one call.
    pub fn apply_config(&mut self, config: &RemoteComponentConfig) {
        self.set_name(config.name.clone());
        self.set_halrcmd_uri(config.halrcmd_uri.clone());
        self.set_halrcomp_uri(config.halrcomp_uri.clone());
        self.set_heartbeat_period_ms(config.heartbeat_period_ms);
        self.set_create(config.create);
        if let Some(tag) = &config.debug_name {
            self.set_debug_name(tag.clone());
        }
    }

    /// Registers an observer invoked on every connection-state change.
    pub fn on_state_change(&mut self, observer: impl FnMut(ConnectionState) + 'static) {
        self.state_observers.push(Box::new(observer));
    }

    /// Registers an observer invoked on every error-kind or error-text
    /// change.
    pub fn on_error(&mut self, observer: impl FnMut(ComponentError, &str) + 'static) {
        self.error_observers.push(Box::new(observer));
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Same as `connection_state() == Connected`.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    #[must_use]
    pub fn error(&self) -> ComponentError {
        self.error
    }

    #[must_use]
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Looks up a discovered pin by name.
    #[must_use]
    pub fn pin(&self, name: &str) -> Option<SharedPin> {
        self.pins_by_name.get(name).and_then(Weak::upgrade)
    }

    /// Toggles the component lifecycle. Idempotent; cascades to both
    /// endpoints and is safe to invoke in any state.
    pub fn set_ready(&mut self, ready: bool) {
        if ready == self.ready {
            return;
        }
        self.ready = ready;
        if ready {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Drains the command socket and routes the decoded messages.
    pub fn pump_command(&mut self) {
        let events = self.rpc.process_socket();
        self.handle_rpc_events(events);
    }

    /// Drains the update socket and routes the decoded messages.
    pub fn pump_updates(&mut self) {
        let events = self.subscriber.process_socket();
        self.handle_sub_events(events);
    }

    /// Runs any endpoint heartbeat whose deadline has passed.
    pub fn pump_timers(&mut self, now: Instant) {
        let events = self.rpc.handle_timers(now);
        self.handle_rpc_events(events);
        let events = self.subscriber.handle_timers(now);
        self.handle_sub_events(events);
    }

    /// Earliest endpoint heartbeat deadline, if any timer is armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.rpc.next_deadline(), self.subscriber.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (deadline, None) | (None, deadline) => deadline,
        }
    }

    /// Propagates queued local pin changes outbound. Changes observed
    /// while not connected are dropped; the next full update delivers the
    /// authoritative values anyway.
    pub fn drain_pin_changes(&mut self) {
        while let Ok(change) = self.change_rx.try_recv() {
            self.on_pin_change(&change);
        }
    }

    fn start(&mut self) {
        debug!("{}: start", self.name);
        self.set_error(ComponentError::NoError, String::new());
        let tag = if self.debug_name.is_empty() {
            self.name.clone()
        } else {
            self.debug_name.clone()
        };
        self.rpc.set_debug_name(format!("{tag}-rcmd"));
        self.subscriber.set_debug_name(format!("{tag}-rcomp"));

        self.add_pins();
        self.subscriber.clear_topics();
        self.subscriber.add_topic(self.name.clone());

        let events = self.rpc.set_ready(true);
        self.handle_rpc_events(events);
    }

    fn stop(&mut self) {
        debug!("{}: stop", self.name);
        self.cleanup();
    }

    /// Tears both endpoints down and drops the pin registry.
    fn cleanup(&mut self) {
        let events = self.subscriber.set_ready(false);
        self.handle_sub_events(events);
        let events = self.rpc.set_ready(false);
        self.handle_rpc_events(events);
        self.remove_pins();
    }

    // ── Pin registry ──────────────────────────────────────────

    /// Walks the container tree and indexes every usable pin by name.
    fn add_pins(&mut self) {
        let Some(container) = self.container.take() else {
            return;
        };
        let mut collected: Vec<SharedPin> = Vec::new();
        container.for_each_pin(&mut |pin| collected.push(Rc::clone(pin)));
        self.container = Some(container);

        for pin in collected {
            let (name, enabled) = {
                let pin = pin.borrow();
                (pin.name().to_string(), pin.enabled())
            };
            if name.is_empty() || !enabled {
                continue;
            }
            pin.borrow_mut().set_notifier(Some(self.change_tx.clone()));
            debug!("{}: pin added: {}", self.name, name);
            self.pins_by_name.insert(name, Rc::downgrade(&pin));
        }
    }

    /// Detaches change notification and drops both indexes.
    fn remove_pins(&mut self) {
        for weak in self.pins_by_name.values() {
            if let Some(pin) = weak.upgrade() {
                pin.borrow_mut().set_notifier(None);
            }
        }
        self.pins_by_name.clear();
        self.pins_by_handle.clear();
    }

    /// Clears the synced flag on every pin.
    fn unsync_pins(&mut self) {
        for weak in self.pins_by_name.values() {
            if let Some(pin) = weak.upgrade() {
                pin.borrow_mut().set_synced(false);
            }
        }
    }

    // ── Command channel ───────────────────────────────────────

    fn handle_rpc_events(&mut self, events: Vec<RpcEvent>) {
        for event in events {
            match event {
                RpcEvent::StateChanged(state) => self.on_rcmd_state(state),
                RpcEvent::Message(container) => self.on_rcmd_message(&container),
            }
        }
    }

    fn on_rcmd_state(&mut self, state: LinkState) {
        match state {
            LinkState::Up => self.bind(),
            LinkState::Error => {
                let text = self.rpc.error_string().to_string();
                let events = self.subscriber.set_ready(false);
                self.handle_sub_events(events);
                self.fail(ComponentError::SocketError, text);
            }
            _ => {
                let events = self.subscriber.set_ready(false);
                self.handle_sub_events(events);
            }
        }
        self.recompute_state();
    }

    /// Advertises the component with its declared pins on the command
    /// channel.
    fn bind(&mut self) {
        let mut component = protocol::Component {
            name: Some(self.name.clone()),
            no_create: Some(!self.create),
            pin: Vec::new(),
        };
        for (name, weak) in &self.pins_by_name {
            let Some(pin) = weak.upgrade() else {
                continue;
            };
            let pin = pin.borrow();
            let mut wire = protocol::Pin {
                // Pin names are qualified on the wire.
                name: Some(format!("{}.{}", self.name, name)),
                value_type: Some(pin.pin_type().to_wire() as i32),
                dir: Some(pin.direction().to_wire() as i32),
                ..protocol::Pin::default()
            };
            pin.value().write_wire(&mut wire);
            component.pin.push(wire);
        }

        debug!("{}: bind with {} pins", self.name, component.pin.len());
        self.tx.comp.push(component);
        let mut tx = mem::take(&mut self.tx);
        let events = self.rpc.send(MsgType::HalrcompBind, &mut tx);
        self.tx = tx;
        self.handle_rpc_events(events);
    }

    fn on_rcmd_message(&mut self, rx: &Container) {
        match rx.msg_type() {
            Some(MsgType::HalrcompBindConfirm) => {
                debug!("{}: bind confirmed", self.name);
                let events = self.subscriber.set_ready(true);
                self.handle_sub_events(events);
            }
            Some(MsgType::HalrcompBindReject) => {
                let text = rx.joined_notes();
                warn!("{}: bind rejected: {}", self.name, text.trim_end());
                let events = self.rpc.set_ready(false);
                self.handle_rpc_events(events);
                self.fail(ComponentError::BindError, text);
            }
            Some(MsgType::HalrcompSetReject) => {
                let text = rx.joined_notes();
                warn!("{}: pin change rejected: {}", self.name, text.trim_end());
                self.fail(ComponentError::PinChangeError, text);
            }
            other => {
                warn!("{}: unhandled command reply: {:?}", self.name, other);
            }
        }
    }

    // ── Update channel ────────────────────────────────────────

    fn handle_sub_events(&mut self, events: Vec<SubEvent>) {
        for event in events {
            match event {
                SubEvent::StateChanged(state) => self.on_rcomp_state(state),
                SubEvent::Message { topic, container } => {
                    self.on_update_message(&topic, &container);
                }
            }
        }
    }

    fn on_rcomp_state(&mut self, state: LinkState) {
        if state == LinkState::Error {
            let text = self.subscriber.error_string().to_string();
            self.fail(ComponentError::SocketError, text);
        }
        self.recompute_state();
    }

    fn on_update_message(&mut self, topic: &str, rx: &Container) {
        match rx.msg_type() {
            Some(MsgType::HalrcompFullUpdate) => self.apply_full_update(rx),
            Some(MsgType::HalrcompIncrementalUpdate) => self.apply_incremental_update(rx),
            Some(MsgType::HalrcommandError) => {
                let text = rx.joined_notes();
                warn!("{}: server error on {}: {}", self.name, topic, text.trim_end());
                self.fail(ComponentError::CommandError, text);
            }
            other => {
                debug!("{}: unhandled update on {}: {:?}", self.name, topic, other);
            }
        }
    }

    /// Assigns handles and applies values from an authoritative snapshot.
    fn apply_full_update(&mut self, rx: &Container) {
        for component in &rx.comp {
            for remote in &component.pin {
                let qualified = remote.name.as_deref().unwrap_or("");
                // Strip the leading "<component>." qualifier.
                let name = match qualified.find('.') {
                    Some(index) => &qualified[index + 1..],
                    None => qualified,
                };
                let Some(local) = self.pins_by_name.get(name).and_then(Weak::upgrade) else {
                    debug!("{}: ignoring unknown pin '{}'", self.name, qualified);
                    continue;
                };
                if let Some(handle) = remote.handle {
                    local.borrow_mut().set_handle(handle);
                    self.pins_by_handle.insert(handle, Rc::downgrade(&local));
                }
                self.apply_remote_value(&local, remote);
            }
        }
    }

    /// Applies handle-keyed deltas. A miss is a stale or not-yet-bound
    /// handle and is ignored.
    fn apply_incremental_update(&mut self, rx: &Container) {
        for remote in &rx.pin {
            let Some(handle) = remote.handle else {
                continue;
            };
            let Some(local) = self.pins_by_handle.get(&handle).and_then(Weak::upgrade) else {
                continue;
            };
            self.apply_remote_value(&local, remote);
        }
    }

    fn apply_remote_value(&self, local: &SharedPin, remote: &protocol::Pin) {
        let Some(value) = PinValue::from_wire(remote) else {
            debug!("{}: update without a value field", self.name);
            return;
        };
        if let Err(err) = local.borrow_mut().apply_remote(value) {
            warn!("{}: {}", self.name, err);
        }
    }

    // ── Outbound pin changes ──────────────────────────────────

    fn on_pin_change(&mut self, change: &PinChange) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(pin) = self.pins_by_name.get(&change.name).and_then(Weak::upgrade) else {
            return;
        };
        let (handle, direction, pin_type, value) = {
            let pin = pin.borrow();
            (pin.handle(), pin.direction(), pin.pin_type(), pin.value())
        };
        if direction == PinDirection::In {
            return;
        }
        if handle == 0 {
            // Not assigned yet; the bind round-trip has to finish first.
            return;
        }

        let mut wire = protocol::Pin {
            handle: Some(handle),
            value_type: Some(pin_type.to_wire() as i32),
            ..protocol::Pin::default()
        };
        value.write_wire(&mut wire);
        self.tx.pin.push(wire);

        let mut tx = mem::take(&mut self.tx);
        let events = self.rpc.send(MsgType::HalrcompSet, &mut tx);
        self.tx = tx;
        self.handle_rpc_events(events);
    }

    // ── Derived state ─────────────────────────────────────────

    /// Recomputes the derived connection state from both link states.
    /// Suppressed while an error is latched so cleanup cannot clobber the
    /// Error state.
    fn recompute_state(&mut self) {
        if self.error != ComponentError::NoError {
            return;
        }
        let rcmd = self.rpc.state();
        let rcomp = self.subscriber.state();

        let derived = if rcmd.is_up() && rcomp.is_up() {
            ConnectionState::Connected
        } else if rcmd == LinkState::Timeout || rcomp == LinkState::Timeout {
            ConnectionState::Timeout
        } else if rcmd == LinkState::Trying || rcomp == LinkState::Trying || rcmd.is_up() {
            // rcmd up with the subscription not yet up means the bind
            // round-trip is still outstanding.
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        };
        self.set_connection_state(derived);
    }

    fn set_connection_state(&mut self, state: ConnectionState) {
        if state == self.state {
            return;
        }
        if self.state == ConnectionState::Connected {
            // Leaving Connected invalidates every mirrored value.
            self.unsync_pins();
        }
        debug!("{}: {} -> {}", self.name, self.state, state);
        self.state = state;

        let mut observers = mem::take(&mut self.state_observers);
        for observer in &mut observers {
            observer(state);
        }
        self.state_observers = observers;
    }

    /// Latches an error and forces the connection state to Error.
    ///
    /// The state flips first so that leaving Connected unsyncs the pins
    /// while the registry is still populated; latching the error kind then
    /// runs cleanup, during which recompute is suppressed.
    fn fail(&mut self, error: ComponentError, text: String) {
        self.set_connection_state(ConnectionState::Error);
        self.set_error(error, text);
    }

    fn set_error(&mut self, error: ComponentError, text: String) {
        let text_changed = self.error_string != text;
        if text_changed {
            self.error_string = text;
        }
        let kind_changed = error != self.error;
        if kind_changed {
            self.error = error;
            if error != ComponentError::NoError {
                self.cleanup();
            }
        }
        if kind_changed || text_changed {
            let mut observers = mem::take(&mut self.error_observers);
            for observer in &mut observers {
                observer(self.error, &self.error_string);
            }
            self.error_observers = observers;
        }
    }

    pub(crate) fn command_transport(&self) -> Option<&R> {
        self.rpc.transport()
    }

    pub(crate) fn update_transport(&self) -> Option<&S> {
        self.subscriber.transport()
    }

    #[cfg(test)]
    pub(crate) fn force_command_tick(&mut self) {
        let events = self.rpc.heartbeat_tick();
        self.handle_rpc_events(events);
    }

    #[cfg(test)]
    pub(crate) fn force_update_tick(&mut self) {
        let events = self.subscriber.heartbeat_tick();
        self.handle_sub_events(events);
    }
}

impl HalRemoteComponent<crate::transport::ZmqCommand, crate::transport::ZmqUpdate> {
    /// Creates a component over the production zmq transports.
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoints(RpcClient::new(), Subscriber::new())
    }
}

impl Default for HalRemoteComponent<crate::transport::ZmqCommand, crate::transport::ZmqUpdate> {
    fn default() -> Self {
        Self::new()
    }
}
