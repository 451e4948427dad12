//! Request/reply endpoint for the halrcmd service.

use std::mem;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use prost::Message;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::protocol::{Container, MsgType};

use super::link::LinkState;
use super::socket::{CommandTransport, TransportError, ZmqCommand};

/// Default heartbeat period in milliseconds. Zero disables the heartbeat.
pub const DEFAULT_HEARTBEAT_PERIOD_MS: u64 = 3000;

/// Default number of unanswered pings tolerated before the link is
/// declared timed out.
pub const DEFAULT_PING_ERROR_THRESHOLD: u32 = 2;

/// Event delivered to the owner of an [`RpcClient`].
#[derive(Debug)]
pub enum RpcEvent {
    /// The link state changed; read `error_string()` for error details.
    StateChanged(LinkState),
    /// A decoded non-ping message arrived. The container is handed over by
    /// value and must not be fed back into the endpoint.
    Message(Container),
}

/// Request/reply endpoint with connection lifecycle, identity, and
/// heartbeat-driven liveness detection.
///
/// The endpoint owns one DEALER connection to a single URI, keeps it alive
/// with application-level pings, and delivers non-ping messages upward as
/// [`RpcEvent`]s. Socket errors and timeouts are terminal for the session;
/// recovery is a ready cycle (`set_ready(false)` then `set_ready(true)`).
pub struct RpcClient<T: CommandTransport> {
    uri: String,
    debug_name: String,
    identity: String,
    connector: Box<dyn FnMut(&str, &str) -> Result<T, TransportError>>,
    transport: Option<T>,
    state: LinkState,
    error_string: String,
    heartbeat_period_ms: u64,
    ping_error_threshold: u32,
    ping_error_count: u32,
    deadline: Option<Instant>,
    ready: bool,
    rx: Container,
    ping_tx: Container,
    encode_buf: BytesMut,
}

impl<T: CommandTransport> RpcClient<T> {
    /// Creates an endpoint that opens its transport through `connector` on
    /// every Start. The routing identity is `<hostname>-<uuid>`, minted
    /// once per instance.
    pub fn with_connector(
        connector: impl FnMut(&str, &str) -> Result<T, TransportError> + 'static,
    ) -> Self {
        let identity = format!(
            "{}-{}",
            gethostname::gethostname().to_string_lossy(),
            Uuid::new_v4()
        );
        Self {
            uri: String::new(),
            debug_name: String::new(),
            identity,
            connector: Box::new(connector),
            transport: None,
            state: LinkState::Down,
            error_string: String::new(),
            heartbeat_period_ms: DEFAULT_HEARTBEAT_PERIOD_MS,
            ping_error_threshold: DEFAULT_PING_ERROR_THRESHOLD,
            ping_error_count: 0,
            deadline: None,
            ready: false,
            rx: Container::default(),
            ping_tx: Container::default(),
            encode_buf: BytesMut::new(),
        }
    }

    /// Target URI, applied on the next Start.
    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    /// Tag used in log output.
    pub fn set_debug_name(&mut self, name: impl Into<String>) {
        self.debug_name = name.into();
    }

    /// Heartbeat period in milliseconds; zero disables the heartbeat.
    pub fn set_heartbeat_period_ms(&mut self, period_ms: u64) {
        self.heartbeat_period_ms = period_ms;
    }

    /// Number of unanswered pings tolerated while the link is up.
    pub fn set_ping_error_threshold(&mut self, threshold: u32) {
        self.ping_error_threshold = threshold;
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Text of the last transport error, empty outside the Error state.
    #[must_use]
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    /// Routing identity used on the DEALER socket.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Heartbeat period currently configured, in milliseconds.
    #[must_use]
    pub fn heartbeat_period_ms(&self) -> u64 {
        self.heartbeat_period_ms
    }

    pub(crate) fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Toggles the endpoint lifecycle. Idempotent.
    pub fn set_ready(&mut self, ready: bool) -> Vec<RpcEvent> {
        let mut events = Vec::new();
        if ready == self.ready {
            return events;
        }
        self.ready = ready;
        if ready {
            self.start(&mut events);
        } else {
            self.stop(&mut events);
        }
        events
    }

    /// Sets the envelope kind, serializes `tx` into the reusable outbound
    /// buffer, and transmits it as a single frame. A missing socket makes
    /// this a no-op: outbound traffic is gated on readiness. The envelope
    /// is cleared after a successful send, and a successful PING re-arms
    /// the heartbeat timer.
    pub fn send(&mut self, kind: MsgType, tx: &mut Container) -> Vec<RpcEvent> {
        let mut events = Vec::new();
        self.send_inner(kind, tx, &mut events);
        events
    }

    /// Drains the socket, decoding every queued message. Any decoded
    /// inbound message counts as liveness; PING_ACK is consumed silently.
    pub fn process_socket(&mut self) -> Vec<RpcEvent> {
        let mut events = Vec::new();
        loop {
            let Some(transport) = self.transport.as_mut() else {
                break;
            };
            match transport.try_recv() {
                Ok(Some(frames)) => self.handle_frames(&frames, &mut events),
                Ok(None) => break,
                Err(err) => {
                    self.update_state(LinkState::Error, err.to_string(), &mut events);
                    break;
                }
            }
        }
        events
    }

    /// Next instant the heartbeat timer fires, if armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs the heartbeat tick if its deadline has passed.
    pub fn handle_timers(&mut self, now: Instant) -> Vec<RpcEvent> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.heartbeat_tick(),
            _ => Vec::new(),
        }
    }

    /// One heartbeat tick: send a PING and charge the liveness budget.
    pub fn heartbeat_tick(&mut self) -> Vec<RpcEvent> {
        let mut events = Vec::new();
        let mut tx = mem::take(&mut self.ping_tx);
        self.send_inner(MsgType::Ping, &mut tx, &mut events);
        self.ping_tx = tx;

        self.ping_error_count += 1;
        if self.ping_error_count > self.ping_error_threshold && self.state == LinkState::Up {
            self.update_state(LinkState::Timeout, String::new(), &mut events);
        }
        events
    }

    fn start(&mut self, events: &mut Vec<RpcEvent>) {
        debug!("{}: start", self.debug_name);
        self.update_state(LinkState::Trying, String::new(), events);

        match (self.connector)(&self.uri, &self.identity) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.ping_error_count = 0;
                let mut tx = mem::take(&mut self.ping_tx);
                self.send_inner(MsgType::Ping, &mut tx, events);
                self.ping_tx = tx;
            }
            Err(err) => {
                self.update_state(LinkState::Error, err.to_string(), events);
            }
        }
    }

    fn stop(&mut self, events: &mut Vec<RpcEvent>) {
        debug!("{}: stop", self.debug_name);
        self.deadline = None;
        self.transport = None;
        self.update_state(LinkState::Down, String::new(), events);
    }

    fn send_inner(&mut self, kind: MsgType, tx: &mut Container, events: &mut Vec<RpcEvent>) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        tx.set_msg_type(kind);
        self.encode_buf.clear();
        if let Err(err) = tx.encode(&mut self.encode_buf) {
            // Unreachable with a growable buffer; surfaced instead of panicking.
            self.update_state(LinkState::Error, err.to_string(), events);
            return;
        }

        match transport.send(&self.encode_buf) {
            Ok(()) => {
                tx.clear();
                if kind == MsgType::Ping {
                    self.refresh_heartbeat();
                }
            }
            Err(err) => {
                self.update_state(LinkState::Error, err.to_string(), events);
            }
        }
    }

    fn handle_frames(&mut self, frames: &[Vec<u8>], events: &mut Vec<RpcEvent>) {
        let Some(payload) = frames.first() else {
            return;
        };

        self.rx.clear();
        if let Err(err) = self.rx.merge(payload.as_slice()) {
            warn!("{}: dropping undecodable frame: {}", self.debug_name, err);
            return;
        }

        // Any decoded reply evidences liveness; replies can be queued.
        self.ping_error_count = 0;
        if self.state.allows_heartbeat() {
            self.update_state(LinkState::Up, String::new(), events);
        }

        if self.rx.msg_type() == Some(MsgType::PingAcknowledge) {
            trace!("{}: ping acknowledged", self.debug_name);
            return;
        }

        events.push(RpcEvent::Message(mem::take(&mut self.rx)));
    }

    fn refresh_heartbeat(&mut self) {
        if self.heartbeat_period_ms > 0 && self.state.allows_heartbeat() {
            self.deadline = Some(Instant::now() + Duration::from_millis(self.heartbeat_period_ms));
        } else {
            self.deadline = None;
        }
    }

    fn update_state(&mut self, state: LinkState, error_string: String, events: &mut Vec<RpcEvent>) {
        if state == self.state {
            return;
        }
        debug!("{}: link {} -> {}", self.debug_name, self.state, state);
        self.state = state;
        if self.error_string != error_string {
            self.error_string = error_string;
        }
        if !state.allows_heartbeat() {
            self.deadline = None;
        }
        events.push(RpcEvent::StateChanged(state));
    }
}

impl RpcClient<ZmqCommand> {
    /// Creates a zmq-backed endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(ZmqCommand::connect)
    }
}

impl Default for RpcClient<ZmqCommand> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{CommandHub, MockCommand};

    fn client(hub: &std::rc::Rc<CommandHub>) -> RpcClient<MockCommand> {
        let mut client = RpcClient::with_connector(hub.connector());
        client.set_uri("tcp://127.0.0.1:5001");
        client.set_debug_name("rcmd-test");
        client
    }

    fn states(events: &[RpcEvent]) -> Vec<LinkState> {
        events
            .iter()
            .filter_map(|ev| match ev {
                RpcEvent::StateChanged(state) => Some(*state),
                RpcEvent::Message(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_start_connects_and_queues_ping() {
        let hub = CommandHub::new();
        let mut client = client(&hub);

        let events = client.set_ready(true);
        assert_eq!(states(&events), vec![LinkState::Trying]);
        assert_eq!(client.state(), LinkState::Trying);
        assert_eq!(hub.connects.get(), 1);

        let sent = hub.sent_containers();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].msg_type(), Some(MsgType::Ping));
        assert!(client.next_deadline().is_some());
    }

    #[test]
    fn test_set_ready_is_idempotent() {
        let hub = CommandHub::new();
        let mut client = client(&hub);

        client.set_ready(true);
        let events = client.set_ready(true);
        assert!(events.is_empty());
        assert_eq!(hub.connects.get(), 1);
    }

    #[test]
    fn test_identity_carries_instance_uuid() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        let identity = client.identity().to_string();
        client.set_ready(true);

        assert!(identity.contains('-'));
        assert_eq!(hub.identities.borrow().as_slice(), &[identity]);
    }

    #[test]
    fn test_any_inbound_message_moves_trying_to_up() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        let mut reply = Container::default();
        reply.set_msg_type(MsgType::HalrcompBindConfirm);
        hub.push_inbound(&reply);

        let events = client.process_socket();
        assert_eq!(client.state(), LinkState::Up);
        assert!(events
            .iter()
            .any(|ev| matches!(ev, RpcEvent::Message(c) if c.msg_type() == Some(MsgType::HalrcompBindConfirm))));
    }

    #[test]
    fn test_ping_ack_is_consumed_silently_but_transitions_state() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        let mut ack = Container::default();
        ack.set_msg_type(MsgType::PingAcknowledge);
        hub.push_inbound(&ack);

        let events = client.process_socket();
        assert_eq!(client.state(), LinkState::Up);
        assert!(!events.iter().any(|ev| matches!(ev, RpcEvent::Message(_))));
    }

    #[test]
    fn test_heartbeat_budget_exhaustion_times_out() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        let mut ack = Container::default();
        ack.set_msg_type(MsgType::PingAcknowledge);
        hub.push_inbound(&ack);
        client.process_socket();
        assert_eq!(client.state(), LinkState::Up);

        client.heartbeat_tick();
        client.heartbeat_tick();
        assert_eq!(client.state(), LinkState::Up);
        let events = client.heartbeat_tick();
        assert_eq!(client.state(), LinkState::Timeout);
        assert_eq!(states(&events), vec![LinkState::Timeout]);
        // Entering Timeout disarms the timer.
        assert!(client.next_deadline().is_none());
    }

    #[test]
    fn test_inbound_message_resets_ping_error_count() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        let mut ack = Container::default();
        ack.set_msg_type(MsgType::PingAcknowledge);
        hub.push_inbound(&ack);
        client.process_socket();

        client.heartbeat_tick();
        client.heartbeat_tick();

        hub.push_inbound(&ack);
        client.process_socket();

        // Budget was recharged; two more ticks stay within it.
        client.heartbeat_tick();
        client.heartbeat_tick();
        assert_eq!(client.state(), LinkState::Up);
    }

    #[test]
    fn test_timeout_is_not_healed_by_traffic() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        let mut ack = Container::default();
        ack.set_msg_type(MsgType::PingAcknowledge);
        hub.push_inbound(&ack);
        client.process_socket();
        for _ in 0..3 {
            client.heartbeat_tick();
        }
        assert_eq!(client.state(), LinkState::Timeout);

        hub.push_inbound(&ack);
        client.process_socket();
        assert_eq!(client.state(), LinkState::Timeout);
    }

    #[test]
    fn test_send_without_socket_is_a_noop() {
        let hub = CommandHub::new();
        let mut client = client(&hub);

        let mut tx = Container::default();
        let events = client.send(MsgType::HalrcompBind, &mut tx);
        assert!(events.is_empty());
        assert!(hub.sent.borrow().is_empty());
    }

    #[test]
    fn test_send_clears_the_envelope() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        let mut tx = Container::default();
        tx.note.push("scratch".to_string());
        client.send(MsgType::HalrcompBind, &mut tx);
        assert!(tx.note.is_empty());
    }

    #[test]
    fn test_connect_failure_is_terminal_until_ready_cycle() {
        let hub = CommandHub::new();
        hub.fail_connect.set(true);
        let mut client = client(&hub);

        let events = client.set_ready(true);
        assert_eq!(states(&events), vec![LinkState::Trying, LinkState::Error]);
        assert_eq!(client.error_string(), "Error 111: Connection refused");

        let mut ack = Container::default();
        ack.set_msg_type(MsgType::PingAcknowledge);
        hub.push_inbound(&ack);
        client.process_socket();
        assert_eq!(client.state(), LinkState::Error);

        hub.fail_connect.set(false);
        client.set_ready(false);
        assert_eq!(client.state(), LinkState::Down);
        assert_eq!(client.error_string(), "");
        client.set_ready(true);
        assert_eq!(client.state(), LinkState::Trying);
    }

    #[test]
    fn test_send_error_moves_to_error_state() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        hub.fail_send.set(true);
        let mut tx = Container::default();
        let events = client.send(MsgType::HalrcompSet, &mut tx);
        assert_eq!(states(&events), vec![LinkState::Error]);
        assert_eq!(client.error_string(), "Error 32: Broken pipe");
    }

    #[test]
    fn test_stop_drops_the_socket() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);
        assert!(hub.live.get());

        client.set_ready(false);
        assert!(!hub.live.get());
        assert_eq!(client.state(), LinkState::Down);
        assert!(client.next_deadline().is_none());
    }

    #[test]
    fn test_undecodable_frame_is_dropped_without_transition() {
        let hub = CommandHub::new();
        let mut client = client(&hub);
        client.set_ready(true);

        hub.inbound
            .borrow_mut()
            .push_back(vec![vec![0xff, 0xff, 0xff, 0xff]]);
        let events = client.process_socket();
        assert!(events.is_empty());
        assert_eq!(client.state(), LinkState::Trying);
    }
}
