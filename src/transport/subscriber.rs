//! Subscribing endpoint for the halrcomp service.

use std::collections::BTreeSet;
use std::mem;
use std::time::{Duration, Instant};

use prost::Message;
use tracing::{debug, trace, warn};

use crate::protocol::{Container, MsgType};

use super::link::LinkState;
use super::socket::{TransportError, UpdateTransport, ZmqUpdate};

/// Event delivered to the owner of a [`Subscriber`].
#[derive(Debug)]
pub enum SubEvent {
    /// The link state changed; read `error_string()` for error details.
    StateChanged(LinkState),
    /// A decoded non-ping message arrived on a subscribed topic.
    Message {
        /// Topic frame the publisher used. Informational; not checked
        /// against the subscription set.
        topic: String,
        /// Decoded envelope, handed over by value.
        container: Container,
    },
}

/// Subscribing endpoint with topic management, full/incremental resync
/// semantics, and publisher-driven keepalive.
///
/// The desired topic set is configured through [`Subscriber::add_topic`]
/// and friends; Start mirrors it into the active subscription set. The
/// silence budget is learned from the publisher: twice the keepalive
/// period advertised in the first full update. Any message received while
/// the link is not up triggers an unsubscribe-then-subscribe cycle, which
/// forces the publisher into emitting a fresh full update.
pub struct Subscriber<T: UpdateTransport> {
    uri: String,
    debug_name: String,
    connector: Box<dyn FnMut(&str) -> Result<T, TransportError>>,
    transport: Option<T>,
    state: LinkState,
    error_string: String,
    topics: BTreeSet<String>,
    subscriptions: BTreeSet<String>,
    heartbeat_period_ms: u64,
    deadline: Option<Instant>,
    ready: bool,
    rx: Container,
}

impl<T: UpdateTransport> Subscriber<T> {
    /// Creates an endpoint that opens its transport through `connector`
    /// on every Start.
    pub fn with_connector(
        connector: impl FnMut(&str) -> Result<T, TransportError> + 'static,
    ) -> Self {
        Self {
            uri: String::new(),
            debug_name: String::new(),
            connector: Box::new(connector),
            transport: None,
            state: LinkState::Down,
            error_string: String::new(),
            topics: BTreeSet::new(),
            subscriptions: BTreeSet::new(),
            heartbeat_period_ms: 0,
            deadline: None,
            ready: false,
            rx: Container::default(),
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

    /// Adds a topic to the desired set. Does not touch the socket.
    pub fn add_topic(&mut self, name: impl Into<String>) {
        self.topics.insert(name.into());
    }

    /// Removes a topic from the desired set. Does not touch the socket.
    pub fn remove_topic(&mut self, name: &str) {
        self.topics.remove(name);
    }

    /// Clears the desired topic set. Does not touch the socket.
    pub fn clear_topics(&mut self) {
        self.topics.clear();
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

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Silence budget currently in effect, in milliseconds. Zero until the
    /// first full update advertises the publisher keepalive.
    #[must_use]
    pub fn heartbeat_period_ms(&self) -> u64 {
        self.heartbeat_period_ms
    }

    pub(crate) fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Toggles the endpoint lifecycle. Idempotent.
    pub fn set_ready(&mut self, ready: bool) -> Vec<SubEvent> {
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

    /// Drains the socket, decoding every queued `(topic, payload)` pair.
    pub fn process_socket(&mut self) -> Vec<SubEvent> {
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

    /// Next instant the silence timer fires, if armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Runs the silence timeout if its deadline has passed.
    pub fn handle_timers(&mut self, now: Instant) -> Vec<SubEvent> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.heartbeat_tick(),
            _ => Vec::new(),
        }
    }

    /// One silence-timer expiry: the publisher went quiet for the whole
    /// budget, so the link times out and the timer stops.
    pub fn heartbeat_tick(&mut self) -> Vec<SubEvent> {
        let mut events = Vec::new();
        debug!("{}: publisher silence budget exhausted", self.debug_name);
        self.update_state(LinkState::Timeout, String::new(), &mut events);
        events
    }

    fn start(&mut self, events: &mut Vec<SubEvent>) {
        debug!("{}: start", self.debug_name);
        match (self.connector)(&self.uri) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.subscribe_all(events);
            }
            Err(err) => {
                self.update_state(LinkState::Error, err.to_string(), events);
            }
        }
    }

    fn stop(&mut self, events: &mut Vec<SubEvent>) {
        debug!("{}: stop", self.debug_name);
        self.deadline = None;
        self.heartbeat_period_ms = 0;
        self.subscriptions.clear();
        self.transport = None;
        self.update_state(LinkState::Down, String::new(), events);
    }

    /// Applies a SUBSCRIBE for every desired topic and mirrors them into
    /// the active set. Resets the silence budget; it is re-learned from
    /// the next full update.
    fn subscribe_all(&mut self, events: &mut Vec<SubEvent>) {
        self.update_state(LinkState::Trying, String::new(), events);
        self.heartbeat_period_ms = 0;
        self.deadline = None;

        let mut failure = None;
        if let Some(transport) = self.transport.as_mut() {
            for topic in &self.topics {
                if let Err(err) = transport.subscribe(topic) {
                    failure = Some(err);
                    break;
                }
                self.subscriptions.insert(topic.clone());
            }
        }
        if let Some(err) = failure {
            self.update_state(LinkState::Error, err.to_string(), events);
        }
    }

    /// Removes every active subscription.
    fn unsubscribe_all(&mut self, events: &mut Vec<SubEvent>) {
        self.update_state(LinkState::Down, String::new(), events);

        let subscriptions = mem::take(&mut self.subscriptions);
        let mut failure = None;
        if let Some(transport) = self.transport.as_mut() {
            for topic in &subscriptions {
                if let Err(err) = transport.unsubscribe(topic) {
                    failure = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            self.update_state(LinkState::Error, err.to_string(), events);
        }
    }

    fn handle_frames(&mut self, frames: &[Vec<u8>], events: &mut Vec<SubEvent>) {
        // Topic and payload at minimum; anything shorter is noise.
        let [topic_frame, payload, ..] = frames else {
            trace!("{}: dropping short multipart message", self.debug_name);
            return;
        };

        self.rx.clear();
        if let Err(err) = self.rx.merge(payload.as_slice()) {
            warn!("{}: dropping undecodable frame: {}", self.debug_name, err);
            return;
        }

        if self.rx.msg_type() == Some(MsgType::HalrcompFullUpdate) {
            self.update_state(LinkState::Up, String::new(), events);
            if let Some(keepalive) = self.rx.pparams.as_ref().and_then(|p| p.keepalive_timer) {
                // The effective silence budget is double the advertised
                // keepalive interval.
                self.heartbeat_period_ms = u64::from(keepalive) * 2;
            }
        }

        if self.state == LinkState::Up {
            self.refresh_heartbeat();
            if self.rx.msg_type() != Some(MsgType::Ping) {
                events.push(SubEvent::Message {
                    topic: String::from_utf8_lossy(topic_frame).into_owned(),
                    container: mem::take(&mut self.rx),
                });
            }
        } else {
            // Desynchronized: force the publisher into a fresh full update.
            self.unsubscribe_all(events);
            self.subscribe_all(events);
        }
    }

    fn refresh_heartbeat(&mut self) {
        if self.heartbeat_period_ms > 0 && self.state.allows_heartbeat() {
            self.deadline = Some(Instant::now() + Duration::from_millis(self.heartbeat_period_ms));
        } else {
            self.deadline = None;
        }
    }

    fn update_state(&mut self, state: LinkState, error_string: String, events: &mut Vec<SubEvent>) {
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
        events.push(SubEvent::StateChanged(state));
    }
}

impl Subscriber<ZmqUpdate> {
    /// Creates a zmq-backed endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(ZmqUpdate::connect)
    }
}

impl Default for Subscriber<ZmqUpdate> {
    fn default() -> Self {
        Self::new()
    }
}
