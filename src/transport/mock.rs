//! In-memory transports for driving the endpoint state machines in tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use prost::Message;

use crate::protocol::Container;

use super::socket::{CommandTransport, TransportError, UpdateTransport};

fn refused() -> TransportError {
    TransportError::Socket {
        errno: 111,
        message: "Connection refused".to_string(),
    }
}

/// Shared side-channel for a [`MockCommand`] transport. The test keeps the
/// hub; the endpoint owns the transports minted from it.
#[derive(Default)]
pub(crate) struct CommandHub {
    pub sent: RefCell<Vec<Vec<u8>>>,
    pub inbound: RefCell<VecDeque<Vec<Vec<u8>>>>,
    pub identities: RefCell<Vec<String>>,
    pub connects: Cell<usize>,
    pub fail_connect: Cell<bool>,
    pub fail_send: Cell<bool>,
    pub live: Cell<bool>,
}

impl CommandHub {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Connector closure for `RpcClient::with_connector`.
    pub fn connector(
        self: &Rc<Self>,
    ) -> impl FnMut(&str, &str) -> Result<MockCommand, TransportError> + 'static {
        let hub = Rc::clone(self);
        move |_uri, identity| {
            hub.connects.set(hub.connects.get() + 1);
            hub.identities.borrow_mut().push(identity.to_string());
            if hub.fail_connect.get() {
                return Err(refused());
            }
            hub.live.set(true);
            Ok(MockCommand {
                hub: Rc::clone(&hub),
            })
        }
    }

    /// Queues a decoded envelope as one inbound frame.
    pub fn push_inbound(&self, container: &Container) {
        self.inbound
            .borrow_mut()
            .push_back(vec![container.encode_to_vec()]);
    }

    /// Decodes every frame the endpoint sent so far.
    pub fn sent_containers(&self) -> Vec<Container> {
        self.sent
            .borrow()
            .iter()
            .map(|frame| Container::decode(frame.as_slice()).unwrap())
            .collect()
    }
}

pub(crate) struct MockCommand {
    hub: Rc<CommandHub>,
}

impl Drop for MockCommand {
    fn drop(&mut self) {
        self.hub.live.set(false);
    }
}

impl CommandTransport for MockCommand {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.hub.fail_send.get() {
            return Err(TransportError::Socket {
                errno: 32,
                message: "Broken pipe".to_string(),
            });
        }
        self.hub.sent.borrow_mut().push(frame.to_vec());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        Ok(self.hub.inbound.borrow_mut().pop_front())
    }
}

/// Subscription operation recorded by a [`MockUpdate`] transport, in call
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubOp {
    Subscribe(String),
    Unsubscribe(String),
}

/// Shared side-channel for a [`MockUpdate`] transport.
#[derive(Default)]
pub(crate) struct UpdateHub {
    pub ops: RefCell<Vec<SubOp>>,
    pub inbound: RefCell<VecDeque<Vec<Vec<u8>>>>,
    pub connects: Cell<usize>,
    pub fail_connect: Cell<bool>,
    pub live: Cell<bool>,
}

impl UpdateHub {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Connector closure for `Subscriber::with_connector`.
    pub fn connector(
        self: &Rc<Self>,
    ) -> impl FnMut(&str) -> Result<MockUpdate, TransportError> + 'static {
        let hub = Rc::clone(self);
        move |_uri| {
            hub.connects.set(hub.connects.get() + 1);
            if hub.fail_connect.get() {
                return Err(refused());
            }
            hub.live.set(true);
            Ok(MockUpdate {
                hub: Rc::clone(&hub),
            })
        }
    }

    /// Queues a `(topic, payload)` pair as one inbound message.
    pub fn push_message(&self, topic: &str, container: &Container) {
        self.inbound
            .borrow_mut()
            .push_back(vec![topic.as_bytes().to_vec(), container.encode_to_vec()]);
    }

    /// Queues raw frames, for malformed-input tests.
    pub fn push_frames(&self, frames: Vec<Vec<u8>>) {
        self.inbound.borrow_mut().push_back(frames);
    }
}

pub(crate) struct MockUpdate {
    hub: Rc<UpdateHub>,
}

impl Drop for MockUpdate {
    fn drop(&mut self) {
        self.hub.live.set(false);
    }
}

impl UpdateTransport for MockUpdate {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.hub
            .ops
            .borrow_mut()
            .push(SubOp::Subscribe(topic.to_string()));
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.hub
            .ops
            .borrow_mut()
            .push(SubOp::Unsubscribe(topic.to_string()));
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        Ok(self.hub.inbound.borrow_mut().pop_front())
    }
}
