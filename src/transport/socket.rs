//! Socket seams and their ZeroMQ implementations.
//!
//! The endpoints are generic over these traits so the protocol state
//! machines can be driven without a message-queue library. [`ZmqCommand`]
//! and [`ZmqUpdate`] are the production implementations; each owns its
//! `zmq::Context` and `zmq::Socket`, created on Start and dropped on Stop.

use thiserror::Error;

/// Errors raised by the transport layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Socket construction, connect, or I/O failure. The display form is
    /// the error text surfaced on the endpoint (`"Error <num>: <msg>"`).
    #[error("Error {errno}: {message}")]
    Socket {
        /// Errno reported by the transport library.
        errno: i32,
        /// Human-readable message.
        message: String,
    },
}

impl From<zmq::Error> for TransportError {
    fn from(err: zmq::Error) -> Self {
        Self::Socket {
            errno: err.to_raw(),
            message: err.message().to_string(),
        }
    }
}

/// Request/reply side of the transport: a connection that can send single
/// frames and drain inbound multipart messages without blocking.
pub trait CommandTransport {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying send fails.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Receives one complete multipart message, or `None` if nothing is
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying receive fails.
    fn try_recv(&mut self) -> Result<Option<Vec<Vec<u8>>>, TransportError>;
}

/// Subscribe side of the transport: a connection with a subscription set
/// and non-blocking multipart receive.
pub trait UpdateTransport {
    /// Subscribes to a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be applied.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Unsubscribes from a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be removed.
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Receives one complete multipart message, or `None` if nothing is
    /// queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying receive fails.
    fn try_recv(&mut self) -> Result<Option<Vec<Vec<u8>>>, TransportError>;
}

/// DEALER connection to the halrcmd service.
pub struct ZmqCommand {
    socket: zmq::Socket,
    // Kept alive for the lifetime of the socket; dropped after it.
    _context: zmq::Context,
}

impl ZmqCommand {
    /// Connects a DEALER socket with the given routing identity.
    ///
    /// Linger is zero so dropping the transport never blocks on queued
    /// outbound frames.
    ///
    /// # Errors
    ///
    /// Returns an error if socket construction or connect fails.
    pub fn connect(uri: &str, identity: &str) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::DEALER)?;
        socket.set_linger(0)?;
        socket.set_identity(identity.as_bytes())?;
        socket.connect(uri)?;
        Ok(Self {
            socket,
            _context: context,
        })
    }

    /// Poll item for readability, for use by the event loop.
    #[must_use]
    pub fn poll_item(&self) -> zmq::PollItem<'_> {
        self.socket.as_poll_item(zmq::POLLIN)
    }
}

impl CommandTransport for ZmqCommand {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.socket.send(frame, 0)?;
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        recv_multipart(&self.socket)
    }
}

/// SUB connection to the halrcomp service.
pub struct ZmqUpdate {
    socket: zmq::Socket,
    _context: zmq::Context,
}

impl ZmqUpdate {
    /// Connects a SUB socket. No topics are subscribed yet.
    ///
    /// # Errors
    ///
    /// Returns an error if socket construction or connect fails.
    pub fn connect(uri: &str) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::SUB)?;
        socket.set_linger(0)?;
        socket.connect(uri)?;
        Ok(Self {
            socket,
            _context: context,
        })
    }

    /// Poll item for readability, for use by the event loop.
    #[must_use]
    pub fn poll_item(&self) -> zmq::PollItem<'_> {
        self.socket.as_poll_item(zmq::POLLIN)
    }
}

impl UpdateTransport for ZmqUpdate {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.socket.set_subscribe(topic.as_bytes())?;
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.socket.set_unsubscribe(topic.as_bytes())?;
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
        recv_multipart(&self.socket)
    }
}

/// Drains one multipart message without blocking. All frames of a message
/// arrive atomically once the first frame is readable.
fn recv_multipart(socket: &zmq::Socket) -> Result<Option<Vec<Vec<u8>>>, TransportError> {
    match socket.recv_bytes(zmq::DONTWAIT) {
        Ok(first) => {
            let mut frames = vec![first];
            while socket.get_rcvmore()? {
                frames.push(socket.recv_bytes(0)?);
            }
            Ok(Some(frames))
        }
        Err(zmq::Error::EAGAIN) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display_carries_errno() {
        let err = TransportError::Socket {
            errno: 111,
            message: "Connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "Error 111: Connection refused");
    }
}
