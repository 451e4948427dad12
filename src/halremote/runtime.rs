//! Single-threaded event loop driving a zmq-backed component.

use std::time::{Duration, Instant};

use crate::transport::{TransportError, ZmqCommand, ZmqUpdate};

use super::component::HalRemoteComponent;

/// A [`HalRemoteComponent`] over the production zmq transports.
pub type ZmqRemoteComponent = HalRemoteComponent<ZmqCommand, ZmqUpdate>;

/// Cooperative reactor for one component.
///
/// Each iteration drains the queued local pin changes, waits on both live
/// sockets with a timeout bounded by the earliest heartbeat deadline, and
/// then routes socket readiness and timer expiry into the component. The
/// zmq poll is the only suspension point.
pub struct Runtime {
    component: ZmqRemoteComponent,
}

impl Runtime {
    /// Wraps a component for event-loop driving.
    #[must_use]
    pub fn new(component: ZmqRemoteComponent) -> Self {
        Self { component }
    }

    /// Read access to the driven component.
    #[must_use]
    pub fn component(&self) -> &ZmqRemoteComponent {
        &self.component
    }

    /// Mutable access to the driven component, e.g. for readiness
    /// toggling between poll iterations.
    pub fn component_mut(&mut self) -> &mut ZmqRemoteComponent {
        &mut self.component
    }

    /// Releases the component.
    #[must_use]
    pub fn into_component(self) -> ZmqRemoteComponent {
        self.component
    }

    /// Runs one loop iteration, waiting at most `max_wait` for traffic.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll itself fails; endpoint-level socket
    /// errors surface through the component state instead.
    pub fn poll_once(&mut self, max_wait: Duration) -> Result<(), TransportError> {
        self.component.drain_pin_changes();

        let now = Instant::now();
        let mut timeout = max_wait;
        if let Some(deadline) = self.component.next_deadline() {
            timeout = timeout.min(deadline.saturating_duration_since(now));
        }

        let mut items = Vec::with_capacity(2);
        let mut command_index = None;
        let mut update_index = None;
        if let Some(item) = self.component.command_poll_item() {
            command_index = Some(items.len());
            items.push(item);
        }
        if let Some(item) = self.component.update_poll_item() {
            update_index = Some(items.len());
            items.push(item);
        }

        if items.is_empty() {
            // No live socket; the timer wait is the only thing left.
            std::thread::sleep(timeout);
        } else {
            let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            zmq::poll(&mut items, timeout_ms)?;
        }

        let command_ready = command_index.is_some_and(|i| items[i].is_readable());
        let update_ready = update_index.is_some_and(|i| items[i].is_readable());
        drop(items);

        if command_ready {
            self.component.pump_command();
        }
        if update_ready {
            self.component.pump_updates();
        }
        self.component.pump_timers(Instant::now());
        Ok(())
    }

    /// Polls until the component is made not-ready.
    ///
    /// # Errors
    ///
    /// Returns the first poll failure.
    pub fn run(&mut self) -> Result<(), TransportError> {
        while self.component.is_ready() {
            self.poll_once(Duration::from_millis(500))?;
        }
        Ok(())
    }
}

impl HalRemoteComponent<ZmqCommand, ZmqUpdate> {
    pub(crate) fn command_poll_item(&self) -> Option<zmq::PollItem<'_>> {
        self.command_transport().map(ZmqCommand::poll_item)
    }

    pub(crate) fn update_poll_item(&self) -> Option<zmq::PollItem<'_>> {
        self.update_transport().map(ZmqUpdate::poll_item)
    }
}
