//! Local pin objects and the container tree they live in.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Sender;

use thiserror::Error;

use crate::protocol;

/// Value type of a local pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinType {
    /// Boolean signal.
    Bit,
    /// Double-precision float signal.
    Float,
    /// Signed 32-bit signal.
    S32,
    /// Unsigned 32-bit signal.
    U32,
}

impl PinType {
    pub(crate) fn to_wire(self) -> protocol::ValueType {
        match self {
            Self::Bit => protocol::ValueType::Bit,
            Self::Float => protocol::ValueType::Float,
            Self::S32 => protocol::ValueType::S32,
            Self::U32 => protocol::ValueType::U32,
        }
    }
}

/// Direction of a local pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// Written by the remote side only; never produces outbound changes.
    In,
    /// Written by the local side.
    Out,
    /// Written by either side.
    IO,
}

impl PinDirection {
    pub(crate) fn to_wire(self) -> protocol::PinDir {
        match self {
            Self::In => protocol::PinDir::In,
            Self::Out => protocol::PinDir::Out,
            Self::IO => protocol::PinDir::Io,
        }
    }
}

/// A typed pin value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinValue {
    Bit(bool),
    Float(f64),
    S32(i32),
    U32(u32),
}

impl PinValue {
    /// The type this value belongs to.
    #[must_use]
    pub fn pin_type(self) -> PinType {
        match self {
            Self::Bit(_) => PinType::Bit,
            Self::Float(_) => PinType::Float,
            Self::S32(_) => PinType::S32,
            Self::U32(_) => PinType::U32,
        }
    }

    /// The zero value for a pin type.
    #[must_use]
    pub fn zero(pin_type: PinType) -> Self {
        match pin_type {
            PinType::Bit => Self::Bit(false),
            PinType::Float => Self::Float(0.0),
            PinType::S32 => Self::S32(0),
            PinType::U32 => Self::U32(0),
        }
    }

    /// Reads the typed value carried by a wire pin, checking the four
    /// mutually exclusive fields in presence order.
    pub(crate) fn from_wire(pin: &protocol::Pin) -> Option<Self> {
        if let Some(v) = pin.halfloat {
            Some(Self::Float(v))
        } else if let Some(v) = pin.halbit {
            Some(Self::Bit(v))
        } else if let Some(v) = pin.hals32 {
            Some(Self::S32(v))
        } else {
            pin.halu32.map(Self::U32)
        }
    }

    /// Writes this value into the matching wire field.
    pub(crate) fn write_wire(self, pin: &mut protocol::Pin) {
        match self {
            Self::Bit(v) => pin.halbit = Some(v),
            Self::Float(v) => pin.halfloat = Some(v),
            Self::S32(v) => pin.hals32 = Some(v),
            Self::U32(v) => pin.halu32 = Some(v),
        }
    }
}

/// Errors raised by pin operations.
#[derive(Debug, Error)]
pub enum PinError {
    /// A value of the wrong type was written to a pin.
    #[error("type mismatch on pin '{pin}': expected {expected:?}, got {got:?}")]
    TypeMismatch {
        /// Pin name.
        pin: String,
        /// Declared pin type.
        expected: PinType,
        /// Type of the rejected value.
        got: PinType,
    },
}

/// Change notification queued for the owning component.
#[derive(Debug)]
pub(crate) struct PinChange {
    pub(crate) name: String,
}

/// A shared, interior-mutable pin handle.
pub type SharedPin = Rc<RefCell<HalPin>>;

/// A named typed signal in the local component, mirrored to the remote
/// side by handle after binding.
///
/// Pins are owned by the host environment and shared with the component
/// as [`SharedPin`]; the component itself only keeps weak references.
pub struct HalPin {
    name: String,
    pin_type: PinType,
    direction: PinDirection,
    value: PinValue,
    handle: u32,
    synced: bool,
    enabled: bool,
    notifier: Option<Sender<PinChange>>,
    watcher: Option<Box<dyn FnMut(&PinValue)>>,
}

impl HalPin {
    /// Creates a pin with the zero value for its type.
    #[must_use]
    pub fn new(name: impl Into<String>, pin_type: PinType, direction: PinDirection) -> Self {
        Self {
            name: name.into(),
            pin_type,
            direction,
            value: PinValue::zero(pin_type),
            handle: 0,
            synced: false,
            enabled: true,
            notifier: None,
            watcher: None,
        }
    }

    /// Creates a pin already wrapped for sharing with a component.
    #[must_use]
    pub fn new_shared(
        name: impl Into<String>,
        pin_type: PinType,
        direction: PinDirection,
    ) -> SharedPin {
        Rc::new(RefCell::new(Self::new(name, pin_type, direction)))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pin_type(&self) -> PinType {
        self.pin_type
    }

    #[must_use]
    pub fn direction(&self) -> PinDirection {
        self.direction
    }

    #[must_use]
    pub fn value(&self) -> PinValue {
        self.value
    }

    /// Handle assigned by the remote side; zero while unassigned.
    #[must_use]
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Whether the local value mirrors the remote authoritative value.
    #[must_use]
    pub fn synced(&self) -> bool {
        self.synced
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Disabled pins are skipped during discovery.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Registers a host callback fired on every value change, local or
    /// remote. The callback must not reach back into this pin.
    pub fn watch(&mut self, watcher: impl FnMut(&PinValue) + 'static) {
        self.watcher = Some(Box::new(watcher));
    }

    /// Host-side write. On an actual change the synced flag clears and the
    /// owning component is notified so the change can propagate outbound.
    ///
    /// Returns `true` if the value changed.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::TypeMismatch`] if the value type does not match
    /// the pin type.
    pub fn set_value(&mut self, value: PinValue) -> Result<bool, PinError> {
        self.check_type(value)?;
        if value == self.value {
            return Ok(false);
        }
        self.value = value;
        self.synced = false;
        if let Some(watcher) = self.watcher.as_mut() {
            watcher(&value);
        }
        if let Some(notifier) = &self.notifier {
            let _ = notifier.send(PinChange {
                name: self.name.clone(),
            });
        }
        Ok(true)
    }

    /// Remote-side write: marks the pin synced and never echoes back into
    /// the outbound queue.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::TypeMismatch`] if the value type does not match
    /// the pin type.
    pub(crate) fn apply_remote(&mut self, value: PinValue) -> Result<(), PinError> {
        self.check_type(value)?;
        let changed = value != self.value;
        self.value = value;
        self.synced = true;
        if changed {
            if let Some(watcher) = self.watcher.as_mut() {
                watcher(&value);
            }
        }
        Ok(())
    }

    pub(crate) fn set_notifier(&mut self, notifier: Option<Sender<PinChange>>) {
        self.notifier = notifier;
    }

    pub(crate) fn set_handle(&mut self, handle: u32) {
        self.handle = handle;
    }

    pub(crate) fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }

    fn check_type(&self, value: PinValue) -> Result<(), PinError> {
        if value.pin_type() == self.pin_type {
            Ok(())
        } else {
            Err(PinError::TypeMismatch {
                pin: self.name.clone(),
                expected: self.pin_type,
                got: value.pin_type(),
            })
        }
    }
}

impl std::fmt::Debug for HalPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HalPin")
            .field("name", &self.name)
            .field("pin_type", &self.pin_type)
            .field("direction", &self.direction)
            .field("value", &self.value)
            .field("handle", &self.handle)
            .field("synced", &self.synced)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Host-provided container of pins, possibly nested.
///
/// The component walks the tree depth-first at Start and collects every
/// enabled pin with a non-empty name.
#[derive(Debug, Default)]
pub struct PinContainer {
    pins: Vec<SharedPin>,
    children: Vec<PinContainer>,
}

impl PinContainer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pin at this level.
    pub fn add_pin(&mut self, pin: SharedPin) {
        self.pins.push(pin);
    }

    /// Nests a child container.
    pub fn add_child(&mut self, child: PinContainer) {
        self.children.push(child);
    }

    /// Visits every pin in the tree, depth-first.
    pub fn for_each_pin(&self, f: &mut impl FnMut(&SharedPin)) {
        for pin in &self.pins {
            f(pin);
        }
        for child in &self.children {
            child.for_each_pin(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_set_value_rejects_wrong_type() {
        let mut pin = HalPin::new("enable", PinType::Bit, PinDirection::Out);
        let err = pin.set_value(PinValue::Float(1.0)).unwrap_err();
        assert!(matches!(err, PinError::TypeMismatch { .. }));
        assert_eq!(pin.value(), PinValue::Bit(false));
    }

    #[test]
    fn test_set_value_notifies_only_on_change() {
        let (tx, rx) = channel();
        let mut pin = HalPin::new("enable", PinType::Bit, PinDirection::Out);
        pin.set_notifier(Some(tx));

        assert!(pin.set_value(PinValue::Bit(true)).unwrap());
        assert!(!pin.set_value(PinValue::Bit(true)).unwrap());

        assert_eq!(rx.try_iter().count(), 1);
        assert!(!pin.synced());
    }

    #[test]
    fn test_apply_remote_sets_synced_without_notifying() {
        let (tx, rx) = channel();
        let mut pin = HalPin::new("speed", PinType::Float, PinDirection::In);
        pin.set_notifier(Some(tx));

        pin.apply_remote(PinValue::Float(42.0)).unwrap();
        assert_eq!(pin.value(), PinValue::Float(42.0));
        assert!(pin.synced());
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_watcher_fires_for_both_directions() {
        use std::cell::Cell;
        use std::rc::Rc;

        let hits = Rc::new(Cell::new(0));
        let hits_in_watcher = Rc::clone(&hits);
        let mut pin = HalPin::new("count", PinType::U32, PinDirection::IO);
        pin.watch(move |_| hits_in_watcher.set(hits_in_watcher.get() + 1));

        pin.set_value(PinValue::U32(1)).unwrap();
        pin.apply_remote(PinValue::U32(2)).unwrap();
        // Unchanged remote value syncs without a watcher hit.
        pin.apply_remote(PinValue::U32(2)).unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_container_walk_is_depth_first() {
        let mut root = PinContainer::new();
        root.add_pin(HalPin::new_shared("a", PinType::Bit, PinDirection::Out));
        let mut child = PinContainer::new();
        child.add_pin(HalPin::new_shared("b", PinType::Bit, PinDirection::Out));
        root.add_child(child);

        let mut names = Vec::new();
        root.for_each_pin(&mut |pin| names.push(pin.borrow().name().to_string()));
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
