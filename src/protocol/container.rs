//! Message envelope and payload types.

/// Discriminator for every message exchanged with the remote HAL instance.
///
/// The numbering is stable for the lifetime of the protocol but carries no
/// meaning beyond identity; both ends agree on it through the shared schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MsgType {
    /// Liveness probe, client to halrcmd.
    Ping = 210,
    /// Liveness response, consumed silently by the client.
    PingAcknowledge = 211,
    /// Advertise a component and its declared pins.
    HalrcompBind = 256,
    /// Bind accepted.
    HalrcompBindConfirm = 257,
    /// Bind failed; notes carry the reason.
    HalrcompBindReject = 258,
    /// Push local pin changes, keyed by handle.
    HalrcompSet = 259,
    /// A previously bound pin change was rejected.
    HalrcompSetReject = 260,
    /// Authoritative snapshot of every pin, with handles and keepalive.
    HalrcompFullUpdate = 261,
    /// Handle-indexed pin deltas.
    HalrcompIncrementalUpdate = 262,
    /// Server-side error notes on the update channel.
    HalrcommandError = 263,
}

/// Value type of a pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ValueType {
    /// Boolean signal.
    Bit = 1,
    /// Double-precision float signal.
    Float = 2,
    /// Signed 32-bit signal.
    S32 = 3,
    /// Unsigned 32-bit signal.
    U32 = 4,
}

/// Direction of a pin as seen from the local component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PinDir {
    /// Written by the remote side only.
    In = 1,
    /// Written by the local side only.
    Out = 2,
    /// Written by either side.
    Io = 3,
}

/// The single message envelope.
///
/// Every envelope travels as one frame on the DEALER socket and as the
/// payload frame (after the topic frame) on the SUB socket.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Container {
    /// Message discriminator; decode through [`Container::msg_type`].
    #[prost(int32, tag = "1")]
    pub msg_type: i32,

    /// Declared or updated components.
    #[prost(message, repeated, tag = "2")]
    pub comp: Vec<Component>,

    /// Pin deltas outside a component scope (incremental updates, sets).
    #[prost(message, repeated, tag = "3")]
    pub pin: Vec<Pin>,

    /// Human-readable notes attached to rejects and errors.
    #[prost(string, repeated, tag = "4")]
    pub note: Vec<String>,

    /// Protocol parameters advertised by the publisher.
    #[prost(message, optional, tag = "5")]
    pub pparams: Option<ProtocolParameters>,
}

impl Container {
    /// Returns the decoded message kind, or `None` for an unknown
    /// discriminator.
    #[must_use]
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::try_from(self.msg_type).ok()
    }

    /// Sets the message kind.
    pub fn set_msg_type(&mut self, msg_type: MsgType) {
        self.msg_type = msg_type as i32;
    }

    /// Concatenates all notes, each terminated by a newline.
    #[must_use]
    pub fn joined_notes(&self) -> String {
        let mut text = String::new();
        for note in &self.note {
            text.push_str(note);
            text.push('\n');
        }
        text
    }
}

/// A component declaration or snapshot.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Component {
    /// Component name, unique per remote instance.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    /// When set, the bind fails if the component does not already exist
    /// on the remote side.
    #[prost(bool, optional, tag = "2")]
    pub no_create: Option<bool>,

    /// Pins declared or carried by this component.
    #[prost(message, repeated, tag = "3")]
    pub pin: Vec<Pin>,
}

/// A pin declaration or value delta.
///
/// Exactly one of the four value fields is present per message; which one
/// is determined by `value_type`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pin {
    /// Qualified pin name (`<component>.<pin>`) in declarations and full
    /// updates; absent in handle-keyed deltas.
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    /// Value type; decode through [`Pin::value_type_kind`].
    #[prost(int32, optional, tag = "2")]
    pub value_type: Option<i32>,

    /// Pin direction; decode through [`Pin::dir_kind`].
    #[prost(int32, optional, tag = "3")]
    pub dir: Option<i32>,

    /// Handle assigned by the remote side at full-update time. Zero means
    /// unassigned and must never appear in outbound deltas.
    #[prost(uint32, optional, tag = "4")]
    pub handle: Option<u32>,

    /// Boolean value.
    #[prost(bool, optional, tag = "5")]
    pub halbit: Option<bool>,

    /// Float value.
    #[prost(double, optional, tag = "6")]
    pub halfloat: Option<f64>,

    /// Signed 32-bit value.
    #[prost(sint32, optional, tag = "7")]
    pub hals32: Option<i32>,

    /// Unsigned 32-bit value.
    #[prost(uint32, optional, tag = "8")]
    pub halu32: Option<u32>,
}

impl Pin {
    /// Returns the decoded value type, if present and known.
    #[must_use]
    pub fn value_type_kind(&self) -> Option<ValueType> {
        self.value_type.and_then(|v| ValueType::try_from(v).ok())
    }

    /// Returns the decoded direction, if present and known.
    #[must_use]
    pub fn dir_kind(&self) -> Option<PinDir> {
        self.dir.and_then(|v| PinDir::try_from(v).ok())
    }
}

/// Parameters the publisher advertises in the first full update.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtocolParameters {
    /// Period within which the publisher commits to sending at least one
    /// message, in milliseconds.
    #[prost(uint32, optional, tag = "1")]
    pub keepalive_timer: Option<u32>,
}
