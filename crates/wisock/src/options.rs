//! Socket option codecs
//!
//! A static table maps the option names accepted on the command surface to
//! the stack's option codes. Each entry may carry an encode codec (text to
//! [`OptionData`]) used by "set", and a formatter (an [`OptionData`] to text)
//! used by "get". Options without a codec can't be set, options without a
//! formatter can't be read.

use core::{fmt, net::Ipv6Addr, str::FromStr};

use serde::{Deserialize, Serialize};

/// Option selector understood by the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketOptionCode {
    EventMode,
    MulticastGroup,
    SendBufferLimit,
}

/// How the stack reports received data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventMode {
    /// Data is pushed along with the indication
    Indication = 0,
    /// Only the length is indicated, data is pulled with a read
    Polling = 1,
}

impl EventMode {
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MulticastAction {
    Join,
    Leave,
}

/// The stack's binary representation of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionData {
    EventMode(EventMode),
    MulticastGroup {
        action: MulticastAction,
        address: Ipv6Addr,
    },
    SendBufferLimit {
        limit: u32,
    },
}

/// Why an option couldn't be encoded, decoded or applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OptionError {
    /// The name is not in the table, or the option can't be set
    InvalidName,
    /// The codec rejected the value
    InvalidData,
    /// The option exists but has no formatter
    NotReadable,
}

impl fmt::Display for OptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionError::InvalidName => f.write_str("invalid option parameter"),
            OptionError::InvalidData => f.write_str("invalid option data parameter"),
            OptionError::NotReadable => f.write_str("option is not readable"),
        }
    }
}

pub type EncodeFn = fn(&str) -> Result<OptionData, ()>;
pub type FormatFn = fn(&OptionData) -> Option<String>;

pub struct OptionDescriptor {
    pub name: &'static str,
    pub code: SocketOptionCode,
    pub encode: Option<EncodeFn>,
    pub format: Option<FormatFn>,
}

impl fmt::Debug for OptionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionDescriptor")
            .field("name", &self.name)
            .field("code", &self.code)
            .field("settable", &self.encode.is_some())
            .field("readable", &self.format.is_some())
            .finish()
    }
}

pub static OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor {
        name: "event_mode",
        code: SocketOptionCode::EventMode,
        encode: Some(encode_event_mode),
        format: None,
    },
    OptionDescriptor {
        name: "join_multicast_group",
        code: SocketOptionCode::MulticastGroup,
        encode: Some(encode_join_multicast_group),
        format: None,
    },
    OptionDescriptor {
        name: "leave_multicast_group",
        code: SocketOptionCode::MulticastGroup,
        encode: Some(encode_leave_multicast_group),
        format: None,
    },
    OptionDescriptor {
        name: "send_buffer_limit",
        code: SocketOptionCode::SendBufferLimit,
        encode: None,
        format: Some(format_send_buffer_limit),
    },
];

const EVENT_MODES: &[(&str, EventMode)] = &[
    ("indication", EventMode::Indication),
    ("polling", EventMode::Polling),
];

fn encode_event_mode(s: &str) -> Result<OptionData, ()> {
    EVENT_MODES
        .iter()
        .find(|(name, _)| *name == s)
        .map(|(_, mode)| OptionData::EventMode(*mode))
        .ok_or(())
}

fn encode_multicast_group(action: MulticastAction, s: &str) -> Result<OptionData, ()> {
    let address = Ipv6Addr::from_str(s).map_err(drop)?;
    Ok(OptionData::MulticastGroup { action, address })
}

fn encode_join_multicast_group(s: &str) -> Result<OptionData, ()> {
    encode_multicast_group(MulticastAction::Join, s)
}

fn encode_leave_multicast_group(s: &str) -> Result<OptionData, ()> {
    encode_multicast_group(MulticastAction::Leave, s)
}

fn format_send_buffer_limit(data: &OptionData) -> Option<String> {
    match data {
        OptionData::SendBufferLimit { limit } => Some(limit.to_string()),
        _ => None,
    }
}

/// Exact, case-sensitive lookup.
pub fn descriptor(name: &str) -> Option<&'static OptionDescriptor> {
    OPTIONS.iter().find(|d| d.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    OPTIONS.iter().map(|d| d.name)
}

/// Encode `raw` for the option `name`.
pub fn encode(name: &str, raw: &str) -> Result<(SocketOptionCode, OptionData), OptionError> {
    let desc = descriptor(name).ok_or(OptionError::InvalidName)?;
    let codec = desc.encode.ok_or(OptionError::InvalidName)?;
    let data = codec(raw).map_err(|()| OptionError::InvalidData)?;
    Ok((desc.code, data))
}

/// Render a value read back from the stack.
pub fn format(desc: &OptionDescriptor, data: &OptionData) -> Result<String, OptionError> {
    let formatter = desc.format.ok_or(OptionError::NotReadable)?;
    formatter(data).ok_or(OptionError::InvalidData)
}
