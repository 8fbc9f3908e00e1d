//! Application settings consulted by the registry
//!
//! [`Settings`] can be stored as a compact postcard blob and read back with
//! [`Settings::from_blob`].

use heapless::Vec as HVec;
use serde::{Deserialize, Serialize};

/// Longest ping payload pattern that can be configured.
pub const PING_PATTERN_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    pub app: AppSettings,
    pub ping: PingSettings,
}

/// How received payloads are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Bytes per output line, 0 disables the dump
    pub printable_data_length: u16,
    pub printable_data_as_hex: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            printable_data_length: 40,
            printable_data_as_hex: false,
        }
    }
}

/// Echo request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSettings {
    /// Full packet length, echo header included, used when a ping names none
    pub packet_length: u16,
    pub identifier: u16,
    pub sequence_number: u16,
    /// Repeated to fill the payload. Zero bytes are sent if empty.
    pub pattern: HVec<u8, PING_PATTERN_CAPACITY>,
}

impl Default for PingSettings {
    fn default() -> Self {
        let mut pattern = HVec::new();
        // ten bytes always fit
        let _ = pattern.extend_from_slice(b"0123456789");
        Self {
            packet_length: 40,
            identifier: 0xEEEE,
            sequence_number: 1,
            pattern,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    Serialization(postcard::Error),
}

impl From<postcard::Error> for SettingsError {
    fn from(value: postcard::Error) -> Self {
        Self::Serialization(value)
    }
}

impl Settings {
    pub fn to_blob(&self) -> Result<Vec<u8>, SettingsError> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, SettingsError> {
        Ok(postcard::from_bytes(blob)?)
    }
}

#[cfg(test)]
mod test {
    use super::{Settings, SettingsError};

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.app.printable_data_length, 40);
        assert!(!s.app.printable_data_as_hex);
        assert_eq!(s.ping.packet_length, 40);
        assert_eq!(s.ping.identifier, 0xEEEE);
        assert_eq!(s.ping.sequence_number, 1);
        assert_eq!(s.ping.pattern.as_slice(), b"0123456789");
    }

    #[test]
    fn blob() {
        let mut s = Settings::default();
        s.app.printable_data_as_hex = true;
        s.ping.pattern.clear();
        s.ping.pattern.extend_from_slice(b"xy").unwrap();

        let blob = s.to_blob().unwrap();
        assert_eq!(Settings::from_blob(&blob).unwrap(), s);

        assert!(matches!(
            Settings::from_blob(&blob[..3]),
            Err(SettingsError::Serialization(_))
        ));
    }
}
