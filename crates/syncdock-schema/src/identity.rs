use crate::SchemaError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of a device identity.
pub const DEVICE_ID_LEN: usize = 32;
const GROUP_LEN: usize = 8;

/// Stable identity of this device, derived from its certificate.
///
/// The all-zero value is the empty identity: it is what callers see before
/// any certificate has been loaded and it renders as the empty string.
/// It must never be treated as a real device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId([u8; DEVICE_ID_LEN]);

impl DeviceId {
    pub const EMPTY: DeviceId = DeviceId([0; DEVICE_ID_LEN]);

    /// Derive the identity from the canonical bytes of a signed certificate body.
    pub fn from_certificate_body(body: &[u8]) -> Self {
        Self(*blake3::hash(body).as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; DEVICE_ID_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; DEVICE_ID_LEN] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// First group of the rendered identity, used in log lines.
    pub fn short(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        hex::encode_upper(&self.0[..GROUP_LEN / 2])
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let encoded = hex::encode_upper(self.0);
        for (i, group) in encoded.as_bytes().chunks(GROUP_LEN).enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            // hex output is always ASCII
            f.write_str(std::str::from_utf8(group).map_err(|_| fmt::Error)?)?;
        }
        Ok(())
    }
}

impl FromStr for DeviceId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .collect();
        if compact.is_empty() {
            return Ok(Self::EMPTY);
        }
        let mut bytes = [0u8; DEVICE_ID_LEN];
        hex::decode_to_slice(&compact, &mut bytes)
            .map_err(|_| SchemaError::InvalidDeviceId(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
