//! `ChannelName`: the correlation key threaded through logs, the coordinator's
//! registry, and IPC object names.

use std::fmt;

/// Non-empty opaque identifier for a stream source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

#[derive(Debug, thiserror::Error)]
#[error("channel name must not be empty")]
pub struct EmptyChannelName;

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self, EmptyChannelName> {
        let name = name.into();
        if name.is_empty() {
            return Err(EmptyChannelName);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sanitize for use as a segment of an IPC object name: non-alphanumeric
    /// characters become `_`.
    pub fn sanitized(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
