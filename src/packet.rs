//! The envelope carried across the native boundary in both directions

use serde::{Deserialize, Serialize};

/// A method name plus an optional opaque payload
///
/// The payload format is chosen by the caller; the bridge never inspects it.
/// `None` and `Some(vec![])` are distinct: the first means "no payload".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    method: String,
    data: Option<Vec<u8>>,
}

impl Packet {
    pub fn new(method: impl Into<String>, data: Option<Vec<u8>>) -> Self {
        Self {
            method: method.into(),
            data,
        }
    }

    /// A packet for `method` carrying no payload
    pub fn empty(method: impl Into<String>) -> Self {
        Self::new(method, None)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Consume the packet, keeping only its payload
    pub fn into_data(self) -> Option<Vec<u8>> {
        self.data
    }

    /// Build the reply to this packet: same method, new payload
    pub fn reply(&self, data: Option<Vec<u8>>) -> Self {
        Self::new(self.method.clone(), data)
    }
}
