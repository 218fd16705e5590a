/// Message as handed to the broker transport.
///
/// `key == None` lets the partition balancer choose where the message lands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WireMessage {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl WireMessage {
    pub fn new(key: Option<Vec<u8>>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    /// Bytes this message contributes to a partition's load.
    pub fn size(&self) -> usize {
        self.key.as_ref().map_or(0, Vec::len) + self.value.len()
    }

    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| core::str::from_utf8(k).ok())
    }
}
