//! Transport-native message values.
//!
//! The platform channel only carries a fixed set of value types. Modelling
//! them as a closed union keeps the wire surface fully specified instead of
//! leaking an open "anything serializable" type into the coordination layer.

use std::collections::BTreeMap;

use bytes::Bytes;

/// A value the transport can carry natively.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bytes(Bytes),
    List(Vec<MessageValue>),
    Map(ConnectivityMessage),
}

impl MessageValue {
    /// Conservative estimate of this value's serialized size in bytes.
    ///
    /// The platform serializer is opaque, so this mirrors the shape of the
    /// data rather than the exact wire bytes. Used for the payload ceiling
    /// check before a send is attempted.
    pub fn estimated_size(&self) -> usize {
        match self {
            MessageValue::String(s) => s.len() + 8,
            MessageValue::Integer(_) | MessageValue::Float(_) => 8,
            MessageValue::Bool(_) => 1,
            MessageValue::Bytes(b) => b.len() + 8,
            MessageValue::List(items) => {
                items.iter().map(MessageValue::estimated_size).sum::<usize>() + 8
            }
            MessageValue::Map(m) => m.estimated_size() + 8,
        }
    }

    /// Borrow as a string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MessageValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as an integer, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MessageValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrow as a bool, if this is a bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MessageValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as raw bytes, if this is a byte-buffer value.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            MessageValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow as a nested message, if this is a map value.
    pub fn as_map(&self) -> Option<&ConnectivityMessage> {
        match self {
            MessageValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<String> for MessageValue {
    fn from(v: String) -> Self {
        MessageValue::String(v)
    }
}

impl From<&str> for MessageValue {
    fn from(v: &str) -> Self {
        MessageValue::String(v.to_string())
    }
}

impl From<i64> for MessageValue {
    fn from(v: i64) -> Self {
        MessageValue::Integer(v)
    }
}

impl From<f64> for MessageValue {
    fn from(v: f64) -> Self {
        MessageValue::Float(v)
    }
}

impl From<bool> for MessageValue {
    fn from(v: bool) -> Self {
        MessageValue::Bool(v)
    }
}

impl From<Bytes> for MessageValue {
    fn from(v: Bytes) -> Self {
        MessageValue::Bytes(v)
    }
}

impl From<Vec<MessageValue>> for MessageValue {
    fn from(v: Vec<MessageValue>) -> Self {
        MessageValue::List(v)
    }
}

impl From<ConnectivityMessage> for MessageValue {
    fn from(v: ConnectivityMessage) -> Self {
        MessageValue::Map(v)
    }
}

/// A string-keyed message as carried by the transport.
///
/// Ephemeral: constructed per send or receive, never persisted. Key order
/// is irrelevant on the wire; a sorted map keeps iteration deterministic
/// for size accounting and tests.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectivityMessage {
    entries: BTreeMap<String, MessageValue>,
}

impl ConnectivityMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any existing value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MessageValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MessageValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&MessageValue> {
        self.entries.get(key)
    }

    /// Look up a string value by key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MessageValue::as_str)
    }

    /// Look up an integer value by key.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(MessageValue::as_i64)
    }

    /// Look up a bool value by key.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(MessageValue::as_bool)
    }

    /// Look up a byte-buffer value by key.
    pub fn get_bytes(&self, key: &str) -> Option<&Bytes> {
        self.get(key).and_then(MessageValue::as_bytes)
    }

    /// Look up a nested message by key.
    pub fn get_map(&self, key: &str) -> Option<&ConnectivityMessage> {
        self.get(key).and_then(MessageValue::as_map)
    }

    /// Remove a value by key.
    pub fn remove(&mut self, key: &str) -> Option<MessageValue> {
        self.entries.remove(key)
    }

    /// Whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the message has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MessageValue)> {
        self.entries.iter()
    }

    /// Conservative estimate of the serialized size in bytes.
    pub fn estimated_size(&self) -> usize {
        self.entries
            .iter()
            .map(|(k, v)| k.len() + v.estimated_size() + 8)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_typed_getters() {
        let mut msg = ConnectivityMessage::new();
        msg.insert("name", "wrist");
        msg.insert("count", 3i64);
        msg.insert("live", true);
        msg.insert("blob", Bytes::from_static(b"\x01\x02"));

        assert_eq!(msg.get_str("name"), Some("wrist"));
        assert_eq!(msg.get_i64("count"), Some(3));
        assert_eq!(msg.get_bool("live"), Some(true));
        assert_eq!(msg.get_bytes("blob").map(|b| b.len()), Some(2));
        assert!(msg.get("missing").is_none());
        assert_eq!(msg.len(), 4);
    }

    #[test]
    fn test_typed_getter_rejects_wrong_kind() {
        let msg = ConnectivityMessage::new().with("count", 3i64);
        assert!(msg.get_str("count").is_none());
        assert!(msg.get_bool("count").is_none());
    }

    #[test]
    fn test_nested_map() {
        let inner = ConnectivityMessage::new().with("x", 1i64);
        let msg = ConnectivityMessage::new().with("inner", inner.clone());
        assert_eq!(msg.get_map("inner"), Some(&inner));
    }

    #[test]
    fn test_estimated_size_grows_with_content() {
        let small = ConnectivityMessage::new().with("k", "v");
        let large = ConnectivityMessage::new().with("k", Bytes::from(vec![0u8; 1024]));
        assert!(large.estimated_size() > small.estimated_size());
        assert!(large.estimated_size() >= 1024);
    }

    #[test]
    fn test_insert_replaces_existing_key() {
        let mut msg = ConnectivityMessage::new();
        msg.insert("k", 1i64);
        msg.insert("k", 2i64);
        assert_eq!(msg.get_i64("k"), Some(2));
        assert_eq!(msg.len(), 1);
    }
}
