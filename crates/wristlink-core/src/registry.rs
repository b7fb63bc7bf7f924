//! Message type registry for decoding inbound payloads.
//!
//! The registry is built once from the set of message types an endpoint
//! understands, indexed by each type's key. Inbound dictionaries are
//! discriminated via the envelope's type key field; inbound binary
//! payloads via the codec's type footer.

use std::any::Any;
use std::collections::HashMap;

use tracing::debug;

use crate::codec;
use crate::errors::CodecError;
use crate::message::{open_envelope, BinaryMessagable, Messagable};
use wristlink_session::ConnectivityMessage;

type AnyMessage = Box<dyn Any + Send>;
type DictionaryConstructor =
    Box<dyn Fn(&ConnectivityMessage) -> Result<AnyMessage, CodecError> + Send + Sync>;
type BinaryConstructor = Box<dyn Fn(&[u8]) -> Result<AnyMessage, CodecError> + Send + Sync>;

struct RegisteredType {
    from_dictionary: DictionaryConstructor,
    from_binary: Option<BinaryConstructor>,
}

/// A decoded message together with the key that selected its type.
///
/// The value is type-erased; callers downcast to the registered type.
pub struct DecodedMessage {
    type_key: String,
    value: AnyMessage,
}

impl DecodedMessage {
    /// The type key that selected the constructor.
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Downcast to the registered concrete type.
    pub fn downcast<M: Messagable>(self) -> Result<M, CodecError> {
        let type_key = self.type_key;
        self.value
            .downcast::<M>()
            .map(|boxed| *boxed)
            .map_err(|_| CodecError::TypeKeyMismatch {
                expected: M::type_key().to_string(),
                found: type_key,
            })
    }
}

/// Registry mapping type keys to message constructors.
///
/// Registering a second type under an already-used key replaces the first
/// registration; key collisions are a caller error, not defended against.
#[derive(Default)]
pub struct MessageRegistry {
    entries: HashMap<String, RegisteredType>,
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dictionary-style message type.
    pub fn register<M: Messagable>(mut self) -> Self {
        debug!(type_key = M::type_key(), "registered message type");
        self.entries.insert(
            M::type_key().to_string(),
            RegisteredType {
                from_dictionary: Box::new(|message| {
                    M::from_message(message).map(|m| Box::new(m) as AnyMessage)
                }),
                from_binary: None,
            },
        );
        self
    }

    /// Register a binary-capable message type. Also usable on the
    /// dictionary transport via the reserved binary-wrapping key.
    pub fn register_binary<M: BinaryMessagable>(mut self) -> Self {
        debug!(type_key = M::type_key(), "registered binary message type");
        self.entries.insert(
            M::type_key().to_string(),
            RegisteredType {
                from_dictionary: Box::new(|message| {
                    M::from_message(message).map(|m| Box::new(m) as AnyMessage)
                }),
                from_binary: Some(Box::new(|bytes| {
                    M::from_bytes(bytes).map(|m| Box::new(m) as AnyMessage)
                })),
            },
        );
        self
    }

    /// Whether a type is registered under `type_key`.
    pub fn contains(&self, type_key: &str) -> bool {
        self.entries.contains_key(type_key)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode an enveloped dictionary message.
    pub fn decode(&self, message: &ConnectivityMessage) -> Result<DecodedMessage, CodecError> {
        let (type_key, parameters) = open_envelope(message)?;
        let entry = self
            .entries
            .get(type_key)
            .ok_or_else(|| CodecError::UnknownMessageType(type_key.to_string()))?;
        let value = (entry.from_dictionary)(parameters)?;
        Ok(DecodedMessage {
            type_key: type_key.to_string(),
            value,
        })
    }

    /// Decode a binary payload via its type footer.
    ///
    /// A key registered only as a dictionary-style type fails with
    /// `NotBinaryCapable` rather than silently falling back.
    pub fn decode_binary(&self, bytes: &[u8]) -> Result<DecodedMessage, CodecError> {
        let (type_key, payload) = codec::decode(bytes)?;
        let entry = self
            .entries
            .get(&type_key)
            .ok_or_else(|| CodecError::UnknownMessageType(type_key.clone()))?;
        let from_binary = entry
            .from_binary
            .as_ref()
            .ok_or_else(|| CodecError::NotBinaryCapable(type_key.clone()))?;
        let value = from_binary(&payload)?;
        Ok(DecodedMessage { type_key, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{envelope, unwrap_binary, wrap_binary};
    use bytes::Bytes;

    #[derive(Debug, PartialEq)]
    struct Ping {
        value: i64,
    }

    impl Messagable for Ping {
        fn to_message(&self) -> Result<ConnectivityMessage, CodecError> {
            Ok(ConnectivityMessage::new().with("value", self.value))
        }

        fn from_message(message: &ConnectivityMessage) -> Result<Self, CodecError> {
            let value = message
                .get_i64("value")
                .ok_or_else(|| CodecError::DecodingFailed("missing value".into()))?;
            Ok(Ping { value })
        }
    }

    #[derive(Debug, PartialEq)]
    struct Blob {
        data: Vec<u8>,
    }

    impl Messagable for Blob {
        fn to_message(&self) -> Result<ConnectivityMessage, CodecError> {
            Ok(wrap_binary(self.to_bytes()?))
        }

        fn from_message(message: &ConnectivityMessage) -> Result<Self, CodecError> {
            Self::from_bytes(unwrap_binary(message)?)
        }
    }

    impl BinaryMessagable for Blob {
        fn to_bytes(&self) -> Result<Bytes, CodecError> {
            Ok(Bytes::from(self.data.clone()))
        }

        fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
            Ok(Blob {
                data: bytes.to_vec(),
            })
        }
    }

    fn registry() -> MessageRegistry {
        MessageRegistry::new().register::<Ping>().register_binary::<Blob>()
    }

    #[test]
    fn test_decode_dictionary_message() {
        let enveloped = envelope(&Ping { value: 42 }).unwrap();
        let decoded = registry().decode(&enveloped).unwrap();
        assert_eq!(decoded.type_key(), "Ping");
        assert_eq!(decoded.downcast::<Ping>().unwrap(), Ping { value: 42 });
    }

    #[test]
    fn test_decode_missing_type_key() {
        let message = ConnectivityMessage::new().with("value", 1i64);
        assert!(matches!(
            registry().decode(&message),
            Err(CodecError::MissingTypeKey)
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        struct Stranger;
        impl Messagable for Stranger {
            fn to_message(&self) -> Result<ConnectivityMessage, CodecError> {
                Ok(ConnectivityMessage::new())
            }
            fn from_message(_: &ConnectivityMessage) -> Result<Self, CodecError> {
                Ok(Stranger)
            }
        }

        let enveloped = envelope(&Stranger).unwrap();
        assert!(matches!(
            registry().decode(&enveloped),
            Err(CodecError::UnknownMessageType(key)) if key == "Stranger"
        ));
    }

    #[test]
    fn test_decode_binary_message() {
        let blob = Blob {
            data: vec![1, 2, 3],
        };
        let encoded = codec::encode_message(&blob).unwrap();
        let decoded = registry().decode_binary(&encoded).unwrap();
        assert_eq!(decoded.downcast::<Blob>().unwrap(), blob);
    }

    #[test]
    fn test_decode_binary_for_dictionary_only_type() {
        // "Ping" is registered, but only dictionary-style.
        let encoded = codec::encode(b"\x01", "Ping");
        assert!(matches!(
            registry().decode_binary(&encoded),
            Err(CodecError::NotBinaryCapable(key)) if key == "Ping"
        ));
    }

    #[test]
    fn test_decode_binary_structural_error_propagates() {
        assert!(matches!(
            registry().decode_binary(b"\x01"),
            Err(CodecError::TruncatedFooter)
        ));
    }

    #[test]
    fn test_downcast_to_wrong_type() {
        let enveloped = envelope(&Ping { value: 1 }).unwrap();
        let decoded = registry().decode(&enveloped).unwrap();
        assert!(matches!(
            decoded.downcast::<Blob>(),
            Err(CodecError::TypeKeyMismatch { .. })
        ));
    }

    #[test]
    fn test_last_registration_wins_on_collision() {
        #[derive(Debug, PartialEq)]
        struct Impostor;
        impl Messagable for Impostor {
            fn type_key() -> &'static str {
                "Ping"
            }
            fn to_message(&self) -> Result<ConnectivityMessage, CodecError> {
                Ok(ConnectivityMessage::new())
            }
            fn from_message(_: &ConnectivityMessage) -> Result<Self, CodecError> {
                Ok(Impostor)
            }
        }

        let registry = MessageRegistry::new().register::<Ping>().register::<Impostor>();
        assert_eq!(registry.len(), 1);

        let enveloped = envelope(&Impostor).unwrap();
        let decoded = registry.decode(&enveloped).unwrap();
        assert_eq!(decoded.downcast::<Impostor>().unwrap(), Impostor);
    }

    #[test]
    fn test_binary_type_decodes_from_dictionary_wrapping() {
        let blob = Blob {
            data: vec![9, 9, 9],
        };
        let enveloped = envelope(&blob).unwrap();
        let decoded = registry().decode(&enveloped).unwrap();
        assert_eq!(decoded.downcast::<Blob>().unwrap(), blob);
    }
}
