//! Typed messages over the transport-native dictionary.
//!
//! A `Messagable` type owns a stable type key and converts itself to and
//! from a `ConnectivityMessage`; `BinaryMessagable` refines that to an
//! opaque byte payload. Heterogeneous types share one channel by riding
//! inside a two-key envelope (`_wl_type` / `_wl_params`), so the receiver
//! can discriminate before constructing anything.

use bytes::Bytes;

use crate::errors::CodecError;
use wristlink_session::{ConnectivityMessage, MessageValue};

/// Reserved top-level key carrying the type key of an enveloped message.
pub const TYPE_KEY_FIELD: &str = "_wl_type";

/// Reserved top-level key carrying the parameters of an enveloped message.
pub const PARAMETERS_FIELD: &str = "_wl_params";

/// Reserved key wrapping raw bytes when a binary message rides the
/// dictionary transport.
pub const BINARY_PAYLOAD_FIELD: &str = "_wl_binary";

/// Default ceiling for serialized dictionary payloads, in bytes.
pub const DEFAULT_MESSAGE_SIZE_LIMIT: usize = 64 * 1024;

/// Which wire representation a send used. Recorded in every result for
/// observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTransport {
    /// The transport's native dictionary representation.
    Dictionary,
    /// Opaque bytes with a trailing type footer.
    Binary,
}

/// A value type that can ride the paired-device channel.
pub trait Messagable: Sized + Send + 'static {
    /// Stable key discriminating this type on the wire.
    ///
    /// Defaults to the unqualified Rust type name. Override when renaming
    /// a type must not break interop with already-deployed peers.
    fn type_key() -> &'static str {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name)
    }

    /// Serialize into transport-native values.
    fn to_message(&self) -> Result<ConnectivityMessage, CodecError>;

    /// Reconstruct from transport-native values.
    fn from_message(message: &ConnectivityMessage) -> Result<Self, CodecError>;
}

/// A `Messagable` refinement serializing to an opaque byte payload.
///
/// Implementers get the dictionary shape for free: wrap the bytes with
/// [`wrap_binary`] / [`unwrap_binary`] in their `Messagable` impl.
pub trait BinaryMessagable: Messagable {
    /// Serialize into the opaque payload carried ahead of the type footer.
    fn to_bytes(&self) -> Result<Bytes, CodecError>;

    /// Reconstruct from the opaque payload.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// Dictionary form of a binary payload: the bytes under one reserved key.
pub fn wrap_binary(bytes: Bytes) -> ConnectivityMessage {
    ConnectivityMessage::new().with(BINARY_PAYLOAD_FIELD, bytes)
}

/// Extract the byte payload from a wrapped binary dictionary.
pub fn unwrap_binary(message: &ConnectivityMessage) -> Result<&Bytes, CodecError> {
    match message.get(BINARY_PAYLOAD_FIELD) {
        Some(MessageValue::Bytes(bytes)) => Ok(bytes),
        Some(_) | None => Err(CodecError::InvalidBinaryData),
    }
}

/// Wrap a typed message in the two-key envelope used on the wire.
pub fn envelope<M: Messagable>(message: &M) -> Result<ConnectivityMessage, CodecError> {
    Ok(ConnectivityMessage::new()
        .with(TYPE_KEY_FIELD, M::type_key())
        .with(PARAMETERS_FIELD, message.to_message()?))
}

/// Split an enveloped message into its type key and parameters.
pub fn open_envelope(
    message: &ConnectivityMessage,
) -> Result<(&str, &ConnectivityMessage), CodecError> {
    let type_key = message
        .get_str(TYPE_KEY_FIELD)
        .ok_or(CodecError::MissingTypeKey)?;
    let parameters = message
        .get_map(PARAMETERS_FIELD)
        .ok_or_else(|| CodecError::DecodingFailed("missing parameters field".into()))?;
    Ok((type_key, parameters))
}

#[cfg(test)]
mod tests {
    use super::*;

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

    struct Renamed;

    impl Messagable for Renamed {
        fn type_key() -> &'static str {
            "legacy-name"
        }

        fn to_message(&self) -> Result<ConnectivityMessage, CodecError> {
            Ok(ConnectivityMessage::new())
        }

        fn from_message(_message: &ConnectivityMessage) -> Result<Self, CodecError> {
            Ok(Renamed)
        }
    }

    #[test]
    fn test_default_type_key_is_unqualified_name() {
        assert_eq!(Ping::type_key(), "Ping");
    }

    #[test]
    fn test_type_key_override() {
        assert_eq!(Renamed::type_key(), "legacy-name");
    }

    #[test]
    fn test_envelope_round_trip() {
        let enveloped = envelope(&Ping { value: 7 }).unwrap();
        let (key, parameters) = open_envelope(&enveloped).unwrap();
        assert_eq!(key, "Ping");

        let decoded = Ping::from_message(parameters).unwrap();
        assert_eq!(decoded.value, 7);
    }

    #[test]
    fn test_open_envelope_without_type_key() {
        let message = ConnectivityMessage::new().with("value", 7i64);
        assert_eq!(open_envelope(&message), Err(CodecError::MissingTypeKey));
    }

    #[test]
    fn test_open_envelope_without_parameters() {
        let message = ConnectivityMessage::new().with(TYPE_KEY_FIELD, "Ping");
        assert!(matches!(
            open_envelope(&message),
            Err(CodecError::DecodingFailed(_))
        ));
    }

    #[test]
    fn test_binary_wrap_round_trip() {
        let payload = Bytes::from_static(b"\x00\x01\x02");
        let wrapped = wrap_binary(payload.clone());
        assert_eq!(unwrap_binary(&wrapped).unwrap(), &payload);
    }

    #[test]
    fn test_unwrap_binary_rejects_wrong_value_type() {
        let message = ConnectivityMessage::new().with(BINARY_PAYLOAD_FIELD, "not bytes");
        assert_eq!(unwrap_binary(&message), Err(CodecError::InvalidBinaryData));
    }
}
