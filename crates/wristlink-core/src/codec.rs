//! Self-describing binary wire format.
//!
//! Binary payloads carry a trailing type footer so heterogeneous message
//! types can share one data channel:
//!
//! ```text
//! [payload bytes][UTF-8 type-key bytes][key length, 4 bytes LE]
//! ```
//!
//! The footer trails the payload so encoders never need to know the
//! payload length up front. Pure functions; no transport state.

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::CodecError;
use crate::message::BinaryMessagable;

/// Size of the trailing length field.
const FOOTER_LENGTH_BYTES: usize = 4;

/// Append the type footer for `type_key` to `payload`.
pub fn encode(payload: &[u8], type_key: &str) -> Bytes {
    let key_bytes = type_key.as_bytes();
    let mut out = BytesMut::with_capacity(payload.len() + key_bytes.len() + FOOTER_LENGTH_BYTES);
    out.put_slice(payload);
    out.put_slice(key_bytes);
    out.put_u32_le(key_bytes.len() as u32);
    out.freeze()
}

/// Encode a typed binary message: its own payload plus the type footer.
pub fn encode_message<M: BinaryMessagable>(message: &M) -> Result<Bytes, CodecError> {
    let payload = message.to_bytes()?;
    Ok(encode(&payload, M::type_key()))
}

/// Split `bytes` into its type key and payload.
///
/// Fails structurally if the buffer cannot carry a footer or the declared
/// key length exceeds the buffer; fails on the key if it is not UTF-8.
pub fn decode(bytes: &[u8]) -> Result<(String, Bytes), CodecError> {
    if bytes.len() < FOOTER_LENGTH_BYTES {
        return Err(CodecError::TruncatedFooter);
    }

    let (body, length_field) = bytes.split_at(bytes.len() - FOOTER_LENGTH_BYTES);
    let mut length_bytes = [0u8; FOOTER_LENGTH_BYTES];
    length_bytes.copy_from_slice(length_field);
    let key_len = u32::from_le_bytes(length_bytes) as usize;

    if key_len > body.len() {
        return Err(CodecError::FooterLengthOutOfBounds {
            key_len,
            buffer_len: bytes.len(),
        });
    }

    let (payload, key_bytes) = body.split_at(body.len() - key_len);
    let type_key = std::str::from_utf8(key_bytes)
        .map_err(|_| CodecError::InvalidTypeKeyEncoding)?
        .to_string();

    Ok((type_key, Bytes::copy_from_slice(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_trip() {
        let encoded = encode(b"payload", "Ping");
        let (key, payload) = decode(&encoded).unwrap();
        assert_eq!(key, "Ping");
        assert_eq!(&payload[..], b"payload");
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let encoded = encode(b"", "Ping");
        let (key, payload) = decode(&encoded).unwrap();
        assert_eq!(key, "Ping");
        assert!(payload.is_empty());
    }

    #[test]
    fn test_footer_layout() {
        let encoded = encode(b"ab", "Xy");
        // payload || key || LE length
        assert_eq!(&encoded[..], b"abXy\x02\x00\x00\x00");
    }

    #[test]
    fn test_decode_short_buffer() {
        assert_eq!(decode(b""), Err(CodecError::TruncatedFooter));
        assert_eq!(decode(b"\x01\x02\x03"), Err(CodecError::TruncatedFooter));
    }

    #[test]
    fn test_decode_length_exceeding_buffer() {
        // Declares a 200-byte key in a 6-byte buffer.
        let mut buffer = b"ab".to_vec();
        buffer.extend_from_slice(&200u32.to_le_bytes());
        assert_eq!(
            decode(&buffer),
            Err(CodecError::FooterLengthOutOfBounds {
                key_len: 200,
                buffer_len: 6,
            })
        );
    }

    #[test]
    fn test_decode_invalid_utf8_key() {
        let mut buffer = b"payload".to_vec();
        buffer.extend_from_slice(&[0xff, 0xfe]);
        buffer.extend_from_slice(&2u32.to_le_bytes());
        assert_eq!(decode(&buffer), Err(CodecError::InvalidTypeKeyEncoding));
    }

    #[test]
    fn test_decode_exactly_four_bytes_zero_length() {
        // A bare zero-length footer is an empty key over an empty payload.
        let buffer = 0u32.to_le_bytes();
        let (key, payload) = decode(&buffer).unwrap();
        assert!(key.is_empty());
        assert!(payload.is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..512),
                           key in "[a-zA-Z0-9_.-]{1,64}") {
            let encoded = encode(&payload, &key);
            let (decoded_key, decoded_payload) = decode(&encoded).unwrap();
            prop_assert_eq!(decoded_key, key);
            prop_assert_eq!(&decoded_payload[..], &payload[..]);
        }

        #[test]
        fn prop_short_buffers_rejected(bytes in proptest::collection::vec(any::<u8>(), 0..4)) {
            prop_assert_eq!(decode(&bytes), Err(CodecError::TruncatedFooter));
        }

        #[test]
        fn prop_oversized_length_rejected(payload in proptest::collection::vec(any::<u8>(), 0..32),
                                          excess in 1u32..1024) {
            let mut buffer = payload.clone();
            let key_len = payload.len() as u32 + excess;
            buffer.extend_from_slice(&key_len.to_le_bytes());
            prop_assert!(
                matches!(
                    decode(&buffer),
                    Err(CodecError::FooterLengthOutOfBounds { .. })
                ),
                "expected FooterLengthOutOfBounds error"
            );
        }
    }
}
