//! Wire codec for envelopes, acknowledgements and typed bodies.
//!
//! # Message format
//!
//! ```text
//! +-----+---------------------------+
//! | tag | document                  |
//! +-----+---------------------------+
//!   u8    CBOR (tag 1, 2) or JSON (tag 3)
//! ```
//!
//! The tag is the [`TransformKind`] the sender chose; a reply is decoded
//! with the kind named by its own tag, not the request's. A zero-length
//! message means "no data" and is recognised by [`is_empty`] without any
//! decode attempt.
//!
//! Byte-stream transports add their own length prefix on top of this
//! format (see `transport::framing`).

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{log_trace, Envelope, QueueError, Result, TransformKind};

/// True when `bytes` carries no message at all.
pub fn is_empty(bytes: &[u8]) -> bool {
    bytes.is_empty()
}

/// Encode an envelope as a tagged message using its own transform kind.
pub fn encode_envelope(env: &Envelope) -> Result<Bytes> {
    encode_tagged(env.transform, env)
}

/// Decode a tagged message into an envelope.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    decode_tagged(bytes)
}

/// Encode any serializable value as a tagged message.
pub fn encode_tagged<T: Serialize>(kind: TransformKind, value: &T) -> Result<Bytes> {
    // ---
    let document = encode_value(kind, value)?;

    let mut buf = BytesMut::with_capacity(document.len() + 1);
    buf.put_u8(kind.tag());
    buf.put_slice(&document);

    log_trace!("encoded {kind:?} message, {} bytes", buf.len());
    Ok(buf.freeze())
}

/// Decode a tagged message into `T`.
///
/// # Errors
///
/// [`QueueError::Decode`] for an empty message or an unknown tag; the
/// format-specific error when the document does not match `T`.
pub fn decode_tagged<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (kind, document) = split_tag(bytes)?;
    decode_value(kind, document)
}

/// Read the transform tag and return it with the untagged document.
pub fn split_tag(bytes: &[u8]) -> Result<(TransformKind, &[u8])> {
    // ---
    let (&tag, document) = bytes
        .split_first()
        .ok_or_else(|| QueueError::Decode("empty message".into()))?;

    let kind = TransformKind::from_tag(tag)
        .ok_or_else(|| QueueError::Decode(format!("unknown transform tag {tag}")))?;

    Ok((kind, document))
}

/// Encode an untagged document (used for envelope bodies).
pub fn encode_value<T: Serialize>(kind: TransformKind, value: &T) -> Result<Bytes> {
    let bytes = match kind {
        TransformKind::Json => serde_json::to_vec(value)?,
        TransformKind::Object | TransformKind::Stream => serde_cbor::to_vec(value)?,
    };
    Ok(Bytes::from(bytes))
}

/// Decode an untagged document.
pub fn decode_value<T: DeserializeOwned>(kind: TransformKind, document: &[u8]) -> Result<T> {
    let value: T = match kind {
        TransformKind::Json => serde_json::from_slice(document)?,
        TransformKind::Object | TransformKind::Stream => serde_cbor::from_slice(document)?,
    };
    Ok(value)
}

/// Decode an untagged document without a target type.
///
/// JSON is returned as parsed; CBOR is converted into the equivalent JSON
/// value graph (byte strings become arrays of numbers).
pub fn decode_untyped(kind: TransformKind, document: &[u8]) -> Result<serde_json::Value> {
    match kind {
        TransformKind::Json => Ok(serde_json::from_slice(document)?),
        TransformKind::Object | TransformKind::Stream => {
            let value: serde_cbor::Value = serde_cbor::from_slice(document)?;
            Ok(serde_json::to_value(value)?)
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{Acknowledgement, DuplexMode, MessageState, Priority};

    fn sample(kind: TransformKind) -> Envelope {
        Envelope::new(&b"payload-bytes"[..])
            .with_host("Q1")
            .with_command("Enqueue")
            .with_duplex(DuplexMode::None)
            .with_priority(Priority::High)
            .with_transform(kind)
    }

    #[test]
    fn test_empty_is_detected_without_decode() {
        // ---
        assert!(is_empty(&[]));
        assert!(!is_empty(&[1]));
        assert!(matches!(decode_envelope(&[]), Err(QueueError::Decode(_))));
    }

    #[test]
    fn test_envelope_fields_survive_each_kind() {
        // ---
        for kind in [TransformKind::Object, TransformKind::Stream, TransformKind::Json] {
            let mut env = sample(kind);
            env.retry = 2;

            let bytes = encode_envelope(&env).unwrap();
            assert_eq!(bytes[0], kind.tag());

            let back = decode_envelope(&bytes).unwrap();
            assert_eq!(back.id(), env.id());
            assert_eq!(back.command, "Enqueue");
            assert_eq!(back.host, "Q1");
            assert_eq!(back.duplex, DuplexMode::None);
            assert_eq!(back.priority, Priority::High);
            assert_eq!(back.retry, 2);
            assert_eq!(back.body, env.body);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        // ---
        let err = decode_tagged::<Envelope>(&[9, 0, 0]).unwrap_err();
        assert!(matches!(err, QueueError::Decode(msg) if msg.contains("9")));
    }

    #[test]
    fn test_ack_decoded_with_reply_tag() {
        // ---
        let env = sample(TransformKind::Json);
        let ack = Acknowledgement::for_envelope(&env, MessageState::Arrived, "stored");
        let bytes = encode_tagged(TransformKind::Object, &ack).unwrap();

        let back: Acknowledgement = decode_tagged(&bytes).unwrap();
        assert_eq!(back, ack);
    }

    #[test]
    fn test_untyped_decode_of_cbor_document() {
        // ---
        let doc = encode_value(TransformKind::Object, &serde_json::json!({"n": 3})).unwrap();
        let value = decode_untyped(TransformKind::Object, &doc).unwrap();
        assert_eq!(value["n"], 3);
    }
}
