//! Lazily decoded response payload.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{codec, QueueError, Result, TransformKind};

/// Raw reply bytes plus the transform kind they declare.
///
/// Nothing is decoded until one of the consuming methods is called, and
/// every consuming method takes `self`: a carrier is created per response,
/// read once, then dropped. It is deliberately not `Clone`.
///
/// An empty carrier stands for "no data", either because the server sent
/// nothing or because the dispatcher converted a transport failure.
#[derive(Debug, Default)]
pub struct PayloadCarrier {
    raw: Bytes,
}

impl PayloadCarrier {
    /// Carrier representing "no data".
    pub fn empty() -> Self {
        Self { raw: Bytes::new() }
    }

    /// Wrap a tagged message exactly as received from a transport.
    pub fn from_wire(raw: Bytes) -> Self {
        Self { raw }
    }

    /// True if there are no bytes. Never decodes.
    pub fn is_empty(&self) -> bool {
        codec::is_empty(&self.raw)
    }

    /// Number of wire bytes, including the transform tag.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Transform kind declared by the payload's tag, if any.
    pub fn transform(&self) -> Option<TransformKind> {
        codec::split_tag(&self.raw).ok().map(|(kind, _)| kind)
    }

    /// Decode into `T`, returning decode failures to the caller.
    ///
    /// `Ok(None)` for an empty carrier.
    pub fn try_decode<T: DeserializeOwned>(self) -> Result<Option<T>> {
        if self.is_empty() {
            return Ok(None);
        }
        codec::decode_tagged(&self.raw).map(Some)
    }

    /// Decode into `T`, reporting a decode failure through `on_fault` and
    /// yielding `None` instead of an error.
    pub fn decode<T, F>(self, on_fault: F) -> Option<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&QueueError),
    {
        match self.try_decode() {
            Ok(value) => value,
            Err(err) => {
                on_fault(&err);
                None
            }
        }
    }

    /// Decode without a target type into a JSON value graph.
    pub fn decode_value<F>(self, on_fault: F) -> Option<serde_json::Value>
    where
        F: FnOnce(&QueueError),
    {
        if self.is_empty() {
            return None;
        }

        let decoded = codec::split_tag(&self.raw)
            .and_then(|(kind, document)| codec::decode_untyped(kind, document));

        match decoded {
            Ok(value) => Some(value),
            Err(err) => {
                on_fault(&err);
                None
            }
        }
    }

    /// Pass-through copy of the document, without the tag and without
    /// decoding. Empty if the carrier is empty or the tag is unreadable.
    pub fn copy_raw(self) -> Bytes {
        match codec::split_tag(&self.raw) {
            Ok((_, document)) => self.raw.slice(self.raw.len() - document.len()..),
            Err(_) => Bytes::new(),
        }
    }

    /// The wire bytes as received, tag included.
    pub fn into_inner(self) -> Bytes {
        self.raw
    }
}
