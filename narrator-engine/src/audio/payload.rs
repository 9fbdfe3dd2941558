//! Synthesized audio payload

use std::sync::Arc;

/// Encoded audio clip bytes (opaque to the engine)
///
/// Cloning is cheap; every holder shares the same immutable buffer, so
/// cache entries can hand out copies without exposing mutation.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioPayload(Arc<[u8]>);

impl AudioPayload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for AudioPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for AudioPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl std::fmt::Debug for AudioPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AudioPayload({} bytes)", self.0.len())
    }
}
