//! Capture of serialized update frames.
//!
//! Loro emits the encoded bytes of every local commit through its
//! local-update subscription. While capture is enabled each frame is kept,
//! so tests can assert what would have been transmitted and replay it on
//! another peer.

use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct CaptureState {
    enabled: bool,
    frames: Vec<Vec<u8>>,
}

/// Shared handle to the captured frames. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct UpdateCapture {
    inner: Arc<Mutex<CaptureState>>,
}

impl UpdateCapture {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureState {
                enabled,
                frames: Vec::new(),
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut CaptureState) -> R) -> R {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.with(|s| s.enabled = enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.with(|s| s.enabled)
    }

    /// Record a frame if capture is on.
    pub(crate) fn record(&self, frame: &[u8]) {
        self.with(|s| {
            if s.enabled {
                tracing::trace!(bytes = frame.len(), "captured update frame");
                s.frames.push(frame.to_vec());
            }
        });
    }

    /// Take every frame captured since the last drain, oldest first.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.with(|s| std::mem::take(&mut s.frames))
    }

    pub fn len(&self) -> usize {
        self.with(|s| s.frames.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_only_when_enabled() {
        let capture = UpdateCapture::new(false);
        assert!(!capture.is_enabled());
        capture.record(b"ignored");
        assert!(capture.is_empty());

        capture.set_enabled(true);
        assert!(capture.is_enabled());
        capture.record(b"one");
        capture.clone().record(b"two");
        assert_eq!(capture.len(), 2);
        assert_eq!(capture.drain(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(capture.drain().is_empty());
    }
}
