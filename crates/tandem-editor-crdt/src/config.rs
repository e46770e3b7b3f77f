//! Bridge configuration.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Origin tag attached to transactions committed by the local actor.
pub const DEFAULT_ORIGIN: &str = "tandem-local";

/// Name of the root list holding the top-level nodes.
pub const DEFAULT_ROOT: &str = "content";

/// Configuration for a [`SyncController`](crate::SyncController).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Transaction origin tag of this actor.
    pub origin: SmolStr,
    /// Root container name.
    pub root: SmolStr,
    /// Whether update capture starts enabled.
    pub capture_updates: bool,
    /// Fixed Loro peer id. Random when unset.
    pub peer_id: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            origin: SmolStr::new_static(DEFAULT_ORIGIN),
            root: SmolStr::new_static(DEFAULT_ROOT),
            capture_updates: false,
            peer_id: None,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: impl Into<SmolStr>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_root(mut self, root: impl Into<SmolStr>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_capture(mut self, enabled: bool) -> Self {
        self.capture_updates = enabled;
        self
    }

    pub fn with_peer_id(mut self, peer_id: u64) -> Self {
        self.peer_id = Some(peer_id);
        self
    }
}
