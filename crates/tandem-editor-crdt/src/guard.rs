//! Direction guard for the two synchronization paths.
//!
//! At most one direction runs at a time. Local cycles push editor batches
//! into the CRDT under our origin tag; remote cycles replay CRDT changes
//! into the editor. The guard rejects overlapping cycles outright and
//! classifies observed transactions by origin so our own commits are never
//! replayed into the editor that produced them.

use std::fmt;

use smol_str::SmolStr;

use crate::SyncError;
use crate::event::Trigger;

/// Which way a cycle moves changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Editor to CRDT.
    Local,
    /// CRDT to editor.
    Remote,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Local => f.write_str("local"),
            Direction::Remote => f.write_str("remote"),
        }
    }
}

/// Current phase of the bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    ApplyingLocal,
    ApplyingRemote,
}

impl SyncState {
    fn active(self) -> Option<Direction> {
        match self {
            SyncState::Idle => None,
            SyncState::ApplyingLocal => Some(Direction::Local),
            SyncState::ApplyingRemote => Some(Direction::Remote),
        }
    }
}

impl From<Direction> for SyncState {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Local => SyncState::ApplyingLocal,
            Direction::Remote => SyncState::ApplyingRemote,
        }
    }
}

/// Proof that a cycle is running. Returned to [`OriginGuard::finish`].
#[derive(Debug)]
#[must_use = "a cycle must be finished to return the guard to idle"]
pub struct CycleToken {
    direction: Direction,
}

impl CycleToken {
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// How an observed transaction relates to this actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Our own local commit coming back through the observer.
    Echo,
    /// Anything else: imports, checkouts, commits tagged by another actor.
    External,
}

#[derive(Debug)]
pub struct OriginGuard {
    origin: SmolStr,
    state: SyncState,
}

impl OriginGuard {
    pub fn new(origin: impl Into<SmolStr>) -> Self {
        Self {
            origin: origin.into(),
            state: SyncState::Idle,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SyncState::Idle
    }

    /// Enter a cycle. Fails if another cycle is already running.
    pub fn begin(&mut self, direction: Direction) -> Result<CycleToken, SyncError> {
        if let Some(active) = self.state.active() {
            tracing::warn!(%active, requested = %direction, "rejecting overlapping sync cycle");
            return Err(SyncError::Reentrancy {
                active,
                requested: direction,
            });
        }
        self.state = direction.into();
        tracing::trace!(%direction, "sync cycle started");
        Ok(CycleToken { direction })
    }

    pub fn finish(&mut self, token: CycleToken) {
        debug_assert_eq!(self.state, SyncState::from(token.direction));
        self.state = SyncState::Idle;
        tracing::trace!(direction = %token.direction, "sync cycle finished");
    }

    /// Classify an observed transaction.
    pub fn classify(&self, origin: &str, trigger: Trigger) -> Provenance {
        if trigger == Trigger::Local && origin == self.origin {
            if self.state != SyncState::ApplyingLocal {
                tracing::warn!(origin, "own-origin commit observed outside a local cycle");
            }
            return Provenance::Echo;
        }
        Provenance::External
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_and_finish() {
        let mut guard = OriginGuard::new("me");
        let token = guard.begin(Direction::Local).unwrap();
        assert_eq!(guard.state(), SyncState::ApplyingLocal);
        guard.finish(token);
        assert!(guard.is_idle());

        let token = guard.begin(Direction::Remote).unwrap();
        assert_eq!(token.direction(), Direction::Remote);
        guard.finish(token);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut guard = OriginGuard::new("me");
        let token = guard.begin(Direction::Remote).unwrap();
        let err = guard.begin(Direction::Local).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Reentrancy {
                active: Direction::Remote,
                requested: Direction::Local
            }
        ));
        assert_eq!(guard.state(), SyncState::ApplyingRemote);
        guard.finish(token);
    }

    #[test]
    fn test_classify() {
        let mut guard = OriginGuard::new("me");
        let token = guard.begin(Direction::Local).unwrap();
        assert_eq!(guard.classify("me", Trigger::Local), Provenance::Echo);
        assert_eq!(guard.classify("other", Trigger::Local), Provenance::External);
        assert_eq!(guard.classify("", Trigger::Local), Provenance::External);
        // Imports carry the sender's tag, never ours to skip.
        assert_eq!(guard.classify("me", Trigger::Import), Provenance::External);
        guard.finish(token);
    }
}
