//! Session generation tokens.
//!
//! Every asynchronous completion (channel event, snapshot response, command
//! result) captures the epoch it was started under. Logout advances the
//! epoch, so anything still in flight from the old session is recognised as
//! stale and discarded instead of being applied to a fresh inbox.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generation captured at the start of an asynchronous operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpochToken(pub u64);

/// Shared, monotonically increasing session generation.
#[derive(Clone, Debug, Default)]
pub struct SessionEpoch {
    current: Arc<AtomicU64>,
}

impl SessionEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current generation.
    pub fn token(&self) -> EpochToken {
        EpochToken(self.current.load(Ordering::SeqCst))
    }

    /// Whether a captured token still belongs to the live session.
    pub fn is_current(&self, token: EpochToken) -> bool {
        self.current.load(Ordering::SeqCst) == token.0
    }

    /// Invalidate every outstanding token. Returns the new generation.
    pub fn advance(&self) -> EpochToken {
        EpochToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Scope bound to the current generation.
    pub fn scope(&self) -> EpochScope {
        self.scope_of(self.token())
    }

    /// Scope bound to a previously captured token.
    pub fn scope_of(&self, token: EpochToken) -> EpochScope {
        EpochScope {
            epoch: self.clone(),
            token,
        }
    }
}

/// A captured token together with the epoch it must be checked against.
#[derive(Clone, Debug)]
pub struct EpochScope {
    epoch: SessionEpoch,
    token: EpochToken,
}

impl EpochScope {
    pub fn token(&self) -> EpochToken {
        self.token
    }

    pub fn is_live(&self) -> bool {
        self.epoch.is_current(self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_invalidates_tokens() {
        let epoch = SessionEpoch::new();
        let before = epoch.token();
        assert!(epoch.is_current(before));

        let after = epoch.advance();
        assert!(!epoch.is_current(before));
        assert!(epoch.is_current(after));
        assert_eq!(epoch.token(), after);
    }

    #[test]
    fn test_clones_share_generation() {
        let epoch = SessionEpoch::new();
        let other = epoch.clone();
        let token = other.token();
        epoch.advance();
        assert!(!other.is_current(token));
    }

    #[test]
    fn test_scope_goes_stale() {
        let epoch = SessionEpoch::new();
        let scope = epoch.scope();
        assert!(scope.is_live());
        epoch.advance();
        assert!(!scope.is_live());
        assert!(epoch.scope().is_live());
    }
}
