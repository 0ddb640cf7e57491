//! Synchronization token types for the capture/replay engine.
//!
//! A token is a fence-like handle used to order operations across command
//! streams. During capture, the owning [`CaptureGraph`](crate::CaptureGraph)
//! tracks a per-token **generation** counter so that a reused handle still
//! binds each wait to the specific signal that preceded it.

/// Unique identifier for a synchronization token.
///
/// Token IDs are assigned sequentially by the engine and never reused.
/// Private tokens synthesized at compile time draw from the same ID space,
/// so an ID uniquely names a token process-wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u64);

impl TokenId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for TokenId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

/// Semantics of a synchronization token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Binary fence: unsignaled or signaled.
    Fence,
    /// Counter-based monotonic value; waits are satisfied once the counter
    /// reaches the awaited value.
    Counter,
}

/// A capture-time reference to a token at a specific generation.
///
/// The generation is the number of times the token had been signaled within
/// the owning capture graph when the reference was recorded. Generation 0 on
/// a wait means no prior signaler exists in the graph — an external wait,
/// resolved only at append time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TokenRef {
    /// The referenced token.
    pub token: TokenId,
    /// Signal ordinal within the capture graph (0 = never signaled).
    pub generation: u32,
}

impl TokenRef {
    /// Returns true if this wait reference has no in-graph signaler.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.generation == 0
    }
}

/// A resolved synchronization point at the submission boundary.
///
/// Unlike [`TokenRef`], the value here is a concrete scoreboard target: a
/// signal sets the token to at least `value`, a wait blocks until the token
/// reaches `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncPoint {
    /// The token to signal or wait on.
    pub token: TokenId,
    /// Scoreboard value to publish (signal) or to reach (wait).
    pub value: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_wait_is_generation_zero() {
        let external = TokenRef {
            token: TokenId(3),
            generation: 0,
        };
        let bound = TokenRef {
            token: TokenId(3),
            generation: 2,
        };
        assert!(external.is_external());
        assert!(!bound.is_external());
    }

    #[test]
    fn token_id_display_and_index() {
        let id = TokenId(42);
        assert_eq!(id.index(), 42);
        assert_eq!(id.to_string(), "TokenId(42)");
    }
}
