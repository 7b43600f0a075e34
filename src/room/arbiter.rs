//! Round arbitration: exactly one winner per round, in server receive order.
//!
//! The room actor processes one message at a time, so "receive order" here
//! is simply call order; the `decided` flag is the concurrency boundary the
//! spec requires, not wall-clock time.

use std::collections::HashSet;

use crate::deck::{Card, SymbolId};
use crate::protocol::PlayerId;

/// Why a claim did not win. `TooLate` is silent (the round is already
/// decided); `NoMatch` costs the claimant a penalty; `Penalized` claims are
/// dropped without further punishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimRejection {
    TooLate,
    Penalized,
    NoMatch,
}

#[derive(Debug, Default)]
pub struct Arbiter {
    decided: bool,
    penalized: HashSet<PlayerId>,
}

impl Arbiter {
    /// Open a fresh round. Penalties persist across rounds until their
    /// timers unlock them.
    pub fn open_round(&mut self) {
        self.decided = false;
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }

    pub fn penalize(&mut self, player: PlayerId) {
        self.penalized.insert(player);
    }

    pub fn unlock(&mut self, player: PlayerId) {
        self.penalized.remove(&player);
    }

    pub fn is_penalized(&self, player: PlayerId) -> bool {
        self.penalized.contains(&player)
    }

    /// Judge one claim against the claimant's top card and the center card.
    /// The first claim to validate wins and atomically closes the round;
    /// everything after — even an objectively valid match — is too late.
    pub fn judge(
        &mut self,
        claimant: PlayerId,
        symbol: SymbolId,
        top_card: Option<&Card>,
        center: &Card,
    ) -> Result<SymbolId, ClaimRejection> {
        if self.decided {
            return Err(ClaimRejection::TooLate);
        }
        if self.penalized.contains(&claimant) {
            return Err(ClaimRejection::Penalized);
        }
        let valid = top_card.map_or(false, |c| c.has_symbol(symbol)) && center.has_symbol(symbol);
        if !valid {
            return Err(ClaimRejection::NoMatch);
        }
        self.decided = true;
        Ok(symbol)
    }
}
