//! Symbol cards and dealing.
//!
//! Decks come from the standard projective-plane construction: for a prime
//! order `q` it yields `q*q + q + 1` cards with `q + 1` symbols each, any
//! two cards sharing exactly one symbol. That property is what arbitration
//! validates against, so it is asserted in tests, not trusted.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub type SymbolId = u16;
pub type CardId = u16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub symbols: Vec<SymbolId>,
}

impl Card {
    pub fn has_symbol(&self, symbol: SymbolId) -> bool {
        self.symbols.contains(&symbol)
    }

    /// The one symbol shared with `other`, if the deck invariant holds.
    pub fn shared_symbol(&self, other: &Card) -> Option<SymbolId> {
        self.symbols.iter().copied().find(|s| other.has_symbol(*s))
    }
}

/// Plane orders backing each layout. Must stay prime.
fn plane_order(symbols_per_card: usize) -> usize {
    symbols_per_card - 1
}

/// Build a full projective-plane deck with `symbols_per_card` symbols on
/// each card (`symbols_per_card - 1` must be prime: 3, 6, or 8 per card in
/// practice). Symbol ids index into whatever symbol set the config names.
pub fn build_plane(symbols_per_card: usize) -> Vec<Card> {
    let q = plane_order(symbols_per_card);
    let mut cards = Vec::with_capacity(q * q + q + 1);
    let sym = |i: usize| i as SymbolId;

    // Lines through the affine plane, one card per line.
    for a in 0..q {
        for b in 0..q {
            let mut symbols = Vec::with_capacity(q + 1);
            for x in 0..q {
                symbols.push(sym(x * q + (a * x + b) % q));
            }
            symbols.push(sym(q * q + a));
            cards.push(symbols);
        }
    }
    // Vertical lines.
    for x in 0..q {
        let mut symbols: Vec<SymbolId> = (0..q).map(|y| sym(x * q + y)).collect();
        symbols.push(sym(q * q + q));
        cards.push(symbols);
    }
    // The line at infinity.
    cards.push((0..=q).map(|a| sym(q * q + a)).collect());

    cards
        .into_iter()
        .enumerate()
        .map(|(id, symbols)| Card {
            id: id as CardId,
            symbols,
        })
        .collect()
}

/// Shuffle and truncate a plane deck to `deck_size` cards.
pub fn build_deck(symbols_per_card: usize, deck_size: usize) -> Vec<Card> {
    let mut deck = build_plane(symbols_per_card);
    deck.shuffle(&mut rand::thread_rng());
    deck.truncate(deck_size);
    deck
}

/// A dealt table: per-player stacks (top = index 0), the first center card,
/// and the remaining draw pile.
#[derive(Debug)]
pub struct Deal {
    pub stacks: Vec<Vec<Card>>,
    pub center: Card,
    pub draw_pile: Vec<Card>,
}

/// Split `deck` among `players` stacks. Each stack gets
/// `(len - 1) / (players + 1)` cards, one card opens the center, the rest
/// stays as the draw pile, so a player sweeping every round empties their
/// stack just as the pile runs dry.
pub fn deal(mut deck: Vec<Card>, players: usize) -> Option<Deal> {
    if players == 0 || deck.len() < players + 2 {
        return None;
    }
    let per_player = (deck.len() - 1) / (players + 1);
    if per_player == 0 {
        return None;
    }
    let mut stacks = Vec::with_capacity(players);
    for _ in 0..players {
        let rest = deck.split_off(per_player);
        stacks.push(deck);
        deck = rest;
    }
    let center = deck.pop()?;
    Some(Deal {
        stacks,
        center,
        draw_pile: deck,
    })
}
