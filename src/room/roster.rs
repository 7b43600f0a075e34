//! Player directory: durable identities, presence, the host invariant.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::deck::Card;
use crate::protocol::{PlayerId, PlayerStatus, PlayerView};

#[derive(Debug)]
pub struct Player {
    pub player_id: PlayerId,
    pub name: String,
    pub status: PlayerStatus,
    /// Top of stack = index 0.
    pub card_stack: Vec<Card>,
    pub is_host: bool,
    /// Monotonic join order; host promotion tie-breaker with no ties.
    pub join_seq: u64,
    pub joined_at: OffsetDateTime,
    pub last_seen: OffsetDateTime,
    pub play_again: bool,
}

impl Player {
    pub fn top_card(&self) -> Option<&Card> {
        self.card_stack.first()
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            player_id: self.player_id,
            name: self.name.clone(),
            status: self.status,
            is_host: self.is_host,
            cards_remaining: self.card_stack.len(),
        }
    }
}

/// Roster of all players a room has ever admitted. `Left` players stay as
/// tombstones so a stale reconnect can be told apart from an unknown id.
#[derive(Debug, Default)]
pub struct Roster {
    players: Vec<Player>,
    next_seq: u64,
}

impl Roster {
    /// Players still part of the room (not retired).
    pub fn active(&self) -> impl Iterator<Item = &Player> {
        self.players
            .iter()
            .filter(|p| p.status != PlayerStatus::Left)
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players
            .iter_mut()
            .filter(|p| p.status != PlayerStatus::Left)
    }

    pub fn connected_count(&self) -> usize {
        self.active()
            .filter(|p| p.status == PlayerStatus::Connected)
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.player_id == id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.player_id == id)
    }

    pub fn host(&self) -> Option<&Player> {
        self.active().find(|p| p.is_host)
    }

    /// Admit a new durable identity. The first player in becomes host.
    pub fn add(&mut self, name: String) -> PlayerId {
        let now = OffsetDateTime::now_utc();
        let is_host = self.host().is_none();
        let player_id = Uuid::new_v4();
        self.players.push(Player {
            player_id,
            name,
            status: PlayerStatus::Connected,
            card_stack: Vec::new(),
            is_host,
            join_seq: self.next_seq,
            joined_at: now,
            last_seen: now,
            play_again: false,
        });
        self.next_seq += 1;
        player_id
    }

    /// Mark a player disconnected. Returns the newly promoted host, if the
    /// departure vacated the host seat.
    pub fn mark_disconnected(&mut self, id: PlayerId) -> Option<PlayerId> {
        let was_host = match self.get_mut(id) {
            Some(p) if p.status == PlayerStatus::Connected => {
                p.status = PlayerStatus::Disconnected;
                p.last_seen = OffsetDateTime::now_utc();
                p.is_host
            }
            _ => return None,
        };
        if was_host {
            self.reelect_host(id)
        } else {
            None
        }
    }

    /// Revive a disconnected player. Host status is whatever the record
    /// already says; a disconnected host that was not superseded keeps the
    /// seat, which is how reconnect restores `is_host` exactly.
    pub fn mark_reconnected(&mut self, id: PlayerId) -> bool {
        match self.get_mut(id) {
            Some(p) if p.status != PlayerStatus::Left => {
                p.status = PlayerStatus::Connected;
                p.last_seen = OffsetDateTime::now_utc();
                true
            }
            _ => false,
        }
    }

    /// Permanently retire a player (leave or kick). Returns the promoted
    /// host if the host seat was vacated.
    pub fn retire(&mut self, id: PlayerId) -> Option<PlayerId> {
        let was_host = match self.get_mut(id) {
            Some(p) if p.status != PlayerStatus::Left => {
                p.status = PlayerStatus::Left;
                p.last_seen = OffsetDateTime::now_utc();
                std::mem::take(&mut p.is_host)
            }
            _ => return None,
        };
        if was_host {
            self.reelect_host(id)
        } else {
            None
        }
    }

    /// Deterministic host election: earliest-joined Connected player.
    /// `join_seq` is strictly monotonic, so there are no ties.
    fn reelect_host(&mut self, vacating: PlayerId) -> Option<PlayerId> {
        if let Some(p) = self.get_mut(vacating) {
            p.is_host = false;
        }
        let new_host = self
            .active()
            .filter(|p| p.status == PlayerStatus::Connected && p.player_id != vacating)
            .min_by_key(|p| p.join_seq)
            .map(|p| p.player_id)?;
        for p in self.active_mut() {
            p.is_host = p.player_id == new_host;
        }
        Some(new_host)
    }

    pub fn views(&self) -> Vec<PlayerView> {
        self.active().map(Player::view).collect()
    }

    pub fn clear_play_again(&mut self) {
        for p in self.active_mut() {
            p.play_again = false;
        }
    }
}
