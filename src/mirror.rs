//! Client-side mirror of authoritative room state.
//!
//! A pure reducer over [`ServerToClient`] events: no IO, no clock reads.
//! The UI renders whatever the mirror holds; nothing fairness-affecting is
//! ever committed locally ahead of server confirmation. A claim is only
//! "pending" here until the server's `round_winner` or `penalty` lands.

use std::time::Duration;

use crate::code::RoomCode;
use crate::deck::{Card, SymbolId};
use crate::error::ErrorCode;
use crate::protocol::{
    Phase, PlayerId, PlayerStatus, PlayerView, Ranking, RoomConfig, RoomSnapshot, ServerToClient,
};

/// The locally visible room, rebuilt from snapshots and events.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomView {
    pub room_code: RoomCode,
    pub phase: Phase,
    pub config: RoomConfig,
    pub players: Vec<PlayerView>,
    pub your_cards: Vec<Card>,
    pub center_card: Option<Card>,
    pub round_number: u32,
    pub round_winner: Option<PlayerId>,
    /// Remaining duration as received; the UI adds it to its own clock at
    /// receipt, which keeps countdowns immune to server clock skew.
    pub countdown_ms: Option<i64>,
}

impl RoomView {
    fn from_snapshot(s: RoomSnapshot) -> Self {
        RoomView {
            room_code: s.room_code,
            phase: s.phase,
            config: s.config,
            players: s.players,
            your_cards: s.your_cards,
            center_card: s.center_card,
            round_number: s.round_number,
            round_winner: s.round_winner,
            countdown_ms: s.countdown_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub winner: Option<PlayerId>,
    pub rankings: Vec<Ranking>,
    pub rejoin_window_ms: i64,
}

#[derive(Debug, Default)]
pub struct Mirror {
    /// The one identity this mirror trusts; snapshots for any other id are
    /// from a superseded session and are discarded.
    trusted: Option<PlayerId>,
    view: Option<RoomView>,
    /// Events that raced ahead of the first snapshot.
    buffered: Vec<ServerToClient>,
    pending_claim: Option<SymbolId>,
    pub result: Option<GameResult>,
    pub play_again_votes: Option<(usize, usize)>,
    pub notice_need_players: Option<(usize, usize)>,
    pub my_penalty_ms: Option<i64>,
    pub expired: bool,
    pub last_error: Option<ErrorCode>,
    reconnect_attempts: u32,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.trusted
    }

    pub fn view(&self) -> Option<&RoomView> {
        self.view.as_ref()
    }

    /// The UI marks a claim pending; nothing changes visibly until the
    /// server answers.
    pub fn begin_claim(&mut self, symbol: SymbolId) {
        self.pending_claim = Some(symbol);
    }

    pub fn pending_claim(&self) -> Option<SymbolId> {
        self.pending_claim
    }

    /// Whether a stale-session error means the caller should fall back from
    /// `reconnect` to a fresh `join`.
    pub fn should_fall_back_to_join(&self) -> bool {
        self.last_error == Some(ErrorCode::SessionInvalid)
    }

    pub fn apply(&mut self, event: ServerToClient) {
        match event {
            ServerToClient::RoomState { snapshot } => self.apply_snapshot(snapshot),
            other if self.view.is_none() => {
                // No snapshot yet: hold the event (a countdown racing the
                // snapshot must not be lost) unless it stands alone.
                match other {
                    ServerToClient::Error { code, .. } => {
                        self.last_error = Some(code);
                        if code == ErrorCode::RoomNotFound {
                            self.expired = true;
                        }
                    }
                    ServerToClient::RoomExpired => self.expired = true,
                    ServerToClient::Pong => {}
                    buffered => self.buffered.push(buffered),
                }
            }
            other => self.apply_event(other),
        }
    }

    fn apply_snapshot(&mut self, snapshot: RoomSnapshot) {
        match self.trusted {
            None => self.trusted = Some(snapshot.player_id),
            // Superseded identity: discard without corrupting local state.
            Some(trusted) if trusted != snapshot.player_id => return,
            Some(_) => {}
        }
        self.view = Some(RoomView::from_snapshot(snapshot));
        self.reconnect_attempts = 0;
        for event in std::mem::take(&mut self.buffered) {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: ServerToClient) {
        let me = self.trusted;
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match event {
            ServerToClient::RoomState { .. } => unreachable!("handled in apply"),
            ServerToClient::PlayerJoined { player } => {
                view.players.retain(|p| p.player_id != player.player_id);
                view.players.push(player);
            }
            ServerToClient::PlayerLeft { player_id } => {
                view.players.retain(|p| p.player_id != player_id);
            }
            ServerToClient::PlayerDisconnected { player_id } => {
                set_status(view, player_id, PlayerStatus::Disconnected);
            }
            ServerToClient::PlayerReconnected { player_id } => {
                set_status(view, player_id, PlayerStatus::Connected);
            }
            ServerToClient::HostChanged { player_id } => {
                for p in &mut view.players {
                    p.is_host = p.player_id == player_id;
                }
            }
            ServerToClient::Countdown { remaining_ms } => {
                if remaining_ms < 0 {
                    // Cancellation back to the lobby.
                    view.phase = Phase::Waiting;
                    view.countdown_ms = None;
                } else {
                    view.phase = Phase::Countdown;
                    view.countdown_ms = Some(remaining_ms);
                }
            }
            ServerToClient::RoundStart {
                round_number,
                center_card,
                your_top_card,
            } => {
                view.phase = Phase::Playing;
                view.round_number = round_number;
                view.center_card = Some(center_card);
                view.round_winner = None;
                view.countdown_ms = None;
                self.my_penalty_ms = None;
                // Round one deals fresh stacks; the snapshot carried ours,
                // but a top card we did not know about means a new deal.
                if round_number == 1 {
                    if let Some(top) = your_top_card {
                        if view.your_cards.first() != Some(&top) {
                            view.your_cards = vec![top];
                        }
                    }
                }
            }
            ServerToClient::RoundWinner {
                round_number: _,
                player_id,
                symbol_id: _,
            } => {
                view.round_winner = Some(player_id);
                view.phase = Phase::RoundEnd;
                if let Some(p) = view.players.iter_mut().find(|p| p.player_id == player_id) {
                    p.cards_remaining = p.cards_remaining.saturating_sub(1);
                }
                // Only now does our own stack shrink.
                if me == Some(player_id) && !view.your_cards.is_empty() {
                    view.your_cards.remove(0);
                }
                self.pending_claim = None;
            }
            ServerToClient::Penalty {
                player_id,
                duration_ms,
            } => {
                if me == Some(player_id) {
                    self.my_penalty_ms = Some(duration_ms);
                    self.pending_claim = None;
                }
            }
            ServerToClient::GameOver {
                winner,
                rankings,
                rejoin_window_ms,
            } => {
                view.phase = Phase::GameOver;
                view.center_card = None;
                view.round_winner = None;
                self.pending_claim = None;
                self.result = Some(GameResult {
                    winner,
                    rankings,
                    rejoin_window_ms,
                });
            }
            ServerToClient::PlayAgainAck {
                player_id: _,
                votes,
                needed,
            } => {
                self.play_again_votes = Some((votes, needed));
            }
            ServerToClient::RoomReset => {
                view.phase = Phase::Waiting;
                view.your_cards.clear();
                view.center_card = None;
                view.round_number = 0;
                view.round_winner = None;
                view.countdown_ms = None;
                for p in &mut view.players {
                    p.cards_remaining = 0;
                }
                self.result = None;
                self.play_again_votes = None;
                self.pending_claim = None;
            }
            ServerToClient::ConfigUpdated { config } => view.config = config,
            ServerToClient::NeedMorePlayers { have, need } => {
                self.notice_need_players = Some((have, need));
            }
            ServerToClient::RoomExpired => {
                self.expired = true;
            }
            ServerToClient::Error { code, .. } => {
                self.last_error = Some(code);
                if code == ErrorCode::RoomNotFound {
                    self.expired = true;
                }
                if code == ErrorCode::ValidationFailed {
                    self.pending_claim = None;
                }
            }
            ServerToClient::Pong => {}
        }
    }

    // ---- reconnection bookkeeping (pure; the caller owns the socket) ----

    /// Record a reconnect attempt and return how long to wait before it:
    /// capped exponential backoff, no jitter.
    pub fn next_reconnect_delay(&mut self) -> Duration {
        let delay = reconnect_delay(self.reconnect_attempts);
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        delay
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }
}

fn set_status(view: &mut RoomView, player_id: PlayerId, status: PlayerStatus) {
    if let Some(p) = view.players.iter_mut().find(|p| p.player_id == player_id) {
        p.status = status;
    }
}

fn reconnect_delay(attempt: u32) -> Duration {
    const BASE_MS: u64 = 500;
    const CAP_MS: u64 = 10_000;
    let exp = attempt.min(16);
    Duration::from_millis((BASE_MS << exp).min(CAP_MS))
}
