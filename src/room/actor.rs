//! The per-room actor: owns all state for one room code and is the sole
//! authority over it.
//!
//! All reads and writes go through [`RoomActor::handle`], one inbox message
//! at a time, which is what makes "first valid claim wins" deterministic
//! without locks. The actor is reactive only: every transition is caused by
//! a client message or a fired timer, never by polling.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::code::RoomCode;
use crate::config::RoomPolicy;
use crate::deck::{self, Card, SymbolId};
use crate::error::RoomError;
use crate::protocol::{
    ClientToServer, Phase, PlayerId, PlayerStatus, Ranking, RoomConfig, RoomSnapshot,
    ServerToClient,
};

use super::arbiter::{Arbiter, ClaimRejection};
use super::roster::Roster;
use super::timers::{TimerFired, TimerKey, TimerWheel};
use super::{AttachIntent, RoomHandle, RoomMsg, SessionId, SessionTx};

#[derive(Debug)]
struct Binding {
    player_id: PlayerId,
    tx: SessionTx,
}

pub struct RoomActor {
    code: RoomCode,
    policy: RoomPolicy,
    config: RoomConfig,
    phase: Phase,
    roster: Roster,
    sessions: HashMap<SessionId, Binding>,
    /// At most one live session per durable player.
    player_session: HashMap<PlayerId, SessionId>,
    arbiter: Arbiter,
    timers: TimerWheel,
    draw_pile: Vec<Card>,
    center: Option<Card>,
    round_number: u32,
    round_winner: Option<PlayerId>,
    #[allow(dead_code)]
    created_at: OffsetDateTime,
    inbox: mpsc::UnboundedReceiver<RoomMsg>,
    rooms: Arc<DashMap<RoomCode, RoomHandle>>,
    running: bool,
}

impl RoomActor {
    /// Build an actor plus its handle. The caller registers the handle and
    /// spawns [`RoomActor::run`].
    pub fn new(
        code: RoomCode,
        policy: RoomPolicy,
        rooms: Arc<DashMap<RoomCode, RoomHandle>>,
    ) -> (Self, RoomHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let actor = RoomActor {
            code,
            policy,
            config: RoomConfig::default(),
            phase: Phase::Waiting,
            roster: Roster::default(),
            sessions: HashMap::new(),
            player_session: HashMap::new(),
            arbiter: Arbiter::default(),
            timers: TimerWheel::new(tx.clone()),
            draw_pile: Vec::new(),
            center: None,
            round_number: 0,
            round_winner: None,
            created_at: OffsetDateTime::now_utc(),
            inbox,
            rooms,
            running: true,
        };
        (actor, RoomHandle::new(code, tx))
    }

    pub async fn run(mut self) {
        info!(room = %self.code, "room opened");
        while let Some(msg) = self.inbox.recv().await {
            self.handle(msg);
            if !self.running {
                break;
            }
        }
        info!(room = %self.code, "room closed");
    }

    fn handle(&mut self, msg: RoomMsg) {
        match msg {
            RoomMsg::Attach {
                session,
                intent,
                tx,
            } => self.on_attach(session, intent, tx),
            RoomMsg::Command { session, msg } => self.on_command(session, msg),
            RoomMsg::Detach { session } => self.on_detach(session),
            RoomMsg::Timer(fired) => self.on_timer(fired),
        }
    }

    // ---- session registry ----

    fn on_attach(&mut self, session: SessionId, intent: AttachIntent, tx: SessionTx) {
        if self.sessions.contains_key(&session) {
            self.send_error(&tx, RoomError::InvalidTransition { phase: self.phase.name() });
            return;
        }
        match intent {
            AttachIntent::Join { name } => self.on_join(session, name, tx),
            AttachIntent::Reconnect { player_id } => self.on_reconnect(session, player_id, tx),
        }
    }

    /// `join` always mints a new durable identity; it never revives one.
    fn on_join(&mut self, session: SessionId, name: String, tx: SessionTx) {
        if self.phase != Phase::Waiting {
            self.send_error(&tx, RoomError::InvalidTransition { phase: self.phase.name() });
            return;
        }
        if self.roster.active_count() >= self.policy.max_players {
            self.send_error(&tx, RoomError::RoomFull);
            return;
        }
        let player_id = self.roster.add(name);
        self.bind(session, player_id, tx);
        self.timers.cancel(TimerKey::IdleExpiry);
        self.send_snapshot(session);
        if let Some(view) = self.roster.get(player_id).map(|p| p.view()) {
            self.broadcast_except(session, &ServerToClient::PlayerJoined { player: view });
        }
        self.arm_lobby_autostart();
        debug!(room = %self.code, %player_id, "player joined");
    }

    fn on_reconnect(&mut self, session: SessionId, player_id: PlayerId, tx: SessionTx) {
        let known = matches!(
            self.roster.get(player_id),
            Some(p) if p.status != PlayerStatus::Left
        );
        // Once the post-game rejoin window has lapsed the identity is no
        // longer honored; the client falls back to a fresh join.
        let within_grace =
            self.phase != Phase::GameOver || self.timers.is_scheduled(TimerKey::RejoinWindow);
        if !known || !within_grace {
            self.send_error(&tx, RoomError::SessionInvalid);
            return;
        }
        // A new binding supersedes any live session for this player; the
        // superseded channel closes and its socket unwinds.
        if let Some(old) = self.player_session.remove(&player_id) {
            self.sessions.remove(&old);
        }
        self.roster.mark_reconnected(player_id);
        self.bind(session, player_id, tx);
        self.timers.cancel(TimerKey::IdleExpiry);
        self.send_snapshot(session);
        self.broadcast_except(session, &ServerToClient::PlayerReconnected { player_id });
        debug!(room = %self.code, %player_id, "player reconnected");
    }

    fn bind(&mut self, session: SessionId, player_id: PlayerId, tx: SessionTx) {
        self.sessions.insert(session, Binding { player_id, tx });
        self.player_session.insert(player_id, session);
    }

    fn on_detach(&mut self, session: SessionId) {
        let Some(binding) = self.sessions.remove(&session) else {
            return;
        };
        // A superseded session detaching must not touch the player record.
        if self.player_session.get(&binding.player_id) != Some(&session) {
            return;
        }
        self.player_session.remove(&binding.player_id);
        let promoted = self.roster.mark_disconnected(binding.player_id);
        self.broadcast(&ServerToClient::PlayerDisconnected {
            player_id: binding.player_id,
        });
        if let Some(player_id) = promoted {
            self.broadcast(&ServerToClient::HostChanged { player_id });
        }
        self.after_departure();
    }

    // ---- commands ----

    fn on_command(&mut self, session: SessionId, msg: ClientToServer) {
        let Some(player_id) = self.sessions.get(&session).map(|b| b.player_id) else {
            debug!(room = %self.code, %session, "command from unbound session dropped");
            return;
        };
        match msg {
            ClientToServer::Join { .. } | ClientToServer::Reconnect { .. } => {
                self.error_to(session, RoomError::InvalidTransition { phase: self.phase.name() });
            }
            ClientToServer::Ping => self.send_to_session(session, &ServerToClient::Pong),
            ClientToServer::Leave => self.retire_player(player_id),
            ClientToServer::SetConfig { config } => self.on_set_config(session, player_id, config),
            ClientToServer::StartGame => self.on_start_game(session, player_id),
            ClientToServer::MatchAttempt { symbol_id, .. } => {
                self.on_match_attempt(session, player_id, symbol_id)
            }
            ClientToServer::KickPlayer { player_id: target } => {
                self.on_kick(session, player_id, target)
            }
            ClientToServer::PlayAgain => self.on_play_again(session, player_id),
        }
    }

    fn is_host(&self, player_id: PlayerId) -> bool {
        self.roster.host().map(|p| p.player_id) == Some(player_id)
    }

    fn on_set_config(&mut self, session: SessionId, player_id: PlayerId, config: RoomConfig) {
        if !self.is_host(player_id) {
            self.error_to(session, RoomError::AuthorizationDenied);
            return;
        }
        if self.phase != Phase::Waiting {
            self.error_to(session, RoomError::InvalidTransition { phase: self.phase.name() });
            return;
        }
        let plane_size = deck::build_plane(config.layout.symbols_per_card()).len();
        if config.deck_size < self.policy.min_players + 2 || config.deck_size > plane_size {
            self.error_to(session, RoomError::ValidationFailed);
            return;
        }
        self.config = config.clone();
        self.broadcast(&ServerToClient::ConfigUpdated { config });
    }

    fn on_start_game(&mut self, session: SessionId, player_id: PlayerId) {
        if !self.is_host(player_id) {
            self.error_to(session, RoomError::AuthorizationDenied);
            return;
        }
        match self.phase {
            Phase::Waiting => {
                let have = self.roster.connected_count();
                if have < self.policy.min_players {
                    self.send_to_session(
                        session,
                        &ServerToClient::NeedMorePlayers {
                            have,
                            need: self.policy.min_players,
                        },
                    );
                } else {
                    self.begin_countdown();
                }
            }
            // During the rejoin window the host can force the rematch.
            Phase::GameOver if self.timers.is_scheduled(TimerKey::RejoinWindow) => {
                self.reset_room();
            }
            _ => self.error_to(session, RoomError::InvalidTransition { phase: self.phase.name() }),
        }
    }

    fn on_match_attempt(&mut self, session: SessionId, player_id: PlayerId, symbol: SymbolId) {
        if self.phase != Phase::Playing {
            self.error_to(session, RoomError::InvalidTransition { phase: self.phase.name() });
            return;
        }
        let Some(center) = self.center.as_ref() else {
            // Phase invariant: center is always dealt while PLAYING.
            warn!(room = %self.code, "no center card in PLAYING phase");
            return;
        };
        let top = self.roster.get(player_id).and_then(|p| p.top_card());
        match self.arbiter.judge(player_id, symbol, top, center) {
            Ok(symbol) => self.apply_win(player_id, symbol),
            Err(ClaimRejection::NoMatch) => {
                self.arbiter.penalize(player_id);
                self.timers
                    .schedule(TimerKey::Penalty(player_id), self.policy.penalty_lockout);
                self.error_to(session, RoomError::ValidationFailed);
                self.broadcast(&ServerToClient::Penalty {
                    player_id,
                    duration_ms: self.policy.penalty_lockout.as_millis() as i64,
                });
            }
            Err(ClaimRejection::TooLate | ClaimRejection::Penalized) => {
                debug!(room = %self.code, %player_id, "claim dropped");
            }
        }
    }

    fn on_kick(&mut self, session: SessionId, requester: PlayerId, target: PlayerId) {
        if !self.is_host(requester) {
            self.error_to(session, RoomError::AuthorizationDenied);
            return;
        }
        let target_active = self
            .roster
            .get(target)
            .map_or(false, |p| p.status != PlayerStatus::Left);
        if requester == target || !target_active {
            self.error_to(session, RoomError::InvalidTransition { phase: self.phase.name() });
            return;
        }
        self.retire_player(target);
    }

    fn on_play_again(&mut self, session: SessionId, player_id: PlayerId) {
        if self.phase != Phase::GameOver || !self.timers.is_scheduled(TimerKey::RejoinWindow) {
            self.error_to(session, RoomError::InvalidTransition { phase: self.phase.name() });
            return;
        }
        if let Some(p) = self.roster.get_mut(player_id) {
            p.play_again = true;
        }
        let votes = self
            .roster
            .active()
            .filter(|p| p.status == PlayerStatus::Connected && p.play_again)
            .count();
        let needed = self.roster.connected_count();
        self.broadcast(&ServerToClient::PlayAgainAck {
            player_id,
            votes,
            needed,
        });
        if votes > 0 && votes >= needed {
            self.reset_room();
        }
    }

    // ---- timers ----

    fn on_timer(&mut self, fired: TimerFired) {
        // Superseded and cancelled timers fire into the void.
        if !self.timers.accept(fired) {
            return;
        }
        match fired.key {
            TimerKey::LobbyAutostart => self.on_lobby_autostart(),
            TimerKey::Countdown => self.on_countdown_elapsed(),
            TimerKey::RoundEnd => self.next_round(),
            TimerKey::Penalty(player_id) => self.arbiter.unlock(player_id),
            TimerKey::RejoinWindow => {
                if self.phase == Phase::GameOver {
                    self.timers
                        .schedule(TimerKey::IdleExpiry, self.policy.idle_expiry);
                }
            }
            TimerKey::IdleExpiry => self.expire(),
        }
    }

    fn arm_lobby_autostart(&mut self) {
        if self.phase == Phase::Waiting
            && self.roster.connected_count() >= self.policy.min_players
            && !self.timers.is_scheduled(TimerKey::LobbyAutostart)
        {
            self.timers
                .schedule(TimerKey::LobbyAutostart, self.policy.lobby_autostart);
        }
    }

    fn on_lobby_autostart(&mut self) {
        if self.phase != Phase::Waiting {
            return;
        }
        let have = self.roster.connected_count();
        if have >= self.policy.min_players {
            self.begin_countdown();
        } else {
            // Restart rather than fire; peers see why.
            self.broadcast(&ServerToClient::NeedMorePlayers {
                have,
                need: self.policy.min_players,
            });
            self.timers
                .schedule(TimerKey::LobbyAutostart, self.policy.lobby_autostart);
        }
    }

    fn begin_countdown(&mut self) {
        self.phase = Phase::Countdown;
        self.timers.cancel(TimerKey::LobbyAutostart);
        self.timers
            .schedule(TimerKey::Countdown, self.policy.round_countdown);
        self.broadcast(&ServerToClient::Countdown {
            remaining_ms: self.policy.round_countdown.as_millis() as i64,
        });
    }

    /// Countdown elapsed: deal and open round one.
    fn on_countdown_elapsed(&mut self) {
        if self.phase != Phase::Countdown {
            return;
        }
        let players: Vec<PlayerId> = self.roster.active().map(|p| p.player_id).collect();
        let deck = deck::build_deck(self.config.layout.symbols_per_card(), self.config.deck_size);
        let Some(deal) = deck::deal(deck, players.len()) else {
            warn!(room = %self.code, "deck too small for roster, cancelling start");
            self.cancel_countdown();
            return;
        };
        for (player_id, stack) in players.into_iter().zip(deal.stacks) {
            if let Some(p) = self.roster.get_mut(player_id) {
                p.card_stack = stack;
            }
        }
        self.center = Some(deal.center);
        self.draw_pile = deal.draw_pile;
        self.round_number = 1;
        self.round_winner = None;
        self.arbiter = Arbiter::default();
        self.arbiter.open_round();
        self.phase = Phase::Playing;
        self.broadcast_round_start();
        info!(room = %self.code, "game started");
    }

    fn cancel_countdown(&mut self) {
        self.timers.cancel(TimerKey::Countdown);
        self.phase = Phase::Waiting;
        self.broadcast(&ServerToClient::Countdown { remaining_ms: -1 });
        self.arm_lobby_autostart();
    }

    // ---- game flow ----

    fn apply_win(&mut self, winner: PlayerId, symbol: SymbolId) {
        if let Some(p) = self.roster.get_mut(winner) {
            if !p.card_stack.is_empty() {
                // Matched top card leaves play along with the former center.
                p.card_stack.remove(0);
            }
        }
        self.round_winner = Some(winner);
        self.broadcast(&ServerToClient::RoundWinner {
            round_number: self.round_number,
            player_id: winner,
            symbol_id: symbol,
        });
        let winner_done = self
            .roster
            .get(winner)
            .map_or(false, |p| p.card_stack.is_empty());
        if winner_done {
            self.game_over(Some(winner));
        } else if self.draw_pile.is_empty() {
            self.game_over(None);
        } else {
            self.phase = Phase::RoundEnd;
            self.timers
                .schedule(TimerKey::RoundEnd, self.policy.round_end_pause);
        }
    }

    /// Deal the next round after the round-end pause.
    fn next_round(&mut self) {
        if self.phase != Phase::RoundEnd {
            return;
        }
        let Some(center) = self.draw_pile.pop() else {
            // apply_win checked the pile; an empty pile here means the
            // room was reset mid-pause.
            return;
        };
        self.center = Some(center);
        self.round_number += 1;
        self.round_winner = None;
        self.arbiter.open_round();
        self.phase = Phase::Playing;
        self.broadcast_round_start();
    }

    fn game_over(&mut self, winner: Option<PlayerId>) {
        self.phase = Phase::GameOver;
        self.center = None;
        self.round_winner = None;
        self.draw_pile.clear();
        self.timers.cancel(TimerKey::RoundEnd);

        let mut rankings: Vec<Ranking> = self
            .roster
            .active()
            .map(|p| Ranking {
                player_id: p.player_id,
                name: p.name.clone(),
                cards_remaining: p.card_stack.len(),
            })
            .collect();
        rankings.sort_by_key(|r| r.cards_remaining);
        if let Some(winner) = winner {
            if let Some(pos) = rankings.iter().position(|r| r.player_id == winner) {
                let w = rankings.remove(pos);
                rankings.insert(0, w);
            }
        }
        let winner = winner.or_else(|| rankings.first().map(|r| r.player_id));

        self.roster.clear_play_again();
        self.broadcast(&ServerToClient::GameOver {
            winner,
            rankings,
            rejoin_window_ms: self.policy.rejoin_window.as_millis() as i64,
        });
        self.timers
            .schedule(TimerKey::RejoinWindow, self.policy.rejoin_window);
        info!(room = %self.code, ?winner, "game over");
    }

    /// Back to the lobby with the same roster and config.
    fn reset_room(&mut self) {
        self.timers.cancel(TimerKey::RejoinWindow);
        self.timers.cancel(TimerKey::IdleExpiry);
        self.phase = Phase::Waiting;
        self.round_number = 0;
        self.round_winner = None;
        self.center = None;
        self.draw_pile.clear();
        self.arbiter = Arbiter::default();
        for p in self.roster.active_mut() {
            p.card_stack.clear();
            p.play_again = false;
        }
        self.broadcast(&ServerToClient::RoomReset);
        self.arm_lobby_autostart();
        info!(room = %self.code, "room reset");
    }

    // ---- departures ----

    /// Permanently retire a player (leave or kick) and close their session.
    fn retire_player(&mut self, player_id: PlayerId) {
        let promoted = self.roster.retire(player_id);
        // The departing player hears their own player_left before the
        // binding drops; closing the channel then unwinds their socket.
        self.broadcast(&ServerToClient::PlayerLeft { player_id });
        if let Some(session) = self.player_session.remove(&player_id) {
            self.sessions.remove(&session);
        }
        if let Some(player_id) = promoted {
            self.broadcast(&ServerToClient::HostChanged { player_id });
        }
        if self.roster.active_count() == 0 {
            self.teardown();
            return;
        }
        self.after_departure();
        self.check_last_standing();
    }

    /// Shared bookkeeping after a disconnect or a permanent departure.
    fn after_departure(&mut self) {
        let connected = self.roster.connected_count();
        if self.phase == Phase::Countdown && connected < self.policy.min_players {
            self.cancel_countdown();
        }
        if connected == 0 {
            self.timers.cancel(TimerKey::LobbyAutostart);
            self.timers
                .schedule(TimerKey::IdleExpiry, self.policy.idle_expiry);
        }
    }

    /// An abandoned game must still terminate: if every other player has
    /// permanently left, the last connected player holding cards wins.
    fn check_last_standing(&mut self) {
        if !matches!(self.phase, Phase::Playing | Phase::RoundEnd) {
            return;
        }
        if self.roster.active_count() != 1 {
            return;
        }
        let last = self
            .roster
            .active()
            .next()
            .filter(|p| p.status == PlayerStatus::Connected && !p.card_stack.is_empty())
            .map(|p| p.player_id);
        if let Some(winner) = last {
            self.game_over(Some(winner));
        }
    }

    fn expire(&mut self) {
        if self.roster.connected_count() > 0 && self.phase != Phase::GameOver {
            return;
        }
        self.broadcast(&ServerToClient::RoomExpired);
        self.teardown();
    }

    fn teardown(&mut self) {
        self.rooms.remove(&self.code);
        self.sessions.clear();
        self.player_session.clear();
        self.running = false;
    }

    // ---- fan-out ----

    fn broadcast(&self, event: &ServerToClient) {
        for binding in self.sessions.values() {
            let _ = binding.tx.send(event.clone());
        }
    }

    fn broadcast_except(&self, session: SessionId, event: &ServerToClient) {
        for (sid, binding) in &self.sessions {
            if *sid != session {
                let _ = binding.tx.send(event.clone());
            }
        }
    }

    /// Round start is personalized: each session sees its own top card.
    fn broadcast_round_start(&self) {
        let Some(center) = self.center.clone() else {
            return;
        };
        for binding in self.sessions.values() {
            let your_top_card = self
                .roster
                .get(binding.player_id)
                .and_then(|p| p.top_card().cloned());
            let _ = binding.tx.send(ServerToClient::RoundStart {
                round_number: self.round_number,
                center_card: center.clone(),
                your_top_card,
            });
        }
    }

    fn send_to_session(&self, session: SessionId, event: &ServerToClient) {
        if let Some(binding) = self.sessions.get(&session) {
            let _ = binding.tx.send(event.clone());
        }
    }

    fn error_to(&self, session: SessionId, err: RoomError) {
        self.send_to_session(
            session,
            &ServerToClient::Error {
                code: err.code(),
                message: err.to_string(),
            },
        );
    }

    fn send_error(&self, tx: &SessionTx, err: RoomError) {
        let _ = tx.send(ServerToClient::Error {
            code: err.code(),
            message: err.to_string(),
        });
    }

    fn send_snapshot(&self, session: SessionId) {
        let Some(binding) = self.sessions.get(&session) else {
            return;
        };
        let snapshot = self.snapshot_for(binding.player_id);
        let _ = binding.tx.send(ServerToClient::RoomState { snapshot });
    }

    /// Full authoritative snapshot as seen by one player. Countdowns go out
    /// as remaining durations; the client adds them to its own clock.
    fn snapshot_for(&self, player_id: PlayerId) -> RoomSnapshot {
        let countdown_ms = match self.phase {
            Phase::Countdown => self
                .timers
                .remaining(TimerKey::Countdown)
                .map(|d| d.as_millis() as i64),
            _ => None,
        };
        RoomSnapshot {
            room_code: self.code,
            player_id,
            phase: self.phase,
            config: self.config.clone(),
            players: self.roster.views(),
            your_cards: self
                .roster
                .get(player_id)
                .map(|p| p.card_stack.clone())
                .unwrap_or_default(),
            center_card: self.center.clone(),
            round_number: self.round_number,
            round_winner: self.round_winner,
            countdown_ms,
        }
    }
}
