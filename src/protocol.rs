//! Wire protocol: tagged JSON messages on a persistent socket.
//!
//! Countdown payloads always carry a *remaining duration* in milliseconds,
//! never an absolute deadline; clients add it to their own clock at receipt
//! so server/client clock drift cannot skew a countdown. A negative
//! countdown value signals cancellation back to the lobby.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::code::RoomCode;
use crate::deck::{Card, SymbolId};
use crate::error::ErrorCode;

pub type PlayerId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Waiting,
    Countdown,
    Playing,
    RoundEnd,
    GameOver,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Waiting => "WAITING",
            Phase::Countdown => "COUNTDOWN",
            Phase::Playing => "PLAYING",
            Phase::RoundEnd => "ROUND_END",
            Phase::GameOver => "GAME_OVER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    Connected,
    Disconnected,
    Left,
}

/// How the client lays out symbols on a card face. Presentation-only on the
/// server, but it fixes the symbols-per-card count the deck is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    Classic,
    Compact,
    Mini,
}

impl LayoutMode {
    pub fn symbols_per_card(self) -> usize {
        match self {
            LayoutMode::Classic => 8,
            LayoutMode::Compact => 6,
            LayoutMode::Mini => 4,
        }
    }
}

/// Host-mutable room configuration (WAITING phase only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub layout: LayoutMode,
    /// Named symbol set, or inline custom symbols.
    #[serde(flatten)]
    pub symbols: SymbolSource,
    pub deck_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolSource {
    SymbolSet { symbol_set: String },
    CustomSymbols { custom_symbols: Vec<String> },
}

impl Default for RoomConfig {
    fn default() -> Self {
        RoomConfig {
            layout: LayoutMode::Classic,
            symbols: SymbolSource::SymbolSet {
                symbol_set: "classic".into(),
            },
            deck_size: 31,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    Join {
        name: String,
    },
    Reconnect {
        player_id: PlayerId,
    },
    Leave,
    Ping,
    SetConfig {
        config: RoomConfig,
    },
    StartGame,
    MatchAttempt {
        symbol_id: SymbolId,
        /// Diagnostic only; arbitration orders by server receipt.
        #[serde(default)]
        client_timestamp_ms: Option<i64>,
    },
    KickPlayer {
        player_id: PlayerId,
    },
    PlayAgain,
}

/// Roster entry as every peer sees it. Card faces stay private; only the
/// receiver's own stack travels in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub status: PlayerStatus,
    pub is_host: bool,
    pub cards_remaining: usize,
}

/// Full authoritative snapshot, sent to a session on attach and whenever an
/// incremental event would not be enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_code: RoomCode,
    /// The durable identity this session is bound to.
    pub player_id: PlayerId,
    pub phase: Phase,
    pub config: RoomConfig,
    pub players: Vec<PlayerView>,
    pub your_cards: Vec<Card>,
    pub center_card: Option<Card>,
    pub round_number: u32,
    pub round_winner: Option<PlayerId>,
    /// Remaining countdown, if one is running.
    pub countdown_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    pub player_id: PlayerId,
    pub name: String,
    pub cards_remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    RoomState {
        snapshot: RoomSnapshot,
    },
    PlayerJoined {
        player: PlayerView,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    PlayerDisconnected {
        player_id: PlayerId,
    },
    PlayerReconnected {
        player_id: PlayerId,
    },
    HostChanged {
        player_id: PlayerId,
    },
    /// Negative `remaining_ms` cancels the countdown back to WAITING.
    Countdown {
        remaining_ms: i64,
    },
    RoundStart {
        round_number: u32,
        center_card: Card,
        your_top_card: Option<Card>,
    },
    RoundWinner {
        round_number: u32,
        player_id: PlayerId,
        symbol_id: SymbolId,
    },
    Penalty {
        player_id: PlayerId,
        duration_ms: i64,
    },
    GameOver {
        winner: Option<PlayerId>,
        rankings: Vec<Ranking>,
        rejoin_window_ms: i64,
    },
    PlayAgainAck {
        player_id: PlayerId,
        votes: usize,
        needed: usize,
    },
    RoomReset,
    ConfigUpdated {
        config: RoomConfig,
    },
    NeedMorePlayers {
        have: usize,
        need: usize,
    },
    RoomExpired,
    Error {
        code: ErrorCode,
        message: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_type_tags() {
        let msg: ClientToServer =
            serde_json::from_str(r#"{"type":"join","name":"ada"}"#).unwrap();
        assert!(matches!(msg, ClientToServer::Join { ref name } if name == "ada"));

        let msg: ClientToServer =
            serde_json::from_str(r#"{"type":"match_attempt","symbol_id":7}"#).unwrap();
        match msg {
            ClientToServer::MatchAttempt {
                symbol_id,
                client_timestamp_ms,
            } => {
                assert_eq!(symbol_id, 7);
                assert!(client_timestamp_ms.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn countdown_event_carries_duration() {
        let json = serde_json::to_string(&ServerToClient::Countdown { remaining_ms: 3000 })
            .unwrap();
        assert_eq!(json, r#"{"type":"countdown","remaining_ms":3000}"#);
    }

    #[test]
    fn config_accepts_named_and_inline_symbols() {
        let named: RoomConfig = serde_json::from_str(
            r#"{"layout":"classic","symbol_set":"animals","deck_size":31}"#,
        )
        .unwrap();
        assert!(matches!(named.symbols, SymbolSource::SymbolSet { .. }));

        let inline: RoomConfig = serde_json::from_str(
            r#"{"layout":"mini","custom_symbols":["cat","dog"],"deck_size":13}"#,
        )
        .unwrap();
        assert!(matches!(inline.symbols, SymbolSource::CustomSymbols { ref custom_symbols } if custom_symbols.len() == 2));
    }
}
