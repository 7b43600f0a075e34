//! The room coordinator: one actor task per room code.

pub mod actor;
pub mod arbiter;
pub mod registry;
pub mod roster;
pub mod timers;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::code::RoomCode;
use crate::protocol::{ClientToServer, PlayerId, ServerToClient};
use self::timers::TimerFired;

/// Ephemeral connection identity; a new one per socket.
pub type SessionId = Uuid;

/// Outbound channel for one session. Dropping it closes the session.
pub type SessionTx = mpsc::UnboundedSender<ServerToClient>;

/// What a fresh session wants to be.
#[derive(Debug, Clone)]
pub enum AttachIntent {
    Join { name: String },
    Reconnect { player_id: PlayerId },
}

/// Everything that can enter a room's inbox. The actor drains this one
/// message at a time; that single-file ordering is the whole concurrency
/// story for a room.
#[derive(Debug)]
pub enum RoomMsg {
    Attach {
        session: SessionId,
        intent: AttachIntent,
        tx: SessionTx,
    },
    Command {
        session: SessionId,
        msg: ClientToServer,
    },
    /// Socket closed without a `leave`.
    Detach { session: SessionId },
    Timer(TimerFired),
}

/// Cheap cloneable address of a room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub code: RoomCode,
    tx: mpsc::UnboundedSender<RoomMsg>,
}

impl RoomHandle {
    pub fn new(code: RoomCode, tx: mpsc::UnboundedSender<RoomMsg>) -> Self {
        Self { code, tx }
    }

    /// Send into the room's queue. A send to a torn-down room is simply
    /// dropped; the session will observe its channel closing instead.
    pub fn send(&self, msg: RoomMsg) {
        let _ = self.tx.send(msg);
    }

    pub fn attach(&self, session: SessionId, intent: AttachIntent, tx: SessionTx) {
        self.send(RoomMsg::Attach {
            session,
            intent,
            tx,
        });
    }

    pub fn command(&self, session: SessionId, msg: ClientToServer) {
        self.send(RoomMsg::Command { session, msg });
    }

    pub fn detach(&self, session: SessionId) {
        self.send(RoomMsg::Detach { session });
    }
}
