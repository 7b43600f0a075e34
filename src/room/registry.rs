//! Registry of live rooms.
//!
//! Rooms share no mutable state; the registry is the only cross-room
//! structure, and it only maps codes to actor handles.

use std::sync::Arc;

use dashmap::DashMap;

use crate::code::RoomCode;
use crate::config::RoomPolicy;

use super::actor::RoomActor;
use super::RoomHandle;

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomCode, RoomHandle>>,
    policy: RoomPolicy,
}

impl RoomRegistry {
    pub fn new(policy: RoomPolicy) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            policy,
        }
    }

    /// Handle for `code`, spawning the room if this is the first join
    /// attempt for an unseen code. Used by the join path only.
    pub fn ensure(&self, code: RoomCode) -> RoomHandle {
        self.rooms
            .entry(code)
            .or_insert_with(|| {
                let (actor, handle) =
                    RoomActor::new(code, self.policy.clone(), Arc::clone(&self.rooms));
                tokio::spawn(actor.run());
                handle
            })
            .clone()
    }

    /// Existing room only; reconnects must not revive a destroyed room.
    pub fn lookup(&self, code: RoomCode) -> Option<RoomHandle> {
        self.rooms.get(&code).map(|h| h.clone())
    }

    /// A fresh code not currently in use.
    pub fn fresh_code(&self) -> RoomCode {
        loop {
            let code = RoomCode::random();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}
