//! Named, cancellable, replaceable timers.
//!
//! Each scheduled timer is a detached sleep task that posts a
//! [`TimerFired`] back into the room's own inbox, so a firing can never
//! interleave with an in-flight message. Cancellation is cooperative: the
//! wheel stamps every schedule with a generation, and a firing whose
//! generation is stale (superseded or cancelled) is rejected by
//! [`TimerWheel::accept`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::protocol::PlayerId;
use super::RoomMsg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    LobbyAutostart,
    Countdown,
    RoundEnd,
    Penalty(PlayerId),
    RejoinWindow,
    IdleExpiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    pub generation: u64,
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    deadline: Instant,
}

#[derive(Debug)]
pub struct TimerWheel {
    tx: mpsc::UnboundedSender<RoomMsg>,
    entries: HashMap<TimerKey, Entry>,
    next_generation: u64,
}

impl TimerWheel {
    pub fn new(tx: mpsc::UnboundedSender<RoomMsg>) -> Self {
        Self {
            tx,
            entries: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Schedule `key` to fire after `after`, silently superseding any
    /// pending instance of the same key.
    pub fn schedule(&mut self, key: TimerKey, after: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = Instant::now() + after;
        self.entries.insert(key, Entry { generation, deadline });

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(RoomMsg::Timer(TimerFired { key, generation }));
        });
    }

    pub fn cancel(&mut self, key: TimerKey) {
        self.entries.remove(&key);
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Accept or reject a firing. Accepting consumes the entry; a firing
    /// from a superseded or cancelled schedule returns false and must have
    /// no effect.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.entries.get(&fired.key) {
            Some(e) if e.generation == fired.generation => {
                self.entries.remove(&fired.key);
                true
            }
            _ => false,
        }
    }

    /// Remaining time until `key` fires, for snapshot payloads.
    pub fn remaining(&self, key: TimerKey) -> Option<Duration> {
        self.entries
            .get(&key)
            .map(|e| e.deadline.saturating_duration_since(Instant::now()))
    }
}
