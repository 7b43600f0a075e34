//! Server configuration (env vars with code defaults).

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Room policy knobs: plain configuration with env overrides, not
/// invariants.
#[derive(Debug, Clone)]
pub struct RoomPolicy {
    pub max_players: usize,
    pub min_players: usize,
    pub lobby_autostart: Duration,
    pub round_countdown: Duration,
    pub round_end_pause: Duration,
    pub penalty_lockout: Duration,
    pub rejoin_window: Duration,
    pub idle_expiry: Duration,
}

impl Default for RoomPolicy {
    fn default() -> Self {
        RoomPolicy {
            max_players: 8,
            min_players: 2,
            lobby_autostart: Duration::from_secs(15),
            round_countdown: Duration::from_secs(3),
            round_end_pause: Duration::from_secs(2),
            penalty_lockout: Duration::from_secs(2),
            rejoin_window: Duration::from_secs(30),
            idle_expiry: Duration::from_secs(600),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl RoomPolicy {
    pub fn from_env() -> Self {
        let d = RoomPolicy::default();
        RoomPolicy {
            max_players: env_usize("SNAPMATCH_MAX_PLAYERS", d.max_players),
            min_players: env_usize("SNAPMATCH_MIN_PLAYERS", d.min_players).max(1),
            lobby_autostart: env_secs("SNAPMATCH_LOBBY_AUTOSTART_SECS", d.lobby_autostart),
            round_countdown: env_secs("SNAPMATCH_COUNTDOWN_SECS", d.round_countdown),
            round_end_pause: env_secs("SNAPMATCH_ROUND_END_SECS", d.round_end_pause),
            penalty_lockout: env_secs("SNAPMATCH_PENALTY_SECS", d.penalty_lockout),
            rejoin_window: env_secs("SNAPMATCH_REJOIN_SECS", d.rejoin_window),
            idle_expiry: env_secs("SNAPMATCH_IDLE_EXPIRY_SECS", d.idle_expiry),
        }
    }
}
