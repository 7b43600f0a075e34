//! End-to-end room flows driven through the actor's public handle, with
//! paused time so every timer fires deterministically.

use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use snapmatch::config::RoomPolicy;
use snapmatch::deck::{Card, SymbolId};
use snapmatch::error::ErrorCode;
use snapmatch::protocol::{
    ClientToServer, LayoutMode, Phase, PlayerId, RoomConfig, RoomSnapshot, ServerToClient,
    SymbolSource,
};
use snapmatch::room::registry::RoomRegistry;
use snapmatch::room::{AttachIntent, RoomHandle, SessionId};

struct Client {
    session: SessionId,
    rx: mpsc::UnboundedReceiver<ServerToClient>,
}

impl Client {
    async fn recv(&mut self) -> ServerToClient {
        self.rx.recv().await.expect("session channel closed")
    }

    async fn recv_snapshot(&mut self) -> RoomSnapshot {
        match self.recv().await {
            ServerToClient::RoomState { snapshot } => snapshot,
            other => panic!("expected room_state, got {other:?}"),
        }
    }

    /// Skip events until `want` matches.
    async fn recv_until(&mut self, want: fn(&ServerToClient) -> bool) -> ServerToClient {
        loop {
            let event = self.recv().await;
            if want(&event) {
                return event;
            }
        }
    }

    async fn recv_round_start(&mut self) -> (u32, Card, Option<Card>) {
        match self
            .recv_until(|e| matches!(e, ServerToClient::RoundStart { .. }))
            .await
        {
            ServerToClient::RoundStart {
                round_number,
                center_card,
                your_top_card,
            } => (round_number, center_card, your_top_card),
            _ => unreachable!(),
        }
    }

    async fn recv_error(&mut self) -> ErrorCode {
        match self
            .recv_until(|e| matches!(e, ServerToClient::Error { .. }))
            .await
        {
            ServerToClient::Error { code, .. } => code,
            _ => unreachable!(),
        }
    }

    fn send(&self, room: &RoomHandle, msg: ClientToServer) {
        room.command(self.session, msg);
    }
}

async fn join(room: &RoomHandle, name: &str) -> (Client, PlayerId) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut client = Client {
        session: Uuid::new_v4(),
        rx,
    };
    room.attach(
        client.session,
        AttachIntent::Join { name: name.into() },
        tx,
    );
    let snapshot = client.recv_snapshot().await;
    (client, snapshot.player_id)
}

fn open_room(policy: RoomPolicy) -> (RoomRegistry, RoomHandle) {
    let registry = RoomRegistry::new(policy);
    let room = registry.ensure(registry.fresh_code());
    (registry, room)
}

fn winning_symbol(top: &Card, center: &Card) -> SymbolId {
    top.shared_symbol(center).expect("any two cards share one symbol")
}

fn losing_symbol(top: &Card, center: &Card) -> SymbolId {
    top.symbols
        .iter()
        .copied()
        .find(|s| !center.has_symbol(*s))
        .expect("cards share exactly one symbol, the rest miss")
}

fn small_deck_config() -> RoomConfig {
    // Two players: stacks of 2 each, one center, two in the pile.
    RoomConfig {
        layout: LayoutMode::Classic,
        symbols: SymbolSource::SymbolSet {
            symbol_set: "classic".into(),
        },
        deck_size: 7,
    }
}

#[tokio::test(start_paused = true)]
async fn join_seeds_snapshot_and_notifies_peers() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (_b, pid_b) = join(&room, "bea").await;

    match a.recv().await {
        ServerToClient::PlayerJoined { player } => {
            assert_eq!(player.player_id, pid_b);
            assert_eq!(player.name, "bea");
            assert!(!player.is_host);
        }
        other => panic!("expected player_joined, got {other:?}"),
    }
    // First joiner is host; two joins never share an identity.
    assert_ne!(pid_a, pid_b);
}

#[tokio::test(start_paused = true)]
async fn join_is_refused_when_room_is_full() {
    let policy = RoomPolicy {
        max_players: 2,
        ..RoomPolicy::default()
    };
    let (_registry, room) = open_room(policy);
    let (_a, _) = join(&room, "ada").await;
    let (_b, _) = join(&room, "bea").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    room.attach(
        Uuid::new_v4(),
        AttachIntent::Join { name: "cam".into() },
        tx,
    );
    match rx.recv().await {
        Some(ServerToClient::Error { code, .. }) => assert_eq!(code, ErrorCode::RoomFull),
        other => panic!("expected room_full error, got {other:?}"),
    }
    // A rejected attach never binds; the channel closes so the socket
    // pump can unwind.
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn first_valid_claim_wins_the_round() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (mut b, _pid_b) = join(&room, "bea").await;

    a.send(&room, ClientToServer::StartGame);
    let (round, center_a, top_a) = a.recv_round_start().await;
    let (_, center_b, top_b) = b.recv_round_start().await;
    assert_eq!(round, 1);
    assert_eq!(center_a, center_b);

    // Both race with a valid symbol; a's claim enters the queue first.
    a.send(
        &room,
        ClientToServer::MatchAttempt {
            symbol_id: winning_symbol(top_a.as_ref().unwrap(), &center_a),
            client_timestamp_ms: None,
        },
    );
    b.send(
        &room,
        ClientToServer::MatchAttempt {
            symbol_id: winning_symbol(top_b.as_ref().unwrap(), &center_b),
            client_timestamp_ms: None,
        },
    );

    for client in [&mut a, &mut b] {
        match client
            .recv_until(|e| matches!(e, ServerToClient::RoundWinner { .. }))
            .await
        {
            ServerToClient::RoundWinner {
                round_number,
                player_id,
                ..
            } => {
                assert_eq!(round_number, 1);
                assert_eq!(player_id, pid_a);
            }
            _ => unreachable!(),
        }
    }
    // The losing racer is told the round already moved on.
    assert_eq!(b.recv_error().await, ErrorCode::InvalidTransition);

    // Exactly one winner per round: the next thing after the pause is round 2.
    let (round, _, _) = a.recv_round_start().await;
    assert_eq!(round, 2);
}

#[tokio::test(start_paused = true)]
async fn wrong_claim_penalizes_only_the_claimant() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (mut b, pid_b) = join(&room, "bea").await;

    a.send(&room, ClientToServer::StartGame);
    let (_, center, top_a) = a.recv_round_start().await;
    let (_, _, top_b) = b.recv_round_start().await;
    let top_a = top_a.unwrap();

    a.send(
        &room,
        ClientToServer::MatchAttempt {
            symbol_id: losing_symbol(&top_a, &center),
            client_timestamp_ms: None,
        },
    );
    assert_eq!(a.recv_error().await, ErrorCode::ValidationFailed);
    match a.recv().await {
        ServerToClient::Penalty {
            player_id,
            duration_ms,
        } => {
            assert_eq!(player_id, pid_a);
            assert!(duration_ms > 0);
        }
        other => panic!("expected penalty, got {other:?}"),
    }

    // A correct claim while locked out is dropped without deciding anything.
    a.send(
        &room,
        ClientToServer::MatchAttempt {
            symbol_id: winning_symbol(&top_a, &center),
            client_timestamp_ms: None,
        },
    );
    // The round stays open for everyone else.
    b.send(
        &room,
        ClientToServer::MatchAttempt {
            symbol_id: winning_symbol(top_b.as_ref().unwrap(), &center),
            client_timestamp_ms: None,
        },
    );
    match a
        .recv_until(|e| matches!(e, ServerToClient::RoundWinner { .. }))
        .await
    {
        ServerToClient::RoundWinner { player_id, .. } => assert_eq!(player_id, pid_b),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn host_leaving_promotes_earliest_joined_connected_player() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (mut b, pid_b) = join(&room, "bea").await;
    let (mut c, _pid_c) = join(&room, "cam").await;

    a.send(&room, ClientToServer::Leave);
    for client in [&mut b, &mut c] {
        match client
            .recv_until(|e| matches!(e, ServerToClient::PlayerLeft { .. }))
            .await
        {
            ServerToClient::PlayerLeft { player_id } => assert_eq!(player_id, pid_a),
            _ => unreachable!(),
        }
        match client.recv().await {
            ServerToClient::HostChanged { player_id } => assert_eq!(player_id, pid_b),
            other => panic!("expected host_changed, got {other:?}"),
        }
    }
    // The leaver hears their own departure, then the channel closes.
    match a
        .recv_until(|e| matches!(e, ServerToClient::PlayerLeft { .. }))
        .await
    {
        ServerToClient::PlayerLeft { player_id } => assert_eq!(player_id, pid_a),
        _ => unreachable!(),
    }
    assert!(a.rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn non_host_cannot_kick_or_start() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (_a, pid_a) = join(&room, "ada").await;
    let (mut b, _) = join(&room, "bea").await;

    b.send(&room, ClientToServer::KickPlayer { player_id: pid_a });
    assert_eq!(b.recv_error().await, ErrorCode::AuthorizationDenied);
    b.send(&room, ClientToServer::StartGame);
    assert_eq!(b.recv_error().await, ErrorCode::AuthorizationDenied);
}

#[tokio::test(start_paused = true)]
async fn kicked_player_hears_their_own_departure_then_the_session_closes() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, _) = join(&room, "ada").await;
    let (mut b, pid_b) = join(&room, "bea").await;
    let (mut c, _) = join(&room, "cam").await;

    a.send(&room, ClientToServer::KickPlayer { player_id: pid_b });
    // Everyone — the kicked player included — sees the departure.
    for client in [&mut a, &mut b, &mut c] {
        match client
            .recv_until(|e| matches!(e, ServerToClient::PlayerLeft { .. }))
            .await
        {
            ServerToClient::PlayerLeft { player_id } => assert_eq!(player_id, pid_b),
            _ => unreachable!(),
        }
    }
    // The kicked player's channel then closes for good.
    assert!(b.rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn kicked_player_cannot_reconnect() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, _) = join(&room, "ada").await;
    let (_b, pid_b) = join(&room, "bea").await;
    let (_c, _) = join(&room, "cam").await;

    a.send(&room, ClientToServer::KickPlayer { player_id: pid_b });
    a.recv_until(|e| matches!(e, ServerToClient::PlayerLeft { .. }))
        .await;

    // The kick is permanent: the retired identity is a tombstone.
    let (tx, mut rx) = mpsc::unbounded_channel();
    room.attach(
        Uuid::new_v4(),
        AttachIntent::Reconnect { player_id: pid_b },
        tx,
    );
    match rx.recv().await {
        Some(ServerToClient::Error { code, .. }) => {
            assert_eq!(code, ErrorCode::SessionInvalid);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn countdown_cancels_when_roster_drops_below_minimum() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, _) = join(&room, "ada").await;
    let (b, _) = join(&room, "bea").await;

    a.send(&room, ClientToServer::StartGame);
    match a
        .recv_until(|e| matches!(e, ServerToClient::Countdown { .. }))
        .await
    {
        ServerToClient::Countdown { remaining_ms } => assert!(remaining_ms > 0),
        _ => unreachable!(),
    }

    b.send(&room, ClientToServer::Leave);
    a.recv_until(|e| matches!(e, ServerToClient::PlayerLeft { .. }))
        .await;
    match a.recv().await {
        ServerToClient::Countdown { remaining_ms } => assert!(remaining_ms < 0),
        other => panic!("expected cancelling countdown, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn lobby_autostart_restarts_with_a_notice_below_minimum() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, _) = join(&room, "ada").await;
    let (b, _) = join(&room, "bea").await;

    // Auto-start is armed; a silent drop leaves one connected player.
    room.detach(b.session);
    a.recv_until(|e| matches!(e, ServerToClient::PlayerDisconnected { .. }))
        .await;

    match a
        .recv_until(|e| matches!(e, ServerToClient::NeedMorePlayers { .. }))
        .await
    {
        ServerToClient::NeedMorePlayers { have, need } => {
            assert_eq!(have, 1);
            assert_eq!(need, 2);
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn join_mid_game_is_rejected() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, _) = join(&room, "ada").await;
    let (mut b, _) = join(&room, "bea").await;
    a.send(&room, ClientToServer::StartGame);
    a.recv_round_start().await;
    b.recv_round_start().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    room.attach(
        Uuid::new_v4(),
        AttachIntent::Join { name: "cam".into() },
        tx,
    );
    match rx.recv().await {
        Some(ServerToClient::Error { code, .. }) => {
            assert_eq!(code, ErrorCode::InvalidTransition);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn reconnect_restores_mid_game_state_and_supersedes_the_old_session() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (mut b, pid_b) = join(&room, "bea").await;
    a.send(&room, ClientToServer::StartGame);
    let (_, center, _) = a.recv_round_start().await;
    b.recv_round_start().await;

    // The host's socket drops without a leave; the seat moves on.
    room.detach(a.session);
    match b
        .recv_until(|e| matches!(e, ServerToClient::PlayerDisconnected { .. }))
        .await
    {
        ServerToClient::PlayerDisconnected { player_id } => assert_eq!(player_id, pid_a),
        _ => unreachable!(),
    }
    match b.recv().await {
        ServerToClient::HostChanged { player_id } => assert_eq!(player_id, pid_b),
        other => panic!("expected host_changed, got {other:?}"),
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let mut a2 = Client {
        session: Uuid::new_v4(),
        rx,
    };
    room.attach(a2.session, AttachIntent::Reconnect { player_id: pid_a }, tx);
    let snapshot = a2.recv_snapshot().await;
    assert_eq!(snapshot.player_id, pid_a);
    assert_eq!(snapshot.phase, Phase::Playing);
    assert_eq!(snapshot.center_card, Some(center));
    assert!(!snapshot.your_cards.is_empty());
    // The reconnect does not steal the host seat back.
    let me = snapshot
        .players
        .iter()
        .find(|p| p.player_id == pid_a)
        .unwrap();
    assert!(!me.is_host);

    match b
        .recv_until(|e| matches!(e, ServerToClient::PlayerReconnected { .. }))
        .await
    {
        ServerToClient::PlayerReconnected { player_id } => assert_eq!(player_id, pid_a),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_with_unknown_identity_is_invalid() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (_a, _) = join(&room, "ada").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    room.attach(
        Uuid::new_v4(),
        AttachIntent::Reconnect {
            player_id: Uuid::new_v4(),
        },
        tx,
    );
    match rx.recv().await {
        Some(ServerToClient::Error { code, .. }) => {
            assert_eq!(code, ErrorCode::SessionInvalid);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(rx.recv().await.is_none());
}

/// Drive a two-player, seven-card game until ada sweeps every round.
async fn play_until_game_over(
    room: &RoomHandle,
    a: &mut Client,
    b: &mut Client,
) -> (Option<PlayerId>, Vec<snapmatch::protocol::Ranking>) {
    a.send(
        room,
        ClientToServer::SetConfig {
            config: small_deck_config(),
        },
    );
    a.recv_until(|e| matches!(e, ServerToClient::ConfigUpdated { .. }))
        .await;
    a.send(room, ClientToServer::StartGame);

    loop {
        let event = a.recv().await;
        match event {
            ServerToClient::RoundStart {
                center_card,
                your_top_card,
                ..
            } => {
                let top = your_top_card.expect("stack not empty at round start");
                a.send(
                    room,
                    ClientToServer::MatchAttempt {
                        symbol_id: winning_symbol(&top, &center_card),
                        client_timestamp_ms: None,
                    },
                );
            }
            ServerToClient::GameOver {
                winner, rankings, ..
            } => {
                b.recv_until(|e| matches!(e, ServerToClient::GameOver { .. }))
                    .await;
                return (winner, rankings);
            }
            _ => {}
        }
    }
}

#[tokio::test(start_paused = true)]
async fn sweeping_every_round_empties_the_stack_and_ends_the_game() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (mut b, pid_b) = join(&room, "bea").await;

    let (winner, rankings) = play_until_game_over(&room, &mut a, &mut b).await;
    assert_eq!(winner, Some(pid_a));
    assert_eq!(rankings[0].player_id, pid_a);
    assert_eq!(rankings[0].cards_remaining, 0);
    let loser = rankings.iter().find(|r| r.player_id == pid_b).unwrap();
    assert_eq!(loser.cards_remaining, 2);
}

#[tokio::test(start_paused = true)]
async fn unanimous_play_again_resets_the_room() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (mut b, _) = join(&room, "bea").await;
    play_until_game_over(&room, &mut a, &mut b).await;

    a.send(&room, ClientToServer::PlayAgain);
    match a
        .recv_until(|e| matches!(e, ServerToClient::PlayAgainAck { .. }))
        .await
    {
        ServerToClient::PlayAgainAck {
            player_id,
            votes,
            needed,
        } => {
            assert_eq!(player_id, pid_a);
            assert_eq!(votes, 1);
            assert_eq!(needed, 2);
        }
        _ => unreachable!(),
    }

    b.send(&room, ClientToServer::PlayAgain);
    for client in [&mut a, &mut b] {
        client
            .recv_until(|e| matches!(e, ServerToClient::RoomReset))
            .await;
    }
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_the_rejoin_window_lapses_is_invalid() {
    let (_registry, room) = open_room(RoomPolicy::default());
    let (mut a, pid_a) = join(&room, "ada").await;
    let (mut b, _) = join(&room, "bea").await;
    play_until_game_over(&room, &mut a, &mut b).await;

    tokio::time::advance(Duration::from_secs(31)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    room.attach(
        Uuid::new_v4(),
        AttachIntent::Reconnect { player_id: pid_a },
        tx,
    );
    match rx.recv().await {
        Some(ServerToClient::Error { code, .. }) => {
            assert_eq!(code, ErrorCode::SessionInvalid);
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn abandoned_lobby_expires_and_is_removed_from_the_registry() {
    let (registry, room) = open_room(RoomPolicy::default());
    let code = room.code;
    let (a, _) = join(&room, "ada").await;

    room.detach(a.session);
    // The idle-expiry timer only exists once the actor has seen the
    // detach; let it run before moving the clock.
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
    tokio::time::advance(Duration::from_secs(601)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(registry.lookup(code).is_none());
}
