// Integration tests for the HeroDraft session engine.
//
// These tests exercise the full system end-to-end through the library
// crate's public API: a session actor per draft, channel-backed connection
// sinks standing in for WebSocket write halves, a seeded RNG, and tokio's
// paused test clock for timer behavior.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use herodraft::catalog::{HeroCatalog, HeroId};
use herodraft::draft::sequence::ActionType;
use herodraft::draft::state::{Phase, RoundState, TeamIdentity};
use herodraft::draft::timer::TimerPolicy;
use herodraft::draft::TeamSlot;
use herodraft::history::{EventSink, HistoryEntry};
use herodraft::protocol::{ChoiceOption, ClientCommand, ErrorCode, ServerFrame, SessionSnapshot};
use herodraft::roster::{DraftRoster, RosterProvider, StaticRoster};
use herodraft::session::{ConnId, Role, SessionActor, SessionHandle, SessionManager};

// ===========================================================================
// Test helpers
// ===========================================================================

const CONN_A: ConnId = 1;
const CONN_B: ConnId = 2;
const CONN_ADMIN: ConnId = 3;

fn catalog() -> Arc<HeroCatalog> {
    Arc::new(HeroCatalog::from_entries((1..=40).map(|id| (id, format!("Hero {id}")))).unwrap())
}

fn teams() -> [TeamIdentity; 2] {
    [
        TeamIdentity {
            name: "Wolves".into(),
            captain: "token-a".into(),
        },
        TeamIdentity {
            name: "Ravens".into(),
            captain: "token-b".into(),
        },
    ]
}

/// History sink that shares its entries with the test.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<HistoryEntry>>>);

impl EventSink for SharedSink {
    fn record(&mut self, entry: HistoryEntry) {
        self.0.lock().unwrap().push(entry);
    }
}

struct TestSession {
    handle: SessionHandle,
    history: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl TestSession {
    fn lines(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.line.clone())
            .collect()
    }
}

fn spawn_session(seed: u64) -> TestSession {
    let sink = SharedSink::default();
    let history = sink.0.clone();
    let handle = SessionActor::spawn_with(
        "match-1".into(),
        teams(),
        TimerPolicy::default(),
        catalog(),
        Box::new(sink),
        StdRng::seed_from_u64(seed),
    );
    TestSession { handle, history }
}

/// Attach a connection and consume the snapshot replayed on attach.
async fn attach(handle: &SessionHandle, conn: ConnId, role: Role) -> mpsc::Receiver<ServerFrame> {
    let (tx, mut rx) = mpsc::channel(256);
    handle.attach(conn, role, tx).await;
    let first = rx.recv().await.expect("snapshot on attach");
    assert!(
        matches!(first, ServerFrame::StateSnapshot(_)),
        "first frame on attach must be a snapshot, got {first:?}"
    );
    rx
}

/// Attach without consuming the initial snapshot.
async fn attach_raw(handle: &SessionHandle, conn: ConnId, role: Role) -> mpsc::Receiver<ServerFrame> {
    let (tx, rx) = mpsc::channel(256);
    handle.attach(conn, role, tx).await;
    rx
}

async fn snapshot(rx: &mut mpsc::Receiver<ServerFrame>) -> SessionSnapshot {
    match rx.recv().await.expect("expected a frame") {
        ServerFrame::StateSnapshot(snapshot) => snapshot,
        other => panic!("expected state_snapshot, got {other:?}"),
    }
}

async fn error_frame(rx: &mut mpsc::Receiver<ServerFrame>) -> ErrorCode {
    match rx.recv().await.expect("expected a frame") {
        ServerFrame::Error { code, .. } => code,
        other => panic!("expected error frame, got {other:?}"),
    }
}

fn conn_of(slot: TeamSlot) -> ConnId {
    match slot {
        TeamSlot::A => CONN_A,
        TeamSlot::B => CONN_B,
    }
}

/// Drive an attached pair of captains through ready/flip/choice into
/// `Drafting`, draining both receivers. Returns the first-pick team's slot
/// (the roll winner, who takes first pick in this fixture).
async fn to_drafting(
    session: &TestSession,
    rx_a: &mut mpsc::Receiver<ServerFrame>,
    rx_b: &mut mpsc::Receiver<ServerFrame>,
) -> TeamSlot {
    let handle = &session.handle;

    handle.command(CONN_A, ClientCommand::Ready).await;
    snapshot(rx_a).await;
    snapshot(rx_b).await;
    handle.command(CONN_B, ClientCommand::Ready).await;
    snapshot(rx_a).await;
    snapshot(rx_b).await;

    handle.command(CONN_A, ClientCommand::FlipCoin).await;
    let snap = snapshot(rx_a).await;
    snapshot(rx_b).await;
    let winner = snap.roll_winner.expect("flip must designate a winner");

    handle
        .command(
            conn_of(winner),
            ClientCommand::SubmitChoice {
                option: ChoiceOption::FirstPick,
            },
        )
        .await;
    snapshot(rx_a).await;
    snapshot(rx_b).await;

    handle
        .command(
            conn_of(winner.other()),
            ClientCommand::SubmitChoice {
                option: ChoiceOption::Radiant,
            },
        )
        .await;
    let snap = snapshot(rx_a).await;
    snapshot(rx_b).await;
    assert_eq!(snap.phase, Phase::Drafting);
    winner
}

// ===========================================================================
// Phase progression scenarios
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn both_ready_moves_waiting_to_rolling() {
    let session = spawn_session(1);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;

    session.handle.command(CONN_A, ClientCommand::Ready).await;
    let snap = snapshot(&mut rx_a).await;
    assert_eq!(snap.phase, Phase::Waiting);
    assert!(snap.teams[0].ready);
    assert!(!snap.teams[1].ready);
    snapshot(&mut rx_b).await;

    session.handle.command(CONN_B, ClientCommand::Ready).await;
    let snap = snapshot(&mut rx_a).await;
    assert_eq!(snap.phase, Phase::Rolling);
    snapshot(&mut rx_b).await;

    assert!(session.lines().iter().any(|l| l == "Wolves is ready"));
    assert!(session
        .lines()
        .iter()
        .any(|l| l == "Both teams ready, rolling for choice"));
}

#[tokio::test(start_paused = true)]
async fn duplicate_ready_produces_no_broadcast() {
    let session = spawn_session(1);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;

    session.handle.command(CONN_A, ClientCommand::Ready).await;
    snapshot(&mut rx_a).await;
    session.handle.command(CONN_A, ClientCommand::Ready).await;

    // Force a round-trip so the duplicate has definitely been processed:
    // an illegal command gets a rejection frame.
    session.handle.command(CONN_A, ClientCommand::Resume).await;
    assert_eq!(error_frame(&mut rx_a).await, ErrorCode::IllegalPhase);
    assert!(rx_a.try_recv().is_err(), "duplicate ready must not broadcast");
}

#[tokio::test(start_paused = true)]
async fn flip_coin_designates_single_winner() {
    let session = spawn_session(2);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;

    session.handle.command(CONN_A, ClientCommand::Ready).await;
    snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;
    session.handle.command(CONN_B, ClientCommand::Ready).await;
    snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;

    // Either captain may flip; B does it here.
    session.handle.command(CONN_B, ClientCommand::FlipCoin).await;
    let snap_a = snapshot(&mut rx_a).await;
    let snap_b = snapshot(&mut rx_b).await;

    assert_eq!(snap_a.phase, Phase::Choosing);
    assert!(snap_a.roll_winner.is_some());
    // Both observers see the same authoritative result.
    assert_eq!(snap_a, snap_b);
}

#[tokio::test(start_paused = true)]
async fn loser_is_restricted_to_remaining_axis() {
    let session = spawn_session(3);
    let handle = &session.handle;
    let mut rx_a = attach(handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(handle, CONN_B, Role::Captain(TeamSlot::B)).await;

    handle.command(CONN_A, ClientCommand::Ready).await;
    snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;
    handle.command(CONN_B, ClientCommand::Ready).await;
    snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;
    handle.command(CONN_A, ClientCommand::FlipCoin).await;
    let winner = snapshot(&mut rx_a).await.roll_winner.unwrap();
    snapshot(&mut rx_b).await;

    handle
        .command(
            conn_of(winner),
            ClientCommand::SubmitChoice {
                option: ChoiceOption::FirstPick,
            },
        )
        .await;
    snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;

    // The order axis is consumed; the loser may only pick a side.
    let loser_conn = conn_of(winner.other());
    let loser_rx = if winner == TeamSlot::A { &mut rx_b } else { &mut rx_a };
    handle
        .command(
            loser_conn,
            ClientCommand::SubmitChoice {
                option: ChoiceOption::SecondPick,
            },
        )
        .await;
    assert_eq!(error_frame(loser_rx).await, ErrorCode::ChoiceUnavailable);

    handle
        .command(
            loser_conn,
            ClientCommand::SubmitChoice {
                option: ChoiceOption::Radiant,
            },
        )
        .await;
    let snap = snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;

    assert_eq!(snap.phase, Phase::Drafting);
    assert_eq!(snap.current_round, Some(1));

    // Round 1: first-pick team bans.
    let first_pick_team = snap
        .teams
        .iter()
        .find(|t| t.is_first_pick == Some(true))
        .expect("one team is first pick");
    assert_eq!(first_pick_team.slot, winner);
    assert_eq!(snap.rounds[0].state, RoundState::Active);
    assert_eq!(snap.rounds[0].action, ActionType::Ban);
    assert_eq!(snap.rounds[0].team, Some(winner));

    // Sides are complementary.
    let sides: Vec<_> = snap.teams.iter().filter_map(|t| t.side).collect();
    assert_eq!(sides.len(), 2);
    assert_ne!(sides[0], sides[1]);
}

// ===========================================================================
// Drafting: picks, bans, rejections
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn wrong_actor_rejected_without_broadcast() {
    let session = spawn_session(4);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let winner = to_drafting(&session, &mut rx_a, &mut rx_b).await;

    let idle_conn = conn_of(winner.other());
    let idle_rx = if winner == TeamSlot::A { &mut rx_b } else { &mut rx_a };
    session
        .handle
        .command(idle_conn, ClientCommand::PickOrBan { hero_id: 1 })
        .await;

    assert_eq!(error_frame(idle_rx).await, ErrorCode::WrongActor);
    let other_rx = if winner == TeamSlot::A { &mut rx_a } else { &mut rx_b };
    assert!(other_rx.try_recv().is_err(), "rejection must not broadcast");
}

#[tokio::test(start_paused = true)]
async fn unknown_and_taken_heroes_rejected() {
    let session = spawn_session(5);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let winner = to_drafting(&session, &mut rx_a, &mut rx_b).await;
    let (actor_conn, actor_rx) = if winner == TeamSlot::A {
        (CONN_A, &mut rx_a)
    } else {
        (CONN_B, &mut rx_b)
    };

    session
        .handle
        .command(actor_conn, ClientCommand::PickOrBan { hero_id: 9999 })
        .await;
    assert_eq!(error_frame(actor_rx).await, ErrorCode::UnknownHero);

    // Ban hero 7 in round 1, then try to use it again in round 2 (also this
    // team's round per the table).
    session
        .handle
        .command(actor_conn, ClientCommand::PickOrBan { hero_id: 7 })
        .await;
    snapshot(actor_rx).await;
    session
        .handle
        .command(actor_conn, ClientCommand::PickOrBan { hero_id: 7 })
        .await;
    assert_eq!(error_frame(actor_rx).await, ErrorCode::HeroTaken);
}

#[tokio::test(start_paused = true)]
async fn admin_connection_cannot_act_for_a_team() {
    let session = spawn_session(6);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_admin = attach(&session.handle, CONN_ADMIN, Role::Admin).await;

    session.handle.command(CONN_ADMIN, ClientCommand::Ready).await;
    assert_eq!(error_frame(&mut rx_admin).await, ErrorCode::Unauthorized);

    // And captains cannot use administrative commands.
    session.handle.command(CONN_A, ClientCommand::Reset).await;
    assert_eq!(error_frame(&mut rx_a).await, ErrorCode::Unauthorized);
}

// ===========================================================================
// Timeouts
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn force_timeout_resolves_round_one() {
    let session = spawn_session(7);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let mut rx_admin = attach(&session.handle, CONN_ADMIN, Role::Admin).await;
    let winner = to_drafting(&session, &mut rx_a, &mut rx_b).await;
    snapshot(&mut rx_admin).await; // drain the to_drafting broadcasts
    snapshot(&mut rx_admin).await;
    snapshot(&mut rx_admin).await;
    snapshot(&mut rx_admin).await;
    snapshot(&mut rx_admin).await;

    session
        .handle
        .command(CONN_ADMIN, ClientCommand::ForceTimeout)
        .await;
    let snap = snapshot(&mut rx_admin).await;

    assert_eq!(snap.rounds[0].state, RoundState::Completed);
    let hero = snap.rounds[0].hero_id.expect("timed-out round has a hero");
    assert!(catalog().is_valid(HeroId(hero)));
    assert_eq!(snap.current_round, Some(2));
    assert_eq!(snap.rounds[1].state, RoundState::Active);
    // Round 2 per the table: first-pick team again, ban.
    assert_eq!(snap.rounds[1].team, Some(winner));
    assert_eq!(snap.rounds[1].action, ActionType::Ban);

    // The automatic resolution is distinguishable in the history.
    assert!(session
        .lines()
        .iter()
        .any(|l| l.starts_with("Round 1:") && l.contains("automatic")));
}

#[tokio::test(start_paused = true)]
async fn twenty_four_timeouts_complete_the_draft() {
    let session = spawn_session(8);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let mut rx_admin = attach(&session.handle, CONN_ADMIN, Role::Admin).await;
    to_drafting(&session, &mut rx_a, &mut rx_b).await;
    for _ in 0..5 {
        snapshot(&mut rx_admin).await;
    }

    let mut last = None;
    for _ in 0..24 {
        session
            .handle
            .command(CONN_ADMIN, ClientCommand::ForceTimeout)
            .await;
        last = Some(snapshot(&mut rx_admin).await);
    }
    let snap = last.unwrap();

    assert_eq!(snap.phase, Phase::Completed);
    assert_eq!(snap.current_round, None);
    let mut heroes: Vec<u32> = snap.rounds.iter().filter_map(|r| r.hero_id).collect();
    assert_eq!(heroes.len(), 24);
    heroes.sort_unstable();
    heroes.dedup();
    assert_eq!(heroes.len(), 24, "consumed heroes must be distinct");

    // A redundant timeout after completion is a no-op, not an error.
    session
        .handle
        .command(CONN_ADMIN, ClientCommand::ForceTimeout)
        .await;
    session.handle.command(CONN_ADMIN, ClientCommand::Abandon).await;
    let snap = snapshot(&mut rx_admin).await;
    assert_eq!(snap.phase, Phase::Abandoned);
}

#[tokio::test(start_paused = true)]
async fn clock_expiry_auto_resolves_the_round() {
    let session = spawn_session(9);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    to_drafting(&session, &mut rx_a, &mut rx_b).await;

    // No one acts; the paused test clock auto-advances to the deadline
    // (grace + reserve) and the engine resolves the round itself.
    let snap = snapshot(&mut rx_a).await;
    assert_eq!(snap.rounds[0].state, RoundState::Completed);
    assert!(snap.rounds[0].hero_id.is_some());
    assert_eq!(snap.current_round, Some(2));
    assert!(session
        .lines()
        .iter()
        .any(|l| l.starts_with("Round 1:") && l.contains("automatic")));
}

// ===========================================================================
// Pause / resume
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn pause_and_resume_with_countdown() {
    let session = spawn_session(10);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    to_drafting(&session, &mut rx_a, &mut rx_b).await;

    // Either captain may pause, including the one not on the clock.
    session.handle.command(CONN_B, ClientCommand::Pause).await;
    let snap = snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;
    assert_eq!(snap.phase, Phase::Paused);
    assert_eq!(snap.current_round, Some(1));

    session.handle.command(CONN_A, ClientCommand::Resume).await;
    // The countdown notice precedes the snapshot.
    match rx_a.recv().await.unwrap() {
        ServerFrame::ResumeCountdown { seconds } => assert_eq!(seconds, 3),
        other => panic!("expected resume_countdown, got {other:?}"),
    }
    let snap = snapshot(&mut rx_a).await;
    assert_eq!(snap.phase, Phase::Drafting);
    assert!(snap.resume_countdown_ms.is_some());

    // Countdown elapses (auto-advanced), clock restarts, snapshot follows.
    match rx_a.recv().await.unwrap() {
        ServerFrame::StateSnapshot(snap) => {
            assert_eq!(snap.phase, Phase::Drafting);
            assert_eq!(snap.resume_countdown_ms, None);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_of_active_captain_pauses() {
    let session = spawn_session(11);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let winner = to_drafting(&session, &mut rx_a, &mut rx_b).await;

    let (active_conn, idle_rx) = if winner == TeamSlot::A {
        (CONN_A, &mut rx_b)
    } else {
        (CONN_B, &mut rx_a)
    };
    session.handle.detach(active_conn).await;
    let snap = snapshot(idle_rx).await;
    assert_eq!(snap.phase, Phase::Paused);
    assert!(!snap.teams[winner.index()].captain_connected);

    // Reconnect: fresh connection for the same captain lifts the pause.
    let new_conn: ConnId = 50;
    let mut new_rx = attach_raw(&session.handle, new_conn, Role::Captain(winner)).await;
    // First the snapshot replay, then the resume countdown, then the
    // broadcast snapshot.
    let replay = snapshot(&mut new_rx).await;
    assert_eq!(replay.phase, Phase::Paused);
    match new_rx.recv().await.unwrap() {
        ServerFrame::ResumeCountdown { .. } => {}
        other => panic!("expected resume_countdown, got {other:?}"),
    }
    let snap = snapshot(&mut new_rx).await;
    assert_eq!(snap.phase, Phase::Drafting);
}

#[tokio::test(start_paused = true)]
async fn disconnect_of_idle_captain_does_not_pause() {
    let session = spawn_session(12);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let winner = to_drafting(&session, &mut rx_a, &mut rx_b).await;

    let (idle_conn, active_conn, active_rx) = if winner == TeamSlot::A {
        (CONN_B, CONN_A, &mut rx_a)
    } else {
        (CONN_A, CONN_B, &mut rx_b)
    };
    session.handle.detach(idle_conn).await;

    // Still drafting: the acting captain can resolve round 1.
    session
        .handle
        .command(active_conn, ClientCommand::PickOrBan { hero_id: 3 })
        .await;
    let snap = snapshot(active_rx).await;
    assert_eq!(snap.phase, Phase::Drafting);
    assert_eq!(snap.current_round, Some(2));
}

// ===========================================================================
// Connection takeover
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn second_connection_supersedes_first() {
    let session = spawn_session(13);
    let mut rx_a1 = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;

    // Captain A opens a second tab.
    let mut rx_a2 = attach_raw(&session.handle, 20, Role::Captain(TeamSlot::A)).await;

    // The first connection gets a one-shot replacement notice with a
    // human-readable reason.
    match rx_a1.recv().await.unwrap() {
        ServerFrame::SessionReplaced { reason } => {
            assert!(reason.contains("another tab"), "reason: {reason}");
        }
        other => panic!("expected session_replaced, got {other:?}"),
    }
    // The second connection is replayed the snapshot and is authoritative.
    let snap = snapshot(&mut rx_a2).await;
    assert_eq!(snap.phase, Phase::Waiting);
    assert!(snap.teams[0].captain_connected);

    // The other captain's connection is unaffected.
    assert!(rx_b.try_recv().is_err());

    // Commands from the superseded connection are no longer serviced: the
    // kicked ready is dropped, so only team B's ready lands and team A is
    // still not ready.
    session.handle.command(CONN_A, ClientCommand::Ready).await;
    session.handle.command(CONN_B, ClientCommand::Ready).await;
    let snap = snapshot(&mut rx_a2).await;
    assert_eq!(snap.phase, Phase::Waiting);
    assert!(!snap.teams[0].ready);
    assert!(snap.teams[1].ready);
    assert!(rx_a2.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn inert_connection_receives_no_further_frames() {
    let session = spawn_session(14);
    let mut rx_a1 = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let mut rx_a2 = attach_raw(&session.handle, 20, Role::Captain(TeamSlot::A)).await;

    match rx_a1.recv().await.unwrap() {
        ServerFrame::SessionReplaced { .. } => {}
        other => panic!("expected session_replaced, got {other:?}"),
    }
    snapshot(&mut rx_a2).await;

    // Accepted mutations broadcast to live connections only; the inert one
    // sees nothing after its replacement notice (no kick/reconnect loop).
    session.handle.command(20, ClientCommand::Ready).await;
    snapshot(&mut rx_a2).await;
    snapshot(&mut rx_b).await;
    assert!(rx_a1.try_recv().is_err());

    // The kicked socket eventually closes; its detach must not unregister
    // the replacement connection.
    session.handle.detach(CONN_A).await;
    session.handle.command(CONN_B, ClientCommand::Ready).await;
    let snap = snapshot(&mut rx_a2).await;
    assert_eq!(snap.phase, Phase::Rolling);
}

// ===========================================================================
// Snapshot replay and consistency
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn reconnecting_client_is_replayed_current_state() {
    let session = spawn_session(15);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let winner = to_drafting(&session, &mut rx_a, &mut rx_b).await;

    // Resolve round 1; round 2 also belongs to the first-pick team, so the
    // other captain stays off the clock.
    session
        .handle
        .command(conn_of(winner), ClientCommand::PickOrBan { hero_id: 1 })
        .await;

    // The idle captain drops and comes back with a fresh connection.
    let idle_slot = winner.other();
    session.handle.detach(conn_of(idle_slot)).await;
    let mut rx_new = attach_raw(&session.handle, 30, Role::Captain(idle_slot)).await;
    let replay = snapshot(&mut rx_new).await;

    // The replayed snapshot reflects all completed progress; a reconnecting
    // client can never observe a round regression.
    assert_eq!(replay.phase, Phase::Drafting);
    assert_eq!(replay.current_round, Some(2));
    assert_eq!(replay.rounds[0].hero_id, Some(1));
    assert_eq!(replay.rounds[0].state, RoundState::Completed);
    assert_eq!(replay.rounds[1].state, RoundState::Active);
}

#[tokio::test(start_paused = true)]
async fn all_observers_see_the_same_order_of_snapshots() {
    let session = spawn_session(16);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;

    session.handle.command(CONN_A, ClientCommand::Ready).await;
    session.handle.command(CONN_B, ClientCommand::Ready).await;
    session.handle.command(CONN_B, ClientCommand::FlipCoin).await;

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for _ in 0..3 {
        seen_a.push(snapshot(&mut rx_a).await);
        seen_b.push(snapshot(&mut rx_b).await);
    }
    assert_eq!(seen_a, seen_b, "identical total order for all observers");
    assert_eq!(seen_a[0].phase, Phase::Waiting);
    assert_eq!(seen_a[1].phase, Phase::Rolling);
    assert_eq!(seen_a[2].phase, Phase::Choosing);
}

// ===========================================================================
// Administrative reset
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn reset_returns_session_to_waiting() {
    let session = spawn_session(17);
    let mut rx_a = attach(&session.handle, CONN_A, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&session.handle, CONN_B, Role::Captain(TeamSlot::B)).await;
    let mut rx_admin = attach(&session.handle, CONN_ADMIN, Role::Admin).await;
    let winner = to_drafting(&session, &mut rx_a, &mut rx_b).await;
    for _ in 0..5 {
        snapshot(&mut rx_admin).await;
    }

    session
        .handle
        .command(conn_of(winner), ClientCommand::PickOrBan { hero_id: 4 })
        .await;
    snapshot(&mut rx_admin).await;
    snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;

    session.handle.command(CONN_ADMIN, ClientCommand::Reset).await;
    let snap = snapshot(&mut rx_admin).await;

    assert_eq!(snap.phase, Phase::Waiting);
    assert!(snap.rounds.iter().all(|r| r.state == RoundState::Pending));
    assert!(snap.rounds.iter().all(|r| r.hero_id.is_none()));
    assert!(snap.teams.iter().all(|t| !t.ready));
    assert!(snap.teams.iter().all(|t| t.side.is_none()));
    assert!(snap.teams.iter().all(|t| t.picks.is_empty()));
    assert_eq!(snap.roll_winner, None);
    // Connections stayed attached: captains also received the reset
    // snapshot.
    let snap_a = snapshot(&mut rx_a).await;
    assert_eq!(snap_a.phase, Phase::Waiting);
}

// ===========================================================================
// Session manager authentication
// ===========================================================================

fn manager() -> SessionManager {
    let rosters: Vec<DraftRoster> = vec![DraftRoster {
        draft_id: "match-1".into(),
        teams: teams(),
    }];
    SessionManager::new(
        catalog(),
        Arc::new(StaticRoster::new(rosters)),
        TimerPolicy::default(),
        "admin-secret".into(),
    )
}

#[tokio::test]
async fn authenticate_maps_tokens_to_roles() {
    let manager = manager();

    let (_, role) = manager.authenticate("match-1", "token-a").await.unwrap();
    assert_eq!(role, Role::Captain(TeamSlot::A));
    let (_, role) = manager.authenticate("match-1", "token-b").await.unwrap();
    assert_eq!(role, Role::Captain(TeamSlot::B));
    let (_, role) = manager.authenticate("match-1", "admin-secret").await.unwrap();
    assert_eq!(role, Role::Admin);

    assert!(manager.authenticate("match-1", "wrong").await.is_none());
    assert!(manager.authenticate("match-2", "token-a").await.is_none());
}

#[tokio::test]
async fn authenticate_reuses_one_actor_per_draft() {
    let manager = manager();
    let (h1, _) = manager.authenticate("match-1", "token-a").await.unwrap();
    let (h2, _) = manager.authenticate("match-1", "token-b").await.unwrap();
    assert_eq!(h1.draft_id(), h2.draft_id());

    // Both handles reach the same session: readying through each advances
    // the same state machine.
    let mut rx_a = attach(&h1, 100, Role::Captain(TeamSlot::A)).await;
    let mut rx_b = attach(&h2, 101, Role::Captain(TeamSlot::B)).await;
    h1.command(100, ClientCommand::Ready).await;
    snapshot(&mut rx_a).await;
    snapshot(&mut rx_b).await;
    h2.command(101, ClientCommand::Ready).await;
    let snap = snapshot(&mut rx_a).await;
    assert_eq!(snap.phase, Phase::Rolling);
}

#[tokio::test]
async fn roster_provider_is_consulted_per_draft() {
    let rosters = vec![
        DraftRoster {
            draft_id: "match-1".into(),
            teams: teams(),
        },
        DraftRoster {
            draft_id: "match-2".into(),
            teams: [
                TeamIdentity {
                    name: "Bears".into(),
                    captain: "token-c".into(),
                },
                TeamIdentity {
                    name: "Hawks".into(),
                    captain: "token-d".into(),
                },
            ],
        },
    ];
    let provider = StaticRoster::new(rosters);
    assert!(provider.roster_for("match-2").is_some());

    let manager = SessionManager::new(
        catalog(),
        Arc::new(provider),
        TimerPolicy::default(),
        "admin-secret".into(),
    );
    // Tokens are scoped to their draft.
    assert!(manager.authenticate("match-2", "token-c").await.is_some());
    assert!(manager.authenticate("match-2", "token-a").await.is_none());
}
