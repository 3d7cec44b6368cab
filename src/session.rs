// Per-draft session actor: one task owns all session state and serializes
// every mutation, including timer-driven timeouts.
//
// The WebSocket layer never touches draft state; it forwards messages into
// the actor's queue and pumps outgoing frames from per-connection channels.
// The connection registry lives inside the actor, so takeover decisions are
// serialized with everything else.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::{HeroCatalog, HeroId};
use crate::draft::sequence::{self, ActionType, PickOrder};
use crate::draft::state::{
    CompletedRound, DraftSession, Outcome, Phase, ResolutionSource, TeamIdentity, Wakeup,
};
use crate::draft::timer::TimerPolicy;
use crate::draft::TeamSlot;
use crate::history::{EventSink, HistoryEntry, TracingSink};
use crate::protocol::{
    ClientCommand, ErrorCode, RoundSnapshot, ServerFrame, SessionSnapshot, TeamSnapshot,
};
use crate::roster::RosterProvider;

/// Reason text delivered with a `session_replaced` frame.
const REPLACED_REASON: &str = "This draft was opened in another tab or window.";

/// Unique id for one WebSocket connection, assigned by the manager.
pub type ConnId = u64;

/// Sender half of a connection's outgoing frame channel.
pub type FrameSender = mpsc::Sender<ServerFrame>;

/// Who a connection authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Captain(TeamSlot),
    Admin,
}

/// Messages into the session actor.
#[derive(Debug)]
pub enum SessionMsg {
    Attach {
        conn: ConnId,
        role: Role,
        sink: FrameSender,
    },
    Detach {
        conn: ConnId,
    },
    Command {
        conn: ConnId,
        cmd: ClientCommand,
    },
    /// A frame that failed to parse at the transport layer; the actor
    /// answers with a `bad_message` error on the connection's sink.
    Invalid {
        conn: ConnId,
        message: String,
    },
}

/// Cheap cloneable handle for submitting messages to a session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    draft_id: String,
    tx: mpsc::Sender<SessionMsg>,
}

impl SessionHandle {
    pub(crate) fn new(draft_id: String, tx: mpsc::Sender<SessionMsg>) -> Self {
        SessionHandle { draft_id, tx }
    }

    pub fn draft_id(&self) -> &str {
        &self.draft_id
    }

    pub async fn attach(&self, conn: ConnId, role: Role, sink: FrameSender) {
        let _ = self.tx.send(SessionMsg::Attach { conn, role, sink }).await;
    }

    pub async fn detach(&self, conn: ConnId) {
        let _ = self.tx.send(SessionMsg::Detach { conn }).await;
    }

    pub async fn command(&self, conn: ConnId, cmd: ClientCommand) {
        let _ = self.tx.send(SessionMsg::Command { conn, cmd }).await;
    }

    pub async fn invalid(&self, conn: ConnId, message: String) {
        let _ = self.tx.send(SessionMsg::Invalid { conn, message }).await;
    }
}

// ---------------------------------------------------------------------------
// Connection registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct LiveConn {
    id: ConnId,
    sink: FrameSender,
}

/// Tracks the single live connection per captain plus any admin
/// connections. Superseded connection ids stay in `inert` for the life of
/// the session so late messages from them are dropped without side effects.
#[derive(Debug, Default)]
struct ConnectionRegistry {
    captains: [Option<LiveConn>; 2],
    admins: Vec<LiveConn>,
    inert: HashSet<ConnId>,
}

impl ConnectionRegistry {
    /// Register `conn` as the sole live connection for a captain. Returns
    /// the superseded connection, already marked inert, if there was one.
    fn attach_captain(&mut self, slot: TeamSlot, conn: LiveConn) -> Option<LiveConn> {
        let old = self.captains[slot.index()].replace(conn);
        if let Some(old) = &old {
            self.inert.insert(old.id);
        }
        old
    }

    fn attach_admin(&mut self, conn: LiveConn) {
        self.admins.push(conn);
    }

    /// Remove a connection that went away. Returns the role it held, or
    /// `None` if it was inert or unknown (nothing to do either way).
    fn detach(&mut self, conn: ConnId) -> Option<Role> {
        if self.inert.contains(&conn) {
            return None;
        }
        for slot in TeamSlot::BOTH {
            if self.captains[slot.index()]
                .as_ref()
                .is_some_and(|c| c.id == conn)
            {
                self.captains[slot.index()] = None;
                return Some(Role::Captain(slot));
            }
        }
        if let Some(pos) = self.admins.iter().position(|c| c.id == conn) {
            self.admins.remove(pos);
            return Some(Role::Admin);
        }
        None
    }

    fn is_inert(&self, conn: ConnId) -> bool {
        self.inert.contains(&conn)
    }

    fn role_of(&self, conn: ConnId) -> Option<Role> {
        for slot in TeamSlot::BOTH {
            if self.captains[slot.index()]
                .as_ref()
                .is_some_and(|c| c.id == conn)
            {
                return Some(Role::Captain(slot));
            }
        }
        if self.admins.iter().any(|c| c.id == conn) {
            return Some(Role::Admin);
        }
        None
    }

    fn sink_of(&self, conn: ConnId) -> Option<&FrameSender> {
        for slot in TeamSlot::BOTH {
            if let Some(c) = &self.captains[slot.index()] {
                if c.id == conn {
                    return Some(&c.sink);
                }
            }
        }
        self.admins.iter().find(|c| c.id == conn).map(|c| &c.sink)
    }

    fn captain_connected(&self, slot: TeamSlot) -> bool {
        self.captains[slot.index()].is_some()
    }

    /// Push a frame to every live connection. Uses `try_send`: frames are
    /// full snapshots, so a lagging client that drops one self-heals on the
    /// next.
    fn broadcast(&self, frame: &ServerFrame) {
        for conn in self
            .captains
            .iter()
            .flatten()
            .chain(self.admins.iter())
        {
            if conn.sink.try_send(frame.clone()).is_err() {
                debug!("dropping frame for lagging/closed connection {}", conn.id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session actor
// ---------------------------------------------------------------------------

pub struct SessionActor {
    draft_id: String,
    session: DraftSession,
    registry: ConnectionRegistry,
    catalog: Arc<HeroCatalog>,
    history: Box<dyn EventSink>,
    rng: StdRng,
    rx: mpsc::Receiver<SessionMsg>,
}

impl SessionActor {
    /// Spawn a session actor with production defaults (entropy-seeded RNG,
    /// tracing-backed history sink).
    pub fn spawn(
        draft_id: String,
        teams: [TeamIdentity; 2],
        policy: TimerPolicy,
        catalog: Arc<HeroCatalog>,
    ) -> SessionHandle {
        Self::spawn_with(
            draft_id,
            teams,
            policy,
            catalog,
            Box::new(TracingSink),
            StdRng::from_entropy(),
        )
    }

    /// Spawn with explicit history sink and RNG, for deterministic tests.
    pub fn spawn_with(
        draft_id: String,
        teams: [TeamIdentity; 2],
        policy: TimerPolicy,
        catalog: Arc<HeroCatalog>,
        history: Box<dyn EventSink>,
        rng: StdRng,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(64);
        let actor = SessionActor {
            draft_id: draft_id.clone(),
            session: DraftSession::new(teams, policy),
            registry: ConnectionRegistry::default(),
            catalog,
            history,
            rng,
            rx,
        };
        tokio::spawn(actor.run());
        SessionHandle::new(draft_id, tx)
    }

    async fn run(mut self) {
        info!("session actor started for draft {}", self.draft_id);
        loop {
            let wakeup = self.session.next_wakeup();
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle_msg(msg),
                    None => break,
                },
                _ = sleep_until_opt(wakeup), if wakeup.is_some() => {
                    self.handle_timer(Instant::now());
                }
            }
        }
        debug!("session actor for draft {} stopped", self.draft_id);
    }

    fn handle_msg(&mut self, msg: SessionMsg) {
        let now = Instant::now();
        match msg {
            SessionMsg::Attach { conn, role, sink } => self.handle_attach(conn, role, sink, now),
            SessionMsg::Detach { conn } => self.handle_detach(conn, now),
            SessionMsg::Command { conn, cmd } => self.handle_command(conn, cmd, now),
            SessionMsg::Invalid { conn, message } => {
                self.send_to(conn, ServerFrame::error(ErrorCode::BadMessage, message));
            }
        }
    }

    fn handle_attach(&mut self, conn: ConnId, role: Role, sink: FrameSender, now: Instant) {
        match role {
            Role::Captain(slot) => {
                let live = LiveConn {
                    id: conn,
                    sink: sink.clone(),
                };
                if let Some(old) = self.registry.attach_captain(slot, live) {
                    info!(
                        "draft {}: connection {} supersedes {} for captain of team {}",
                        self.draft_id, conn, old.id, slot
                    );
                    let _ = old.sink.try_send(ServerFrame::SessionReplaced {
                        reason: REPLACED_REASON.into(),
                    });
                }
                // Replay the authoritative snapshot before anything else.
                let snapshot = ServerFrame::StateSnapshot(self.build_snapshot(now));
                let _ = sink.try_send(snapshot);

                if self.session.on_reconnect(slot, now) == Outcome::Applied {
                    let name = self.session.team(slot).name.clone();
                    self.record(format!("{name}'s captain reconnected, draft resuming"));
                    self.announce_resume(now);
                }
            }
            Role::Admin => {
                let snapshot = ServerFrame::StateSnapshot(self.build_snapshot(now));
                let _ = sink.try_send(snapshot);
                self.registry.attach_admin(LiveConn { id: conn, sink });
            }
        }
    }

    fn handle_detach(&mut self, conn: ConnId, now: Instant) {
        match self.registry.detach(conn) {
            Some(Role::Captain(slot)) => {
                if self.session.on_disconnect(slot, now) == Outcome::Applied {
                    let name = self.session.team(slot).name.clone();
                    self.record(format!("{name}'s captain disconnected, draft paused"));
                    self.broadcast_snapshot(now);
                }
            }
            Some(Role::Admin) | None => {}
        }
    }

    fn handle_command(&mut self, conn: ConnId, cmd: ClientCommand, now: Instant) {
        if self.registry.is_inert(conn) {
            // Superseded connections are no longer serviced.
            debug!(
                "draft {}: dropping command from superseded connection {}",
                self.draft_id, conn
            );
            return;
        }
        let Some(role) = self.registry.role_of(conn) else {
            debug!(
                "draft {}: dropping command from unknown connection {}",
                self.draft_id, conn
            );
            return;
        };

        match cmd {
            ClientCommand::Hello { .. } => {
                self.send_to(
                    conn,
                    ServerFrame::error(ErrorCode::BadMessage, "connection already authenticated"),
                );
            }
            ClientCommand::Ready => self.captain_command(conn, role, now, |actor, slot, now| {
                match actor.session.ready(slot) {
                    Ok(Outcome::Applied) => {
                        let name = actor.session.team(slot).name.clone();
                        actor.record(format!("{name} is ready"));
                        if actor.session.phase() == Phase::Rolling {
                            actor.record("Both teams ready, rolling for choice".to_string());
                        }
                        actor.broadcast_snapshot(now);
                    }
                    Ok(Outcome::NoOp) => {}
                    Err(err) => actor.reject(conn, &err),
                }
            }),
            ClientCommand::FlipCoin => self.captain_command(conn, role, now, |actor, _slot, now| {
                match actor.session.flip_coin(&mut actor.rng) {
                    Ok(winner) => {
                        let name = actor.session.team(winner).name.clone();
                        actor.record(format!("Coin flip won by {name}"));
                        actor.broadcast_snapshot(now);
                    }
                    Err(err) => actor.reject(conn, &err),
                }
            }),
            ClientCommand::SubmitChoice { option } => {
                self.captain_command(conn, role, now, |actor, slot, now| {
                    let choice = option.into();
                    match actor.session.submit_choice(slot, choice, now) {
                        Ok(_) => {
                            let name = actor.session.team(slot).name.clone();
                            actor.record(format!("{name} chose {choice}"));
                            if actor.session.phase() == Phase::Drafting {
                                actor.record("Choices locked, drafting begins".to_string());
                            }
                            actor.broadcast_snapshot(now);
                        }
                        Err(err) => actor.reject(conn, &err),
                    }
                })
            }
            ClientCommand::PickOrBan { hero_id } => {
                self.captain_command(conn, role, now, |actor, slot, now| {
                    match actor
                        .session
                        .resolve_round(slot, HeroId(hero_id), &actor.catalog, now)
                    {
                        Ok(done) => {
                            actor.record_completion(&done);
                            actor.broadcast_snapshot(now);
                        }
                        Err(err) => actor.reject(conn, &err),
                    }
                })
            }
            ClientCommand::Pause => self.captain_command(conn, role, now, |actor, slot, now| {
                match actor.session.pause(now) {
                    Ok(Outcome::Applied) => {
                        let name = actor.session.team(slot).name.clone();
                        actor.record(format!("Draft paused by {name}"));
                        actor.broadcast_snapshot(now);
                    }
                    Ok(Outcome::NoOp) => {}
                    Err(err) => actor.reject(conn, &err),
                }
            }),
            ClientCommand::Resume => self.captain_command(conn, role, now, |actor, slot, now| {
                match actor.session.resume(now) {
                    Ok(_) => {
                        let name = actor.session.team(slot).name.clone();
                        actor.record(format!("Draft resumed by {name}"));
                        actor.announce_resume(now);
                    }
                    Err(err) => actor.reject(conn, &err),
                }
            }),
            ClientCommand::Reset => self.admin_command(conn, role, |actor| {
                actor.session.reset();
                actor.record("Session reset to waiting".to_string());
                actor.broadcast_snapshot(now);
            }),
            ClientCommand::ForceTimeout => self.admin_command(conn, role, |actor| {
                actor.apply_timeout(now);
            }),
            ClientCommand::Abandon => self.admin_command(conn, role, |actor| {
                actor.session.abandon(now);
                actor.record("Session abandoned by administrator".to_string());
                actor.broadcast_snapshot(now);
            }),
        }
    }

    /// Run a captain-scoped command body, rejecting admin connections.
    fn captain_command(
        &mut self,
        conn: ConnId,
        role: Role,
        now: Instant,
        body: impl FnOnce(&mut Self, TeamSlot, Instant),
    ) {
        match role {
            Role::Captain(slot) => body(self, slot, now),
            Role::Admin => self.send_to(
                conn,
                ServerFrame::error(
                    ErrorCode::Unauthorized,
                    "admin connections cannot act for a team",
                ),
            ),
        }
    }

    /// Run an admin-scoped command body, rejecting captain connections.
    fn admin_command(&mut self, conn: ConnId, role: Role, body: impl FnOnce(&mut Self)) {
        match role {
            Role::Admin => body(self),
            Role::Captain(_) => self.send_to(
                conn,
                ServerFrame::error(ErrorCode::Unauthorized, "administrative command"),
            ),
        }
    }

    fn handle_timer(&mut self, now: Instant) {
        match self.session.handle_wakeup(now) {
            Some(Wakeup::ClockStarted) => {
                self.broadcast_snapshot(now);
            }
            Some(Wakeup::Expired) => {
                self.apply_timeout(now);
            }
            None => {}
        }
    }

    /// Shared expiry path for timer wakeups and the administrative hook.
    fn apply_timeout(&mut self, now: Instant) {
        match self.session.force_timeout(&self.catalog, &mut self.rng, now) {
            Ok(Some(done)) => {
                self.record_completion(&done);
                self.broadcast_snapshot(now);
            }
            Ok(None) => {}
            Err(err) => {
                warn!("draft {}: {err}, session abandoned", self.draft_id);
                self.record(format!("Session abandoned: {err}"));
                self.broadcast_snapshot(now);
            }
        }
    }

    fn record_completion(&mut self, done: &CompletedRound) {
        let team = self.session.team(done.team).name.clone();
        let hero = self.catalog.name_of(done.hero);
        let verb = match done.action {
            ActionType::Ban => "banned",
            ActionType::Pick => "picked",
        };
        let suffix = match done.source {
            ResolutionSource::Captain => "",
            ResolutionSource::Timeout => " (automatic, time expired)",
        };
        self.record(format!(
            "Round {}: {team} {verb} {hero}{suffix}",
            done.round
        ));
        if done.draft_complete {
            self.record("Draft completed".to_string());
        }
    }

    fn record(&mut self, line: String) {
        self.history.record(HistoryEntry::now(line));
    }

    fn reject(&mut self, conn: ConnId, err: &crate::draft::state::CommandError) {
        self.send_to(conn, ServerFrame::from_rejection(err));
    }

    fn send_to(&self, conn: ConnId, frame: ServerFrame) {
        if let Some(sink) = self.registry.sink_of(conn) {
            let _ = sink.try_send(frame);
        }
    }

    /// Broadcast the countdown notice and a fresh snapshot after a resume
    /// was accepted (by command or by reconnect).
    fn announce_resume(&mut self, now: Instant) {
        let seconds = self.session.timer().policy().resume_countdown.as_secs();
        self.registry
            .broadcast(&ServerFrame::ResumeCountdown { seconds });
        self.broadcast_snapshot(now);
    }

    fn broadcast_snapshot(&mut self, now: Instant) {
        let frame = ServerFrame::StateSnapshot(self.build_snapshot(now));
        self.registry.broadcast(&frame);
    }

    fn build_snapshot(&self, now: Instant) -> SessionSnapshot {
        let session = &self.session;
        let teams = TeamSlot::BOTH
            .into_iter()
            .map(|slot| {
                let team = session.team(slot);
                TeamSnapshot {
                    slot,
                    name: team.name.clone(),
                    ready: team.ready,
                    side: team.side,
                    is_first_pick: team.pick_order.map(|o| o == PickOrder::First),
                    reserve_remaining_ms: session
                        .timer()
                        .reserve_remaining(slot, now)
                        .as_millis() as u64,
                    captain_connected: self.registry.captain_connected(slot),
                    picks: team.picks.iter().map(|h| h.0).collect(),
                }
            })
            .collect();
        let rounds = session
            .rounds()
            .iter()
            .map(|round| RoundSnapshot {
                number: round.number,
                action: round.action,
                team: sequence::actor_for(round.number)
                    .ok()
                    .and_then(|(order, _)| session.team_for_order(order)),
                state: round.state,
                hero_id: round.hero.map(|h| h.0),
            })
            .collect();
        SessionSnapshot {
            phase: session.phase(),
            current_round: session.current_round(),
            roll_winner: session.roll_winner(),
            grace_remaining_ms: session.timer().grace_remaining(now).as_millis() as u64,
            resume_countdown_ms: session
                .clock_start_at()
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            teams,
            rounds,
        }
    }
}

/// Sleep until `deadline`, or forever when there is none. Paired with a
/// `select!` guard so the forever-branch is never polled.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

/// Owns the live session actors, one per draft id, and authenticates hello
/// tokens against the roster. Independent drafts run fully in parallel.
pub struct SessionManager {
    catalog: Arc<HeroCatalog>,
    roster: Arc<dyn RosterProvider>,
    policy: TimerPolicy,
    admin_token: String,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    next_conn_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        catalog: Arc<HeroCatalog>,
        roster: Arc<dyn RosterProvider>,
        policy: TimerPolicy,
        admin_token: String,
    ) -> Self {
        SessionManager {
            catalog,
            roster,
            policy,
            admin_token,
            sessions: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Authenticate a hello. Returns the session handle (spawning the actor
    /// on first contact) and the role the token grants, or `None` for an
    /// unknown draft or token.
    pub async fn authenticate(&self, draft_id: &str, token: &str) -> Option<(SessionHandle, Role)> {
        let roster = self.roster.roster_for(draft_id)?;
        let role = if token == self.admin_token {
            Role::Admin
        } else if token == roster.teams[0].captain {
            Role::Captain(TeamSlot::A)
        } else if token == roster.teams[1].captain {
            Role::Captain(TeamSlot::B)
        } else {
            return None;
        };

        let mut sessions = self.sessions.lock().await;
        let handle = sessions
            .entry(draft_id.to_string())
            .or_insert_with(|| {
                SessionActor::spawn(
                    draft_id.to_string(),
                    roster.teams,
                    self.policy,
                    self.catalog.clone(),
                )
            })
            .clone();
        Some((handle, role))
    }
}
