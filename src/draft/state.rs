// Draft state machine: session phase, round progress, hero availability,
// and choice resolution.
//
// All mutation happens through the command methods below, which the session
// actor calls from its serialized loop. The machine owns the timer engine;
// hero availability is always derived from completed rounds rather than
// stored, so it cannot desync.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::time::Instant;

use crate::catalog::{HeroCatalog, HeroId};

use super::sequence::{self, ActionType, InvalidRound, PickOrder, TOTAL_ROUNDS};
use super::timer::{TimerEngine, TimerPolicy};
use super::TeamSlot;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Rolling,
    Choosing,
    Drafting,
    Paused,
    Completed,
    Abandoned,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Rolling => "rolling",
            Phase::Choosing => "choosing",
            Phase::Drafting => "drafting",
            Phase::Paused => "paused",
            Phase::Completed => "completed",
            Phase::Abandoned => "abandoned",
        };
        write!(f, "{name}")
    }
}

/// Map side for a team, fixed once the choosing phase resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Radiant,
    Dire,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Radiant => Side::Dire,
            Side::Dire => Side::Radiant,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Radiant => write!(f, "Radiant"),
            Side::Dire => write!(f, "Dire"),
        }
    }
}

/// A choosing-phase selection. The two axes are orthogonal: choosing from
/// one axis implicitly hands the complementary value to the other team and
/// leaves the remaining axis to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Order(PickOrder),
    Side(Side),
}

impl Choice {
    fn same_axis(self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Order(_), Choice::Order(_)) | (Choice::Side(_), Choice::Side(_))
        )
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Order(PickOrder::First) => write!(f, "first pick"),
            Choice::Order(PickOrder::Second) => write!(f, "second pick"),
            Choice::Side(side) => write!(f, "{side}"),
        }
    }
}

/// Lifecycle of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Pending,
    Active,
    Completed,
}

/// One of the 24 rounds, created pending at session initialization.
#[derive(Debug, Clone)]
pub struct DraftRound {
    pub number: u8,
    pub action: ActionType,
    pub state: RoundState,
    pub hero: Option<HeroId>,
}

/// Identity handed in by the roster collaborator at session creation.
#[derive(Debug, Clone)]
pub struct TeamIdentity {
    pub name: String,
    pub captain: String,
}

/// Per-team draft state.
#[derive(Debug, Clone)]
pub struct DraftTeam {
    pub name: String,
    /// Captain identity; exactly one principal may act for this team.
    pub captain: String,
    pub ready: bool,
    pub side: Option<Side>,
    pub pick_order: Option<PickOrder>,
    /// Heroes assigned to this team's roster by completed pick rounds.
    pub picks: Vec<HeroId>,
}

impl DraftTeam {
    fn new(identity: TeamIdentity) -> Self {
        DraftTeam {
            name: identity.name,
            captain: identity.captain,
            ready: false,
            side: None,
            pick_order: None,
            picks: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.ready = false;
        self.side = None;
        self.pick_order = None;
        self.picks.clear();
    }
}

/// How a round got resolved, for the event history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Captain,
    Timeout,
}

/// Whether an accepted command changed observable state. Only `Applied`
/// outcomes produce a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    NoOp,
}

/// Why the session is paused. A disconnect pause lifts automatically when
/// that captain reconnects; a manual pause needs an explicit resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseCause {
    Manual,
    Disconnect(TeamSlot),
}

/// Result of resolving a round (by command or timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedRound {
    pub round: u8,
    pub action: ActionType,
    pub team: TeamSlot,
    pub hero: HeroId,
    pub source: ResolutionSource,
    pub draft_complete: bool,
}

/// What a timer wakeup turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// The post-resume countdown elapsed; the clock is running again.
    ClockStarted,
    /// The acting team ran out of grace and reserve.
    Expired,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{command} is not valid while the session is {phase}")]
    IllegalPhase {
        command: &'static str,
        phase: Phase,
    },

    #[error("not this team's turn to act")]
    WrongActor,

    #[error("hero {0} is not in the catalog")]
    UnknownHero(HeroId),

    #[error("hero {0} was already banned or picked")]
    HeroTaken(HeroId),

    #[error("that choice is no longer available")]
    ChoiceUnavailable,

    #[error(transparent)]
    InvalidRound(#[from] InvalidRound),

    #[error("internal fault: {0}")]
    Internal(&'static str),
}

// ---------------------------------------------------------------------------
// DraftSession
// ---------------------------------------------------------------------------

/// The authoritative state of one Captain's-Mode draft.
#[derive(Debug)]
pub struct DraftSession {
    phase: Phase,
    teams: [DraftTeam; 2],
    rounds: Vec<DraftRound>,
    /// 1-based; meaningful only in `Drafting`/`Paused`.
    current_round: u8,
    roll_winner: Option<TeamSlot>,
    winner_choice: Option<Choice>,
    pause_cause: Option<PauseCause>,
    /// Set while the post-resume countdown runs; the clock restarts at this
    /// instant.
    clock_start_at: Option<Instant>,
    timer: TimerEngine,
}

fn fresh_rounds() -> Vec<DraftRound> {
    (1..=TOTAL_ROUNDS)
        .map(|number| DraftRound {
            number,
            // actor_for is infallible for 1..=TOTAL_ROUNDS
            action: sequence::actor_for(number).expect("round in range").1,
            state: RoundState::Pending,
            hero: None,
        })
        .collect()
}

impl DraftSession {
    pub fn new(teams: [TeamIdentity; 2], policy: TimerPolicy) -> Self {
        DraftSession {
            phase: Phase::Waiting,
            teams: teams.map(DraftTeam::new),
            rounds: fresh_rounds(),
            current_round: 1,
            roll_winner: None,
            winner_choice: None,
            pause_cause: None,
            clock_start_at: None,
            timer: TimerEngine::new(policy),
        }
    }

    // -- accessors -----------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn team(&self, slot: TeamSlot) -> &DraftTeam {
        &self.teams[slot.index()]
    }

    pub fn rounds(&self) -> &[DraftRound] {
        &self.rounds
    }

    pub fn roll_winner(&self) -> Option<TeamSlot> {
        self.roll_winner
    }

    /// Current round number, only while drafting or paused.
    pub fn current_round(&self) -> Option<u8> {
        match self.phase {
            Phase::Drafting | Phase::Paused => Some(self.current_round),
            _ => None,
        }
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    /// Remaining post-resume countdown end instant, if one is running.
    pub fn clock_start_at(&self) -> Option<Instant> {
        self.clock_start_at
    }

    /// The team occupying a sequence-table row. Only available once the
    /// choosing phase fixed pick order.
    pub fn team_for_order(&self, order: PickOrder) -> Option<TeamSlot> {
        TeamSlot::BOTH
            .into_iter()
            .find(|slot| self.teams[slot.index()].pick_order == Some(order))
    }

    /// Who acts in the current round, and what they do. `None` outside
    /// drafting/paused.
    pub fn current_actor(&self) -> Option<(TeamSlot, ActionType)> {
        match self.phase {
            Phase::Drafting | Phase::Paused => {
                let (order, action) = sequence::actor_for(self.current_round).ok()?;
                Some((self.team_for_order(order)?, action))
            }
            _ => None,
        }
    }

    /// Hero ids consumed by completed rounds. Derived, never stored.
    pub fn used_heroes(&self) -> impl Iterator<Item = HeroId> + '_ {
        self.rounds.iter().filter_map(|r| r.hero)
    }

    fn hero_is_used(&self, hero: HeroId) -> bool {
        self.used_heroes().any(|used| used == hero)
    }

    /// Catalog heroes not yet consumed by any completed round.
    pub fn available_heroes(&self, catalog: &HeroCatalog) -> Vec<HeroId> {
        catalog.ids().filter(|id| !self.hero_is_used(*id)).collect()
    }

    // -- commands ------------------------------------------------------------

    /// Mark a captain's team ready. Idempotent per captain; moves the
    /// session to `Rolling` once both teams are ready.
    pub fn ready(&mut self, slot: TeamSlot) -> Result<Outcome, CommandError> {
        if self.phase != Phase::Waiting {
            return Err(CommandError::IllegalPhase {
                command: "ready",
                phase: self.phase,
            });
        }
        if self.teams[slot.index()].ready {
            return Ok(Outcome::NoOp);
        }
        self.teams[slot.index()].ready = true;
        if self.teams.iter().all(|t| t.ready) {
            self.phase = Phase::Rolling;
        }
        Ok(Outcome::Applied)
    }

    /// Flip the coin. Either captain may invoke this; the winner is chosen
    /// uniformly at random and the session moves to `Choosing`.
    pub fn flip_coin(&mut self, rng: &mut impl Rng) -> Result<TeamSlot, CommandError> {
        if self.phase != Phase::Rolling {
            return Err(CommandError::IllegalPhase {
                command: "flip_coin",
                phase: self.phase,
            });
        }
        let winner = if rng.gen_bool(0.5) {
            TeamSlot::A
        } else {
            TeamSlot::B
        };
        self.roll_winner = Some(winner);
        self.phase = Phase::Choosing;
        Ok(winner)
    }

    /// Submit a choosing-phase selection: the roll winner picks from either
    /// axis first, then the loser picks from whichever axis remains. Fixes
    /// sides and pick order, then starts round 1.
    pub fn submit_choice(
        &mut self,
        slot: TeamSlot,
        choice: Choice,
        now: Instant,
    ) -> Result<Outcome, CommandError> {
        if self.phase != Phase::Choosing {
            return Err(CommandError::IllegalPhase {
                command: "submit_choice",
                phase: self.phase,
            });
        }
        let winner = self
            .roll_winner
            .ok_or(CommandError::Internal("choosing phase without roll winner"))?;

        match self.winner_choice {
            None => {
                if slot != winner {
                    return Err(CommandError::WrongActor);
                }
                self.apply_choice(slot, choice);
                self.winner_choice = Some(choice);
            }
            Some(first) => {
                if slot != winner.other() {
                    return Err(CommandError::WrongActor);
                }
                if first.same_axis(choice) {
                    return Err(CommandError::ChoiceUnavailable);
                }
                self.apply_choice(slot, choice);
                self.begin_drafting(now)?;
            }
        }
        Ok(Outcome::Applied)
    }

    /// Set both teams' values on one axis: the chooser gets what they asked
    /// for, the other team the complement.
    fn apply_choice(&mut self, slot: TeamSlot, choice: Choice) {
        let other = slot.other();
        match choice {
            Choice::Order(order) => {
                self.teams[slot.index()].pick_order = Some(order);
                self.teams[other.index()].pick_order = Some(order.other());
            }
            Choice::Side(side) => {
                self.teams[slot.index()].side = Some(side);
                self.teams[other.index()].side = Some(side.other());
            }
        }
    }

    fn begin_drafting(&mut self, now: Instant) -> Result<(), CommandError> {
        self.phase = Phase::Drafting;
        self.current_round = 1;
        self.rounds[0].state = RoundState::Active;
        let (team, _) = self
            .current_actor()
            .ok_or(CommandError::Internal("drafting without assigned orders"))?;
        self.timer.start_round(team, now);
        Ok(())
    }

    /// Resolve the current round with an explicit captain ban/pick.
    pub fn resolve_round(
        &mut self,
        slot: TeamSlot,
        hero: HeroId,
        catalog: &HeroCatalog,
        now: Instant,
    ) -> Result<CompletedRound, CommandError> {
        if self.phase != Phase::Drafting {
            return Err(CommandError::IllegalPhase {
                command: "pick_or_ban",
                phase: self.phase,
            });
        }
        let (actor, _) = self
            .current_actor()
            .ok_or(CommandError::Internal("drafting without current actor"))?;
        if slot != actor {
            return Err(CommandError::WrongActor);
        }
        if !catalog.is_valid(hero) {
            return Err(CommandError::UnknownHero(hero));
        }
        if self.hero_is_used(hero) {
            return Err(CommandError::HeroTaken(hero));
        }
        self.complete_current_round(hero, ResolutionSource::Captain, now)
    }

    /// Force-resolve the current round with a uniformly random available
    /// hero. Invoked by the timer expiry path and by the administrative
    /// hook; redundant calls (round already resolved, session not drafting)
    /// are no-ops.
    pub fn force_timeout(
        &mut self,
        catalog: &HeroCatalog,
        rng: &mut impl Rng,
        now: Instant,
    ) -> Result<Option<CompletedRound>, CommandError> {
        if self.phase != Phase::Drafting {
            return Ok(None);
        }
        let available = self.available_heroes(catalog);
        if available.is_empty() {
            // Catalog smaller than the draft; nothing sane left to do.
            self.abandon(now);
            return Err(CommandError::Internal("hero pool exhausted mid-draft"));
        }
        let hero = available[rng.gen_range(0..available.len())];
        self.complete_current_round(hero, ResolutionSource::Timeout, now)
            .map(Some)
    }

    /// Shared completion path for explicit and timeout resolutions: marks
    /// the round completed, assigns picked heroes to the roster, advances
    /// (or completes the draft), and resets clocks for the next round.
    fn complete_current_round(
        &mut self,
        hero: HeroId,
        source: ResolutionSource,
        now: Instant,
    ) -> Result<CompletedRound, CommandError> {
        let (team, action) = self
            .current_actor()
            .ok_or(CommandError::Internal("completing round without actor"))?;
        let index = (self.current_round - 1) as usize;

        let round = &mut self.rounds[index];
        round.state = RoundState::Completed;
        round.hero = Some(hero);
        if action == ActionType::Pick {
            self.teams[team.index()].picks.push(hero);
        }

        let completed = CompletedRound {
            round: self.current_round,
            action,
            team,
            hero,
            source,
            draft_complete: self.current_round == TOTAL_ROUNDS,
        };

        self.clock_start_at = None;
        if completed.draft_complete {
            self.timer.freeze(now);
            self.phase = Phase::Completed;
        } else {
            self.timer.freeze(now);
            self.current_round += 1;
            self.rounds[index + 1].state = RoundState::Active;
            let (next_team, _) = self
                .current_actor()
                .ok_or(CommandError::Internal("advanced past assigned rounds"))?;
            self.timer.start_round(next_team, now);
        }
        Ok(completed)
    }

    /// Pause the draft. Freezes both clocks session-wide regardless of
    /// whose turn it is; pausing an already-paused session is a no-op.
    pub fn pause(&mut self, now: Instant) -> Result<Outcome, CommandError> {
        self.pause_with_cause(PauseCause::Manual, now)
    }

    fn pause_with_cause(
        &mut self,
        cause: PauseCause,
        now: Instant,
    ) -> Result<Outcome, CommandError> {
        match self.phase {
            Phase::Drafting => {
                self.timer.freeze(now);
                self.clock_start_at = None;
                self.pause_cause = Some(cause);
                self.phase = Phase::Paused;
                Ok(Outcome::Applied)
            }
            Phase::Paused => {
                // An explicit pause on top of a disconnect pause sticks: the
                // session then stays paused across the reconnect.
                if cause == PauseCause::Manual {
                    self.pause_cause = Some(PauseCause::Manual);
                }
                Ok(Outcome::NoOp)
            }
            phase => Err(CommandError::IllegalPhase {
                command: "pause",
                phase,
            }),
        }
    }

    /// Resume a paused draft. The phase flips immediately but the clock only
    /// restarts after the configured countdown, giving both clients time to
    /// re-synchronize.
    pub fn resume(&mut self, now: Instant) -> Result<Outcome, CommandError> {
        if self.phase != Phase::Paused {
            return Err(CommandError::IllegalPhase {
                command: "resume",
                phase: self.phase,
            });
        }
        self.phase = Phase::Drafting;
        self.pause_cause = None;
        self.clock_start_at = Some(now + self.timer.policy().resume_countdown);
        Ok(Outcome::Applied)
    }

    /// The next instant the session actor should wake at: the end of a
    /// resume countdown, or the running clock's expiry deadline.
    pub fn next_wakeup(&self) -> Option<Instant> {
        if self.phase != Phase::Drafting {
            return None;
        }
        self.clock_start_at.or_else(|| self.timer.deadline())
    }

    /// Handle a timer wakeup from the actor loop. Returns what the wakeup
    /// turned out to be; a stale wakeup (round already resolved, session
    /// paused meanwhile) returns `None`.
    pub fn handle_wakeup(&mut self, now: Instant) -> Option<Wakeup> {
        if self.phase != Phase::Drafting {
            return None;
        }
        if let Some(start_at) = self.clock_start_at {
            if now >= start_at {
                self.clock_start_at = None;
                let (team, _) = self.current_actor()?;
                self.timer.unfreeze(team, now);
                return Some(Wakeup::ClockStarted);
            }
            return None;
        }
        if self.timer.is_expired(now) {
            return Some(Wakeup::Expired);
        }
        None
    }

    /// A captain's last live connection dropped. Pauses the session if that
    /// captain's team is currently on the clock.
    pub fn on_disconnect(&mut self, slot: TeamSlot, now: Instant) -> Outcome {
        if self.phase == Phase::Drafting {
            if let Some((actor, _)) = self.current_actor() {
                if actor == slot {
                    // Infallible: phase is Drafting.
                    return self
                        .pause_with_cause(PauseCause::Disconnect(slot), now)
                        .unwrap_or(Outcome::NoOp);
                }
            }
        }
        Outcome::NoOp
    }

    /// A captain reconnected. Lifts a pause that was caused by that same
    /// captain's disconnect; manual pauses stay until an explicit resume.
    pub fn on_reconnect(&mut self, slot: TeamSlot, now: Instant) -> Outcome {
        if self.phase == Phase::Paused && self.pause_cause == Some(PauseCause::Disconnect(slot)) {
            return self.resume(now).unwrap_or(Outcome::NoOp);
        }
        Outcome::NoOp
    }

    /// Administrative reset: back to `Waiting` with all rounds pending and
    /// clocks at initial values.
    pub fn reset(&mut self) {
        self.phase = Phase::Waiting;
        self.rounds = fresh_rounds();
        self.current_round = 1;
        self.roll_winner = None;
        self.winner_choice = None;
        self.pause_cause = None;
        self.clock_start_at = None;
        self.timer.reset();
        for team in &mut self.teams {
            team.reset();
        }
    }

    /// Administrative abort, also the landing state for internal faults.
    /// Terminal: only `reset` leaves it.
    pub fn abandon(&mut self, now: Instant) {
        self.timer.freeze(now);
        self.clock_start_at = None;
        self.pause_cause = None;
        self.phase = Phase::Abandoned;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
