// Timer engine: one shared per-round grace clock plus two team reserve
// clocks.
//
// Grace is a fresh buffer granted at the start of every round; it does not
// carry over between rounds. The acting team's reserve starts depleting only
// once grace reaches zero, and only while that team's clock is running.
// The engine never acts on expiry itself: it hands out an absolute deadline
// and lets the session actor turn expiry into a command on the serialized
// queue.

use std::time::Duration;

use tokio::time::Instant;

use super::TeamSlot;

/// Configurable timing constants for a draft session.
#[derive(Debug, Clone, Copy)]
pub struct TimerPolicy {
    /// Fresh per-round buffer consumed before reserve starts depleting.
    pub grace: Duration,
    /// Each team's total reserve for the whole draft.
    pub reserve: Duration,
    /// Delay between an accepted resume and the clock actually restarting.
    pub resume_countdown: Duration,
}

impl Default for TimerPolicy {
    fn default() -> Self {
        TimerPolicy {
            grace: Duration::from_secs(30),
            reserve: Duration::from_secs(130),
            resume_countdown: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveClock {
    team: TeamSlot,
    since: Instant,
}

/// The clocks for one draft session. All mutation goes through the owning
/// session's serialized command loop.
#[derive(Debug)]
pub struct TimerEngine {
    policy: TimerPolicy,
    grace_remaining: Duration,
    reserve_remaining: [Duration; 2],
    active: Option<ActiveClock>,
}

/// Split `elapsed` across a grace buffer and a reserve clock: grace drains
/// first, reserve absorbs the remainder, neither goes negative.
fn drain(grace: Duration, reserve: Duration, elapsed: Duration) -> (Duration, Duration) {
    let overflow = elapsed.saturating_sub(grace);
    (
        grace.saturating_sub(elapsed),
        reserve.saturating_sub(overflow),
    )
}

impl TimerEngine {
    pub fn new(policy: TimerPolicy) -> Self {
        TimerEngine {
            policy,
            grace_remaining: policy.grace,
            reserve_remaining: [policy.reserve; 2],
            active: None,
        }
    }

    pub fn policy(&self) -> &TimerPolicy {
        &self.policy
    }

    /// Begin timing a new round for `team`: grant a fresh grace buffer and
    /// start that team's clock.
    pub fn start_round(&mut self, team: TeamSlot, now: Instant) {
        self.grace_remaining = self.policy.grace;
        self.active = Some(ActiveClock { team, since: now });
    }

    /// Stop the running clock, settling elapsed time into the grace/reserve
    /// ledger. Idempotent: freezing a stopped engine is a no-op.
    pub fn freeze(&mut self, now: Instant) {
        self.settle(now);
        self.active = None;
    }

    /// Restart the clock for `team` without granting fresh grace. Used when
    /// a paused round resumes: remaining grace and reserve carry on from
    /// where they were frozen.
    pub fn unfreeze(&mut self, team: TeamSlot, now: Instant) {
        if self.active.is_none() {
            self.active = Some(ActiveClock { team, since: now });
        }
    }

    /// Book elapsed running time into the ledger and move the accounting
    /// anchor to `now`.
    fn settle(&mut self, now: Instant) {
        if let Some(active) = &mut self.active {
            let elapsed = now.saturating_duration_since(active.since);
            let reserve = self.reserve_remaining[active.team.index()];
            let (grace, reserve) = drain(self.grace_remaining, reserve, elapsed);
            self.grace_remaining = grace;
            self.reserve_remaining[active.team.index()] = reserve;
            active.since = now;
        }
    }

    /// The absolute instant at which the running team's total time (grace
    /// then reserve) reaches zero. `None` while frozen.
    pub fn deadline(&self) -> Option<Instant> {
        self.active.map(|active| {
            active.since + self.grace_remaining + self.reserve_remaining[active.team.index()]
        })
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| d <= now)
    }

    pub fn active_team(&self) -> Option<TeamSlot> {
        self.active.map(|a| a.team)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Grace left as of `now`, accounting for a running clock without
    /// mutating the ledger.
    pub fn grace_remaining(&self, now: Instant) -> Duration {
        match self.active {
            Some(active) => {
                let elapsed = now.saturating_duration_since(active.since);
                self.grace_remaining.saturating_sub(elapsed)
            }
            None => self.grace_remaining,
        }
    }

    /// Reserve left for `team` as of `now`. Only the running team's view
    /// moves; the idle team's reserve is untouched.
    pub fn reserve_remaining(&self, team: TeamSlot, now: Instant) -> Duration {
        let reserve = self.reserve_remaining[team.index()];
        match self.active {
            Some(active) if active.team == team => {
                let elapsed = now.saturating_duration_since(active.since);
                drain(self.grace_remaining, reserve, elapsed).1
            }
            _ => reserve,
        }
    }

    /// Back to initial values, stopped. Used by the administrative reset.
    pub fn reset(&mut self) {
        self.grace_remaining = self.policy.grace;
        self.reserve_remaining = [self.policy.reserve; 2];
        self.active = None;
    }
}
