// Wire protocol: typed messages exchanged over the draft WebSocket.
//
// All frames are JSON text messages tagged by a `type` field. The client
// sends commands; the server answers with full state snapshots (never
// deltas), a one-shot replacement notice when a connection is superseded,
// and per-connection error frames for rejected commands.

use serde::{Deserialize, Serialize};

use crate::draft::sequence::{ActionType, PickOrder};
use crate::draft::state::{Choice, CommandError, Phase, RoundState, Side};
use crate::draft::TeamSlot;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// The flat choice vocabulary the client speaks. Internally the engine
/// works on two orthogonal axes (order, side); the conversion below is the
/// only place the flat form appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceOption {
    FirstPick,
    SecondPick,
    Radiant,
    Dire,
}

impl From<ChoiceOption> for Choice {
    fn from(option: ChoiceOption) -> Choice {
        match option {
            ChoiceOption::FirstPick => Choice::Order(PickOrder::First),
            ChoiceOption::SecondPick => Choice::Order(PickOrder::Second),
            ChoiceOption::Radiant => Choice::Side(Side::Radiant),
            ChoiceOption::Dire => Choice::Side(Side::Dire),
        }
    }
}

/// Commands a connected client may send. `Hello` must be the first message
/// on a fresh socket; everything else is rejected until it arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Authenticate the connection: which draft, and whose token.
    Hello { draft_id: String, token: String },
    Ready,
    FlipCoin,
    SubmitChoice { option: ChoiceOption },
    PickOrBan { hero_id: u32 },
    Pause,
    Resume,
    /// Administrative: return the session to `waiting`. Admin token only.
    Reset,
    /// Administrative/test hook: trigger the expiry path immediately.
    ForceTimeout,
    /// Administrative: abort the session. Terminal.
    Abandon,
}

/// Parse a raw text frame into a command.
pub fn parse_command(text: &str) -> Result<ClientCommand, serde_json::Error> {
    serde_json::from_str(text)
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Machine-readable rejection codes, mirrored from the engine's error
/// taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    IllegalPhase,
    WrongActor,
    UnknownHero,
    HeroTaken,
    ChoiceUnavailable,
    InvalidRound,
    StaleConnection,
    Unauthorized,
    BadMessage,
    Internal,
}

impl From<&CommandError> for ErrorCode {
    fn from(err: &CommandError) -> ErrorCode {
        match err {
            CommandError::IllegalPhase { .. } => ErrorCode::IllegalPhase,
            CommandError::WrongActor => ErrorCode::WrongActor,
            CommandError::UnknownHero(_) => ErrorCode::UnknownHero,
            CommandError::HeroTaken(_) => ErrorCode::HeroTaken,
            CommandError::ChoiceUnavailable => ErrorCode::ChoiceUnavailable,
            CommandError::InvalidRound(_) => ErrorCode::InvalidRound,
            CommandError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Per-team view inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub slot: TeamSlot,
    pub name: String,
    pub ready: bool,
    pub side: Option<Side>,
    pub is_first_pick: Option<bool>,
    pub reserve_remaining_ms: u64,
    pub captain_connected: bool,
    pub picks: Vec<u32>,
}

/// Per-round view inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub number: u8,
    pub action: ActionType,
    /// Assigned team; `None` until the choosing phase fixes pick order.
    pub team: Option<TeamSlot>,
    pub state: RoundState,
    pub hero_id: Option<u32>,
}

/// The full authoritative session view, pushed after every applied mutation
/// and replayed to every (re)connecting client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub current_round: Option<u8>,
    pub roll_winner: Option<TeamSlot>,
    pub grace_remaining_ms: u64,
    /// Milliseconds until the clock restarts after a resume; `None` when no
    /// countdown is running.
    pub resume_countdown_ms: Option<u64>,
    pub teams: Vec<TeamSnapshot>,
    pub rounds: Vec<RoundSnapshot>,
}

/// Frames the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    StateSnapshot(SessionSnapshot),
    /// One-shot notice to a superseded connection. The reason is
    /// human-readable and shown verbatim; the client must not auto-reconnect
    /// after receiving it.
    SessionReplaced { reason: String },
    /// Announces the fixed delay between an accepted resume and the clock
    /// restarting.
    ResumeCountdown { seconds: u64 },
    /// A rejected command; sent only to the offending connection.
    Error { code: ErrorCode, message: String },
}

impl ServerFrame {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> ServerFrame {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }

    pub fn from_rejection(err: &CommandError) -> ServerFrame {
        ServerFrame::error(ErrorCode::from(err), err.to_string())
    }

    /// Serialize to a JSON text payload. Must not panic in the write path;
    /// an encode failure degrades to a literal error frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","code":"internal","message":"encode: {e}"}}"#)
        })
    }
}
