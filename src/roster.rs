// Roster collaborator: which two teams (and captains) draft a given match.
//
// The engine does not own team management; it consumes a roster lookup
// provided by the surrounding application. In the standalone binary the
// lookup is backed by the configuration file.

use std::collections::HashMap;

use crate::draft::state::TeamIdentity;

/// The two teams of one draft, in slot order (A, B).
#[derive(Debug, Clone)]
pub struct DraftRoster {
    pub draft_id: String,
    pub teams: [TeamIdentity; 2],
}

/// Lookup for draft rosters, keyed by draft id.
pub trait RosterProvider: Send + Sync {
    fn roster_for(&self, draft_id: &str) -> Option<DraftRoster>;
}

/// Config-backed provider used by the standalone binary.
#[derive(Debug, Default)]
pub struct StaticRoster {
    drafts: HashMap<String, DraftRoster>,
}

impl StaticRoster {
    pub fn new(rosters: impl IntoIterator<Item = DraftRoster>) -> Self {
        StaticRoster {
            drafts: rosters
                .into_iter()
                .map(|r| (r.draft_id.clone(), r))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

impl RosterProvider for StaticRoster {
    fn roster_for(&self, draft_id: &str) -> Option<DraftRoster> {
        self.drafts.get(draft_id).cloned()
    }
}
