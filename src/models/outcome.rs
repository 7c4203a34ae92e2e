use serde::{Deserialize, Serialize};

use super::record::{Attribute, FeatureRecord};
use super::session::{SessionId, SessionState};
use super::ticket::Ticket;

/// Verdict of the sufficiency step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Sufficient {
        rationale: String,
        /// True when the clarification budget ran out with attributes still missing.
        forced: bool,
    },
    Insufficient {
        /// Attributes to ask about, in priority order.
        missing: Vec<Attribute>,
        rationale: String,
    },
}

impl DecisionOutcome {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient { .. })
    }

    pub fn rationale(&self) -> &str {
        match self {
            Self::Sufficient { rationale, .. } | Self::Insufficient { rationale, .. } => rationale,
        }
    }
}

/// Payload returned to the collaborator after each processed turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnResponse {
    pub session_id: SessionId,
    pub state: SessionState,
    pub waiting_for_input: bool,
    pub complete: bool,
    /// Clarifying questions, empty unless the session is waiting for input.
    pub questions: Vec<String>,
    /// Things the IDE could search the codebase for to help answer.
    pub search_hints: Vec<String>,
    /// Synthesized tickets, empty until the session completes.
    pub tickets: Vec<Ticket>,
    /// Markdown summary for humans.
    pub summary: String,
    pub record: FeatureRecord,
}

/// Result of expiring idle sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpireSessionsResponse {
    pub expired: Vec<SessionId>,
    /// Sessions left in the store afterwards.
    pub remaining: usize,
}
