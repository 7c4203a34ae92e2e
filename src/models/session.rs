use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::{ConversationTurn, Role};
use super::record::FeatureRecord;
use super::ticket::{AuditEntry, Ticket};

/// Opaque session identifier, generated by the assistant on the first turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a session is in the conversation state machine.
///
/// - `New`: created, no turn finished yet
/// - `AwaitingClarification`: questions were asked, waiting for an answer
/// - `Complete`: tickets were synthesized; terminal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    New,
    AwaitingClarification,
    Complete,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::AwaitingClarification => "awaiting_clarification",
            Self::Complete => "complete",
        }
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "awaiting_clarification" => Ok(Self::AwaitingClarification),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown session state '{}'", other)),
        }
    }
}

/// One conversation turning a feature request into tickets.
///
/// `waiting_for_input` and `complete` are derived from a single
/// [`SessionState`], so they can never both be true. History is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    record: FeatureRecord,
    history: Vec<ConversationTurn>,
    state: SessionState,
    /// Opaque workspace/context hint supplied by the collaborator.
    workspace_hint: Option<String>,
    tickets: Vec<Ticket>,
    audit_log: Vec<AuditEntry>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, workspace_hint: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            record: FeatureRecord::new(),
            history: Vec::new(),
            state: SessionState::New,
            workspace_hint,
            tickets: Vec::new(),
            audit_log: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn record(&self) -> &FeatureRecord {
        &self.record
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn waiting_for_input(&self) -> bool {
        self.state == SessionState::AwaitingClarification
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    pub fn workspace_hint(&self) -> Option<&str> {
        self.workspace_hint.as_deref()
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Clarification rounds so far. Every assistant turn before completion
    /// is a round of questions.
    pub fn clarification_rounds(&self) -> usize {
        let rounds = self
            .history
            .iter()
            .filter(|t| t.role() == Role::Assistant)
            .count();
        if self.is_complete() {
            rounds.saturating_sub(1)
        } else {
            rounds
        }
    }

    pub(crate) fn append_turn(&mut self, role: Role, text: impl Into<String>) {
        let turn = ConversationTurn::new(role, text);
        self.last_activity = turn.timestamp();
        self.history.push(turn);
    }

    pub(crate) fn set_record(&mut self, record: FeatureRecord) {
        self.record = record;
    }

    pub(crate) fn set_workspace_hint(&mut self, hint: Option<String>) {
        if hint.is_some() {
            self.workspace_hint = hint;
        }
    }

    pub(crate) fn await_input(&mut self) {
        debug_assert!(!self.is_complete(), "complete sessions cannot ask questions");
        self.state = SessionState::AwaitingClarification;
    }

    pub(crate) fn complete(&mut self, tickets: Vec<Ticket>, audit: Vec<AuditEntry>) {
        self.state = SessionState::Complete;
        self.tickets = tickets;
        self.audit_log.extend(audit);
    }
}

/// Point-in-time view of a session returned by the session-info accessor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub state: SessionState,
    pub waiting_for_input: bool,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub workspace_hint: Option<String>,
    pub clarification_rounds: usize,
    pub record: FeatureRecord,
    pub history: Vec<ConversationTurn>,
    pub tickets: Vec<Ticket>,
    pub audit_log: Vec<AuditEntry>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            state: session.state,
            waiting_for_input: session.waiting_for_input(),
            complete: session.is_complete(),
            created_at: session.created_at,
            last_activity: session.last_activity,
            workspace_hint: session.workspace_hint.clone(),
            clarification_rounds: session.clarification_rounds(),
            record: session.record.clone(),
            history: session.history.clone(),
            tickets: session.tickets.clone(),
            audit_log: session.audit_log.clone(),
        }
    }
}

/// Compact listing entry for session listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub state: SessionState,
    pub turns: usize,
    pub record: FeatureRecord,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            state: session.state,
            turns: session.history.len(),
            record: session.record.clone(),
            created_at: session.created_at,
            last_activity: session.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_neither_waiting_nor_complete() {
        let session = Session::new(SessionId::generate(), None);
        assert_eq!(session.state(), SessionState::New);
        assert!(!session.waiting_for_input());
        assert!(!session.is_complete());
    }

    #[test]
    fn flags_are_never_both_true() {
        let mut session = Session::new(SessionId::generate(), None);
        session.await_input();
        assert!(session.waiting_for_input() && !session.is_complete());
        session.complete(vec![], vec![]);
        assert!(session.is_complete() && !session.waiting_for_input());
    }

    #[test]
    fn appending_turns_updates_last_activity() {
        let mut session = Session::new(SessionId::generate(), None);
        let before = session.last_activity();
        session.append_turn(Role::User, "hello");
        assert_eq!(session.history().len(), 1);
        assert!(session.last_activity() >= before);
    }

    #[test]
    fn clarification_rounds_ignore_the_final_summary() {
        let mut session = Session::new(SessionId::generate(), None);
        session.append_turn(Role::User, "add a button");
        session.append_turn(Role::Assistant, "which page?");
        session.await_input();
        assert_eq!(session.clarification_rounds(), 1);

        session.append_turn(Role::User, "dashboard, saves");
        session.append_turn(Role::Assistant, "tickets");
        session.complete(vec![], vec![]);
        assert_eq!(session.clarification_rounds(), 1);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
