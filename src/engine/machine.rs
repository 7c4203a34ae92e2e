use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::{Gateway, Prompt, ResponseShape};
use crate::models::{
    DecisionOutcome, Role, Session, SessionId, SessionInfo, SessionState, SessionSummary,
    TurnResponse,
};
use crate::store::SessionStore;

use super::clarify::clarify;
use super::codebase::analyze_codebase;
use super::error::TurnError;
use super::extract::extract;
use super::sufficiency::assess;
use super::summary::{clarification_summary, ticket_summary};
use super::tickets::synthesize;

/// Limits that keep a conversation bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Clarification rounds before synthesis is forced.
    pub max_rounds: usize,
    /// Questions asked per clarification round.
    pub max_questions: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_questions: 3,
        }
    }
}

/// One incoming turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// `None` starts a new session.
    pub session_id: Option<SessionId>,
    pub text: String,
    /// Opaque workspace/context hint, passed through to prompts.
    pub workspace_hint: Option<String>,
}

impl TurnRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn in_session(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn with_workspace(mut self, hint: impl Into<String>) -> Self {
        self.workspace_hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// The gateway is unreachable; every step runs its fallback.
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub gateway: String,
    pub gateway_error: Option<String>,
    pub sessions: usize,
}

/// One exclusive async lock per session id.
///
/// The table holds weak handles only, so an entry lives exactly as long as
/// some caller holds or waits on the lock. Dead entries are pruned on access.
#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Weak<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    fn get(&self, id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("session lock table poisoned");
        if let Some(lock) = locks.get(id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(id.clone(), Arc::downgrade(&lock));
        lock
    }

    /// Live entries, after pruning.
    fn len(&self) -> usize {
        let mut locks = self.locks.lock().expect("session lock table poisoned");
        locks.retain(|_, lock| lock.strong_count() > 0);
        locks.len()
    }
}

/// The conversation state machine.
///
/// Each turn runs extraction, sufficiency, then clarification or ticket
/// synthesis, against a copy of the stored session. The copy is written back
/// only when the turn succeeds, and turns against the same session are
/// serialized.
pub struct Assistant {
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn SessionStore>,
    settings: EngineSettings,
    locks: SessionLocks,
}

impl Assistant {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: Arc<dyn SessionStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            gateway,
            store,
            settings,
            locks: SessionLocks::default(),
        }
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Processes a turn, starting a new session when the request has no id.
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        let supplied = request.session_id.is_some();
        let id = request.session_id.unwrap_or_else(SessionId::generate);
        let lock = self.locks.get(&id);
        let _guard = lock.lock().await;

        let session = match self.store.get(&id)? {
            Some(existing) if existing.is_complete() => {
                return Err(TurnError::SessionAlreadyComplete(id));
            }
            Some(existing) => existing,
            None if supplied => {
                return Err(TurnError::SessionNotFound(id));
            }
            None => {
                tracing::info!(session_id = %id, "Starting new session");
                Session::new(id, None)
            }
        };

        self.run_turn(session, &request.text, request.workspace_hint).await
    }

    /// Answers the questions of a session waiting for input.
    pub async fn resume(&self, id: &SessionId, answer: &str) -> Result<TurnResponse, TurnError> {
        let lock = self.locks.get(id);
        let _guard = lock.lock().await;

        let session = self
            .store
            .get(id)?
            .ok_or_else(|| TurnError::SessionNotFound(id.clone()))?;

        match session.state() {
            SessionState::Complete => Err(TurnError::SessionAlreadyComplete(id.clone())),
            SessionState::New => Err(TurnError::NotAwaitingInput(id.clone())),
            SessionState::AwaitingClarification => self.run_turn(session, answer, None).await,
        }
    }

    async fn run_turn(
        &self,
        mut session: Session,
        text: &str,
        workspace_hint: Option<String>,
    ) -> Result<TurnResponse, TurnError> {
        session.set_workspace_hint(workspace_hint);
        session.append_turn(Role::User, text);
        let workspace = session.workspace_hint().map(str::to_string);
        let workspace = workspace.as_deref();

        let extraction = extract(self.gateway.as_ref(), text, session.record(), workspace).await;
        extraction.record.validate().map_err(|violation| {
            tracing::error!(session_id = %session.id(), %violation, "Merged record is malformed, aborting turn");
            TurnError::MalformedRecord(violation)
        })?;
        session.set_record(extraction.record);

        let rounds = session.clarification_rounds();
        let assessment = assess(
            self.gateway.as_ref(),
            session.record(),
            session.history(),
            rounds,
            self.settings.max_rounds,
        )
        .await;

        tracing::info!(
            session_id = %session.id(),
            extraction = ?extraction.path,
            confidence = extraction.confidence,
            rounds,
            sufficient = assessment.outcome.is_sufficient(),
            rationale = assessment.outcome.rationale(),
            "Assessed turn"
        );

        let response = match &assessment.outcome {
            DecisionOutcome::Insufficient { missing, .. } => {
                let clarification = clarify(
                    self.gateway.as_ref(),
                    missing,
                    session.record(),
                    session.history(),
                    self.settings.max_questions,
                    workspace,
                )
                .await;

                let summary = clarification_summary(session.record(), &clarification.questions);
                session.append_turn(Role::Assistant, &summary);
                session.await_input();

                TurnResponse {
                    session_id: session.id().clone(),
                    state: session.state(),
                    waiting_for_input: session.waiting_for_input(),
                    complete: session.is_complete(),
                    questions: clarification.questions,
                    search_hints: clarification.search_hints,
                    tickets: Vec::new(),
                    summary,
                    record: session.record().clone(),
                }
            }
            DecisionOutcome::Sufficient { .. } => {
                let survey =
                    analyze_codebase(self.gateway.as_ref(), session.record(), workspace).await;
                let synthesis = synthesize(
                    self.gateway.as_ref(),
                    session.record(),
                    &survey.analysis,
                    workspace,
                )
                .await;

                let summary =
                    ticket_summary(session.record(), &synthesis.tickets, &assessment.outcome);
                session.append_turn(Role::Assistant, &summary);
                session.complete(synthesis.tickets.clone(), synthesis.audit);

                tracing::info!(
                    session_id = %session.id(),
                    tickets = synthesis.tickets.len(),
                    analysis = ?survey.path,
                    path = ?synthesis.path,
                    "Session complete"
                );

                TurnResponse {
                    session_id: session.id().clone(),
                    state: session.state(),
                    waiting_for_input: session.waiting_for_input(),
                    complete: session.is_complete(),
                    questions: Vec::new(),
                    search_hints: Vec::new(),
                    tickets: synthesis.tickets,
                    summary,
                    record: session.record().clone(),
                }
            }
        };

        self.store.put(&session)?;
        Ok(response)
    }

    pub fn session_info(&self, id: &SessionId) -> Result<SessionInfo, TurnError> {
        self.store
            .get(id)?
            .map(|session| SessionInfo::from(&session))
            .ok_or_else(|| TurnError::SessionNotFound(id.clone()))
    }

    /// All sessions, oldest first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, TurnError> {
        Ok(self
            .store
            .list()?
            .iter()
            .map(SessionSummary::from)
            .collect())
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<bool, TurnError> {
        let lock = self.locks.get(id);
        let removed = {
            let _guard = lock.lock().await;
            self.store.delete(id)?
        };
        if removed {
            tracing::info!(session_id = %id, "Session deleted");
        }
        Ok(removed)
    }

    /// Deletes sessions idle for longer than `max_idle`, returning their ids.
    pub async fn expire_idle(&self, max_idle: chrono::Duration) -> Result<Vec<SessionId>, TurnError> {
        self.expire_idle_before(Utc::now() - max_idle).await
    }

    /// Deletes sessions whose last activity is before `cutoff`.
    pub async fn expire_idle_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionId>, TurnError> {
        let candidates: Vec<SessionId> = self
            .store
            .list()?
            .into_iter()
            .filter(|s| s.last_activity() < cutoff)
            .map(|s| s.id().clone())
            .collect();

        let mut expired = Vec::new();
        for id in candidates {
            let lock = self.locks.get(&id);
            let _guard = lock.lock().await;

            // A turn may have landed while we waited for the lock.
            let still_idle = self
                .store
                .get(&id)?
                .is_some_and(|s| s.last_activity() < cutoff);
            if still_idle && self.store.delete(&id)? {
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), %cutoff, "Expired idle sessions");
        }
        Ok(expired)
    }

    /// Probes the gateway with a trivial prompt.
    pub async fn health(&self) -> Result<HealthReport, TurnError> {
        let probe = Prompt::new("You are a health check. Reply with OK.", "ping");
        let gateway_error = match self.gateway.complete(&probe, ResponseShape::FreeText).await {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(reason = %e, "Gateway health probe failed");
                Some(e.reason())
            }
        };

        Ok(HealthReport {
            status: if gateway_error.is_none() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            gateway: self.gateway.name().to_string(),
            gateway_error,
            sessions: self.store.count()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use crate::store::MemorySessionStore;

    fn assistant() -> Assistant {
        Assistant::new(
            Arc::new(ScriptedGateway::failing()),
            Arc::new(MemorySessionStore::new()),
            EngineSettings::default(),
        )
    }

    #[tokio::test]
    async fn unknown_ids_leave_no_lock_entries() {
        let assistant = assistant();

        for i in 0..200 {
            let id = SessionId::from(format!("missing-{}", i));
            let turn = assistant
                .process_turn(TurnRequest::new("Add a button").in_session(id.clone()))
                .await;
            assert!(matches!(turn, Err(TurnError::SessionNotFound(_))));
            let resumed = assistant.resume(&id, "dashboard").await;
            assert!(matches!(resumed, Err(TurnError::SessionNotFound(_))));
            assert!(!assistant.delete_session(&id).await.unwrap());
        }

        assert_eq!(assistant.store.count().unwrap(), 0);
        assert_eq!(assistant.locks.len(), 0);
    }

    #[tokio::test]
    async fn finished_turns_release_their_lock_entries() {
        let assistant = assistant();

        let first = assistant
            .process_turn(TurnRequest::new("Add a button"))
            .await
            .unwrap();
        assistant
            .resume(&first.session_id, "on the dashboard page, it should save")
            .await
            .unwrap();

        assert_eq!(assistant.store.count().unwrap(), 1);
        assert_eq!(assistant.locks.len(), 0);
    }

    #[tokio::test]
    async fn held_locks_are_shared_for_the_same_session() {
        let locks = SessionLocks::default();
        let id = SessionId::from("s-1");

        let held = locks.get(&id);
        let again = locks.get(&id);

        assert!(Arc::ptr_eq(&held, &again));
        assert_eq!(locks.len(), 1);
        drop((held, again));
        assert_eq!(locks.len(), 0);
    }
}
