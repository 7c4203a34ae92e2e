//! Request and response types for MCP tools.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{SessionSummary, TurnResponse};

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeFeatureRequest {
    #[schemars(
        description = "The feature request in plain language, e.g. 'Add a save button to the dashboard page'"
    )]
    pub description: String,
    #[schemars(
        description = "Optional path of the workspace the feature belongs to. Passed to the assistant as context."
    )]
    pub workspace_path: Option<String>,
    #[schemars(
        description = "Optional session id to continue. Omit to start a new conversation."
    )]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContinueConversationRequest {
    #[schemars(description = "The session id returned by analyze_feature_request")]
    pub session_id: String,
    #[schemars(description = "The user's answer to the clarifying questions")]
    pub user_response: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetSessionInfoRequest {
    #[schemars(description = "The session id to inspect")]
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExpireSessionsRequest {
    #[schemars(
        description = "Delete sessions with no activity for at least this many minutes"
    )]
    pub idle_minutes: u32,
}

// ============================================================
// Response Types
// ============================================================

/// A turn rendered as a requirements analysis or an implementation plan.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureReport {
    /// Markdown rendering of the turn.
    pub report: String,
    #[serde(flatten)]
    pub turn: TurnResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}
