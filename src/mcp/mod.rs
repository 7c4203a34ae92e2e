//! MCP server exposing the assistant to IDE agents over stdio.

mod types;

use std::sync::Arc;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use serde_json::json;

use crate::engine::summary::{implementation_plan, requirements_report};
use crate::engine::{Assistant, HealthReport, TurnError, TurnRequest};
use crate::models::{ExpireSessionsResponse, SessionId, SessionInfo, TurnResponse};

#[derive(Clone)]
pub struct McpServer {
    assistant: Arc<Assistant>,
    tool_router: ToolRouter<Self>,
}

/// Maps a turn failure onto an MCP error carrying the stable status string.
fn turn_error(e: TurnError) -> McpError {
    let data = Some(json!({ "status": e.status() }));
    if e.is_client_error() {
        McpError::invalid_params(e.to_string(), data)
    } else {
        tracing::error!(error = %e, "Tool call failed");
        McpError::internal_error(e.to_string(), data)
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, McpError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(McpError::invalid_params(
            format!("{} must not be empty", field),
            None,
        ));
    }
    Ok(trimmed)
}

impl McpServer {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            assistant,
            tool_router: Self::tool_router(),
        }
    }

    async fn analyze(&self, req: AnalyzeFeatureRequest) -> Result<TurnResponse, McpError> {
        let description = non_empty("description", &req.description)?;

        let mut request = TurnRequest::new(description);
        if let Some(id) = req.session_id.filter(|s| !s.trim().is_empty()) {
            request = request.in_session(SessionId::from(id.trim()));
        }
        if let Some(path) = req.workspace_path.filter(|p| !p.trim().is_empty()) {
            request = request.with_workspace(path);
        }

        self.assistant.process_turn(request).await.map_err(turn_error)
    }

    async fn explore(&self, req: AnalyzeFeatureRequest) -> Result<FeatureReport, McpError> {
        let turn = self.analyze(req).await?;
        Ok(FeatureReport {
            report: requirements_report(&turn),
            turn,
        })
    }

    async fn plan(&self, req: AnalyzeFeatureRequest) -> Result<FeatureReport, McpError> {
        let turn = self.analyze(req).await?;
        Ok(FeatureReport {
            report: implementation_plan(&turn),
            turn,
        })
    }

    async fn answer(&self, req: ContinueConversationRequest) -> Result<TurnResponse, McpError> {
        let id = SessionId::from(non_empty("session_id", &req.session_id)?);
        let answer = non_empty("user_response", &req.user_response)?;
        self.assistant.resume(&id, answer).await.map_err(turn_error)
    }

    fn info(&self, req: GetSessionInfoRequest) -> Result<SessionInfo, McpError> {
        let id = SessionId::from(non_empty("session_id", &req.session_id)?);
        self.assistant.session_info(&id).map_err(turn_error)
    }

    fn sessions(&self) -> Result<SessionListResponse, McpError> {
        let sessions = self.assistant.list_sessions().map_err(turn_error)?;
        Ok(SessionListResponse { sessions })
    }

    async fn expire(&self, req: ExpireSessionsRequest) -> Result<ExpireSessionsResponse, McpError> {
        let max_idle = chrono::Duration::minutes(i64::from(req.idle_minutes));
        let expired = self
            .assistant
            .expire_idle(max_idle)
            .await
            .map_err(turn_error)?;
        let remaining = self.assistant.list_sessions().map_err(turn_error)?.len();
        Ok(ExpireSessionsResponse { expired, remaining })
    }

    // ============================================================
    // Test helpers - expose tool logic for testing
    // ============================================================

    pub async fn test_analyze_feature_request(
        &self,
        req: AnalyzeFeatureRequest,
    ) -> Result<TurnResponse, McpError> {
        self.analyze(req).await
    }

    pub async fn test_explore_feature_requirements(
        &self,
        req: AnalyzeFeatureRequest,
    ) -> Result<FeatureReport, McpError> {
        self.explore(req).await
    }

    pub async fn test_plan_feature_implementation(
        &self,
        req: AnalyzeFeatureRequest,
    ) -> Result<FeatureReport, McpError> {
        self.plan(req).await
    }

    pub async fn test_continue_conversation(
        &self,
        session_id: &str,
        user_response: &str,
    ) -> Result<TurnResponse, McpError> {
        self.answer(ContinueConversationRequest {
            session_id: session_id.to_string(),
            user_response: user_response.to_string(),
        })
        .await
    }

    pub fn test_get_session_info(&self, session_id: &str) -> Result<SessionInfo, McpError> {
        self.info(GetSessionInfoRequest {
            session_id: session_id.to_string(),
        })
    }

    pub fn test_list_sessions(&self) -> Result<SessionListResponse, McpError> {
        self.sessions()
    }

    pub async fn test_expire_sessions(
        &self,
        idle_minutes: u32,
    ) -> Result<ExpireSessionsResponse, McpError> {
        self.expire(ExpireSessionsRequest { idle_minutes }).await
    }

    pub async fn test_health_check(&self) -> Result<HealthReport, McpError> {
        self.assistant.health().await.map_err(turn_error)
    }
}

#[tool_router]
impl McpServer {
    #[tool(
        description = "Turn a feature request into tickets. Starts a new conversation (or continues one when session_id is given). If details are missing, returns waiting_for_input=true with clarifying questions and codebase search hints; answer them with continue_conversation. Once enough is known, returns complete=true with a parent ticket, its subtasks, and a markdown summary."
    )]
    async fn analyze_feature_request(
        &self,
        params: Parameters<AnalyzeFeatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.analyze(params.0).await?;
        json_result(&response)
    }

    #[tool(
        description = "Analyze the requirements of a feature: what it breaks into, which attributes are known, and which files need to change. Same conversation as analyze_feature_request (pass session_id to continue); the 'report' field holds a markdown requirements analysis, or the clarifying questions while details are missing."
    )]
    async fn explore_feature_requirements(
        &self,
        params: Parameters<AnalyzeFeatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let report = self.explore(params.0).await?;
        json_result(&report)
    }

    #[tool(
        description = "Plan the implementation of a feature for sprint planning: every task with description, estimate, priority, dependencies and files, plus total effort and the critical path. Same conversation as analyze_feature_request (pass session_id to continue); the 'report' field holds the markdown plan, or the clarifying questions while details are missing."
    )]
    async fn plan_feature_implementation(
        &self,
        params: Parameters<AnalyzeFeatureRequest>,
    ) -> Result<CallToolResult, McpError> {
        let report = self.plan(params.0).await?;
        json_result(&report)
    }

    #[tool(
        description = "Answer the clarifying questions of a session that is waiting for input. Returns either more questions or the finished ticket set. Fails with status 'session_already_complete' for finished sessions; start a new session to revise."
    )]
    async fn continue_conversation(
        &self,
        params: Parameters<ContinueConversationRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.answer(params.0).await?;
        json_result(&response)
    }

    #[tool(
        description = "Get the full state of a session: known attributes, conversation history, tickets, fallback audit log, and timestamps. Read-only."
    )]
    async fn get_session_info(
        &self,
        params: Parameters<GetSessionInfoRequest>,
    ) -> Result<CallToolResult, McpError> {
        let info = self.info(params.0)?;
        json_result(&info)
    }

    #[tool(description = "List all sessions, oldest first, with their state and known attributes. Read-only.")]
    async fn list_sessions(&self) -> Result<CallToolResult, McpError> {
        let sessions = self.sessions()?;
        json_result(&sessions)
    }

    #[tool(
        description = "Delete sessions that have been idle for at least idle_minutes. Returns the expired session ids."
    )]
    async fn expire_sessions(
        &self,
        params: Parameters<ExpireSessionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.expire(params.0).await?;
        json_result(&result)
    }

    #[tool(
        description = "Check whether the text-generation backend is reachable. 'degraded' means deterministic fallbacks are in use."
    )]
    async fn clarita_pm_health_check(&self) -> Result<CallToolResult, McpError> {
        let report = self.assistant.health().await.map_err(turn_error)?;
        json_result(&report)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "clarita-pm".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"ClaritaPM turns feature requests into tickets.

WORKFLOW:
1. Call analyze_feature_request with the user's request and the workspace path.
2. If waiting_for_input is true, show the questions to the user. The search_hints
   say what to look for in the codebase if you can answer a question yourself.
3. Call continue_conversation with the session_id and the answer.
4. Repeat until complete is true. The response then holds one parent ticket,
   its subtasks (frontend, backend when needed, testing) and a summary.

explore_feature_requirements and plan_feature_implementation run the same
conversation and add a markdown 'report': a requirements analysis or an
implementation plan with estimates, dependencies and the critical path.

A finished session cannot be reopened. To revise, start a new session.

The assistant needs three things: the target page, the feature type
(button, form, field, link, ...) and the action (save, submit, navigate, ...).
After a few rounds it proceeds with whatever it has."#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(assistant: Arc<Assistant>) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(assistant);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
