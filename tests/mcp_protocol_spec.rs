//! MCP protocol integration tests.
//!
//! These tests spawn the actual `clarita mcp` process in offline mode and
//! talk JSON-RPC over stdio, covering the complete protocol flow.
//!
//! The rmcp library uses line-delimited JSON (each message is one line):
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"initialize",...}\n
//! {"jsonrpc":"2.0","id":1,"result":{...}}\n
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// MCP test client that spawns and communicates with the server
struct McpTestClient {
    child: Child,
    request_id: u64,
    reader: BufReader<std::process::ChildStdout>,
}

impl McpTestClient {
    /// Spawn an offline MCP server with an in-memory session store
    fn spawn() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_clarita"))
            .args(["--offline", "mcp"])
            .env_remove("CLARITA_DB_PATH")
            .env("RUST_LOG", "off")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn clarita mcp");

        let stdout = child.stdout.take().expect("Failed to get stdout");

        Self {
            child,
            request_id: 0,
            reader: BufReader::new(stdout),
        }
    }

    fn send_message(&mut self, content: &str) {
        let stdin = self.child.stdin.as_mut().expect("Failed to get stdin");
        writeln!(stdin, "{}", content).expect("Failed to write message");
        stdin.flush().expect("Failed to flush stdin");
    }

    fn read_message(&mut self) -> String {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .expect("Failed to read line");
        line.trim().to_string()
    }

    /// Send a JSON-RPC request and get the response
    fn request(&mut self, method: &str, params: Option<Value>) -> JsonRpcResponse {
        self.request_id += 1;
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id,
            method: method.to_string(),
            params,
        };

        let request_json = serde_json::to_string(&request).expect("Failed to serialize request");
        self.send_message(&request_json);

        let response_json = self.read_message();
        serde_json::from_str(&response_json).expect("Failed to parse response")
    }

    /// Send initialize request and initialized notification (required first messages)
    fn initialize(&mut self) -> JsonRpcResponse {
        let response = self.request(
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "test-client",
                    "version": "1.0.0"
                }
            })),
        );

        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        });
        self.send_message(&notification.to_string());

        response
    }

    fn list_tools(&mut self) -> JsonRpcResponse {
        self.request("tools/list", None)
    }

    fn call_tool(&mut self, name: &str, arguments: Value) -> JsonRpcResponse {
        self.request(
            "tools/call",
            Some(json!({
                "name": name,
                "arguments": arguments
            })),
        )
    }
}

impl Drop for McpTestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Parse the JSON text payload of a successful tool call
fn tool_json(response: &JsonRpcResponse) -> Value {
    assert!(response.error.is_none(), "Expected success, got {:?}", response.error);
    let text = response
        .result
        .as_ref()
        .and_then(|r| r.get("content"))
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("text"))
        .and_then(|t| t.as_str())
        .expect("Expected text content");
    serde_json::from_str(text).expect("Expected JSON in text")
}

// ============================================================
// Protocol Tests
// ============================================================

mod protocol {
    use super::*;

    #[test]
    fn initialize_returns_server_info() {
        let mut client = McpTestClient::spawn();
        let response = client.initialize();

        assert!(response.error.is_none(), "Expected success, got error");
        let result = response.result.expect("Expected result");

        assert_eq!(result["serverInfo"]["name"], "clarita-pm");
        assert!(result.get("capabilities").is_some());
        assert!(result.get("instructions").is_some());
    }

    #[test]
    fn tools_list_returns_all_tools() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let response = client.list_tools();
        let result = response.result.expect("Expected result");
        let tools = result["tools"].as_array().expect("Tools should be array");

        let mut names: Vec<&str> = tools
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .collect();
        names.sort_unstable();

        assert_eq!(
            names,
            vec![
                "analyze_feature_request",
                "clarita_pm_health_check",
                "continue_conversation",
                "expire_sessions",
                "explore_feature_requirements",
                "get_session_info",
                "list_sessions",
                "plan_feature_implementation",
            ]
        );
    }

    #[test]
    fn tools_have_descriptions_and_schemas() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let result = client.list_tools().result.expect("Expected result");

        for tool in result["tools"].as_array().expect("Tools should be array") {
            let name = tool.get("name").and_then(|n| n.as_str()).unwrap_or("?");
            assert!(tool.get("description").is_some(), "Tool {} missing description", name);
            assert!(tool.get("inputSchema").is_some(), "Tool {} missing inputSchema", name);
        }
    }
}

// ============================================================
// Tool Call Tests
// ============================================================

mod tool_calls {
    use super::*;

    #[test]
    fn full_conversation_workflow() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let first = tool_json(&client.call_tool(
            "analyze_feature_request",
            json!({
                "description": "Let's add a button to this page",
                "workspace_path": "/tmp/project"
            }),
        ));
        assert_eq!(first["waiting_for_input"], true);
        assert!(!first["questions"].as_array().unwrap().is_empty());
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let second = tool_json(&client.call_tool(
            "continue_conversation",
            json!({
                "session_id": session_id,
                "user_response": "It should be a save button on the dashboard page"
            }),
        ));
        assert_eq!(second["complete"], true);
        assert_eq!(second["tickets"].as_array().unwrap().len(), 4);

        let info = tool_json(&client.call_tool(
            "get_session_info",
            json!({ "session_id": session_id }),
        ));
        assert_eq!(info["state"], "complete");
        assert_eq!(info["workspace_hint"], "/tmp/project");
        assert_eq!(info["history"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn continuing_a_finished_session_is_an_error() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let done = tool_json(&client.call_tool(
            "analyze_feature_request",
            json!({ "description": "Add a save button to the dashboard page" }),
        ));

        let response = client.call_tool(
            "continue_conversation",
            json!({
                "session_id": done["session_id"],
                "user_response": "Also make it red"
            }),
        );

        let error = response.error.expect("Expected error");
        assert_eq!(
            error.data.and_then(|d| d.get("status").cloned()),
            Some(json!("session_already_complete"))
        );
    }

    #[test]
    fn health_check_reports_degraded_when_offline() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        let report = tool_json(&client.call_tool("clarita_pm_health_check", json!({})));

        assert_eq!(report["status"], "degraded");
        assert_eq!(report["gateway"], "offline");
    }

    #[test]
    fn list_and_expire_sessions() {
        let mut client = McpTestClient::spawn();
        client.initialize();

        client.call_tool("analyze_feature_request", json!({ "description": "Add a button" }));

        let listing = tool_json(&client.call_tool("list_sessions", json!({})));
        assert_eq!(listing["sessions"].as_array().unwrap().len(), 1);

        let expired = tool_json(&client.call_tool("expire_sessions", json!({ "idle_minutes": 60 })));
        assert_eq!(expired["remaining"], 1);
    }
}
