//! Codebase analysis step: which files a feature will touch.

use crate::gateway::{complete_structured, Gateway, GatewayError, Prompt};
use crate::models::{Attribute, CodebaseAnalysis, FeatureRecord, StepPath};

use super::tickets::UNSPECIFIED;

/// Per-area cap on reported files.
pub const MAX_FILES_PER_AREA: usize = 10;

const SYSTEM_PROMPT: &str = r#"You are a senior engineer planning where a feature lands in a codebase.

Given the feature and the workspace path, list the files that would need to be
modified, grouped by area. Use paths relative to the workspace. Leave an area
empty when it does not apply.
Reply with:
{"frontend_files": ["..."], "style_files": ["..."],
 "test_files": ["..."], "backend_files": ["..."]}"#;

/// Result of the codebase analysis step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Survey {
    pub analysis: CodebaseAnalysis,
    pub path: StepPath,
}

/// Runs the codebase analysis step.
///
/// Needs a target page; without one, or when the gateway fails, the result
/// is an empty analysis and ticket synthesis proceeds without file lists.
pub async fn analyze_codebase(
    gateway: &dyn Gateway,
    record: &FeatureRecord,
    workspace_hint: Option<&str>,
) -> Survey {
    let fallback = |reason: &dyn std::fmt::Display| {
        tracing::warn!(%reason, "Codebase analysis unavailable, continuing without file lists");
        Survey {
            analysis: CodebaseAnalysis::default(),
            path: StepPath::Fallback,
        }
    };

    let Some(page) = record.get(Attribute::TargetPage) else {
        return fallback(&"no target page");
    };

    let prompt = analysis_prompt(page, record, workspace_hint);
    match complete_structured::<CodebaseAnalysis>(gateway, &prompt)
        .await
        .and_then(tidy)
    {
        Ok(analysis) => {
            tracing::debug!(?analysis, "Codebase analysis complete");
            Survey {
                analysis,
                path: StepPath::Gateway,
            }
        }
        Err(e) => fallback(&e),
    }
}

/// Trims, deduplicates and caps each file list. An all-empty reply is malformed.
fn tidy(reply: CodebaseAnalysis) -> Result<CodebaseAnalysis, GatewayError> {
    let clean = |files: Vec<String>| {
        let mut out: Vec<String> = Vec::new();
        for file in files {
            let file = file.trim();
            if !file.is_empty() && !out.iter().any(|f| f == file) {
                out.push(file.to_string());
            }
        }
        out.truncate(MAX_FILES_PER_AREA);
        out
    };

    let analysis = CodebaseAnalysis {
        frontend_files: clean(reply.frontend_files),
        style_files: clean(reply.style_files),
        test_files: clean(reply.test_files),
        backend_files: clean(reply.backend_files),
    };
    if analysis.is_empty() {
        return Err(GatewayError::Malformed("codebase analysis named no files".into()));
    }
    Ok(analysis)
}

fn analysis_prompt(page: &str, record: &FeatureRecord, workspace_hint: Option<&str>) -> Prompt {
    let value = |a: Attribute| record.get(a).unwrap_or(UNSPECIFIED);
    let user = format!(
        "Feature: {} on the \"{}\" page, action: {}\nWorkspace: {}\n",
        value(Attribute::FeatureType),
        page,
        value(Attribute::Action),
        workspace_hint.unwrap_or(".")
    );
    Prompt::new(SYSTEM_PROMPT, user)
}
