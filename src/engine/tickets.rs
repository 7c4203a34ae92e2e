//! Ticket synthesis step: one parent ticket plus its subtasks.

use std::collections::HashSet;

use serde::Deserialize;
use uuid::Uuid;

use crate::gateway::{complete_structured, Gateway, GatewayError, Prompt};
use crate::models::{
    Attribute, AuditEntry, CodebaseAnalysis, Component, Estimate, FeatureRecord, Priority,
    SizeEstimate, StepPath, Ticket, TicketKind,
};

/// Actions that imply server-side work, so the fallback adds a backend subtask.
pub const BACKEND_ACTIONS: &[&str] = &["save", "submit", "update", "delete", "upload"];

pub const MAX_SUBTASKS: usize = 8;
pub const MAX_POINTS: u8 = 21;

/// Rendered in place of an attribute that was never supplied.
pub const UNSPECIFIED: &str = "unspecified";

const SYSTEM_PROMPT: &str = r#"You are a technical project manager writing tickets for a feature.

Produce exactly one parent ticket and between one and eight subtasks covering
frontend work, backend work if the action needs the server, and testing.
Reply with:
{"tickets": [
  {"title": "...", "description": "...", "kind": "parent" | "subtask",
   "component": "frontend" | "backend" | "styling" | "testing" | "documentation" | null,
   "size": "xs" | "s" | "m" | "l" | "xl", "points": 1-21,
   "priority": "low" | "medium" | "high" | "critical",
   "acceptance_criteria": ["..."],
   "parent": "<parent title, subtasks only>",
   "depends_on": ["<other ticket title>"],
   "files_to_modify": ["<path>"]}
]}
Titles must be unique. When files to modify are listed below, assign them to
the subtasks that change them."#;

/// Result of the ticket synthesis step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    /// Parent first, then subtasks.
    pub tickets: Vec<Ticket>,
    /// One entry per fallback ticket; empty on the gateway path.
    pub audit: Vec<AuditEntry>,
    pub path: StepPath,
}

#[derive(Debug, Deserialize)]
struct SynthesisReply {
    tickets: Vec<TicketDraft>,
}

#[derive(Debug, Deserialize)]
struct TicketDraft {
    title: String,
    #[serde(default)]
    description: String,
    kind: TicketKind,
    #[serde(default)]
    component: Option<Component>,
    size: SizeEstimate,
    points: u8,
    priority: Priority,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    files_to_modify: Vec<String>,
}

/// Runs the ticket synthesis step.
///
/// A gateway reply is only accepted when it passes [`validate_drafts`];
/// otherwise the deterministic generator runs and every ticket it produces is
/// audited. Tickets left without files get the analysis files for their
/// component.
pub async fn synthesize(
    gateway: &dyn Gateway,
    record: &FeatureRecord,
    analysis: &CodebaseAnalysis,
    workspace_hint: Option<&str>,
) -> Synthesis {
    let prompt = synthesis_prompt(record, analysis, workspace_hint);

    let mut synthesis = match complete_structured::<SynthesisReply>(gateway, &prompt)
        .await
        .and_then(|reply| validate_drafts(reply.tickets))
    {
        Ok(tickets) => Synthesis {
            tickets,
            audit: Vec::new(),
            path: StepPath::Gateway,
        },
        Err(e) => {
            tracing::warn!(reason = %e, "Ticket synthesis gateway failed, using templated tickets");
            let tickets = fallback_tickets(record);
            let audit = tickets
                .iter()
                .map(|ticket| record_fallback(ticket, record))
                .collect();
            Synthesis {
                tickets,
                audit,
                path: StepPath::Fallback,
            }
        }
    };

    for ticket in &mut synthesis.tickets {
        if ticket.files_to_modify.is_empty() {
            ticket.files_to_modify = analysis.files_for(ticket.component);
        }
    }
    synthesis
}

fn record_fallback(ticket: &Ticket, record: &FeatureRecord) -> AuditEntry {
    let entry = AuditEntry::fallback(ticket, record);
    tracing::info!(
        target: "clarita_pm::audit",
        ticket = %entry.ticket_title,
        kind = entry.kind.as_str(),
        component = entry.component.map(|c| c.as_str()),
        attributes = ?entry.attributes,
        "Fallback ticket created"
    );
    entry
}

/// Whether `action` triggers a backend subtask in the fallback generator.
pub fn needs_backend(action: Option<&str>) -> bool {
    action.is_some_and(|a| BACKEND_ACTIONS.contains(&a))
}

/// Deterministic ticket set keyed by the record's attributes.
///
/// Always a parent, a frontend subtask and a testing subtask; a backend
/// subtask is added when the action is in [`BACKEND_ACTIONS`]. Estimates and
/// priorities come from [`fallback_profile`], never from content.
pub fn fallback_tickets(record: &FeatureRecord) -> Vec<Ticket> {
    let page = record.get(Attribute::TargetPage).unwrap_or(UNSPECIFIED);
    let kind = record.get(Attribute::FeatureType).unwrap_or("feature");
    let action = record.get(Attribute::Action);
    let action_text = action.unwrap_or(UNSPECIFIED);

    let parent_title = format!("Add {} to {} Page", title_case(kind), title_case(page));

    let parent = fallback_ticket(
        parent_title.clone(),
        format!(
            "Add a {} to the {} page. When used it should {}.",
            kind, page, action_text
        ),
        None,
        vec![
            format!("The {} is visible on the {} page", kind, page),
            format!("Using the {} performs the {} action", kind, action_text),
            "All subtasks are complete".to_string(),
        ],
        None,
        Vec::new(),
    );

    let frontend = fallback_ticket(
        format!("Implement {} on {} Page", title_case(kind), title_case(page)),
        format!("Implement the {} on the {} page", kind, page),
        Some(Component::Frontend),
        vec![
            format!("The {} renders on the {} page", kind, page),
            format!("Using the {} triggers the {} action", kind, action_text),
            "Matches the existing page styling".to_string(),
        ],
        Some(parent_title.clone()),
        Vec::new(),
    );

    let backend = needs_backend(action).then(|| {
        fallback_ticket(
            format!("Implement {} Handler", title_case(action_text)),
            format!("Create backend endpoint for {} functionality", action_text),
            Some(Component::Backend),
            vec![
                format!("An endpoint handles the {} request", action_text),
                "Invalid input is rejected with a clear error".to_string(),
                "Changes are persisted".to_string(),
            ],
            Some(parent_title.clone()),
            Vec::new(),
        )
    });

    let mut testing_deps = vec![frontend.title.clone()];
    if let Some(backend) = &backend {
        testing_deps.push(backend.title.clone());
    }
    let testing = fallback_ticket(
        format!("Test {} on {} Page", title_case(kind), title_case(page)),
        format!("Write tests for the {} on the {} page", kind, page),
        Some(Component::Testing),
        vec![
            format!("Tests cover the {} action", action_text),
            "Tests cover the error path".to_string(),
        ],
        Some(parent_title),
        testing_deps,
    );

    let mut tickets = vec![parent, frontend];
    tickets.extend(backend);
    tickets.push(testing);
    tickets
}

/// Fixed size, points and priority for a fallback ticket.
pub fn fallback_profile(component: Option<Component>) -> (SizeEstimate, u8, Priority) {
    match component {
        None => (SizeEstimate::Large, 8, Priority::High),
        Some(Component::Frontend) => (SizeEstimate::Medium, 3, Priority::High),
        Some(Component::Backend) => (SizeEstimate::Medium, 5, Priority::Medium),
        Some(Component::Testing) => (SizeEstimate::Small, 2, Priority::Medium),
        Some(Component::Styling) | Some(Component::Documentation) => {
            (SizeEstimate::ExtraSmall, 1, Priority::Low)
        }
    }
}

fn fallback_ticket(
    title: String,
    description: String,
    component: Option<Component>,
    acceptance_criteria: Vec<String>,
    parent: Option<String>,
    depends_on: Vec<String>,
) -> Ticket {
    let (size, points, priority) = fallback_profile(component);
    Ticket {
        id: Uuid::new_v4(),
        title,
        description,
        kind: if parent.is_some() {
            TicketKind::Subtask
        } else {
            TicketKind::Parent
        },
        component,
        estimate: Estimate { size, points },
        priority,
        acceptance_criteria,
        parent,
        depends_on,
        files_to_modify: Vec::new(),
    }
}

/// Checks a gateway ticket set and turns it into tickets.
///
/// Requires exactly one parent, 1..=[`MAX_SUBTASKS`] subtasks, unique
/// non-empty titles, points in 1..=[`MAX_POINTS`], and that every parent and
/// dependency reference names a ticket in the same set. Subtasks with no
/// parent reference are attached to the parent.
fn validate_drafts(drafts: Vec<TicketDraft>) -> Result<Vec<Ticket>, GatewayError> {
    let invalid = |msg: String| GatewayError::Malformed(format!("ticket set rejected: {}", msg));

    let parents: Vec<&TicketDraft> = drafts
        .iter()
        .filter(|d| d.kind == TicketKind::Parent)
        .collect();
    if parents.len() != 1 {
        return Err(invalid(format!("expected one parent, got {}", parents.len())));
    }
    let parent_title = parents[0].title.trim().to_string();

    let subtasks = drafts.len() - 1;
    if subtasks == 0 || subtasks > MAX_SUBTASKS {
        return Err(invalid(format!(
            "expected 1 to {} subtasks, got {}",
            MAX_SUBTASKS, subtasks
        )));
    }

    let mut titles = HashSet::new();
    for draft in &drafts {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(invalid("empty title".into()));
        }
        if !titles.insert(title.to_string()) {
            return Err(invalid(format!("duplicate title '{}'", title)));
        }
        if draft.points == 0 || draft.points > MAX_POINTS {
            return Err(invalid(format!("'{}' has {} points", title, draft.points)));
        }
    }

    let mut tickets: Vec<Ticket> = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let title = draft.title.trim().to_string();

        let parent = match draft.kind {
            TicketKind::Parent => None,
            TicketKind::Subtask => match draft.parent.as_deref().map(str::trim) {
                None | Some("") => Some(parent_title.clone()),
                Some(p) if p == parent_title => Some(parent_title.clone()),
                Some(p) => {
                    return Err(invalid(format!("'{}' names unknown parent '{}'", title, p)));
                }
            },
        };

        let mut depends_on = Vec::new();
        for dep in draft.depends_on {
            let dep = dep.trim().to_string();
            if dep == title || !titles.contains(&dep) {
                return Err(invalid(format!("'{}' depends on unknown ticket '{}'", title, dep)));
            }
            if !depends_on.contains(&dep) {
                depends_on.push(dep);
            }
        }

        tickets.push(Ticket {
            id: Uuid::new_v4(),
            title,
            description: draft.description.trim().to_string(),
            kind: draft.kind,
            component: match draft.kind {
                TicketKind::Parent => None,
                TicketKind::Subtask => draft.component,
            },
            estimate: Estimate {
                size: draft.size,
                points: draft.points,
            },
            priority: draft.priority,
            acceptance_criteria: draft
                .acceptance_criteria
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            parent,
            depends_on,
            files_to_modify: draft
                .files_to_modify
                .into_iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        });
    }

    // Parent first.
    tickets.sort_by_key(|t| t.kind != TicketKind::Parent);
    Ok(tickets)
}

fn synthesis_prompt(
    record: &FeatureRecord,
    analysis: &CodebaseAnalysis,
    workspace_hint: Option<&str>,
) -> Prompt {
    let mut user = String::from("Feature:\n");
    for attribute in Attribute::ALL {
        user.push_str(&format!(
            "- {}: {}\n",
            attribute,
            record.get(attribute).unwrap_or(UNSPECIFIED)
        ));
    }
    if !analysis.is_empty() {
        user.push_str("Files to modify:\n");
        for (area, files) in [
            ("frontend", &analysis.frontend_files),
            ("styles", &analysis.style_files),
            ("tests", &analysis.test_files),
            ("backend", &analysis.backend_files),
        ] {
            if !files.is_empty() {
                user.push_str(&format!("- {}: {}\n", area, files.join(", ")));
            }
        }
    }
    if let Some(hint) = workspace_hint {
        user.push_str(&format!("Workspace: {}\n", hint));
    }
    Prompt::new(SYSTEM_PROMPT, user)
}

/// "user settings" -> "User Settings".
pub(crate) fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use serde_json::json;

    fn record(page: &str, kind: &str, action: &str) -> FeatureRecord {
        FeatureRecord::new()
            .with(Attribute::TargetPage, page)
            .with(Attribute::FeatureType, kind)
            .with(Attribute::Action, action)
    }

    fn none() -> CodebaseAnalysis {
        CodebaseAnalysis::default()
    }

    fn components(tickets: &[Ticket]) -> Vec<Option<Component>> {
        tickets.iter().map(|t| t.component).collect()
    }

    #[test]
    fn save_action_adds_backend_subtask() {
        let tickets = fallback_tickets(&record("dashboard", "button", "save"));

        assert_eq!(
            components(&tickets),
            vec![
                None,
                Some(Component::Frontend),
                Some(Component::Backend),
                Some(Component::Testing)
            ]
        );
        assert_eq!(tickets[0].title, "Add Button to Dashboard Page");
        assert_eq!(tickets[2].title, "Implement Save Handler");
    }

    #[test]
    fn navigate_action_has_no_backend_subtask() {
        let tickets = fallback_tickets(&record("home", "link", "navigate"));

        assert!(!components(&tickets).contains(&Some(Component::Backend)));
        assert_eq!(tickets.len(), 3);
    }

    #[test]
    fn subtasks_reference_the_parent_by_title() {
        let tickets = fallback_tickets(&record("settings", "toggle", "update"));
        let parent = &tickets[0];

        assert_eq!(parent.kind, TicketKind::Parent);
        for subtask in &tickets[1..] {
            assert_eq!(subtask.kind, TicketKind::Subtask);
            assert_eq!(subtask.parent.as_deref(), Some(parent.title.as_str()));
        }
    }

    #[test]
    fn testing_subtask_depends_on_implementation_subtasks() {
        let tickets = fallback_tickets(&record("dashboard", "button", "save"));
        let testing = tickets.last().unwrap();

        assert_eq!(
            testing.depends_on,
            vec![
                "Implement Button on Dashboard Page".to_string(),
                "Implement Save Handler".to_string()
            ]
        );
    }

    #[test]
    fn estimates_come_from_the_profile_table() {
        let tickets = fallback_tickets(&record("dashboard", "button", "save"));
        for ticket in &tickets {
            let (size, points, priority) = fallback_profile(ticket.component);
            assert_eq!(ticket.estimate, Estimate { size, points });
            assert_eq!(ticket.priority, priority);
        }
    }

    #[test]
    fn missing_attributes_render_as_placeholders() {
        let partial = FeatureRecord::new().with(Attribute::FeatureType, "button");
        let tickets = fallback_tickets(&partial);

        assert_eq!(tickets[0].title, "Add Button to Unspecified Page");
        assert_eq!(tickets.len(), 3);
    }

    #[test]
    fn title_case_handles_multiple_words() {
        assert_eq!(title_case("user  settings"), "User Settings");
        assert_eq!(title_case(""), "");
    }

    #[tokio::test]
    async fn failing_gateway_audits_every_fallback_ticket() {
        let rec = record("dashboard", "button", "save");
        let synthesis = synthesize(&ScriptedGateway::failing(), &rec, &CodebaseAnalysis::default(), None).await;

        assert_eq!(synthesis.path, StepPath::Fallback);
        assert_eq!(synthesis.audit.len(), synthesis.tickets.len());
        for (ticket, entry) in synthesis.tickets.iter().zip(&synthesis.audit) {
            assert_eq!(entry.ticket_title, ticket.title);
            assert_eq!(entry.kind, ticket.kind);
            assert_eq!(entry.source, StepPath::Fallback);
            assert_eq!(entry.attributes.len(), 3);
        }
    }

    #[tokio::test]
    async fn valid_gateway_ticket_set_is_used() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "tickets": [
                {"title": "Write tests", "kind": "subtask", "component": "testing",
                 "size": "s", "points": 2, "priority": "medium",
                 "depends_on": ["Build it"]},
                {"title": "Dashboard save", "kind": "parent", "size": "l",
                 "points": 8, "priority": "High", "acceptance_criteria": ["Saves", " "]},
                {"title": "Build it", "kind": "subtask", "component": "frontend",
                 "size": "m", "points": 3, "priority": "high", "parent": "Dashboard save"}
            ]
        }));

        let synthesis = synthesize(&gateway, &record("dashboard", "button", "save"), &none(), None).await;

        assert_eq!(synthesis.path, StepPath::Gateway);
        assert!(synthesis.audit.is_empty());
        assert_eq!(synthesis.tickets[0].title, "Dashboard save");
        assert_eq!(synthesis.tickets[0].acceptance_criteria, vec!["Saves".to_string()]);
        assert_eq!(synthesis.tickets[1].parent.as_deref(), Some("Dashboard save"));
        assert_eq!(synthesis.tickets[2].parent.as_deref(), Some("Dashboard save"));
    }

    #[tokio::test]
    async fn ticket_set_with_unresolved_parent_falls_back() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "tickets": [
                {"title": "Parent", "kind": "parent", "size": "l", "points": 8, "priority": "high"},
                {"title": "Child", "kind": "subtask", "size": "m", "points": 3,
                 "priority": "high", "parent": "Somebody else"}
            ]
        }));

        let synthesis = synthesize(&gateway, &record("dashboard", "button", "save"), &none(), None).await;

        assert_eq!(synthesis.path, StepPath::Fallback);
    }

    #[tokio::test]
    async fn ticket_set_with_two_parents_falls_back() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "tickets": [
                {"title": "A", "kind": "parent", "size": "l", "points": 8, "priority": "high"},
                {"title": "B", "kind": "parent", "size": "l", "points": 8, "priority": "high"}
            ]
        }));

        let synthesis = synthesize(&gateway, &record("home", "link", "navigate"), &none(), None).await;

        assert_eq!(synthesis.path, StepPath::Fallback);
        assert_eq!(synthesis.tickets.len(), 3);
    }

    #[tokio::test]
    async fn out_of_range_points_fall_back() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "tickets": [
                {"title": "A", "kind": "parent", "size": "xl", "points": 40, "priority": "high"},
                {"title": "B", "kind": "subtask", "size": "m", "points": 3, "priority": "low"}
            ]
        }));

        let synthesis = synthesize(&gateway, &record("home", "link", "navigate"), &none(), None).await;

        assert_eq!(synthesis.path, StepPath::Fallback);
    }

    #[tokio::test]
    async fn fallback_tickets_pick_up_analysis_files() {
        let analysis = CodebaseAnalysis {
            frontend_files: vec!["src/pages/Dashboard.tsx".into()],
            style_files: vec!["src/pages/Dashboard.css".into()],
            test_files: vec!["tests/dashboard.spec.ts".into()],
            backend_files: vec!["server/routes/save.ts".into()],
        };

        let synthesis = synthesize(
            &ScriptedGateway::failing(),
            &record("dashboard", "button", "save"),
            &analysis,
            None,
        )
        .await;

        let files: Vec<(Option<Component>, Vec<String>)> = synthesis
            .tickets
            .iter()
            .map(|t| (t.component, t.files_to_modify.clone()))
            .collect();
        assert_eq!(
            files,
            vec![
                (None, vec![]),
                (
                    Some(Component::Frontend),
                    vec!["src/pages/Dashboard.tsx".to_string(), "src/pages/Dashboard.css".to_string()]
                ),
                (Some(Component::Backend), vec!["server/routes/save.ts".to_string()]),
                (Some(Component::Testing), vec!["tests/dashboard.spec.ts".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn gateway_files_win_over_analysis_files() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "tickets": [
                {"title": "Parent", "kind": "parent", "size": "l", "points": 8, "priority": "high"},
                {"title": "UI", "kind": "subtask", "component": "frontend", "size": "m",
                 "points": 3, "priority": "high", "files_to_modify": [" web/Save.vue "]},
                {"title": "Tests", "kind": "subtask", "component": "testing", "size": "s",
                 "points": 2, "priority": "medium"}
            ]
        }));
        let analysis = CodebaseAnalysis {
            frontend_files: vec!["src/Other.vue".into()],
            test_files: vec!["tests/save.spec.ts".into()],
            ..Default::default()
        };

        let synthesis = synthesize(&gateway, &record("dashboard", "button", "save"), &analysis, None).await;

        assert_eq!(synthesis.path, StepPath::Gateway);
        assert_eq!(synthesis.tickets[1].files_to_modify, vec!["web/Save.vue".to_string()]);
        assert_eq!(synthesis.tickets[2].files_to_modify, vec!["tests/save.spec.ts".to_string()]);
        assert!(gateway.prompts()[0].user.contains("src/Other.vue"));
    }
}
