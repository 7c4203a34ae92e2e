//! Clarification step: targeted questions for missing attributes.

use serde::Deserialize;

use crate::gateway::{complete_structured, Gateway, GatewayError, Prompt};
use crate::models::{Attribute, ConversationTurn, FeatureRecord, StepPath};

const SYSTEM_PROMPT: &str = r#"You help a product manager turn a feature request into tickets.

Some attributes of the request are missing or too vague. Write one short,
conversational question per listed attribute, with an example where it helps.
Also suggest things to search the codebase for that would help answer them.
Reply with:
{"questions": [{"attribute": "<attribute>", "question": "<text>"}, ...],
 "search_hints": ["<text>", ...]}"#;

/// Result of the clarification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clarification {
    /// Deduplicated, in missing-attribute priority order.
    pub questions: Vec<String>,
    pub search_hints: Vec<String>,
    pub path: StepPath,
}

#[derive(Debug, Deserialize)]
struct ClarificationReply {
    questions: Vec<QuestionDraft>,
    #[serde(default)]
    search_hints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionDraft {
    attribute: String,
    question: String,
}

/// The fixed question asked about an attribute when the gateway cannot help.
pub fn template_question(attribute: Attribute) -> &'static str {
    match attribute {
        Attribute::TargetPage => "Which page should this feature be added to?",
        Attribute::FeatureType => {
            "What type of feature should be added (for example a button, form, field, or link)?"
        }
        Attribute::Action => {
            "What should happen when this feature is used (for example save, submit, or navigate)?"
        }
    }
}

/// Runs the clarification step. Has no effect on the record.
///
/// At most `max_questions` questions are returned. Gateway questions about
/// attributes not in `missing` are dropped; missing attributes the gateway
/// skipped get their template question.
pub async fn clarify(
    gateway: &dyn Gateway,
    missing: &[Attribute],
    record: &FeatureRecord,
    history: &[ConversationTurn],
    max_questions: usize,
    workspace_hint: Option<&str>,
) -> Clarification {
    let prompt = clarification_prompt(missing, record, history, workspace_hint);

    match complete_structured::<ClarificationReply>(gateway, &prompt)
        .await
        .and_then(|reply| arrange_reply(reply, missing, max_questions))
    {
        Ok((questions, mut search_hints)) => {
            if search_hints.is_empty() {
                search_hints = fallback_hints(record);
            }
            Clarification {
                questions,
                search_hints,
                path: StepPath::Gateway,
            }
        }
        Err(e) => {
            tracing::warn!(reason = %e, ?missing, "Clarification gateway failed, using template questions");
            Clarification {
                questions: fallback_questions(missing, max_questions),
                search_hints: fallback_hints(record),
                path: StepPath::Fallback,
            }
        }
    }
}

/// One template question per missing attribute, in priority order.
pub fn fallback_questions(missing: &[Attribute], max_questions: usize) -> Vec<String> {
    let mut ordered = missing.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
        .into_iter()
        .take(max_questions)
        .map(|a| template_question(a).to_string())
        .collect()
}

/// Codebase search hints derived from what is already known.
pub fn fallback_hints(record: &FeatureRecord) -> Vec<String> {
    let mut hints = Vec::new();
    if let Some(page) = record.get(Attribute::TargetPage) {
        hints.push(format!("Find the component that renders the {} page", page));
    }
    if let Some(kind) = record.get(Attribute::FeatureType) {
        hints.push(format!("Look for existing {} components to reuse", kind));
    }
    if let Some(action) = record.get(Attribute::Action) {
        hints.push(format!("Search for existing {} handlers or API endpoints", action));
    }
    hints
}

fn arrange_reply(
    reply: ClarificationReply,
    missing: &[Attribute],
    max_questions: usize,
) -> Result<(Vec<String>, Vec<String>), GatewayError> {
    let mut drafts: Vec<(Attribute, String)> = reply
        .questions
        .into_iter()
        .filter_map(|d| {
            let attribute = d.attribute.parse::<Attribute>().ok()?;
            let question = d.question.trim().to_string();
            (missing.contains(&attribute) && !question.is_empty()).then_some((attribute, question))
        })
        .collect();

    if drafts.is_empty() {
        return Err(GatewayError::Malformed(
            "no usable questions for the missing attributes".into(),
        ));
    }

    for attribute in missing {
        if !drafts.iter().any(|(a, _)| a == attribute) {
            drafts.push((*attribute, template_question(*attribute).to_string()));
        }
    }

    // Stable sort keeps the backend's order among questions for one attribute.
    drafts.sort_by_key(|(attribute, _)| *attribute);

    let mut questions: Vec<String> = Vec::new();
    for (_, question) in drafts {
        if !questions.contains(&question) {
            questions.push(question);
        }
    }
    questions.truncate(max_questions);

    let mut hints: Vec<String> = Vec::new();
    for hint in reply.search_hints {
        let hint = hint.trim().to_string();
        if !hint.is_empty() && !hints.contains(&hint) {
            hints.push(hint);
        }
    }

    Ok((questions, hints))
}

fn clarification_prompt(
    missing: &[Attribute],
    record: &FeatureRecord,
    history: &[ConversationTurn],
    workspace_hint: Option<&str>,
) -> Prompt {
    let mut user = String::from("Missing or vague attributes: ");
    user.push_str(
        &missing
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );

    user.push_str("\nKnown attributes:\n");
    for (attribute, value) in record.iter() {
        user.push_str(&format!("- {}: {}\n", attribute, value));
    }

    if let Some(hint) = workspace_hint {
        user.push_str(&format!("Workspace: {}\n", hint));
    }

    if let Some(request) = history.iter().find(|t| t.role() == crate::models::Role::User) {
        user.push_str(&format!("Original request: \"{}\"\n", request.text()));
    }

    Prompt::new(SYSTEM_PROMPT, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use serde_json::json;

    #[test]
    fn fallback_questions_follow_priority_order() {
        let questions = fallback_questions(&[Attribute::Action, Attribute::TargetPage], 3);
        assert_eq!(
            questions,
            vec![
                template_question(Attribute::TargetPage).to_string(),
                template_question(Attribute::Action).to_string(),
            ]
        );
    }

    #[test]
    fn fallback_questions_are_bounded() {
        let questions = fallback_questions(&Attribute::ALL, 2);
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn fallback_hints_use_known_attributes() {
        let record = FeatureRecord::new().with(Attribute::FeatureType, "button");
        let hints = fallback_hints(&record);
        assert_eq!(hints, vec!["Look for existing button components to reuse".to_string()]);
    }

    #[tokio::test]
    async fn failing_gateway_yields_template_questions() {
        let record = FeatureRecord::new().with(Attribute::FeatureType, "button");
        let missing = record.missing();

        let result = clarify(&ScriptedGateway::failing(), &missing, &record, &[], 3, None).await;

        assert_eq!(result.path, StepPath::Fallback);
        assert_eq!(result.questions.len(), 2);
        assert_eq!(result.questions[0], template_question(Attribute::TargetPage));
    }

    #[tokio::test]
    async fn gateway_questions_are_ordered_deduplicated_and_filled() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "questions": [
                {"attribute": "action", "question": "What should clicking it do?"},
                {"attribute": "feature_type", "question": "Not missing, should be dropped"},
                {"attribute": "action", "question": "What should clicking it do?"}
            ],
            "search_hints": ["routes/", "routes/", "  "]
        }));
        let missing = vec![Attribute::TargetPage, Attribute::Action];

        let result = clarify(&gateway, &missing, &FeatureRecord::new(), &[], 3, None).await;

        assert_eq!(result.path, StepPath::Gateway);
        assert_eq!(
            result.questions,
            vec![
                template_question(Attribute::TargetPage).to_string(),
                "What should clicking it do?".to_string(),
            ]
        );
        assert_eq!(result.search_hints, vec!["routes/".to_string()]);
    }

    #[tokio::test]
    async fn gateway_reply_without_usable_questions_falls_back() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "questions": [{"attribute": "colour", "question": "Blue?"}]
        }));

        let result = clarify(&gateway, &[Attribute::Action], &FeatureRecord::new(), &[], 3, None).await;

        assert_eq!(result.path, StepPath::Fallback);
        assert_eq!(result.questions, vec![template_question(Attribute::Action).to_string()]);
    }
}
