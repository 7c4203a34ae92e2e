//! Sufficiency step: is enough known to synthesize tickets?

use serde::Deserialize;

use crate::gateway::{complete_structured, Gateway, GatewayError, Prompt};
use crate::models::{Attribute, ConversationTurn, DecisionOutcome, FeatureRecord, StepPath};

const SYSTEM_PROMPT: &str = r#"You review feature requests before they are broken into tickets.

Every attribute below has a value. Decide whether each value is specific enough
for an engineer to start work. Reply with:
{"sufficient": true|false, "vague": ["<attribute>", ...], "rationale": "<one sentence>"}
where "vague" lists attribute names (target_page, feature_type, action) that need
a more specific answer."#;

/// How many recent turns are shown to the gateway.
const HISTORY_WINDOW: usize = 6;

/// Result of the sufficiency step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub outcome: DecisionOutcome,
    /// `Gateway` when the semantic check produced the verdict.
    pub path: StepPath,
}

#[derive(Debug, Deserialize)]
struct SemanticReply {
    sufficient: bool,
    #[serde(default)]
    vague: Vec<String>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Rule-based verdict.
///
/// Sufficient once every required attribute is set, or once `rounds`
/// clarification rounds have reached `max_rounds` so the conversation is
/// guaranteed to end.
pub fn evaluate(record: &FeatureRecord, rounds: usize, max_rounds: usize) -> DecisionOutcome {
    let missing = record.missing();

    if missing.is_empty() {
        return DecisionOutcome::Sufficient {
            rationale: "All required attributes are known.".to_string(),
            forced: false,
        };
    }

    if rounds >= max_rounds {
        return DecisionOutcome::Sufficient {
            rationale: format!(
                "Clarification limit of {} rounds reached; proceeding without {}.",
                max_rounds,
                join_labels(&missing)
            ),
            forced: true,
        };
    }

    DecisionOutcome::Insufficient {
        rationale: format!("Still missing {}.", join_labels(&missing)),
        missing,
    }
}

/// Runs the sufficiency step.
///
/// The rule decides first. When the rule says sufficient and clarification
/// rounds remain, the gateway may flag attribute values as too vague; any
/// gateway failure keeps the rule's verdict.
pub async fn assess(
    gateway: &dyn Gateway,
    record: &FeatureRecord,
    history: &[ConversationTurn],
    rounds: usize,
    max_rounds: usize,
) -> Assessment {
    let outcome = evaluate(record, rounds, max_rounds);

    let semantic_check_applies =
        matches!(outcome, DecisionOutcome::Sufficient { forced: false, .. }) && rounds < max_rounds;
    if !semantic_check_applies {
        return Assessment {
            outcome,
            path: StepPath::Fallback,
        };
    }

    let prompt = semantic_prompt(record, history);
    match complete_structured::<SemanticReply>(gateway, &prompt)
        .await
        .and_then(interpret_reply)
    {
        Ok(verdict) => Assessment {
            outcome: verdict,
            path: StepPath::Gateway,
        },
        Err(e) => {
            tracing::warn!(reason = %e, "Semantic sufficiency check failed, keeping rule-based verdict");
            Assessment {
                outcome,
                path: StepPath::Fallback,
            }
        }
    }
}

fn interpret_reply(reply: SemanticReply) -> Result<DecisionOutcome, GatewayError> {
    let rationale = reply
        .rationale
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Reviewed by the text-generation backend.".to_string());

    if reply.sufficient {
        return Ok(DecisionOutcome::Sufficient {
            rationale,
            forced: false,
        });
    }

    let mut vague: Vec<Attribute> = reply
        .vague
        .iter()
        .filter_map(|name| name.parse().ok())
        .collect();
    vague.sort();
    vague.dedup();

    if vague.is_empty() {
        return Err(GatewayError::Malformed(
            "insufficient verdict names no known attribute".into(),
        ));
    }

    Ok(DecisionOutcome::Insufficient {
        missing: vague,
        rationale,
    })
}

fn semantic_prompt(record: &FeatureRecord, history: &[ConversationTurn]) -> Prompt {
    let mut user = String::from("Attributes:\n");
    for (attribute, value) in record.iter() {
        user.push_str(&format!("- {}: {}\n", attribute, value));
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    if start < history.len() {
        user.push_str("\nRecent conversation:\n");
        for turn in &history[start..] {
            user.push_str(&format!("{}: {}\n", turn.role().as_str(), turn.text()));
        }
    }

    Prompt::new(SYSTEM_PROMPT, user)
}

pub(crate) fn join_labels(attributes: &[Attribute]) -> String {
    attributes
        .iter()
        .map(|a| a.label())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use serde_json::json;

    fn complete_record() -> FeatureRecord {
        FeatureRecord::new()
            .with(Attribute::TargetPage, "dashboard")
            .with(Attribute::FeatureType, "button")
            .with(Attribute::Action, "save")
    }

    #[test]
    fn complete_record_is_sufficient() {
        let outcome = evaluate(&complete_record(), 0, 3);
        assert!(matches!(outcome, DecisionOutcome::Sufficient { forced: false, .. }));
    }

    #[test]
    fn missing_attributes_are_listed_in_priority_order() {
        let record = FeatureRecord::new().with(Attribute::FeatureType, "button");
        match evaluate(&record, 0, 3) {
            DecisionOutcome::Insufficient { missing, rationale } => {
                assert_eq!(missing, vec![Attribute::TargetPage, Attribute::Action]);
                assert!(rationale.contains("target page"));
            }
            other => panic!("expected Insufficient, got {:?}", other),
        }
    }

    #[test]
    fn round_limit_forces_sufficiency() {
        let outcome = evaluate(&FeatureRecord::new(), 3, 3);
        assert!(matches!(outcome, DecisionOutcome::Sufficient { forced: true, .. }));
    }

    #[tokio::test]
    async fn gateway_failure_keeps_rule_verdict() {
        let gateway = ScriptedGateway::failing();
        let assessment = assess(&gateway, &complete_record(), &[], 0, 3).await;
        assert!(assessment.outcome.is_sufficient());
        assert_eq!(assessment.path, StepPath::Fallback);
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn gateway_can_flag_vague_attributes() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "sufficient": false,
            "vague": ["action", "target_page", "action"],
            "rationale": "Which data does 'save' persist?"
        }));

        let assessment = assess(&gateway, &complete_record(), &[], 0, 3).await;

        assert_eq!(assessment.path, StepPath::Gateway);
        assert_eq!(
            assessment.outcome,
            DecisionOutcome::Insufficient {
                missing: vec![Attribute::TargetPage, Attribute::Action],
                rationale: "Which data does 'save' persist?".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn insufficient_without_known_attributes_is_ignored() {
        let gateway = ScriptedGateway::new().then_json(json!({
            "sufficient": false,
            "vague": ["colour"]
        }));

        let assessment = assess(&gateway, &complete_record(), &[], 0, 3).await;

        assert!(assessment.outcome.is_sufficient());
        assert_eq!(assessment.path, StepPath::Fallback);
    }

    #[tokio::test]
    async fn gateway_is_not_consulted_when_attributes_are_missing() {
        let gateway = ScriptedGateway::failing();
        let assessment = assess(&gateway, &FeatureRecord::new(), &[], 0, 3).await;
        assert!(!assessment.outcome.is_sufficient());
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn gateway_is_not_consulted_once_rounds_are_spent() {
        let gateway = ScriptedGateway::failing();
        let assessment = assess(&gateway, &complete_record(), &[], 3, 3).await;
        assert!(assessment.outcome.is_sufficient());
        assert_eq!(gateway.call_count(), 0);
    }
}
