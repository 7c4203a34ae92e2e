//! Extraction step: raw user text into [`FeatureRecord`] attributes.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::gateway::{complete_structured, Gateway, GatewayError, Prompt};
use crate::models::{normalize_value, Attribute, FeatureRecord, StepPath, MAX_VALUE_LEN};

const SYSTEM_PROMPT: &str = r#"You extract structured information from software feature requests.

Identify:
- target_page: which page or screen the feature belongs on
- feature_type: what kind of element it is (button, form, field, link, component, ...)
- action: what happens when it is used (save, refresh, submit, navigate, ...)

Use null for anything the message does not state. Attributes already known are
listed for context; only repeat one if the user is changing it, and in that
case also list its name in "corrections".

Examples:
Input: "Add a save button to the dashboard page"
Output: {"target_page": "dashboard", "feature_type": "button", "action": "save", "corrections": []}

Input: "Let's add a button to this page"
Output: {"target_page": null, "feature_type": "button", "action": null, "corrections": []}

Input (known target_page = "dashboard"): "Sorry, I meant the settings page"
Output: {"target_page": "settings", "feature_type": null, "action": null, "corrections": ["target_page"]}

Optionally include "confidence" between 0 and 1."#;

/// Filler words that never name a page.
const FILLER_WORDS: &[&str] = &["a", "an", "the", "this", "that", "some", "any", "my", "our"];

/// Ordered keyword tables: the first listed keyword found in the text wins,
/// and maps to its canonical value.
const TARGET_PAGE_KEYWORDS: &[(&str, &str)] = &[
    ("dashboard", "dashboard"),
    ("login", "login"),
    ("log in", "login"),
    ("sign in", "login"),
    ("signup", "signup"),
    ("sign up", "signup"),
    ("profile", "profile"),
    ("settings", "settings"),
    ("preferences", "settings"),
    ("admin", "admin"),
    ("checkout", "checkout"),
    ("cart", "cart"),
    ("billing", "billing"),
    ("account", "account"),
    ("contact", "contact"),
    ("about", "about"),
    ("homepage", "home"),
    ("home", "home"),
    ("landing", "home"),
];

const FEATURE_TYPE_KEYWORDS: &[(&str, &str)] = &[
    ("button", "button"),
    ("form", "form"),
    ("field", "field"),
    ("input", "field"),
    ("text box", "field"),
    ("link", "link"),
    ("dropdown", "dropdown"),
    ("drop down", "dropdown"),
    ("modal", "modal"),
    ("dialog", "modal"),
    ("popup", "modal"),
    ("table", "table"),
    ("chart", "chart"),
    ("graph", "chart"),
    ("toggle", "toggle"),
    ("switch", "toggle"),
    ("checkbox", "checkbox"),
    ("menu", "menu"),
    ("tab", "tab"),
    ("banner", "banner"),
    ("component", "component"),
];

const ACTION_KEYWORDS: &[(&str, &str)] = &[
    ("save", "save"),
    ("submit", "submit"),
    ("delete", "delete"),
    ("remove", "delete"),
    ("update", "update"),
    ("edit", "update"),
    ("upload", "upload"),
    ("refresh", "refresh"),
    ("reload", "refresh"),
    ("navigate", "navigate"),
    ("redirect", "navigate"),
    ("go to", "navigate"),
    ("export", "export"),
    ("download", "download"),
    ("share", "share"),
    ("filter", "filter"),
    ("sort", "sort"),
    ("search", "search"),
    ("log out", "logout"),
    ("logout", "logout"),
    ("cancel", "cancel"),
];

/// `to|on|in the <word> page`, tried before the target keyword table.
static PAGE_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:to|on|in|from)\s+the\s+([a-z0-9]+)\s+(?:page|screen|view)\b")
        .expect("page phrase pattern is valid")
});

/// Result of the extraction step.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Existing record merged with this turn's findings.
    pub record: FeatureRecord,
    /// Attributes overwritten by an explicit correction.
    pub corrected: Vec<Attribute>,
    /// Required attributes still missing after the merge.
    pub gaps: Vec<Attribute>,
    /// 0.0–1.0; the backend's own estimate, or the share of required
    /// attributes known when it gave none.
    pub confidence: f32,
    pub path: StepPath,
}

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    target_page: Option<String>,
    #[serde(default)]
    feature_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    corrections: Vec<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

impl ExtractionReply {
    /// Converts the reply into a record plus recognized corrections,
    /// rejecting values the record schema would not accept.
    fn into_findings(self) -> Result<(FeatureRecord, Vec<Attribute>, Option<f32>), GatewayError> {
        let mut found = FeatureRecord::new();
        for (attribute, value) in [
            (Attribute::TargetPage, self.target_page),
            (Attribute::FeatureType, self.feature_type),
            (Attribute::Action, self.action),
        ] {
            let Some(value) = value.as_deref().and_then(normalize_value) else {
                continue;
            };
            if value.chars().count() > MAX_VALUE_LEN || value.contains(char::is_control) {
                return Err(GatewayError::Malformed(format!(
                    "{} value is not a usable attribute",
                    attribute
                )));
            }
            found.set(attribute, &value);
        }

        // Unknown attribute names are ignored, not stored.
        let corrections = self
            .corrections
            .iter()
            .filter_map(|name| name.parse::<Attribute>().ok())
            .collect();

        Ok((found, corrections, self.confidence.map(|c| c.clamp(0.0, 1.0))))
    }
}

/// Runs the extraction step for one turn.
///
/// Tries the gateway first; on any failure falls back to [`match_patterns`].
/// The existing record is never modified, only merged into the result.
pub async fn extract(
    gateway: &dyn Gateway,
    text: &str,
    existing: &FeatureRecord,
    workspace_hint: Option<&str>,
) -> Extraction {
    let prompt = extraction_prompt(text, existing, workspace_hint);

    let attempt = complete_structured::<ExtractionReply>(gateway, &prompt)
        .await
        .and_then(ExtractionReply::into_findings);

    let (found, corrections, confidence, path) = match attempt {
        Ok((found, corrections, confidence)) => (found, corrections, confidence, StepPath::Gateway),
        Err(e) => {
            tracing::warn!(reason = %e, "Extraction gateway failed, using pattern matcher");
            (match_patterns(text), Vec::new(), None, StepPath::Fallback)
        }
    };

    let (record, corrected) = merge(existing, &found, &corrections);
    let gaps = record.missing();
    let confidence = confidence.unwrap_or_else(|| {
        let required = Attribute::REQUIRED.len() as f32;
        (required - gaps.len() as f32) / required
    });

    tracing::debug!(?path, ?gaps, ?corrected, "Extraction finished");

    Extraction {
        record,
        corrected,
        gaps,
        confidence,
        path,
    }
}

/// Merges newly found attributes into an existing record.
///
/// New values only fill unset attributes; a set attribute changes only when
/// it is listed in `corrections` and the value actually differs. Returns the
/// merged record and the attributes that were corrected.
pub fn merge(
    existing: &FeatureRecord,
    found: &FeatureRecord,
    corrections: &[Attribute],
) -> (FeatureRecord, Vec<Attribute>) {
    let mut merged = existing.clone();
    let mut corrected = Vec::new();

    for (attribute, value) in found.iter() {
        match existing.get(attribute) {
            None => {
                merged.set(attribute, value);
            }
            Some(old) if old != value && corrections.contains(&attribute) => {
                tracing::info!(%attribute, from = old, to = value, "Attribute corrected");
                merged.set(attribute, value);
                corrected.push(attribute);
            }
            Some(_) => {}
        }
    }

    (merged, corrected)
}

/// Deterministic pattern matcher used when the gateway is unavailable.
///
/// Scans the text case-insensitively with fixed, ordered keyword rules per
/// attribute. The target page also accepts "on the <word> page" phrasing.
pub fn match_patterns(text: &str) -> FeatureRecord {
    let lowered = text.to_lowercase();
    let haystack = tokenize(&lowered);
    let mut record = FeatureRecord::new();

    if let Some(page) = page_from_phrase(&lowered).or_else(|| first_keyword(&haystack, TARGET_PAGE_KEYWORDS)) {
        record.set(Attribute::TargetPage, page);
    }
    if let Some(kind) = first_keyword(&haystack, FEATURE_TYPE_KEYWORDS) {
        record.set(Attribute::FeatureType, kind);
    }
    if let Some(action) = first_keyword(&haystack, ACTION_KEYWORDS) {
        record.set(Attribute::Action, action);
    }

    tracing::debug!(?record, "Pattern matcher result");
    record
}

/// Lowercase words separated by single spaces and padded at both ends, so
/// that `" save "` only matches the whole word.
fn tokenize(lowered: &str) -> String {
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}

fn first_keyword<'a>(haystack: &str, table: &'a [(&'a str, &'a str)]) -> Option<&'a str> {
    table
        .iter()
        .find(|(keyword, _)| haystack.contains(&format!(" {} ", keyword)))
        .map(|(_, canonical)| *canonical)
}

fn page_from_phrase(lowered: &str) -> Option<&str> {
    PAGE_PHRASE
        .captures_iter(lowered)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|word| !FILLER_WORDS.contains(word))
}

fn extraction_prompt(text: &str, existing: &FeatureRecord, workspace_hint: Option<&str>) -> Prompt {
    let known = serde_json::to_string(existing).unwrap_or_else(|_| "{}".to_string());
    let mut user = format!("Known attributes: {}\n", known);
    if let Some(hint) = workspace_hint {
        user.push_str(&format!("Workspace: {}\n", hint));
    }
    user.push_str(&format!("Message: \"{}\"", text));
    Prompt::new(SYSTEM_PROMPT, user)
}
