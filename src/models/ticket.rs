use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{Attribute, FeatureRecord};

/// A work-tracking ticket produced by ticket synthesis.
///
/// Every synthesis call yields exactly one [`TicketKind::Parent`] and a bounded
/// set of subtasks whose `parent` names that parent's title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub kind: TicketKind,
    /// Area of work for subtasks. Parents have none.
    pub component: Option<Component>,
    pub estimate: Estimate,
    pub priority: Priority,
    pub acceptance_criteria: Vec<String>,
    /// Title of the parent ticket, set on every subtask.
    pub parent: Option<String>,
    /// Titles of tickets that must land first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Files the work is expected to touch, when codebase analysis found any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_to_modify: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Parent,
    Subtask,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Subtask => "subtask",
        }
    }
}

/// The area of the codebase a subtask touches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Frontend,
    Backend,
    Styling,
    Testing,
    Documentation,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Styling => "styling",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// T-shirt size plus story points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Estimate {
    pub size: SizeEstimate,
    pub points: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SizeEstimate {
    #[serde(alias = "xs", alias = "XS")]
    ExtraSmall,
    #[serde(alias = "s", alias = "S")]
    Small,
    #[serde(alias = "m", alias = "M")]
    Medium,
    #[serde(alias = "l", alias = "L")]
    Large,
    #[serde(alias = "xl", alias = "XL")]
    ExtraLarge,
}

impl SizeEstimate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtraSmall => "XS",
            Self::Small => "S",
            Self::Medium => "M",
            Self::Large => "L",
            Self::ExtraLarge => "XL",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[serde(alias = "Low")]
    Low,
    #[serde(alias = "Medium")]
    Medium,
    #[serde(alias = "High")]
    High,
    #[serde(alias = "Critical")]
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Where a step's result came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepPath {
    Gateway,
    Fallback,
}

/// A record of one ticket created by the deterministic generator.
///
/// Kept on the session so it is possible to reconstruct, after the fact,
/// which attribute values produced which fallback ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub ticket_title: String,
    pub kind: TicketKind,
    pub component: Option<Component>,
    /// Attribute values used to build the ticket.
    pub attributes: Vec<(Attribute, String)>,
    pub source: StepPath,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl AuditEntry {
    pub fn fallback(ticket: &Ticket, record: &FeatureRecord) -> Self {
        Self {
            ticket_title: ticket.title.clone(),
            kind: ticket.kind,
            component: ticket.component,
            attributes: record.iter().map(|(a, v)| (a, v.to_string())).collect(),
            source: StepPath::Fallback,
            recorded_at: chrono::Utc::now(),
        }
    }
}
