//! Domain models for ClaritaPM.
//!
//! # Core Concepts
//!
//! - [`FeatureRecord`]: The structured attributes known about a feature request.
//!   Keys come from the fixed [`Attribute`] set and accumulate across turns.
//! - [`Session`]: One conversation, owning its record, append-only history of
//!   [`ConversationTurn`]s, lifecycle [`SessionState`] and synthesized tickets.
//! - [`Ticket`]: A parent ticket or one of its subtasks, with estimate, priority
//!   and acceptance criteria.
//! - [`CodebaseAnalysis`]: Files a feature is expected to touch, by area.
//! - [`DecisionOutcome`]: Whether enough is known to synthesize tickets.
//! - [`TurnResponse`]: The payload returned to a collaborator after every turn.

mod codebase;
mod conversation;
mod outcome;
mod record;
mod session;
mod ticket;

pub use codebase::*;
pub use conversation::*;
pub use outcome::*;
pub use record::*;
pub use session::*;
pub use ticket::*;
