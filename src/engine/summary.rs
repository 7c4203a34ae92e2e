//! Human-readable markdown returned with each turn.

use crate::models::{Attribute, DecisionOutcome, FeatureRecord, Ticket, TicketKind, TurnResponse};

use super::tickets::UNSPECIFIED;

/// Subtask points that still fit in the current sprint.
pub const CURRENT_SPRINT_POINTS: u32 = 13;

/// Summary for a completed session.
pub fn ticket_summary(record: &FeatureRecord, tickets: &[Ticket], outcome: &DecisionOutcome) -> String {
    let subtask_points = subtask_points(tickets);
    let sprint = recommended_sprint(subtask_points);

    let mut out = String::from("# Feature Analysis Complete\n\n");
    out.push_str(&format!("**Feature:** {}\n", feature_line(record)));
    out.push_str(&format!("**Total Tickets:** {}\n", tickets.len()));
    out.push_str(&format!("**Estimated Effort:** {} story points\n", subtask_points));
    out.push_str(&format!("**Recommended Sprint:** {}\n", sprint));

    if let DecisionOutcome::Sufficient { forced: true, rationale } = outcome {
        out.push_str(&format!("\n> {}\n", rationale));
    }

    out.push_str("\n## Tickets\n\n");
    for ticket in tickets {
        let indent = match ticket.kind {
            TicketKind::Parent => "",
            TicketKind::Subtask => "  ",
        };
        out.push_str(&format!(
            "{}- **{}** ({}, {} pts, {})\n",
            indent,
            ticket.title,
            ticket.estimate.size.as_str(),
            ticket.estimate.points,
            ticket.priority.as_str()
        ));
    }

    out
}

/// Summary for a turn that ends with questions.
pub fn clarification_summary(record: &FeatureRecord, questions: &[String]) -> String {
    let mut out = String::from("I need a bit more detail before writing tickets.\n\n");

    if !record.is_empty() {
        out.push_str("**So far:**\n");
        for (attribute, value) in record.iter() {
            out.push_str(&format!("- {}: {}\n", attribute.label(), value));
        }
        out.push('\n');
    }

    for (i, question) in questions.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, question));
    }
    out
}

/// Requirements view of a turn: what was understood and what it breaks into.
pub fn requirements_report(response: &TurnResponse) -> String {
    if !response.complete {
        return clarification_report(
            "# Feature Requirements Analysis",
            "a complete requirements analysis",
            response,
        );
    }

    let mut out = String::from("# Feature Requirements Analysis Complete\n\n");

    out.push_str("## Requirements Breakdown\n\n");
    for (i, ticket) in response.tickets.iter().enumerate() {
        let area = match ticket.component {
            Some(component) => format!("{} subtask", component),
            None => ticket.kind.as_str().to_string(),
        };
        out.push_str(&format!("{}. **{}** ({})\n", i + 1, ticket.title, area));
    }

    out.push_str("\n## Technical Analysis\n\n");
    push_attributes(&mut out, &response.record);

    out.push_str("\n## Files To Modify\n\n");
    let mut files: Vec<&str> = Vec::new();
    for file in response.tickets.iter().flat_map(|t| &t.files_to_modify) {
        if !files.contains(&file.as_str()) {
            files.push(file);
        }
    }
    if files.is_empty() {
        out.push_str("- None identified\n");
    }
    for file in files {
        out.push_str(&format!("- `{}`\n", file));
    }

    let points = subtask_points(&response.tickets);
    out.push_str("\n## Implementation Overview\n\n");
    out.push_str(&format!("- Total tickets: {}\n", response.tickets.len()));
    out.push_str(&format!("- Estimated effort: {} story points\n", points));
    out.push_str(&format!("- Recommended sprint: {}\n", recommended_sprint(points)));
    out
}

/// Planning view of a turn: every task with its estimate, priority and
/// dependencies, plus the critical path.
pub fn implementation_plan(response: &TurnResponse) -> String {
    if !response.complete {
        return clarification_report(
            "# Implementation Planning",
            "a detailed implementation plan",
            response,
        );
    }

    let mut out = String::from("# Implementation Plan\n\n");
    out.push_str("## Project Overview\n\n");
    out.push_str(&format!("Implement {}.\n", feature_line(&response.record)));

    out.push_str("\n## Implementation Tasks\n\n");
    for (i, ticket) in response.tickets.iter().enumerate() {
        out.push_str(&format!("{}. **{}**\n", i + 1, ticket.title));
        if !ticket.description.is_empty() {
            out.push_str(&format!("   - Description: {}\n", ticket.description));
        }
        out.push_str(&format!(
            "   - Estimate: {} ({} points)\n",
            ticket.estimate.size.as_str(),
            ticket.estimate.points
        ));
        out.push_str(&format!("   - Priority: {}\n", ticket.priority.as_str()));
        if !ticket.depends_on.is_empty() {
            out.push_str(&format!("   - Dependencies: {}\n", ticket.depends_on.join(", ")));
        }
        if !ticket.files_to_modify.is_empty() {
            out.push_str(&format!("   - Files: {}\n", ticket.files_to_modify.join(", ")));
        }
    }

    let points = subtask_points(&response.tickets);
    let (path, path_points) = critical_path(&response.tickets);
    out.push_str("\n## Timeline Estimate\n\n");
    out.push_str(&format!("- Total effort: {} story points\n", points));
    out.push_str(&format!("- Recommended sprint: {}\n", recommended_sprint(points)));
    if !path.is_empty() {
        let titles: Vec<&str> = path.iter().map(|t| t.title.as_str()).collect();
        out.push_str(&format!(
            "- Critical path: {} ({} points)\n",
            titles.join(" → "),
            path_points
        ));
    }
    out
}

/// The most expensive chain of subtasks through `depends_on`, in the order
/// the work would happen, with its total points.
///
/// Dependencies on the parent or on unknown titles are ignored; a cycle stops
/// the walk instead of looping.
pub fn critical_path(tickets: &[Ticket]) -> (Vec<&Ticket>, u32) {
    let subtasks: Vec<&Ticket> = tickets
        .iter()
        .filter(|t| t.kind == TicketKind::Subtask)
        .collect();

    let mut memo: Vec<Option<(u32, Option<usize>)>> = vec![None; subtasks.len()];
    let mut visiting = vec![false; subtasks.len()];
    let mut end: Option<(u32, usize)> = None;
    for i in 0..subtasks.len() {
        let cost = chain_cost(i, &subtasks, &mut memo, &mut visiting);
        if end.map_or(true, |(best, _)| cost > best) {
            end = Some((cost, i));
        }
    }

    let Some((total, last)) = end else {
        return (Vec::new(), 0);
    };

    let mut path = vec![last];
    let mut cursor = memo[last].and_then(|(_, prev)| prev);
    while let Some(i) = cursor {
        if path.contains(&i) {
            break;
        }
        path.push(i);
        cursor = memo[i].and_then(|(_, prev)| prev);
    }
    path.reverse();
    (path.into_iter().map(|i| subtasks[i]).collect(), total)
}

fn chain_cost(
    i: usize,
    subtasks: &[&Ticket],
    memo: &mut [Option<(u32, Option<usize>)>],
    visiting: &mut [bool],
) -> u32 {
    if let Some((cost, _)) = memo[i] {
        return cost;
    }
    if visiting[i] {
        return 0;
    }
    visiting[i] = true;

    let mut best: Option<(u32, usize)> = None;
    for dep in &subtasks[i].depends_on {
        let Some(j) = subtasks.iter().position(|t| &t.title == dep) else {
            continue;
        };
        let cost = chain_cost(j, subtasks, memo, visiting);
        if best.map_or(true, |(b, _)| cost > b) {
            best = Some((cost, j));
        }
    }

    visiting[i] = false;
    let cost = u32::from(subtasks[i].estimate.points) + best.map_or(0, |(c, _)| c);
    memo[i] = Some((cost, best.map(|(_, j)| j)));
    cost
}

fn clarification_report(heading: &str, goal: &str, response: &TurnResponse) -> String {
    let mut out = format!("{}\n\n", heading);
    out.push_str(&format!("I need some clarification to provide {}.\n\n", goal));

    out.push_str("## Questions\n\n");
    for (i, question) in response.questions.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, question));
    }

    if !response.search_hints.is_empty() {
        out.push_str("\n## Codebase Searches\n\n");
        for (i, hint) in response.search_hints.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, hint));
        }
    }

    if !response.record.is_empty() {
        out.push_str("\n## Understood So Far\n\n");
        push_attributes(&mut out, &response.record);
    }
    out
}

fn push_attributes(out: &mut String, record: &FeatureRecord) {
    for attribute in Attribute::ALL {
        out.push_str(&format!(
            "- {}: {}\n",
            attribute.label(),
            record.get(attribute).unwrap_or("not specified")
        ));
    }
}

fn subtask_points(tickets: &[Ticket]) -> u32 {
    tickets
        .iter()
        .filter(|t| t.kind == TicketKind::Subtask)
        .map(|t| u32::from(t.estimate.points))
        .sum()
}

fn recommended_sprint(points: u32) -> &'static str {
    if points <= CURRENT_SPRINT_POINTS {
        "Current Sprint"
    } else {
        "Next Sprint"
    }
}

fn feature_line(record: &FeatureRecord) -> String {
    let value = |a: Attribute| record.get(a).unwrap_or(UNSPECIFIED);
    format!(
        "{} on {} page ({})",
        value(Attribute::FeatureType),
        value(Attribute::TargetPage),
        value(Attribute::Action)
    )
}
