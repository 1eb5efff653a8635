//! Field resolvers used by the handoff builders and the completion detectors.
//!
//! Every field follows the same precedence: a structured artifact of the expected
//! type wins; only when none exists is the concept extracted from the raw
//! conversation. The exact rules per field:
//!
//! | field | structured | extracted from conversation |
//! |---|---|---|
//! | problem | text of the last non-empty `ProblemStatement` | first line prefixed `Problem:`, else the first non-empty user turn |
//! | requirements | items of every `Requirements` artifact, in order | lines prefixed `Requirement:`, else bullet lines (`- `, `* `) |
//! | execution plan | steps of the last non-empty `ExecutionPlan`, sorted by `order` | numbered lines (`1.`, `1)`) of the latest turn that has any, renumbered from 1 |
//! | entities | names of every `Entities` artifact, in order | lines prefixed `Entity:`, else backtick-quoted terms |
//! | target audience | last `TargetAudience` | first line prefixed `Audience:` |
//! | success metrics | items of every `SuccessMetrics` artifact | lines prefixed `Metric:` |
//!
//! Prefixes match case-insensitively. List fields are trimmed, empty entries are
//! dropped and duplicates are removed keeping the first occurrence.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::artifacts::{Artifact, PhaseArtifacts, PlanStep, Speaker};

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s+(.+?)\s*$").expect("numbered line pattern"));
static BACKTICK_TERM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("backtick term pattern"));

/// Where a handoff field's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Structured,
    Extracted,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: FieldSource,
}

impl<T> Resolved<T> {
    fn structured(value: T) -> Self {
        Self {
            value,
            source: FieldSource::Structured,
        }
    }

    fn extracted(value: T) -> Self {
        Self {
            value,
            source: FieldSource::Extracted,
        }
    }

    fn absent(value: T) -> Self {
        Self {
            value,
            source: FieldSource::Absent,
        }
    }
}

pub fn resolve_problem(artifacts: &PhaseArtifacts) -> Resolved<Option<String>> {
    let structured = artifacts.structured.iter().rev().find_map(|artifact| match artifact {
        Artifact::ProblemStatement { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    });
    if let Some(problem) = structured {
        return Resolved::structured(Some(problem));
    }

    if let Some(problem) = prefixed_lines(artifacts, "problem:").into_iter().next() {
        return Resolved::extracted(Some(problem));
    }

    let first_user_turn = artifacts
        .conversation
        .iter()
        .filter(|turn| turn.speaker == Speaker::User)
        .map(|turn| turn.text.trim())
        .find(|text| !text.is_empty());
    match first_user_turn {
        Some(text) => Resolved::extracted(Some(text.to_string())),
        None => Resolved::absent(None),
    }
}

pub fn resolve_requirements(artifacts: &PhaseArtifacts) -> Resolved<Vec<String>> {
    let structured = dedup(artifacts.structured.iter().flat_map(|artifact| match artifact {
        Artifact::Requirements { items } => items.clone(),
        _ => Vec::new(),
    }));
    if !structured.is_empty() {
        return Resolved::structured(structured);
    }

    let prefixed = prefixed_lines(artifacts, "requirement:");
    if !prefixed.is_empty() {
        return Resolved::extracted(prefixed);
    }

    let bullets = dedup(conversation_lines(artifacts).filter_map(|line| {
        line.strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .map(str::to_string)
    }));
    if bullets.is_empty() {
        Resolved::absent(bullets)
    } else {
        Resolved::extracted(bullets)
    }
}

pub fn resolve_execution_plan(artifacts: &PhaseArtifacts) -> Resolved<Vec<PlanStep>> {
    let structured = artifacts.structured.iter().rev().find_map(|artifact| match artifact {
        Artifact::ExecutionPlan { steps } if !steps.is_empty() => Some(steps.clone()),
        _ => None,
    });
    if let Some(mut steps) = structured {
        steps.sort_by_key(|step| step.order);
        return Resolved::structured(steps);
    }

    let latest = artifacts.conversation.iter().rev().find_map(|turn| {
        let titles: Vec<String> = turn
            .text
            .lines()
            .filter_map(|line| NUMBERED_LINE.captures(line))
            .map(|captures| captures[1].to_string())
            .collect();
        (!titles.is_empty()).then_some(titles)
    });
    match latest {
        Some(titles) => Resolved::extracted(
            titles
                .into_iter()
                .enumerate()
                .map(|(index, title)| PlanStep::new(index as u32 + 1, title))
                .collect(),
        ),
        None => Resolved::absent(Vec::new()),
    }
}

pub fn resolve_entities(artifacts: &PhaseArtifacts) -> Resolved<Vec<String>> {
    let structured = dedup(artifacts.structured.iter().flat_map(|artifact| match artifact {
        Artifact::Entities { names } => names.clone(),
        _ => Vec::new(),
    }));
    if !structured.is_empty() {
        return Resolved::structured(structured);
    }

    let prefixed = prefixed_lines(artifacts, "entity:");
    if !prefixed.is_empty() {
        return Resolved::extracted(prefixed);
    }

    let quoted = dedup(artifacts.conversation.iter().flat_map(|turn| {
        BACKTICK_TERM
            .captures_iter(&turn.text)
            .map(|captures| captures[1].to_string())
            .collect::<Vec<_>>()
    }));
    if quoted.is_empty() {
        Resolved::absent(quoted)
    } else {
        Resolved::extracted(quoted)
    }
}

pub fn resolve_target_audience(artifacts: &PhaseArtifacts) -> Resolved<Option<String>> {
    let structured = artifacts.structured.iter().rev().find_map(|artifact| match artifact {
        Artifact::TargetAudience { description } if !description.trim().is_empty() => {
            Some(description.trim().to_string())
        }
        _ => None,
    });
    if let Some(audience) = structured {
        return Resolved::structured(Some(audience));
    }
    match prefixed_lines(artifacts, "audience:").into_iter().next() {
        Some(audience) => Resolved::extracted(Some(audience)),
        None => Resolved::absent(None),
    }
}

pub fn resolve_success_metrics(artifacts: &PhaseArtifacts) -> Resolved<Vec<String>> {
    let structured = dedup(artifacts.structured.iter().flat_map(|artifact| match artifact {
        Artifact::SuccessMetrics { items } => items.clone(),
        _ => Vec::new(),
    }));
    if !structured.is_empty() {
        return Resolved::structured(structured);
    }
    let prefixed = prefixed_lines(artifacts, "metric:");
    if prefixed.is_empty() {
        Resolved::absent(prefixed)
    } else {
        Resolved::extracted(prefixed)
    }
}

fn conversation_lines(artifacts: &PhaseArtifacts) -> impl Iterator<Item = &str> {
    artifacts
        .conversation
        .iter()
        .flat_map(|turn| turn.text.lines())
        .map(str::trim)
}

/// Remainders of every conversation line starting with `prefix` (lowercase, ASCII)
fn prefixed_lines(artifacts: &PhaseArtifacts, prefix: &str) -> Vec<String> {
    dedup(conversation_lines(artifacts).filter_map(|line| {
        let head = line.get(..prefix.len())?;
        if head.eq_ignore_ascii_case(prefix) {
            Some(line[prefix.len()..].to_string())
        } else {
            None
        }
    }))
}

fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !seen.iter().any(|existing: &String| existing == item) {
            seen.push(item.to_string());
        }
    }
    seen
}
