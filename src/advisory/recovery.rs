//! Recover an [`AdvisoryResult`] from free-form generated text.
//!
//! Strategies run in order and the first one that yields a JSON *object*
//! wins:
//!
//! 1. the whole text
//! 2. a fenced block tagged `json`
//! 3. any fenced block
//! 4. a balanced `{...}` span, scanning left to right, string-literal aware
//! 5. the greedy slice from the first `{` to the last `}`
//!
//! When every strategy fails the degraded record is returned. Recovery
//! never fails.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::types::AdvisoryResult;

/// Which strategy produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    TaggedFence,
    AnyFence,
    BalancedBraces,
    GreedyBraces,
}

/// Recover an advisory record, degrading to
/// [`AdvisoryResult::parse_failed`] when nothing parses.
pub fn recover(text: &str) -> AdvisoryResult {
    match recover_object(text) {
        Some((strategy, object)) => {
            debug!(?strategy, "advisory recovered");
            AdvisoryResult::from_object(&object)
        }
        None => {
            let preview: String = text.chars().take(120).collect();
            warn!(preview = %preview, "advisory text could not be parsed; returning degraded record");
            AdvisoryResult::parse_failed()
        }
    }
}

/// The first JSON object found by the strategy chain.
pub fn recover_object(text: &str) -> Option<(Strategy, Map<String, Value>)> {
    if let Some(obj) = parse_object(text) {
        return Some((Strategy::Direct, obj));
    }
    if let Some(obj) = tagged_fences(text).find_map(parse_object) {
        return Some((Strategy::TaggedFence, obj));
    }
    if let Some(obj) = any_fences(text).find_map(parse_object) {
        return Some((Strategy::AnyFence, obj));
    }
    if let Some(obj) = balanced_spans(text).find_map(parse_object) {
        return Some((Strategy::BalancedBraces, obj));
    }
    greedy_span(text)
        .and_then(parse_object)
        .map(|obj| (Strategy::GreedyBraces, obj))
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    serde_json::from_str::<Map<String, Value>>(candidate.trim()).ok()
}

// ============================================================================
// Fenced blocks
// ============================================================================

fn tagged_fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```[ \t]*json[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

fn any_fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(.*?)```").ok()).as_ref()
}

fn tagged_fences(text: &str) -> impl Iterator<Item = &str> {
    tagged_fence_re()
        .into_iter()
        .flat_map(move |re| re.captures_iter(text))
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
}

/// Interiors of every fenced block, with a leading info-string line
/// (`python`, `text`, ...) dropped.
fn any_fences(text: &str) -> impl Iterator<Item = &str> {
    any_fence_re()
        .into_iter()
        .flat_map(move |re| re.captures_iter(text))
        .filter_map(|c| c.get(1).map(|m| strip_info_string(m.as_str())))
}

fn strip_info_string(interior: &str) -> &str {
    match interior.split_once('\n') {
        Some((first, rest))
            if !first.trim().is_empty()
                && first.trim().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            rest
        }
        _ => interior,
    }
}

// ============================================================================
// Brace spans
// ============================================================================

/// Total bytes the span scan may examine, as a multiple of the text length.
const SCAN_BUDGET_FACTOR: usize = 4;

/// Every balanced `{...}` span, one per opening brace, left to right.
///
/// Each opening brace rescans the rest of the text, so the scan stops once
/// the byte budget is spent; a run of unclosed braces stays linear.
fn balanced_spans(text: &str) -> impl Iterator<Item = &str> {
    let mut budget = text.len().saturating_mul(SCAN_BUDGET_FACTOR);
    text.match_indices('{')
        .map_while(move |(start, _)| {
            if budget == 0 {
                return None;
            }
            let rest = &text[start..];
            let end = balanced_end(rest);
            budget = budget.saturating_sub(end.unwrap_or(rest.len()));
            Some(end.map(|len| &rest[..len]))
        })
        .flatten()
}

/// Byte length of the balanced span starting at `s[0] == '{'`, if it closes.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn greedy_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
