//! Wiki-link parser.
//!
//! # Responsibility
//! - Extract `[[Target]]` and `[[Target|Alias]]` tokens in document order.
//! - Skip malformed spans (unterminated, nested, stray brackets, empty
//!   targets) and keep scanning.
//!
//! # Invariants
//! - Pure and deterministic: identical input yields identical tokens.
//! - Never panics on any input; spans always fall on char boundaries.
//! - A backslash escapes the next character (`\[[`, `\|`, `\]`).

use crate::model::link::LinkToken;
use crate::model::note::NoteId;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Unterminated,
    Nested,
    StrayBracket,
    EmptyTarget,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Unterminated => "unterminated",
            Self::Nested => "nested",
            Self::StrayBracket => "stray_bracket",
            Self::EmptyTarget => "empty_target",
        }
    }
}

enum Scan {
    Link { inner_end: usize, end: usize },
    Skip(SkipReason),
}

/// Parses every wiki-link token in `body`.
pub fn parse_links(source: &NoteId, body: &str) -> Vec<LinkToken> {
    let bytes = body.as_bytes();
    let mut tokens = Vec::new();
    let mut cursor = 0;

    while let Some(open) = find_open(bytes, cursor) {
        match scan_link(bytes, open) {
            Scan::Link { inner_end, end } => {
                match split_target_alias(&body[open + 2..inner_end]) {
                    Some((raw_target, alias)) => tokens.push(LinkToken {
                        source_note_id: source.clone(),
                        raw_target,
                        alias,
                        span_start: open,
                        span_end: end,
                    }),
                    None => log_skip(source, SkipReason::EmptyTarget, open),
                }
                cursor = end;
            }
            Scan::Skip(reason) => {
                log_skip(source, reason, open);
                // Retry one byte later so `[[[Target]]]` and the inner link of
                // a nested pair are still found.
                cursor = open + 1;
            }
        }
    }

    tokens
}

/// Case-insensitive, whitespace-trimmed form used for title matching.
pub fn normalize_title(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Returns the link span with up to `radius` characters on each side,
/// whitespace collapsed, and `...` where the body was cut.
pub fn link_context(body: &str, span_start: usize, span_end: usize, radius: usize) -> String {
    let (Some(head), Some(link), Some(tail)) = (
        body.get(..span_start),
        body.get(span_start..span_end),
        body.get(span_end..),
    ) else {
        return String::new();
    };

    let (before, cut_before) = last_chars(head, radius);
    let (after, cut_after) = first_chars(tail, radius);

    let mut context = String::new();
    if cut_before {
        context.push_str("...");
    }
    context.push_str(before);
    context.push_str(link);
    context.push_str(after);
    if cut_after {
        context.push_str("...");
    }
    WHITESPACE_RE.replace_all(&context, " ").trim().to_string()
}

fn find_open(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'[' if bytes[i + 1] == b'[' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn scan_link(bytes: &[u8], open: usize) -> Scan {
    let mut i = open + 2;
    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return Scan::Skip(SkipReason::Unterminated),
            b'[' if next == Some(b'[') => return Scan::Skip(SkipReason::Nested),
            b'[' => return Scan::Skip(SkipReason::StrayBracket),
            b']' if next == Some(b']') => {
                return Scan::Link {
                    inner_end: i,
                    end: i + 2,
                }
            }
            b']' => return Scan::Skip(SkipReason::StrayBracket),
            _ => i += 1,
        }
    }
    Scan::Skip(SkipReason::Unterminated)
}

fn split_target_alias(inner: &str) -> Option<(String, String)> {
    let (target, alias) = match find_unescaped_pipe(inner.as_bytes()) {
        Some(pipe) => (&inner[..pipe], Some(&inner[pipe + 1..])),
        None => (inner, None),
    };

    let raw_target = unescape(target).trim().to_string();
    if raw_target.is_empty() {
        return None;
    }

    let alias = alias
        .map(|value| unescape(value).trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| raw_target.clone());
    Some((raw_target, alias))
}

fn find_unescaped_pipe(bytes: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'|' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn last_chars(value: &str, count: usize) -> (&str, bool) {
    if count == 0 {
        return ("", !value.is_empty());
    }
    match value.char_indices().rev().nth(count - 1) {
        Some((idx, _)) => (&value[idx..], idx > 0),
        None => (value, false),
    }
}

fn first_chars(value: &str, count: usize) -> (&str, bool) {
    match value.char_indices().nth(count) {
        Some((idx, _)) => (&value[..idx], true),
        None => (value, false),
    }
}

fn log_skip(source: &NoteId, reason: SkipReason, offset: usize) {
    debug!(
        "event=link_parse_skip module=parser status=skip note_id={} reason={} offset={}",
        source,
        reason.as_str(),
        offset
    );
}
