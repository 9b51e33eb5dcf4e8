//! Recovery of JSON objects from free-form model output.
//!
//! Models asked for JSON often return something close to it: fenced in a
//! markdown block, with unquoted or single-quoted values. [`extract_object`]
//! locates the payload, runs it through an ordered list of [`Rule`]s that
//! coerce common deviations into strict JSON, and accepts the result only if
//! it parses to an object. It never fails loudly; every failure is `None`.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

/// Compiles one of the literal patterns below.
///
/// # Panics
///
/// Only if a literal pattern is invalid regex syntax. Every pattern is
/// forced by `test_static_patterns_compile`.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| unreachable!("invalid static pattern {pattern}: {e}"))
}

static JSON_BLOCK: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)```json\n(.*?)\n```"));
static OPEN_BRACE_WS: LazyLock<Regex> = LazyLock::new(|| compile(r"\{\s+"));
static CLOSE_BRACE_WS: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+\}"));
static KEY_COLON_SPACE: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"("[A-Za-z0-9_-]+")\s*: "#));
static SINGLE_QUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| compile(r#""([^"]+)"\s*:\s*'([^']*)'"#));
static BARE_WORD_VALUE: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"("[A-Za-z0-9_-]+")\s*:\s*([A-Za-z_]+)"#));
static MIXED_QUOTES: LazyLock<Regex> = LazyLock::new(|| compile(r#""'|'""#));

/// A single text-rewrite step of the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Drop the first whitespace run after `{` and the first before `}`.
    TrimBraces,
    /// `"key": value` with an unquoted value becomes `"key": "value"`.
    QuoteBareValues,
    /// `"key": 'value'` becomes `"key": "value"`.
    SingleToDoubleQuotes,
    /// `"key":word` becomes `"key": "word"`.
    QuoteBareWords,
    /// Each `"'` or `'"` pair becomes a single `"`.
    CollapseMixedQuotes,
}

impl Rule {
    /// All rules, in the order they are applied.
    pub const PIPELINE: [Self; 5] = [
        Self::TrimBraces,
        Self::QuoteBareValues,
        Self::SingleToDoubleQuotes,
        Self::QuoteBareWords,
        Self::CollapseMixedQuotes,
    ];

    /// Applies this rule to `input`.
    #[must_use]
    pub fn apply(self, input: &str) -> String {
        match self {
            Self::TrimBraces => trim_braces(input),
            Self::QuoteBareValues => quote_bare_values(input),
            Self::SingleToDoubleQuotes => SINGLE_QUOTED_VALUE
                .replace_all(input, r#""${1}": "${2}""#)
                .into_owned(),
            Self::QuoteBareWords => quote_bare_words(input),
            Self::CollapseMixedQuotes => MIXED_QUOTES.replace_all(input, "\"").into_owned(),
        }
    }
}

/// Extracts a JSON object from model output.
///
/// Returns `None` if no object can be recovered, including when the text
/// parses to an array or a scalar.
#[must_use]
pub fn extract_object(text: &str) -> Option<Map<String, Value>> {
    let normalized = normalize(locate_payload(text));
    match serde_json::from_str::<Value>(&normalized) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            debug!("extracted JSON is not an object");
            None
        }
        Err(e) => {
            debug!(error = %e, "could not parse text as JSON");
            None
        }
    }
}

/// Returns the inner content of the first ```` ```json ```` block, or the
/// whole text when there is none. Both are trimmed.
#[must_use]
pub fn locate_payload(text: &str) -> &str {
    JSON_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
        .trim()
}

/// Runs every [`Rule`] over `input` in pipeline order.
#[must_use]
pub fn normalize(input: &str) -> String {
    Rule::PIPELINE
        .iter()
        .fold(input.to_string(), |text, rule| rule.apply(&text))
}

fn trim_braces(input: &str) -> String {
    let opened = OPEN_BRACE_WS.replace(input, "{");
    CLOSE_BRACE_WS.replace(&opened, "}").trim().to_string()
}

/// Quotes values that follow `"key": ` and do not start with `"` or `[`.
///
/// The value extends lazily to the first `,` followed by optional whitespace
/// and a `"`, or to a `}` that ends the input. When the first non-blank value
/// character is a quote, the whitespace before it may itself become the
/// value, so `"k":  "v"` (two spaces) is mangled rather than left alone.
fn quote_bare_values(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = KEY_COLON_SPACE.captures_at(input, pos) {
        let (start, prefix_end, key) = prefix_bounds(&caps);
        match bare_value_span(input, prefix_end) {
            Some((value_start, value_end)) => {
                out.push_str(&input[copied..start]);
                out.push_str(key);
                out.push_str(": \"");
                out.push_str(&input[value_start..value_end]);
                out.push('"');
                copied = value_end;
                pos = value_end;
            }
            // Keys always start with an ASCII quote, so +1 is a char boundary.
            None => pos = start + 1,
        }
    }

    out.push_str(&input[copied..]);
    out
}

fn prefix_bounds<'h>(caps: &Captures<'h>) -> (usize, usize, &'h str) {
    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let key = caps.get(1).map_or("", |m| m.as_str());
    (whole.start, whole.end, key)
}

/// Finds the value span for [`quote_bare_values`], trying the longest
/// whitespace skip first and backing off one character at a time.
fn bare_value_span(input: &str, after_prefix: usize) -> Option<(usize, usize)> {
    let rest = &input[after_prefix..];
    let mut starts = vec![after_prefix];
    starts.extend(
        rest.char_indices()
            .take_while(|(_, c)| c.is_whitespace())
            .map(|(i, c)| after_prefix + i + c.len_utf8()),
    );

    starts.into_iter().rev().find_map(|value_start| {
        let first = input[value_start..].chars().next()?;
        if first == '"' || first == '[' {
            return None;
        }
        let search_from = value_start + first.len_utf8();
        value_end(input, search_from).map(|end| (value_start, end))
    })
}

fn value_end(input: &str, from: usize) -> Option<usize> {
    let tail = &input[from..];
    tail.char_indices()
        .map(|(i, _)| from + i)
        .chain(std::iter::once(input.len()))
        .find(|&end| ends_value(&input[end..]))
}

fn ends_value(rest: &str) -> bool {
    rest == "}"
        || rest
            .strip_prefix(',')
            .is_some_and(|after| after.trim_start().starts_with('"'))
}

/// Quotes a bare word (letters and underscores) after `"key":` unless the
/// word runs straight into a quote or another word character.
fn quote_bare_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = BARE_WORD_VALUE.captures_at(input, pos) {
        let (start, end, key) = prefix_bounds(&caps);
        let word = caps.get(2).map_or("", |m| m.as_str());
        let blocked = input[end..]
            .chars()
            .next()
            .is_some_and(|c| c == '"' || c == '_' || c.is_ascii_alphanumeric());
        if blocked {
            pos = start + 1;
            continue;
        }
        out.push_str(&input[copied..start]);
        out.push_str(key);
        out.push_str(": \"");
        out.push_str(word);
        out.push('"');
        copied = end;
        pos = end;
    }

    out.push_str(&input[copied..]);
    out
}
