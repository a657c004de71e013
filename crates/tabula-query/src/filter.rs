//! Free-text filter parsing
//!
//! Each column filter box accepts one free-text token. Parsing is
//! type-aware: numeric columns try relational-operator syntax first,
//! everything else (and numeric input that fails to parse) goes through
//! the text rules. The rule order below is a deliberate priority list;
//! changing it changes user-visible behavior.
//!
//! 1. `null` / `not null` / `!null` nullity tests
//! 2. numeric: `<= >= != < > =` followed by a numeric literal, or a
//!    bare numeric literal meaning equality
//! 3. comma list -> set membership (`!`-prefixed for the negation)
//! 4. ranges: `between X and Y`, then `X..Y`, then `X-Y`
//! 5. `=` / `!=` / `!` prefixes for equality and inequality
//! 6. anything else -> case-insensitive substring match

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tabula_core::ColumnType;

static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^between\s+(.+?)\s+and\s+(.+)$").unwrap()
});

/// The structured comparison a filter token parses to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
    Regex,
}

/// Operand shape for a parsed filter.
///
/// The shape is tied to the operator: nullity tests carry no operand,
/// `between` carries a pair, set membership carries a list, everything
/// else a single token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterValue {
    None,
    One(String),
    Range(String, String),
    Many(Vec<String>),
}

/// A structured predicate parsed from one free-text token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFilter {
    pub operator: FilterOperator,
    pub value: FilterValue,
    /// Raw user input, kept for display. Excluded from serialization so
    /// two inputs that parse to the same predicate share one cache entry.
    #[serde(skip)]
    pub original_input: String,
}

impl ParsedFilter {
    fn new(operator: FilterOperator, value: FilterValue, original: &str) -> Self {
        Self {
            operator,
            value,
            original_input: original.to_string(),
        }
    }
}

/// Parse one filter token against a column of the given type.
///
/// Returns `None` for empty or whitespace-only input, meaning
/// "no filter".
pub fn parse(raw: &str, column_type: ColumnType) -> Option<ParsedFilter> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_lowercase();
    if lower == "null" {
        return Some(ParsedFilter::new(
            FilterOperator::IsNull,
            FilterValue::None,
            raw,
        ));
    }
    if lower == "not null" || lower == "!null" {
        return Some(ParsedFilter::new(
            FilterOperator::IsNotNull,
            FilterValue::None,
            raw,
        ));
    }

    if column_type.is_numeric()
        && let Some(filter) = parse_numeric(trimmed, raw)
    {
        return Some(filter);
    }

    Some(parse_text(trimmed, raw))
}

/// Relational-operator syntax for numeric columns. Returns `None` when
/// the input isn't valid numeric syntax, letting the caller fall
/// through to the text rules rather than erroring.
fn parse_numeric(trimmed: &str, raw: &str) -> Option<ParsedFilter> {
    // Two-character operators must be checked before their one-character
    // prefixes.
    const OPERATORS: [(&str, FilterOperator); 6] = [
        ("<=", FilterOperator::Lte),
        (">=", FilterOperator::Gte),
        ("!=", FilterOperator::Ne),
        ("<", FilterOperator::Lt),
        (">", FilterOperator::Gt),
        ("=", FilterOperator::Eq),
    ];

    for (prefix, operator) in OPERATORS {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            let literal = rest.trim();
            if literal.parse::<f64>().is_ok() {
                return Some(ParsedFilter::new(
                    operator,
                    FilterValue::One(literal.to_string()),
                    raw,
                ));
            }
            // Operator prefix with a non-numeric literal: not numeric
            // syntax after all.
            return None;
        }
    }

    if trimmed.parse::<f64>().is_ok() {
        return Some(ParsedFilter::new(
            FilterOperator::Eq,
            FilterValue::One(trimmed.to_string()),
            raw,
        ));
    }

    None
}

fn parse_text(trimmed: &str, raw: &str) -> ParsedFilter {
    // Set membership: "a,b,c" or "!a,b,c".
    if trimmed.contains(',') {
        let (negated, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let tokens: Vec<String> = body
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() >= 2 {
            let operator = if negated {
                FilterOperator::NotIn
            } else {
                FilterOperator::In
            };
            return ParsedFilter::new(operator, FilterValue::Many(tokens), raw);
        }
    }

    // Ranges, first matching pattern wins: "between X and Y", "X..Y",
    // "X-Y". The dash form is checked last so "10..20" never splits on
    // a dash inside its bounds; "10-20" is a range here, not a negative
    // number in sequence.
    if let Some(caps) = BETWEEN_RE.captures(trimmed) {
        return ParsedFilter::new(
            FilterOperator::Between,
            FilterValue::Range(caps[1].trim().to_string(), caps[2].trim().to_string()),
            raw,
        );
    }
    if let Some((low, high)) = split_range(trimmed, "..") {
        return ParsedFilter::new(FilterOperator::Between, FilterValue::Range(low, high), raw);
    }
    if let Some((low, high)) = split_range(trimmed, "-") {
        return ParsedFilter::new(FilterOperator::Between, FilterValue::Range(low, high), raw);
    }

    // Explicit equality / inequality prefixes; the longer prefix is
    // checked first.
    if let Some(rest) = trimmed.strip_prefix("!=") {
        return ParsedFilter::new(
            FilterOperator::Ne,
            FilterValue::One(rest.trim().to_string()),
            raw,
        );
    }
    if let Some(rest) = trimmed.strip_prefix('=') {
        return ParsedFilter::new(
            FilterOperator::Eq,
            FilterValue::One(rest.trim().to_string()),
            raw,
        );
    }
    if trimmed.len() > 1
        && let Some(rest) = trimmed.strip_prefix('!')
    {
        return ParsedFilter::new(
            FilterOperator::Ne,
            FilterValue::One(rest.trim().to_string()),
            raw,
        );
    }

    ParsedFilter::new(
        FilterOperator::Ilike,
        FilterValue::One(trimmed.to_string()),
        raw,
    )
}

/// Split "X<sep>Y" into a range when both sides are non-empty
fn split_range(input: &str, sep: &str) -> Option<(String, String)> {
    let (low, high) = input.split_once(sep)?;
    let low = low.trim();
    let high = high.trim();
    if low.is_empty() || high.is_empty() {
        return None;
    }
    Some((low.to_string(), high.to_string()))
}
