//! Cell value normalization.
//!
//! Lab sheets mix locales and hand-typed annotations: `"1.234,56"`,
//! `"< 0.01"`, `"15 %"`, `"74..04"`, `"N/D"`. Everything here is pure and
//! never fails; content that cannot be read degrades to `None`.

use crate::fields::MISSING_TOKENS;
use crate::sheet::Cell;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization as _;

static REPEATED_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").unwrap());
static PLAIN_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\d+\.?\d*|\.\d+)$").unwrap());
static EMBEDDED_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// Prefixes labs put in front of values near detection limits.
const COMPARATORS: &[char] = &['<', '>', '≈', '~', '±', '≤', '≥', '='];

/// True if `text` is one of the "no value" sentinels.
pub fn is_missing_token(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    MISSING_TOKENS.contains(&lowered.as_str())
}

/// True if the cell carries no usable text.
pub fn is_missing(cell: &Cell) -> bool {
    normalize_text(cell).is_none()
}

/// Trimmed text of a non-empty cell, sentinels included.
pub fn cell_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) => n.is_finite().then(|| format_number(*n)),
        Cell::Text(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}

/// Clean text content of a cell, or `None` for blanks and sentinels.
pub fn normalize_text(cell: &Cell) -> Option<String> {
    cell_text(cell).filter(|text| !is_missing_token(text))
}

/// Numeric content of a cell, or `None` when it cannot be read as a number.
pub fn normalize_number(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) => n.is_finite().then_some(*n),
        Cell::Text(s) => parse_number(s),
    }
}

/// Reads a hand-typed number.
///
/// When both `.` and `,` appear, whichever comes last is the decimal
/// separator. A lone `,` followed by at most three digits is a decimal
/// comma; any other comma is a thousands separator.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_missing_token(trimmed) {
        return None;
    }

    let mut negative = trimmed.starts_with('-');
    let rest = trimmed.trim_start_matches('-');

    let stripped: String = rest
        .chars()
        .filter(|c| *c != '%' && !c.is_whitespace())
        .collect();
    let mut body = stripped.trim_start_matches(COMPARATORS);
    if let Some(after_sign) = body.strip_prefix('-') {
        negative = true;
        body = after_sign;
    }

    let collapsed = REPEATED_DOTS.replace_all(body, ".");
    let separated = resolve_separators(&collapsed);

    let digits: String = separated
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let candidate = if PLAIN_DECIMAL.is_match(&digits) {
        digits.as_str()
    } else {
        EMBEDDED_NUMBER.find(&digits)?.as_str()
    };

    let value: f64 = candidate.parse().ok()?;
    let value = if negative { -value } else { value };
    value.is_finite().then_some(value)
}

/// Rewrites decimal/thousands separators so that only a `.` decimal point
/// remains.
fn resolve_separators(text: &str) -> String {
    let last_dot = text.rfind('.');
    let last_comma = text.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            let decimal_at = dot.max(comma);
            let integer: String = text[..decimal_at]
                .chars()
                .filter(|c| *c != '.' && *c != ',')
                .collect();
            format!("{}.{}", integer, &text[decimal_at + 1..])
        }
        (None, Some(comma)) => {
            let single = text.matches(',').count() == 1;
            let trailing_digits = text[comma + 1..].chars().filter(|c| c.is_ascii_digit()).count();
            if single && trailing_digits <= 3 {
                text.replacen(',', ".", 1)
            } else {
                text.replace(',', "")
            }
        }
        _ => text.to_string(),
    }
}

/// Renders a numeric cell as text; integral values drop the fraction.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Canonical form used to compare header text: lowercase, accents removed,
/// every run of non-alphanumeric characters turned into one `_`, no leading
/// or trailing `_`.
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();

    let mut out = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}
