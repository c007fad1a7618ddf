//! Normalization of raw keystrokes into canonical field values.
//!
//! Every function here is total: malformed input collapses to the empty
//! string rather than producing an error.

/// Longest digit run kept for a currency field; keeps every sanitized
/// value representable as `u64`.
pub const MAX_CURRENCY_DIGITS: usize = 15;
const MAX_PERCENT_FRACTION_DIGITS: usize = 2;

/// Strips everything but ASCII digits and drops redundant leading zeros.
pub fn sanitize_currency(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return String::new();
    }
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return "0".to_string();
    }
    significant.chars().take(MAX_CURRENCY_DIGITS).collect()
}

/// Renders a digit string with thousands separators, no decimals.
pub fn format_currency(digits: &str) -> String {
    let digits: Vec<char> = digits.chars().filter(char::is_ascii_digit).collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.iter().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(*ch);
    }
    out
}

pub fn parse_currency(digits: &str) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Keeps digits and the first decimal point, with at most two fractional
/// digits.
pub fn sanitize_percent(raw: &str) -> String {
    let mut out = String::new();
    let mut fraction_digits = None;
    for ch in raw.chars() {
        match ch {
            '0'..='9' => match fraction_digits {
                Some(n) if n >= MAX_PERCENT_FRACTION_DIGITS => {}
                Some(n) => {
                    out.push(ch);
                    fraction_digits = Some(n + 1);
                }
                None => out.push(ch),
            },
            '.' if fraction_digits.is_none() => {
                if out.is_empty() {
                    out.push('0');
                }
                out.push('.');
                fraction_digits = Some(0);
            }
            _ => {}
        }
    }
    out
}

pub fn format_percent(sanitized: &str) -> String {
    if sanitized.is_empty() {
        String::new()
    } else {
        format!("{sanitized}%")
    }
}

pub fn parse_percent(sanitized: &str) -> Option<f64> {
    sanitized.trim_end_matches('.').parse().ok()
}

/// Draft text of a currency input kept next to its committed number so
/// separator insertion never leaks into the authoritative value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDraft {
    pub draft: String,
    pub value: Option<u64>,
}

impl FieldDraft {
    pub fn from_input(raw: &str) -> Self {
        let digits = sanitize_currency(raw);
        Self {
            draft: format_currency(&digits),
            value: parse_currency(&digits),
        }
    }

    pub fn from_value(value: Option<u64>) -> Self {
        match value {
            Some(value) => Self::from_input(&value.to_string()),
            None => Self::default(),
        }
    }
}

#[cfg(test)]
#[path = "tests/format_tests.rs"]
mod tests;
