use super::*;

#[test]
fn sanitize_keeps_only_digits() {
    assert_eq!(sanitize_currency("$1,500"), "1500");
    assert_eq!(sanitize_currency(" 12 345 "), "12345");
    assert_eq!(sanitize_currency("abc"), "");
    assert_eq!(sanitize_currency(""), "");
}

#[test]
fn sanitize_collapses_leading_zeros() {
    assert_eq!(sanitize_currency("0007"), "7");
    assert_eq!(sanitize_currency("000"), "0");
}

#[test]
fn sanitize_caps_digit_count() {
    let raw = "9".repeat(40);
    let digits = sanitize_currency(&raw);
    assert_eq!(digits.len(), MAX_CURRENCY_DIGITS);
    assert!(parse_currency(&digits).is_some());
}

#[test]
fn format_inserts_thousands_separators() {
    assert_eq!(format_currency(""), "");
    assert_eq!(format_currency("7"), "7");
    assert_eq!(format_currency("999"), "999");
    assert_eq!(format_currency("1000"), "1,000");
    assert_eq!(format_currency("1750"), "1,750");
    assert_eq!(format_currency("1234567"), "1,234,567");
}

#[test]
fn format_ignores_stray_characters() {
    assert_eq!(format_currency("12a34"), "1,234");
}

#[test]
fn draft_separates_display_from_value() {
    let draft = FieldDraft::from_input("$250,000.");
    assert_eq!(draft.draft, "250,000");
    assert_eq!(draft.value, Some(250_000));

    let empty = FieldDraft::from_input("n/a");
    assert_eq!(empty, FieldDraft::default());
    assert_eq!(FieldDraft::from_value(Some(1750)).draft, "1,750");
}

#[test]
fn percent_keeps_single_decimal_point() {
    assert_eq!(sanitize_percent("12.345"), "12.34");
    assert_eq!(sanitize_percent("1.2.3"), "1.23");
    assert_eq!(sanitize_percent(".5"), "0.5");
    assert_eq!(sanitize_percent("x%"), "");
    assert_eq!(format_percent("7.5"), "7.5%");
    assert_eq!(format_percent(""), "");
    assert_eq!(parse_percent("12."), Some(12.0));
    assert_eq!(parse_percent(""), None);
}
