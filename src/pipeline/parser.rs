//! Bank alert parser: pulls transaction fields out of alert text.
//!
//! Pure pattern matching, no LLM calls. Each field has its own extraction
//! rule returning `Option`, so a format change in one alert template only
//! touches one function.
//!
//! Flow:
//! 1. Collapse CR/LF/tab runs into single spaces
//! 2. Debit phrase check; no phrase, no further parsing
//! 3. Amount, date/time, merchant rules, each independent

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::pipeline::types::ParsedTransaction;

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t]+").expect("line break pattern"));

static DEBIT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(amount debited|has been debited)").expect("debit phrase pattern")
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bINR|\bRs\.?|₹)\s*([0-9][0-9,]*(?:\.[0-9]+)?)").expect("amount pattern")
});

static DATE_TIME_LONG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{2}-\d{2}-\d{4})\s+(\d{2}:\d{2}:\d{2})\b").expect("long date pattern")
});

static DATE_TIME_SHORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{2}-\d{2}-\d{2})\s+(\d{2}:\d{2}:\d{2})\b").expect("short date pattern")
});

static TRANSACTION_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Transaction Info\s*:?\s*(\S.*)").expect("transaction info pattern")
});

static AT_MERCHANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bat\s+(\S+/.*)").expect("at-merchant pattern"));

/// Parse one alert body into a `ParsedTransaction`.
///
/// Bodies without a debit phrase come back empty with `is_expense = false`,
/// whatever else they contain.
pub fn parse_alert(body: &str) -> ParsedTransaction {
    let text = normalize_whitespace(body);

    if !is_debit(&text) {
        return ParsedTransaction::default();
    }

    let (date, time) = match extract_date_time(&text) {
        Some((date, time)) => (Some(date), Some(time)),
        None => (None, None),
    };

    let parsed = ParsedTransaction {
        amount: extract_amount(&text),
        merchant: extract_merchant(&text),
        date,
        time,
        is_expense: true,
    };

    debug!(
        amount = ?parsed.amount,
        merchant = ?parsed.merchant,
        date = ?parsed.date,
        "Parsed debit alert"
    );
    parsed
}

/// Replace every run of CR/LF/tab with one space.
pub fn normalize_whitespace(body: &str) -> String {
    LINE_BREAKS.replace_all(body, " ").into_owned()
}

/// "Amount Debited" / "has been debited", any case.
pub fn is_debit(text: &str) -> bool {
    DEBIT_PHRASE.is_match(text)
}

/// `INR 1,234.56` → `1234.56`.
pub fn extract_amount(text: &str) -> Option<Decimal> {
    let raw = AMOUNT.captures(text)?.get(1)?.as_str();
    Decimal::from_str(&raw.replace(',', "")).ok()
}

/// `DD-MM-YYYY HH:MM:SS`, falling back to `DD-MM-YY HH:MM:SS`.
pub fn extract_date_time(text: &str) -> Option<(String, String)> {
    [&*DATE_TIME_LONG, &*DATE_TIME_SHORT]
        .into_iter()
        .find_map(|re| re.captures(text))
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Merchant from `Transaction Info:` first, then `at X/Y`.
pub fn extract_merchant(text: &str) -> Option<String> {
    merchant_from_transaction_info(text).or_else(|| merchant_from_at_clause(text))
}

/// Last segment of the slash-delimited `Transaction Info:` field.
fn merchant_from_transaction_info(text: &str) -> Option<String> {
    let rest = TRANSACTION_INFO.captures(text)?.get(1)?.as_str();
    field_span(rest).rsplit('/').next().and_then(clean_merchant)
}

/// Second segment of an `at X/Y` clause.
fn merchant_from_at_clause(text: &str) -> Option<String> {
    let rest = AT_MERCHANT.captures(text)?.get(1)?.as_str();
    field_span(rest).split('/').nth(1).and_then(clean_merchant)
}

/// The slash-delimited field at the start of `rest`.
///
/// Alert fields are upper case, so the field ends at the first later
/// token holding a lower-case letter (`If not you...`, `Date & Time:`) or
/// at a `Label:` token.
fn field_span(rest: &str) -> String {
    let mut tokens = rest.split_whitespace();
    let mut span: Vec<&str> = tokens.next().into_iter().collect();
    span.extend(tokens.take_while(|t| {
        !t.chars().any(|c| c.is_ascii_lowercase()) && !t.ends_with(':')
    }));
    span.join(" ")
}

/// Merchant words of a segment: the first token, then every following
/// token that carries a letter (`SWIGGY 15-03-2024` stops at the date).
fn clean_merchant(segment: &str) -> Option<String> {
    let mut tokens = segment.split_whitespace();
    let mut words: Vec<&str> = tokens.next().into_iter().collect();
    words.extend(tokens.take_while(|t| t.chars().any(char::is_alphabetic)));
    let joined = words.join(" ");
    let trimmed = joined.trim_end_matches(['.', ',', ';', ':']);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
