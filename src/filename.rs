//! Episode filename resolution
//!
//! Derives a stable, sanitized, optionally date-prefixed filename from an
//! item title. Many feeds bury a 6-digit YYMMDD broadcast date in the title;
//! promoting it to an ISO `YYYY-MM-DD` prefix makes directories sort
//! chronologically. The resolved name carries no extension — the caller
//! appends the configured one.

use crate::config::FilenameMode;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static TRAILING_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)\s+(\d{6})$").unwrap_or_else(|e| panic!("invalid trailing-code regex: {e}"))
});

static BARE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{6})\b").unwrap_or_else(|e| panic!("invalid bare-code regex: {e}"))
});

/// Parse a 6-digit YYMMDD code into an ISO `YYYY-MM-DD` string.
///
/// Century is inferred: `YY >= 50` means 19xx, else 20xx. Returns `None`
/// when the code is not a valid calendar date.
fn parse_six_digit_date(code: &str) -> Option<String> {
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let yy: i32 = code[0..2].parse().ok()?;
    let mm: u32 = code[2..4].parse().ok()?;
    let dd: u32 = code[4..6].parse().ok()?;

    let century = if yy >= 50 { 1900 } else { 2000 };
    let date = NaiveDate::from_ymd_opt(century + yy, mm, dd)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Strip everything but alphanumerics, space, underscore, and hyphen,
/// trimming trailing whitespace.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_' || *c == '-')
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Resolve an episode title into its local filename (without extension).
///
/// `Default` mode searches the whole title for a bare 6-digit code; a valid
/// YYMMDD date is stripped from the title and prepended as an ISO prefix,
/// anything else leaves the title as-is. `Daily` mode only honors a trailing
/// 6-digit token, and keeps an unparseable code verbatim as the prefix so
/// the information survives the heuristic misfiring.
pub fn resolve(title: &str, mode: FilenameMode) -> String {
    match mode {
        FilenameMode::Daily => {
            if let Some(caps) = TRAILING_CODE.captures(title) {
                let main_part = &caps[1];
                let code = &caps[2];
                return match parse_six_digit_date(code) {
                    Some(iso) => format!("{} {}", iso, sanitize(main_part))
                        .trim()
                        .to_string(),
                    // Unparseable code: keep it as the prefix rather than
                    // dropping it silently
                    None => format!("{} {}", code, sanitize(main_part))
                        .trim()
                        .to_string(),
                };
            }
            resolve_bare_code(title)
        }
        FilenameMode::Default => resolve_bare_code(title),
    }
}

/// Shared fallback: search anywhere in the title for a bare 6-digit date.
fn resolve_bare_code(title: &str) -> String {
    if let Some(caps) = BARE_CODE.captures(title)
        && let Some(iso) = parse_six_digit_date(&caps[1])
    {
        let rest = sanitize(&title.replacen(&caps[1], "", 1));
        return format!("{} {}", iso, rest.trim()).trim().to_string();
    }
    sanitize(title)
}
