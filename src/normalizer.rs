//! Text normalization and input validation.
//!
//! `normalize` is the cleaning transform every text goes through before it is
//! vectorized. It is total (never fails) and idempotent. `validate` is the
//! separate gate that rejects inputs before any processing happens.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, SentimentError};

/// Minimum trimmed length of a raw input, in characters.
pub const MIN_TEXT_LENGTH: usize = 3;
/// Maximum trimmed length of a raw input, in characters.
pub const MAX_TEXT_LENGTH: usize = 5000;
/// Minimum length of the normalized text, in characters.
pub const MIN_NORMALIZED_LENGTH: usize = 2;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"http\S+|www\S+").expect("url pattern is valid"));

static MENTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@\w+").expect("mention pattern is valid"));

static HASHTAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\w+").expect("hashtag pattern is valid"));

static DIGITS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("digits pattern is valid"));

/// Cleans raw text for vectorization.
///
/// Steps, in order: lowercase, strip URLs (`http…`/`www…`), strip `@mentions`
/// and `#hashtags`, strip digit runs, strip ASCII punctuation, collapse
/// whitespace, trim.
///
/// Removing punctuation can glue fragments into a new URL-like token
/// (`"ht-tp"` becomes `"http"`), so the steps are repeated until the output
/// stops changing. That makes `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    // after the first pass every change only removes characters, so this terminates
    let mut current = clean_once(raw);
    loop {
        let next = clean_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_once(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_urls = URL_PATTERN.replace_all(&lowered, "");
    let without_mentions = MENTION_PATTERN.replace_all(&without_urls, "");
    let without_hashtags = HASHTAG_PATTERN.replace_all(&without_mentions, "");
    let without_digits = DIGITS_PATTERN.replace_all(&without_hashtags, "");

    let without_punctuation: String = without_digits
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    without_punctuation
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rejects input that is too short, too long, or has no meaningful content
/// left after normalization. Returns the normalized text on success.
pub fn validate(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let length = trimmed.chars().count();

    if length < MIN_TEXT_LENGTH {
        return Err(SentimentError::validation(format!(
            "Text must be at least {} characters long",
            MIN_TEXT_LENGTH
        )));
    }

    if length > MAX_TEXT_LENGTH {
        return Err(SentimentError::validation(format!(
            "Text cannot exceed {} characters",
            MAX_TEXT_LENGTH
        )));
    }

    let normalized = normalize(trimmed);
    if normalized.chars().count() < MIN_NORMALIZED_LENGTH {
        return Err(SentimentError::validation(
            "Text does not contain enough meaningful content",
        ));
    }

    Ok(normalized)
}
