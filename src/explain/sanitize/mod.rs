//! Cleanup of generated explanation text


use fancy_regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub const MAX_BLURB_WORDS: usize = 20;
pub const MAX_SENTENCES: usize = 4;
pub const MAX_EXPLANATION_WORDS: usize = 120;
pub const MAX_TITLE_CHARS: usize = 60;

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[.!?])\s+").expect("valid regex"));

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([\]}])").expect("valid regex"));

static BEHAVIOR_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(you|your|recent|recently|view|viewed|clicked|clicks|purchase|purchased|bought|added|cart|visited|interacted|favou?r)\b",
    )
    .expect("valid regex")
});

static NO_ACTIVITY_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(do not|don't) have (any )?recent activity|no recent activity")
        .expect("valid regex")
});

/// First JSON object in a model reply.
///
/// Models wrap JSON in prose or code fences and sometimes leave trailing
/// commas; both are tolerated. An array yields its first object.
#[inline]
pub fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find(['{', '['])?;
    let candidate = &text[start..];

    let parsed = serde_json::Deserializer::from_str(candidate)
        .into_iter::<Value>()
        .next()
        .and_then(|result| result.ok())
        .or_else(|| salvage(candidate))?;

    match parsed {
        Value::Object(_) => Some(parsed),
        Value::Array(items) => items.into_iter().find(Value::is_object),
        _ => None,
    }
}

fn salvage(candidate: &str) -> Option<Value> {
    let end = candidate.rfind(['}', ']'])?;
    let trimmed = &candidate[..=end];
    let fixed = TRAILING_COMMA.replace_all(trimmed, "$1");
    serde_json::from_str(&fixed).ok()
}

/// Split on whitespace that follows `.`, `!` or `?`
#[inline]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for found in SENTENCE_BREAK.find_iter(text).flatten() {
        sentences.push(&text[start..found.start()]);
        start = found.end();
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Keep at most `max_words` words, marking a cut with an ellipsis
#[inline]
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }

    let kept = words[..max_words].join(" ");
    format!("{}...", kept.trim_end_matches(['.', ',']))
}

/// Keep at most `max_chars` characters
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}

/// Enforce length limits on a generated blurb and explanation.
///
/// Returns `None` when the explanation has no usable sentence. An empty blurb
/// is replaced with the (shortened) product title.
#[inline]
pub fn sanitize(blurb: &str, explanation: &str, title: &str) -> Option<(String, String)> {
    let sentences = split_sentences(explanation.trim());
    if sentences.is_empty() {
        return None;
    }

    let explanation = truncate_words(
        &sentences
            .into_iter()
            .take(MAX_SENTENCES)
            .collect::<Vec<_>>()
            .join(" "),
        MAX_EXPLANATION_WORDS,
    );

    let blurb = truncate_words(blurb.trim(), MAX_BLURB_WORDS);
    let blurb = if blurb.is_empty() {
        truncate_chars(title, MAX_TITLE_CHARS)
    } else {
        blurb
    };

    Some((blurb, explanation))
}

/// Whether an explanation is believable given the user's history.
///
/// With history, the first sentence has to tie the item to what the user did
/// and the text must not claim the user has no activity.
#[inline]
pub fn is_consistent_with_history(has_history: bool, explanation: &str) -> bool {
    if !has_history {
        return true;
    }

    if NO_ACTIVITY_CLAIM.is_match(explanation).unwrap_or(false) {
        return false;
    }

    let first = explanation.split('.').next().unwrap_or_default();
    BEHAVIOR_TERMS.is_match(first).unwrap_or(false)
}
