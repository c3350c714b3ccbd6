//! Label normalization shared by topics and tags.

/// Words ignored when comparing topic labels.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "of", "for", "to", "in", "on", "via", "with", "by", "your", "how",
];

#[must_use]
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Generate a URL-safe slug: lowercase ASCII alphanumerics joined by single dashes.
#[must_use]
pub fn slugify(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c
            } else if c.is_whitespace() || c == '-' || c == '_' || c == '/' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Tokens of a label used for similarity: lowercase words with punctuation and
/// stop-words removed. Falls back to all words if every word is a stop-word.
#[must_use]
pub fn normalize_label(label: &str) -> Vec<String> {
    let words: Vec<String> = slugify(label)
        .split('-')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let meaningful: Vec<String> = words
        .iter()
        .filter(|w| !is_stop_word(w))
        .cloned()
        .collect();
    if meaningful.is_empty() {
        words
    } else {
        meaningful
    }
}

/// Canonical tag form: trimmed, lowercase, inner whitespace collapsed.
/// Returns `None` for blank tags.
#[must_use]
pub fn normalize_tag(tag: &str) -> Option<String> {
    let collapsed = tag
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
