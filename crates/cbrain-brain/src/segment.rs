//! Splitting a plain-text transcript into candidate segments.

use std::sync::LazyLock;

use regex::Regex;

/// Paragraphs longer than this are split at sentence boundaries.
pub const MAX_SEGMENT_CHARS: usize = 1_200;
/// Segments with fewer words are dropped as chatter.
pub const MIN_SEGMENT_WORDS: usize = 6;

static SPEAKER_TURN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[[0-9:.]+\]\s*)?([A-Z][A-Za-z0-9.'\-]*(?: [A-Z][A-Za-z0-9.'\-]*){0,2})\s*:\s+(.*)$")
        .expect("valid regex")
});
static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["')\]]?\s+"#).expect("valid regex"));

/// One candidate unit of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub speaker: Option<String>,
    pub text: String,
}

/// Split `raw` at blank lines and speaker turns (`Name: ...`), break overly
/// long paragraphs at sentence ends, and drop trivially short pieces.
#[must_use]
pub fn split_segments(raw: &str) -> Vec<Segment> {
    let mut paragraphs: Vec<Segment> = Vec::new();
    let mut current: Option<Segment> = None;
    let mut last_speaker: Option<String> = None;

    let flush = |current: &mut Option<Segment>, out: &mut Vec<Segment>| {
        if let Some(seg) = current.take() {
            if !seg.text.trim().is_empty() {
                out.push(seg);
            }
        }
    };

    for line in raw.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut paragraphs);
            continue;
        }
        if let Some(caps) = SPEAKER_TURN_RE.captures(line) {
            let name = caps[1].trim().to_string();
            let rest = caps[2].trim().to_string();
            flush(&mut current, &mut paragraphs);
            last_speaker = Some(name.clone());
            current = Some(Segment {
                speaker: Some(name),
                text: rest,
            });
            continue;
        }
        match current.as_mut() {
            Some(seg) => {
                seg.text.push(' ');
                seg.text.push_str(line.trim());
            }
            None => {
                current = Some(Segment {
                    speaker: last_speaker.clone(),
                    text: line.trim().to_string(),
                });
            }
        }
    }
    flush(&mut current, &mut paragraphs);

    paragraphs
        .into_iter()
        .flat_map(|seg| {
            split_long(&seg.text)
                .into_iter()
                .map(move |text| Segment {
                    speaker: seg.speaker.clone(),
                    text,
                })
                .collect::<Vec<_>>()
        })
        .filter(|seg| seg.text.split_whitespace().count() >= MIN_SEGMENT_WORDS)
        .collect()
}

fn split_long(text: &str) -> Vec<String> {
    if text.chars().count() <= MAX_SEGMENT_CHARS {
        return vec![text.to_string()];
    }

    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        sentences.push(&text[start..m.end()]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    let mut chunks = Vec::new();
    let mut chunk = String::new();
    for sentence in sentences {
        if !chunk.is_empty() && chunk.chars().count() + sentence.chars().count() > MAX_SEGMENT_CHARS {
            chunks.push(chunk.trim().to_string());
            chunk.clear();
        }
        chunk.push_str(sentence);
    }
    if !chunk.trim().is_empty() {
        chunks.push(chunk.trim().to_string());
    }
    chunks
}
