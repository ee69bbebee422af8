use std::sync::LazyLock;

use regex::Regex;

use crate::brand::{collapse_whitespace, BrandContext};

pub const COPYWRITER_PERSONA: &str = "You are an award-winning advertising copywriter. You write \
     short, punchy social media captions that sell.";

pub const CAPTION_TONES: [&str; 3] = [
    "playful and energetic",
    "elegant and aspirational",
    "bold and direct",
];

pub const FALLBACK_CAPTIONS: [&str; 2] = [
    "Discover something made for you. Shop the collection today!",
    "Quality you can see and feel. Get yours now!",
];

// A lead-in line: ends with a colon, or is a whole "here are N options" sentence.
static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:sure|certainly|absolutely|of course|okay|here(?:'s| is| are)|below (?:is|are))\b.*:|here (?:are|is) (?:\w+ )?(?:options?|captions?|ideas?|versions?|variations?)(?: for you)?[.!]?)$",
    )
    .expect("preamble regex")
});

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\d+[.)]|[-*•]|option\s*\d+\s*[:.)-])\s+").expect("list marker regex")
});

static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*caption\s*\d*\s*:\s*").expect("label regex"));

static ASIDES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("asides regex"));

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([.,!?;:])").expect("punctuation spacing regex"));

static NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").expect("number prefix regex"));

pub fn tone_for(index: usize) -> &'static str {
    CAPTION_TONES[index % CAPTION_TONES.len()]
}

pub fn fallback_caption(index: usize) -> &'static str {
    FALLBACK_CAPTIONS[index % FALLBACK_CAPTIONS.len()]
}

/// User turn asking for exactly one caption in the unit's tone.
pub fn caption_instructions(prompt: &str, index: usize, context: &BrandContext) -> String {
    format!(
        "Write exactly ONE social media caption for an ad featuring {subject}. \
         The ad image was created from this brief: {prompt}\n\
         Tone: {tone}. Length: 2-3 sentences. End with a clear call to action. \
         Do not offer multiple options, do not number anything, do not add hashtags \
         or commentary. Reply with the caption text only.",
        subject = context.subject(),
        tone = tone_for(index),
    )
}

/// Reduces a raw completion to one caption, or `None` if nothing usable
/// survives.
pub fn sanitize_caption(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    // Lead-ins go only while something follows them.
    let mut start = 0;
    while start + 1 < lines.len() && PREAMBLE.is_match(lines[start]) {
        start += 1;
    }
    let mut body: Vec<&str> = lines[start..].to_vec();
    if body.len() == 1 && PREAMBLE.is_match(body[0]) && body[0].ends_with(':') {
        return None;
    }

    // Listed alternatives: keep only the first entry.
    if body.iter().any(|line| LIST_MARKER.is_match(line)) {
        let first_item = body
            .iter()
            .position(|line| LIST_MARKER.is_match(line))
            .unwrap_or(0);
        let mut item = vec![body[first_item]];
        for line in body.iter().copied().skip(first_item + 1) {
            if LIST_MARKER.is_match(line) {
                break;
            }
            item.push(line);
        }
        body = item;
    }

    let joined = body.join(" ");
    let text = LIST_MARKER.replace(&joined, "");
    let text = LABEL.replace(&text, "");
    let text = ASIDES.replace_all(&text, " ");
    let text = collapse_whitespace(&text);
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    let text = text
        .trim_matches(|ch| matches!(ch, '"' | '\'' | '“' | '”' | '‘' | '’' | '`' | '*'))
        .trim();
    let text = NUMBER_PREFIX.replace(text, "");
    let text = collapse_whitespace(&text);
    if text.chars().count() < 3 {
        return None;
    }
    Some(text)
}
