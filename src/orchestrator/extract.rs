// ABOUTME: Pure string utilities for pulling artifacts and phrases out of worker replies.
// ABOUTME: Fenced-block extraction sits behind ArtifactExtractor so the heuristic can be swapped.

use std::collections::HashSet;

use regex::Regex;

lazy_static::lazy_static! {
    /// First fenced block, with an optional language tag on the opening fence.
    static ref FENCED_BLOCK: Regex = Regex::new(r"```[A-Za-z0-9_+.#-]*[ \t]*\r?\n([\s\S]*?)```")
        .expect("fenced block regex is valid");
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}_']+").expect("word regex is valid");
}

/// Turns a merged reply into the artifact carried to the next round.
pub trait ArtifactExtractor: Send + Sync {
    fn extract(&self, text: &str) -> String;
}

/// First fenced code block if present, otherwise a fixed-length prefix of the raw text.
#[derive(Debug, Clone)]
pub struct FencedBlockExtractor {
    pub max_prefix_chars: usize,
}

impl FencedBlockExtractor {
    pub fn new(max_prefix_chars: usize) -> Self {
        Self { max_prefix_chars }
    }
}

impl Default for FencedBlockExtractor {
    fn default() -> Self {
        Self::new(2000)
    }
}

impl ArtifactExtractor for FencedBlockExtractor {
    fn extract(&self, text: &str) -> String {
        match first_fenced_block(text) {
            Some(block) => block.trim().to_string(),
            None => truncate_chars(text.trim(), self.max_prefix_chars).to_string(),
        }
    }
}

/// Body of the first fenced block, without the fences.
pub fn first_fenced_block(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Distinct 3-word sliding-window phrases in first-seen order.
///
/// Words are lower-cased runs of Unicode letters, digits, underscores and
/// apostrophes; everything else separates words.
pub fn three_word_phrases(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = WORD.find_iter(&lower).map(|m| m.as_str()).collect();

    let mut seen = HashSet::new();
    let mut phrases = Vec::new();
    for window in words.windows(3) {
        let phrase = window.join(" ");
        if seen.insert(phrase.clone()) {
            phrases.push(phrase);
        }
    }
    phrases
}
