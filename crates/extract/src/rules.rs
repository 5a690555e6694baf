use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::lexicon::{self, DATE_PATTERNS, NUMBER_PATTERNS, ORG_SUFFIXES, SURNAMES, TECH_TERMS};
use crate::schema::{Entity, label};
use crate::span::CharIndex;

const TECH_CONFIDENCE: f32 = 0.9;
const ORG_CONFIDENCE: f32 = 0.7;
const DATE_CONFIDENCE: f32 = 0.95;
const PERSON_CONFIDENCE: f32 = 0.7;
const NUMBER_CONFIDENCE: f32 = 0.9;

static ORG_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ORG_SUFFIXES
        .iter()
        .map(|suffix| compile(&format!(r"[\x{{4e00}}-\x{{9fa5}}]{{2,10}}{}", regex::escape(suffix))))
        .collect()
});

static DATE_REGEXES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| DATE_PATTERNS.iter().map(|p| compile(p)).collect());

static NUMBER_REGEXES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| NUMBER_PATTERNS.iter().map(|p| compile(p)).collect());

// Patterns are static literals covered by tests.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

/// Dictionary and pattern based recogniser. Always available.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedNer;

impl RuleBasedNer {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let index = CharIndex::new(text);
        let mut candidates = Vec::new();

        tech_terms(text, &index, &mut candidates);
        regex_pass(text, &index, &ORG_REGEXES, label::ORG, ORG_CONFIDENCE, &mut candidates);
        regex_pass(text, &index, &DATE_REGEXES, label::DATE, DATE_CONFIDENCE, &mut candidates);
        person_names(text, &mut candidates);
        regex_pass(
            text,
            &index,
            &NUMBER_REGEXES,
            label::NUMBER,
            NUMBER_CONFIDENCE,
            &mut candidates,
        );

        let total = candidates.len();
        let entities = resolve_overlaps(candidates);
        debug!(candidates = total, kept = entities.len(), "rule-based extraction");
        entities
    }
}

fn tech_terms(text: &str, index: &CharIndex, out: &mut Vec<Entity>) {
    for term in TECH_TERMS {
        for (byte, matched) in text.match_indices(term) {
            let (start, end) = index.char_range(byte, byte + matched.len());
            out.push(Entity::new(*term, label::TECH, start, end, TECH_CONFIDENCE));
        }
    }
}

fn regex_pass(
    text: &str,
    index: &CharIndex,
    regexes: &[Regex],
    label: &str,
    confidence: f32,
    out: &mut Vec<Entity>,
) {
    for re in regexes {
        for m in re.find_iter(text) {
            let (start, end) = index.char_range(m.start(), m.end());
            out.push(Entity::new(m.as_str(), label, start, end, confidence));
        }
    }
}

/// Surname followed by a run of one to three Han characters that ends
/// there. Matches of the same surname never overlap.
fn person_names(text: &str, out: &mut Vec<Entity>) {
    let chars: Vec<char> = text.chars().collect();

    for surname in SURNAMES {
        let mut resume_at = 0;
        for i in 0..chars.len() {
            if i < resume_at || chars[i] != *surname {
                continue;
            }
            let run = chars[i + 1..].iter().take_while(|c| lexicon::is_han(**c)).count();
            if !(1..=3).contains(&run) {
                continue;
            }
            let end = i + 1 + run;
            let name: String = chars[i..end].iter().collect();
            resume_at = end;
            if lexicon::is_known_term(&name) {
                continue;
            }
            out.push(Entity::new(name, label::PERSON, i, end, PERSON_CONFIDENCE));
        }
    }
}

/// Keep a non-overlapping subset: candidates are ordered by start, then
/// confidence (higher first), then length (longer first), and a span is kept
/// only if it starts at or after the end of the last kept span.
pub fn resolve_overlaps(mut candidates: Vec<Entity>) -> Vec<Entity> {
    candidates.sort_by(|a, b| {
        a.start_char
            .cmp(&b.start_char)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            // Only decides between spans with equal start and confidence.
            .then_with(|| b.span_len().cmp(&a.span_len()))
    });

    let mut kept: Vec<Entity> = Vec::with_capacity(candidates.len());
    let mut last_end = 0;
    for entity in candidates {
        if entity.start_char >= last_end {
            last_end = entity.end_char;
            kept.push(entity);
        }
    }
    kept
}
