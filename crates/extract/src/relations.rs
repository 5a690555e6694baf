use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::lexicon::{SurfacePattern, surface_patterns};
use crate::schema::{Entity, Predicate, Relation};
use crate::span::{char_len, truncate_chars};

const PATTERN_CONFIDENCE: f32 = 0.85;
const COOCCURRENCE_CONFIDENCE: f32 = 0.65;
const EVIDENCE_CHARS: usize = 100;
const MIN_SENTENCE_CHARS: usize = 5;
const MIN_CLAUSE_CHARS: usize = 3;

static SENTENCE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[。！？.!?]+").expect("valid sentence pattern"));
static CLAUSE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[，、；]").expect("valid clause pattern"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Distinct entities considered for pattern matching.
    pub max_pattern_entities: usize,
    /// How many later entities in a clause each entity may pair with.
    pub pair_window: usize,
    /// Maximum character distance between two co-occurring entities.
    pub max_distance: usize,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            max_pattern_entities: 200,
            pair_window: 5,
            max_distance: 120,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelationExtractor {
    config: RelationConfig,
}

/// Dedup bookkeeping shared by both strategies.
#[derive(Default)]
struct Seen {
    triples: HashSet<(String, Predicate, String)>,
    linked: HashSet<(String, String)>,
}

impl Seen {
    fn unordered(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    fn insert(&mut self, relation: &Relation) -> bool {
        let key = (
            relation.subject.clone(),
            relation.predicate,
            relation.object.clone(),
        );
        if !self.triples.insert(key) {
            return false;
        }
        self.linked
            .insert(Self::unordered(&relation.subject, &relation.object));
        true
    }

    fn linked(&self, a: &str, b: &str) -> bool {
        self.linked.contains(&Self::unordered(a, b))
    }
}

impl RelationExtractor {
    pub fn new(config: RelationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    /// Pattern relations first, then co-occurrence links between pairs
    /// that are not already related in either direction.
    pub fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relation> {
        let names = distinct_texts(entities);
        let mut seen = Seen::default();
        let mut relations = Vec::new();

        self.pattern_relations(text, &names, &mut seen, &mut relations);
        let patterned = relations.len();
        self.cooccurrence_relations(text, &names, &mut seen, &mut relations);

        info!(
            entities = names.len(),
            patterned,
            cooccurrence = relations.len() - patterned,
            "extracted relations"
        );
        relations
    }

    fn pattern_relations(
        &self,
        text: &str,
        names: &[&str],
        seen: &mut Seen,
        out: &mut Vec<Relation>,
    ) {
        let limit = self.config.max_pattern_entities;
        if names.len() > limit {
            warn!(
                entities = names.len(),
                limit, "capping entities considered for pattern relations"
            );
        }
        let lines = LineIndex::new(text);
        let sites: Vec<(&str, Vec<usize>)> = names
            .iter()
            .take(limit)
            .map(|name| (*name, occurrences(text, name)))
            .filter(|(_, found)| !found.is_empty())
            .collect();

        for predicate in Predicate::PATTERNED {
            let patterns: Vec<PatternSites> = surface_patterns(predicate)
                .iter()
                .map(|pattern| PatternSites::new(text, pattern))
                .filter(|pattern| !pattern.keywords.is_empty())
                .collect();
            if patterns.is_empty() {
                continue;
            }

            for (e1, e1_sites) in &sites {
                for (e2, e2_sites) in &sites {
                    if e1 == e2 {
                        continue;
                    }
                    let span = patterns.iter().find_map(|pattern| {
                        pattern.find(
                            &lines,
                            (e1_sites.as_slice(), e1.len()),
                            (e2_sites.as_slice(), e2.len()),
                        )
                    });
                    if let Some(span) = span {
                        let relation = Relation {
                            subject: e1.to_string(),
                            predicate,
                            object: e2.to_string(),
                            confidence: PATTERN_CONFIDENCE,
                            evidence: truncate_chars(&text[span], EVIDENCE_CHARS),
                        };
                        if seen.insert(&relation) {
                            out.push(relation);
                        }
                    }
                }
            }
        }
    }

    fn cooccurrence_relations(
        &self,
        text: &str,
        names: &[&str],
        seen: &mut Seen,
        out: &mut Vec<Relation>,
    ) {
        let clauses = SENTENCE_SPLIT
            .split(text)
            .filter(|sentence| char_len(sentence.trim()) >= MIN_SENTENCE_CHARS)
            .flat_map(|sentence| CLAUSE_SPLIT.split(sentence))
            .filter(|clause| char_len(clause.trim()) >= MIN_CLAUSE_CHARS);

        for clause in clauses {
            let present: Vec<(&str, usize)> = names
                .iter()
                .filter_map(|name| {
                    clause
                        .find(name)
                        .map(|byte| (*name, char_len(&clause[..byte])))
                })
                .collect();

            for (i, (a, pos_a)) in present.iter().enumerate() {
                let window_end = (i + 1 + self.config.pair_window).min(present.len());
                for (b, pos_b) in &present[i + 1..window_end] {
                    if pos_a.abs_diff(*pos_b) >= self.config.max_distance || seen.linked(a, b) {
                        continue;
                    }
                    let relation = Relation {
                        subject: a.to_string(),
                        predicate: Predicate::Related,
                        object: b.to_string(),
                        confidence: COOCCURRENCE_CONFIDENCE,
                        evidence: truncate_chars(clause, EVIDENCE_CHARS),
                    };
                    if seen.insert(&relation) {
                        out.push(relation);
                    }
                }
            }
        }
    }
}

/// Byte offset of every line end, plus the end of the text.
struct LineIndex {
    ends: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let ends = text
            .match_indices('\n')
            .map(|(at, _)| at)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { ends }
    }

    fn line_end(&self, at: usize) -> usize {
        let i = self.ends.partition_point(|&end| end < at);
        self.ends.get(i).copied().unwrap_or(at)
    }
}

/// Start offsets of every (possibly overlapping) occurrence of `needle`.
fn occurrences(text: &str, needle: &str) -> Vec<usize> {
    let Some(first) = needle.chars().next() else {
        return Vec::new();
    };
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(at) = text[from..].find(needle) {
        found.push(from + at);
        from += at + first.len_utf8();
    }
    found
}

fn first_from(sorted: &[usize], min: usize) -> Option<usize> {
    sorted.get(sorted.partition_point(|&p| p < min)).copied()
}

/// Where one surface pattern's keyword and tail markers occur in the text.
struct PatternSites {
    keyword_len: usize,
    keywords: Vec<usize>,
    /// `(start, len)` of every tail marker, by start.
    tails: Vec<(usize, usize)>,
    needs_tail: bool,
}

impl PatternSites {
    fn new(text: &str, pattern: &SurfacePattern) -> Self {
        let mut tails: Vec<(usize, usize)> = pattern
            .tail
            .iter()
            .flat_map(|marker| occurrences(text, marker).into_iter().map(|at| (at, marker.len())))
            .collect();
        tails.sort_unstable();
        Self {
            keyword_len: pattern.keyword.len(),
            keywords: occurrences(text, pattern.keyword),
            tails,
            needs_tail: !pattern.tail.is_empty(),
        }
    }

    /// Leftmost `e1 … keyword … e2 [… tail]` span confined to one line.
    /// Each side is given as its sorted start offsets and byte length.
    fn find(
        &self,
        lines: &LineIndex,
        (e1_sites, e1_len): (&[usize], usize),
        (e2_sites, e2_len): (&[usize], usize),
    ) -> Option<Range<usize>> {
        for &start in e1_sites {
            let line_end = lines.line_end(start);
            let keyword = first_from(&self.keywords, start + e1_len)?;
            if keyword >= line_end {
                continue;
            }
            let object = first_from(e2_sites, keyword + self.keyword_len)?;
            let object_end = object + e2_len;
            if object_end > line_end {
                continue;
            }
            if !self.needs_tail {
                return Some(start..object_end);
            }
            let i = self.tails.partition_point(|&(at, _)| at < object_end);
            match self.tails.get(i) {
                Some(&(at, len)) if at + len <= line_end => return Some(start..at + len),
                _ => continue,
            }
        }
        None
    }
}

/// Entity texts in first-occurrence order, without repeats.
fn distinct_texts(entities: &[Entity]) -> Vec<&str> {
    let mut seen = HashSet::new();
    entities
        .iter()
        .map(|e| e.text.as_str())
        .filter(|text| !text.is_empty() && seen.insert(*text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleBasedNer;
    use crate::schema::label;

    fn tech(text: &str, start: usize) -> Entity {
        Entity::new(text, label::TECH, start, start + char_len(text), 0.9)
    }

    fn assert_unique(relations: &[Relation]) {
        let mut keys = HashSet::new();
        for r in relations {
            assert_ne!(r.subject, r.object);
            assert!(keys.insert(r.key()), "duplicate {:?}", r.key());
        }
        for r in relations.iter().filter(|r| r.predicate == Predicate::Related) {
            assert!(
                !relations.iter().any(|o| o.predicate == Predicate::Related
                    && o.subject == r.object
                    && o.object == r.subject),
                "mirrored related relation {:?}",
                r.key()
            );
        }
    }

    #[test]
    fn test_pattern_relation() {
        let text = "推荐系统基于深度学习。";
        let entities = vec![tech("推荐系统", 0), tech("深度学习", 6)];
        let relations = RelationExtractor::default().extract(text, &entities);

        assert_eq!(relations.len(), 1);
        let r = &relations[0];
        assert_eq!(r.key(), ("推荐系统", Predicate::DependsOn, "深度学习"));
        assert_eq!(r.confidence, 0.85);
        assert_eq!(r.evidence, "推荐系统基于深度学习");
    }

    #[test]
    fn test_pattern_stays_on_one_line() {
        let entities = vec![tech("推荐系统", 0), tech("深度学习", 0)];
        let extractor = RelationExtractor::default();

        let split = extractor.extract("推荐系统基于\n深度学习", &entities);
        assert!(split.iter().all(|r| r.predicate != Predicate::DependsOn));

        let relations = extractor.extract("推荐系统\n推荐系统需要深度学习", &entities);
        let r = relations
            .iter()
            .find(|r| r.predicate == Predicate::DependsOn)
            .unwrap();
        assert_eq!(r.evidence, "推荐系统需要深度学习");
    }

    #[test]
    fn test_tail_marker_must_follow_object() {
        let entities = vec![tech("卷积神经网络", 0), tech("深度学习", 0)];
        let extractor = RelationExtractor::default();

        let text = "卷积神经网络是深度学习的一部分";
        let relations = extractor.extract(text, &entities);
        let r = relations
            .iter()
            .find(|r| r.key() == ("卷积神经网络", Predicate::BelongsTo, "深度学习"))
            .unwrap();
        assert_eq!(r.evidence, text);

        let relations = extractor.extract("卷积神经网络是深度学习", &entities);
        assert!(relations.iter().all(|r| r.predicate != Predicate::BelongsTo));
    }

    #[test]
    fn test_many_entities_in_one_document() {
        let names: Vec<String> = (0..120).map(|i| format!("模块{i:03}")).collect();
        let text: String = names
            .chunks(2)
            .map(|pair| format!("{}依赖{}。", pair[0], pair[1]))
            .collect();
        let entities: Vec<Entity> = names.iter().map(|n| tech(n, 0)).collect();

        let relations = RelationExtractor::default().extract(&text, &entities);
        assert_unique(&relations);
        assert!(
            relations
                .iter()
                .any(|r| r.key() == ("模块000", Predicate::DependsOn, "模块001"))
        );
        // Later entities follow the keyword on the same line too.
        assert!(
            relations
                .iter()
                .any(|r| r.key() == ("模块000", Predicate::DependsOn, "模块119"))
        );
        assert!(
            relations
                .iter()
                .all(|r| r.predicate != Predicate::Related
                    || !(r.subject == "模块000" && r.object == "模块001"))
        );
    }

    #[test]
    fn test_pattern_relation_suppresses_cooccurrence() {
        let text = "Spark处理数据，Kafka支持Spark。";
        let entities = vec![tech("Spark", 0), tech("Kafka", 10)];
        let relations = RelationExtractor::default().extract(text, &entities);

        assert!(relations.iter().all(|r| r.predicate != Predicate::Related));
        assert!(
            relations
                .iter()
                .any(|r| r.key() == ("Kafka", Predicate::Supports, "Spark"))
        );
        assert_unique(&relations);
    }

    #[test]
    fn test_cooccurrence_window_and_distance() {
        let text = "Python、Java、Go、Rust、Redis和MySQL以及Docker都常见。";
        let names = ["Python", "Java", "Go", "Rust", "Redis", "MySQL", "Docker"];
        let entities: Vec<Entity> = names.iter().map(|n| tech(n, 0)).collect();

        // Each list item is its own clause, so nothing links across them.
        let relations = RelationExtractor::default().extract(text, &entities);
        assert!(relations.iter().all(|r| r.subject == "Redis" || r.subject == "MySQL"));

        let text = "Python Java Go Rust Redis MySQL Docker 都很常见";
        let relations = RelationExtractor::default().extract(text, &entities);
        assert_eq!(
            relations.iter().filter(|r| r.subject == "Python").count(),
            5
        );
        assert!(
            !relations
                .iter()
                .any(|r| r.key() == ("Python", Predicate::Related, "Docker"))
        );

        let tight = RelationExtractor::new(RelationConfig {
            max_distance: 5,
            ..RelationConfig::default()
        });
        let relations = tight.extract(text, &entities);
        assert!(
            relations
                .iter()
                .all(|r| r.key() != ("Python", Predicate::Related, "Go"))
        );
    }

    #[test]
    fn test_short_segments_are_ignored() {
        let entities = vec![tech("AI", 0), tech("CV", 3)];
        let extractor = RelationExtractor::default();
        assert!(extractor.extract("AICV。", &entities).is_empty());
        assert!(extractor.extract("人工智能领域中，AI，CV。", &entities).is_empty());
    }

    #[test]
    fn test_relations_unique_and_unmirrored() {
        let text = "深度学习包含神经网络，神经网络用于计算机视觉。计算机视觉、深度学习、神经网络、数据集和算法密切相关。算法处理数据集，数据集支持深度学习。";
        let entities = RuleBasedNer::new().extract(text);
        let relations = RelationExtractor::default().extract(text, &entities);
        assert!(!relations.is_empty());
        assert_unique(&relations);
    }

    #[test]
    fn test_example_yields_related_pair() {
        let text = "机器学习是人工智能的重要分支。清华大学计算机系在2023年发表了研究。";
        let entities = RuleBasedNer::new().extract(text);
        let relations = RelationExtractor::default().extract(text, &entities);

        let related = relations
            .iter()
            .find(|r| r.key() == ("机器学习", Predicate::Related, "人工智能"))
            .unwrap();
        assert_eq!(related.confidence, 0.65);
        assert!(text.contains(&related.evidence));
    }
}
