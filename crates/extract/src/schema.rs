use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Built-in entity labels. The label set is open: model-backed extraction
/// may produce others.
pub mod label {
    pub const TECH: &str = "TECH";
    pub const ORG: &str = "ORG";
    pub const PERSON: &str = "PERSON";
    pub const DATE: &str = "DATE";
    pub const NUMBER: &str = "NUMBER";
}

/// A labelled span of the source text. Offsets count characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
    pub start_char: usize,
    pub end_char: usize,
    pub confidence: f32,
}

impl Entity {
    pub fn new(
        text: impl Into<String>,
        label: impl Into<String>,
        start_char: usize,
        end_char: usize,
        confidence: f32,
    ) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
            start_char,
            end_char,
            confidence,
        }
    }

    pub fn span_len(&self) -> usize {
        self.end_char.saturating_sub(self.start_char)
    }

    pub fn overlaps(&self, other: &Entity) -> bool {
        self.start_char < other.end_char && other.start_char < self.end_char
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    BelongsTo,
    Contains,
    UsedFor,
    Implements,
    Supports,
    DependsOn,
    Produces,
    Processes,
    /// Generic co-occurrence link.
    Related,
}

impl Predicate {
    /// Predicates backed by surface patterns, in matching order.
    pub const PATTERNED: [Predicate; 8] = [
        Predicate::BelongsTo,
        Predicate::Contains,
        Predicate::UsedFor,
        Predicate::Implements,
        Predicate::Supports,
        Predicate::DependsOn,
        Predicate::Produces,
        Predicate::Processes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::BelongsTo => "belongs_to",
            Predicate::Contains => "contains",
            Predicate::UsedFor => "used_for",
            Predicate::Implements => "implements",
            Predicate::Supports => "supports",
            Predicate::DependsOn => "depends_on",
            Predicate::Produces => "produces",
            Predicate::Processes => "processes",
            Predicate::Related => "related",
        }
    }

    /// Relationship type used for typed graph edges.
    pub fn edge_type(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Predicate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase();
        Predicate::PATTERNED
            .iter()
            .chain(std::iter::once(&Predicate::Related))
            .find(|p| p.as_str() == normalized)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown predicate: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub subject: String,
    pub predicate: Predicate,
    pub object: String,
    pub confidence: f32,
    pub evidence: String,
}

impl Relation {
    pub fn key(&self) -> (&str, Predicate, &str) {
        (&self.subject, self.predicate, &self.object)
    }
}
