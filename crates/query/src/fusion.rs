use std::collections::HashSet;

use index::RetrievedResult;

/// Share of distinct lower-cased whitespace tokens of `query` that occur
/// as substrings of `text`. Zero for a query with no tokens.
pub fn keyword_score(query: &str, text: &str) -> f32 {
    let lowered = query.to_lowercase();
    let tokens: HashSet<&str> = lowered.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let found = tokens.iter().filter(|t| text.contains(**t)).count();
    found as f32 / tokens.len() as f32
}

/// Blend semantic and keyword scores, rank by the blend, keep `top_k`.
/// `semantic_weight` is clamped to `[0, 1]`. Ties keep semantic order.
pub fn fuse(
    mut candidates: Vec<RetrievedResult>,
    query: &str,
    semantic_weight: f32,
    top_k: usize,
) -> Vec<RetrievedResult> {
    let weight = semantic_weight.clamp(0.0, 1.0);

    for candidate in &mut candidates {
        let keyword = keyword_score(query, &candidate.text);
        candidate.keyword_score = Some(keyword);
        candidate.combined_score = Some(weight * candidate.score + (1.0 - weight) * keyword);
    }

    candidates.sort_by(|a, b| b.rank_score().total_cmp(&a.rank_score()));
    candidates.truncate(top_k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::Metadata;

    fn hit(id: &str, text: &str, score: f32) -> RetrievedResult {
        RetrievedResult {
            id: id.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            score,
            keyword_score: None,
            combined_score: None,
        }
    }

    fn candidates() -> Vec<RetrievedResult> {
        vec![
            hit("a", "graph databases store nodes", 0.9),
            hit("b", "Rust graph library with neo4j driver", 0.6),
            hit("c", "unrelated weather report", 0.4),
            hit("d", "Neo4j graph query language", 0.3),
        ]
    }

    fn ids(results: &[RetrievedResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_keyword_score() {
        assert_eq!(keyword_score("Neo4j Graph graph", "a NEO4J graph"), 1.0);
        assert_eq!(keyword_score("neo4j rust", "neo4j only"), 0.5);
        assert_eq!(keyword_score("   ", "anything"), 0.0);
        assert_eq!(keyword_score("知识图谱", "构建知识图谱的方法"), 1.0);
    }

    #[test]
    fn test_full_semantic_weight_keeps_semantic_order() {
        let fused = fuse(candidates(), "neo4j graph", 1.0, 4);
        assert_eq!(ids(&fused), vec!["a", "b", "c", "d"]);
        assert_eq!(fused[0].combined_score, Some(0.9));
    }

    #[test]
    fn test_zero_semantic_weight_orders_by_keywords() {
        let fused = fuse(candidates(), "neo4j graph", 0.0, 4);
        let keyword_scores: Vec<f32> = fused.iter().map(|r| r.keyword_score.unwrap()).collect();
        assert!(keyword_scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(ids(&fused)[..2], ["b", "d"]);
        assert_eq!(fused[3].id, "c");
    }

    #[test]
    fn test_blend_and_truncate() {
        let fused = fuse(candidates(), "neo4j graph", 0.5, 2);
        assert_eq!(fused.len(), 2);
        // b: 0.5*0.6 + 0.5*1.0 = 0.8 beats a: 0.5*0.9 + 0.5*0.5 = 0.7
        assert_eq!(ids(&fused), vec!["b", "a"]);
        assert!((fused[0].combined_score.unwrap() - 0.8).abs() < 1e-6);
    }
}
