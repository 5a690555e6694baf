use std::collections::HashSet;

use crate::graph::{GraphEdge, GraphNode, Subgraph};

/// The subgraph induced by `members`: every member becomes a node, and a
/// candidate edge survives only if both endpoints are members. Candidates
/// may be a superset such as every edge touching any member.
pub fn induced_subgraph<I>(members: Vec<GraphNode>, candidates: I) -> Subgraph
where
    I: IntoIterator<Item = GraphEdge>,
{
    let mut seen_nodes = HashSet::new();
    let nodes: Vec<GraphNode> = members
        .into_iter()
        .filter(|node| seen_nodes.insert(node.text.clone()))
        .collect();

    let mut seen_edges = HashSet::new();
    let edges = candidates
        .into_iter()
        .filter(|edge| seen_nodes.contains(&edge.source) && seen_nodes.contains(&edge.target))
        .filter(|edge| {
            seen_edges.insert((edge.source.clone(), edge.relation.clone(), edge.target.clone()))
        })
        .collect();

    Subgraph { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(text: &str) -> GraphNode {
        GraphNode {
            id: text.to_string(),
            text: text.to_string(),
            label: "TECH".to_string(),
            confidence: 0.9,
        }
    }

    fn edge(source: &str, target: &str) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            relation: "related".to_string(),
            confidence: 0.65,
        }
    }

    #[test]
    fn test_edges_leaving_the_member_set_are_dropped() {
        let graph = induced_subgraph(
            vec![node("X"), node("Y"), node("W")],
            vec![edge("X", "Y"), edge("Y", "Z"), edge("Z", "X"), edge("X", "Y")],
        );
        let texts: Vec<_> = graph.nodes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["X", "Y", "W"]);
        assert_eq!(graph.edges, vec![edge("X", "Y")]);
    }

    #[test]
    fn test_duplicate_members_collapse() {
        let graph = induced_subgraph(vec![node("X"), node("X")], Vec::new());
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
    }
}
