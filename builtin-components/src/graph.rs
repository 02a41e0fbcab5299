//! Static city road graph answering routing queries with Dijkstra's algorithm.
//!
//! Nodes are intersections labeled with consecutive integers starting from 0,
//! edges are undirected road segments. Edge cost defaults to 1, which makes
//! distance equal to number of road segments on the way.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};

use dispatch_component::{Cost, RoutingOracle};
use dispatch_protocol::Position;

/// Size of grid used, when map file is not available.
pub const FALLBACK_GRID_SIZE: usize = 10;

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Failed to read graph file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse graph document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Edge {from}-{to} references node, that wasn't declared")]
    UnknownNode { from: usize, to: usize },
    #[error("Node id {id} out of range. Ids must be consecutive integers below {node_count}")]
    InvalidNodeId { id: usize, node_count: usize },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: usize,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: usize,
    pub target: usize,
    #[serde(default)]
    pub cost: Option<Cost>,
}

/// Graph as produced by external map preparation tools.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

pub struct CityGraph {
    adjacency: Vec<Vec<(usize, Cost)>>,
    coordinates: Vec<Option<(f64, f64)>>,
}

impl CityGraph {
    pub fn empty() -> CityGraph {
        CityGraph {
            adjacency: vec![],
            coordinates: vec![],
        }
    }

    /// Graph with `node_count` isolated nodes.
    pub fn with_nodes(node_count: usize) -> CityGraph {
        CityGraph {
            adjacency: vec![vec![]; node_count],
            coordinates: vec![None; node_count],
        }
    }

    /// Grid of `width` x `height` intersections. Node in row `r` and column `c`
    /// has id `r * width + c`.
    pub fn grid(width: usize, height: usize) -> CityGraph {
        let mut graph = CityGraph::with_nodes(width * height);
        for row in 0..height {
            for col in 0..width {
                let node = row * width + col;
                graph.coordinates[node] = Some((col as f64, row as f64));
                if col + 1 < width {
                    graph.add_road(node, node + 1, 1);
                }
                if row + 1 < height {
                    graph.add_road(node, node + width, 1);
                }
            }
        }
        graph
    }

    /// Node ids must be labeled `0..nodes.len()`.
    pub fn from_document(document: GraphDocument) -> Result<CityGraph, GraphError> {
        let node_count = document.nodes.len();
        if let Some(node) = document.nodes.iter().find(|node| node.id >= node_count) {
            return Err(GraphError::InvalidNodeId {
                id: node.id,
                node_count,
            });
        }

        let mut graph = CityGraph::with_nodes(node_count);
        for node in &document.nodes {
            if let (Some(x), Some(y)) = (node.x, node.y) {
                graph.coordinates[node.id] = Some((x, y));
            }
        }

        for edge in document.edges {
            if edge.source >= node_count || edge.target >= node_count {
                return Err(GraphError::UnknownNode {
                    from: edge.source,
                    to: edge.target,
                });
            }
            graph.add_road(edge.source, edge.target, edge.cost.unwrap_or(1));
        }
        Ok(graph)
    }

    pub fn load(path: &Path) -> Result<CityGraph, GraphError> {
        let content = fs::read_to_string(path).map_err(|e| GraphError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let graph = CityGraph::from_document(serde_json::from_str(&content)?)?;

        log::info!(
            "Loaded map {} with {} intersections.",
            path.display(),
            graph.node_count()
        );
        Ok(graph)
    }

    /// Loads map from file. Missing file isn't fatal, we can still negotiate
    /// on grid instead. Malformed file is an error.
    pub fn load_or_fallback(path: &Path) -> Result<CityGraph, GraphError> {
        if path.exists() {
            return CityGraph::load(path);
        }

        log::error!(
            "Map file {} not found! Using fallback {}x{} grid.",
            path.display(),
            FALLBACK_GRID_SIZE,
            FALLBACK_GRID_SIZE
        );
        Ok(CityGraph::grid(FALLBACK_GRID_SIZE, FALLBACK_GRID_SIZE))
    }

    /// Adds undirected road segment.
    pub fn add_road(&mut self, a: usize, b: usize, cost: Cost) {
        self.adjacency[a].push((b, cost));
        if a != b {
            self.adjacency[b].push((a, cost));
        }
    }

    pub fn edge_count(&self) -> usize {
        let ends: usize = self.adjacency.iter().map(Vec::len).sum();
        let self_loops = self
            .adjacency
            .iter()
            .enumerate()
            .map(|(node, edges)| edges.iter().filter(|(to, _)| *to == node).count())
            .sum::<usize>();
        (ends - self_loops) / 2 + self_loops
    }

    /// Coordinates for rendering, if map provided them.
    pub fn coordinates(&self, node: Position) -> Option<(f64, f64)> {
        self.coordinates.get(node.index()).cloned().flatten()
    }

    fn contains(&self, node: Position) -> bool {
        node.index() < self.adjacency.len()
    }

    fn shortest_path(&self, from: Position, to: Position) -> Option<(Cost, Vec<Position>)> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }

        let (from, to) = (from.index(), to.index());
        let n = self.adjacency.len();
        let mut dist = vec![Cost::MAX; n];
        let mut prev = vec![None; n];

        dist[from] = 0;

        // Node id as secondary key makes tie-breaking deterministic.
        let mut heap: BinaryHeap<Reverse<(Cost, usize)>> = BinaryHeap::new();
        heap.push(Reverse((0, from)));

        while let Some(Reverse((cost, node))) = heap.pop() {
            if node == to {
                return Some((cost, reconstruct(&prev, to)));
            }

            // Stale entry.
            if cost > dist[node] {
                continue;
            }

            for &(neighbor, edge_cost) in &self.adjacency[node] {
                let new_cost = cost.saturating_add(edge_cost);
                if new_cost < dist[neighbor] {
                    dist[neighbor] = new_cost;
                    prev[neighbor] = Some(node);
                    heap.push(Reverse((new_cost, neighbor)));
                }
            }
        }
        None
    }
}

fn reconstruct(prev: &[Option<usize>], to: usize) -> Vec<Position> {
    let mut path = vec![Position(to)];
    let mut current = to;
    while let Some(node) = prev[current] {
        path.push(Position(node));
        current = node;
    }
    path.reverse();
    path
}

impl RoutingOracle for CityGraph {
    fn distance(&self, from: Position, to: Position) -> Option<Cost> {
        self.shortest_path(from, to).map(|(cost, _)| cost)
    }

    fn path(&self, from: Position, to: Position) -> Vec<Position> {
        self.shortest_path(from, to)
            .map(|(_, path)| path)
            .unwrap_or_default()
    }

    fn node_count(&self) -> usize {
        self.adjacency.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn positions(ids: &[usize]) -> Vec<Position> {
        ids.iter().cloned().map(Position).collect()
    }

    /// 0 - 1 - 2 - 4 costs 3 in total, 0 - 3 - 4 costs 6. Node 5 is isolated.
    fn detour_graph() -> CityGraph {
        let mut graph = CityGraph::with_nodes(6);
        graph.add_road(0, 1, 1);
        graph.add_road(1, 2, 1);
        graph.add_road(2, 4, 1);
        graph.add_road(0, 3, 5);
        graph.add_road(3, 4, 1);
        graph
    }

    #[test_case(0, 4, Some(3) ; "cheaper longer path")]
    #[test_case(4, 0, Some(3) ; "undirected")]
    #[test_case(3, 2, Some(2) ; "avoids expensive edge")]
    #[test_case(2, 2, Some(0) ; "same node")]
    #[test_case(0, 5, None ; "isolated node")]
    #[test_case(0, 17, None ; "out of range")]
    fn test_distance(from: usize, to: usize, expected: Option<Cost>) {
        assert_eq!(detour_graph().distance(Position(from), Position(to)), expected);
    }

    #[test]
    fn test_path() {
        let graph = detour_graph();
        assert_eq!(graph.path(Position(0), Position(4)), positions(&[0, 1, 2, 4]));
        assert_eq!(graph.path(Position(2), Position(2)), positions(&[2]));
        assert!(graph.path(Position(0), Position(5)).is_empty());
        assert!(graph.path(Position(42), Position(0)).is_empty());
    }

    #[test]
    fn test_empty_graph_is_unreachable() {
        let graph = CityGraph::empty();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.distance(Position(0), Position(0)), None);
        assert!(graph.path(Position(0), Position(0)).is_empty());
    }

    #[test]
    fn test_grid() {
        let graph = CityGraph::grid(10, 10);
        assert_eq!(graph.node_count(), 100);
        assert_eq!(graph.edge_count(), 180);
        // Manhattan distance between opposite corners.
        assert_eq!(graph.distance(Position(0), Position(99)), Some(18));
        assert_eq!(graph.path(Position(0), Position(99)).len(), 19);
        assert_eq!(graph.coordinates(Position(12)), Some((2.0, 1.0)));
    }

    #[test]
    fn test_path_is_deterministic() {
        // Many equally short paths exist on grid.
        let graph = CityGraph::grid(5, 5);
        let first = graph.path(Position(0), Position(24));
        for _ in 0..10 {
            assert_eq!(graph.path(Position(0), Position(24)), first);
        }
    }

    #[test]
    fn test_from_document() {
        let document: GraphDocument = serde_json::from_str(
            r#"{
                "nodes": [{"id": 0, "x": 1.5, "y": 2.5}, {"id": 1}, {"id": 2}],
                "edges": [{"source": 0, "target": 1, "cost": 4}, {"source": 1, "target": 2}]
            }"#,
        )
        .unwrap();

        let graph = CityGraph::from_document(document).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.distance(Position(0), Position(2)), Some(5));
        assert_eq!(graph.coordinates(Position(0)), Some((1.5, 2.5)));
        assert_eq!(graph.coordinates(Position(1)), None);
    }

    #[test]
    fn test_document_with_unknown_node() {
        let document = GraphDocument {
            nodes: vec![NodeRecord {
                id: 0,
                x: None,
                y: None,
            }],
            edges: vec![EdgeRecord {
                source: 0,
                target: 3,
                cost: None,
            }],
        };

        match CityGraph::from_document(document) {
            Err(GraphError::UnknownNode { from, to }) => assert_eq!((from, to), (0, 3)),
            _ => panic!("Expected UnknownNode error"),
        }
    }

    #[test_case(r#"{"nodes": [{"id": 18446744073709551615}], "edges": []}"# ; "max id")]
    #[test_case(r#"{"nodes": [{"id": 0}, {"id": 1000000000}], "edges": []}"# ; "sparse ids")]
    #[test_case(r#"{"nodes": [{"id": 1}], "edges": []}"# ; "not starting from zero")]
    fn test_document_with_invalid_node_id(document: &str) {
        let document: GraphDocument = serde_json::from_str(document).unwrap();
        assert!(matches!(
            CityGraph::from_document(document),
            Err(GraphError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_grid() {
        let graph = CityGraph::load_or_fallback(Path::new("/definitely/not/here.json")).unwrap();
        assert_eq!(graph.node_count(), FALLBACK_GRID_SIZE * FALLBACK_GRID_SIZE);
    }
}
