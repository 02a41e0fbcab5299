use dispatch_protocol::Position;

/// Cost of traversing path on routing graph.
pub type Cost = u64;

/// Answers distance and path queries over static routing graph.
///
/// Implementations must be deterministic and side-effect free, because single
/// oracle is shared by all agents. Queries about nodes that don't exist in graph
/// aren't errors: they are answered the same way as queries about disconnected
/// nodes, so callers can treat them as "no viable offer".
pub trait RoutingOracle: Send + Sync {
    /// Minimum path cost between nodes or `None` if `to` can't be reached.
    fn distance(&self, from: Position, to: Position) -> Option<Cost>;

    /// Nodes of minimum cost path, including both ends. Empty if unreachable.
    fn path(&self, from: Position, to: Position) -> Vec<Position>;

    fn node_count(&self) -> usize;
}
