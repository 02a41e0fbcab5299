use serde::{Deserialize, Serialize};

use crate::identity::Position;

/// Committed outcome of negotiation session, as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(rename = "agent_name")]
    pub requester_name: String,
    pub start_node: Position,
    pub end_node: Position,
    pub path: Vec<Position>,
    /// Path nodes without the first and last one.
    #[serde(rename = "traffic_lights")]
    pub intermediate_nodes: Vec<Position>,
    /// Positions of all Providers, that responded to the request.
    #[serde(rename = "all_hospitals")]
    pub all_candidate_nodes: Vec<Position>,
}

impl TripRecord {
    pub fn new(
        requester_name: &str,
        path: Vec<Position>,
        start_node: Position,
        end_node: Position,
        all_candidate_nodes: Vec<Position>,
    ) -> TripRecord {
        let intermediate_nodes = if path.len() > 2 {
            path[1..path.len() - 1].to_vec()
        } else {
            vec![]
        };

        TripRecord {
            requester_name: requester_name.to_string(),
            start_node,
            end_node,
            path,
            intermediate_nodes,
            all_candidate_nodes,
        }
    }
}
