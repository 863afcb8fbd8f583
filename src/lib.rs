//! WarpGrid auto-rebalance strategy — deterministic partition placement.
//!
//! This crate computes a new mapping of partitions (and their replicas,
//! each in a specific role/state) to cluster nodes, given the current
//! assignment, the set of live nodes, and a policy describing how many
//! replicas of each role are required. It is purely computational: no
//! cluster-state I/O, no message/task execution, no persisted state of
//! its own — callers supply snapshots and persist the returned record.
//!
//! # Components
//!
//! - **`scheme`** — pluggable preferred-location function
//! - **`state_count`** — resolves a state-model definition into concrete counts
//! - **`model`** — in-memory node/replica records for one computation
//! - **`algorithm`** — the rebalance algorithm itself
//! - **`driver`** — adapts caller cluster snapshots to/from the algorithm
//! - **`hash`** — deterministic string hashing for stable placement starts
//! - **`error`** — driver-level failure modes
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use warpgrid_rebalance::algorithm::{compute_partition_assignment, AssignmentInput};
//! use warpgrid_rebalance::scheme::DefaultPlacementScheme;
//!
//! let scheme = DefaultPlacementScheme;
//! let input = AssignmentInput {
//!     resource_name: "db".to_string(),
//!     partitions: vec!["db_0".to_string(), "db_1".to_string(), "db_2".to_string()],
//!     state_count: vec![("MASTER".to_string(), 1), ("SLAVE".to_string(), 1)],
//!     max_per_node: -1,
//!     scheme: &scheme,
//!     live_nodes: vec!["n0".to_string(), "n1".to_string(), "n2".to_string()],
//!     all_nodes: vec!["n0".to_string(), "n1".to_string(), "n2".to_string()],
//!     current_mapping: HashMap::new(),
//! };
//! let assignment = compute_partition_assignment(&input);
//! assert_eq!(assignment.list["db_0"].len(), 2);
//! ```

pub mod algorithm;
pub mod driver;
pub mod error;
pub mod hash;
pub mod model;
pub mod scheme;
pub mod state_count;

pub use algorithm::{compute_partition_assignment, AssignmentInput, PartitionAssignment};
pub use driver::{
    compute_new_ideal_state, ClusterDataCache, CurrentStateOutput, IdealState, IdealStateMode,
};
pub use error::{RebalanceError, RebalanceResult};
pub use model::{Node, NodeId, PartitionId, Replica, StateName};
pub use scheme::{DefaultPlacementScheme, PlacementScheme};
pub use state_count::{resolve_state_count, CountSpec, StateModelDefinition};
