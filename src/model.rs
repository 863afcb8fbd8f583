//! In-memory data model for a single `compute_partition_assignment` call.
//!
//! These are plain value records scoped to one invocation — there is no
//! mutable outer-class state that leaks across calls (§9, re-architecture
//! point: "inner classes owning outer-class state").

use std::collections::HashSet;

/// Opaque partition identifier.
pub type PartitionId = String;

/// Opaque, stable-across-invocations node identifier.
pub type NodeId = String;

/// Opaque state/role name (e.g. `"MASTER"`, `"SLAVE"`, `"OFFLINE"`).
pub type StateName = String;

/// One of `numReplicas` copies of a partition, identified by
/// `(partition, replicaIndex)`.
///
/// Ordering and equality follow `(partition, replicaIndex)` lexicographically,
/// equivalent to comparing the canonical `"partition|replicaIndex"` string as
/// long as partition names contain no `|` (§9, re-architecture point).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Replica {
    pub partition: PartitionId,
    pub replica_index: u32,
}

impl Replica {
    pub fn new(partition: impl Into<PartitionId>, replica_index: u32) -> Self {
        Self {
            partition: partition.into(),
            replica_index,
        }
    }

    /// Canonical `"partition|replicaIndex"` form, used for hashing and logs.
    pub fn canonical(&self) -> String {
        format!("{}|{}", self.partition, self.replica_index)
    }
}

impl std::fmt::Display for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Per-computation working record for one cluster instance.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub is_alive: bool,
    /// Target number of replicas for this node this round (0 if not live).
    pub capacity: u32,
    /// Running count during algorithm execution.
    pub currently_assigned: u32,
    /// Replicas placed at their preferred location.
    pub preferred: Vec<Replica>,
    /// Replicas placed elsewhere.
    pub non_preferred: Vec<Replica>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, is_alive: bool, capacity: u32) -> Self {
        Self {
            id: id.into(),
            is_alive,
            capacity,
            currently_assigned: 0,
            preferred: Vec::new(),
            non_preferred: Vec::new(),
        }
    }

    /// True iff the node is alive, under capacity, and does not already
    /// host a replica of this replica's partition (§4.4).
    pub fn can_add(&self, replica: &Replica) -> bool {
        if !self.is_alive {
            return false;
        }
        if self.currently_assigned >= self.capacity {
            return false;
        }
        !self.hosts_partition(&replica.partition)
    }

    /// Whether any replica of `partition` is already assigned to this node,
    /// preferred or not (enforces §3/I2 anti-affinity).
    pub fn hosts_partition(&self, partition: &str) -> bool {
        self.preferred.iter().any(|r| r.partition == partition)
            || self.non_preferred.iter().any(|r| r.partition == partition)
    }

    /// All replicas currently hosted, preferred first then non-preferred,
    /// matching the emission order in §4.3.6.
    pub fn all_replicas(&self) -> impl Iterator<Item = &Replica> {
        self.preferred.iter().chain(self.non_preferred.iter())
    }
}

/// Distributes `total` capacity across `live_nodes` per §3/I4: the first
/// `total % live_nodes.len()` nodes (in the given order) get `floor + 1`,
/// the rest get `floor`. Each result is additionally capped by
/// `max_per_node` if positive.
pub fn distribute_capacity(total: u32, live_nodes: &[NodeId], max_per_node: i64) -> Vec<u32> {
    if live_nodes.is_empty() {
        return Vec::new();
    }
    let n = live_nodes.len() as u32;
    let floor = total / n;
    let remainder = total % n;

    (0..live_nodes.len())
        .map(|i| {
            let base = if (i as u32) < remainder { floor + 1 } else { floor };
            if max_per_node > 0 {
                base.min(max_per_node as u32)
            } else {
                base
            }
        })
        .collect()
}

/// Computes the `replicaIndex → state` map from an ordered state-count list
/// (§3 Replica): the first `count[s0]` indices get `s0`, the next
/// `count[s1]` get `s1`, and so on.
pub fn state_map(ordered_counts: &[(StateName, u32)]) -> Vec<StateName> {
    let mut result = Vec::new();
    for (state, count) in ordered_counts {
        for _ in 0..*count {
            result.push(state.clone());
        }
    }
    result
}

/// Ordered set of orphaned replicas (§4.3.2): ordered by canonical replica
/// string so iteration in Pass 2 is deterministic.
#[derive(Debug, Clone, Default)]
pub struct OrphanSet {
    seen: HashSet<Replica>,
    ordered: Vec<Replica>,
}

impl OrphanSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, replica: Replica) {
        if self.seen.insert(replica.clone()) {
            self.ordered.push(replica);
            self.ordered.sort();
        }
    }

    pub fn remove(&mut self, replica: &Replica) {
        self.seen.remove(replica);
        self.ordered.retain(|r| r != replica);
    }

    pub fn iter_ordered(&self) -> impl Iterator<Item = &Replica> {
        self.ordered.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
