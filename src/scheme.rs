//! Pluggable preferred-location scheme (§4.1).
//!
//! A `PlacementScheme` is a capability set, not a trait object hierarchy for
//! its own sake (§9, re-architecture point: "polymorphism via interface"):
//! a pure location function, plus an optional `init` hook for schemes that
//! need to capture cluster handles. The default scheme's `init` is a no-op.

use crate::model::NodeId;

/// Pluggable scheme mapping a replica to its preferred node, ignoring
/// liveness. Implementations must be pure and deterministic in their
/// arguments, and must return a node id present in `all_node_ids`.
///
/// `partition_ordinal` is the replica's partition's 0-based position in the
/// caller-supplied, order-stable `partitions` list — the scheme never sees
/// partition ids directly, since they are opaque strings with no inherent
/// numeric value.
pub trait PlacementScheme: Send + Sync {
    /// Cluster-handle acquisition hook. No-op unless a scheme needs it.
    fn init(&mut self) {}

    fn location(
        &self,
        partition_ordinal: u64,
        replica_id: u32,
        num_partitions: u64,
        num_replicas: u32,
        all_node_ids: &[NodeId],
    ) -> NodeId;
}

/// Default scheme: spreads replicas of the same partition across distinct
/// nodes, choosing between three index formulas depending on how the node
/// count relates to the partition count (§4.1).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlacementScheme;

impl PlacementScheme for DefaultPlacementScheme {
    fn location(
        &self,
        partition_ordinal: u64,
        replica_id: u32,
        num_partitions: u64,
        _num_replicas: u32,
        all_node_ids: &[NodeId],
    ) -> NodeId {
        let n = all_node_ids.len() as u64;
        debug_assert!(n > 0, "all_node_ids must be non-empty");

        let replica_id = u64::from(replica_id);
        let base = partition_ordinal + replica_id * num_partitions;

        let index = if n > num_partitions {
            base % n
        } else if n == num_partitions {
            (base % n + replica_id) % n
        } else {
            (partition_ordinal + replica_id) % n
        };

        all_node_ids[index as usize].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<NodeId> {
        (0..n).map(|i| format!("n{i}")).collect()
    }

    #[test]
    fn deterministic_for_same_arguments() {
        let scheme = DefaultPlacementScheme;
        let all = nodes(5);
        let a = scheme.location(2, 1, 3, 2, &all);
        let b = scheme.location(2, 1, 3, 2, &all);
        assert_eq!(a, b);
    }

    #[test]
    fn returns_a_node_from_all_node_ids() {
        let scheme = DefaultPlacementScheme;
        let all = nodes(4);
        for p in 0..3u64 {
            for r in 0..2u32 {
                let loc = scheme.location(p, r, 3, 2, &all);
                assert!(all.contains(&loc));
            }
        }
    }

    #[test]
    fn more_nodes_than_partitions_spreads_replicas() {
        // 5 nodes, 2 partitions, 2 replicas each: replicas of the same
        // partition should land on different nodes.
        let scheme = DefaultPlacementScheme;
        let all = nodes(5);
        let r0 = scheme.location(0, 0, 2, 2, &all);
        let r1 = scheme.location(0, 1, 2, 2, &all);
        assert_ne!(r0, r1);
    }

    #[test]
    fn equal_nodes_and_partitions_uses_offset_formula() {
        // n == numPartitions branch adds replica_id before the final mod.
        let scheme = DefaultPlacementScheme;
        let all = nodes(3);
        let r0 = scheme.location(0, 0, 3, 2, &all);
        let r1 = scheme.location(0, 1, 3, 2, &all);
        assert_ne!(r0, r1);
    }

    #[test]
    fn fewer_nodes_than_partitions_uses_sum_formula() {
        let scheme = DefaultPlacementScheme;
        let all = nodes(2);
        let loc = scheme.location(5, 1, 8, 2, &all);
        assert_eq!(loc, all[(5 + 1) % 2]);
    }
}
