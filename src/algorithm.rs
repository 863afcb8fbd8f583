//! The rebalance algorithm (§4.3): builds the node set, computes the
//! preferred plan, classifies current assignments into preferred /
//! non-preferred / orphaned, then runs three transformation passes
//! (promote, place orphans, drain overfull) and emits the result.
//!
//! This module is purely computational (§5): no I/O, no suspension points,
//! no shared mutable state across calls. Every `compute_partition_assignment`
//! call builds its own `Vec<Node>` and discards it on return.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::hash::canonical_hash;
use crate::model::{distribute_capacity, state_map, Node, NodeId, OrphanSet, PartitionId, Replica, StateName};
use crate::scheme::PlacementScheme;

/// Input to a single `compute_partition_assignment` call (§6.1).
pub struct AssignmentInput<'a> {
    pub resource_name: String,
    /// Order-stable; also defines each partition's ordinal for the scheme.
    pub partitions: Vec<PartitionId>,
    /// Resolved, ordered `StateName → count` (see `state_count::resolve_state_count`).
    pub state_count: Vec<(StateName, u32)>,
    /// `<= 0` means unlimited.
    pub max_per_node: i64,
    pub scheme: &'a dyn PlacementScheme,
    /// Order-stable; this order seeds capacity distribution (§3/I4).
    pub live_nodes: Vec<NodeId>,
    /// Superset of `live_nodes`.
    pub all_nodes: Vec<NodeId>,
    pub current_mapping: HashMap<PartitionId, HashMap<NodeId, StateName>>,
}

/// Output of `compute_partition_assignment` (§3, §6.1): a map field and a
/// list field, both keyed by partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartitionAssignment {
    pub map: HashMap<PartitionId, HashMap<NodeId, StateName>>,
    pub list: HashMap<PartitionId, Vec<NodeId>>,
}

impl PartitionAssignment {
    fn empty() -> Self {
        Self::default()
    }

    /// Serializes the record to JSON, the way `warpgrid-state`'s store
    /// serializes domain records before persisting them (§6.4: "the caller
    /// persists the returned record" — this crate owns no storage of its
    /// own, just the serialization of what it hands back).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Swaps out two distinct mutable references into the same slice. Panics
/// if `i == j` — callers must ensure donor/receiver indices differ, which
/// they always do for every move this algorithm performs.
fn two_mut<T>(v: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    assert_ne!(i, j, "two_mut requires distinct indices");
    if i < j {
        let (left, right) = v.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = v.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

/// Computes a new partition assignment for one resource (§4.3, §6.1).
///
/// Never fails: degraded outcomes (unplaceable orphans, undrainable
/// overfull donors) are logged as warnings and the partially-complete
/// result is still returned (§7).
pub fn compute_partition_assignment(input: &AssignmentInput<'_>) -> PartitionAssignment {
    let num_replicas: u32 = input.state_count.iter().map(|(_, c)| *c).sum();

    if input.live_nodes.is_empty() {
        info!(
            resource = %input.resource_name,
            "no live nodes — returning empty assignment"
        );
        return PartitionAssignment::empty();
    }
    if num_replicas == 0 || input.partitions.is_empty() {
        return PartitionAssignment::empty();
    }

    // ── §4.3.1 setup ────────────────────────────────────────────────
    let total_capacity = num_replicas as u64 * input.partitions.len() as u64;
    let capacities = distribute_capacity(
        total_capacity.min(u64::from(u32::MAX)) as u32,
        &input.live_nodes,
        input.max_per_node,
    );
    let live_capacity: HashMap<&NodeId, u32> =
        input.live_nodes.iter().zip(capacities.iter().copied()).collect();

    let mut nodes: Vec<Node> = Vec::with_capacity(input.all_nodes.len());
    let mut node_index: HashMap<NodeId, usize> = HashMap::with_capacity(input.all_nodes.len());
    for id in &input.all_nodes {
        let is_live = live_capacity.contains_key(id);
        let capacity = live_capacity.get(id).copied().unwrap_or(0);
        node_index.insert(id.clone(), nodes.len());
        nodes.push(Node::new(id.clone(), is_live, capacity));
    }

    let state_map_vec = state_map(&input.state_count);

    let num_partitions = input.partitions.len() as u64;
    let mut preferred_assignment: HashMap<Replica, NodeId> =
        HashMap::with_capacity((num_partitions as usize) * num_replicas as usize);
    for (ordinal, partition) in input.partitions.iter().enumerate() {
        for replica_index in 0..num_replicas {
            let replica = Replica::new(partition.clone(), replica_index);
            let node_id = input.scheme.location(
                ordinal as u64,
                replica_index,
                num_partitions,
                num_replicas,
                &input.all_nodes,
            );
            preferred_assignment.insert(replica, node_id);
        }
    }

    // ── §4.3.2 classification ───────────────────────────────────────
    struct Occurrence {
        partition: PartitionId,
        node: NodeId,
    }
    let mut occurrences: Vec<Occurrence> = Vec::new();
    for partition in &input.partitions {
        if let Some(node_map) = input.current_mapping.get(partition) {
            let mut node_ids: Vec<&NodeId> = node_map.keys().collect();
            node_ids.sort();
            for node_id in node_ids {
                occurrences.push(Occurrence {
                    partition: partition.clone(),
                    node: node_id.clone(),
                });
            }
        }
    }

    let mut existing_preferred: HashSet<Replica> = HashSet::new();
    let mut existing_non_preferred_set: HashSet<Replica> = HashSet::new();
    let mut existing_non_preferred: Vec<(Replica, NodeId)> = Vec::new();
    let mut matched = vec![false; occurrences.len()];

    for (i, occ) in occurrences.iter().enumerate() {
        let Some(&node_idx) = node_index.get(&occ.node) else {
            warn!(node = %occ.node, partition = %occ.partition, "current mapping references unknown node id, ignoring");
            continue;
        };
        nodes[node_idx].currently_assigned += 1;

        // A dead node can never host a replica going forward (§3/I3), even
        // one whose preferred node it happens to be — classifying it as
        // preferred here would bury the replica on a node emission never
        // visits (§4.3.6 only walks `live_nodes`), dropping it silently
        // instead of letting it fall through to the orphan pool below.
        if !nodes[node_idx].is_alive {
            continue;
        }

        if nodes[node_idx].preferred.iter().any(|r| r.partition == occ.partition) {
            continue;
        }

        let mut found = None;
        for ri in 0..num_replicas {
            let r = Replica::new(occ.partition.clone(), ri);
            if existing_preferred.contains(&r) {
                continue;
            }
            if preferred_assignment.get(&r) == Some(&occ.node) {
                found = Some(r);
                break;
            }
        }
        if let Some(r) = found {
            existing_preferred.insert(r.clone());
            nodes[node_idx].preferred.push(r);
            matched[i] = true;
        }
    }

    for (i, occ) in occurrences.iter().enumerate() {
        if matched[i] {
            continue;
        }
        let Some(&node_idx) = node_index.get(&occ.node) else {
            continue;
        };
        // Same reasoning as the first pass: a dead node is never a valid
        // donor for Pass 3 (which only iterates `live_nodes`), so parking
        // the replica as non-preferred here would strand it just as badly
        // as parking it as preferred would. Leave it unclaimed so it joins
        // `orphaned` below.
        if !nodes[node_idx].is_alive {
            continue;
        }
        if nodes[node_idx].preferred.iter().any(|r| r.partition == occ.partition) {
            continue;
        }

        let mut found = None;
        for ri in 0..num_replicas {
            let r = Replica::new(occ.partition.clone(), ri);
            if existing_preferred.contains(&r) || existing_non_preferred_set.contains(&r) {
                continue;
            }
            match preferred_assignment.get(&r) {
                Some(pref) if *pref != occ.node => {
                    found = Some(r);
                    break;
                }
                _ => {}
            }
        }
        if let Some(r) = found {
            existing_non_preferred_set.insert(r.clone());
            nodes[node_idx].non_preferred.push(r.clone());
            existing_non_preferred.push((r, occ.node.clone()));
        }
    }

    let mut orphans = OrphanSet::new();
    for partition in &input.partitions {
        for ri in 0..num_replicas {
            let r = Replica::new(partition.clone(), ri);
            if !existing_preferred.contains(&r) && !existing_non_preferred_set.contains(&r) {
                orphans.insert(r);
            }
        }
    }

    // ── §4.3.3 Pass 1 — promote non-preferred to preferred ─────────
    for (replica, donor_id) in &existing_non_preferred {
        let donor_idx = node_index[donor_id];
        let Some(receiver_id) = preferred_assignment.get(replica) else {
            continue;
        };
        let receiver_idx = node_index[receiver_id];
        debug_assert_ne!(donor_idx, receiver_idx);

        let (donor, receiver) = two_mut(&mut nodes, donor_idx, receiver_idx);
        let donor_over = donor.currently_assigned > donor.capacity;
        let receiver_under = receiver.currently_assigned < receiver.capacity;
        let receiver_can_add = receiver.can_add(replica);

        if donor_over && receiver_under && receiver_can_add {
            donor.non_preferred.retain(|r| r != replica);
            donor.currently_assigned -= 1;
            receiver.preferred.push(replica.clone());
            receiver.currently_assigned += 1;
            debug!(
                resource = %input.resource_name,
                replica = %replica,
                donor = %donor_id,
                receiver = %receiver_id,
                "promoted non-preferred replica to preferred"
            );
        }
    }

    // ── §4.3.4 Pass 2 — place orphans ───────────────────────────────
    let live_count = input.live_nodes.len();
    let ordered_orphans: Vec<Replica> = orphans.iter_ordered().cloned().collect();
    let mut unplaced: Vec<Replica> = Vec::new();

    for replica in ordered_orphans {
        let start = (canonical_hash(&replica.canonical()) & 0x7FFF_FFFF) as usize % live_count;
        let mut placed = false;
        for offset in 0..live_count {
            let node_id = &input.live_nodes[(start + offset) % live_count];
            let idx = node_index[node_id];
            if nodes[idx].currently_assigned < nodes[idx].capacity && nodes[idx].can_add(&replica) {
                nodes[idx].non_preferred.push(replica.clone());
                nodes[idx].currently_assigned += 1;
                placed = true;
                debug!(resource = %input.resource_name, replica = %replica, node = %node_id, "placed orphan");
                break;
            }
        }
        if !placed {
            unplaced.push(replica);
        }
    }
    if !unplaced.is_empty() {
        warn!(
            resource = %input.resource_name,
            count = unplaced.len(),
            replicas = ?unplaced.iter().map(Replica::to_string).collect::<Vec<_>>(),
            "could not place all orphaned replicas — insufficient cluster capacity"
        );
    }

    // ── §4.3.5 Pass 3 — drain overfull nodes ────────────────────────
    for node_id in &input.live_nodes {
        let donor_idx = node_index[node_id];
        if nodes[donor_idx].currently_assigned <= nodes[donor_idx].capacity {
            continue;
        }
        nodes[donor_idx].non_preferred.sort();

        let mut i = 0;
        while nodes[donor_idx].currently_assigned > nodes[donor_idx].capacity
            && i < nodes[donor_idx].non_preferred.len()
        {
            let replica = nodes[donor_idx].non_preferred[i].clone();
            let start = (canonical_hash(&replica.canonical()) & 0x7FFF_FFFF) as usize % live_count;
            let mut moved = false;

            for offset in 0..live_count {
                let receiver_id = &input.live_nodes[(start + offset) % live_count];
                let receiver_idx = node_index[receiver_id];
                if receiver_idx == donor_idx {
                    continue;
                }
                if nodes[receiver_idx].can_add(&replica) {
                    let (donor, receiver) = two_mut(&mut nodes, donor_idx, receiver_idx);
                    donor.non_preferred.remove(i);
                    donor.currently_assigned -= 1;
                    receiver.non_preferred.push(replica.clone());
                    receiver.currently_assigned += 1;
                    moved = true;
                    debug!(
                        resource = %input.resource_name,
                        replica = %replica,
                        donor = %node_id,
                        receiver = %receiver_id,
                        "drained replica from overfull node"
                    );
                    break;
                }
            }
            if !moved {
                i += 1;
            }
        }

        if nodes[donor_idx].currently_assigned > nodes[donor_idx].capacity {
            warn!(
                resource = %input.resource_name,
                node = %node_id,
                excess = nodes[donor_idx].currently_assigned - nodes[donor_idx].capacity,
                "could not fully drain overfull node"
            );
        }
    }

    // ── §4.3.6 emission ──────────────────────────────────────────────
    let mut map: HashMap<PartitionId, HashMap<NodeId, StateName>> = HashMap::new();
    let mut list: HashMap<PartitionId, Vec<NodeId>> = HashMap::new();
    for partition in &input.partitions {
        map.insert(partition.clone(), HashMap::new());
        list.insert(partition.clone(), Vec::new());
    }

    for node_id in &input.live_nodes {
        let idx = node_index[node_id];
        for replica in nodes[idx].all_replicas() {
            if let Some(state) = state_map_vec.get(replica.replica_index as usize) {
                map.get_mut(&replica.partition)
                    .expect("partition initialized above")
                    .insert(node_id.clone(), state.clone());
            }
        }
    }

    for partition in &input.partitions {
        for ri in 0..num_replicas {
            for node_id in &input.live_nodes {
                let idx = node_index[node_id];
                if nodes[idx]
                    .all_replicas()
                    .any(|r| r.partition == *partition && r.replica_index == ri)
                {
                    list.get_mut(partition).expect("partition initialized above").push(node_id.clone());
                    break;
                }
            }
        }
    }

    info!(
        resource = %input.resource_name,
        partitions = input.partitions.len(),
        replicas_per_partition = num_replicas,
        orphaned = unplaced.len(),
        "computed partition assignment"
    );

    PartitionAssignment { map, list }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::DefaultPlacementScheme;

    fn input<'a>(
        partitions: &[&str],
        state_count: Vec<(&str, u32)>,
        live: &[&str],
        all: &[&str],
        scheme: &'a DefaultPlacementScheme,
    ) -> AssignmentInput<'a> {
        AssignmentInput {
            resource_name: "db".to_string(),
            partitions: partitions.iter().map(|s| s.to_string()).collect(),
            state_count: state_count.into_iter().map(|(s, c)| (s.to_string(), c)).collect(),
            max_per_node: -1,
            scheme,
            live_nodes: live.iter().map(|s| s.to_string()).collect(),
            all_nodes: all.iter().map(|s| s.to_string()).collect(),
            current_mapping: HashMap::new(),
        }
    }

    #[test]
    fn empty_live_nodes_returns_empty_assignment() {
        let scheme = DefaultPlacementScheme;
        let i = input(
            &["p0", "p1"],
            vec![("MASTER", 1), ("SLAVE", 2)],
            &[],
            &["n0", "n1"],
            &scheme,
        );
        let result = compute_partition_assignment(&i);
        assert!(result.map.is_empty());
        assert!(result.list.is_empty());
    }

    #[test]
    fn assignment_round_trips_through_json() {
        let scheme = DefaultPlacementScheme;
        let i = input(
            &["p0", "p1"],
            vec![("MASTER", 1), ("SLAVE", 1)],
            &["n0", "n1"],
            &["n0", "n1"],
            &scheme,
        );
        let result = compute_partition_assignment(&i);
        let json = result.to_json().expect("assignment should serialize");
        let round_tripped: PartitionAssignment =
            serde_json::from_str(&json).expect("assignment should deserialize");
        assert_eq!(result, round_tripped);
    }

    #[test]
    fn fresh_cluster_spreads_replicas_evenly() {
        let scheme = DefaultPlacementScheme;
        let i = input(
            &["p0", "p1", "p2"],
            vec![("MASTER", 1), ("SLAVE", 1)],
            &["n0", "n1", "n2"],
            &["n0", "n1", "n2"],
            &scheme,
        );
        let result = compute_partition_assignment(&i);

        for partition in &i.partitions {
            let list = &result.list[partition];
            assert_eq!(list.len(), 2, "partition {partition} should have 2 replicas placed");
            assert_ne!(list[0], list[1], "anti-affinity violated for {partition}");
        }

        let mut per_node: HashMap<String, u32> = HashMap::new();
        for list in result.list.values() {
            for n in list {
                *per_node.entry(n.clone()).or_insert(0) += 1;
            }
        }
        assert_eq!(per_node.len(), 3);
        for count in per_node.values() {
            assert_eq!(*count, 2);
        }
    }

    #[test]
    fn no_node_hosts_two_replicas_of_same_partition() {
        let scheme = DefaultPlacementScheme;
        let i = input(
            &["p0", "p1", "p2", "p3"],
            vec![("MASTER", 1), ("SLAVE", 2)],
            &["n0", "n1", "n2"],
            &["n0", "n1", "n2"],
            &scheme,
        );
        let result = compute_partition_assignment(&i);
        for list in result.list.values() {
            let mut seen = HashSet::new();
            for node in list {
                assert!(seen.insert(node.clone()), "anti-affinity violated: {node} twice");
            }
        }
    }

    #[test]
    fn max_per_node_one_caps_total_placements_at_node_count() {
        // 3 partitions x 2 replicas = 6 slots demanded, but maxPerNode=1
        // across 3 nodes caps total capacity at 3 — exactly half get placed,
        // and every node carries at most one replica (§8/S6).
        let scheme = DefaultPlacementScheme;
        let mut i = input(
            &["p0", "p1", "p2"],
            vec![("MASTER", 1), ("SLAVE", 1)],
            &["n0", "n1", "n2"],
            &["n0", "n1", "n2"],
            &scheme,
        );
        i.max_per_node = 1;
        let result = compute_partition_assignment(&i);

        let total_placed: usize = result.list.values().map(Vec::len).sum();
        assert_eq!(total_placed, 3);

        let mut per_node: HashMap<String, u32> = HashMap::new();
        for list in result.list.values() {
            let mut seen = HashSet::new();
            for node in list {
                assert!(seen.insert(node.clone()), "anti-affinity violated: {node} twice");
                *per_node.entry(node.clone()).or_insert(0) += 1;
            }
        }
        for count in per_node.values() {
            assert!(*count <= 1, "node exceeded maxPerNode=1");
        }
    }

    #[test]
    fn stability_feeding_output_back_as_input_is_a_fixed_point() {
        let scheme = DefaultPlacementScheme;
        let i = input(
            &["p0", "p1", "p2"],
            vec![("MASTER", 1), ("SLAVE", 1)],
            &["n0", "n1", "n2"],
            &["n0", "n1", "n2"],
            &scheme,
        );
        let first = compute_partition_assignment(&i);

        let mut second_input = input(
            &["p0", "p1", "p2"],
            vec![("MASTER", 1), ("SLAVE", 1)],
            &["n0", "n1", "n2"],
            &["n0", "n1", "n2"],
            &scheme,
        );
        second_input.current_mapping = first.map.clone();
        let second = compute_partition_assignment(&second_input);

        assert_eq!(first, second);
    }

    #[test]
    fn node_loss_reassigns_orphans_without_violating_anti_affinity() {
        let scheme = DefaultPlacementScheme;
        let i = input(
            &["p0", "p1", "p2"],
            vec![("MASTER", 1), ("SLAVE", 1)],
            &["n0", "n1", "n2"],
            &["n0", "n1", "n2"],
            &scheme,
        );
        let before = compute_partition_assignment(&i);

        let mut after_input = input(
            &["p0", "p1", "p2"],
            vec![("MASTER", 1), ("SLAVE", 1)],
            &["n0", "n1"],
            &["n0", "n1", "n2"],
            &scheme,
        );
        after_input.current_mapping = before.map.clone();
        let after = compute_partition_assignment(&after_input);

        for (partition, list) in &after.list {
            assert!(!list.contains(&"n2".to_string()));
            assert_eq!(list.len(), 2, "partition {partition} lost a replica that lived on the dead node");
        }
    }

    #[test]
    fn determinism_across_repeated_runs() {
        let scheme = DefaultPlacementScheme;
        let i = input(
            &["p0", "p1", "p2", "p3", "p4"],
            vec![("MASTER", 1), ("SLAVE", 2)],
            &["n0", "n1", "n2", "n3"],
            &["n0", "n1", "n2", "n3"],
            &scheme,
        );
        let a = compute_partition_assignment(&i);
        let b = compute_partition_assignment(&i);
        assert_eq!(a, b);
    }
}
