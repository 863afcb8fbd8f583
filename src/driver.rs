//! Driver/adapter (§4.5, §6.2): turns caller-supplied cluster snapshots
//! into algorithm inputs, and wraps the algorithm's output back into the
//! caller's ideal-state record format.
//!
//! Everything this module reads (live instances, current/pending state,
//! state-model definitions) is an external collaborator's snapshot per
//! §1's "Out of scope" list — this crate does not read cluster state from
//! storage itself, it only shapes the snapshot the caller already fetched.

use std::collections::HashMap;

use tracing::warn;

use crate::algorithm::{compute_partition_assignment, AssignmentInput, PartitionAssignment};
use crate::error::{RebalanceError, RebalanceResult};
use crate::model::{NodeId, PartitionId, StateName};
use crate::scheme::PlacementScheme;
use crate::state_count::{resolve_state_count, StateModelDefinition};

/// Ideal-state assignment mode. `Auto` is the only mode this strategy
/// produces; `SemiAuto`/`Customized` pass other resources through
/// untouched and are modeled here only so `IdealState::mode` round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IdealStateMode {
    Auto,
    SemiAuto,
    Customized,
}

/// A resource's ideal-state record (§6.2, §6.4: persisted by the caller,
/// not by this crate).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdealState {
    pub resource_name: String,
    /// Name of the state-model definition to resolve via the cluster cache.
    pub state_model_def_ref: String,
    pub num_partitions: u32,
    /// Desired total replica count per partition (may itself be the target
    /// that a state model's `"R"` specifier resolves against).
    pub replication_factor: u32,
    /// `<= 0` means unlimited.
    pub max_partitions_per_instance: i64,
    pub mode: IdealStateMode,
    /// List field: `partition → ordered node ids` (§3).
    pub list_field: HashMap<PartitionId, Vec<NodeId>>,
    /// Map field: `partition → (node → state)` (§3). Not written by
    /// `compute_new_ideal_state` (§9, design note: map fields are never
    /// copied onto the output — states are recomputed downstream).
    pub map_field: HashMap<PartitionId, HashMap<NodeId, StateName>>,
}

/// Live/full cluster topology plus state-model definitions, as the
/// controller's cluster data cache would expose them.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ClusterDataCache {
    /// Order-stable list of currently live instance ids.
    pub live_instances: Vec<NodeId>,
    /// Order-stable list of all configured instance ids (superset of live).
    pub all_instances: Vec<NodeId>,
    pub state_model_defs: HashMap<String, StateModelDefinition>,
}

/// Current and pending per-partition state, as reported by participants.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CurrentStateOutput {
    pub current_state: HashMap<PartitionId, HashMap<NodeId, StateName>>,
    pub pending_state: HashMap<PartitionId, HashMap<NodeId, StateName>>,
}

impl CurrentStateOutput {
    /// Merges current and pending state into one mapping: for the same
    /// `(partition, node)`, a pending entry overwrites a current one
    /// (§4.5: "the merge is an unordered union where later writes win").
    pub fn merged(&self) -> HashMap<PartitionId, HashMap<NodeId, StateName>> {
        let mut merged = self.current_state.clone();
        for (partition, nodes) in &self.pending_state {
            let entry = merged.entry(partition.clone()).or_default();
            for (node, state) in nodes {
                entry.insert(node.clone(), state.clone());
            }
        }
        merged
    }
}

/// Generates this resource's partition ids: `"{resourceName}_{index}"`,
/// matching the controller's own partition naming convention.
fn partition_ids(resource_name: &str, num_partitions: u32) -> Vec<PartitionId> {
    (0..num_partitions)
        .map(|i| format!("{resource_name}_{i}"))
        .collect()
}

/// Drops mapping entries for nodes not present in `all_instances` —
/// `compute_partition_assignment` requires `currentMapping`'s node ids to
/// be a subset of `allNodes` (§7 "Unknown node id in currentMapping"); this
/// is the sanitization the driver is responsible for. Also drops entries
/// whose state isn't a key of the resolved `state_count`, per §3's
/// `CurrentMapping` definition ("filtered to states that appear in
/// StateCount") — a stale `OFFLINE`/`ERROR` record must not consume an
/// anti-affinity slot the algorithm never meant to grant it.
fn sanitize_mapping(
    mapping: HashMap<PartitionId, HashMap<NodeId, StateName>>,
    all_instances: &[NodeId],
    state_count: &[(StateName, u32)],
) -> HashMap<PartitionId, HashMap<NodeId, StateName>> {
    let known_nodes: std::collections::HashSet<&NodeId> = all_instances.iter().collect();
    let known_states: std::collections::HashSet<&StateName> = state_count.iter().map(|(s, _)| s).collect();
    mapping
        .into_iter()
        .map(|(partition, nodes)| {
            let filtered: HashMap<NodeId, StateName> = nodes
                .into_iter()
                .filter(|(node, state)| {
                    if !known_nodes.contains(node) {
                        warn!(%partition, %node, "dropping current-state entry for node absent from allInstances");
                        return false;
                    }
                    if !known_states.contains(state) {
                        warn!(%partition, %node, %state, "dropping current-state entry for state absent from resolved state count");
                        return false;
                    }
                    true
                })
                .collect();
            (partition, filtered)
        })
        .collect()
}

/// Strategy entry point (§6.2): computes a new ideal state for one
/// resource from the caller's cluster snapshots.
///
/// `scheme` is the pluggable preferred-location scheme (§4.1/§6.3); pass
/// `&DefaultPlacementScheme` unless the caller supplies its own.
pub fn compute_new_ideal_state(
    resource_name: &str,
    current_ideal_state: &IdealState,
    current_state_output: &CurrentStateOutput,
    cluster_data_cache: &ClusterDataCache,
    scheme: &dyn PlacementScheme,
) -> RebalanceResult<IdealState> {
    let state_model_def = cluster_data_cache
        .state_model_defs
        .get(&current_ideal_state.state_model_def_ref)
        .ok_or_else(|| RebalanceError::StateModelNotFound(current_ideal_state.state_model_def_ref.clone()))?;

    let state_count = resolve_state_count(
        state_model_def,
        cluster_data_cache.live_instances.len() as u32,
        current_ideal_state.replication_factor,
    )?;

    let current_mapping = sanitize_mapping(
        current_state_output.merged(),
        &cluster_data_cache.all_instances,
        &state_count,
    );

    let input = AssignmentInput {
        resource_name: resource_name.to_string(),
        partitions: partition_ids(resource_name, current_ideal_state.num_partitions),
        state_count,
        max_per_node: current_ideal_state.max_partitions_per_instance,
        scheme,
        live_nodes: cluster_data_cache.live_instances.clone(),
        all_nodes: cluster_data_cache.all_instances.clone(),
        current_mapping,
    };

    let PartitionAssignment { list, .. } = compute_partition_assignment(&input);

    Ok(IdealState {
        resource_name: current_ideal_state.resource_name.clone(),
        state_model_def_ref: current_ideal_state.state_model_def_ref.clone(),
        num_partitions: current_ideal_state.num_partitions,
        replication_factor: current_ideal_state.replication_factor,
        max_partitions_per_instance: current_ideal_state.max_partitions_per_instance,
        mode: IdealStateMode::Auto,
        list_field: list,
        map_field: HashMap::new(),
    })
}
