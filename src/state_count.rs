//! Resolution of a state-model definition into a concrete `StateName → count`
//! mapping (§4.2).
//!
//! A state-model definition lists states in priority order together with a
//! count specifier that is either a literal positive integer, `"N"` (all
//! live nodes), or `"R"` (remainder — at most one state may use it).

use crate::error::{RebalanceError, RebalanceResult};
use crate::model::StateName;

/// A single state's count specifier, as parsed from the state-model
/// definition's raw string form (`"N"`, `"R"`, or an integer literal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CountSpec {
    /// A literal count. Non-positive values are invalid and the state is
    /// omitted from the resolved map (§7 "Invalid state count specifier").
    Fixed(i64),
    /// `"N"` — resolves to the current live-node count.
    AllLive,
    /// `"R"` — resolves to the remainder: total replicas minus the sum of
    /// every other state's resolved count.
    Remainder,
}

impl CountSpec {
    /// Parses a raw specifier string. Values that don't parse as an
    /// integer and aren't `"N"`/`"R"` become `Fixed(0)`, which resolution
    /// omits (§4.2 "Invalid specifiers: the state is omitted").
    pub fn parse(raw: &str) -> Self {
        match raw {
            "N" => CountSpec::AllLive,
            "R" => CountSpec::Remainder,
            other => CountSpec::Fixed(other.parse::<i64>().unwrap_or(0)),
        }
    }
}

/// Named, ordered state model: priority list of `(state, count specifier)`.
/// Priority order is the contract — higher-priority states are listed
/// first and that order is preserved through resolution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StateModelDefinition {
    pub name: String,
    pub states: Vec<(StateName, CountSpec)>,
}

impl StateModelDefinition {
    pub fn new(name: impl Into<String>, states: Vec<(StateName, CountSpec)>) -> Self {
        Self {
            name: name.into(),
            states,
        }
    }
}

/// Resolves a state-model definition into an ordered `StateName → count`
/// list (§4.2). `total_replicas` is the externally configured replica
/// target for the resource (e.g. the ideal state's `replicas` field) —
/// it is not derived from the state model itself, since the model may
/// contain the very `"R"` state whose count depends on it.
pub fn resolve_state_count(
    def: &StateModelDefinition,
    live_node_count: u32,
    total_replicas: u32,
) -> RebalanceResult<Vec<(StateName, u32)>> {
    let mut result: Vec<(StateName, u32)> = Vec::with_capacity(def.states.len());
    let mut remainder_index = None;
    let mut running_remainder: i64 = i64::from(total_replicas);

    for (state, spec) in &def.states {
        match spec {
            CountSpec::Fixed(v) if *v > 0 => {
                let count = *v as u32;
                running_remainder -= i64::from(count);
                result.push((state.clone(), count));
            }
            CountSpec::Fixed(_) => {
                // Invalid or non-positive specifier: omitted entirely.
            }
            CountSpec::AllLive => {
                running_remainder -= i64::from(live_node_count);
                result.push((state.clone(), live_node_count));
            }
            CountSpec::Remainder => {
                if remainder_index.is_some() {
                    return Err(RebalanceError::MultipleRemainderStates(def.name.clone()));
                }
                remainder_index = Some(result.len());
                result.push((state.clone(), 0));
            }
        }
    }

    if let Some(idx) = remainder_index {
        result[idx].1 = running_remainder.max(0) as u32;
    }

    result.retain(|(_, count)| *count > 0);

    if result.is_empty() {
        return Err(RebalanceError::EmptyStateModel(def.name.clone()));
    }

    Ok(result)
}
