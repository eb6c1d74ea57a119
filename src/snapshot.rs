use crate::mapping::Mapping;
use crate::param::Param;
use crate::set::SolutionSet;
use serde::{Deserialize, Serialize};

/// Flat, serde round-trippable copy of a set's mappings: the shape an
/// external serializer persists and reloads populations through. Aliasing
/// is not preserved — a snapshot is plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub mappings: Vec<Mapping>,
}

impl PopulationSnapshot {
    pub fn from_set(set: &SolutionSet) -> Self {
        PopulationSnapshot {
            mappings: set.iter().map(|h| h.borrow().clone()).collect(),
        }
    }

    pub fn to_set(&self) -> SolutionSet {
        let mut set = SolutionSet::new();
        for mapping in &self.mappings {
            set.append(mapping.clone().into_handle());
        }
        set
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn best_cost(&self) -> Option<f64> {
        self.mappings
            .iter()
            .map(|m| m.cost())
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater))
    }
}

/// Outcome of one driver run: the final population, the optional
/// per-iteration trace and enough metadata to reproduce the experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub id: String,
    pub version: String,
    pub timestamp: String,
    pub algo: String,
    pub seed: u64,
    pub iterations: u64,
    pub evaluations: u64,
    pub execution_seconds: f64,
    pub final_population: PopulationSnapshot,
    pub trace: Vec<PopulationSnapshot>,
    pub parameters: Param,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn snapshot() -> PopulationSnapshot {
        let mut set = SolutionSet::new();
        for i in 0..3 {
            let mut m = Mapping::new(vec![Element::real(i as f64), Element::nominal(i)]);
            m.objectives = vec![Element::real(i as f64 * 2.0)];
            m.evaluated = true;
            m.set_cost(i as f64);
            set.append(m.into_handle());
        }
        PopulationSnapshot::from_set(&set)
    }

    #[test]
    fn test_population_snapshot_json_round_trip() {
        let original = snapshot();
        let json = serde_json::to_string(&original).unwrap();
        let restored: PopulationSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_snapshot_to_set_rebuilds_independent_handles() {
        let snap = snapshot();
        let set = snap.to_set();
        assert_eq!(set.len(), 3);
        set.at(0).unwrap().borrow_mut().set_cost(99.0);
        assert_eq!(snap.mappings[0].cost(), 0.0, "snapshot data is detached");
    }

    #[test]
    fn test_best_cost() {
        assert_eq!(snapshot().best_cost(), Some(0.0));
        assert_eq!(PopulationSnapshot { mappings: vec![] }.best_cost(), None);
    }
}
