use crate::error::{EvoError, Result};
use crate::mapping::MappingHandle;
use crate::operator::{tags, EngineContext, NodeState, Operator, PropertyValue};
use crate::set::SolutionSet;
use std::rc::Rc;

/// NSGA-II crowding distance, applied per rank set.
///
/// Per objective the rank is sorted and interior members accumulate the
/// normalized neighbour gap `(f[i+1] - f[i-1]) / (fmax - fmin)`; the sum
/// is divided by the objective count and added onto the rank-based cost.
/// Boundary members contribute 0 per objective, not infinity.
pub struct CrowdingDistance {
    node: NodeState,
}

impl CrowdingDistance {
    pub fn new() -> Self {
        let mut node = NodeState::new("CrowdingDistance");
        node.define_input_tags([tags::FOR_CROWDING]);
        node.define_output_tags([tags::FOR_ELITE]);
        CrowdingDistance { node }
    }

    pub(crate) fn contributions(members: &[MappingHandle]) -> Vec<f64> {
        let n = members.len();
        let mut contribution = vec![0.0; n];
        if n == 0 {
            return contribution;
        }
        let m = members[0].borrow().objectives.len();
        if m == 0 {
            return contribution;
        }

        for obj in 0..m {
            let value = |i: usize| members[i].borrow().objectives[obj].value_f64();
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| {
                value(a)
                    .partial_cmp(&value(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let fmin = value(order[0]);
            let fmax = value(order[n - 1]);
            if fmax > fmin {
                for pos in 1..n - 1 {
                    contribution[order[pos]] +=
                        (value(order[pos + 1]) - value(order[pos - 1])) / (fmax - fmin);
                }
            }
        }
        for c in &mut contribution {
            *c /= m as f64;
        }
        contribution
    }
}

impl Default for CrowdingDistance {
    fn default() -> Self {
        CrowdingDistance::new()
    }
}

impl Operator for CrowdingDistance {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], _ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        for set in inputs {
            let members: Vec<MappingHandle> = set.iter().map(Rc::clone).collect();
            for (handle, c) in members.iter().zip(Self::contributions(&members)) {
                handle.borrow_mut().add_cost(c);
            }
            self.node.append_output_set(set.clone());
        }
        Ok(())
    }
}

/// Part-and-select clustering: repeatedly split the subset with the
/// largest objective-space spread at the widest gap along that dimension,
/// until `target` subsets exist or nothing remains splittable.
pub fn psa_partition(members: &[MappingHandle], target: usize) -> Vec<Vec<MappingHandle>> {
    let mut subsets: Vec<Vec<MappingHandle>> = vec![members.to_vec()];
    if members.is_empty() || target <= 1 {
        return subsets;
    }
    let m = members[0].borrow().objectives.len();

    while subsets.len() < target {
        // widest-spread subset and its dimension
        let mut best: Option<(usize, usize, f64)> = None;
        for (s, subset) in subsets.iter().enumerate() {
            if subset.len() < 2 {
                continue;
            }
            for dim in 0..m {
                let values: Vec<f64> = subset
                    .iter()
                    .map(|h| h.borrow().objectives[dim].value_f64())
                    .collect();
                let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let spread = hi - lo;
                if spread > 0.0 && best.map_or(true, |(_, _, b)| spread > b) {
                    best = Some((s, dim, spread));
                }
            }
        }
        let Some((s, dim, _)) = best else { break };

        let mut subset = subsets.swap_remove(s);
        subset.sort_by(|a, b| {
            let va = a.borrow().objectives[dim].value_f64();
            let vb = b.borrow().objectives[dim].value_f64();
            va.partial_cmp(&vb).unwrap_or(std::cmp::Ordering::Equal)
        });

        // split at the widest consecutive gap
        let mut cut = 1;
        let mut widest = f64::NEG_INFINITY;
        for i in 1..subset.len() {
            let gap = subset[i].borrow().objectives[dim].value_f64()
                - subset[i - 1].borrow().objectives[dim].value_f64();
            if gap > widest {
                widest = gap;
                cut = i;
            }
        }
        let right = subset.split_off(cut);
        subsets.push(subset);
        subsets.push(right);
    }
    subsets
}

/// Objective-space centroid of a cluster.
pub fn cluster_centroid(cluster: &[MappingHandle]) -> Vec<f64> {
    let m = cluster
        .first()
        .map(|h| h.borrow().objectives.len())
        .unwrap_or(0);
    let mut centroid = vec![0.0; m];
    for handle in cluster {
        for (c, o) in centroid.iter_mut().zip(&handle.borrow().objectives) {
            *c += o.value_f64();
        }
    }
    for c in &mut centroid {
        *c /= cluster.len() as f64;
    }
    centroid
}

/// PSA niche crowding: each rank is clustered and every member of a niche
/// of size n pays a `1 - 2^(1-n)` cost penalty, so members of dense
/// niches sort behind lone representatives.
pub struct PsaCrowding {
    node: NodeState,
    pub niche_count: usize,
}

impl PsaCrowding {
    pub fn new(niche_count: usize) -> Self {
        let mut node = NodeState::new("PsaCrowding");
        node.define_input_tags([tags::FOR_CROWDING]);
        node.define_output_tags([tags::FOR_ELITE]);
        PsaCrowding { node, niche_count }
    }
}

impl Operator for PsaCrowding {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], _ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        for set in inputs {
            let members: Vec<MappingHandle> = set.iter().map(Rc::clone).collect();
            if !members.is_empty() {
                let target = if self.niche_count > 0 {
                    self.niche_count
                } else {
                    (members.len() as f64).sqrt().ceil() as usize
                };
                for cluster in psa_partition(&members, target) {
                    let penalty = 1.0 - (2.0_f64).powi(1 - cluster.len() as i32);
                    for handle in cluster {
                        handle.borrow_mut().add_cost(penalty);
                    }
                }
            }
            self.node.append_output_set(set.clone());
        }
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["niche_count"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "niche_count" => Some(PropertyValue::Int(self.niche_count as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_int()) {
            ("niche_count", Some(v)) if v >= 0 => {
                self.niche_count = v as usize;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "PsaCrowding",
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::mapping::Mapping;

    fn evaluated(objectives: &[f64]) -> MappingHandle {
        let mut m = Mapping::new(vec![Element::real(0.0)]);
        m.objectives = objectives.iter().map(|&v| Element::real(v)).collect();
        m.evaluated = true;
        m.into_handle()
    }

    fn rank_set(points: &[&[f64]]) -> SolutionSet {
        let mut set = SolutionSet::new();
        for p in points {
            set.append(evaluated(p));
        }
        set.add_tag(&tags::rank(0));
        set
    }

    #[test]
    fn test_crowding_extremes_contribute_zero() {
        let set = rank_set(&[&[0.0, 2.0], &[1.0, 1.0], &[2.0, 0.0]]);
        let mut op = CrowdingDistance::new();
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();

        // boundary members keep their rank cost untouched
        assert_eq!(set.at(0).unwrap().borrow().cost(), 0.0);
        assert_eq!(set.at(2).unwrap().borrow().cost(), 0.0);
        // interior: gap 2/2 per objective, summed then divided by 2
        assert!((set.at(1).unwrap().borrow().cost() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_crowding_degenerate_objective_is_skipped() {
        // identical second objective: no division by zero, no contribution
        let set = rank_set(&[&[0.0, 1.0], &[0.5, 1.0], &[2.0, 1.0]]);
        let mut op = CrowdingDistance::new();
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        let interior = set.at(1).unwrap().borrow().cost();
        assert!((interior - 0.5).abs() < 1e-12, "only the first objective contributes");
    }

    #[test]
    fn test_crowding_adds_onto_existing_cost() {
        let set = rank_set(&[&[0.0, 2.0], &[1.0, 1.0], &[2.0, 0.0]]);
        for h in &set {
            h.borrow_mut().set_cost(3.0);
        }
        let mut op = CrowdingDistance::new();
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        assert!((set.at(1).unwrap().borrow().cost() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_psa_partition_splits_at_widest_gap() {
        let members: Vec<MappingHandle> = vec![
            evaluated(&[0.0, 0.0]),
            evaluated(&[0.1, 0.1]),
            evaluated(&[5.0, 5.0]),
            evaluated(&[5.1, 5.1]),
        ];
        let clusters = psa_partition(&members, 2);
        assert_eq!(clusters.len(), 2);
        let mut sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 2], "the wide gap separates the two blobs");
    }

    #[test]
    fn test_psa_partition_stops_when_unsplittable() {
        let members = vec![evaluated(&[1.0, 1.0]), evaluated(&[1.0, 1.0])];
        let clusters = psa_partition(&members, 4);
        assert_eq!(clusters.len(), 1, "zero spread cannot be split");
    }

    #[test]
    fn test_psa_crowding_penalises_dense_niches() {
        let set = rank_set(&[&[0.0, 0.0], &[0.01, 0.01], &[9.0, 9.0]]);
        let mut op = PsaCrowding::new(2);
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();

        // niche of 2 pays 1 - 2^-1 = 0.5; singleton pays 0
        assert!((set.at(0).unwrap().borrow().cost() - 0.5).abs() < 1e-12);
        assert!((set.at(1).unwrap().borrow().cost() - 0.5).abs() < 1e-12);
        assert_eq!(set.at(2).unwrap().borrow().cost(), 0.0);
    }
}
