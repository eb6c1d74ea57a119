use crate::error::{EvoError, Result};
use crate::mapping::MappingHandle;
use crate::operator::{merge_inputs, tags, EngineContext, NodeState, Operator, PropertyValue};
use crate::operators::crowding::{cluster_centroid, psa_partition};
use crate::set::SolutionSet;
use log::debug;
use std::rc::Rc;

fn cost_ascending(members: &mut [MappingHandle]) {
    members.sort_by(|a, b| {
        let ca = a.borrow().cost();
        let cb = b.borrow().cost();
        ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Greater)
    });
}

/// NSGA-II elite survival: whole ranks are aliased into the output while
/// they fit, the first overflowing rank is sorted by cost (rank plus
/// crowding) and only the remainder is taken. The output size is always
/// `ceil(elite_ratio * total)` for a non-empty input.
pub struct EliteSelection {
    node: NodeState,
    pub elite_ratio: f64,
}

impl EliteSelection {
    pub fn new(elite_ratio: f64) -> Self {
        let mut node = NodeState::new("EliteSelection");
        node.define_input_tags([tags::FOR_ELITE]);
        node.define_output_tags([tags::MAIN, tags::FOR_SELECTION]);
        EliteSelection { node, elite_ratio }
    }
}

impl Operator for EliteSelection {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], _ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let total: usize = inputs.iter().map(|s| s.len()).sum();
        let mut out = SolutionSet::new();
        if total == 0 {
            self.node.append_output_set(out);
            return Ok(());
        }
        if self.elite_ratio <= 0.0 || self.elite_ratio > 1.0 {
            return Err(EvoError::Domain {
                class: "EliteSelection",
                message: format!("elite_ratio {} outside (0, 1]", self.elite_ratio),
            });
        }

        let elite_size = (self.elite_ratio * total as f64).ceil() as usize;
        for set in inputs {
            if out.len() >= elite_size {
                break;
            }
            if out.len() + set.len() <= elite_size {
                out.append_set(set);
            } else {
                let mut overflow: Vec<MappingHandle> = set.iter().map(Rc::clone).collect();
                cost_ascending(&mut overflow);
                for handle in overflow.into_iter().take(elite_size - out.len()) {
                    out.append(handle);
                }
                break;
            }
        }
        debug!("elite selection kept {}/{}", out.len(), total);

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["elite_ratio"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "elite_ratio" => Some(PropertyValue::Real(self.elite_ratio)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("elite_ratio", Some(v)) => {
                self.elite_ratio = v;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "EliteSelection",
                name: name.to_string(),
            }),
        }
    }
}

/// PSA-flavoured elite survival: whole ranks while they fit, then the
/// overflow rank is clustered into exactly the missing count and each
/// cluster contributes its closest-to-centroid representative. If
/// clustering cannot produce enough subsets the gap is filled by random
/// duplication from the overflow rank.
pub struct PsaEliteSelection {
    node: NodeState,
    pub elite_ratio: f64,
}

impl PsaEliteSelection {
    pub fn new(elite_ratio: f64) -> Self {
        let mut node = NodeState::new("PsaEliteSelection");
        node.define_input_tags([tags::FOR_ELITE]);
        node.define_output_tags([tags::MAIN, tags::FOR_SELECTION]);
        PsaEliteSelection { node, elite_ratio }
    }

    fn representative(cluster: &[MappingHandle]) -> MappingHandle {
        let centroid = cluster_centroid(cluster);
        let mut best = Rc::clone(&cluster[0]);
        let mut best_d = f64::INFINITY;
        for handle in cluster {
            let d: f64 = handle
                .borrow()
                .objectives
                .iter()
                .zip(&centroid)
                .map(|(o, c)| (o.value_f64() - c).powi(2))
                .sum();
            if d < best_d {
                best_d = d;
                best = Rc::clone(handle);
            }
        }
        best
    }
}

impl Operator for PsaEliteSelection {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let total: usize = inputs.iter().map(|s| s.len()).sum();
        let mut out = SolutionSet::new();
        if total == 0 {
            self.node.append_output_set(out);
            return Ok(());
        }

        let elite_size = (self.elite_ratio * total as f64).ceil() as usize;
        for set in inputs {
            if out.len() >= elite_size {
                break;
            }
            if out.len() + set.len() <= elite_size {
                out.append_set(set);
            } else {
                let overflow: Vec<MappingHandle> = set.iter().map(Rc::clone).collect();
                let missing = elite_size - out.len();
                for cluster in psa_partition(&overflow, missing) {
                    if out.len() >= elite_size {
                        break;
                    }
                    out.append(Self::representative(&cluster));
                }
                while out.len() < elite_size {
                    let pick = ctx.rng.below(overflow.len());
                    out.append(Rc::clone(&overflow[pick]));
                }
                break;
            }
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["elite_ratio"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "elite_ratio" => Some(PropertyValue::Real(self.elite_ratio)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("elite_ratio", Some(v)) => {
                self.elite_ratio = v;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "PsaEliteSelection",
                name: name.to_string(),
            }),
        }
    }
}

/// k-way tournament mating selection: each slot of the mating pool is the
/// lowest-cost of `tournament_size` uniformly drawn contenders.
pub struct TournamentSelection {
    node: NodeState,
    pub pool_size: usize,
    pub tournament_size: usize,
}

impl TournamentSelection {
    pub fn new(pool_size: usize, tournament_size: usize) -> Self {
        let mut node = NodeState::new("TournamentSelection");
        node.define_input_tags([tags::FOR_SELECTION]);
        node.define_output_tags([tags::FOR_PERTURBATION]);
        TournamentSelection {
            node,
            pool_size,
            tournament_size,
        }
    }
}

impl Operator for TournamentSelection {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        let mut out = SolutionSet::new();
        if pool.is_empty() {
            self.node.append_output_set(out);
            return Ok(());
        }

        let k = ctx
            .adaptive
            .map(|a| a.tournament_size)
            .unwrap_or(self.tournament_size)
            .max(1);
        let picks = if self.pool_size > 0 {
            self.pool_size
        } else {
            pool.len()
        };
        for _ in 0..picks {
            let mut winner = pool.at(ctx.rng.below(pool.len())).expect("non-empty pool");
            for _ in 1..k {
                let contender = pool.at(ctx.rng.below(pool.len())).expect("non-empty pool");
                if contender.borrow().cost() < winner.borrow().cost() {
                    winner = contender;
                }
            }
            out.append(winner);
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["pool_size", "tournament_size"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "pool_size" => Some(PropertyValue::Int(self.pool_size as i64)),
            "tournament_size" => Some(PropertyValue::Int(self.tournament_size as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_int()) {
            ("pool_size", Some(v)) if v >= 0 => self.pool_size = v as usize,
            ("tournament_size", Some(v)) if v >= 1 => self.tournament_size = v as usize,
            _ => {
                return Err(EvoError::UnknownProperty {
                    class: "TournamentSelection",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn selection_weights(pool: &SolutionSet, maximise: bool) -> Vec<f64> {
    let costs: Vec<f64> = pool.iter().map(|m| m.borrow().cost()).collect();
    let lo = costs.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = costs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    // every member keeps a sliver of probability even at the worst cost
    let eps = 1e-9 + (hi - lo) * 1e-6;
    costs
        .iter()
        .map(|&c| if maximise { c - lo + eps } else { hi - c + eps })
        .collect()
}

/// Roulette-wheel mating selection over cost-derived weights. One uniform
/// draw per pick.
pub struct RouletteWheelSelection {
    node: NodeState,
    pub pool_size: usize,
    pub maximise: bool,
}

impl RouletteWheelSelection {
    pub fn new(pool_size: usize, maximise: bool) -> Self {
        let mut node = NodeState::new("RouletteWheelSelection");
        node.define_input_tags([tags::FOR_SELECTION]);
        node.define_output_tags([tags::FOR_PERTURBATION]);
        RouletteWheelSelection {
            node,
            pool_size,
            maximise,
        }
    }
}

impl Operator for RouletteWheelSelection {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        let mut out = SolutionSet::new();
        if pool.is_empty() {
            self.node.append_output_set(out);
            return Ok(());
        }

        let weights = selection_weights(&pool, self.maximise);
        let total: f64 = weights.iter().sum();
        let picks = if self.pool_size > 0 {
            self.pool_size
        } else {
            pool.len()
        };
        for _ in 0..picks {
            let mut r = ctx.rng.uniform() * total;
            let mut chosen = pool.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                r -= w;
                if r <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            out.append(pool.at(chosen).expect("index within pool"));
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["pool_size", "maximise"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "pool_size" => Some(PropertyValue::Int(self.pool_size as i64)),
            "maximise" => Some(PropertyValue::Bool(self.maximise)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match name {
            "pool_size" => {
                if let Some(v) = value.as_int() {
                    if v >= 0 {
                        self.pool_size = v as usize;
                        return Ok(());
                    }
                }
            }
            "maximise" => {
                if let Some(v) = value.as_bool() {
                    self.maximise = v;
                    return Ok(());
                }
            }
            _ => {}
        }
        Err(EvoError::UnknownProperty {
            class: "RouletteWheelSelection",
            name: name.to_string(),
        })
    }
}

/// Stochastic universal sampling: one uniform draw positions a comb of
/// equally spaced pointers over the cumulative weights, so the whole
/// mating pool costs a single draw.
pub struct StochasticUniversalSampling {
    node: NodeState,
    pub pool_size: usize,
    pub maximise: bool,
}

impl StochasticUniversalSampling {
    pub fn new(pool_size: usize, maximise: bool) -> Self {
        let mut node = NodeState::new("StochasticUniversalSampling");
        node.define_input_tags([tags::FOR_SELECTION]);
        node.define_output_tags([tags::FOR_PERTURBATION]);
        StochasticUniversalSampling {
            node,
            pool_size,
            maximise,
        }
    }
}

impl Operator for StochasticUniversalSampling {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        let mut out = SolutionSet::new();
        if pool.is_empty() {
            self.node.append_output_set(out);
            return Ok(());
        }

        let weights = selection_weights(&pool, self.maximise);
        let total: f64 = weights.iter().sum();
        let picks = if self.pool_size > 0 {
            self.pool_size
        } else {
            pool.len()
        };
        let step = total / picks as f64;
        let start = ctx.rng.uniform() * step;

        let mut cumulative = weights[0];
        let mut index = 0;
        for p in 0..picks {
            let pointer = start + p as f64 * step;
            while pointer > cumulative && index + 1 < pool.len() {
                index += 1;
                cumulative += weights[index];
            }
            out.append(pool.at(index).expect("index within pool"));
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["pool_size", "maximise"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "pool_size" => Some(PropertyValue::Int(self.pool_size as i64)),
            "maximise" => Some(PropertyValue::Bool(self.maximise)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match name {
            "pool_size" => {
                if let Some(v) = value.as_int() {
                    if v >= 0 {
                        self.pool_size = v as usize;
                        return Ok(());
                    }
                }
            }
            "maximise" => {
                if let Some(v) = value.as_bool() {
                    self.maximise = v;
                    return Ok(());
                }
            }
            _ => {}
        }
        Err(EvoError::UnknownProperty {
            class: "StochasticUniversalSampling",
            name: name.to_string(),
        })
    }
}

/// Uniform mating selection without replacement (partial Fisher-Yates),
/// used by the steady-state chains to pick a handful of parents.
pub struct RandomSelection {
    node: NodeState,
    pub pool_size: usize,
}

impl RandomSelection {
    pub fn new(pool_size: usize) -> Self {
        let mut node = NodeState::new("RandomSelection");
        node.define_input_tags([tags::FOR_SELECTION]);
        node.define_output_tags([tags::FOR_PERTURBATION]);
        RandomSelection { node, pool_size }
    }
}

impl Operator for RandomSelection {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        let mut out = SolutionSet::new();
        if pool.is_empty() {
            self.node.append_output_set(out);
            return Ok(());
        }

        let picks = self.pool_size.max(1).min(pool.len());
        let mut indices: Vec<usize> = (0..pool.len()).collect();
        for p in 0..picks {
            let j = p + ctx.rng.below(pool.len() - p);
            indices.swap(p, j);
            out.append(pool.at(indices[p]).expect("index within pool"));
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["pool_size"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "pool_size" => Some(PropertyValue::Int(self.pool_size as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_int()) {
            ("pool_size", Some(v)) if v >= 1 => {
                self.pool_size = v as usize;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "RandomSelection",
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

    fn member(cost: f64, objectives: &[f64]) -> MappingHandle {
        let mut m = Mapping::new(vec![Element::real(0.0)]);
        m.objectives = objectives.iter().map(|&v| Element::real(v)).collect();
        m.evaluated = true;
        m.set_cost(cost);
        m.into_handle()
    }

    fn rank(costs_and_objs: &[(f64, &[f64])], k: usize) -> SolutionSet {
        let mut set = SolutionSet::new();
        for (c, o) in costs_and_objs {
            set.append(member(*c, o));
        }
        set.add_tag(&tags::rank(k));
        set
    }

    #[test]
    fn test_elite_size_invariant() {
        // three ranks of uneven sizes, total 10, ratio 0.5 -> 5
        let r0 = rank(&[(0.0, &[0.0]), (0.1, &[0.1])], 0);
        let r1 = rank(&[(1.0, &[1.0] as &[f64]); 5], 1);
        let r2 = rank(&[(2.0, &[2.0] as &[f64]); 3], 2);
        let mut op = EliteSelection::new(0.5);
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[r0, r1, r2], &mut ctx).unwrap();
        assert_eq!(op.node().output_sets()[0].len(), 5);
    }

    #[test]
    fn test_elite_size_invariant_degenerate_single_rank() {
        let r0 = rank(&[(0.0, &[0.0] as &[f64]); 7], 0);
        let mut op = EliteSelection::new(0.5);
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[r0], &mut ctx).unwrap();
        assert_eq!(
            op.node().output_sets()[0].len(),
            4,
            "ceil(0.5 * 7) even when one rank holds everything"
        );
    }

    #[test]
    fn test_elite_overflow_rank_taken_by_cost_order() {
        let r0 = rank(&[(0.0, &[0.0])], 0);
        let r1 = rank(
            &[(1.9, &[0.3]), (1.2, &[0.1]), (1.5, &[0.2])],
            1,
        );
        let mut op = EliteSelection::new(0.5);
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[r0, r1], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert_eq!(out.len(), 2);
        assert_eq!(out.at(1).unwrap().borrow().cost(), 1.2, "lowest combined cost first");
    }

    #[test]
    fn test_elite_aliases_members() {
        let r0 = rank(&[(0.0, &[0.0]), (0.1, &[1.0])], 0);
        let first = r0.at(0).unwrap();
        let mut op = EliteSelection::new(1.0);
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[r0], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert!(out.iter().any(|h| Rc::ptr_eq(h, &first)), "elite keeps references, not copies");
    }

    #[test]
    fn test_psa_elite_fills_to_size() {
        // one rank of 6 identical points cannot be clustered apart; the
        // random-duplication fallback must still reach the target size
        let r0 = rank(&[(0.0, &[1.0, 1.0] as &[f64]); 6], 0);
        let mut op = PsaEliteSelection::new(0.5);
        let mut ctx = EngineContext::new(3, 0, 0);
        op.evaluate_node(&[r0], &mut ctx).unwrap();
        assert_eq!(op.node().output_sets()[0].len(), 3);
    }

    #[test]
    fn test_psa_elite_picks_representatives_from_spread_rank() {
        let r1 = rank(
            &[
                (1.0, &[0.0, 0.0]),
                (1.0, &[0.1, 0.1]),
                (1.0, &[9.0, 9.0]),
                (1.0, &[9.1, 9.1]),
            ],
            0,
        );
        let mut op = PsaEliteSelection::new(0.5);
        let mut ctx = EngineContext::new(3, 0, 0);
        op.evaluate_node(&[r1], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert_eq!(out.len(), 2);
        let a = out.at(0).unwrap().borrow().objectives[0].value_f64();
        let b = out.at(1).unwrap().borrow().objectives[0].value_f64();
        assert!(
            (a < 1.0) != (b < 1.0),
            "one representative per blob, got {} and {}",
            a,
            b
        );
    }

    #[test]
    fn test_tournament_prefers_low_cost() {
        let pool = rank(&[(5.0, &[5.0]), (0.5, &[0.5]), (3.0, &[3.0])], 0);
        let mut op = TournamentSelection::new(200, 3);
        let mut ctx = EngineContext::new(21, 0, 0);
        let mut input = pool.clone();
        input.add_tag(tags::FOR_SELECTION);
        op.evaluate_node(&[input], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert_eq!(out.len(), 200);
        let best_picks = out
            .iter()
            .filter(|h| h.borrow().cost() == 0.5)
            .count();
        assert!(
            best_picks > 100,
            "3-way tournament should pick the best member most of the time ({}/200)",
            best_picks
        );
    }

    #[test]
    fn test_roulette_and_sus_sizes_and_membership() {
        let pool = rank(&[(0.0, &[0.0]), (1.0, &[1.0]), (2.0, &[2.0])], 0);
        let mut ctx = EngineContext::new(7, 0, 0);

        let mut roulette = RouletteWheelSelection::new(10, false);
        roulette.evaluate_node(&[pool.clone()], &mut ctx).unwrap();
        assert_eq!(roulette.node().output_sets()[0].len(), 10);

        let mut sus = StochasticUniversalSampling::new(10, false);
        let before = ctx.rng.state();
        sus.evaluate_node(&[pool.clone()], &mut ctx).unwrap();
        assert_eq!(sus.node().output_sets()[0].len(), 10);
        assert_eq!(
            ctx.rng.state().state - before.state,
            1,
            "SUS spends one draw for the whole pool"
        );

        for out in [&roulette.node().output_sets()[0], &sus.node().output_sets()[0]] {
            for picked in out.iter() {
                assert!(pool.iter().any(|h| Rc::ptr_eq(h, picked)));
            }
        }
    }

    #[test]
    fn test_random_selection_without_replacement() {
        let pool = rank(&[(0.0, &[0.0]), (1.0, &[1.0]), (2.0, &[2.0]), (3.0, &[3.0])], 0);
        let mut op = RandomSelection::new(2);
        let mut ctx = EngineContext::new(2, 0, 0);
        op.evaluate_node(&[pool], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert_eq!(out.len(), 2);
        assert!(!Rc::ptr_eq(&out.at(0).unwrap(), &out.at(1).unwrap()));
    }

    #[test]
    fn test_empty_input_yields_empty_pool() {
        let mut op = TournamentSelection::new(10, 2);
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[], &mut ctx).unwrap();
        assert_eq!(op.node().output_sets()[0].len(), 0);
    }
}
