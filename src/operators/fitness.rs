use crate::error::{EvoError, Result};
use crate::mapping::MappingHandle;
use crate::operator::{
    merge_inputs, tags, AdaptiveRates, EngineContext, NodeState, Operator, PropertyValue,
};
use crate::operators::crowding::CrowdingDistance;
use crate::problem::Problem;
use crate::set::SolutionSet;
use log::debug;
use statrs::statistics::Statistics;
use std::rc::Rc;

/// Rank-averaged fitness assignment (the MOGA scheme). Assumes upstream
/// ranking has written the rank ordinal into each cost. Positions in the
/// rank-sorted order receive raw fitness `N - i`; all members sharing a
/// rank value are assigned the average of their raw fitnesses, so ties
/// within a rank score identically. The resulting cost is a fitness —
/// higher is better — which downstream proportional selection must
/// consume with `maximise` set.
pub struct AverageFitness {
    node: NodeState,
}

impl AverageFitness {
    pub fn new() -> Self {
        let mut node = NodeState::new("AverageFitness");
        node.define_input_tags([tags::FOR_CROWDING]);
        node.define_output_tags([tags::FOR_SELECTION]);
        AverageFitness { node }
    }
}

impl Default for AverageFitness {
    fn default() -> Self {
        AverageFitness::new()
    }
}

impl Operator for AverageFitness {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], _ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let mut members: Vec<MappingHandle> = Vec::new();
        for set in inputs {
            for handle in set {
                if !members.iter().any(|m| Rc::ptr_eq(m, handle)) {
                    members.push(Rc::clone(handle));
                }
            }
        }
        if members.is_empty() {
            return Ok(());
        }

        members.sort_by(|a, b| {
            let ca = a.borrow().cost();
            let cb = b.borrow().cost();
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Greater)
        });
        let n = members.len();

        let mut i = 0;
        while i < n {
            let rank_value = members[i].borrow().cost();
            let mut j = i;
            while j < n && members[j].borrow().cost() == rank_value {
                j += 1;
            }
            // raw fitness N - position, averaged over the tied stretch
            let average: f64 =
                (i..j).map(|p| (n - p) as f64).sum::<f64>() / (j - i) as f64;
            for member in &members[i..j] {
                member.borrow_mut().set_cost(average);
            }
            i = j;
        }

        let mut out = SolutionSet::new();
        for handle in members {
            out.append(handle);
        }
        self.node.append_output_set(out);
        Ok(())
    }
}

/// Augmented Tchebycheff scalarisation with a fresh random weight vector
/// per iteration — the (s)ParEGO inner loop. Objectives are normalised
/// over the incoming set; each evaluated mapping's cost becomes
/// `max_j(w_j f_j) + rho * sum_j(w_j f_j)` and its `scalarised` flag is
/// raised.
pub struct TchebycheffScalarisation {
    node: NodeState,
    pub rho: f64,
}

impl TchebycheffScalarisation {
    pub fn new(rho: f64) -> Self {
        let mut node = NodeState::new("TchebycheffScalarisation");
        node.define_input_tags([tags::FOR_RANKING]);
        node.define_output_tags([tags::FOR_SELECTION]);
        TchebycheffScalarisation { node, rho }
    }
}

impl Operator for TchebycheffScalarisation {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        if pool.is_empty() {
            self.node.append_output_set(SolutionSet::new());
            return Ok(());
        }

        let m = pool.at(0).expect("non-empty pool").borrow().objectives.len();
        let mut weights: Vec<f64> = (0..m).map(|_| ctx.rng.uniform()).collect();
        let weight_sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= weight_sum;
        }

        let mut ideal = vec![f64::INFINITY; m];
        let mut nadir = vec![f64::NEG_INFINITY; m];
        for handle in &pool {
            for (j, o) in handle.borrow().objectives.iter().enumerate() {
                ideal[j] = ideal[j].min(o.value_f64());
                nadir[j] = nadir[j].max(o.value_f64());
            }
        }

        for handle in &pool {
            let mut mapping = handle.borrow_mut();
            if !mapping.evaluated {
                continue;
            }
            let mut worst = f64::NEG_INFINITY;
            let mut aggregate = 0.0;
            for (j, o) in mapping.objectives.iter().enumerate() {
                let span = nadir[j] - ideal[j];
                let f = if span > 0.0 {
                    (o.value_f64() - ideal[j]) / span
                } else {
                    0.0
                };
                worst = worst.max(weights[j] * f);
                aggregate += weights[j] * f;
            }
            mapping.set_cost(worst + self.rho * aggregate);
            mapping.scalarised = true;
        }

        let mut out = SolutionSet::new();
        out.append_set(&pool);
        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["rho"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "rho" => Some(PropertyValue::Real(self.rho)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("rho", Some(v)) if v >= 0.0 => {
                self.rho = v;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "TchebycheffScalarisation",
                name: name.to_string(),
            }),
        }
    }
}

/// Das-Dennis reference directions: every non-negative integer
/// composition of `divisions` over `m` coordinates, scaled to the unit
/// simplex.
pub fn das_dennis_directions(m: usize, divisions: usize) -> Vec<Vec<f64>> {
    fn recurse(m: usize, left: usize, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if prefix.len() == m - 1 {
            prefix.push(left);
            out.push(prefix.clone());
            prefix.pop();
            return;
        }
        for take in 0..=left {
            prefix.push(take);
            recurse(m, left - take, prefix, out);
            prefix.pop();
        }
    }
    let mut raw = Vec::new();
    recurse(m, divisions, &mut Vec::new(), &mut raw);
    raw.into_iter()
        .map(|counts| {
            counts
                .into_iter()
                .map(|c| c as f64 / divisions as f64)
                .collect()
        })
        .collect()
}

fn perpendicular_distance(point: &[f64], direction: &[f64]) -> f64 {
    let norm: f64 = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
    if norm == 0.0 {
        return point.iter().map(|p| p * p).sum::<f64>().sqrt();
    }
    let projection: f64 =
        point.iter().zip(direction).map(|(p, d)| p * d).sum::<f64>() / norm;
    let sq: f64 = point.iter().map(|p| p * p).sum::<f64>() - projection * projection;
    sq.max(0.0).sqrt()
}

/// NSGA-III survival: whole ranks while they fit, then the overflow rank
/// is filled niche-by-niche against the Das-Dennis reference directions —
/// the least occupied direction receives its closest associated
/// candidate (or a random one once the niche is already occupied).
pub struct NichingSelection {
    node: NodeState,
    pub elite_ratio: f64,
    pub divisions: usize,
}

impl NichingSelection {
    pub fn new(elite_ratio: f64, divisions: usize) -> Self {
        let mut node = NodeState::new("NichingSelection");
        node.define_input_tags([tags::FOR_ELITE]);
        node.define_output_tags([tags::MAIN, tags::FOR_SELECTION]);
        NichingSelection {
            node,
            elite_ratio,
            divisions,
        }
    }

    fn normalised(members: &[MappingHandle]) -> Vec<Vec<f64>> {
        let m = members[0].borrow().objectives.len();
        let mut ideal = vec![f64::INFINITY; m];
        let mut nadir = vec![f64::NEG_INFINITY; m];
        for handle in members {
            for (j, o) in handle.borrow().objectives.iter().enumerate() {
                ideal[j] = ideal[j].min(o.value_f64());
                nadir[j] = nadir[j].max(o.value_f64());
            }
        }
        members
            .iter()
            .map(|handle| {
                handle
                    .borrow()
                    .objectives
                    .iter()
                    .enumerate()
                    .map(|(j, o)| {
                        let span = nadir[j] - ideal[j];
                        if span > 0.0 {
                            (o.value_f64() - ideal[j]) / span
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

impl Operator for NichingSelection {
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
        let target = (self.elite_ratio * total as f64).ceil() as usize;

        let mut selected: Vec<MappingHandle> = Vec::new();
        let mut overflow: Vec<MappingHandle> = Vec::new();
        for set in inputs {
            if selected.len() + set.len() <= target {
                selected.extend(set.iter().map(Rc::clone));
                if selected.len() == target {
                    break;
                }
            } else {
                overflow = set.iter().map(Rc::clone).collect();
                break;
            }
        }

        if selected.len() < target && !overflow.is_empty() {
            let m = overflow[0].borrow().objectives.len();
            let directions = das_dennis_directions(m, self.divisions.max(1));

            let mut all: Vec<MappingHandle> = selected.iter().map(Rc::clone).collect();
            all.extend(overflow.iter().map(Rc::clone));
            let normalised = Self::normalised(&all);

            let associate = |point: &[f64]| -> (usize, f64) {
                let mut best = (0, f64::INFINITY);
                for (d, dir) in directions.iter().enumerate() {
                    let dist = perpendicular_distance(point, dir);
                    if dist < best.1 {
                        best = (d, dist);
                    }
                }
                best
            };

            let mut niche_counts = vec![0usize; directions.len()];
            for point in &normalised[..selected.len()] {
                niche_counts[associate(point).0] += 1;
            }

            // candidate -> (direction, perpendicular distance)
            let mut candidates: Vec<(usize, usize, f64)> = normalised[selected.len()..]
                .iter()
                .enumerate()
                .map(|(i, point)| {
                    let (d, dist) = associate(point);
                    (i, d, dist)
                })
                .collect();

            while selected.len() < target && !candidates.is_empty() {
                // least occupied direction that still has candidates
                let direction = candidates
                    .iter()
                    .map(|&(_, d, _)| d)
                    .min_by_key(|&d| niche_counts[d])
                    .expect("candidates remain");
                let pool: Vec<usize> = candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, &(_, d, _))| d == direction)
                    .map(|(slot, _)| slot)
                    .collect();
                let slot = if niche_counts[direction] == 0 {
                    *pool
                        .iter()
                        .min_by(|&&a, &&b| {
                            candidates[a]
                                .2
                                .partial_cmp(&candidates[b].2)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .expect("pool is non-empty")
                } else {
                    pool[ctx.rng.below(pool.len())]
                };
                let (index, d, _) = candidates.swap_remove(slot);
                niche_counts[d] += 1;
                selected.push(Rc::clone(&overflow[index]));
            }
        }

        debug!("niching kept {}/{}", selected.len(), total);
        for handle in selected {
            out.append(handle);
        }
        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["elite_ratio", "divisions"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "elite_ratio" => Some(PropertyValue::Real(self.elite_ratio)),
            "divisions" => Some(PropertyValue::Int(self.divisions as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match name {
            "elite_ratio" => {
                if let Some(v) = value.as_real() {
                    self.elite_ratio = v;
                    return Ok(());
                }
            }
            "divisions" => {
                if let Some(v) = value.as_int() {
                    if v >= 1 {
                        self.divisions = v as usize;
                        return Ok(());
                    }
                }
            }
            _ => {}
        }
        Err(EvoError::UnknownProperty {
            class: "NichingSelection",
            name: name.to_string(),
        })
    }
}

/// SMS-EMOA-style reduction: while the merged input exceeds the target
/// size, drop the worst-rank member contributing least hypervolume
/// (exact for 2 objectives; higher dimensions fall back to dropping the
/// most crowded member).
pub struct HypervolumeReduction {
    node: NodeState,
    pub population_size: usize,
}

impl HypervolumeReduction {
    pub fn new(population_size: usize) -> Self {
        let mut node = NodeState::new("HypervolumeReduction");
        node.define_input_tags([tags::FOR_ELITE]);
        node.define_output_tags([tags::MAIN, tags::FOR_SELECTION]);
        HypervolumeReduction {
            node,
            population_size,
        }
    }

    /// 2-D hypervolume contribution of each front member against a
    /// reference point slightly beyond the front's nadir.
    fn contributions_2d(front: &[MappingHandle]) -> Vec<f64> {
        let n = front.len();
        let points: Vec<(f64, f64)> = front
            .iter()
            .map(|h| {
                let b = h.borrow();
                (b.objectives[0].value_f64(), b.objectives[1].value_f64())
            })
            .collect();
        let ref_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max) + 1.0;
        let ref_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max) + 1.0;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            points[a]
                .0
                .partial_cmp(&points[b].0)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut contributions = vec![0.0; n];
        for (pos, &i) in order.iter().enumerate() {
            let next_x = if pos + 1 < n { points[order[pos + 1]].0 } else { ref_x };
            let prev_y = if pos > 0 { points[order[pos - 1]].1 } else { ref_y };
            contributions[i] = (next_x - points[i].0) * (prev_y - points[i].1);
        }
        contributions
    }
}

impl Operator for HypervolumeReduction {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], _ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let mut ranks: Vec<Vec<MappingHandle>> = inputs
            .iter()
            .map(|s| s.iter().map(Rc::clone).collect())
            .collect();
        let mut total: usize = ranks.iter().map(|r| r.len()).sum();

        while total > self.population_size {
            let worst = ranks
                .iter_mut()
                .rev()
                .find(|r| !r.is_empty())
                .expect("total > 0 implies a non-empty rank");
            let m = worst[0].borrow().objectives.len();
            let victim = if worst.len() == 1 {
                0
            } else if m == 2 {
                let contributions = Self::contributions_2d(worst);
                contributions
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .expect("front is non-empty")
            } else {
                // most crowded member sheds the least diversity
                let contributions = CrowdingDistance::contributions(worst);
                contributions
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .expect("front is non-empty")
            };
            worst.remove(victim);
            total -= 1;
        }

        let mut out = SolutionSet::new();
        for rank in ranks {
            for handle in rank {
                out.append(handle);
            }
        }
        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["population_size"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "population_size" => Some(PropertyValue::Int(self.population_size as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_int()) {
            ("population_size", Some(v)) if v >= 1 => {
                self.population_size = v as usize;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "HypervolumeReduction",
                name: name.to_string(),
            }),
        }
    }
}

/// ACROMUSE-style diversity assessment. Publishes adaptive crossover and
/// mutation probabilities and a tournament size derived from the standard
/// population diversity (SPD, range-normalised per-variable spread) and
/// the fitness-weighted healthy population diversity (HPD).
pub struct AcromuseAssessment {
    node: NodeState,
    problem: Rc<Problem>,
    pub crossover_bounds: (f64, f64),
    pub mutation_bounds: (f64, f64),
    pub tournament_bounds: (usize, usize),
    pub spd_target: f64,
}

impl AcromuseAssessment {
    pub fn new(problem: Rc<Problem>) -> Self {
        let mut node = NodeState::new("AcromuseAssessment");
        node.define_input_tags([tags::FOR_RANKING]);
        AcromuseAssessment {
            node,
            problem,
            crossover_bounds: (0.6, 0.95),
            mutation_bounds: (0.01, 0.25),
            tournament_bounds: (2, 6),
            spd_target: 0.3,
        }
    }
}

impl Operator for AcromuseAssessment {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        if pool.len() < 2 {
            return Ok(());
        }

        let costs: Vec<f64> = pool.iter().map(|h| h.borrow().cost()).collect();
        let worst = costs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut fitness: Vec<f64> = costs.iter().map(|c| worst - c).collect();
        let fitness_sum: f64 = fitness.iter().sum();
        if fitness_sum > 0.0 {
            for f in &mut fitness {
                *f /= fitness_sum;
            }
        } else {
            fitness = vec![1.0 / pool.len() as f64; pool.len()];
        }

        let mut spd = 0.0;
        let mut hpd = 0.0;
        let mut measured = 0usize;
        for (d, spec) in self.problem.decision.iter().enumerate() {
            let range = spec.upper - spec.lower;
            if range <= 0.0 {
                continue;
            }
            let values: Vec<f64> = pool
                .iter()
                .map(|h| h.borrow().decision[d].value_f64())
                .collect();
            let sigma = Statistics::std_dev(&values);
            spd += sigma / range;

            let weighted_mean: f64 = values.iter().zip(&fitness).map(|(v, w)| v * w).sum();
            let weighted_var: f64 = values
                .iter()
                .zip(&fitness)
                .map(|(v, w)| w * (v - weighted_mean).powi(2))
                .sum();
            hpd += weighted_var.sqrt() / range;
            measured += 1;
        }
        if measured == 0 {
            return Ok(());
        }
        spd /= measured as f64;
        hpd /= measured as f64;

        let spd_norm = (spd / self.spd_target).clamp(0.0, 1.0);
        let hpd_norm = (hpd / self.spd_target).clamp(0.0, 1.0);

        let (pc_lo, pc_hi) = self.crossover_bounds;
        let (pm_lo, pm_hi) = self.mutation_bounds;
        let (t_lo, t_hi) = self.tournament_bounds;
        let rates = AdaptiveRates {
            crossover_probability: pc_lo + (pc_hi - pc_lo) * hpd_norm,
            mutation_probability: pm_lo + (pm_hi - pm_lo) * (1.0 - spd_norm),
            tournament_size: t_lo + ((t_hi - t_lo) as f64 * spd_norm).round() as usize,
        };
        debug!(
            "acromuse spd={:.4} hpd={:.4} -> pc={:.3} pm={:.3} t={}",
            spd, hpd, rates.crossover_probability, rates.mutation_probability, rates.tournament_size
        );
        ctx.adaptive = Some(rates);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["spd_target"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "spd_target" => Some(PropertyValue::Real(self.spd_target)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("spd_target", Some(v)) if v > 0.0 => {
                self.spd_target = v;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "AcromuseAssessment",
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
        let mut m = Mapping::new(vec![Element::real(0.5)]);
        m.objectives = objectives.iter().map(|&v| Element::real(v)).collect();
        m.evaluated = true;
        m.set_cost(cost);
        m.into_handle()
    }

    #[test]
    fn test_average_fitness_hand_checked() {
        // ranks 0, 0, 1: raw fitnesses 3, 2, 1; rank 0 averages to 2.5
        let a = member(0.0, &[0.0]);
        let b = member(0.0, &[0.1]);
        let c = member(1.0, &[1.0]);
        let mut set = SolutionSet::new();
        for h in [&a, &b, &c] {
            set.append(Rc::clone(h));
        }

        let mut op = AverageFitness::new();
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[set], &mut ctx).unwrap();

        assert_eq!(a.borrow().cost(), 2.5);
        assert_eq!(b.borrow().cost(), 2.5, "rank ties share the averaged score");
        assert_eq!(c.borrow().cost(), 1.0);
    }

    #[test]
    fn test_scalarisation_sets_flag_and_cost() {
        let a = member(0.0, &[0.0, 1.0]);
        let b = member(0.0, &[1.0, 0.0]);
        let mut set = SolutionSet::new();
        set.append(Rc::clone(&a));
        set.append(Rc::clone(&b));

        let mut op = TchebycheffScalarisation::new(0.05);
        let mut ctx = EngineContext::new(1, 0, 0);
        op.evaluate_node(&[set], &mut ctx).unwrap();

        for h in [&a, &b] {
            let m = h.borrow();
            assert!(m.scalarised);
            assert!(m.cost() > 0.0 && m.cost() <= 1.0 + 0.05);
        }
    }

    #[test]
    fn test_das_dennis_counts_and_simplex() {
        let dirs = das_dennis_directions(3, 4);
        // C(4 + 2, 2) = 15 directions on the simplex
        assert_eq!(dirs.len(), 15);
        for d in &dirs {
            let sum: f64 = d.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_niching_keeps_size_invariant() {
        let mut rng = crate::rng::RngContext::new(44);
        let mut r0 = SolutionSet::new();
        for _ in 0..8 {
            r0.append(member(0.0, &[rng.uniform(), rng.uniform()]));
        }
        r0.add_tag(&tags::rank(0));

        let mut op = NichingSelection::new(0.5, 6);
        let mut ctx = EngineContext::new(2, 0, 0);
        op.evaluate_node(&[r0], &mut ctx).unwrap();
        assert_eq!(op.node().output_sets()[0].len(), 4);
    }

    #[test]
    fn test_hypervolume_reduction_drops_least_contributor() {
        // on a 2-D front, the middle point hugging its neighbour
        // contributes least hypervolume
        let a = member(0.0, &[0.0, 2.0]);
        let b = member(0.0, &[0.95, 1.05]);
        let c = member(0.0, &[1.0, 1.0]);
        let d = member(0.0, &[2.0, 0.0]);
        let mut front = SolutionSet::new();
        for h in [&a, &b, &c, &d] {
            front.append(Rc::clone(h));
        }
        front.add_tag(&tags::rank(0));

        let mut op = HypervolumeReduction::new(3);
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[front], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert_eq!(out.len(), 3);
        let survivors_keep_c = out.iter().any(|h| Rc::ptr_eq(h, &c));
        let survivors_keep_b = out.iter().any(|h| Rc::ptr_eq(h, &b));
        assert!(
            survivors_keep_c != survivors_keep_b,
            "one of the two near-duplicates must be dropped"
        );
        assert!(out.iter().any(|h| Rc::ptr_eq(h, &a)));
        assert!(out.iter().any(|h| Rc::ptr_eq(h, &d)));
    }

    #[test]
    fn test_acromuse_publishes_rates_within_bounds() {
        let problem = Rc::new(Problem::real_box("p", 2, 0.0, 1.0, 1));
        let mut op = AcromuseAssessment::new(problem);
        let mut ctx = EngineContext::new(6, 0, 0);

        let mut set = SolutionSet::new();
        let mut rng = crate::rng::RngContext::new(5);
        for i in 0..20 {
            let mut m = Mapping::new(vec![
                Element::real(rng.uniform()),
                Element::real(rng.uniform()),
            ]);
            m.evaluated = true;
            m.set_cost(i as f64);
            set.append(m.into_handle());
        }

        op.evaluate_node(&[set], &mut ctx).unwrap();
        let rates = ctx.adaptive.expect("assessment publishes rates");
        assert!((0.6..=0.95).contains(&rates.crossover_probability));
        assert!((0.01..=0.25).contains(&rates.mutation_probability));
        assert!((2..=6).contains(&rates.tournament_size));
    }
}
