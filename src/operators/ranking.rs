use crate::error::{EvoError, Result};
use crate::mapping::{Mapping, MappingHandle};
use crate::operator::{tags, EngineContext, NodeState, Operator, PropertyValue};
use crate::set::SolutionSet;
use std::cmp::Ordering;
use std::rc::Rc;

/// Pairwise dominance relation. `Less` means the first mapping dominates
/// the second; `Equal` means neither dominates.
pub trait DominanceRelation {
    fn compare(&self, a: &Mapping, b: &Mapping) -> Ordering;

    fn name(&self) -> &'static str;
}

/// Plain Pareto dominance over the objective vectors (all minimised).
pub struct ParetoDominance;

impl DominanceRelation for ParetoDominance {
    fn compare(&self, a: &Mapping, b: &Mapping) -> Ordering {
        let mut a_better = false;
        let mut b_better = false;
        for (fa, fb) in a.objectives.iter().zip(&b.objectives) {
            match fa.value_f64().partial_cmp(&fb.value_f64()) {
                Some(Ordering::Less) => a_better = true,
                Some(Ordering::Greater) => b_better = true,
                _ => {}
            }
            if a_better && b_better {
                return Ordering::Equal;
            }
        }
        match (a_better, b_better) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    fn name(&self) -> &'static str {
        "pareto"
    }
}

/// Feasibility-first dominance: a feasible mapping dominates any
/// infeasible one; two infeasible mappings compare on total violation;
/// two feasible mappings fall back to Pareto dominance.
pub struct ConstrainedDominance;

impl DominanceRelation for ConstrainedDominance {
    fn compare(&self, a: &Mapping, b: &Mapping) -> Ordering {
        match (a.is_feasible(), b.is_feasible()) {
            (true, true) => ParetoDominance.compare(a, b),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => a
                .violation()
                .partial_cmp(&b.violation())
                .unwrap_or(Ordering::Equal),
        }
    }

    fn name(&self) -> &'static str {
        "constrained"
    }
}

/// Goal-based preferability: objectives meeting their goal drop out of
/// the comparison while any violated goal remains; a mapping meeting
/// every goal is preferred over one that does not.
pub struct GoalPreferability {
    pub goals: Vec<f64>,
}

impl GoalPreferability {
    fn violates(&self, m: &Mapping) -> Vec<usize> {
        m.objectives
            .iter()
            .enumerate()
            .filter(|(i, f)| f.value_f64() > self.goals[*i])
            .map(|(i, _)| i)
            .collect()
    }
}

impl DominanceRelation for GoalPreferability {
    fn compare(&self, a: &Mapping, b: &Mapping) -> Ordering {
        let va = self.violates(a);
        let vb = self.violates(b);
        match (va.is_empty(), vb.is_empty()) {
            (true, true) => ParetoDominance.compare(a, b),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                // compare only where at least one side misses its goal
                let mut indices = va;
                for i in vb {
                    if !indices.contains(&i) {
                        indices.push(i);
                    }
                }
                let mut a_better = false;
                let mut b_better = false;
                for &i in &indices {
                    match a.objectives[i]
                        .value_f64()
                        .partial_cmp(&b.objectives[i].value_f64())
                    {
                        Some(Ordering::Less) => a_better = true,
                        Some(Ordering::Greater) => b_better = true,
                        _ => {}
                    }
                }
                match (a_better, b_better) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "goal"
    }
}

/// Partitions its merged input into non-dominated rank sets R0, R1, ...
/// Each rank becomes one output set tagged `rank:<k>`, and every member's
/// cost is (re)defined to its rank ordinal.
pub struct NonDominatedRanking {
    node: NodeState,
    relation: Box<dyn DominanceRelation>,
}

impl NonDominatedRanking {
    pub fn new(relation: Box<dyn DominanceRelation>) -> Self {
        let mut node = NodeState::new("NonDominatedRanking");
        node.define_input_tags([tags::FOR_RANKING]);
        node.define_output_tags([tags::FOR_CROWDING]);
        NonDominatedRanking { node, relation }
    }

    pub fn pareto() -> Self {
        NonDominatedRanking::new(Box::new(ParetoDominance))
    }

    /// Partition handles into fronts under the given relation. Exposed for
    /// operators that re-rank internally (reduction, niching).
    pub fn sort_fronts(
        members: &[MappingHandle],
        relation: &dyn DominanceRelation,
    ) -> Vec<Vec<MappingHandle>> {
        let n = members.len();
        let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut counters: Vec<usize> = vec![0; n];
        let mut current: Vec<usize> = Vec::new();

        for p in 0..n {
            for q in (p + 1)..n {
                match relation.compare(&members[p].borrow(), &members[q].borrow()) {
                    Ordering::Less => {
                        dominated_by[p].push(q);
                        counters[q] += 1;
                    }
                    Ordering::Greater => {
                        dominated_by[q].push(p);
                        counters[p] += 1;
                    }
                    Ordering::Equal => {}
                }
            }
            if counters[p] == 0 {
                current.push(p);
            }
        }

        let mut fronts = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for &p in &current {
                for &q in &dominated_by[p] {
                    counters[q] -= 1;
                    if counters[q] == 0 {
                        next.push(q);
                    }
                }
            }
            fronts.push(current.iter().map(|&i| Rc::clone(&members[i])).collect());
            current = next;
        }
        fronts
    }
}

impl Operator for NonDominatedRanking {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], _ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();

        // aliased duplicates across input sets must be ranked once
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

        for (k, front) in Self::sort_fronts(&members, self.relation.as_ref())
            .into_iter()
            .enumerate()
        {
            let mut set = SolutionSet::new();
            for handle in front {
                handle.borrow_mut().set_cost(k as f64);
                set.append(handle);
            }
            set.add_tag(&tags::rank(k));
            self.node.append_output_set(set);
        }
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["relation"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "relation" => Some(PropertyValue::Text(self.relation.name().to_string())),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        if name == "relation" {
            if let PropertyValue::Text(text) = value {
                match text.as_str() {
                    "pareto" => {
                        self.relation = Box::new(ParetoDominance);
                        return Ok(());
                    }
                    "constrained" => {
                        self.relation = Box::new(ConstrainedDominance);
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
        Err(EvoError::UnknownProperty {
            class: "NonDominatedRanking",
            name: name.to_string(),
        })
    }
}
