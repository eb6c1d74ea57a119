use crate::error::{EvoError, Result};
use crate::mapping::{clone_mapping, MappingHandle};
use crate::operator::{merge_inputs, tags, EngineContext, NodeState, Operator, PropertyValue};
use crate::operators::correct_element;
use crate::problem::Problem;
use crate::set::SolutionSet;
use std::rc::Rc;

const SBX_EPS: f64 = 1e-12;

/// Walk a mating pool two-by-two, wrapping around until `target` children
/// have been produced. Children are deep clones; parents are never
/// touched.
fn parent_pairs(pool: &SolutionSet, index: usize) -> (MappingHandle, MappingHandle) {
    let a = pool.at(index % pool.len()).expect("index wrapped into pool");
    let b = pool.at((index + 1) % pool.len()).expect("index wrapped into pool");
    (a, b)
}

/// Simulated binary crossover over the ordered decision variables.
///
/// Gating: one solution-level draw per parent pair, one variable-level
/// draw per supported variable, one optional swap draw per crossed
/// variable. Out-of-bound children fold back by boundary reflection.
pub struct SbxCrossover {
    node: NodeState,
    problem: Rc<Problem>,
    pub solution_probability: f64,
    pub variable_probability: f64,
    pub swap_probability: f64,
    pub distribution_index: f64,
    pub offspring_count: usize,
}

impl SbxCrossover {
    pub fn new(problem: Rc<Problem>, solution_probability: f64, variable_probability: f64) -> Self {
        let mut node = NodeState::new("SbxCrossover");
        node.define_input_tags([tags::FOR_PERTURBATION]);
        node.define_output_tags([tags::FOR_MUTATION]);
        SbxCrossover {
            node,
            problem,
            solution_probability,
            variable_probability,
            swap_probability: 0.5,
            distribution_index: 20.0,
            offspring_count: 0,
        }
    }
}

impl Operator for SbxCrossover {
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
        if pool.len() < 2 {
            self.node.append_output_set(out);
            return Ok(());
        }

        let target = if self.offspring_count > 0 {
            self.offspring_count
        } else {
            pool.len()
        };
        let solution_p = ctx
            .adaptive
            .map(|a| a.crossover_probability)
            .unwrap_or(self.solution_probability);
        let exponent = 1.0 / (self.distribution_index + 1.0);

        let mut index = 0;
        while out.len() < target {
            let (a, b) = parent_pairs(&pool, index);
            index += 2;
            let pa = a.borrow().decision_values();
            let pb = b.borrow().decision_values();
            let c1 = clone_mapping(&a);
            let c2 = clone_mapping(&b);
            let mut touched = false;

            if ctx.rng.gate(solution_p) {
                for (j, spec) in self.problem.decision.iter().enumerate() {
                    if !spec.etype.is_ordered() || !ctx.rng.gate(self.variable_probability) {
                        continue;
                    }
                    let u = ctx.rng.uniform();
                    let beta = if u <= 0.5 {
                        (2.0 * u).powf(exponent)
                    } else {
                        (1.0 / (2.0 * (1.0 - u + SBX_EPS))).powf(exponent)
                    };
                    let mut y1 = 0.5 * ((1.0 + beta) * pa[j] + (1.0 - beta) * pb[j]);
                    let mut y2 = 0.5 * ((1.0 - beta) * pa[j] + (1.0 + beta) * pb[j]);
                    if ctx.rng.gate(self.swap_probability) {
                        std::mem::swap(&mut y1, &mut y2);
                    }
                    for (child, y) in [(&c1, y1), (&c2, y2)] {
                        let mut child = child.borrow_mut();
                        child.decision[j].define_value(y);
                        correct_element(&mut child.decision[j], spec, &mut ctx.rng);
                    }
                    touched = true;
                }
            }

            if touched {
                c1.borrow_mut().invalidate();
                c2.borrow_mut().invalidate();
            }
            out.append(c1);
            if out.len() < target {
                out.append(c2);
            }
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec![
            "solution_probability",
            "variable_probability",
            "swap_probability",
            "distribution_index",
            "offspring_count",
        ]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "solution_probability" => Some(PropertyValue::Real(self.solution_probability)),
            "variable_probability" => Some(PropertyValue::Real(self.variable_probability)),
            "swap_probability" => Some(PropertyValue::Real(self.swap_probability)),
            "distribution_index" => Some(PropertyValue::Real(self.distribution_index)),
            "offspring_count" => Some(PropertyValue::Int(self.offspring_count as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("solution_probability", Some(v)) => self.solution_probability = v,
            ("variable_probability", Some(v)) => self.variable_probability = v,
            ("swap_probability", Some(v)) => self.swap_probability = v,
            ("distribution_index", Some(v)) => self.distribution_index = v,
            ("offspring_count", Some(v)) if v >= 0.0 => self.offspring_count = v as usize,
            _ => {
                return Err(EvoError::UnknownProperty {
                    class: "SbxCrossover",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Convex-combination crossover sharing a single coefficient across all
/// crossed variables of a pair.
pub struct SinglePointCrossover {
    node: NodeState,
    problem: Rc<Problem>,
    pub solution_probability: f64,
    pub variable_probability: f64,
    pub offspring_count: usize,
}

impl SinglePointCrossover {
    pub fn new(problem: Rc<Problem>, solution_probability: f64, variable_probability: f64) -> Self {
        let mut node = NodeState::new("SinglePointCrossover");
        node.define_input_tags([tags::FOR_PERTURBATION]);
        node.define_output_tags([tags::FOR_MUTATION]);
        SinglePointCrossover {
            node,
            problem,
            solution_probability,
            variable_probability,
            offspring_count: 0,
        }
    }
}

impl Operator for SinglePointCrossover {
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
        if pool.len() < 2 {
            self.node.append_output_set(out);
            return Ok(());
        }

        let target = if self.offspring_count > 0 {
            self.offspring_count
        } else {
            pool.len()
        };
        let mut index = 0;
        while out.len() < target {
            let (a, b) = parent_pairs(&pool, index);
            index += 2;
            let pa = a.borrow().decision_values();
            let pb = b.borrow().decision_values();
            let c1 = clone_mapping(&a);
            let c2 = clone_mapping(&b);
            let mut touched = false;

            if ctx.rng.gate(self.solution_probability) {
                // one convex coefficient for the whole pair
                let beta = ctx.rng.uniform();
                for (j, spec) in self.problem.decision.iter().enumerate() {
                    if !spec.etype.is_ordered() || !ctx.rng.gate(self.variable_probability) {
                        continue;
                    }
                    let y1 = beta * pa[j] + (1.0 - beta) * pb[j];
                    let y2 = (1.0 - beta) * pa[j] + beta * pb[j];
                    for (child, y) in [(&c1, y1), (&c2, y2)] {
                        let mut child = child.borrow_mut();
                        child.decision[j].define_value(y);
                        correct_element(&mut child.decision[j], spec, &mut ctx.rng);
                    }
                    touched = true;
                }
            }

            if touched {
                c1.borrow_mut().invalidate();
                c2.borrow_mut().invalidate();
            }
            out.append(c1);
            if out.len() < target {
                out.append(c2);
            }
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["solution_probability", "variable_probability", "offspring_count"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "solution_probability" => Some(PropertyValue::Real(self.solution_probability)),
            "variable_probability" => Some(PropertyValue::Real(self.variable_probability)),
            "offspring_count" => Some(PropertyValue::Int(self.offspring_count as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("solution_probability", Some(v)) => self.solution_probability = v,
            ("variable_probability", Some(v)) => self.variable_probability = v,
            ("offspring_count", Some(v)) if v >= 0.0 => self.offspring_count = v as usize,
            _ => {
                return Err(EvoError::UnknownProperty {
                    class: "SinglePointCrossover",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Raw-value exchange restricted to ordinal/nominal variables: each gated
/// variable swaps the parents' values between the two children on a
/// 50/50 draw.
pub struct DiscreteCrossover {
    node: NodeState,
    problem: Rc<Problem>,
    pub solution_probability: f64,
    pub variable_probability: f64,
    pub offspring_count: usize,
}

impl DiscreteCrossover {
    pub fn new(problem: Rc<Problem>, solution_probability: f64, variable_probability: f64) -> Self {
        let mut node = NodeState::new("DiscreteCrossover");
        node.define_input_tags([tags::FOR_PERTURBATION]);
        node.define_output_tags([tags::FOR_MUTATION]);
        DiscreteCrossover {
            node,
            problem,
            solution_probability,
            variable_probability,
            offspring_count: 0,
        }
    }
}

impl Operator for DiscreteCrossover {
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
        if pool.len() < 2 {
            self.node.append_output_set(out);
            return Ok(());
        }

        let target = if self.offspring_count > 0 {
            self.offspring_count
        } else {
            pool.len()
        };
        let mut index = 0;
        while out.len() < target {
            let (a, b) = parent_pairs(&pool, index);
            index += 2;
            let pa = a.borrow().decision_values();
            let pb = b.borrow().decision_values();
            let c1 = clone_mapping(&a);
            let c2 = clone_mapping(&b);
            let mut touched = false;

            if ctx.rng.gate(self.solution_probability) {
                for (j, spec) in self.problem.decision.iter().enumerate() {
                    if spec.etype == crate::element::ElementType::Real
                        || !ctx.rng.gate(self.variable_probability)
                    {
                        continue;
                    }
                    if ctx.rng.uniform() < 0.5 {
                        c1.borrow_mut().decision[j].define_value(pb[j]);
                        c2.borrow_mut().decision[j].define_value(pa[j]);
                        touched = true;
                    }
                }
            }

            if touched {
                c1.borrow_mut().invalidate();
                c2.borrow_mut().invalidate();
            }
            out.append(c1);
            if out.len() < target {
                out.append(c2);
            }
        }

        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["solution_probability", "variable_probability", "offspring_count"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "solution_probability" => Some(PropertyValue::Real(self.solution_probability)),
            "variable_probability" => Some(PropertyValue::Real(self.variable_probability)),
            "offspring_count" => Some(PropertyValue::Int(self.offspring_count as i64)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("solution_probability", Some(v)) => self.solution_probability = v,
            ("variable_probability", Some(v)) => self.variable_probability = v,
            ("offspring_count", Some(v)) if v >= 0.0 => self.offspring_count = v as usize,
            _ => {
                return Err(EvoError::UnknownProperty {
                    class: "DiscreteCrossover",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::mapping::Mapping;

    fn pool_of(values: &[f64]) -> SolutionSet {
        let mut pool = SolutionSet::new();
        for &v in values {
            let mut m = Mapping::new(vec![Element::real(v), Element::real(v)]);
            m.evaluated = true;
            pool.append(m.into_handle());
        }
        pool
    }

    #[test]
    fn test_sbx_identical_parents_produce_identical_children() {
        let problem = Rc::new(Problem::real_box("p", 2, 0.0, 1.0, 2));
        let mut op = SbxCrossover::new(problem, 1.0, 1.0);
        let mut ctx = EngineContext::new(17, 0, 0);
        let pool = pool_of(&[0.4, 0.4]);

        op.evaluate_node(&[pool], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert_eq!(out.len(), 2);
        for child in out {
            for e in &child.borrow().decision {
                assert!(
                    (e.value_f64() - 0.4).abs() < 1e-9,
                    "no diversity in, no perturbation out"
                );
            }
        }
    }

    #[test]
    fn test_sbx_children_are_clones_and_parents_untouched() {
        let problem = Rc::new(Problem::real_box("p", 2, 0.0, 1.0, 2));
        let mut op = SbxCrossover::new(problem, 1.0, 1.0);
        let mut ctx = EngineContext::new(3, 0, 0);
        let pool = pool_of(&[0.2, 0.9]);

        op.evaluate_node(&[pool.clone()], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        assert_eq!(pool.at(0).unwrap().borrow().decision_values(), vec![0.2, 0.2]);
        assert!(!Rc::ptr_eq(&out.at(0).unwrap(), &pool.at(0).unwrap()));
        for child in out {
            let child = child.borrow();
            assert!(!child.evaluated, "perturbed children need re-evaluation");
            for e in &child.decision {
                assert!((0.0..=1.0).contains(&e.value_f64()));
            }
        }
    }

    #[test]
    fn test_gated_off_crossover_keeps_children_evaluated() {
        let problem = Rc::new(Problem::real_box("p", 2, 0.0, 1.0, 2));
        let mut op = SbxCrossover::new(problem, 0.0, 1.0);
        let mut ctx = EngineContext::new(3, 0, 0);
        op.evaluate_node(&[pool_of(&[0.2, 0.9])], &mut ctx).unwrap();
        for child in &op.node().output_sets()[0] {
            assert!(
                child.borrow().evaluated,
                "untouched clones keep their parent's evaluation"
            );
        }
    }

    #[test]
    fn test_offspring_count_controls_output_size() {
        let problem = Rc::new(Problem::real_box("p", 2, 0.0, 1.0, 2));
        let mut op = SbxCrossover::new(problem, 1.0, 1.0);
        op.offspring_count = 1;
        let mut ctx = EngineContext::new(3, 0, 0);
        op.evaluate_node(&[pool_of(&[0.2, 0.9, 0.5])], &mut ctx).unwrap();
        assert_eq!(op.node().output_sets()[0].len(), 1);
    }

    #[test]
    fn test_single_point_shares_coefficient() {
        let problem = Rc::new(Problem::real_box("p", 2, 0.0, 1.0, 2));
        let mut op = SinglePointCrossover::new(problem, 1.0, 1.0);
        let mut ctx = EngineContext::new(5, 0, 0);
        op.evaluate_node(&[pool_of(&[0.0, 1.0])], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        let c1 = out.at(0).unwrap();
        let d = c1.borrow().decision_values();
        assert!(
            (d[0] - d[1]).abs() < 1e-12,
            "one shared beta must move both variables identically"
        );
    }

    #[test]
    fn test_discrete_crossover_ignores_real_variables() {
        let problem = Rc::new(Problem::new(
            "mixed",
            vec![
                crate::problem::VariableSpec::real("x", 0.0, 1.0),
                crate::problem::VariableSpec::nominal("c", 0, 5),
            ],
            1,
        ));
        let mut op = DiscreteCrossover::new(problem, 1.0, 1.0);
        let mut ctx = EngineContext::new(2, 0, 0);

        let mut pool = SolutionSet::new();
        let mut a = Mapping::new(vec![Element::real(0.1), Element::nominal(1)]);
        a.evaluated = true;
        let mut b = Mapping::new(vec![Element::real(0.9), Element::nominal(4)]);
        b.evaluated = true;
        pool.append(a.into_handle());
        pool.append(b.into_handle());

        op.evaluate_node(&[pool], &mut ctx).unwrap();
        let out = &op.node().output_sets()[0];
        // the real slot is never exchanged
        assert_eq!(out.at(0).unwrap().borrow().decision[0].value_f64(), 0.1);
        assert_eq!(out.at(1).unwrap().borrow().decision[0].value_f64(), 0.9);
        // nominal slots hold one of the parent labels
        for child in out {
            let v = child.borrow().decision[1].value_i64();
            assert!(v == 1 || v == 4);
        }
    }
}
