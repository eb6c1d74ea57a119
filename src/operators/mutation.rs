use crate::element::ElementType;
use crate::error::{EvoError, Result};
use crate::operator::{merge_inputs, tags, EngineContext, NodeState, Operator, PropertyValue};
use crate::operators::correct_element;
use crate::problem::Problem;
use crate::set::SolutionSet;
use std::rc::Rc;

/// Polynomial mutation over the ordered decision variables. Operates in
/// place on its input mappings (the chain hands it freshly cloned
/// children); a touched mapping is invalidated for re-evaluation.
pub struct PolynomialMutation {
    node: NodeState,
    problem: Rc<Problem>,
    pub solution_probability: f64,
    pub variable_probability: f64,
    pub distribution_index: f64,
}

impl PolynomialMutation {
    pub fn new(problem: Rc<Problem>, solution_probability: f64, variable_probability: f64) -> Self {
        let mut node = NodeState::new("PolynomialMutation");
        node.define_input_tags([tags::FOR_MUTATION]);
        node.define_output_tags([tags::OFFSPRING]);
        PolynomialMutation {
            node,
            problem,
            solution_probability,
            variable_probability,
            distribution_index: 20.0,
        }
    }
}

impl Operator for PolynomialMutation {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        let exponent = 1.0 / (self.distribution_index + 1.0);
        let solution_p = ctx
            .adaptive
            .map(|a| a.mutation_probability)
            .unwrap_or(self.solution_probability);

        for handle in &pool {
            if !ctx.rng.gate(solution_p) {
                continue;
            }
            let mut touched = false;
            let mut mapping = handle.borrow_mut();
            for (j, spec) in self.problem.decision.iter().enumerate() {
                if !spec.etype.is_ordered() || !ctx.rng.gate(self.variable_probability) {
                    continue;
                }
                let v = mapping.decision[j].value_f64();
                let u = ctx.rng.uniform();
                let mutated = if u <= 0.5 {
                    let delta = (2.0 * u).powf(exponent) - 1.0;
                    v + delta * (v - spec.lower)
                } else {
                    let delta = 1.0 - (2.0 * (1.0 - u)).powf(exponent);
                    v + delta * (spec.upper - v)
                };
                mapping.decision[j].define_value(mutated);
                correct_element(&mut mapping.decision[j], spec, &mut ctx.rng);
                touched = true;
            }
            if touched {
                mapping.invalidate();
            }
        }

        let mut out = SolutionSet::new();
        out.append_set(&pool);
        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec![
            "solution_probability",
            "variable_probability",
            "distribution_index",
        ]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "solution_probability" => Some(PropertyValue::Real(self.solution_probability)),
            "variable_probability" => Some(PropertyValue::Real(self.variable_probability)),
            "distribution_index" => Some(PropertyValue::Real(self.distribution_index)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("solution_probability", Some(v)) => self.solution_probability = v,
            ("variable_probability", Some(v)) => self.variable_probability = v,
            ("distribution_index", Some(v)) => self.distribution_index = v,
            _ => {
                return Err(EvoError::UnknownProperty {
                    class: "PolynomialMutation",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Nominal-variable mutation: a gated variable is replaced by a uniform
/// draw over its feasible labels.
pub struct CategoricalMutation {
    node: NodeState,
    problem: Rc<Problem>,
    pub solution_probability: f64,
    pub variable_probability: f64,
}

impl CategoricalMutation {
    pub fn new(problem: Rc<Problem>, solution_probability: f64, variable_probability: f64) -> Self {
        let mut node = NodeState::new("CategoricalMutation");
        node.define_input_tags([tags::FOR_MUTATION]);
        node.define_output_tags([tags::OFFSPRING]);
        CategoricalMutation {
            node,
            problem,
            solution_probability,
            variable_probability,
        }
    }
}

impl Operator for CategoricalMutation {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);

        for handle in &pool {
            if !ctx.rng.gate(self.solution_probability) {
                continue;
            }
            let mut touched = false;
            let mut mapping = handle.borrow_mut();
            for (j, spec) in self.problem.decision.iter().enumerate() {
                if spec.etype != ElementType::Nominal || !ctx.rng.gate(self.variable_probability) {
                    continue;
                }
                let label = ctx.rng.int_range(spec.lower as i64, spec.upper as i64);
                mapping.decision[j].define_value(label as f64);
                touched = true;
            }
            if touched {
                mapping.invalidate();
            }
        }

        let mut out = SolutionSet::new();
        out.append_set(&pool);
        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["solution_probability", "variable_probability"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "solution_probability" => Some(PropertyValue::Real(self.solution_probability)),
            "variable_probability" => Some(PropertyValue::Real(self.variable_probability)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("solution_probability", Some(v)) => self.solution_probability = v,
            ("variable_probability", Some(v)) => self.variable_probability = v,
            _ => {
                return Err(EvoError::UnknownProperty {
                    class: "CategoricalMutation",
                    name: name.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Exchanges the values of two randomly chosen decision slots within the
/// same solution. Each swapped value is re-interpreted (and corrected)
/// by its destination slot.
pub struct SwapMutation {
    node: NodeState,
    problem: Rc<Problem>,
    pub solution_probability: f64,
}

impl SwapMutation {
    pub fn new(problem: Rc<Problem>, solution_probability: f64) -> Self {
        let mut node = NodeState::new("SwapMutation");
        node.define_input_tags([tags::FOR_MUTATION]);
        node.define_output_tags([tags::OFFSPRING]);
        SwapMutation {
            node,
            problem,
            solution_probability,
        }
    }
}

impl Operator for SwapMutation {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let pool = merge_inputs(inputs);
        let n = self.problem.decision_size();

        if n >= 2 {
            for handle in &pool {
                if !ctx.rng.gate(self.solution_probability) {
                    continue;
                }
                // two distinct slots in exactly two draws
                let i = ctx.rng.below(n);
                let mut j = ctx.rng.below(n - 1);
                if j >= i {
                    j += 1;
                }
                let mut mapping = handle.borrow_mut();
                let vi = mapping.decision[i].value_f64();
                let vj = mapping.decision[j].value_f64();
                mapping.decision[i].define_value(vj);
                mapping.decision[j].define_value(vi);
                correct_element(&mut mapping.decision[i], &self.problem.decision[i], &mut ctx.rng);
                correct_element(&mut mapping.decision[j], &self.problem.decision[j], &mut ctx.rng);
                mapping.invalidate();
            }
        }

        let mut out = SolutionSet::new();
        out.append_set(&pool);
        self.node.append_output_set(out);
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["solution_probability"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "solution_probability" => Some(PropertyValue::Real(self.solution_probability)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_real()) {
            ("solution_probability", Some(v)) => {
                self.solution_probability = v;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "SwapMutation",
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
    use crate::problem::VariableSpec;

    fn children(values: &[&[f64]]) -> SolutionSet {
        let mut set = SolutionSet::new();
        for vs in values {
            let mut m = Mapping::new(vs.iter().map(|&v| Element::real(v)).collect());
            m.evaluated = true;
            set.append(m.into_handle());
        }
        set
    }

    #[test]
    fn test_polynomial_mutation_stays_in_bounds_and_invalidates() {
        let problem = Rc::new(Problem::real_box("p", 4, -1.0, 1.0, 1));
        let mut op = PolynomialMutation::new(problem, 1.0, 1.0);
        let mut ctx = EngineContext::new(13, 0, 0);
        let set = children(&[&[0.9, -0.9, 0.0, 0.5] as &[f64]; 10]);

        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        let mut any_moved = false;
        for m in &set {
            let m = m.borrow();
            assert!(!m.evaluated, "mutated mappings must be re-evaluated");
            for e in &m.decision {
                assert!((-1.0..=1.0).contains(&e.value_f64()));
            }
            if m.decision_values() != vec![0.9, -0.9, 0.0, 0.5] {
                any_moved = true;
            }
        }
        assert!(any_moved, "full gating must perturb something");
    }

    #[test]
    fn test_mutation_gated_off_is_identity() {
        let problem = Rc::new(Problem::real_box("p", 2, 0.0, 1.0, 1));
        let mut op = PolynomialMutation::new(problem, 0.0, 1.0);
        let mut ctx = EngineContext::new(13, 0, 0);
        let before = ctx.rng.state();
        let set = children(&[&[0.3, 0.6]]);

        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        assert_eq!(set.at(0).unwrap().borrow().decision_values(), vec![0.3, 0.6]);
        assert!(set.at(0).unwrap().borrow().evaluated);
        assert_eq!(ctx.rng.state(), before, "p=0 gate consumes no draw");
    }

    #[test]
    fn test_categorical_mutation_redraws_labels_only() {
        let problem = Rc::new(Problem::new(
            "mixed",
            vec![
                VariableSpec::real("x", 0.0, 1.0),
                VariableSpec::nominal("c", 2, 6),
            ],
            1,
        ));
        let mut op = CategoricalMutation::new(problem, 1.0, 1.0);
        let mut ctx = EngineContext::new(2, 0, 0);

        let mut set = SolutionSet::new();
        let mut m = Mapping::new(vec![Element::real(0.5), Element::nominal(2)]);
        m.evaluated = true;
        set.append(m.into_handle());

        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        let m = set.at(0).unwrap();
        let m = m.borrow();
        assert_eq!(m.decision[0].value_f64(), 0.5);
        assert!((2..=6).contains(&m.decision[1].value_i64()));
    }

    #[test]
    fn test_swap_mutation_exchanges_two_slots() {
        let problem = Rc::new(Problem::real_box("p", 3, 0.0, 10.0, 1));
        let mut op = SwapMutation::new(problem, 1.0);
        let mut ctx = EngineContext::new(8, 0, 0);
        let set = children(&[&[1.0, 2.0, 3.0]]);

        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        let mut after = set.at(0).unwrap().borrow().decision_values();
        after.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(after, vec![1.0, 2.0, 3.0], "swap permutes, never alters values");
        assert!(!set.at(0).unwrap().borrow().evaluated);
    }
}
