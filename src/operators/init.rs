use crate::error::{EvoError, Result};
use crate::mapping::Mapping;
use crate::operator::{merge_inputs, tags, EngineContext, NodeState, Operator, PropertyValue};
use crate::problem::Problem;
use crate::set::SolutionSet;
use log::debug;
use std::rc::Rc;

/// Pipeline source: on the first pass it populates the main set with
/// randomly sampled mappings; on every later pass it re-emits the
/// fed-back population unchanged.
pub struct Initialisation {
    node: NodeState,
    problem: Rc<Problem>,
    population_size: usize,
}

impl Initialisation {
    pub fn new(problem: Rc<Problem>, population_size: usize) -> Self {
        let mut node = NodeState::new("Initialisation");
        node.define_input_tags([tags::MAIN]);
        node.define_output_tags([tags::MAIN]);
        Initialisation {
            node,
            problem,
            population_size,
        }
    }
}

impl Operator for Initialisation {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let incoming = merge_inputs(inputs);

        let mut out = SolutionSet::new();
        if incoming.is_empty() {
            if self.population_size == 0 {
                return Err(EvoError::Domain {
                    class: "Initialisation",
                    message: "population size must be positive".to_string(),
                });
            }
            debug!(
                "generating {} mappings for problem '{}'",
                self.population_size, self.problem.name
            );
            for _ in 0..self.population_size {
                let decision = self
                    .problem
                    .decision
                    .iter()
                    .map(|spec| spec.sample_element(&mut ctx.rng))
                    .collect();
                out.append(Mapping::new(decision).into_handle());
            }
        } else {
            out.append_set(&incoming);
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
            ("population_size", Some(v)) if v > 0 => {
                self.population_size = v as usize;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "Initialisation",
                name: name.to_string(),
            }),
        }
    }
}

/// Terminal plumbing stage: aliases its input sets into one output set
/// (deduplicated by handle identity), which the algorithm feeds back as
/// the next iteration's population.
pub struct JoinSets {
    node: NodeState,
}

impl JoinSets {
    pub fn new() -> Self {
        let mut node = NodeState::new("JoinSets");
        node.define_input_tags([tags::FOR_SELECTION, tags::OFFSPRING]);
        node.define_output_tags([tags::MAIN]);
        JoinSets { node }
    }
}

impl Default for JoinSets {
    fn default() -> Self {
        JoinSets::new()
    }
}

impl Operator for JoinSets {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], _ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();
        let mut out = SolutionSet::new();
        for set in inputs {
            for handle in set {
                let duplicate = out.iter().any(|m| Rc::ptr_eq(m, handle));
                if !duplicate {
                    out.append(Rc::clone(handle));
                }
            }
        }
        self.node.append_output_set(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_deduplicates_aliases() {
        let mut a = SolutionSet::new();
        let handle = Mapping::new(vec![]).into_handle();
        a.append(Rc::clone(&handle));
        let mut b = SolutionSet::new();
        b.append(Rc::clone(&handle));
        b.append(Mapping::new(vec![]).into_handle());

        let mut op = JoinSets::new();
        let mut ctx = EngineContext::new(0, 0, 0);
        op.evaluate_node(&[a, b], &mut ctx).unwrap();
        assert_eq!(op.node().output_sets()[0].len(), 2);
    }

    #[test]
    fn test_generates_population_once_then_passes_through() {
        let problem = Rc::new(Problem::real_box("p", 3, -1.0, 1.0, 2));
        let mut op = Initialisation::new(Rc::clone(&problem), 10);
        let mut ctx = EngineContext::new(0, 0, 0);

        op.evaluate_node(&[], &mut ctx).unwrap();
        let generated = op.node().output_sets()[0].clone();
        assert_eq!(generated.len(), 10);
        assert!(generated.is_tagged(tags::MAIN));
        for m in &generated {
            let m = m.borrow();
            assert_eq!(m.decision.len(), 3);
            assert!(!m.evaluated);
            for e in &m.decision {
                assert!((-1.0..1.0).contains(&e.value_f64()));
            }
        }

        // fed-back set passes through by alias
        op.evaluate_node(&[generated.clone()], &mut ctx).unwrap();
        let passed = &op.node().output_sets()[0];
        assert_eq!(passed.len(), 10);
        assert!(std::rc::Rc::ptr_eq(
            &passed.at(0).unwrap(),
            &generated.at(0).unwrap()
        ));
    }

    #[test]
    fn test_property_reflection() {
        let problem = Rc::new(Problem::real_box("p", 1, 0.0, 1.0, 1));
        let mut op = Initialisation::new(problem, 5);
        assert_eq!(
            op.property_value("population_size"),
            Some(PropertyValue::Int(5))
        );
        op.set_property("population_size", &PropertyValue::Int(8))
            .unwrap();
        assert_eq!(
            op.property_value("population_size"),
            Some(PropertyValue::Int(8))
        );
        assert!(op.set_property("nope", &PropertyValue::Int(1)).is_err());
    }
}
