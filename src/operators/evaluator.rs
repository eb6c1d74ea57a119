use crate::error::{EvoError, Result};
use crate::mapping::MappingHandle;
use crate::operator::{tags, EngineContext, NodeState, Operator, PropertyValue};
use crate::problem::{Evaluation, Function, Problem};
use crate::set::SolutionSet;
use log::debug;
use rayon::prelude::*;
use std::rc::Rc;
use std::sync::Arc;

/// Scores every not-yet-evaluated mapping in its input sets against the
/// problem's function, decrementing the global budget per real
/// evaluation. Batch members may be evaluated in parallel; the pipeline
/// stays synchronous around the batch either way.
pub struct FunctionEvaluator {
    node: NodeState,
    problem: Rc<Problem>,
    function: Arc<dyn Function>,
    parallel: bool,
}

impl FunctionEvaluator {
    pub fn new(problem: Rc<Problem>, function: Arc<dyn Function>, parallel: bool) -> Self {
        let mut node = NodeState::new("FunctionEvaluator");
        node.define_input_tags([tags::MAIN]);
        node.define_output_tags([tags::FOR_RANKING]);
        FunctionEvaluator {
            node,
            problem,
            function,
            parallel,
        }
    }

    fn score(&self, pending: &[(MappingHandle, Vec<crate::element::Element>)]) -> Result<Vec<Evaluation>> {
        let decisions: Vec<&Vec<crate::element::Element>> =
            pending.iter().map(|(_, d)| d).collect();
        if self.parallel {
            let function = Arc::clone(&self.function);
            let results: Result<Vec<Evaluation>> = decisions
                .par_iter()
                .map(|decision| function.evaluate(decision.as_slice()))
                .collect();
            let results = results?;
            if results.len() != decisions.len() {
                return Err(EvoError::BatchEvalCount {
                    expected: decisions.len(),
                    got: results.len(),
                });
            }
            Ok(results)
        } else {
            let owned: Vec<Vec<crate::element::Element>> =
                decisions.into_iter().cloned().collect();
            self.function.batch_evaluate(&owned)
        }
    }
}

impl Operator for FunctionEvaluator {
    fn node(&self) -> &NodeState {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeState {
        &mut self.node
    }

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()> {
        self.node.clear_output_sets();

        // collect the pending work before touching any borrow twice: a
        // mapping aliased into several input sets must be scored once
        let mut pending: Vec<(MappingHandle, Vec<crate::element::Element>)> = Vec::new();
        for set in inputs {
            for handle in set {
                let mapping = handle.borrow();
                if mapping.evaluated {
                    continue;
                }
                if pending.iter().any(|(h, _)| Rc::ptr_eq(h, handle)) {
                    continue;
                }
                self.problem.check_decision(&mapping.decision)?;
                pending.push((Rc::clone(handle), mapping.decision.clone()));
            }
        }

        if !pending.is_empty() {
            let evaluations = self.score(&pending)?;
            let n = pending.len() as u64;
            for ((handle, decision), evaluation) in pending.into_iter().zip(evaluations) {
                if let Some(sink) = &ctx.sink {
                    sink.log_evaluation(&self.problem.name, &decision, &evaluation.objectives);
                }
                handle.borrow_mut().apply_evaluation(evaluation, &self.problem)?;
            }
            ctx.budget.decrement(n);
            ctx.increment_evaluation_count(n);
            debug!(
                "evaluated {} mappings ({} budget remaining)",
                n,
                ctx.budget.remaining()
            );
        }

        for set in inputs {
            let mut out = SolutionSet::new();
            out.append_set(set);
            self.node.append_output_set(out);
        }
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["parallel"]
    }

    fn property_value(&self, name: &str) -> Option<PropertyValue> {
        match name {
            "parallel" => Some(PropertyValue::Bool(self.parallel)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        match (name, value.as_bool()) {
            ("parallel", Some(v)) => {
                self.parallel = v;
                Ok(())
            }
            _ => Err(EvoError::UnknownProperty {
                class: "FunctionEvaluator",
                name: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::SchafferN1;
    use crate::element::Element;
    use crate::mapping::Mapping;

    fn setup() -> (FunctionEvaluator, EngineContext, SolutionSet) {
        let problem = Rc::new(SchafferN1::problem(10.0));
        let op = FunctionEvaluator::new(problem, Arc::new(SchafferN1), false);
        let ctx = EngineContext::new(0, 100, 0);
        let mut set = SolutionSet::new();
        for v in [0.0, 1.0, 2.0] {
            set.append(Mapping::new(vec![Element::real(v)]).into_handle());
        }
        (op, ctx, set)
    }

    #[test]
    fn test_evaluates_and_decrements_budget() {
        let (mut op, mut ctx, set) = setup();
        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        assert_eq!(ctx.budget.used(), 3);
        assert_eq!(ctx.evaluation_count, 3);
        for m in &set {
            assert!(m.borrow().evaluated);
        }
        assert_eq!(set.at(1).unwrap().borrow().objective_values(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_skips_already_evaluated_members() {
        let (mut op, mut ctx, set) = setup();
        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        op.evaluate_node(&[set.clone()], &mut ctx).unwrap();
        assert_eq!(ctx.budget.used(), 3, "second pass has nothing to score");
    }

    #[test]
    fn test_aliased_member_scored_once() {
        let (mut op, mut ctx, set) = setup();
        let twin = set.clone();
        op.evaluate_node(&[set, twin], &mut ctx).unwrap();
        assert_eq!(ctx.budget.used(), 3);
    }

    #[test]
    fn test_arity_mismatch_is_loud() {
        let (mut op, mut ctx, mut set) = setup();
        set.append(Mapping::new(vec![Element::real(0.0), Element::real(1.0)]).into_handle());
        let err = op.evaluate_node(&[set], &mut ctx);
        assert!(matches!(
            err,
            Err(EvoError::IncorrectProblemFormat { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        let (mut seq_op, mut ctx_a, set_a) = setup();
        seq_op.evaluate_node(&[set_a.clone()], &mut ctx_a).unwrap();

        let problem = Rc::new(SchafferN1::problem(10.0));
        let mut par_op = FunctionEvaluator::new(problem, Arc::new(SchafferN1), true);
        let mut ctx_b = EngineContext::new(0, 100, 0);
        let mut set_b = SolutionSet::new();
        for v in [0.0, 1.0, 2.0] {
            set_b.append(Mapping::new(vec![Element::real(v)]).into_handle());
        }
        par_op.evaluate_node(&[set_b.clone()], &mut ctx_b).unwrap();

        for i in 0..3 {
            assert_eq!(
                set_a.at(i).unwrap().borrow().objective_values(),
                set_b.at(i).unwrap().borrow().objective_values()
            );
        }
    }
}
