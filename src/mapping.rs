use crate::element::Element;
use crate::error::{EvoError, Result};
use crate::problem::{Evaluation, Problem};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Shared-ownership handle to a mapping. Sets alias mappings through these
/// handles; a mapping dies when the last owning set releases it.
pub type MappingHandle = Rc<RefCell<Mapping>>;

/// One candidate solution: a decision vector, the objective and constraint
/// vectors its evaluation filled, and the scalar cost the ranking/fitness
/// operators assign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub decision: Vec<Element>,
    pub objectives: Vec<Element>,
    #[serde(default)]
    pub constraints: Vec<Element>,
    pub cost: Element,
    pub evaluated: bool,
    pub scalarised: bool,
}

impl Mapping {
    pub fn new(decision: Vec<Element>) -> Self {
        Mapping {
            decision,
            objectives: Vec::new(),
            constraints: Vec::new(),
            cost: Element::real(0.0),
            evaluated: false,
            scalarised: false,
        }
    }

    pub fn into_handle(self) -> MappingHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn decision_values(&self) -> Vec<f64> {
        self.decision.iter().map(|e| e.value_f64()).collect()
    }

    pub fn objective_values(&self) -> Vec<f64> {
        self.objectives.iter().map(|e| e.value_f64()).collect()
    }

    pub fn cost(&self) -> f64 {
        self.cost.value_f64()
    }

    pub fn set_cost(&mut self, cost: f64) {
        self.cost.define_value(cost);
    }

    pub fn add_cost(&mut self, delta: f64) {
        let cost = self.cost();
        self.cost.define_value(cost + delta);
    }

    /// Store an evaluation result. The objective arity is validated
    /// against the problem and mismatches are loud errors.
    pub fn apply_evaluation(&mut self, evaluation: Evaluation, problem: &Problem) -> Result<()> {
        if evaluation.objectives.len() != problem.objective_count {
            return Err(EvoError::IncorrectProblemFormat {
                expected: problem.objective_count,
                got: evaluation.objectives.len(),
            });
        }
        self.objectives = evaluation.objectives;
        self.constraints = evaluation.constraints;
        self.evaluated = true;
        self.scalarised = false;
        Ok(())
    }

    /// Mark decision-side state dirty after a perturbation; the evaluator
    /// will re-score the mapping on its next pass.
    pub fn invalidate(&mut self) {
        self.evaluated = false;
        self.scalarised = false;
        self.objectives.clear();
        self.constraints.clear();
        self.set_cost(0.0);
    }

    /// Total constraint violation: the sum of positive constraint values.
    pub fn violation(&self) -> f64 {
        self.constraints
            .iter()
            .map(|c| c.value_f64().max(0.0))
            .sum()
    }

    pub fn is_feasible(&self) -> bool {
        self.violation() <= 0.0
    }
}

/// Deep-copy a mapping behind a fresh handle. The explicit counterpart of
/// aliasing a handle into another set.
pub fn clone_mapping(handle: &MappingHandle) -> MappingHandle {
    Rc::new(RefCell::new(handle.borrow().clone()))
}
