use crate::element::{Distribution, Element, ElementType};
use crate::error::{EvoError, Result};
use crate::rng::RngContext;
use serde::{Deserialize, Serialize};

/// Declaration of one decision variable: its element type, feasible box
/// and optional sampling distribution used at initialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub etype: ElementType,
    pub lower: f64,
    pub upper: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,
}

impl VariableSpec {
    pub fn real(name: &str, lower: f64, upper: f64) -> Self {
        VariableSpec {
            name: name.to_string(),
            etype: ElementType::Real,
            lower,
            upper,
            distribution: None,
        }
    }

    pub fn integer(name: &str, lower: i64, upper: i64) -> Self {
        VariableSpec {
            name: name.to_string(),
            etype: ElementType::Integer,
            lower: lower as f64,
            upper: upper as f64,
            distribution: None,
        }
    }

    pub fn ordinal(name: &str, lower: i64, upper: i64) -> Self {
        VariableSpec {
            etype: ElementType::Ordinal,
            ..VariableSpec::integer(name, lower, upper)
        }
    }

    pub fn nominal(name: &str, lower: i64, upper: i64) -> Self {
        VariableSpec {
            etype: ElementType::Nominal,
            ..VariableSpec::integer(name, lower, upper)
        }
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    /// Draw a fresh element for this slot: from the attached distribution
    /// when present, else uniformly over the feasible box. One draw either
    /// way for the uniform/box paths.
    pub fn sample_element(&self, rng: &mut RngContext) -> Element {
        let mut element = Element::new(self.etype, self.lower);
        if let Some(dist) = &self.distribution {
            element = element.with_distribution(dist.clone());
            element.sample(rng);
        } else if self.etype.is_integral() {
            let v = rng.int_range(self.lower as i64, self.upper as i64);
            element.define_value(v as f64);
        } else {
            let v = rng.uniform_range(self.lower, self.upper);
            element.define_value(v);
        }
        element
    }
}

/// Static description of an optimization problem: the decision-variable
/// specifications and the number of objective and constraint values the
/// evaluation function fills. All objectives are minimised; constraints
/// are satisfied when their value is <= 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub name: String,
    pub decision: Vec<VariableSpec>,
    pub objective_count: usize,
    #[serde(default)]
    pub constraint_count: usize,
}

impl Problem {
    pub fn new(name: &str, decision: Vec<VariableSpec>, objective_count: usize) -> Self {
        Problem {
            name: name.to_string(),
            decision,
            objective_count,
            constraint_count: 0,
        }
    }

    pub fn with_constraints(mut self, constraint_count: usize) -> Self {
        self.constraint_count = constraint_count;
        self
    }

    /// Convenience constructor for an n-dimensional real box problem.
    pub fn real_box(name: &str, n: usize, lower: f64, upper: f64, objective_count: usize) -> Self {
        let decision = (0..n)
            .map(|i| VariableSpec::real(&format!("x{}", i), lower, upper))
            .collect();
        Problem::new(name, decision, objective_count)
    }

    pub fn decision_size(&self) -> usize {
        self.decision.len()
    }

    /// Validate a decision vector's arity against this problem. Mismatches
    /// fail loudly rather than silently skipping the evaluation.
    pub fn check_decision(&self, decision: &[Element]) -> Result<()> {
        if decision.len() != self.decision.len() {
            return Err(EvoError::IncorrectProblemFormat {
                expected: self.decision.len(),
                got: decision.len(),
            });
        }
        Ok(())
    }
}

/// Result of one real function evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub objectives: Vec<Element>,
    #[serde(default)]
    pub constraints: Vec<Element>,
}

impl Evaluation {
    pub fn unconstrained(objectives: Vec<f64>) -> Self {
        Evaluation {
            objectives: objectives.into_iter().map(Element::real).collect(),
            constraints: Vec::new(),
        }
    }

    pub fn constrained(objectives: Vec<f64>, constraints: Vec<f64>) -> Self {
        Evaluation {
            constraints: constraints.into_iter().map(Element::real).collect(),
            ..Evaluation::unconstrained(objectives)
        }
    }
}

/// Boundary interface to the evaluation engine: analytic benchmarks,
/// surrogate models or external engines all plug in here. Implementations
/// must be thread-safe so the evaluator operator may batch in parallel.
pub trait Function: Send + Sync {
    /// Evaluate one decision vector into objective (and constraint)
    /// values.
    fn evaluate(&self, decision: &[Element]) -> Result<Evaluation>;

    /// Evaluate a batch of decision vectors. The default walks the batch
    /// sequentially; the evaluator operator parallelises over rayon when
    /// configured to. A result count differing from the input count is a
    /// [`EvoError::BatchEvalCount`] error.
    fn batch_evaluate(&self, batch: &[Vec<Element>]) -> Result<Vec<Evaluation>> {
        let results: Result<Vec<Evaluation>> =
            batch.iter().map(|decision| self.evaluate(decision)).collect();
        let results = results?;
        if results.len() != batch.len() {
            return Err(EvoError::BatchEvalCount {
                expected: batch.len(),
                got: results.len(),
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_element_respects_box_and_type() {
        let mut rng = RngContext::new(11);
        let real = VariableSpec::real("x", -2.0, 2.0);
        let nom = VariableSpec::nominal("c", 0, 4);
        for _ in 0..200 {
            let r = real.sample_element(&mut rng);
            assert!((-2.0..2.0).contains(&r.value_f64()));
            let n = nom.sample_element(&mut rng);
            assert!((0..=4).contains(&n.value_i64()));
            assert_eq!(n.etype(), ElementType::Nominal);
        }
    }

    #[test]
    fn test_check_decision_fails_loudly_on_arity_mismatch() {
        let problem = Problem::real_box("box", 3, 0.0, 1.0, 2);
        let short = vec![Element::real(0.0); 2];
        match problem.check_decision(&short) {
            Err(EvoError::IncorrectProblemFormat { expected: 3, got: 2 }) => {}
            other => panic!("expected IncorrectProblemFormat, got {:?}", other),
        }
        let ok = vec![Element::real(0.0); 3];
        assert!(problem.check_decision(&ok).is_ok());
    }
}
