//! Analytic benchmark problems used by the end-to-end tests and demos.
//! All of them minimise every objective; constraints are satisfied at
//! values <= 0.

use crate::element::Element;
use crate::error::Result;
use crate::problem::{Evaluation, Function, Problem, VariableSpec};

/// DTLZ2 with `n` decision variables and `m` objectives. The Pareto front
/// is the positive orthant of the unit hypersphere (g = 0 at x_i = 0.5 for
/// the distance variables).
pub struct Dtlz2 {
    pub m: usize,
}

impl Dtlz2 {
    pub fn problem(n: usize, m: usize) -> Problem {
        Problem::real_box("dtlz2", n, 0.0, 1.0, m)
    }
}

impl Function for Dtlz2 {
    fn evaluate(&self, decision: &[Element]) -> Result<Evaluation> {
        let x: Vec<f64> = decision.iter().map(|e| e.value_f64()).collect();
        let k_start = self.m - 1;
        let g: f64 = x[k_start..].iter().map(|xi| (xi - 0.5).powi(2)).sum();

        let mut objectives = Vec::with_capacity(self.m);
        for i in 0..self.m {
            let mut f = 1.0 + g;
            for xj in &x[..self.m - 1 - i] {
                f *= (xj * std::f64::consts::FRAC_PI_2).cos();
            }
            if i > 0 {
                f *= (x[self.m - 1 - i] * std::f64::consts::FRAC_PI_2).sin();
            }
            objectives.push(f);
        }
        Ok(Evaluation::unconstrained(objectives))
    }
}

/// ZDT1: convex front, 2 objectives over [0, 1]^n.
pub struct Zdt1;

impl Zdt1 {
    pub fn problem(n: usize) -> Problem {
        Problem::real_box("zdt1", n, 0.0, 1.0, 2)
    }
}

impl Function for Zdt1 {
    fn evaluate(&self, decision: &[Element]) -> Result<Evaluation> {
        let x: Vec<f64> = decision.iter().map(|e| e.value_f64()).collect();
        let f1 = x[0];
        let g = 1.0 + 9.0 * x[1..].iter().sum::<f64>() / (x.len() - 1) as f64;
        let f2 = g * (1.0 - (f1 / g).sqrt());
        Ok(Evaluation::unconstrained(vec![f1, f2]))
    }
}

/// Schaffer N.1: one decision variable, two convex objectives.
pub struct SchafferN1;

impl SchafferN1 {
    pub fn problem(range: f64) -> Problem {
        Problem::new(
            "schaffer_n1",
            vec![VariableSpec::real("x", -range, range)],
            2,
        )
    }
}

impl Function for SchafferN1 {
    fn evaluate(&self, decision: &[Element]) -> Result<Evaluation> {
        let x = decision[0].value_f64();
        Ok(Evaluation::unconstrained(vec![x * x, (x - 2.0) * (x - 2.0)]))
    }
}

/// Binh and Korn: 2 objectives, 2 constraints, the standard constrained
/// smoke problem.
pub struct BinhKorn;

impl BinhKorn {
    pub fn problem() -> Problem {
        Problem::new(
            "binh_korn",
            vec![
                VariableSpec::real("x", 0.0, 5.0),
                VariableSpec::real("y", 0.0, 3.0),
            ],
            2,
        )
        .with_constraints(2)
    }
}

impl Function for BinhKorn {
    fn evaluate(&self, decision: &[Element]) -> Result<Evaluation> {
        let x = decision[0].value_f64();
        let y = decision[1].value_f64();
        let f1 = 4.0 * x * x + 4.0 * y * y;
        let f2 = (x - 5.0).powi(2) + (y - 5.0).powi(2);
        let c1 = (x - 5.0).powi(2) + y * y - 25.0;
        let c2 = 7.7 - (x - 8.0).powi(2) - (y + 3.0).powi(2);
        Ok(Evaluation::constrained(vec![f1, f2], vec![c1, c2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reals(values: &[f64]) -> Vec<Element> {
        values.iter().map(|&v| Element::real(v)).collect()
    }

    #[test]
    fn test_dtlz2_front_point() {
        let f = Dtlz2 { m: 2 };
        // x0 = 0 and all distance variables at 0.5 lies on the front
        let mut x = vec![0.0];
        x.extend(vec![0.5; 11]);
        let eval = f.evaluate(&reals(&x)).unwrap();
        assert!((eval.objectives[0].value_f64() - 1.0).abs() < 1e-9);
        assert!(eval.objectives[1].value_f64().abs() < 1e-9);
    }

    #[test]
    fn test_dtlz2_norm_on_front_is_one() {
        let f = Dtlz2 { m: 3 };
        let mut x = vec![0.3, 0.7];
        x.extend(vec![0.5; 10]);
        let eval = f.evaluate(&reals(&x)).unwrap();
        let norm: f64 = eval
            .objectives
            .iter()
            .map(|o| o.value_f64().powi(2))
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-9, "g=0 points lie on the unit sphere");
    }

    #[test]
    fn test_zdt1_extremes() {
        let eval = Zdt1.evaluate(&reals(&[0.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(eval.objectives[0].value_f64(), 0.0);
        assert_eq!(eval.objectives[1].value_f64(), 1.0);
    }

    #[test]
    fn test_binh_korn_feasible_origin() {
        let eval = BinhKorn.evaluate(&reals(&[0.0, 0.0])).unwrap();
        assert!(eval.constraints[0].value_f64() <= 0.0);
        assert!(eval.constraints[1].value_f64() <= 0.0);
    }
}
