//! Concrete pipeline operators: initialisation, evaluation, variation,
//! ranking, density measures, selection and fitness assignment.

pub mod crossover;
pub mod crowding;
pub mod evaluator;
pub mod fitness;
pub mod init;
pub mod mutation;
pub mod ranking;
pub mod selection;

use crate::element::Element;
use crate::problem::VariableSpec;
use crate::rng::RngContext;

/// Fold an out-of-bound value back into `[lower, upper]` by mirroring at
/// the violated boundary, alternating direction on each whole-interval
/// overflow. Produces a continuous bounce instead of clamping, so the
/// step-size statistics of a perturbation survive the correction. Values
/// already inside the interval (boundaries included) pass unchanged.
pub fn reflect_into_bounds(value: f64, lower: f64, upper: f64) -> f64 {
    if value >= lower && value <= upper {
        return value;
    }
    let width = upper - lower;
    if width <= 0.0 {
        return lower;
    }
    if value > upper {
        let excess = value - upper;
        let m = (excess / width).floor();
        let r = excess - m * width;
        if (m as i64) % 2 == 0 {
            upper - r
        } else {
            lower + r
        }
    } else {
        let excess = lower - value;
        let m = (excess / width).floor();
        let r = excess - m * width;
        if (m as i64) % 2 == 0 {
            lower + r
        } else {
            upper - r
        }
    }
}

/// Apply boundary correction to one decision element. Ordered kinds fold
/// back by reflection; nominal values are labels, so a violation re-draws
/// uniformly over the feasible labels instead.
pub fn correct_element(element: &mut Element, spec: &VariableSpec, rng: &mut RngContext) {
    let v = element.value_f64();
    if element.etype().is_ordered() {
        let folded = reflect_into_bounds(v, spec.lower, spec.upper);
        if folded != v {
            element.define_value(folded);
        }
    } else if v < spec.lower || v > spec.upper {
        let redraw = rng.int_range(spec.lower as i64, spec.upper as i64);
        element.define_value(redraw as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementType;

    #[test]
    fn test_reflection_is_identity_inside_and_at_bounds() {
        assert_eq!(reflect_into_bounds(0.5, 0.0, 1.0), 0.5);
        assert_eq!(reflect_into_bounds(0.0, 0.0, 1.0), 0.0);
        assert_eq!(reflect_into_bounds(1.0, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_reflection_bounces_alternating() {
        // one partial overflow mirrors at the violated bound
        assert!((reflect_into_bounds(1.25, 0.0, 1.0) - 0.75).abs() < 1e-12);
        assert!((reflect_into_bounds(-0.5, 0.0, 1.0) - 0.5).abs() < 1e-12);
        // a second whole-interval overflow flips the fold direction
        assert!((reflect_into_bounds(2.3, 0.0, 1.0) - 0.3).abs() < 1e-12);
        assert!((reflect_into_bounds(-1.75, 0.0, 1.0) - 0.75).abs() < 1e-12);
        // shifted interval
        assert!((reflect_into_bounds(5.5, 2.0, 5.0) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_reflection_degenerate_interval() {
        assert_eq!(reflect_into_bounds(3.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn test_correct_element_redraws_nominal() {
        let mut rng = RngContext::new(5);
        let spec = VariableSpec::nominal("c", 0, 3);
        let mut e = Element::new(ElementType::Nominal, 9.0);
        correct_element(&mut e, &spec, &mut rng);
        assert!((0..=3).contains(&e.value_i64()));

        // in-range nominal untouched, no draw consumed
        let before = rng.state();
        let mut ok = Element::new(ElementType::Nominal, 2.0);
        correct_element(&mut ok, &spec, &mut rng);
        assert_eq!(ok.value_i64(), 2);
        assert_eq!(rng.state(), before);
    }
}
