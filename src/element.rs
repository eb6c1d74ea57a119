use crate::error::{EvoError, Result};
use crate::rng::RngContext;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Variable kind of an [`Element`]. Real and Integer are plain numeric
/// types; Ordinal is an integer with meaningful order; Nominal is an
/// integer category label with no order semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Real,
    Integer,
    Ordinal,
    Nominal,
}

impl ElementType {
    pub fn name(&self) -> &'static str {
        match self {
            ElementType::Real => "real",
            ElementType::Integer => "integer",
            ElementType::Ordinal => "ordinal",
            ElementType::Nominal => "nominal",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "real" => Ok(ElementType::Real),
            "integer" => Ok(ElementType::Integer),
            "ordinal" => Ok(ElementType::Ordinal),
            "nominal" => Ok(ElementType::Nominal),
            other => Err(EvoError::UnrecognisedType {
                class: "ElementType",
                message: format!("no element type named '{}'", other),
            }),
        }
    }

    /// Whether values of this type carry an order that arithmetic
    /// crossover/mutation may exploit. Nominal values are labels only.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, ElementType::Nominal)
    }

    pub fn is_integral(&self) -> bool {
        !matches!(self, ElementType::Real)
    }
}

/// Stored value of an element. Real elements store `f64`, all integral
/// kinds store `i64`; the pairing is an invariant maintained by
/// [`Element::define_value`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ElementValue {
    Int(i64),
    Real(f64),
}

/// Parametric sampling distribution optionally attached to an element.
/// All draws go through the [`RngContext`] so replay accounting holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    Uniform { lo: f64, hi: f64 },
    Normal { mean: f64, std_dev: f64 },
    ChiSquared { k: u32 },
}

impl Distribution {
    pub fn sample(&self, rng: &mut RngContext) -> f64 {
        match *self {
            Distribution::Uniform { lo, hi } => rng.uniform_range(lo, hi),
            Distribution::Normal { mean, std_dev } => rng.normal(mean, std_dev),
            Distribution::ChiSquared { k } => rng.chi_squared(k),
        }
    }
}

/// A tagged numeric scalar: the atomic unit of a decision or objective
/// variable. Copied by value; the optional distribution travels with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    etype: ElementType,
    value: ElementValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distribution: Option<Distribution>,
}

impl Element {
    pub fn new(etype: ElementType, value: f64) -> Self {
        let mut e = Element {
            etype,
            value: ElementValue::Int(0),
            distribution: None,
        };
        e.define_value(value);
        e
    }

    pub fn real(value: f64) -> Self {
        Element::new(ElementType::Real, value)
    }

    pub fn integer(value: i64) -> Self {
        Element {
            etype: ElementType::Integer,
            value: ElementValue::Int(value),
            distribution: None,
        }
    }

    pub fn ordinal(value: i64) -> Self {
        Element {
            etype: ElementType::Ordinal,
            value: ElementValue::Int(value),
            distribution: None,
        }
    }

    pub fn nominal(value: i64) -> Self {
        Element {
            etype: ElementType::Nominal,
            value: ElementValue::Int(value),
            distribution: None,
        }
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    pub fn etype(&self) -> ElementType {
        self.etype
    }

    pub fn distribution(&self) -> Option<&Distribution> {
        self.distribution.as_ref()
    }

    /// Numeric value coerced to `f64` regardless of the stored variant.
    pub fn value_f64(&self) -> f64 {
        match self.value {
            ElementValue::Int(v) => v as f64,
            ElementValue::Real(v) => v,
        }
    }

    /// Numeric value coerced to `i64` (reals are rounded half away from
    /// zero, matching `define_value`).
    pub fn value_i64(&self) -> i64 {
        match self.value {
            ElementValue::Int(v) => v,
            ElementValue::Real(v) => v.round() as i64,
        }
    }

    /// Store a new numeric value, converting it to the representation the
    /// declared type requires. Integral kinds round; Real stores as-is.
    pub fn define_value(&mut self, value: f64) {
        self.value = if self.etype.is_integral() {
            ElementValue::Int(value.round() as i64)
        } else {
            ElementValue::Real(value)
        };
    }

    /// Draw from the attached distribution if any, define and return the
    /// new value; without a distribution the stored value is returned
    /// unchanged.
    pub fn sample(&mut self, rng: &mut RngContext) -> f64 {
        if let Some(dist) = self.distribution.clone() {
            let drawn = dist.sample(rng);
            self.define_value(drawn);
        }
        self.value_f64()
    }

    /// Type-bounded minimum sentinel for this element's kind.
    pub fn min_value(&self) -> f64 {
        if self.etype.is_integral() {
            i64::MIN as f64
        } else {
            f64::MIN
        }
    }

    /// Type-bounded maximum sentinel for this element's kind.
    pub fn max_value(&self) -> f64 {
        if self.etype.is_integral() {
            i64::MAX as f64
        } else {
            f64::MAX
        }
    }

    // Arithmetic promotes to Real when either side is Real; two integral
    // operands stay in the left operand's type with integer arithmetic.
    fn combine(self, rhs: Element, f_int: fn(i64, i64) -> i64, f_real: fn(f64, f64) -> f64) -> Element {
        match (self.value, rhs.value) {
            (ElementValue::Int(a), ElementValue::Int(b)) => Element {
                etype: self.etype,
                value: ElementValue::Int(f_int(a, b)),
                distribution: None,
            },
            _ => Element {
                etype: ElementType::Real,
                value: ElementValue::Real(f_real(self.value_f64(), rhs.value_f64())),
                distribution: None,
            },
        }
    }
}

impl Add for Element {
    type Output = Element;
    fn add(self, rhs: Element) -> Element {
        self.combine(rhs, |a, b| a + b, |a, b| a + b)
    }
}

impl Sub for Element {
    type Output = Element;
    fn sub(self, rhs: Element) -> Element {
        self.combine(rhs, |a, b| a - b, |a, b| a - b)
    }
}

impl Mul for Element {
    type Output = Element;
    fn mul(self, rhs: Element) -> Element {
        self.combine(rhs, |a, b| a * b, |a, b| a * b)
    }
}

impl Div for Element {
    type Output = Element;
    fn div(self, rhs: Element) -> Element {
        // Integer division truncates; promote through Real to keep the
        // transparent-conversion contract instead.
        let mut out = Element {
            etype: ElementType::Real,
            value: ElementValue::Real(self.value_f64() / rhs.value_f64()),
            distribution: None,
        };
        if self.etype.is_integral() && rhs.etype.is_integral() {
            out.etype = self.etype;
            let v = out.value_f64();
            out.define_value(v);
        }
        out
    }
}

impl Neg for Element {
    type Output = Element;
    fn neg(self) -> Element {
        match self.value {
            ElementValue::Int(v) => Element {
                etype: self.etype,
                value: ElementValue::Int(-v),
                distribution: None,
            },
            ElementValue::Real(v) => Element {
                etype: self.etype,
                value: ElementValue::Real(-v),
                distribution: None,
            },
        }
    }
}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value_f64().partial_cmp(&other.value_f64())
    }
}
