use crate::error::{EvoError, Result};
use crate::logging::EvaluationSink;
use crate::rng::RngContext;
use crate::set::SolutionSet;
use serde::{Deserialize, Serialize};

/// Routing tags shared by the built-in chains. Operators are free to
/// declare their own tags; these are the conventional stage labels.
pub mod tags {
    /// The population carried from iteration to iteration.
    pub const MAIN: &str = "main-population";
    /// Sets whose members still need real function evaluations.
    pub const FOR_RANKING: &str = "for-ranking";
    /// Rank sets awaiting a density/crowding measure.
    pub const FOR_CROWDING: &str = "for-crowding";
    /// Rank sets awaiting elite survival selection.
    pub const FOR_ELITE: &str = "for-elite";
    /// The surviving set mating selection draws parents from.
    pub const FOR_SELECTION: &str = "for-selection";
    /// The mating pool crossover consumes.
    pub const FOR_PERTURBATION: &str = "for-perturbation";
    /// Freshly crossed children awaiting mutation.
    pub const FOR_MUTATION: &str = "for-mutation";
    /// Perturbed children ready to join the next population.
    pub const OFFSPRING: &str = "offspring";

    /// Tag of the k-th non-dominated rank set.
    pub fn rank(k: usize) -> String {
        format!("rank:{}", k)
    }
}

/// Tagged variant carried by the string-keyed property reflection that
/// external configuration tooling binds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Real(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_real(&self) -> Option<f64> {
        match *self {
            PropertyValue::Real(v) => Some(v),
            PropertyValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            PropertyValue::Int(v) => Some(v),
            PropertyValue::Real(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            PropertyValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Real(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Global counter of allowed real function evaluations. An initial budget
/// of 0 means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetCounter {
    initial: u64,
    used: u64,
}

impl BudgetCounter {
    pub fn new(initial: u64) -> Self {
        BudgetCounter { initial, used: 0 }
    }

    pub fn decrement(&mut self, cost: u64) {
        self.used += cost;
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        if self.initial == 0 {
            u64::MAX
        } else {
            self.initial.saturating_sub(self.used)
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.initial > 0 && self.used >= self.initial
    }
}

/// Adaptive operator rates published by an assessment stage (ACROMUSE)
/// and consumed by downstream variation/selection stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveRates {
    pub crossover_probability: f64,
    pub mutation_probability: f64,
    pub tournament_size: usize,
}

/// Per-run shared engine state injected into every operator evaluation:
/// the replayable RNG, the budget and iteration accounting, and the
/// optional structured evaluation sink.
pub struct EngineContext {
    pub rng: RngContext,
    pub budget: BudgetCounter,
    pub iteration: u64,
    pub max_iterations: u64,
    pub evaluation_count: u64,
    pub sink: Option<Box<dyn EvaluationSink>>,
    pub adaptive: Option<AdaptiveRates>,
}

impl EngineContext {
    pub fn new(seed: u64, budget: u64, max_iterations: u64) -> Self {
        EngineContext {
            rng: RngContext::new(seed),
            budget: BudgetCounter::new(budget),
            iteration: 0,
            max_iterations,
            evaluation_count: 0,
            sink: None,
            adaptive: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn EvaluationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn increment_evaluation_count(&mut self, n: u64) {
        self.evaluation_count += n;
    }

    pub fn remaining_iterations(&self) -> u64 {
        self.max_iterations.saturating_sub(self.iteration)
    }
}

/// Common node state every operator embeds: declared input/output tags,
/// the output sets produced by the last evaluation, the cursor over them
/// and the node's own iteration counter.
#[derive(Debug, Default)]
pub struct NodeState {
    name: &'static str,
    input_tags: Vec<String>,
    output_tags: Vec<String>,
    output_sets: Vec<SolutionSet>,
    cursor: usize,
    pub current_iteration: u64,
}

impl NodeState {
    pub fn new(name: &'static str) -> Self {
        NodeState {
            name,
            ..NodeState::default()
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn define_input_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_tags = tags.into_iter().map(Into::into).collect();
    }

    pub fn define_output_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_tags = tags.into_iter().map(Into::into).collect();
    }

    pub fn add_output_tag(&mut self, tag: &str) {
        if !self.output_tags.iter().any(|t| t == tag) {
            self.output_tags.push(tag.to_string());
        }
    }

    pub fn input_tags(&self) -> &[String] {
        &self.input_tags
    }

    pub fn output_tags(&self) -> &[String] {
        &self.output_tags
    }

    /// Discard the previous iteration's output sets. Callers must not
    /// retain references across iterations; the fresh-allocation contract
    /// starts here.
    pub fn clear_output_sets(&mut self) {
        self.output_sets.clear();
        self.cursor = 0;
    }

    /// Stamp the node's declared output tags onto the set and store it.
    pub fn append_output_set(&mut self, mut set: SolutionSet) {
        for tag in &self.output_tags {
            set.add_tag(tag);
        }
        self.output_sets.push(set);
    }

    /// Store a set carrying only the tags it already has.
    pub fn append_output_set_untagged(&mut self, set: SolutionSet) {
        self.output_sets.push(set);
    }

    pub fn output_sets(&self) -> &[SolutionSet] {
        &self.output_sets
    }

    pub fn has_next_output_set(&self) -> bool {
        self.cursor < self.output_sets.len()
    }

    pub fn next_output_set(&mut self) -> Option<&SolutionSet> {
        let set = self.output_sets.get(self.cursor);
        if set.is_some() {
            self.cursor += 1;
        }
        set
    }

    pub fn reset_output_cursor(&mut self) {
        self.cursor = 0;
    }
}

/// One pipeline stage. `evaluate_node` is the single required override;
/// the standard skeleton is:
///
/// 1. `self.node_mut().clear_output_sets()`;
/// 2. read the resolved `inputs` (tag-matched upstream output sets);
/// 3. transform, `append_output_set` the results;
/// 4. update context counters (evaluations, budget) where real work
///    happened.
pub trait Operator {
    fn node(&self) -> &NodeState;

    fn node_mut(&mut self) -> &mut NodeState;

    fn evaluate_node(&mut self, inputs: &[SolutionSet], ctx: &mut EngineContext) -> Result<()>;

    fn name(&self) -> &'static str {
        self.node().name()
    }

    /// Names of the string-keyed properties external tooling may get/set.
    fn property_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn property_value(&self, _name: &str) -> Option<PropertyValue> {
        None
    }

    fn set_property(&mut self, name: &str, _value: &PropertyValue) -> Result<()> {
        Err(EvoError::UnknownProperty {
            class: self.name(),
            name: name.to_string(),
        })
    }
}

/// Alias every member of every input set into one working pool.
pub fn merge_inputs(inputs: &[SolutionSet]) -> SolutionSet {
    let mut merged = SolutionSet::new();
    for set in inputs {
        merged.append_set(set);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::mapping::Mapping;

    #[test]
    fn test_output_cursor_iteration() {
        let mut node = NodeState::new("test");
        node.define_output_tags([tags::MAIN]);
        node.append_output_set(SolutionSet::new());
        node.append_output_set(SolutionSet::new());

        assert!(node.has_next_output_set());
        assert!(node.next_output_set().is_some());
        assert!(node.next_output_set().is_some());
        assert!(!node.has_next_output_set());
        assert!(node.next_output_set().is_none());

        node.clear_output_sets();
        assert!(!node.has_next_output_set());
        assert!(node.output_sets().is_empty());
    }

    #[test]
    fn test_append_output_set_applies_declared_tags() {
        let mut node = NodeState::new("test");
        node.define_output_tags([tags::MAIN, tags::FOR_SELECTION]);
        node.append_output_set(SolutionSet::new());
        let set = &node.output_sets()[0];
        assert!(set.is_tagged(tags::MAIN));
        assert!(set.is_tagged(tags::FOR_SELECTION));
    }

    #[test]
    fn test_merge_inputs_aliases() {
        let handle = Mapping::new(vec![Element::real(1.0)]).into_handle();
        let mut a = SolutionSet::new();
        a.append(std::rc::Rc::clone(&handle));
        let b = a.clone();
        let merged = merge_inputs(&[a, b]);
        assert_eq!(merged.len(), 2);
        merged.at(0).unwrap().borrow_mut().set_cost(5.0);
        assert_eq!(handle.borrow().cost(), 5.0);
    }

    #[test]
    fn test_budget_counter() {
        let mut b = BudgetCounter::new(10);
        b.decrement(4);
        assert_eq!(b.remaining(), 6);
        assert!(!b.is_exhausted());
        b.decrement(6);
        assert!(b.is_exhausted());

        let unlimited = BudgetCounter::new(0);
        assert_eq!(unlimited.remaining(), u64::MAX);
        assert!(!unlimited.is_exhausted());
    }

    #[test]
    fn test_property_value_coercions() {
        assert_eq!(PropertyValue::Int(3).as_real(), Some(3.0));
        assert_eq!(PropertyValue::Real(2.5).as_int(), Some(2));
        assert_eq!(PropertyValue::Bool(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::Text("x".into()).as_real(), None);
        assert_eq!(PropertyValue::Real(1.5).to_string(), "1.5");
    }
}
