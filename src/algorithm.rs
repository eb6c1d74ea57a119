use crate::error::{EvoError, Result};
use crate::operator::{tags, EngineContext, Operator, PropertyValue};
use crate::operators::crossover::{DiscreteCrossover, SbxCrossover, SinglePointCrossover};
use crate::operators::crowding::{CrowdingDistance, PsaCrowding};
use crate::operators::evaluator::FunctionEvaluator;
use crate::operators::fitness::{
    AcromuseAssessment, AverageFitness, HypervolumeReduction, NichingSelection,
    TchebycheffScalarisation,
};
use crate::operators::init::{Initialisation, JoinSets};
use crate::operators::mutation::{CategoricalMutation, PolynomialMutation, SwapMutation};
use crate::operators::ranking::{ConstrainedDominance, NonDominatedRanking, ParetoDominance};
use crate::operators::selection::{
    EliteSelection, PsaEliteSelection, RandomSelection, RouletteWheelSelection,
    StochasticUniversalSampling, TournamentSelection,
};
use crate::param::Param;
use crate::problem::{Function, Problem};
use crate::set::SolutionSet;
use log::{debug, warn};
use std::rc::Rc;
use std::sync::Arc;

/// Marker for an input tag bound to the algorithm's fed-back population
/// instead of an upstream operator.
const FEEDBACK: usize = usize::MAX;

/// A fixed linear chain of operators plus the shared engine state. The
/// chain is wired once at construction: every input tag is bound to its
/// nearest upstream producer (or to the fed-back main population), and
/// each `evaluate()` call just walks the precomputed bindings.
pub struct Algorithm {
    name: &'static str,
    ops: Vec<Box<dyn Operator>>,
    bindings: Vec<Vec<(usize, String)>>,
    pub ctx: EngineContext,
    population: SolutionSet,
}

impl Algorithm {
    pub fn new(name: &'static str, ops: Vec<Box<dyn Operator>>, ctx: EngineContext) -> Result<Self> {
        if ops.is_empty() {
            return Err(EvoError::EmptyPipeline);
        }

        let mut bindings: Vec<Vec<(usize, String)>> = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            let mut resolved = Vec::new();
            for tag in op.node().input_tags() {
                let producer = ops[..i]
                    .iter()
                    .rposition(|p| p.node().output_tags().iter().any(|t| t == tag));
                match producer {
                    Some(j) => resolved.push((j, tag.clone())),
                    None if tag == tags::MAIN => resolved.push((FEEDBACK, tag.clone())),
                    None => debug!(
                        "operator {} input tag '{}' has no producer; it will stay empty",
                        op.name(),
                        tag
                    ),
                }
            }
            bindings.push(resolved);
        }

        Ok(Algorithm {
            name,
            ops,
            bindings,
            ctx,
            population: SolutionSet::new(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run one full pass of the operator chain. The terminal operator's
    /// main-tagged output becomes the population the next pass starts
    /// from.
    pub fn evaluate(&mut self) -> Result<()> {
        for i in 0..self.ops.len() {
            let mut inputs: Vec<SolutionSet> = Vec::new();
            for (src, tag) in &self.bindings[i] {
                if *src == FEEDBACK {
                    inputs.push(self.population.clone());
                } else {
                    for set in self.ops[*src].node().output_sets() {
                        if set.is_tagged(tag) {
                            inputs.push(set.clone());
                        }
                    }
                }
            }
            let op = &mut self.ops[i];
            op.evaluate_node(&inputs, &mut self.ctx)?;
            op.node_mut().current_iteration += 1;
        }

        let terminal = self.ops.last().expect("pipeline is non-empty");
        match terminal
            .node()
            .output_sets()
            .iter()
            .find(|s| s.is_tagged(tags::MAIN))
        {
            Some(next) => self.population = next.clone(),
            None => warn!(
                "terminal operator {} produced no main-tagged set; population unchanged",
                terminal.name()
            ),
        }
        Ok(())
    }

    pub fn increment_iteration(&mut self) {
        self.ctx.iteration += 1;
    }

    pub fn is_terminate(&self) -> bool {
        self.ctx.budget.is_exhausted()
            || (self.ctx.max_iterations > 0 && self.ctx.iteration >= self.ctx.max_iterations)
    }

    pub fn remaining_budget(&self) -> u64 {
        self.ctx.budget.remaining()
    }

    pub fn remaining_iterations(&self) -> u64 {
        self.ctx.remaining_iterations()
    }

    pub fn population(&self) -> &SolutionSet {
        &self.population
    }

    pub fn operators(&self) -> &[Box<dyn Operator>] {
        &self.ops
    }

    /// Ordered (operator, properties) walk: the structure an external
    /// workflow serializer needs.
    pub fn operator_properties(&self) -> Vec<(&'static str, Vec<(&'static str, PropertyValue)>)> {
        self.ops
            .iter()
            .map(|op| {
                let properties = op
                    .property_names()
                    .into_iter()
                    .filter_map(|name| op.property_value(name).map(|v| (name, v)))
                    .collect();
                (op.name(), properties)
            })
            .collect()
    }
}

fn context(param: &Param) -> EngineContext {
    EngineContext::new(
        param.general.seed,
        param.population.budget,
        param.population.max_iterations,
    )
}

fn ranking_for(problem: &Problem) -> NonDominatedRanking {
    if problem.constraint_count > 0 {
        NonDominatedRanking::new(Box::new(ConstrainedDominance))
    } else {
        NonDominatedRanking::new(Box::new(ParetoDominance))
    }
}

fn mating_selection(param: &Param, maximise: bool) -> Result<Box<dyn Operator>> {
    let pool = param.population.size;
    match param.selection.method.as_str() {
        "tournament" if !maximise => Ok(Box::new(TournamentSelection::new(
            pool,
            param.selection.tournament_size,
        ))),
        "roulette" => Ok(Box::new(RouletteWheelSelection::new(pool, maximise))),
        "sus" => Ok(Box::new(StochasticUniversalSampling::new(pool, maximise))),
        // rank-averaged fitness must be consumed proportionally
        "tournament" => Ok(Box::new(StochasticUniversalSampling::new(pool, maximise))),
        other => Err(EvoError::Domain {
            class: "Algorithm",
            message: format!("unknown selection method '{}'", other),
        }),
    }
}

fn crossover_op(problem: &Rc<Problem>, param: &Param) -> Result<Box<dyn Operator>> {
    let p = &param.crossover;
    match p.method.as_str() {
        "sbx" => {
            let mut op = SbxCrossover::new(
                Rc::clone(problem),
                p.solution_probability,
                p.variable_probability,
            );
            op.swap_probability = p.swap_probability;
            op.distribution_index = p.distribution_index;
            Ok(Box::new(op))
        }
        "single_point" => Ok(Box::new(SinglePointCrossover::new(
            Rc::clone(problem),
            p.solution_probability,
            p.variable_probability,
        ))),
        "discrete" => Ok(Box::new(DiscreteCrossover::new(
            Rc::clone(problem),
            p.solution_probability,
            p.variable_probability,
        ))),
        other => Err(EvoError::Domain {
            class: "Algorithm",
            message: format!("unknown crossover method '{}'", other),
        }),
    }
}

fn mutation_ops(problem: &Rc<Problem>, param: &Param) -> Result<Vec<Box<dyn Operator>>> {
    let p = &param.mutation;
    let mut ops: Vec<Box<dyn Operator>> = Vec::new();
    match p.method.as_str() {
        "polynomial" => {
            let mut op = PolynomialMutation::new(
                Rc::clone(problem),
                p.solution_probability,
                p.variable_probability,
            );
            op.distribution_index = p.distribution_index;
            ops.push(Box::new(op));
            // nominal slots are invisible to polynomial mutation
            if problem.decision.iter().any(|s| !s.etype.is_ordered()) {
                let mut label = CategoricalMutation::new(
                    Rc::clone(problem),
                    p.solution_probability,
                    p.variable_probability,
                );
                label.node_mut().define_input_tags([tags::OFFSPRING]);
                ops.push(Box::new(label));
            }
        }
        "categorical" => ops.push(Box::new(CategoricalMutation::new(
            Rc::clone(problem),
            p.solution_probability,
            p.variable_probability,
        ))),
        "swap" => ops.push(Box::new(SwapMutation::new(
            Rc::clone(problem),
            p.solution_probability,
        ))),
        other => {
            return Err(EvoError::Domain {
                class: "Algorithm",
                message: format!("unknown mutation method '{}'", other),
            })
        }
    }
    Ok(ops)
}

/// NSGA-II: ranking, crowding, elite survival, mating selection, SBX and
/// polynomial mutation, offspring joined back onto the elite.
pub fn nsga2(problem: Rc<Problem>, function: Arc<dyn Function>, param: &Param) -> Result<Algorithm> {
    let mut ops: Vec<Box<dyn Operator>> = vec![
        Box::new(Initialisation::new(Rc::clone(&problem), param.population.size)),
        Box::new(FunctionEvaluator::new(
            Rc::clone(&problem),
            function,
            param.general.parallel_eval,
        )),
        Box::new(ranking_for(&problem)),
        Box::new(CrowdingDistance::new()),
        Box::new(EliteSelection::new(param.selection.elite_ratio)),
        mating_selection(param, false)?,
        crossover_op(&problem, param)?,
    ];
    ops.extend(mutation_ops(&problem, param)?);
    ops.push(Box::new(JoinSets::new()));
    Algorithm::new("nsga2", ops, context(param))
}

/// NSGA-III: like NSGA-II but survival is reference-direction niching.
pub fn nsga3(problem: Rc<Problem>, function: Arc<dyn Function>, param: &Param) -> Result<Algorithm> {
    let mut ranking = ranking_for(&problem);
    ranking.node_mut().define_output_tags([tags::FOR_ELITE]);
    let mut ops: Vec<Box<dyn Operator>> = vec![
        Box::new(Initialisation::new(Rc::clone(&problem), param.population.size)),
        Box::new(FunctionEvaluator::new(
            Rc::clone(&problem),
            function,
            param.general.parallel_eval,
        )),
        Box::new(ranking),
        Box::new(NichingSelection::new(
            param.selection.elite_ratio,
            param.nsga3.divisions,
        )),
        mating_selection(param, false)?,
        crossover_op(&problem, param)?,
    ];
    ops.extend(mutation_ops(&problem, param)?);
    ops.push(Box::new(JoinSets::new()));
    Algorithm::new("nsga3", ops, context(param))
}

/// MOGA: rank-averaged fitness consumed by proportional selection;
/// generational replacement (the offspring set alone becomes the next
/// population).
pub fn moga(problem: Rc<Problem>, function: Arc<dyn Function>, param: &Param) -> Result<Algorithm> {
    let mut join = JoinSets::new();
    join.node_mut().define_input_tags([tags::OFFSPRING]);
    let mut ops: Vec<Box<dyn Operator>> = vec![
        Box::new(Initialisation::new(Rc::clone(&problem), param.population.size)),
        Box::new(FunctionEvaluator::new(
            Rc::clone(&problem),
            function,
            param.general.parallel_eval,
        )),
        Box::new(ranking_for(&problem)),
        Box::new(AverageFitness::new()),
        mating_selection(param, true)?,
        crossover_op(&problem, param)?,
    ];
    ops.extend(mutation_ops(&problem, param)?);
    ops.push(Box::new(join));
    Algorithm::new("moga", ops, context(param))
}

/// SMS-EMOA: steady state — one offspring per iteration, survival by
/// dropping the least hypervolume contributor of the worst rank.
pub fn sms_emoa(
    problem: Rc<Problem>,
    function: Arc<dyn Function>,
    param: &Param,
) -> Result<Algorithm> {
    let mut ranking = ranking_for(&problem);
    ranking.node_mut().define_output_tags([tags::FOR_ELITE]);
    let mut crossover = SbxCrossover::new(
        Rc::clone(&problem),
        param.crossover.solution_probability,
        param.crossover.variable_probability,
    );
    crossover.swap_probability = param.crossover.swap_probability;
    crossover.distribution_index = param.crossover.distribution_index;
    crossover.offspring_count = 1;

    let mut ops: Vec<Box<dyn Operator>> = vec![
        Box::new(Initialisation::new(Rc::clone(&problem), param.population.size)),
        Box::new(FunctionEvaluator::new(
            Rc::clone(&problem),
            function,
            param.general.parallel_eval,
        )),
        Box::new(ranking),
        Box::new(HypervolumeReduction::new(param.population.size)),
        Box::new(RandomSelection::new(2)),
        Box::new(crossover),
    ];
    ops.extend(mutation_ops(&problem, param)?);
    ops.push(Box::new(JoinSets::new()));
    Algorithm::new("smsemoa", ops, context(param))
}

/// ACROMUSE: NSGA-II survival with diversity-adaptive crossover/mutation
/// rates and tournament pressure.
pub fn acromuse(
    problem: Rc<Problem>,
    function: Arc<dyn Function>,
    param: &Param,
) -> Result<Algorithm> {
    let mut assessment = AcromuseAssessment::new(Rc::clone(&problem));
    assessment.spd_target = param.acromuse.spd_target;
    let mut ops: Vec<Box<dyn Operator>> = vec![
        Box::new(Initialisation::new(Rc::clone(&problem), param.population.size)),
        Box::new(FunctionEvaluator::new(
            Rc::clone(&problem),
            function,
            param.general.parallel_eval,
        )),
        Box::new(assessment),
        Box::new(ranking_for(&problem)),
        Box::new(CrowdingDistance::new()),
        Box::new(EliteSelection::new(param.selection.elite_ratio)),
        Box::new(TournamentSelection::new(
            param.population.size,
            param.selection.tournament_size,
        )),
        crossover_op(&problem, param)?,
    ];
    ops.extend(mutation_ops(&problem, param)?);
    ops.push(Box::new(JoinSets::new()));
    Algorithm::new("acromuse", ops, context(param))
}

/// ParEGO: augmented Tchebycheff scalarisation under a fresh random
/// weight vector each iteration, then a single-objective elite + mating
/// step over the scalarised cost. A surrogate-backed `Function` slots in
/// through the same evaluation interface.
pub fn parego(
    problem: Rc<Problem>,
    function: Arc<dyn Function>,
    param: &Param,
) -> Result<Algorithm> {
    let mut scalarise = TchebycheffScalarisation::new(param.parego.rho);
    scalarise.node_mut().define_output_tags([tags::FOR_ELITE]);
    let mut ops: Vec<Box<dyn Operator>> = vec![
        Box::new(Initialisation::new(Rc::clone(&problem), param.population.size)),
        Box::new(FunctionEvaluator::new(
            Rc::clone(&problem),
            function,
            param.general.parallel_eval,
        )),
        Box::new(scalarise),
        Box::new(EliteSelection::new(param.selection.elite_ratio)),
        mating_selection(param, false)?,
        crossover_op(&problem, param)?,
    ];
    ops.extend(mutation_ops(&problem, param)?);
    ops.push(Box::new(JoinSets::new()));
    Algorithm::new("parego", ops, context(param))
}

/// sParEGO: the ParEGO loop with PSA niche crowding folded into the
/// scalarised cost and PSA elite survival, trading some convergence
/// pressure for spread.
pub fn sparego(
    problem: Rc<Problem>,
    function: Arc<dyn Function>,
    param: &Param,
) -> Result<Algorithm> {
    let mut scalarise = TchebycheffScalarisation::new(param.parego.rho);
    scalarise.node_mut().define_output_tags([tags::FOR_CROWDING]);
    let mut ops: Vec<Box<dyn Operator>> = vec![
        Box::new(Initialisation::new(Rc::clone(&problem), param.population.size)),
        Box::new(FunctionEvaluator::new(
            Rc::clone(&problem),
            function,
            param.general.parallel_eval,
        )),
        Box::new(scalarise),
        Box::new(PsaCrowding::new(param.psa.niche_count)),
        Box::new(PsaEliteSelection::new(param.selection.elite_ratio)),
        mating_selection(param, false)?,
        crossover_op(&problem, param)?,
    ];
    ops.extend(mutation_ops(&problem, param)?);
    ops.push(Box::new(JoinSets::new()));
    Algorithm::new("sparego", ops, context(param))
}

/// Build the chain selected by `param.general.algo`.
pub fn build(problem: Rc<Problem>, function: Arc<dyn Function>, param: &Param) -> Result<Algorithm> {
    match param.general.algo.as_str() {
        "nsga2" => nsga2(problem, function, param),
        "nsga3" => nsga3(problem, function, param),
        "moga" => moga(problem, function, param),
        "smsemoa" => sms_emoa(problem, function, param),
        "acromuse" => acromuse(problem, function, param),
        "parego" => parego(problem, function, param),
        "sparego" => sparego(problem, function, param),
        other => Err(EvoError::UnknownAlgorithm(other.to_string())),
    }
}
