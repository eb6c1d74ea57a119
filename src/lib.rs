pub mod algorithm;
pub mod benchmarks;
pub mod element;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod operator;
pub mod operators;
pub mod param;
pub mod problem;
pub mod rng;
pub mod set;
pub mod snapshot;

pub use crate::element::{Distribution, Element, ElementType};
pub use crate::error::EvoError;
pub use crate::mapping::{clone_mapping, Mapping, MappingHandle};
pub use crate::operator::{EngineContext, Operator, PropertyValue};
pub use crate::param::Param;
pub use crate::problem::{Evaluation, Function, Problem, VariableSpec};
pub use crate::rng::RngContext;
pub use crate::set::SolutionSet;
pub use crate::snapshot::{PopulationSnapshot, RunResult};

use crate::algorithm::Algorithm;
use crate::error::Result;
use chrono::Local;
use log::{debug, info};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Drive the chain selected by `param.general.algo` to termination:
/// budget exhausted, iteration limit reached, or the shared running flag
/// cleared by the embedding tool.
pub fn run(
    problem: Rc<Problem>,
    function: Arc<dyn Function>,
    param: &Param,
    running: Arc<AtomicBool>,
) -> Result<RunResult> {
    let start = Instant::now();
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

    let mut param = param.clone();
    param::validate(&mut param)?;

    let scorer = Arc::clone(&function);
    let mut algorithm = algorithm::build(Rc::clone(&problem), function, &param)?;
    info!(
        "running {} on '{}' (population {}, max iterations {}, budget {})",
        algorithm.name(),
        problem.name,
        param.population.size,
        param.population.max_iterations,
        param.population.budget,
    );

    let mut trace = Vec::new();
    while !algorithm.is_terminate() {
        if !running.load(Ordering::Relaxed) {
            info!("stop signal received");
            break;
        }
        algorithm.evaluate()?;
        algorithm.increment_iteration();
        if param.general.keep_trace {
            trace.push(PopulationSnapshot::from_set(algorithm.population()));
        }
        debug!("{}", display_iteration(&algorithm));
    }

    // offspring joined on the last pass are still unscored; settle them so
    // the reported population is fully evaluated, then order by cost
    let mut settled = 0u64;
    for handle in algorithm.population() {
        let mut mapping = handle.borrow_mut();
        if !mapping.evaluated {
            let evaluation = scorer.evaluate(&mapping.decision)?;
            mapping.apply_evaluation(evaluation, &problem)?;
            settled += 1;
        }
    }
    if settled > 0 {
        algorithm.ctx.budget.decrement(settled);
        algorithm.ctx.increment_evaluation_count(settled);
    }
    let mut survivors = SolutionSet::new();
    survivors.append_set(algorithm.population());
    survivors.sort_by_cost();
    let final_population = PopulationSnapshot::from_set(&survivors);
    let execution_seconds = start.elapsed().as_secs_f64();
    info!(
        "{} finished: {} iterations, {} evaluations in {:.2}s",
        algorithm.name(),
        algorithm.ctx.iteration,
        algorithm.ctx.evaluation_count,
        execution_seconds,
    );

    Ok(RunResult {
        id: format!("{}_{}_{}", problem.name, param.general.algo, timestamp),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp,
        algo: param.general.algo.clone(),
        seed: param.general.seed,
        iterations: algorithm.ctx.iteration,
        evaluations: algorithm.ctx.evaluation_count,
        execution_seconds,
        final_population,
        trace,
        parameters: param,
    })
}

fn display_iteration(algorithm: &Algorithm) -> String {
    format!(
        "iteration {} | evaluations {} | population {} | remaining budget {}",
        algorithm.ctx.iteration,
        algorithm.ctx.evaluation_count,
        algorithm.population().len(),
        if algorithm.remaining_budget() == u64::MAX {
            "unlimited".to_string()
        } else {
            algorithm.remaining_budget().to_string()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::SchafferN1;

    #[test]
    fn test_run_produces_result_and_trace() {
        let mut param = Param::default();
        param.general.seed = 3;
        param.population.size = 16;
        param.population.max_iterations = 4;

        let result = run(
            Rc::new(SchafferN1::problem(10.0)),
            Arc::new(SchafferN1),
            &param,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        assert_eq!(result.iterations, 4);
        assert_eq!(result.trace.len(), 4);
        assert!(!result.final_population.is_empty());
        assert_eq!(result.algo, "nsga2");
        assert!(result.evaluations >= 16);
    }

    #[test]
    fn test_running_flag_stops_the_loop() {
        let mut param = Param::default();
        param.population.size = 16;
        param.population.max_iterations = 50;

        let result = run(
            Rc::new(SchafferN1::problem(10.0)),
            Arc::new(SchafferN1),
            &param,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert_eq!(result.iterations, 0, "cleared flag stops before the first pass");
    }
}
