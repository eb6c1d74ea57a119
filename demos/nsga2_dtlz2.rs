//! Example: NSGA-II on the two-objective DTLZ2 benchmark.
//!
//! Run with: cargo run --example nsga2_dtlz2 --release

use evopipe::benchmarks::Dtlz2;
use evopipe::param::Param;
use evopipe::run;
use log::info;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() {
    flexi_logger::Logger::try_with_env_or_str("info")
        .unwrap()
        .start()
        .unwrap();

    let mut param = Param::default();
    param.general.seed = 0;
    param.general.algo = "nsga2".to_string();
    param.population.size = 100;
    param.population.max_iterations = 50;

    let problem = Rc::new(Dtlz2::problem(12, 2));
    let running = Arc::new(AtomicBool::new(true));

    let result = run(problem, Arc::new(Dtlz2 { m: 2 }), &param, running)
        .expect("run should complete");

    info!(
        "final population: {} mappings after {} evaluations",
        result.final_population.len(),
        result.evaluations
    );
    for mapping in result.final_population.mappings.iter().take(10) {
        let objectives: Vec<String> = mapping
            .objective_values()
            .iter()
            .map(|o| format!("{:.4}", o))
            .collect();
        info!("f = [{}] cost = {:.4}", objectives.join(", "), mapping.cost());
    }
}
