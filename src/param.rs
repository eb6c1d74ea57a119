use crate::error::EvoError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub population: Population,
    #[serde(default)]
    pub crossover: Crossover,
    #[serde(default)]
    pub mutation: Mutation,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub nsga3: Nsga3,
    #[serde(default)]
    pub psa: Psa,
    #[serde(default)]
    pub parego: Parego,
    #[serde(default)]
    pub acromuse: Acromuse,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "algorithm_default")]
    pub algo: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub keep_trace: bool,
    #[serde(default = "false_default")]
    pub parallel_eval: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Population {
    #[serde(default = "pop_size_default")]
    pub size: usize,
    #[serde(default = "max_iterations_default")]
    pub max_iterations: u64,
    #[serde(default = "uzero_default")]
    pub budget: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Crossover {
    #[serde(default = "crossover_method_default")]
    pub method: String,
    #[serde(default = "solution_crossover_default")]
    pub solution_probability: f64,
    #[serde(default = "half_default")]
    pub variable_probability: f64,
    #[serde(default = "half_default")]
    pub swap_probability: f64,
    #[serde(default = "distribution_index_default")]
    pub distribution_index: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Mutation {
    #[serde(default = "mutation_method_default")]
    pub method: String,
    #[serde(default = "one_real_default")]
    pub solution_probability: f64,
    #[serde(default = "variable_mutation_default")]
    pub variable_probability: f64,
    #[serde(default = "distribution_index_default")]
    pub distribution_index: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Selection {
    #[serde(default = "selection_method_default")]
    pub method: String,
    #[serde(default = "half_default")]
    pub elite_ratio: f64,
    #[serde(default = "tournament_size_default")]
    pub tournament_size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Nsga3 {
    #[serde(default = "divisions_default")]
    pub divisions: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Psa {
    #[serde(default = "uzero_default_usize")]
    pub niche_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Parego {
    #[serde(default = "rho_default")]
    pub rho: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Acromuse {
    #[serde(default = "spd_target_default")]
    pub spd_target: f64,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Population {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Crossover {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Mutation {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Selection {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Nsga3 {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Psa {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Parego {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Acromuse {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Load and validate a YAML parameter file.
pub fn get(param_file: &str) -> Result<Param, EvoError> {
    let reader = File::open(param_file)
        .map_err(|e| EvoError::Config(format!("cannot open {}: {}", param_file, e)))?;
    let mut config: Param = serde_yaml::from_reader(BufReader::new(reader))
        .map_err(|e| EvoError::Config(format!("cannot parse {}: {}", param_file, e)))?;
    validate(&mut config)?;
    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<(), EvoError> {
    let probability = |name: &str, v: f64| -> Result<(), EvoError> {
        if !(0.0..=1.0).contains(&v) {
            return Err(EvoError::Domain {
                class: "Param",
                message: format!("{}={} outside [0, 1]", name, v),
            });
        }
        Ok(())
    };
    probability(
        "crossover.solution_probability",
        param.crossover.solution_probability,
    )?;
    probability(
        "crossover.variable_probability",
        param.crossover.variable_probability,
    )?;
    probability("crossover.swap_probability", param.crossover.swap_probability)?;
    probability(
        "mutation.solution_probability",
        param.mutation.solution_probability,
    )?;
    probability(
        "mutation.variable_probability",
        param.mutation.variable_probability,
    )?;

    if param.population.size < 4 {
        return Err(EvoError::Domain {
            class: "Param",
            message: format!(
                "population.size={} too small to evolve",
                param.population.size
            ),
        });
    }

    if param.selection.elite_ratio <= 0.0 || param.selection.elite_ratio > 1.0 {
        return Err(EvoError::Domain {
            class: "Param",
            message: format!(
                "selection.elite_ratio={} outside (0, 1]",
                param.selection.elite_ratio
            ),
        });
    }

    if param.nsga3.divisions == 0 {
        return Err(EvoError::Domain {
            class: "Param",
            message: "nsga3.divisions must be at least 1".to_string(),
        });
    }

    if param.parego.rho < 0.0 {
        return Err(EvoError::Domain {
            class: "Param",
            message: format!("parego.rho={} must be >= 0", param.parego.rho),
        });
    }

    if param.selection.tournament_size < 2 {
        warn!("tournament_size < 2 removes all selection pressure");
    }

    if param.population.budget > 0 && param.population.budget < 2 * param.population.size as u64 {
        warn!(
            "budget {} covers less than two generations of {} evaluations",
            param.population.budget, param.population.size
        );
    }

    if param.mutation.variable_probability > 0.5 {
        warn!(
            "mutation.variable_probability={} perturbs most variables every time; convergence will suffer",
            param.mutation.variable_probability
        );
    }

    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    1138
}
fn algorithm_default() -> String {
    "nsga2".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn true_default() -> bool {
    true
}
fn false_default() -> bool {
    false
}
fn pop_size_default() -> usize {
    100
}
fn max_iterations_default() -> u64 {
    100
}
fn uzero_default() -> u64 {
    0
}
fn uzero_default_usize() -> usize {
    0
}
fn crossover_method_default() -> String {
    "sbx".to_string()
}
fn mutation_method_default() -> String {
    "polynomial".to_string()
}
fn selection_method_default() -> String {
    "tournament".to_string()
}
fn solution_crossover_default() -> f64 {
    0.9
}
fn half_default() -> f64 {
    0.5
}
fn one_real_default() -> f64 {
    1.0
}
fn variable_mutation_default() -> f64 {
    0.1
}
fn distribution_index_default() -> f64 {
    20.0
}
fn tournament_size_default() -> usize {
    2
}
fn divisions_default() -> usize {
    12
}
fn rho_default() -> f64 {
    0.05
}
fn spd_target_default() -> f64 {
    0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_param_is_valid() {
        let mut param = Param::default();
        assert_eq!(param.general.algo, "nsga2");
        assert_eq!(param.population.size, 100);
        assert!(validate(&mut param).is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "general:\n  seed: 7\npopulation:\n  size: 40\n";
        let param: Param = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(param.general.seed, 7);
        assert_eq!(param.population.size, 40);
        assert_eq!(param.crossover.solution_probability, 0.9);
        assert_eq!(param.selection.tournament_size, 2);
    }

    #[test]
    fn test_validate_rejects_bad_probability() {
        let mut param = Param::default();
        param.crossover.solution_probability = 1.5;
        assert!(validate(&mut param).is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_population() {
        let mut param = Param::default();
        param.population.size = 2;
        assert!(validate(&mut param).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_elite_ratio() {
        let mut param = Param::default();
        param.selection.elite_ratio = 0.0;
        assert!(validate(&mut param).is_err());
    }
}
