use crate::element::Element;
use crate::set::SolutionSet;
use chrono::Local;
use log::debug;
use serde_json::json;

/// Sink interface the core reports evaluations and populations to when one
/// is configured. The record format is owned by the sink; the core only
/// hands over the raw values. A `None` sink everywhere means no-op.
pub trait EvaluationSink {
    /// Called once per real function evaluation.
    fn log_evaluation(&self, function: &str, inputs: &[Element], outputs: &[Element]);

    /// Called when a pipeline stage wants a named population recorded.
    fn log_population(&self, set: &SolutionSet, name: &str);
}

/// Structured-record sink writing JSON lines through `log::debug!`.
pub struct JsonLogSink;

impl EvaluationSink for JsonLogSink {
    fn log_evaluation(&self, function: &str, inputs: &[Element], outputs: &[Element]) {
        let record = json!({
            "ts": Local::now().to_rfc3339(),
            "kind": "evaluation",
            "function": function,
            "inputs": inputs.iter().map(|e| e.value_f64()).collect::<Vec<_>>(),
            "outputs": outputs.iter().map(|e| e.value_f64()).collect::<Vec<_>>(),
        });
        debug!("{}", record);
    }

    fn log_population(&self, set: &SolutionSet, name: &str) {
        let costs: Vec<f64> = set.iter().map(|m| m.borrow().cost()).collect();
        let best = costs.iter().cloned().fold(f64::INFINITY, f64::min);
        let record = json!({
            "ts": Local::now().to_rfc3339(),
            "kind": "population",
            "name": name,
            "size": set.len(),
            "best_cost": if best.is_finite() { Some(best) } else { None },
        });
        debug!("{}", record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Mapping;

    #[test]
    fn test_sink_calls_do_not_panic_on_empty_data() {
        let sink = JsonLogSink;
        sink.log_evaluation("f", &[], &[]);
        sink.log_population(&SolutionSet::new(), "empty");

        let mut set = SolutionSet::new();
        set.append(Mapping::new(vec![Element::real(1.0)]).into_handle());
        sink.log_population(&set, "one");
    }
}
