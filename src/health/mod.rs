//! Dependency health: probes, the passive aggregation loop, and the status
//! endpoint payload shape.

mod probe;
mod registry;

pub use probe::{run_with_timeout, CheckOutcome, CheckStatus, DependencyProbe, ProbeCheck};
pub use registry::{HealthRegistry, HealthSummary, LOOP_PERIOD};

/// Route the status endpoint is exposed at, under the instance-name group.
pub const HEALTHCHECK_ROUTE: &str = "healthcheck";

/// Render the current summary into the status endpoint's reply shape:
/// `"OK"` when empty, otherwise `"Error(s):\n" + joined messages`, plus
/// whether the reply should carry a `CRIT` error.
pub fn render_status(summary: &HealthSummary) -> (String, bool) {
    let errors = summary.snapshot();
    if errors.is_empty() {
        ("OK".to_string(), false)
    } else {
        (format!("Error(s):\n{}", errors.join("\n")), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_renders_ok_without_error() {
        let summary = HealthSummary::new();
        let (text, is_crit) = render_status(&summary);
        assert_eq!(text, "OK");
        assert!(!is_crit);
    }
}
