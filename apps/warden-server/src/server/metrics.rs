use std::{collections::HashMap, fmt::Write as _, hash::Hash, sync::Mutex};

use super::core::{MetricsState, METRICS_STATE};

pub(crate) const SURFACE_PERFORM: &str = "perform";
pub(crate) const SURFACE_DISPLAY: &str = "display";

pub(crate) const CACHE_HIT: &str = "hit";
pub(crate) const CACHE_MISS: &str = "miss";

pub(crate) const FAIL_CLOSED_UNKNOWN_PERMISSION: &str = "unknown_permission";
pub(crate) const FAIL_CLOSED_UNKNOWN_CHANNEL: &str = "unknown_channel";
pub(crate) const FAIL_CLOSED_STORAGE: &str = "storage";

pub(crate) fn metrics_state() -> &'static MetricsState {
    METRICS_STATE.get_or_init(MetricsState::default)
}

fn snapshot<K: Clone + Ord>(counters: &Mutex<HashMap<K, u64>>) -> Vec<(K, u64)> {
    let mut entries: Vec<_> = counters
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone())
        .into_iter()
        .collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries
}

fn bump<K: Eq + Hash>(counters: &Mutex<HashMap<K, u64>>, key: K) {
    if let Ok(mut counters) = counters.lock() {
        let entry = counters.entry(key).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn render_metrics() -> String {
    let state = metrics_state();
    let mut output = String::new();

    output.push_str(
        "# HELP warden_permission_checks_total Count of permission checks by surface and outcome\n",
    );
    output.push_str("# TYPE warden_permission_checks_total counter\n");
    for ((surface, outcome), value) in snapshot(&state.checks) {
        let _ = writeln!(
            output,
            "warden_permission_checks_total{{surface=\"{surface}\",outcome=\"{outcome}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP warden_permission_checks_failed_closed_total Count of checks answered false because of an error, by reason\n",
    );
    output.push_str("# TYPE warden_permission_checks_failed_closed_total counter\n");
    for (reason, value) in snapshot(&state.failed_closed) {
        let _ = writeln!(
            output,
            "warden_permission_checks_failed_closed_total{{reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP warden_principal_cache_lookups_total Count of principal cache lookups by result\n",
    );
    output.push_str("# TYPE warden_principal_cache_lookups_total counter\n");
    for (result, value) in snapshot(&state.cache_lookups) {
        let _ = writeln!(
            output,
            "warden_principal_cache_lookups_total{{result=\"{result}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP warden_principal_cache_evictions_total Count of full cache evictions by reason\n",
    );
    output.push_str("# TYPE warden_principal_cache_evictions_total counter\n");
    for (reason, value) in snapshot(&state.cache_evictions) {
        let _ = writeln!(
            output,
            "warden_principal_cache_evictions_total{{reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP warden_permission_mutations_total Count of applied permission mutations by action\n",
    );
    output.push_str("# TYPE warden_permission_mutations_total counter\n");
    for (action, value) in snapshot(&state.mutations) {
        let _ = writeln!(
            output,
            "warden_permission_mutations_total{{action=\"{action}\"}} {value}"
        );
    }

    output
}

pub(crate) fn record_check(surface: &'static str, outcome: &'static str) {
    bump(&metrics_state().checks, (surface, outcome));
}

pub(crate) fn record_failed_closed(reason: &'static str) {
    bump(&metrics_state().failed_closed, reason);
}

pub(crate) fn record_cache_lookup(result: &'static str) {
    bump(&metrics_state().cache_lookups, result);
}

pub(crate) fn record_cache_eviction(reason: &'static str) {
    bump(&metrics_state().cache_evictions, reason);
}

pub(crate) fn record_mutation(action: &'static str) {
    bump(&metrics_state().mutations, action);
}

#[cfg(test)]
mod tests {
    use super::{metrics_state, record_check, record_mutation, render_metrics};

    fn check_count(surface: &'static str, outcome: &'static str) -> u64 {
        metrics_state()
            .checks
            .lock()
            .expect("check metrics mutex should not be poisoned")
            .get(&(surface, outcome))
            .copied()
            .unwrap_or(0)
    }

    #[test]
    fn records_checks_under_surface_and_outcome_labels() {
        let before = check_count("metrics_test_surface", "allowed");
        record_check("metrics_test_surface", "allowed");
        assert_eq!(check_count("metrics_test_surface", "allowed"), before + 1);
    }

    #[test]
    fn renders_prometheus_text_for_recorded_counters() {
        record_mutation("metrics_test_action");
        let rendered = render_metrics();
        assert!(rendered.contains("# TYPE warden_permission_mutations_total counter"));
        assert!(rendered.contains("warden_permission_mutations_total{action=\"metrics_test_action\"}"));
        assert!(rendered.contains("# TYPE warden_principal_cache_lookups_total counter"));
    }
}
