//! Heuristic risk flags.
//!
//! Pure functions of the collected facts; no I/O happens here. Flags stay
//! `None` when the underlying fact is unknown.

use depgate_core::config::HeuristicsConfig;
use depgate_core::package::Package;
use depgate_core::trust;

/// Hard threshold: scores at or below this are flagged risky.
pub const SCORE_RISKY: f64 = 0.15;

/// Soft threshold: scores at or below this are reported, not flagged.
pub const SCORE_MID: f64 = 0.6;

/// Run heuristics over the collected packages using the current clock.
pub fn run_heuristics(packages: &mut [Package], config: &HeuristicsConfig) {
    run_heuristics_at(packages, config, trust::now_ms());
}

/// Run heuristics with an explicit reference time.
pub fn run_heuristics_at(packages: &mut [Package], config: &HeuristicsConfig, now_ms: i64) {
    for pkg in packages.iter_mut() {
        apply(pkg, config, now_ms);
    }
    log_presence_stats(packages);
}

fn apply(pkg: &mut Package, config: &HeuristicsConfig, now_ms: i64) {
    pkg.risk_missing = pkg.exists.map(|exists| !exists);

    match pkg.exists {
        Some(true) => {}
        Some(false) => {
            tracing::warn!(package = %pkg, "package is NOT present on public provider");
            return;
        }
        None => {
            tracing::info!(package = %pkg, "existence test skipped");
            return;
        }
    }

    if let Some(score) = pkg.heuristic_score {
        pkg.risk_low_score = Some(score <= SCORE_RISKY);
        if score <= SCORE_RISKY {
            tracing::warn!(package = %pkg, score, "package scored LOW");
        } else if score <= SCORE_MID {
            tracing::warn!(package = %pkg, score, "package scored below mid threshold");
        }
    }

    // Short history: fewer than two published versions.
    pkg.risk_min_versions = pkg.version_count.map(|count| count < 2);

    if let Some(age_days) = trust::age_days_from_epoch_ms(pkg.release_timestamp_ms, now_ms) {
        let too_new = age_days < config.min_release_age_days;
        pkg.risk_too_new = Some(too_new);
        if too_new {
            tracing::warn!(package = %pkg, age_days, "package is SUSPICIOUSLY NEW");
        }
    }

    pkg.risk_provenance_regression = pkg.provenance_regressed;
    pkg.risk_registry_signature_regression = pkg.registry_signature_regressed;
    pkg.risk_score_decrease = pkg
        .trust_score_delta
        .map(|delta| delta <= -config.score_decrease_threshold.abs());

    if pkg.osm_flagged == Some(true) {
        tracing::warn!(package = %pkg, "package is flagged by OpenSourceMalware");
    }
}

fn log_presence_stats(packages: &[Package]) {
    let total = packages.len();
    if total == 0 {
        return;
    }
    let present = packages.iter().filter(|p| p.exists == Some(true)).count();
    tracing::info!(
        present,
        total,
        percentage = format!("{:.2}", present as f64 / total as f64 * 100.0),
        "packages present on the public provider"
    );
}
