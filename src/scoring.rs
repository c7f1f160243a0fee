//! Relevance scoring for per-application aggregates.
//!
//! The score blends CPU, memory and network activity into one number so the
//! dashboard can show the applications worth looking at first.

use crate::sampler::AppAggregate;

/// CPU points: 100% CPU saturates at 40.
const CPU_MAX_POINTS: f64 = 40.0;
const CPU_DIVISOR: f64 = 2.5;

/// Memory points: 1000 MB saturates at 30.
const MEMORY_MAX_POINTS: f64 = 30.0;
const MEMORY_SATURATION_MB: f64 = 1000.0;

/// Network points: 20 total connections saturate at 30.
const NETWORK_MAX_POINTS: f64 = 30.0;
const NETWORK_SATURATION_CONNS: f64 = 20.0;

/// Composite relevance score for one application.
///
/// Each term saturates on its own (CPU at 40, memory at 30, network at 30) and
/// the sum is deliberately not clamped. For non-negative inputs the result lies
/// in `[0, 100]`; negative inputs are not rejected and pull the score below 0.
pub fn score(cpu_percent: f64, memory_mb: f64, incoming: u32, outgoing: u32) -> f64 {
    let cpu = (cpu_percent / CPU_DIVISOR).min(CPU_MAX_POINTS);
    let memory = (memory_mb / MEMORY_SATURATION_MB * MEMORY_MAX_POINTS).min(MEMORY_MAX_POINTS);

    let connections = f64::from(incoming) + f64::from(outgoing);
    let network =
        (connections / NETWORK_SATURATION_CONNS * NETWORK_MAX_POINTS).min(NETWORK_MAX_POINTS);

    cpu + memory + network
}

/// Fill in `relevance_score` on every aggregate and order them highest first.
///
/// The sort is stable: equal scores keep their input order.
pub fn sort_by_relevance(mut apps: Vec<AppAggregate>) -> Vec<AppAggregate> {
    for app in apps.iter_mut() {
        app.relevance_score = score(
            app.cpu_percent,
            app.memory_mb,
            app.incoming_count,
            app.outgoing_count,
        );
    }

    // `sort_by` is a stable merge sort; NaN scores compare as equal.
    apps.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    apps
}
