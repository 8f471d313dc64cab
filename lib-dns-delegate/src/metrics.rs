//! Prometheus counters for the resolution pipeline.  These register
//! against the default registry, so a binary serving
//! `prometheus::gather()` picks them up without further wiring.

use prometheus::{opts, register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

/// The upstream answered and the reply corresponds to the request.
pub const PROBE_OUTCOME_OK: &str = "ok";

/// The upstream answered but the reply did not correspond to the
/// request (wrong id, or not a response at all).
pub const PROBE_OUTCOME_MISMATCHED: &str = "mismatched";

/// The upstream never produced a usable reply: timeout, I/O error, or
/// a reply which could not be parsed.
pub const PROBE_OUTCOME_NO_REPLY: &str = "no-reply";

pub static CACHE_HIT_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_resolver_cache_hit_total",
        "Total number of questions answered from the cache."
    ))
    .unwrap()
});

pub static CACHE_MISS_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_resolver_cache_miss_total",
        "Total number of questions which missed the cache."
    ))
    .unwrap()
});

pub static UPSTREAM_PROBES_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec!(
            opts!(
                "dns_resolver_upstream_probes_total",
                "Total number of upstream nameserver probes, by outcome."
            ),
            &["outcome"]
        )
        .unwrap()
    });
