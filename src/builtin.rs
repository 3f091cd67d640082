//! Process-wide metrics registered on the default registry.
//!
//! The runtime increments these for anomalous events that have no better
//! home; they live here so every component shares one definition. Call
//! [`preregister`] during startup, before the default registry is
//! initialized. A lazily-defined metric cannot register once the set is
//! frozen.

use std::sync::{Arc, LazyLock};

use crate::fields::Field;
use crate::metrics::counter::Uint64Metric;
use crate::metrics::Units;
use crate::registry::DEFAULT_REGISTRY;

/// Allowed values of the weirdness metric's `weirdness_type` field.
pub mod weirdness {
    pub const TIME_FALLBACK: &str = "time_fallback";
    pub const PARTIAL_RESULT: &str = "partial_result";
    pub const VSYSCALL_COUNT: &str = "vsyscall_count";
    pub const WATCHDOG_STUCK_STARTUP: &str = "watchdog_stuck_startup";
    pub const WATCHDOG_STUCK_TASKS: &str = "watchdog_stuck_tasks";
}

/// Allowed values of the suspicious-operations metric's `operation_type`
/// field.
pub mod suspicious {
    pub const OPENED_WRITE_EXECUTE_FILE: &str = "opened_write_execute_file";
}

/// Counts weird occurrences of problems such as clock fallback, partial
/// results, vsyscalls invoked in the sandbox and stuck watchdog tasks.
pub static WEIRDNESS: LazyLock<Arc<Uint64Metric>> = LazyLock::new(|| {
    DEFAULT_REGISTRY
        .register_counter(
            "/weirdness",
            true,
            Units::None,
            "Increment for weird occurrences of problems such as time \
             fallback, partial results, vsyscalls invoked in the sandbox \
             and stuck watchdog tasks.",
            &[Field::new(
                "weirdness_type",
                &[
                    weirdness::TIME_FALLBACK,
                    weirdness::PARTIAL_RESULT,
                    weirdness::VSYSCALL_COUNT,
                    weirdness::WATCHDOG_STUCK_STARTUP,
                    weirdness::WATCHDOG_STUCK_TASKS,
                ],
            )],
        )
        .expect("register builtin weirdness metric")
});

/// Counts suspicious operations, such as opening an executable file for
/// writing.
pub static SUSPICIOUS_OPERATIONS: LazyLock<Arc<Uint64Metric>> = LazyLock::new(|| {
    DEFAULT_REGISTRY
        .register_counter(
            "/suspicious_operations",
            true,
            Units::None,
            "Increment for suspicious operations, such as opening an \
             executable file for writing.",
            &[Field::new(
                "operation_type",
                &[suspicious::OPENED_WRITE_EXECUTE_FILE],
            )],
        )
        .expect("register builtin suspicious operations metric")
});

/// Forces registration of every built-in metric on the default registry.
pub fn preregister() {
    LazyLock::force(&WEIRDNESS);
    LazyLock::force(&SUSPICIOUS_OPERATIONS);
}
