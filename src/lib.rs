// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod advice;
pub mod api;
pub mod case_log;
pub mod clinical;
pub mod config;
pub mod engine;
pub mod evidence;
pub mod fuzzy;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::advice::{ClinicalRecord, EvidenceRecord, FusedRecord};
pub use crate::api::{router, AppState};
pub use crate::engine::{aggregate, aggregate_with, FusionWeights};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// Filter from `RUST_LOG` (default `splint_advisor=info,warn`); set
/// `ADVISOR_LOG_FORMAT=json` for JSON lines. A no-op when a subscriber is
/// already installed (e.g. by the deployment runtime).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("splint_advisor=info,warn"));

    let json = std::env::var("ADVISOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
