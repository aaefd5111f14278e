//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Logs go to stdout; stderr is reserved for the startup failure diagnostic
//! - Metric updates are no-ops until an exporter is installed
//! - Connection and session ids are attached as span fields

pub mod logging;
pub mod metrics;
