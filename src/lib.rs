//! In-process metrics for a sandboxed kernel-style runtime: cumulative
//! counters, bucketed distributions and initialization-stage timings,
//! reported as deltas over an event channel.
//!
//! The lifecycle has two phases. Metrics are registered while the process
//! starts up; [`Emitter::initialize`] then freezes the registry and
//! announces the full schema to the consumer in a single registration
//! message. From there on, hot paths update values with atomic adds, no
//! locks and no allocation, and a periodic [`Emitter::emit_update`] call
//! sends only what changed since the previous update.
//!
//! ```
//! use std::sync::Arc;
//! use deltametrics::{ChannelError, Emitter, EventChannel, MetricEvent, Registry, Units};
//!
//! struct StdoutChannel;
//!
//! impl EventChannel for StdoutChannel {
//!     fn emit(&self, event: MetricEvent) -> Result<(), ChannelError> {
//!         println!("{event:?}");
//!         Ok(())
//!     }
//! }
//!
//! let registry = Arc::new(Registry::new());
//! let opens = registry
//!     .register_counter("/fs/opens", false, Units::None, "Number of file opens.", &[])
//!     .unwrap();
//!
//! let emitter = Emitter::new(Arc::clone(&registry), StdoutChannel);
//! emitter.initialize().unwrap();
//!
//! opens.increment(&[]);
//! emitter.emit_update();
//! ```

mod bucketer;
pub mod builtin;
mod emitter;
mod error;
mod events;
mod fields;
mod metrics;
mod registry;
mod stage;
pub mod time;

pub use bucketer::{duration_bucketer, Bucketer, ExponentialBucketer};
pub use emitter::Emitter;
pub use error::{Error, Result};
pub use events::{
    ChannelError, EventChannel, MetricEvent, MetricRegistration, MetricUpdate, MetricValue, Value,
};
pub use fields::Field;
pub use metrics::counter::Uint64Metric;
pub use metrics::distribution::DistributionMetric;
pub use metrics::timer::{TimedOperation, TimerMetric};
pub use metrics::{MetricKind, MetricMetadata, Units};
pub use registry::{Registry, StageFinisher, DEFAULT_REGISTRY};
pub use stage::{InitStage, StageTiming};
