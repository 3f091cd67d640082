//! Registers a few metrics, initializes over a stdout-backed channel and
//! emits delta updates in a loop.
//!
//! Run with `cargo run --example emit_deltas`.

use std::sync::Arc;
use std::time::Duration;

use deltametrics::{
    duration_bucketer, ChannelError, Emitter, EventChannel, Field, InitStage, MetricEvent,
    Registry, Units,
};

struct StdoutChannel;

impl EventChannel for StdoutChannel {
    fn emit(&self, event: MetricEvent) -> Result<(), ChannelError> {
        println!("{event:#?}");
        Ok(())
    }
}

fn main() -> deltametrics::Result<()> {
    tracing_subscriber::fmt::init();

    let registry = Arc::new(Registry::new());
    let config = registry.start_stage(InitStage::RestoreConfig);
    let requests = registry.register_counter(
        "/demo/requests",
        false,
        Units::None,
        "Requests served.",
        &[Field::new("status", &["ok", "error"])],
    )?;
    let latency = registry.register_timer(
        "/demo/latency",
        duration_bucketer(8, Duration::from_micros(10), Duration::from_millis(100)),
        "Request latency.",
        &[],
    )?;
    config.finish();

    let emitter = Emitter::new(Arc::clone(&registry), StdoutChannel);
    emitter.initialize()?;

    for round in 0..3u32 {
        for _ in 0..=round {
            let op = latency.start(&[]);
            requests.increment(&["ok"]);
            std::thread::sleep(Duration::from_millis(5));
            op.finish(&[]);
        }
        emitter.emit_update();
    }
    Ok(())
}
