//! OTel-native metrics instruments.
//!
//! Centralized metric definitions using OpenTelemetry meters. All
//! instruments are lazily initialized and the module is gated behind the
//! `otel` feature.
//!
//! Naming follows OTel semantic conventions (dot-separated); exporters
//! convert dots to underscores where needed.

use std::sync::LazyLock;

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Meter};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("ledgerflow"));

/// Events accepted onto a bus queue.
pub static EVENTS_PUBLISHED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("ledgerflow.bus.published")
        .with_description("Events enqueued on the event bus")
        .build()
});

/// Events dropped because the queue was full.
pub static EVENTS_DROPPED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("ledgerflow.bus.dropped")
        .with_description("Events dropped on a full queue")
        .build()
});

/// Events a worker consumed successfully.
pub static EVENTS_CONSUMED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("ledgerflow.bus.consumed")
        .with_description("Events consumed successfully")
        .build()
});

/// Events abandoned after the retry budget was exhausted.
pub static EVENTS_ABANDONED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("ledgerflow.bus.abandoned")
        .with_description("Events dropped after exhausting retries")
        .build()
});
