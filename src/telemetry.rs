//! Application telemetry events and sinks.
//!
//! Revue is a local batch tool, but it still benefits from lightweight
//! telemetry to support debugging and to capture operational signals such
//! as the active database schema version and watermark movement.

use std::io;

use serde::{Deserialize, Serialize};

/// A structured telemetry event emitted by revue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Records the current database schema version after migrations apply.
    SchemaVersionRecorded {
        /// Diesel migration version string (e.g. `20260806000000`).
        schema_version: String,
    },
    /// Records watermark movement for a remote source after a batch
    /// completes.
    WatermarkAdvanced {
        /// Remote source key (the tracking URL).
        source: String,
        /// New watermark as an RFC 3339 timestamp.
        updated_at: String,
    },
    /// Records the outcome of one full sync run.
    SyncCompleted {
        /// Threads that reached the final pipeline stage.
        threads_synced: usize,
        /// Threads abandoned in a partial state.
        threads_failed: usize,
    },
}

/// A sink that can record telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records a telemetry event.
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Records telemetry events to stderr as JSON lines (JSONL).
///
/// This is intended for local debugging and is not transmitted anywhere.
#[derive(Debug, Default)]
pub struct StderrJsonlTelemetrySink;

impl TelemetrySink for StderrJsonlTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}

/// Test support for asserting emitted telemetry.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use std::sync::Mutex;

    use super::{TelemetryEvent, TelemetrySink};

    /// Sink that captures events for later assertions.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl RecordingSink {
        /// Drains and returns every captured event.
        pub fn take(&self) -> Vec<TelemetryEvent> {
            self.events
                .lock()
                .map(|mut events| events.drain(..).collect())
                .unwrap_or_default()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record(&self, event: TelemetryEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::{TelemetryEvent, TelemetrySink};

    #[test]
    fn recording_sink_captures_events() {
        let sink = RecordingSink::default();
        sink.record(TelemetryEvent::SyncCompleted {
            threads_synced: 3,
            threads_failed: 1,
        });

        assert_eq!(
            sink.take(),
            vec![TelemetryEvent::SyncCompleted {
                threads_synced: 3,
                threads_failed: 1,
            }]
        );
    }
}
