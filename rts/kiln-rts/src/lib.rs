//! Kiln Runtime System
//!
//! Entry point for programs produced by the Kiln compiler. This crate ties
//! the allocation layer ([`kiln_rts_alloc`]) and the value types
//! ([`kiln_rts_core`]) into a [`Runtime`] with a lifecycle, and exports the
//! C ABI that generated code links against ([`ffi`]).
//!
//! # Memory reports
//!
//! Passing `--mem-report` on a program's command line turns on the
//! allocation ledger. On shutdown the runtime prints a one-line summary of
//! every allocation that was never freed.
//!
//! # Logging
//!
//! Runtime events go through `tracing`. The level is read from the
//! `KILN_LOG` environment variable and defaults to `warn`; output goes to
//! stderr so it never mixes with the program's own stdout.

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod ffi;

pub use config::{ConfigError, RuntimeConfig};
pub use kiln_rts_alloc::{Heap, HeapTracker, LeakReport};
pub use kiln_rts_core::{Array, GrowableVec, RtError, RtResult, Str};

use std::sync::{Arc, Once};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

static LOGGING: Once = Once::new();

/// Install the process-wide log subscriber. Only the first call has effect.
pub fn init_logging(level: Level) {
    LOGGING.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        // Embedders may already have installed their own subscriber.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// A running program's runtime state.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    tracker: Arc<HeapTracker>,
    heap: Heap,
}

impl Runtime {
    /// Start a runtime with the given configuration.
    pub fn start(config: RuntimeConfig) -> Self {
        init_logging(config.log_level);

        let tracker = Arc::new(HeapTracker::new());
        if config.mem_report {
            tracker.enable();
        }
        let heap = Heap::tracked(Arc::clone(&tracker));

        tracing::info!(
            mem_report = config.mem_report,
            args = config.args.len(),
            "runtime started"
        );
        Self {
            config,
            tracker,
            heap,
        }
    }

    /// Heap every runtime allocation should come from.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The configuration the runtime was started with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Program arguments, runtime flags removed.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.config.args
    }

    /// The allocation ledger behind [`Runtime::heap`].
    #[must_use]
    pub fn tracker(&self) -> &Arc<HeapTracker> {
        &self.tracker
    }

    /// Current leak summary, when `--mem-report` is on.
    #[must_use]
    pub fn leak_report(&self) -> Option<LeakReport> {
        self.tracker.report()
    }

    /// Stop the runtime, printing the leak summary to stdout when tracking.
    pub fn shutdown(self) -> Option<LeakReport> {
        let report = self.leak_report();
        if let Some(report) = report {
            println!("{report}");
            if !report.is_clean() {
                tracing::warn!(count = report.count, bytes = report.bytes, "memory leaked");
            }
        }
        tracing::info!("runtime stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_rts_alloc::Region;

    #[test]
    fn test_untracked_runtime_has_no_report() {
        let runtime = Runtime::start(RuntimeConfig::default());
        let _s = Str::from_bytes(runtime.heap(), b"hello").unwrap();
        assert_eq!(runtime.leak_report(), None);
        assert_eq!(runtime.shutdown(), None);
    }

    #[test]
    fn test_mem_report_counts_leaks() {
        let runtime = Runtime::start(RuntimeConfig::from_args(["prog", "--mem-report"]));
        assert_eq!(runtime.args(), ["prog"]);

        let leaked = Region::new_by_size(runtime.heap(), 16).unwrap();
        let (_ptr, size, _shape) = leaked.into_raw_parts();
        assert_eq!(size, 16);

        let report = runtime.shutdown().unwrap();
        assert_eq!(report, LeakReport { count: 1, bytes: 16 });
    }

    #[test]
    fn test_mem_report_clean_run() {
        let runtime = Runtime::start(RuntimeConfig::from_args(["--mem-report"]));
        {
            let heap = runtime.heap();
            let mut words = GrowableVec::new(heap);
            words.push(Str::from_bytes(heap, b"a").unwrap()).unwrap();
            let _listing = words.to_str(heap).unwrap();
        }
        assert!(runtime.shutdown().unwrap().is_clean());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(Level::DEBUG);
        init_logging(Level::TRACE);
    }
}
