//! Pipeline controller: Pull → Reconcile → Transform → Deliver.
//!
//! A `Pipeline` is either `Idle` or `Polling`. While polling, every batch the poller
//! receives runs through [`Pipeline::process_batch`]:
//!
//! 1. the reconciler drops stale and repeated records and advances the mark;
//! 2. the transformer reshapes what is left into columns, dropping records without a
//!    stock or timestamp;
//! 3. the sink gets the new rows, unless there are none.
//!
//! Failures stay inside the tick that produced them. A failed pull is retried on the next
//! tick by the poller. A malformed record is dropped alone; in strict mode its error is
//! also logged at `error` level and carried in the [`TickReport`]. A sink failure loses
//! that delivery: the rows are already behind the mark and re-sending them would double
//! count.

use chrono::NaiveDateTime;
use log::{debug, error, info};
use quote_common::{QuoteRecord, Result, StreamError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strum::Display;

use crate::columns::{Schema, to_columns};
use crate::config::StreamConfig;
use crate::poller::{Poller, PollerCounters};
use crate::reconciler::{Reconciler, Strictness};
use crate::sink::ColumnSink;
use crate::source::QuoteSource;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PipelineState {
    /// No poller is running.
    Idle,
    /// A poller is feeding batches through the stages.
    Polling,
}

/// Cumulative counters for one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Batches run through reconcile/transform/deliver.
    pub batches: u64,
    /// Rows the sink accepted.
    pub rows_delivered: u64,
    /// Records at or before the mark.
    pub stale_dropped: u64,
    /// Records without a readable stock or timestamp.
    pub malformed_dropped: u64,
    /// Record-level errors reported in strict mode.
    pub record_errors: u64,
    /// Deliveries the sink refused.
    pub sink_failures: u64,
    /// Polling counters across every start/stop cycle.
    pub poller: PollerCounters,
}

/// What happened to one batch.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Records pulled.
    pub received: usize,
    /// Records newer than the mark.
    pub accepted: usize,
    /// Records at or before the mark.
    pub stale: usize,
    /// Records dropped for a missing stock or an unreadable timestamp.
    pub malformed: usize,
    /// Rows the sink accepted.
    pub delivered: usize,
    /// Whether the sink refused this delivery.
    pub sink_failed: bool,
    /// The errors behind `malformed`, kept only in strict mode.
    pub errors: Vec<StreamError>,
}

/// The stateful part of a tick, shared with the poller thread.
struct Stages<K> {
    reconciler: Reconciler,
    sink: K,
    stats: PipelineStats,
}

impl<K: ColumnSink> Stages<K> {
    fn process(&mut self, records: Vec<QuoteRecord>) -> TickReport {
        let mut report = TickReport {
            received: records.len(),
            ..TickReport::default()
        };
        self.stats.batches += 1;

        let reconciled = self.reconciler.accept(records);
        report.accepted = reconciled.accepted.len();
        report.stale = reconciled.stale;

        let conversion = to_columns(&reconciled.accepted);
        report.malformed = reconciled.malformed.len() + conversion.rejected.len();

        self.stats.stale_dropped += report.stale as u64;
        self.stats.malformed_dropped += report.malformed as u64;

        if self.reconciler.strictness() == Strictness::Strict {
            for e in &conversion.rejected {
                error!("Rejected record: {}", e);
            }
            report.errors = reconciled.malformed;
            report.errors.extend(conversion.rejected);
            self.stats.record_errors += report.errors.len() as u64;
        }

        if conversion.batch.is_empty() {
            debug!("Nothing new in batch of {}", report.received);
            return report;
        }

        match self.sink.update(&conversion.batch) {
            Ok(()) => {
                report.delivered = conversion.batch.len();
                self.stats.rows_delivered += report.delivered as u64;
            }
            Err(e) => {
                report.sink_failed = true;
                self.stats.sink_failures += 1;
                error!(
                    "Sink rejected {} row(s), rows are not retried: {}",
                    conversion.batch.len(),
                    e
                );
            }
        }
        report
    }
}

/// Polls a source and feeds new rows to a sink.
pub struct Pipeline<S, K> {
    source: Arc<Mutex<S>>,
    stages: Arc<Mutex<Stages<K>>>,
    config: StreamConfig,
    poller: Option<Poller>,
    finished_polls: PollerCounters,
}

impl<S, K> Pipeline<S, K>
where
    S: QuoteSource + 'static,
    K: ColumnSink + 'static,
{
    /// Creates an idle pipeline and loads the quote schema into `sink`.
    pub fn new(source: S, mut sink: K, config: StreamConfig) -> Result<Self> {
        sink.load(&Schema::quotes())?;
        Ok(Self {
            source: Arc::new(Mutex::new(source)),
            stages: Arc::new(Mutex::new(Stages {
                reconciler: Reconciler::new(config.strictness),
                sink,
                stats: PipelineStats::default(),
            })),
            config,
            poller: None,
            finished_polls: PollerCounters::default(),
        })
    }

    /// Replaces the reconciler, e.g. to resume from a known mark. The pipeline must be idle.
    pub fn with_reconciler(self, reconciler: Reconciler) -> Result<Self> {
        self.stages.lock()?.reconciler = reconciler;
        Ok(self)
    }

    /// Settings the pipeline was built with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// `Polling` while a poller is running.
    pub fn state(&self) -> PipelineState {
        match self.poller {
            Some(_) => PipelineState::Polling,
            None => PipelineState::Idle,
        }
    }

    /// `Idle → Polling`. Fails with `AlreadyStreaming` when already polling.
    pub fn start_streaming(&mut self, interval: Duration) -> Result<()> {
        if self.poller.is_some() {
            return Err(StreamError::AlreadyStreaming);
        }
        if interval.is_zero() {
            return Err(StreamError::Format(String::from(
                "polling interval must be greater than zero",
            )));
        }

        let stages = Arc::clone(&self.stages);
        let poller = Poller::start(Arc::clone(&self.source), interval, move |batch| {
            match stages.lock() {
                Ok(mut stages) => {
                    stages.process(batch);
                }
                Err(e) => error!("Pipeline state unavailable: {}", e),
            }
        });
        self.poller = Some(poller);
        info!("Streaming started every {:?}", interval);
        Ok(())
    }

    /// `Polling → Idle`. No delivery happens after this returns. Safe to call when idle.
    pub fn stop_streaming(&mut self) {
        match self.poller.take() {
            Some(mut poller) => {
                poller.stop();
                self.finished_polls.absorb(poller.counters());
                info!("Streaming stopped");
            }
            None => debug!("Streaming already stopped"),
        }
    }

    /// Stops, forgets the mark, and starts again.
    pub fn restart_streaming(&mut self, interval: Duration) -> Result<()> {
        self.stop_streaming();
        self.stages.lock()?.reconciler.reset();
        self.start_streaming(interval)
    }

    /// Runs one batch through reconcile, transform and deliver on the calling thread.
    pub fn process_batch(&self, records: Vec<QuoteRecord>) -> Result<TickReport> {
        Ok(self.stages.lock()?.process(records))
    }

    /// The reconciler's current mark.
    pub fn last_accepted(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self.stages.lock()?.reconciler.last_accepted())
    }

    /// Cumulative counters, including every poller run so far.
    pub fn stats(&self) -> Result<PipelineStats> {
        let mut stats = self.stages.lock()?.stats;
        stats.poller = self.finished_polls;
        if let Some(poller) = &self.poller {
            stats.poller.absorb(poller.counters());
        }
        Ok(stats)
    }

    /// Gives read access to the sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&K) -> R) -> Result<R> {
        Ok(f(&self.stages.lock()?.sink))
    }
}

impl<S, K> Drop for Pipeline<S, K> {
    fn drop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
    }
}
