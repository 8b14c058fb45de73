//! Fixed-cadence polling of a `QuoteSource`.
//!
//! The poller runs two background threads:
//!
//! - the tick loop, which owns the timer (`crossbeam_channel::tick`) and is the only
//!   thread that ever calls `on_batch`;
//! - a pull worker, which locks the source and performs one pull per request.
//!
//! At most one pull is in flight. A tick that fires while a pull is outstanding is
//! dropped and counted, never queued. Batches reach `on_batch` in the order their ticks
//! fired because there is only ever one outstanding request.
//!
//! `stop()` disconnects the stop channel and joins the tick loop. The loop re-checks the
//! stop channel before every delivery, and once it has exited the pull worker's result
//! has nowhere to go, so a pull that was still running when `stop()` returned is
//! discarded. The worker does not get joined: a slow pull must not block `stop()`. It
//! keeps the source locked until that pull finishes, so a later poller on the same source
//! waits for it instead of overlapping it.

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select, tick};
use log::{debug, error, info, warn};
use quote_common::{QuoteRecord, Result, StreamError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::source::QuoteSource;

/// Live counters updated by the tick loop.
#[derive(Debug, Default)]
struct PollerStats {
    ticks: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    delivered: AtomicU64,
}

/// Snapshot of a poller's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerCounters {
    /// Timer ticks observed.
    pub ticks: u64,
    /// Ticks dropped because a pull was still in flight.
    pub skipped: u64,
    /// Pulls that returned an error.
    pub failed: u64,
    /// Batches handed to `on_batch`.
    pub delivered: u64,
}

impl PollerCounters {
    /// Adds `other` to `self`.
    pub fn absorb(&mut self, other: PollerCounters) {
        self.ticks += other.ticks;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.delivered += other.delivered;
    }
}

impl PollerStats {
    fn snapshot(&self) -> PollerCounters {
        PollerCounters {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running polling loop.
pub struct Poller {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<PollerStats>,
}

impl Poller {
    /// Starts polling `source` every `interval`, passing each pulled batch to `on_batch`.
    ///
    /// The first pull happens one `interval` after the call.
    pub fn start<S, F>(source: Arc<Mutex<S>>, interval: Duration, on_batch: F) -> Self
    where
        S: QuoteSource + 'static,
        F: FnMut(Vec<QuoteRecord>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let stats = Arc::new(PollerStats::default());
        let loop_stats = Arc::clone(&stats);

        let handle = thread::spawn(move || {
            run_tick_loop(source, interval, stop_rx, on_batch, loop_stats);
        });
        info!("Poller started, interval {:?}", interval);

        Poller {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            stats,
        }
    }

    /// Stops the timer. No `on_batch` call happens after this returns. Safe to call twice.
    pub fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };
        drop(stop_tx);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Poller thread panicked");
            }
        }
        info!("Poller stopped");
    }

    /// `true` until `stop()` is called.
    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Current counters of this run.
    pub fn counters(&self) -> PollerCounters {
        self.stats.snapshot()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

fn run_tick_loop<S, F>(
    source: Arc<Mutex<S>>,
    interval: Duration,
    stop_rx: Receiver<()>,
    mut on_batch: F,
    stats: Arc<PollerStats>,
) where
    S: QuoteSource + 'static,
    F: FnMut(Vec<QuoteRecord>),
{
    let (request_tx, request_rx) = bounded::<()>(1);
    let (result_tx, result_rx) = bounded::<Result<Vec<QuoteRecord>>>(1);
    spawn_pull_worker(source, request_rx, result_tx);

    let ticker = tick(interval);
    let mut in_flight = false;

    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                stats.ticks.fetch_add(1, Ordering::Relaxed);
                if in_flight {
                    stats.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!("Tick skipped: previous pull still in flight");
                } else if request_tx.send(()).is_err() {
                    error!("Pull worker exited unexpectedly");
                    break;
                } else {
                    in_flight = true;
                }
            },
            recv(result_rx) -> msg => {
                in_flight = false;
                match msg {
                    Ok(Ok(batch)) => {
                        if stop_requested(&stop_rx) {
                            break;
                        }
                        stats.delivered.fetch_add(1, Ordering::Relaxed);
                        on_batch(batch);
                    }
                    Ok(Err(e)) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Pull failed, retrying on next tick: {}", e);
                    }
                    Err(_) => {
                        error!("Pull worker disconnected");
                        break;
                    }
                }
            },
        }
    }
    debug!("Tick loop stopping...");
}

fn spawn_pull_worker<S>(
    source: Arc<Mutex<S>>,
    request_rx: Receiver<()>,
    result_tx: Sender<Result<Vec<QuoteRecord>>>,
) where
    S: QuoteSource + 'static,
{
    thread::spawn(move || {
        for _ in request_rx.iter() {
            let result = match source.lock() {
                Ok(mut source) => source.pull(),
                Err(e) => Err(StreamError::from(e)),
            };
            if result_tx.send(result).is_err() {
                break;
            }
        }
        debug!("Pull worker stopping...");
    });
}
