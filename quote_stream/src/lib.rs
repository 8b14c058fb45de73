//! Streaming ingestion of bid/ask quotes into a columnar chart table.
//!
//! The pipeline polls a quote source on a fixed cadence, drops quotes that are not newer
//! than the last one it accepted, reshapes the survivors into columns and appends them to
//! a sink table:
//!
//! ```text
//! QuoteSource ──pull──▶ Poller ──batch──▶ Reconciler ──▶ to_columns ──▶ ColumnSink
//! ```
//!
//! - [`source`] — `QuoteSource` trait, TCP feed adapter and a scripted source.
//! - [`poller`] — fixed-cadence, single-flight polling loop.
//! - [`reconciler`] — high-water-mark deduplication.
//! - [`columns`] — column batches, schema and the record-to-column transformer.
//! - [`sink`] — `ColumnSink` trait and the in-memory chart table.
//! - [`pipeline`] — start/stop controller that wires the stages together.
//! - [`config`] — pipeline settings.
pub mod columns;
pub mod config;
pub mod pipeline;
pub mod poller;
pub mod reconciler;
pub mod sink;
pub mod source;

pub use columns::{ColumnBatch, Schema, to_columns};
pub use config::StreamConfig;
pub use pipeline::{Pipeline, PipelineState, PipelineStats};
pub use reconciler::{Reconciler, Strictness};
pub use sink::{ColumnSink, MemoryTable};
pub use source::{QuoteSource, ScriptedSource, TcpFeedSource};
