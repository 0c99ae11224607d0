#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Tier-9 deep-parameter memory: MessagePack encoding, pluggable compression,
//! per-strategy statistics, and lineage chains.

/// MessagePack codec for record maps.
pub mod codec;
/// Error taxonomy.
pub mod error;
/// Lineage chain registry.
pub mod lineage;
/// Structured record model.
pub mod record;
/// Compression statistics.
pub mod stats;
/// Compression strategies.
pub mod strategy;

/// Symbolic fact extraction and indexer seam.
#[path = "../symbols.rs"]
pub mod symbols;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers.
#[path = "../telemetry.rs"]
pub mod telemetry;

#[path = "../main.rs"]
pub mod orchestration_entry;

pub use config::{EngineConfig, TelemetrySettings};
pub use error::DeepMemoryError;
pub use lineage::{LineageChain, LineageError, LineageRegistry};
pub use orchestration_entry::{DeepMemoryEngine, IngestReport};
pub use record::{
    Gist, Modalities, RecordInput, RecordMap, RelationalContext, Relationship, StructuredRecord,
};
pub use stats::{CompressionStats, CompressionStatsTracker};
pub use strategy::{CompressionLevels, CompressionStrategy};
pub use symbols::{extract_facts, InMemorySymbolIndex, SymbolFact, SymbolKind, SymbolicIndexer};
pub use telemetry::{DeepMemoryTelemetry, DeepMemoryTelemetryBuilder};
