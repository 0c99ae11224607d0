//! Deep memory engine: codec, compression strategies, statistics and lineage.

use std::{fmt, path::Path, sync::Arc};

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    codec,
    config::EngineConfig,
    error::DeepMemoryError,
    lineage::{LineageChain, LineageError, LineageRegistry},
    record::{RecordInput, RecordMap, StructuredRecord},
    stats::{CompressionStats, CompressionStatsTracker},
    strategy::CompressionStrategy,
    symbols::{extract_facts, SymbolicIndexer},
    telemetry::DeepMemoryTelemetry,
};

/// Outcome of [`DeepMemoryEngine::ingest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Record that was ingested.
    pub source_id: String,
    /// Chain the record was appended to, if any.
    pub chain_id: Option<String>,
    /// False when the record was already a node of its chain.
    pub node_added: bool,
    /// Facts handed to the symbolic indexer (0 without an indexer).
    pub facts_indexed: usize,
}

/// Owns the statistics tracker and lineage registry for one process or test.
pub struct DeepMemoryEngine {
    config: EngineConfig,
    stats: CompressionStatsTracker,
    lineage: LineageRegistry,
    telemetry: Option<DeepMemoryTelemetry>,
    indexer: Option<Arc<dyn SymbolicIndexer>>,
}

impl fmt::Debug for DeepMemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepMemoryEngine")
            .field("config", &self.config)
            .field("chains", &self.lineage.len())
            .field("telemetry", &self.telemetry)
            .field("indexer", &self.indexer.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for DeepMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeepMemoryEngine {
    /// Creates an engine with default configuration and no telemetry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine from explicit configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            stats: CompressionStatsTracker::new(),
            lineage: LineageRegistry::new(),
            telemetry: None,
            indexer: None,
        }
    }

    /// Loads configuration from TOML and wires telemetry when a log path is set.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = EngineConfig::load(path)?;
        let telemetry = if config.telemetry.log_path.is_some() {
            Some(
                DeepMemoryTelemetry::builder("deep_memory")
                    .settings(&config.telemetry)
                    .build()?,
            )
        } else {
            None
        };
        let mut engine = Self::with_config(config);
        engine.telemetry = telemetry;
        Ok(engine)
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: DeepMemoryTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Sets telemetry after construction.
    pub fn set_telemetry(&mut self, telemetry: DeepMemoryTelemetry) {
        self.telemetry = Some(telemetry);
    }

    /// Returns telemetry handle if configured.
    #[must_use]
    pub fn telemetry(&self) -> Option<&DeepMemoryTelemetry> {
        self.telemetry.as_ref()
    }

    /// Attaches the symbolic store fed by [`Self::ingest`].
    #[must_use]
    pub fn with_indexer(mut self, indexer: Arc<dyn SymbolicIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Encodes then compresses a record or map with `strategy`.
    ///
    /// The output carries no strategy marker; pass the same strategy to
    /// [`Self::decompress_record`].
    pub fn compress_record(
        &self,
        input: impl Into<RecordInput>,
        strategy: CompressionStrategy,
    ) -> Result<Vec<u8>, DeepMemoryError> {
        self.pack(input.into(), strategy, false)
    }

    /// Like [`Self::compress_record`], with the strategy given by name.
    pub fn compress_record_named(
        &self,
        input: impl Into<RecordInput>,
        strategy: &str,
    ) -> Result<Vec<u8>, DeepMemoryError> {
        let strategy: CompressionStrategy = strategy.parse()?;
        self.compress_record(input, strategy)
    }

    /// Decompresses then decodes bytes produced with `strategy`.
    pub fn decompress_record(
        &self,
        bytes: &[u8],
        strategy: CompressionStrategy,
    ) -> Result<RecordMap, DeepMemoryError> {
        self.unpack(bytes, strategy)
    }

    /// Compresses and prefixes the output with the strategy tag byte.
    pub fn compress_tagged(
        &self,
        input: impl Into<RecordInput>,
        strategy: CompressionStrategy,
    ) -> Result<Vec<u8>, DeepMemoryError> {
        self.pack(input.into(), strategy, true)
    }

    /// Reads the tag byte, then decompresses with the strategy it names.
    pub fn decompress_tagged(&self, bytes: &[u8]) -> Result<RecordMap, DeepMemoryError> {
        let (&tag, payload) = bytes.split_first().ok_or_else(|| {
            DeepMemoryError::integrity("tagged frame", "empty payload has no strategy tag")
        })?;
        let strategy =
            CompressionStrategy::from_tag(tag).ok_or(DeepMemoryError::UnknownStrategyTag(tag))?;
        self.unpack(payload, strategy)
    }

    /// Compresses with the configured default strategy and framing.
    pub fn compress(&self, input: impl Into<RecordInput>) -> Result<Vec<u8>, DeepMemoryError> {
        self.pack(
            input.into(),
            self.config.default_strategy,
            self.config.tagged_output,
        )
    }

    /// Reverses [`Self::compress`] under the same configuration.
    pub fn decompress(&self, bytes: &[u8]) -> Result<RecordMap, DeepMemoryError> {
        if self.config.tagged_output {
            self.decompress_tagged(bytes)
        } else {
            self.unpack(bytes, self.config.default_strategy)
        }
    }

    /// Snapshot of per-strategy counters.
    #[must_use]
    pub fn get_stats(&self) -> IndexMap<CompressionStrategy, CompressionStats> {
        self.stats.snapshot()
    }

    /// Counters for one strategy.
    #[must_use]
    pub fn stats_for(&self, strategy: CompressionStrategy) -> Option<CompressionStats> {
        self.stats.get(strategy)
    }

    /// Lineage registry owned by this engine.
    #[must_use]
    pub fn lineage(&self) -> &LineageRegistry {
        &self.lineage
    }

    /// Returns the chain, creating it on first reference.
    pub fn create_chain(&self, chain_id: &str) -> LineageChain {
        self.lineage.create_chain(chain_id)
    }

    /// Branches `chain_id` at `from_node` into a new chain `branch_id`.
    pub fn branch(
        &self,
        chain_id: &str,
        branch_id: &str,
        from_node: &str,
    ) -> Result<LineageChain, LineageError> {
        let branch = self.lineage.branch(chain_id, branch_id, from_node)?;
        self.emit(
            "lineage.branch",
            json!({ "chain_id": chain_id, "branch_id": branch_id, "from_node": from_node }),
        );
        Ok(branch)
    }

    /// Merges `other_id` into `chain_id` at `at_node`; false leaves both untouched.
    pub fn merge(&self, chain_id: &str, other_id: &str, at_node: &str) -> bool {
        let merged = self.lineage.merge(chain_id, other_id, at_node);
        self.emit(
            "lineage.merge",
            json!({ "chain_id": chain_id, "other_id": other_id, "at_node": at_node, "merged": merged }),
        );
        merged
    }

    /// Registers a record: appends it to its lineage chain and indexes its facts.
    pub fn ingest(&self, record: &StructuredRecord) -> Result<IngestReport> {
        let node_added = record
            .chain_id
            .as_deref()
            .is_some_and(|chain_id| self.lineage.add_node(chain_id, &record.source_id));
        let facts_indexed = match &self.indexer {
            Some(indexer) => {
                let facts = extract_facts(record);
                indexer.index(&facts)?;
                facts.len()
            }
            None => 0,
        };
        let report = IngestReport {
            source_id: record.source_id.clone(),
            chain_id: record.chain_id.clone(),
            node_added,
            facts_indexed,
        };
        self.emit("deep_memory.ingest", json!(report));
        Ok(report)
    }

    fn pack(
        &self,
        input: RecordInput,
        strategy: CompressionStrategy,
        tagged: bool,
    ) -> Result<Vec<u8>, DeepMemoryError> {
        let encoded = codec::encode(input)?;
        let compressed = strategy.compress(&encoded, &self.config.levels)?;
        let stats = self
            .stats
            .record(strategy, encoded.len(), compressed.len());
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Debug,
                "deep_memory.compress",
                json!({
                    "strategy": strategy,
                    "tagged": tagged,
                    "original_size": encoded.len(),
                    "compressed_size": compressed.len(),
                    "ratio": stats.last_ratio,
                }),
            );
        }
        if !tagged {
            return Ok(compressed);
        }
        let mut framed = Vec::with_capacity(compressed.len() + 1);
        framed.push(strategy.tag());
        framed.extend_from_slice(&compressed);
        Ok(framed)
    }

    fn unpack(
        &self,
        bytes: &[u8],
        strategy: CompressionStrategy,
    ) -> Result<RecordMap, DeepMemoryError> {
        let decoded = strategy
            .decompress(bytes)
            .and_then(|raw| codec::decode(&raw));
        if let Some(tel) = &self.telemetry {
            let _ = match &decoded {
                Ok(map) => tel.log(
                    LogLevel::Debug,
                    "deep_memory.decompress",
                    json!({ "strategy": strategy, "compressed_size": bytes.len(), "fields": map.len() }),
                ),
                Err(err) => tel.log(
                    LogLevel::Warn,
                    "deep_memory.decompress.failed",
                    json!({ "strategy": strategy, "error": err.to_string() }),
                ),
            };
        }
        decoded
    }

    fn emit(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.event(event_type, payload);
        }
    }
}
