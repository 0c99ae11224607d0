use std::fmt;

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::record::{RecordMap, StructuredRecord};

/// Kind of symbol a fact describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// The memory record itself.
    Memory,
    /// A gist summary.
    Gist,
    /// A named entity from the relational context.
    Entity,
    /// Relationship endpoint not listed as an entity.
    Unknown,
    /// Action feedback attached to a memory.
    Feedback,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Gist => "gist",
            Self::Entity => "entity",
            Self::Unknown => "unknown",
            Self::Feedback => "feedback",
        };
        f.write_str(name)
    }
}

/// A single fact handed to a symbolic knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum SymbolFact {
    /// A named symbol and its properties.
    Symbol {
        /// Symbol name.
        name: String,
        /// Symbol kind.
        kind: SymbolKind,
        /// Properties to set or merge.
        properties: RecordMap,
    },
    /// A directed, typed relation between two symbols.
    Relation {
        /// Source symbol name.
        source: String,
        /// Target symbol name.
        target: String,
        /// Relation type (`contains_gist`, a relationship verb, ...).
        relation: String,
        /// Relation properties.
        properties: RecordMap,
    },
}

/// Relation linking a memory to its gist.
pub const CONTAINS_GIST: &str = "contains_gist";
/// Relation linking a memory to its feedback symbol.
pub const HAS_FEEDBACK: &str = "has_feedback";

/// Name of the feedback symbol for a memory.
#[must_use]
pub fn feedback_symbol_name(source_id: &str) -> String {
    format!("feedback_{source_id}")
}

/// Flattens a record into symbols and relations.
///
/// Emits the memory symbol, the gist with a `contains_gist` link, one entity
/// symbol per listed entity, one relation per relationship triple (endpoints
/// not listed as entities become `unknown` symbols), and a feedback symbol
/// with a `has_feedback` link when feedback is present.
#[must_use]
pub fn extract_facts(record: &StructuredRecord) -> Vec<SymbolFact> {
    let map = record.to_map();
    let memory = record.source_id.clone();
    let mut facts = Vec::new();

    let mut memory_props = RecordMap::new();
    memory_props.insert("timestamp".into(), json!(record.timestamp()));
    memory_props.insert(
        "modalities".into(),
        map.get("modalities").cloned().unwrap_or(Value::Null),
    );
    facts.push(SymbolFact::Symbol {
        name: memory.clone(),
        kind: SymbolKind::Memory,
        properties: memory_props,
    });

    let gist = &record.gist;
    let mut gist_props = RecordMap::new();
    gist_props.insert("keywords".into(), json!(gist.keywords));
    gist_props.insert("original_length".into(), json!(gist.original_length));
    facts.push(SymbolFact::Symbol {
        name: gist.summary.clone(),
        kind: SymbolKind::Gist,
        properties: gist_props,
    });
    facts.push(relation(&memory, &gist.summary, CONTAINS_GIST, RecordMap::new()));

    let context = &record.relational_context;
    let entities: IndexSet<&str> = context.entities.iter().map(String::as_str).collect();
    for entity in &entities {
        facts.push(SymbolFact::Symbol {
            name: (*entity).to_string(),
            kind: SymbolKind::Entity,
            properties: RecordMap::new(),
        });
    }
    let mut unknown: IndexSet<&str> = IndexSet::new();
    for rel in &context.relationships {
        for endpoint in [rel.subject.as_str(), rel.object.as_str()] {
            if !entities.contains(endpoint) && unknown.insert(endpoint) {
                facts.push(SymbolFact::Symbol {
                    name: endpoint.to_string(),
                    kind: SymbolKind::Unknown,
                    properties: RecordMap::new(),
                });
            }
        }
        facts.push(relation(&rel.subject, &rel.object, &rel.verb, rel.to_map()));
    }

    if let Some(feedback) = &record.action_feedback {
        let name = feedback_symbol_name(&memory);
        facts.push(SymbolFact::Symbol {
            name: name.clone(),
            kind: SymbolKind::Feedback,
            properties: feedback.clone(),
        });
        facts.push(relation(&memory, &name, HAS_FEEDBACK, RecordMap::new()));
    }
    facts
}

fn relation(source: &str, target: &str, relation: &str, properties: RecordMap) -> SymbolFact {
    SymbolFact::Relation {
        source: source.to_string(),
        target: target.to_string(),
        relation: relation.to_string(),
        properties,
    }
}

/// Seam toward an external symbolic knowledge store.
pub trait SymbolicIndexer: Send + Sync {
    /// Records a batch of facts extracted from one record.
    fn index(&self, facts: &[SymbolFact]) -> Result<()>;
}

/// Symbol held by [`InMemorySymbolIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSymbol {
    /// Kind from the first time the name was seen.
    pub kind: SymbolKind,
    /// Merged properties; later facts overwrite same-named keys.
    pub properties: RecordMap,
}

/// Relation held by [`InMemorySymbolIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRelation {
    /// Source symbol name.
    pub source: String,
    /// Target symbol name.
    pub target: String,
    /// Relation type.
    pub relation: String,
    /// Relation properties.
    pub properties: RecordMap,
}

/// Process-local symbol store for development and tests.
#[derive(Debug, Default)]
pub struct InMemorySymbolIndex {
    symbols: RwLock<IndexMap<String, IndexedSymbol>>,
    relations: RwLock<Vec<IndexedRelation>>,
}

impl InMemorySymbolIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a symbol by name.
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<IndexedSymbol> {
        self.symbols.read().get(name).cloned()
    }

    /// Relations whose source is `name`.
    #[must_use]
    pub fn relations_from(&self, name: &str) -> Vec<IndexedRelation> {
        self.relations
            .read()
            .iter()
            .filter(|rel| rel.source == name)
            .cloned()
            .collect()
    }

    /// Number of distinct symbols.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.read().len()
    }

    /// Number of distinct relations.
    #[must_use]
    pub fn relation_count(&self) -> usize {
        self.relations.read().len()
    }
}

impl SymbolicIndexer for InMemorySymbolIndex {
    fn index(&self, facts: &[SymbolFact]) -> Result<()> {
        let mut symbols = self.symbols.write();
        let mut relations = self.relations.write();
        for fact in facts {
            match fact {
                SymbolFact::Symbol {
                    name,
                    kind,
                    properties,
                } => {
                    symbols
                        .entry(name.clone())
                        .and_modify(|existing| {
                            existing
                                .properties
                                .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
                        })
                        .or_insert_with(|| IndexedSymbol {
                            kind: *kind,
                            properties: properties.clone(),
                        });
                }
                SymbolFact::Relation {
                    source,
                    target,
                    relation,
                    properties,
                } => {
                    let duplicate = relations.iter().any(|rel| {
                        &rel.source == source && &rel.target == target && &rel.relation == relation
                    });
                    if !duplicate {
                        relations.push(IndexedRelation {
                            source: source.clone(),
                            target: target.clone(),
                            relation: relation.clone(),
                            properties: properties.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
