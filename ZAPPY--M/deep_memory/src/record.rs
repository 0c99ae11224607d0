use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::DeepMemoryError;

/// Plain map form of a record, as produced by the codec.
pub type RecordMap = Map<String, Value>;

/// Short lossy summary of a longer source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gist {
    /// Summary text.
    pub summary: String,
    /// Ordered keywords.
    pub keywords: Vec<String>,
    /// Length of the text the gist was abstracted from.
    pub original_length: u64,
}

impl Gist {
    /// Creates a gist.
    #[must_use]
    pub fn new(
        summary: impl Into<String>,
        keywords: impl IntoIterator<Item = impl Into<String>>,
        original_length: u64,
    ) -> Self {
        Self {
            summary: summary.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
            original_length,
        }
    }

    fn to_value(&self) -> Value {
        json!({
            "summary": self.summary,
            "keywords": self.keywords,
            "original_length": self.original_length,
        })
    }
}

/// Subject-verb-object triple plus free-form attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Subject entity.
    pub subject: String,
    /// Relation name.
    pub verb: String,
    /// Object entity.
    pub object: String,
    /// Extra attributes, flattened next to the triple.
    #[serde(flatten)]
    pub extra: RecordMap,
}

impl Relationship {
    /// Creates a bare triple.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        verb: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            verb: verb.into(),
            object: object.into(),
            extra: RecordMap::new(),
        }
    }

    /// Adds an extra attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Map form; the triple keys win over same-named extras.
    #[must_use]
    pub fn to_map(&self) -> RecordMap {
        let mut map = self.extra.clone();
        map.insert("subject".into(), Value::String(self.subject.clone()));
        map.insert("verb".into(), Value::String(self.verb.clone()));
        map.insert("object".into(), Value::String(self.object.clone()));
        map
    }
}

/// Entities and relationship triples extracted from a gist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalContext {
    /// Entity names in extraction order.
    pub entities: Vec<String>,
    /// Relationship triples.
    pub relationships: Vec<Relationship>,
}

impl RelationalContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        entities: impl IntoIterator<Item = impl Into<String>>,
        relationships: Vec<Relationship>,
    ) -> Self {
        Self {
            entities: entities.into_iter().map(Into::into).collect(),
            relationships,
        }
    }

    fn to_value(&self) -> Value {
        let relationships = self
            .relationships
            .iter()
            .map(|rel| Value::Object(rel.to_map()))
            .collect();
        json!({
            "entities": self.entities,
            "relationships": Value::Array(relationships),
        })
    }
}

/// Per-modality confidences and features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modalities {
    /// Confidence of the text channel, in `[0, 1]`.
    pub text_confidence: f64,
    /// Optional audio features (pitch, volume, ...).
    #[serde(default)]
    pub audio_features: Option<RecordMap>,
    /// Optional image features.
    #[serde(default)]
    pub image_features: Option<RecordMap>,
}

impl Modalities {
    /// Text-only modalities.
    #[must_use]
    pub const fn text(text_confidence: f64) -> Self {
        Self {
            text_confidence,
            audio_features: None,
            image_features: None,
        }
    }

    /// Attaches audio features.
    #[must_use]
    pub fn with_audio_features(mut self, features: RecordMap) -> Self {
        self.audio_features = Some(features);
        self
    }

    /// Attaches image features.
    #[must_use]
    pub fn with_image_features(mut self, features: RecordMap) -> Self {
        self.image_features = Some(features);
        self
    }

    fn to_value(&self) -> Value {
        json!({
            "text_confidence": self.text_confidence,
            "audio_features": optional_map(self.audio_features.as_ref()),
            "image_features": optional_map(self.image_features.as_ref()),
        })
    }
}

/// The deep parameter: one memory record with gist, relations and modalities.
///
/// Serializes to the stable map shape read by external indexers; absent
/// optional fields are written as explicit `null`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StructuredRecord {
    /// Identifier of the originating memory.
    pub source_id: String,
    timestamp: String,
    /// Summary of the source text.
    pub gist: Gist,
    /// Extracted entities and relations.
    pub relational_context: RelationalContext,
    /// Modality confidences.
    pub modalities: Modalities,
    /// Feedback attached after the fact.
    #[serde(default)]
    pub action_feedback: Option<RecordMap>,
    /// Lineage chain this record belongs to.
    #[serde(default)]
    pub chain_id: Option<String>,
}

impl StructuredRecord {
    /// Creates a record stamped with the current UTC time.
    pub fn new(
        source_id: impl Into<String>,
        gist: Gist,
        relational_context: RelationalContext,
        modalities: Modalities,
    ) -> Result<Self, DeepMemoryError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        Self::with_timestamp(source_id, timestamp, gist, relational_context, modalities)
    }

    /// Creates a record with an explicit ISO-8601 timestamp.
    pub fn with_timestamp(
        source_id: impl Into<String>,
        timestamp: impl Into<String>,
        gist: Gist,
        relational_context: RelationalContext,
        modalities: Modalities,
    ) -> Result<Self, DeepMemoryError> {
        let record = Self {
            source_id: source_id.into(),
            timestamp: timestamp.into(),
            gist,
            relational_context,
            modalities,
            action_feedback: None,
            chain_id: None,
        };
        record.validate()?;
        Ok(record)
    }

    /// Attaches action feedback.
    #[must_use]
    pub fn with_action_feedback(mut self, feedback: RecordMap) -> Self {
        self.action_feedback = Some(feedback);
        self
    }

    /// Links the record into a lineage chain.
    #[must_use]
    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    /// Creation time as given at construction.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Creation time parsed as UTC, when it carries enough information.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Converts the record into its plain map form.
    #[must_use]
    pub fn to_map(&self) -> RecordMap {
        let mut map = RecordMap::new();
        map.insert("source_id".into(), Value::String(self.source_id.clone()));
        map.insert("timestamp".into(), Value::String(self.timestamp.clone()));
        map.insert("gist".into(), self.gist.to_value());
        map.insert(
            "relational_context".into(),
            self.relational_context.to_value(),
        );
        map.insert("modalities".into(), self.modalities.to_value());
        map.insert(
            "action_feedback".into(),
            optional_map(self.action_feedback.as_ref()),
        );
        map.insert(
            "chain_id".into(),
            self.chain_id.clone().map_or(Value::Null, Value::String),
        );
        map
    }

    /// Rebuilds a record from its map form, re-checking field invariants.
    pub fn from_map(map: &RecordMap) -> Result<Self, DeepMemoryError> {
        let record: Self = serde_json::from_value(Value::Object(map.clone()))
            .map_err(|err| DeepMemoryError::InvalidRecord(err.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Checks field invariants; public fields may have changed since construction.
    pub fn validate(&self) -> Result<(), DeepMemoryError> {
        if self.source_id.trim().is_empty() {
            return Err(DeepMemoryError::InvalidRecord(
                "source_id must not be empty".into(),
            ));
        }
        if parse_timestamp(&self.timestamp).is_none() {
            return Err(DeepMemoryError::InvalidRecord(format!(
                "timestamp is not ISO-8601: {}",
                self.timestamp
            )));
        }
        let confidence = self.modalities.text_confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(DeepMemoryError::InvalidRecord(format!(
                "text_confidence out of [0, 1]: {confidence}"
            )));
        }
        Ok(())
    }
}

impl Serialize for StructuredRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

/// Input accepted by the codec: a typed record or an already-plain map.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordInput {
    /// Typed record, converted with [`StructuredRecord::to_map`].
    Record(StructuredRecord),
    /// Map passed through as-is.
    PlainMap(RecordMap),
}

impl RecordInput {
    /// Resolves the input to its map form, re-validating typed records.
    pub fn into_map(self) -> Result<RecordMap, DeepMemoryError> {
        match self {
            Self::Record(record) => {
                record.validate()?;
                Ok(record.to_map())
            }
            Self::PlainMap(map) => Ok(map),
        }
    }
}

impl From<StructuredRecord> for RecordInput {
    fn from(record: StructuredRecord) -> Self {
        Self::Record(record)
    }
}

impl From<&StructuredRecord> for RecordInput {
    fn from(record: &StructuredRecord) -> Self {
        Self::Record(record.clone())
    }
}

impl From<RecordMap> for RecordInput {
    fn from(map: RecordMap) -> Self {
        Self::PlainMap(map)
    }
}

impl TryFrom<Value> for RecordInput {
    type Error = DeepMemoryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self::PlainMap(map)),
            other => Err(DeepMemoryError::InvalidInputType(
                value_kind(&other).to_string(),
            )),
        }
    }
}

const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

fn optional_map(map: Option<&RecordMap>) -> Value {
    map.map_or(Value::Null, |m| Value::Object(m.clone()))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_record() -> StructuredRecord {
        let mut audio = RecordMap::new();
        audio.insert("pitch".into(), json!(120));
        audio.insert("volume".into(), json!(0.8));
        let mut feedback = RecordMap::new();
        feedback.insert("accuracy".into(), json!(0.9));
        StructuredRecord::with_timestamp(
            "mem_000123",
            "2025-08-31T10:00:00Z",
            Gist::new(
                "User asked about weather",
                ["weather", "forecast"],
                150,
            ),
            RelationalContext::new(
                ["User", "Weather"],
                vec![Relationship::new("User", "asked_about", "Weather")
                    .with_attribute("certainty", json!(0.7))],
            ),
            Modalities::text(0.95).with_audio_features(audio),
        )
        .unwrap()
        .with_action_feedback(feedback)
        .with_chain_id("chain_001")
    }

    #[test]
    fn map_shape_is_stable() {
        let map = weather_record().to_map();
        assert_eq!(map["source_id"], json!("mem_000123"));
        assert_eq!(map["gist"]["original_length"], json!(150));
        assert_eq!(
            map["relational_context"]["relationships"][0],
            json!({ "subject": "User", "verb": "asked_about", "object": "Weather", "certainty": 0.7 })
        );
        assert_eq!(map["modalities"]["image_features"], Value::Null);
        assert_eq!(map["chain_id"], json!("chain_001"));
    }

    #[test]
    fn to_map_is_pure() {
        let record = weather_record();
        assert_eq!(record.to_map(), record.to_map());
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            Value::Object(record.to_map())
        );
    }

    #[test]
    fn from_map_restores_record() {
        let record = weather_record();
        let restored = StructuredRecord::from_map(&record.to_map()).unwrap();
        assert_eq!(restored, record);
        assert_eq!(restored.timestamp(), "2025-08-31T10:00:00Z");
    }

    #[test]
    fn rejects_bad_fields() {
        let gist = Gist::new("x", ["a"], 1);
        let err = StructuredRecord::with_timestamp(
            "mem",
            "yesterday",
            gist.clone(),
            RelationalContext::default(),
            Modalities::text(0.5),
        )
        .unwrap_err();
        assert!(matches!(err, DeepMemoryError::InvalidRecord(_)));
        let err = StructuredRecord::with_timestamp(
            "mem",
            "2025-01-01T00:00:00",
            gist,
            RelationalContext::default(),
            Modalities::text(1.5),
        )
        .unwrap_err();
        assert!(err.to_string().contains("text_confidence"));
    }

    #[test]
    fn edited_record_is_revalidated_before_encoding() {
        let mut record = weather_record();
        record.modalities.text_confidence = 1.5;
        let err = RecordInput::from(&record).into_map().unwrap_err();
        assert!(err.to_string().contains("text_confidence"));
        record.modalities.text_confidence = f64::NAN;
        assert!(RecordInput::from(&record).into_map().is_err());
        record.modalities.text_confidence = 0.4;
        record.source_id = "  ".into();
        assert!(matches!(
            RecordInput::from(record).into_map(),
            Err(DeepMemoryError::InvalidRecord(_))
        ));
    }

    #[test]
    fn non_map_values_are_invalid_input() {
        let err = RecordInput::try_from(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, DeepMemoryError::InvalidInputType(ref kind) if kind == "array"));
        let input = RecordInput::try_from(json!({ "source_id": "m" })).unwrap();
        assert!(matches!(input, RecordInput::PlainMap(_)));
    }
}
