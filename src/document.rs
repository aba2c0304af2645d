//! Documents stored in output collections.
//!
//! A collection holds one metadata record under the sentinel id and any
//! number of data rows under ids `1..=n`. [`StoredDocument`] makes that
//! convention explicit and is validated every time a document is read.

use crate::error::{Error, Result};
use crate::variant::Variant;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const SENTINEL_ID: u64 = 0;
pub const FINISHED_FIELD: &str = "finished";
pub const ERROR_FIELD: &str = "error";

/// Bookkeeping fields that describe a collection rather than its data.
pub const METADATA_FIELDS: [&str; 8] = [
    "_id",
    "fields",
    "datasetName",
    "finished",
    "timeCreated",
    "url",
    "parentDatasetName",
    "type",
];

const TIME_CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S-00:00";

/// Filter selecting the sentinel record of a collection.
pub fn sentinel_filter() -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_string(), Value::from(SENTINEL_ID));
    filter
}

/// Reads `_id` as a non-negative integer.
pub fn document_id(doc: &Document) -> Result<u64> {
    let value = doc
        .get(ID_FIELD)
        .ok_or_else(|| Error::InvalidDocument("missing _id".into()))?;
    if let Some(id) = value.as_u64() {
        return Ok(id);
    }
    match value.as_f64() {
        Some(id) if id >= 0.0 && id.fract() == 0.0 => Ok(id as u64),
        _ => Err(Error::InvalidDocument(format!("_id must be a non-negative integer, got {}", value))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument {
    Metadata(MetadataRecord),
    Row(DataRow),
}

/// The sentinel record. Input datasets may have been written by other
/// services, so only `finished` is required here; [`MetadataRecord::as_job`]
/// gives the typed view for builder output.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub finished: bool,
    pub fields: Document,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub id: u64,
    pub fields: Document,
}

impl StoredDocument {
    pub fn classify(doc: Document) -> Result<Self> {
        let id = document_id(&doc)?;
        if id != SENTINEL_ID {
            return Ok(StoredDocument::Row(DataRow { id, fields: doc }));
        }
        let finished = doc
            .get(FINISHED_FIELD)
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::InvalidDocument("metadata record without boolean `finished`".into()))?;
        Ok(StoredDocument::Metadata(MetadataRecord { finished, fields: doc }))
    }

    pub fn id(&self) -> u64 {
        match self {
            StoredDocument::Metadata(_) => SENTINEL_ID,
            StoredDocument::Row(row) => row.id,
        }
    }

    pub fn into_metadata(self) -> Result<MetadataRecord> {
        match self {
            StoredDocument::Metadata(record) => Ok(record),
            StoredDocument::Row(row) => Err(Error::InvalidDocument(format!(
                "expected metadata record, found row {}",
                row.id
            ))),
        }
    }
}

impl MetadataRecord {
    pub fn as_job(&self) -> Result<JobMetadata> {
        JobMetadata::from_document(&self.fields)
    }
}

/// Background failure attached to a job's metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for JobFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Metadata for one (input pair, variant) job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(rename = "_id")]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "datasetName")]
    pub output_name: String,
    #[serde(rename = "parentDatasetName")]
    pub parent_names: (String, String),
    #[serde(rename = "classifier")]
    pub variant: Variant,
    #[serde(rename = "timeCreated", with = "time_created")]
    pub created_at: DateTime<Utc>,
    pub finished: bool,
    #[serde(rename = "fitTime", default, skip_serializing_if = "Option::is_none")]
    pub fit_duration_seconds: Option<f64>,
    #[serde(rename = "F1", default, skip_serializing_if = "Option::is_none")]
    pub f1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl JobMetadata {
    pub fn new(kind: &str, variant: Variant, train: &str, test: &str) -> Self {
        Self {
            id: SENTINEL_ID,
            kind: kind.to_string(),
            output_name: variant.output_name(test),
            parent_names: (train.to_string(), test.to_string()),
            variant,
            // second precision, the stored format has no fraction
            created_at: truncate_to_seconds(Utc::now()),
            finished: false,
            fit_duration_seconds: None,
            f1: None,
            accuracy: None,
            error: None,
        }
    }

    pub fn train_name(&self) -> &str {
        &self.parent_names.0
    }

    pub fn test_name(&self) -> &str {
        &self.parent_names.1
    }

    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            other => Err(Error::InvalidDocument(format!("metadata serialized to {}", other))),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let job: JobMetadata = serde_json::from_value(Value::Object(doc.clone()))?;
        if job.id != SENTINEL_ID {
            return Err(Error::InvalidDocument(format!("job metadata under id {}", job.id)));
        }
        Ok(job)
    }

    pub fn state(&self) -> JobState {
        if self.finished {
            return JobState::Finished;
        }
        match &self.error {
            Some(failure) => JobState::Failed {
                kind: failure.kind.clone(),
                message: failure.message.clone(),
            },
            None => JobState::Running,
        }
    }
}

/// What a poller can tell about a job from its metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Running,
    Finished,
    Failed { kind: String, message: String },
}

fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}

mod time_created {
    use super::TIME_CREATED_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(TIME_CREATED_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIME_CREATED_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Parses a `timeCreated` value as written by [`JobMetadata`].
pub fn parse_time_created(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIME_CREATED_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::InvalidDocument(format!("bad timeCreated {raw:?}: {e}")))
}
