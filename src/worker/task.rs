//! Task descriptors and result envelopes
//!
//! The wire-level vocabulary between callers and execution contexts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{
    Annotation, DocumentError, DocumentResult, DocumentText, SearchMatch, SearchOptions,
};

/// Family of text tasks (extract, search)
pub const FAMILY_TEXT: &str = "text";
/// Family of annotation tasks (extractAnnotations, saveAnnotations)
pub const FAMILY_ANNOTATIONS: &str = "annotations";
/// Family of document synthesis tasks (create, edit)
pub const FAMILY_SYNTHESIS: &str = "synthesis";

/// Kind of work requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    Extract,
    Search,
    ExtractAnnotations,
    SaveAnnotations,
    Edit,
    Create,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Extract,
        TaskKind::Search,
        TaskKind::ExtractAnnotations,
        TaskKind::SaveAnnotations,
        TaskKind::Edit,
        TaskKind::Create,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Extract => "extract",
            TaskKind::Search => "search",
            TaskKind::ExtractAnnotations => "extractAnnotations",
            TaskKind::SaveAnnotations => "saveAnnotations",
            TaskKind::Edit => "edit",
            TaskKind::Create => "create",
        }
    }

    /// Execution context family that runs this kind
    pub fn family(&self) -> &'static str {
        match self {
            TaskKind::Extract | TaskKind::Search => FAMILY_TEXT,
            TaskKind::ExtractAnnotations | TaskKind::SaveAnnotations => FAMILY_ANNOTATIONS,
            TaskKind::Edit | TaskKind::Create => FAMILY_SYNTHESIS,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DocumentError::InvalidArgument(format!("unknown task kind: {s}")))
    }
}

/// Open key/value options of a task
///
/// Unknown keys are kept and ignored. Accessors fail with
/// `InvalidArgument` when a known key has the wrong type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskOptions(Map<String, Value>);

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    fn string(&self, key: &str) -> DocumentResult<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(invalid(key, "a string", other)),
        }
    }

    fn flag(&self, key: &str) -> DocumentResult<bool> {
        match self.get(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(invalid(key, "a boolean", other)),
        }
    }

    /// Query for `search`; missing means empty (no matches)
    pub fn search_text(&self) -> DocumentResult<&str> {
        Ok(self.string("searchText")?.unwrap_or_default())
    }

    pub fn match_case(&self) -> DocumentResult<bool> {
        self.flag("matchCase")
    }

    pub fn whole_word(&self) -> DocumentResult<bool> {
        self.flag("wholeWord")
    }

    pub fn search_options(&self) -> DocumentResult<SearchOptions> {
        Ok(SearchOptions {
            match_case: self.match_case()?,
            whole_word: self.whole_word()?,
        })
    }

    /// Target page for `edit` (1-indexed, default 1)
    pub fn page_number(&self) -> DocumentResult<i64> {
        match self.get("pageNumber") {
            None => Ok(1),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| invalid("pageNumber", "an integer", value)),
        }
    }

    /// Text for `create` and `edit`
    pub fn text(&self) -> DocumentResult<Option<&str>> {
        self.string("text")
    }

    /// Annotations for `saveAnnotations`; missing means none
    pub fn annotations(&self) -> DocumentResult<Vec<Annotation>> {
        match self.get("annotations") {
            None => Ok(Vec::new()),
            Some(value) => Vec::<Annotation>::deserialize(value).map_err(|e| {
                DocumentError::InvalidArgument(format!("malformed annotations: {e}"))
            }),
        }
    }
}

impl From<Map<String, Value>> for TaskOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn invalid(key: &str, expected: &str, got: &Value) -> DocumentError {
    DocumentError::InvalidArgument(format!("option {key} must be {expected}, got {got}"))
}

/// A unit of work: kind, a private copy of the document bytes, options
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub content: Vec<u8>,
    pub options: TaskOptions,
}

impl TaskDescriptor {
    /// Copy `content` so the caller keeps ownership of its buffer
    pub fn new(kind: TaskKind, content: &[u8], options: TaskOptions) -> Self {
        Self::from_owned(kind, content.to_vec(), options)
    }

    pub fn from_owned(kind: TaskKind, content: Vec<u8>, options: TaskOptions) -> Self {
        Self {
            kind,
            content,
            options,
        }
    }
}

/// Payload of a successful task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskResult {
    Text(DocumentText),
    Matches(Vec<SearchMatch>),
    Annotations(Vec<Annotation>),
    Document {
        #[serde(with = "base64_bytes")]
        content: Vec<u8>,
    },
}

/// Typed failure carried in an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

impl From<&DocumentError> for TaskError {
    fn from(err: &DocumentError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Uniform reply to a submission; exactly one of result/error is set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub correlation_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl ResultEnvelope {
    pub fn success(correlation_id: impl Into<String>, result: TaskResult) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(correlation_id: impl Into<String>, err: &DocumentError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            success: false,
            result: None,
            error: Some(TaskError::from(err)),
        }
    }

    /// Error kind of a failed envelope
    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}

/// Serde adapter for byte buffers as standard base64 strings
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
