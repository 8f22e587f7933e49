//! Task creation payloads.
//!
//! On the wire a task is `{ "task_type": "...", "task_parameters": {...} }`.
//! Deserialization goes through `RawTaskSpec` first and is then validated into
//! the typed `TaskSpec`, so a known type with malformed parameters is rejected
//! instead of silently becoming `Unknown`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::SchedulerError;
use super::ids::{DocumentId, TaskId};
use super::task_type::TaskType;

/// Free-form parameters for stages without a fixed schema.
pub type ParameterMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscribeParameters {
    pub lang: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportFormat {
    Vtt,
    Srt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportParameters {
    pub format: ExportFormat,

    #[serde(default)]
    pub include_speaker_names: bool,

    #[serde(default)]
    pub include_word_timing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_line_length: Option<u32>,
}

/// Per-type task parameters, keyed by task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTaskSpec", into = "RawTaskSpec")]
pub enum TaskSpec {
    Reencode(ParameterMap),
    Transcribe(TranscribeParameters),
    Align(ParameterMap),
    IdentifySpeakers(ParameterMap),
    Export(ExportParameters),

    /// A task type this scheduler does not know. The original name is kept so
    /// the task can be handed to a worker that does.
    Unknown {
        task_type: String,
        parameters: ParameterMap,
    },
}

impl TaskSpec {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskSpec::Reencode(_) => TaskType::Reencode,
            TaskSpec::Transcribe(_) => TaskType::Transcribe,
            TaskSpec::Align(_) => TaskType::Align,
            TaskSpec::IdentifySpeakers(_) => TaskType::IdentifySpeakers,
            TaskSpec::Export(_) => TaskType::Export,
            TaskSpec::Unknown { .. } => TaskType::Unknown,
        }
    }

    /// The name a worker sees. Equals `task_type()` except for unknown types.
    pub fn type_name(&self) -> &str {
        match self {
            TaskSpec::Unknown { task_type, .. } => task_type,
            other => other.task_type().as_str(),
        }
    }

    /// Parameters as JSON, in their wire shape.
    pub fn parameters(&self) -> Value {
        RawTaskSpec::from(self.clone()).task_parameters
    }
}

/// Untyped wire form of a `TaskSpec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTaskSpec {
    pub task_type: String,

    #[serde(default)]
    pub task_parameters: Value,
}

impl TryFrom<RawTaskSpec> for TaskSpec {
    type Error = SchedulerError;

    fn try_from(raw: RawTaskSpec) -> Result<Self, Self::Error> {
        let name = raw.task_type;
        let params = raw.task_parameters;
        let spec = match name.parse::<TaskType>().unwrap_or(TaskType::Unknown) {
            TaskType::Reencode => TaskSpec::Reencode(into_map(&name, params)?),
            TaskType::Align => TaskSpec::Align(into_map(&name, params)?),
            TaskType::IdentifySpeakers => TaskSpec::IdentifySpeakers(into_map(&name, params)?),
            TaskType::Transcribe => TaskSpec::Transcribe(typed(&name, params)?),
            TaskType::Export => TaskSpec::Export(typed(&name, params)?),
            TaskType::Unknown => TaskSpec::Unknown {
                parameters: into_map(&name, params)?,
                task_type: name,
            },
        };
        Ok(spec)
    }
}

impl From<TaskSpec> for RawTaskSpec {
    fn from(spec: TaskSpec) -> Self {
        let task_type = spec.type_name().to_string();
        let task_parameters = match spec {
            TaskSpec::Reencode(map)
            | TaskSpec::Align(map)
            | TaskSpec::IdentifySpeakers(map)
            | TaskSpec::Unknown {
                parameters: map, ..
            } => Value::Object(map),
            TaskSpec::Transcribe(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            TaskSpec::Export(p) => serde_json::to_value(p).unwrap_or(Value::Null),
        };
        Self {
            task_type,
            task_parameters,
        }
    }
}

fn into_map(task_type: &str, value: Value) -> Result<ParameterMap, SchedulerError> {
    match value {
        Value::Null => Ok(ParameterMap::new()),
        Value::Object(map) => Ok(map),
        other => Err(SchedulerError::validation(format!(
            "task_parameters for {task_type} must be an object, got {other}"
        ))),
    }
}

fn typed<T: serde::de::DeserializeOwned>(
    task_type: &str,
    value: Value,
) -> Result<T, SchedulerError> {
    serde_json::from_value(value).map_err(|e| {
        SchedulerError::validation(format!("invalid task_parameters for {task_type}: {e}"))
    })
}

/// Request to create a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTask {
    pub document_id: DocumentId,

    /// Tasks that must complete before this one becomes ready.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    #[serde(flatten)]
    pub spec: TaskSpec,
}

impl CreateTask {
    pub fn new(document_id: DocumentId, spec: TaskSpec) -> Self {
        Self {
            document_id,
            dependencies: Vec::new(),
            spec,
        }
    }

    pub fn depends_on(mut self, task_id: TaskId) -> Self {
        self.dependencies.push(task_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transcribe_requires_lang_and_model() {
        let ok: TaskSpec = serde_json::from_value(json!({
            "task_type": "TRANSCRIBE",
            "task_parameters": { "lang": "de", "model": "small" }
        }))
        .unwrap();
        assert_eq!(
            ok,
            TaskSpec::Transcribe(TranscribeParameters {
                lang: "de".into(),
                model: "small".into()
            })
        );

        let err = serde_json::from_value::<TaskSpec>(json!({
            "task_type": "TRANSCRIBE",
            "task_parameters": { "lang": "de" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("TRANSCRIBE"));
    }

    #[test]
    fn unrecognised_type_becomes_unknown_and_keeps_its_name() {
        let spec: TaskSpec = serde_json::from_value(json!({
            "task_type": "TRANSLATE",
            "task_parameters": { "target": "en" }
        }))
        .unwrap();

        assert_eq!(spec.task_type(), TaskType::Unknown);
        assert_eq!(spec.type_name(), "TRANSLATE");
        assert_eq!(spec.parameters(), json!({ "target": "en" }));
    }

    #[test]
    fn free_form_parameters_must_be_objects() {
        let err = serde_json::from_value::<TaskSpec>(json!({
            "task_type": "ALIGN",
            "task_parameters": [1, 2, 3]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn missing_parameters_default_to_empty_map() {
        let spec: TaskSpec =
            serde_json::from_value(json!({ "task_type": "IDENTIFY_SPEAKERS" })).unwrap();
        assert_eq!(spec, TaskSpec::IdentifySpeakers(ParameterMap::new()));
    }

    #[test]
    fn create_task_flattens_the_spec() {
        let doc = DocumentId::from_u128(7);
        let dep = TaskId::from_u128(8);
        let req: CreateTask = serde_json::from_value(json!({
            "document_id": doc,
            "dependencies": [dep],
            "task_type": "EXPORT",
            "task_parameters": { "format": "VTT", "include_speaker_names": true }
        }))
        .unwrap();

        assert_eq!(req.document_id, doc);
        assert_eq!(req.dependencies, vec![dep]);
        assert!(matches!(
            req.spec,
            TaskSpec::Export(ExportParameters {
                format: ExportFormat::Vtt,
                include_speaker_names: true,
                include_word_timing: false,
                max_line_length: None,
            })
        ));
    }
}
