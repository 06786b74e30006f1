//! Boundary to the external computation engine.
//!
//! # Responsibility
//! - Build flat key/value requests from entities, editor sessions and the
//!   whole document.
//! - Parse structured responses and surface an engine-reported `Error`.
//!
//! # Invariants
//! - Nothing here mutates the document.
//! - An `Error` key in a response always wins over any payload.

use crate::model::entity::Entity;
use crate::model::mask::MaskBounds;
use crate::session::EditorSession;
use crate::store::codec::render_document;
use crate::store::document::Document;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Response key carrying an engine failure message.
pub const ERROR_KEY: &str = "Error";
/// Request key carrying the serialized document.
pub const PROJECT_KEY: &str = "Project";

/// Transport or encoding failure talking to the engine.
#[derive(Debug)]
pub enum EngineError {
    Encode(String),
    Decode(String),
    Transport(String),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(message) => write!(f, "failed to encode request: {message}"),
            Self::Decode(message) => write!(f, "failed to decode response: {message}"),
            Self::Transport(message) => write!(f, "engine call failed: {message}"),
        }
    }
}

impl Error for EngineError {}

/// Failure the engine itself reported, carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputationError {
    pub task: String,
    pub message: String,
}

impl Display for ComputationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ComputationError {}

/// Either side of a failed `dispatch`.
#[derive(Debug)]
pub enum ComputeError {
    Engine(EngineError),
    Computation(ComputationError),
}

impl Display for ComputeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(err) => write!(f, "{err}"),
            Self::Computation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ComputeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            Self::Computation(err) => Some(err),
        }
    }
}

impl From<EngineError> for ComputeError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

/// Flat request: a task name plus string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRequest {
    #[serde(rename = "Task")]
    pub task: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, String>,
}

impl ComputeRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds the entity's committed values under unprefixed keys.
    pub fn with_entity(self, entity: &Entity) -> Self {
        self.with_entity_as("", entity)
    }

    /// Adds the entity's committed values as `{prefix}.{key}`.
    ///
    /// Masks flatten to `{mask}.Enabled`, `.Min`, `.Max` or `.Target`;
    /// reference slots to comma-joined ids.
    pub fn with_entity_as(mut self, prefix: &str, entity: &Entity) -> Self {
        let mut put = |key: String, value: String| {
            let key = if prefix.is_empty() {
                key
            } else {
                format!("{prefix}.{key}")
            };
            self.params.insert(key, value);
        };

        put("Name".to_string(), entity.name.clone());
        for (name, value) in &entity.fields {
            put(name.clone(), value.clone());
        }
        for (name, mask) in &entity.masks {
            put(format!("{name}.Enabled"), mask.enabled.to_string());
            match &mask.bounds {
                MaskBounds::Range { min, max } => {
                    if let Some(min) = min {
                        put(format!("{name}.Min"), min.clone());
                    }
                    if let Some(max) = max {
                        put(format!("{name}.Max"), max.clone());
                    }
                }
                MaskBounds::Target(target) => put(format!("{name}.Target"), target.clone()),
            }
        }
        let mut slots: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for reference in &entity.refs {
            slots
                .entry(reference.slot.as_str())
                .or_default()
                .push(reference.target.id.as_str());
        }
        for (slot, ids) in slots {
            put(slot.to_string(), ids.join(","));
        }
        self
    }

    /// Adds the editor's current, possibly uncommitted, values.
    pub fn with_session(mut self, session: &EditorSession) -> Self {
        for binding in session.bindings() {
            self.params
                .insert(binding.path.to_string(), binding.value.to_flat_string());
        }
        self
    }

    /// Attaches the whole document as canonical XML under `Project`.
    pub fn with_document(mut self, document: &Document) -> Result<Self, EngineError> {
        let xml = render_document(document).map_err(|err| EngineError::Encode(err.to_string()))?;
        self.params.insert(PROJECT_KEY.to_string(), xml);
        Ok(self)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(|err| EngineError::Encode(err.to_string()))
    }
}

/// Structured engine response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputeResponse(pub BTreeMap<String, Value>);

impl ComputeResponse {
    /// Parses a JSON object response.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|err| EngineError::Decode(err.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Engine-reported failure message, if any.
    ///
    /// `null` and empty strings count as "no error".
    pub fn error_message(&self) -> Option<String> {
        match self.0.get(ERROR_KEY)? {
            Value::Null => None,
            Value::String(message) if message.is_empty() => None,
            Value::String(message) => Some(message.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Payload entries, excluding `Error`.
    pub fn payload(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0
            .iter()
            .filter(|(key, _)| key.as_str() != ERROR_KEY)
            .map(|(key, value)| (key.as_str(), value))
    }
}

/// Something that runs computation requests.
pub trait ComputeEngine {
    fn call(&mut self, request: &ComputeRequest) -> Result<ComputeResponse, EngineError>;
}

/// Sends `request` and turns an `Error` key into `ComputationError`.
pub fn dispatch<E: ComputeEngine + ?Sized>(
    engine: &mut E,
    request: &ComputeRequest,
) -> Result<ComputeResponse, ComputeError> {
    let started_at = Instant::now();
    info!(
        "event=compute_dispatch module=engine status=start task={} params={}",
        request.task,
        request.params.len()
    );
    let response = match engine.call(request) {
        Ok(response) => response,
        Err(err) => {
            error!(
                "event=compute_dispatch module=engine status=error duration_ms={} task={} error={}",
                started_at.elapsed().as_millis(),
                request.task,
                err
            );
            return Err(err.into());
        }
    };
    if let Some(message) = response.error_message() {
        error!(
            "event=compute_dispatch module=engine status=error duration_ms={} task={} error=computation",
            started_at.elapsed().as_millis(),
            request.task
        );
        return Err(ComputeError::Computation(ComputationError {
            task: request.task.clone(),
            message,
        }));
    }
    info!(
        "event=compute_dispatch module=engine status=ok duration_ms={} task={}",
        started_at.elapsed().as_millis(),
        request.task
    );
    Ok(response)
}

/// Engine reached through a child process speaking JSON on stdin/stdout.
///
/// Each call spawns `program`, writes one request object and reads one
/// response object from standard output.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl ComputeEngine for ProcessEngine {
    fn call(&mut self, request: &ComputeRequest) -> Result<ComputeResponse, EngineError> {
        let body = request.to_json()?;
        let transport = |err: std::io::Error| {
            EngineError::Transport(format!("{}: {err}", self.program.display()))
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(transport)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(body.as_bytes()).map_err(transport)?;
        }
        let output = child.wait_with_output().map_err(transport)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Transport(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8(output.stdout)
            .map_err(|err| EngineError::Decode(format!("response is not UTF-8: {err}")))?;
        ComputeResponse::from_json(stdout.trim())
    }
}
