use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the report pipeline, or the `error` sentinel.
///
/// Stage names the client does not know yet are kept verbatim so newer
/// upstream services keep working; they sort after every ranked stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    Researcher,
    Analyst,
    ReportWriter,
    Error,
    Other(String),
}

impl Stage {
    pub fn from_name(name: &str) -> Self {
        match name {
            "researcher" => Stage::Researcher,
            "analyst" => Stage::Analyst,
            "report_writer" => Stage::ReportWriter,
            "error" => Stage::Error,
            other => Stage::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Stage::Researcher => "researcher",
            Stage::Analyst => "analyst",
            Stage::ReportWriter => "report_writer",
            Stage::Error => "error",
            Stage::Other(name) => name,
        }
    }

    /// Display rank of the stage. `None` for the error sentinel and for
    /// stages outside the known pipeline.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Stage::Researcher => Some(0),
            Stage::Analyst => Some(1),
            Stage::ReportWriter => Some(2),
            Stage::Error | Stage::Other(_) => None,
        }
    }

    /// Bucket used for ordering: ranked stages, then unranked ones, then `error`.
    pub(crate) fn order_bucket(&self) -> (u8, u8) {
        match self {
            Stage::Error => (2, 0),
            Stage::Other(_) => (1, 0),
            known => (0, known.rank().unwrap_or(0)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Stage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Stage::from_name(&name))
    }
}

/// Which payload field produced an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    ResearchData,
    Analysis,
    Report,
    Error,
    /// Stage value without any known field; content is the stringified value.
    Raw,
}

/// Canonical, display-ready text for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub stage: Stage,
    pub kind: OutputKind,
    pub content: String,
}

impl AgentOutput {
    pub fn new(stage: Stage, kind: OutputKind, content: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Stage::Error, OutputKind::Error, message)
    }
}

/// Event names seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Update,
    Error,
    /// Final report emitted by the pipeline once the graph finishes.
    End,
    Unknown(String),
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "update" => EventKind::Update,
            "error" => EventKind::Error,
            "end" => EventKind::End,
            other => EventKind::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_round_trip_through_serde() {
        let out = AgentOutput::new(Stage::ReportWriter, OutputKind::Report, "done");
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"stage": "report_writer", "kind": "report", "content": "done"})
        );

        let back: AgentOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn unknown_stage_is_kept_verbatim_and_unranked() {
        let stage = Stage::from_name("fact_checker");
        assert_eq!(stage, Stage::Other("fact_checker".to_string()));
        assert_eq!(stage.as_str(), "fact_checker");
        assert_eq!(stage.rank(), None);
        assert!(stage.order_bucket() > Stage::ReportWriter.order_bucket());
        assert!(stage.order_bucket() < Stage::Error.order_bucket());
    }
}
