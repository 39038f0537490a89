//! Script Replay
//!
//! Replays a recorded sequence of producer events against a store. Used by the
//! CLI to reproduce out-of-order delivery and by tests as a fixture format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::artifact::{Artifact, ArtifactPatch, PreviewRef, SlotKey};
use crate::hashing::artifact_fingerprint;
use crate::store::{MetadataKind, PipelineStore};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Invalid script at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ScriptOp {
    Write {
        #[serde(flatten)]
        slot: SlotKey,
        artifact: Artifact,
    },
    WritePartial {
        #[serde(flatten)]
        slot: SlotKey,
        patch: ArtifactPatch,
    },
    WritePolished {
        #[serde(flatten)]
        slot: SlotKey,
        artifact: Artifact,
    },
    WritePreview {
        #[serde(flatten)]
        slot: SlotKey,
        preview: PreviewRef,
    },
    SetTemplate {
        #[serde(rename = "producerId")]
        producer_id: String,
        value: Value,
    },
    SetAnalysis {
        #[serde(rename = "producerId")]
        producer_id: String,
        value: Value,
    },
    SetKnowledge {
        #[serde(rename = "producerId")]
        producer_id: String,
        value: Value,
    },
    RemoveProducer {
        #[serde(rename = "producerId")]
        producer_id: String,
    },
    Reset,
}

impl ScriptOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::WritePartial { .. } => "writePartial",
            Self::WritePolished { .. } => "writePolished",
            Self::WritePreview { .. } => "writePreview",
            Self::SetTemplate { .. } => "setTemplate",
            Self::SetAnalysis { .. } => "setAnalysis",
            Self::SetKnowledge { .. } => "setKnowledge",
            Self::RemoveProducer { .. } => "removeProducer",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub index: usize,
    pub op: String,
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptReport {
    pub steps: Vec<StepReport>,
    pub version: u64,
    pub entries: usize,
    pub finished_at: DateTime<Utc>,
}

impl ScriptReport {
    pub fn changes(&self) -> usize {
        self.steps.iter().filter(|s| s.changed).count()
    }
}

/// Accepts a JSON array of ops or one op per line. Blank lines and lines
/// starting with `//` are skipped in line mode.
pub fn parse_script(text: &str) -> Result<Vec<ScriptOp>, ScriptError> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).map_err(|source| ScriptError::Parse { line: 1, source });
    }

    let mut ops = vec![];
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let op = serde_json::from_str(line).map_err(|source| ScriptError::Parse { line: i + 1, source })?;
        ops.push(op);
    }
    Ok(ops)
}

pub fn run_script(store: &mut PipelineStore, ops: &[ScriptOp]) -> ScriptReport {
    let mut steps = Vec::with_capacity(ops.len());

    for (index, op) in ops.iter().enumerate() {
        let (changed, detail) = match op {
            ScriptOp::Write { slot, artifact } => {
                let outcome = store.write(slot, artifact);
                (outcome.changed(), Some(format!("{:?}", outcome)))
            }
            ScriptOp::WritePartial { slot, patch } => {
                let outcome = store.write_partial(slot, patch);
                (outcome.changed(), Some(format!("{:?}", outcome)))
            }
            ScriptOp::WritePolished { slot, artifact } => {
                let outcome = store.write_polished(slot, artifact);
                (outcome.changed(), Some(format!("{:?}", outcome)))
            }
            ScriptOp::WritePreview { slot, preview } => (store.write_preview(slot, preview.clone()), None),
            ScriptOp::SetTemplate { producer_id, value } => {
                (store.set_metadata(MetadataKind::Template, producer_id, value.clone()), None)
            }
            ScriptOp::SetAnalysis { producer_id, value } => {
                (store.set_metadata(MetadataKind::Analysis, producer_id, value.clone()), None)
            }
            ScriptOp::SetKnowledge { producer_id, value } => {
                (store.set_metadata(MetadataKind::Knowledge, producer_id, value.clone()), None)
            }
            ScriptOp::RemoveProducer { producer_id } => {
                let report = store.remove_producer(producer_id);
                (report.total() > 0, Some(format!("removed {} entries", report.total())))
            }
            ScriptOp::Reset => {
                let had = store.entry_count();
                store.reset();
                (had > 0, None)
            }
        };
        steps.push(StepReport {
            index,
            op: op.name().to_string(),
            changed,
            detail,
        });
    }

    ScriptReport {
        steps,
        version: store.version(),
        entries: store.entry_count(),
        finished_at: Utc::now(),
    }
}

/// JSON view of the artifact, polished and preview registries with a
/// fingerprint per artifact.
pub fn snapshot_json(store: &PipelineStore) -> Result<Value, ScriptError> {
    let mut artifacts = vec![];
    for (producer, ports) in store.artifacts().snapshot().iter() {
        for (port, artifact) in ports {
            artifacts.push(json!({
                "slot": SlotKey::new(producer.as_str(), port.as_str()),
                "fingerprint": artifact_fingerprint(artifact)?,
                "artifact": artifact,
            }));
        }
    }

    let mut polished = vec![];
    for (producer, ports) in store.polished().snapshot().iter() {
        for (port, artifact) in ports {
            polished.push(json!({
                "slot": SlotKey::new(producer.as_str(), port.as_str()),
                "fingerprint": artifact_fingerprint(artifact)?,
                "artifact": artifact,
            }));
        }
    }

    Ok(json!({
        "version": store.version(),
        "artifacts": artifacts,
        "polished": polished,
        "previews": store.previews().snapshot().as_ref(),
    }))
}
