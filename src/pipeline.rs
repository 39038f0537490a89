//! Review Pipeline - Single Entry Point for Polished Writes
//!
//! CRITICAL: review MUST validate overrides before anything reaches the
//! polished registry. No bypass.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{Artifact, Layer, LayerKind, PreviewRef, SlotKey};
use crate::config::{EngineConfig, FailureMode};
use crate::hashing::{artifact_fingerprint, compute_review_hash};
use crate::overrides::{apply_overrides, Override};
use crate::store::{PipelineStore, WriteOutcome};
use crate::validation::{ValidationViolation, Validator, ViolationSeverity};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Document unavailable: {0}")]
    DocumentUnavailable(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),
}

/// Opaque handle to the source document the renderer composites against.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DocumentHandle(pub String);

/// Supplies layer corrections for an artifact under review.
pub trait PolicySupplier {
    fn overrides(&self, source: &SlotKey, artifact: &Artifact) -> Vec<Override>;
}

/// Renders an artifact into a displayable visual.
pub trait VisualComposer {
    fn compose(&self, artifact: &Artifact, document: &DocumentHandle) -> Result<PreviewRef, ComposeError>;
}

/// Fixed list of overrides, e.g. decoded from a reviewer response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticPolicy(pub Vec<Override>);

impl PolicySupplier for StaticPolicy {
    fn overrides(&self, _source: &SlotKey, _artifact: &Artifact) -> Vec<Override> {
        self.0.clone()
    }
}

/// Outline renderer: draws each visible layer box as SVG and returns it as a
/// data URL. Generative layers are dashed.
#[derive(Debug, Clone, Default)]
pub struct WireframeComposer;

impl VisualComposer for WireframeComposer {
    fn compose(&self, artifact: &Artifact, _document: &DocumentHandle) -> Result<PreviewRef, ComposeError> {
        let bounds = artifact
            .metrics
            .ok_or_else(|| ComposeError::RenderFailed("artifact has no bounds".into()))?;

        let mut body = String::new();
        push_outlines(&artifact.layers, &mut body);
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{} {} {} {}">{}</svg>"#,
            bounds.x, bounds.y, bounds.w, bounds.h, body
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(svg.as_bytes());
        Ok(PreviewRef(format!("data:image/svg+xml;base64,{}", encoded)))
    }
}

fn push_outlines(layers: &[Layer], out: &mut String) {
    for layer in layers.iter().filter(|l| l.visible) {
        let dash = if layer.kind == LayerKind::Generative { r#" stroke-dasharray="4""# } else { "" };
        out.push_str(&format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="black" opacity="{}"{}/>"#,
            layer.coords.x, layer.coords.y, layer.coords.w, layer.coords.h, layer.opacity, dash
        ));
        push_outlines(&layer.children, out);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    /// Upstream slot holding the artifact to review
    pub source: SlotKey,
    /// Reviewer's own slot in the polished registry
    pub target: SlotKey,
    #[serde(default)]
    pub document: DocumentHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub target: SlotKey,
    pub review_hash: String,
    pub fingerprint: String,
    pub applied: usize,
    pub violations: Vec<ValidationViolation>,
    pub polished: WriteOutcome,
    pub preview: Option<PreviewRef>,
    pub reviewed_at: DateTime<Utc>,
}

/// The review pipeline - validated path into the polished registry
pub struct ReviewPipeline {
    validator: Validator,
    failure_mode: FailureMode,
}

impl ReviewPipeline {
    pub fn new(failure_mode: FailureMode) -> Self {
        Self {
            validator: Validator::new(),
            failure_mode,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.review.failure_mode)
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Review one artifact.
    ///
    /// CRITICAL: Overrides are always validated. A failed composition skips
    /// the preview write but never the polished write.
    pub fn review(
        &self,
        store: &mut PipelineStore,
        request: &ReviewRequest,
        supplier: &dyn PolicySupplier,
        composer: Option<&dyn VisualComposer>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let artifact = store
            .read(&request.source)
            .cloned()
            .ok_or_else(|| ReviewError::ArtifactNotFound(request.source.to_string()))?;

        let overrides = supplier.overrides(&request.source, &artifact);

        // MANDATORY: validation gates the polished write.
        let validation = self.validator.validate(&overrides, &artifact, self.failure_mode);
        if !validation.valid {
            let messages: Vec<_> = validation
                .violations
                .iter()
                .filter(|v| v.severity == ViolationSeverity::Error)
                .map(|v| format!("{} [{}]: {}", v.rule, v.layer_id, v.message))
                .collect();
            return Err(ReviewError::ValidationFailed(messages.join("; ")));
        }
        self.log_violations(&request.target, &validation.violations);

        let input_fingerprint = artifact_fingerprint(&artifact)?;
        let reviewed = apply_overrides(&artifact, &validation.accepted);
        let polished = store.write_polished(&request.target, &reviewed);

        let stored = store
            .read_polished(&request.target)
            .cloned()
            .unwrap_or(reviewed);

        let preview = match composer {
            Some(composer) => match composer.compose(&stored, &request.document) {
                Ok(preview) => {
                    store.write_preview(&request.target, preview.clone());
                    Some(preview)
                }
                Err(e) => {
                    tracing::warn!(slot = %request.target, error = %e, "preview composition failed");
                    None
                }
            },
            None => None,
        };

        let review_hash = compute_review_hash(
            &request.target,
            &validation.accepted,
            &input_fingerprint,
            ENGINE_VERSION,
        )?;

        Ok(ReviewOutcome {
            target: request.target.clone(),
            review_hash,
            fingerprint: artifact_fingerprint(&stored)?,
            applied: validation.accepted.len(),
            violations: validation.violations,
            polished,
            preview,
            reviewed_at: Utc::now(),
        })
    }

    fn log_violations(&self, target: &SlotKey, violations: &[ValidationViolation]) {
        for v in violations {
            match self.failure_mode {
                FailureMode::Log => {
                    tracing::debug!(slot = %target, rule = %v.rule, layer = %v.layer_id, "{}", v.message)
                }
                _ => tracing::warn!(slot = %target, rule = %v.rule, layer = %v.layer_id, "{}", v.message),
            }
        }
    }
}

impl Default for ReviewPipeline {
    fn default() -> Self {
        Self::new(FailureMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactStatus, Rect};

    struct FailingComposer;

    impl VisualComposer for FailingComposer {
        fn compose(&self, _artifact: &Artifact, _document: &DocumentHandle) -> Result<PreviewRef, ComposeError> {
            Err(ComposeError::DocumentUnavailable("closed".into()))
        }
    }

    fn request() -> ReviewRequest {
        ReviewRequest {
            source: SlotKey::new("layout", "out"),
            target: SlotKey::new("reviewer", "out"),
            document: DocumentHandle("doc-1".into()),
        }
    }

    fn seeded_store() -> PipelineStore {
        let mut store = PipelineStore::default();
        store.write(
            &request().source,
            &Artifact {
                generation_id: Some(1),
                status: Some(ArtifactStatus::Success),
                preview_url: Some("clean.png".into()),
                metrics: Some(Rect::new(0.0, 0.0, 200.0, 100.0)),
                layers: vec![Layer::new("0.1", LayerKind::Pixel, Rect::new(10.0, 10.0, 100.0, 50.0))],
                ..Artifact::default()
            },
        );
        store
    }

    #[test]
    fn test_review_writes_polished_and_preview() {
        let mut store = seeded_store();
        let policy = StaticPolicy(vec![Override {
            x_offset: 5.0,
            ..Override::new("0.1", "align-left")
        }]);

        let outcome = ReviewPipeline::default()
            .review(&mut store, &request(), &policy, Some(&WireframeComposer))
            .unwrap();

        assert_eq!(outcome.applied, 1);
        assert!(outcome.polished.changed());
        let polished = store.read_polished(&request().target).unwrap();
        assert!(polished.is_polished);
        assert_eq!(polished.find_layer("0.1").unwrap().coords.x, 15.0);
        // clean asset reference untouched by the display composite
        assert_eq!(polished.preview_url.as_deref(), Some("clean.png"));
        let preview = store.read_preview(&request().target).unwrap();
        assert!(preview.as_str().starts_with("data:image/svg+xml;base64,"));
        assert_eq!(outcome.preview.as_ref(), Some(preview));
        // upstream artifact is not modified
        assert_eq!(store.read(&request().source).unwrap().find_layer("0.1").unwrap().coords.x, 10.0);
    }

    #[test]
    fn test_missing_artifact_writes_nothing() {
        let mut store = PipelineStore::default();
        let err = ReviewPipeline::default()
            .review(&mut store, &request(), &StaticPolicy::default(), None)
            .unwrap_err();
        assert!(matches!(err, ReviewError::ArtifactNotFound(_)));
        assert_eq!(store.entry_count(), 0);
    }

    #[test]
    fn test_block_mode_rejects_uncited_override() {
        let mut store = seeded_store();
        let policy = StaticPolicy(vec![Override::new("0.1", "")]);
        let err = ReviewPipeline::new(FailureMode::Block)
            .review(&mut store, &request(), &policy, None)
            .unwrap_err();

        assert!(err.to_string().contains("cited_rule"));
        assert!(store.read_polished(&request().target).is_none());
    }

    #[test]
    fn test_compose_failure_keeps_polished_write() {
        let mut store = seeded_store();
        let outcome = ReviewPipeline::new(FailureMode::Warn)
            .review(&mut store, &request(), &StaticPolicy::default(), Some(&FailingComposer))
            .unwrap();

        assert!(outcome.preview.is_none());
        assert!(store.read_polished(&request().target).is_some());
        assert!(store.read_preview(&request().target).is_none());
    }

    #[test]
    fn test_repeat_review_is_suppressed() {
        let mut store = seeded_store();
        let pipeline = ReviewPipeline::default();
        let policy = StaticPolicy(vec![Override::new("0.1", "grid")]);

        let first = pipeline.review(&mut store, &request(), &policy, None).unwrap();
        let second = pipeline.review(&mut store, &request(), &policy, None).unwrap();

        assert!(first.polished.changed());
        assert!(!second.polished.changed());
        assert_eq!(first.review_hash, second.review_hash);
        assert_eq!(first.fingerprint, second.fingerprint);
    }
}
