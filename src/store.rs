//! Pipeline Store - Registry Facade and Lifecycle
//!
//! Single entry point for producers and consumers. Every artifact write is
//! routed through the reconciler; the registry only stores the result when it
//! differs structurally from the current entry. Producer removal purges every
//! registry and always bumps the global version.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::{Artifact, ArtifactPatch, PreviewRef, SlotKey};
use crate::reconcile::{ReconcilePolicy, ReconcileRule, Reconciler};
use crate::registry::{Interest, Registry, ScalarRegistry, SlotChange, SubscriptionId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "rule")]
pub enum WriteOutcome {
    /// The slot now holds a new value.
    Stored(ReconcileRule),
    /// Reconciled value equals the stored one; nothing changed.
    Suppressed(ReconcileRule),
    /// Partial write with no prior artifact and nothing to identify it.
    Skipped,
}

impl WriteOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    Template,
    Analysis,
    Knowledge,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemovalReport {
    pub artifacts: usize,
    pub polished: usize,
    pub previews: usize,
    pub metadata: usize,
    pub version: u64,
}

impl RemovalReport {
    pub fn total(&self) -> usize {
        self.artifacts + self.polished + self.previews + self.metadata
    }
}

pub struct PipelineStore {
    reconciler: Reconciler,
    artifacts: Registry<Artifact>,
    polished: Registry<Artifact>,
    previews: Registry<PreviewRef>,
    templates: ScalarRegistry<Value>,
    analysis: ScalarRegistry<Value>,
    knowledge: ScalarRegistry<Value>,
    version: u64,
}

impl PipelineStore {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self {
            reconciler: Reconciler::new(policy),
            artifacts: Registry::new("artifacts"),
            polished: Registry::new("polished"),
            previews: Registry::new("previews"),
            templates: ScalarRegistry::new("templates"),
            analysis: ScalarRegistry::new("analysis"),
            knowledge: ScalarRegistry::new("knowledge"),
            version: 0,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Global version; changes whenever a producer may have disappeared.
    pub fn version(&self) -> u64 {
        self.version
    }

    // --- Primary artifacts ---

    pub fn write(&mut self, key: &SlotKey, candidate: &Artifact) -> WriteOutcome {
        let resolution = self.reconciler.resolve(candidate, self.artifacts.get(key));
        let rule = resolution.rule;
        let changed = self.artifacts.set(key, resolution.artifact);
        tracing::debug!(slot = %key, %rule, changed, "artifact write");
        if changed {
            WriteOutcome::Stored(rule)
        } else {
            WriteOutcome::Suppressed(rule)
        }
    }

    /// Merge a patch onto the stored artifact and reconcile the result in a
    /// single load-merge-store step.
    pub fn write_partial(&mut self, key: &SlotKey, patch: &ArtifactPatch) -> WriteOutcome {
        let reconciler = &self.reconciler;
        let mut applied = None;
        let changed = self.artifacts.update(key, |current| {
            let merged = match current {
                Some(current) => patch.apply_to(current),
                None if patch.is_identifying() => patch.clone().into_artifact(),
                None => return None,
            };
            let resolution = reconciler.resolve(&merged, current);
            applied = Some(resolution.rule);
            Some(resolution.artifact)
        });

        match applied {
            None => {
                tracing::debug!(slot = %key, "partial write ignored, no prior artifact");
                WriteOutcome::Skipped
            }
            Some(rule) => {
                tracing::debug!(slot = %key, %rule, changed, "partial artifact write");
                if changed {
                    WriteOutcome::Stored(rule)
                } else {
                    WriteOutcome::Suppressed(rule)
                }
            }
        }
    }

    pub fn read(&self, key: &SlotKey) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    pub fn artifacts(&self) -> &Registry<Artifact> {
        &self.artifacts
    }

    pub fn subscribe_artifacts<F>(&mut self, interest: Interest, callback: F) -> SubscriptionId
    where
        F: FnMut(&SlotChange<'_, Artifact>) + 'static,
    {
        self.artifacts.subscribe(interest, callback)
    }

    pub fn unsubscribe_artifacts(&mut self, id: SubscriptionId) -> bool {
        self.artifacts.unsubscribe(id)
    }

    // --- Reviewer sink ---

    /// Reconcile against the polished slot and mark the result polished
    /// whatever rule applied.
    pub fn write_polished(&mut self, key: &SlotKey, candidate: &Artifact) -> WriteOutcome {
        let resolution = self.reconciler.resolve(candidate, self.polished.get(key));
        let rule = resolution.rule;
        let mut artifact = resolution.artifact;
        artifact.is_polished = true;
        let changed = self.polished.set(key, artifact);
        tracing::debug!(slot = %key, %rule, changed, "polished write");
        if changed {
            WriteOutcome::Stored(rule)
        } else {
            WriteOutcome::Suppressed(rule)
        }
    }

    pub fn read_polished(&self, key: &SlotKey) -> Option<&Artifact> {
        self.polished.get(key)
    }

    pub fn polished(&self) -> &Registry<Artifact> {
        &self.polished
    }

    pub fn subscribe_polished<F>(&mut self, interest: Interest, callback: F) -> SubscriptionId
    where
        F: FnMut(&SlotChange<'_, Artifact>) + 'static,
    {
        self.polished.subscribe(interest, callback)
    }

    pub fn unsubscribe_polished(&mut self, id: SubscriptionId) -> bool {
        self.polished.unsubscribe(id)
    }

    // --- Display previews ---

    /// Composite shown to the user. Kept apart from the artifact's own
    /// `preview_url` so later bake passes don't composite it twice.
    pub fn write_preview(&mut self, key: &SlotKey, preview: PreviewRef) -> bool {
        self.previews.set(key, preview)
    }

    pub fn read_preview(&self, key: &SlotKey) -> Option<&PreviewRef> {
        self.previews.get(key)
    }

    pub fn previews(&self) -> &Registry<PreviewRef> {
        &self.previews
    }

    pub fn subscribe_previews<F>(&mut self, interest: Interest, callback: F) -> SubscriptionId
    where
        F: FnMut(&SlotChange<'_, PreviewRef>) + 'static,
    {
        self.previews.subscribe(interest, callback)
    }

    pub fn unsubscribe_previews(&mut self, id: SubscriptionId) -> bool {
        self.previews.unsubscribe(id)
    }

    // --- Node metadata ---

    pub fn set_metadata(&mut self, kind: MetadataKind, producer_id: &str, value: Value) -> bool {
        self.metadata_mut(kind).set(producer_id, value)
    }

    pub fn metadata(&self, kind: MetadataKind, producer_id: &str) -> Option<&Value> {
        self.metadata_registry(kind).get(producer_id)
    }

    pub fn metadata_registry(&self, kind: MetadataKind) -> &ScalarRegistry<Value> {
        match kind {
            MetadataKind::Template => &self.templates,
            MetadataKind::Analysis => &self.analysis,
            MetadataKind::Knowledge => &self.knowledge,
        }
    }

    fn metadata_mut(&mut self, kind: MetadataKind) -> &mut ScalarRegistry<Value> {
        match kind {
            MetadataKind::Template => &mut self.templates,
            MetadataKind::Analysis => &mut self.analysis,
            MetadataKind::Knowledge => &mut self.knowledge,
        }
    }

    // --- Lifecycle ---

    /// Purge a producer from every registry. The version moves even when
    /// nothing was stored, since consumers watching for a disconnected
    /// source have no other signal.
    pub fn remove_producer(&mut self, producer_id: &str) -> RemovalReport {
        let artifacts = self.artifacts.remove_producer(producer_id);
        let polished = self.polished.remove_producer(producer_id);
        let previews = self.previews.remove_producer(producer_id);
        let metadata = [&mut self.templates, &mut self.analysis, &mut self.knowledge]
            .into_iter()
            .map(|reg| usize::from(reg.remove(producer_id)))
            .sum();
        self.version += 1;

        let report = RemovalReport {
            artifacts,
            polished,
            previews,
            metadata,
            version: self.version,
        };
        tracing::info!(
            producer = producer_id,
            removed = report.total(),
            version = self.version,
            "producer removed"
        );
        report
    }

    /// Drop everything held for the session.
    pub fn reset(&mut self) {
        let removed = self.artifacts.clear()
            + self.polished.clear()
            + self.previews.clear()
            + self.templates.clear()
            + self.analysis.clear()
            + self.knowledge.clear();
        self.version += 1;
        tracing::info!(removed, version = self.version, "store reset");
    }

    /// Occupied slots across all registries.
    pub fn entry_count(&self) -> usize {
        self.artifacts.len()
            + self.polished.len()
            + self.previews.len()
            + self.templates.len()
            + self.analysis.len()
            + self.knowledge.len()
    }
}

impl Default for PipelineStore {
    fn default() -> Self {
        Self::new(ReconcilePolicy::default())
    }
}
