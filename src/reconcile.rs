//! Reconciler - Terminal-State Resolution
//!
//! Decides what a slot holds after an update arrives. Pure and synchronous:
//! the same (incoming, current) pair always resolves to the same artifact.
//! Rules are evaluated in a fixed priority order and the first match wins.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::{Artifact, ArtifactStatus, Layer, LayerKind};

pub const DEFAULT_SYNTHETIC_ID_PREFIX: &str = "gen-";
pub const DEFAULT_MANDATORY_DIRECTIVE: &str = "MANDATORY_FILL";

/// Naming conventions the rules depend on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePolicy {
    pub synthetic_id_prefix: String,
    pub mandatory_directive: String,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            synthetic_id_prefix: DEFAULT_SYNTHETIC_ID_PREFIX.to_string(),
            mandatory_directive: DEFAULT_MANDATORY_DIRECTIVE.to_string(),
        }
    }
}

/// Which rule produced a resolution, in priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileRule {
    GenerationDisallowed,
    MandatoryConfirm,
    StaleGeneration,
    IdleReset,
    SynthesisInFlight,
    PreserveGenerated,
    DefaultMerge,
}

impl fmt::Display for ReconcileRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GenerationDisallowed => "generation_disallowed",
            Self::MandatoryConfirm => "mandatory_confirm",
            Self::StaleGeneration => "stale_generation",
            Self::IdleReset => "idle_reset",
            Self::SynthesisInFlight => "synthesis_in_flight",
            Self::PreserveGenerated => "preserve_generated",
            Self::DefaultMerge => "default_merge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub rule: ReconcileRule,
    pub artifact: Artifact,
}

impl Resolution {
    /// True when the incoming update was discarded in favor of what is stored.
    pub fn is_rejected(&self) -> bool {
        self.rule == ReconcileRule::StaleGeneration
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Resolve the next stored state for a slot.
    pub fn resolve(&self, incoming: &Artifact, current: Option<&Artifact>) -> Resolution {
        if !incoming.generation_allowed {
            return self.strip_generation(incoming);
        }

        let mandatory = incoming.is_mandatory
            || incoming.has_directive(&self.policy.mandatory_directive);
        if mandatory && incoming.requires_generation {
            return force_confirm(incoming, current);
        }

        if let (Some(cur), Some(inc_gen)) = (current, incoming.generation_id) {
            if let Some(cur_gen) = cur.generation_id {
                if inc_gen < cur_gen {
                    return Resolution {
                        rule: ReconcileRule::StaleGeneration,
                        artifact: cur.clone(),
                    };
                }
            }
        }

        if incoming.status == Some(ArtifactStatus::Idle) {
            let mut artifact = incoming.clone();
            artifact.preview_url = None;
            artifact.is_confirmed = Some(false);
            artifact.is_transient = false;
            artifact.is_synthesizing = false;
            return Resolution { rule: ReconcileRule::IdleReset, artifact };
        }

        if incoming.is_synthesizing {
            return synthesis_in_flight(incoming, current);
        }

        if let Some(cur) = current {
            if incoming.generation_id.is_none() && cur.generation_id.is_some() {
                return preserve_generated(incoming, cur);
            }
        }

        default_merge(incoming, current)
    }

    fn strip_generation(&self, incoming: &Artifact) -> Resolution {
        let mut artifact = incoming.clone();
        artifact.preview_url = None;
        artifact.is_confirmed = Some(false);
        artifact.is_transient = false;
        artifact.is_synthesizing = false;
        artifact.requires_generation = false;
        artifact.layers = strip_synthetic_layers(&incoming.layers, &self.policy.synthetic_id_prefix);
        Resolution {
            rule: ReconcileRule::GenerationDisallowed,
            artifact,
        }
    }
}

/// Reconcile with the default naming policy.
pub fn reconcile(incoming: &Artifact, current: Option<&Artifact>) -> Artifact {
    Reconciler::default().resolve(incoming, current).artifact
}

/// Drop synthetic generative layers anywhere in the tree. A layer swapped to
/// generative but carrying a source id stays as a placeholder so the tree
/// shape consumers index into is unchanged.
fn strip_synthetic_layers(layers: &[Layer], prefix: &str) -> Vec<Layer> {
    layers
        .iter()
        .filter(|l| !(l.kind == LayerKind::Generative && l.is_synthetic(prefix)))
        .map(|l| {
            let mut kept = l.clone();
            kept.children = strip_synthetic_layers(&l.children, prefix);
            kept
        })
        .collect()
}

fn force_confirm(incoming: &Artifact, current: Option<&Artifact>) -> Resolution {
    let mut artifact = incoming.clone();
    artifact.status = Some(ArtifactStatus::Success);
    artifact.is_confirmed = Some(true);
    artifact.is_transient = false;
    if let Some(cur) = current {
        // back-fill so the forced transition doesn't blank the visual
        if artifact.preview_url.is_none() {
            artifact.preview_url = cur.preview_url.clone();
        }
        if artifact.source_reference.is_none() {
            artifact.source_reference = cur.source_reference.clone();
        }
        if artifact.generation_id.is_none() {
            artifact.generation_id = cur.generation_id;
        }
    }
    Resolution {
        rule: ReconcileRule::MandatoryConfirm,
        artifact,
    }
}

fn synthesis_in_flight(incoming: &Artifact, current: Option<&Artifact>) -> Resolution {
    // flags are carried as-is; the draft guard of the merge rule does not apply
    let mut artifact = current.unwrap_or(incoming).clone();
    artifact.is_synthesizing = true;
    // an Idle base would be reset by the idle rule on the next pass
    if current.is_some_and(|c| c.status == Some(ArtifactStatus::Idle)) {
        artifact.status = incoming.status;
    }
    // a generation has not arrived until synthesis completes
    artifact.preview_url = current.and_then(|c| c.preview_url.clone());
    artifact.generation_id = current.and_then(|c| c.generation_id);
    artifact.source_reference = incoming
        .source_reference
        .clone()
        .or_else(|| current.and_then(|c| c.source_reference.clone()));
    artifact.target_container = incoming
        .target_container
        .clone()
        .or_else(|| current.and_then(|c| c.target_container.clone()));
    artifact.metrics = incoming.metrics.or_else(|| current.and_then(|c| c.metrics));
    artifact.generation_allowed = true;
    Resolution {
        rule: ReconcileRule::SynthesisInFlight,
        artifact,
    }
}

fn preserve_generated(incoming: &Artifact, current: &Artifact) -> Resolution {
    let mut artifact = incoming.clone();
    artifact.preview_url = current.preview_url.clone();
    artifact.generation_id = current.generation_id;
    artifact.is_synthesizing = current.is_synthesizing;
    artifact.is_confirmed = current.is_confirmed;
    artifact.is_transient = current.is_transient;
    artifact.source_reference = current
        .source_reference
        .clone()
        .or_else(|| incoming.source_reference.clone());
    Resolution {
        rule: ReconcileRule::PreserveGenerated,
        artifact,
    }
}

fn default_merge(incoming: &Artifact, current: Option<&Artifact>) -> Resolution {
    let mut artifact = incoming.clone();
    let confirmed = incoming
        .is_confirmed
        .or_else(|| current.and_then(|c| c.is_confirmed))
        .unwrap_or(false);
    // drafts are never confirmed
    artifact.is_confirmed = Some(confirmed && !incoming.is_transient);
    artifact.source_reference = incoming
        .source_reference
        .clone()
        .or_else(|| current.and_then(|c| c.source_reference.clone()));
    artifact.generation_id = incoming
        .generation_id
        .or_else(|| current.and_then(|c| c.generation_id));
    artifact.generation_allowed = true;
    Resolution {
        rule: ReconcileRule::DefaultMerge,
        artifact,
    }
}
