//! Artifact Model - Shared Layout State
//!
//! An artifact is what a producer node publishes on one of its output ports:
//! the synthesis status of the producing operation plus the geometric payload
//! (target container, bounds, layer tree). Artifacts are plain values; the
//! store compares them structurally to decide whether a write changed anything.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ProducerId = String;
pub type PortId = String;

fn default_true() -> bool { true }
fn default_one() -> f64 { 1.0 }

/// Address of one artifact in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub producer_id: ProducerId,
    pub port_id: PortId,
}

impl SlotKey {
    pub fn new(producer_id: impl Into<ProducerId>, port_id: impl Into<PortId>) -> Self {
        Self {
            producer_id: producer_id.into(),
            port_id: port_id.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.producer_id, self.port_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Pixel,
    Group,
    Text,
    Shape,
    /// Placeholder whose pixels come from synthesis rather than the source document
    Generative,
}

/// Axis-aligned box in the shared layout coordinate space.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

/// Accumulated corrections applied on top of a layer's source placement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    #[serde(default = "default_one")]
    pub scale_x: f64,
    #[serde(default = "default_one")]
    pub scale_y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// Node of an artifact's layer tree. Children are owned by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_one")]
    pub opacity: f64,
    pub coords: Rect,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub children: Vec<Layer>,
}

impl Layer {
    pub fn new(id: impl Into<String>, kind: LayerKind, coords: Rect) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            visible: true,
            opacity: 1.0,
            coords,
            transform: Transform::default(),
            children: vec![],
        }
    }

    pub fn with_children(mut self, children: Vec<Layer>) -> Self {
        self.children = children;
        self
    }

    pub fn is_synthetic(&self, prefix: &str) -> bool {
        self.id.starts_with(prefix)
    }
}

/// Opaque reference to a rendered visual (URL, data URL, cache key).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PreviewRef(pub String);

impl PreviewRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PreviewRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The transformed payload exchanged between producer and consumer nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ArtifactStatus>,
    #[serde(default)]
    pub is_synthesizing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
    #[serde(default)]
    pub is_transient: bool,
    #[serde(default = "default_true")]
    pub generation_allowed: bool,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub directives: Vec<String>,
    #[serde(default)]
    pub requires_generation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Rect>,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub is_polished: bool,
}

impl Default for Artifact {
    fn default() -> Self {
        Self {
            generation_id: None,
            status: None,
            is_synthesizing: false,
            is_confirmed: None,
            is_transient: false,
            generation_allowed: true,
            is_mandatory: false,
            directives: vec![],
            requires_generation: false,
            preview_url: None,
            source_reference: None,
            target_container: None,
            metrics: None,
            layers: vec![],
            is_polished: false,
        }
    }
}

impl Artifact {
    pub fn confirmed(&self) -> bool {
        self.is_confirmed.unwrap_or(false)
    }

    pub fn has_directive(&self, token: &str) -> bool {
        self.directives.iter().any(|d| d == token)
    }

    /// Depth-first lookup of a layer by id.
    pub fn find_layer(&self, id: &str) -> Option<&Layer> {
        let mut stack: Vec<&Layer> = self.layers.iter().rev().collect();
        while let Some(layer) = stack.pop() {
            if layer.id == id {
                return Some(layer);
            }
            stack.extend(layer.children.iter().rev());
        }
        None
    }

    /// Ids of every layer in the tree, pre-order.
    pub fn layer_ids(&self) -> Vec<&str> {
        let mut ids = vec![];
        let mut stack: Vec<&Layer> = self.layers.iter().rev().collect();
        while let Some(layer) = stack.pop() {
            ids.push(layer.id.as_str());
            stack.extend(layer.children.iter().rev());
        }
        ids
    }
}

/// Partial update sent by a producer that only knows some fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPatch {
    #[serde(default)]
    pub generation_id: Option<u64>,
    #[serde(default)]
    pub status: Option<ArtifactStatus>,
    #[serde(default)]
    pub is_synthesizing: Option<bool>,
    #[serde(default)]
    pub is_confirmed: Option<bool>,
    #[serde(default)]
    pub is_transient: Option<bool>,
    #[serde(default)]
    pub generation_allowed: Option<bool>,
    #[serde(default)]
    pub is_mandatory: Option<bool>,
    #[serde(default)]
    pub directives: Option<Vec<String>>,
    #[serde(default)]
    pub requires_generation: Option<bool>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub source_reference: Option<String>,
    #[serde(default)]
    pub target_container: Option<String>,
    #[serde(default)]
    pub metrics: Option<Rect>,
    #[serde(default)]
    pub layers: Option<Vec<Layer>>,
}

impl ArtifactPatch {
    /// Whether the patch carries enough to stand in for a whole artifact
    /// when nothing is stored yet.
    pub fn is_identifying(&self) -> bool {
        self.status.is_some() || self.target_container.is_some()
    }

    /// Overlay the present fields onto `base`.
    pub fn apply_to(&self, base: &Artifact) -> Artifact {
        let mut out = base.clone();
        if let Some(v) = self.generation_id {
            out.generation_id = Some(v);
        }
        if let Some(v) = self.status {
            out.status = Some(v);
        }
        if let Some(v) = self.is_synthesizing {
            out.is_synthesizing = v;
        }
        if let Some(v) = self.is_confirmed {
            out.is_confirmed = Some(v);
        }
        if let Some(v) = self.is_transient {
            out.is_transient = v;
        }
        if let Some(v) = self.generation_allowed {
            out.generation_allowed = v;
        }
        if let Some(v) = self.is_mandatory {
            out.is_mandatory = v;
        }
        if let Some(v) = &self.directives {
            out.directives = v.clone();
        }
        if let Some(v) = self.requires_generation {
            out.requires_generation = v;
        }
        if let Some(v) = &self.preview_url {
            out.preview_url = Some(v.clone());
        }
        if let Some(v) = &self.source_reference {
            out.source_reference = Some(v.clone());
        }
        if let Some(v) = &self.target_container {
            out.target_container = Some(v.clone());
        }
        if let Some(v) = self.metrics {
            out.metrics = Some(v);
        }
        if let Some(v) = &self.layers {
            out.layers = v.clone();
        }
        out
    }

    pub fn into_artifact(self) -> Artifact {
        self.apply_to(&Artifact::default())
    }
}
