//! Layer Overrides - Reviewer Corrections
//!
//! A reviewer emits per-layer corrections, each citing the rule that
//! justifies it. Applying them is a functional update: the input artifact is
//! untouched and a new layer tree is returned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::artifact::{Artifact, Layer};

fn default_scale() -> f64 { 1.0 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    pub layer_id: String,
    #[serde(default)]
    pub x_offset: f64,
    #[serde(default)]
    pub y_offset: f64,
    #[serde(default = "default_scale")]
    pub individual_scale: f64,
    #[serde(default)]
    pub rotation: Option<f64>,
    pub cited_rule: String,
}

impl Override {
    pub fn new(layer_id: impl Into<String>, cited_rule: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            x_offset: 0.0,
            y_offset: 0.0,
            individual_scale: 1.0,
            rotation: None,
            cited_rule: cited_rule.into(),
        }
    }

    fn apply(&self, layer: &mut Layer) {
        layer.coords.x += self.x_offset;
        layer.coords.y += self.y_offset;
        layer.coords.w *= self.individual_scale;
        layer.coords.h *= self.individual_scale;

        let t = &mut layer.transform;
        t.offset_x += self.x_offset;
        t.offset_y += self.y_offset;
        t.scale_x *= self.individual_scale;
        t.scale_y *= self.individual_scale;
        if let Some(r) = self.rotation {
            t.rotation += r;
        }
    }
}

/// Apply overrides to every layer they address, at any depth. Several
/// overrides for one layer compose in the order given.
pub fn apply_overrides(artifact: &Artifact, overrides: &[Override]) -> Artifact {
    let mut by_layer: HashMap<&str, Vec<&Override>> = HashMap::new();
    for o in overrides {
        by_layer.entry(o.layer_id.as_str()).or_default().push(o);
    }

    let mut out = artifact.clone();
    out.layers = transform_layers(&artifact.layers, &by_layer);
    out
}

fn transform_layers(layers: &[Layer], by_layer: &HashMap<&str, Vec<&Override>>) -> Vec<Layer> {
    layers
        .iter()
        .map(|layer| {
            let mut next = Layer {
                children: transform_layers(&layer.children, by_layer),
                ..layer.clone()
            };
            if let Some(list) = by_layer.get(layer.id.as_str()) {
                for o in list {
                    o.apply(&mut next);
                }
            }
            next
        })
        .collect()
}
