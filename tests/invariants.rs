//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::cell::Cell;
use std::rc::Rc;

use layerforge_core::{
    apply_overrides, reconcile,
    store::MetadataKind,
    Artifact, ArtifactStatus, Interest, Layer, LayerKind, Override, PipelineStore, Rect, SlotKey,
};
use serde_json::json;

fn slot() -> SlotKey {
    SlotKey::new("layout-7", "out")
}

/// What a store holds after a first write of `a`.
fn stored(a: Artifact) -> Artifact {
    reconcile(&a, None)
}

fn generated(gen: u64, preview: &str) -> Artifact {
    stored(Artifact {
        generation_id: Some(gen),
        status: Some(ArtifactStatus::Success),
        preview_url: Some(preview.to_string()),
        source_reference: Some("doc.psd".into()),
        target_container: Some("hero".into()),
        metrics: Some(Rect::new(0.0, 0.0, 1080.0, 1080.0)),
        layers: vec![Layer::new("0.1", LayerKind::Pixel, Rect::new(0.0, 0.0, 100.0, 100.0))],
        ..Artifact::default()
    })
}

fn assert_fixed_point(incoming: &Artifact, current: &Artifact) {
    let once = reconcile(incoming, Some(current));
    let twice = reconcile(&once, Some(&once));
    assert_eq!(twice, once);
}

#[test]
fn invariant_reconcile_is_idempotent() {
    let current = generated(2, "A");

    // generation disallowed
    assert_fixed_point(
        &Artifact {
            generation_allowed: false,
            preview_url: Some("X".into()),
            layers: vec![Layer::new("gen-1", LayerKind::Generative, Rect::default())],
            ..Artifact::default()
        },
        &current,
    );
    // mandatory fill
    assert_fixed_point(
        &Artifact {
            is_mandatory: true,
            requires_generation: true,
            ..Artifact::default()
        },
        &current,
    );
    // stale
    assert_fixed_point(&generated(1, "OLD"), &current);
    // idle
    assert_fixed_point(
        &Artifact {
            status: Some(ArtifactStatus::Idle),
            preview_url: Some("X".into()),
            ..Artifact::default()
        },
        &current,
    );
    // synthesizing
    assert_fixed_point(
        &Artifact {
            generation_id: Some(3),
            status: Some(ArtifactStatus::Loading),
            is_synthesizing: true,
            ..Artifact::default()
        },
        &current,
    );
    // synthesizing over an idle slot
    let idle = stored(Artifact {
        status: Some(ArtifactStatus::Idle),
        ..Artifact::default()
    });
    assert_fixed_point(
        &Artifact {
            generation_id: Some(1),
            status: Some(ArtifactStatus::Loading),
            is_synthesizing: true,
            ..Artifact::default()
        },
        &idle,
    );
    // layout-only update
    assert_fixed_point(
        &Artifact {
            status: Some(ArtifactStatus::Success),
            metrics: Some(Rect::new(0.0, 0.0, 1200.0, 630.0)),
            ..Artifact::default()
        },
        &current,
    );
    // draft merge
    assert_fixed_point(
        &Artifact {
            generation_id: Some(3),
            status: Some(ArtifactStatus::Success),
            is_transient: true,
            is_confirmed: Some(true),
            ..Artifact::default()
        },
        &current,
    );
}

#[test]
fn invariant_older_generation_never_regresses() {
    let current = generated(5, "NEW");
    let older = [
        generated(4, "OLD"),
        Artifact {
            generation_id: Some(0),
            status: Some(ArtifactStatus::Idle),
            ..Artifact::default()
        },
        Artifact {
            generation_id: Some(3),
            is_synthesizing: true,
            status: Some(ArtifactStatus::Loading),
            ..Artifact::default()
        },
    ];

    for incoming in &older {
        assert_eq!(reconcile(incoming, Some(&current)), current);
    }
}

#[test]
fn invariant_disallowed_generation_drops_synthetic_layers() {
    let incoming = Artifact {
        generation_allowed: false,
        layers: vec![
            Layer::new("0.1", LayerKind::Pixel, Rect::new(0.0, 0.0, 10.0, 10.0)),
            Layer::new("0.2", LayerKind::Generative, Rect::new(10.0, 0.0, 10.0, 10.0)),
            Layer::new("gen-layer-7", LayerKind::Generative, Rect::new(20.0, 0.0, 10.0, 10.0)),
        ],
        ..Artifact::default()
    };

    let mut store = PipelineStore::default();
    store.write(&slot(), &incoming);
    let result = store.read(&slot()).unwrap();

    assert_eq!(result.layer_ids(), vec!["0.1", "0.2"]);
    assert_eq!(result.find_layer("0.2").unwrap().kind, LayerKind::Generative);
    assert_eq!(result.preview_url, None);
}

#[test]
fn invariant_layout_update_keeps_preview() {
    let current = generated(3, "A");
    let incoming = Artifact {
        status: Some(ArtifactStatus::Success),
        layers: vec![Layer::new("0.1", LayerKind::Pixel, Rect::new(5.0, 5.0, 90.0, 90.0))],
        ..Artifact::default()
    };

    let result = reconcile(&incoming, Some(&current));
    assert_eq!(result.preview_url, current.preview_url);
    assert_eq!(result.layers, incoming.layers);
}

#[test]
fn invariant_same_write_publishes_once() {
    let mut store = PipelineStore::default();
    let notified = Rc::new(Cell::new(0));
    let counter = Rc::clone(&notified);
    store.subscribe_artifacts(Interest::Slot(slot()), move |_| counter.set(counter.get() + 1));

    let a = generated(1, "A");
    store.write(&slot(), &a);
    store.write(&slot(), &a);

    assert_eq!(notified.get(), 1);
    assert_eq!(store.artifacts().revision(), 1);
}

#[test]
fn scenario_late_older_generation_is_discarded() {
    let mut store = PipelineStore::default();
    let writes = [
        Artifact {
            generation_id: Some(1),
            is_synthesizing: true,
            status: Some(ArtifactStatus::Loading),
            ..Artifact::default()
        },
        Artifact {
            generation_id: Some(1),
            is_synthesizing: false,
            status: Some(ArtifactStatus::Success),
            preview_url: Some("A".into()),
            ..Artifact::default()
        },
        Artifact {
            generation_id: Some(0),
            status: Some(ArtifactStatus::Success),
            preview_url: Some("OLD".into()),
            ..Artifact::default()
        },
    ];
    for w in &writes {
        store.write(&slot(), w);
    }

    let result = store.read(&slot()).unwrap();
    assert_eq!(result.preview_url.as_deref(), Some("A"));
    assert_eq!(result.generation_id, Some(1));
}

#[test]
fn scenario_override_moves_and_scales_layer() {
    let artifact = Artifact {
        layers: vec![Layer::new("0.1", LayerKind::Pixel, Rect::new(10.0, 10.0, 100.0, 50.0))],
        ..Artifact::default()
    };
    let o = Override {
        x_offset: 5.0,
        y_offset: -5.0,
        individual_scale: 0.9,
        ..Override::new("0.1", "breathing-room")
    };

    let out = apply_overrides(&artifact, &[o]);
    assert_eq!(out.layers[0].coords, Rect::new(15.0, 5.0, 90.0, 45.0));
}

#[test]
fn scenario_remove_producer_purges_all_registries() {
    let mut store = PipelineStore::default();
    store.write(&slot(), &generated(1, "A"));
    store.write(&SlotKey::new("layout-7", "mask"), &generated(1, "M"));
    store.write_polished(&slot(), &generated(1, "A"));
    store.set_metadata(MetadataKind::Analysis, "layout-7", json!({"grid": 12}));
    store.write(&SlotKey::new("other", "out"), &generated(1, "B"));

    let before = store.version();
    let report = store.remove_producer("layout-7");

    assert_eq!(report.artifacts, 2);
    assert_eq!(report.polished, 1);
    assert_eq!(report.previews, 0);
    assert_eq!(report.metadata, 1);
    assert_eq!(store.version(), before + 1);
    assert!(!store.artifacts().contains_producer("layout-7"));
    assert!(!store.polished().contains_producer("layout-7"));
    assert!(!store.previews().contains_producer("layout-7"));
    assert!(store.metadata(MetadataKind::Analysis, "layout-7").is_none());
    // other producers untouched
    assert!(store.read(&SlotKey::new("other", "out")).is_some());
}
