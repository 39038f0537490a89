//! LayerForge Core - Layout Pipeline Store
//!
//! # The Five Laws (Non-Negotiable)
//! 1. Every Write Is Reconciled
//! 2. Older Generations Never Win
//! 3. Disallowed Generation Leaves No Synthetic Content
//! 4. Unchanged State Is Never Re-Published
//! 5. Removing A Producer Always Moves The Version

pub mod artifact;
pub mod reconcile;
pub mod overrides;
pub mod registry;
pub mod store;
pub mod session;
pub mod validation;
pub mod hashing;
pub mod config;
pub mod pipeline;
pub mod script;

pub use artifact::{Artifact, ArtifactPatch, ArtifactStatus, Layer, LayerKind, PreviewRef, Rect, SlotKey, Transform};
pub use reconcile::{reconcile, ReconcilePolicy, ReconcileRule, Reconciler, Resolution};
pub use overrides::{apply_overrides, Override};
pub use registry::{Interest, Registry, ScalarRegistry, SlotChange, SubscriptionId};
pub use store::{MetadataKind, PipelineStore, RemovalReport, WriteOutcome};
pub use session::{Session, SessionError};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use hashing::{artifact_fingerprint, canonical_json, compute_review_hash};
pub use config::{ConfigError, EngineConfig, FailureMode};
pub use pipeline::{ReviewPipeline, ReviewOutcome, ReviewRequest, ReviewError, PolicySupplier, VisualComposer};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_CONFIG_VERSION: &str = "1.0.0";
