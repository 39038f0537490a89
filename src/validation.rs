//! Override Validation - Rule/Policy Separation
//!
//! Rules produce structured violations per override.
//! Policy (the configured failure mode) decides which overrides survive.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::config::FailureMode;
use crate::overrides::Override;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub override_index: usize,
    pub layer_id: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    /// Overrides the policy lets through, in their original order.
    pub accepted: Vec<Override>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }
}

/// What a rule reports about one override
pub struct Finding {
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// Validation rule trait - produces violations for one override
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn check(&self, ov: &Override, artifact: &Artifact) -> Option<Finding>;
}

// --- Concrete Rules ---

pub struct CitedRuleRule;

impl ValidationRule for CitedRuleRule {
    fn name(&self) -> &'static str { "cited_rule" }

    fn check(&self, ov: &Override, _artifact: &Artifact) -> Option<Finding> {
        if ov.cited_rule.trim().is_empty() {
            Some(Finding {
                severity: ViolationSeverity::Error,
                message: "Override does not cite a rule".to_string(),
                expected: Some("non-empty rule reference".to_string()),
                actual: None,
            })
        } else {
            None
        }
    }
}

pub struct ScaleRule;

impl ValidationRule for ScaleRule {
    fn name(&self) -> &'static str { "scale" }

    fn check(&self, ov: &Override, _artifact: &Artifact) -> Option<Finding> {
        let s = ov.individual_scale;
        if !s.is_finite() || s <= 0.0 {
            Some(Finding {
                severity: ViolationSeverity::Error,
                message: "Scale must be a positive finite multiplier".to_string(),
                expected: Some("> 0".to_string()),
                actual: Some(format!("{}", s)),
            })
        } else {
            None
        }
    }
}

pub struct FiniteOffsetRule;

impl ValidationRule for FiniteOffsetRule {
    fn name(&self) -> &'static str { "finite_offset" }

    fn check(&self, ov: &Override, _artifact: &Artifact) -> Option<Finding> {
        let rotation = ov.rotation.unwrap_or(0.0);
        if ov.x_offset.is_finite() && ov.y_offset.is_finite() && rotation.is_finite() {
            return None;
        }
        Some(Finding {
            severity: ViolationSeverity::Error,
            message: "Offsets and rotation must be finite".to_string(),
            expected: None,
            actual: Some(format!("x={} y={} r={}", ov.x_offset, ov.y_offset, rotation)),
        })
    }
}

pub struct TargetLayerRule;

impl ValidationRule for TargetLayerRule {
    fn name(&self) -> &'static str { "target_layer" }

    fn check(&self, ov: &Override, artifact: &Artifact) -> Option<Finding> {
        if artifact.find_layer(&ov.layer_id).is_some() {
            return None;
        }
        Some(Finding {
            severity: ViolationSeverity::Warning,
            message: "Override targets a layer that is not in the tree".to_string(),
            expected: None,
            actual: Some(ov.layer_id.clone()),
        })
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(CitedRuleRule),
                Box::new(ScaleRule),
                Box::new(FiniteOffsetRule),
                Box::new(TargetLayerRule),
            ],
        }
    }

    pub fn validate(&self, overrides: &[Override], artifact: &Artifact, mode: FailureMode) -> ValidationResult {
        let mut violations = vec![];
        let mut accepted = vec![];

        for (index, ov) in overrides.iter().enumerate() {
            let mut errored = false;
            for rule in &self.rules {
                if let Some(finding) = rule.check(ov, artifact) {
                    errored |= finding.severity == ViolationSeverity::Error;
                    violations.push(ValidationViolation {
                        rule: rule.name().to_string(),
                        severity: finding.severity,
                        override_index: index,
                        layer_id: ov.layer_id.clone(),
                        message: finding.message,
                        expected: finding.expected,
                        actual: finding.actual,
                    });
                }
            }
            if !errored {
                accepted.push(ov.clone());
            }
        }

        let has_errors = violations.iter().any(|v| v.severity == ViolationSeverity::Error);

        match mode {
            FailureMode::Block if has_errors => ValidationResult {
                valid: false,
                violations,
                accepted: vec![],
            },
            // Warn/Log never block; erroring overrides are just dropped
            _ => ValidationResult {
                valid: true,
                violations,
                accepted,
            },
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
