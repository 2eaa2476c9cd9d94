//! Project validation logic.

use crate::schema::{HybridConfig, ProjectFile};
use mx_core::CoreError;
use std::collections::HashSet;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid problem definition: {0}")]
    Problem(#[from] CoreError),

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_project(project: &ProjectFile) -> Result<(), ConfigurationError> {
    if project.version > crate::migrate::LATEST_VERSION {
        return Err(ConfigurationError::UnsupportedVersion {
            version: project.version,
        });
    }

    let mut names = HashSet::new();
    for stream in project.problem.rich.iter().chain(project.problem.lean.iter()) {
        if !names.insert(stream.name.as_str()) {
            return Err(ConfigurationError::DuplicateId {
                id: stream.name.clone(),
                context: "streams".to_string(),
            });
        }
    }

    let streams = project.problem.stream_set()?;
    validate_config(&project.hybrid)?;
    project
        .hybrid
        .superstruct
        .stage_count(&streams, project.hybrid.stages)?;
    Ok(())
}

/// Upper bound on `retry.threshold_steps` and `retry.big_m_steps`.
pub const MAX_RETRY_STEPS: u32 = 1000;

/// Check controller settings on their own, before any solve.
pub fn validate_config(cfg: &HybridConfig) -> Result<(), ConfigurationError> {
    if cfg.max_iter == 0 {
        return Err(invalid("max_iter", cfg.max_iter, "must be at least 1"));
    }
    let f = cfg.cor_filter_size;
    if !(f.is_finite() && f > 0.0 && f <= 1.0) {
        return Err(invalid("cor_filter_size", f, "must lie in (0, 1]"));
    }
    if !(cfg.tol.is_finite() && cfg.tol > 0.0) {
        return Err(invalid("tol", cfg.tol, "must be positive"));
    }
    if cfg.stages == Some(0) {
        return Err(invalid("stages", 0, "must be a positive integer"));
    }
    if cfg.element_schedule.is_empty() {
        return Err(invalid("element_schedule", "[]", "needs at least one element count"));
    }
    if let Some(n) = cfg.element_schedule.iter().find(|n| **n == 0) {
        return Err(invalid("element_schedule", n, "element counts must be positive"));
    }

    let retry = &cfg.retry;
    if !(retry.initial_min_height.is_finite() && retry.initial_min_height > 0.0) {
        return Err(invalid(
            "retry.initial_min_height",
            retry.initial_min_height,
            "must be positive",
        ));
    }
    if !(retry.threshold_shrink.is_finite() && retry.threshold_shrink > 0.0) {
        return Err(invalid(
            "retry.threshold_shrink",
            retry.threshold_shrink,
            "must be positive",
        ));
    }
    if !(retry.big_m_shrink.is_finite() && retry.big_m_shrink > 1.0) {
        return Err(invalid(
            "retry.big_m_shrink",
            retry.big_m_shrink,
            "must be greater than 1",
        ));
    }
    for (field, steps) in [
        ("retry.threshold_steps", retry.threshold_steps),
        ("retry.big_m_steps", retry.big_m_steps),
    ] {
        if steps > MAX_RETRY_STEPS {
            return Err(invalid(field, steps, &format!("must be at most {MAX_RETRY_STEPS}")));
        }
    }
    Ok(())
}
