//! Structured observability hooks for copy step lifecycle events.
//!
//! This module provides:
//! - Step-scoped tracing spans via the `StepSpan` RAII guard
//! - Emission functions for build selection, copy completion and fingerprints

use tracing::info;

/// RAII guard that enters a span for the duration of one copy step.
///
/// ```ignore
/// let _span = StepSpan::enter("downstream #4");
/// ```
pub struct StepSpan {
    _span: tracing::span::EnteredSpan,
}

impl StepSpan {
    pub fn enter(copier: &str) -> Self {
        let span = tracing::info_span!("copyart.step", copier = %copier);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a source build was selected.
pub fn emit_build_selected(project: &str, number: u32) {
    info!(event = "build.selected", project = %project, number = number);
}

/// Emit event: no build satisfied the selector and filter.
pub fn emit_build_not_found(project: &str, selector: &str) {
    tracing::warn!(event = "build.not_found", project = %project, selector = %selector);
}

/// Emit event: a copy pass finished.
pub fn emit_copy_finished(source: &str, files: usize, copied: bool) {
    info!(event = "copy.finished", source = %source, files = files, copied = copied);
}

/// Emit event: fingerprint actions were attached to a build.
pub fn emit_fingerprints_recorded(build: &str, count: usize) {
    info!(event = "fingerprint.recorded", build = %build, count = count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_span_create() {
        let _span = StepSpan::enter("app #1");
        emit_build_selected("app", 1);
    }
}
