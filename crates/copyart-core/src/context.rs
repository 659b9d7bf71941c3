//! Execution state shared by build selection and copying.

use std::fmt;
use std::sync::Arc;

use copyart_host::{BuildRecord, Host};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::codec::CodecRegistry;
use crate::env::EnvVars;
use crate::filter::Filter;
use crate::settings::CopySettings;
use crate::selector::SelectorProgress;

/// State common to every phase of a copy step: the host, the build running
/// the step, its variables and logging switches.
///
/// Cloning shares the host, settings, codecs and cancel flag, and copies
/// the variables.
#[derive(Clone)]
pub struct StepContext {
    host: Arc<dyn Host>,
    copier: BuildRecord,
    env: EnvVars,
    verbose: bool,
    settings: Arc<CopySettings>,
    codecs: Arc<CodecRegistry>,
    cancel: CancelToken,
}

impl StepContext {
    pub fn new(host: Arc<dyn Host>, copier: BuildRecord, env: EnvVars) -> Self {
        let settings = Arc::new(CopySettings::from_env());
        Self {
            host,
            copier,
            env,
            verbose: settings.verbose,
            settings,
            codecs: Arc::new(CodecRegistry::standard()),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: CopySettings) -> Self {
        self.verbose = self.verbose || settings.verbose;
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn copier(&self) -> &BuildRecord {
        &self.copier
    }

    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut EnvVars {
        &mut self.env
    }

    pub fn settings(&self) -> &CopySettings {
        &self.settings
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Detail message, shown at info level when the step is verbose.
    pub fn log_debug(&self, message: impl AsRef<str>) {
        if self.verbose {
            info!(copier = %self.copier.full_display_name(), "{}", message.as_ref());
        } else {
            debug!(copier = %self.copier.full_display_name(), "{}", message.as_ref());
        }
    }

    pub fn log_info(&self, message: impl AsRef<str>) {
        info!(copier = %self.copier.full_display_name(), "{}", message.as_ref());
    }

    pub fn log_exception(&self, message: impl AsRef<str>, error: &dyn std::error::Error) {
        warn!(
            copier = %self.copier.full_display_name(),
            error = %error,
            "{}",
            message.as_ref()
        );
    }
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("copier", &self.copier.build_ref())
            .field("env", &self.env)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// State of one build selection pass.
///
/// `last_match` holds the most recently enumerated candidate so stateful
/// selectors can resume after it. `Clone` yields an independent context for
/// nested attempts.
#[derive(Clone, Debug)]
pub struct PickContext {
    step: StepContext,
    filter: Filter,
    last_match: Option<BuildRecord>,
    progress: Option<SelectorProgress>,
}

impl PickContext {
    pub fn new(step: StepContext) -> Self {
        Self {
            step,
            filter: Filter::None,
            last_match: None,
            progress: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn step(&self) -> &StepContext {
        &self.step
    }

    pub fn host(&self) -> &dyn Host {
        self.step.host()
    }

    pub fn copier(&self) -> &BuildRecord {
        self.step.copier()
    }

    pub fn env(&self) -> &EnvVars {
        self.step.env()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub fn last_match(&self) -> Option<&BuildRecord> {
        self.last_match.as_ref()
    }

    pub fn set_last_match(&mut self, build: Option<BuildRecord>) {
        self.last_match = build;
    }

    pub(crate) fn progress_mut(&mut self) -> &mut Option<SelectorProgress> {
        &mut self.progress
    }

    /// Forget selector progress and the last match.
    pub fn reset(&mut self) {
        self.last_match = None;
        self.progress = None;
    }

    pub fn log_debug(&self, message: impl AsRef<str>) {
        self.step.log_debug(message);
    }

    pub fn log_info(&self, message: impl AsRef<str>) {
        self.step.log_info(message);
    }
}
