//! Build filters
//!
//! A filter is a predicate over candidate builds, evaluated after a
//! selector proposes a candidate. Filters compose with `And`, `Or` and
//! `Not`. `Filter::None` is the "no filter" sentinel: it accepts every
//! build, and is recognised by identity so that combinators can tell it
//! apart from user filters that happen to accept everything.

mod downstream;
mod parameters;

pub use downstream::DownstreamFilter;
pub use parameters::ParametersFilter;

use copyart_host::BuildRecord;

use crate::context::PickContext;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    /// No filter.
    #[default]
    None,
    /// Accepts when every member accepts. Empty accepts.
    And(Vec<Filter>),
    /// Accepts when some member accepts. Empty declines.
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Accepts builds marked keep-forever.
    Saved,
    /// Accepts builds downstream of a given upstream build.
    Downstream(DownstreamFilter),
    /// Accepts builds whose parameters match `NAME=value` pairs.
    Parameters(ParametersFilter),
    /// Decodes a filter from an expanded variable reference at evaluation
    /// time. A blank expansion accepts everything.
    Parameterized { parameter: String },
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn downstream(project: impl Into<String>, build: impl Into<String>) -> Self {
        Filter::Downstream(DownstreamFilter::new(project, build))
    }

    pub fn parameters(pairs: impl Into<String>) -> Self {
        Filter::Parameters(ParametersFilter::new(pairs))
    }

    pub fn parameterized(parameter: impl Into<String>) -> Self {
        Filter::Parameterized {
            parameter: parameter.into(),
        }
    }

    /// True only for the `None` sentinel.
    pub fn is_none(&self) -> bool {
        matches!(self, Filter::None)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Filter::None => "No Filter",
            Filter::And(_) => "And",
            Filter::Or(_) => "Or",
            Filter::Not(_) => "Not",
            Filter::Saved => "Saved Builds",
            Filter::Downstream(_) => "Downstream of",
            Filter::Parameters(_) => "Parameters",
            Filter::Parameterized { .. } => "Specified by a build parameter",
        }
    }

    /// Whether `candidate` is acceptable.
    ///
    /// Only a malformed parameterized filter fails; every other negative
    /// outcome is `Ok(false)`.
    pub fn is_selectable(&self, candidate: &BuildRecord, ctx: &PickContext) -> Result<bool> {
        match self {
            Filter::None => Ok(true),
            Filter::And(filters) => {
                for filter in filters {
                    if !filter.is_selectable(candidate, ctx)? {
                        ctx.log_debug(format!(
                            "{}: declined by the filter {} (in {})",
                            candidate.full_display_name(),
                            filter.display_name(),
                            self.display_name()
                        ));
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(filters) => {
                for filter in filters {
                    if filter.is_selectable(candidate, ctx)? {
                        ctx.log_debug(format!(
                            "{}: accepted by the filter {} (in {})",
                            candidate.full_display_name(),
                            filter.display_name(),
                            self.display_name()
                        ));
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(filter) => {
                let result = filter.is_selectable(candidate, ctx)?;
                ctx.log_debug(format!(
                    "{}: result of {} is reverted: {} -> {}",
                    candidate.full_display_name(),
                    filter.display_name(),
                    result,
                    !result
                ));
                Ok(!result)
            }
            Filter::Saved => Ok(candidate.keep_forever),
            Filter::Downstream(filter) => Ok(filter.is_selectable(candidate, ctx)),
            Filter::Parameters(filter) => Ok(filter.is_selectable(candidate, ctx)),
            Filter::Parameterized { parameter } => {
                let text = ctx.env().expand(parameter);
                ctx.log_debug(format!("{}: expanded filter: {text}", self.display_name()));
                match ctx.step().codecs().decode_filter(&text)? {
                    None => {
                        ctx.log_debug(format!(
                            "{}: no filter specified, accepting every build",
                            self.display_name()
                        ));
                        Ok(true)
                    }
                    Some(filter) => filter.is_selectable(candidate, ctx),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use copyart_host::MemoryHost;

    use super::*;
    use crate::context::StepContext;
    use crate::env::EnvVars;

    fn ctx(env: EnvVars) -> PickContext {
        let host = Arc::new(MemoryHost::new());
        PickContext::new(StepContext::new(host, BuildRecord::new("copier", 1), env))
    }

    fn build() -> BuildRecord {
        BuildRecord::new("app", 3)
    }

    #[test]
    fn test_empty_combinators() {
        let ctx = ctx(EnvVars::new());
        assert!(Filter::and([]).is_selectable(&build(), &ctx).unwrap());
        assert!(!Filter::or([]).is_selectable(&build(), &ctx).unwrap());
    }

    #[test]
    fn test_not_inverts() {
        let ctx = ctx(EnvVars::new());
        let saved = build().kept_forever();
        assert!(!Filter::not(Filter::Saved).is_selectable(&saved, &ctx).unwrap());
        assert!(Filter::not(Filter::Saved).is_selectable(&build(), &ctx).unwrap());
    }

    #[test]
    fn test_none_is_identified_by_kind() {
        assert!(Filter::None.is_none());
        assert!(!Filter::and([]).is_none());
        assert!(!Filter::not(Filter::not(Filter::None)).is_none());
    }

    #[test]
    fn test_parameterized_blank_accepts() {
        let ctx = ctx(EnvVars::new().with("F", "  "));
        assert!(Filter::parameterized("${F}")
            .is_selectable(&build(), &ctx)
            .unwrap());
    }

    #[test]
    fn test_parameterized_delegates() {
        let ctx = ctx(EnvVars::new().with("F", r#"{"Saved": {}}"#));
        let filter = Filter::parameterized("$F");
        assert!(!filter.is_selectable(&build(), &ctx).unwrap());
        assert!(filter
            .is_selectable(&build().kept_forever(), &ctx)
            .unwrap());
    }

    #[test]
    fn test_parameterized_keeps_padding_until_evaluation() {
        let filter = Filter::parameterized(" $F ");
        assert_eq!(
            filter,
            Filter::Parameterized {
                parameter: " $F ".into()
            }
        );
        let ctx = ctx(EnvVars::new().with("F", r#"{"Saved": {}}"#));
        assert!(filter
            .is_selectable(&build().kept_forever(), &ctx)
            .unwrap());
        assert!(!filter.is_selectable(&build(), &ctx).unwrap());
    }

    #[test]
    fn test_parameterized_malformed_fails() {
        let ctx = ctx(EnvVars::new().with("F", "<not a filter>"));
        let err = Filter::parameterized("$F")
            .is_selectable(&build(), &ctx)
            .unwrap_err();
        assert!(matches!(err, crate::CopyError::InvalidFilter(_)));
    }
}
