use std::sync::OnceLock;

use copyart_host::{BuildRecord, ParameterValue};
use regex::Regex;

use crate::context::PickContext;

/// Accepts builds whose parameters match every `NAME=value` pair of a
/// comma separated list. The list is expanded against the step's
/// variables before parsing. A list without pairs accepts nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParametersFilter {
    params_to_match: String,
}

fn pair_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(.*?)=([^,]*)(,|$)").ok())
        .as_ref()
}

/// Boolean reading of a textual parameter value.
fn as_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ParametersFilter {
    pub fn new(params_to_match: impl Into<String>) -> Self {
        Self {
            params_to_match: params_to_match.into(),
        }
    }

    pub fn params_to_match(&self) -> &str {
        &self.params_to_match
    }

    pub(crate) fn pairs(text: &str) -> Vec<(String, String)> {
        let Some(pattern) = pair_pattern() else {
            return Vec::new();
        };
        pattern
            .captures_iter(text)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect()
    }

    pub(crate) fn is_selectable(&self, candidate: &BuildRecord, ctx: &PickContext) -> bool {
        let expanded = ctx.env().expand(&self.params_to_match);
        let pairs = Self::pairs(&expanded);
        if pairs.is_empty() {
            ctx.log_info(format!("Parameters: no NAME=value pairs in {expanded:?}"));
            return false;
        }
        if candidate.parameters.is_empty() {
            ctx.log_debug(format!(
                "Parameters: {} has no parameters",
                candidate.full_display_name()
            ));
            return false;
        }
        for (name, expected) in pairs {
            let matched = match candidate.parameters.get(&name) {
                Some(ParameterValue::Text(actual)) => *actual == expected,
                Some(ParameterValue::Boolean(actual)) => as_bool(&expected) == Some(*actual),
                None => false,
            };
            if !matched {
                ctx.log_debug(format!(
                    "Parameters: {} does not have {name}={expected}",
                    candidate.full_display_name()
                ));
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs() {
        assert_eq!(
            ParametersFilter::pairs("A=x,B=true"),
            vec![("A".into(), "x".into()), ("B".into(), "true".into())]
        );
        assert_eq!(ParametersFilter::pairs("EMPTY="), vec![("EMPTY".into(), "".into())]);
        assert!(ParametersFilter::pairs("").is_empty());
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(as_bool("On"), Some(true));
        assert_eq!(as_bool("0"), Some(false));
        assert_eq!(as_bool("maybe"), None);
    }
}
