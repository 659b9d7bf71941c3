//! Textual form of filters and selectors.
//!
//! Every value is a JSON object with exactly one key, the variant tag,
//! mapped to an object of fields:
//!
//! ```json
//! {"And": {"filters": [{"Saved": {}}, {"Not": {"filter": {"None": {}}}}]}}
//! ```
//!
//! Tags are looked up in a [`CodecRegistry`] built once and passed to
//! whoever decodes. Blank text decodes to "nothing specified".

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::{CopyError, Result};
use crate::filter::{DownstreamFilter, Filter, ParametersFilter};
use crate::selector::{FallbackEntry, Permalink, Selector, TriggeringSelector};
use crate::settings::UpstreamStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    None,
    And,
    Or,
    Not,
    Saved,
    Downstream,
    Parameters,
    Parameterized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorKind {
    LastCompleted,
    Status,
    LastWithArtifacts,
    Saved,
    Specific,
    Permalink,
    Parameterized,
    Fallback,
    Triggering,
}

/// Tag tables for filters and selectors.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    filters: BTreeMap<String, FilterKind>,
    selectors: BTreeMap<String, SelectorKind>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CodecRegistry {
    /// Registry of every built-in filter and selector. Tags also match in
    /// lower case.
    pub fn standard() -> Self {
        let filters = [
            ("None", FilterKind::None),
            ("And", FilterKind::And),
            ("Or", FilterKind::Or),
            ("Not", FilterKind::Not),
            ("Saved", FilterKind::Saved),
            ("Downstream", FilterKind::Downstream),
            ("Parameters", FilterKind::Parameters),
            ("Parameterized", FilterKind::Parameterized),
        ];
        let selectors = [
            ("LastCompleted", SelectorKind::LastCompleted),
            ("Status", SelectorKind::Status),
            ("LastWithArtifacts", SelectorKind::LastWithArtifacts),
            ("Saved", SelectorKind::Saved),
            ("Specific", SelectorKind::Specific),
            ("Permalink", SelectorKind::Permalink),
            ("Parameterized", SelectorKind::Parameterized),
            ("Fallback", SelectorKind::Fallback),
            ("Triggering", SelectorKind::Triggering),
        ];
        let with_aliases = |tag: &str| [tag.to_string(), tag.to_ascii_lowercase()];
        Self {
            filters: filters
                .into_iter()
                .flat_map(|(tag, kind)| with_aliases(tag).map(|alias| (alias, kind)))
                .collect(),
            selectors: selectors
                .into_iter()
                .flat_map(|(tag, kind)| with_aliases(tag).map(|alias| (alias, kind)))
                .collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    pub fn encode_filter(&self, filter: &Filter) -> String {
        filter_to_value(filter).to_string()
    }

    /// `Ok(None)` for blank text.
    pub fn decode_filter(&self, text: &str) -> Result<Option<Filter>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value: Value =
            serde_json::from_str(text).map_err(|e| CopyError::InvalidFilter(e.to_string()))?;
        self.filter_from_value(&value).map(Some)
    }

    pub fn filter_from_value(&self, value: &Value) -> Result<Filter> {
        let invalid = CopyError::InvalidFilter;
        let (tag, body) = tagged(value).ok_or_else(|| {
            invalid(format!("expected an object with a single type tag, got {value}"))
        })?;
        let kind = self
            .filters
            .get(tag)
            .ok_or_else(|| invalid(format!("unknown filter type {tag:?}")))?;
        let filter = match kind {
            FilterKind::None => Filter::None,
            FilterKind::And => Filter::And(self.filter_list(tag, body)?),
            FilterKind::Or => Filter::Or(self.filter_list(tag, body)?),
            FilterKind::Not => {
                let inner = body
                    .get("filter")
                    .ok_or_else(|| invalid(format!("{tag}: missing \"filter\"")))?;
                Filter::not(self.filter_from_value(inner)?)
            }
            FilterKind::Saved => Filter::Saved,
            FilterKind::Downstream => Filter::Downstream(DownstreamFilter::new(
                text_field(body, "upstream_project_name"),
                text_field(body, "upstream_build_number"),
            )),
            FilterKind::Parameters => {
                Filter::Parameters(ParametersFilter::new(text_field(body, "params_to_match")))
            }
            FilterKind::Parameterized => Filter::Parameterized {
                parameter: text_field(body, "parameter"),
            },
        };
        Ok(filter)
    }

    fn filter_list(&self, tag: &str, body: &Map<String, Value>) -> Result<Vec<Filter>> {
        body.get("filters")
            .and_then(Value::as_array)
            .ok_or_else(|| CopyError::InvalidFilter(format!("{tag}: missing \"filters\" list")))?
            .iter()
            .map(|value| self.filter_from_value(value))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Selectors
    // -----------------------------------------------------------------------

    pub fn encode_selector(&self, selector: &Selector) -> String {
        selector_to_value(selector).to_string()
    }

    /// `Ok(None)` for blank text.
    pub fn decode_selector(&self, text: &str) -> Result<Option<Selector>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value: Value =
            serde_json::from_str(text).map_err(|e| CopyError::InvalidSelector(e.to_string()))?;
        self.selector_from_value(&value).map(Some)
    }

    pub fn selector_from_value(&self, value: &Value) -> Result<Selector> {
        let invalid = CopyError::InvalidSelector;
        let (tag, body) = tagged(value).ok_or_else(|| {
            invalid(format!("expected an object with a single type tag, got {value}"))
        })?;
        let kind = self
            .selectors
            .get(tag)
            .ok_or_else(|| invalid(format!("unknown selector type {tag:?}")))?;
        let selector = match kind {
            SelectorKind::LastCompleted => Selector::LastCompleted,
            SelectorKind::Status => Selector::Status {
                stable_only: bool_field(body, "stable_only", true),
            },
            SelectorKind::LastWithArtifacts => Selector::LastWithArtifacts,
            SelectorKind::Saved => Selector::Saved,
            SelectorKind::Specific => Selector::Specific {
                build_number: text_field(body, "build_number"),
            },
            SelectorKind::Permalink => {
                let id = text_field(body, "id");
                Selector::Permalink(id.parse::<Permalink>().map_err(invalid)?)
            }
            SelectorKind::Parameterized => Selector::Parameterized {
                parameter_name: text_field(body, "parameter_name"),
            },
            SelectorKind::Fallback => {
                let entries = body
                    .get("entries")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid(format!("{tag}: missing \"entries\" list")))?;
                let entries = entries
                    .iter()
                    .map(|entry| self.fallback_entry(tag, entry))
                    .collect::<Result<Vec<_>>>()?;
                Selector::Fallback(entries)
            }
            SelectorKind::Triggering => {
                let strategy = match body.get("upstream_strategy").and_then(Value::as_str) {
                    Some(text) => text.parse::<UpstreamStrategy>().map_err(invalid)?,
                    None => UpstreamStrategy::UseGlobalSetting,
                };
                Selector::Triggering(TriggeringSelector::new(
                    strategy,
                    bool_field(body, "allow_upstream_dependencies", false),
                ))
            }
        };
        Ok(selector)
    }

    fn fallback_entry(&self, tag: &str, entry: &Value) -> Result<FallbackEntry> {
        let selector = entry.get("selector").ok_or_else(|| {
            CopyError::InvalidSelector(format!("{tag}: entry without \"selector\""))
        })?;
        let filter = match entry.get("filter") {
            None | Some(Value::Null) => Filter::None,
            Some(value) => self.filter_from_value(value)?,
        };
        Ok(FallbackEntry::new(self.selector_from_value(selector)?, filter))
    }
}

fn tagged(value: &Value) -> Option<(&str, &Map<String, Value>)> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    let (tag, body) = object.iter().next()?;
    match body {
        Value::Object(fields) => Some((tag.as_str(), fields)),
        Value::Null => Some((tag.as_str(), EMPTY.get_or_init(Map::new))),
        _ => None,
    }
}

fn text_field(body: &Map<String, Value>, name: &str) -> String {
    match body.get(name) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn bool_field(body: &Map<String, Value>, name: &str, default: bool) -> bool {
    body.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn filter_to_value(filter: &Filter) -> Value {
    match filter {
        Filter::None => json!({"None": {}}),
        Filter::And(filters) => {
            json!({"And": {"filters": filters.iter().map(filter_to_value).collect::<Vec<_>>()}})
        }
        Filter::Or(filters) => {
            json!({"Or": {"filters": filters.iter().map(filter_to_value).collect::<Vec<_>>()}})
        }
        Filter::Not(inner) => json!({"Not": {"filter": filter_to_value(inner)}}),
        Filter::Saved => json!({"Saved": {}}),
        Filter::Downstream(downstream) => json!({"Downstream": {
            "upstream_project_name": downstream.upstream_project_name(),
            "upstream_build_number": downstream.upstream_build_number(),
        }}),
        Filter::Parameters(parameters) => {
            json!({"Parameters": {"params_to_match": parameters.params_to_match()}})
        }
        Filter::Parameterized { parameter } => {
            json!({"Parameterized": {"parameter": parameter}})
        }
    }
}

fn selector_to_value(selector: &Selector) -> Value {
    match selector {
        Selector::LastCompleted => json!({"LastCompleted": {}}),
        Selector::Status { stable_only } => json!({"Status": {"stable_only": stable_only}}),
        Selector::LastWithArtifacts => json!({"LastWithArtifacts": {}}),
        Selector::Saved => json!({"Saved": {}}),
        Selector::Specific { build_number } => {
            json!({"Specific": {"build_number": build_number}})
        }
        Selector::Permalink(permalink) => json!({"Permalink": {"id": permalink.id()}}),
        Selector::Parameterized { parameter_name } => {
            json!({"Parameterized": {"parameter_name": parameter_name}})
        }
        Selector::Fallback(entries) => {
            let entries: Vec<Value> = entries
                .iter()
                .map(|entry| {
                    json!({
                        "selector": selector_to_value(&entry.selector),
                        "filter": filter_to_value(&entry.filter),
                    })
                })
                .collect();
            json!({"Fallback": {"entries": entries}})
        }
        Selector::Triggering(triggering) => json!({"Triggering": {
            "upstream_strategy": triggering.upstream_strategy.to_string(),
            "allow_upstream_dependencies": triggering.allow_upstream_dependencies,
        }}),
    }
}
