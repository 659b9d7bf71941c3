use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Variables visible to a copy step, used to expand `$NAME` and `${NAME}`
/// references in user-supplied strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvVars(BTreeMap<String, String>);

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Replace variable references in `input`. Unknown variables are left
    /// as written.
    pub fn expand(&self, input: &str) -> String {
        if !input.contains('$') {
            return input.to_string();
        }
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            if let Some(body) = after.strip_prefix('{') {
                if let Some(end) = body.find('}') {
                    let name = &body[..end];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[pos..pos + end + 3]),
                    }
                    rest = &body[end + 1..];
                    continue;
                }
            } else {
                let len = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                if len > 0 {
                    let name = &after[..len];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('$');
                            out.push_str(name);
                        }
                    }
                    rest = &after[len..];
                    continue;
                }
            }
            out.push('$');
            rest = after;
        }
        out.push_str(rest);
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        EnvVars(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
