//! Named load filters applied at ingestion time.
//!
//! A filter is a white list of type templates, a white list of name templates
//! and a black list of name templates. Unset lists do not constrain. Filters
//! live in a registry with exactly one active filter; the registry is loaded
//! from the `[filters]` tables of a TOML config file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::matcher::Matcher;

/// Name of the built-in filter that accepts everything.
pub const NO_FILTER: &str = "none";

/// Declarative form of a load filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_list_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_list_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_list_names: Option<Vec<String>>,
}

impl LoadFilter {
    pub fn compile(&self) -> Result<CompiledFilter> {
        let compile = |list: &Option<Vec<String>>| -> Result<Option<Matcher>> {
            list.as_ref().map(|l| Matcher::new(l, false)).transpose()
        };
        Ok(CompiledFilter {
            types: compile(&self.white_list_types)?,
            names: compile(&self.white_list_names)?,
            blocked: compile(&self.black_list_names)?,
        })
    }
}

/// A load filter with its templates compiled.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    types: Option<Matcher>,
    names: Option<Matcher>,
    blocked: Option<Matcher>,
}

impl CompiledFilter {
    /// Whether an entity of `type_name` named `name` should be ingested.
    pub fn accepts(&self, type_name: &str, name: &str) -> bool {
        if let Some(types) = &self.types {
            if !types.is_full_match(type_name) {
                return false;
            }
        }
        if let Some(names) = &self.names {
            if !names.is_full_match(name) {
                return false;
            }
        }
        if let Some(blocked) = &self.blocked {
            if blocked.is_full_match(name) {
                return false;
            }
        }
        true
    }
}

/// Registry of named filters with one active entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRegistry {
    #[serde(default = "default_active")]
    pub active_filter: String,
    #[serde(default)]
    pub filters: BTreeMap<String, LoadFilter>,
}

fn default_active() -> String {
    NO_FILTER.to_string()
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut filters = BTreeMap::new();
        filters.insert(NO_FILTER.to_string(), LoadFilter::default());
        Self {
            active_filter: default_active(),
            filters,
        }
    }
}

impl FilterRegistry {
    /// Parse a registry from TOML. The `none` filter is always present.
    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        let mut reg: Self =
            toml::from_str(content).map_err(|e| format!("parse filter config: {e}"))?;
        reg.filters
            .entry(NO_FILTER.to_string())
            .or_insert_with(LoadFilter::default);
        if !reg.filters.contains_key(&reg.active_filter) {
            return Err(format!("active filter '{}' is not defined", reg.active_filter));
        }
        Ok(reg)
    }

    pub fn from_file(path: &Path) -> std::result::Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("read filter config: {e}"))?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> std::result::Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("serialize filter config: {e}"))
    }

    pub fn insert(&mut self, name: &str, filter: LoadFilter) {
        self.filters.insert(name.to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Option<&LoadFilter> {
        self.filters.get(name)
    }

    /// Make `name` the active filter. Returns false for unknown names.
    pub fn set_active(&mut self, name: &str) -> bool {
        if self.filters.contains_key(name) {
            self.active_filter = name.to_string();
            true
        } else {
            false
        }
    }

    pub fn active_name(&self) -> &str {
        &self.active_filter
    }

    pub fn active(&self) -> &LoadFilter {
        static EMPTY: LoadFilter = LoadFilter {
            white_list_types: None,
            white_list_names: None,
            black_list_names: None,
        };
        self.filters.get(&self.active_filter).unwrap_or(&EMPTY)
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }
}
