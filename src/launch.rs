//! Launch configuration recorded in the container
//!
//! Everything the launcher needs to start the application besides the
//! resources themselves: entry point, module and class path, JVM flags.

use crate::condition::{Condition, RuntimeContext};
use crate::resource::PathItem;
use crate::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A JVM option applied only when its condition holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalOption {
    /// Guard, `true` when omitted
    #[serde(default = "always")]
    pub when: Condition,
    /// The option passed to `java`, e.g. `-Xss4m`
    pub option: String,
}

fn always() -> Condition {
    Condition::True
}

impl ConditionalOption {
    /// Option without a guard
    pub fn always(option: impl Into<String>) -> Self {
        Self {
            when: Condition::True,
            option: option.into(),
        }
    }
}

/// Composed launch manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Fully qualified main class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    /// Main module (its descriptor names the main class if `main_class` is unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_module: Option<String>,

    /// Module path, in order
    #[serde(default)]
    pub module_path: Vec<PathItem>,

    /// Class path, in order
    #[serde(default)]
    pub class_path: Vec<PathItem>,

    /// System properties (`-Dkey=value`)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// `module/package=target[,target...]`
    #[serde(default)]
    pub add_opens: Vec<String>,

    /// `module/package=target[,target...]`
    #[serde(default)]
    pub add_exports: Vec<String>,

    /// `module=target[,target...]`
    #[serde(default)]
    pub add_reads: Vec<String>,

    /// Modules allowed to use restricted native methods
    #[serde(default)]
    pub enable_native_access: Vec<String>,

    /// Extra JVM options with guards
    #[serde(default)]
    pub jvm_options: Vec<ConditionalOption>,

    /// Arguments passed to the application before the user's own
    #[serde(default)]
    pub args: Vec<String>,
}

impl LaunchConfig {
    /// Create an empty launch config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the main class
    pub fn with_main_class(mut self, class: impl Into<String>) -> Self {
        self.main_class = Some(class.into());
        self
    }

    /// Set the main module from `module` or `module/class`
    pub fn with_main_module(mut self, spec: &str) -> Self {
        let (module, class) = parse_main_module(spec);
        self.main_module = Some(module);
        if class.is_some() {
            self.main_class = class;
        }
        self
    }

    /// Add a system property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add a guarded JVM option
    pub fn with_jvm_option(mut self, option: ConditionalOption) -> Self {
        self.jvm_options.push(option);
        self
    }

    /// Check the entry point and the access flags
    pub fn validate(&self) -> PackResult<()> {
        if self.main_class.is_none() && self.main_module.is_none() {
            return Err(PackError::Config("No main class specified".to_string()));
        }

        for value in self.add_opens.iter().chain(&self.add_exports) {
            validate_package_rule(value)?;
        }
        for value in &self.add_reads {
            validate_reads_rule(value)?;
        }
        for module in &self.enable_native_access {
            if module.is_empty() || module.contains(',') {
                return Err(PackError::Config(format!(
                    "Invalid module for native access: '{}'",
                    module
                )));
            }
        }
        for key in self.properties.keys() {
            if key.is_empty() {
                return Err(PackError::Config("Empty system property name".to_string()));
            }
        }

        Ok(())
    }

    /// JVM options whose guards hold on `context`
    pub fn active_jvm_options<'a>(
        &'a self,
        context: &'a RuntimeContext,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.jvm_options
            .iter()
            .filter(move |o| o.when.test(context))
            .map(|o| o.option.as_str())
    }
}

/// Split `module/class` into its parts
pub fn parse_main_module(spec: &str) -> (String, Option<String>) {
    match spec.split_once('/') {
        Some((module, class)) if !class.is_empty() => (module.to_string(), Some(class.to_string())),
        Some((module, _)) => (module.to_string(), None),
        None => (spec.to_string(), None),
    }
}

/// Parse `key=value` (value may be empty; `key` alone means empty value)
pub fn parse_property(spec: &str) -> PackResult<(String, String)> {
    let (key, value) = spec.split_once('=').unwrap_or((spec, ""));
    if key.is_empty() {
        return Err(PackError::Config(format!("Invalid property: '{}'", spec)));
    }
    Ok((key.to_string(), value.to_string()))
}

fn validate_package_rule(value: &str) -> PackResult<()> {
    let invalid = || PackError::Config(format!("Invalid module/package rule: '{}'", value));

    let (left, targets) = value.split_once('=').ok_or_else(invalid)?;
    let parts: Vec<&str> = left.split('/').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid());
    }
    if targets.split(',').all(str::is_empty) {
        return Err(invalid());
    }
    Ok(())
}

fn validate_reads_rule(value: &str) -> PackResult<()> {
    let invalid = || PackError::Config(format!("Invalid reads rule: '{}'", value));

    let (module, targets) = value.split_once('=').ok_or_else(invalid)?;
    if module.is_empty() || module.contains('/') || targets.split(',').all(str::is_empty) {
        return Err(invalid());
    }
    Ok(())
}
