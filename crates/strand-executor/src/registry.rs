//! Template registry.
//!
//! A read-mostly mapping from template id to [`TemplateInfo`], populated at
//! startup (typically from plugin discovery) and treated as immutable
//! afterwards. Rebuilding the registry is a full restart.

use std::collections::HashMap;

use strand_types::{Metadata, TemplateInfo};

use crate::validation::validate_configuration;

/// Registry of the templates an executor can run.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, TemplateInfo>,
}

impl TemplateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a collection of templates.
    pub fn from_templates(templates: impl IntoIterator<Item = TemplateInfo>) -> Self {
        let mut registry = Self::new();
        for template in templates {
            registry.register(template);
        }
        registry
    }

    /// Register a template, returning the one it replaced, if any.
    pub fn register(&mut self, template: TemplateInfo) -> Option<TemplateInfo> {
        self.templates.insert(template.id.clone(), template)
    }

    /// Look up a template by id.
    pub fn get(&self, template_id: &str) -> Option<&TemplateInfo> {
        self.templates.get(template_id)
    }

    /// Whether a template id is registered.
    pub fn contains(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }

    /// All registered templates, in unspecified order.
    pub fn templates(&self) -> Vec<TemplateInfo> {
        self.templates.values().cloned().collect()
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Validate a configuration against a registered template's schema.
    ///
    /// An unknown template id is reported as a violation rather than an
    /// error, so callers can hand the list straight back to clients.
    pub fn validate(&self, template_id: &str, configuration: &Metadata) -> Vec<String> {
        match self.templates.get(template_id) {
            Some(template) => validate_configuration(&template.config_fields, configuration),
            None => vec![format!("template '{template_id}' not found")],
        }
    }
}
