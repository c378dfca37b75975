//! Template schema value objects.
//!
//! A template declares the configuration it accepts as a tree of
//! [`ConfigField`]s. The serialized form is consumed by external clients, so
//! field names and presence rules are normative: `optional` appears only when
//! true, `validation` only when at least one constraint is set, `items` only
//! on arrays, and `properties` only on objects. The whole tree round-trips
//! through JSON without loss.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::ValidationError;

/// Primitive type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Floating-point number (integers accepted).
    Number,
    /// Whole number.
    Integer,
    /// Boolean flag.
    Boolean,
    /// Homogeneous list; element schema in [`ConfigField::items`].
    Array,
    /// Nested mapping; member schemas in [`ConfigField::properties`].
    Object,
}

/// Constraints attached to a configuration field.
///
/// Serialized only when at least one constraint is set; constructors in this
/// crate normalize an all-`None` validation to absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFieldValidation {
    /// Minimum string length.
    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Maximum string length.
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Minimum numeric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum numeric value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regular expression the string value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Closed set of accepted string values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ConfigFieldValidation {
    /// Whether any constraint is set.
    pub fn has_constraints(&self) -> bool {
        self.min_length.is_some()
            || self.max_length.is_some()
            || self.min.is_some()
            || self.max.is_some()
            || self.pattern.is_some()
            || self.enum_values.is_some()
    }
}

/// One field of a template configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    /// Configuration key this field describes.
    pub key: String,
    /// Value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default value applied when the key is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Whether the field may be omitted; serialized only when true.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// Value constraints; serialized only when any constraint is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ConfigFieldValidation>,
    /// Element schema; only meaningful (and only serialized) for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ConfigField>>,
    /// Member schemas; only meaningful (and only serialized) for objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, ConfigField>>,
}

impl ConfigField {
    /// Create a field of the given key and type.
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValidationError::EmptyFieldKey);
        }
        Ok(Self {
            key,
            field_type,
            description: None,
            default: None,
            optional: false,
            validation: None,
            items: None,
            properties: None,
        })
    }

    /// Convenience constructor for a string field.
    pub fn string(key: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(key, FieldType::String)
    }

    /// Convenience constructor for a number field.
    pub fn number(key: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(key, FieldType::Number)
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark the field optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Attach constraints; an all-`None` validation is normalized to absent.
    pub fn with_validation(mut self, validation: ConfigFieldValidation) -> Self {
        self.validation = validation.has_constraints().then_some(validation);
        self
    }

    /// Attach the element schema of an array field.
    pub fn with_items(mut self, items: ConfigField) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    /// Attach the member schemas of an object field.
    pub fn with_properties(
        mut self,
        properties: impl IntoIterator<Item = (String, ConfigField)>,
    ) -> Self {
        self.properties = Some(properties.into_iter().collect());
        self
    }

    /// Whether a default value is declared.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Complete template metadata and configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    /// Template identifier agents reference.
    pub id: String,
    /// Framework that executes this template.
    pub framework: String,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Template version.
    pub version: String,
    /// Configuration schema.
    #[serde(rename = "config", default)]
    pub config_fields: Vec<ConfigField>,
}

impl TemplateInfo {
    /// Create template metadata, rejecting empty required fields.
    pub fn new(
        id: impl Into<String>,
        framework: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let info = Self {
            id: id.into(),
            framework: framework.into(),
            name: name.into(),
            description: description.into(),
            version: version.into(),
            config_fields: Vec::new(),
        };
        if info.id.is_empty() {
            return Err(ValidationError::EmptyTemplateField("id"));
        }
        if info.framework.is_empty() {
            return Err(ValidationError::EmptyTemplateField("framework"));
        }
        if info.name.is_empty() {
            return Err(ValidationError::EmptyTemplateField("name"));
        }
        if info.version.is_empty() {
            return Err(ValidationError::EmptyTemplateField("version"));
        }
        Ok(info)
    }

    /// Attach the configuration schema.
    pub fn with_config_fields(mut self, fields: Vec<ConfigField>) -> Self {
        self.config_fields = fields;
        self
    }

    /// Look up a schema field by key.
    pub fn field(&self, key: &str) -> Option<&ConfigField> {
        self.config_fields.iter().find(|field| field.key == key)
    }

    /// Fields that must be present in a valid configuration.
    pub fn required_fields(&self) -> impl Iterator<Item = &ConfigField> {
        self.config_fields
            .iter()
            .filter(|field| !field.optional && !field.has_default())
    }
}
