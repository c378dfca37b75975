//! Configuration-schema interpreter.
//!
//! Walks a configuration mapping against a template's [`ConfigField`] tree
//! and collects every violation: missing required keys, type mismatches,
//! and constraint breaches, recursively through array items and object
//! properties. Validation never short-circuits and never panics; all errors
//! come back together so a caller can report them in one pass.

use serde_json::Value;

use strand_types::{ConfigField, ConfigFieldValidation, FieldType, Metadata};

/// Validate a configuration mapping against a schema field list.
///
/// Returns every violation found; an empty vector means the configuration
/// satisfies the schema.
pub fn validate_configuration(fields: &[ConfigField], configuration: &Metadata) -> Vec<String> {
    let mut errors = Vec::new();
    for field in fields {
        match configuration.get(&field.key) {
            Some(value) => validate_value(field, &field.key, value, &mut errors),
            None => {
                if !field.optional && !field.has_default() {
                    errors.push(format!("{}: required field is missing", field.key));
                }
            }
        }
    }
    errors
}

fn validate_value(field: &ConfigField, path: &str, value: &Value, errors: &mut Vec<String>) {
    match field.field_type {
        FieldType::String => match value.as_str() {
            Some(text) => validate_string(path, text, field.validation.as_ref(), errors),
            None => errors.push(format!("{path}: expected string")),
        },
        FieldType::Number => match value.as_f64() {
            Some(number) => validate_number(path, number, field.validation.as_ref(), errors),
            None => errors.push(format!("{path}: expected number")),
        },
        FieldType::Integer => {
            if value.as_i64().is_none() && value.as_u64().is_none() {
                errors.push(format!("{path}: expected integer"));
            } else if let Some(number) = value.as_f64() {
                validate_number(path, number, field.validation.as_ref(), errors);
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                errors.push(format!("{path}: expected boolean"));
            }
        }
        FieldType::Array => match value.as_array() {
            Some(elements) => {
                if let Some(items) = &field.items {
                    for (index, element) in elements.iter().enumerate() {
                        validate_value(items, &format!("{path}[{index}]"), element, errors);
                    }
                }
            }
            None => errors.push(format!("{path}: expected array")),
        },
        FieldType::Object => match value.as_object() {
            Some(members) => {
                if let Some(properties) = &field.properties {
                    for (key, property) in properties {
                        let member_path = format!("{path}.{key}");
                        match members.get(key) {
                            Some(member) => {
                                validate_value(property, &member_path, member, errors);
                            }
                            None => {
                                if !property.optional && !property.has_default() {
                                    errors.push(format!(
                                        "{member_path}: required field is missing"
                                    ));
                                }
                            }
                        }
                    }
                }
            }
            None => errors.push(format!("{path}: expected object")),
        },
    }
}

fn validate_string(
    path: &str,
    text: &str,
    validation: Option<&ConfigFieldValidation>,
    errors: &mut Vec<String>,
) {
    let Some(validation) = validation else {
        return;
    };
    let length = text.chars().count() as u64;
    if let Some(min_length) = validation.min_length {
        if length < min_length {
            errors.push(format!(
                "{path}: length {length} is below the minimum of {min_length}"
            ));
        }
    }
    if let Some(max_length) = validation.max_length {
        if length > max_length {
            errors.push(format!(
                "{path}: length {length} exceeds the maximum of {max_length}"
            ));
        }
    }
    if let Some(pattern) = &validation.pattern {
        match regex::Regex::new(pattern) {
            Ok(regex) => {
                if !regex.is_match(text) {
                    errors.push(format!("{path}: value does not match pattern '{pattern}'"));
                }
            }
            Err(_) => errors.push(format!("{path}: schema pattern '{pattern}' is invalid")),
        }
    }
    if let Some(enum_values) = &validation.enum_values {
        if !enum_values.iter().any(|allowed| allowed == text) {
            errors.push(format!(
                "{path}: value '{text}' is not one of [{}]",
                enum_values.join(", ")
            ));
        }
    }
}

fn validate_number(
    path: &str,
    number: f64,
    validation: Option<&ConfigFieldValidation>,
    errors: &mut Vec<String>,
) {
    let Some(validation) = validation else {
        return;
    };
    if let Some(min) = validation.min {
        if number < min {
            errors.push(format!("{path}: value {number} is below the minimum of {min}"));
        }
    }
    if let Some(max) = validation.max {
        if number > max {
            errors.push(format!("{path}: value {number} exceeds the maximum of {max}"));
        }
    }
}
