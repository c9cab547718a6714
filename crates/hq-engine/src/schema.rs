//! Payload validation
//!
//! Declarative object schemas checked against `serde_json::Value`. Every
//! schema rejects properties it does not declare. Validation collects every
//! violation instead of stopping at the first one.

use hq_common::{QueueError, RelayType, Result};
use serde_json::Value;

#[derive(Debug)]
enum Kind {
    String,
    Boolean,
    Number,
    Integer,
    NullableInteger,
    OneOf(&'static [&'static str]),
    /// Array of arbitrary JSON objects
    Objects,
    /// Array of objects matching the nested schema
    ArrayOf(&'static Schema),
}

#[derive(Debug)]
struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
}

const fn required(name: &'static str, kind: Kind) -> Field {
    Field { name, kind, required: true }
}

const fn optional(name: &'static str, kind: Kind) -> Field {
    Field { name, kind, required: false }
}

#[derive(Debug)]
pub struct Schema {
    name: &'static str,
    fields: &'static [Field],
}

pub static OUTBOUND_MESSAGE: Schema = Schema {
    name: "message",
    fields: &[
        optional("key", Kind::String),
        required("server", Kind::String),
        required("subject", Kind::String),
        required("gateway", Kind::String),
        optional("init", Kind::Boolean),
        required("method", Kind::OneOf(&["POST", "DELETE"])),
        required("content", Kind::Objects),
    ],
};

static SCALE_ITEM: Schema = Schema {
    name: "scale",
    fields: &[
        required("id", Kind::String),
        required("value", Kind::Number),
        required("datetime", Kind::Integer),
    ],
};

static PARAM_ITEM: Schema = Schema {
    name: "param",
    fields: &[
        required("id", Kind::String),
        required("value", Kind::Number),
        required("datetime", Kind::Integer),
        optional("automatic", Kind::NullableInteger),
    ],
};

pub static MESSAGE_READ: Schema = Schema {
    name: "messageRead",
    fields: &[
        required("hhr", Kind::String),
        required("id", Kind::String),
        optional("messageId", Kind::String),
    ],
};

pub static MEASURES: Schema = Schema {
    name: "measures",
    fields: &[
        required("hhr", Kind::String),
        required("id", Kind::String),
        optional("messageId", Kind::String),
        required("params", Kind::ArrayOf(&PARAM_ITEM)),
    ],
};

pub static SYMPTOMS: Schema = Schema {
    name: "symptoms",
    fields: &[
        required("hhr", Kind::String),
        required("id", Kind::String),
        optional("messageId", Kind::String),
        required("scales", Kind::ArrayOf(&SCALE_ITEM)),
    ],
};

/// Shapes accepted for a received record whose type is not known to this build
static ANY_RECEIVED: [&Schema; 3] = [&MESSAGE_READ, &SYMPTOMS, &MEASURES];

impl Schema {
    /// All violations of `value`, empty when it conforms
    pub fn violations(&self, value: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        self.check("instance", value, &mut errors);
        errors
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        let errors = self.violations(value);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(QueueError::bad_format(errors))
        }
    }

    fn check(&self, path: &str, value: &Value, errors: &mut Vec<String>) {
        let Some(object) = value.as_object() else {
            errors.push(format!("{} is not of a type(s) object", path));
            return;
        };

        for field in self.fields {
            let field_path = format!("{}.{}", path, field.name);
            match object.get(field.name) {
                Some(v) => field.kind.check(&field_path, v, errors),
                None if field.required => errors.push(format!("{} is required", field_path)),
                None => {}
            }
        }

        for name in object.keys() {
            if !self.fields.iter().any(|f| f.name == name) {
                errors.push(format!("{} additionalProperty \"{}\" exists in instance when not allowed", path, name));
            }
        }
    }
}

impl Kind {
    fn check(&self, path: &str, value: &Value, errors: &mut Vec<String>) {
        let ok = match self {
            Kind::String => value.is_string(),
            Kind::Boolean => value.is_boolean(),
            Kind::Number => value.is_number(),
            Kind::Integer => value.is_i64() || value.is_u64(),
            Kind::NullableInteger => value.is_null() || value.is_i64() || value.is_u64(),
            Kind::OneOf(allowed) => {
                if !value.as_str().is_some_and(|s| allowed.contains(&s)) {
                    errors.push(format!("{} is not one of enum values: {}", path, allowed.join(",")));
                }
                return;
            }
            Kind::Objects => match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if !item.is_object() {
                            errors.push(format!("{}[{}] is not of a type(s) object", path, i));
                        }
                    }
                    return;
                }
                None => false,
            },
            Kind::ArrayOf(schema) => match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        schema.check(&format!("{}[{}]", path, i), item, errors);
                    }
                    return;
                }
                None => false,
            },
        };

        if !ok {
            errors.push(format!("{} is not of a type(s) {}", path, self.type_name()));
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Kind::String | Kind::OneOf(_) => "string",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::Integer => "integer",
            Kind::NullableInteger => "integer,null",
            Kind::Objects | Kind::ArrayOf(_) => "array",
        }
    }
}

pub fn schema_for(kind: RelayType) -> &'static Schema {
    match kind {
        RelayType::MessageRead => &MESSAGE_READ,
        RelayType::Measures => &MEASURES,
        RelayType::Symptoms | RelayType::SymptomsSelf => &SYMPTOMS,
    }
}

/// Validate a received payload by its stored type string. Types unknown to
/// this build accept any of the known shapes.
pub fn validate_received(kind: &str, message: &Value) -> Result<()> {
    if let Ok(kind) = kind.parse::<RelayType>() {
        return schema_for(kind).validate(message);
    }

    let mut detail = Vec::new();
    for schema in ANY_RECEIVED {
        let errors = schema.violations(message);
        if errors.is_empty() {
            return Ok(());
        }
        detail.extend(errors.into_iter().map(|e| format!("[{}] {}", schema.name, e)));
    }
    Err(QueueError::bad_format(detail))
}
