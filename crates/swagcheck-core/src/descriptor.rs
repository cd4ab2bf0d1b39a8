//! Parameter type descriptors parsed from JSON Schema fragments
//!
//! Handles the Swagger 2.0 / OpenAPI 3.x subset values can be drawn for:
//! integer, number, string, boolean, array, object, enum, `$ref`, `allOf`,
//! `anyOf` (first non-null branch). Anything else is unsupported and parses
//! to `None`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Maximum `$ref` / nesting depth (circular references end up unsupported).
const MAX_DEPTH: u32 = 20;

/// Closed set of parameter types, each with its own constraint payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Integer(IntegerConstraints),
    Number(NumberConstraints),
    String(StringConstraints),
    Boolean { nullable: bool },
    Array(ArrayConstraints),
    Object(ObjectConstraints),
    Enum(EnumConstraints),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegerConstraints {
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub multiple_of: Option<i64>,
    pub nullable: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberConstraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: bool,
    pub exclusive_maximum: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub format: Option<StringFormat>,
    pub pattern: Option<String>,
    pub nullable: bool,
}

/// String formats with a dedicated generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Date,
    DateTime,
    Time,
    Email,
    Uuid,
    Uri,
    Hostname,
    Ipv4,
    Ipv6,
    /// base64-encoded bytes
    Byte,
}

impl StringFormat {
    /// Unknown formats (`password`, vendor formats) return `None` and fall back to free text.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "date" => Some(Self::Date),
            "date-time" => Some(Self::DateTime),
            "time" => Some(Self::Time),
            "email" => Some(Self::Email),
            "uuid" => Some(Self::Uuid),
            "uri" | "url" => Some(Self::Uri),
            "hostname" => Some(Self::Hostname),
            "ipv4" => Some(Self::Ipv4),
            "ipv6" => Some(Self::Ipv6),
            "byte" => Some(Self::Byte),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayConstraints {
    pub items: Box<TypeDescriptor>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub descriptor: TypeDescriptor,
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectConstraints {
    pub fields: BTreeMap<String, Field>,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumConstraints {
    /// Declared values, `null` excluded (it sets `nullable` instead)
    pub values: Vec<Value>,
    pub nullable: bool,
}

impl TypeDescriptor {
    /// Parse a schema fragment. `root` is the whole document, used for `$ref`.
    ///
    /// Swagger 2.0 non-body parameters carry their type inline, so the
    /// parameter object itself can be passed as `schema`.
    #[must_use]
    pub fn from_schema(schema: &Value, root: &Value) -> Option<Self> {
        parse(schema, root, 0)
    }

    #[must_use]
    pub fn nullable(&self) -> bool {
        match self {
            Self::Integer(c) => c.nullable,
            Self::Number(c) => c.nullable,
            Self::String(c) => c.nullable,
            Self::Boolean { nullable } => *nullable,
            Self::Array(c) => c.nullable,
            Self::Object(c) => c.nullable,
            Self::Enum(c) => c.nullable,
        }
    }

    #[must_use]
    pub fn with_nullable(mut self, value: bool) -> Self {
        match &mut self {
            Self::Integer(c) => c.nullable = value,
            Self::Number(c) => c.nullable = value,
            Self::String(c) => c.nullable = value,
            Self::Boolean { nullable } => *nullable = value,
            Self::Array(c) => c.nullable = value,
            Self::Object(c) => c.nullable = value,
            Self::Enum(c) => c.nullable = value,
        }
        self
    }

    /// Short type name for plans and messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Boolean { .. } => "boolean",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Enum(_) => "enum",
        }
    }
}

/// Resolve a local JSON reference (`#/definitions/Pet`, `#/components/schemas/Pet`).
#[must_use]
pub fn resolve_ref<'a>(reference: &str, root: &'a Value) -> Option<&'a Value> {
    root.pointer(reference.strip_prefix('#')?)
}

fn parse(schema: &Value, root: &Value, depth: u32) -> Option<TypeDescriptor> {
    if depth > MAX_DEPTH {
        return None;
    }
    let obj = schema.as_object()?;

    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        let target = resolve_ref(reference, root)?;
        return parse(target, root, depth + 1);
    }

    let (declared, null_in_type) = declared_type(obj);
    let mut nullable = null_in_type || flag(obj, "nullable") || flag(obj, "x-nullable");

    // const (3.1) is a one-value enum
    let enumerated = obj
        .get("enum")
        .and_then(Value::as_array)
        .cloned()
        .or_else(|| obj.get("const").map(|v| vec![v.clone()]));
    if let Some(all) = enumerated {
        nullable |= all.iter().any(Value::is_null);
        let values = all.into_iter().filter(|v| !v.is_null()).collect();
        return Some(TypeDescriptor::Enum(EnumConstraints { values, nullable }));
    }

    if let Some(branches) = obj.get("allOf").and_then(Value::as_array) {
        return merge_all_of(obj, branches, root, depth).map(|d| {
            let n = d.nullable();
            d.with_nullable(n || nullable)
        });
    }

    if let Some(branches) = obj.get("anyOf").and_then(Value::as_array) {
        let is_null = |b: &&Value| b.get("type").and_then(Value::as_str) == Some("null");
        nullable |= branches.iter().any(|b| is_null(&b));
        let first = branches.iter().find(|b| !is_null(b))?;
        return parse(first, root, depth + 1).map(|d| {
            let n = d.nullable();
            d.with_nullable(n || nullable)
        });
    }

    // exactly-one semantics cannot be guaranteed by drawing from one branch
    if obj.contains_key("oneOf") {
        return None;
    }

    let declared = declared.or_else(|| {
        if obj.contains_key("properties") {
            Some("object")
        } else if obj.contains_key("items") {
            Some("array")
        } else {
            None
        }
    })?;

    let descriptor = match declared {
        "integer" => TypeDescriptor::Integer(integer_constraints(obj)),
        "number" => TypeDescriptor::Number(number_constraints(obj)),
        "string" => TypeDescriptor::String(StringConstraints {
            min_length: usize_key(obj, "minLength"),
            max_length: usize_key(obj, "maxLength"),
            format: obj
                .get("format")
                .and_then(Value::as_str)
                .and_then(StringFormat::parse),
            pattern: obj.get("pattern").and_then(Value::as_str).map(String::from),
            nullable: false,
        }),
        "boolean" => TypeDescriptor::Boolean { nullable: false },
        "array" => {
            let items = parse(obj.get("items")?, root, depth + 1)?;
            TypeDescriptor::Array(ArrayConstraints {
                items: Box::new(items),
                min_items: usize_key(obj, "minItems"),
                max_items: usize_key(obj, "maxItems"),
                unique_items: obj
                    .get("uniqueItems")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                nullable: false,
            })
        }
        "object" => TypeDescriptor::Object(ObjectConstraints {
            fields: object_fields(obj, root, depth)?,
            nullable: false,
        }),
        _ => return None,
    };

    Some(descriptor.with_nullable(nullable))
}

/// `type` may be a string or (3.1) an array such as `["string", "null"]`.
fn declared_type(obj: &Map<String, Value>) -> (Option<&str>, bool) {
    match obj.get("type") {
        Some(Value::String(t)) => (Some(t.as_str()), false),
        Some(Value::Array(types)) => {
            let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            let has_null = names.contains(&"null");
            let mut non_null = names.into_iter().filter(|t| *t != "null");
            match (non_null.next(), non_null.next()) {
                // several non-null types: no single variant fits
                (Some(_), Some(_)) => (Some("__mixed__"), has_null),
                (first, None) => (first, has_null),
                (None, Some(_)) => (None, has_null),
            }
        }
        _ => (None, false),
    }
}

fn flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn usize_key(obj: &Map<String, Value>, key: &str) -> Option<usize> {
    obj.get(key)
        .and_then(Value::as_u64)
        .map(|v| usize::try_from(v).unwrap_or(usize::MAX))
}

/// Integer bound from a possibly fractional JSON number.
fn int_bound(value: &Value, round_up: bool) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = value.as_f64()?;
    let rounded = if round_up { f.ceil() } else { f.floor() };
    // saturating float → int conversion
    Some(rounded as i64)
}

fn integer_constraints(obj: &Map<String, Value>) -> IntegerConstraints {
    let mut c = IntegerConstraints {
        minimum: obj.get("minimum").and_then(|v| int_bound(v, true)),
        maximum: obj.get("maximum").and_then(|v| int_bound(v, false)),
        exclusive_minimum: flag(obj, "exclusiveMinimum"),
        exclusive_maximum: flag(obj, "exclusiveMaximum"),
        multiple_of: obj
            .get("multipleOf")
            .and_then(Value::as_i64)
            .filter(|m| *m > 0),
        nullable: false,
    };
    // 3.1 numeric exclusive bounds
    if let Some(v) = obj.get("exclusiveMinimum").filter(|v| v.is_number()) {
        if let Some(ex) = v.as_i64() {
            if c.minimum.is_none_or(|m| ex >= m) {
                c.minimum = Some(ex);
                c.exclusive_minimum = true;
            }
        } else if let Some(ex) = int_bound(v, true) {
            // fractional bound: ceil already excludes it
            if c.minimum.is_none_or(|m| ex >= m) {
                c.minimum = Some(ex);
                c.exclusive_minimum = false;
            }
        }
    }
    if let Some(v) = obj.get("exclusiveMaximum").filter(|v| v.is_number()) {
        if let Some(ex) = v.as_i64() {
            if c.maximum.is_none_or(|m| ex <= m) {
                c.maximum = Some(ex);
                c.exclusive_maximum = true;
            }
        } else if let Some(ex) = int_bound(v, false) {
            if c.maximum.is_none_or(|m| ex <= m) {
                c.maximum = Some(ex);
                c.exclusive_maximum = false;
            }
        }
    }
    c
}

fn number_constraints(obj: &Map<String, Value>) -> NumberConstraints {
    let mut c = NumberConstraints {
        minimum: obj.get("minimum").and_then(Value::as_f64),
        maximum: obj.get("maximum").and_then(Value::as_f64),
        exclusive_minimum: flag(obj, "exclusiveMinimum"),
        exclusive_maximum: flag(obj, "exclusiveMaximum"),
        nullable: false,
    };
    if let Some(ex) = obj.get("exclusiveMinimum").and_then(Value::as_f64) {
        if c.minimum.is_none_or(|m| ex >= m) {
            c.minimum = Some(ex);
            c.exclusive_minimum = true;
        }
    }
    if let Some(ex) = obj.get("exclusiveMaximum").and_then(Value::as_f64) {
        if c.maximum.is_none_or(|m| ex <= m) {
            c.maximum = Some(ex);
            c.exclusive_maximum = true;
        }
    }
    c
}

fn object_fields(
    obj: &Map<String, Value>,
    root: &Value,
    depth: u32,
) -> Option<BTreeMap<String, Field>> {
    let required: Vec<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut fields = BTreeMap::new();
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            let descriptor = parse(prop, root, depth + 1)?;
            fields.insert(
                name.clone(),
                Field {
                    descriptor,
                    required: required.contains(&name.as_str()),
                },
            );
        }
    }
    Some(fields)
}

/// `allOf`: object branches (and sibling `properties`) merge into one object.
fn merge_all_of(
    obj: &Map<String, Value>,
    branches: &[Value],
    root: &Value,
    depth: u32,
) -> Option<TypeDescriptor> {
    if branches.len() == 1 && !obj.contains_key("properties") {
        return parse(&branches[0], root, depth + 1);
    }

    let mut parts = Vec::with_capacity(branches.len() + 1);
    for branch in branches {
        match parse(branch, root, depth + 1)? {
            TypeDescriptor::Object(o) => parts.push(o.fields),
            _ => return None,
        }
    }
    if obj.contains_key("properties") {
        parts.push(object_fields(obj, root, depth)?);
    }

    let mut merged = ObjectConstraints::default();
    for fields in parts {
        for (name, field) in fields {
            let required = field.required;
            let entry = merged.fields.entry(name).or_insert(Field {
                descriptor: field.descriptor,
                required: false,
            });
            entry.required |= required;
        }
    }
    Some(TypeDescriptor::Object(merged))
}
