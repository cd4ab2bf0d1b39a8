//! Document → model: operations, parameters, documented codes, security
//! schemes and the server URL

use std::collections::BTreeMap;

use reqwest::Url;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use swagcheck_core::descriptor::resolve_ref;
use swagcheck_core::{
    ApiKeyLocation, ApiSchema, CollectionFormat, DocumentedCodes, Location, Operation,
    ParameterSpec, SecurityScheme, TypeDescriptor,
};

use super::LoadError;

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Name given to a JSON request body.
const BODY_PARAMETER: &str = "body";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Swagger2,
    OpenApi3,
}

/// Reduce a parsed document to an [`ApiSchema`].
///
/// `source` is the URL the document was fetched from, used to complete a
/// missing or relative server URL.
///
/// # Errors
///
/// Returns [`LoadError::Unsupported`] if the document is neither Swagger 2.0
/// nor OpenAPI 3.x, and [`LoadError::Parse`] if it declares no operations.
pub fn extract_schema(document: &Value, source: Option<&Url>) -> Result<ApiSchema, LoadError> {
    let dialect = if version(document, "swagger").starts_with('2') {
        Dialect::Swagger2
    } else if version(document, "openapi").starts_with('3') {
        Dialect::OpenApi3
    } else {
        return Err(LoadError::Unsupported(
            "expected a Swagger 2.0 or OpenAPI 3.x document".into(),
        ));
    };

    let operations = extract_operations(document, dialect);
    if operations.is_empty() {
        return Err(LoadError::Parse("No operations found in schema".into()));
    }

    Ok(ApiSchema {
        base_url: base_url(document, dialect, source),
        operations,
        security_schemes: security_schemes(document, dialect),
    })
}

fn version<'a>(document: &'a Value, key: &str) -> &'a str {
    document.get(key).and_then(Value::as_str).unwrap_or("")
}

fn extract_operations(document: &Value, dialect: Dialect) -> Vec<Operation> {
    let mut ops = Vec::new();
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return ops;
    };

    for (path, path_item) in paths {
        let path_item = deref(path_item, document);
        for method in METHODS {
            let Some(operation) = path_item.get(method) else {
                continue;
            };

            let mut op = Operation::new(method, path.clone());
            op.operation_id = operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(String::from);

            // Path-level first; an operation-level parameter overrides the one with
            // the same name and location
            for source in [path_item.get("parameters"), operation.get("parameters")]
                .into_iter()
                .flatten()
            {
                for param in source.as_array().into_iter().flatten() {
                    let param = deref(param, document);
                    if let Some(spec) = parse_parameter(param, document, dialect) {
                        op = op.with_parameter(spec);
                    }
                }
            }

            if dialect == Dialect::OpenApi3 {
                if let Some(body) = operation.get("requestBody") {
                    for spec in request_body(deref(body, document), document) {
                        op = op.with_parameter(spec);
                    }
                }
            }

            op.documented = documented_codes(operation);
            debug!(
                operation = %op.label(),
                parameters = op.parameters.len(),
                documented = %op.documented,
                "operation extracted"
            );
            ops.push(op);
        }
    }

    ops
}

/// Follow a `$ref` object to its target; anything else is returned as is.
fn deref<'a>(value: &'a Value, document: &'a Value) -> &'a Value {
    let mut current = value;
    // bounded: reference chains are short in practice, cycles stop here
    for _ in 0..8 {
        match current
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| resolve_ref(r, document))
        {
            Some(target) => current = target,
            None => break,
        }
    }
    current
}

fn parse_parameter(param: &Value, document: &Value, dialect: Dialect) -> Option<ParameterSpec> {
    let name = param.get("name")?.as_str()?.to_string();
    let Some(location) = param.get("in").and_then(Value::as_str).and_then(Location::parse) else {
        warn!(parameter = %name, "ignoring parameter with unknown location");
        return None;
    };
    let required = param
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let (descriptor, collection_format) = match dialect {
        Dialect::Swagger2 => swagger2_parameter(param, location, document),
        Dialect::OpenApi3 => openapi3_parameter(param, location, document),
    };

    Some(
        ParameterSpec::new(name, location, descriptor)
            .with_required(required)
            .with_collection_format(collection_format),
    )
}

/// Swagger 2.0: body parameters carry a `schema`, all others are typed inline.
fn swagger2_parameter(
    param: &Value,
    location: Location,
    document: &Value,
) -> (Option<TypeDescriptor>, CollectionFormat) {
    if location == Location::Body {
        let descriptor = param
            .get("schema")
            .and_then(|s| TypeDescriptor::from_schema(s, document));
        return (descriptor, CollectionFormat::Csv);
    }
    let format = param
        .get("collectionFormat")
        .and_then(Value::as_str)
        .and_then(CollectionFormat::parse)
        .unwrap_or_default();
    (TypeDescriptor::from_schema(param, document), format)
}

/// OpenAPI 3: a `schema` (or the first `content` entry's schema) plus
/// `style`/`explode` serialization.
fn openapi3_parameter(
    param: &Value,
    location: Location,
    document: &Value,
) -> (Option<TypeDescriptor>, CollectionFormat) {
    let schema = param.get("schema").or_else(|| {
        param
            .get("content")
            .and_then(Value::as_object)
            .and_then(|c| c.values().next())
            .and_then(|media| media.get("schema"))
    });
    let descriptor = schema.and_then(|s| TypeDescriptor::from_schema(s, document));

    let default_style = match location {
        Location::Query | Location::Cookie => "form",
        _ => "simple",
    };
    let style = param
        .get("style")
        .and_then(Value::as_str)
        .unwrap_or(default_style);
    let explode = param
        .get("explode")
        .and_then(Value::as_bool)
        .unwrap_or(style == "form");
    let format = match style {
        "form" if explode => CollectionFormat::Multi,
        "spaceDelimited" => CollectionFormat::Ssv,
        "pipeDelimited" => CollectionFormat::Pipes,
        _ => CollectionFormat::Csv,
    };
    (descriptor, format)
}

/// OpenAPI 3 `requestBody`: JSON bodies become one `body` parameter, form
/// bodies one `formData` parameter per property.
fn request_body(body: &Value, document: &Value) -> Vec<ParameterSpec> {
    let required = body
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let Some(content) = body.get("content").and_then(Value::as_object) else {
        return Vec::new();
    };

    let json = content
        .iter()
        .find(|(media, _)| is_json_media(media))
        .map(|(_, m)| m);
    if let Some(media) = json {
        let descriptor = media
            .get("schema")
            .and_then(|s| TypeDescriptor::from_schema(s, document));
        return vec![
            ParameterSpec::new(BODY_PARAMETER, Location::Body, descriptor).with_required(required),
        ];
    }

    let form = content
        .iter()
        .find(|(media, _)| {
            media.starts_with("application/x-www-form-urlencoded")
                || media.starts_with("multipart/form-data")
        })
        .map(|(_, m)| m);
    if let Some(media) = form {
        return form_fields(media.get("schema"), document);
    }

    // xml, text, octet-stream: nothing a value can be generated for
    let media = content.keys().next().cloned().unwrap_or_default();
    warn!(media = %media, "unsupported request body media type");
    vec![ParameterSpec::new(BODY_PARAMETER, Location::Body, None).with_required(required)]
}

fn is_json_media(media: &str) -> bool {
    let essence = media.split(';').next().unwrap_or("").trim();
    essence == "application/json" || essence.ends_with("+json") || essence == "*/*"
}

fn form_fields(schema: Option<&Value>, document: &Value) -> Vec<ParameterSpec> {
    let Some(schema) = schema.map(|s| deref(s, document)) else {
        return vec![ParameterSpec::new(BODY_PARAMETER, Location::FormData, None)];
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let empty = Map::new();
    let props = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    props
        .iter()
        .map(|(name, prop)| {
            let prop = deref(prop, document);
            let binary = prop.get("format").and_then(Value::as_str) == Some("binary");
            let descriptor = if binary {
                None
            } else {
                TypeDescriptor::from_schema(prop, document)
            };
            ParameterSpec::new(name.clone(), Location::FormData, descriptor)
                .with_required(required.contains(&name.as_str()))
        })
        .collect()
}

fn documented_codes(operation: &Value) -> DocumentedCodes {
    let mut codes = DocumentedCodes::new();
    for key in operation
        .get("responses")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(Map::keys)
    {
        if !codes.insert_key(key) && !key.starts_with("x-") {
            warn!(key = %key, "ignoring response key that is not a status code");
        }
    }
    codes
}

fn security_schemes(document: &Value, dialect: Dialect) -> BTreeMap<String, SecurityScheme> {
    let definitions = match dialect {
        Dialect::Swagger2 => document.get("securityDefinitions"),
        Dialect::OpenApi3 => document.pointer("/components/securitySchemes"),
    };
    let Some(definitions) = definitions.and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    definitions
        .iter()
        .map(|(name, def)| {
            let def = deref(def, document);
            let kind = def.get("type").and_then(Value::as_str).unwrap_or("");
            let scheme = match kind {
                "apiKey" => api_key_scheme(def),
                "basic" => SecurityScheme::Basic,
                "http"
                    if def
                        .get("scheme")
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.eq_ignore_ascii_case("basic")) =>
                {
                    SecurityScheme::Basic
                }
                _ => SecurityScheme::Other,
            };
            (name.clone(), scheme)
        })
        .collect()
}

fn api_key_scheme(def: &Value) -> SecurityScheme {
    let location = match def.get("in").and_then(Value::as_str) {
        Some("header") => ApiKeyLocation::Header,
        Some("query") => ApiKeyLocation::Query,
        Some("cookie") => ApiKeyLocation::Cookie,
        _ => return SecurityScheme::Other,
    };
    match def.get("name").and_then(Value::as_str) {
        Some(name) => SecurityScheme::ApiKey {
            name: name.to_string(),
            location,
        },
        None => SecurityScheme::Other,
    }
}

fn base_url(document: &Value, dialect: Dialect, source: Option<&Url>) -> Option<String> {
    match dialect {
        Dialect::Swagger2 => swagger2_base_url(document, source),
        Dialect::OpenApi3 => openapi3_base_url(document, source),
    }
}

/// `schemes[0]://host/basePath`, with scheme and host falling back to the
/// URL the document came from.
fn swagger2_base_url(document: &Value, source: Option<&Url>) -> Option<String> {
    let host = match document.get("host").and_then(Value::as_str) {
        Some(host) => host.to_string(),
        None => {
            let url = source?;
            let host = url.host_str()?;
            match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            }
        }
    };
    let scheme = document
        .get("schemes")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| source.map(|u| u.scheme().to_string()))
        .unwrap_or_else(|| "http".to_string());
    let base_path = document
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or("/");
    let base_path = if base_path.starts_with('/') {
        base_path.to_string()
    } else {
        format!("/{base_path}")
    };
    Some(format!("{scheme}://{host}{base_path}"))
}

/// `servers[0].url` with variable defaults substituted; relative URLs are
/// resolved against the document URL.
fn openapi3_base_url(document: &Value, source: Option<&Url>) -> Option<String> {
    let Some(server) = document
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
    else {
        // no servers: the document's own origin
        return source.map(|u| format!("{}/", u.origin().ascii_serialization()));
    };

    let mut url = server.get("url").and_then(Value::as_str)?.to_string();
    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            if let Some(default) = var.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }

    match Url::parse(&url) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => source
            .and_then(|s| s.join(&url).ok())
            .map(|u| u.to_string()),
    }
}
