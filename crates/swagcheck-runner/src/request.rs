//! Placing drawn parameter values into an HTTP request

use reqwest::Method;
use reqwest::Url;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::Value;

use swagcheck_core::{CollectionFormat, Location, Operation, ParamKey, ParamValues, ParameterSpec};

/// A fully encoded request, ready to hand to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPlan {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub body: Option<Value>,
    /// username, password
    pub basic_auth: Option<(String, String)>,
}

impl RequestPlan {
    /// Encode `params` for `op` against `base`.
    ///
    /// Path segments are percent-encoded, arrays outside the body are joined
    /// by the parameter's collection format, and `null` outside the body is
    /// sent as an empty value.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when a value cannot be placed: a missing or
    /// `null` path value, or a header that is not valid HTTP.
    pub fn build(base: &Url, op: &Operation, params: &ParamValues) -> Result<Self, BuildError> {
        let method = Method::from_bytes(op.method.as_bytes())
            .map_err(|_| BuildError::Method(op.method.clone()))?;

        let mut plan = Self {
            method,
            url: expand_path(base, op, params)?,
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            form: Vec::new(),
            body: None,
            basic_auth: None,
        };

        for (key, value) in params {
            let Some(spec) = op.parameters.get(key) else {
                continue;
            };
            match spec.location {
                Location::Path => {}
                Location::Query => plan.query.extend(pairs(spec, value)),
                Location::FormData => plan.form.extend(pairs(spec, value)),
                Location::Header => {
                    let joined = joined(spec, value);
                    plan.push_header(&spec.name, &joined)?;
                }
                Location::Cookie => plan.cookies.push((spec.name.clone(), joined(spec, value))),
                Location::Body => plan.body = Some(value.clone()),
            }
        }

        Ok(plan)
    }

    /// Add a header after checking it is valid HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Header`] for an invalid name or value.
    pub fn push_header(&mut self, name: &str, value: &str) -> Result<(), BuildError> {
        let invalid = |reason: String| BuildError::Header {
            name: name.to_string(),
            reason,
        };
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// `Cookie` header value for all collected cookies.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Substitute `{name}` templates segment by segment and append them to the
/// base path.
fn expand_path(base: &Url, op: &Operation, params: &ParamValues) -> Result<Url, BuildError> {
    let mut segments = Vec::new();
    for raw in op.path.trim_start_matches('/').split('/') {
        segments.push(expand_segment(raw, op, params)?);
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| BuildError::Url(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments.iter().map(String::as_str));
    Ok(url)
}

fn expand_segment(raw: &str, op: &Operation, params: &ParamValues) -> Result<String, BuildError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..close];
        let key = ParamKey::new(Location::Path, name);
        let value = params
            .get(&key)
            .ok_or_else(|| BuildError::MissingPath(name.to_string()))?;
        if value.is_null() {
            return Err(BuildError::Unplaceable {
                name: name.to_string(),
                reason: "null path value".into(),
            });
        }
        match op.parameters.get(&key) {
            Some(spec) => out.push_str(&joined(spec, value)),
            None => out.push_str(&scalar_to_string(value)),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Key/value pairs for query and form parameters; `multi` repeats the key.
fn pairs(spec: &ParameterSpec, value: &Value) -> Vec<(String, String)> {
    match (value, spec.collection_format) {
        (Value::Array(items), CollectionFormat::Multi) => items
            .iter()
            .map(|v| (spec.name.clone(), scalar_to_string(v)))
            .collect(),
        _ => vec![(spec.name.clone(), joined(spec, value))],
    }
}

/// Single-string rendering; arrays use the collection separator (`multi`
/// falls back to `,` where a key cannot repeat).
fn joined(spec: &ParameterSpec, value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let sep = spec.collection_format.separator().unwrap_or(',');
            items
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(&sep.to_string())
        }
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid HTTP method '{0}'")]
    Method(String),
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("no value for path parameter '{0}'")]
    MissingPath(String),
    #[error("cannot place value for '{name}': {reason}")]
    Unplaceable { name: String, reason: String },
    #[error("invalid header '{name}': {reason}")]
    Header { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swagcheck_core::TypeDescriptor;

    fn base() -> Url {
        Url::parse("http://localhost:8080/v2/").unwrap()
    }

    fn param(name: &str, location: Location) -> ParameterSpec {
        ParameterSpec::new(name, location, Some(TypeDescriptor::Boolean { nullable: false }))
    }

    fn values(pairs: &[(Location, &str, Value)]) -> ParamValues {
        pairs
            .iter()
            .map(|(location, name, v)| (ParamKey::new(*location, *name), v.clone()))
            .collect()
    }

    #[test]
    fn path_template_is_percent_encoded() {
        let op = Operation::new("get", "/items/{id}/tags/{tag}")
            .with_parameter(param("id", Location::Path))
            .with_parameter(param("tag", Location::Path));
        let plan = RequestPlan::build(
            &base(),
            &op,
            &values(&[
                (Location::Path, "id", json!(42)),
                (Location::Path, "tag", json!("a/b c")),
            ]),
        )
        .unwrap();
        assert_eq!(plan.method, Method::GET);
        assert_eq!(plan.url.as_str(), "http://localhost:8080/v2/items/42/tags/a%2Fb%20c");
    }

    #[test]
    fn partial_segment_template() {
        let op = Operation::new("get", "/files/{name}.json").with_parameter(param("name", Location::Path));
        let plan = RequestPlan::build(&base(), &op, &values(&[(Location::Path, "name", json!("report"))])).unwrap();
        assert_eq!(plan.url.path(), "/v2/files/report.json");
    }

    #[test]
    fn missing_or_null_path_value_is_error() {
        let op = Operation::new("get", "/items/{id}").with_parameter(param("id", Location::Path));
        assert!(matches!(
            RequestPlan::build(&base(), &op, &ParamValues::new()),
            Err(BuildError::MissingPath(ref n)) if n == "id"
        ));
        assert!(matches!(
            RequestPlan::build(&base(), &op, &values(&[(Location::Path, "id", Value::Null)])),
            Err(BuildError::Unplaceable { .. })
        ));
    }

    #[test]
    fn query_collection_formats() {
        let op = Operation::new("get", "/search")
            .with_parameter(param("csv", Location::Query))
            .with_parameter(param("pipes", Location::Query).with_collection_format(CollectionFormat::Pipes))
            .with_parameter(param("multi", Location::Query).with_collection_format(CollectionFormat::Multi))
            .with_parameter(param("empty", Location::Query));
        let plan = RequestPlan::build(
            &base(),
            &op,
            &values(&[
                (Location::Query, "csv", json!([1, 2])),
                (Location::Query, "pipes", json!(["a", "b"])),
                (Location::Query, "multi", json!([true, false])),
                (Location::Query, "empty", Value::Null),
            ]),
        )
        .unwrap();
        let q: Vec<(&str, &str)> = plan.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            q,
            vec![
                ("csv", "1,2"),
                ("empty", ""),
                ("multi", "true"),
                ("multi", "false"),
                ("pipes", "a|b"),
            ]
        );
    }

    #[test]
    fn headers_cookies_form_and_body() {
        let op = Operation::new("post", "/submit")
            .with_parameter(param("X-Count", Location::Header))
            .with_parameter(param("session", Location::Cookie))
            .with_parameter(param("lang", Location::Cookie))
            .with_parameter(param("note", Location::FormData))
            .with_parameter(param("payload", Location::Body));
        let plan = RequestPlan::build(
            &base(),
            &op,
            &values(&[
                (Location::Header, "X-Count", json!(3)),
                (Location::Cookie, "session", json!("abc")),
                (Location::Cookie, "lang", json!("en")),
                (Location::FormData, "note", json!("hi")),
                (Location::Body, "payload", json!({"k": [1]})),
            ]),
        )
        .unwrap();
        assert_eq!(plan.headers, vec![("X-Count".to_string(), "3".to_string())]);
        assert_eq!(plan.cookie_header().as_deref(), Some("lang=en; session=abc"));
        assert_eq!(plan.form, vec![("note".to_string(), "hi".to_string())]);
        assert_eq!(plan.body, Some(json!({"k": [1]})));
    }

    #[test]
    fn invalid_header_value_is_error() {
        let op = Operation::new("get", "/h").with_parameter(param("X-Text", Location::Header));
        let err = RequestPlan::build(&base(), &op, &values(&[(Location::Header, "X-Text", json!("line\nbreak"))]))
            .unwrap_err();
        assert!(matches!(err, BuildError::Header { ref name, .. } if name == "X-Text"));
    }

    #[test]
    fn path_value_is_not_taken_from_a_same_named_query() {
        let op = Operation::new("get", "/things/{id}")
            .with_parameter(param("id", Location::Path))
            .with_parameter(param("id", Location::Query));
        let plan = RequestPlan::build(
            &base(),
            &op,
            &values(&[(Location::Path, "id", json!(7))]),
        )
        .unwrap();
        assert_eq!(plan.url.path(), "/v2/things/7");
        assert!(plan.query.is_empty());

        let plan = RequestPlan::build(
            &base(),
            &op,
            &values(&[
                (Location::Path, "id", json!(7)),
                (Location::Query, "id", json!("x")),
            ]),
        )
        .unwrap();
        assert_eq!(plan.url.path(), "/v2/things/7");
        assert_eq!(plan.query, vec![("id".to_string(), "x".to_string())]);

        assert!(matches!(
            RequestPlan::build(&base(), &op, &values(&[(Location::Query, "id", json!("x"))])),
            Err(BuildError::MissingPath(ref n)) if n == "id"
        ));
    }

    #[test]
    fn root_path_keeps_base() {
        let op = Operation::new("get", "/");
        let plan = RequestPlan::build(&Url::parse("http://h/api").unwrap(), &op, &ParamValues::new())
            .unwrap();
        assert_eq!(plan.url.as_str(), "http://h/api/");
    }
}
