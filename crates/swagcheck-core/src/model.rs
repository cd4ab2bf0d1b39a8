//! Schema model: operations, parameters, documented response codes
//!
//! Everything here is produced once by the loader and never mutated while a
//! run is in progress.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::descriptor::TypeDescriptor;

/// Where a parameter travels in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Location {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    FormData,
}

impl Location {
    /// Parse the `in` value of a parameter object.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "body" => Some(Self::Body),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
            Self::FormData => "formData",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialization of array values outside a JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionFormat {
    /// `a,b,c`
    #[default]
    Csv,
    /// `a b c`
    Ssv,
    /// `a\tb\tc`
    Tsv,
    /// `a|b|c`
    Pipes,
    /// `k=a&k=b&k=c`
    Multi,
}

impl CollectionFormat {
    /// Parse a Swagger 2.0 `collectionFormat` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "csv" => Some(Self::Csv),
            "ssv" => Some(Self::Ssv),
            "tsv" => Some(Self::Tsv),
            "pipes" => Some(Self::Pipes),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }

    /// Separator used to join elements into one value. `None` for `multi`.
    #[must_use]
    pub const fn separator(self) -> Option<char> {
        match self {
            Self::Csv => Some(','),
            Self::Ssv => Some(' '),
            Self::Tsv => Some('\t'),
            Self::Pipes => Some('|'),
            Self::Multi => None,
        }
    }
}

/// Identity of a parameter within an operation.
///
/// A name alone is ambiguous: a path `{id}` and a query `id` may coexist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamKey {
    pub location: Location,
    pub name: String,
}

impl ParamKey {
    #[must_use]
    pub fn new(location: Location, name: impl Into<String>) -> Self {
        Self {
            location,
            name: name.into(),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.location, self.name)
    }
}

/// Declared shape of one operation input.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub location: Location,
    pub required: bool,
    /// `None` when the declared type is not one values can be generated for.
    pub descriptor: Option<TypeDescriptor>,
    pub collection_format: CollectionFormat,
}

impl ParameterSpec {
    /// Path parameters are always required; everything else starts optional.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        location: Location,
        descriptor: Option<TypeDescriptor>,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            required: location == Location::Path,
            descriptor,
            collection_format: CollectionFormat::default(),
        }
    }

    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required || self.location == Location::Path;
        self
    }

    #[must_use]
    pub fn with_collection_format(mut self, format: CollectionFormat) -> Self {
        self.collection_format = format;
        self
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.descriptor.is_some()
    }

    #[must_use]
    pub fn key(&self) -> ParamKey {
        ParamKey::new(self.location, self.name.clone())
    }
}

/// The set of response codes an operation declares as acceptable.
///
/// Holds exact codes (`200`), status classes (`2XX`) and the `default`
/// response, which documents every status not listed explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentedCodes {
    codes: BTreeSet<u16>,
    classes: BTreeSet<u8>,
    default: bool,
}

impl DocumentedCodes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_codes(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add one `responses` key. Returns `false` when the key is not a status code.
    pub fn insert_key(&mut self, key: &str) -> bool {
        if key == "default" {
            self.default = true;
            return true;
        }
        if let Ok(code) = key.parse::<u16>() {
            if (100..600).contains(&code) {
                self.codes.insert(code);
                return true;
            }
            return false;
        }
        let bytes = key.as_bytes();
        if bytes.len() == 3
            && (b'1'..=b'5').contains(&bytes[0])
            && bytes[1..].eq_ignore_ascii_case(b"xx")
        {
            self.classes.insert(bytes[0] - b'0');
            return true;
        }
        false
    }

    #[must_use]
    pub fn contains(&self, status: u16) -> bool {
        self.default
            || self.codes.contains(&status)
            || u8::try_from(status / 100).is_ok_and(|class| self.classes.contains(&class))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.classes.is_empty() && !self.default
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.codes.iter().map(u16::to_string).collect();
        keys.extend(self.classes.iter().map(|c| format!("{c}XX")));
        if self.default {
            keys.push("default".to_string());
        }
        keys
    }

    /// Whitespace-free token for the run log: `200,404`, or `-` when empty.
    #[must_use]
    pub fn to_token(&self) -> String {
        if self.is_empty() {
            return "-".to_string();
        }
        self.keys().join(",")
    }

    /// Inverse of [`DocumentedCodes::to_token`].
    #[must_use]
    pub fn parse_token(token: &str) -> Option<Self> {
        let mut codes = Self::new();
        if token == "-" {
            return Some(codes);
        }
        for key in token.split(',') {
            if !codes.insert_key(key) {
                return None;
            }
        }
        Some(codes)
    }
}

impl fmt::Display for DocumentedCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.keys().join(", "))
    }
}

/// One documented method + path pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Upper-case HTTP method
    pub method: String,
    /// Path template, e.g. `/items/{id}`
    pub path: String,
    pub operation_id: Option<String>,
    /// Keyed by location and name; sorted so seeded draws are reproducible.
    pub parameters: BTreeMap<ParamKey, ParameterSpec>,
    pub documented: DocumentedCodes,
}

impl Operation {
    #[must_use]
    pub fn new(method: &str, path: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.into(),
            operation_id: None,
            parameters: BTreeMap::new(),
            documented: DocumentedCodes::new(),
        }
    }

    /// Replaces an earlier parameter with the same name and location.
    #[must_use]
    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.insert(spec.key(), spec);
        self
    }

    #[must_use]
    pub fn with_documented(mut self, documented: DocumentedCodes) -> Self {
        self.documented = documented;
        self
    }

    /// `"GET /items"`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// First parameter (by location, then name) without a usable descriptor.
    #[must_use]
    pub fn unsupported_parameter(&self) -> Option<&ParameterSpec> {
        self.parameters.values().find(|p| !p.is_supported())
    }
}

/// Transport of an `apiKey` security scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// A declared security scheme, reduced to what request authentication needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    ApiKey {
        /// Header, query or cookie name the key travels under
        name: String,
        location: ApiKeyLocation,
    },
    Basic,
    Other,
}

/// A loaded API description.
#[derive(Debug, Clone, Default)]
pub struct ApiSchema {
    /// Server URL derived from the document, if it declares or implies one
    pub base_url: Option<String>,
    pub operations: Vec<Operation>,
    /// Keyed by scheme name
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

impl ApiSchema {
    /// Name of the first declared `apiKey` scheme.
    #[must_use]
    pub fn default_api_key_scheme(&self) -> Option<&str> {
        self.security_schemes
            .iter()
            .find(|(_, s)| matches!(s, SecurityScheme::ApiKey { .. }))
            .map(|(name, _)| name.as_str())
    }
}
