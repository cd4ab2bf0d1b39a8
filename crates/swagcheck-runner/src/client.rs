//! Authenticated HTTP dispatch
//!
//! [`Dispatch`] is the seam between the run loop and the network: the engine
//! only ever asks for "one request for this operation with these values".

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::COOKIE;
use tracing::{debug, warn};

use swagcheck_core::{ApiKeyLocation, AuthMode, Operation, ParamValues, SecurityScheme};

use crate::request::{BuildError, RequestPlan};

/// Header that carries a token when the schema declares no apiKey scheme.
const FALLBACK_TOKEN_HEADER: &str = "Authorization";

/// What came back from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Response {
    #[must_use]
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

/// Sends one request built from an operation and one drawn value mapping.
pub trait Dispatch {
    /// # Errors
    ///
    /// [`DispatchError::Build`] when the values cannot be placed into a
    /// request, [`DispatchError::Transport`] when no response arrived.
    fn send(&mut self, op: &Operation, params: &ParamValues) -> Result<Response, DispatchError>;
}

impl<D: Dispatch + ?Sized> Dispatch for &mut D {
    fn send(&mut self, op: &Operation, params: &ParamValues) -> Result<Response, DispatchError> {
        (**self).send(op, params)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// No response after every allowed attempt.
#[derive(Debug, thiserror::Error)]
#[error("request failed after {attempts} attempt(s): {message}")]
pub struct TransportError {
    pub attempts: u32,
    pub message: String,
}

/// Client construction failures; fatal before any operation runs.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("security scheme '{0}' is not declared by the schema")]
    UnknownScheme(String),
    #[error("security scheme '{0}' is not an apiKey scheme")]
    NotApiKey(String),
    #[error("invalid header '{name}': {reason}")]
    Header { name: String, reason: String },
    #[error("HTTP client error: {0}")]
    Http(String),
}

/// Authentication applied to every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        name: String,
        location: ApiKeyLocation,
        token: String,
    },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Self::ApiKey { name, location, .. } => write!(f, "ApiKey({name} in {location:?}, ***)"),
        }
    }
}

impl Auth {
    /// Bind a resolved mode to the schema's security schemes.
    ///
    /// An explicit scheme name must name a declared apiKey scheme. Without
    /// one, the first declared apiKey scheme is used, or the `Authorization`
    /// header when the schema declares none.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] for an unknown or non-apiKey override.
    pub fn resolve(
        mode: &AuthMode,
        schemes: &BTreeMap<String, SecurityScheme>,
    ) -> Result<Self, SetupError> {
        match mode {
            AuthMode::None => Ok(Self::None),
            AuthMode::Basic { username, password } => Ok(Self::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            AuthMode::ApiKey { token, scheme } => {
                let chosen = match scheme {
                    Some(name) => match schemes.get(name) {
                        Some(scheme @ SecurityScheme::ApiKey { .. }) => Some(scheme),
                        Some(_) => return Err(SetupError::NotApiKey(name.clone())),
                        None => return Err(SetupError::UnknownScheme(name.clone())),
                    },
                    None => schemes
                        .values()
                        .find(|s| matches!(s, SecurityScheme::ApiKey { .. })),
                };
                Ok(match chosen {
                    Some(SecurityScheme::ApiKey { name, location }) => Self::ApiKey {
                        name: name.clone(),
                        location: *location,
                        token: token.clone(),
                    },
                    _ => Self::ApiKey {
                        name: FALLBACK_TOKEN_HEADER.to_string(),
                        location: ApiKeyLocation::Header,
                        token: token.clone(),
                    },
                })
            }
        }
    }

    fn apply(&self, plan: &mut RequestPlan) -> Result<(), BuildError> {
        match self {
            Self::None => {}
            Self::Basic { username, password } => {
                plan.basic_auth = Some((username.clone(), password.clone()));
            }
            Self::ApiKey {
                name,
                location,
                token,
            } => match location {
                ApiKeyLocation::Header => plan.push_header(name, token)?,
                ApiKeyLocation::Query => plan.query.push((name.clone(), token.clone())),
                ApiKeyLocation::Cookie => plan.cookies.push((name.clone(), token.clone())),
            },
        }
        Ok(())
    }
}

/// Retries for transient connection errors only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: Url,
    pub auth: Auth,
    /// Sent with every request
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientSettings {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            auth: Auth::None,
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Blocking reqwest client bound to one server.
pub struct HttpClient {
    client: reqwest::blocking::Client,
    settings: ClientSettings,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns [`SetupError`] if an extra header is invalid or the client
    /// cannot be built.
    pub fn new(settings: ClientSettings) -> Result<Self, SetupError> {
        // validate static headers once instead of on every request
        let mut scratch = RequestPlan {
            method: reqwest::Method::GET,
            url: settings.base_url.clone(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            form: Vec::new(),
            body: None,
            basic_auth: None,
        };
        for (name, value) in &settings.headers {
            scratch.push_header(name, value).map_err(|e| match e {
                BuildError::Header { name, reason } => SetupError::Header { name, reason },
                other => SetupError::Http(other.to_string()),
            })?;
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| SetupError::Http(e.to_string()))?;
        Ok(Self { client, settings })
    }

    /// Encode `params` for `op`, including extra headers and authentication.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when a value cannot be placed into the request.
    pub fn prepare(&self, op: &Operation, params: &ParamValues) -> Result<RequestPlan, BuildError> {
        let mut plan = RequestPlan::build(&self.settings.base_url, op, params)?;
        for (name, value) in &self.settings.headers {
            plan.headers.push((name.clone(), value.clone()));
        }
        self.settings.auth.apply(&mut plan)?;
        Ok(plan)
    }

    fn execute(&self, plan: &RequestPlan) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let mut req = self.client.request(plan.method.clone(), plan.url.clone());
        if !plan.query.is_empty() {
            req = req.query(&plan.query);
        }
        for (k, v) in &plan.headers {
            req = req.header(k, v);
        }
        if let Some(cookie) = plan.cookie_header() {
            req = req.header(COOKIE, cookie);
        }
        if let Some((user, pass)) = &plan.basic_auth {
            req = req.basic_auth(user, Some(pass));
        }
        if !plan.form.is_empty() {
            req = req.form(&plan.form);
        }
        if let Some(ref body_value) = plan.body {
            req = req.json(body_value);
        }
        req.send()
    }
}

impl Dispatch for HttpClient {
    fn send(&mut self, op: &Operation, params: &ParamValues) -> Result<Response, DispatchError> {
        let plan = self.prepare(op, params)?;
        let retry = self.settings.retry;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.execute(&plan) {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let headers = resp
                        .headers()
                        .iter()
                        .filter_map(|(k, v)| {
                            v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string()))
                        })
                        .collect();
                    let body = resp.text().unwrap_or_default();
                    debug!(method = %plan.method, url = %plan.url, status, "response");
                    return Ok(Response {
                        status,
                        headers,
                        body,
                    });
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt <= retry.retries => {
                    warn!(
                        url = %plan.url,
                        attempt,
                        error = %e,
                        "transient transport error, retrying"
                    );
                    std::thread::sleep(retry.backoff * attempt);
                }
                Err(e) => {
                    return Err(DispatchError::Transport(TransportError {
                        attempts: attempt,
                        message: e.to_string(),
                    }));
                }
            }
        }
    }
}
