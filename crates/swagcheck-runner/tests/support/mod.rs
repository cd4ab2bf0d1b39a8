//! Scripted HTTP server for integration tests
//!
//! Answers every request with the next scripted response and hands back
//! what each request looked like on arrival.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct Captured {
    /// `"GET /v2/items?x=1"`
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<(u16, String)>,
    captured: Vec<Captured>,
}

type Shared = Arc<Mutex<Script>>;

pub struct TestServer {
    pub base: String,
    script: Shared,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Serve `responses` in order as `(status, json body)`.
    pub fn start(responses: Vec<(u16, String)>) -> Self {
        let script = Arc::new(Mutex::new(Script {
            responses: responses.into(),
            captured: Vec::new(),
        }));
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        let (shutdown, stop) = oneshot::channel::<()>();

        let app = Router::new().fallback(respond).with_state(Arc::clone(&script));
        let handle = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                addr_tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.await;
                    })
                    .await
                    .unwrap();
            });
        });

        let addr = addr_rx.recv().unwrap();
        Self {
            base: format!("http://{addr}/"),
            script,
            shutdown,
            handle,
        }
    }

    /// Stop the server and return every request it saw, in arrival order.
    ///
    /// Panics if a scripted response was never asked for.
    pub fn finish(self) -> Vec<Captured> {
        let _ = self.shutdown.send(());
        self.handle.join().unwrap();
        let mut script = self.script.lock().unwrap();
        assert!(
            script.responses.is_empty(),
            "{} scripted responses never served",
            script.responses.len()
        );
        std::mem::take(&mut script.captured)
    }
}

async fn respond(
    State(script): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut script = script.lock().unwrap();
    script.captured.push(Captured {
        target: format!("{method} {uri}"),
        headers: headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    let (status, body) = script
        .responses
        .pop_front()
        .unwrap_or_else(|| (500, r#"{"error":"unscripted request"}"#.to_string()));
    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
