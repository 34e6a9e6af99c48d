use std::{convert::Infallible, net::SocketAddr, sync::Arc, thread};

use anyhow::{Context, Result};
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::{
    HeaderMap, Method, Request, Response, StatusCode,
    body::{Bytes, Incoming},
    header::CONTENT_TYPE,
    server::conn::http1::Builder as Http1Builder,
    service::service_fn,
};
use hyper_util::rt::tokio::TokioIo;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tokio::{net::TcpListener, runtime::Runtime, sync::oneshot};

use crate::audit::{AuditLog, AuditRecord, RejectReason};
use crate::config::Settings;
use crate::event::{self, iso_timestamp};
use crate::runner::{self, RunOutcome};
use crate::token::{self, TOKEN_HEADER, TOKEN_QUERY_PARAM};
use crate::wake::WakeTarget;

pub const WEBHOOK_PATH: &str = "/webhook";
pub const HEALTHZ_PATH: &str = "/healthz";

/// Everything a request handler needs, built once at startup.
#[derive(Debug)]
pub struct BridgeState {
    pub settings: Settings,
    pub audit: Arc<AuditLog>,
    pub wake: WakeTarget,
}

impl BridgeState {
    pub fn new(settings: Settings) -> Self {
        let audit = Arc::new(AuditLog::new(settings.log_path.clone()));
        let wake = WakeTarget::from_settings(&settings);
        Self {
            settings,
            audit,
            wake,
        }
    }
}

/// Transport-independent view of one `POST /webhook` call.
#[derive(Clone, Debug, Default)]
pub struct WebhookRequest {
    pub body: Bytes,
    pub header_token: Option<String>,
    pub query_token: Option<String>,
    pub remote: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WebhookReply {
    pub status: StatusCode,
    pub body: JsonValue,
}

impl WebhookReply {
    fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({"status": "ok"}),
        }
    }

    fn rejected(status: StatusCode, reason: RejectReason) -> Self {
        Self {
            status,
            body: json!({"status": "error", "error": reason}),
        }
    }

    fn downstream_failed() -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            body: json!({"status": "error"}),
        }
    }
}

pub async fn handle_webhook(state: &BridgeState, request: WebhookRequest) -> WebhookReply {
    let received_at = iso_timestamp(Utc::now());
    let remote = request.remote;

    let body = match parse_object(&request.body) {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(remote = ?remote, error = %err, "rejected webhook: invalid_json");
            record(state, AuditRecord::invalid_json(received_at, remote, err)).await;
            return WebhookReply::rejected(StatusCode::BAD_REQUEST, RejectReason::InvalidJson);
        }
    };

    if !token::is_valid_token(
        &state.settings,
        request.header_token.as_deref(),
        request.query_token.as_deref(),
    ) {
        tracing::warn!(remote = ?remote, "rejected webhook: invalid_token");
        let body = JsonValue::Object(body);
        record(state, AuditRecord::invalid_token(received_at, remote, body)).await;
        return WebhookReply::rejected(StatusCode::UNAUTHORIZED, RejectReason::InvalidToken);
    }

    let canonical = event::normalize(&body);
    let (cmd, outcome) = match canonical.to_compact_json() {
        Ok(compact) => {
            let cmd = state.wake.command(&compact);
            let outcome = run_blocking(cmd.clone()).await;
            (cmd, outcome)
        }
        Err(err) => (Vec::new(), RunOutcome::failure(err.to_string())),
    };
    match &outcome {
        RunOutcome::Success => tracing::info!(
            event_type = %canonical.event_type,
            remote = ?remote,
            "agent woken"
        ),
        RunOutcome::Failure { diagnostic } => tracing::warn!(
            event_type = %canonical.event_type,
            remote = ?remote,
            diagnostic = %diagnostic,
            "agent wake failed"
        ),
    }

    let reply = if outcome.is_success() {
        WebhookReply::ok()
    } else {
        WebhookReply::downstream_failed()
    };
    let body = JsonValue::Object(body);
    record(
        state,
        AuditRecord::wake(received_at, remote, body, canonical, cmd, &outcome),
    )
    .await;
    reply
}

pub fn healthz() -> WebhookReply {
    WebhookReply {
        status: StatusCode::OK,
        body: json!({"status": "ok", "ts": Utc::now().timestamp()}),
    }
}

fn parse_object(raw: &[u8]) -> Result<JsonMap<String, JsonValue>, String> {
    match serde_json::from_slice::<JsonValue>(raw).map_err(|err| err.to_string())? {
        JsonValue::Object(fields) => Ok(fields),
        _ => Err("json is not an object".to_string()),
    }
}

async fn run_blocking(cmd: Vec<String>) -> RunOutcome {
    tokio::task::spawn_blocking(move || runner::run_wake(&cmd))
        .await
        .unwrap_or_else(|err| RunOutcome::failure(format!("wake task failed: {err}")))
}

// A lost audit line must not change what the caller sees. The append takes
// a std lock and does file I/O, so it runs on the blocking pool.
async fn record(state: &BridgeState, record: AuditRecord) {
    let audit = state.audit.clone();
    let result = tokio::task::spawn_blocking(move || audit.append(&record))
        .await
        .unwrap_or_else(|err| Err(anyhow::anyhow!("audit task failed: {err}")));
    if let Err(err) = result {
        tracing::error!(
            path = %state.audit.path().display(),
            error = %format!("{err:#}"),
            "failed to append audit record"
        );
    }
}

#[derive(Clone, Debug)]
pub struct WebhookServerConfig {
    pub bind_addr: SocketAddr,
    pub state: Arc<BridgeState>,
}

pub struct WebhookServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl WebhookServer {
    pub fn start(config: WebhookServerConfig) -> Result<Self> {
        let listener = std::net::TcpListener::bind(config.bind_addr)
            .with_context(|| format!("failed to bind webhook listener on {}", config.bind_addr))?;
        listener
            .set_nonblocking(true)
            .context("failed to configure webhook listener")?;
        let local_addr = listener.local_addr()?;
        let state = config.state;
        let (tx, rx) = oneshot::channel();
        let handle = thread::Builder::new()
            .name("webhook-server".to_string())
            .spawn(move || -> Result<()> {
                let runtime = Runtime::new().context("failed to create webhook runtime")?;
                runtime.block_on(async move {
                    let listener = TcpListener::from_std(listener)
                        .context("failed to register webhook listener")?;
                    tracing::info!("webhook bridge listening on http://{}", local_addr);
                    let mut shutdown = rx;
                    loop {
                        tokio::select! {
                            _ = &mut shutdown => break,
                            accept = listener.accept() => match accept {
                                Ok((stream, peer)) => {
                                    let connection_state = state.clone();
                                    tokio::spawn(async move {
                                        let service = service_fn(move |req| {
                                            handle_request(req, connection_state.clone(), peer)
                                        });
                                        let stream = TokioIo::new(stream);
                                        if let Err(err) = Http1Builder::new()
                                            .serve_connection(stream, service)
                                            .await
                                        {
                                            tracing::debug!(
                                                peer = %peer,
                                                "webhook connection error: {err}"
                                            );
                                        }
                                    });
                                }
                                Err(err) => {
                                    tracing::error!("webhook accept error: {err}");
                                }
                            },
                        }
                    }
                    Ok(())
                })
            })?;
        Ok(Self {
            local_addr,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signals the accept loop to exit and joins the server thread.
    pub fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let joined = handle
                .join()
                .map_err(|err| anyhow::anyhow!("webhook server panicked: {err:?}"))?;
            joined?;
        }
        Ok(())
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<BridgeState>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let reply = match path.as_str() {
        WEBHOOK_PATH if req.method() == Method::POST => {
            let header_token = header_value(req.headers(), TOKEN_HEADER);
            let query_token = query_param(req.uri().query(), TOKEN_QUERY_PARAM);
            // A body that fails mid-read is handled like an unparseable one.
            let body = req
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_default();
            let request = WebhookRequest {
                body,
                header_token,
                query_token,
                remote: Some(peer.ip().to_string()),
            };
            handle_webhook(&state, request).await
        }
        HEALTHZ_PATH if req.method() == Method::GET => healthz(),
        WEBHOOK_PATH | HEALTHZ_PATH => WebhookReply {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: json!({"status": "error", "error": "method_not_allowed"}),
        },
        _ => WebhookReply {
            status: StatusCode::NOT_FOUND,
            body: json!({"status": "error", "error": "not_found"}),
        },
    };
    Ok(json_response(reply.status, &reply.body))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Last value of `name` in a raw query string, percent-decoded.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .filter(|(key, _)| key == name)
        .last()
        .map(|(_, value)| value.into_owned())
}

fn json_response(status: StatusCode, value: &JsonValue) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::from(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
