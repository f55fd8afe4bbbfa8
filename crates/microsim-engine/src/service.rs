//! A simulated service: receives a route fragment, runs its faults, forwards
//! to its children and answers with a response tree mirroring the request.

use crate::client::{HopClient, REQUEST_ID_HEADER};
use crate::config::ServiceConfig;
use crate::dispatch::forward_children;
use crate::faults::{FaultRegistry, core_registry, run_faults};
use crate::route::{ResponseNode, RouteNode};
use crate::SimError;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ServiceState {
    inner: Arc<ServiceInner>,
}

#[derive(Debug)]
struct ServiceInner {
    service_name: String,
    registry: FaultRegistry,
    client: HopClient,
}

impl ServiceState {
    pub fn new(service_name: impl Into<String>, registry: FaultRegistry, client: HopClient) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                service_name: service_name.into(),
                registry,
                client,
            }),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, SimError> {
        let client = HopClient::new(config.transport_timeout())?;
        Ok(Self::new(config.service_name.clone(), core_registry(), client))
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Handles one inbound call. Decode failures answer 400 without running
    /// faults or forwarding; everything after decode folds into `errors`.
    pub async fn handle(&self, body: &[u8], request_id: &str) -> (StatusCode, ResponseNode) {
        let mut response = ResponseNode::for_service(self.inner.service_name.clone());

        let route = match RouteNode::from_json(body) {
            Ok(route) => route,
            Err(error) => {
                response.errors.push(error.to_string());
                return (StatusCode::BAD_REQUEST, response);
            }
        };
        response.address = route.designation.clone();

        let decoded = self
            .inner
            .registry
            .decode_all(&route.faults.before)
            .and_then(|before| {
                self.inner
                    .registry
                    .decode_all(&route.faults.after)
                    .map(|after| (before, after))
            });
        let (before, after) = match decoded {
            Ok(faults) => faults,
            Err(error) => {
                response.errors.push(SimError::from(error).to_string());
                return (StatusCode::BAD_REQUEST, response);
            }
        };

        response.errors.extend(run_faults(&before).await);

        let forwarded = forward_children(&self.inner.client, &route.routes, request_id).await;
        response.errors.extend(forwarded.errors);
        for child in forwarded.responses.iter().flatten() {
            response.errors.extend(child.errors.iter().cloned());
        }
        response.response = forwarded.responses;

        response.errors.extend(run_faults(&after).await);

        (StatusCode::OK, response)
    }
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/", post(handle_route))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: ServiceState) -> Result<(), SimError> {
    let local = listener
        .local_addr()
        .map_err(|err| SimError::Runtime(format!("listener address unavailable: {err}")))?;
    tracing::info!(service = state.service_name(), addr = %local, "service started");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
        .map_err(|err| SimError::Runtime(format!("server stopped: {err}")))
}

async fn handle_route(
    State(state): State<ServiceState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::debug!(
        request_id = %request_id,
        remote = ?remote.map(|ConnectInfo(addr)| addr),
        %method,
        path = uri.path(),
        body = %String::from_utf8_lossy(&body),
        "inbound request"
    );

    let (status, response) = state.handle(&body, &request_id).await;
    match serde_json::to_string(&response) {
        Ok(compact) => tracing::info!(
            request_id = %request_id,
            status = status.as_u16(),
            response = %compact,
            "request handled"
        ),
        Err(error) => tracing::warn!(request_id = %request_id, %error, "response not loggable"),
    }
    (status, Json(response))
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .expect("log buffer mutex poisoned")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log buffer mutex poisoned")).into_owned()
        }
    }

    fn state() -> ServiceState {
        ServiceState::new(
            "svc",
            core_registry(),
            HopClient::new(Duration::from_secs(1)).expect("client should build"),
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handle_invalid_json_expected_bad_request_without_address() {
        let (status, response) = state().handle(b"{not json", "req").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.service, "svc");
        assert!(response.address.is_empty());
        assert_eq!(response.errors.len(), 1);
        assert!(response.response.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handle_unknown_fault_expected_bad_request_with_address() {
        let body = br#"{"designation":"http://svc/","faults":{"before":[{"type":"cpu-spike"}]}}"#;
        let (status, response) = state().handle(body, "req").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.address, "http://svc/");
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].contains("cpu-spike"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handle_leaf_expected_ok_and_empty_response() {
        let (status, response) = state()
            .handle(br#"{"designation":"http://svc/"}"#, "req")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.address, "http://svc/");
        assert!(response.errors.is_empty());
        assert!(response.response.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handle_route_expected_inbound_call_logged_at_debug() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "req-logged".parse().expect("valid header"));
        let remote: SocketAddr = "127.0.0.1:40123".parse().expect("valid socket addr");
        let _ = handle_route(
            State(state()),
            Some(ConnectInfo(remote)),
            Method::POST,
            Uri::from_static("/"),
            headers,
            Bytes::from_static(br#"{"designation":"http://svc/"}"#),
        )
        .await;

        let text = logs.text();
        assert!(text.contains("inbound request"), "logs:\n{text}");
        assert!(text.contains("req-logged"));
        assert!(text.contains("127.0.0.1:40123"));
        assert!(text.contains("POST"));
        assert!(text.contains("http://svc/"));
    }
}
