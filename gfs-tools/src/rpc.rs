//! Minimal JSON-over-HTTP RPC transport shared by the master, the chunk
//! server and the client: a server-side explicit method-registration table
//! (REDESIGN FLAGS: "re-implement as explicit registration table... or
//! statically-typed RPC service definitions", modeled on
//! `proxmox-rest-server`'s `Router`/`H2Service`) and a client-side
//! `call_rpc` helper (modeled on `pbs-client::http_client::HttpClient::post`).

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use gfs_types::GfsError;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Handler = Box<dyn Fn(Value) -> BoxFuture<Result<Value, GfsError>> + Send + Sync>;

/// Explicit method name -> handler registration table. Unknown methods
/// answer 404, exactly as `proxmox_router::Router::find_method` would.
#[derive(Default)]
pub struct Router {
    methods: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Registers a typed handler under `name`. The closure receives the
    /// decoded request and returns the encoded response or a `GfsError`.
    pub fn register<Req, Resp, F, Fut>(&mut self, name: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, GfsError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.methods.insert(
            name.to_string(),
            Box::new(move |value: Value| {
                let handler = handler.clone();
                Box::pin(async move {
                    let req: Req = serde_json::from_value(value)
                        .map_err(|e| GfsError::Other(format!("bad request body: {e}")))?;
                    let resp = handler(req).await?;
                    serde_json::to_value(resp).map_err(|e| GfsError::Other(e.to_string()))
                })
            }),
        );
    }

    async fn dispatch(&self, path: &str, body: Value) -> Response<Body> {
        let method = path.trim_start_matches('/');
        match self.methods.get(method) {
            None => error_response(&GfsError::Other(format!("no such method: {method}"))),
            Some(handler) => match handler(body).await {
                Ok(result) => json_response(StatusCode::OK, &serde_json::json!({"ok": true, "result": result})),
                Err(err) => error_response(&err),
            },
        }
    }
}

fn status_for(err: &GfsError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_response(err: &GfsError) -> Response<Body> {
    json_response(
        status_for(err),
        &serde_json::json!({"ok": false, "error": err}),
    )
}

fn json_response(status: StatusCode, value: &Value) -> Response<Body> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

/// Serves `router` on `addr` until the process exits. Each connection is
/// handled by a `hyper` service that reads the whole JSON body, dispatches
/// through the table, and writes back the envelope.
pub async fn serve(addr: SocketAddr, router: Arc<Router>) -> anyhow::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let router = router.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let router = router.clone();
                async move {
                    if req.method() != Method::POST && req.method() != Method::GET {
                        return Ok::<_, Infallible>(
                            Response::builder()
                                .status(StatusCode::METHOD_NOT_ALLOWED)
                                .body(Body::empty())
                                .unwrap(),
                        );
                    }
                    let path = req.uri().path().to_string();
                    let body_bytes = hyper::body::to_bytes(req.into_body())
                        .await
                        .unwrap_or_default();
                    let value: Value = if body_bytes.is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
                    };
                    Ok(router.dispatch(&path, value).await)
                }
            }))
        }
    });

    log::info!("listening on {addr}");
    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}

/// Calls `method` on the server at `base_addr` (`host:port`, no scheme)
/// with `req` as the JSON body, and decodes the `Envelope<Resp>` reply.
/// Transport failures (connect refused, decode errors) surface as
/// `GfsError::Transport`.
pub async fn call_rpc<Req, Resp>(base_addr: &str, method: &str, req: &Req) -> Result<Resp, GfsError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let client = hyper::Client::new();
    let uri: hyper::Uri = format!("http://{base_addr}/{method}")
        .parse()
        .map_err(|e| GfsError::Transport(format!("bad address {base_addr}: {e}")))?;

    let body = serde_json::to_vec(req).map_err(|e| GfsError::Other(e.to_string()))?;
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .map_err(|e| GfsError::Transport(e.to_string()))?;

    let response = client
        .request(request)
        .await
        .map_err(|e| GfsError::Transport(e.to_string()))?;

    let body_bytes = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(|e| GfsError::Transport(e.to_string()))?;

    let value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| GfsError::Transport(format!("invalid response body: {e}")))?;

    let ok = value.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        let result = value
            .get("result")
            .cloned()
            .ok_or_else(|| GfsError::Transport("missing result field".to_string()))?;
        serde_json::from_value(result).map_err(|e| GfsError::Transport(format!("malformed result: {e}")))
    } else {
        let error = value
            .get("error")
            .cloned()
            .ok_or_else(|| GfsError::Transport("malformed error envelope".to_string()))?;
        Err(serde_json::from_value(error)
            .unwrap_or_else(|_| GfsError::Transport("malformed error envelope".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Serialize, Deserialize)]
    struct Pong {
        n: u32,
    }

    #[tokio::test]
    async fn round_trips_through_router_and_client() {
        let mut router = Router::new();
        router.register("ping", |req: Ping| async move { Ok::<_, GfsError>(Pong { n: req.n + 1 }) });
        let router = Arc::new(router);

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = std::net::TcpListener::bind(addr).unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let router_for_server = router.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => break,
                };
                let router = router_for_server.clone();
                tokio::spawn(async move {
                    let router = router.clone();
                    let service = service_fn(move |req: Request<Body>| {
                        let router = router.clone();
                        async move {
                            let path = req.uri().path().to_string();
                            let body = hyper::body::to_bytes(req.into_body()).await.unwrap_or_default();
                            let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                            Ok::<_, Infallible>(router.dispatch(&path, value).await)
                        }
                    });
                    let _ = hyper::server::conn::Http::new()
                        .serve_connection(stream, service)
                        .await;
                });
            }
        });

        let resp: Pong = call_rpc(&addr.to_string(), "ping", &Ping { n: 41 }).await.unwrap();
        assert_eq!(resp.n, 42);
    }

    #[tokio::test]
    async fn unknown_method_is_an_error() {
        let router = Router::new();
        let resp = router.dispatch("/nope", Value::Null).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
