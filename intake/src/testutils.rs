use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;

/// What a fake worker saw
pub struct ForwardedRequest {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Starts a worker endpoint that records every request and answers with
/// `status` after waiting `delay`.
pub async fn start_worker(
    status: StatusCode,
    delay: Duration,
) -> (Url, mpsc::UnboundedReceiver<ForwardedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let tx = tx.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let tx = tx.clone();
                    async move {
                        let content_type = req
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        let body = req
                            .into_body()
                            .collect()
                            .await
                            .map(|collected| collected.to_bytes())
                            .unwrap_or_else(|_| Bytes::new());
                        let _ = tx.send(ForwardedRequest { body, content_type });

                        tokio::time::sleep(delay).await;
                        let mut response = Response::new(Full::new(Bytes::new()));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });

                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    let url = Url::parse(&format!("http://127.0.0.1:{port}/tasks")).expect("Failed to parse URL");
    (url, rx)
}

/// A complete, valid submission for secret `S`.
pub fn task_body(nonce: &str) -> Value {
    json!({
        "email": "a@b.com",
        "secret": "S",
        "task": "t1",
        "round": 1,
        "nonce": nonce,
        "brief": "b",
        "evaluation_url": "http://e"
    })
}
