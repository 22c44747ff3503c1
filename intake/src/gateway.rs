use crate::config::{Config, SinkConfig};
use crate::dispatch::{AcceptedTask, Dispatcher};
use crate::errors::{IntakeError, RequestError};
use crate::http::{HandlerBody, empty_response, error_response, json_response};
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS};
use crate::request::{TaskRequest, iso_timestamp};
use chrono::Utc;
use http_body_util::BodyExt;
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use shared::{counter, histogram};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// The intake endpoint: validates submissions and hands accepted ones to the
/// dispatcher without waiting for the outcome.
pub struct Gateway {
    config: Arc<Config>,
    dispatcher: Dispatcher,
}

impl Gateway {
    pub fn new(config: Arc<Config>, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handles one request. Rejections become JSON error responses; nothing
    /// that happens during dispatch reaches the caller.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<HandlerBody>
    where
        B: Body,
        B::Error: Display,
    {
        let start = Instant::now();

        let (outcome, response) = match self.route(req).await {
            Ok(result) => result,
            Err(e) => {
                match &e {
                    RequestError::Internal(detail) => {
                        tracing::error!(detail = %detail, "Failed to handle request")
                    }
                    rejection => tracing::warn!(error = %rejection, "Request rejected"),
                }
                (e.outcome(), error_response(&e))
            }
        };

        counter!(REQUESTS, "outcome" => outcome).increment(1);
        histogram!(REQUEST_DURATION).record(start.elapsed().as_secs_f64());
        response
    }

    async fn route<B>(
        &self,
        req: Request<B>,
    ) -> Result<(&'static str, Response<HandlerBody>), RequestError>
    where
        B: Body,
        B::Error: Display,
    {
        if req.uri().path() != self.config.path {
            return Err(RequestError::NotFound);
        }

        match req.method() {
            &Method::OPTIONS => Ok(("preflight", empty_response(StatusCode::OK))),
            &Method::GET => Ok(("status", json_response(StatusCode::OK, &self.status()))),
            &Method::POST => {
                let response = self.submit(req.into_body()).await?;
                Ok(("accepted", response))
            }
            _ => Err(RequestError::MethodNotAllowed),
        }
    }

    fn status(&self) -> serde_json::Value {
        json!({
            "success": true,
            "status": "operational",
            "message": "Task intake gateway is running",
            "endpoint": self.config.path,
            "method": "POST",
            "timestamp": iso_timestamp(Utc::now()),
            "worker_configured": matches!(self.config.sink, SinkConfig::Forward { .. }),
            "sink": self.config.sink.kind(),
        })
    }

    async fn submit<B>(&self, body: B) -> Result<Response<HandlerBody>, RequestError>
    where
        B: Body,
        B::Error: Display,
    {
        let body = body
            .collect()
            .await
            .map_err(|e| RequestError::Internal(format!("Failed to read request body: {e}")))?
            .to_bytes();

        let request = TaskRequest::from_slice(&body)?;
        request.authenticate(&self.config.secret)?;
        request.check_required()?;

        tracing::debug!(
            task = %request.task,
            round = %request.round,
            nonce = %request.nonce,
            "Task accepted"
        );

        let response = json_response(
            StatusCode::OK,
            &json!({
                "success": true,
                "message": self.accepted_message(),
                "task": request.task,
                "round": request.round,
                "nonce": request.nonce,
                "timestamp": iso_timestamp(Utc::now()),
            }),
        );

        self.dispatcher.spawn(AcceptedTask { body, request });
        Ok(response)
    }

    fn accepted_message(&self) -> &'static str {
        match self.config.sink {
            SinkConfig::Forward { .. } => "Task received and forwarded to worker",
            SinkConfig::Queue { .. } => "Task received and queued for processing",
        }
    }
}

/// Adapts [`Gateway`] to a hyper service.
pub struct IntakeService {
    gateway: Arc<Gateway>,
}

impl IntakeService {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

impl Service<Request<Incoming>> for IntakeService {
    type Response = Response<HandlerBody>;
    type Error = IntakeError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let gateway = self.gateway.clone();
        Box::pin(async move { Ok(gateway.handle(req).await) })
    }
}
