//! Per-endpoint request counters.
//!
//! Request tracing itself is handled by `tracing_actix_web::TracingLogger`;
//! this middleware only feeds [`AppState`] so `/api/v1/metrics` can report
//! timings and error rates per route.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::warn;

pub struct RequestMetrics;

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestMetricsService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestMetricsService { service }))
    }
}

pub struct RequestMetricsService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestMetricsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let endpoint = format!("{} {}", req.method(), req.path());

        // Cloned up front: on the error path there is no response to read it from.
        let state = req.app_data::<web::Data<AppState>>().cloned();
        if let Some(state) = &state {
            state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => response.status().is_client_error() || response.status().is_server_error(),
                Err(_) => true,
            };

            if let Some(state) = state {
                state.record_endpoint_request(&endpoint, duration_ms, is_error);
                if is_error {
                    state.increment_error_count();
                }
            }

            if is_error {
                let status = result.as_ref().map(|r| r.status().as_u16()).unwrap_or(500);
                warn!(endpoint = %endpoint, status, duration_ms, "Request failed");
            }

            result
        })
    }
}
