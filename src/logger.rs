use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::{info, warn};
use std::rc::Rc;
use std::time::Instant;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Id assigned to each request, available to handlers through request extensions
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

tokio::task_local! {
    static CURRENT_REQUEST_ID: Uuid;
}

/// Id of the request being served, when called from inside `LoggerMiddleware`
pub fn current_request_id() -> Option<Uuid> {
    CURRENT_REQUEST_ID.try_with(|id| *id).ok()
}

/// Request logging middleware
///
/// Logs method, path, status and latency of every request and echoes a
/// request id back in `x-request-id`.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4();
        let method = req.method().to_string();
        let path = req.path().to_string();

        req.extensions_mut().insert(RequestId(request_id));
        info!("[{}] Request started: {} {}", request_id, method, path);

        let service = self.service.clone();
        let http_request = req.request().clone();

        // Errors are rendered inside the scope so their `errorId` is the request id
        Box::pin(CURRENT_REQUEST_ID.scope(request_id, async move {
            let mut res = match service.call(req).await {
                Ok(res) => {
                    info!(
                        "[{}] Request completed: {} {} - Status: {} ({}ms)",
                        request_id,
                        method,
                        path,
                        res.status().as_u16(),
                        start_time.elapsed().as_millis()
                    );
                    res.map_into_left_body()
                }
                Err(e) => {
                    let res = ServiceResponse::from_err(e, http_request);
                    warn!(
                        "[{}] Request rejected: {} {} - Status: {} ({}ms)",
                        request_id,
                        method,
                        path,
                        res.status().as_u16(),
                        start_time.elapsed().as_millis()
                    );
                    res.map_into_right_body()
                }
            };

            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                res.headers_mut()
                    .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
            }
            Ok(res)
        }))
    }
}
