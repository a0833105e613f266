use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::future::{ready, Ready};
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::Arc;

/// Paths that are never throttled
const EXEMPT_PATHS: &[&str] = &["/v1/health", "/metrics"];

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide request quota shared by every server worker
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(GovernorRateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimiter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimiterMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimiterMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimiterMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<DirectLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimiterMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if EXEMPT_PATHS.contains(&req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        }

        match self.limiter.check() {
            Ok(_) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(_) => {
                tracing::warn!("Rate limit exceeded for path: {}", req.path());
                Box::pin(async {
                    Err(actix_web::error::ErrorTooManyRequests(
                        "Rate limit exceeded. Please try again later.",
                    ))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    #[actix_web::test]
    async fn test_quota_and_exempt_paths() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimiter::new(2))
                .route("/v1/check-address/x", web::get().to(|| async { HttpResponse::Ok().finish() }))
                .route("/v1/health", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/v1/check-address/x").to_request();
            assert!(test::call_service(&app, req).await.status().is_success());
        }

        let req = test::TestRequest::get().uri("/v1/check-address/x").to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(
            err.as_response_error().status_code(),
            actix_web::http::StatusCode::TOO_MANY_REQUESTS
        );

        let req = test::TestRequest::get().uri("/v1/health").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }
}
