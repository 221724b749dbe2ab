use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpResponse,
};
use futures::future::{ok, Ready};
use sha2::{Digest, Sha256};
use shared::ErrorResponse;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

const TOKEN_QUERY_PARAM: &str = "access_token";

fn token_digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

/// Optional shared-secret protection for the API. With no token configured
/// every request passes through.
#[derive(Clone)]
pub struct ApiTokenMiddleware {
    expected: Option<Arc<[u8; 32]>>,
}

impl ApiTokenMiddleware {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            expected: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| Arc::new(token_digest(t))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiTokenMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = ApiTokenMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiTokenMiddlewareService {
            service: Arc::new(service),
            expected: self.expected.clone(),
        })
    }
}

pub struct ApiTokenMiddlewareService<S> {
    service: Arc<S>,
    expected: Option<Arc<[u8; 32]>>,
}

#[derive(Debug)]
enum AuthError {
    MissingToken,
    InvalidHeaderFormat,
    NotBearerToken,
    TokenMismatch,
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::MissingToken => format!("No API token supplied for path: {}", path),
            AuthError::InvalidHeaderFormat => {
                format!("Invalid Authorization header format (non-UTF-8) for path: {}", path)
            }
            AuthError::NotBearerToken => {
                format!("Authorization header for path {} doesn't start with 'Bearer '", path)
            }
            AuthError::TokenMismatch => format!("API token mismatch for path: {}", path),
        }
    }

    fn client_error(&self) -> ErrorResponse {
        let error = match self {
            AuthError::TokenMismatch => "Invalid API token",
            _ => "Missing or invalid authorization token",
        };
        ErrorResponse {
            error: error.to_string(),
        }
    }
}

fn is_public_path(path: &str) -> bool {
    if path == "/api/health" {
        return true;
    }
    !path.starts_with("/api/")
}

/// Bearer header first, then the `access_token` query parameter so plain
/// links (downloads, image tags) can carry the token.
fn presented_token(req: &ServiceRequest) -> Result<String, AuthError> {
    if let Some(header) = req.headers().get("Authorization") {
        let value = header.to_str().map_err(|_| AuthError::InvalidHeaderFormat)?;
        let token = value.strip_prefix("Bearer ").ok_or(AuthError::NotBearerToken)?;
        return Ok(token.trim().to_string());
    }

    web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .ok()
        .and_then(|query| query.get(TOKEN_QUERY_PARAM).cloned())
        .ok_or(AuthError::MissingToken)
}

fn validate_request_token(req: &ServiceRequest, expected: &[u8; 32]) -> Result<(), AuthError> {
    let token = presented_token(req)?;
    if token_digest(&token) != *expected {
        return Err(AuthError::TokenMismatch);
    }
    Ok(())
}

impl<S, B> Service<ServiceRequest> for ApiTokenMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let expected = self.expected.clone();

        Box::pin(async move {
            let path_str = req.path().to_string();

            let Some(expected) = expected.filter(|_| !is_public_path(&path_str)) else {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            };
            log::debug!("Token check for path: {}", &path_str);

            match validate_request_token(&req, &expected) {
                Ok(()) => {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(auth_error) => {
                    log::warn!("{}", auth_error.log_message(&path_str));

                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(auth_error.client_error())
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}
