use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::resolver::{AuthError, Identity};
use crate::error::ApiError;
use crate::limiter::Tier;
use crate::middleware::request_id::TenantTag;
use crate::state::AppState;
use crate::tenant::TenantHandle;

/// Authenticated caller context, injected by this middleware and consumed
/// by the rate-limit layer and the handlers.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub identity: Identity,
    pub handle: TenantHandle,
    pub tier: Tier,
}

/// Bearer authentication middleware: verifies the credential, derives the
/// tenant handle, and injects [`AuthContext`] into the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(request.headers()).map_err(ApiError::from)?;

    let identity = state.resolver.resolve(&token).map_err(ApiError::from)?;

    let handle = state.binder.handle_for(&identity);
    let tier = identity.tier;

    let tag = TenantTag(handle.as_str().to_string());
    request.extensions_mut().insert(AuthContext {
        identity,
        handle,
        tier,
    });

    let mut response = next.run(request).await;
    // For the audit trail only; response bodies never carry the handle.
    response.extensions_mut().insert(tag);
    Ok(response)
}

/// Extract the bearer token from the Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| AuthError::Unauthenticated("missing Authorization header".to_string()))?;

    let auth_str = auth_header.to_str().map_err(|_| {
        AuthError::Unauthenticated("malformed Authorization header".to_string())
    })?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Some(_) => Err(AuthError::Unauthenticated("empty bearer token".to_string())),
        None => Err(AuthError::Unauthenticated(
            "Authorization header must use the Bearer scheme".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        let token = extract_bearer(&headers_with("Bearer abc.def.ghi")).unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        assert!(matches!(
            extract_bearer(&HeaderMap::new()),
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        assert!(matches!(
            extract_bearer(&headers_with("Basic dXNlcjpwYXNz")),
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(
            extract_bearer(&headers_with("Bearer   ")),
            Err(AuthError::Unauthenticated(_))
        ));
    }
}
