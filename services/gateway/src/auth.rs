//! JWT verification and project-scoped auth (spec §4.7).
//!
//! The verifier is stateless per request; [`ProjectCache`] exists only to
//! avoid a registry read on every call, per spec §9's idempotency-surface
//! note. It is invalidated whenever this process handles a `PUT
//! /v1/config`; it otherwise tolerates up to `project_cache_ttl` staleness.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use streams_protocol::{ProjectClaims, ProjectConfig, Scope};

use crate::http::response::ApiError;
use crate::repo::projects;
use crate::state::AppState;

#[derive(Clone)]
pub struct ProjectCache {
    inner: moka::future::Cache<String, Arc<ProjectConfig>>,
}

impl ProjectCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: moka::future::Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub async fn get(
        &self,
        pool: &sqlx::PgPool,
        project_id: &str,
    ) -> Result<Option<Arc<ProjectConfig>>, sqlx::Error> {
        if let Some(hit) = self.inner.get(project_id).await {
            return Ok(Some(hit));
        }
        let Some(config) = projects::get(pool, project_id).await? else {
            return Ok(None);
        };
        let config = Arc::new(config);
        self.inner
            .insert(project_id.to_owned(), config.clone())
            .await;
        Ok(Some(config))
    }

    pub async fn invalidate(&self, project_id: &str) {
        self.inner.invalidate(project_id).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("project not found")]
    ProjectNotFound,
    #[error("token invalid or expired")]
    InvalidToken,
    #[error("token subject does not match project")]
    SubjectMismatch,
    #[error("scope {required:?} required, token has {actual:?}")]
    InsufficientScope { required: Scope, actual: Scope },
}

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

/// Verifies a JWT against every signing secret on the project (primary
/// first, then rotated predecessors) and checks `sub`/`exp`/scope.
pub fn verify_token(
    token: &str,
    project_id: &str,
    config: &ProjectConfig,
    required_scope: Scope,
) -> Result<ProjectClaims, AuthError> {
    // decode_header only fails fast on non-HS256 tokens; the actual trust
    // decision is the successful `decode` against a known secret below.
    let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
    if header.alg != Algorithm::HS256 {
        return Err(AuthError::InvalidToken);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["sub", "exp"]);

    let claims = config
        .signing_secrets
        .iter()
        .find_map(|secret| {
            decode::<ProjectClaims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &validation,
            )
            .ok()
        })
        .ok_or(AuthError::InvalidToken)?
        .claims;

    if claims.sub != project_id {
        return Err(AuthError::SubjectMismatch);
    }
    if !claims.scope.allows(required_scope) {
        return Err(AuthError::InsufficientScope {
            required: required_scope,
            actual: claims.scope,
        });
    }
    Ok(claims)
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken => ApiError::Unauthenticated,
            AuthError::ProjectNotFound => ApiError::NotFound("project not found".into()),
            AuthError::SubjectMismatch | AuthError::InsufficientScope { .. } => ApiError::Forbidden,
        }
    }
}

/// Loads the project, reads `Authorization: Bearer <jwt>` from `headers`,
/// and verifies it carries at least `required_scope` for `project_id`
/// (spec §4.7). Used by every non-public-bypass route.
pub async fn require_scope(
    state: &AppState,
    headers: &HeaderMap,
    project_id: &str,
    required_scope: Scope,
) -> Result<ProjectConfig, ApiError> {
    let config = state
        .projects
        .get(&state.pool, project_id)
        .await?
        .ok_or(AuthError::ProjectNotFound)?;
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .ok_or(AuthError::MissingToken)?;
    verify_token(token, project_id, &config, required_scope)?;
    Ok((*config).clone())
}

/// Like [`require_scope`], but lets an unauthenticated request through when
/// either the project or the stream itself is marked public (spec §3, §4.7
/// "Public streams additionally allow unauthenticated reads"). Always loads
/// and returns the project config, since CORS still applies to public reads.
pub async fn require_read_or_public(
    state: &AppState,
    headers: &HeaderMap,
    project_id: &str,
    stream_public: bool,
) -> Result<ProjectConfig, ApiError> {
    let config = state
        .projects
        .get(&state.pool, project_id)
        .await?
        .ok_or(AuthError::ProjectNotFound)?;
    if stream_public || config.is_public {
        return Ok((*config).clone());
    }
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .ok_or(AuthError::MissingToken)?;
    verify_token(token, project_id, &config, Scope::Read)?;
    Ok((*config).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(secret: &str, claims: &ProjectClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn config(secrets: Vec<&str>) -> ProjectConfig {
        ProjectConfig {
            signing_secrets: secrets.into_iter().map(str::to_owned).collect(),
            cors_origins: vec![],
            is_public: false,
        }
    }

    #[test]
    fn accepts_token_signed_with_primary_secret() {
        let cfg = config(vec!["primary", "old"]);
        let token = sign(
            "primary",
            &ProjectClaims {
                sub: "proj-1".into(),
                scope: Scope::Write,
                exp: 9_999_999_999,
            },
        );
        let claims = verify_token(&token, "proj-1", &cfg, Scope::Write).unwrap();
        assert_eq!(claims.sub, "proj-1");
    }

    #[test]
    fn accepts_token_signed_with_rotated_predecessor_secret() {
        let cfg = config(vec!["primary", "old"]);
        let token = sign(
            "old",
            &ProjectClaims {
                sub: "proj-1".into(),
                scope: Scope::Read,
                exp: 9_999_999_999,
            },
        );
        assert!(verify_token(&token, "proj-1", &cfg, Scope::Read).is_ok());
    }

    #[test]
    fn rejects_token_signed_with_unknown_secret() {
        let cfg = config(vec!["primary"]);
        let token = sign(
            "wrong",
            &ProjectClaims {
                sub: "proj-1".into(),
                scope: Scope::Read,
                exp: 9_999_999_999,
            },
        );
        assert!(matches!(
            verify_token(&token, "proj-1", &cfg, Scope::Read),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn rejects_subject_mismatch() {
        let cfg = config(vec!["primary"]);
        let token = sign(
            "primary",
            &ProjectClaims {
                sub: "other-project".into(),
                scope: Scope::Manage,
                exp: 9_999_999_999,
            },
        );
        assert!(matches!(
            verify_token(&token, "proj-1", &cfg, Scope::Read),
            Err(AuthError::SubjectMismatch)
        ));
    }

    #[test]
    fn rejects_insufficient_scope() {
        let cfg = config(vec!["primary"]);
        let token = sign(
            "primary",
            &ProjectClaims {
                sub: "proj-1".into(),
                scope: Scope::Read,
                exp: 9_999_999_999,
            },
        );
        assert!(matches!(
            verify_token(&token, "proj-1", &cfg, Scope::Write),
            Err(AuthError::InsufficientScope { .. })
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let cfg = config(vec!["primary"]);
        let token = sign(
            "primary",
            &ProjectClaims {
                sub: "proj-1".into(),
                scope: Scope::Read,
                exp: 1,
            },
        );
        assert!(matches!(
            verify_token(&token, "proj-1", &cfg, Scope::Read),
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn project_cache_serves_repeated_lookups_without_hitting_store() {
        let cache = ProjectCache::new(Duration::from_secs(60));
        let cfg = Arc::new(config(vec!["s"]));
        cache.inner.insert("proj-1".to_owned(), cfg.clone()).await;
        let hit = cache.inner.get("proj-1").await.unwrap();
        assert_eq!(hit.signing_secrets, cfg.signing_secrets);
        cache.invalidate("proj-1").await;
        assert!(cache.inner.get("proj-1").await.is_none());
    }
}
