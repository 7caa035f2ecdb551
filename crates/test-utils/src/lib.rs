//! streams-test-utils: shared helpers for integration tests against the
//! durable stream gateway — JWT minting against a known project secret, and
//! a fixture `ProjectConfig` builder.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use streams_protocol::{ProjectClaims, ProjectConfig, Scope};

/// Mints an HS256 token for `project_id` carrying `scope`, expiring
/// `ttl_secs` from `now_unix`. Callers pass the clock explicitly since
/// `jsonwebtoken` only needs a Unix timestamp and tests should control time.
pub fn mint_token(secret: &str, project_id: &str, scope: Scope, now_unix: i64, ttl_secs: i64) -> String {
    let claims = ProjectClaims {
        sub: project_id.to_owned(),
        scope,
        exp: now_unix + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encoding a test token should never fail")
}

/// A `ProjectConfig` fixture with one signing secret and no CORS
/// restrictions, for tests that just need a project to exist.
pub fn test_project_config(secret: &str) -> ProjectConfig {
    ProjectConfig {
        signing_secrets: vec![secret.to_owned()],
        cors_origins: vec!["*".to_owned()],
        is_public: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn mint_token_round_trips_through_verification() {
        let token = mint_token("s3cr3t", "proj-1", Scope::Write, 1_000, 60);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let decoded = decode::<ProjectClaims>(
            &token,
            &DecodingKey::from_secret(b"s3cr3t"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "proj-1");
        assert_eq!(decoded.claims.scope, Scope::Write);
        assert_eq!(decoded.claims.exp, 1_060);
    }

    #[test]
    fn test_project_config_has_one_secret_and_open_cors() {
        let config = test_project_config("abc");
        assert_eq!(config.signing_secrets, vec!["abc".to_owned()]);
        assert_eq!(config.cors_origins, vec!["*".to_owned()]);
        assert!(!config.is_public);
    }
}
