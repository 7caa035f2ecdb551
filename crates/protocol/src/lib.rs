// streams-protocol: wire types and encoding rules shared by every client of
// the durable stream service.
//
// Nothing here touches I/O. Offset encoding, cursor math, and the JSON
// contracts live here so the gateway and any future client crate agree on
// byte-for-byte framing without re-deriving it.

use serde::{Deserialize, Serialize};

pub mod cursor;
pub mod offset;

pub use cursor::generate_response_cursor;
pub use offset::{Offset, OffsetParseError, RequestedOffset};

/// Auth scopes carried in a project JWT. Ordered by increasing privilege;
/// `Scope::allows` encodes the subset rules from spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Manage,
}

impl Scope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "manage" => Some(Self::Manage),
            _ => None,
        }
    }

    /// Whether a token with this scope may perform `required`.
    pub fn allows(self, required: Scope) -> bool {
        let rank = |s: Scope| match s {
            Scope::Read => 0,
            Scope::Write => 1,
            Scope::Manage => 2,
        };
        rank(self) >= rank(required)
    }
}

/// Claims carried by the project-scoped HS256 JWT described in spec §4.7.
/// Minted externally; this crate only defines the shape both sides agree on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectClaims {
    /// Must equal the requested `projectId`.
    pub sub: String,
    pub scope: Scope,
    /// Unix seconds; enforced by the verifying side.
    pub exp: i64,
}

/// Stored project registry entry (spec §6).
///
/// `signingSecrets` is ordered: index 0 is primary (used to sign), the rest
/// are accepted-but-rotated-out predecessors. Deserializes a legacy
/// single-secret entry (`signingSecret: String`) into a one-element list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default, alias = "signingSecret", deserialize_with = "one_or_many")]
    pub signing_secrets: Vec<String>,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// Frozen HTTP error envelope used by every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub error: String,
}

impl HttpErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Returns true for any content type spec §4.4 treats as JSON-framed:
/// `application/json*`, `text/json*`, or anything ending in `+json`.
pub fn is_json_content_type(content_type: &str) -> bool {
    let base = content_type.split(';').next().unwrap_or("").trim();
    base.starts_with("application/json") || base.starts_with("text/json") || base.ends_with("+json")
}

/// JSON body sent by `POST /v1/estuary/subscribe/{projectId}/{sourceStreamId}`
/// and the unsubscribe counterpart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstuarySubscribeRequest {
    #[serde(rename = "estuaryId")]
    pub estuary_id: String,
}

/// Identifier charset shared by `projectId`, `streamId`, and `estuaryId`:
/// `[A-Za-z0-9_\-:.]`, length 1..=128.
pub fn is_valid_identifier(id: &str) -> bool {
    if id.is_empty() || id.len() > 128 {
        return false;
    }
    id.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_allows_is_monotone() {
        assert!(Scope::Manage.allows(Scope::Read));
        assert!(Scope::Manage.allows(Scope::Write));
        assert!(Scope::Manage.allows(Scope::Manage));
        assert!(Scope::Write.allows(Scope::Read));
        assert!(!Scope::Write.allows(Scope::Manage));
        assert!(!Scope::Read.allows(Scope::Write));
    }

    #[test]
    fn project_config_normalizes_legacy_single_secret() {
        let parsed: ProjectConfig = serde_json::from_str(r#"{"signingSecret":"abc"}"#).unwrap();
        assert_eq!(parsed.signing_secrets, vec!["abc".to_owned()]);
    }

    #[test]
    fn project_config_keeps_ordered_secret_list() {
        let parsed: ProjectConfig =
            serde_json::from_str(r#"{"signingSecrets":["new","old"]}"#).unwrap();
        assert_eq!(
            parsed.signing_secrets,
            vec!["new".to_owned(), "old".to_owned()]
        );
    }

    #[test]
    fn json_content_type_matches_all_three_forms() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("text/json"));
        assert!(is_json_content_type("application/vnd.api+json"));
        assert!(!is_json_content_type("application/octet-stream"));
        assert!(!is_json_content_type("text/plain"));
    }

    #[test]
    fn identifier_charset_rejects_bad_chars_and_lengths() {
        assert!(is_valid_identifier("Project-1:a.b_c"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("has space"));
        assert!(!is_valid_identifier(&"a".repeat(129)));
        assert!(is_valid_identifier(&"a".repeat(128)));
    }
}
