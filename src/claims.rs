use serde::{Deserialize, Serialize};

/// Identity extracted from a verified bearer token.
///
/// User tokens carry `user_name` and `user_id`; client-credential tokens carry
/// `client_id` and `sub`. Both shapes resolve to the same fields here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// `user_name`, or `client_id` for service-to-service tokens.
    pub username: String,

    /// `user_id`, or the standard `sub` claim.
    pub subject: String,

    /// Granted scopes, in the order the token lists them.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Claims {
    /// Returns `true` if the token was granted `scope`.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// The raw payload fields the verifier reads. `iat` is accepted but not enforced.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenClaims {
    pub(crate) sub: Option<String>,
    pub(crate) user_name: Option<String>,
    pub(crate) user_id: Option<String>,
    pub(crate) client_id: Option<String>,
    pub(crate) exp: Option<i64>,
    pub(crate) nbf: Option<i64>,
    pub(crate) scope: Option<Vec<String>>,
}

impl TokenClaims {
    /// `user_name`, falling back to `client_id`.
    pub(crate) fn username(&self) -> Option<&str> {
        non_empty(self.user_name.as_deref()).or_else(|| non_empty(self.client_id.as_deref()))
    }

    /// `user_id`, falling back to `sub`.
    pub(crate) fn subject(&self) -> Option<&str> {
        non_empty(self.user_id.as_deref()).or_else(|| non_empty(self.sub.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_claims(value: serde_json::Value) -> TokenClaims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn user_claims_take_precedence() {
        let claims = token_claims(json!({
            "user_name": "alice",
            "user_id": "u-1",
            "client_id": "cf",
            "sub": "s-1"
        }));

        assert_eq!(claims.username(), Some("alice"));
        assert_eq!(claims.subject(), Some("u-1"));
    }

    #[test]
    fn falls_back_to_client_claims() {
        let claims = token_claims(json!({ "client_id": "svc", "sub": "svc-sub" }));

        assert_eq!(claims.username(), Some("svc"));
        assert_eq!(claims.subject(), Some("svc-sub"));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let claims = token_claims(json!({ "user_name": "", "client_id": "svc", "user_id": "", "sub": "" }));

        assert_eq!(claims.username(), Some("svc"));
        assert_eq!(claims.subject(), None);
    }

    #[test]
    fn has_scope_matches_exactly() {
        let claims = Claims {
            username: "alice".into(),
            subject: "u-1".into(),
            scopes: vec!["openid".into(), "cloud_controller.read".into()],
        };

        assert!(claims.has_scope("cloud_controller.read"));
        assert!(!claims.has_scope("cloud_controller"));
    }
}
