use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Identity claims the client cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl Profile {
    /// Reads the claims segment of an OIDC ID token. The signature is not
    /// checked here: the backend is the one that rejects bad tokens.
    pub fn from_id_token(token: &str) -> anyhow::Result<Self> {
        let claims = token
            .split('.')
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("ID token is not a JWT"))?;
        // Tolerate issuers that pad the segment.
        let decoded = URL_SAFE_NO_PAD
            .decode(claims.trim_end_matches('='))
            .map_err(|e| anyhow::anyhow!("Base64 decode error: {}", e))?;
        let profile = serde_json::from_slice(&decoded)?;
        Ok(profile)
    }
}

/// Username, then email, then "Unknown". Blank claims are skipped; the
/// chosen claim is used as-is so it matches what the backend records.
pub fn resolve_author(profile: &Profile) -> String {
    [&profile.preferred_username, &profile.email]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .map(String::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

/// Caller-side precondition for submitting: content must not be blank.
/// The content itself is passed through untouched.
pub fn validate_content(content: &str) -> Option<&str> {
    if content.trim().is_empty() {
        None
    } else {
        Some(content)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub profile: Profile,
}

impl Session {
    pub fn new(token: impl Into<String>, profile: Profile) -> Self {
        Session {
            token: token.into(),
            profile,
        }
    }

    pub fn author(&self) -> String {
        resolve_author(&self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(username: Option<&str>, email: Option<&str>) -> Profile {
        Profile {
            preferred_username: username.map(String::from),
            email: email.map(String::from),
            name: Some("Alice Liddell".to_string()),
        }
    }

    #[test]
    fn test_author_prefers_username_then_email() {
        assert_eq!(resolve_author(&profile(Some("alice"), Some("a@x.io"))), "alice");
        assert_eq!(resolve_author(&profile(None, Some("a@x.io"))), "a@x.io");
        assert_eq!(resolve_author(&profile(Some("  "), Some("a@x.io"))), "a@x.io");
        assert_eq!(resolve_author(&profile(None, None)), "Unknown");
    }

    #[test]
    fn test_author_claim_is_not_trimmed() {
        assert_eq!(resolve_author(&profile(Some(" alice "), None)), " alice ");
        assert_eq!(resolve_author(&profile(Some(""), Some(" a@x.io"))), " a@x.io");
    }

    #[test]
    fn test_display_name_is_not_used_for_author() {
        let p = Profile {
            name: Some("Alice".to_string()),
            ..Profile::default()
        };
        assert_eq!(resolve_author(&p), "Unknown");
    }

    #[test]
    fn test_profile_from_id_token_claims() {
        let claims = r#"{"sub":"1","preferred_username":"alice","email":"alice@example.com"}"#;
        let token = format!("eyJhbGciOiJSUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(claims));
        let p = Profile::from_id_token(&token).unwrap();
        assert_eq!(p.preferred_username.as_deref(), Some("alice"));
        assert_eq!(p.email.as_deref(), Some("alice@example.com"));
        assert_eq!(p.name, None);
    }

    #[test]
    fn test_garbage_token_is_an_error() {
        assert!(Profile::from_id_token("not-a-jwt").is_err());
        assert!(Profile::from_id_token("a.!!!.c").is_err());
    }

    #[test]
    fn test_blank_content_is_rejected() {
        assert_eq!(validate_content("   \n"), None);
        assert_eq!(validate_content(""), None);
        assert_eq!(validate_content("  hi "), Some("  hi "));
    }
}
