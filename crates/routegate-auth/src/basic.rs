//! HTTP Basic authentication credentials

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::AuthError;

/// Username and password carried by a `Basic` authorization header
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse an `Authorization` header value
    ///
    /// The scheme is matched case-insensitively. The decoded payload is split
    /// on the first `:` so passwords may themselves contain colons.
    pub fn from_header(header: Option<&str>) -> Result<Self, AuthError> {
        let header = header.ok_or(AuthError::MissingAuthHeader)?;

        let (scheme, encoded) = header
            .trim()
            .split_once(' ')
            .ok_or(AuthError::InvalidAuthHeader)?;

        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::InvalidAuthHeader);
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::InvalidAuthHeader)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidAuthHeader)?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or(AuthError::InvalidAuthHeader)?;

        Ok(Self::new(username, password))
    }

    /// Encode as an `Authorization` header value
    pub fn to_header_value(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        // "alice:s3cret"
        let creds = BasicCredentials::from_header(Some("Basic YWxpY2U6czNjcmV0")).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "s3cret");

        let creds = BasicCredentials::from_header(Some("basic YWxpY2U6czNjcmV0")).unwrap();
        assert_eq!(creds.username, "alice");
    }

    #[test]
    fn test_password_may_contain_colon() {
        let header = BasicCredentials::new("bob", "a:b:c").to_header_value();
        let creds = BasicCredentials::from_header(Some(&header)).unwrap();
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.password, "a:b:c");
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            BasicCredentials::from_header(None),
            Err(AuthError::MissingAuthHeader)
        ));
    }

    #[test]
    fn test_malformed_headers() {
        for header in [
            "Bearer abc.def",
            "Basic",
            "Basic !!!not-base64!!!",
            // "nocolon"
            "Basic bm9jb2xvbg==",
        ] {
            assert!(
                matches!(
                    BasicCredentials::from_header(Some(header)),
                    Err(AuthError::InvalidAuthHeader)
                ),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = BasicCredentials::new("alice", "s3cret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("s3cret"));
    }
}
