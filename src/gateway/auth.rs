use subtle::ConstantTimeEq;

use crate::error::ProxyError;

/// Inbound header carrying the shared secret.
pub const PROXY_AUTH_HEADER: &str = "x-proxy-auth";

/// Accept the request iff the presented value equals the configured secret.
/// An empty secret authorizes nothing.
pub fn authorize(secret: &str, presented: Option<&str>) -> Result<(), ProxyError> {
    match presented {
        Some(token) if !secret.is_empty() && constant_time_eq(token, secret) => Ok(()),
        _ => Err(ProxyError::Unauthorized),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_secret_is_authorized() {
        assert!(authorize("s3cret", Some("s3cret")).is_ok());
    }

    #[test]
    fn missing_or_wrong_secret_is_rejected() {
        assert!(matches!(
            authorize("s3cret", None),
            Err(ProxyError::Unauthorized)
        ));
        assert!(matches!(
            authorize("s3cret", Some("s3cre")),
            Err(ProxyError::Unauthorized)
        ));
        assert!(matches!(
            authorize("s3cret", Some("S3CRET")),
            Err(ProxyError::Unauthorized)
        ));
        assert!(matches!(
            authorize("s3cret", Some("")),
            Err(ProxyError::Unauthorized)
        ));
    }

    #[test]
    fn empty_secret_rejects_everything() {
        assert!(authorize("", Some("")).is_err());
        assert!(authorize("", None).is_err());
        assert!(authorize("", Some("anything")).is_err());
    }

    #[test]
    fn comparison_is_exact_without_trimming() {
        assert!(authorize("s3cret", Some(" s3cret")).is_err());
        assert!(authorize("s3cret", Some("s3cret ")).is_err());
    }
}
