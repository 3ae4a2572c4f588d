//! Per-request credential resolution
//!
//! A credential is looked up in a fixed priority order on every request:
//! the `x-api-key` header, then the `apiKey` query parameter, then the
//! process-wide default. The resolved value is threaded through a single
//! call and dropped with it.

use std::fmt;

/// Header carrying the caller's Token Metrics API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query parameter carrying the caller's Token Metrics API key
pub const API_KEY_QUERY: &str = "apiKey";

/// Environment variable holding the process-wide default key
pub const API_KEY_ENV: &str = "TOKEN_METRICS_API_KEY";

/// An opaque upstream API key.
///
/// `Debug` and `Display` are redacted so the value cannot leak through
/// tracing fields or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw key. Blank input yields `None`.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The raw key, for injection into the upstream request only
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Resolve the credential for one request.
///
/// Returns the first present, non-blank value of `header`, `query`,
/// `fallback`. Absence is not an error here; the dispatcher decides
/// whether the method needs one.
#[must_use]
pub fn resolve_credential(
    header: Option<&str>,
    query: Option<&str>,
    fallback: Option<&Credential>,
) -> Option<Credential> {
    header
        .and_then(Credential::new)
        .or_else(|| query.and_then(Credential::new))
        .or_else(|| fallback.cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(s: &str) -> Credential {
        Credential::new(s).unwrap()
    }

    #[test]
    fn header_wins_over_everything() {
        let default = cred("default");
        let got = resolve_credential(Some("hdr"), Some("qry"), Some(&default));
        assert_eq!(got, Some(cred("hdr")));
    }

    #[test]
    fn query_used_when_header_absent() {
        let default = cred("default");
        let got = resolve_credential(None, Some("qry"), Some(&default));
        assert_eq!(got, Some(cred("qry")));
    }

    #[test]
    fn empty_header_falls_through() {
        let got = resolve_credential(Some(""), Some("qry"), None);
        assert_eq!(got, Some(cred("qry")));
        let got = resolve_credential(Some("   "), None, None);
        assert_eq!(got, None);
    }

    #[test]
    fn default_used_last() {
        let default = cred("default");
        assert_eq!(
            resolve_credential(None, None, Some(&default)),
            Some(cred("default"))
        );
        assert_eq!(resolve_credential(None, Some(""), None), None);
    }

    #[test]
    fn debug_and_display_are_redacted() {
        let c = cred("super-secret");
        assert!(!format!("{c:?}").contains("super-secret"));
        assert!(!format!("{c}").contains("super-secret"));
        assert_eq!(c.expose(), "super-secret");
    }
}
