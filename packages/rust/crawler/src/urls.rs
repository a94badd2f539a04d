//! URL validation, normalization and link filtering.

use url::Url;

use artemis_shared::{ArtemisError, Result};

/// Link targets never worth fetching as HTML.
const BINARY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg", "pdf", "zip", "exe"];

/// Parse a seed URL and require an `http(s)` scheme with a host.
pub fn validate_seed(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ArtemisError::invalid_seed(raw, e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ArtemisError::invalid_seed(
                raw,
                format!("unsupported scheme '{other}'"),
            ));
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ArtemisError::invalid_seed(raw, "missing host"));
    }

    Ok(url)
}

/// Canonical form used for dedup and as the frontier key: fragment and
/// query stripped. Applying it twice yields the same string.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.set_query(None);
    normalized.to_string()
}

/// Parse then normalize. `None` for unparseable input.
pub fn normalize_str(raw: &str) -> Option<String> {
    Url::parse(raw).ok().map(|u| normalize_url(&u))
}

/// `scheme://host[:port]` key used for robots caching and page caps.
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Whether the path ends in a known binary extension.
pub fn is_binary_target(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| BINARY_EXTENSIONS.contains(&ext))
}

/// Resolve an `href` against `base` into a fetchable page URL.
///
/// Drops in-page anchors, `mailto:`, `tel:`, `javascript:`, non-http(s)
/// targets and binary files. The fragment is stripped; the query is kept.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("tel:") || lower.starts_with("javascript:")
    {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);

    if !matches!(resolved.scheme(), "http" | "https") || is_binary_target(&resolved) {
        return None;
    }
    Some(resolved)
}

/// Filesystem-safe version of a host name.
pub fn sanitize_host(host: &str) -> String {
    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_validation() {
        assert!(validate_seed("https://example.com/start").is_ok());
        assert!(validate_seed("http://example.com").is_ok());

        let err = validate_seed("ftp://example.com").unwrap_err();
        assert!(matches!(err, ArtemisError::InvalidSeedUrl { .. }));

        assert!(validate_seed("not a url").is_err());
        assert!(validate_seed("mailto:someone@example.com").is_err());
    }

    #[test]
    fn normalize_strips_fragment_and_query() {
        let url = Url::parse("https://docs.example.com/guide/intro?ref=nav#section-1").unwrap();
        assert_eq!(normalize_url(&url), "https://docs.example.com/guide/intro");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "https://example.com",
            "https://Example.COM/a/b/?x=1#top",
            "http://example.com:8080/path#frag",
            "https://example.com/a%20b?q=%2F",
            "https://user@example.com/deep/er/",
        ] {
            let once = normalize_str(raw).unwrap();
            let twice = normalize_str(&once).unwrap();
            assert_eq!(once, twice, "normalization of {raw} not idempotent");
        }
    }

    #[test]
    fn resolve_filters_links() {
        let base = Url::parse("https://docs.example.com/page1").unwrap();

        assert_eq!(
            resolve_link(&base, "/page2#top").unwrap().as_str(),
            "https://docs.example.com/page2"
        );
        assert_eq!(
            resolve_link(&base, "relative/path").unwrap().as_str(),
            "https://docs.example.com/relative/path"
        );
        assert!(resolve_link(&base, "#section").is_none());
        assert!(resolve_link(&base, "mailto:a@example.com").is_none());
        assert!(resolve_link(&base, "TEL:+15551234").is_none());
        assert!(resolve_link(&base, "javascript:void(0)").is_none());
        assert!(resolve_link(&base, "ftp://files.example.com/x").is_none());
        assert!(resolve_link(&base, "/brochure.PDF").is_none());
        assert!(resolve_link(&base, "/logo.png").is_none());
    }

    #[test]
    fn origin_and_host_helpers() {
        let url = Url::parse("http://127.0.0.1:8080/a/b").unwrap();
        assert_eq!(origin_key(&url), "http://127.0.0.1:8080");
        assert_eq!(sanitize_host("docs.example.com"), "docs.example.com");
        assert_eq!(sanitize_host("[::1]"), "___1_");
    }
}
