use url::Url;

pub const MAX_RESPONSE_BODY_BYTES: u64 = 10 * 1024 * 1024;

const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

/// Outcome of evaluating a `NetworkFetch` target against the URL policy.
/// A `warning` host is not rejected here; the Policy Engine decides whether
/// to deny it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPolicyDecision {
    pub allowed: bool,
    pub warning: Option<String>,
}

/// Rejects any scheme outside `{http, https}`. Flags loopback, unspecified,
/// link-local and private-range hosts with a warning rather than blocking
/// them outright.
pub fn evaluate_url(raw_url: &str) -> Result<UrlPolicyDecision, String> {
    let url = Url::parse(raw_url).map_err(|e| format!("invalid url `{raw_url}`: {e}"))?;

    if !ALLOWED_SCHEMES.contains(&url.scheme()) {
        return Err(format!(
            "scheme `{}` is not allowed, only http and https",
            url.scheme()
        ));
    }

    let host = url.host_str().ok_or_else(|| "url has no host".to_string())?;
    let warning = warning_for_host(host);

    Ok(UrlPolicyDecision {
        allowed: true,
        warning,
    })
}

fn warning_for_host(host: &str) -> Option<String> {
    if host == "localhost" || host == "0.0.0.0" || host == "[::1]" || host == "::1" {
        return Some(format!("`{host}` is a loopback/unspecified host"));
    }
    if let Ok(ip) = host.parse::<std::net::Ipv4Addr>() {
        let octets = ip.octets();
        if ip.is_loopback() {
            return Some(format!("`{host}` is a loopback address"));
        }
        if octets[0] == 169 && octets[1] == 254 {
            return Some(format!("`{host}` is a link-local address"));
        }
        if octets[0] == 10 {
            return Some(format!("`{host}` is a private (10.0.0.0/8) address"));
        }
        if octets[0] == 192 && octets[1] == 168 {
            return Some(format!("`{host}` is a private (192.168.0.0/16) address"));
        }
    }
    None
}

/// Tracks bytes received against [`MAX_RESPONSE_BODY_BYTES`], enforcing the
/// cap both from a declared `Content-Length` and from a running byte count
/// as the body streams in.
pub struct BodyCapGuard {
    limit: u64,
    received: u64,
}

impl BodyCapGuard {
    pub fn new() -> Self {
        Self {
            limit: MAX_RESPONSE_BODY_BYTES,
            received: 0,
        }
    }

    pub fn check_content_length(&self, content_length: u64) -> Result<(), String> {
        if content_length > self.limit {
            return Err(format!(
                "content-length {content_length} exceeds the {} byte cap",
                self.limit
            ));
        }
        Ok(())
    }

    pub fn record_chunk(&mut self, chunk_len: u64) -> Result<(), String> {
        self.received += chunk_len;
        if self.received > self.limit {
            return Err(format!(
                "response body exceeded the {} byte cap after {} bytes",
                self.limit, self.received
            ));
        }
        Ok(())
    }
}

impl Default for BodyCapGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_to_a_public_host_is_allowed_without_warning() {
        let decision = evaluate_url("https://api.example.com/v1/search").unwrap();
        assert!(decision.allowed);
        assert!(decision.warning.is_none());
    }

    #[test]
    fn ftp_scheme_is_rejected() {
        assert!(evaluate_url("ftp://example.com/file").is_err());
    }

    #[test]
    fn loopback_host_is_allowed_with_a_warning() {
        let decision = evaluate_url("http://127.0.0.1:8080/").unwrap();
        assert!(decision.allowed);
        assert!(decision.warning.is_some());
    }

    #[test]
    fn private_range_host_is_allowed_with_a_warning() {
        let decision = evaluate_url("http://192.168.1.5/").unwrap();
        assert!(decision.warning.is_some());
    }

    #[test]
    fn content_length_over_cap_is_rejected() {
        let guard = BodyCapGuard::new();
        assert!(guard.check_content_length(MAX_RESPONSE_BODY_BYTES + 1).is_err());
    }

    #[test]
    fn streamed_chunks_over_cap_are_rejected() {
        let mut guard = BodyCapGuard::new();
        assert!(guard.record_chunk(MAX_RESPONSE_BODY_BYTES - 1).is_ok());
        assert!(guard.record_chunk(2).is_err());
    }
}
