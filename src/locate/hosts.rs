//! Internal/external classification of link targets.

use url::Url;

use crate::config::DEFAULT_RESERVED_PATH_PREFIXES;
use crate::error_handling::InitializationError;

/// A registered internal host, as configured (`host`, `host:port`, or a full URL).
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostCandidate {
    host: String,
    scheme: Option<String>,
    port: Option<u16>,
}

impl HostCandidate {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains("://") {
            let url = Url::parse(raw).ok()?;
            return Some(Self {
                host: url.host_str()?.to_ascii_lowercase(),
                scheme: Some(url.scheme().to_ascii_lowercase()),
                port: url.port(),
            });
        }
        // Scheme-less. A non-special scheme keeps every explicit port.
        let url = Url::parse(&format!("sentinel://{raw}")).ok()?;
        Some(Self {
            host: url.host_str()?.to_ascii_lowercase(),
            scheme: None,
            port: url.port(),
        })
    }
}

/// The site's identity: base URL, every host that counts as "this site", and
/// path prefixes that are never scanned.
#[derive(Debug, Clone)]
pub struct SiteHosts {
    base: Url,
    primary: String,
    candidates: Vec<HostCandidate>,
    reserved_prefixes: Vec<String>,
}

fn strip_www(host: &str) -> &str {
    match host.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("www.") => &host[4..],
        _ => host,
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    }
}

/// True when `value` starts with a URI scheme (`mailto:`, `https:`, ...).
pub(crate) fn scheme_of(value: &str) -> Option<&str> {
    let colon = value.find(':')?;
    let scheme = &value[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme)
    } else {
        None
    }
}

impl SiteHosts {
    pub fn new(
        site_url: &str,
        extra_hosts: &[String],
        reserved_prefixes: &[String],
    ) -> Result<Self, InitializationError> {
        let base = Url::parse(site_url)
            .map_err(|e| InitializationError::SiteUrlError(format!("{site_url}: {e}")))?;
        let primary = base
            .host_str()
            .filter(|_| matches!(base.scheme(), "http" | "https"))
            .ok_or_else(|| {
                InitializationError::SiteUrlError(format!("{site_url}: not an http(s) URL"))
            })?
            .to_ascii_lowercase();

        let mut candidates = vec![HostCandidate {
            host: primary.clone(),
            scheme: None,
            port: None,
        }];
        for raw in extra_hosts {
            if let Some(candidate) = HostCandidate::parse(raw) {
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }

        let reserved_prefixes = if reserved_prefixes.is_empty() {
            DEFAULT_RESERVED_PATH_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            reserved_prefixes.to_vec()
        };

        Ok(Self {
            base,
            primary,
            candidates,
            reserved_prefixes,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Whether `url` targets this site.
    ///
    /// Relative references are always internal. Absolute http(s) URLs are
    /// internal when their host matches a registered host after dropping a
    /// `www.` prefix and the ports reconcile.
    pub fn is_internal(&self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        let owned;
        let url = if url.starts_with("//") {
            owned = format!("{}:{url}", self.base.scheme());
            owned.as_str()
        } else {
            url
        };
        match scheme_of(url) {
            None => return true,
            Some(scheme) if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") => {
                return false
            }
            Some(_) => {}
        }
        let Ok(link) = Url::parse(url) else {
            return false;
        };
        let Some(link_host) = link.host_str() else {
            return false;
        };
        let link_scheme = link.scheme();
        let link_host = strip_www(link_host).to_ascii_lowercase();
        let link_port = link.port();
        let site_port = self.base.port();
        let primary = strip_www(&self.primary);

        for candidate in &self.candidates {
            let candidate_host = strip_www(&candidate.host);
            if link_host != candidate_host {
                continue;
            }
            let is_primary = candidate_host == primary;

            match (candidate.port, link_port) {
                (Some(c), Some(l)) if c != l => continue,
                (Some(c), None) => {
                    let scheme = candidate.scheme.as_deref().unwrap_or(link_scheme);
                    if default_port(link_scheme).or(default_port(scheme)) != Some(c) {
                        continue;
                    }
                }
                (None, Some(l)) if is_primary && Some(l) != site_port => continue,
                _ => {}
            }
            return true;
        }
        false
    }

    /// Absolute form of `url`, resolved against the site base.
    pub fn absolutize(&self, url: &str) -> Option<Url> {
        let url = url.trim();
        if url.starts_with("//") {
            return Url::parse(&format!("{}:{url}", self.base.scheme())).ok();
        }
        self.base.join(url).ok()
    }

    /// True when `url` is on the site's own scheme, host and port.
    pub fn is_site_origin(&self, url: &Url) -> bool {
        url.scheme() == self.base.scheme()
            && url.host_str().map(str::to_ascii_lowercase).as_deref() == Some(self.primary.as_str())
            && url.port_or_known_default() == self.base.port_or_known_default()
    }

    /// Site-relative form (`/path?query#fragment`) of a URL on the site origin;
    /// other URLs are returned in full.
    pub fn relativize(&self, url: &Url) -> String {
        if !self.is_site_origin(url) {
            return url.to_string();
        }
        let mut out = url.path().to_string();
        if let Some(query) = url.query() {
            out.push('?');
            out.push_str(query);
        }
        if let Some(fragment) = url.fragment() {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }

    /// Whether the path of `url` falls under a reserved prefix (admin, login).
    pub fn is_reserved_path(&self, url: &str) -> bool {
        let Some(absolute) = self.absolutize(url) else {
            return false;
        };
        let path = absolute.path();
        self.reserved_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
