use crate::error::LinkError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// URL schemes a [`Link`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn parse(raw: &str) -> Result<Self, LinkError> {
        if raw.eq_ignore_ascii_case("http") {
            Ok(Scheme::Http)
        } else if raw.eq_ignore_ascii_case("https") {
            Ok(Scheme::Https)
        } else {
            Err(LinkError::UnknownScheme(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized, absolute URL found on (or identifying) a crawled page.
///
/// Two links are the same page when they share a domain and a normalized
/// path. Scheme and port do not take part in equality, so
/// `http://www.example.com/a.html`, `https://www.example.com/a.html` and
/// `http://www.example.com:80/a.html` all hash to one entry. Query strings
/// and fragments are dropped while parsing.
#[derive(Debug, Clone)]
pub struct Link {
    scheme: Scheme,
    domain: String,
    port: u16,
    path: String,
    crawled_domain: String,
    key: String,
    url: String,
}

impl Link {
    /// Resolve `href` against the page at `base`.
    ///
    /// Relative hrefs are joined onto the directory of the base page. Fails
    /// when the scheme is not http(s), the port is not a number, no host can
    /// be determined, or `..` segments climb above the domain root.
    pub fn parse(base: &str, href: &str) -> Result<Self, LinkError> {
        let base_parts = RawParts::split(base);
        let href_parts = RawParts::split(href);

        let raw_scheme = if href_parts.scheme.is_empty() {
            base_parts.scheme
        } else {
            href_parts.scheme
        };
        let scheme = Scheme::parse(raw_scheme)?;

        let authority = if href_parts.authority.is_empty() {
            base_parts.authority
        } else {
            href_parts.authority
        };
        let (domain, explicit_port) = split_authority(authority);
        if domain.is_empty() {
            return Err(LinkError::MissingHost(href.to_string()));
        }
        let port = match explicit_port {
            Some(raw) if !raw.is_empty() => raw
                .parse::<u16>()
                .map_err(|_| LinkError::InvalidPort(raw.to_string()))?,
            _ => scheme.default_port(),
        };

        let joined = if href_parts.is_relative() {
            format!("{}{}", directory_of(base_parts.path), href_parts.path)
        } else if href_parts.path.is_empty() {
            "/".to_string()
        } else {
            href_parts.path.to_string()
        };
        let path = normalize_path(&joined)
            .ok_or_else(|| LinkError::InvalidPath(format!("{}{}", domain, joined)))?;

        let (crawled_domain, _) = split_authority(base_parts.authority);

        let key = format!("{}{}", domain, path);
        let url = if port == scheme.default_port() {
            format!("{}://{}{}", scheme, domain, path)
        } else {
            format!("{}://{}:{}{}", scheme, domain, port, path)
        };

        Ok(Self {
            scheme,
            domain: domain.to_string(),
            port,
            path,
            crawled_domain: crawled_domain.to_string(),
            key,
            url,
        })
    }

    /// The root page of the domain named by `domain`; any path on it is ignored.
    pub fn seed(domain: &str) -> Result<Self, LinkError> {
        Self::parse(domain, "/")
    }

    /// Resolve an href found on this page.
    pub fn resolve(&self, href: &str) -> Result<Self, LinkError> {
        Self::parse(&self.url, href)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Domain + path; the identity used for equality and hashing.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Displayable and fetchable form of the link.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the link stays on the domain of the page it was found on.
    pub fn in_crawled_domain(&self) -> bool {
        self.domain == self.crawled_domain
    }

    /// Whether the link lives on exactly the same host as `anchor`.
    pub fn in_domain_of(&self, anchor: &Link) -> bool {
        self.domain == anchor.domain
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Link {}

impl Hash for Link {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url)
    }
}

/// Scheme, authority and path of a URL reference, query and fragment removed.
#[derive(Debug, Default, PartialEq)]
struct RawParts<'a> {
    scheme: &'a str,
    authority: &'a str,
    path: &'a str,
}

impl<'a> RawParts<'a> {
    fn split(input: &'a str) -> Self {
        let input = input.trim();
        let input = input.split_once('#').map_or(input, |(head, _)| head);
        let input = input.split_once('?').map_or(input, |(head, _)| head);

        let (scheme, rest) = match input.split_once(':') {
            Some((candidate, rest)) if is_scheme(candidate) => (candidate, rest),
            _ => ("", input),
        };

        match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find('/').unwrap_or(after.len());
                Self {
                    scheme,
                    authority: &after[..end],
                    path: &after[end..],
                }
            }
            None => Self {
                scheme,
                authority: "",
                path: rest,
            },
        }
    }

    fn is_relative(&self) -> bool {
        self.authority.is_empty() && !self.path.starts_with('/')
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

/// Split `[user@]host[:port]` into host and the raw port text, if any.
fn split_authority(authority: &str) -> (&str, Option<&str>) {
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host_port)| host_port);

    if host_port.starts_with('[') {
        // IPv6 literal, keep the brackets on the host
        return match host_port.find(']') {
            Some(close) => {
                let (host, rest) = host_port.split_at(close + 1);
                (host, rest.strip_prefix(':'))
            }
            None => (host_port, None),
        };
    }

    match host_port.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (host_port, None),
    }
}

/// Everything up to and including the last `/` of a page path.
fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

/// Collapse `.`, `..` and empty segments. `None` when `..` would climb above the root.
fn normalize_path(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = false;

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            name => segments.push(name),
        }
        trailing_slash = matches!(segment, "" | "." | "..");
    }

    let mut normalized = String::with_capacity(path.len());
    normalized.push('/');
    normalized.push_str(&segments.join("/"));
    if trailing_slash && !segments.is_empty() {
        normalized.push('/');
    }
    Some(normalized)
}
