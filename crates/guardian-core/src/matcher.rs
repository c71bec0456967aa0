//! Exact-host + glob-pattern membership test, port stripping included.

/// A single allow/deny pattern entry.
///
/// `*` alone matches any host; `*.suffix` matches `suffix` itself or any
/// `label.suffix`; anything else is matched literally (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    Exact(String),
    WildcardSubdomain(String),
    Wildcard,
}

impl DomainPattern {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        if s == "*" {
            return Self::Wildcard;
        }
        if let Some(suffix) = s.strip_prefix("*.") {
            return Self::WildcardSubdomain(suffix.to_string());
        }
        Self::Exact(s)
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        match self {
            Self::Wildcard => true,
            Self::Exact(s) => *s == host,
            Self::WildcardSubdomain(suffix) => {
                host == *suffix || host.ends_with(&format!(".{suffix}"))
            },
        }
    }
}

/// Strip a trailing `:port` and, for bracketed IPv6 literals, the `[]` wrapper.
///
/// `:443` alone strips to an empty string (callers must treat that as deny).
pub fn strip_port(host: &str) -> String {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
        return rest.to_string();
    }
    match host.rfind(':') {
        Some(idx) if host[..idx].matches(':').count() == 0 => host[..idx].to_string(),
        _ => host.to_string(),
    }
}

/// Ordered set of exact hosts plus ordered glob patterns. Immutable once built;
/// replacement is always a whole-object swap (see `AllowlistCache::set_global`).
#[derive(Debug, Clone, Default)]
pub struct HostSet {
    exact: Vec<String>,
    patterns: Vec<DomainPattern>,
}

impl HostSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_domains(domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::from_domains_and_patterns(domains, std::iter::empty::<String>())
    }

    pub fn from_domains_and_patterns(
        domains: impl IntoIterator<Item = impl Into<String>>,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let exact = domains
            .into_iter()
            .map(|d| d.into().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        let patterns = patterns
            .into_iter()
            .map(|p| DomainPattern::parse(&p.into()))
            .collect();
        Self { exact, patterns }
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        let normalised = strip_port(host);
        if normalised.is_empty() {
            return false;
        }
        if self.exact.iter().any(|h| *h == normalised) {
            return true;
        }
        self.patterns.iter().any(|p| p.matches(&normalised))
    }

    pub fn domains(&self) -> &[String] {
        &self.exact
    }

    pub fn patterns(&self) -> &[DomainPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}

pub type Allowlist = HostSet;
pub type Denylist = HostSet;
