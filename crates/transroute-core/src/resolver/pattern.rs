//! Rule pattern classification and matching

use super::HostnameResolver;
use crate::error::{Error, Result};
use ipnet::IpNet;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::fmt;
use std::net::IpAddr;

/// How a raw pattern string is interpreted
///
/// Classification is checked in declaration order and the first hit wins,
/// so anything containing a letter is a domain even if it also has a `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Wildcard hostname pattern such as `*.example.com`
    Domain,
    /// Subnet such as `10.0.0.0/8`
    Cidr,
    /// Literal address, compared as a string
    ExactIp,
}

impl PatternKind {
    /// Classify a raw pattern
    pub fn classify(pattern: &str) -> Self {
        if pattern.chars().any(char::is_alphabetic) {
            Self::Domain
        } else if pattern.contains('/') {
            Self::Cidr
        } else {
            Self::ExactIp
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain => write!(f, "domain"),
            Self::Cidr => write!(f, "cidr"),
            Self::ExactIp => write!(f, "ip"),
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Domain(Regex),
    Cidr(IpNet),
    ExactIp,
}

/// A compiled rule pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: Matcher,
}

impl Pattern {
    /// Compile a raw pattern
    ///
    /// Domain patterns escape every `.`, turn every `*` into `.*` and are
    /// anchored at both ends. Other regex metacharacters are passed through,
    /// so a stray `[` makes the pattern fail here.
    pub fn compile(raw: &str) -> Result<Self> {
        let matcher = match PatternKind::classify(raw) {
            PatternKind::Domain => {
                let body = raw.replace('.', "\\.").replace('*', ".*");
                let regex = Regex::new(&format!("^{body}$")).map_err(|e| Error::pattern(raw, e))?;
                Matcher::Domain(regex)
            }
            PatternKind::Cidr => Matcher::Cidr(raw.parse().map_err(|e| Error::pattern(raw, e))?),
            PatternKind::ExactIp => Matcher::ExactIp,
        };
        Ok(Self {
            raw: raw.to_string(),
            matcher,
        })
    }

    /// Pattern as written in the rule file
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Kind this pattern was classified as
    pub fn kind(&self) -> PatternKind {
        match self.matcher {
            Matcher::Domain(_) => PatternKind::Domain,
            Matcher::Cidr(_) => PatternKind::Cidr,
            Matcher::ExactIp => PatternKind::ExactIp,
        }
    }

    /// Test the pattern against one destination
    pub fn matches(&self, target: &MatchTarget<'_>) -> bool {
        match &self.matcher {
            Matcher::Domain(regex) => target.hostname().is_some_and(|h| regex.is_match(h)),
            Matcher::Cidr(net) => target.ip.is_some_and(|ip| net.contains(&ip)),
            Matcher::ExactIp => self.raw == target.destination,
        }
    }
}

/// Destination under evaluation
///
/// The hostname is looked up at most once, on the first domain pattern,
/// and reused for the remaining patterns of the same evaluation.
pub struct MatchTarget<'a> {
    destination: &'a str,
    ip: Option<IpAddr>,
    hostnames: &'a dyn HostnameResolver,
    hostname: OnceCell<Option<String>>,
}

impl<'a> MatchTarget<'a> {
    /// Prepare `destination` (an IP literal) for matching
    pub fn new(destination: &'a str, hostnames: &'a dyn HostnameResolver) -> Self {
        Self {
            destination,
            ip: destination.parse().ok(),
            hostnames,
            hostname: OnceCell::new(),
        }
    }

    /// Destination literal
    pub fn destination(&self) -> &str {
        self.destination
    }

    /// Hostname if it has already been looked up
    pub fn cached_hostname(&self) -> Option<&str> {
        self.hostname.get().and_then(|h| h.as_deref())
    }

    /// Hostname for the destination without its trailing dot
    pub fn hostname(&self) -> Option<&str> {
        self.hostname
            .get_or_init(|| {
                self.hostnames
                    .hostname(self.destination)
                    .map(|h| h.strip_suffix('.').unwrap_or(&h).to_string())
                    .filter(|h| !h.is_empty())
            })
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NoHostnames;

    #[test]
    fn test_classify_precedence() {
        assert_eq!(PatternKind::classify("*.example.com"), PatternKind::Domain);
        assert_eq!(PatternKind::classify("a/8"), PatternKind::Domain);
        assert_eq!(PatternKind::classify("10.0.0.0/8"), PatternKind::Cidr);
        assert_eq!(PatternKind::classify("1.2.3.4"), PatternKind::ExactIp);
        assert_eq!(PatternKind::classify(""), PatternKind::ExactIp);
    }

    #[test]
    fn test_domain_is_anchored() {
        let hostnames = |_: &str| Some("www.example.com.evil.net.".to_string());
        let pattern = Pattern::compile("*.example.com").unwrap();
        assert!(!pattern.matches(&MatchTarget::new("1.1.1.1", &hostnames)));

        let hostnames = |_: &str| Some("www.example.com.".to_string());
        assert!(pattern.matches(&MatchTarget::new("1.1.1.1", &hostnames)));
    }

    #[test]
    fn test_domain_dot_is_literal() {
        let hostnames = |_: &str| Some("wwwXexampleXcom".to_string());
        let pattern = Pattern::compile("www.example.com").unwrap();
        assert!(!pattern.matches(&MatchTarget::new("1.1.1.1", &hostnames)));
    }

    #[test]
    fn test_domain_is_case_sensitive() {
        let hostnames = |_: &str| Some("WWW.EXAMPLE.COM".to_string());
        let pattern = Pattern::compile("*.example.com").unwrap();
        assert!(!pattern.matches(&MatchTarget::new("1.1.1.1", &hostnames)));
    }

    #[test]
    fn test_cidr_membership() {
        let pattern = Pattern::compile("10.0.0.0/8").unwrap();
        assert_eq!(pattern.kind(), PatternKind::Cidr);
        assert!(pattern.matches(&MatchTarget::new("10.1.2.3", &NoHostnames)));
        assert!(!pattern.matches(&MatchTarget::new("11.0.0.1", &NoHostnames)));
        assert!(!pattern.matches(&MatchTarget::new("not-an-ip", &NoHostnames)));
    }

    #[test]
    fn test_exact_ip_is_literal() {
        let pattern = Pattern::compile("1.2.3.04").unwrap();
        assert!(!pattern.matches(&MatchTarget::new("1.2.3.4", &NoHostnames)));
        assert!(pattern.matches(&MatchTarget::new("1.2.3.04", &NoHostnames)));
    }

    #[test]
    fn test_bad_patterns_fail_to_compile() {
        assert!(matches!(Pattern::compile("*.exa[mple.com"), Err(Error::Pattern { .. })));
        assert!(matches!(Pattern::compile("10.0.0.0/99"), Err(Error::Pattern { .. })));
    }

    #[test]
    fn test_hostname_looked_up_once() {
        let calls = std::cell::Cell::new(0);
        let counting = |_: &str| {
            calls.set(calls.get() + 1);
            Some("a.example.".to_string())
        };
        let target = MatchTarget::new("1.1.1.1", &counting);
        assert_eq!(target.hostname(), Some("a.example"));
        assert_eq!(target.hostname(), Some("a.example"));
        assert_eq!(calls.get(), 1);
    }
}
