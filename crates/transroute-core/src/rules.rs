//! Proxy rule file loading
//!
//! A rule file is a stream of YAML documents separated by lines holding
//! exactly `---`. Each document names an upstream proxy and the ordered
//! patterns that route through it:
//!
//! ```yaml
//! proxy: ""
//! rules: ["10.0.0.0/8", "192.168.1.1"]
//! ---
//! proxy: "proxy1:1080"
//! rules: ["*.example.com"]
//! ```
//!
//! An empty `proxy` marks a direct group. Group order and pattern order are
//! preserved exactly as written, since they decide match precedence.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Line separating two rule documents
pub const DOCUMENT_SEPARATOR: &str = "---";

/// One proxy and its ordered patterns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleGroup {
    /// Upstream proxy, empty or absent for a direct group
    pub proxy: Option<String>,
    /// Raw patterns in file order
    pub rules: Vec<String>,
}

impl RuleGroup {
    /// Create a group for `proxy` with the given patterns
    pub fn new(proxy: impl Into<String>, rules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            proxy: Some(proxy.into()),
            rules: rules.into_iter().map(Into::into).collect(),
        }
    }

    /// Proxy address, `""` for direct groups
    pub fn proxy(&self) -> &str {
        self.proxy.as_deref().unwrap_or("")
    }

    /// Whether this group only feeds direct-routing predicates
    pub fn is_direct(&self) -> bool {
        self.proxy().is_empty()
    }
}

/// Ordered, read-only rule groups loaded from a rule file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStore {
    groups: Vec<RuleGroup>,
}

impl RuleStore {
    /// Wrap already-built groups
    pub fn new(groups: Vec<RuleGroup>) -> Self {
        Self { groups }
    }

    /// Load every rule group from `reader`
    ///
    /// Loading is all-or-nothing: the first malformed document fails the
    /// whole load.
    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::parse(&content)
    }

    /// Load rule groups from a file on disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        let store = Self::load(std::io::BufReader::new(file))?;
        info!(
            groups = store.groups.len(),
            path = %path.display(),
            "Loaded proxy rules"
        );
        Ok(store)
    }

    /// Parse rule groups from an in-memory document stream
    pub fn parse(content: &str) -> Result<Self> {
        let mut groups = Vec::new();
        for (index, document) in split_documents(content).into_iter().enumerate() {
            let group: RuleGroup = serde_yaml::from_str(&document)
                .map_err(|source| Error::RuleDocument { index, source })?;
            debug!(proxy = group.proxy(), patterns = group.rules.len(), "Parsed rule group");
            groups.push(group);
        }
        Ok(Self { groups })
    }

    /// All groups in file order
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// Groups naming a proxy, in file order
    pub fn proxied(&self) -> impl Iterator<Item = &RuleGroup> {
        self.groups.iter().filter(|g| !g.is_direct())
    }

    /// Direct groups, in file order
    pub fn direct(&self) -> impl Iterator<Item = &RuleGroup> {
        self.groups.iter().filter(|g| g.is_direct())
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if no groups were loaded
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Decode every rule group from `reader`, in stream order
pub fn load_rule_groups<R: Read>(reader: R) -> Result<Vec<RuleGroup>> {
    RuleStore::load(reader).map(|store| store.groups)
}

/// Split a stream at separator lines, dropping blank segments
///
/// Consecutive separators produce blank segments and therefore collapse.
/// The last line is a separator even without a trailing newline.
fn split_documents(content: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in content.split_inclusive('\n') {
        if line.strip_suffix('\n').unwrap_or(line) == DOCUMENT_SEPARATOR {
            push_document(&mut documents, std::mem::take(&mut current));
        } else {
            current.push_str(line);
        }
    }
    push_document(&mut documents, current);

    documents
}

fn push_document(documents: &mut Vec<String>, document: String) {
    if !document.trim().is_empty() {
        documents.push(document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_drops_blank_segments() {
        let docs = split_documents("---\n\n---\nproxy: a\n---\n---\n  \nproxy: b\n");
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains("proxy: a"));
        assert!(docs[1].contains("proxy: b"));
    }

    #[test]
    fn test_separator_must_be_whole_line() {
        let docs = split_documents("rules: [\"a---\"]\n");
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_missing_proxy_is_direct() {
        let store = RuleStore::parse("rules: [\"10.0.0.0/8\"]\n").unwrap();
        assert!(store.groups()[0].is_direct());
        assert_eq!(store.groups()[0].proxy(), "");
    }

    #[test]
    fn test_load_rule_groups_keeps_order() {
        let stream = "proxy: b:1\nrules: [x]\n---\nproxy: a:1\nrules: [y]\n";
        let groups = load_rule_groups(stream.as_bytes()).unwrap();
        assert_eq!(groups[0].proxy(), "b:1");
        assert_eq!(groups[1].proxy(), "a:1");
    }

    #[test]
    fn test_empty_stream() {
        let store = RuleStore::parse("").unwrap();
        assert!(store.is_empty());
    }
}
