//! Integration tests for proxy selection

use proptest::prelude::*;
use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use transroute_core::cache::HostnameStore;
use transroute_core::resolver::{NoHostnames, StaticHostnames};
use transroute_core::{HostnameCache, PatternKind, ProxyResolver, RuleGroup, RuleStore};

fn scenario_rules() -> RuleStore {
    RuleStore::parse(
        "proxy: \"\"\nrules: [\"10.0.0.0/8\"]\n---\nproxy: \"proxy1:1080\"\nrules: [\"*.example.com\"]\n",
    )
    .unwrap()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

// ============ ResolveProxy ============

#[test]
fn test_scenario_domain_match() {
    let hostnames = StaticHostnames::new().with("93.1.1.1", "www.example.com");
    let resolver = ProxyResolver::new(&scenario_rules(), Arc::new(hostnames)).unwrap();

    let chain = resolver.resolve_proxy("93.1.1.1", 443, &[]);
    assert_eq!(chain.to_vec(), vec!["proxy1:1080".to_string()]);
}

#[test]
fn test_scenario_direct_only_keeps_fallback() {
    let resolver = ProxyResolver::new(&scenario_rules(), Arc::new(NoHostnames)).unwrap();

    let fallback = vec!["direct".to_string()];
    let chain = resolver.resolve_proxy("10.0.0.5", 80, &fallback);
    assert_eq!(&*chain, fallback.as_slice());
}

#[test]
fn test_first_group_in_file_order_wins() {
    let rules = RuleStore::new(vec![
        RuleGroup::new("wide:1080", ["10.0.0.0/8"]),
        RuleGroup::new("narrow:1080", ["10.1.2.3"]),
    ]);
    let resolver = ProxyResolver::new(&rules, Arc::new(NoHostnames)).unwrap();

    let chain = resolver.resolve_proxy("10.1.2.3", 80, &[]);
    assert_eq!(chain[0], "wide:1080");
}

#[test]
fn test_matched_proxy_is_prepended() {
    let rules = RuleStore::new(vec![RuleGroup::new("p:1080", ["1.2.3.4"])]);
    let resolver = ProxyResolver::new(&rules, Arc::new(NoHostnames)).unwrap();

    let fallback = vec!["a:1".to_string(), "b:2".to_string()];
    let chain = resolver.resolve_proxy("1.2.3.4", 80, &fallback);
    assert_eq!(chain.to_vec(), vec!["p:1080", "a:1", "b:2"]);
    assert_eq!(fallback, vec!["a:1", "b:2"]);
}

#[test]
fn test_hostname_cache_feeds_domain_rules() {
    let cache = Arc::new(HostnameCache::new());
    cache.store_ttl("93.184.216.34", "www.example.com.", Duration::from_secs(60));

    let rules = RuleStore::new(vec![RuleGroup::new("p:1080", ["*.example.com"])]);
    let resolver = ProxyResolver::new(&rules, cache.clone()).unwrap();

    assert_eq!(resolver.resolve_proxy("93.184.216.34", 443, &[]).len(), 1);
    assert!(resolver.resolve_proxy("93.184.216.35", 443, &[]).is_empty());
}

#[test]
fn test_bad_pattern_is_fatal_at_construction() {
    let rules = RuleStore::new(vec![RuleGroup::new("p:1080", ["*.exa[mple.com"])]);
    assert!(ProxyResolver::new(&rules, Arc::new(NoHostnames)).is_err());
}

// ============ DirectorFunc ============

#[test]
fn test_directors_one_per_direct_pattern() {
    let rules = RuleStore::new(vec![
        RuleGroup::new("", ["10.0.0.0/8", "192.168.1.1"]),
        RuleGroup::new("p:1080", ["10.1.0.0/16"]),
        RuleGroup::new("", ["*.lan"]),
    ]);
    let hostnames = StaticHostnames::new().with("172.16.0.9", "nas.lan.");
    let resolver = Arc::new(ProxyResolver::new(&rules, Arc::new(hostnames)).unwrap());

    let directors = resolver.director_funcs(true);
    assert_eq!(directors.len(), 3);
    assert!(directors[0](&ip("10.1.2.3")));
    assert!(directors[1](&ip("192.168.1.1")));
    assert!(!directors[1](&ip("192.168.1.2")));
    assert!(directors[2](&ip("172.16.0.9")));
}

#[test]
fn test_composite_director_excludes_proxied() {
    let rules = RuleStore::new(vec![
        RuleGroup::new("", ["10.0.0.0/8"]),
        RuleGroup::new("p:1080", ["10.1.0.0/16"]),
    ]);
    let resolver = Arc::new(ProxyResolver::new(&rules, Arc::new(NoHostnames)).unwrap());

    let directors = resolver.director_funcs(false);
    assert_eq!(directors.len(), 1);
    let direct = &directors[0];

    assert!(direct(&ip("10.2.0.1")));
    assert!(!direct(&ip("10.1.0.1")));
    assert!(!direct(&ip("8.8.8.8")));
}

#[test]
fn test_no_direct_groups() {
    let rules = RuleStore::new(vec![RuleGroup::new("p:1080", ["*.com"])]);
    let resolver = Arc::new(ProxyResolver::new(&rules, Arc::new(NoHostnames)).unwrap());

    assert!(resolver.director_funcs(true).is_empty());
    assert!(!resolver.director_funcs(false)[0](&ip("1.1.1.1")));
}

// ============ Properties ============

proptest! {
    #[test]
    fn prop_letters_always_classify_as_domain(prefix in "[0-9./]{0,8}", letter in "[a-zA-Z]", suffix in "[0-9./]{0,8}") {
        let pattern = format!("{prefix}{letter}{suffix}");
        prop_assert_eq!(PatternKind::classify(&pattern), PatternKind::Domain);
    }

    #[test]
    fn prop_classification_without_letters(s in "[0-9./:]{0,16}") {
        let expected = if s.contains('/') { PatternKind::Cidr } else { PatternKind::ExactIp };
        prop_assert_eq!(PatternKind::classify(&s), expected);
    }

    #[test]
    fn prop_fallback_identity_and_prepend(
        octets in prop::array::uniform4(any::<u8>()),
        fallback in prop::collection::vec("[a-z]{1,6}:[0-9]{2,4}", 0..4),
    ) {
        let rules = RuleStore::new(vec![RuleGroup::new("p:1080", ["10.0.0.0/8"])]);
        let resolver = ProxyResolver::new(&rules, Arc::new(NoHostnames)).unwrap();

        let destination = IpAddr::from(octets).to_string();
        let before = fallback.clone();
        let chain = resolver.resolve_proxy(&destination, 80, &fallback);

        prop_assert_eq!(&fallback, &before);
        if octets[0] == 10 {
            prop_assert!(matches!(chain, Cow::Owned(_)));
            prop_assert_eq!(chain.len(), fallback.len() + 1);
            prop_assert_eq!(chain[0].as_str(), "p:1080");
            prop_assert_eq!(&chain[1..], fallback.as_slice());
        } else {
            prop_assert!(matches!(chain, Cow::Borrowed(_)));
            prop_assert_eq!(&*chain, fallback.as_slice());
        }
    }
}
