//! Integration tests for original destination lookup

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use tempfile::NamedTempFile;
use transroute_core::{ConnectionRecord, ConntrackLookup};

const TABLE: &str = "\
ipv4     2 tcp      6 431999 ESTABLISHED src=192.168.1.20 dst=93.184.216.34 sport=51000 dport=443 src=93.184.216.34 dst=192.168.1.20 sport=443 dport=51000 [ASSURED] mark=0 zone=0 use=2
ipv4     2 udp      17 25 src=192.168.1.20 dst=9.9.9.9 sport=40001 dport=53 src=127.0.0.1 dst=192.168.1.20 sport=5353 dport=40001 mark=0 zone=0 use=2
ipv4     2 udp      17 28 src=192.168.1.20 dst=8.8.8.8 sport=40000 dport=53 src=127.0.0.1 dst=192.168.1.20 sport=5353 dport=40000 mark=0 zone=0 use=2
ipv4     2 udp      17 29 src=192.168.1.20 dst=1.1.1.1 sport=40000 dport=53 src=127.0.0.1 dst=192.168.1.20 sport=5353 dport=40000 mark=0 zone=0 use=2
";

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn test_first_match_wins() {
    let found = ConntrackLookup::find_in(Cursor::new(TABLE), addr("192.168.1.20:40000"), 5353).unwrap();
    assert_eq!(found, addr("8.8.8.8:53"));
}

#[test]
fn test_port_disambiguates_clients() {
    let found = ConntrackLookup::find_in(Cursor::new(TABLE), addr("192.168.1.20:40001"), 5353).unwrap();
    assert_eq!(found, addr("9.9.9.9:53"));
}

#[test]
fn test_listen_port_must_match() {
    let err = ConntrackLookup::find_in(Cursor::new(TABLE), addr("192.168.1.20:40000"), 53).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_table_without_udp_rows() {
    let tcp_only = TABLE.lines().next().unwrap();
    for client in ["192.168.1.20:51000", "93.184.216.34:443", "192.168.1.20:40000"] {
        let err = ConntrackLookup::find_in(Cursor::new(tcp_only), addr(client), 5353).unwrap_err();
        assert!(err.is_not_found());
    }
}

#[test]
fn test_non_utf8_rows_are_skipped() {
    let mut table = b"ipv4 2 udp 17 25 src=\xff\xfe dst=10.9.9.9 sport=1 dport=53\n".to_vec();
    table.extend_from_slice(TABLE.as_bytes());

    let found = ConntrackLookup::find_in(Cursor::new(table.clone()), addr("192.168.1.20:40000"), 5353).unwrap();
    assert_eq!(found, addr("8.8.8.8:53"));

    let err = ConntrackLookup::find_in(Cursor::new(table), addr("10.0.0.1:1"), 5353).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_lookup_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(TABLE.as_bytes()).unwrap();

    let lookup = ConntrackLookup::new(file.path());
    assert_eq!(lookup.path(), file.path());
    let found = lookup.original_destination(addr("192.168.1.20:40001"), 5353).unwrap();
    assert_eq!(found, addr("9.9.9.9:53"));
}

#[test]
fn test_positional_parsing_ignores_values() {
    // The reply half uses smaller numbers than the original half; only
    // position decides which side a key belongs to.
    let line = "ipv4 2 udp 17 30 src=9.9.9.9 dst=9.9.9.8 sport=9999 dport=9998 \
                src=1.1.1.1 dst=1.1.1.2 sport=1 dport=2";
    let record = ConnectionRecord::parse(line).unwrap();

    assert_eq!(record.local_source.to_string(), "9.9.9.9:9999");
    assert_eq!(record.local_destination.to_string(), "9.9.9.8:9998");
    assert_eq!(record.remote_source.to_string(), "1.1.1.1:1");
    assert_eq!(record.remote_destination.to_string(), "1.1.1.2:2");
    assert_eq!(record.proxy_port, "1");
}
