//! Tests for server address parsing

use crate::address::ServerAddress;
use crate::connection::MssqlConnectionError;
use pretty_assertions::assert_eq;

#[test]
fn test_plain_host() {
    let addr = ServerAddress::parse("db01.corp.local").unwrap();
    assert_eq!(addr.host, "db01.corp.local");
    assert_eq!(addr.port, None);
    assert_eq!(addr.instance, None);
    assert_eq!(addr.port_or(1433), 1433);
}

#[test]
fn test_comma_port() {
    let addr = ServerAddress::parse("db01,14330").unwrap();
    assert_eq!(addr.host, "db01");
    assert_eq!(addr.port, Some(14330));
}

#[test]
fn test_colon_port() {
    let addr = ServerAddress::parse("10.0.0.5:1444").unwrap();
    assert_eq!(addr.host, "10.0.0.5");
    assert_eq!(addr.port_or(1433), 1444);
}

#[test]
fn test_named_instance() {
    let addr = ServerAddress::parse(r"db01\SQLEXPRESS").unwrap();
    assert_eq!(addr.host, "db01");
    assert_eq!(addr.instance.as_deref(), Some("SQLEXPRESS"));
    assert_eq!(addr.to_string(), r"db01\SQLEXPRESS");
}

#[test]
fn test_local_aliases() {
    assert_eq!(ServerAddress::parse(".").unwrap().host, "localhost");
    assert_eq!(
        ServerAddress::parse(r"(local)\DEV").unwrap().host,
        "localhost"
    );
}

#[test]
fn test_ipv6_literal_is_not_split() {
    let addr = ServerAddress::parse("::1").unwrap();
    assert_eq!(addr.host, "::1");
    assert_eq!(addr.port, None);
}

#[test]
fn test_invalid_addresses() {
    for input in ["", "   ", "db01,notaport", r"db01\", ",1433", "db01:99999"] {
        let err = ServerAddress::parse(input).unwrap_err();
        assert!(
            matches!(err, MssqlConnectionError::InvalidAddress(_)),
            "expected InvalidAddress for {:?}",
            input
        );
    }
}

#[test]
fn test_display_round_trips_port_form() {
    let addr = ServerAddress::parse("db01:1500").unwrap();
    assert_eq!(addr.to_string(), "db01,1500");
}
