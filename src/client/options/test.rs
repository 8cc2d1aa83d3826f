use std::{collections::HashSet, time::Duration};

use pretty_assertions::assert_eq;

use super::*;
use crate::bson::{doc, to_document};

#[test]
fn parse_server_address() {
    let address = ServerAddress::parse("Example.com:27018").unwrap();
    assert_eq!(address.host(), "example.com");
    assert_eq!(address.port(), Some(27018));
    assert_eq!(address.to_string(), "example.com:27018");

    let address: ServerAddress = "localhost".parse().unwrap();
    assert_eq!(address.port(), None);
    assert_eq!(address.to_string(), "localhost:27017");

    for invalid in ["", ":27017", "host:port", "host:0", "host:1:2", "host:70000"] {
        assert!(ServerAddress::parse(invalid).is_err(), "{invalid}");
    }
}

#[test]
fn default_port_is_implied() {
    let implicit = ServerAddress::parse("localhost").unwrap();
    let explicit = ServerAddress::parse("localhost:27017").unwrap();
    assert_eq!(implicit, explicit);

    let set: HashSet<ServerAddress> = [implicit, explicit].into_iter().collect();
    assert_eq!(set.len(), 1);
    assert_eq!(ServerAddress::default(), ServerAddress::parse("localhost").unwrap());
}

#[test]
fn server_api_fields() {
    let api = ServerApi::builder()
        .version(ServerApiVersion::V1)
        .strict(true)
        .build();
    assert_eq!(
        to_document(&api).unwrap(),
        doc! { "apiVersion": "1", "apiStrict": true }
    );
    assert!("2".parse::<ServerApiVersion>().is_err());
}

#[test]
fn client_option_defaults() {
    let options = ClientOptions::default();
    assert_eq!(options.server_selection_timeout(), Duration::from_secs(30));
    assert!(options.validate().is_ok());

    let options = ClientOptions::builder()
        .app_name("app".to_string())
        .timeout(Duration::ZERO)
        .build();
    assert!(options.validate().is_err());
}
