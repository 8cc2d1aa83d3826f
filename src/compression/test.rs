use pretty_assertions::assert_eq;

use super::{decompress, negotiate, Compressor, NOOP_COMPRESSOR_ID};

#[test]
fn noop_passes_bytes_through() {
    assert_eq!(
        decompress(NOOP_COMPRESSOR_ID, b"payload").unwrap(),
        b"payload".to_vec()
    );
}

#[test]
fn unknown_compressor_id_is_invalid_response() {
    let error = decompress(42, b"payload").unwrap_err();
    assert!(matches!(
        *error.kind,
        crate::error::ErrorKind::InvalidResponse { .. }
    ));
}

#[test]
fn unknown_compressor_name_rejected() {
    assert!("lz4".parse::<Compressor>().is_err());
}

#[test]
fn negotiation_without_common_compressor() {
    assert_eq!(negotiate(&[], &["zlib".to_string()]), None);
}

#[cfg(feature = "zlib-compression")]
#[test]
fn zlib_round_trip() {
    let compressor = Compressor::Zlib { level: Some(4) };
    compressor.validate().unwrap();
    let compressed = compressor.compress(&[b"foo", b"barZLIB"]).unwrap();
    let original = decompress(compressor.id(), &compressed).unwrap();
    assert_eq!(b"foobarZLIB", original.as_slice());

    assert!(Compressor::Zlib { level: Some(10) }.validate().is_err());
}

#[cfg(feature = "zstd-compression")]
#[test]
fn zstd_round_trip() {
    let compressor = Compressor::Zstd { level: None };
    let compressed = compressor.compress(&[b"foo", b"barZSTD"]).unwrap();
    let original = decompress(compressor.id(), &compressed).unwrap();
    assert_eq!(b"foobarZSTD", original.as_slice());
}

#[cfg(feature = "snappy-compression")]
#[test]
fn snappy_round_trip() {
    let compressor = Compressor::Snappy;
    let compressed = compressor.compress(&[b"foo", b"barSNAPPY"]).unwrap();
    let original = decompress(compressor.id(), &compressed).unwrap();
    assert_eq!(b"foobarSNAPPY", original.as_slice());
}

#[cfg(all(feature = "zlib-compression", feature = "snappy-compression"))]
#[test]
fn negotiation_prefers_client_order() {
    let client = vec![Compressor::Snappy, Compressor::Zlib { level: None }];
    let server = vec!["zlib".to_string(), "snappy".to_string()];
    assert_eq!(negotiate(&client, &server), Some(Compressor::Snappy));
}
