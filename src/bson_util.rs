use std::{
    convert::TryFrom,
    io::{Read, Write},
};

use crate::{
    bson::{Bson, Document, RawBsonRef},
    error::{Error, ErrorKind, Result},
};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
pub(crate) fn get_int_raw(val: RawBsonRef<'_>) -> Option<i64> {
    match val {
        RawBsonRef::Int32(i) => get_int(&Bson::Int32(i)),
        RawBsonRef::Int64(i) => get_int(&Bson::Int64(i)),
        RawBsonRef::Double(i) => get_int(&Bson::Double(i)),
        _ => None,
    }
}

/// Coerce numeric types into an `u64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn get_u64(val: &Bson) -> Option<u64> {
    match *val {
        Bson::Int32(i) => u64::try_from(i).ok(),
        Bson::Int64(i) => u64::try_from(i).ok(),
        Bson::Double(f) if (f - (f as u64 as f64)).abs() <= f64::EPSILON => Some(f as u64),
        _ => None,
    }
}

pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

pub(crate) fn update_document_check(update: &Document) -> Result<()> {
    match first_key(update) {
        Some(s) if s.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "update document must have first key starting with '$".to_string(),
        }
        .into()),
    }
}

pub(crate) fn replacement_document_check(replacement: &Document) -> Result<()> {
    match first_key(replacement) {
        Some(s) if !s.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "replace document must have first key not starting with '$'".to_string(),
        }
        .into()),
    }
}

/// Reads a little-endian `i32` from the provided reader.
pub(crate) fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Reads a little-endian `i64` from the provided reader.
pub(crate) fn read_i64<R: Read>(reader: &mut R) -> Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Reads a little-endian `u32` from the provided reader.
pub(crate) fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads a null-terminated UTF-8 string, returning it along with the number of bytes consumed.
pub(crate) fn read_cstring<R: Read>(reader: &mut R) -> Result<(String, usize)> {
    let mut bytes = Vec::new();
    loop {
        let byte = read_u8(reader)?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    let consumed = bytes.len() + 1;
    let string = String::from_utf8(bytes)
        .map_err(|e| Error::invalid_response(format!("invalid cstring: {e}")))?;
    Ok((string, consumed))
}

/// Read a document's raw BSON bytes from the provided reader.
pub(crate) fn read_document_bytes<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let length = read_i32(&mut reader)?;
    if length < 5 {
        return Err(Error::invalid_response(format!(
            "invalid BSON document length {length}"
        )));
    }

    let mut bytes = Vec::with_capacity(length as usize);
    bytes.write_all(&length.to_le_bytes())?;

    let remaining = (length - 4) as u64;
    let read = reader.take(remaining).read_to_end(&mut bytes)?;
    if read as u64 != remaining {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    Ok(bytes)
}

/// Appends every element of `other` that `this` does not already contain.
pub(crate) fn merge_missing(this: &mut Document, other: Document) {
    for (key, value) in other {
        if !this.contains_key(&key) {
            this.insert(key, value);
        }
    }
}

/// The serialized size of the given document in bytes.
pub(crate) fn doc_size_bytes(document: &Document) -> Result<usize> {
    let mut bytes = Vec::new();
    document.to_writer(&mut bytes)?;
    Ok(bytes.len())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bson::doc;

    #[test]
    fn read_document_bytes_round_trip() {
        let doc = doc! { "a": 1, "b": "two" };
        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes).unwrap();
        bytes.extend_from_slice(&[9, 9, 9]);

        let read = read_document_bytes(bytes.as_slice()).unwrap();
        assert_eq!(Document::from_reader(read.as_slice()).unwrap(), doc);
    }

    #[test]
    fn read_document_bytes_short() {
        let doc = doc! { "a": 1 };
        let mut bytes = Vec::new();
        doc.to_writer(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(read_document_bytes(bytes.as_slice()).is_err());
    }

    #[test]
    fn merge_missing_keeps_existing() {
        let mut base = doc! { "find": "c", "maxTimeMS": 5 };
        merge_missing(&mut base, doc! { "maxTimeMS": 10, "$db": "db" });
        assert_eq!(base, doc! { "find": "c", "maxTimeMS": 5, "$db": "db" });
    }
}
