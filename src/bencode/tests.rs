use std::collections::BTreeMap;

use bytes::Bytes;

use super::*;

#[test]
fn test_decode_integer() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-42e").unwrap(), Value::Integer(-42));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
    assert_eq!(
        decode(b"i9223372036854775807e").unwrap(),
        Value::Integer(i64::MAX)
    );
}

#[test]
fn test_decode_integer_invalid() {
    assert!(matches!(
        decode(b"i-0e"),
        Err(BencodeError::InvalidInteger { .. })
    ));
    assert!(matches!(
        decode(b"i03e"),
        Err(BencodeError::InvalidInteger { .. })
    ));
    assert!(matches!(
        decode(b"ie"),
        Err(BencodeError::InvalidInteger { .. })
    ));
    assert!(matches!(decode(b"i42"), Err(BencodeError::UnexpectedEof(_))));
}

#[test]
fn test_decode_bytes() {
    assert_eq!(
        decode(b"4:spam").unwrap(),
        Value::Bytes(Bytes::from_static(b"spam"))
    );
    assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Bytes::from_static(b"")));
}

#[test]
fn test_decode_bytes_invalid() {
    // Leading zero in the length prefix.
    assert_eq!(decode(b"04:spam"), Err(BencodeError::InvalidLength(0)));
    // Length runs past the end of input.
    assert!(matches!(
        decode(b"10:spam"),
        Err(BencodeError::UnexpectedEof(_))
    ));
    // Length that cannot fit in usize.
    assert_eq!(
        decode(b"99999999999999999999999:x"),
        Err(BencodeError::InvalidLength(0))
    );
}

#[test]
fn test_decode_list() {
    let result = decode(b"l4:spami42ee").unwrap();
    match result {
        Value::List(l) => {
            assert_eq!(l.len(), 2);
            assert_eq!(l[0], Value::Bytes(Bytes::from_static(b"spam")));
            assert_eq!(l[1], Value::Integer(42));
        }
        _ => panic!("expected list"),
    }
}

#[test]
fn test_decode_dict() {
    let result = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
    match result {
        Value::Dict(d) => {
            assert_eq!(d.len(), 2);
            assert_eq!(
                d.get(b"cow".as_slice()),
                Some(&Value::Bytes(Bytes::from_static(b"moo")))
            );
        }
        _ => panic!("expected dict"),
    }
}

#[test]
fn test_decode_dict_key_order() {
    // Keys "b" then "a" are out of order; the offset points at the second key.
    assert_eq!(
        decode(b"d1:b0:1:a0:e"),
        Err(BencodeError::NonAscendingKey(6))
    );
    assert_eq!(decode(b"d1:a0:1:a0:e"), Err(BencodeError::DuplicateKey(6)));
}

#[test]
fn test_decode_dict_non_string_key() {
    assert_eq!(decode(b"di1e0:e"), Err(BencodeError::NonStringKey(1)));
}

#[test]
fn test_decode_nesting_limit() {
    let mut deep = vec![b'l'; 100];
    deep.extend(vec![b'e'; 100]);
    assert_eq!(decode(&deep), Err(BencodeError::NestingTooDeep));
}

#[test]
fn test_encode_integer() {
    assert_eq!(encode(&Value::Integer(42)), b"i42e");
    assert_eq!(encode(&Value::Integer(-42)), b"i-42e");
    assert_eq!(encode(&Value::Integer(0)), b"i0e");
}

#[test]
fn test_encode_bytes() {
    assert_eq!(encode(&Value::Bytes(Bytes::from_static(b"spam"))), b"4:spam");
}

#[test]
fn test_encode_dict_sorted() {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"zz"), Value::Integer(1));
    dict.insert(Bytes::from_static(b"aa"), Value::Integer(2));
    assert_eq!(encode(&Value::Dict(dict)), b"d2:aai2e2:zzi1ee");
}

#[test]
fn test_roundtrip() {
    // Any accepted input is canonical, so decode/encode is the identity.
    let cases: &[&[u8]] = &[
        b"i42e",
        b"4:spam",
        b"le",
        b"de",
        b"l4:spami42ee",
        b"d4:listl4:spami42eee",
        b"d8:announce15:http://test.com4:infod4:name4:test12:piece lengthi16384eee",
    ];
    for case in cases {
        let decoded = decode(case).unwrap();
        assert_eq!(encode(&decoded), *case, "roundtrip of {:?}", case);
    }
}

#[test]
fn test_trailing_data_error() {
    assert_eq!(decode(b"i42eextra"), Err(BencodeError::TrailingData(4)));
}

#[test]
fn test_decode_prefix_allows_trailing() {
    let (value, consumed) = decode_prefix(b"i42eextra").unwrap();
    assert_eq!(value, Value::Integer(42));
    assert_eq!(consumed, 4);
}

#[test]
fn test_document_info_span() {
    let data = b"d8:announce4:abcd4:infod4:name4:teste3:zzzi1ee";
    let doc = decode_document(data).unwrap();
    let span = doc.info_span.unwrap();
    assert_eq!(&data[span.clone()], b"d4:name4:teste");
    assert!(doc.root.get(b"zzz").is_some());
}

#[test]
fn test_document_without_info() {
    let doc = decode_document(b"d3:foo3:bare").unwrap();
    assert!(doc.info_span.is_none());

    let doc = decode_document(b"i42e").unwrap();
    assert!(doc.info_span.is_none());
    assert_eq!(doc.root, Value::Integer(42));
}

#[test]
fn test_document_rejects_unordered_keys() {
    assert_eq!(
        decode_document(b"d4:infod4:name1:xe8:announce3:abce"),
        Err(BencodeError::NonAscendingKey(18))
    );
}

#[test]
fn test_value_accessors() {
    let value = Value::Integer(42);
    assert_eq!(value.as_integer(), Some(42));
    assert_eq!(value.as_u64(), Some(42));
    assert!(value.as_bytes().is_none());

    assert_eq!(Value::Integer(-1).as_u64(), None);

    let value = Value::Bytes(Bytes::from_static(b"test"));
    assert_eq!(value.as_str(), Some("test"));
    assert!(value.as_integer().is_none());

    let value = Value::List(vec![]);
    assert!(value.as_list().is_some());
    assert!(value.as_dict().is_none());
}
