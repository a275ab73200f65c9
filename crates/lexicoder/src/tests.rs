use super::*;

fn roundtrip(coder: &Lexicoder, value: Value) {
    let encoded = coder.encode(&value).unwrap();
    let decoded = coder.decode(&encoded).unwrap();
    assert_eq!(decoded, value, "round-trip through {}", coder.name());
}

/// Asserts that encodings sort the same way as the given values (which must
/// already be in ascending natural order).
fn assert_order_preserved(coder: &Lexicoder, values: &[Value]) {
    let encoded: Vec<Vec<u8>> = values
        .iter()
        .map(|v| coder.encode(v).unwrap())
        .collect();
    for pair in encoded.windows(2) {
        assert!(
            pair[0] < pair[1],
            "expected {:?} < {:?}",
            pair[0],
            pair[1]
        );
    }
}

// -------------------- Bytes / String --------------------

#[test]
fn bytes_is_identity() {
    let coder = Lexicoder::Bytes;
    let encoded = coder.encode(&Value::Bytes(vec![3, 1, 2])).unwrap();
    assert_eq!(encoded, vec![3, 1, 2]);
    roundtrip(&coder, Value::Bytes(vec![]));
    roundtrip(&coder, Value::Bytes(vec![0, 255, 0]));
}

#[test]
fn string_sorts_by_code_point() {
    let coder = Lexicoder::String;
    roundtrip(&coder, Value::from("héllo"));
    assert_order_preserved(
        &coder,
        &[
            Value::from(""),
            Value::from("a"),
            Value::from("ab"),
            Value::from("b"),
            Value::from("é"),
        ],
    );
}

#[test]
fn string_rejects_non_string() {
    let err = Lexicoder::String.encode(&Value::Int(7)).unwrap_err();
    assert!(matches!(err, LexicoderError::InvalidValue { .. }));
}

#[test]
fn string_decode_rejects_invalid_utf8() {
    let err = Lexicoder::String.decode(&[0xFF, 0xFE]).unwrap_err();
    assert!(matches!(err, LexicoderError::InvalidEncoding(_)));
}

// -------------------- Integer --------------------

#[test]
fn integer_roundtrips_across_range() {
    let coder = Lexicoder::Integer;
    for n in [
        i64::MIN,
        i64::MIN + 1,
        -65536,
        -256,
        -255,
        -2,
        -1,
        0,
        1,
        2,
        255,
        256,
        65535,
        i64::MAX - 1,
        i64::MAX,
    ] {
        roundtrip(&coder, Value::Int(n));
    }
}

#[test]
fn integer_preserves_order() {
    let values: Vec<Value> = [
        i64::MIN,
        -9_000_000_000,
        -65536,
        -257,
        -256,
        -255,
        -2,
        -1,
        0,
        1,
        127,
        128,
        255,
        256,
        65535,
        65536,
        9_000_000_000,
        i64::MAX,
    ]
    .iter()
    .map(|n| Value::Int(*n))
    .collect();
    assert_order_preserved(&Lexicoder::Integer, &values);
}

#[test]
fn integer_zero_is_one_byte() {
    assert_eq!(Lexicoder::Integer.encode(&Value::Int(0)).unwrap(), vec![0x80]);
}

#[test]
fn integer_decode_rejects_truncated() {
    // header claims a 2-byte magnitude but only one follows
    let err = Lexicoder::Integer.decode(&[0x82, 0x01]).unwrap_err();
    assert!(matches!(err, LexicoderError::Truncated));
}

#[test]
fn integer_decode_rejects_empty() {
    let err = Lexicoder::Integer.decode(&[]).unwrap_err();
    assert!(matches!(err, LexicoderError::Truncated));
}

// -------------------- Long / Instant --------------------

#[test]
fn long_is_fixed_width() {
    let coder = Lexicoder::Long;
    for n in [i64::MIN, -1, 0, 1, i64::MAX] {
        assert_eq!(coder.encode(&Value::Int(n)).unwrap().len(), 8);
        roundtrip(&coder, Value::Int(n));
    }
}

#[test]
fn long_preserves_order() {
    let values: Vec<Value> = [i64::MIN, -1_000_000, -1, 0, 1, 1_000_000, i64::MAX]
        .iter()
        .map(|n| Value::Int(*n))
        .collect();
    assert_order_preserved(&Lexicoder::Long, &values);
}

#[test]
fn instant_encodes_like_long() {
    let millis = 1_690_000_000_000i64;
    assert_eq!(
        Lexicoder::Instant.encode(&Value::Int(millis)).unwrap(),
        Lexicoder::Long.encode(&Value::Int(millis)).unwrap()
    );
    roundtrip(&Lexicoder::Instant, Value::Int(millis));
}

#[test]
fn long_decode_rejects_wrong_width() {
    assert!(matches!(
        Lexicoder::Long.decode(&[0; 7]).unwrap_err(),
        LexicoderError::Truncated
    ));
    assert!(matches!(
        Lexicoder::Long.decode(&[0; 9]).unwrap_err(),
        LexicoderError::InvalidEncoding(_)
    ));
}

// -------------------- Tuple --------------------

fn int_string_tuple() -> Lexicoder {
    Lexicoder::Tuple(vec![Lexicoder::Integer, Lexicoder::String])
}

#[test]
fn tuple_roundtrips() {
    let coder = int_string_tuple();
    roundtrip(
        &coder,
        Value::List(vec![Value::Int(42), Value::from("answer")]),
    );
    roundtrip(&coder, Value::List(vec![Value::Int(-1), Value::from("")]));
}

#[test]
fn tuple_orders_by_member_significance() {
    // [1, "zz"] > [1, "a"] > [0, "zzz"]
    let coder = int_string_tuple();
    assert_order_preserved(
        &coder,
        &[
            Value::List(vec![Value::Int(0), Value::from("zzz")]),
            Value::List(vec![Value::Int(1), Value::from("a")]),
            Value::List(vec![Value::Int(1), Value::from("zz")]),
        ],
    );
}

#[test]
fn tuple_prefix_sorts_first() {
    // A member that is a strict prefix of another must sort before it.
    let coder = Lexicoder::Tuple(vec![Lexicoder::String, Lexicoder::String]);
    assert_order_preserved(
        &coder,
        &[
            Value::List(vec![Value::from("a"), Value::from("z")]),
            Value::List(vec![Value::from("ab"), Value::from("a")]),
        ],
    );
}

#[test]
fn tuple_escapes_embedded_zeros() {
    let coder = Lexicoder::Tuple(vec![Lexicoder::Bytes, Lexicoder::Bytes]);
    roundtrip(
        &coder,
        Value::List(vec![
            Value::Bytes(vec![0, 0, 1]),
            Value::Bytes(vec![255, 0]),
        ]),
    );
    // bytes containing the separator still order correctly against ones that don't
    assert_order_preserved(
        &coder,
        &[
            Value::List(vec![Value::Bytes(vec![]), Value::Bytes(vec![])]),
            Value::List(vec![Value::Bytes(vec![0]), Value::Bytes(vec![])]),
            Value::List(vec![Value::Bytes(vec![0, 1]), Value::Bytes(vec![])]),
            Value::List(vec![Value::Bytes(vec![1]), Value::Bytes(vec![])]),
        ],
    );
}

#[test]
fn nested_tuple_roundtrips() {
    let coder = Lexicoder::Tuple(vec![
        Lexicoder::Integer,
        Lexicoder::Tuple(vec![Lexicoder::String, Lexicoder::Integer]),
    ]);
    roundtrip(
        &coder,
        Value::List(vec![
            Value::Int(7),
            Value::List(vec![Value::from("x"), Value::Int(-3)]),
        ]),
    );
}

#[test]
fn tuple_rejects_wrong_arity() {
    let err = int_string_tuple()
        .encode(&Value::List(vec![Value::Int(1)]))
        .unwrap_err();
    assert!(matches!(err, LexicoderError::InvalidValue { .. }));
}

#[test]
fn tuple_decode_rejects_unterminated() {
    let coder = int_string_tuple();
    let mut encoded = coder
        .encode(&Value::List(vec![Value::Int(1), Value::from("a")]))
        .unwrap();
    encoded.pop(); // drop the final terminator
    assert!(matches!(
        coder.decode(&encoded).unwrap_err(),
        LexicoderError::Truncated
    ));
}

// -------------------- Round-trip sweep --------------------

#[test]
fn every_coder_roundtrips_a_representative_value() {
    let cases: Vec<(Lexicoder, Value)> = vec![
        (Lexicoder::Bytes, Value::Bytes(vec![1, 2, 3])),
        (Lexicoder::String, Value::from("key")),
        (Lexicoder::Integer, Value::Int(-1234)),
        (Lexicoder::Long, Value::Int(1 << 40)),
        (Lexicoder::Instant, Value::Int(0)),
        (
            Lexicoder::Tuple(vec![Lexicoder::Long, Lexicoder::Bytes]),
            Value::List(vec![Value::Int(9), Value::Bytes(vec![0])]),
        ),
    ];
    for (coder, value) in cases {
        roundtrip(&coder, value);
    }
}
