use std::cell::RefCell;

use super::*;
use crate::{
    Codec, EncodeOptions, Encoder,
    encode::Encode,
    wire::{BYTES1, BYTES2, BYTES4},
};

fn registry() -> Registry { Registry::builder().build().unwrap() }

fn encode<T: Encode>(value: &T, track_pointers: bool) -> Vec<u8> {
    let registry = registry();
    let options =
        EncodeOptions::builder().track_pointers(track_pointers).build();
    let mut encoder = Encoder::new(&registry, options);
    value.encode(&mut encoder).unwrap();
    encoder.payload().to_vec()
}

fn decode_with<T: Decode>(bytes: &[u8], options: DecodeOptions) -> Result<T> {
    let registry = registry();
    let mut decoder = Decoder::new(&registry, options);
    decoder.load_payload(bytes);
    let value = T::decode(&mut decoder)?;
    assert_eq!(decoder.remaining(), 0, "value did not span the payload");
    Ok(value)
}

fn decode<T: Decode>(bytes: &[u8]) -> Result<T> {
    decode_with(bytes, DecodeOptions::default())
}

fn roundtrip<T: Encode + Decode>(value: &T) -> T {
    decode(&encode(value, false)).unwrap()
}

// =============================================================================
// Test Types
// =============================================================================

#[derive(Debug, Default, PartialEq, Codec)]
#[codec(name = "decode::Account")]
struct AccountV1 {
    id: u64,
    owner: String,
}

#[derive(Debug, Default, PartialEq, Codec)]
#[codec(name = "decode::Account")]
struct AccountV2 {
    id: u64,
    owner: String,
    tags: Vec<String>,
    balance: i64,
}

#[derive(Debug, Default, PartialEq, Codec)]
#[codec(name = "decode::Account", removed(1))]
struct AccountV3 {
    id: u64,
    #[codec(slot = 3)]
    balance: i64,
}

#[derive(Debug, Default, Codec)]
#[codec(name = "decode::Link")]
struct Link {
    label: String,
    next: Option<Rc<RefCell<Link>>>,
}

#[derive(Debug, Default, Codec)]
#[codec(name = "decode::Pair")]
struct Pair {
    left: Option<Rc<RefCell<u32>>>,
    right: Option<Rc<RefCell<u32>>>,
}

#[derive(Debug, Default, Codec)]
#[codec(name = "decode::Pair")]
struct RightOnly {
    #[codec(slot = 1)]
    right: Option<Rc<RefCell<u32>>>,
}

#[derive(Debug, Default, PartialEq, Codec)]
#[codec(name = "decode::Command")]
enum Command {
    #[default]
    Stop,
    Move(i32, i32),
    Say {
        text: String,
        #[codec(skip)]
        cached: usize,
    },
}

// =============================================================================
// Primitives
// =============================================================================

#[test]
fn integer_boundaries() {
    for value in [0, 240, 241, 255, 256, 65_535, 65_536, u64::MAX] {
        assert_eq!(roundtrip(&value), value);
    }
    for value in [0, -1, 1, i64::MIN, i64::MAX, -120, 120, -121] {
        assert_eq!(roundtrip(&value), value);
    }
    assert_eq!(roundtrip(&i8::MIN), i8::MIN);
    assert_eq!(roundtrip(&u32::MAX), u32::MAX);
}

#[test]
#[allow(clippy::float_cmp)]
fn floats() {
    for value in [0.0, -0.0, 1.0, 2.0, -1.5, f64::MAX, f64::MIN_POSITIVE] {
        assert_eq!(roundtrip(&value).to_bits(), value.to_bits());
    }
    assert!(roundtrip(&f64::NAN).is_nan());
    assert_eq!(roundtrip(&std::f32::consts::PI), std::f32::consts::PI);
}

#[test]
fn non_canonical_uint_forms_are_accepted() {
    assert_eq!(decode::<u8>(&[BYTES1, 5]).unwrap(), 5);
    assert_eq!(decode::<u16>(&[N_BYTES, 2, 1, 1]).unwrap(), 257);
    assert!(matches!(
        decode::<u64>(&[N_BYTES, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        Err(Error::BadCode { code: 9, offset: 1 })
    ));
}

#[test]
fn narrowing_checks_range() {
    assert!(matches!(
        decode::<u8>(&[BYTES2, 0, 1]),
        Err(Error::OutOfRange { value: 256, target: "u8" })
    ));
    assert!(matches!(
        decode::<char>(&[BYTES4, 0, 0xD8, 0, 0]),
        Err(Error::InvalidChar { value: 0xD800 })
    ));
    assert_eq!(roundtrip(&'é'), 'é');
}

#[test]
fn malformed_primitives() {
    assert!(matches!(decode::<bool>(&[2]), Err(Error::BadBool { offset: 0 })));
    assert!(matches!(
        decode::<String>(&[BYTES2, 0xFF, 0xFE]),
        Err(Error::InvalidUtf8 { offset: 1 })
    ));
    assert!(matches!(
        decode::<String>(&[N_BYTES, 10, b'a']),
        Err(Error::Truncated { .. })
    ));
    assert!(matches!(decode::<u32>(&[]), Err(Error::Truncated { offset: 0 })));
    assert!(matches!(
        decode::<u32>(&[START]),
        Err(Error::BadCode { code: START, offset: 0 })
    ));
}

#[test]
fn containers() {
    let map = HashMap::from([(1u8, "one".to_owned()), (2, "two".to_owned())]);
    assert_eq!(roundtrip(&map), map);
    assert_eq!(roundtrip(&[1u16, 2, 3]), [1, 2, 3]);
    assert_eq!(
        roundtrip(&(true, 'x', "s".to_owned())),
        (true, 'x', "s".to_owned())
    );
    assert_eq!(
        roundtrip(&Some(Some(None::<u8>))),
        Some(Some(None))
    );

    // a nil list decodes as an empty collection
    assert_eq!(decode::<Vec<u8>>(&[NIL]).unwrap(), Vec::<u8>::new());
    assert!(matches!(
        decode::<[u8; 2]>(&[N_VALUES, 1, 0]),
        Err(Error::BadListLength { expected: 2, found: Some(1) })
    ));
}

#[test]
fn list_length_errors_name_the_nil_list() {
    let short = Error::BadListLength { expected: 2, found: Some(1) };
    assert_eq!(short.to_string(), "expected a list of 2 values, found 1");

    let nil = Error::BadListLength { expected: 2, found: None };
    assert_eq!(nil.to_string(), "expected a list of 2 values, found nil");
}

#[test]
fn oversized_list_counts_are_rejected() {
    assert!(matches!(
        decode::<Vec<u8>>(&[N_VALUES, 200, 1, 2]),
        Err(Error::Truncated { .. })
    ));
}

// =============================================================================
// Structs
// =============================================================================

#[test]
fn struct_fields_in_any_order() {
    let bytes = [START, 1, BYTES1, b'x', 0, 7, END];
    let account = decode::<AccountV1>(&bytes).unwrap();
    assert_eq!(account, AccountV1 { id: 7, owner: "x".into() });
}

#[test]
fn newer_fields_are_skipped() {
    let newer = AccountV2 {
        id: 9,
        owner: "ann".into(),
        tags: vec!["a".into(), "b".into()],
        balance: -40,
    };
    let bytes = encode(&newer, false);

    let older = decode::<AccountV1>(&bytes).unwrap();
    assert_eq!(older, AccountV1 { id: 9, owner: "ann".into() });
}

#[test]
fn strict_mode_rejects_unknown_fields() {
    let newer = AccountV2 { tags: vec!["a".into()], ..AccountV2::default() };
    let bytes = encode(&newer, false);

    let options = DecodeOptions::builder().fail_on_unknown_field(true).build();
    let result = decode_with::<AccountV1>(&bytes, options);
    assert!(matches!(
        result,
        Err(Error::UnknownField { ref type_name, slot: 2 })
            if type_name == "decode::Account"
    ));
}

#[test]
fn removed_slots_are_skipped_in_strict_mode() {
    let older = AccountV2 {
        id: 1,
        owner: "gone".into(),
        tags: Vec::new(),
        balance: 12,
    };
    let bytes = encode(&older, false);

    let options = DecodeOptions::builder().fail_on_unknown_field(true).build();
    let current = decode_with::<AccountV3>(&bytes, options).unwrap();
    assert_eq!(current, AccountV3 { id: 1, balance: 12 });
}

#[test]
fn missing_fields_keep_defaults() {
    let newer = decode::<AccountV2>(&[START, 0, 3, END]).unwrap();
    assert_eq!(newer, AccountV2 { id: 3, ..AccountV2::default() });
}

#[test]
fn enums_roundtrip() {
    assert_eq!(roundtrip(&Command::Stop), Command::Stop);
    assert_eq!(roundtrip(&Command::Move(-3, 4)), Command::Move(-3, 4));

    let say = Command::Say { text: "hi".into(), cached: 10 };
    assert_eq!(
        roundtrip(&say),
        Command::Say { text: "hi".into(), cached: 0 }
    );

    assert_eq!(
        encode(&Command::Move(0, 1), false),
        [N_VALUES, 2, 1, START, 1, 2, END]
    );
}

#[test]
fn unknown_variants_fail() {
    assert!(matches!(
        decode::<Command>(&[N_VALUES, 2, 7, START, END]),
        Err(Error::OutOfRange { value: 7, target: "decode::Command" })
    ));
}

// =============================================================================
// Skipping
// =============================================================================

#[test]
fn skip_walks_every_shape() {
    let bytes = [
        N_VALUES, 6, // list
        200, // literal
        BYTES2, 1, 2, // uint
        N_BYTES, 5, b'h', b'e', b'l', b'l', b'o', // bytes
        START, 0, 1, 1, N_VALUES, 1, NIL, END, // struct
        PTR, START, END, // pointer
        N_VALUES, 0, // empty list
        42,
    ];

    let registry = registry();
    let mut decoder = Decoder::new(&registry, DecodeOptions::default());
    decoder.load_payload(&bytes);
    decoder.skip().unwrap();
    assert_eq!(decoder.decode_uint().unwrap(), 42);
    assert_eq!(decoder.remaining(), 0);
}

#[test]
fn skip_respects_depth_limit() {
    let bytes = [START, 0, START, 0, START, END, END, END];
    let options = DecodeOptions::builder().max_depth(2).build();

    let registry = registry();
    let mut decoder = Decoder::new(&registry, options);
    decoder.load_payload(&bytes);
    assert!(matches!(
        decoder.skip(),
        Err(Error::DepthLimitExceeded { max_depth: 2 })
    ));
}

// =============================================================================
// Pointers
// =============================================================================

#[test]
fn sharing_is_restored_with_tracking() {
    let shared = Rc::new(RefCell::new(5u32));
    let pair = Pair { left: Some(shared.clone()), right: Some(shared) };

    let decoded = decode::<Pair>(&encode(&pair, true)).unwrap();
    let (Some(left), Some(right)) = (decoded.left, decoded.right) else {
        panic!("both sides should be present");
    };
    assert!(Rc::ptr_eq(&left, &right));
    *left.borrow_mut() = 6;
    assert_eq!(*right.borrow(), 6);
}

#[test]
fn sharing_is_lost_without_tracking() {
    let shared = Rc::new(RefCell::new(5u32));
    let pair = Pair { left: Some(shared.clone()), right: Some(shared) };

    let decoded = decode::<Pair>(&encode(&pair, false)).unwrap();
    let (Some(left), Some(right)) = (decoded.left, decoded.right) else {
        panic!("both sides should be present");
    };
    assert!(!Rc::ptr_eq(&left, &right));
    assert_eq!(*left.borrow(), 5);
    assert_eq!(*right.borrow(), 5);
}

#[test]
fn cycles_roundtrip_with_tracking() {
    let first = Rc::new(RefCell::new(Link { label: "a".into(), next: None }));
    let second = Rc::new(RefCell::new(Link {
        label: "b".into(),
        next: Some(first.clone()),
    }));
    first.borrow_mut().next = Some(second.clone());

    let bytes = encode(&first, true);
    let decoded = decode::<Rc<RefCell<Link>>>(&bytes).unwrap();

    let next = decoded.borrow().next.clone().unwrap();
    assert_eq!(next.borrow().label, "b");
    let back = next.borrow().next.clone().unwrap();
    assert!(Rc::ptr_eq(&back, &decoded));

    // break both cycles so the test does not leak
    first.borrow_mut().next = None;
    decoded.borrow_mut().next = None;
}

#[test]
fn skipped_pointee_is_decoded_out_of_order() {
    let shared = Rc::new(RefCell::new(8u32));
    let pair = Pair { left: Some(shared.clone()), right: Some(shared) };
    let bytes = encode(&pair, true);
    assert_eq!(bytes, [START, 0, REF_PTR, 8, 1, REF, 3, END]);

    let decoded = decode::<RightOnly>(&bytes).unwrap();
    assert_eq!(decoded.right.map(|right| *right.borrow()), Some(8));
}

#[test]
fn reference_codes_require_tracking() {
    let registry = registry();
    let mut decoder = Decoder::new(&registry, DecodeOptions::default());
    decoder.prepare(2).copy_from_slice(&[REF_PTR, 1]);

    assert!(matches!(
        Rc::<u8>::decode(&mut decoder),
        Err(Error::BadCode { code: REF_PTR, offset: 0 })
    ));
}

#[test]
fn dangling_references_fail() {
    assert!(matches!(
        decode::<(Rc<u8>, Rc<u8>)>(&[N_VALUES, 2, PTR, 1, REF, 1]),
        Err(Error::DanglingRef { offset: 4 })
    ));
    assert!(matches!(
        decode::<Rc<u8>>(&[REF, 0]),
        Err(Error::DanglingRef { offset: 0 })
    ));
}

#[test]
fn references_to_other_pointer_types_fail() {
    let bytes = [N_VALUES, 2, REF_PTR, 1, REF, 2];
    assert!(matches!(
        decode::<(Rc<u8>, Rc<u16>)>(&bytes),
        Err(Error::RefTypeMismatch { offset: 4 })
    ));
}

#[test]
fn pointer_nesting_respects_depth_limit() {
    let options = DecodeOptions::builder().max_depth(2).build();
    assert!(matches!(
        decode_with::<Rc<Rc<Rc<u8>>>>(&[PTR, PTR, PTR, 0], options),
        Err(Error::DepthLimitExceeded { max_depth: 2 })
    ));
}

#[test]
fn dynamic_values_need_metadata() {
    assert!(matches!(
        decode::<AnyValue>(&[N_VALUES, 2, 0, 1]),
        Err(Error::TypeNumberOutOfRange { number: 0, len: 0 })
    ));
    assert!(decode::<AnyValue>(&[0]).unwrap().is_nil());
}

proptest::proptest! {
    #[test]
    fn skip_consumes_exactly_one_value(
        numbers in proptest::collection::vec(proptest::num::i64::ANY, 0..8),
        text in ".{0,12}",
        maybe in proptest::option::of(proptest::num::u32::ANY),
        unsigned in proptest::num::u64::ANY,
    ) {
        let value = (numbers, text, maybe, unsigned);
        let mut bytes = encode(&value, false);
        bytes.push(7);

        let registry = registry();
        let mut decoder = Decoder::new(&registry, DecodeOptions::default());
        decoder.load_payload(&bytes);
        decoder.skip().unwrap();
        proptest::prop_assert_eq!(decoder.remaining(), 1);
        proptest::prop_assert_eq!(decoder.decode_uint().unwrap(), 7);
    }

    #[test]
    fn uints_roundtrip(value in proptest::num::u64::ANY) {
        proptest::prop_assert_eq!(roundtrip(&value), value);
    }
}
