//! Framed streams over files and readers.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
};

use gencodec::{
    AnyValue, DecodeOptions, DecodeSession, EncodeOptions, EncodeSession,
    Error, inspect,
};
use gencodec_integration_test::{
    Address, Household, decode_stream, encode_stream, registry_v1, v1,
};
use tempfile::tempdir;
use tracing_test::traced_test;

fn people() -> Vec<AnyValue> {
    ["Ada", "Grace", "Barbara"]
        .into_iter()
        .zip(30..)
        .map(|(name, age)| {
            AnyValue::new(v1::Person {
                name: name.to_owned(),
                age,
                nickname: String::new(),
            })
        })
        .collect()
}

#[test]
fn file_roundtrip() {
    let registry = registry_v1();
    let tempdir = tempdir().unwrap();
    let path = tempdir.path().join("people.gnc");

    {
        let file = BufWriter::new(File::create(&path).unwrap());
        let mut session = EncodeSession::new(file, &registry);
        for person in people() {
            session.encode_any(&person).unwrap();
        }
        session.flush().unwrap();
        session.into_inner().flush().unwrap();
    }

    let file = BufReader::new(File::open(&path).unwrap());
    let mut session = DecodeSession::new(file, &registry);
    let mut names = Vec::new();
    while let Some(person) = session.decode_as::<v1::Person>().unwrap() {
        names.push(person.name);
    }
    assert_eq!(names, ["Ada", "Grace", "Barbara"]);
}

#[test]
fn clean_end_versus_truncation() {
    let registry = registry_v1();
    let bytes =
        encode_stream(&registry, EncodeOptions::default(), &people()).unwrap();

    // a stream cut exactly between messages is merely shorter
    let first_frame = {
        let size = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        12 + usize::try_from(size).unwrap()
    };
    let values =
        decode_stream(&registry, DecodeOptions::default(), &bytes[..first_frame])
            .unwrap();
    assert_eq!(values.len(), 1);

    let result = decode_stream(
        &registry,
        DecodeOptions::default(),
        &bytes[..first_frame + 3],
    );
    assert!(matches!(result, Err(Error::TruncatedStream)));
}

#[test]
fn failure_poisons_later_reads() {
    let registry = registry_v1();
    let mut bytes =
        encode_stream(&registry, EncodeOptions::default(), &people()).unwrap();

    // corrupt the first message's type count
    bytes[12] = 0x00;

    let mut session = DecodeSession::new(bytes.as_slice(), &registry);
    assert!(session.decode().is_err());
    assert!(session.is_poisoned());
    assert!(matches!(session.decode(), Err(Error::Poisoned)));
}

#[test]
fn unregistered_type_leaves_the_sink_empty() {
    let registry = registry_v1();

    struct Unknown;

    let mut session = EncodeSession::new(Vec::new(), &registry);
    let result = session.encode(&Unknown);
    assert!(matches!(
        result,
        Err(Error::UnregisteredType { ref name }) if name.ends_with("Unknown")
    ));
    assert!(session.into_inner().is_empty());
}

#[test]
fn unregistered_nested_value_leaves_the_sink_empty() {
    let registry = registry_v1();
    let value = AnyValue::new(vec![AnyValue::new(vec![1u16])]);

    let mut session = EncodeSession::new(Vec::new(), &registry);
    assert!(session.encode_any(&value).is_err());
    assert!(session.into_inner().is_empty());
}

#[test]
fn dump_renders_a_household() {
    let registry = registry_v1();
    let household = Household {
        first: Some(std::rc::Rc::new(std::cell::RefCell::new(Address {
            street: "Elm".to_owned(),
            number: 3,
        }))),
        second: None,
    };

    let options = EncodeOptions::builder().track_pointers(true).build();
    let bytes =
        encode_stream(&registry, options, &[AnyValue::new(household)]).unwrap();

    let dump = inspect::dump(&registry, &bytes).unwrap();
    assert!(dump.contains("types: [0] book::Household"), "{dump}");
    assert!(dump.contains("track_pointers: true"), "{dump}");
    assert!(dump.contains("struct book::Household"), "{dump}");
    assert!(dump.contains("street: \"Elm\""), "{dump}");
    assert!(dump.contains("number: 3"), "{dump}");
}

#[test]
#[traced_test]
fn sessions_emit_debug_events() {
    let registry = registry_v1();
    let bytes =
        encode_stream(&registry, EncodeOptions::default(), &people()).unwrap();
    decode_stream(&registry, DecodeOptions::default(), &bytes).unwrap();

    assert!(logs_contain("encoded message"));
    assert!(logs_contain("decoded message"));
    assert!(logs_contain("registry built"));
}
