//! Shared fixture types for gencodec integration tests.
//!
//! The fixtures model a small address book: people with contacts, shared
//! and cyclic references between them, and two generations of the `Person`
//! schema registered under the same stable name.

#![allow(missing_docs)]
#![allow(clippy::must_use_candidate)]

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    rc::Rc,
    sync::Arc,
};

use gencodec::{
    AnyValue, ByteBuf, Codec, DecodeOptions, DecodeSession, EncodeOptions,
    EncodeSession, Registry, RegistryBuilder, Result,
};
use parking_lot::RwLock;

// ============================================================================
// Schema Generations
// ============================================================================

/// The first published `Person` schema.
pub mod v1 {
    use super::Codec;

    #[derive(Debug, Clone, Default, PartialEq, Codec)]
    #[codec(name = "book::Person")]
    pub struct Person {
        pub name: String,
        pub age: u32,
        pub nickname: String,
    }
}

/// The second `Person` schema: `nickname` was retired and two fields were
/// added. Slot 2 must never be reused.
pub mod v2 {
    use super::{BTreeMap, Codec};

    #[derive(Debug, Clone, Default, PartialEq, Codec)]
    #[codec(name = "book::Person", removed(2))]
    pub struct Person {
        pub name: String,
        pub age: u32,
        pub email: Option<String>,
        pub phones: BTreeMap<String, u64>,
    }
}

// ============================================================================
// Shared and Cyclic Data
// ============================================================================

/// A node of a singly linked, possibly circular, list.
#[derive(Debug, Default, Codec)]
#[codec(name = "book::Node")]
pub struct Node {
    pub value: i64,
    pub next: Option<Rc<RefCell<Node>>>,
}

impl Node {
    /// Builds a ring of `len` nodes holding `0..len` and returns its first
    /// node.
    pub fn ring(len: i64) -> Rc<RefCell<Self>> {
        let head = Rc::new(RefCell::new(Self { value: 0, next: None }));
        let mut tail = head.clone();
        for value in 1..len {
            let node = Rc::new(RefCell::new(Self { value, next: None }));
            tail.borrow_mut().next = Some(node.clone());
            tail = node;
        }
        tail.borrow_mut().next = Some(head.clone());
        head
    }

    /// Cuts the ring starting at `head` so that it can be dropped.
    pub fn break_ring(head: &Rc<RefCell<Self>>) {
        let mut current = head.borrow_mut().next.take();
        while let Some(node) = current {
            if Rc::ptr_eq(&node, head) {
                break;
            }
            current = node.borrow_mut().next.take();
        }
    }
}

/// Two members of a household sharing one address record.
#[derive(Debug, Default, Codec)]
#[codec(name = "book::Household")]
pub struct Household {
    pub first: Option<Rc<RefCell<Address>>>,
    pub second: Option<Rc<RefCell<Address>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Codec)]
#[codec(name = "book::Address")]
pub struct Address {
    pub street: String,
    pub number: u16,
}

/// A counter shared across threads.
#[derive(Debug, Default, Codec)]
#[codec(name = "book::Counters")]
pub struct Counters {
    pub hits: Arc<RwLock<u64>>,
    pub misses: Arc<RwLock<u64>>,
}

// ============================================================================
// Scalars and Containers
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Codec)]
#[codec(name = "book::Contact")]
pub enum Contact {
    #[default]
    Unknown,
    Phone(u64),
    Mail { address: String, verified: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Codec)]
#[codec(name = "book::Record")]
pub struct Record {
    pub flag: bool,
    pub small: i8,
    pub wide: i64,
    pub unsigned: u64,
    pub ratio: f64,
    pub ratio32: f32,
    pub letter: char,
    pub text: String,
    pub blob: ByteBuf,
    pub list: Vec<i32>,
    pub fixed: [u8; 3],
    pub pair: (u8, String),
    pub lookup: HashMap<String, Contact>,
    pub contacts: Vec<Contact>,
    pub nested: Option<Option<u8>>,
    pub boxed: Box<Address>,
}

// ============================================================================
// Registries and Stream Helpers
// ============================================================================

/// A registry knowing the first `Person` generation and the shared types.
pub fn registry_v1() -> Registry {
    let mut builder = RegistryBuilder::new();
    builder.register::<v1::Person>();
    register_common(&mut builder);
    build(builder)
}

/// A registry knowing the second `Person` generation and the shared types.
pub fn registry_v2() -> Registry {
    let mut builder = RegistryBuilder::new();
    builder.register::<v2::Person>();
    register_common(&mut builder);
    build(builder)
}

fn register_common(builder: &mut RegistryBuilder) {
    builder
        .register::<Node>()
        .register::<Rc<RefCell<Node>>>()
        .register::<Household>()
        .register::<Counters>()
        .register::<Record>()
        .register::<Vec<AnyValue>>();
}

fn build(builder: RegistryBuilder) -> Registry {
    match builder.build() {
        Ok(registry) => registry,
        Err(error) => panic!("fixture registry failed to build: {error}"),
    }
}

/// Encodes every value as its own message.
///
/// # Errors
///
/// Propagates the first encode failure.
pub fn encode_stream(
    registry: &Registry,
    options: EncodeOptions,
    values: &[AnyValue],
) -> Result<Vec<u8>> {
    let mut session = EncodeSession::with_options(Vec::new(), registry, options);
    for value in values {
        session.encode_any(value)?;
    }
    Ok(session.into_inner())
}

/// Decodes messages until the stream ends.
///
/// # Errors
///
/// Propagates the first decode failure.
pub fn decode_stream(
    registry: &Registry,
    options: DecodeOptions,
    bytes: &[u8],
) -> Result<Vec<AnyValue>> {
    let mut session = DecodeSession::with_options(bytes, registry, options);
    let mut values = Vec::new();
    while let Some(value) = session.decode()? {
        values.push(value);
    }
    Ok(values)
}

/// Encodes `value` as a single message and decodes it back.
///
/// # Errors
///
/// Propagates encode and decode failures.
pub fn roundtrip<T: std::any::Any>(
    registry: &Registry,
    track_pointers: bool,
    value: &T,
) -> Result<T> {
    let options = EncodeOptions::builder().track_pointers(track_pointers).build();
    let mut session = EncodeSession::with_options(Vec::new(), registry, options);
    session.encode(value)?;
    let bytes = session.into_inner();

    let mut session = DecodeSession::new(bytes.as_slice(), registry);
    match session.decode_as::<T>()? {
        Some(value) => Ok(value),
        None => Err(gencodec::Error::TruncatedStream),
    }
}
