//! A binary serialization engine that preserves shared pointers and cycles
//! and tolerates independent schema evolution.
//!
//! # Overview
//!
//! Values are written as a tree of single-byte codes (see [`wire`]) by
//! small per-type codecs. The engine supplies everything the codecs share:
//!
//! - [`Encoder`] / [`Decoder`]: primitives, the struct field protocol,
//!   pointer tracking, and dynamic dispatch through the [`Registry`]
//! - [`Encode`] / [`Decode`] / [`Codec`]: the static side of a type codec,
//!   implemented for std types and generated by `#[derive(Codec)]`
//! - [`EncodeSession`] / [`DecodeSession`]: framing over `Write` / `Read`
//! - [`inspect::dump`]: annotated dumps of encoded streams
//!
//! # Example
//!
//! ```ignore
//! use std::{cell::RefCell, rc::Rc};
//!
//! use gencodec::{Codec, DecodeSession, EncodeOptions, EncodeSession,
//!     RegistryBuilder};
//!
//! #[derive(Default, Codec)]
//! struct Node {
//!     value: i64,
//!     next: Option<Rc<RefCell<Node>>>,
//! }
//!
//! let mut builder = RegistryBuilder::new();
//! builder.register::<Rc<RefCell<Node>>>();
//! let registry = builder.build()?;
//!
//! let node = Rc::new(RefCell::new(Node { value: 1, next: None }));
//! node.borrow_mut().next = Some(node.clone());
//!
//! let options = EncodeOptions::builder().track_pointers(true).build();
//! let mut session = EncodeSession::with_options(Vec::new(), &registry, options);
//! session.encode(&node)?;
//!
//! let bytes = session.into_inner();
//! let mut session = DecodeSession::new(bytes.as_slice(), &registry);
//! let decoded = session.decode_as::<Rc<RefCell<Node>>>()?.unwrap();
//! ```
//!
//! # Derive attributes
//!
//! Struct fields are identified on the wire by slot numbers, assigned in
//! declaration order:
//!
//! ```ignore
//! #[derive(Default, Codec)]
//! #[codec(name = "app::Person", removed(2))]
//! struct Person {
//!     name: String,          // slot 0
//!     #[codec(slot = 5)]
//!     nickname: String,      // slot 5
//!     age: u32,              // slot 1
//!     email: String,         // slot 3, slot 2 is retired
//!     #[codec(skip)]
//!     cache: Vec<u8>,        // never encoded
//! }
//! ```
//!
//! New fields should be appended, or pinned with `slot`. Retired slots
//! are listed in `removed` so they are never handed out again.

// Allow derive macros to reference this crate as `gencodec` internally
extern crate self as gencodec;

mod any;
mod bytes;
pub mod codec;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod inspect;
mod pointer;
pub mod registry;
pub mod session;
pub mod wire;

pub use any::AnyValue;
pub use bytes::{AsBytes, ByteBuf, ByteForm};
pub use codec::{Codec, Field, Shape, StaticCodec, TypeCodec, TypeKey};
pub use config::{DecodeOptions, EncodeOptions};
pub use decode::{Decode, Decoder, FreshPtr, PtrStart};
pub use encode::{Encode, Encoder};
pub use error::{Error, Result};
// Re-export derive macros
pub use gencodec_derive::Codec;
pub use registry::{CodecId, Registry, RegistryBuilder, RegistryError, Wiring};
pub use session::{DecodeSession, EncodeSession};
