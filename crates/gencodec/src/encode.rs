//! The encoding half of the engine.
//!
//! An [`Encoder`] stages one message at a time in a scratch buffer. Type
//! codecs write leaf data through its primitive methods, bracket structs
//! with [`Encoder::start_struct`] / [`Encoder::end_struct`] and announce
//! pointers through [`Encoder::start_ptr`]. Values of types only known at
//! run time go through [`Encoder::encode_any`], which numbers their types
//! in first-use order; the numbering becomes the message metadata.

use std::{
    any::Any,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    hash::BuildHasher,
};

use fxhash::FxHashMap;

use crate::{
    config::EncodeOptions,
    error::{Error, Result},
    pointer::IdentityMap,
    registry::{CodecId, Registry},
    wire::{
        self, BYTES0, END, MAX_INLINE_LEN, N_BYTES, N_VALUES, NIL, START,
    },
};

/// Serializes values into the byte-code wire format.
///
/// The encoder is reused across messages; [`Encoder::begin_message`] resets
/// the per-message state (type numbers and pointer identities) but keeps
/// the allocated buffers.
#[derive(Debug)]
pub struct Encoder<'r> {
    registry: &'r Registry,
    buf: Vec<u8>,
    metadata: Vec<u8>,
    track_pointers: bool,
    max_depth: usize,
    depth: usize,
    type_table: Vec<CodecId>,
    type_numbers: FxHashMap<CodecId, u64>,
    identities: IdentityMap,
}

impl<'r> Encoder<'r> {
    /// Creates an encoder resolving types against `registry`.
    #[must_use]
    pub fn new(registry: &'r Registry, options: EncodeOptions) -> Self {
        let mut buf = options.scratch_buffer.unwrap_or_default();
        buf.clear();

        Self {
            registry,
            buf,
            metadata: Vec::new(),
            track_pointers: options.track_pointers,
            max_depth: options.max_depth,
            depth: 0,
            type_table: Vec::new(),
            type_numbers: FxHashMap::default(),
            identities: IdentityMap::default(),
        }
    }

    /// The registry this encoder dispatches through.
    #[must_use]
    pub const fn registry(&self) -> &'r Registry { self.registry }

    /// Whether shared pointers are tracked.
    #[must_use]
    pub const fn track_pointers(&self) -> bool { self.track_pointers }

    /// The payload bytes staged so far.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.buf }

    /// Clears all per-message state.
    pub fn begin_message(&mut self) {
        self.buf.clear();
        self.depth = 0;
        self.type_table.clear();
        self.type_numbers.clear();
        self.identities.clear();
    }

    /// Stages `value` as a complete message payload and builds its
    /// metadata. Returns `(metadata, payload)`.
    ///
    /// # Errors
    ///
    /// Fails if `value`, or any dynamic value inside it, has no registered
    /// codec, or if nesting exceeds the configured depth.
    pub fn encode_message(
        &mut self,
        value: Option<(&dyn Any, &'static str)>,
    ) -> Result<(&[u8], &[u8])> {
        self.begin_message();
        match value {
            Some((value, type_name)) => self.encode_dyn(value, type_name)?,
            None => self.encode_any(None)?,
        }

        // metadata is written with the same primitives, so it is staged in
        // the main buffer and swapped out
        let payload = std::mem::take(&mut self.buf);
        self.buf = std::mem::take(&mut self.metadata);
        self.buf.clear();

        let registry = self.registry;
        self.start_list(self.type_table.len());
        for index in 0..self.type_table.len() {
            self.encode_string(registry.stable_name(self.type_table[index]));
        }
        self.encode_bool(self.track_pointers);

        self.metadata = std::mem::replace(&mut self.buf, payload);

        Ok((&self.metadata, &self.buf))
    }

    /// Number of distinct dynamic types used by the current message.
    #[must_use]
    pub fn type_count(&self) -> usize { self.type_table.len() }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Writes an unsigned integer: a literal byte below [`END`], otherwise
    /// a length code followed by the shortest little-endian form.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode_uint(&mut self, value: u64) {
        if value < u64::from(END) {
            self.buf.push(value as u8);
            return;
        }

        let width = wire::uint_width(value);
        if width <= MAX_INLINE_LEN {
            self.buf.push(BYTES0 - width as u8);
        } else {
            self.buf.push(N_BYTES);
            self.buf.push(width as u8);
        }
        self.buf.extend_from_slice(&value.to_le_bytes()[..width]);
    }

    /// Writes a signed integer through the zigzag mapping.
    pub fn encode_int(&mut self, value: i64) {
        self.encode_uint(wire::zigzag_encode(value));
    }

    /// Writes a float as its byte-reversed bit pattern.
    pub fn encode_float(&mut self, value: f64) {
        self.encode_uint(wire::float_to_wire(value));
    }

    /// Writes `0` or `1`.
    pub fn encode_bool(&mut self, value: bool) { self.buf.push(u8::from(value)); }

    /// Writes a length-prefixed byte run.
    pub fn encode_bytes(&mut self, value: &[u8]) {
        if let Some(code) = wire::inline_len_code(value.len()) {
            self.buf.push(code);
        } else {
            self.buf.push(N_BYTES);
            self.encode_uint(value.len() as u64);
        }
        self.buf.extend_from_slice(value);
    }

    /// Writes a string as a byte run of its UTF-8 encoding.
    pub fn encode_string(&mut self, value: &str) {
        self.encode_bytes(value.as_bytes());
    }

    /// Opens a list of `len` values; the caller writes exactly `len` values
    /// next.
    pub fn start_list(&mut self, len: usize) {
        self.buf.push(N_VALUES);
        self.encode_uint(len as u64);
    }

    /// Writes a nil pointer, list or option.
    pub fn encode_nil(&mut self) { self.buf.push(NIL); }

    // =========================================================================
    // Structs
    // =========================================================================

    /// Opens a struct field list.
    ///
    /// # Errors
    ///
    /// Fails if nesting exceeds the configured depth.
    pub fn start_struct(&mut self) -> Result<()> {
        self.enter()?;
        self.buf.push(START);
        Ok(())
    }

    /// Writes field `slot` unless `value` is zero.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the field's encoding.
    pub fn encode_field<T: Encode + ?Sized>(
        &mut self,
        slot: u64,
        value: &T,
    ) -> Result<()> {
        if value.is_zero() {
            return Ok(());
        }

        self.encode_uint(slot);
        value.encode(self)
    }

    /// Closes the innermost struct.
    pub fn end_struct(&mut self) {
        self.buf.push(END);
        self.leave();
    }

    /// Enters one level of nesting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DepthLimitExceeded`] past the configured depth.
    pub fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::DepthLimitExceeded { max_depth: self.max_depth });
        }
        self.depth += 1;
        Ok(())
    }

    /// Leaves one level of nesting.
    pub fn leave(&mut self) { self.depth = self.depth.saturating_sub(1); }

    // =========================================================================
    // Pointers
    // =========================================================================

    /// Announces a non-nil pointer with the given identity (normally the
    /// address of the pointee).
    ///
    /// Returns `true` when the caller must encode the pointee next. With
    /// tracking enabled a repeated identity instead backpatches the first
    /// occurrence's tag to `REF_PTR`, writes a `REF` record and returns
    /// `false`.
    pub fn start_ptr(&mut self, identity: usize) -> bool {
        if !self.track_pointers {
            self.buf.push(wire::PTR);
            return true;
        }

        let offset = self.buf.len();
        match self.identities.first_sighting(identity, offset) {
            None => {
                self.buf.push(wire::PTR);
                true
            }
            Some(tag) => {
                self.buf[tag] = wire::REF_PTR;
                self.buf.push(wire::REF);
                self.encode_uint((offset - tag) as u64);
                tracing::trace!(tag, offset, "backpatched shared pointer");
                false
            }
        }
    }

    // =========================================================================
    // Dynamic values
    // =========================================================================

    /// Writes a possibly-nil value of a type known only at run time.
    ///
    /// Nil is the literal `0`; otherwise a two element list of the value's
    /// per-message type number and the value itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if the value's type has no codec.
    pub fn encode_any(&mut self, value: Option<&crate::AnyValue>) -> Result<()> {
        match value.and_then(|v| v.as_any().map(|any| (any, v.type_name()))) {
            Some((any, type_name)) => {
                self.encode_dyn(any, type_name.unwrap_or("<unknown>"))
            }
            None => {
                self.buf.push(0);
                Ok(())
            }
        }
    }

    /// Writes a statically typed value through its registered codec, the
    /// same way [`Encoder::encode_any`] would.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnregisteredType`] if `T` has no codec.
    pub fn encode_value<T: Any>(&mut self, value: &T) -> Result<()> {
        self.encode_dyn(value, std::any::type_name::<T>())
    }

    fn encode_dyn(
        &mut self,
        value: &dyn Any,
        type_name: &'static str,
    ) -> Result<()> {
        let registry = self.registry;
        let id = registry.lookup_type(value.type_id()).ok_or_else(
            || Error::UnregisteredType { name: type_name.to_owned() },
        )?;

        let number = match self.type_numbers.get(&id) {
            Some(number) => *number,
            None => {
                let number = self.type_table.len() as u64;
                self.type_table.push(id);
                self.type_numbers.insert(id, number);
                tracing::trace!(
                    number,
                    name = registry.stable_name(id),
                    "assigned type number"
                );
                number
            }
        };

        self.enter()?;
        self.start_list(2);
        self.encode_uint(number);
        let result = registry.codec(id).encode(self, value);
        self.leave();
        result
    }
}

/// A trait for types that can be serialized.
///
/// Implementations write exactly one value. Struct-like implementations
/// are usually generated with `#[derive(Codec)]`.
///
/// ```ignore
/// struct Point { x: i32, y: i32 }
///
/// impl Encode for Point {
///     fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
///         encoder.start_struct()?;
///         encoder.encode_field(0, &self.x)?;
///         encoder.encode_field(1, &self.y)?;
///         encoder.end_struct();
///         Ok(())
///     }
/// }
/// ```
pub trait Encode {
    /// Whether this type can encode as `NIL` itself. `Option` of such a
    /// type prefixes `Some` with a `PTR` tag to stay unambiguous.
    const NILLABLE: bool = false;

    /// Encodes this value.
    ///
    /// # Errors
    ///
    /// Fails on unregistered dynamic types or excessive nesting.
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()>;

    /// Whether this is the zero value, which struct fields omit.
    ///
    /// Decoding an omitted field leaves it at `Default::default()`, so a
    /// type may only report zero for the value its `Default` produces.
    fn is_zero(&self) -> bool { false }
}

// =============================================================================
// Implementations for primitive types
// =============================================================================

macro_rules! impl_encode_uint {
    ($($ty:ty),*) => {
        $(
            #[allow(clippy::cast_lossless)]
            impl Encode for $ty {
                fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
                    encoder.encode_uint(*self as u64);
                    Ok(())
                }

                fn is_zero(&self) -> bool { *self == 0 }
            }
        )*
    };
}

macro_rules! impl_encode_int {
    ($($ty:ty),*) => {
        $(
            #[allow(clippy::cast_lossless, clippy::cast_possible_wrap)]
            impl Encode for $ty {
                fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
                    encoder.encode_int(*self as i64);
                    Ok(())
                }

                fn is_zero(&self) -> bool { *self == 0 }
            }
        )*
    };
}

impl_encode_uint!(u8, u16, u32, u64, usize);
impl_encode_int!(i8, i16, i32, i64, isize);

impl Encode for bool {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_bool(*self);
        Ok(())
    }

    fn is_zero(&self) -> bool { !*self }
}

impl Encode for char {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_uint(u64::from(*self));
        Ok(())
    }

    fn is_zero(&self) -> bool { *self == '\0' }
}

impl Encode for f32 {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_float(f64::from(*self));
        Ok(())
    }

    fn is_zero(&self) -> bool { self.to_bits() == 0 }
}

impl Encode for f64 {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_float(*self);
        Ok(())
    }

    fn is_zero(&self) -> bool { self.to_bits() == 0 }
}

impl Encode for str {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_string(self);
        Ok(())
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

impl Encode for String {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_string(self);
        Ok(())
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

impl Encode for () {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.start_struct()?;
        encoder.end_struct();
        Ok(())
    }
}

// =============================================================================
// Implementations for wrappers
// =============================================================================

impl<T: Encode + ?Sized> Encode for &T {
    const NILLABLE: bool = T::NILLABLE;

    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        (**self).encode(encoder)
    }

    fn is_zero(&self) -> bool { (**self).is_zero() }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    const NILLABLE: bool = T::NILLABLE;

    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        (**self).encode(encoder)
    }

    fn is_zero(&self) -> bool { (**self).is_zero() }
}

impl<T: Encode> Encode for Option<T> {
    const NILLABLE: bool = true;

    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        match self {
            None => {
                encoder.encode_nil();
                Ok(())
            }
            Some(value) => {
                if T::NILLABLE {
                    encoder.buf.push(wire::PTR);
                }
                value.encode(encoder)
            }
        }
    }

    fn is_zero(&self) -> bool { self.is_none() }
}

// =============================================================================
// Implementations for sequences
// =============================================================================

fn encode_seq<'a, T: Encode + 'a>(
    encoder: &mut Encoder<'_>,
    len: usize,
    items: impl IntoIterator<Item = &'a T>,
) -> Result<()> {
    encoder.start_list(len);
    for item in items {
        item.encode(encoder)?;
    }
    Ok(())
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_seq(encoder, self.len(), self)
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_seq(encoder, self.len(), self)
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

impl<T: Encode> Encode for VecDeque<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_seq(encoder, self.len(), self)
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_seq(encoder, N, self)
    }

    fn is_zero(&self) -> bool { N == 0 }
}

impl<T: Encode, S: BuildHasher> Encode for HashSet<T, S> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_seq(encoder, self.len(), self)
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_seq(encoder, self.len(), self)
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

// Maps are lists of 2N values, alternating keys and values.

fn encode_map<'a, K: Encode + 'a, V: Encode + 'a>(
    encoder: &mut Encoder<'_>,
    len: usize,
    entries: impl IntoIterator<Item = (&'a K, &'a V)>,
) -> Result<()> {
    encoder.start_list(len * 2);
    for (key, value) in entries {
        key.encode(encoder)?;
        value.encode(encoder)?;
    }
    Ok(())
}

impl<K: Encode, V: Encode, S: BuildHasher> Encode for HashMap<K, V, S> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_map(encoder, self.len(), self)
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encode_map(encoder, self.len(), self)
    }

    fn is_zero(&self) -> bool { self.is_empty() }
}

macro_rules! impl_encode_tuple {
    ($len:expr => $($name:ident : $index:tt),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
                encoder.start_list($len);
                $(self.$index.encode(encoder)?;)+
                Ok(())
            }
        }
    };
}

impl_encode_tuple!(1 => A: 0);
impl_encode_tuple!(2 => A: 0, B: 1);
impl_encode_tuple!(3 => A: 0, B: 1, C: 2);
impl_encode_tuple!(4 => A: 0, B: 1, C: 2, D: 3);
