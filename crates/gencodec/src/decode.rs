//! The decoding half of the engine.
//!
//! A [`Decoder`] owns the bytes of one message at a time. Type codecs read
//! leaf data through its primitive methods, walk struct fields with
//! [`Decoder::start_struct`] / [`Decoder::next_field`], and resolve
//! pointers with [`Decoder::start_ptr`] / [`Decoder::store_ref`] /
//! [`Decoder::end_ptr`]. Anything a codec does not understand can be
//! stepped over with [`Decoder::skip`], which needs no type information.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    hash::{BuildHasher, Hash},
    rc::Rc,
    sync::Arc,
};

use crate::{
    any::AnyValue,
    config::DecodeOptions,
    error::{Error, Result},
    pointer::RefTable,
    registry::{CodecId, Registry},
    wire::{self, END, N_BYTES, N_VALUES, NIL, PTR, REF, REF_PTR, START},
};

/// The outcome of [`Decoder::start_ptr`].
#[derive(Debug)]
pub enum PtrStart<P> {
    /// The pointer is nil.
    Nil,
    /// A back reference to a pointer decoded earlier in the message.
    Existing(P),
    /// A pointee follows. Allocate it, hand it to [`Decoder::store_ref`],
    /// decode into it, then call [`Decoder::end_ptr`].
    Fresh(FreshPtr),
}

/// Bookkeeping for a pointee being decoded.
#[derive(Debug)]
#[must_use = "a fresh pointer must be finished with `Decoder::end_ptr`"]
pub struct FreshPtr {
    // offset of the REF_PTR tag, if later references may point here
    slot: Option<usize>,
    // where to continue after decoding a pointee out of order
    resume: Option<usize>,
}

/// Deserializes values from the byte-code wire format.
#[derive(Debug)]
pub struct Decoder<'r> {
    registry: &'r Registry,
    options: DecodeOptions,
    buf: Vec<u8>,
    pos: usize,
    depth: usize,
    tracked: bool,
    type_table: Vec<CodecId>,
    refs: RefTable,
}

impl<'r> Decoder<'r> {
    /// Creates a decoder resolving stable names against `registry`.
    #[must_use]
    pub fn new(registry: &'r Registry, options: DecodeOptions) -> Self {
        Self {
            registry,
            options,
            buf: Vec::new(),
            pos: 0,
            depth: 0,
            tracked: false,
            type_table: Vec::new(),
            refs: RefTable::default(),
        }
    }

    /// The registry this decoder dispatches through.
    #[must_use]
    pub const fn registry(&self) -> &'r Registry { self.registry }

    /// The options this decoder was created with.
    #[must_use]
    pub const fn options(&self) -> &DecodeOptions { &self.options }

    /// Current read offset within the message.
    #[must_use]
    pub const fn offset(&self) -> usize { self.pos }

    /// Number of unread bytes.
    #[must_use]
    pub const fn remaining(&self) -> usize { self.buf.len() - self.pos }

    /// Clears per-message state and returns the input buffer, resized to
    /// `len` bytes, for the caller to fill.
    pub fn prepare(&mut self, len: usize) -> &mut [u8] {
        self.pos = 0;
        self.depth = 0;
        self.tracked = false;
        self.type_table.clear();
        self.refs.clear();
        self.buf.clear();
        self.buf.resize(len, 0);
        &mut self.buf
    }

    /// Loads a bare payload without metadata. Dynamic values cannot be
    /// decoded from it; shared pointers can.
    pub fn load_payload(&mut self, payload: &[u8]) {
        self.prepare(payload.len()).copy_from_slice(payload);
        self.tracked = true;
    }

    /// Decodes the message loaded with [`Decoder::prepare`]: metadata, then
    /// one dynamic value that must span the rest of the buffer.
    ///
    /// # Errors
    ///
    /// Fails on malformed input, a type name missing from the registry, or
    /// trailing bytes.
    pub fn decode_message(&mut self) -> Result<AnyValue> {
        self.read_metadata()?;
        let value = self.decode_any()?;

        match self.remaining() {
            0 => Ok(value),
            remaining => Err(Error::TrailingBytes { remaining }),
        }
    }

    fn read_metadata(&mut self) -> Result<()> {
        let offset = self.pos;
        let count = self.start_list()?.ok_or(Error::BadCode {
            code: NIL,
            offset,
        })?;

        let registry = self.registry;
        for _ in 0..count {
            let id = {
                let name = self.decode_str()?;
                registry.lookup_name(name).ok_or_else(|| {
                    Error::UnregisteredType { name: name.to_owned() }
                })?
            };
            self.type_table.push(id);
        }
        self.tracked = self.decode_bool()?;

        tracing::trace!(
            types = self.type_table.len(),
            tracked = self.tracked,
            "read message metadata"
        );
        Ok(())
    }

    /// Decodes a whole value of a statically known type.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    pub fn decode<T: Decode>(&mut self) -> Result<T> { T::decode(self) }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Returns the next byte without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] at the end of the message.
    pub fn peek_byte(&self) -> Result<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(Error::Truncated { offset: self.pos })
    }

    /// Consumes the next byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] at the end of the message.
    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self.peek_byte()?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&[u8]> {
        if len > self.remaining() {
            return Err(Error::Truncated { offset: self.buf.len() });
        }

        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }

    fn read_le(&mut self, width: usize) -> Result<u64> {
        let mut bytes = [0; 8];
        bytes[..width].copy_from_slice(self.read_slice(width)?);
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads an unsigned integer.
    ///
    /// # Errors
    ///
    /// Fails on a byte code that does not start a uint.
    pub fn decode_uint(&mut self) -> Result<u64> {
        let offset = self.pos;
        let code = self.read_byte()?;

        if code < END {
            return Ok(u64::from(code));
        }

        let width = match (code, wire::inline_len(code)) {
            (_, Some(width @ 1..)) => width,
            (N_BYTES, _) => match self.read_byte()? {
                width @ 1..=8 => usize::from(width),
                code => {
                    return Err(Error::BadCode { code, offset: offset + 1 });
                }
            },
            _ => return Err(Error::BadCode { code, offset }),
        };
        self.read_le(width)
    }

    /// Reads a zigzag-mapped signed integer.
    ///
    /// # Errors
    ///
    /// Fails on a byte code that does not start a uint.
    pub fn decode_int(&mut self) -> Result<i64> {
        self.decode_uint().map(wire::zigzag_decode)
    }

    /// Reads a float.
    ///
    /// # Errors
    ///
    /// Fails on a byte code that does not start a uint.
    pub fn decode_float(&mut self) -> Result<f64> {
        self.decode_uint().map(wire::float_from_wire)
    }

    /// Reads a boolean, which must be the byte `0` or `1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadBool`] on any other byte.
    pub fn decode_bool(&mut self) -> Result<bool> {
        let offset = self.pos;
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::BadBool { offset }),
        }
    }

    fn decode_len(&mut self) -> Result<usize> {
        let offset = self.pos;
        let code = self.read_byte()?;

        let len = match code {
            N_BYTES => {
                let len = self.decode_uint()?;
                usize::try_from(len)
                    .map_err(|_| Error::Truncated { offset: self.buf.len() })?
            }
            code => wire::inline_len(code)
                .ok_or(Error::BadCode { code, offset })?,
        };

        if len > self.remaining() {
            return Err(Error::Truncated { offset: self.buf.len() });
        }
        Ok(len)
    }

    /// Reads a byte run, borrowing it from the message buffer.
    ///
    /// # Errors
    ///
    /// Fails on a byte code that does not start a byte run.
    pub fn decode_bytes_ref(&mut self) -> Result<&[u8]> {
        let len = self.decode_len()?;
        self.read_slice(len)
    }

    /// Reads a byte run.
    ///
    /// # Errors
    ///
    /// Fails on a byte code that does not start a byte run.
    pub fn decode_bytes(&mut self) -> Result<Vec<u8>> {
        self.decode_bytes_ref().map(<[u8]>::to_vec)
    }

    /// Reads a string, borrowing it from the message buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] if the bytes are not UTF-8.
    pub fn decode_str(&mut self) -> Result<&str> {
        let len = self.decode_len()?;
        let offset = self.pos;
        std::str::from_utf8(self.read_slice(len)?)
            .map_err(|_| Error::InvalidUtf8 { offset })
    }

    /// Reads a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] if the bytes are not UTF-8.
    pub fn decode_string(&mut self) -> Result<String> {
        self.decode_str().map(str::to_owned)
    }

    /// Opens a list. Returns `None` for the nil list, else the number of
    /// values that follow.
    ///
    /// # Errors
    ///
    /// Fails on a byte code that does not start a list, or a length that
    /// cannot fit in the rest of the message.
    pub fn start_list(&mut self) -> Result<Option<usize>> {
        let offset = self.pos;
        match self.read_byte()? {
            NIL => Ok(None),
            N_VALUES => {
                let len = self.decode_uint()?;
                // every value takes at least one byte
                match usize::try_from(len) {
                    Ok(len) if len <= self.remaining() => Ok(Some(len)),
                    _ => Err(Error::Truncated { offset: self.buf.len() }),
                }
            }
            code => Err(Error::BadCode { code, offset }),
        }
    }

    /// Opens a list that must hold exactly `expected` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadListLength`] on any other length.
    pub fn expect_list(&mut self, expected: usize) -> Result<()> {
        match self.start_list()? {
            Some(len) if len == expected => Ok(()),
            found => Err(Error::BadListLength { expected, found }),
        }
    }

    /// Consumes a `NIL` byte if one is next.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] at the end of the message.
    pub fn decode_nil(&mut self) -> Result<bool> {
        if self.peek_byte()? == NIL {
            self.pos += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes a `PTR` byte, which must be next.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadCode`] on any other byte.
    pub fn expect_ptr(&mut self) -> Result<()> {
        let offset = self.pos;
        match self.read_byte()? {
            PTR => Ok(()),
            code => Err(Error::BadCode { code, offset }),
        }
    }

    // =========================================================================
    // Structs
    // =========================================================================

    /// Opens a struct.
    ///
    /// # Errors
    ///
    /// Fails if the next byte is not `START` or nesting is too deep.
    pub fn start_struct(&mut self) -> Result<()> {
        let offset = self.pos;
        match self.read_byte()? {
            START => self.enter(),
            code => Err(Error::BadCode { code, offset }),
        }
    }

    /// Returns the next field slot, or `None` after consuming the closing
    /// `END`. Slots may come in any order.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    pub fn next_field(&mut self) -> Result<Option<u64>> {
        if self.peek_byte()? == END {
            self.pos += 1;
            self.leave();
            return Ok(None);
        }

        self.decode_uint().map(Some)
    }

    /// Handles a slot the current codec does not know: skips its value, or
    /// fails when [`DecodeOptions::fail_on_unknown_field`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] in strict mode.
    pub fn unknown_field(&mut self, type_name: &str, slot: u64) -> Result<()> {
        if self.options.fail_on_unknown_field {
            return Err(Error::UnknownField {
                type_name: type_name.to_owned(),
                slot,
            });
        }

        tracing::debug!(type_name, slot, "skipping unknown field");
        self.skip()
    }

    /// Skips the value of a slot the codec declares as removed. Removed
    /// slots are known, so this never fails in strict mode.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    pub fn removed_field(&mut self) -> Result<()> { self.skip() }

    /// Enters one level of nesting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DepthLimitExceeded`] past the configured depth.
    pub fn enter(&mut self) -> Result<()> {
        if self.depth >= self.options.max_depth {
            return Err(Error::DepthLimitExceeded {
                max_depth: self.options.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Leaves one level of nesting.
    pub fn leave(&mut self) { self.depth = self.depth.saturating_sub(1); }

    // =========================================================================
    // Skipping
    // =========================================================================

    /// Skips exactly one value of any shape.
    ///
    /// # Errors
    ///
    /// Fails on malformed input or nesting deeper than the configured
    /// depth.
    pub fn skip(&mut self) -> Result<()> {
        let offset = self.pos;
        let code = self.read_byte()?;

        match code {
            code if code < END => Ok(()),
            NIL => Ok(()),
            N_BYTES => {
                let len = self.decode_uint()?;
                let len = usize::try_from(len)
                    .map_err(|_| Error::Truncated { offset: self.buf.len() })?;
                self.read_slice(len).map(|_| ())
            }
            N_VALUES => {
                let len = self.decode_uint()?;
                self.enter()?;
                for _ in 0..len {
                    self.skip()?;
                }
                self.leave();
                Ok(())
            }
            PTR | REF_PTR => {
                self.enter()?;
                self.skip()?;
                self.leave();
                Ok(())
            }
            REF => self.decode_uint().map(|_| ()),
            START => {
                self.enter()?;
                while self.peek_byte()? != END {
                    self.skip()?;
                }
                self.pos += 1;
                self.leave();
                Ok(())
            }
            code => match wire::inline_len(code) {
                Some(len) => self.read_slice(len).map(|_| ()),
                None => Err(Error::BadCode { code, offset }),
            },
        }
    }

    // =========================================================================
    // Pointers
    // =========================================================================

    /// Reads a pointer tag.
    ///
    /// A back reference whose target was skipped earlier (it sat inside an
    /// unknown field) is decoded out of order: the decoder jumps to the
    /// target and [`Decoder::end_ptr`] jumps back.
    ///
    /// # Errors
    ///
    /// Fails on a dangling reference, a reference to a pointer of another
    /// type, or reference codes in a message encoded without tracking.
    pub fn start_ptr<P: Clone + 'static>(&mut self) -> Result<PtrStart<P>> {
        let offset = self.pos;
        match self.read_byte()? {
            NIL => Ok(PtrStart::Nil),
            PTR => Ok(PtrStart::Fresh(FreshPtr { slot: None, resume: None })),
            REF_PTR if self.tracked => Ok(PtrStart::Fresh(FreshPtr {
                slot: Some(offset),
                resume: None,
            })),
            REF if self.tracked => {
                let distance = self.decode_uint()?;
                let target = usize::try_from(distance)
                    .ok()
                    .filter(|distance| *distance > 0)
                    .and_then(|distance| offset.checked_sub(distance))
                    .ok_or(Error::DanglingRef { offset })?;

                match self.refs.get::<P>(target) {
                    Some(Some(ptr)) => Ok(PtrStart::Existing(ptr)),
                    Some(None) => Err(Error::RefTypeMismatch { offset }),
                    None if self.buf[target] == REF_PTR => {
                        tracing::trace!(
                            tag = target,
                            offset,
                            "decoding skipped pointee"
                        );
                        let resume = self.pos;
                        self.pos = target + 1;
                        Ok(PtrStart::Fresh(FreshPtr {
                            slot: Some(target),
                            resume: Some(resume),
                        }))
                    }
                    None => Err(Error::DanglingRef { offset }),
                }
            }
            code => Err(Error::BadCode { code, offset }),
        }
    }

    /// Registers a freshly allocated pointer so later back references
    /// resolve to it. Must be called before decoding the pointee.
    pub fn store_ref<P: Clone + 'static>(&mut self, fresh: &FreshPtr, ptr: &P) {
        if let Some(slot) = fresh.slot {
            self.refs.insert(slot, ptr);
        }
    }

    /// Finishes a pointee started with [`Decoder::start_ptr`].
    pub fn end_ptr(&mut self, fresh: FreshPtr) {
        if let Some(resume) = fresh.resume {
            self.pos = resume;
        }
    }

    // =========================================================================
    // Dynamic values
    // =========================================================================

    /// Reads a value written by [`Encoder::encode_any`](crate::Encoder::encode_any).
    ///
    /// # Errors
    ///
    /// Fails on malformed input or a type number outside the message's
    /// type table.
    pub fn decode_any(&mut self) -> Result<AnyValue> {
        if self.peek_byte()? == 0 {
            self.pos += 1;
            return Ok(AnyValue::nil());
        }

        self.expect_list(2)?;
        let number = self.decode_uint()?;
        let id = usize::try_from(number)
            .ok()
            .and_then(|index| self.type_table.get(index))
            .copied()
            .ok_or(Error::TypeNumberOutOfRange {
                number,
                len: self.type_table.len(),
            })?;

        let registry = self.registry;
        self.enter()?;
        let value = registry.codec(id).decode(self);
        self.leave();
        Ok(AnyValue::from_parts(value?, registry.type_key(id).name()))
    }
}

/// A trait for types that can be deserialized.
///
/// ```ignore
/// impl Decode for Point {
///     fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
///         let mut point = Point::default();
///         point.decode_in_place(decoder)?;
///         Ok(point)
///     }
///
///     fn decode_in_place(&mut self, decoder: &mut Decoder<'_>) -> Result<()> {
///         decoder.start_struct()?;
///         while let Some(slot) = decoder.next_field()? {
///             match slot {
///                 0 => self.x = decoder.decode()?,
///                 1 => self.y = decoder.decode()?,
///                 slot => decoder.unknown_field("Point", slot)?,
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Decode: Sized {
    /// Must agree with [`Encode::NILLABLE`](crate::Encode::NILLABLE).
    const NILLABLE: bool = false;

    /// Decodes one value.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self>;

    /// Decodes into an existing, default-initialized value.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    fn decode_in_place(&mut self, decoder: &mut Decoder<'_>) -> Result<()> {
        *self = Self::decode(decoder)?;
        Ok(())
    }

    /// Decodes the pointee of a fresh `Rc` and registers it with
    /// [`Decoder::store_ref`]. Types with interior mutability register
    /// before decoding so that cycles resolve.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    fn decode_rc(decoder: &mut Decoder<'_>, fresh: &FreshPtr) -> Result<Rc<Self>>
    where
        Self: 'static,
    {
        let ptr = Rc::new(Self::decode(decoder)?);
        decoder.store_ref(fresh, &ptr);
        Ok(ptr)
    }

    /// [`Decode::decode_rc`] for `Arc`.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    fn decode_arc(
        decoder: &mut Decoder<'_>,
        fresh: &FreshPtr,
    ) -> Result<Arc<Self>>
    where
        Self: 'static,
    {
        let ptr = Arc::new(Self::decode(decoder)?);
        decoder.store_ref(fresh, &ptr);
        Ok(ptr)
    }
}

// =============================================================================
// Implementations for primitive types
// =============================================================================

macro_rules! impl_decode_uint {
    ($($ty:ty),*) => {
        $(
            impl Decode for $ty {
                fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
                    let value = decoder.decode_uint()?;
                    <$ty>::try_from(value).map_err(|_| Error::OutOfRange {
                        value: i128::from(value),
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

macro_rules! impl_decode_int {
    ($($ty:ty),*) => {
        $(
            impl Decode for $ty {
                fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
                    let value = decoder.decode_int()?;
                    <$ty>::try_from(value).map_err(|_| Error::OutOfRange {
                        value: i128::from(value),
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

impl_decode_uint!(u8, u16, u32, u64, usize);
impl_decode_int!(i8, i16, i32, i64, isize);

impl Decode for bool {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.decode_bool()
    }
}

impl Decode for char {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let value = decoder.decode_uint()?;
        u32::try_from(value)
            .ok()
            .and_then(char::from_u32)
            .ok_or(Error::InvalidChar { value })
    }
}

impl Decode for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.decode_float().map(|value| value as f32)
    }
}

impl Decode for f64 {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.decode_float()
    }
}

impl Decode for String {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.decode_string()
    }
}

impl Decode for () {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.start_struct()?;
        while let Some(slot) = decoder.next_field()? {
            decoder.unknown_field("unit", slot)?;
        }
        Ok(())
    }
}

// =============================================================================
// Implementations for wrappers
// =============================================================================

impl<T: Decode> Decode for Box<T> {
    const NILLABLE: bool = T::NILLABLE;

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        T::decode(decoder).map(Box::new)
    }
}

impl<T: Decode> Decode for Option<T> {
    const NILLABLE: bool = true;

    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        if decoder.decode_nil()? {
            return Ok(None);
        }
        if T::NILLABLE {
            decoder.expect_ptr()?;
        }
        T::decode(decoder).map(Some)
    }
}

// =============================================================================
// Implementations for sequences
// =============================================================================

fn decode_seq<T: Decode, C: FromIterator<T>>(
    decoder: &mut Decoder<'_>,
) -> Result<C> {
    let len = decoder.start_list()?.unwrap_or(0);
    (0..len).map(|_| T::decode(decoder)).collect()
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_seq(decoder)
    }
}

impl<T: Decode> Decode for VecDeque<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_seq(decoder)
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.expect_list(N)?;
        let items = (0..N)
            .map(|_| T::decode(decoder))
            .collect::<Result<Vec<_>>>()?;

        items.try_into().map_err(|items: Vec<T>| Error::BadListLength {
            expected: N,
            found: Some(items.len()),
        })
    }
}

impl<T: Decode + Eq + Hash, S: BuildHasher + Default> Decode
    for HashSet<T, S>
{
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_seq(decoder)
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_seq(decoder)
    }
}

fn decode_map<K: Decode, V: Decode, C: FromIterator<(K, V)>>(
    decoder: &mut Decoder<'_>,
) -> Result<C> {
    let len = decoder.start_list()?.unwrap_or(0);
    if len % 2 != 0 {
        return Err(Error::BadListLength {
            expected: len + 1,
            found: Some(len),
        });
    }

    (0..len / 2)
        .map(|_| -> Result<(K, V)> {
            Ok((K::decode(decoder)?, V::decode(decoder)?))
        })
        .collect()
}

impl<K, V, S> Decode for HashMap<K, V, S>
where
    K: Decode + Eq + Hash,
    V: Decode,
    S: BuildHasher + Default,
{
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_map(decoder)
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_map(decoder)
    }
}

macro_rules! impl_decode_tuple {
    ($len:expr => $($name:ident),+) => {
        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
                decoder.expect_list($len)?;
                Ok(($($name::decode(decoder)?,)+))
            }
        }
    };
}

impl_decode_tuple!(1 => A);
impl_decode_tuple!(2 => A, B);
impl_decode_tuple!(3 => A, B, C);
impl_decode_tuple!(4 => A, B, C, D);

#[cfg(test)]
mod test;
