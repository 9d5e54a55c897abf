//! Type codecs: the per-type unit of encode/decode logic.
//!
//! Statically, a type opts in by implementing [`Codec`] (normally through
//! `#[derive(Codec)]`) on top of [`Encode`] and [`Decode`]. The registry
//! stores codecs type-erased as [`TypeCodec`] trait objects, produced by
//! [`StaticCodec`], so that values whose type is only known at run time can
//! be dispatched by type identity on encode and by stable name on decode.

use std::{
    any::{Any, TypeId},
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

use crate::{
    Decode, Decoder, Encode, Encoder, Error, Result,
    registry::{CodecId, RegistryBuilder, RegistryError, Wiring},
};

/// Run-time identity of a type, with its Rust name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key of `T`.
    #[must_use]
    pub fn of<T: Any + ?Sized>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    /// The type's [`TypeId`].
    #[must_use]
    pub const fn id(&self) -> TypeId { self.id }

    /// The type's Rust name. Not stable across compilations.
    #[must_use]
    pub const fn name(&self) -> &'static str { self.name }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.id.hash(state); }
}

/// How a codec's values are laid out, as far as tooling walking encoded
/// bytes needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A leaf value.
    Scalar,
    /// A struct; field slots index [`TypeCodec::field_names`].
    Struct,
    /// A list; element `i` has the type of dependency `i % n`.
    Sequence,
    /// A pointer tag followed by the single dependency.
    Pointer,
    /// Encoded exactly as its single dependency (or nil).
    Transparent,
    /// An enum: a list of the variant index and a struct-shaped payload.
    Variant,
    /// A dynamic value, typed by the message's type table.
    Dynamic,
}

/// A struct field as declared by its codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// The wire slot. Never reused for another field.
    pub slot: u32,
    /// The field's current name.
    pub name: &'static str,
    /// The field's type.
    pub ty: TypeKey,
}

impl Field {
    /// Describes field `name` of type `T` at `slot`.
    #[must_use]
    pub fn of<T: Any>(slot: u32, name: &'static str) -> Self {
        Self { slot, name, ty: TypeKey::of::<T>() }
    }
}

/// A type that can be registered and dispatched dynamically.
pub trait Codec: Encode + Decode + Any {
    /// Layout of the encoded value.
    const SHAPE: Shape = Shape::Scalar;

    /// The process-independent name identifying this type in message
    /// metadata. Composite names are built from their element names.
    fn stable_name() -> String;

    /// Struct fields, for [`Shape::Struct`] codecs.
    fn fields() -> Vec<Field> { Vec::new() }

    /// Types this codec's values embed.
    fn dependencies() -> Vec<TypeKey> {
        Self::fields().into_iter().map(|field| field.ty).collect()
    }

    /// Registers the codecs of [`Codec::dependencies`].
    fn register_dependencies(registry: &mut RegistryBuilder) {
        let _ = registry;
    }
}

/// A type-erased codec as stored in the registry.
pub trait TypeCodec: Send + Sync + 'static {
    /// Layout of the encoded value.
    fn shape(&self) -> Shape { Shape::Scalar }

    /// Field names indexed by slot; removed slots are empty strings.
    /// Empty for codecs that are not structs.
    fn field_names(&self) -> &[&'static str] { &[] }

    /// Types this codec refers to, used to order phase-2 wiring.
    fn dependencies(&self) -> Vec<TypeKey> { Vec::new() }

    /// Phase-2 wiring: resolves handles to the codecs of embedded types
    /// once every codec has been constructed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingDependency`] if a dependency has no
    /// codec.
    fn init(&mut self, wiring: &Wiring<'_>) -> Result<(), RegistryError> {
        let _ = wiring;
        Ok(())
    }

    /// Handles resolved by [`TypeCodec::init`]: indexed by slot for
    /// structs, by dependency position otherwise.
    fn linked(&self) -> &[Option<CodecId>] { &[] }

    /// Encodes `value`, which must be of this codec's type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] for a value of another type.
    fn encode(&self, encoder: &mut Encoder<'_>, value: &dyn Any) -> Result<()>;

    /// Decodes one value of this codec's type.
    ///
    /// # Errors
    ///
    /// Fails on malformed input.
    fn decode(&self, decoder: &mut Decoder<'_>) -> Result<Box<dyn Any>>;
}

/// Adapts a statically typed [`Codec`] to [`TypeCodec`].
pub struct StaticCodec<T> {
    field_names: Vec<&'static str>,
    linked: Vec<Option<CodecId>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Codec> StaticCodec<T> {
    /// Phase-1 construction.
    #[must_use]
    pub fn new() -> Self {
        let fields = T::fields();
        let width = fields
            .iter()
            .map(|field| field.slot as usize + 1)
            .max()
            .unwrap_or(0);

        let mut field_names = vec![""; width];
        for field in &fields {
            field_names[field.slot as usize] = field.name;
        }

        Self { field_names, linked: Vec::new(), _marker: PhantomData }
    }

    /// Constructs the codec behind a trait object, as registration expects.
    #[must_use]
    pub fn boxed() -> Box<dyn TypeCodec> { Box::new(Self::new()) }
}

impl<T: Codec> Default for StaticCodec<T> {
    fn default() -> Self { Self::new() }
}

impl<T> std::fmt::Debug for StaticCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCodec")
            .field("type", &std::any::type_name::<T>())
            .field("linked", &self.linked)
            .finish()
    }
}

impl<T: Codec> TypeCodec for StaticCodec<T> {
    fn shape(&self) -> Shape { T::SHAPE }

    fn field_names(&self) -> &[&'static str] { &self.field_names }

    fn dependencies(&self) -> Vec<TypeKey> { T::dependencies() }

    fn init(&mut self, wiring: &Wiring<'_>) -> Result<(), RegistryError> {
        if T::SHAPE == Shape::Struct {
            let mut linked = vec![None; self.field_names.len()];
            for field in T::fields() {
                linked[field.slot as usize] = Some(wiring.resolve(field.ty)?);
            }
            self.linked = linked;
        } else {
            self.linked = T::dependencies()
                .into_iter()
                .map(|key| wiring.resolve(key).map(Some))
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    fn linked(&self) -> &[Option<CodecId>] { &self.linked }

    fn encode(&self, encoder: &mut Encoder<'_>, value: &dyn Any) -> Result<()> {
        value
            .downcast_ref::<T>()
            .ok_or(Error::TypeMismatch { expected: std::any::type_name::<T>() })?
            .encode(encoder)
    }

    fn decode(&self, decoder: &mut Decoder<'_>) -> Result<Box<dyn Any>> {
        Ok(Box::new(T::decode(decoder)?))
    }
}

// =============================================================================
// Built-in stable names
// =============================================================================

macro_rules! impl_codec_scalar {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Codec for $ty {
                fn stable_name() -> String { $name.to_owned() }
            }
        )*
    };
}

impl_codec_scalar! {
    bool => "bool",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    usize => "usize",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    isize => "isize",
    f32 => "f32",
    f64 => "f64",
    char => "char",
    String => "string",
}

impl Codec for () {
    const SHAPE: Shape = Shape::Struct;

    fn stable_name() -> String { "unit".to_owned() }
}

macro_rules! impl_codec_wrapper {
    ($shape:ident, $format:literal, $($ty:tt)+) => {
        impl<T: Codec> Codec for $($ty)+ {
            const SHAPE: Shape = Shape::$shape;

            fn stable_name() -> String { format!($format, T::stable_name()) }

            fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

            fn register_dependencies(registry: &mut RegistryBuilder) {
                registry.register::<T>();
            }
        }
    };
}

impl_codec_wrapper!(Transparent, "boxed {}", Box<T>);
impl_codec_wrapper!(Transparent, "option of {}", Option<T>);
impl_codec_wrapper!(Sequence, "slice of {}", Vec<T>);
impl_codec_wrapper!(Sequence, "deque of {}", VecDeque<T>);

impl<T: Codec + Ord> Codec for BTreeSet<T> {
    const SHAPE: Shape = Shape::Sequence;

    fn stable_name() -> String { format!("set of {}", T::stable_name()) }

    fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<T>();
    }
}

impl<T, S> Codec for HashSet<T, S>
where
    T: Codec + Eq + Hash,
    S: BuildHasher + Default + 'static,
{
    const SHAPE: Shape = Shape::Sequence;

    fn stable_name() -> String {
        format!("hash set of {}", T::stable_name())
    }

    fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<T>();
    }
}

impl<T: Codec, const N: usize> Codec for [T; N] {
    const SHAPE: Shape = Shape::Sequence;

    fn stable_name() -> String {
        format!("array {N} of {}", T::stable_name())
    }

    fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<T>();
    }
}

impl<K: Codec + Ord, V: Codec> Codec for BTreeMap<K, V> {
    const SHAPE: Shape = Shape::Sequence;

    fn stable_name() -> String {
        format!("map of {} to {}", K::stable_name(), V::stable_name())
    }

    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<K>(), TypeKey::of::<V>()]
    }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<K>().register::<V>();
    }
}

impl<K, V, S> Codec for HashMap<K, V, S>
where
    K: Codec + Eq + Hash,
    V: Codec,
    S: BuildHasher + Default + 'static,
{
    const SHAPE: Shape = Shape::Sequence;

    fn stable_name() -> String {
        format!("hash map of {} to {}", K::stable_name(), V::stable_name())
    }

    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<K>(), TypeKey::of::<V>()]
    }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<K>().register::<V>();
    }
}

macro_rules! impl_codec_tuple {
    ($($name:ident),+) => {
        impl<$($name: Codec),+> Codec for ($($name,)+) {
            const SHAPE: Shape = Shape::Sequence;

            fn stable_name() -> String {
                let names: Vec<String> = vec![$($name::stable_name()),+];
                format!("tuple of ({})", names.join(", "))
            }

            fn dependencies() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$name>()),+]
            }

            fn register_dependencies(registry: &mut RegistryBuilder) {
                $(registry.register::<$name>();)+
            }
        }
    };
}

impl_codec_tuple!(A);
impl_codec_tuple!(A, B);
impl_codec_tuple!(A, B, C);
impl_codec_tuple!(A, B, C, D);

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, sync::Arc};

    use super::*;
    use crate::ByteBuf;

    #[test]
    fn composite_stable_names() {
        assert_eq!(<Vec<u8>>::stable_name(), "slice of u8");
        assert_eq!(<Option<String>>::stable_name(), "option of string");
        assert_eq!(
            <BTreeMap<String, Vec<i64>>>::stable_name(),
            "map of string to slice of i64"
        );
        assert_eq!(<[f32; 3]>::stable_name(), "array 3 of f32");
        assert_eq!(<(u8, bool)>::stable_name(), "tuple of (u8, bool)");
        assert_eq!(<Rc<u32>>::stable_name(), "shared u32");
        assert_eq!(
            <Rc<RefCell<u32>>>::stable_name(),
            "shared mutable u32"
        );
        assert_eq!(
            <Arc<parking_lot::RwLock<ByteBuf>>>::stable_name(),
            "atomic shared locked bytes"
        );
        assert_eq!(
            <HashMap<String, u8>>::stable_name(),
            "hash map of string to u8"
        );
        assert_eq!(<HashSet<char>>::stable_name(), "hash set of char");
        assert_eq!(<BTreeSet<char>>::stable_name(), "set of char");
        assert_eq!(<Box<i8>>::stable_name(), "boxed i8");
    }

    #[test]
    fn static_codec_rejects_foreign_values() {
        let registry = crate::RegistryBuilder::new().build().unwrap();
        let mut encoder =
            Encoder::new(&registry, crate::EncodeOptions::default());

        let codec = StaticCodec::<u32>::new();
        let result = codec.encode(&mut encoder, &"not a u32");
        assert!(matches!(result, Err(Error::TypeMismatch { expected: "u32" })));
    }

    #[test]
    fn key_equality_ignores_name() {
        assert_eq!(TypeKey::of::<u8>(), TypeKey::of::<u8>());
        assert_ne!(TypeKey::of::<u8>(), TypeKey::of::<i8>());
        assert_eq!(TypeKey::of::<String>().name(), "alloc::string::String");
    }
}
