//! The type-codec registry.
//!
//! A [`RegistryBuilder`] collects `(type identity, stable name, codec
//! constructor)` entries, then [`RegistryBuilder::build`] constructs every
//! codec (phase 1) and lets each one resolve handles to the codecs it
//! embeds (phase 2, in dependency order). The resulting [`Registry`] is
//! immutable and is passed by reference to encoders and decoders.
//!
//! ```ignore
//! let mut builder = RegistryBuilder::new();
//! builder.register::<Person>().register::<Node>();
//! let registry = builder.build()?;
//! ```

use std::{
    any::{Any, TypeId},
    sync::OnceLock,
};

use fxhash::{FxHashMap, FxHashSet};

use crate::{
    any::AnyValue,
    bytes::ByteBuf,
    codec::{Codec, StaticCodec, TypeCodec, TypeKey},
};

/// Handle to a codec within one [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodecId(u32);

impl CodecId {
    /// Position of the codec in registration order.
    #[must_use]
    pub const fn index(self) -> usize { self.0 as usize }
}

/// Errors raised while building a [`Registry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A codec refers to a type that was never registered.
    #[error("codec {codec:?} depends on unregistered type {dependency}")]
    MissingDependency {
        /// Stable name of the codec being wired.
        codec: String,
        /// Rust name of the missing type.
        dependency: &'static str,
    },
}

/// Read-only view of the registry handed to [`TypeCodec::init`].
#[derive(Debug)]
pub struct Wiring<'a> {
    by_type: &'a FxHashMap<TypeId, CodecId>,
    codec: &'a str,
}

impl Wiring<'_> {
    /// Returns the handle of the codec for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingDependency`] if `key` has no codec.
    pub fn resolve(&self, key: TypeKey) -> Result<CodecId, RegistryError> {
        self.by_type.get(&key.id()).copied().ok_or_else(|| {
            RegistryError::MissingDependency {
                codec: self.codec.to_owned(),
                dependency: key.name(),
            }
        })
    }

    /// Stable name of the codec being wired.
    #[must_use]
    pub const fn codec(&self) -> &str { self.codec }
}

type Constructor = Box<dyn FnOnce() -> Box<dyn TypeCodec>>;

struct Pending {
    key: TypeKey,
    name: String,
    construct: Constructor,
}

/// Collects codec registrations.
pub struct RegistryBuilder {
    pending: Vec<Pending>,
    by_type: FxHashMap<TypeId, usize>,
    by_name: FxHashMap<String, usize>,
}

impl RegistryBuilder {
    /// Creates a builder holding the built-in codecs.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self::empty();
        builder
            .register::<bool>()
            .register::<u8>()
            .register::<u16>()
            .register::<u32>()
            .register::<u64>()
            .register::<usize>()
            .register::<i8>()
            .register::<i16>()
            .register::<i32>()
            .register::<i64>()
            .register::<isize>()
            .register::<f32>()
            .register::<f64>()
            .register::<char>()
            .register::<String>()
            .register::<ByteBuf>()
            .register::<()>()
            .register::<AnyValue>();
        builder
    }

    /// Creates a builder without any codecs.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            pending: Vec::new(),
            by_type: FxHashMap::default(),
            by_name: FxHashMap::default(),
        }
    }

    /// Whether `T` has been registered.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Registers `T` and, recursively, the types it embeds. Registering the
    /// same type again does nothing.
    ///
    /// # Panics
    ///
    /// Panics if another type already uses `T`'s stable name.
    pub fn register<T: Codec>(&mut self) -> &mut Self {
        if self.contains::<T>() {
            return self;
        }

        self.register_with(
            TypeKey::of::<T>(),
            T::stable_name(),
            StaticCodec::<T>::boxed,
        );
        T::register_dependencies(self);
        self
    }

    /// Registers a codec constructor for `key` under `name`. The
    /// constructor runs once, when the registry is built.
    ///
    /// # Panics
    ///
    /// Panics if `name` is taken by another type or `key` is registered
    /// under another name: both indicate a build-time bug.
    pub fn register_with<F>(
        &mut self,
        key: TypeKey,
        name: impl Into<String>,
        construct: F,
    ) -> &mut Self
    where
        F: FnOnce() -> Box<dyn TypeCodec> + 'static,
    {
        let name = name.into();

        if let Some(&index) = self.by_name.get(&name) {
            let existing = &self.pending[index];
            assert!(
                existing.key == key,
                "duplicate stable name {name:?} for types {} and {}",
                existing.key.name(),
                key.name(),
            );
            return self;
        }

        if let Some(&index) = self.by_type.get(&key.id()) {
            panic!(
                "type {} registered as both {:?} and {name:?}",
                key.name(),
                self.pending[index].name,
            );
        }

        let index = self.pending.len();
        self.by_type.insert(key.id(), index);
        self.by_name.insert(name.clone(), index);
        self.pending.push(Pending { key, name, construct: Box::new(construct) });
        self
    }

    /// Constructs every codec, then wires them in dependency order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingDependency`] if a codec refers to a
    /// type that was never registered.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut keys = Vec::with_capacity(self.pending.len());
        let mut names = Vec::with_capacity(self.pending.len());
        let mut codecs = Vec::with_capacity(self.pending.len());

        // phase 1: construct, no cross references
        for pending in self.pending {
            keys.push(pending.key);
            names.push(pending.name);
            codecs.push((pending.construct)());
        }

        let by_type: FxHashMap<TypeId, CodecId> = keys
            .iter()
            .enumerate()
            .map(|(index, key)| (key.id(), CodecId::from_index(index)))
            .collect();

        // phase 2: wire dependencies before their dependents
        let order = wiring_order(&codecs, &by_type);
        tracing::trace!(?order, "wiring codecs");

        for id in order {
            let wiring =
                Wiring { by_type: &by_type, codec: &names[id.index()] };
            codecs[id.index()].init(&wiring)?;
        }

        let by_name = names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), CodecId::from_index(index)))
            .collect();

        let entries = keys
            .into_iter()
            .zip(names)
            .zip(codecs)
            .map(|((key, name), codec)| Entry { key, name, codec })
            .collect::<Vec<_>>();

        tracing::debug!(codecs = entries.len(), "registry built");

        Ok(Registry { entries, by_type, by_name })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.pending.iter().map(|pending| &pending.name))
            .finish()
    }
}

impl CodecId {
    #[allow(clippy::cast_possible_truncation)]
    const fn from_index(index: usize) -> Self { Self(index as u32) }
}

/// Post-order over the dependency graph. Cycles are cut at the first
/// revisit; dependencies without a codec are left for `init` to report.
fn wiring_order(
    codecs: &[Box<dyn TypeCodec>],
    by_type: &FxHashMap<TypeId, CodecId>,
) -> Vec<CodecId> {
    let mut order = Vec::with_capacity(codecs.len());
    let mut visited = FxHashSet::default();

    for root in 0..codecs.len() {
        let root = CodecId::from_index(root);
        if !visited.insert(root) {
            continue;
        }

        // (codec, its dependencies, next dependency to visit)
        let mut stack = vec![(root, codecs[root.index()].dependencies(), 0)];
        while let Some((id, deps, next)) = stack.last_mut() {
            let Some(key) = deps.get(*next).copied() else {
                order.push(*id);
                stack.pop();
                continue;
            };
            *next += 1;

            if let Some(&dep) = by_type.get(&key.id())
                && visited.insert(dep)
            {
                stack.push((dep, codecs[dep.index()].dependencies(), 0));
            }
        }
    }

    order
}

struct Entry {
    key: TypeKey,
    name: String,
    codec: Box<dyn TypeCodec>,
}

/// An immutable table of codecs, looked up by type identity when encoding
/// and by stable name when decoding.
pub struct Registry {
    entries: Vec<Entry>,
    by_type: FxHashMap<TypeId, CodecId>,
    by_name: FxHashMap<String, CodecId>,
}

static_assertions::assert_impl_all!(Registry: Send, Sync);

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// Shorthand for [`RegistryBuilder::new`].
    #[must_use]
    pub fn builder() -> RegistryBuilder { RegistryBuilder::new() }

    /// Installs this registry as the process-wide one. Fails, handing the
    /// registry back, if one is already installed.
    ///
    /// # Errors
    ///
    /// Returns `self` if a global registry exists.
    pub fn install_global(self) -> Result<&'static Self, Self> {
        GLOBAL.set(self)?;
        Ok(GLOBAL.get().unwrap_or_else(|| unreachable!()))
    }

    /// The process-wide registry, if installed.
    #[must_use]
    pub fn global() -> Option<&'static Self> { GLOBAL.get() }

    /// The codec handle for a type identity.
    #[must_use]
    pub fn lookup_type(&self, type_id: TypeId) -> Option<CodecId> {
        self.by_type.get(&type_id).copied()
    }

    /// The codec handle for `T`.
    #[must_use]
    pub fn lookup<T: Any>(&self) -> Option<CodecId> {
        self.lookup_type(TypeId::of::<T>())
    }

    /// The codec handle for a stable name.
    #[must_use]
    pub fn lookup_name(&self, name: &str) -> Option<CodecId> {
        self.by_name.get(name).copied()
    }

    /// The codec behind a handle obtained from this registry.
    ///
    /// # Panics
    ///
    /// Panics if `id` comes from another registry with more codecs.
    #[must_use]
    pub fn codec(&self, id: CodecId) -> &dyn TypeCodec {
        self.entries[id.index()].codec.as_ref()
    }

    /// The stable name behind a handle.
    #[must_use]
    pub fn stable_name(&self, id: CodecId) -> &str {
        &self.entries[id.index()].name
    }

    /// The type identity behind a handle.
    #[must_use]
    pub fn type_key(&self, id: CodecId) -> TypeKey {
        self.entries[id.index()].key
    }

    /// Number of registered codecs.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no codec is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Stable names in registration order.
    pub fn stable_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("codecs", &self.entries.len()).finish()
    }
}
