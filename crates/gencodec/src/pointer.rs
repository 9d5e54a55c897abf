//! Shared-pointer and cycle tracking.
//!
//! On encode, [`IdentityMap`] remembers where each pointer's `PTR` tag was
//! written so a second sighting can backpatch it to `REF_PTR`. On decode,
//! [`RefTable`] maps the offset of every `REF_PTR` value to the pointer
//! allocated for it.
//!
//! Cycles need the pointee to be registered before its own fields are
//! decoded. `Rc<RefCell<T>>` and `Arc<parking_lot::RwLock<T>>` do that by
//! allocating `T::default()`, registering it, then filling it in place.
//! `Rc<T>` and `Arc<T>` preserve sharing but cannot close a cycle.

use std::{
    any::Any,
    cell::RefCell,
    rc::Rc,
    sync::Arc,
};

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::{
    Codec, Decode, Decoder, Encode, Encoder, Error, RegistryBuilder, Result,
    TypeKey,
    codec::Shape,
    decode::{FreshPtr, PtrStart},
    wire::NIL,
};

/// Encode-side map from pointer identity to the offset of its tag.
#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    tags: FxHashMap<usize, usize>,
}

impl IdentityMap {
    /// Records `identity` at `offset` unless already seen; returns the
    /// offset of the earlier tag otherwise.
    pub(crate) fn first_sighting(
        &mut self,
        identity: usize,
        offset: usize,
    ) -> Option<usize> {
        match self.tags.entry(identity) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                Some(*entry.get())
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(offset);
                None
            }
        }
    }

    pub(crate) fn clear(&mut self) { self.tags.clear(); }
}

/// Decode-side map from the offset of a `REF_PTR` tag to its pointer.
#[derive(Default)]
pub(crate) struct RefTable {
    values: FxHashMap<usize, Box<dyn Any>>,
}

impl RefTable {
    pub(crate) fn insert<P: Clone + 'static>(&mut self, offset: usize, ptr: &P) {
        self.values.insert(offset, Box::new(ptr.clone()));
    }

    /// Looks up the pointer at `offset`; `Some(None)` means a pointer of
    /// another type lives there.
    pub(crate) fn get<P: Clone + 'static>(
        &self,
        offset: usize,
    ) -> Option<Option<P>> {
        self.values.get(&offset).map(|value| value.downcast_ref::<P>().cloned())
    }

    pub(crate) fn clear(&mut self) { self.values.clear(); }
}

impl std::fmt::Debug for RefTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefTable").field("len", &self.values.len()).finish()
    }
}

/// Runs the decode side of the pointer protocol: resolves nil and back
/// references, otherwise lets `fill` allocate, register and decode a fresh
/// pointee.
fn decode_pointer<'r, P, F>(decoder: &mut Decoder<'r>, fill: F) -> Result<P>
where
    P: Clone + 'static,
    F: FnOnce(&mut Decoder<'r>, &FreshPtr) -> Result<P>,
{
    let offset = decoder.offset();
    match decoder.start_ptr::<P>()? {
        PtrStart::Nil => Err(Error::BadCode { code: NIL, offset }),
        PtrStart::Existing(ptr) => Ok(ptr),
        PtrStart::Fresh(fresh) => {
            decoder.enter()?;
            let ptr = fill(decoder, &fresh)?;
            decoder.leave();
            decoder.end_ptr(fresh);
            Ok(ptr)
        }
    }
}

// =============================================================================
// Rc and Arc
// =============================================================================

impl<T: Encode> Encode for Rc<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        if !encoder.start_ptr(Rc::as_ptr(self).addr()) {
            return Ok(());
        }

        encoder.enter()?;
        (**self).encode(encoder)?;
        encoder.leave();
        Ok(())
    }
}

impl<T: Decode + 'static> Decode for Rc<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_pointer(decoder, T::decode_rc)
    }
}

impl<T: Codec> Codec for Rc<T> {
    const SHAPE: Shape = Shape::Pointer;

    fn stable_name() -> String { format!("shared {}", T::stable_name()) }

    fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<T>();
    }
}

impl<T: Encode> Encode for Arc<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        if !encoder.start_ptr(Arc::as_ptr(self).addr()) {
            return Ok(());
        }

        encoder.enter()?;
        (**self).encode(encoder)?;
        encoder.leave();
        Ok(())
    }
}

impl<T: Decode + 'static> Decode for Arc<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decode_pointer(decoder, T::decode_arc)
    }
}

impl<T: Codec> Codec for Arc<T> {
    const SHAPE: Shape = Shape::Pointer;

    fn stable_name() -> String {
        format!("atomic shared {}", T::stable_name())
    }

    fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<T>();
    }
}

// =============================================================================
// Interior mutability: the cycle-safe pointees
// =============================================================================

impl<T: Encode> Encode for RefCell<T> {
    /// # Panics
    ///
    /// Panics if the value is mutably borrowed while being encoded.
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        self.borrow().encode(encoder)
    }

    fn is_zero(&self) -> bool { self.borrow().is_zero() }
}

impl<T: Decode + Default + 'static> Decode for RefCell<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        T::decode(decoder).map(RefCell::new)
    }

    fn decode_rc(
        decoder: &mut Decoder<'_>,
        fresh: &FreshPtr,
    ) -> Result<Rc<Self>> {
        let ptr = Rc::new(RefCell::new(T::default()));
        decoder.store_ref(fresh, &ptr);
        ptr.borrow_mut().decode_in_place(decoder)?;
        Ok(ptr)
    }
}

impl<T: Codec + Default> Codec for RefCell<T> {
    const SHAPE: Shape = Shape::Transparent;

    fn stable_name() -> String { format!("mutable {}", T::stable_name()) }

    fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<T>();
    }
}

impl<T: Encode> Encode for RwLock<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        // a cycle re-enters the lock when tracking is off
        self.read_recursive().encode(encoder)
    }

    fn is_zero(&self) -> bool { self.read_recursive().is_zero() }
}

impl<T: Decode + Default + 'static> Decode for RwLock<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        T::decode(decoder).map(RwLock::new)
    }

    fn decode_arc(
        decoder: &mut Decoder<'_>,
        fresh: &FreshPtr,
    ) -> Result<Arc<Self>> {
        let ptr = Arc::new(RwLock::new(T::default()));
        decoder.store_ref(fresh, &ptr);
        ptr.write().decode_in_place(decoder)?;
        Ok(ptr)
    }
}

impl<T: Codec + Default> Codec for RwLock<T> {
    const SHAPE: Shape = Shape::Transparent;

    fn stable_name() -> String { format!("locked {}", T::stable_name()) }

    fn dependencies() -> Vec<TypeKey> { vec![TypeKey::of::<T>()] }

    fn register_dependencies(registry: &mut RegistryBuilder) {
        registry.register::<T>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_map_reports_first_offset() {
        let mut map = IdentityMap::default();
        assert_eq!(map.first_sighting(0x1000, 3), None);
        assert_eq!(map.first_sighting(0x2000, 9), None);
        assert_eq!(map.first_sighting(0x1000, 20), Some(3));
        assert_eq!(map.first_sighting(0x1000, 40), Some(3));

        map.clear();
        assert_eq!(map.first_sighting(0x1000, 1), None);
    }

    #[test]
    fn ref_table_checks_pointer_type() {
        let mut table = RefTable::default();
        let shared = Rc::new(RefCell::new(5_u32));
        table.insert(7, &shared);

        let same = table.get::<Rc<RefCell<u32>>>(7).flatten();
        assert!(same.is_some_and(|ptr| Rc::ptr_eq(&ptr, &shared)));
        assert!(matches!(table.get::<Rc<u32>>(7), Some(None)));
        assert!(table.get::<Rc<RefCell<u32>>>(8).is_none());
    }
}
