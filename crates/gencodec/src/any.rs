//! Owned values whose type is only known at run time.

use std::any::Any;

use crate::{
    Codec, Decode, Decoder, Encode, Encoder, Error, Result, codec::Shape,
};

/// A possibly-nil value of any registered type.
///
/// This is what a [`DecodeSession`](crate::DecodeSession) produces, and it
/// can be used as a struct field to hold values of varying types. It
/// encodes as nil (`0`) or as `[type number, value]`, resolved through the
/// message's type table.
///
/// ```ignore
/// let value = AnyValue::new(Point { x: 1, y: 2 });
/// assert_eq!(value.downcast_ref::<Point>().map(|p| p.x), Some(1));
/// ```
#[derive(Default)]
pub struct AnyValue {
    value: Option<Box<dyn Any>>,
    type_name: &'static str,
}

impl AnyValue {
    /// The nil value.
    #[must_use]
    pub const fn nil() -> Self { Self { value: None, type_name: "" } }

    /// Wraps `value`.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub(crate) fn from_parts(
        value: Box<dyn Any>,
        type_name: &'static str,
    ) -> Self {
        Self { value: Some(value), type_name }
    }

    /// Whether this is nil.
    #[must_use]
    pub const fn is_nil(&self) -> bool { self.value.is_none() }

    /// The Rust name of the held type, `None` for nil.
    #[must_use]
    pub fn type_name(&self) -> Option<&'static str> {
        self.value.as_ref().map(|_| self.type_name)
    }

    /// The held value, `None` for nil.
    #[must_use]
    pub fn as_any(&self) -> Option<&dyn Any> { self.value.as_deref() }

    /// Whether the held value is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.as_ref().is_some_and(|value| value.is::<T>())
    }

    /// Borrows the held value as a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref()
    }

    /// Mutably borrows the held value as a `T`.
    #[must_use]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.as_mut()?.downcast_mut()
    }

    /// Unwraps the held value as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is nil or of another
    /// type.
    pub fn downcast<T: Any>(self) -> Result<T> {
        let mismatch =
            Error::TypeMismatch { expected: std::any::type_name::<T>() };
        match self.value {
            Some(value) => {
                value.downcast::<T>().map(|value| *value).map_err(|_| mismatch)
            }
            None => Err(mismatch),
        }
    }
}

impl std::fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.type_name() {
            Some(name) => write!(f, "AnyValue({name})"),
            None => f.write_str("AnyValue(nil)"),
        }
    }
}

impl Encode for AnyValue {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_any(Some(self))
    }

    fn is_zero(&self) -> bool { self.is_nil() }
}

impl Decode for AnyValue {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> { decoder.decode_any() }
}

impl Codec for AnyValue {
    const SHAPE: Shape = Shape::Dynamic;

    fn stable_name() -> String { "any".to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcasting() {
        let mut value = AnyValue::new(7_u16);
        assert!(value.is::<u16>());
        assert!(!value.is::<u32>());
        assert_eq!(value.type_name(), Some("u16"));

        if let Some(inner) = value.downcast_mut::<u16>() {
            *inner += 1;
        }
        assert_eq!(value.downcast_ref::<u16>(), Some(&8));
        assert!(matches!(
            AnyValue::new("text").downcast::<u16>(),
            Err(Error::TypeMismatch { expected: "u16" })
        ));
        assert_eq!(value.downcast::<u16>().ok(), Some(8));
    }

    #[test]
    fn nil() {
        let nil = AnyValue::default();
        assert!(nil.is_nil());
        assert!(nil.as_any().is_none());
        assert_eq!(nil.type_name(), None);
        assert_eq!(format!("{nil:?}"), "AnyValue(nil)");
        assert!(nil.downcast::<u8>().is_err());
    }
}
