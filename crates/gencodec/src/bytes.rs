//! Values encoded as a single byte run: raw byte strings, and types that
//! bring their own binary form.

use std::{
    fmt::Display,
    ops::{Deref, DerefMut},
};

use crate::{Codec, Decode, Decoder, Encode, Encoder, Error, Result};

/// Bytes encoded as one length-prefixed run, unlike `Vec<u8>`, which is a
/// list of small integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteBuf(pub Vec<u8>);

impl ByteBuf {
    /// Creates an empty byte string.
    #[must_use]
    pub const fn new() -> Self { Self(Vec::new()) }

    /// Returns the inner vector.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> { self.0 }
}

impl Deref for ByteBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl DerefMut for ByteBuf {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.0 }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(bytes: Vec<u8>) -> Self { Self(bytes) }
}

impl From<&[u8]> for ByteBuf {
    fn from(bytes: &[u8]) -> Self { Self(bytes.to_vec()) }
}

impl Encode for ByteBuf {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_bytes(&self.0);
        Ok(())
    }

    fn is_zero(&self) -> bool { self.0.is_empty() }
}

impl Decode for ByteBuf {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        decoder.decode_bytes().map(Self)
    }
}

impl Codec for ByteBuf {
    fn stable_name() -> String { "bytes".to_owned() }
}

/// A type with its own binary representation, stored on the wire as one
/// byte run through [`AsBytes`].
///
/// ```ignore
/// impl ByteForm for Version {
///     type Error = ParseVersionError;
///
///     fn stable_name() -> String { "app::Version".to_owned() }
///
///     fn to_bytes(&self) -> Vec<u8> { self.to_string().into_bytes() }
///
///     fn from_bytes(bytes: &[u8]) -> Result<Self, Self::Error> {
///         std::str::from_utf8(bytes)?.parse()
///     }
/// }
/// ```
pub trait ByteForm: Sized + 'static {
    /// Error returned when a byte run does not parse.
    type Error: Display;

    /// The stable name of the adapted type.
    fn stable_name() -> String;

    /// Renders the value as bytes.
    fn to_bytes(&self) -> Vec<u8>;

    /// Parses bytes produced by [`ByteForm::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns the type's own error for bytes it does not accept.
    fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, Self::Error>;
}

/// Encodes a [`ByteForm`] value as one byte run.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AsBytes<T>(pub T);

impl<T> AsBytes<T> {
    /// Returns the wrapped value.
    #[must_use]
    pub fn into_inner(self) -> T { self.0 }
}

impl<T> Deref for AsBytes<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl<T> DerefMut for AsBytes<T> {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.0 }
}

impl<T: ByteForm> Encode for AsBytes<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<()> {
        encoder.encode_bytes(&self.0.to_bytes());
        Ok(())
    }
}

impl<T: ByteForm> Decode for AsBytes<T> {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self> {
        let offset = decoder.offset();
        let bytes = decoder.decode_bytes_ref()?;
        T::from_bytes(bytes).map(Self).map_err(|err| Error::InvalidByteForm {
            target: std::any::type_name::<T>(),
            offset,
            reason: err.to_string(),
        })
    }
}

impl<T: ByteForm> Codec for AsBytes<T> {
    fn stable_name() -> String { T::stable_name() }
}

#[cfg(test)]
mod tests {
    use std::{num::ParseIntError, str::FromStr};

    use super::*;
    use crate::{DecodeOptions, EncodeOptions, Registry, wire::BYTES3};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Version {
        major: u8,
        minor: u8,
    }

    impl FromStr for Version {
        type Err = ParseIntError;

        fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
            let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
            Ok(Self { major: major.parse()?, minor: minor.parse()? })
        }
    }

    impl ByteForm for Version {
        type Error = String;

        fn stable_name() -> String { "bytes::Version".to_owned() }

        fn to_bytes(&self) -> Vec<u8> {
            format!("{}.{}", self.major, self.minor).into_bytes()
        }

        fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, String> {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            text.parse().map_err(|e: ParseIntError| e.to_string())
        }
    }

    fn registry() -> Registry { Registry::builder().build().unwrap() }

    #[test]
    fn byte_form_is_one_run() {
        let registry = registry();
        let mut encoder = Encoder::new(&registry, EncodeOptions::default());
        AsBytes(Version { major: 1, minor: 2 }).encode(&mut encoder).unwrap();
        assert_eq!(encoder.payload(), [BYTES3, b'1', b'.', b'2']);

        let mut decoder = Decoder::new(&registry, DecodeOptions::default());
        decoder.load_payload(encoder.payload());
        let decoded = AsBytes::<Version>::decode(&mut decoder).unwrap();
        assert_eq!(*decoded, Version { major: 1, minor: 2 });
        assert_eq!(<AsBytes<Version>>::stable_name(), "bytes::Version");
    }

    #[test]
    fn rejected_byte_forms_fail_the_call() {
        let registry = registry();
        let mut decoder = Decoder::new(&registry, DecodeOptions::default());
        decoder.load_payload(&[BYTES3, b'1', b'.', b'x']);
        assert!(matches!(
            AsBytes::<Version>::decode(&mut decoder),
            Err(Error::InvalidByteForm { offset: 0, .. })
        ));
    }
}
