//! Message framing over byte sinks and sources.
//!
//! A stream is the 4-byte [`MAGIC`] followed by any number of messages:
//!
//! ```text
//! size: u64 little-endian | metadata | payload
//! ```
//!
//! The metadata lists the stable names of the types used by the payload,
//! in the order of their in-payload type numbers, followed by a flag
//! telling whether pointer tracking was on. The header is written together
//! with the first message, so a stream whose first encode fails stays
//! empty.

use std::{
    any::Any,
    io::{self, Read, Write},
};

use crate::{
    any::AnyValue,
    config::{DecodeOptions, EncodeOptions},
    decode::Decoder,
    encode::Encoder,
    error::{Error, Result},
    registry::Registry,
    wire::MAGIC,
};

/// Writes framed messages to a byte sink.
///
/// ```ignore
/// let mut session = EncodeSession::new(Vec::new(), &registry);
/// session.encode(&person)?;
/// let bytes = session.into_inner();
/// ```
#[derive(Debug)]
pub struct EncodeSession<'r, W> {
    sink: W,
    encoder: Encoder<'r>,
    header_written: bool,
}

impl<'r, W: Write> EncodeSession<'r, W> {
    /// Creates a session with default options.
    pub fn new(sink: W, registry: &'r Registry) -> Self {
        Self::with_options(sink, registry, EncodeOptions::default())
    }

    /// Creates a session with the given options.
    pub fn with_options(
        sink: W,
        registry: &'r Registry,
        options: EncodeOptions,
    ) -> Self {
        Self {
            sink,
            encoder: Encoder::new(registry, options),
            header_written: false,
        }
    }

    /// Encodes `value` as one message. On failure nothing is written.
    ///
    /// # Errors
    ///
    /// Fails if a type is unregistered, nesting is too deep, or the sink
    /// fails.
    pub fn encode<T: Any>(&mut self, value: &T) -> Result<()> {
        let value: &dyn Any = value;
        self.write_message(Some((value, std::any::type_name::<T>())))
    }

    /// Encodes a dynamic value as one message.
    ///
    /// # Errors
    ///
    /// See [`EncodeSession::encode`].
    pub fn encode_any(&mut self, value: &AnyValue) -> Result<()> {
        match (value.as_any(), value.type_name()) {
            (Some(any), Some(type_name)) => {
                self.write_message(Some((any, type_name)))
            }
            _ => self.write_message(None),
        }
    }

    /// Encodes a nil message.
    ///
    /// # Errors
    ///
    /// Fails if the sink fails.
    pub fn encode_nil(&mut self) -> Result<()> { self.write_message(None) }

    #[tracing::instrument(level = "trace", skip_all)]
    fn write_message(
        &mut self,
        value: Option<(&dyn Any, &'static str)>,
    ) -> Result<()> {
        let (metadata, payload) = self.encoder.encode_message(value)?;
        let size = (metadata.len() + payload.len()) as u64;

        if !self.header_written {
            self.sink.write_all(&MAGIC)?;
            self.header_written = true;
        }
        self.sink.write_all(&size.to_le_bytes())?;
        self.sink.write_all(metadata)?;
        self.sink.write_all(payload)?;

        tracing::debug!(
            size,
            types = self.encoder.type_count(),
            track_pointers = self.encoder.track_pointers(),
            "encoded message"
        );
        Ok(())
    }

    /// Flushes the sink.
    ///
    /// # Errors
    ///
    /// Fails if the sink fails.
    pub fn flush(&mut self) -> Result<()> { Ok(self.sink.flush()?) }

    /// Borrows the sink.
    pub const fn get_ref(&self) -> &W { &self.sink }

    /// Returns the sink.
    pub fn into_inner(self) -> W { self.sink }
}

/// Reads framed messages from a byte source.
///
/// After any failure the session is poisoned: the source may be positioned
/// inside a message, so every later call returns [`Error::Poisoned`].
#[derive(Debug)]
pub struct DecodeSession<'r, R> {
    source: R,
    decoder: Decoder<'r>,
    header_read: bool,
    poisoned: bool,
}

impl<'r, R: Read> DecodeSession<'r, R> {
    /// Creates a session with default options.
    pub fn new(source: R, registry: &'r Registry) -> Self {
        Self::with_options(source, registry, DecodeOptions::default())
    }

    /// Creates a session with the given options.
    pub fn with_options(
        source: R,
        registry: &'r Registry,
        options: DecodeOptions,
    ) -> Self {
        Self {
            source,
            decoder: Decoder::new(registry, options),
            header_read: false,
            poisoned: false,
        }
    }

    /// Decodes the next message. Returns `Ok(None)` when the source ends
    /// cleanly between messages.
    ///
    /// # Errors
    ///
    /// Fails on malformed or truncated input, unregistered stable names,
    /// strict-mode unknown fields, or source failures.
    pub fn decode(&mut self) -> Result<Option<AnyValue>> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }

        let result = self.read_message();
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Decodes the next message as a `T`.
    ///
    /// # Errors
    ///
    /// As [`DecodeSession::decode`], plus [`Error::TypeMismatch`] if the
    /// message holds another type or nil.
    pub fn decode_as<T: Any>(&mut self) -> Result<Option<T>> {
        self.decode()?.map(AnyValue::downcast).transpose()
    }

    /// Whether an earlier call failed.
    pub const fn is_poisoned(&self) -> bool { self.poisoned }

    /// Returns the source.
    pub fn into_inner(self) -> R { self.source }

    #[tracing::instrument(level = "trace", skip_all)]
    fn read_message(&mut self) -> Result<Option<AnyValue>> {
        if !self.header_read {
            let mut magic = [0; 4];
            if !read_frame_part(&mut self.source, &mut magic)? {
                return Ok(None);
            }
            if magic != MAGIC {
                return Err(Error::BadHeader { found: magic });
            }
            self.header_read = true;
        }

        let mut size = [0; 8];
        if !read_frame_part(&mut self.source, &mut size)? {
            return Ok(None);
        }

        let size = u64::from_le_bytes(size);
        let limit = self.decoder.options().max_message_size;
        let len = usize::try_from(size)
            .ok()
            .filter(|_| size <= limit)
            .ok_or(Error::MessageTooLarge { size, limit })?;

        self.source.read_exact(self.decoder.prepare(len)).map_err(|error| {
            if error.kind() == io::ErrorKind::UnexpectedEof {
                Error::TruncatedStream
            } else {
                Error::Io(error)
            }
        })?;

        let value = self.decoder.decode_message()?;
        tracing::debug!(size, value = ?value, "decoded message");
        Ok(Some(value))
    }
}

/// Fills `buf` from `source`. Returns `false` if the source ended before
/// the first byte, and fails if it ended after it.
fn read_frame_part(source: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(Error::TruncatedStream),
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(true)
}
