//! Errors raised while encoding or decoding a message.

use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A failure of a single encode or decode call.
///
/// Malformed input, unregistered types and strict-mode unknown fields all
/// end the current call; none of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying byte sink or source failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The stream does not start with the expected magic bytes.
    #[error("bad stream header {found:02x?}")]
    BadHeader {
        /// The bytes found in place of the header.
        found: [u8; 4],
    },

    /// A byte code that is not valid at this position.
    #[error("unexpected byte code {code} at offset {offset}")]
    BadCode {
        /// The offending byte.
        code: u8,
        /// Offset of the byte within the message.
        offset: usize,
    },

    /// The message ended in the middle of a value.
    #[error("message truncated at offset {offset}")]
    Truncated {
        /// Offset at which more bytes were expected.
        offset: usize,
    },

    /// The stream ended in the middle of a message frame.
    #[error("stream ended inside a message frame")]
    TruncatedStream,

    /// A list has a different length than its type requires.
    #[error("expected a list of {expected} values, found {}", list_len(.found))]
    BadListLength {
        /// Length required by the type.
        expected: usize,
        /// Length found on the wire, `None` for the nil list.
        found: Option<usize>,
    },

    /// A dynamic value names a type number missing from the message's type
    /// table.
    #[error("type number {number} out of range for a table of {len} types")]
    TypeNumberOutOfRange {
        /// The type number read from the payload.
        number: u64,
        /// Number of types in the message metadata.
        len: usize,
    },

    /// A value's type has no codec in the registry.
    #[error("unregistered type {name}")]
    UnregisteredType {
        /// Rust type name on encode, stable name on decode.
        name: String,
    },

    /// A struct field slot unknown to the decoding codec, in strict mode.
    #[error("unknown field {slot} of type {type_name}")]
    UnknownField {
        /// Stable name of the struct being decoded.
        type_name: String,
        /// The unknown slot number.
        slot: u64,
    },

    /// A boolean byte other than 0 or 1.
    #[error("invalid boolean byte at offset {offset}")]
    BadBool {
        /// Offset of the byte within the message.
        offset: usize,
    },

    /// A string field does not hold UTF-8.
    #[error("invalid utf-8 in string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string's bytes within the message.
        offset: usize,
    },

    /// A type's own byte form was rejected by its parser.
    #[error("invalid byte form for {target} at offset {offset}: {reason}")]
    InvalidByteForm {
        /// Rust type name of the target.
        target: &'static str,
        /// Offset of the byte run within the message.
        offset: usize,
        /// The parser's error message.
        reason: String,
    },

    /// A char field holds a value that is not a Unicode scalar value.
    #[error("invalid char {value:#x}")]
    InvalidChar {
        /// The decoded integer.
        value: u64,
    },

    /// A back reference points at no shared value.
    #[error("dangling reference at offset {offset}")]
    DanglingRef {
        /// Offset of the reference record within the message.
        offset: usize,
    },

    /// A back reference resolves to a value of another pointer type.
    #[error("reference at offset {offset} resolves to a different type")]
    RefTypeMismatch {
        /// Offset of the reference record within the message.
        offset: usize,
    },

    /// A dynamic value does not have the type the caller asked for.
    #[error("value is not a {expected}")]
    TypeMismatch {
        /// Rust type name the caller expected.
        expected: &'static str,
    },

    /// Nesting is deeper than the configured maximum.
    #[error("nesting exceeds the maximum depth of {max_depth}")]
    DepthLimitExceeded {
        /// The configured limit.
        max_depth: usize,
    },

    /// A frame announces more bytes than the configured maximum.
    #[error("message of {size} bytes exceeds the limit of {limit} bytes")]
    MessageTooLarge {
        /// The size read from the frame.
        size: u64,
        /// The configured limit.
        limit: u64,
    },

    /// A decoded integer does not fit the target type.
    #[error("integer {value} out of range for {target}")]
    OutOfRange {
        /// The decoded integer, widened.
        value: i128,
        /// Rust type name of the target.
        target: &'static str,
    },

    /// A message holds bytes after its value.
    #[error("{remaining} trailing bytes after message value")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// An earlier decode on this session failed.
    #[error("decode session is unusable after an earlier failure")]
    Poisoned,
}

#[allow(clippy::ref_option)]
fn list_len(found: &Option<usize>) -> String {
    found.map_or_else(|| "nil".to_owned(), |len| len.to_string())
}
