//! Options for encode and decode sessions.

use bon::Builder;

/// Default nesting limit shared by encoders and decoders.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default upper bound for the size of a single framed message.
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 1 << 30;

/// Configuration options for an [`Encoder`](crate::Encoder).
///
/// ```ignore
/// let options = EncodeOptions::builder().track_pointers(true).build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct EncodeOptions {
    /// Preserves shared-pointer identity and cycles.
    ///
    /// Without tracking every pointer is written out independently. This is
    /// cheaper, but a cyclic value then recurses until `max_depth` is hit
    /// and the encode fails with
    /// [`Error::DepthLimitExceeded`](crate::Error::DepthLimitExceeded).
    #[builder(default = false)]
    pub track_pointers: bool,

    /// A caller-supplied buffer to stage payloads in. Its contents are
    /// discarded; only its capacity is reused.
    pub scratch_buffer: Option<Vec<u8>>,

    /// Maximum struct nesting depth.
    #[builder(default = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self { Self::builder().build() }
}

/// Configuration options for a [`Decoder`](crate::Decoder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Builder)]
pub struct DecodeOptions {
    /// Fails with [`Error::UnknownField`](crate::Error::UnknownField) on a
    /// struct slot the decoding codec does not know, instead of skipping it.
    #[builder(default = false)]
    pub fail_on_unknown_field: bool,

    /// Maximum struct nesting depth.
    #[builder(default = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Largest message size accepted from a frame header.
    #[builder(default = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self { Self::builder().build() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let encode = EncodeOptions::default();
        assert!(!encode.track_pointers);
        assert!(encode.scratch_buffer.is_none());
        assert_eq!(encode.max_depth, DEFAULT_MAX_DEPTH);

        let decode = DecodeOptions::default();
        assert!(!decode.fail_on_unknown_field);
        assert_eq!(decode.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn builder_overrides() {
        let encode = EncodeOptions::builder()
            .track_pointers(true)
            .scratch_buffer(Vec::with_capacity(64))
            .build();
        assert!(encode.track_pointers);
        assert!(
            encode.scratch_buffer.as_ref().is_some_and(|b| b.capacity() >= 64)
        );

        let decode = DecodeOptions::builder()
            .fail_on_unknown_field(true)
            .max_depth(8)
            .build();
        assert!(decode.fail_on_unknown_field);
        assert_eq!(decode.max_depth, 8);
    }
}
