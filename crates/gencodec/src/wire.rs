//! Byte codes and numeric mappings shared by the encoder and the decoder.
//!
//! Every value on the wire starts with a single byte. Bytes below [`END`]
//! are literal unsigned integers; the remaining bytes at the top of the
//! range are control codes describing what follows:
//!
//! | code        | meaning                                              |
//! |-------------|------------------------------------------------------|
//! | [`NIL`]     | nil pointer, nil list, absent option                 |
//! | `BYTES0..4` | byte run of 0 to 4 bytes, length implied by the code |
//! | [`N_BYTES`] | byte run, length as a uint                           |
//! | [`N_VALUES`]| list, element count as a uint                        |
//! | [`PTR`]     | pointer to a value that appears once                 |
//! | [`REF_PTR`] | pointer to a value referenced again later            |
//! | [`REF`]     | back reference, distance as a uint                   |
//! | [`START`]   | opens a struct field list                            |
//! | [`END`]     | closes a struct field list                           |
//!
//! Every code can be skipped without knowing the static type of the value,
//! see [`Decoder::skip`](crate::Decoder::skip).

/// Nil pointer, nil list or absent option.
pub const NIL: u8 = 255;

/// Empty byte run.
pub const BYTES0: u8 = 254;

/// Byte run of one byte.
pub const BYTES1: u8 = 253;

/// Byte run of two bytes.
pub const BYTES2: u8 = 252;

/// Byte run of three bytes.
pub const BYTES3: u8 = 251;

/// Byte run of four bytes.
pub const BYTES4: u8 = 250;

/// Byte run whose length follows as a uint.
pub const N_BYTES: u8 = 249;

/// List whose element count follows as a uint.
pub const N_VALUES: u8 = 248;

/// Pointer seen once in the message.
pub const PTR: u8 = 247;

/// Pointer that a later [`REF`] points back to.
pub const REF_PTR: u8 = 246;

/// Back reference to an earlier [`REF_PTR`].
pub const REF: u8 = 245;

/// Opens a struct. 244 and 243 are reserved.
pub const START: u8 = 242;

/// Closes a struct; also the first byte that is not a literal uint.
pub const END: u8 = 241;

/// Largest byte run expressible with an inline length code.
pub const MAX_INLINE_LEN: usize = (BYTES0 - BYTES4) as usize;

/// Written once at the start of every stream.
pub const MAGIC: [u8; 4] = *b"GNC1";

/// Returns the inline length code for a byte run of `len` bytes, if any.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn inline_len_code(len: usize) -> Option<u8> {
    if len <= MAX_INLINE_LEN { Some(BYTES0 - len as u8) } else { None }
}

/// Returns the length implied by an inline length code.
#[must_use]
pub const fn inline_len(code: u8) -> Option<usize> {
    if code >= BYTES4 && code <= BYTES0 {
        Some((BYTES0 - code) as usize)
    } else {
        None
    }
}

/// Maps a signed integer onto an unsigned one so that values of small
/// magnitude stay short.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn zigzag_encode(value: i64) -> u64 {
    if value < 0 {
        (!(value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    }
}

/// Inverse of [`zigzag_encode`].
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn zigzag_decode(value: u64) -> i64 {
    if value & 1 == 1 { !(value >> 1) as i64 } else { (value >> 1) as i64 }
}

/// Reverses the bytes of a float's bit pattern so that integral floats,
/// whose low mantissa bytes are zero, become small uints.
#[must_use]
pub const fn float_to_wire(value: f64) -> u64 { value.to_bits().swap_bytes() }

/// Inverse of [`float_to_wire`].
#[must_use]
pub const fn float_from_wire(value: u64) -> f64 {
    f64::from_bits(value.swap_bytes())
}

/// Number of little-endian bytes used for a uint that does not fit in a
/// literal byte.
#[must_use]
pub const fn uint_width(value: u64) -> usize {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFFFF_FFFF {
        4
    } else {
        8
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn code_layout() {
        assert_eq!(inline_len_code(0), Some(BYTES0));
        assert_eq!(inline_len_code(4), Some(BYTES4));
        assert_eq!(inline_len_code(5), None);
        assert_eq!(inline_len(BYTES3), Some(3));
        assert_eq!(inline_len(N_BYTES), None);
        assert_eq!(inline_len(START), None);
        assert!(START > END);
        assert!(N_BYTES < BYTES4);
    }

    #[test]
    fn zigzag_small_values() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(i64::MIN), u64::MAX);
        assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag_decode(u64::MAX), i64::MIN);
    }

    #[test]
    fn integral_floats_are_short() {
        assert_eq!(float_to_wire(0.0), 0);
        assert_eq!(float_to_wire(2.0), 0x40);
        assert_eq!(uint_width(float_to_wire(1.0)), 2);
        assert_eq!(uint_width(float_to_wire(17.0)), 2);
    }

    proptest! {
        #[test]
        fn zigzag_is_a_bijection(value in any::<i64>()) {
            prop_assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }

        #[test]
        fn zigzag_inverse_is_a_bijection(value in any::<u64>()) {
            prop_assert_eq!(zigzag_encode(zigzag_decode(value)), value);
        }

        #[test]
        fn float_mapping_preserves_bits(value in any::<f64>()) {
            prop_assert_eq!(
                float_from_wire(float_to_wire(value)).to_bits(),
                value.to_bits()
            );
        }
    }
}
