// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! The in-word codec for primitive fields.
//!
//! Fields are stored at a bit offset inside a struct's data words, XORed
//! with their declared default so that zeroed memory reads as all-default.
//! Floats mask through their bit representation.

/// A fixed-width primitive that can live inside a data word.
pub trait FieldValue: Copy {
    /// Width of the field on the wire, in bits.
    const BITS: u32;

    /// The type of the XOR default mask. Identical to `Self` for integers;
    /// the raw bit representation for floats.
    type Mask: Copy;

    fn from_bits(bits: u64) -> Self;
    fn into_bits(self) -> u64;
    fn mask(self, mask: Self::Mask) -> Self;
}

macro_rules! int_field_value(
    ($t:ident, $unsigned:ident, $bits:expr) => (
        impl FieldValue for $t {
            const BITS: u32 = $bits;
            type Mask = $t;

            #[inline]
            fn from_bits(bits: u64) -> Self {
                bits as $unsigned as $t
            }

            #[inline]
            fn into_bits(self) -> u64 {
                self as $unsigned as u64
            }

            #[inline]
            fn mask(self, mask: $t) -> $t {
                self ^ mask
            }
        }
    )
);

int_field_value!(u8, u8, 8);
int_field_value!(i8, u8, 8);
int_field_value!(u16, u16, 16);
int_field_value!(i16, u16, 16);
int_field_value!(u32, u32, 32);
int_field_value!(i32, u32, 32);
int_field_value!(u64, u64, 64);
int_field_value!(i64, u64, 64);

impl FieldValue for f32 {
    const BITS: u32 = 32;
    type Mask = u32;

    #[inline]
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }

    #[inline]
    fn into_bits(self) -> u64 {
        u64::from(self.to_bits())
    }

    #[inline]
    fn mask(self, mask: u32) -> Self {
        Self::from_bits(self.to_bits() ^ mask)
    }
}

impl FieldValue for f64 {
    const BITS: u32 = 64;
    type Mask = u64;

    #[inline]
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }

    #[inline]
    fn into_bits(self) -> u64 {
        self.to_bits()
    }

    #[inline]
    fn mask(self, mask: u64) -> Self {
        Self::from_bits(self.to_bits() ^ mask)
    }
}

#[cfg(test)]
mod tests {
    use super::FieldValue;

    #[test]
    fn signed_values_keep_their_width() {
        assert_eq!((-7i32).into_bits(), 0xffff_fff9);
        assert_eq!(i32::from_bits(0xffff_fff9), -7);
        assert_eq!((-1i8).into_bits(), 0xff);
        assert_eq!(i64::from_bits(u64::MAX), -1);
    }

    #[test]
    fn float_masking_goes_through_bits() {
        let v = 1.5f64;
        let masked = v.mask(v.to_bits());
        assert_eq!(masked.to_bits(), 0);
        assert_eq!(masked.mask(v.to_bits()), 1.5);
    }

    #[test]
    fn default_of_zero_mask_is_identity() {
        assert_eq!(42u16.mask(0), 42);
        assert_eq!(42u16.mask(10), 32);
        assert_eq!(32u16.mask(10), 42);
    }
}
