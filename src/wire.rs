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

//! The pointer codec: pure bit packing and unpacking of the four pointer
//! kinds into 64-bit words.
//!
//! Layout, as seen through the word's logical value (low bits are the
//! lowest-addressed wire bytes):
//!
//! ```text
//! struct:  [63:48 pointer words] [47:32 data words] [31:2 signed offset] [1:0 = 0]
//! list:    [63:35 element count] [34:32 element size] [31:2 signed offset] [1:0 = 1]
//! far:     [63:32 segment id] [31:3 pad offset] [2 double-far] [1:0 = 2]
//! other:   [63:32 capability index] [31:2 subtype = 0] [1:0 = 3]
//! ```
//!
//! For composite lists the "element count" field carries the payload word
//! count, and the offset field of the tag word that follows carries the
//! element count instead of an offset.

use crate::units::*;
use crate::{Error, Result, Word};

pub use self::ElementSize::{
    Bit, Byte, EightBytes, FourBytes, InlineComposite, Pointer, TwoBytes, Void,
};

use crate::segment::SegmentId;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WirePointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

impl WirePointerKind {
    fn from(val: u8) -> Self {
        match val & 3 {
            0 => Self::Struct,
            1 => Self::List,
            2 => Self::Far,
            _ => Self::Other,
        }
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    fn from(val: u8) -> Self {
        match val & 7 {
            0 => Void,
            1 => Bit,
            2 => Byte,
            3 => TwoBytes,
            4 => FourBytes,
            5 => EightBytes,
            6 => Pointer,
            _ => InlineComposite,
        }
    }
}

pub fn data_bits_per_element(size: ElementSize) -> BitCount32 {
    match size {
        Void => 0,
        Bit => 1,
        Byte => 8,
        TwoBytes => 16,
        FourBytes => 32,
        EightBytes => 64,
        Pointer => 0,
        InlineComposite => 0,
    }
}

pub fn pointers_per_element(size: ElementSize) -> u32 {
    match size {
        Pointer => 1,
        _ => 0,
    }
}

/// Shape of a struct: its section sizes in words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructSize {
    pub data: WordCount16,
    pub pointers: PointerCount16,
}

impl StructSize {
    pub const fn new(data: WordCount16, pointers: PointerCount16) -> Self {
        Self { data, pointers }
    }

    pub fn total(&self) -> WordCount32 {
        u32::from(self.data) + u32::from(self.pointers) * POINTER_SIZE_IN_WORDS
    }
}

const KIND_MASK: u64 = 3;
const DOUBLE_FAR_BIT: u64 = 1 << 2;

/// Smallest and one-past-largest encodable signed 30-bit word offsets.
const OFFSET_MIN: i64 = -(1 << 29);
const OFFSET_END: i64 = 1 << 29;

/// A decoded-on-demand view of a single pointer word.
///
/// A zero word is the canonical null pointer and stands for "this field
/// holds its default value".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WirePointer(u64);

impl WirePointer {
    pub const NULL: WirePointer = WirePointer(0);

    #[inline]
    pub fn from_word(word: Word) -> Self {
        Self(word)
    }

    #[inline]
    pub fn raw(self) -> Word {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn kind(self) -> WirePointerKind {
        WirePointerKind::from((self.0 & KIND_MASK) as u8)
    }

    /// Struct and list pointers are positional: their offset is interpreted
    /// relative to the word that follows them.
    #[inline]
    pub fn is_positional(self) -> bool {
        (self.0 & 2) == 0
    }

    /// True only for the capability subtype of "other" pointers. The rest
    /// of the subtype space is unassigned.
    #[inline]
    pub fn is_capability(self) -> bool {
        (self.0 as u32) == WirePointerKind::Other as u32
    }

    /// The signed word offset of a struct or list pointer.
    #[inline]
    pub fn word_offset(self) -> i32 {
        (self.0 as u32 as i32) >> 2
    }

    #[inline]
    pub fn struct_data_words(self) -> WordCount16 {
        (self.0 >> 32) as WordCount16
    }

    #[inline]
    pub fn struct_pointer_words(self) -> PointerCount16 {
        (self.0 >> 48) as PointerCount16
    }

    #[inline]
    pub fn struct_size(self) -> StructSize {
        StructSize::new(self.struct_data_words(), self.struct_pointer_words())
    }

    #[inline]
    pub fn struct_total_words(self) -> WordCount32 {
        self.struct_size().total()
    }

    #[inline]
    pub fn element_size(self) -> ElementSize {
        ElementSize::from((self.0 >> 32) as u8)
    }

    /// Element count of a non-composite list pointer, or the payload word
    /// count of a composite one.
    #[inline]
    pub fn list_element_count(self) -> ElementCount32 {
        (self.0 >> 35) as ElementCount32
    }

    #[inline]
    pub fn composite_word_count(self) -> WordCount32 {
        self.list_element_count()
    }

    /// Element count carried by the offset field of a composite tag word.
    #[inline]
    pub fn composite_element_count(self) -> ElementCount32 {
        (self.0 as u32) >> 2
    }

    #[inline]
    pub fn is_double_far(self) -> bool {
        (self.0 & DOUBLE_FAR_BIT) != 0
    }

    #[inline]
    pub fn far_offset(self) -> WordCount32 {
        (self.0 as u32) >> 3
    }

    #[inline]
    pub fn far_segment_id(self) -> SegmentId {
        (self.0 >> 32) as SegmentId
    }

    #[inline]
    pub fn cap_index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Words occupied by the target object of a positional pointer,
    /// counting a composite list's tag word.
    pub fn target_word_count(self) -> WordCount64 {
        match self.kind() {
            WirePointerKind::Struct => u64::from(self.struct_total_words()),
            WirePointerKind::List => match self.element_size() {
                InlineComposite => {
                    u64::from(self.composite_word_count()) + u64::from(POINTER_SIZE_IN_WORDS)
                }
                Pointer => u64::from(self.list_element_count()),
                size => u64::from(round_bits_up_to_words(
                    u64::from(self.list_element_count()) * u64::from(data_bits_per_element(size)),
                )),
            },
            _ => 0,
        }
    }

    /// A struct pointer shape with a zero offset. Combine with
    /// [`with_word_offset`](Self::with_word_offset) once the target
    /// placement is known.
    #[inline]
    pub fn struct_shape(size: StructSize) -> Self {
        Self(
            WirePointerKind::Struct as u64
                | (u64::from(size.data) << 32)
                | (u64::from(size.pointers) << 48),
        )
    }

    /// A non-composite list pointer shape with a zero offset.
    pub fn list_shape(element_size: ElementSize, element_count: ElementCount32) -> Result<Self> {
        debug_assert!(element_size != InlineComposite);
        if element_count > MAX_LIST_ELEMENTS {
            return Err(Error::OversizedList);
        }
        Ok(Self(
            WirePointerKind::List as u64
                | ((element_size as u64) << 32)
                | (u64::from(element_count) << 35),
        ))
    }

    /// A composite list pointer shape with a zero offset, carrying the
    /// payload word count (tag word excluded).
    pub fn composite_shape(word_count: WordCount32) -> Result<Self> {
        if word_count > MAX_COMPOSITE_WORDS {
            return Err(Error::OversizedList);
        }
        Ok(Self(
            WirePointerKind::List as u64
                | ((InlineComposite as u64) << 32)
                | (u64::from(word_count) << 35),
        ))
    }

    /// The tag word that precedes a composite list's elements: a struct
    /// pointer whose offset field holds the element count.
    pub fn composite_tag(element_count: ElementCount32, size: StructSize) -> Result<Self> {
        if element_count > MAX_LIST_ELEMENTS {
            return Err(Error::OversizedList);
        }
        Ok(Self(
            Self::struct_shape(size).0 | (u64::from(element_count) << 2),
        ))
    }

    pub fn far(double_far: bool, pad_offset: WordCount32, segment_id: SegmentId) -> Result<Self> {
        if pad_offset >= (1 << 29) {
            return Err(Error::MalformedPointer);
        }
        Ok(Self(
            WirePointerKind::Far as u64
                | if double_far { DOUBLE_FAR_BIT } else { 0 }
                | (u64::from(pad_offset) << 3)
                | (u64::from(segment_id) << 32),
        ))
    }

    pub fn capability(index: u32) -> Self {
        Self(WirePointerKind::Other as u64 | (u64::from(index) << 32))
    }

    /// A struct pointer that targets an empty struct. The offset is -1, as
    /// if the struct were allocated immediately before the pointer, so that
    /// the word stays distinguishable from null.
    #[inline]
    pub fn empty_struct() -> Self {
        Self(0xffff_fffc)
    }

    /// Re-encodes a positional shape with the given word offset.
    pub fn with_word_offset(self, offset: i64) -> Result<Self> {
        debug_assert!(self.is_positional());
        if !(OFFSET_MIN..OFFSET_END).contains(&offset) {
            return Err(Error::MalformedPointer);
        }
        let low = ((offset as i32) << 2) as u32 | (self.0 as u32 & 3);
        Ok(Self((self.0 & !0xffff_ffff) | u64::from(low)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    #[test]
    fn struct_pointer_fields() {
        let p = WirePointer::struct_shape(StructSize::new(2, 3))
            .with_word_offset(-4)
            .unwrap();
        assert_eq!(p.kind(), WirePointerKind::Struct);
        assert_eq!(p.word_offset(), -4);
        assert_eq!(p.struct_data_words(), 2);
        assert_eq!(p.struct_pointer_words(), 3);
        assert_eq!(p.struct_total_words(), 5);
    }

    #[test]
    fn list_pointer_fields() {
        let p = WirePointer::list_shape(FourBytes, 17)
            .unwrap()
            .with_word_offset(9)
            .unwrap();
        assert_eq!(p.kind(), WirePointerKind::List);
        assert_eq!(p.element_size(), FourBytes);
        assert_eq!(p.list_element_count(), 17);
        assert_eq!(p.word_offset(), 9);
        // 17 four-byte elements round up to 9 words.
        assert_eq!(p.target_word_count(), 9);
    }

    #[test]
    fn composite_tag_round_trip() {
        let tag = WirePointer::composite_tag(6, StructSize::new(1, 2)).unwrap();
        assert_eq!(tag.kind(), WirePointerKind::Struct);
        assert_eq!(tag.composite_element_count(), 6);
        assert_eq!(tag.struct_size(), StructSize::new(1, 2));
    }

    #[test]
    fn far_pointer_fields() {
        let p = WirePointer::far(true, 123, 7).unwrap();
        assert_eq!(p.kind(), WirePointerKind::Far);
        assert!(p.is_double_far());
        assert_eq!(p.far_offset(), 123);
        assert_eq!(p.far_segment_id(), 7);

        let p = WirePointer::far(false, 0, 1).unwrap();
        assert!(!p.is_double_far());
        assert_eq!(p.far_offset(), 0);
    }

    #[test]
    fn capability_pointer_fields() {
        let p = WirePointer::capability(5);
        assert_eq!(p.kind(), WirePointerKind::Other);
        assert!(p.is_capability());
        assert_eq!(p.cap_index(), 5);
        assert!(!WirePointer::from_word(0x10 | 3).is_capability());
    }

    #[test]
    fn offset_limits() {
        let shape = WirePointer::struct_shape(StructSize::new(1, 0));
        assert!(shape.with_word_offset((1 << 29) - 1).is_ok());
        assert!(shape.with_word_offset(-(1 << 29)).is_ok());
        assert_eq!(
            shape.with_word_offset(1 << 29),
            Err(Error::MalformedPointer)
        );
        assert_eq!(
            shape.with_word_offset(-(1 << 29) - 1),
            Err(Error::MalformedPointer)
        );
    }

    #[test]
    fn element_count_limits() {
        assert!(WirePointer::list_shape(Byte, MAX_LIST_ELEMENTS).is_ok());
        assert_eq!(
            WirePointer::list_shape(Byte, MAX_LIST_ELEMENTS + 1),
            Err(Error::OversizedList)
        );
        assert_eq!(
            WirePointer::composite_shape(MAX_COMPOSITE_WORDS + 1),
            Err(Error::OversizedList)
        );
    }

    #[test]
    fn empty_struct_is_not_null() {
        let p = WirePointer::empty_struct();
        assert!(!p.is_null());
        assert_eq!(p.kind(), WirePointerKind::Struct);
        assert_eq!(p.word_offset(), -1);
        assert_eq!(p.struct_total_words(), 0);
    }

    quickcheck! {
        fn prop_decode_encode_struct(offset: i32, data: u16, pointers: u16) -> bool {
            let offset = i64::from(offset % (1 << 29));
            let p = WirePointer::struct_shape(StructSize::new(data, pointers))
                .with_word_offset(offset)
                .unwrap();
            i64::from(p.word_offset()) == offset
                && p.struct_data_words() == data
                && p.struct_pointer_words() == pointers
        }

        fn prop_raw_words_survive(word: u64) -> bool {
            WirePointer::from_word(word).raw() == word
        }
    }
}
