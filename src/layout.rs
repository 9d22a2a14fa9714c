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

//! The object layer: struct and list handles over segment words, and the
//! pointer read/write machinery that links them.
//!
//! Handles are non-owning and cheap to clone; they borrow the message and
//! hold a reference to the segment their object lives in. All primitive
//! accessors XOR through the field's declared default, so freshly
//! allocated (zeroed) words read as all-default with no initialization
//! pass.

use std::rc::Rc;

use tracing::trace;

use crate::bool_list::BoolList;
use crate::capability::CapabilityHandle;
use crate::data::Data;
use crate::field::FieldValue;
use crate::message::{AllocationContext, Message, ResolvedObject};
use crate::pointer_list::PointerList;
use crate::primitive_list::{element_size_for, PrimitiveList};
use crate::segment::{Segment, SegmentId};
use crate::struct_list::StructList;
use crate::text::Text;
use crate::units::*;
use crate::wire::{
    data_bits_per_element, pointers_per_element, ElementSize, StructSize, WirePointer,
    WirePointerKind,
};
use crate::{Error, Result};

#[inline]
fn low_bits_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// A handle to a struct within a segment.
///
/// Reference semantics: cloning is cheap and clones view the same words.
/// A zero-shaped handle represents the absence of a struct; every field of
/// it reads as its default.
#[derive(Clone)]
pub struct Struct<'a> {
    message: &'a Message,
    segment: Rc<Segment>,
    data_offset: u32,
    data_words: u16,
    pointer_words: u16,
    /// Nonzero when this handle was synthesized from a primitive list
    /// element promoted to struct shape; it marks where the element lives
    /// within its containing word, and only field index 0 is addressable.
    upgraded_byte: u8,
}

impl<'a> ::core::fmt::Debug for Struct<'a> {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.debug_struct("Struct")
            .field("segment", &self.segment.id())
            .field("offset", &self.data_offset)
            .field("data_words", &self.data_words)
            .field("pointer_words", &self.pointer_words)
            .finish()
    }
}

impl<'a> Struct<'a> {
    pub(crate) fn null(message: &'a Message, segment: Rc<Segment>) -> Self {
        Self {
            message,
            segment,
            data_offset: 0,
            data_words: 0,
            pointer_words: 0,
            upgraded_byte: 0,
        }
    }

    pub(crate) fn message(&self) -> &'a Message {
        self.message
    }

    pub(crate) fn segment(&self) -> &Rc<Segment> {
        &self.segment
    }

    pub fn segment_id(&self) -> SegmentId {
        self.segment.id()
    }

    /// Absolute word offset of the first data word.
    pub fn word_offset(&self) -> u32 {
        self.data_offset
    }

    pub fn data_words(&self) -> WordCount16 {
        self.data_words
    }

    pub fn pointer_words(&self) -> PointerCount16 {
        self.pointer_words
    }

    pub fn is_null(&self) -> bool {
        self.data_words == 0 && self.pointer_words == 0
    }

    fn data_bits(&self) -> u64 {
        u64::from(self.data_words) * u64::from(BITS_PER_WORD)
    }

    fn pointer_pos(&self, index: u16) -> u32 {
        self.data_offset + u32::from(self.data_words) + u32::from(index)
    }

    /// Reads the primitive field at `offset` (a field index scaled by the
    /// type's width). Out-of-range fields read as zero; apply the mask
    /// variant to obtain the declared default.
    pub fn get_data_field<T: FieldValue>(&self, offset: usize) -> T {
        if self.upgraded_byte != 0 && offset != 0 {
            return T::from_bits(0);
        }
        let bit = u64::from(self.upgraded_byte) * u64::from(BITS_PER_BYTE)
            + offset as u64 * u64::from(T::BITS);
        if bit + u64::from(T::BITS) > self.data_bits() {
            return T::from_bits(0);
        }
        let word = self.data_offset + (bit / u64::from(BITS_PER_WORD)) as u32;
        let shift = (bit % u64::from(BITS_PER_WORD)) as u32;
        T::from_bits((self.segment.get_word(word) >> shift) & low_bits_mask(T::BITS))
    }

    pub fn get_data_field_mask<T: FieldValue>(&self, offset: usize, mask: T::Mask) -> T {
        self.get_data_field::<T>(offset).mask(mask)
    }

    /// Writes the primitive field at `offset`.
    ///
    /// A write beyond the struct's allocated words succeeds silently when
    /// the stored value would be zero (the default) and fails with
    /// [`Error::ShortStruct`] otherwise, so that round-tripping an
    /// all-default value through a short struct is lossless.
    pub fn set_data_field<T: FieldValue>(&self, offset: usize, value: T) -> Result<()> {
        if self.upgraded_byte != 0 && offset != 0 {
            return Err(Error::UpgradedListElement);
        }
        let bit = u64::from(self.upgraded_byte) * u64::from(BITS_PER_BYTE)
            + offset as u64 * u64::from(T::BITS);
        if bit + u64::from(T::BITS) > self.data_bits() {
            return if value.into_bits() == 0 {
                Ok(())
            } else {
                Err(Error::ShortStruct)
            };
        }
        self.segment.check_writable()?;
        let word = self.data_offset + (bit / u64::from(BITS_PER_WORD)) as u32;
        let shift = (bit % u64::from(BITS_PER_WORD)) as u32;
        let mask = low_bits_mask(T::BITS) << shift;
        let old = self.segment.get_word(word);
        self.segment
            .put_word(word, (old & !mask) | ((value.into_bits() << shift) & mask));
        Ok(())
    }

    pub fn set_data_field_mask<T: FieldValue>(
        &self,
        offset: usize,
        value: T,
        mask: T::Mask,
    ) -> Result<()> {
        self.set_data_field(offset, value.mask(mask))
    }

    pub fn get_bool_field(&self, offset: usize) -> bool {
        if self.upgraded_byte != 0 && offset != 0 {
            return false;
        }
        let bit = u64::from(self.upgraded_byte) * u64::from(BITS_PER_BYTE) + offset as u64;
        if bit >= self.data_bits() {
            return false;
        }
        let word = self.data_offset + (bit / u64::from(BITS_PER_WORD)) as u32;
        let shift = (bit % u64::from(BITS_PER_WORD)) as u32;
        (self.segment.get_word(word) >> shift) & 1 != 0
    }

    pub fn get_bool_field_mask(&self, offset: usize, mask: bool) -> bool {
        self.get_bool_field(offset) ^ mask
    }

    pub fn set_bool_field(&self, offset: usize, value: bool) -> Result<()> {
        if self.upgraded_byte != 0 && offset != 0 {
            return Err(Error::UpgradedListElement);
        }
        let bit = u64::from(self.upgraded_byte) * u64::from(BITS_PER_BYTE) + offset as u64;
        if bit >= self.data_bits() {
            return if value { Err(Error::ShortStruct) } else { Ok(()) };
        }
        self.segment.check_writable()?;
        let word = self.data_offset + (bit / u64::from(BITS_PER_WORD)) as u32;
        let shift = (bit % u64::from(BITS_PER_WORD)) as u32;
        let old = self.segment.get_word(word);
        self.segment
            .put_word(word, (old & !(1 << shift)) | (u64::from(value) << shift));
        Ok(())
    }

    pub fn set_bool_field_mask(&self, offset: usize, value: bool, mask: bool) -> Result<()> {
        self.set_bool_field(offset, value ^ mask)
    }

    /// The raw pointer word at pointer index `index`; null when the index
    /// is beyond the struct's pointer section.
    pub fn get_pointer_field(&self, index: u16) -> WirePointer {
        if self.upgraded_byte != 0 || index >= self.pointer_words {
            WirePointer::NULL
        } else {
            WirePointer::from_word(self.segment.get_word(self.pointer_pos(index)))
        }
    }

    fn writable_pointer_pos(&self, index: u16) -> Result<u32> {
        if self.upgraded_byte != 0 {
            return Err(Error::UpgradedListElement);
        }
        if index >= self.pointer_words {
            return Err(Error::PointerIndexOutOfRange {
                index,
                count: self.pointer_words,
            });
        }
        self.segment.check_writable()?;
        Ok(self.pointer_pos(index))
    }

    fn check_context(&self, context: &AllocationContext<'_>) -> Result<()> {
        if ::core::ptr::eq(self.message, context.message()) {
            Ok(())
        } else {
            Err(Error::CrossMessagePointer)
        }
    }

    pub fn get_struct_field(&self, index: u16) -> Result<Struct<'a>> {
        if self.upgraded_byte != 0 || index >= self.pointer_words {
            return Ok(Struct::null(self.message, self.segment.clone()));
        }
        read_struct_ptr(self.message, &self.segment, self.pointer_pos(index))
    }

    /// Allocates a fresh struct into pointer slot `index`, overwriting any
    /// existing pointer.
    pub fn init_struct_field(
        &self,
        index: u16,
        size: StructSize,
        context: &AllocationContext<'a>,
    ) -> Result<Struct<'a>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        init_struct_ptr(context, &self.segment, pos, size)
    }

    /// Returns the struct in pointer slot `index`, initializing a fresh one
    /// when the slot is null and relocating the stored struct to a larger
    /// allocation when it is smaller than `size` asks for.
    pub fn get_writable_struct_field(
        &self,
        index: u16,
        size: StructSize,
        context: &AllocationContext<'a>,
    ) -> Result<Struct<'a>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        if WirePointer::from_word(self.segment.get_word(pos)).is_null() {
            return init_struct_ptr(context, &self.segment, pos, size);
        }

        let old = read_struct_ptr(self.message, &self.segment, pos)?;
        if old.data_words >= size.data && old.pointer_words >= size.pointers {
            return Ok(old);
        }

        //# The space allocated for this struct is too small. We can't just
        //# run with it and bounds-check at access time, because how would
        //# we handle writes? Instead, copy the struct to a new space now.
        let new_size = StructSize::new(
            ::core::cmp::max(old.data_words, size.data),
            ::core::cmp::max(old.pointer_words, size.pointers),
        );
        let (new_segment, new_offset) = context.allocate(new_size.total());
        for w in 0..u32::from(old.data_words) {
            new_segment.put_word(new_offset + w, old.segment.get_word(old.data_offset + w));
        }
        let new_pointer_base = new_offset + u32::from(new_size.data);
        for j in 0..old.pointer_words {
            transfer_pointer(
                self.message,
                &old.segment,
                old.pointer_pos(j),
                &new_segment,
                new_pointer_base + u32::from(j),
            )?;
        }
        for w in 0..u32::from(old.data_words) + u32::from(old.pointer_words) {
            old.segment.put_word(old.data_offset + w, 0);
        }
        write_object_ptr(
            self.message,
            &self.segment,
            pos,
            WirePointer::struct_shape(new_size),
            &new_segment,
            new_offset,
        )?;
        Ok(Struct {
            message: self.message,
            segment: new_segment,
            data_offset: new_offset,
            data_words: new_size.data,
            pointer_words: new_size.pointers,
            upgraded_byte: 0,
        })
    }

    /// Points pointer slot `index` at a struct already allocated in the
    /// same message, emitting a far or double-far pointer if the target
    /// lives in another segment.
    pub fn set_struct_field(&self, index: u16, target: &Struct<'_>) -> Result<()> {
        if !::core::ptr::eq(self.message, target.message) {
            return Err(Error::CrossMessagePointer);
        }
        let pos = self.writable_pointer_pos(index)?;
        write_struct_ref(self.message, &self.segment, pos, target)
    }

    fn read_list_field(
        &self,
        index: u16,
        expected: Option<ElementSize>,
    ) -> Result<ListRef<'a>> {
        if self.upgraded_byte != 0 || index >= self.pointer_words {
            return Ok(ListRef::empty(
                self.message,
                self.segment.clone(),
                expected.unwrap_or(ElementSize::Void),
            ));
        }
        read_list_ptr(
            self.message,
            &self.segment,
            self.pointer_pos(index),
            expected,
        )
    }

    pub fn get_primitive_list_field<T: FieldValue>(
        &self,
        index: u16,
    ) -> Result<PrimitiveList<'a, T>> {
        Ok(PrimitiveList::new(
            self.read_list_field(index, Some(element_size_for::<T>()))?,
        ))
    }

    pub fn init_primitive_list_field<T: FieldValue>(
        &self,
        index: u16,
        count: ElementCount32,
        context: &AllocationContext<'a>,
    ) -> Result<PrimitiveList<'a, T>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        Ok(PrimitiveList::new(init_list_ptr(
            context,
            &self.segment,
            pos,
            element_size_for::<T>(),
            count,
        )?))
    }

    pub fn get_bool_list_field(&self, index: u16) -> Result<BoolList<'a>> {
        Ok(BoolList::new(
            self.read_list_field(index, Some(ElementSize::Bit))?,
        ))
    }

    pub fn init_bool_list_field(
        &self,
        index: u16,
        count: ElementCount32,
        context: &AllocationContext<'a>,
    ) -> Result<BoolList<'a>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        Ok(BoolList::new(init_list_ptr(
            context,
            &self.segment,
            pos,
            ElementSize::Bit,
            count,
        )?))
    }

    pub fn get_pointer_list_field(&self, index: u16) -> Result<PointerList<'a>> {
        Ok(PointerList::new(
            self.read_list_field(index, Some(ElementSize::Pointer))?,
        ))
    }

    pub fn init_pointer_list_field(
        &self,
        index: u16,
        count: ElementCount32,
        context: &AllocationContext<'a>,
    ) -> Result<PointerList<'a>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        Ok(PointerList::new(init_list_ptr(
            context,
            &self.segment,
            pos,
            ElementSize::Pointer,
            count,
        )?))
    }

    pub fn get_struct_list_field(&self, index: u16) -> Result<StructList<'a>> {
        Ok(StructList::new(
            self.read_list_field(index, Some(ElementSize::InlineComposite))?,
        ))
    }

    pub fn init_struct_list_field(
        &self,
        index: u16,
        count: ElementCount32,
        size: StructSize,
        context: &AllocationContext<'a>,
    ) -> Result<StructList<'a>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        Ok(StructList::new(init_struct_list_ptr(
            context,
            &self.segment,
            pos,
            count,
            size,
        )?))
    }

    pub fn get_text_field(&self, index: u16) -> Result<Text<'a>> {
        if self.upgraded_byte != 0 || index >= self.pointer_words {
            return Ok(Text::empty(self.message, self.segment.clone()));
        }
        read_text_ptr(self.message, &self.segment, self.pointer_pos(index))
    }

    pub fn set_text_field(
        &self,
        index: u16,
        value: &str,
        context: &AllocationContext<'a>,
    ) -> Result<Text<'a>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        set_text_ptr(context, &self.segment, pos, value)
    }

    pub fn get_data_blob(&self, index: u16) -> Result<Data<'a>> {
        if self.upgraded_byte != 0 || index >= self.pointer_words {
            return Ok(Data::empty(self.message, self.segment.clone()));
        }
        read_data_ptr(self.message, &self.segment, self.pointer_pos(index))
    }

    pub fn set_data_blob(
        &self,
        index: u16,
        value: &[u8],
        context: &AllocationContext<'a>,
    ) -> Result<Data<'a>> {
        self.check_context(context)?;
        let pos = self.writable_pointer_pos(index)?;
        set_data_ptr(context, &self.segment, pos, value)
    }

    pub fn get_capability_field(&self, index: u16) -> Result<Rc<dyn CapabilityHandle>> {
        if self.upgraded_byte != 0 || index >= self.pointer_words {
            return Err(Error::MalformedPointer);
        }
        read_cap_ptr(self.message, &self.segment, self.pointer_pos(index))
    }

    /// Interns the capability in the message's table and writes an "other"
    /// pointer carrying its index.
    pub fn set_capability_field(
        &self,
        index: u16,
        hook: &Rc<dyn CapabilityHandle>,
    ) -> Result<()> {
        let pos = self.writable_pointer_pos(index)?;
        let cap_index = self.message.local_caps().intern(hook);
        self.segment
            .put_word(pos, WirePointer::capability(cap_index).raw());
        Ok(())
    }

    /// Deep-copies this struct and everything reachable from it into
    /// `dest`, translating capability indices into the destination's
    /// table. Copying into the struct's own message returns the handle
    /// unchanged.
    pub fn copy_to<'d>(&self, dest: &'d Message) -> Result<Struct<'d>> {
        if ::core::ptr::eq(
            self.message as *const Message,
            dest as *const Message,
        ) {
            return Ok(Struct {
                message: dest,
                segment: self.segment.clone(),
                data_offset: self.data_offset,
                data_words: self.data_words,
                pointer_words: self.pointer_words,
                upgraded_byte: self.upgraded_byte,
            });
        }
        if self.upgraded_byte != 0 {
            return Err(Error::UpgradedListElement);
        }
        dest.ensure_root_word()?;
        let context = dest.alloc_context();
        copy_struct_into(self, &context, self.message.nesting_limit())
    }

    /// Trims trailing zero data words and, unless `data_only`, trailing
    /// zero pointer words, shifting the surviving pointer section left and
    /// re-aiming its positional offsets. The vacated tail is zeroed and,
    /// when the struct sits at its segment's high-water mark, reclaimed.
    /// Returns the handle reissued with the reduced shape.
    pub fn compact(&self, data_only: bool) -> Result<Struct<'a>> {
        if self.upgraded_byte != 0 {
            return Err(Error::UpgradedListElement);
        }
        self.segment.check_writable()?;
        let data_words = u32::from(self.data_words);
        let pointer_words = u32::from(self.pointer_words);
        let pointer_base = self.data_offset + data_words;

        let mut kept_data = data_words;
        while kept_data > 0 && self.segment.get_word(self.data_offset + kept_data - 1) == 0 {
            kept_data -= 1;
        }
        let trimmed_data = data_words - kept_data;

        let mut kept_pointers = pointer_words;
        if !data_only {
            while kept_pointers > 0
                && self.segment.get_word(pointer_base + kept_pointers - 1) == 0
            {
                kept_pointers -= 1;
            }
        }

        if trimmed_data == 0 && kept_pointers == pointer_words {
            return Ok(self.clone());
        }

        if trimmed_data > 0 && kept_pointers > 0 {
            //# Re-encode the surviving pointers before moving anything, so
            //# an offset that no longer fits fails without mutation.
            let mut moved = Vec::with_capacity(kept_pointers as usize);
            for j in 0..kept_pointers {
                let raw = WirePointer::from_word(self.segment.get_word(pointer_base + j));
                let value = if raw.is_null() || !raw.is_positional() {
                    raw
                } else {
                    raw.with_word_offset(i64::from(raw.word_offset()) + i64::from(trimmed_data))?
                };
                moved.push(value);
            }
            for (j, value) in moved.into_iter().enumerate() {
                self.segment
                    .put_word(pointer_base - trimmed_data + j as u32, value.raw());
            }
        }

        let new_end = self.data_offset + kept_data + kept_pointers;
        let old_end = self.data_offset + data_words + pointer_words;
        for pos in new_end..old_end {
            self.segment.put_word(pos, 0);
        }
        if self.segment.try_reclaim(old_end, old_end - new_end) {
            trace!(words = old_end - new_end, "reclaimed trailing words");
        }

        Ok(Struct {
            message: self.message,
            segment: self.segment.clone(),
            data_offset: self.data_offset,
            data_words: kept_data as u16,
            pointer_words: kept_pointers as u16,
            upgraded_byte: 0,
        })
    }

    /// Words reachable from this struct, itself included. Counts against
    /// the traversal budget.
    pub fn total_size(&self) -> Result<WordCount64> {
        let mut total = u64::from(self.data_words) + u64::from(self.pointer_words);
        for j in 0..self.pointer_words {
            total += total_size_through(
                self.message,
                &self.segment,
                self.pointer_pos(j),
                self.message.nesting_limit(),
            )?;
        }
        Ok(total)
    }
}

/// A handle to a list's elements within a segment. The typed list views
/// wrap this shared addressing scheme.
#[derive(Clone)]
pub struct ListRef<'a> {
    message: &'a Message,
    segment: Rc<Segment>,
    /// Word offset of the first element; for composite lists this is one
    /// past the tag word.
    first: u32,
    count: ElementCount32,
    element_size: ElementSize,
    step_bits: BitCount32,
    /// Per-element section sizes, from the tag of a composite list.
    data_words: WordCount16,
    pointer_words: PointerCount16,
}

impl<'a> ::core::fmt::Debug for ListRef<'a> {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.debug_struct("ListRef")
            .field("segment", &self.segment.id())
            .field("first", &self.first)
            .field("count", &self.count)
            .field("element_size", &self.element_size)
            .finish()
    }
}

impl<'a> ListRef<'a> {
    pub(crate) fn empty(
        message: &'a Message,
        segment: Rc<Segment>,
        element_size: ElementSize,
    ) -> Self {
        Self {
            message,
            segment,
            first: 0,
            count: 0,
            element_size,
            step_bits: data_bits_per_element(element_size)
                + pointers_per_element(element_size) * BITS_PER_POINTER,
            data_words: 0,
            pointer_words: 0,
        }
    }

    pub(crate) fn message(&self) -> &'a Message {
        self.message
    }

    pub(crate) fn segment(&self) -> &Rc<Segment> {
        &self.segment
    }

    pub fn len(&self) -> ElementCount32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn element_size(&self) -> ElementSize {
        self.element_size
    }

    pub(crate) fn check_index(&self, index: ElementCount32) -> Result<()> {
        if index < self.count {
            Ok(())
        } else {
            Err(Error::IndexOutOfRange {
                index,
                len: self.count,
            })
        }
    }

    fn element_bit(&self, index: ElementCount32) -> u64 {
        u64::from(self.first) * u64::from(BITS_PER_WORD)
            + u64::from(index) * u64::from(self.step_bits)
    }

    /// Reads `bits` bits at the start of element `index`'s data.
    pub(crate) fn get_element_bits(&self, index: ElementCount32, bits: u32) -> u64 {
        let bit = self.element_bit(index);
        let word = (bit / u64::from(BITS_PER_WORD)) as u32;
        let shift = (bit % u64::from(BITS_PER_WORD)) as u32;
        (self.segment.get_word(word) >> shift) & low_bits_mask(bits)
    }

    pub(crate) fn set_element_bits(
        &self,
        index: ElementCount32,
        bits: u32,
        value: u64,
    ) -> Result<()> {
        self.segment.check_writable()?;
        let bit = self.element_bit(index);
        let word = (bit / u64::from(BITS_PER_WORD)) as u32;
        let shift = (bit % u64::from(BITS_PER_WORD)) as u32;
        let mask = low_bits_mask(bits) << shift;
        let old = self.segment.get_word(word);
        self.segment
            .put_word(word, (old & !mask) | ((value << shift) & mask));
        Ok(())
    }

    /// Absolute position of element `index`'s pointer word, when the
    /// element shape has one.
    pub(crate) fn pointer_pos(&self, index: ElementCount32) -> Option<u32> {
        match self.element_size {
            ElementSize::Pointer => Some(self.first + index),
            ElementSize::InlineComposite if self.pointer_words > 0 => Some(
                self.first
                    + index * (self.step_bits / BITS_PER_WORD)
                    + u32::from(self.data_words),
            ),
            _ => None,
        }
    }

    /// An element viewed as a struct. Elements of a composite list share
    /// the tag's shape; a primitive element is promoted to a synthesized
    /// struct whose only addressable field is field 0.
    pub fn get_struct_element(&self, index: ElementCount32) -> Result<Struct<'a>> {
        self.check_index(index)?;
        match self.element_size {
            ElementSize::InlineComposite => {
                let words_per_element = self.step_bits / BITS_PER_WORD;
                Ok(Struct {
                    message: self.message,
                    segment: self.segment.clone(),
                    data_offset: self.first + index * words_per_element,
                    data_words: self.data_words,
                    pointer_words: self.pointer_words,
                    upgraded_byte: 0,
                })
            }
            ElementSize::Void => Ok(Struct::null(self.message, self.segment.clone())),
            ElementSize::Pointer => Ok(Struct {
                message: self.message,
                segment: self.segment.clone(),
                data_offset: self.first + index,
                data_words: 0,
                pointer_words: 1,
                upgraded_byte: 0,
            }),
            ElementSize::EightBytes => Ok(Struct {
                message: self.message,
                segment: self.segment.clone(),
                data_offset: self.first + index,
                data_words: 1,
                pointer_words: 0,
                upgraded_byte: 0,
            }),
            ElementSize::Byte | ElementSize::TwoBytes | ElementSize::FourBytes => {
                let bit = self.element_bit(index);
                Ok(Struct {
                    message: self.message,
                    segment: self.segment.clone(),
                    data_offset: (bit / u64::from(BITS_PER_WORD)) as u32,
                    data_words: 1,
                    pointer_words: 0,
                    upgraded_byte: ((bit % u64::from(BITS_PER_WORD)) / u64::from(BITS_PER_BYTE))
                        as u8,
                })
            }
            ElementSize::Bit => Err(Error::MalformedPointer),
        }
    }
}

pub(crate) fn read_struct_ptr<'a>(
    message: &'a Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
) -> Result<Struct<'a>> {
    if WirePointer::from_word(segment.get_word(ptr_pos)).is_null() {
        return Ok(Struct::null(message, segment.clone()));
    }
    let object = message.traverse(segment, ptr_pos)?;
    if object.shape.kind() != WirePointerKind::Struct {
        return Err(Error::MalformedPointer);
    }
    Ok(Struct {
        message,
        segment: object.segment,
        data_offset: object.offset,
        data_words: object.shape.struct_data_words(),
        pointer_words: object.shape.struct_pointer_words(),
        upgraded_byte: 0,
    })
}

pub(crate) fn init_struct_ptr<'a>(
    context: &AllocationContext<'a>,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    size: StructSize,
) -> Result<Struct<'a>> {
    let message = context.message();
    segment.check_writable()?;
    if size.total() == 0 {
        segment.put_word(ptr_pos, WirePointer::empty_struct().raw());
        return Ok(Struct {
            message,
            segment: segment.clone(),
            data_offset: ptr_pos,
            data_words: 0,
            pointer_words: 0,
            upgraded_byte: 0,
        });
    }
    let (object_segment, object_offset) = context.allocate(size.total());
    write_object_ptr(
        message,
        segment,
        ptr_pos,
        WirePointer::struct_shape(size),
        &object_segment,
        object_offset,
    )?;
    Ok(Struct {
        message,
        segment: object_segment,
        data_offset: object_offset,
        data_words: size.data,
        pointer_words: size.pointers,
        upgraded_byte: 0,
    })
}

pub(crate) fn write_struct_ref(
    message: &Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    target: &Struct<'_>,
) -> Result<()> {
    if target.upgraded_byte != 0 {
        return Err(Error::UpgradedListElement);
    }
    write_object_ptr(
        message,
        segment,
        ptr_pos,
        WirePointer::struct_shape(StructSize::new(target.data_words, target.pointer_words)),
        &target.segment,
        target.data_offset,
    )
}

/// Encodes the pointer from `ptr_pos` of `src_segment` to the object at
/// `target_offset` of `target_segment`: a near pointer within one segment,
/// a far pointer through a one-word landing pad in the target's segment,
/// or a double-far through a two-word pad placed wherever there is room.
pub(crate) fn write_object_ptr(
    message: &Message,
    src_segment: &Rc<Segment>,
    ptr_pos: u32,
    shape: WirePointer,
    target_segment: &Rc<Segment>,
    target_offset: u32,
) -> Result<()> {
    src_segment.check_writable()?;

    if shape.kind() == WirePointerKind::Struct && shape.struct_total_words() == 0 {
        src_segment.put_word(ptr_pos, WirePointer::empty_struct().raw());
        return Ok(());
    }

    if Rc::ptr_eq(src_segment, target_segment) {
        let near =
            shape.with_word_offset(i64::from(target_offset) - (i64::from(ptr_pos) + 1))?;
        src_segment.put_word(ptr_pos, near.raw());
        return Ok(());
    }

    if let Some(pad_pos) = target_segment.try_allocate(POINTER_SIZE_IN_WORDS) {
        let pad = shape.with_word_offset(i64::from(target_offset) - (i64::from(pad_pos) + 1))?;
        target_segment.put_word(pad_pos, pad.raw());
        src_segment.put_word(
            ptr_pos,
            WirePointer::far(false, pad_pos, target_segment.id())?.raw(),
        );
        trace!(
            target_segment = target_segment.id(),
            "emitted far pointer"
        );
        return Ok(());
    }

    //# The target's segment cannot spare even one word for a landing pad,
    //# so a two-word pad lands wherever there is room: a single-far aimed
    //# at the object, then the shape pointer with a zero offset.
    let (pad_segment, pad_pos) = message.allocate(None, 2 * POINTER_SIZE_IN_WORDS);
    pad_segment.put_word(
        pad_pos,
        WirePointer::far(false, target_offset, target_segment.id())?.raw(),
    );
    pad_segment.put_word(pad_pos + 1, shape.raw());
    src_segment.put_word(
        ptr_pos,
        WirePointer::far(true, pad_pos, pad_segment.id())?.raw(),
    );
    trace!(
        target_segment = target_segment.id(),
        pad_segment = pad_segment.id(),
        "emitted double-far pointer"
    );
    Ok(())
}

/// Makes the pointer at `dst_pos` reference the same object as the one at
/// `src_pos`. Far and capability pointers survive verbatim; positional
/// pointers are re-aimed from their new slot.
fn transfer_pointer(
    message: &Message,
    src_segment: &Rc<Segment>,
    src_pos: u32,
    dst_segment: &Rc<Segment>,
    dst_pos: u32,
) -> Result<()> {
    let raw = WirePointer::from_word(src_segment.get_word(src_pos));
    if raw.is_null() {
        return Ok(());
    }
    if !raw.is_positional() {
        dst_segment.put_word(dst_pos, raw.raw());
        return Ok(());
    }
    let target = i64::from(src_pos) + 1 + i64::from(raw.word_offset());
    src_segment.check_bounds(target, 0)?;
    write_object_ptr(
        message,
        dst_segment,
        dst_pos,
        raw.with_word_offset(0)?,
        src_segment,
        target as u32,
    )
}

pub(crate) fn read_list_ptr<'a>(
    message: &'a Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    expected: Option<ElementSize>,
) -> Result<ListRef<'a>> {
    if WirePointer::from_word(segment.get_word(ptr_pos)).is_null() {
        return Ok(ListRef::empty(
            message,
            segment.clone(),
            expected.unwrap_or(ElementSize::Void),
        ));
    }
    let object = message.traverse(segment, ptr_pos)?;
    if object.shape.kind() != WirePointerKind::List {
        return Err(Error::MalformedPointer);
    }

    match object.shape.element_size() {
        ElementSize::InlineComposite => {
            let word_count = object.shape.composite_word_count();
            let tag = WirePointer::from_word(object.segment.get_word(object.offset));
            if tag.kind() != WirePointerKind::Struct {
                return Err(Error::MalformedPointer);
            }
            let count = tag.composite_element_count();
            let size = tag.struct_size();
            let words_per_element = size.total();
            if u64::from(count) * u64::from(words_per_element) > u64::from(word_count) {
                return Err(Error::MalformedPointer);
            }
            if words_per_element == 0 {
                //# Zero-sized elements can claim any length without
                //# carrying data; charge them as if they had size.
                message.charge(u64::from(count))?;
            }
            match expected {
                None | Some(ElementSize::Void | ElementSize::InlineComposite) => {}
                Some(ElementSize::Bit) => return Err(Error::MalformedPointer),
                Some(
                    ElementSize::Byte
                    | ElementSize::TwoBytes
                    | ElementSize::FourBytes
                    | ElementSize::EightBytes,
                ) => {
                    if size.data == 0 {
                        return Err(Error::MalformedPointer);
                    }
                }
                Some(ElementSize::Pointer) => {
                    if size.pointers == 0 {
                        return Err(Error::MalformedPointer);
                    }
                }
            }
            Ok(ListRef {
                message,
                segment: object.segment,
                first: object.offset + 1,
                count,
                element_size: ElementSize::InlineComposite,
                step_bits: words_per_element * BITS_PER_WORD,
                data_words: size.data,
                pointer_words: size.pointers,
            })
        }
        element_size => {
            let data_bits = data_bits_per_element(element_size);
            let pointers = pointers_per_element(element_size);
            let step = data_bits + pointers * BITS_PER_POINTER;
            let count = object.shape.list_element_count();
            if element_size == ElementSize::Void {
                message.charge(u64::from(count))?;
            }
            if let Some(expected) = expected {
                if element_size == ElementSize::Bit && expected != ElementSize::Bit {
                    return Err(Error::MalformedPointer);
                }
                if expected != ElementSize::InlineComposite
                    && (data_bits_per_element(expected) > data_bits
                        || pointers_per_element(expected) > pointers)
                {
                    return Err(Error::MalformedPointer);
                }
            }
            Ok(ListRef {
                message,
                segment: object.segment,
                first: object.offset,
                count,
                element_size,
                step_bits: step,
                data_words: 0,
                pointer_words: pointers as u16,
            })
        }
    }
}

pub(crate) fn init_list_ptr<'a>(
    context: &AllocationContext<'a>,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    element_size: ElementSize,
    count: ElementCount32,
) -> Result<ListRef<'a>> {
    debug_assert!(element_size != ElementSize::InlineComposite);
    let message = context.message();
    segment.check_writable()?;
    let shape = WirePointer::list_shape(element_size, count)?;
    let data_bits = data_bits_per_element(element_size);
    let pointers = pointers_per_element(element_size);
    let step = data_bits + pointers * BITS_PER_POINTER;
    let words = round_bits_up_to_words(u64::from(count) * u64::from(step));
    let (object_segment, object_offset) = context.allocate(words);
    write_object_ptr(message, segment, ptr_pos, shape, &object_segment, object_offset)?;
    Ok(ListRef {
        message,
        segment: object_segment,
        first: object_offset,
        count,
        element_size,
        step_bits: step,
        data_words: 0,
        pointer_words: pointers as u16,
    })
}

pub(crate) fn init_struct_list_ptr<'a>(
    context: &AllocationContext<'a>,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    count: ElementCount32,
    size: StructSize,
) -> Result<ListRef<'a>> {
    let message = context.message();
    segment.check_writable()?;
    let words_per_element = size.total();
    let payload = u64::from(count) * u64::from(words_per_element);
    if payload > u64::from(MAX_COMPOSITE_WORDS) {
        return Err(Error::OversizedList);
    }
    let shape = WirePointer::composite_shape(payload as u32)?;
    let tag = WirePointer::composite_tag(count, size)?;
    let (object_segment, object_offset) = context.allocate(payload as u32 + 1);
    object_segment.put_word(object_offset, tag.raw());
    write_object_ptr(message, segment, ptr_pos, shape, &object_segment, object_offset)?;
    Ok(ListRef {
        message,
        segment: object_segment,
        first: object_offset + 1,
        count,
        element_size: ElementSize::InlineComposite,
        step_bits: words_per_element * BITS_PER_WORD,
        data_words: size.data,
        pointer_words: size.pointers,
    })
}

pub(crate) fn read_text_ptr<'a>(
    message: &'a Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
) -> Result<Text<'a>> {
    if WirePointer::from_word(segment.get_word(ptr_pos)).is_null() {
        return Ok(Text::empty(message, segment.clone()));
    }
    let list = read_byte_list(message, segment, ptr_pos)?;
    if list.len() == 0 || list.get_element_bits(list.len() - 1, 8) != 0 {
        return Err(Error::TextNotNulTerminated);
    }
    Ok(Text::new(list))
}

pub(crate) fn set_text_ptr<'a>(
    context: &AllocationContext<'a>,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    value: &str,
) -> Result<Text<'a>> {
    let byte_len = u32::try_from(value.len()).map_err(|_| Error::OversizedList)?;
    //# One extra byte for the NUL terminator, already zero in fresh words.
    let list = init_list_ptr(context, segment, ptr_pos, ElementSize::Byte, byte_len + 1)?;
    for (i, b) in value.bytes().enumerate() {
        list.set_element_bits(i as u32, 8, u64::from(b))?;
    }
    Ok(Text::new(list))
}

pub(crate) fn read_data_ptr<'a>(
    message: &'a Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
) -> Result<Data<'a>> {
    if WirePointer::from_word(segment.get_word(ptr_pos)).is_null() {
        return Ok(Data::empty(message, segment.clone()));
    }
    Ok(Data::new(read_byte_list(message, segment, ptr_pos)?))
}

pub(crate) fn set_data_ptr<'a>(
    context: &AllocationContext<'a>,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    value: &[u8],
) -> Result<Data<'a>> {
    let byte_len = u32::try_from(value.len()).map_err(|_| Error::OversizedList)?;
    let list = init_list_ptr(context, segment, ptr_pos, ElementSize::Byte, byte_len)?;
    for (i, &b) in value.iter().enumerate() {
        list.set_element_bits(i as u32, 8, u64::from(b))?;
    }
    Ok(Data::new(list))
}

fn read_byte_list<'a>(
    message: &'a Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
) -> Result<ListRef<'a>> {
    let object = message.traverse(segment, ptr_pos)?;
    if object.shape.kind() != WirePointerKind::List
        || object.shape.element_size() != ElementSize::Byte
    {
        return Err(Error::MalformedPointer);
    }
    Ok(ListRef {
        message,
        segment: object.segment,
        first: object.offset,
        count: object.shape.list_element_count(),
        element_size: ElementSize::Byte,
        step_bits: 8,
        data_words: 0,
        pointer_words: 0,
    })
}

pub(crate) fn read_cap_ptr(
    message: &Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
) -> Result<Rc<dyn CapabilityHandle>> {
    let raw = WirePointer::from_word(segment.get_word(ptr_pos));
    if raw.is_null() || raw.kind() != WirePointerKind::Other {
        return Err(Error::MalformedPointer);
    }
    if !raw.is_capability() {
        return Err(Error::UnsupportedOtherPointer);
    }
    message
        .local_caps()
        .get(raw.cap_index())
        .ok_or(Error::IndexOutOfRange {
            index: raw.cap_index(),
            len: message.local_caps().len() as u32,
        })
}

fn copy_struct_into<'d>(
    src: &Struct<'_>,
    context: &AllocationContext<'d>,
    depth: u32,
) -> Result<Struct<'d>> {
    let size = StructSize::new(src.data_words, src.pointer_words);
    let (segment, offset) = context.allocate(size.total());
    copy_struct_body(
        src.message,
        &src.segment,
        src.data_offset,
        u32::from(src.data_words),
        u32::from(src.pointer_words),
        context,
        &segment,
        offset,
        depth,
    )?;
    Ok(Struct {
        message: context.message(),
        segment,
        data_offset: offset,
        data_words: size.data,
        pointer_words: size.pointers,
        upgraded_byte: 0,
    })
}

#[allow(clippy::too_many_arguments)]
fn copy_struct_body(
    src_message: &Message,
    src_segment: &Rc<Segment>,
    src_offset: u32,
    data_words: u32,
    pointer_words: u32,
    context: &AllocationContext<'_>,
    dst_segment: &Rc<Segment>,
    dst_offset: u32,
    depth: u32,
) -> Result<()> {
    for w in 0..data_words {
        dst_segment.put_word(dst_offset + w, src_segment.get_word(src_offset + w));
    }
    for j in 0..pointer_words {
        copy_pointer(
            src_message,
            src_segment,
            src_offset + data_words + j,
            context,
            dst_segment,
            dst_offset + data_words + j,
            depth,
        )?;
    }
    Ok(())
}

fn copy_pointer(
    src_message: &Message,
    src_segment: &Rc<Segment>,
    src_pos: u32,
    context: &AllocationContext<'_>,
    dst_segment: &Rc<Segment>,
    dst_pos: u32,
    depth: u32,
) -> Result<()> {
    let raw = WirePointer::from_word(src_segment.get_word(src_pos));
    if raw.is_null() {
        return Ok(());
    }
    if depth == 0 {
        return Err(Error::NestingLimitExceeded);
    }
    if raw.kind() == WirePointerKind::Other {
        if !raw.is_capability() {
            return Err(Error::UnsupportedOtherPointer);
        }
        let hook = src_message
            .local_caps()
            .get(raw.cap_index())
            .ok_or(Error::IndexOutOfRange {
                index: raw.cap_index(),
                len: src_message.local_caps().len() as u32,
            })?;
        let index = context.message().local_caps().intern(&hook);
        dst_segment.put_word(dst_pos, WirePointer::capability(index).raw());
        return Ok(());
    }

    let object = src_message.traverse(src_segment, src_pos)?;
    match object.shape.kind() {
        WirePointerKind::Struct => {
            let source = Struct {
                message: src_message,
                segment: object.segment,
                data_offset: object.offset,
                data_words: object.shape.struct_data_words(),
                pointer_words: object.shape.struct_pointer_words(),
                upgraded_byte: 0,
            };
            let copied = copy_struct_into(&source, context, depth - 1)?;
            write_object_ptr(
                context.message(),
                dst_segment,
                dst_pos,
                WirePointer::struct_shape(StructSize::new(
                    copied.data_words,
                    copied.pointer_words,
                )),
                &copied.segment,
                copied.data_offset,
            )
        }
        WirePointerKind::List => {
            copy_list(src_message, &object, context, dst_segment, dst_pos, depth - 1)
        }
        _ => Err(Error::MalformedPointer),
    }
}

fn copy_list(
    src_message: &Message,
    object: &ResolvedObject,
    context: &AllocationContext<'_>,
    dst_segment: &Rc<Segment>,
    dst_pos: u32,
    depth: u32,
) -> Result<()> {
    let message = context.message();
    match object.shape.element_size() {
        ElementSize::InlineComposite => {
            let word_count = object.shape.composite_word_count();
            let tag = WirePointer::from_word(object.segment.get_word(object.offset));
            if tag.kind() != WirePointerKind::Struct {
                return Err(Error::MalformedPointer);
            }
            let count = tag.composite_element_count();
            let size = tag.struct_size();
            let words_per_element = size.total();
            if u64::from(count) * u64::from(words_per_element) > u64::from(word_count) {
                return Err(Error::MalformedPointer);
            }
            if words_per_element == 0 {
                src_message.charge(u64::from(count))?;
            }
            let (new_segment, new_offset) = context.allocate(word_count + 1);
            new_segment.put_word(new_offset, tag.raw());
            let mut src_element = object.offset + 1;
            let mut dst_element = new_offset + 1;
            for _ in 0..count {
                copy_struct_body(
                    src_message,
                    &object.segment,
                    src_element,
                    u32::from(size.data),
                    u32::from(size.pointers),
                    context,
                    &new_segment,
                    dst_element,
                    depth,
                )?;
                src_element += words_per_element;
                dst_element += words_per_element;
            }
            write_object_ptr(
                message,
                dst_segment,
                dst_pos,
                WirePointer::composite_shape(word_count)?,
                &new_segment,
                new_offset,
            )
        }
        ElementSize::Pointer => {
            let count = object.shape.list_element_count();
            let (new_segment, new_offset) = context.allocate(count);
            for i in 0..count {
                copy_pointer(
                    src_message,
                    &object.segment,
                    object.offset + i,
                    context,
                    &new_segment,
                    new_offset + i,
                    depth,
                )?;
            }
            write_object_ptr(
                message,
                dst_segment,
                dst_pos,
                WirePointer::list_shape(ElementSize::Pointer, count)?,
                &new_segment,
                new_offset,
            )
        }
        element_size => {
            let count = object.shape.list_element_count();
            let words = round_bits_up_to_words(
                u64::from(count) * u64::from(data_bits_per_element(element_size)),
            );
            let (new_segment, new_offset) = context.allocate(words);
            for w in 0..words {
                new_segment.put_word(new_offset + w, object.segment.get_word(object.offset + w));
            }
            write_object_ptr(
                message,
                dst_segment,
                dst_pos,
                WirePointer::list_shape(element_size, count)?,
                &new_segment,
                new_offset,
            )
        }
    }
}

fn total_size_through(
    message: &Message,
    segment: &Rc<Segment>,
    ptr_pos: u32,
    depth: u32,
) -> Result<WordCount64> {
    let raw = WirePointer::from_word(segment.get_word(ptr_pos));
    if raw.is_null() {
        return Ok(0);
    }
    if raw.kind() == WirePointerKind::Other {
        return if raw.is_capability() {
            Ok(0)
        } else {
            Err(Error::UnsupportedOtherPointer)
        };
    }
    if depth == 0 {
        return Err(Error::NestingLimitExceeded);
    }

    let object = message.traverse(segment, ptr_pos)?;
    let mut total = object.shape.target_word_count();
    match object.shape.kind() {
        WirePointerKind::Struct => {
            let pointer_base = object.offset + u32::from(object.shape.struct_data_words());
            for j in 0..u32::from(object.shape.struct_pointer_words()) {
                total += total_size_through(message, &object.segment, pointer_base + j, depth - 1)?;
            }
        }
        WirePointerKind::List => match object.shape.element_size() {
            ElementSize::Pointer => {
                for i in 0..object.shape.list_element_count() {
                    total +=
                        total_size_through(message, &object.segment, object.offset + i, depth - 1)?;
                }
            }
            ElementSize::InlineComposite => {
                let tag = WirePointer::from_word(object.segment.get_word(object.offset));
                if tag.kind() != WirePointerKind::Struct {
                    return Err(Error::MalformedPointer);
                }
                let size = tag.struct_size();
                if size.pointers > 0 {
                    let mut element = object.offset + 1;
                    for _ in 0..tag.composite_element_count() {
                        for j in 0..u32::from(size.pointers) {
                            total += total_size_through(
                                message,
                                &object.segment,
                                element + u32::from(size.data) + j,
                                depth - 1,
                            )?;
                        }
                        element += size.total();
                    }
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(total)
}
