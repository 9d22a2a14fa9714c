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

//! Untyped root container for a Cap'n Proto value: the segment pool, its
//! allocation policy, and far-pointer traversal.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::capability::CapTable;
use crate::layout::{self, Struct};
use crate::read_limiter::ReadLimiter;
use crate::segment::{Segment, SegmentId};
use crate::wire::{StructSize, WirePointer, WirePointerKind};
use crate::{Error, Result, Word};

/// Options controlling how much work a message's readers may do.
#[derive(Clone, Copy, Debug)]
pub struct MessageOptions {
    /// Limits how many total words of data are allowed to be traversed.
    /// Traversal is counted every time a pointer is dereferenced, so
    /// re-reading the same sub-object double-counts. The limit exists
    /// because a message in which many pointers target the same object is
    /// small on the wire but expensive to walk; `None` disables the check.
    pub traversal_limit_in_words: Option<u64>,

    /// Limits how deeply nested the traversal-recursive operations (deep
    /// copy, total-size accounting) will go before giving up.
    pub nesting_limit: u32,
}

pub const DEFAULT_MESSAGE_OPTIONS: MessageOptions = MessageOptions {
    traversal_limit_in_words: Some(8 * 1024 * 1024),
    nesting_limit: 64,
};

impl Default for MessageOptions {
    fn default() -> Self {
        DEFAULT_MESSAGE_OPTIONS
    }
}

impl MessageOptions {
    pub fn new() -> Self {
        DEFAULT_MESSAGE_OPTIONS
    }

    pub fn traversal_limit_in_words(&mut self, value: Option<u64>) -> &mut Self {
        self.traversal_limit_in_words = value;
        self
    }

    pub fn nesting_limit(&mut self, value: u32) -> &mut Self {
        self.nesting_limit = value;
        self
    }
}

/// An object that hands out memory for a message as it is being built.
pub trait Allocator {
    /// Returns a zeroed buffer of at least `minimum_size` words.
    fn allocate_segment(&mut self, minimum_size: u32) -> Vec<Word>;
}

#[derive(Clone, Copy, Debug)]
pub enum AllocationStrategy {
    FixedSize,
    GrowHeuristically,
}

pub const SUGGESTED_FIRST_SEGMENT_WORDS: u32 = 1024;
pub const SUGGESTED_ALLOCATION_STRATEGY: AllocationStrategy = AllocationStrategy::GrowHeuristically;

/// The standard allocator: plain heap buffers whose sizes grow
/// geometrically from an initial floor.
#[derive(Debug)]
pub struct HeapAllocator {
    next_size: u32,
    allocation_strategy: AllocationStrategy,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self {
            next_size: SUGGESTED_FIRST_SEGMENT_WORDS,
            allocation_strategy: SUGGESTED_ALLOCATION_STRATEGY,
        }
    }

    pub fn first_segment_words(mut self, value: u32) -> Self {
        self.next_size = value;
        self
    }

    pub fn allocation_strategy(mut self, value: AllocationStrategy) -> Self {
        self.allocation_strategy = value;
        self
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for HeapAllocator {
    fn allocate_segment(&mut self, minimum_size: u32) -> Vec<Word> {
        let size = ::core::cmp::max(minimum_size, self.next_size);
        if let AllocationStrategy::GrowHeuristically = self.allocation_strategy {
            self.next_size += size;
        }
        vec![0; size as usize]
    }
}

/// A pointer resolved to the segment and offset where its target object's
/// words begin, along with the decoded shape pointer.
pub struct ResolvedObject {
    pub segment: Rc<Segment>,
    pub offset: u32,
    pub shape: WirePointer,
    pub is_far: bool,
}

/// An ordered collection of segments sharing one allocation policy and one
/// capability table.
///
/// Segment 0 holds the root pointer at word 0. Segment indices are stable
/// for the message's lifetime. A message is single-owner: the handles it
/// produces borrow it, and there is no internal synchronization.
pub struct Message {
    segments: RefCell<Vec<Rc<Segment>>>,
    allocator: RefCell<Box<dyn Allocator>>,
    limiter: ReadLimiter,
    nesting_limit: u32,
    caps: CapTable,
}

impl Message {
    pub fn new<A: Allocator + 'static>(allocator: A) -> Self {
        Self::with_options(allocator, MessageOptions::new())
    }

    pub fn new_default() -> Self {
        Self::new(HeapAllocator::new())
    }

    pub fn with_options<A: Allocator + 'static>(allocator: A, options: MessageOptions) -> Self {
        Self {
            segments: RefCell::new(Vec::new()),
            allocator: RefCell::new(Box::new(allocator)),
            limiter: ReadLimiter::new(options.traversal_limit_in_words),
            nesting_limit: options.nesting_limit,
            caps: CapTable::new(),
        }
    }

    /// Wraps buffers received from the wire. The segments are read-only;
    /// any segments grown later by writes remain writable.
    pub fn from_segments(segments: Vec<Vec<Word>>, options: MessageOptions) -> Self {
        let message = Self::with_options(HeapAllocator::new(), options);
        {
            let mut pool = message.segments.borrow_mut();
            for (id, words) in segments.into_iter().enumerate() {
                pool.push(Rc::new(Segment::import_read_only(id as SegmentId, words)));
            }
        }
        message
    }

    pub fn segment_count(&self) -> u32 {
        self.segments.borrow().len() as u32
    }

    pub fn segment(&self, id: SegmentId) -> Result<Rc<Segment>> {
        self.segments
            .borrow()
            .get(id as usize)
            .cloned()
            .ok_or(Error::InvalidSegmentId(id))
    }

    /// The message's capability table.
    pub fn local_caps(&self) -> &CapTable {
        &self.caps
    }

    /// An allocation context preferring wherever the message last grew.
    pub fn alloc_context(&self) -> AllocationContext<'_> {
        AllocationContext {
            message: self,
            preferred: Cell::new(self.segments.borrow().last().map(|s| s.id())),
        }
    }

    /// An allocation context pinned to a specific segment, for clustering a
    /// group of related allocations.
    pub fn alloc_context_in(&self, segment_id: SegmentId) -> AllocationContext<'_> {
        AllocationContext {
            message: self,
            preferred: Cell::new(Some(segment_id)),
        }
    }

    /// Places `words` words: first in the preferred segment, then in any
    /// segment with room, finally in a freshly grown one.
    pub fn allocate(&self, preferred: Option<SegmentId>, words: u32) -> (Rc<Segment>, u32) {
        if let Some(id) = preferred {
            if let Ok(segment) = self.segment(id) {
                if let Some(offset) = segment.try_allocate(words) {
                    return (segment, offset);
                }
            }
        }

        let pool: Vec<Rc<Segment>> = self.segments.borrow().clone();
        for segment in pool {
            if let Some(offset) = segment.try_allocate(words) {
                return (segment, offset);
            }
        }

        let segment = self.new_segment(words);
        let offset = segment
            .try_allocate(words)
            .expect("use freshly-allocated segment");
        (segment, offset)
    }

    fn new_segment(&self, minimum_size: u32) -> Rc<Segment> {
        let words = self.allocator.borrow_mut().allocate_segment(minimum_size);
        debug_assert!(words.len() as u64 >= u64::from(minimum_size));
        let id = self.segments.borrow().len() as SegmentId;
        let segment = Rc::new(Segment::new_owned(id, words));
        self.segments.borrow_mut().push(segment.clone());
        debug!(
            segment_id = id,
            capacity = segment.capacity(),
            "allocated new segment"
        );
        segment
    }

    /// Resolves a pointer at `ptr_pos` of `segment` to the segment and
    /// absolute word offset of its target object, following at most one far
    /// indirection chain. Charges the target's word count against the
    /// traversal budget; the far hop itself is free.
    pub fn traverse(&self, segment: &Rc<Segment>, ptr_pos: u32) -> Result<ResolvedObject> {
        let ptr = WirePointer::from_word(segment.get_word(ptr_pos));
        match ptr.kind() {
            WirePointerKind::Struct | WirePointerKind::List => {
                self.resolve_near(segment.clone(), ptr_pos, ptr, false)
            }
            WirePointerKind::Far => {
                let pad_segment = self.segment(ptr.far_segment_id())?;
                let pad_pos = ptr.far_offset();
                if !ptr.is_double_far() {
                    pad_segment.check_bounds(i64::from(pad_pos), 1)?;
                    let pad = WirePointer::from_word(pad_segment.get_word(pad_pos));
                    if !pad.is_positional() {
                        return Err(Error::MalformedPointer);
                    }
                    self.resolve_near(pad_segment, pad_pos, pad, true)
                } else {
                    //# The pad is two words: a single-far whose offset is
                    //# the absolute position of the object in the ultimate
                    //# segment, then the shape pointer with a zero offset.
                    pad_segment.check_bounds(i64::from(pad_pos), 2)?;
                    let far = WirePointer::from_word(pad_segment.get_word(pad_pos));
                    let shape = WirePointer::from_word(pad_segment.get_word(pad_pos + 1));
                    if far.kind() != WirePointerKind::Far
                        || far.is_double_far()
                        || !shape.is_positional()
                    {
                        return Err(Error::MalformedPointer);
                    }
                    let object_segment = self.segment(far.far_segment_id())?;
                    self.resolve_at(object_segment, i64::from(far.far_offset()), shape, true)
                }
            }
            WirePointerKind::Other => Err(Error::MalformedPointer),
        }
    }

    fn resolve_near(
        &self,
        segment: Rc<Segment>,
        ptr_pos: u32,
        shape: WirePointer,
        is_far: bool,
    ) -> Result<ResolvedObject> {
        let base = i64::from(ptr_pos) + 1 + i64::from(shape.word_offset());
        self.resolve_at(segment, base, shape, is_far)
    }

    fn resolve_at(
        &self,
        segment: Rc<Segment>,
        base: i64,
        shape: WirePointer,
        is_far: bool,
    ) -> Result<ResolvedObject> {
        let words = shape.target_word_count();
        segment.check_bounds(base, words)?;
        self.limiter.can_read(words)?;
        Ok(ResolvedObject {
            segment,
            offset: base as u32,
            shape,
            is_far,
        })
    }

    /// Charges `words` against the traversal budget without following a
    /// pointer, for objects that claim size without carrying data.
    pub(crate) fn charge(&self, words: u64) -> Result<()> {
        self.limiter.can_read(words)
    }

    pub(crate) fn nesting_limit(&self) -> u32 {
        self.nesting_limit
    }

    pub(crate) fn ensure_root_word(&self) -> Result<Rc<Segment>> {
        if self.segments.borrow().is_empty() {
            let segment = self.new_segment(1);
            segment.try_allocate(1).expect("allocate root pointer");
        }
        self.segment(0)
    }

    /// Allocates the root struct, overwriting any existing root pointer.
    pub fn init_root(&self, size: StructSize) -> Result<Struct<'_>> {
        let segment = self.ensure_root_word()?;
        segment.check_writable()?;
        let context = self.alloc_context();
        layout::init_struct_ptr(&context, &segment, 0, size)
    }

    /// Reads the root struct. A null root reads as an empty struct.
    pub fn root(&self) -> Result<Struct<'_>> {
        let segment = self.ensure_root_word()?;
        segment.check_bounds(0, 1)?;
        layout::read_struct_ptr(self, &segment, 0)
    }

    /// Points the root at a struct already allocated in this message.
    pub fn set_root(&self, target: &Struct<'_>) -> Result<()> {
        if !::core::ptr::eq(self, target.message()) {
            return Err(Error::CrossMessagePointer);
        }
        let segment = self.ensure_root_word()?;
        segment.check_writable()?;
        layout::write_struct_ref(self, &segment, 0, target)
    }
}

/// A scoped allocation cursor that clusters a group of related allocations
/// in one segment where possible, minimizing far pointers.
///
/// Acquired from the message and passed by reference to constructors that
/// may allocate; each placement updates the preference so children land
/// near their parent.
pub struct AllocationContext<'a> {
    message: &'a Message,
    preferred: Cell<Option<SegmentId>>,
}

impl<'a> AllocationContext<'a> {
    pub fn message(&self) -> &'a Message {
        self.message
    }

    pub fn preferred_segment(&self) -> Option<SegmentId> {
        self.preferred.get()
    }

    pub fn allocate(&self, words: u32) -> (Rc<Segment>, u32) {
        let (segment, offset) = self.message.allocate(self.preferred.get(), words);
        self.preferred.set(Some(segment.id()));
        (segment, offset)
    }
}
