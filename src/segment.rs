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

//! A contiguous word buffer backing part of a message, with a bump
//! allocator over its free tail.

use core::cell::Cell;

use crate::units::WordCount32;
use crate::{Error, Result, Word};

pub type SegmentId = u32;

/// One segment of a message.
///
/// Words in `[0, used)` belong to some object; words in `[used, capacity)`
/// are zero. The buffer holds words in wire byte order, so viewed as bytes
/// it is exactly the unpacked encoding. Interior mutability keeps word
/// writes available through the shared handles that views hold.
pub struct Segment {
    id: SegmentId,
    words: Vec<Cell<Word>>,
    used: Cell<WordCount32>,
    writable: bool,
}

impl Segment {
    /// A writable segment over a fresh zeroed buffer.
    pub(crate) fn new_owned(id: SegmentId, words: Vec<Word>) -> Self {
        debug_assert!(words.iter().all(|&w| w == 0));
        Self {
            id,
            words: words.into_iter().map(Cell::new).collect(),
            used: Cell::new(0),
            writable: true,
        }
    }

    /// A read-only segment over an imported buffer, e.g. one received from
    /// the wire. The whole buffer counts as used.
    pub(crate) fn import_read_only(id: SegmentId, words: Vec<Word>) -> Self {
        let used = words.len() as WordCount32;
        Self {
            id,
            words: words.into_iter().map(|w| Cell::new(w.to_le())).collect(),
            used: Cell::new(used),
            writable: false,
        }
    }

    #[inline]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[inline]
    pub fn capacity(&self) -> WordCount32 {
        self.words.len() as WordCount32
    }

    /// The high-water mark: the boundary between allocated and free words.
    #[inline]
    pub fn used(&self) -> WordCount32 {
        self.used.get()
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Reads the word at `index`.
    ///
    /// Precondition: `index < capacity()`.
    #[inline]
    pub fn get_word(&self, index: u32) -> Word {
        Word::from_le(self.words[index as usize].get())
    }

    /// Writes the word at `index`.
    ///
    /// Precondition: `index < capacity()` and the segment is writable.
    #[inline]
    pub fn put_word(&self, index: u32, value: Word) {
        debug_assert!(self.writable);
        self.words[index as usize].set(value.to_le());
    }

    /// Advances `used` by `amount` words, returning the prior mark, iff the
    /// free tail is large enough.
    pub fn try_allocate(&self, amount: WordCount32) -> Option<WordCount32> {
        let used = self.used.get();
        if !self.writable || amount > self.capacity() - used {
            None
        } else {
            self.used.set(used + amount);
            Some(used)
        }
    }

    /// Rolls back `amount` words iff `end` is the current high-water mark,
    /// zeroing the reclaimed tail. Returns whether anything was reclaimed.
    pub fn try_reclaim(&self, end: WordCount32, amount: WordCount32) -> bool {
        if !self.writable || end != self.used.get() || amount > end {
            return false;
        }
        for index in end - amount..end {
            self.words[index as usize].set(0);
        }
        self.used.set(end - amount);
        true
    }

    /// Checks that `words` words starting at `offset` lie inside the
    /// segment.
    pub fn check_bounds(&self, offset: i64, words: u64) -> Result<()> {
        if offset >= 0 && offset.unsigned_abs() + words <= u64::from(self.capacity()) {
            Ok(())
        } else {
            Err(Error::SegmentOutOfRange {
                segment_id: self.id,
                index: offset.max(0) as u64 + words,
            })
        }
    }

    /// Fails unless the segment accepts writes.
    pub fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::ReadOnlySegment(self.id))
        }
    }

    /// Copies out the allocated prefix, e.g. for a stream serializer.
    pub fn used_words(&self) -> Vec<Word> {
        (0..self.used()).map(|i| self.get_word(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Segment;
    use crate::Error;

    fn segment(capacity: usize) -> Segment {
        Segment::new_owned(0, vec![0; capacity])
    }

    #[test]
    fn bump_allocation_advances_the_mark() {
        let seg = segment(8);
        assert_eq!(seg.try_allocate(3), Some(0));
        assert_eq!(seg.try_allocate(5), Some(3));
        assert_eq!(seg.used(), 8);
        assert_eq!(seg.try_allocate(1), None);
        assert_eq!(seg.try_allocate(0), Some(8));
    }

    #[test]
    fn reclaim_only_at_the_tail() {
        let seg = segment(8);
        seg.try_allocate(6).unwrap();
        seg.put_word(5, 0xdead_beef);

        assert!(!seg.try_reclaim(5, 2));
        assert!(seg.try_reclaim(6, 2));
        assert_eq!(seg.used(), 4);
        assert_eq!(seg.get_word(5), 0);
    }

    #[test]
    fn words_round_trip() {
        let seg = segment(2);
        seg.put_word(1, 0x0123_4567_89ab_cdef);
        assert_eq!(seg.get_word(1), 0x0123_4567_89ab_cdef);
        assert_eq!(seg.get_word(0), 0);
    }

    #[test]
    fn read_only_segments_reject_writes() {
        let seg = Segment::import_read_only(3, vec![7, 8]);
        assert_eq!(seg.used(), 2);
        assert_eq!(seg.get_word(0), 7);
        assert_eq!(seg.try_allocate(1), None);
        assert_eq!(seg.check_writable(), Err(Error::ReadOnlySegment(3)));
    }

    #[test]
    fn bounds_checks() {
        let seg = segment(4);
        assert!(seg.check_bounds(0, 4).is_ok());
        assert!(seg.check_bounds(4, 0).is_ok());
        assert!(seg.check_bounds(2, 3).is_err());
        assert!(seg.check_bounds(-1, 0).is_err());
    }
}
