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

//! Counting units of the wire format.

pub type BitCount32 = u32;
pub type BitCount64 = u64;

pub type ByteCount32 = u32;

pub type WordCount16 = u16;
pub type WordCount32 = u32;
pub type WordCount64 = u64;

pub type ElementCount32 = u32;

pub type PointerCount16 = u16;

pub const BITS_PER_BYTE: u32 = 8;
pub const BITS_PER_WORD: u32 = 64;
pub const BYTES_PER_WORD: u32 = 8;
pub const BITS_PER_POINTER: u32 = 64;
pub const POINTER_SIZE_IN_WORDS: u32 = 1;

/// Largest element count a list pointer can carry (29 bits).
pub const MAX_LIST_ELEMENTS: ElementCount32 = (1 << 29) - 1;

/// Largest payload word count a composite list pointer can carry (29 bits).
pub const MAX_COMPOSITE_WORDS: WordCount32 = (1 << 29) - 1;

#[inline]
pub fn round_bits_up_to_words(bits: BitCount64) -> WordCount32 {
    //# This code assumes 64-bit words.
    ((bits + 63) / (BITS_PER_WORD as u64)) as WordCount32
}

#[inline]
pub fn round_bytes_up_to_words(bytes: ByteCount32) -> WordCount32 {
    (bytes + 7) / BYTES_PER_WORD
}
