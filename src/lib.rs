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

//! The in-memory core of a Cap'n Proto message: segments of little-endian
//! 64-bit words, the four-kind pointer encoding that links objects across
//! them, and handle views that read and write structs and lists in place.
//!
//! The in-memory layout *is* the wire layout. A [`Message`] owns an ordered
//! pool of [`Segment`]s and grows it through an [`Allocator`] policy;
//! [`Struct`] and the list views are cheap non-owning handles into that
//! storage. Stream framing, schema compilation, and RPC live elsewhere and
//! consume this crate through message construction, pointer read/write, and
//! the per-message capability table.
//!
//! [`Segment`]: segment::Segment
//! [`Allocator`]: message::Allocator

pub mod bool_list;
pub mod capability;
pub mod data;
pub mod field;
pub mod layout;
pub mod message;
pub mod pointer_list;
pub mod primitive_list;
mod read_limiter;
pub mod segment;
pub mod struct_list;
pub mod text;
pub mod units;
pub mod wire;


pub use crate::layout::Struct;
pub use crate::message::{
    AllocationContext, AllocationStrategy, Allocator, HeapAllocator, Message, MessageOptions,
};
pub use crate::segment::SegmentId;
pub use crate::wire::{ElementSize, StructSize, WirePointer, WirePointerKind};

/// The atomic unit of the wire format: 8 bytes, little-endian.
///
/// A `Word` holds its value in wire byte order; conversion happens at the
/// segment boundary so that a segment's buffer viewed as bytes is exactly
/// the unpacked Cap'n Proto encoding.
pub type Word = u64;

/// Constructs a word from its wire bytes, in order of increasing address.
pub fn word(b0: u8, b1: u8, b2: u8, b3: u8, b4: u8, b5: u8, b6: u8, b7: u8) -> Word {
    u64::from_le_bytes([b0, b1, b2, b3, b4, b5, b6, b7])
}

/// Things that can go wrong while navigating or mutating a message.
///
/// Reads of missing fields are not errors; they produce defaults. Errors are
/// reserved for malformed wire data and for invalid writes, and invalid
/// writes leave message state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("word index {index} is out of bounds for segment {segment_id}")]
    SegmentOutOfRange { segment_id: SegmentId, index: u64 },

    #[error("message has no segment with id {0}")]
    InvalidSegmentId(SegmentId),

    #[error("pointer index {index} is out of bounds for a struct with {count} pointer words")]
    PointerIndexOutOfRange { index: u16, count: u16 },

    #[error("write of a non-default value beyond the struct's allocated words")]
    ShortStruct,

    #[error("struct was synthesized from a list element; only field 0 is addressable")]
    UpgradedListElement,

    #[error("pointer kind combination is not allowed on the wire")]
    MalformedPointer,

    #[error("list size overflows the wire encoding")]
    OversizedList,

    #[error("traversal limit exceeded")]
    TraversalLimitExceeded,

    #[error("index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: u32, len: u32 },

    #[error("'other' pointer does not carry a recognized subtype")]
    UnsupportedOtherPointer,

    #[error("pointer target belongs to a different message")]
    CrossMessagePointer,

    #[error("segment {0} is backed by read-only memory")]
    ReadOnlySegment(SegmentId),

    #[error("message is too deeply nested")]
    NestingLimitExceeded,

    #[error("text is not NUL-terminated")]
    TextNotNulTerminated,
}

pub type Result<T> = ::core::result::Result<T, Error>;
