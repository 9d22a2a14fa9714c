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

//! Tail-truncation of unused trailing struct words.

use capwire::{HeapAllocator, Message, StructSize};

#[test]
fn trailing_zero_data_words_are_trimmed() {
    let message = Message::new(HeapAllocator::new().first_segment_words(16));
    let root = message.init_root(StructSize::new(4, 0)).unwrap();
    root.set_data_field::<u32>(0, 5).unwrap();

    let before_used = message.segment(0).unwrap().used();
    let compacted = root.compact(true).unwrap();

    assert_eq!(compacted.data_words(), 1);
    assert_eq!(compacted.get_data_field::<u32>(0), 5);
    // The struct sat at the segment's high-water mark, so the tail was
    // reclaimed outright.
    assert_eq!(message.segment(0).unwrap().used(), before_used - 3);
}

#[test]
fn surviving_pointers_are_shifted_and_reaimed() {
    let message = Message::new(HeapAllocator::new().first_segment_words(32));
    let root = message.init_root(StructSize::new(4, 2)).unwrap();
    let context = message.alloc_context();

    root.set_data_field::<u32>(0, 5).unwrap();
    let child = root
        .init_struct_field(0, StructSize::new(1, 0), &context)
        .unwrap();
    child.set_data_field::<u16>(0, 77).unwrap();
    // Pointer slot 1 stays null; data words 1..4 stay zero.

    let compacted = root.compact(false).unwrap();
    assert_eq!(compacted.data_words(), 1);
    assert_eq!(compacted.pointer_words(), 1);

    // Previously written values remain readable at their old indices.
    assert_eq!(compacted.get_data_field::<u32>(0), 5);
    let through = compacted.get_struct_field(0).unwrap();
    assert_eq!(through.word_offset(), child.word_offset());
    assert_eq!(through.get_data_field::<u16>(0), 77);
}

#[test]
fn data_only_compaction_keeps_null_pointer_words() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(2, 2)).unwrap();
    root.set_data_field::<u8>(0, 1).unwrap();

    let compacted = root.compact(true).unwrap();
    assert_eq!(compacted.data_words(), 1);
    assert_eq!(compacted.pointer_words(), 2);
    assert!(compacted.get_pointer_field(1).is_null());
}

#[test]
fn nothing_to_trim_returns_the_same_shape() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(2, 0)).unwrap();
    root.set_data_field::<u64>(1, 3).unwrap();

    let compacted = root.compact(false).unwrap();
    assert_eq!(compacted.data_words(), 2);
    assert_eq!(compacted.get_data_field::<u64>(1), 3);
}

#[test]
fn an_all_default_struct_compacts_to_nothing() {
    let message = Message::new(HeapAllocator::new().first_segment_words(8));
    let root = message.init_root(StructSize::new(3, 1)).unwrap();

    let compacted = root.compact(false).unwrap();
    assert_eq!(compacted.data_words(), 0);
    assert_eq!(compacted.pointer_words(), 0);
    assert!(compacted.is_null());
    assert_eq!(message.segment(0).unwrap().used(), 1);
}
