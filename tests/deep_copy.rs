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

//! Deep copy between messages.

use std::rc::Rc;

use capwire::capability::CapabilityHandle;
use capwire::{Error, Message, MessageOptions, StructSize};

#[derive(Debug)]
struct TestCap;
impl CapabilityHandle for TestCap {}

#[test]
fn copy_carries_the_whole_tree() {
    let source = Message::new_default();
    let root = source.init_root(StructSize::new(1, 4)).unwrap();
    let context = source.alloc_context();

    root.set_data_field::<u32>(0, 2024).unwrap();

    let child = root
        .init_struct_field(0, StructSize::new(1, 1), &context)
        .unwrap();
    child.set_data_field::<i16>(0, -5).unwrap();
    child.set_text_field(0, "nested text", &context).unwrap();

    let numbers = root
        .init_primitive_list_field::<u32>(1, 3, &context)
        .unwrap();
    for (i, v) in [3u32, 1, 4].into_iter().enumerate() {
        numbers.set(i as u32, v).unwrap();
    }

    let people = root
        .init_struct_list_field(2, 2, StructSize::new(1, 0), &context)
        .unwrap();
    people.get(0).unwrap().set_data_field::<u8>(0, 10).unwrap();
    people.get(1).unwrap().set_data_field::<u8>(0, 20).unwrap();

    let cap: Rc<dyn CapabilityHandle> = Rc::new(TestCap);
    root.set_capability_field(3, &cap).unwrap();

    // Copy into a fresh message and make it the root there.
    let dest = Message::new_default();
    let copied = root.copy_to(&dest).unwrap();
    dest.set_root(&copied).unwrap();

    // Mutate the source afterward; the destination must not move.
    root.set_data_field::<u32>(0, 1).unwrap();
    numbers.set(0, 9).unwrap();
    people.get(0).unwrap().set_data_field::<u8>(0, 99).unwrap();

    let got = dest.root().unwrap();
    assert_eq!(got.get_data_field::<u32>(0), 2024);

    let got_child = got.get_struct_field(0).unwrap();
    assert_eq!(got_child.get_data_field::<i16>(0), -5);
    assert_eq!(
        got_child.get_text_field(0).unwrap().to_string().unwrap(),
        "nested text"
    );

    let got_numbers = got.get_primitive_list_field::<u32>(1).unwrap();
    assert_eq!(got_numbers.iter().collect::<Vec<_>>(), vec![3, 1, 4]);

    let got_people = got.get_struct_list_field(2).unwrap();
    assert_eq!(got_people.len(), 2);
    assert_eq!(got_people.get(0).unwrap().get_data_field::<u8>(0), 10);
    assert_eq!(got_people.get(1).unwrap().get_data_field::<u8>(0), 20);

    // The capability was re-interned in the destination's table.
    assert_eq!(dest.local_caps().len(), 1);
    let got_cap = got.get_capability_field(3).unwrap();
    assert!(Rc::ptr_eq(&got_cap, &cap));
}

#[test]
fn copy_into_own_message_returns_the_handle() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(1, 0)).unwrap();
    root.set_data_field::<u64>(0, 8).unwrap();

    let same = root.copy_to(&message).unwrap();
    assert_eq!(same.segment_id(), root.segment_id());
    assert_eq!(same.word_offset(), root.word_offset());
    assert_eq!(message.segment_count(), 1);
}

#[test]
fn copied_handles_cannot_be_linked_across_messages() {
    let source = Message::new_default();
    let root = source.init_root(StructSize::new(0, 1)).unwrap();

    let dest = Message::new_default();
    let copied = root.copy_to(&dest).unwrap();
    assert_eq!(
        root.set_struct_field(0, &copied),
        Err(Error::CrossMessagePointer)
    );
}

#[test]
fn copy_respects_the_source_traversal_limit() {
    let mut options = MessageOptions::new();
    options.traversal_limit_in_words(Some(4));
    let source = Message::with_options(capwire::HeapAllocator::new(), options);
    let root = source.init_root(StructSize::new(0, 1)).unwrap();
    let context = source.alloc_context();
    let child = root
        .init_struct_field(0, StructSize::new(4, 0), &context)
        .unwrap();
    child.set_data_field::<u64>(3, 1).unwrap();

    let dest = Message::new_default();
    // The four-word child plus pointer hops exceed the four-word budget
    // after the root itself was charged.
    source.root().unwrap();
    assert_eq!(root.copy_to(&dest).unwrap_err(), Error::TraversalLimitExceeded);
}

#[test]
fn zero_sized_composite_elements_copy_as_empty_structs() {
    let source = Message::new_default();
    let root = source.init_root(StructSize::new(0, 1)).unwrap();
    let context = source.alloc_context();
    root.init_struct_list_field(0, 5, StructSize::new(0, 0), &context)
        .unwrap();

    let dest = Message::new_default();
    let copied = root.copy_to(&dest).unwrap();
    dest.set_root(&copied).unwrap();

    let list = dest.root().unwrap().get_struct_list_field(0).unwrap();
    assert_eq!(list.len(), 5);
    assert!(list.get(4).unwrap().is_null());
}
