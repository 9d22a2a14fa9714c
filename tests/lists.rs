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

//! List views: primitives, bits, text, data, pointers, and composites.

use capwire::{Error, Message, StructSize};

#[test]
fn primitive_lists_round_trip() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 3)).unwrap();
    let context = message.alloc_context();

    let bytes = root.init_primitive_list_field::<u8>(0, 5, &context).unwrap();
    let shorts = root
        .init_primitive_list_field::<i16>(1, 3, &context)
        .unwrap();
    let floats = root
        .init_primitive_list_field::<f64>(2, 2, &context)
        .unwrap();

    for i in 0..5 {
        bytes.set(i, (i as u8) * 3).unwrap();
    }
    shorts.set(0, -1).unwrap();
    shorts.set(2, 300).unwrap();
    floats.set(1, 6.75).unwrap();

    let bytes = root.get_primitive_list_field::<u8>(0).unwrap();
    assert_eq!(bytes.len(), 5);
    assert_eq!(bytes.iter().collect::<Vec<_>>(), vec![0, 3, 6, 9, 12]);

    let shorts = root.get_primitive_list_field::<i16>(1).unwrap();
    assert_eq!(shorts.get(0).unwrap(), -1);
    assert_eq!(shorts.get(1).unwrap(), 0);
    assert_eq!(shorts.get(2).unwrap(), 300);

    let floats = root.get_primitive_list_field::<f64>(2).unwrap();
    assert_eq!(floats.get(0).unwrap(), 0.0);
    assert_eq!(floats.get(1).unwrap(), 6.75);

    assert_eq!(
        bytes.get(5),
        Err(Error::IndexOutOfRange { index: 5, len: 5 })
    );
    assert_eq!(
        shorts.set(3, 1),
        Err(Error::IndexOutOfRange { index: 3, len: 3 })
    );
}

#[test]
fn bool_lists_pack_one_bit_per_element() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let bits = root.init_bool_list_field(0, 70, &context).unwrap();
    bits.set(0, true).unwrap();
    bits.set(64, true).unwrap();
    bits.set(69, true).unwrap();

    let bits = root.get_bool_list_field(0).unwrap();
    assert_eq!(bits.len(), 70);
    assert!(bits.get(0).unwrap());
    assert!(!bits.get(1).unwrap());
    assert!(bits.get(64).unwrap());
    assert!(bits.get(69).unwrap());
    assert_eq!(bits.iter().filter(|&b| b).count(), 3);
}

#[test]
fn null_list_fields_read_as_empty() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();

    assert!(root.get_primitive_list_field::<u32>(0).unwrap().is_empty());
    assert!(root.get_bool_list_field(0).unwrap().is_empty());
    assert!(root.get_struct_list_field(0).unwrap().is_empty());
    assert!(root.get_text_field(0).unwrap().is_empty());
    assert!(root.get_data_blob(0).unwrap().is_empty());
}

#[test]
fn text_round_trips_with_nul_terminator() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let text = root
        .set_text_field(0, "Hello, Wörld!", &context)
        .unwrap();
    assert_eq!(text.len(), "Hello, Wörld!".len() as u32);

    let text = root.get_text_field(0).unwrap();
    assert_eq!(text.to_string().unwrap(), "Hello, Wörld!");

    // The stored element count includes the NUL terminator.
    let raw = root.get_pointer_field(0);
    assert_eq!(
        raw.list_element_count(),
        "Hello, Wörld!".len() as u32 + 1
    );
}

#[test]
fn data_blobs_are_byte_addressable() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let blob = root
        .set_data_blob(0, &[0xde, 0xad, 0xbe, 0xef], &context)
        .unwrap();
    assert_eq!(blob.len(), 4);
    blob.set(1, 0x00).unwrap();

    let blob = root.get_data_blob(0).unwrap();
    assert_eq!(blob.to_vec(), vec![0xde, 0x00, 0xbe, 0xef]);
    assert_eq!(blob.get(3).unwrap(), 0xef);
    assert_eq!(
        blob.get(4),
        Err(Error::IndexOutOfRange { index: 4, len: 4 })
    );
}

#[test]
fn composite_lists_share_the_tag_shape() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let list = root
        .init_struct_list_field(0, 3, StructSize::new(1, 1), &context)
        .unwrap();
    for (i, (n, name)) in [(12u32, "alice"), (34, "bob"), (56, "carol")]
        .into_iter()
        .enumerate()
    {
        let element = list.get(i as u32).unwrap();
        element.set_data_field::<u32>(0, n).unwrap();
        element.set_text_field(0, name, &context).unwrap();
    }

    let list = root.get_struct_list_field(0).unwrap();
    assert_eq!(list.len(), 3);
    let names: Vec<String> = list
        .iter()
        .map(|e| e.get_text_field(0).unwrap().to_string().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
    assert_eq!(list.get(2).unwrap().get_data_field::<u32>(0), 56);

    assert_eq!(
        list.get(3).unwrap_err(),
        Error::IndexOutOfRange { index: 3, len: 3 }
    );
}

#[test]
fn pointer_lists_hold_independent_objects() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let list = root.init_pointer_list_field(0, 2, &context).unwrap();
    let first = list
        .init_struct(0, StructSize::new(1, 0), &context)
        .unwrap();
    first.set_data_field::<u64>(0, 41).unwrap();
    list.set_text(1, "second", &context).unwrap();

    let list = root.get_pointer_list_field(0).unwrap();
    assert_eq!(list.get_struct(0).unwrap().get_data_field::<u64>(0), 41);
    assert_eq!(list.get_text(1).unwrap().to_string().unwrap(), "second");
    assert!(!list.get_raw(0).unwrap().is_null());
}

#[test]
fn a_primitive_list_reads_as_upgraded_struct_elements() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let numbers = root
        .init_primitive_list_field::<u32>(0, 4, &context)
        .unwrap();
    for (i, v) in [10u32, 20, 30, 40].into_iter().enumerate() {
        numbers.set(i as u32, v).unwrap();
    }

    // Reinterpret as a struct list: each element is promoted to a struct
    // whose field 0 holds the element value.
    let upgraded = root.get_struct_list_field(0).unwrap();
    assert_eq!(upgraded.len(), 4);
    let element = upgraded.get(1).unwrap();
    assert_eq!(element.get_data_field::<u32>(0), 20);

    // Only field index 0 is addressable on the synthesized struct.
    assert_eq!(element.get_data_field::<u32>(1), 0);
    assert_eq!(
        element.set_data_field::<u32>(1, 9),
        Err(Error::UpgradedListElement)
    );
    assert!(element.get_pointer_field(0).is_null());
    assert!(element.get_struct_field(0).unwrap().is_null());
    assert_eq!(
        element.set_struct_field(0, &root),
        Err(Error::UpgradedListElement)
    );

    // Writes through field 0 land in the list.
    element.set_data_field::<u32>(0, 99).unwrap();
    assert_eq!(numbers.get(1).unwrap(), 99);
}

#[test]
fn an_eight_byte_list_upgrades_without_a_byte_offset() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let numbers = root
        .init_primitive_list_field::<u64>(0, 2, &context)
        .unwrap();
    numbers.set(1, 0x1234).unwrap();

    let upgraded = root.get_struct_list_field(0).unwrap();
    let element = upgraded.get(1).unwrap();
    assert_eq!(element.data_words(), 1);
    assert_eq!(element.get_data_field::<u64>(0), 0x1234);
}

#[test]
fn a_composite_list_reads_back_as_a_primitive_list() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    let list = root
        .init_struct_list_field(0, 2, StructSize::new(1, 0), &context)
        .unwrap();
    list.get(0).unwrap().set_data_field::<u32>(0, 7).unwrap();
    list.get(1).unwrap().set_data_field::<u32>(0, 8).unwrap();

    // The schema evolved from List(UInt32) to a struct list; old readers
    // still see field 0 of each element.
    let numbers = root.get_primitive_list_field::<u32>(0).unwrap();
    assert_eq!(numbers.get(0).unwrap(), 7);
    assert_eq!(numbers.get(1).unwrap(), 8);
}

#[test]
fn oversized_lists_are_rejected_before_allocation() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();

    assert_eq!(
        root.init_primitive_list_field::<u8>(0, 1 << 29, &context)
            .unwrap_err(),
        Error::OversizedList
    );
    assert_eq!(
        root.init_struct_list_field(0, 1 << 28, StructSize::new(4, 0), &context)
            .unwrap_err(),
        Error::OversizedList
    );
    // Nothing was allocated beyond the root.
    assert_eq!(message.segment(0).unwrap().used(), 2);
}

#[test]
fn bit_lists_do_not_upgrade_to_structs() {
    let message = Message::new_default();
    let root = message.init_root(StructSize::new(0, 1)).unwrap();
    let context = message.alloc_context();
    root.init_bool_list_field(0, 3, &context).unwrap();

    assert_eq!(
        root.get_struct_list_field(0).unwrap_err(),
        Error::MalformedPointer
    );
}
