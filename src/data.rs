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

//! Raw bytes, stored as a byte list.

use std::rc::Rc;

use crate::layout::ListRef;
use crate::message::Message;
use crate::segment::Segment;
use crate::units::ElementCount32;
use crate::wire::ElementSize;
use crate::Result;

#[derive(Clone)]
pub struct Data<'a> {
    list: ListRef<'a>,
}

impl<'a> Data<'a> {
    pub(crate) fn new(list: ListRef<'a>) -> Self {
        Self { list }
    }

    pub(crate) fn empty(message: &'a Message, segment: Rc<Segment>) -> Self {
        Self {
            list: ListRef::empty(message, segment, ElementSize::Byte),
        }
    }

    pub fn len(&self) -> ElementCount32 {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, index: ElementCount32) -> Result<u8> {
        self.list.check_index(index)?;
        Ok(self.list.get_element_bits(index, 8) as u8)
    }

    pub fn set(&self, index: ElementCount32, value: u8) -> Result<()> {
        self.list.check_index(index)?;
        self.list.set_element_bits(index, 8, u64::from(value))
    }

    /// Copies the bytes out.
    pub fn to_vec(&self) -> Vec<u8> {
        (0..self.len())
            .map(|i| self.list.get_element_bits(i, 8) as u8)
            .collect()
    }
}

impl<'a> ::core::fmt::Debug for Data<'a> {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        write!(f, "{:?}", self.to_vec())
    }
}
