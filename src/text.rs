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

//! UTF-8 encoded text, stored as a NUL-terminated byte list.

use std::rc::Rc;

use crate::layout::ListRef;
use crate::message::Message;
use crate::segment::Segment;
use crate::units::ElementCount32;
use crate::wire::ElementSize;
use crate::Result;

#[derive(Clone)]
pub struct Text<'a> {
    list: ListRef<'a>,
}

impl<'a> Text<'a> {
    pub(crate) fn new(list: ListRef<'a>) -> Self {
        Self { list }
    }

    pub(crate) fn empty(message: &'a Message, segment: Rc<Segment>) -> Self {
        Self {
            list: ListRef::empty(message, segment, ElementSize::Byte),
        }
    }

    /// The text's length in bytes, the NUL terminator excluded.
    pub fn len(&self) -> ElementCount32 {
        self.list.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte(&self, index: ElementCount32) -> Result<u8> {
        if index >= self.len() {
            return Err(crate::Error::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(self.list.get_element_bits(index, 8) as u8)
    }

    /// Copies the bytes out, terminator excluded.
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.len())
            .map(|i| self.list.get_element_bits(i, 8) as u8)
            .collect()
    }

    /// Copies the text out, checking that it is valid UTF-8.
    pub fn to_string(&self) -> ::core::result::Result<String, ::std::string::FromUtf8Error> {
        String::from_utf8(self.to_bytes())
    }
}

impl<'a> ::core::fmt::Debug for Text<'a> {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        match self.to_string() {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "<invalid utf-8: {:?}>", self.to_bytes()),
        }
    }
}
