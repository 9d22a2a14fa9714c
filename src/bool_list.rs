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

//! List of bits.

use crate::layout::ListRef;
use crate::units::ElementCount32;
use crate::Result;

#[derive(Clone)]
pub struct BoolList<'a> {
    list: ListRef<'a>,
}

impl<'a> BoolList<'a> {
    pub(crate) fn new(list: ListRef<'a>) -> Self {
        Self { list }
    }

    pub fn len(&self) -> ElementCount32 {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, index: ElementCount32) -> Result<bool> {
        self.list.check_index(index)?;
        Ok(self.list.get_element_bits(index, 1) != 0)
    }

    pub fn set(&self, index: ElementCount32, value: bool) -> Result<()> {
        self.list.check_index(index)?;
        self.list.set_element_bits(index, 1, u64::from(value))
    }

    pub fn iter(&self) -> Iter<'a> {
        Iter {
            list: self.clone(),
            index: 0,
        }
    }
}

pub struct Iter<'a> {
    list: BoolList<'a>,
    index: ElementCount32,
}

impl<'a> Iterator for Iter<'a> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.index < self.list.len() {
            let value = self.list.list.get_element_bits(self.index, 1) != 0;
            self.index += 1;
            Some(value)
        } else {
            None
        }
    }
}

impl<'a> ::core::fmt::Debug for BoolList<'a> {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.debug_struct("BoolList").field("list", &self.list).finish()
    }
}
