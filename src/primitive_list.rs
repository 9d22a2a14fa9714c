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

//! List of fixed-width primitives.

use core::marker::PhantomData;

use crate::field::FieldValue;
use crate::layout::ListRef;
use crate::units::ElementCount32;
use crate::wire::ElementSize;
use crate::Result;

/// The wire element size of a primitive type, by its bit width.
pub(crate) fn element_size_for<T: FieldValue>() -> ElementSize {
    match T::BITS {
        8 => ElementSize::Byte,
        16 => ElementSize::TwoBytes,
        32 => ElementSize::FourBytes,
        64 => ElementSize::EightBytes,
        _ => unreachable!("primitive fields are 8, 16, 32, or 64 bits wide"),
    }
}

#[derive(Clone)]
pub struct PrimitiveList<'a, T>
where
    T: FieldValue,
{
    list: ListRef<'a>,
    marker: PhantomData<T>,
}

impl<'a, T> PrimitiveList<'a, T>
where
    T: FieldValue,
{
    pub(crate) fn new(list: ListRef<'a>) -> Self {
        Self {
            list,
            marker: PhantomData,
        }
    }

    pub fn len(&self) -> ElementCount32 {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    fn value_at(&self, index: ElementCount32) -> T {
        T::from_bits(self.list.get_element_bits(index, T::BITS))
    }

    pub fn get(&self, index: ElementCount32) -> Result<T> {
        self.list.check_index(index)?;
        Ok(self.value_at(index))
    }

    pub fn set(&self, index: ElementCount32, value: T) -> Result<()> {
        self.list.check_index(index)?;
        self.list.set_element_bits(index, T::BITS, value.into_bits())
    }

    pub fn iter(&self) -> Iter<'a, T> {
        Iter {
            list: self.clone(),
            index: 0,
        }
    }
}

pub struct Iter<'a, T>
where
    T: FieldValue,
{
    list: PrimitiveList<'a, T>,
    index: ElementCount32,
}

impl<'a, T> Iterator for Iter<'a, T>
where
    T: FieldValue,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.index < self.list.len() {
            let value = self.list.value_at(self.index);
            self.index += 1;
            Some(value)
        } else {
            None
        }
    }
}

impl<'a, T> ::core::fmt::Debug for PrimitiveList<'a, T>
where
    T: FieldValue,
{
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.debug_struct("PrimitiveList").field("list", &self.list).finish()
    }
}
