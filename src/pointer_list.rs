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

//! List of raw pointer slots.

use crate::layout::{self, ListRef, Struct};
use crate::message::AllocationContext;
use crate::text::Text;
use crate::units::ElementCount32;
use crate::wire::{StructSize, WirePointer};
use crate::{Error, Result};

#[derive(Clone)]
pub struct PointerList<'a> {
    list: ListRef<'a>,
}

impl<'a> PointerList<'a> {
    pub(crate) fn new(list: ListRef<'a>) -> Self {
        Self { list }
    }

    pub fn len(&self) -> ElementCount32 {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    fn element_pos(&self, index: ElementCount32) -> Result<u32> {
        self.list.check_index(index)?;
        self.list.pointer_pos(index).ok_or(Error::MalformedPointer)
    }

    fn check_context(&self, context: &AllocationContext<'_>) -> Result<()> {
        if ::core::ptr::eq(self.list.message(), context.message()) {
            Ok(())
        } else {
            Err(Error::CrossMessagePointer)
        }
    }

    /// The raw pointer word of element `index`.
    pub fn get_raw(&self, index: ElementCount32) -> Result<WirePointer> {
        let pos = self.element_pos(index)?;
        Ok(WirePointer::from_word(self.list.segment().get_word(pos)))
    }

    pub fn get_struct(&self, index: ElementCount32) -> Result<Struct<'a>> {
        let pos = self.element_pos(index)?;
        layout::read_struct_ptr(self.list.message(), self.list.segment(), pos)
    }

    pub fn init_struct(
        &self,
        index: ElementCount32,
        size: StructSize,
        context: &AllocationContext<'a>,
    ) -> Result<Struct<'a>> {
        self.check_context(context)?;
        let pos = self.element_pos(index)?;
        self.list.segment().check_writable()?;
        layout::init_struct_ptr(context, self.list.segment(), pos, size)
    }

    pub fn set_struct(&self, index: ElementCount32, target: &Struct<'_>) -> Result<()> {
        if !::core::ptr::eq(self.list.message(), target.message()) {
            return Err(Error::CrossMessagePointer);
        }
        let pos = self.element_pos(index)?;
        self.list.segment().check_writable()?;
        layout::write_struct_ref(self.list.message(), self.list.segment(), pos, target)
    }

    pub fn get_text(&self, index: ElementCount32) -> Result<Text<'a>> {
        let pos = self.element_pos(index)?;
        layout::read_text_ptr(self.list.message(), self.list.segment(), pos)
    }

    pub fn set_text(
        &self,
        index: ElementCount32,
        value: &str,
        context: &AllocationContext<'a>,
    ) -> Result<Text<'a>> {
        self.check_context(context)?;
        let pos = self.element_pos(index)?;
        self.list.segment().check_writable()?;
        layout::set_text_ptr(context, self.list.segment(), pos, value)
    }
}

impl<'a> ::core::fmt::Debug for PointerList<'a> {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.debug_struct("PointerList").field("list", &self.list).finish()
    }
}
