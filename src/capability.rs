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

//! The per-message capability table.
//!
//! Capabilities are opaque to the core: an external RPC layer supplies the
//! handle type, and "other" pointers reference handles by index into the
//! message's table.

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

/// An opaque handle to a live capability.
///
/// The core compares handles by allocation identity when interning, so two
/// writes of the same `Rc` land on the same table index.
pub trait CapabilityHandle: fmt::Debug {}

/// An append-only list of capability handles referenced by index.
///
/// Entries are never removed for the message's lifetime; removal would
/// shift indices and invalidate pointers already written.
#[derive(Default)]
pub struct CapTable {
    hooks: RefCell<Vec<Rc<dyn CapabilityHandle>>>,
}

impl CapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hooks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: u32) -> Option<Rc<dyn CapabilityHandle>> {
        self.hooks.borrow().get(index as usize).cloned()
    }

    /// Returns the index of `hook`, appending it if the table does not hold
    /// it yet.
    pub fn intern(&self, hook: &Rc<dyn CapabilityHandle>) -> u32 {
        let mut hooks = self.hooks.borrow_mut();
        for (index, existing) in hooks.iter().enumerate() {
            if Rc::ptr_eq(existing, hook) {
                return index as u32;
            }
        }
        hooks.push(hook.clone());
        (hooks.len() - 1) as u32
    }
}
