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

use core::cell::Cell;

use crate::{Error, Result};

/// A decrementing budget of words visited through pointer dereferences.
///
/// A message crafted so that many pointers target the same large object can
/// cost far more to traverse than its size on the wire; the budget bounds
/// that amplification.
pub struct ReadLimiter {
    limit: Cell<u64>,
    error_on_limit_exceeded: bool,
}

impl ReadLimiter {
    pub fn new(limit: Option<u64>) -> Self {
        match limit {
            Some(value) => Self {
                limit: Cell::new(value),
                error_on_limit_exceeded: true,
            },
            None => Self {
                limit: Cell::new(u64::MAX),
                error_on_limit_exceeded: false,
            },
        }
    }

    #[inline]
    pub fn can_read(&self, amount: u64) -> Result<()> {
        let current = self.limit.get();
        if amount > current && self.error_on_limit_exceeded {
            Err(Error::TraversalLimitExceeded)
        } else {
            self.limit.set(current.wrapping_sub(amount));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReadLimiter;
    use crate::Error;

    #[test]
    fn budget_runs_out() {
        let limiter = ReadLimiter::new(Some(10));
        assert!(limiter.can_read(6).is_ok());
        assert!(limiter.can_read(4).is_ok());
        assert_eq!(limiter.can_read(1), Err(Error::TraversalLimitExceeded));
    }

    #[test]
    fn unlimited_never_errors() {
        let limiter = ReadLimiter::new(None);
        assert!(limiter.can_read(u64::MAX).is_ok());
        assert!(limiter.can_read(u64::MAX).is_ok());
    }
}
