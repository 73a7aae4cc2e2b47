//! Newest-first walk over a fixed-capacity circular log.

use crate::error::{Result, SmartError};

/// How a log's "newest entry" index is numbered.
///
/// Most ATA logs document the field loosely; in practice the summary
/// error log, the self-test logs and the extended error log are 1-based
/// while the SCT temperature history is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBase {
    Zero,
    One,
}

/// Slot positions of a circular log, newest first. Iterating from the
/// back yields oldest first.
#[derive(Debug, Clone)]
pub struct CircularView {
    capacity: usize,
    newest:   usize,
    front:    usize,
    back:     usize,
}

impl CircularView {
    /// View `steps` slots back from `index`. Fails if `index` does not
    /// address a slot under the given numbering.
    pub fn new(log: &'static str, capacity: usize, index: usize, base: IndexBase, steps: usize) -> Result<Self> {
        let newest = match base {
            IndexBase::One if (1..=capacity).contains(&index) => index - 1,
            IndexBase::Zero if index < capacity => index,
            _ => {
                return Err(SmartError::decode(
                    log,
                    format!("index {} out of range (capacity {})", index, capacity),
                ))
            }
        };
        Ok(Self { capacity, newest, front: 0, back: steps.min(capacity) })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, step: usize) -> usize {
        (self.newest + self.capacity - step) % self.capacity
    }
}

impl Iterator for CircularView {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.front >= self.back {
            return None;
        }
        let slot = self.slot(self.front);
        self.front += 1;
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for CircularView {
    fn next_back(&mut self) -> Option<usize> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.slot(self.back))
    }
}

impl ExactSizeIterator for CircularView {}
