//! Dense identifier allocation with release-and-reuse.

use crate::error::ProtocolError;
use std::collections::BTreeSet;

/// Allocates small unsigned identifiers, reusing released ones lowest-first.
///
/// Identifiers start at 1 and never reach `limit`. An identifier is live from the
/// [`allocate`](IdPool::allocate) that issued it until its single matching
/// [`release`](IdPool::release); releasing it a second time is an error.
#[derive(Debug, Clone)]
pub struct IdPool {
    limit: u32,
    next: u32,
    released: BTreeSet<u32>,
}

impl IdPool {
    /// Creates a pool issuing ids in `1..limit`.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            next: 1,
            released: BTreeSet::new(),
        }
    }

    /// Issues an identifier that is not currently live.
    pub fn allocate(&mut self) -> Result<u32, ProtocolError> {
        if let Some(id) = self.released.pop_first() {
            return Ok(id);
        }
        if self.next >= self.limit {
            return Err(ProtocolError::PoolExhausted { limit: self.limit });
        }
        let id = self.next;
        self.next += 1;
        Ok(id)
    }

    /// Returns a live identifier to the pool.
    pub fn release(&mut self, id: u32) -> Result<(), ProtocolError> {
        if !self.is_allocated(id) {
            return Err(ProtocolError::NotAllocated(id));
        }
        if id + 1 == self.next {
            // Shrink the high-water mark, swallowing any released ids directly below it.
            self.next = id;
            while self.next > 1 && self.released.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else {
            self.released.insert(id);
        }
        Ok(())
    }

    /// Returns `true` while `id` is live.
    pub fn is_allocated(&self, id: u32) -> bool {
        id >= 1 && id < self.next && !self.released.contains(&id)
    }

    /// Number of live identifiers.
    pub fn in_use(&self) -> usize {
        (self.next - 1) as usize - self.released.len()
    }

    /// Forgets every allocation.
    pub fn reset(&mut self) {
        self.next = 1;
        self.released.clear();
    }
}
