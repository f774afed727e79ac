// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FifoError {
    #[error("FIFO full ({capacity} entries), value dropped")]
    Overflow { capacity: usize },
    #[error("FIFO empty")]
    Underflow,
}

/// Bounded first-in-first-out queue of data symbols.
///
/// A rejected operation leaves the queue untouched.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Fifo<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T: Copy> Fifo<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn enqueue(&mut self, value: T) -> Result<(), FifoError> {
        if self.is_full() {
            return Err(FifoError::Overflow {
                capacity: self.capacity,
            });
        }
        self.items.push_back(value);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Result<T, FifoError> {
        self.items.pop_front().ok_or(FifoError::Underflow)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_leaves_queue_unchanged() {
        let mut fifo = Fifo::new(4);
        for b in 0..4u8 {
            fifo.enqueue(b).unwrap();
        }
        assert!(fifo.is_full());
        assert_eq!(fifo.enqueue(9), Err(FifoError::Overflow { capacity: 4 }));
        assert_eq!(fifo.len(), 4);
        assert_eq!(fifo.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_underflow_leaves_queue_unchanged() {
        let mut fifo: Fifo<u16> = Fifo::new(2);
        fifo.enqueue(0x1234).unwrap();
        assert_eq!(fifo.dequeue(), Ok(0x1234));
        assert_eq!(fifo.dequeue(), Err(FifoError::Underflow));
        assert_eq!(fifo.len(), 0);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_length_stays_in_bounds_for_mixed_sequence() {
        let mut fifo = Fifo::new(3);
        let mut model: VecDeque<u8> = VecDeque::new();
        // Deterministic pseudo-random mix of pushes and pops.
        let mut seed = 0x2545_F491u32;
        for i in 0..500u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 == 0 {
                let expected = model.pop_front();
                assert_eq!(fifo.dequeue().ok(), expected);
            } else {
                let v = i as u8;
                let accepted = fifo.enqueue(v).is_ok();
                assert_eq!(accepted, model.len() < 3);
                if accepted {
                    model.push_back(v);
                }
            }
            assert!(fifo.len() <= fifo.capacity());
            assert_eq!(fifo.len(), model.len());
            assert_eq!(fifo.iter().next(), model.front());
        }
    }

    #[test]
    fn test_clear() {
        let mut fifo = Fifo::new(2);
        fifo.enqueue(1u8).unwrap();
        fifo.clear();
        assert!(fifo.is_empty());
        assert_eq!(fifo.capacity(), 2);
    }
}
