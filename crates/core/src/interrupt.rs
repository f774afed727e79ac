// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};

/// Anything that observes peripheral interrupt lines.
///
/// The simulator's interrupt controller (PLIC, NVIC, a plain pending mask)
/// implements this and gets notified on every line level change.
pub trait InterruptController: Debug + Send + Sync {
    /// Signal the controller that an interrupt line has changed.
    fn set_interrupt_pending(&self, irq: u32, pending: bool);

    fn is_interrupt_pending(&self, irq: u32) -> bool;
}

const IRQ_WORDS: usize = 4;

/// Level-sensitive pending mask for up to 128 interrupt lines.
#[derive(Debug, Default)]
pub struct InterruptState {
    pending: [AtomicU32; IRQ_WORDS],
}

impl InterruptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// All currently pending interrupt numbers, ascending.
    pub fn pending_irqs(&self) -> Vec<u32> {
        let mut irqs = Vec::new();
        for (idx, word) in self.pending.iter().enumerate() {
            let mask = word.load(Ordering::SeqCst);
            for bit in 0..32 {
                if mask & (1 << bit) != 0 {
                    irqs.push(idx as u32 * 32 + bit);
                }
            }
        }
        irqs
    }

    fn slot(irq: u32) -> Option<(usize, u32)> {
        let idx = (irq / 32) as usize;
        (idx < IRQ_WORDS).then_some((idx, 1 << (irq % 32)))
    }
}

impl InterruptController for InterruptState {
    fn set_interrupt_pending(&self, irq: u32, pending: bool) {
        let Some((idx, bit)) = Self::slot(irq) else {
            tracing::warn!("IRQ {} out of range for interrupt controller", irq);
            return;
        };
        if pending {
            self.pending[idx].fetch_or(bit, Ordering::SeqCst);
        } else {
            self.pending[idx].fetch_and(!bit, Ordering::SeqCst);
        }
    }

    fn is_interrupt_pending(&self, irq: u32) -> bool {
        Self::slot(irq)
            .map(|(idx, bit)| self.pending[idx].load(Ordering::SeqCst) & bit != 0)
            .unwrap_or(false)
    }
}
