// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::interrupt::InterruptController;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

#[derive(Debug)]
struct Connection {
    irq: u32,
    controller: Arc<dyn InterruptController>,
}

/// Interrupt output of a peripheral.
///
/// The level is owned by the peripheral and recomputed from its state after
/// every access; it cannot be set from outside the crate. Every level change
/// is forwarded to the connected interrupt controller, if any.
#[derive(Debug, Default)]
pub struct IrqLine {
    asserted: AtomicBool,
    connection: Mutex<Option<Connection>>,
}

impl IrqLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this line to `irq` on `controller`. The current level is
    /// propagated immediately.
    pub fn connect(&self, irq: u32, controller: Arc<dyn InterruptController>) {
        controller.set_interrupt_pending(irq, self.is_asserted());
        *crate::lock(&self.connection) = Some(Connection { irq, controller });
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, level: bool) {
        let previous = self.asserted.swap(level, Ordering::SeqCst);
        if previous == level {
            return;
        }
        tracing::trace!("IRQ line {}", if level { "asserted" } else { "cleared" });
        if let Some(conn) = crate::lock(&self.connection).as_ref() {
            conn.controller.set_interrupt_pending(conn.irq, level);
        }
    }
}
