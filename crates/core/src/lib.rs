// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register-mapped peripheral models for instruction-set simulators.
//!
//! Every peripheral exposes a word-granular register interface through the
//! [`Peripheral`] trait. Registers are described declaratively with the
//! [`register`] module and evaluated against the peripheral's private state,
//! which is guarded by a single instance-wide lock.

pub mod bus;
pub mod fifo;
pub mod interrupt;
pub mod metrics;
pub mod peripherals;
pub mod register;
pub mod signals;

use std::any::Any;
use std::sync::{Mutex, MutexGuard, PoisonError};


pub use signals::IrqLine;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid layout for register '{register}': {reason}")]
    Layout { register: String, reason: String },
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait representing a memory-mapped peripheral.
///
/// Accesses are whole 32-bit words at byte offsets relative to the
/// peripheral base. Misuse by the simulated driver (empty FIFO reads, writes
/// while disabled, unmapped offsets) never fails: the peripheral returns a
/// safe value and logs a diagnostic, as real hardware would.
pub trait Peripheral: std::fmt::Debug + Send + Sync {
    fn read(&self, offset: u64) -> u32;
    fn write(&self, offset: u64, value: u32);
    fn reset(&self);

    /// Size of the address window decoded by this peripheral, in bytes.
    fn size(&self) -> u64;

    fn tick(&self) {}

    /// Interrupt output, for peripherals that have one.
    fn interrupt_line(&self) -> Option<&IrqLine> {
        None
    }

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Acquire an instance lock, recovering the guard if a previous holder
/// panicked. Peripheral state is plain data and stays usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
