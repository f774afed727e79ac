// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Recoverable access faults. None of these cross the peripheral boundary as
/// errors; they are logged and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// Dequeue from an empty receive path. The access returns 0.
    Underflow,
    /// Enqueue into a full path. The value is dropped.
    Overflow,
    /// Data access while the peripheral is disabled.
    DisabledAccess,
}

/// Per-instance fault tally.
///
/// Counters are diagnostics, not hardware state, so a peripheral reset does
/// not clear them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FaultCounters {
    pub underflows: u64,
    pub overflows: u64,
    pub disabled_accesses: u64,
}

impl FaultCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, peripheral: &str, fault: Fault, detail: &str) {
        match fault {
            Fault::Underflow => self.underflows += 1,
            Fault::Overflow => self.overflows += 1,
            Fault::DisabledAccess => self.disabled_accesses += 1,
        }
        tracing::warn!("{}: {:?}: {}", peripheral, fault, detail);
    }

    pub fn total(&self) -> u64 {
        self.underflows + self.overflows + self.disabled_accesses
    }
}
