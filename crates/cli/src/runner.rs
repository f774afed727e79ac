// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use raptor_config::{AccessScript, AccessStep};
use raptor_core::bus::SystemBus;
use raptor_core::signals::DigitalLevel;
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadRecord {
    pub step: usize,
    pub address: u64,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionFailure {
    pub step: usize,
    pub address: u64,
    pub expected: u32,
    pub actual: u32,
    pub mask: u32,
}

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub steps_executed: usize,
    pub reads: Vec<ReadRecord>,
    pub failures: Vec<AssertionFailure>,
    pub uart_tx: String,
    pub pending_irqs: Vec<u32>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Execute every step of `script` against `bus`.
///
/// Failed `expect` steps are collected in the report and do not stop the run.
/// Bus faults and references to unknown peripherals abort it.
pub fn execute(bus: &SystemBus, script: &AccessScript) -> anyhow::Result<RunReport> {
    let uart_tx = Arc::new(Mutex::new(Vec::new()));
    bus.attach_uart_tx_sink(uart_tx.clone());

    let mut report = RunReport::default();
    for (step, action) in script.steps.iter().enumerate() {
        tracing::debug!("step {}: {:?}", step, action);
        match action {
            AccessStep::Write { address, value } => {
                bus.write_u32(*address, *value)
                    .with_context(|| format!("step {}: write to {:#x}", step, address))?;
            }
            AccessStep::Read { address } => {
                let value = bus
                    .read_u32(*address)
                    .with_context(|| format!("step {}: read from {:#x}", step, address))?;
                report.reads.push(ReadRecord {
                    step,
                    address: *address,
                    value,
                });
            }
            AccessStep::Expect {
                address,
                value,
                mask,
            } => {
                let mask = mask.unwrap_or(u32::MAX);
                let actual = bus
                    .read_u32(*address)
                    .with_context(|| format!("step {}: read from {:#x}", step, address))?;
                if actual & mask != value & mask {
                    tracing::error!(
                        "step {}: expected {:#010x} at {:#x} (mask {:#010x}), got {:#010x}",
                        step,
                        value,
                        address,
                        mask,
                        actual
                    );
                    report.failures.push(AssertionFailure {
                        step,
                        address: *address,
                        expected: *value,
                        actual,
                        mask,
                    });
                }
            }
            AccessStep::InjectUart { peripheral, data } => {
                let uart = bus.uart(peripheral).ok_or_else(|| {
                    anyhow::anyhow!("step {}: no UART named '{}'", step, peripheral)
                })?;
                uart.receive_bytes(data.as_bytes());
            }
            AccessStep::DrivePin {
                peripheral,
                pin,
                high,
            } => {
                let gpio = bus.gpio(peripheral).ok_or_else(|| {
                    anyhow::anyhow!("step {}: no GPIO port named '{}'", step, peripheral)
                })?;
                gpio.set_input(*pin, DigitalLevel::from(*high))
                    .with_context(|| format!("step {}: drive pin {}", step, pin))?;
            }
            AccessStep::Tick { count } => {
                for _ in 0..*count {
                    bus.tick();
                }
            }
            AccessStep::Reset => bus.reset(),
        }
        report.steps_executed += 1;
    }

    report.uart_tx = match uart_tx.lock() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    };
    report.pending_irqs = bus.pending_irqs();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raptor_config::BoardDescriptor;

    const BOARD: &str = r#"
schema_version: "1.0"
name: "runner-board"
peripherals:
  - id: "gpio0"
    type: "gpio"
    base_address: 0x1000
  - id: "uart0"
    type: "uart"
    base_address: 0x100000
    irq: 5
"#;

    fn bus() -> SystemBus {
        let board = BoardDescriptor::from_yaml(BOARD).unwrap();
        SystemBus::from_config(&board).unwrap()
    }

    #[test]
    fn test_passing_script() {
        let script = AccessScript::from_yaml(
            r#"
schema_version: "1.0"
steps:
  - write: { address: 0x1004, value: 0x1 }
  - drive_pin: { peripheral: "gpio0", pin: 0, high: true }
  - expect: { address: 0x1000, value: 0x1, mask: 0xFFFF }
  - write: { address: 0x100000, value: 0x41 }
  - inject_uart: { peripheral: "uart0", data: "z" }
  - read: { address: 0x100004 }
  - inject_uart: { peripheral: "uart0", data: "q" }
"#,
        )
        .unwrap();
        let report = execute(&bus(), &script).unwrap();
        assert!(report.passed());
        assert_eq!(report.steps_executed, 7);
        assert_eq!(
            report.reads,
            vec![ReadRecord {
                step: 5,
                address: 0x100004,
                value: b'z' as u32
            }]
        );
        assert_eq!(report.uart_tx, "A");
        assert_eq!(report.pending_irqs, vec![5]);
    }

    #[test]
    fn test_failed_expectation_is_reported() {
        let script = AccessScript::from_yaml(
            r#"
schema_version: "1.0"
steps:
  - expect: { address: 0x1004, value: 0x0 }
  - reset
"#,
        )
        .unwrap();
        let report = execute(&bus(), &script).unwrap();
        assert!(!report.passed());
        assert_eq!(report.steps_executed, 2);
        assert_eq!(
            report.failures,
            vec![AssertionFailure {
                step: 0,
                address: 0x1004,
                expected: 0,
                actual: 0xFFFF,
                mask: u32::MAX
            }]
        );
    }

    #[test]
    fn test_unknown_peripheral_aborts() {
        let script = AccessScript::from_yaml(
            r#"
schema_version: "1.0"
steps:
  - inject_uart: { peripheral: "gpio0", data: "x" }
"#,
        )
        .unwrap();
        let err = execute(&bus(), &script).unwrap_err();
        assert!(err.to_string().contains("no UART named 'gpio0'"));
    }

    #[test]
    fn test_unmapped_address_aborts() {
        let script = AccessScript::from_yaml(
            r#"
schema_version: "1.0"
steps:
  - tick: { count: 3 }
  - read: { address: 0x9000 }
"#,
        )
        .unwrap();
        let err = execute(&bus(), &script).unwrap_err();
        assert!(format!("{:#}", err).contains("Memory access violation"));
    }
}
