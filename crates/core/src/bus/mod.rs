// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::interrupt::InterruptState;
use crate::peripherals::gpio::GpioPort;
use crate::peripherals::spi::Spi;
use crate::peripherals::uart::Uart;
use crate::{Peripheral, SimResult, SimulationError};
use anyhow::Context;
use raptor_config::{parse_size, BoardDescriptor, PeripheralKind};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub irq: Option<u32>,
    pub dev: Arc<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}

/// Address decoder routing 32-bit accesses to attached peripherals.
#[derive(Debug)]
pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
    pub interrupts: Arc<InterruptState>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    pub fn new() -> Self {
        Self {
            peripherals: Vec::new(),
            interrupts: Arc::new(InterruptState::new()),
        }
    }

    /// Map `dev` at `base`. The window defaults to the peripheral's own size.
    /// When `irq` is given, the peripheral's interrupt line is routed to the
    /// bus interrupt controller.
    pub fn attach(
        &mut self,
        name: &str,
        base: u64,
        size: Option<u64>,
        irq: Option<u32>,
        dev: Arc<dyn Peripheral>,
    ) -> SimResult<()> {
        let size = size.unwrap_or_else(|| dev.size());
        if size == 0 {
            return Err(SimulationError::Configuration(format!(
                "peripheral '{}' has an empty address window",
                name
            )));
        }
        let end = base.checked_add(size).ok_or_else(|| {
            SimulationError::Configuration(format!(
                "peripheral '{}' window at {:#x} overflows the address space",
                name, base
            ))
        })?;
        if let Some(other) = self
            .peripherals
            .iter()
            .find(|p| base < p.base + p.size && p.base < end)
        {
            return Err(SimulationError::Configuration(format!(
                "peripheral '{}' at {:#x}..{:#x} overlaps '{}' at {:#x}..{:#x}",
                name,
                base,
                end,
                other.name,
                other.base,
                other.base + other.size
            )));
        }

        match (irq, dev.interrupt_line()) {
            (Some(irq), Some(line)) => line.connect(irq, self.interrupts.clone()),
            (Some(irq), None) => tracing::warn!(
                "{}: IRQ {} configured but peripheral has no interrupt output",
                name,
                irq
            ),
            _ => {}
        }

        tracing::info!("Mapped {} at {:#010x} (size {:#x})", name, base, size);
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            irq,
            dev,
        });
        Ok(())
    }

    pub fn from_config(board: &BoardDescriptor) -> anyhow::Result<Self> {
        board.validate()?;
        let mut bus = Self::new();

        for p_cfg in &board.peripherals {
            let dev: Arc<dyn Peripheral> = match p_cfg.r#type {
                PeripheralKind::Uart => Arc::new(
                    Uart::new(&p_cfg.id, &p_cfg.uart.clone().unwrap_or_default())
                        .with_context(|| format!("Failed to create UART '{}'", p_cfg.id))?,
                ),
                PeripheralKind::Spi => Arc::new(
                    Spi::new(&p_cfg.id, &p_cfg.spi.clone().unwrap_or_default())
                        .with_context(|| format!("Failed to create SPI '{}'", p_cfg.id))?,
                ),
                PeripheralKind::Gpio => Arc::new(
                    GpioPort::new(&p_cfg.id)
                        .with_context(|| format!("Failed to create GPIO '{}'", p_cfg.id))?,
                ),
            };

            let size = p_cfg
                .size
                .as_deref()
                .map(parse_size)
                .transpose()
                .with_context(|| format!("Invalid size for peripheral '{}'", p_cfg.id))?;

            bus.attach(&p_cfg.id, p_cfg.base_address, size, p_cfg.irq, dev)?;
        }

        tracing::info!(
            "Board '{}': {} peripherals mapped",
            board.name,
            bus.peripherals.len()
        );
        Ok(bus)
    }

    fn find(&self, addr: u64) -> SimResult<&PeripheralEntry> {
        self.peripherals
            .iter()
            .find(|p| p.contains(addr))
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    pub fn read_u32(&self, addr: u64) -> SimResult<u32> {
        let p = self.find(addr)?;
        Ok(p.dev.read(addr - p.base))
    }

    pub fn write_u32(&self, addr: u64, value: u32) -> SimResult<()> {
        let p = self.find(addr)?;
        p.dev.write(addr - p.base, value);
        Ok(())
    }

    pub fn reset(&self) {
        for p in &self.peripherals {
            p.dev.reset();
        }
    }

    pub fn tick(&self) {
        for p in &self.peripherals {
            p.dev.tick();
        }
    }

    pub fn peripheral(&self, name: &str) -> Option<&Arc<dyn Peripheral>> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.dev)
    }

    fn downcast<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripheral(name)?.as_any()?.downcast_ref::<T>()
    }

    pub fn uart(&self, name: &str) -> Option<&Uart> {
        self.downcast(name)
    }

    pub fn spi(&self, name: &str) -> Option<&Spi> {
        self.downcast(name)
    }

    pub fn gpio(&self, name: &str) -> Option<&GpioPort> {
        self.downcast(name)
    }

    /// Capture bytes transmitted by every UART on this bus into `sink`.
    pub fn attach_uart_tx_sink(&self, sink: Arc<Mutex<Vec<u8>>>) {
        for p in &self.peripherals {
            let Some(uart) = p.dev.as_any().and_then(|a| a.downcast_ref::<Uart>()) else {
                continue;
            };
            uart.set_sink(Some(sink.clone()));
        }
    }

    pub fn pending_irqs(&self) -> Vec<u32> {
        self.interrupts.pending_irqs()
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let peripherals: serde_json::Map<String, serde_json::Value> = self
            .peripherals
            .iter()
            .map(|p| (p.name.clone(), p.dev.snapshot()))
            .collect();
        serde_json::json!({
            "peripherals": peripherals,
            "pending_irqs": self.pending_irqs(),
        })
    }
}
