// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! FIFO-backed UART, 8 data bits, 1 stop bit, no parity.
//!
//! The interrupt policy is fixed at construction:
//!
//! * [`InterruptPolicy::Level`]: transmission is instantaneous, the IRQ is
//!   high while the receive FIFO holds data.
//! * [`InterruptPolicy::Watermark`]: transmit data is queued in a bounded
//!   FIFO drained one byte per tick while `TXEN` is set; the IRQ is the OR
//!   of the enabled watermark sources.

use crate::fifo::Fifo;
use crate::metrics::{Fault, FaultCounters};
use crate::register::{Access, BitField, Register, RegisterFile};
use crate::signals::IrqLine;
use crate::{SimResult, SimulationError};
use bitflags::bitflags;
use raptor_config::{InterruptPolicy, UartConfig};
use std::any::Any;
use std::sync::{Arc, Mutex};

pub const TRANSMIT_DATA: u64 = 0x00;
pub const RECEIVE_DATA: u64 = 0x04;
pub const TXCTRL: u64 = 0x08;
pub const RXCTRL: u64 = 0x0C;
pub const IE: u64 = 0x10;
pub const IP: u64 = 0x14;

/// Status bit shared by `TRANSMIT_DATA` (FULL) and `RECEIVE_DATA` (EMPTY).
pub const STATUS_BIT: u32 = 1 << 31;

/// Fixed baud generator divisor: 163 clock cycles per sample, 16 samples per bit.
pub const BAUD_DIVISOR: u32 = 163 * 16;

const WINDOW_SIZE: u64 = 0x10_0000;

bitflags! {
    /// Watermark interrupt sources, as laid out in `IE` and `IP`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UartInterrupts: u32 {
        const TXWM = 1 << 0;
        const RXWM = 1 << 1;
    }
}

#[derive(Debug)]
struct UartState {
    name: String,
    policy: InterruptPolicy,
    tx: Fifo<u8>,
    rx: Fifo<u8>,
    tx_enabled: bool,
    rx_enabled: bool,
    tx_watermark: u32,
    rx_watermark: u32,
    enabled_irqs: UartInterrupts,
    faults: FaultCounters,
    sink: Option<Arc<Mutex<Vec<u8>>>>,
}

impl UartState {
    fn emit(&mut self, byte: u8) {
        tracing::trace!("{}: TX {:#04x} {:?}", self.name, byte, byte as char);
        if let Some(sink) = &self.sink {
            if let Ok(mut guard) = sink.lock() {
                guard.push(byte);
            }
        }
    }

    /// Watermark conditions, recomputed from FIFO occupancy on every call.
    fn pending(&self) -> UartInterrupts {
        let mut pending = UartInterrupts::empty();
        if (self.tx.len() as u32) < self.tx_watermark {
            pending |= UartInterrupts::TXWM;
        }
        if (self.rx.len() as u32) > self.rx_watermark {
            pending |= UartInterrupts::RXWM;
        }
        pending
    }

    fn irq_level(&self) -> bool {
        match self.policy {
            InterruptPolicy::Level => !self.rx.is_empty(),
            InterruptPolicy::Watermark => self.pending().intersects(self.enabled_irqs),
        }
    }

    fn accepts_rx(&self) -> bool {
        match self.policy {
            InterruptPolicy::Level => true,
            InterruptPolicy::Watermark => self.rx_enabled,
        }
    }

    fn receive(&mut self, byte: u8) {
        if !self.accepts_rx() {
            self.faults.record(
                &self.name,
                Fault::DisabledAccess,
                "byte received while RXEN is clear, dropped",
            );
            return;
        }
        if let Err(e) = self.rx.enqueue(byte) {
            self.faults.record(&self.name, Fault::Overflow, &e.to_string());
        }
    }

    fn tick(&mut self) {
        if self.policy != InterruptPolicy::Watermark || !self.tx_enabled {
            return;
        }
        if let Ok(byte) = self.tx.dequeue() {
            self.emit(byte);
        }
    }

    fn clear(&mut self) {
        self.tx.clear();
        self.rx.clear();
        self.tx_enabled = false;
        self.rx_enabled = false;
        self.tx_watermark = 0;
        self.rx_watermark = 0;
        self.enabled_irqs = UartInterrupts::empty();
    }
}

fn write_txdata(s: &mut UartState, value: u32) {
    let byte = value as u8;
    match s.policy {
        InterruptPolicy::Level => s.emit(byte),
        InterruptPolicy::Watermark => {
            if let Err(e) = s.tx.enqueue(byte) {
                s.faults.record(&s.name, Fault::Overflow, &e.to_string());
            }
        }
    }
}

fn read_full(s: &mut UartState) -> u32 {
    match s.policy {
        InterruptPolicy::Level => 0,
        InterruptPolicy::Watermark => s.tx.is_full() as u32,
    }
}

fn read_empty(s: &mut UartState) -> u32 {
    s.rx.is_empty() as u32
}

fn read_rxdata(s: &mut UartState) -> u32 {
    match s.rx.dequeue() {
        Ok(byte) => byte as u32,
        Err(e) => {
            s.faults.record(&s.name, Fault::Underflow, &e.to_string());
            0
        }
    }
}

fn write_txen(s: &mut UartState, value: u32) {
    s.tx_enabled = value != 0;
}

fn write_txcnt(s: &mut UartState, value: u32) {
    s.tx_watermark = value;
}

fn write_rxen(s: &mut UartState, value: u32) {
    s.rx_enabled = value != 0;
}

fn write_rxcnt(s: &mut UartState, value: u32) {
    s.rx_watermark = value;
}

fn write_ie(s: &mut UartState, value: u32) {
    s.enabled_irqs = UartInterrupts::from_bits_truncate(value);
}

fn read_ip(s: &mut UartState) -> u32 {
    s.pending().bits()
}

fn registers(policy: InterruptPolicy) -> Vec<Register<UartState>> {
    let mut regs = vec![
        Register::new("TRANSMIT_DATA", TRANSMIT_DATA)
            .with_field(BitField::new("TXDATA", 0, 8, Access::WriteOnly).on_write(write_txdata))
            .with_reserved(8, 23)
            .with_field(BitField::flag("FULL", 31, Access::ReadOnly).on_read(read_full)),
        // EMPTY is declared first so it reports occupancy before RXDATA pops.
        Register::new("RECEIVE_DATA", RECEIVE_DATA)
            .with_field(BitField::flag("EMPTY", 31, Access::ReadOnly).on_read(read_empty))
            .with_field(BitField::new("RXDATA", 0, 8, Access::ReadOnly).on_read(read_rxdata))
            .with_reserved(8, 23),
    ];

    if policy == InterruptPolicy::Watermark {
        regs.extend([
            Register::new("TXCTRL", TXCTRL)
                .with_field(BitField::flag("TXEN", 0, Access::ReadWrite).on_write(write_txen))
                .with_reserved(1, 15)
                .with_field(BitField::new("TXCNT", 16, 3, Access::ReadWrite).on_write(write_txcnt))
                .with_reserved(19, 13),
            Register::new("RXCTRL", RXCTRL)
                .with_field(BitField::flag("RXEN", 0, Access::ReadWrite).on_write(write_rxen))
                .with_reserved(1, 15)
                .with_field(BitField::new("RXCNT", 16, 3, Access::ReadWrite).on_write(write_rxcnt))
                .with_reserved(19, 13),
            Register::new("IE", IE)
                .with_field(BitField::new("IE", 0, 2, Access::ReadWrite).on_write(write_ie))
                .with_reserved(2, 30),
            Register::new("IP", IP)
                .with_field(BitField::new("IP", 0, 2, Access::ReadOnly).on_read(read_ip))
                .with_reserved(2, 30),
        ]);
    }

    regs
}

#[derive(Debug)]
struct UartInner {
    regs: RegisterFile<UartState>,
    state: UartState,
}

impl UartInner {
    fn update_irq(&self, irq: &IrqLine) {
        irq.set(self.state.irq_level());
    }
}

#[derive(Debug, serde::Serialize)]
struct UartSnapshot<'a> {
    policy: InterruptPolicy,
    baud_rate: u32,
    tx: Vec<u8>,
    rx: Vec<u8>,
    tx_enabled: bool,
    rx_enabled: bool,
    tx_watermark: u32,
    rx_watermark: u32,
    enabled_irqs: u32,
    pending_irqs: u32,
    irq: bool,
    faults: &'a FaultCounters,
}

/// UART with FIFO-backed transmit and receive paths.
#[derive(Debug)]
pub struct Uart {
    name: String,
    frequency: u32,
    inner: Mutex<UartInner>,
    irq: IrqLine,
}

impl Uart {
    pub fn new(name: &str, config: &UartConfig) -> SimResult<Self> {
        if config.fifo_depth == 0 {
            return Err(SimulationError::Configuration(format!(
                "{}: UART FIFO depth must be at least 1",
                name
            )));
        }
        if config.frequency < BAUD_DIVISOR {
            return Err(SimulationError::Configuration(format!(
                "{}: clock frequency {} Hz is below the baud divisor {}",
                name, config.frequency, BAUD_DIVISOR
            )));
        }

        let state = UartState {
            name: name.to_string(),
            policy: config.interrupt_policy,
            tx: Fifo::new(config.fifo_depth),
            rx: Fifo::new(config.fifo_depth),
            tx_enabled: false,
            rx_enabled: false,
            tx_watermark: 0,
            rx_watermark: 0,
            enabled_irqs: UartInterrupts::empty(),
            faults: FaultCounters::new(),
            sink: None,
        };

        let uart = Self {
            name: name.to_string(),
            frequency: config.frequency,
            inner: Mutex::new(UartInner {
                regs: RegisterFile::new(name, registers(config.interrupt_policy))?,
                state,
            }),
            irq: IrqLine::new(),
        };
        tracing::debug!(
            "{}: {:?} UART, FIFO depth {}, {} baud",
            name,
            config.interrupt_policy,
            config.fifo_depth,
            uart.baud_rate()
        );
        Ok(uart)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn baud_rate(&self) -> u32 {
        self.frequency / BAUD_DIVISOR
    }

    /// Capture transmitted bytes into `sink`.
    pub fn set_sink(&self, sink: Option<Arc<Mutex<Vec<u8>>>>) {
        crate::lock(&self.inner).state.sink = sink;
    }

    /// Deliver one byte from the line into the receive FIFO.
    pub fn receive(&self, byte: u8) {
        let mut inner = crate::lock(&self.inner);
        inner.state.receive(byte);
        inner.update_irq(&self.irq);
    }

    pub fn receive_bytes(&self, bytes: &[u8]) {
        let mut inner = crate::lock(&self.inner);
        for &b in bytes {
            inner.state.receive(b);
        }
        inner.update_irq(&self.irq);
    }

    pub fn faults(&self) -> FaultCounters {
        crate::lock(&self.inner).state.faults
    }

    pub fn rx_len(&self) -> usize {
        crate::lock(&self.inner).state.rx.len()
    }

    pub fn tx_len(&self) -> usize {
        crate::lock(&self.inner).state.tx.len()
    }
}

impl crate::Peripheral for Uart {
    fn read(&self, offset: u64) -> u32 {
        let mut guard = crate::lock(&self.inner);
        let UartInner { regs, state } = &mut *guard;
        let value = regs.read(state, offset);
        guard.update_irq(&self.irq);
        value
    }

    fn write(&self, offset: u64, value: u32) {
        let mut guard = crate::lock(&self.inner);
        let UartInner { regs, state } = &mut *guard;
        regs.write(state, offset, value);
        guard.update_irq(&self.irq);
    }

    fn reset(&self) {
        let mut inner = crate::lock(&self.inner);
        inner.regs.reset();
        inner.state.clear();
        inner.update_irq(&self.irq);
    }

    fn size(&self) -> u64 {
        WINDOW_SIZE
    }

    fn tick(&self) {
        let mut inner = crate::lock(&self.inner);
        inner.state.tick();
        inner.update_irq(&self.irq);
    }

    fn interrupt_line(&self) -> Option<&IrqLine> {
        Some(&self.irq)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        let inner = crate::lock(&self.inner);
        let s = &inner.state;
        let snapshot = UartSnapshot {
            policy: s.policy,
            baud_rate: self.baud_rate(),
            tx: s.tx.iter().copied().collect(),
            rx: s.rx.iter().copied().collect(),
            tx_enabled: s.tx_enabled,
            rx_enabled: s.rx_enabled,
            tx_watermark: s.tx_watermark,
            rx_watermark: s.rx_watermark,
            enabled_irqs: s.enabled_irqs.bits(),
            pending_irqs: s.pending().bits(),
            irq: self.irq.is_asserted(),
            faults: &s.faults,
        };
        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
    }
}
