// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Single-slave SPI master with 8-bit frames.

use crate::fifo::Fifo;
use crate::metrics::{Fault, FaultCounters};
use crate::register::{Access, BitField, Register, RegisterFile};
use crate::{SimResult, SimulationError};
use raptor_config::SpiConfig;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Mutex;

pub const DATA: u64 = 0x00;
pub const CTRL: u64 = 0x04;
pub const CFG: u64 = 0x08;
pub const STATUS: u64 = 0x10;

pub const CTRL_START: u32 = 1 << 0;
/// Slave select 0, active low.
pub const CTRL_SS0: u32 = 1 << 1;

/// The only slave address this controller decodes.
pub const SLAVE_ADDRESS: u32 = 1;

const WINDOW_SIZE: u64 = 0x100;

/// Device on the far end of the SPI bus.
pub trait SpiSlave: Send + Debug {
    /// Exchange one frame. Returns the byte clocked in from the slave.
    fn transmit(&mut self, byte: u8) -> u8;

    /// Slave select was released.
    fn finish_transmission(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    #[default]
    Idle,
    Transferring,
    Selected,
}

#[derive(Debug)]
struct SpiState {
    name: String,
    tx: Fifo<u8>,
    rx: Fifo<u8>,
    enabled: bool,
    transfer: TransferState,
    slave: Option<Box<dyn SpiSlave>>,
    slave_used: bool,
    faults: FaultCounters,
}

impl SpiState {
    /// Clock one frame through the bound slave and queue its reply.
    fn exchange(&mut self, byte: u8) {
        let Some(slave) = self.slave.as_mut() else {
            return;
        };
        let reply = slave.transmit(byte);
        self.slave_used = true;
        tracing::trace!("{}: MOSI {:#04x} MISO {:#04x}", self.name, byte, reply);
        if let Err(e) = self.rx.enqueue(reply) {
            self.faults.record(&self.name, Fault::Overflow, &e.to_string());
        }
    }

    /// Drain the transmit FIFO through the slave and hold the session open.
    ///
    /// With no slave bound the state stays `Idle` and the FIFO is kept, yet
    /// `CTRL.SS0` still reads back 0. A later select once a slave is bound
    /// (`SS0` written 1 then 0) drains the kept bytes.
    fn select(&mut self) {
        if !self.enabled {
            tracing::debug!("{}: slave select ignored, controller disabled", self.name);
            return;
        }
        if self.transfer == TransferState::Selected {
            return;
        }
        if self.slave.is_none() {
            tracing::warn!(
                "{}: slave select with no slave bound, {} bytes kept in transmit FIFO",
                self.name,
                self.tx.len()
            );
            return;
        }

        self.transfer = TransferState::Transferring;
        while let Ok(byte) = self.tx.dequeue() {
            self.exchange(byte);
        }
        self.transfer = TransferState::Selected;
    }

    fn deselect(&mut self) {
        if self.transfer != TransferState::Selected {
            return;
        }
        if let Some(slave) = self.slave.as_mut() {
            slave.finish_transmission();
        }
        self.transfer = TransferState::Idle;
    }

    fn stop(&mut self) {
        self.deselect();
        self.transfer = TransferState::Idle;
        self.tx.clear();
        self.rx.clear();
        self.enabled = false;
    }
}

fn write_data(s: &mut SpiState, value: u32) {
    let byte = value as u8;
    if !s.enabled {
        s.faults.record(
            &s.name,
            Fault::DisabledAccess,
            "data write while START is clear, dropped",
        );
        return;
    }
    if s.transfer == TransferState::Selected {
        s.exchange(byte);
    } else if let Err(e) = s.tx.enqueue(byte) {
        s.faults.record(&s.name, Fault::Overflow, &e.to_string());
    }
}

fn read_data(s: &mut SpiState) -> u32 {
    if !s.enabled {
        s.faults.record(
            &s.name,
            Fault::DisabledAccess,
            "data read while START is clear",
        );
        return 0;
    }
    match s.rx.dequeue() {
        Ok(byte) => byte as u32,
        Err(e) => {
            s.faults.record(&s.name, Fault::Underflow, &e.to_string());
            0
        }
    }
}

fn write_start(s: &mut SpiState, value: u32) {
    if value != 0 {
        s.enabled = true;
    } else {
        s.stop();
    }
}

fn write_ss0(s: &mut SpiState, value: u32) {
    if value == 0 {
        s.select();
    } else {
        s.deselect();
    }
}

fn registers() -> Vec<Register<SpiState>> {
    vec![
        Register::new("DATA", DATA)
            .with_field(
                BitField::new("DATA", 0, 16, Access::ReadWrite)
                    .on_read(read_data)
                    .on_write(write_data),
            )
            .with_reserved(16, 16),
        // START before SS0: a single write can enable and select.
        Register::new("CTRL", CTRL)
            .with_field(BitField::flag("START", 0, Access::ReadWrite).on_write(write_start))
            .with_field(
                BitField::flag("SS0", 1, Access::ReadWrite)
                    .with_default(1)
                    .on_write(write_ss0),
            )
            .with_reserved(2, 30),
        Register::new("CFG", CFG)
            .with_field(BitField::flag("CPOL", 0, Access::ReadWrite))
            .with_field(BitField::flag("CPHA", 1, Access::ReadWrite))
            .with_field(BitField::new("PRESCALE", 2, 8, Access::ReadWrite))
            .with_reserved(10, 22),
        Register::new("STATUS", STATUS)
            .with_field(BitField::constant("DONE", 0, 1, 1))
            .with_reserved(1, 31),
    ]
}

#[derive(Debug)]
struct SpiInner {
    regs: RegisterFile<SpiState>,
    state: SpiState,
}

#[derive(Debug, serde::Serialize)]
struct SpiSnapshot<'a> {
    enabled: bool,
    transfer: TransferState,
    tx: Vec<u8>,
    rx: Vec<u8>,
    slave_bound: bool,
    prescale: u32,
    faults: &'a FaultCounters,
}

/// SPI master controller.
#[derive(Debug)]
pub struct Spi {
    name: String,
    inner: Mutex<SpiInner>,
}

impl Spi {
    pub fn new(name: &str, config: &SpiConfig) -> SimResult<Self> {
        if config.fifo_depth == 0 {
            return Err(SimulationError::Configuration(format!(
                "{}: SPI FIFO depth must be at least 1",
                name
            )));
        }

        let state = SpiState {
            name: name.to_string(),
            tx: Fifo::new(config.fifo_depth),
            rx: Fifo::new(config.fifo_depth),
            enabled: false,
            transfer: TransferState::Idle,
            slave: None,
            slave_used: false,
            faults: FaultCounters::new(),
        };

        Ok(Self {
            name: name.to_string(),
            inner: Mutex::new(SpiInner {
                regs: RegisterFile::new(name, registers())?,
                state,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind `slave` to select line `address`.
    ///
    /// Only address 1 exists. The slave may be replaced until the first frame
    /// has been exchanged with it.
    pub fn register_slave(&self, address: u32, slave: Box<dyn SpiSlave>) -> SimResult<()> {
        if address != SLAVE_ADDRESS {
            return Err(SimulationError::Configuration(format!(
                "{}: no slave select line for address {} (only {} is decoded)",
                self.name, address, SLAVE_ADDRESS
            )));
        }

        let mut inner = crate::lock(&self.inner);
        if inner.state.slave_used {
            return Err(SimulationError::Configuration(format!(
                "{}: slave at address {} already in use, cannot be replaced",
                self.name, address
            )));
        }
        if inner.state.slave.replace(slave).is_some() {
            tracing::info!("{}: replaced slave at address {}", self.name, address);
        } else {
            tracing::info!("{}: registered slave at address {}", self.name, address);
        }
        Ok(())
    }

    pub fn transfer_state(&self) -> TransferState {
        crate::lock(&self.inner).state.transfer
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

impl crate::Peripheral for Spi {
    fn read(&self, offset: u64) -> u32 {
        let mut guard = crate::lock(&self.inner);
        let SpiInner { regs, state } = &mut *guard;
        regs.read(state, offset)
    }

    fn write(&self, offset: u64, value: u32) {
        let mut guard = crate::lock(&self.inner);
        let SpiInner { regs, state } = &mut *guard;
        regs.write(state, offset, value);
    }

    fn reset(&self) {
        let mut inner = crate::lock(&self.inner);
        inner.regs.reset();
        inner.state.stop();
    }

    fn size(&self) -> u64 {
        WINDOW_SIZE
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        let inner = crate::lock(&self.inner);
        let s = &inner.state;
        let snapshot = SpiSnapshot {
            enabled: s.enabled,
            transfer: s.transfer,
            tx: s.tx.iter().copied().collect(),
            rx: s.rx.iter().copied().collect(),
            slave_bound: s.slave.is_some(),
            prescale: inner.regs.field_value(CFG, "PRESCALE").unwrap_or(0),
            faults: &s.faults,
        };
        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Peripheral;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Echoes the complement of every byte and records what it saw.
    #[derive(Debug, Default)]
    struct RecordingSlave {
        received: Arc<Mutex<Vec<u8>>>,
        finished: Arc<AtomicUsize>,
    }

    impl SpiSlave for RecordingSlave {
        fn transmit(&mut self, byte: u8) -> u8 {
            self.received.lock().unwrap().push(byte);
            !byte
        }

        fn finish_transmission(&mut self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spi_with_slave(depth: usize) -> (Spi, Arc<Mutex<Vec<u8>>>, Arc<AtomicUsize>) {
        let spi = Spi::new("spi0", &SpiConfig { fifo_depth: depth }).unwrap();
        let slave = RecordingSlave::default();
        let received = slave.received.clone();
        let finished = slave.finished.clone();
        spi.register_slave(1, Box::new(slave)).unwrap();
        (spi, received, finished)
    }

    #[test]
    fn test_reset_values() {
        let (spi, _, _) = spi_with_slave(4);
        assert_eq!(spi.read(CTRL), CTRL_SS0);
        assert_eq!(spi.read(CFG), 0);
        assert_eq!(spi.read(STATUS), 1);
        assert_eq!(spi.transfer_state(), TransferState::Idle);
    }

    #[test]
    fn test_round_trip() {
        let (spi, received, finished) = spi_with_slave(8);
        spi.write(CTRL, CTRL_START | CTRL_SS0);
        for b in [0x12, 0x34, 0x56] {
            spi.write(DATA, b);
        }
        // Buffered until the slave is selected.
        assert!(received.lock().unwrap().is_empty());
        assert_eq!(spi.tx_len(), 3);

        spi.write(CTRL, CTRL_START);
        assert_eq!(spi.transfer_state(), TransferState::Selected);
        assert_eq!(received.lock().unwrap().as_slice(), &[0x12, 0x34, 0x56]);
        assert_eq!(spi.read(DATA), 0xED);
        assert_eq!(spi.read(DATA), 0xCB);
        assert_eq!(spi.read(DATA), 0xA9);

        // Exchanged immediately while selected.
        spi.write(DATA, 0x0F);
        assert_eq!(spi.read(DATA), 0xF0);

        spi.write(CTRL, CTRL_START | CTRL_SS0);
        assert_eq!(spi.transfer_state(), TransferState::Idle);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_upper_data_bits_ignored() {
        let (spi, received, _) = spi_with_slave(4);
        spi.write(CTRL, CTRL_START);
        spi.write(DATA, 0xFFFF_AB01);
        assert_eq!(received.lock().unwrap().as_slice(), &[0x01]);
        assert_eq!(spi.read(DATA), 0xFE);
    }

    #[test]
    fn test_disabled_data_access() {
        let (spi, received, _) = spi_with_slave(4);
        spi.write(DATA, 0xAA);
        assert_eq!(spi.tx_len(), 0);
        assert_eq!(spi.read(DATA), 0);
        assert_eq!(spi.faults().disabled_accesses, 2);

        // Selecting while disabled does nothing.
        spi.write(CTRL, 0);
        assert_eq!(spi.transfer_state(), TransferState::Idle);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_clears_fifos_and_ends_session() {
        let (spi, _, finished) = spi_with_slave(4);
        spi.write(CTRL, CTRL_START);
        spi.write(DATA, 1);
        spi.write(DATA, 2);
        assert_eq!(spi.rx_len(), 2);

        spi.write(CTRL, 0);
        assert_eq!(spi.transfer_state(), TransferState::Idle);
        assert_eq!(spi.rx_len(), 0);
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        spi.write(CTRL, CTRL_START | CTRL_SS0);
        assert_eq!(spi.read(DATA), 0);
        assert_eq!(spi.faults().underflows, 1);
    }

    #[test]
    fn test_receive_overflow_during_drain() {
        let (spi, received, _) = spi_with_slave(2);
        spi.write(CTRL, CTRL_START | CTRL_SS0);
        spi.write(DATA, 1);
        spi.write(DATA, 2);
        spi.write(DATA, 3);
        assert_eq!(spi.faults().overflows, 1);

        spi.write(CTRL, CTRL_START);
        spi.write(DATA, 4);
        assert_eq!(received.lock().unwrap().as_slice(), &[1, 2, 4]);
        assert_eq!(spi.rx_len(), 2);
        assert_eq!(spi.faults().overflows, 2);
    }

    #[test]
    fn test_select_without_slave_keeps_fifo() {
        let spi = Spi::new("spi1", &SpiConfig::default()).unwrap();
        spi.write(CTRL, CTRL_START | CTRL_SS0);
        spi.write(DATA, 0x55);
        spi.write(CTRL, CTRL_START);
        assert_eq!(spi.tx_len(), 1);
        assert_eq!(spi.transfer_state(), TransferState::Idle);
        // SS0 reads back as asserted even though nothing was selected.
        assert_eq!(spi.read(CTRL), CTRL_START);

        let slave = RecordingSlave::default();
        let received = slave.received.clone();
        spi.register_slave(1, Box::new(slave)).unwrap();
        spi.write(CTRL, CTRL_START | CTRL_SS0);
        spi.write(CTRL, CTRL_START);
        assert_eq!(spi.transfer_state(), TransferState::Selected);
        assert_eq!(*received.lock().unwrap(), vec![0x55]);
        assert_eq!(spi.read(DATA), 0xAA);
    }

    #[test]
    fn test_second_slave_address_rejected() {
        let (spi, received, _) = spi_with_slave(4);
        let err = spi
            .register_slave(2, Box::new(RecordingSlave::default()))
            .unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));

        spi.write(CTRL, CTRL_START);
        spi.write(DATA, 0x42);
        assert_eq!(received.lock().unwrap().as_slice(), &[0x42]);
        assert_eq!(spi.read(DATA), 0xBD);
    }

    #[test]
    fn test_slave_replacement_only_before_use() {
        let (spi, first, _) = spi_with_slave(4);
        let second = RecordingSlave::default();
        let second_log = second.received.clone();
        spi.register_slave(1, Box::new(second)).unwrap();

        spi.write(CTRL, CTRL_START);
        spi.write(DATA, 7);
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second_log.lock().unwrap().as_slice(), &[7]);

        let late = spi.register_slave(1, Box::new(RecordingSlave::default()));
        assert!(matches!(late, Err(SimulationError::Configuration(_))));
    }

    #[test]
    fn test_config_register_is_inert() {
        let (spi, received, _) = spi_with_slave(4);
        spi.write(CFG, 0xFFFF_FFFF);
        assert_eq!(spi.read(CFG), 0x3FF);
        spi.write(STATUS, 0);
        assert_eq!(spi.read(STATUS), 1);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (spi, _, finished) = spi_with_slave(4);
        spi.write(CTRL, CTRL_START);
        spi.write(DATA, 9);
        spi.write(CFG, 0x15);

        spi.reset();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        let once = spi.snapshot();
        spi.reset();
        assert_eq!(spi.snapshot(), once);
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        assert_eq!(spi.read(CTRL), CTRL_SS0);
        assert_eq!(spi.read(CFG), 0);
        assert_eq!(spi.rx_len(), 0);
    }
}
