// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sixteen-pin configurable GPIO port.
//!
//! | Offset | Register          | Layout                                              |
//! |--------|-------------------|-----------------------------------------------------|
//! | 0x00   | `DATA`            | 0–15 input levels (RW), 16–31 output readback (RO)  |
//! | 0x04   | `DIR_ENABLE`      | 0–15 direction, 1 = input, 0 = output               |
//! | 0x08   | `PULLUP_ENABLE`   | 0–15 stored, no electrical effect                   |
//! | 0x0C   | `PULLDOWN_ENABLE` | 0–15 stored, no electrical effect                   |

use crate::register::{Access, BitField, Register, RegisterFile};
use crate::signals::DigitalLevel;
use crate::{SimResult, SimulationError};
use std::any::Any;
use std::sync::{Arc, Mutex, Weak};

pub const NUM_PINS: usize = 16;
const PIN_MASK: u32 = 0xFFFF;

pub const DATA: u64 = 0x00;
pub const DIR_ENABLE: u64 = 0x04;
pub const PULLUP_ENABLE: u64 = 0x08;
pub const PULLDOWN_ENABLE: u64 = 0x0C;

const WINDOW_SIZE: u64 = 0x100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinMode {
    /// Matches the `DIR_ENABLE` reset value of all ones.
    #[default]
    Input,
    Output,
}

/// Something wired to a GPIO pin outside the chip (LED, another device).
///
/// Called after the port lock is released, so a sink may access any port,
/// including the one that notified it.
pub trait PinSink: Send + Sync {
    fn on_level_change(&self, pin: u8, level: DigitalLevel);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Pin {
    pub mode: PinMode,
    /// Level this port drives when the pin is an output.
    pub driven: DigitalLevel,
    /// Level applied from outside the chip.
    pub observed: DigitalLevel,
}

/// Driven-level change waiting to be delivered to a pin's connection.
type Edge = (u8, DigitalLevel, Arc<dyn PinSink>);

#[derive(Default, serde::Serialize)]
pub struct PinArray {
    name: String,
    pins: [Pin; NUM_PINS],
    #[serde(skip)]
    connections: [Option<Weak<dyn PinSink>>; NUM_PINS],
    #[serde(skip)]
    edges: Vec<(usize, DigitalLevel)>,
}

impl std::fmt::Debug for PinArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinArray")
            .field("name", &self.name)
            .field("pins", &self.pins)
            .field(
                "connections",
                &self.connections.iter().filter(|c| c.is_some()).count(),
            )
            .finish()
    }
}

impl PinArray {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn pin(&self, index: usize) -> Option<&Pin> {
        self.pins.get(index)
    }

    fn mask_where(&self, f: impl Fn(&Pin) -> bool) -> u32 {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, p)| f(p))
            .fold(0, |acc, (i, _)| acc | (1 << i))
    }

    /// External levels of input-mode pins.
    fn input_levels(&self) -> u32 {
        self.mask_where(|p| p.mode == PinMode::Input && p.observed == DigitalLevel::High)
    }

    /// Driven levels of output-mode pins.
    fn driven_levels(&self) -> u32 {
        self.mask_where(|p| p.mode == PinMode::Output && p.driven == DigitalLevel::High)
    }

    /// Record a new driven level, queueing an edge if it changed.
    fn set_driven(&mut self, index: usize, level: DigitalLevel) {
        if self.pins[index].driven != level {
            self.pins[index].driven = level;
            self.edges.push((index, level));
        }
    }

    /// A pin leaving output mode stops driving and falls back to Low.
    fn configure_directions(&mut self, inputs: u32) {
        for i in 0..NUM_PINS {
            if inputs & (1 << i) != 0 {
                self.pins[i].mode = PinMode::Input;
                self.set_driven(i, DigitalLevel::Low);
            } else {
                self.pins[i].mode = PinMode::Output;
            }
        }
    }

    fn drive(&mut self, value: u32) {
        for i in 0..NUM_PINS {
            if self.pins[i].mode == PinMode::Output {
                self.set_driven(i, DigitalLevel::from(value & (1 << i) != 0));
            }
        }
    }

    /// Resolve queued edges to live connections. Dead connections are dropped.
    fn take_edges(&mut self) -> Vec<Edge> {
        let mut resolved = Vec::new();
        for (index, level) in std::mem::take(&mut self.edges) {
            let Some(weak) = &self.connections[index] else {
                continue;
            };
            match weak.upgrade() {
                Some(sink) => resolved.push((index as u8, level, sink)),
                None => {
                    tracing::debug!(
                        "{}: connection on pin {} dropped, disconnecting",
                        self.name,
                        index
                    );
                    self.connections[index] = None;
                }
            }
        }
        resolved
    }

    /// External levels are not owned by the port and survive reset.
    fn reset(&mut self) {
        self.configure_directions(PIN_MASK);
    }
}

fn deliver(edges: Vec<Edge>) {
    for (pin, level, sink) in edges {
        sink.on_level_change(pin, level);
    }
}

fn read_inputs(pins: &mut PinArray) -> u32 {
    pins.input_levels()
}

fn write_outputs(pins: &mut PinArray, value: u32) {
    pins.drive(value);
}

fn read_driven(pins: &mut PinArray) -> u32 {
    pins.driven_levels()
}

fn write_directions(pins: &mut PinArray, value: u32) {
    pins.configure_directions(value);
}

fn write_pull_config(pins: &mut PinArray, value: u32) {
    tracing::debug!(
        "{}: pull configuration {:#06x} stored; pull resistors are not modeled",
        pins.name,
        value
    );
}

fn registers() -> Vec<Register<PinArray>> {
    vec![
        Register::new("DATA", DATA)
            .with_field(
                BitField::new("PINS", 0, 16, Access::ReadWrite)
                    .on_read(read_inputs)
                    .on_write(write_outputs),
            )
            .with_field(BitField::new("READBACK", 16, 16, Access::ReadOnly).on_read(read_driven)),
        Register::new("DIR_ENABLE", DIR_ENABLE)
            .with_field(
                BitField::new("DIR", 0, 16, Access::ReadWrite)
                    .with_default(PIN_MASK)
                    .on_write(write_directions),
            )
            .with_reserved(16, 16),
        Register::new("PULLUP_ENABLE", PULLUP_ENABLE)
            .with_field(
                BitField::new("PUB", 0, 16, Access::ReadWrite)
                    .with_default(PIN_MASK)
                    .on_write(write_pull_config),
            )
            .with_reserved(16, 16),
        Register::new("PULLDOWN_ENABLE", PULLDOWN_ENABLE)
            .with_field(
                BitField::new("PDB", 0, 16, Access::ReadWrite)
                    .with_default(PIN_MASK)
                    .on_write(write_pull_config),
            )
            .with_reserved(16, 16),
    ]
}

#[derive(Debug)]
struct GpioInner {
    regs: RegisterFile<PinArray>,
    pins: PinArray,
}

/// GPIO port with 16 independently configurable pins.
#[derive(Debug)]
pub struct GpioPort {
    name: String,
    inner: Mutex<GpioInner>,
}

impl GpioPort {
    pub fn new(name: &str) -> SimResult<Self> {
        Ok(Self {
            name: name.to_string(),
            inner: Mutex::new(GpioInner {
                regs: RegisterFile::new(name, registers())?,
                pins: PinArray::new(name),
            }),
        })
    }

    fn check_pin(&self, pin: u8) -> SimResult<usize> {
        let index = pin as usize;
        if index >= NUM_PINS {
            return Err(SimulationError::Configuration(format!(
                "{}: pin {} out of range (0..{})",
                self.name, pin, NUM_PINS
            )));
        }
        Ok(index)
    }

    /// Apply an external level to a pin. Visible on the next `DATA` read if
    /// the pin is an input.
    pub fn set_input(&self, pin: u8, level: DigitalLevel) -> SimResult<()> {
        let index = self.check_pin(pin)?;
        let mut inner = crate::lock(&self.inner);
        let p = &mut inner.pins.pins[index];
        if p.mode != PinMode::Input {
            tracing::debug!(
                "{}: external level on pin {} recorded while pin is {:?}",
                self.name,
                pin,
                p.mode
            );
        }
        p.observed = level;
        Ok(())
    }

    /// Wire a pin to an external sink. The port only holds a weak reference.
    pub fn connect(&self, pin: u8, sink: Weak<dyn PinSink>) -> SimResult<()> {
        let index = self.check_pin(pin)?;
        crate::lock(&self.inner).pins.connections[index] = Some(sink);
        Ok(())
    }

    pub fn pin(&self, pin: u8) -> Option<Pin> {
        crate::lock(&self.inner).pins.pin(pin as usize).copied()
    }
}

impl crate::Peripheral for GpioPort {
    fn read(&self, offset: u64) -> u32 {
        let mut guard = crate::lock(&self.inner);
        let GpioInner { regs, pins } = &mut *guard;
        regs.read(pins, offset)
    }

    fn write(&self, offset: u64, value: u32) {
        let edges = {
            let mut guard = crate::lock(&self.inner);
            let GpioInner { regs, pins } = &mut *guard;
            regs.write(pins, offset, value);
            pins.take_edges()
        };
        deliver(edges);
    }

    fn reset(&self) {
        let edges = {
            let mut inner = crate::lock(&self.inner);
            inner.regs.reset();
            inner.pins.reset();
            inner.pins.take_edges()
        };
        deliver(edges);
    }

    fn size(&self) -> u64 {
        WINDOW_SIZE
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        let inner = crate::lock(&self.inner);
        serde_json::json!({
            "pins": inner.pins.pins,
            "dir_enable": inner.regs.field_value(DIR_ENABLE, "DIR"),
            "pullup_enable": inner.regs.field_value(PULLUP_ENABLE, "PUB"),
            "pulldown_enable": inner.regs.field_value(PULLDOWN_ENABLE, "PDB"),
        })
    }
}
