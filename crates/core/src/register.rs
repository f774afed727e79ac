// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Declarative 32-bit registers built from bitfields.
//!
//! A [`Register`] is an ordered list of [`BitField`]s that together cover all
//! 32 bits. Each field carries an [`Access`] mode and a [`FieldKind`] that
//! decides what a read returns and what a write does. Behaviors are plain
//! function pointers receiving the owning peripheral's state `S` explicitly,
//! so a register file never captures peripheral state on its own.
//!
//! Fields are evaluated in declaration order on both read and write. Declare
//! fields by ascending bit offset, except where a status bit must be sampled
//! before a sibling field consumes data (e.g. an `EMPTY` flag before the
//! field that pops the FIFO).

use crate::{SimResult, SimulationError};
use std::collections::BTreeMap;
use std::fmt;

/// Computes the current value of a field from peripheral state.
pub type ReadEffect<S> = fn(&mut S) -> u32;
/// Applies a written field value to peripheral state.
pub type WriteEffect<S> = fn(&mut S, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    Reserved,
}

impl Access {
    fn readable(self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    fn writable(self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }
}

/// What a field does when the register is accessed.
pub enum FieldKind<S> {
    /// Always reads as the given value; writes are ignored.
    Constant(u32),
    /// Plain storage: reads return the last written value.
    Stored,
    /// Reads are computed from peripheral state; writes are stored only.
    ComputedRead(ReadEffect<S>),
    /// Writes are applied to peripheral state; reads return the last written value.
    SideEffectWrite(WriteEffect<S>),
    /// Both directions go through peripheral state (e.g. FIFO data ports).
    ComputedReadWrite(ReadEffect<S>, WriteEffect<S>),
}

impl<S> Clone for FieldKind<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for FieldKind<S> {}

impl<S> fmt::Debug for FieldKind<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Constant(v) => write!(f, "Constant({:#x})", v),
            FieldKind::Stored => f.write_str("Stored"),
            FieldKind::ComputedRead(_) => f.write_str("ComputedRead"),
            FieldKind::SideEffectWrite(_) => f.write_str("SideEffectWrite"),
            FieldKind::ComputedReadWrite(_, _) => f.write_str("ComputedReadWrite"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BitField<S> {
    name: &'static str,
    offset: u8,
    width: u8,
    access: Access,
    kind: FieldKind<S>,
    default: u32,
    value: u32,
}

impl<S> BitField<S> {
    /// A stored field of `width` bits starting at bit `offset`.
    pub fn new(name: &'static str, offset: u8, width: u8, access: Access) -> Self {
        Self {
            name,
            offset,
            width,
            access,
            kind: FieldKind::Stored,
            default: 0,
            value: 0,
        }
    }

    /// A single-bit field.
    pub fn flag(name: &'static str, bit: u8, access: Access) -> Self {
        Self::new(name, bit, 1, access)
    }

    /// A read-only field that always reads as `value`.
    pub fn constant(name: &'static str, offset: u8, width: u8, value: u32) -> Self {
        Self {
            kind: FieldKind::Constant(value),
            default: value,
            value,
            ..Self::new(name, offset, width, Access::ReadOnly)
        }
    }

    /// Explicit gap. Reads as zero and ignores writes.
    pub fn reserved(offset: u8, width: u8) -> Self {
        Self::new("RESERVED", offset, width, Access::Reserved)
    }

    pub fn with_default(mut self, default: u32) -> Self {
        self.default = default;
        self.value = default;
        self
    }

    pub fn on_read(mut self, effect: ReadEffect<S>) -> Self {
        self.kind = match self.kind {
            FieldKind::SideEffectWrite(w) | FieldKind::ComputedReadWrite(_, w) => {
                FieldKind::ComputedReadWrite(effect, w)
            }
            _ => FieldKind::ComputedRead(effect),
        };
        self
    }

    pub fn on_write(mut self, effect: WriteEffect<S>) -> Self {
        self.kind = match self.kind {
            FieldKind::ComputedRead(r) | FieldKind::ComputedReadWrite(r, _) => {
                FieldKind::ComputedReadWrite(r, effect)
            }
            _ => FieldKind::SideEffectWrite(effect),
        };
        self
    }

    /// Mask of the field value, not shifted into position.
    fn value_mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Mask of the field in register bit positions.
    fn register_mask(&self) -> u32 {
        self.value_mask() << self.offset
    }

    fn read(&mut self, state: &mut S) -> u32 {
        if !self.access.readable() {
            return 0;
        }
        let raw = match self.kind {
            FieldKind::Constant(v) => v,
            FieldKind::Stored | FieldKind::SideEffectWrite(_) => self.value,
            FieldKind::ComputedRead(effect) | FieldKind::ComputedReadWrite(effect, _) => {
                effect(state)
            }
        };
        raw & self.value_mask()
    }

    fn write(&mut self, state: &mut S, value: u32) {
        if !self.access.writable() {
            return;
        }
        match self.kind {
            FieldKind::Constant(_) => {}
            FieldKind::Stored | FieldKind::ComputedRead(_) => self.value = value,
            FieldKind::SideEffectWrite(effect) | FieldKind::ComputedReadWrite(_, effect) => {
                self.value = value;
                effect(state, value);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Register<S> {
    name: &'static str,
    offset: u64,
    fields: Vec<BitField<S>>,
}

impl<S> Register<S> {
    pub fn new(name: &'static str, offset: u64) -> Self {
        Self {
            name,
            offset,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: BitField<S>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_reserved(self, offset: u8, width: u8) -> Self {
        self.with_field(BitField::reserved(offset, width))
    }

    /// Check that the register is word-aligned and its fields tile all 32
    /// bits without overlapping.
    pub fn validate(&self) -> SimResult<()> {
        let layout_error = |reason: String| SimulationError::Layout {
            register: self.name.to_string(),
            reason,
        };

        if self.offset % 4 != 0 {
            return Err(layout_error(format!(
                "offset {:#x} is not word-aligned",
                self.offset
            )));
        }

        let mut covered = 0u32;
        for field in &self.fields {
            if field.width == 0 || u32::from(field.offset) + u32::from(field.width) > 32 {
                return Err(layout_error(format!(
                    "field '{}' ({} bits at bit {}) does not fit in 32 bits",
                    field.name, field.width, field.offset
                )));
            }
            let mask = field.register_mask();
            if covered & mask != 0 {
                return Err(layout_error(format!(
                    "field '{}' overlaps bits {:#010x}",
                    field.name,
                    covered & mask
                )));
            }
            if field.default & !field.value_mask() != 0 {
                return Err(layout_error(format!(
                    "default {:#x} of field '{}' exceeds its width",
                    field.default, field.name
                )));
            }
            covered |= mask;
        }

        if covered != u32::MAX {
            return Err(layout_error(format!(
                "bits {:#010x} are not covered by any field",
                !covered
            )));
        }

        Ok(())
    }

    /// Value the register holds after reset, as stored (before read effects).
    pub fn reset_value(&self) -> u32 {
        self.fields
            .iter()
            .fold(0, |acc, f| acc | (f.default << f.offset))
    }

    pub fn read(&mut self, state: &mut S) -> u32 {
        let mut word = 0;
        for field in &mut self.fields {
            word |= field.read(state) << field.offset;
        }
        word
    }

    pub fn write(&mut self, state: &mut S, value: u32) {
        for field in &mut self.fields {
            let field_value = (value >> field.offset) & field.value_mask();
            field.write(state, field_value);
        }
    }

    pub fn reset(&mut self) {
        for field in &mut self.fields {
            field.value = field.default;
        }
    }

    /// Last stored value of a named field.
    pub fn field_value(&self, name: &str) -> Option<u32> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value)
    }
}

/// All registers of one peripheral instance, keyed by byte offset.
#[derive(Debug, Clone)]
pub struct RegisterFile<S> {
    peripheral: String,
    registers: BTreeMap<u64, Register<S>>,
}

impl<S> RegisterFile<S> {
    pub fn new(peripheral: &str, registers: Vec<Register<S>>) -> SimResult<Self> {
        let mut map = BTreeMap::new();
        for register in registers {
            register.validate()?;
            let offset = register.offset;
            let name = register.name;
            if let Some(existing) = map.insert(offset, register) {
                return Err(SimulationError::Layout {
                    register: name.to_string(),
                    reason: format!(
                        "offset {:#x} already used by '{}'",
                        offset,
                        existing.name
                    ),
                });
            }
        }

        Ok(Self {
            peripheral: peripheral.to_string(),
            registers: map,
        })
    }

    pub fn read(&mut self, state: &mut S, offset: u64) -> u32 {
        match self.registers.get_mut(&offset) {
            Some(register) => register.read(state),
            None => {
                tracing::debug!(
                    "{}: read from unmapped offset {:#x}, returning 0",
                    self.peripheral,
                    offset
                );
                0
            }
        }
    }

    pub fn write(&mut self, state: &mut S, offset: u64, value: u32) {
        match self.registers.get_mut(&offset) {
            Some(register) => register.write(state, value),
            None => tracing::debug!(
                "{}: write of {:#010x} to unmapped offset {:#x} ignored",
                self.peripheral,
                value,
                offset
            ),
        }
    }

    pub fn reset(&mut self) {
        for register in self.registers.values_mut() {
            register.reset();
        }
    }

    pub fn field_value(&self, offset: u64, name: &str) -> Option<u32> {
        self.registers.get(&offset)?.field_value(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    struct Queue {
        items: VecDeque<u32>,
        pushed: Vec<u32>,
    }

    fn queue_empty(q: &mut Queue) -> u32 {
        q.items.is_empty() as u32
    }

    fn queue_pop(q: &mut Queue) -> u32 {
        q.items.pop_front().unwrap_or(0)
    }

    fn queue_push(q: &mut Queue, v: u32) {
        q.pushed.push(v);
    }

    fn data_register() -> Register<Queue> {
        Register::new("DATA", 0x00)
            .with_field(BitField::flag("EMPTY", 31, Access::ReadOnly).on_read(queue_empty))
            .with_field(BitField::new("DATA", 0, 8, Access::ReadWrite).on_read(queue_pop))
            .with_reserved(8, 23)
    }

    #[test]
    fn test_status_sampled_before_data_is_consumed() {
        let mut reg = data_register();
        reg.validate().unwrap();
        let mut q = Queue::default();
        q.items.push_back(0x41);

        // Single element: EMPTY must reflect the occupancy before the pop.
        let word = reg.read(&mut q);
        assert_eq!(word, 0x41);
        assert!(q.items.is_empty());

        let word = reg.read(&mut q);
        assert_eq!(word, 0x8000_0000);
    }

    #[test]
    fn test_validate_rejects_gap() {
        let reg: Register<Queue> = Register::new("GAP", 0x00)
            .with_field(BitField::new("LOW", 0, 8, Access::ReadWrite))
            .with_reserved(16, 16);
        let err = reg.validate().unwrap_err();
        assert!(err.to_string().contains("not covered"));
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let reg: Register<Queue> = Register::new("OVERLAP", 0x00)
            .with_field(BitField::new("A", 0, 8, Access::ReadWrite))
            .with_field(BitField::new("B", 4, 8, Access::ReadWrite))
            .with_reserved(12, 20);
        let err = reg.validate().unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_validate_rejects_misaligned_offset() {
        let reg: Register<Queue> = Register::new("ODD", 0x02)
            .with_field(BitField::new("ALL", 0, 32, Access::ReadWrite));
        assert!(reg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_default() {
        let reg: Register<Queue> = Register::new("DEF", 0x00)
            .with_field(BitField::new("NIBBLE", 0, 4, Access::ReadWrite).with_default(0x1F))
            .with_reserved(4, 28);
        assert!(reg.validate().is_err());
    }

    #[test]
    fn test_access_modes() {
        let mut reg: Register<Queue> = Register::new("MODES", 0x04)
            .with_field(BitField::new("RW", 0, 8, Access::ReadWrite))
            .with_field(BitField::new("RO", 8, 8, Access::ReadOnly).with_default(0xAA))
            .with_field(BitField::new("WO", 16, 8, Access::WriteOnly))
            .with_reserved(24, 8);
        reg.validate().unwrap();
        let mut q = Queue::default();

        reg.write(&mut q, 0xFFFF_FFFF);
        // RO keeps its default, WO reads as zero, reserved reads as zero.
        assert_eq!(reg.read(&mut q), 0x0000_AAFF);
        assert_eq!(reg.field_value("WO"), Some(0xFF));
    }

    #[test]
    fn test_write_effect_receives_unpacked_value() {
        let mut reg = Register::new("TX", 0x00)
            .with_field(BitField::new("TXDATA", 0, 8, Access::WriteOnly).on_write(queue_push))
            .with_field(BitField::new("CTRL", 8, 4, Access::ReadWrite))
            .with_reserved(12, 20);
        reg.validate().unwrap();
        let mut q = Queue::default();

        reg.write(&mut q, 0x0000_0A55);
        assert_eq!(q.pushed, vec![0x55]);
        assert_eq!(reg.read(&mut q), 0x0000_0A00);
    }

    #[test]
    fn test_constant_field_ignores_writes() {
        let mut reg: Register<Queue> = Register::new("STATUS", 0x10)
            .with_field(BitField::constant("DONE", 0, 1, 1))
            .with_reserved(1, 31);
        reg.validate().unwrap();
        let mut q = Queue::default();
        reg.write(&mut q, 0);
        assert_eq!(reg.read(&mut q), 1);
        assert_eq!(reg.reset_value(), 1);
    }

    #[test]
    fn test_kind_builders_combine() {
        let field: BitField<Queue> = BitField::new("DATA", 0, 8, Access::ReadWrite)
            .on_write(queue_push)
            .on_read(queue_pop);
        assert!(matches!(field.kind, FieldKind::ComputedReadWrite(_, _)));
        assert_eq!(format!("{:?}", field.kind), "ComputedReadWrite");
    }

    #[test]
    fn test_register_file_reset_and_unmapped() {
        let regs = vec![
            Register::new("CFG", 0x08)
                .with_field(BitField::new("VALUE", 0, 16, Access::ReadWrite).with_default(0x1234))
                .with_reserved(16, 16),
            data_register(),
        ];
        let mut file = RegisterFile::new("test", regs).unwrap();
        let mut q = Queue::default();

        file.write(&mut q, 0x08, 0xBEEF);
        assert_eq!(file.read(&mut q, 0x08), 0xBEEF);
        file.reset();
        assert_eq!(file.read(&mut q, 0x08), 0x1234);

        // Unmapped offsets read as zero and swallow writes.
        file.write(&mut q, 0x0C, 0xFFFF_FFFF);
        assert_eq!(file.read(&mut q, 0x0C), 0);
        assert_eq!(file.field_value(0x08, "VALUE"), Some(0x1234));
    }

    #[test]
    fn test_register_file_rejects_duplicate_offset() {
        let regs: Vec<Register<Queue>> = vec![
            Register::new("A", 0x00).with_field(BitField::new("V", 0, 32, Access::ReadWrite)),
            Register::new("B", 0x00).with_field(BitField::new("V", 0, 32, Access::ReadWrite)),
        ];
        let err = RegisterFile::new("dup", regs).unwrap_err();
        assert!(err.to_string().contains("already used"));
    }
}
