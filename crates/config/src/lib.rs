// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

const SUPPORTED_SCHEMA: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeripheralKind {
    #[serde(alias = "serial")]
    Uart,
    #[serde(alias = "spi_master")]
    Spi,
    #[serde(alias = "gpio_port")]
    Gpio,
}

/// How a UART derives its interrupt output.
///
/// The two policies are mutually exclusive and fixed for the lifetime of an
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPolicy {
    /// Interrupt is high whenever the receive FIFO holds data. Transmission is
    /// instantaneous and unbounded.
    #[default]
    Level,
    /// Interrupt sources gated by TXWM/RXWM enables and FIFO watermarks.
    /// Transmission goes through a bounded FIFO.
    Watermark,
}

fn default_uart_fifo_depth() -> usize {
    10
}

fn default_uart_frequency() -> u32 {
    50_000_000
}

fn default_spi_fifo_depth() -> usize {
    16
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartConfig {
    #[serde(default = "default_uart_fifo_depth")]
    pub fifo_depth: usize,
    /// System clock feeding the baud generator, in Hz.
    #[serde(default = "default_uart_frequency")]
    pub frequency: u32,
    #[serde(default)]
    pub interrupt_policy: InterruptPolicy,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            fifo_depth: default_uart_fifo_depth(),
            frequency: default_uart_frequency(),
            interrupt_policy: InterruptPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiConfig {
    #[serde(default = "default_spi_fifo_depth")]
    pub fifo_depth: usize,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            fifo_depth: default_spi_fifo_depth(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeripheralConfig {
    pub id: String,
    pub r#type: PeripheralKind,
    pub base_address: u64,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub irq: Option<u32>,
    #[serde(default)]
    pub uart: Option<UartConfig>,
    #[serde(default)]
    pub spi: Option<SpiConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoardDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub peripherals: Vec<PeripheralConfig>,
}

impl BoardDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read board descriptor at {:?}", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let board: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Board Descriptor YAML")?;
        board.validate()?;
        Ok(board)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SUPPORTED_SCHEMA {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SUPPORTED_SCHEMA
            );
        }

        let mut seen = HashSet::new();
        for p in &self.peripherals {
            if !seen.insert(p.id.as_str()) {
                anyhow::bail!("Duplicate peripheral id '{}'", p.id);
            }
            if p.base_address % 4 != 0 {
                anyhow::bail!(
                    "Peripheral '{}' base address {:#x} is not word-aligned",
                    p.id,
                    p.base_address
                );
            }
            if p.uart.is_some() && p.r#type != PeripheralKind::Uart {
                tracing::warn!("Ignoring 'uart' section on non-UART peripheral '{}'", p.id);
            }
            if p.spi.is_some() && p.r#type != PeripheralKind::Spi {
                tracing::warn!("Ignoring 'spi' section on non-SPI peripheral '{}'", p.id);
            }
        }

        Ok(())
    }
}

/// One step of a register access script.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum AccessStep {
    Write {
        address: u64,
        value: u32,
    },
    Read {
        address: u64,
    },
    Expect {
        address: u64,
        value: u32,
        #[serde(default)]
        mask: Option<u32>,
    },
    /// Feed bytes into a UART receive path as if they arrived on the wire.
    InjectUart {
        peripheral: String,
        data: String,
    },
    /// Drive a GPIO pin from outside the chip.
    DrivePin {
        peripheral: String,
        pin: u8,
        high: bool,
    },
    Tick {
        #[serde(default = "default_tick_count")]
        count: u32,
    },
    Reset,
}

fn default_tick_count() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AccessScript {
    pub schema_version: String,
    #[serde(default)]
    pub board: Option<String>,
    pub steps: Vec<AccessStep>,
}

impl AccessScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read access script at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Access Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SUPPORTED_SCHEMA {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SUPPORTED_SCHEMA
            );
        }

        if self.steps.is_empty() {
            anyhow::bail!("Access script must contain at least one step");
        }

        for step in &self.steps {
            match step {
                AccessStep::Write { address, .. }
                | AccessStep::Read { address }
                | AccessStep::Expect { address, .. }
                    if address % 4 != 0 =>
                {
                    anyhow::bail!("Register address {:#x} is not word-aligned", address);
                }
                AccessStep::DrivePin { pin, .. } if *pin >= 16 => {
                    anyhow::bail!("Pin index {} out of range (0..16)", pin);
                }
                _ => {}
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
