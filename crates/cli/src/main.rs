// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod runner;

use clap::{Parser, Subcommand};
use raptor_config::{AccessScript, BoardDescriptor};
use raptor_core::bus::SystemBus;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "Raptor peripheral simulator", long_about = None)]
struct Cli {
    /// Enable debug-level logging of every register access
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a register access script against a board.
    Run(RunArgs),

    /// Print the memory map of a board.
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Board descriptor (YAML). Defaults to the `board` named in the script,
    /// resolved relative to the script.
    #[arg(short, long)]
    board: Option<PathBuf>,

    /// Access script (YAML)
    #[arg(short, long)]
    script: PathBuf,

    /// Write the final peripheral state (JSON) to this path.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Board descriptor (YAML)
    #[arg(short, long)]
    board: PathBuf,

    /// Print the memory map as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct MapEntry {
    name: String,
    r#type: raptor_config::PeripheralKind,
    base: u64,
    size: u64,
    irq: Option<u32>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Inspect(args) => inspect(args),
    }
}

fn resolve_board(args: &RunArgs, script: &AccessScript) -> anyhow::Result<PathBuf> {
    if let Some(board) = &args.board {
        return Ok(board.clone());
    }
    let Some(board) = &script.board else {
        anyhow::bail!("No board given: pass --board or set 'board' in the script");
    };
    Ok(args
        .script
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(board))
}

fn load(args: &RunArgs) -> anyhow::Result<(AccessScript, SystemBus)> {
    let script = AccessScript::from_file(&args.script)?;
    let board_path = resolve_board(args, &script)?;
    info!("Loading board: {:?}", board_path);
    let board = BoardDescriptor::from_file(&board_path)?;
    let bus = SystemBus::from_config(&board)?;
    Ok((script, bus))
}

fn run(args: RunArgs) -> ExitCode {
    let (script, bus) = match load(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let report = match runner::execute(&bus, &script) {
        Ok(report) => report,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    if args.json {
        match serde_json::to_string(&report) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
    } else {
        for read in &report.reads {
            println!(
                "step {:>3}: [{:#010x}] = {:#010x}",
                read.step, read.address, read.value
            );
        }
        if !report.uart_tx.is_empty() {
            println!("uart: {:?}", report.uart_tx);
        }
    }

    if let Some(path) = &args.snapshot {
        write_snapshot(path, &bus);
    }

    info!(
        "{} steps executed, {} assertion(s) failed",
        report.steps_executed,
        report.failures.len()
    );
    if report.passed() {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_ASSERT_FAIL)
    }
}

fn write_snapshot(path: &Path, bus: &SystemBus) {
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, &bus.snapshot()) {
                error!("Failed to write snapshot {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create snapshot {:?}: {}", path, e),
    }
}

fn inspect(args: InspectArgs) -> ExitCode {
    let built = BoardDescriptor::from_file(&args.board)
        .and_then(|board| SystemBus::from_config(&board).map(|bus| (board, bus)));
    let (board, bus) = match built {
        Ok(built) => built,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut map: Vec<MapEntry> = board
        .peripherals
        .iter()
        .filter_map(|cfg| {
            let entry = bus.peripherals.iter().find(|p| p.name == cfg.id)?;
            Some(MapEntry {
                name: entry.name.clone(),
                r#type: cfg.r#type,
                base: entry.base,
                size: entry.size,
                irq: entry.irq,
            })
        })
        .collect();
    map.sort_by_key(|e| e.base);

    if args.json {
        match serde_json::to_string_pretty(&map) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to serialize memory map: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        println!("{}", board.name);
        for e in &map {
            let irq = e.irq.map(|i| i.to_string()).unwrap_or_else(|| "-".into());
            println!(
                "  {:#010x}..{:#010x}  {:<8} {:<5} irq {}",
                e.base,
                e.base + e.size,
                e.name,
                format!("{:?}", e.r#type).to_lowercase(),
                irq
            );
        }
    }
    ExitCode::from(EXIT_PASS)
}
