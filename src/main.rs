//! Command-line front end for the bench instruments.
//!
//! ```bash
//! bench_daq ports
//! bench_daq --port /dev/ttyACM0 check
//! bench_daq --port /dev/ttyACM0 move 100 200
//! bench_daq --port /dev/ttyACM0 open-loop --output step.csv
//! bench_daq aoi-adjust 1001 3 1000 255
//! bench_daq cmos-acquire --frames 50 --name dark --simulate
//! ```
//!
//! Log verbosity follows `application.log_level`, overridden by `RUST_LOG`.

use anyhow::{bail, Context, Result};
use bench_daq::adapters::list_ports;
use bench_daq::camera::aoi::{X_MAX, Y_MAX};
use bench_daq::camera::{Aoi, AoiGrid, Camera, SimulatedDriver};
use bench_daq::config::Settings;
use bench_daq::data::{acquisition, storage};
use bench_daq::instrument::ScannerController;
use bench_daq::logging;
use bench_daq::protocol::OpenLoopAck;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bench_daq")]
#[command(about = "Scanner/photodiode controller and CMOS camera bench tool")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ./bench_daq.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial port of the controller board, overrides serial.port
    #[arg(long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,

    /// Probe the controller board
    Check,

    /// Read the photodiode position
    Position,

    /// Move the scanner and report the measured position
    Move {
        /// Scanner X target
        #[arg(allow_hyphen_values = true)]
        x: f64,
        /// Scanner Y target
        #[arg(allow_hyphen_values = true)]
        y: f64,
    },

    /// Halt motion
    Stop,

    /// Run an open-loop step-response capture and read it back
    OpenLoop {
        /// Write samples as `index;x;y;step` to this file instead of JSON on stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reset the open-loop capture on the board
    ResetOpenLoop,

    /// Show how an AOI is snapped to the sensor grid
    AoiAdjust {
        /// X offset
        #[arg(allow_hyphen_values = true)]
        x: i32,
        /// Y offset
        #[arg(allow_hyphen_values = true)]
        y: i32,
        /// Width
        #[arg(allow_hyphen_values = true)]
        width: i32,
        /// Height
        #[arg(allow_hyphen_values = true)]
        height: i32,
    },

    /// Acquire frames and export per-frame and central-pixel statistics
    CmosAcquire {
        /// Number of frames
        #[arg(short, long, default_value = "100")]
        frames: usize,

        /// Session name used for the exported files
        #[arg(short, long)]
        name: Option<String>,

        /// Delay between frames in milliseconds
        #[arg(long, default_value = "0")]
        interval_ms: u64,

        /// Use the simulated camera
        #[arg(long)]
        simulate: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::from_path(path),
        None => Settings::load(),
    }
    .context("Failed to load configuration")?;
    logging::init(&settings.application.log_level)?;

    match args.command {
        Command::Ports => cmd_ports(),
        Command::Check => {
            let mut board = connect(&settings, args.port.as_deref())?;
            if board.check_connection() {
                println!("Controller OK");
                Ok(())
            } else {
                bail!("Controller did not answer the connection check")
            }
        }
        Command::Position => {
            let mut board = connect(&settings, args.port.as_deref())?;
            match board.query_position()? {
                Some(pos) => println!("{} {}", pos.x, pos.y),
                None => bail!("Malformed position response"),
            }
            Ok(())
        }
        Command::Move { x, y } => {
            let mut board = connect(&settings, args.port.as_deref())?;
            match board.move_to(x, y)? {
                Some(pos) => println!("{} {}", pos.x, pos.y),
                None => bail!("Malformed move response"),
            }
            Ok(())
        }
        Command::Stop => {
            let mut board = connect(&settings, args.port.as_deref())?;
            board.stop()?;
            Ok(())
        }
        Command::OpenLoop { output } => {
            let mut board = connect(&settings, args.port.as_deref())?;
            cmd_open_loop(&mut board, output)
        }
        Command::ResetOpenLoop => {
            let mut board = connect(&settings, args.port.as_deref())?;
            board.reset_open_loop_scan()?;
            Ok(())
        }
        Command::AoiAdjust {
            x,
            y,
            width,
            height,
        } => {
            cmd_aoi_adjust(&settings, x, y, width, height);
            Ok(())
        }
        Command::CmosAcquire {
            frames,
            name,
            interval_ms,
            simulate,
        } => cmd_cmos_acquire(&settings, frames, name, interval_ms, simulate),
    }
}

fn connect(settings: &Settings, port: Option<&str>) -> Result<ScannerController> {
    let Some(port) = port.or(settings.serial.port.as_deref()) else {
        bail!("No serial port given; use --port or set serial.port");
    };
    let mut board = ScannerController::from_settings(settings);
    if !board.connect(port) {
        bail!("Cannot open serial port '{}'", port);
    }
    Ok(board)
}

fn cmd_ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn cmd_open_loop(board: &mut ScannerController, output: Option<PathBuf>) -> Result<()> {
    match board.start_open_loop_scan()? {
        Some(OpenLoopAck::Accepted) => {}
        Some(OpenLoopAck::Rejected) => {
            bail!(
                "Controller rejected {} samples at {} Hz",
                board.open_loop_samples(),
                board.sampling_frequency()
            )
        }
        None => bail!("Malformed open-loop acknowledgement"),
    }

    let samples = board.acquire_open_loop_data()?;
    match output {
        Some(path) => storage::write_open_loop(&path, &samples)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", serde_json::to_string_pretty(&samples)?),
    }
    Ok(())
}

fn cmd_aoi_adjust(settings: &Settings, x: i32, y: i32, width: i32, height: i32) {
    let grid = AoiGrid {
        strict_y_bound: settings.camera.strict_y_bound,
    };
    let adjusted = grid.adjust(x, y, width, height);
    let negotiated = grid.negotiate(Aoi::new(x, y, width, height), X_MAX, Y_MAX);
    println!("adjusted:   {adjusted}");
    println!("negotiated: {negotiated}");
}

fn cmd_cmos_acquire(
    settings: &Settings,
    frames: usize,
    name: Option<String>,
    interval_ms: u64,
    simulate: bool,
) -> Result<()> {
    if !simulate {
        bail!("No camera SDK driver is linked into this build; run with --simulate");
    }
    let driver = SimulatedDriver::new();

    let mut camera = Camera::from_config(&settings.camera);
    camera
        .connect_with_config(&driver, &settings.camera)
        .context("Failed to connect camera")?;
    info!("Acquiring on AOI {}", camera.aoi()?);

    let result = acquisition::run(&mut camera, frames, Duration::from_millis(interval_ms))?;
    camera.disconnect()?;

    let name = name.unwrap_or_else(storage::session_name);
    let (pixel, frame) = storage::export_session(&settings.storage.output_dir, &name, &result)?;
    if let Some((mean, stdev)) = result.pixel_summary() {
        println!("central pixel: mean {mean:.3}, stdev {stdev:.3}");
    }
    println!("{}\n{}", pixel.display(), frame.display());
    Ok(())
}
