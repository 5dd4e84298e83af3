//! Flipdot Driver CLI Application
//!
//! Runs the flipdot driver as a long-lived service. It uses the
//! flipdot-driver library and adds:
//! - Configuration file loading and validation
//! - Serial port setup for the panel bus
//! - The RPC listener
//! - Power-up before serving and power-down after an interrupt

use anyhow::{Context, Result};
use clap::Parser;
use flipdot_driver::outputs::SysfsOutputProvider;
use flipdot_driver::testing::RecordingOutputs;
use flipdot_driver::{Controller, HanoverLink, Service};
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod server;

use config::AppConfig;
use server::Server;

/// Flipdot Driver - Serve remote control of flipdot signs and their light
#[derive(Parser, Debug)]
#[command(name = "flipdot-driver")]
#[command(about = "Serve remote control of Hanover flipdot signs", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Run without hardware: frames are encoded and discarded, outputs are simulated
    #[arg(long)]
    dry_run: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Flipdot Driver CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using driver library v{}", flipdot_driver::VERSION);

    log::info!("Loading configuration from: {:?}", args.config);
    let config = config::load_config(&args.config)?;
    log::debug!("Configuration loaded successfully");

    if args.check {
        println!("✓ Configuration valid: {:?}", args.config);
        println!("  Signs: {}", config.signs.len());
        for sign in &config.signs {
            println!(
                "    {} @ {}: {}x{}{}",
                sign.name,
                sign.address,
                sign.width,
                sign.height,
                if sign.flip { " (flipped)" } else { "" }
            );
        }
        return Ok(());
    }

    run(&config, args.dry_run)
}

/// Power up, serve until interrupted, power down
fn run(config: &AppConfig, dry_run: bool) -> Result<()> {
    let driver_config = config.driver_config();

    let controller = if dry_run {
        log::warn!("Dry run: no serial or GPIO access");
        Controller::from_config(
            &driver_config,
            Box::new(HanoverLink::new(std::io::sink())),
            &RecordingOutputs::new(),
        )
    } else {
        let port = open_serial(&config.serial_port, config.baud_rate)?;
        Controller::from_config(
            &driver_config,
            Box::new(HanoverLink::new(port)),
            &SysfsOutputProvider::new(),
        )
    }
    .context("Failed to initialize controller")?;

    // Dropping the controller on any early return powers the signs down
    let controller = Arc::new(controller);
    controller.start().context("Failed to power up signs")?;

    let service = Arc::new(Service::new(Arc::clone(&controller)));
    let server = Server::bind(
        (config.listen_address.as_str(), config.rpc_port),
        service,
        config.max_workers,
    )?;

    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || {
        log::info!("Interrupt received, stopping");
        handle.stop();
    })
    .context("Failed to install interrupt handler")?;

    log::info!("Listening on {}", server.local_addr()?);
    let served = server.serve();
    drop(server);

    controller
        .shutdown()
        .context("Failed to power down signs")?;
    log::info!("Shut down cleanly");
    served
}

/// Open the panel bus: 8 data bits, no parity, one stop bit
fn open_serial(path: &str, baud_rate: usize) -> Result<serial::SystemPort> {
    use serial::prelude::*;

    log::info!("Opening serial port {} at {} baud", path, baud_rate);
    let mut port =
        serial::open(path).with_context(|| format!("Failed to open serial port: {}", path))?;
    port.reconfigure(&|settings| {
        settings.set_baud_rate(serial::BaudRate::from_speed(baud_rate))?;
        settings.set_char_size(serial::Bits8);
        settings.set_parity(serial::ParityNone);
        settings.set_stop_bits(serial::Stop1);
        settings.set_flow_control(serial::FlowNone);
        Ok(())
    })
    .with_context(|| format!("Failed to configure serial port: {}", path))?;
    Ok(port)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
