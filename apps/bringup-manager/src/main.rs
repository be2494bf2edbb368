use actuator_bringup::{
    ActuatorPowerSequencer, Controller, ManagerConfig, MetricsHub, ModuleSet,
    RecoveryEventHandler, RecoveryOutcome, StartupSequence, ThreadDelay,
};
use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser};
use dxl_transport::{BusOpener, MockOpener};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod controller;
mod events;
mod modules;

use controller::LoopController;
use modules::{BaseModule, CycleMonitor};

const INIT_POSE_TIME: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "bringup-manager")]
#[command(about = "Actuator bus bring-up and button-triggered recovery")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the actuator bus
    #[arg(long)]
    device_name: Option<String>,

    #[arg(long)]
    baud_rate: Option<u32>,

    #[arg(long)]
    robot_file: Option<PathBuf>,

    #[arg(long)]
    offset_file: Option<PathBuf>,

    #[arg(long)]
    init_file: Option<PathBuf>,

    /// Run without hardware
    #[arg(long, action = ArgAction::SetTrue)]
    simulation: bool,

    #[arg(long)]
    simulation_robot_name: Option<String>,

    /// Use the in-memory mock bus instead of a serial port
    #[arg(long, action = ArgAction::SetTrue)]
    mock: bool,

    /// Read button events from this file or FIFO instead of stdin
    #[arg(long)]
    events: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long, action = ArgAction::SetTrue)]
    list_ports: bool,

    /// Print Prometheus metrics on exit
    #[arg(long, action = ArgAction::SetTrue)]
    dump_metrics: bool,
}

impl Args {
    fn apply(&self, cfg: &mut ManagerConfig) {
        if let Some(v) = &self.device_name {
            cfg.device_name = v.clone();
        }
        if let Some(v) = self.baud_rate {
            cfg.baud_rate = v;
        }
        if let Some(v) = &self.robot_file {
            cfg.robot_file = Some(v.clone());
        }
        if let Some(v) = &self.offset_file {
            cfg.offset_file = Some(v.clone());
        }
        if let Some(v) = &self.init_file {
            cfg.init_file = Some(v.clone());
        }
        if self.simulation {
            cfg.simulation = true;
        }
        if let Some(v) = &self.simulation_robot_name {
            cfg.simulation_robot_name = Some(v.clone());
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_tracing();

    let args = Args::parse();

    if args.list_ports {
        return list_serial_ports();
    }

    let mut config = ManagerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        port = %config.device_name,
        baud_rate = config.baud_rate,
        simulation = config.simulation,
        "bringup-manager starting"
    );

    let metrics = MetricsHub::new().map_err(|e| anyhow!(e))?;

    if args.mock {
        run(&args, &config, &metrics, MockOpener::new()).await?;
    } else {
        run_on_serial(&args, &config, &metrics).await?;
    }

    if args.dump_metrics {
        println!("{}", metrics.encode_text());
    }
    info!("bringup-manager stopped");
    Ok(())
}

#[cfg(feature = "serial")]
async fn run_on_serial(args: &Args, config: &ManagerConfig, metrics: &MetricsHub) -> Result<()> {
    run(args, config, metrics, dxl_transport::SerialOpener::default()).await
}

#[cfg(not(feature = "serial"))]
async fn run_on_serial(_: &Args, _: &ManagerConfig, _: &MetricsHub) -> Result<()> {
    Err(anyhow!("built without serial support; use --mock"))
}

#[cfg(feature = "serial")]
fn list_serial_ports() -> Result<()> {
    for port in dxl_transport::list_ports()? {
        println!("{}\t{}", port.name, port.driver);
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn list_serial_ports() -> Result<()> {
    Err(anyhow!("built without serial support"))
}

async fn run<O: BusOpener + Clone>(
    args: &Args,
    config: &ManagerConfig,
    metrics: &MetricsHub,
    opener: O,
) -> Result<()> {
    let cycle = config.timing.control_cycle();
    let mut controller = LoopController::new(config, opener.clone());
    let mut sink = controller.command_sink();

    let modules = ModuleSet::default()
        .with_sensor(Box::new(CycleMonitor::new(cycle)))
        .with_motion(Box::new(BaseModule::new(INIT_POSE_TIME, cycle)));
    let sequencer = ActuatorPowerSequencer::new(config).with_metrics(metrics.bringup.clone());
    let report = StartupSequence::new(config, sequencer).run(
        &opener,
        &ThreadDelay,
        &mut controller,
        modules,
        &mut sink,
    )?;
    info!(
        power = ?report.power,
        calibration_loaded = report.calibration_loaded,
        "startup complete"
    );

    let mut handler = RecoveryEventHandler::new(config, opener, ThreadDelay)
        .with_metrics(metrics.bringup.clone());

    let (tx, mut rx) = mpsc::channel::<String>(8);
    events::spawn_reader(args.events.clone(), tx)?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(payload) => {
                    match handler.handle_event(&payload, &mut controller, &mut sink) {
                        RecoveryOutcome::Ignored => {}
                        RecoveryOutcome::Busy => warn!("recovery already in progress"),
                        RecoveryOutcome::Resumed { powered_on } => {
                            info!(powered_on, "recovery complete")
                        }
                        RecoveryOutcome::Aborted(e) => {
                            error!(error = %e, "recovery aborted; control loop left stopped")
                        }
                    }
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    controller.stop_periodic_loop();
    Ok(())
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
