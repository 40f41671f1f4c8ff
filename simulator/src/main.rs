use anyhow::Context;
use clap::Parser;
use controller::Controller;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::SimulatorConfig;
use workflow::runner::{OfflineSummary, Runner};

mod controller;
mod device;
mod generator;
mod workflow;

const DEFAULT_OFFLINE_CYCLES: usize = 100;

#[derive(Parser)]
#[command(author, version, about = "Energy meter core driver")]
struct Args {
    /// Load device and generator settings from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run the acquisition pipeline on generated frames and print a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Frames to process offline, or packets to receive as controller
    #[arg(long)]
    cycles: Option<usize>,
    /// Print the offline summary as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Act as the host controller instead of the device
    #[arg(long, default_value_t = false)]
    controller: bool,
    /// Skip discovery and select this device directly
    #[arg(long)]
    device_ip: Option<Ipv4Addr>,
}

fn print_summary(summary: &OfflineSummary, json: bool) -> anyhow::Result<()> {
    if json {
        let text = serde_json::to_string_pretty(summary).context("serializing offline summary")?;
        println!("{}", text);
        return Ok(());
    }
    println!(
        "Offline run -> packets {}, last count {}, dropped records {}, rate {:.2} packets/s, {} bytes on the wire",
        summary.packets,
        summary.last_packet_count,
        summary.dropped_records,
        summary.measured_rate,
        summary.wire_bytes
    );
    for channel in &summary.channels {
        println!(
            "  channel {}: mean {:.1}, rms {:.1}",
            channel.channel, channel.mean, channel.rms
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = SimulatorConfig::load_or_default(args.config.as_ref())?;

    if args.offline {
        let cycles = args.cycles.unwrap_or(DEFAULT_OFFLINE_CYCLES);
        let summary = Runner::new(config).execute(cycles)?;
        return print_summary(&summary, args.json);
    }

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating runtime")?;

    if args.controller {
        let controller = Controller::new(&config.device, device::local_ipv4()?);
        let report = runtime.block_on(controller.run(args.device_ip, args.cycles))?;
        println!(
            "Controller -> device {}, greeting {:?}, packets {}",
            report.device,
            report.greeting,
            report.packets.len()
        );
        return Ok(());
    }

    runtime.block_on(device::run_device(config))
}
