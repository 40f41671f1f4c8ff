use crate::generator::sampler::SyntheticSampler;
use crate::workflow::config::SimulatorConfig;
use anyhow::{anyhow, Context};
use energycore::acquisition::Sampler;
use energycore::discovery::{DeviceIdentity, Discovery, MacAddress};
use energycore::packet::PacketLayout;
use energycore::streaming::{SamplerFactory, StreamSupervisor};
use energycore::{SessionContext, StreamControl};
use log::info;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::signal;

/// Locally administered address derived from the IPv4 address, since the
/// host interface MAC is not available here.
pub fn synthetic_mac(ip: Ipv4Addr) -> MacAddress {
    let [a, b, c, d] = ip.octets();
    MacAddress([0x02, 0x00, a, b, c, d])
}

pub fn local_ipv4() -> anyhow::Result<Ipv4Addr> {
    match local_ip_address::local_ip().context("resolving local IP address")? {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => Err(anyhow!("local address {} is not IPv4", ip)),
    }
}

pub fn sampler_factory(config: &SimulatorConfig) -> SamplerFactory {
    let generator = config.generator.clone();
    let dc_offset = config.device.calibration.dc_offset;
    Box::new(move || -> Box<dyn Sampler> {
        Box::new(SyntheticSampler::new(generator.clone(), dc_offset))
    })
}

/// Handles of a running device: nothing streams until a controller
/// selects it, at which point discovery restarts the supervisor.
pub struct DeviceHandles {
    pub session: Arc<SessionContext>,
    pub supervisor: Arc<StreamSupervisor>,
    pub discovery: Arc<Discovery>,
}

/// Builds the session and tasks and starts advertising.
pub fn start_device(config: &SimulatorConfig, identity: DeviceIdentity) -> DeviceHandles {
    let device = &config.device;
    let session = SessionContext::new(device.network.broadcast_ip, PacketLayout::from_config(device));
    let supervisor = StreamSupervisor::new(device.clone(), Arc::clone(&session), sampler_factory(config));
    let discovery = Discovery::new(device.network.clone(), identity, Arc::clone(&session), supervisor.clone());
    discovery.start();
    DeviceHandles {
        session,
        supervisor,
        discovery,
    }
}

/// Runs the device side until Ctrl-C.
pub async fn run_device(config: SimulatorConfig) -> anyhow::Result<()> {
    let ip = local_ipv4()?;
    let identity = DeviceIdentity {
        ip,
        mac: synthetic_mac(ip),
    };
    info!(target: "discovery", "device identity {}", identity.announcement());

    let DeviceHandles {
        session,
        supervisor,
        discovery,
    } = start_device(&config, identity);

    signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
    discovery.stop_advertiser();
    supervisor.stop();

    let metrics = session.metrics().snapshot();
    info!(
        target: "acquisition",
        "shutting down: {} frames, {} packets sent, {} read errors, {} send errors",
        metrics.frames_processed,
        metrics.packets_sent,
        metrics.read_errors,
        metrics.send_errors
    );
    Ok(())
}
