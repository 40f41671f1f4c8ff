use crate::packet::{MeasurementPacket, PacketLayout};
use crate::prelude::{CoreError, CoreResult};
use crate::signal::ReadySignal;
use crate::telemetry::StreamMetrics;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Latest published packet plus the coalescing "packet ready" signal.
///
/// The pipeline publishes by copying its working packet in; the transmitter
/// encodes the slot into its own buffer. Both happen under the slot mutex,
/// so a send never sees a packet that is being overwritten.
pub struct PacketSlot {
    packet: Mutex<MeasurementPacket>,
    ready: Arc<ReadySignal>,
}

impl PacketSlot {
    pub fn new(layout: PacketLayout) -> Self {
        Self {
            packet: Mutex::new(MeasurementPacket::new(layout)),
            ready: ReadySignal::new(),
        }
    }

    pub fn publish(&self, packet: &MeasurementPacket) {
        {
            let mut slot = self.packet.lock().unwrap_or_else(PoisonError::into_inner);
            slot.clone_from(packet);
        }
        self.ready.raise();
    }

    pub async fn wait_ready(&self) {
        self.ready.wait().await;
    }

    pub fn encode_latest(&self, buf: &mut Vec<u8>) {
        let slot = self.packet.lock().unwrap_or_else(PoisonError::into_inner);
        slot.encode_into(buf);
    }

    pub fn latest(&self) -> MeasurementPacket {
        self.packet
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Destination and selection state shared by every device task.
pub struct SessionContext {
    destination: RwLock<Ipv4Addr>,
    controller: RwLock<Option<SocketAddr>>,
    selected: AtomicBool,
    packets: PacketSlot,
    metrics: StreamMetrics,
}

impl SessionContext {
    pub fn new(fallback: Ipv4Addr, layout: PacketLayout) -> Arc<Self> {
        Arc::new(Self {
            destination: RwLock::new(fallback),
            controller: RwLock::new(None),
            selected: AtomicBool::new(false),
            packets: PacketSlot::new(layout),
            metrics: StreamMetrics::new(),
        })
    }

    pub fn destination(&self) -> Ipv4Addr {
        *self
            .destination
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn controller(&self) -> Option<SocketAddr> {
        *self
            .controller
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::Acquire)
    }

    /// Claims the session for `controller`, streaming to `destination`.
    ///
    /// Only the first call succeeds; there is no re-selection.
    pub fn select(&self, controller: SocketAddr, destination: Ipv4Addr) -> CoreResult<()> {
        let mut current = self
            .controller
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = *current {
            return Err(CoreError::AlreadySelected(existing));
        }
        *current = Some(controller);
        *self
            .destination
            .write()
            .unwrap_or_else(PoisonError::into_inner) = destination;
        self.selected.store(true, Ordering::Release);
        Ok(())
    }

    pub fn packets(&self) -> &PacketSlot {
        &self.packets
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }
}
