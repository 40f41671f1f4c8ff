//! Discovery/selection handshake.
//!
//! The device starts in [`DiscoveryState::Advertising`]: an advertiser
//! broadcasts its address while a listener waits for `SELECTED <ip>`. The
//! first valid selection moves it to [`DiscoveryState::Selected`], which is
//! terminal. There is no timeout and no way back to advertising.

pub mod advertiser;
pub mod listener;
pub mod message;

pub use advertiser::Advertiser;
pub use listener::{Listener, Selection};
pub use message::{parse_selection, selection_message, DeviceIdentity, MacAddress};

use crate::config::NetworkConfig;
use crate::prelude::StreamControl;
use crate::session::SessionContext;
use log::{error, info};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Advertising,
    Selected,
}

/// Owns the advertiser and listener tasks of one device session.
pub struct Discovery {
    network: NetworkConfig,
    identity: DeviceIdentity,
    session: Arc<SessionContext>,
    control: Arc<dyn StreamControl>,
    advertiser: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Discovery {
    pub fn new(
        network: NetworkConfig,
        identity: DeviceIdentity,
        session: Arc<SessionContext>,
        control: Arc<dyn StreamControl>,
    ) -> Arc<Self> {
        Arc::new(Self {
            network,
            identity,
            session,
            control,
            advertiser: Mutex::new(None),
            listener: Mutex::new(None),
        })
    }

    pub fn state(&self) -> DiscoveryState {
        if self.session.is_selected() {
            DiscoveryState::Selected
        } else {
            DiscoveryState::Advertising
        }
    }

    /// Spawns the advertiser, which in turn spawns the listener.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(this.advertise());
        *self.advertiser.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn stop_advertiser(&self) {
        if let Some(handle) = self
            .advertiser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            info!(target: "discovery", "advertiser stopped");
        }
    }

    pub fn advertiser_running(&self) -> bool {
        running(&self.advertiser)
    }

    pub fn listener_running(&self) -> bool {
        running(&self.listener)
    }

    async fn advertise(self: Arc<Self>) {
        self.spawn_listener();

        let advertiser =
            match Advertiser::bind(&self.network, self.identity, Arc::clone(&self.session)).await {
                Ok(advertiser) => advertiser,
                Err(err) => {
                    error!(target: "discovery", "unable to create announcement socket: {}", err);
                    return;
                }
            };
        advertiser.run().await;
    }

    fn spawn_listener(self: &Arc<Self>) {
        let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(tokio::spawn(Arc::clone(self).listen()));
        }
    }

    async fn listen(self: Arc<Self>) {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.network.selection_port);
        let listener = match Listener::bind(addr, Arc::clone(&self.session), Arc::clone(&self.control)).await {
            Ok(listener) => listener
                .with_greeting(self.network.greeting.clone(), self.network.greeting_port)
                .with_restart_delay(self.network.advertise_interval()),
            Err(err) => {
                error!(target: "discovery", "unable to bind selection port {}: {}", addr, err);
                return;
            }
        };
        info!(target: "discovery", "waiting for selection on {}", addr);

        let selection = listener.run().await;
        self.stop_advertiser();
        info!(
            target: "discovery",
            "handshake with {} complete",
            selection.controller
        );
    }
}

fn running(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .is_some_and(|handle| !handle.is_finished())
}
