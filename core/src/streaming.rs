use crate::acquisition::{AcquisitionTask, Sampler};
use crate::config::DeviceConfig;
use crate::prelude::{CoreResult, StreamControl};
use crate::session::SessionContext;
use crate::transmit::Transmitter;
use log::{error, info};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Builds a fresh hardware sampler for each streaming (re)start.
pub type SamplerFactory = Box<dyn Fn() -> Box<dyn Sampler> + Send + Sync>;

#[derive(Default)]
struct StreamTasks {
    acquisition: Option<JoinHandle<()>>,
    transmit: Option<JoinHandle<()>>,
}

impl StreamTasks {
    fn abort(self) {
        for handle in [self.acquisition, self.transmit].into_iter().flatten() {
            handle.abort();
        }
    }
}

/// Owns the acquisition and transmit task handles.
///
/// `restart` must run inside a Tokio runtime since it spawns the tasks.
pub struct StreamSupervisor {
    config: DeviceConfig,
    session: Arc<SessionContext>,
    sampler_factory: SamplerFactory,
    tasks: Mutex<StreamTasks>,
}

impl StreamSupervisor {
    pub fn new(
        config: DeviceConfig,
        session: Arc<SessionContext>,
        sampler_factory: SamplerFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            session,
            sampler_factory,
            tasks: Mutex::new(StreamTasks::default()),
        })
    }

    pub fn acquisition_running(&self) -> bool {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.acquisition.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn transmit_running(&self) -> bool {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.transmit.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn spawn_transmit(&self) -> JoinHandle<()> {
        let session = Arc::clone(&self.session);
        let data_port = self.config.network.data_port;
        tokio::spawn(async move {
            match Transmitter::bind(session, data_port).await {
                Ok(transmitter) => transmitter.run().await,
                Err(err) => error!(target: "transmit", "unable to create data socket: {}", err),
            }
        })
    }
}

impl StreamControl for StreamSupervisor {
    /// Tears down any running tasks and starts fresh ones. The transmitter
    /// starts even if the sampler fails to come up.
    fn restart(&self) -> CoreResult<()> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tasks).abort();

        tasks.transmit = Some(self.spawn_transmit());

        let sampler = (self.sampler_factory)();
        let acquisition = AcquisitionTask::start(&self.config, sampler, Arc::clone(&self.session))
            .inspect_err(|err| error!(target: "acquisition", "acquisition not started: {}", err))?;
        tasks.acquisition = Some(tokio::spawn(acquisition.run()));
        info!(target: "acquisition", "streaming tasks started");
        Ok(())
    }

    fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tasks).abort();
    }
}
