use crate::acquisition::pipeline::AcquisitionPipeline;
use crate::acquisition::sampler::{ConversionRecord, Sampler, SamplerError, SamplerSettings};
use crate::config::DeviceConfig;
use crate::prelude::CoreResult;
use crate::session::SessionContext;
use crate::signal::ReadySignal;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;

/// Acquisition task: waits for frames, runs the pipeline, publishes packets.
pub struct AcquisitionTask {
    pipeline: AcquisitionPipeline,
    sampler: Box<dyn Sampler>,
    session: Arc<SessionContext>,
    frame_ready: Arc<ReadySignal>,
    frame: Vec<ConversionRecord>,
}

impl AcquisitionTask {
    /// Builds the pipeline and brings the sampler up. A failure here is
    /// fatal for the task; nothing is retried.
    pub fn start(
        config: &DeviceConfig,
        mut sampler: Box<dyn Sampler>,
        session: Arc<SessionContext>,
    ) -> CoreResult<Self> {
        let pipeline = AcquisitionPipeline::new(config)?;
        let settings = SamplerSettings::from_config(&config.acquisition);
        let frame_ready = ReadySignal::new();

        sampler.configure(&settings, Arc::clone(&frame_ready))?;
        sampler.start()?;
        info!(
            target: "acquisition",
            "sampler running at {} Hz over {} channels",
            settings.aggregate_rate,
            settings.channel_pattern.len()
        );

        Ok(Self {
            frame: Vec::with_capacity(settings.frame_capacity),
            pipeline,
            sampler,
            session,
            frame_ready,
        })
    }

    /// Handles one pending frame. Read errors skip the cycle; so does a
    /// wake-up whose frame an earlier cycle already consumed.
    pub async fn cycle(&mut self) {
        self.frame_ready.wait().await;

        self.frame.clear();
        match self.sampler.read_frame(&mut self.frame) {
            Ok(()) => {}
            Err(SamplerError::Empty) => {
                debug!(target: "acquisition", "no frame pending, skipping cycle");
                return;
            }
            Err(err) => {
                error!(target: "acquisition", "error reading frame: {}", err);
                self.session.metrics().record_read_error();
                return;
            }
        }

        let report = self.pipeline.process_frame(&self.frame, Instant::now());
        self.session.metrics().record_frame(report.dropped_records);
        if report.dropped_records > 0 {
            debug!(
                target: "acquisition",
                "packet {} dropped {} records",
                report.packet_count,
                report.dropped_records
            );
        }
        self.session.packets().publish(self.pipeline.packet());
    }

    pub async fn run(mut self) {
        loop {
            self.cycle().await;
        }
    }
}

impl Drop for AcquisitionTask {
    fn drop(&mut self) {
        if let Err(err) = self.sampler.stop() {
            error!(target: "acquisition", "error stopping sampler: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketLayout;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Shared {
        signal: Option<Arc<ReadySignal>>,
        frames: Vec<Result<Vec<ConversionRecord>, SamplerError>>,
        stopped: bool,
    }

    struct ScriptedSampler {
        shared: Arc<Mutex<Shared>>,
        fail_configure: bool,
    }

    impl Sampler for ScriptedSampler {
        fn configure(
            &mut self,
            _settings: &SamplerSettings,
            frame_ready: Arc<ReadySignal>,
        ) -> Result<(), SamplerError> {
            if self.fail_configure {
                return Err(SamplerError::Configuration("no ADC unit".into()));
            }
            self.shared.lock().unwrap().signal = Some(frame_ready);
            Ok(())
        }

        fn start(&mut self) -> Result<(), SamplerError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), SamplerError> {
            self.shared.lock().unwrap().stopped = true;
            Ok(())
        }

        fn read_frame(&mut self, out: &mut Vec<ConversionRecord>) -> Result<(), SamplerError> {
            let mut shared = self.shared.lock().unwrap();
            if shared.frames.is_empty() {
                return Err(SamplerError::Empty);
            }
            out.extend(shared.frames.remove(0)?);
            Ok(())
        }
    }

    fn small_config() -> DeviceConfig {
        let mut config = DeviceConfig::default();
        config.acquisition.channel_pattern = vec![0, 3];
        config.acquisition.samples_per_channel = 4;
        config.filters.delayed_channels = vec![1];
        config.filters.low_pass = false;
        config.filters.fractional_delay = false;
        config.calibration.channel_coeffs = vec![5, 6];
        config
    }

    fn frame(value: u16) -> Vec<ConversionRecord> {
        (0..4)
            .flat_map(|_| [ConversionRecord::new(0, value), ConversionRecord::new(3, value + 1)])
            .collect()
    }

    fn session_for(config: &DeviceConfig) -> Arc<SessionContext> {
        SessionContext::new(Ipv4Addr::LOCALHOST, PacketLayout::from_config(config))
    }

    #[tokio::test]
    async fn publishes_packet_for_each_frame() {
        let config = small_config();
        let shared = Arc::new(Mutex::new(Shared {
            frames: vec![Ok(frame(100)), Ok(frame(200))],
            ..Shared::default()
        }));
        let sampler = ScriptedSampler {
            shared: Arc::clone(&shared),
            fail_configure: false,
        };
        let session = session_for(&config);
        let mut task = AcquisitionTask::start(&config, Box::new(sampler), Arc::clone(&session)).unwrap();
        let signal = shared.lock().unwrap().signal.clone().unwrap();

        signal.raise();
        timeout(Duration::from_millis(500), task.cycle()).await.unwrap();
        session.packets().wait_ready().await;
        let packet = session.packets().latest();
        assert_eq!(packet.packet_count, 0);
        assert_eq!(packet.channel(1), &[101, 101, 101, 101]);
        assert_eq!(packet.channel_coeffs, vec![5, 6]);

        signal.raise();
        timeout(Duration::from_millis(500), task.cycle()).await.unwrap();
        assert_eq!(session.packets().latest().packet_count, 1);
        assert_eq!(session.metrics().snapshot().frames_processed, 2);

        drop(task);
        assert!(shared.lock().unwrap().stopped);
    }

    #[tokio::test]
    async fn read_error_skips_cycle() {
        let config = small_config();
        let shared = Arc::new(Mutex::new(Shared {
            frames: vec![Err(SamplerError::Read("dma overrun".into())), Ok(frame(50))],
            ..Shared::default()
        }));
        let sampler = ScriptedSampler {
            shared: Arc::clone(&shared),
            fail_configure: false,
        };
        let session = session_for(&config);
        let mut task = AcquisitionTask::start(&config, Box::new(sampler), Arc::clone(&session)).unwrap();
        let signal = shared.lock().unwrap().signal.clone().unwrap();

        signal.raise();
        task.cycle().await;
        assert_eq!(session.metrics().snapshot().read_errors, 1);
        assert_eq!(session.metrics().snapshot().frames_processed, 0);

        signal.raise();
        task.cycle().await;
        assert_eq!(session.packets().latest().packet_count, 0);
        assert_eq!(session.packets().latest().channel(0), &[50, 50, 50, 50]);
    }

    #[tokio::test]
    async fn wake_without_frame_is_not_a_read_error() {
        let config = small_config();
        let shared = Arc::new(Mutex::new(Shared {
            frames: vec![Ok(frame(70))],
            ..Shared::default()
        }));
        let sampler = ScriptedSampler {
            shared: Arc::clone(&shared),
            fail_configure: false,
        };
        let session = session_for(&config);
        let mut task = AcquisitionTask::start(&config, Box::new(sampler), Arc::clone(&session)).unwrap();
        let signal = shared.lock().unwrap().signal.clone().unwrap();

        signal.raise();
        task.cycle().await;
        signal.raise();
        task.cycle().await;

        let metrics = session.metrics().snapshot();
        assert_eq!(metrics.frames_processed, 1);
        assert_eq!(metrics.read_errors, 0);
        assert_eq!(session.packets().latest().channel(0), &[70, 70, 70, 70]);
    }

    #[test]
    fn configure_failure_prevents_start() {
        let config = small_config();
        let sampler = ScriptedSampler {
            shared: Arc::new(Mutex::new(Shared::default())),
            fail_configure: true,
        };
        let result = AcquisitionTask::start(&config, Box::new(sampler), session_for(&config));
        assert!(matches!(result, Err(crate::CoreError::Sampler(_))));
    }
}
