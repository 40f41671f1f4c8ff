use crate::generator::profile::{GeneratorConfig, WaveformGenerator};
use energycore::acquisition::{
    decode_type1_frame, ConversionRecord, Sampler, SamplerError, SamplerSettings,
};
use energycore::signal::ReadySignal;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Stand-in for the hardware digitizer: a background thread that completes a
/// frame every `frame_capacity / aggregate_rate` seconds.
///
/// Only the latest frame is kept; one the acquisition task has not read yet
/// is overwritten.
pub struct SyntheticSampler {
    config: GeneratorConfig,
    dc_offset: i16,
    settings: Option<(SamplerSettings, Arc<ReadySignal>)>,
    latest: Arc<Mutex<Option<Vec<u8>>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticSampler {
    pub fn new(config: GeneratorConfig, dc_offset: i16) -> Self {
        Self {
            config,
            dc_offset,
            settings: None,
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

fn frame_period(settings: &SamplerSettings) -> Duration {
    Duration::from_secs_f64(settings.frame_capacity as f64 / f64::from(settings.aggregate_rate))
}

impl Sampler for SyntheticSampler {
    fn configure(
        &mut self,
        settings: &SamplerSettings,
        frame_ready: Arc<ReadySignal>,
    ) -> Result<(), SamplerError> {
        if settings.channel_pattern.is_empty() {
            return Err(SamplerError::Configuration("empty channel pattern".into()));
        }
        if settings.aggregate_rate == 0 || settings.frame_capacity == 0 {
            return Err(SamplerError::Configuration(
                "rate and frame size must be positive".into(),
            ));
        }
        self.settings = Some((settings.clone(), frame_ready));
        Ok(())
    }

    fn start(&mut self) -> Result<(), SamplerError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let (settings, frame_ready) = self
            .settings
            .clone()
            .ok_or_else(|| SamplerError::Configuration("sampler not configured".into()))?;

        let period = frame_period(&settings);
        let mut generator = WaveformGenerator::new(&self.config, &settings, self.dc_offset);
        let latest = Arc::clone(&self.latest);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let worker = thread::Builder::new()
            .name("synthetic-sampler".into())
            .spawn(move || {
                let mut raw = Vec::with_capacity(generator.frame_bytes());
                while running.load(Ordering::SeqCst) {
                    thread::sleep(period);
                    generator.next_frame(&mut raw);
                    latest
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .replace(raw.clone());
                    frame_ready.raise();
                }
            })
            .map_err(|err| SamplerError::Configuration(err.to_string()))?;

        info!(target: "acquisition", "synthetic sampler started, frame every {:?}", period);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SamplerError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| SamplerError::Read("sampler thread panicked".into()))?;
            debug!(target: "acquisition", "synthetic sampler stopped");
        }
        Ok(())
    }

    fn read_frame(&mut self, out: &mut Vec<ConversionRecord>) -> Result<(), SamplerError> {
        if self.worker.is_none() {
            return Err(SamplerError::NotStarted);
        }
        let raw = self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SamplerError::Empty)?;
        decode_type1_frame(&raw, out);
        Ok(())
    }
}

impl Drop for SyntheticSampler {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn settings() -> SamplerSettings {
        SamplerSettings {
            channel_pattern: vec![0, 3],
            aggregate_rate: 2000,
            frame_capacity: 20,
        }
    }

    #[test]
    fn frame_period_follows_rate() {
        assert_eq!(frame_period(&settings()), Duration::from_millis(10));
    }

    #[test]
    fn rejects_empty_pattern() {
        let mut sampler = SyntheticSampler::new(GeneratorConfig::default(), 1860);
        let settings = SamplerSettings {
            channel_pattern: Vec::new(),
            ..settings()
        };
        assert!(matches!(
            sampler.configure(&settings, ReadySignal::new()),
            Err(SamplerError::Configuration(_))
        ));
        assert!(sampler.start().is_err());
    }

    #[tokio::test]
    async fn delivers_frames_until_stopped() {
        let mut sampler = SyntheticSampler::new(GeneratorConfig::default(), 1860);
        let ready = ReadySignal::new();
        let mut records = Vec::new();
        assert!(matches!(
            sampler.read_frame(&mut records),
            Err(SamplerError::NotStarted)
        ));

        sampler.configure(&settings(), Arc::clone(&ready)).unwrap();
        sampler.start().unwrap();
        timeout(Duration::from_secs(1), ready.wait()).await.unwrap();

        sampler.read_frame(&mut records).unwrap();
        assert_eq!(records.len(), 20);
        assert!(records.iter().all(|r| r.channel == 0 || r.channel == 3));

        sampler.stop().unwrap();
        assert!(!sampler.is_running());
        assert!(matches!(
            sampler.read_frame(&mut records),
            Err(SamplerError::NotStarted)
        ));
    }
}
