use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shared::EventKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audio::buffer::AudioBuffer;
use crate::classify::{KeywordClassifier, Prediction};
use crate::command::{ClassificationSample, CommandSender, Source};
use crate::confirm::ConfirmationFilter;
use crate::events::EventHub;

/// Keyword processing duty: every tick, drain the capture buffer, classify
/// the newest window and feed the keyword filter.
///
/// While keyword spotting is disabled the task keeps ticking but only
/// discards whatever the buffer holds.
pub struct KeywordIngestLoop {
    buffer: AudioBuffer,
    classifier: Arc<dyn KeywordClassifier>,
    filter: ConfirmationFilter,
    enabled: Arc<AtomicBool>,
    tick: Duration,
    commands: CommandSender,
    hub: EventHub,
    stop_rx: watch::Receiver<bool>,
}

impl KeywordIngestLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buffer: AudioBuffer,
        classifier: Arc<dyn KeywordClassifier>,
        filter: ConfirmationFilter,
        enabled: Arc<AtomicBool>,
        tick: Duration,
        commands: CommandSender,
        hub: EventHub,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            buffer,
            classifier,
            filter,
            enabled,
            tick,
            commands,
            hub,
            stop_rx,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Keyword processing started (tick {:?})", self.tick);

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = self.stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *self.stop_rx.borrow() {
                break;
            }

            if !self.enabled.load(Ordering::SeqCst) {
                self.buffer.clear();
                continue;
            }

            let prediction = self.classify_tick().await;
            if let Some(prediction) = prediction {
                self.observe(prediction);
            }
        }

        info!("Keyword processing stopped");
    }

    /// `None` when there was not enough audio this tick.
    async fn classify_tick(&self) -> Option<Prediction> {
        let samples = self.buffer.drain();
        let window_len = self.classifier.window_len();
        if window_len == 0 || samples.len() < window_len {
            debug!(
                "Keyword tick skipped: {} of {} samples",
                samples.len(),
                window_len
            );
            return None;
        }

        let window = samples[samples.len() - window_len..].to_vec();
        let classifier = Arc::clone(&self.classifier);

        match tokio::task::spawn_blocking(move || classifier.predict(&window)).await {
            Ok(Ok(prediction)) => Some(prediction),
            Ok(Err(e)) => {
                warn!("Keyword classification failed: {}", e);
                Some(Prediction::none())
            }
            Err(e) => {
                warn!("Keyword classifier task failed: {}", e);
                Some(Prediction::none())
            }
        }
    }

    fn observe(&mut self, prediction: Prediction) {
        let sample =
            ClassificationSample::new(Source::Audio, prediction.label, prediction.confidence);
        let Some(command) = self.filter.observe_sample(&sample) else {
            return;
        };

        info!(
            "Keyword '{}' recognised ({:.2}) -> {}",
            command.source_label.as_deref().unwrap_or_default(),
            command.confidence,
            command.action
        );
        self.hub.publish(command.event(EventKind::Recognized, None));
        if self.commands.send(command).is_err() {
            debug!("Command queue closed, keyword command discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{command_queue, Source};
    use crate::config::KeywordConfig;
    use crate::error::RunnerError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct ScriptedClassifier {
        window: usize,
        calls: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl KeywordClassifier for ScriptedClassifier {
        fn sample_rate(&self) -> u32 {
            16000
        }

        fn window_len(&self) -> usize {
            self.window
        }

        fn predict(&self, window: &[f32]) -> Result<Prediction, RunnerError> {
            self.calls.lock().unwrap().push(window.len());
            if self.fail {
                return Err(RunnerError::Classification("model crashed".to_string()));
            }
            if window[0] > 0.5 {
                Ok(Prediction::new("proxima", 0.97))
            } else {
                Ok(Prediction::new("background", 0.99))
            }
        }
    }

    fn keyword_config() -> KeywordConfig {
        let mut mapping = BTreeMap::new();
        mapping.insert("proxima".to_string(), "nexttrack".to_string());
        KeywordConfig {
            enabled: true,
            tick_ms: 20,
            mapping,
            ..KeywordConfig::default()
        }
    }

    struct Harness {
        buffer: AudioBuffer,
        classifier: Arc<ScriptedClassifier>,
        enabled: Arc<AtomicBool>,
        rx: crate::command::CommandReceiver,
        stop_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    }

    fn start(fail: bool) -> Harness {
        let buffer = AudioBuffer::new(1000);
        let classifier = Arc::new(ScriptedClassifier {
            window: 4,
            calls: Mutex::new(Vec::new()),
            fail,
        });
        let enabled = Arc::new(AtomicBool::new(true));
        let (tx, rx) = command_queue();
        let (stop_tx, stop_rx) = watch::channel(false);
        let config = keyword_config();

        let handle = KeywordIngestLoop::new(
            buffer.clone(),
            classifier.clone(),
            ConfirmationFilter::for_keyword(&config),
            enabled.clone(),
            config.tick(),
            tx,
            EventHub::new(8),
            stop_rx,
        )
        .spawn();

        Harness {
            buffer,
            classifier,
            enabled,
            rx,
            stop_tx,
            handle,
        }
    }

    async fn shutdown(harness: Harness) {
        harness.stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), harness.handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_confident_keyword_enqueues_command() {
        let mut harness = start(false);
        harness.buffer.append(&[0.0, 0.0, 0.9, 0.9, 0.9, 0.9]);

        let command = tokio::time::timeout(Duration::from_secs(2), harness.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(command.action, "nexttrack");
        assert_eq!(command.source, Source::Audio);
        // Only the newest window reaches the classifier.
        assert_eq!(harness.classifier.calls.lock().unwrap()[0], 4);

        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_short_buffer_is_discarded() {
        let harness = start(false);
        harness.buffer.append(&[0.9, 0.9]);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(harness.classifier.calls.lock().unwrap().is_empty());
        assert!(harness.buffer.is_empty());

        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_classifier_failure_keeps_ticking() {
        let mut harness = start(true);
        harness.buffer.append(&[0.9; 4]);
        tokio::time::sleep(Duration::from_millis(60)).await;
        harness.buffer.append(&[0.9; 4]);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(harness.classifier.calls.lock().unwrap().len() >= 2);
        assert!(harness.rx.try_recv().is_err());

        shutdown(harness).await;
    }

    #[tokio::test]
    async fn test_disabled_discards_audio() {
        let mut harness = start(false);
        harness.enabled.store(false, Ordering::SeqCst);
        harness.buffer.append(&[0.9; 8]);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(harness.buffer.is_empty());
        assert!(harness.classifier.calls.lock().unwrap().is_empty());
        assert!(harness.rx.try_recv().is_err());

        shutdown(harness).await;
    }
}
