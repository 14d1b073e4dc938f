use std::collections::{BTreeMap, HashSet};
use std::time::SystemTime;

use crate::command::{ClassificationSample, Command, Source};
use crate::config::{GestureConfig, KeywordConfig};

/// How a noisy per-tick signal becomes a confirmed command.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationPolicy {
    /// Same label above `min_confidence` for `required` consecutive ticks.
    Streak { required: u32, min_confidence: f32 },
    /// Single confident tick whose label is not ignored.
    Threshold {
        min_confidence: f32,
        ignore: HashSet<String>,
    },
}

/// Per-source debounce state machine. Owned by exactly one ingest loop.
#[derive(Debug, Clone)]
pub struct ConfirmationFilter {
    source: Source,
    policy: ConfirmationPolicy,
    actions: BTreeMap<String, String>,
    last_label: Option<String>,
    streak: u32,
}

impl ConfirmationFilter {
    pub fn new(
        source: Source,
        policy: ConfirmationPolicy,
        actions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            source,
            policy,
            actions,
            last_label: None,
            streak: 0,
        }
    }

    pub fn for_gesture(config: &GestureConfig) -> Self {
        Self::new(
            Source::Video,
            ConfirmationPolicy::Streak {
                required: config.confirmation_frames.max(1),
                min_confidence: config.min_confidence,
            },
            config.mapping.clone(),
        )
    }

    pub fn for_keyword(config: &KeywordConfig) -> Self {
        Self::new(
            Source::Audio,
            ConfirmationPolicy::Threshold {
                min_confidence: config.min_confidence,
                ignore: config.ignore_labels.iter().cloned().collect(),
            },
            config.mapping.clone(),
        )
    }

    /// Feed one observation. Returns a command only on confirmation of a
    /// label that maps to an action.
    pub fn observe(&mut self, label: Option<&str>, confidence: f32) -> Option<Command> {
        let label = label.filter(|l| !l.is_empty());

        match &self.policy {
            ConfirmationPolicy::Streak {
                required,
                min_confidence,
            } => {
                let required = *required;
                let Some(label) = label.filter(|_| confidence >= *min_confidence) else {
                    self.last_label = None;
                    self.streak = 0;
                    return None;
                };

                if self.last_label.as_deref() == Some(label) {
                    self.streak += 1;
                } else {
                    self.last_label = Some(label.to_string());
                    self.streak = 1;
                }

                if self.streak < required {
                    return None;
                }
                // Re-trigger needs a fresh streak of the same length.
                self.streak = 0;
                self.command_for(label, confidence)
            }
            ConfirmationPolicy::Threshold {
                min_confidence,
                ignore,
            } => {
                let label = label?;
                if confidence < *min_confidence || ignore.contains(label) {
                    return None;
                }
                self.command_for(label, confidence)
            }
        }
    }

    pub fn observe_sample(&mut self, sample: &ClassificationSample) -> Option<Command> {
        debug_assert_eq!(sample.source, self.source);
        self.observe(sample.label.as_deref(), sample.confidence)
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn last_label(&self) -> Option<&str> {
        self.last_label.as_deref()
    }

    fn command_for(&self, label: &str, confidence: f32) -> Option<Command> {
        let Some(action) = self.actions.get(label) else {
            tracing::debug!("{} label '{}' confirmed but not mapped", self.source, label);
            return None;
        };
        Some(Command {
            source: self.source,
            action: action.clone(),
            source_label: Some(label.to_string()),
            confidence,
            enqueued_at: SystemTime::now(),
        })
    }
}
