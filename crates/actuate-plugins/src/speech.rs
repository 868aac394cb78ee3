//! Speak connector: keeps a bounded log of what the agent said.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use actuate_runtime::{Connector, ConnectorError};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakInput {
    pub sentence: String,
}

/// Input schema for speech actions; an empty sentence is rejected.
pub fn speak_input(value: &str) -> Result<SpeakInput, String> {
    let sentence = value.trim();
    if sentence.is_empty() {
        return Err("empty sentence".into());
    }
    Ok(SpeakInput {
        sentence: sentence.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Utterance {
    pub sentence: String,
    pub spoken_at: DateTime<Utc>,
}

/// Most recent utterances, oldest dropped first.
#[derive(Debug)]
pub struct UtteranceLog {
    entries: Mutex<VecDeque<Utterance>>,
    capacity: usize,
}

impl UtteranceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, sentence: &str) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(Utterance {
            sentence: sentence.to_string(),
            spoken_at: Utc::now(),
        });
    }

    pub fn recent(&self) -> Vec<Utterance> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for UtteranceLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct SpeakConnector {
    log: Arc<UtteranceLog>,
}

impl SpeakConnector {
    pub fn new(log: Arc<UtteranceLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Connector for SpeakConnector {
    type Input = SpeakInput;

    fn name(&self) -> &str {
        "speak"
    }

    async fn connect(&self, input: SpeakInput) -> Result<(), ConnectorError> {
        info!("Speak: {}", input.sentence);
        self.log.push(&input.sentence);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speak_input() {
        assert_eq!(speak_input("  hello ").unwrap().sentence, "hello");
        assert!(speak_input("   ").is_err());
    }

    #[test]
    fn test_log_is_bounded() {
        let log = UtteranceLog::new(2);
        log.push("one");
        log.push("two");
        log.push("three");

        let sentences: Vec<String> = log.recent().into_iter().map(|u| u.sentence).collect();
        assert_eq!(sentences, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_connect_records_sentence() {
        let log = Arc::new(UtteranceLog::default());
        let connector = SpeakConnector::new(log.clone());
        connector
            .connect(SpeakInput {
                sentence: "hi there".into(),
            })
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
    }
}
