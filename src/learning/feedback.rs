//! Feedback buffer — bounded intake of operational feedback records

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::types::OperationalFeedback;

/// Per-incident-type accuracy tracking.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeStats {
    pub count: u64,
    pub correct: u64,
    pub success_rate: f64,
}

/// Point-in-time feedback statistics.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackStats {
    pub buffered: usize,
    pub total_received: usize,
    pub dropped: u64,
    pub by_incident_type: BTreeMap<String, TypeStats>,
}

/// Bounded feedback buffer; oldest records drop on overflow.
pub struct FeedbackBuffer {
    cap: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    buffer: VecDeque<OperationalFeedback>,
    total_received: usize,
    dropped: u64,
    by_type: BTreeMap<String, TypeStats>,
}

impl FeedbackBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        Self::new(crate::config::get().learning.feedback_buffer_cap)
    }

    /// Append one feedback record, shedding the oldest past the bound.
    pub fn push(&self, feedback: OperationalFeedback) {
        let mut inner = self.inner.lock().expect("feedback buffer lock poisoned");
        inner.total_received += 1;

        let stats = inner
            .by_type
            .entry(feedback.incident_type.clone())
            .or_default();
        stats.count += 1;
        if feedback.prediction_correct {
            stats.correct += 1;
        }
        stats.success_rate = stats.correct as f64 / stats.count as f64;

        inner.buffer.push_back(feedback);
        while inner.buffer.len() > self.cap {
            inner.buffer.pop_front();
            inner.dropped += 1;
        }
    }

    /// Current buffer contents, oldest first.
    pub fn snapshot(&self) -> Vec<OperationalFeedback> {
        self.inner
            .lock()
            .expect("feedback buffer lock poisoned")
            .buffer
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("feedback buffer lock poisoned")
            .buffer
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records received over the process lifetime (monotonic even after
    /// overflow shedding).
    pub fn total_received(&self) -> usize {
        self.inner
            .lock()
            .expect("feedback buffer lock poisoned")
            .total_received
    }

    pub fn stats(&self) -> FeedbackStats {
        let inner = self.inner.lock().expect("feedback buffer lock poisoned");
        FeedbackStats {
            buffered: inner.buffer.len(),
            total_received: inner.total_received,
            dropped: inner.dropped,
            by_incident_type: inner.by_type.clone(),
        }
    }
}
