//! Feature Extractor — fixed-length numeric vectors from recent traffic
//!
//! Produces five feature groups (temporal:5, behavioral:5, packet:8,
//! statistical:6, network:5) concatenated to a 29-dimension vector. A
//! sliding history of the last 100 traffic events is retained internally;
//! with fewer than 10 events every group is zeroed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::types::TrafficEvent;

/// Combined feature vector length.
pub const FEATURE_DIM: usize = 29;

/// Extracted feature groups for one detection pass.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub temporal: [f64; 5],
    pub behavioral: [f64; 5],
    pub packet: [f64; 8],
    pub statistical: [f64; 6],
    pub network: [f64; 5],
}

impl FeatureSet {
    /// All groups zeroed; returned when there is insufficient history.
    pub fn empty() -> Self {
        Self {
            temporal: [0.0; 5],
            behavioral: [0.0; 5],
            packet: [0.0; 8],
            statistical: [0.0; 6],
            network: [0.0; 5],
        }
    }

    /// Concatenate groups into the combined vector.
    pub fn to_vector(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(FEATURE_DIM);
        v.extend_from_slice(&self.temporal);
        v.extend_from_slice(&self.behavioral);
        v.extend_from_slice(&self.packet);
        v.extend_from_slice(&self.statistical);
        v.extend_from_slice(&self.network);
        v
    }

    /// Names of the feature groups that fired threat indicators.
    pub fn triggered(&self) -> Vec<String> {
        let mut triggered = Vec::new();
        let temporal_mean = self.temporal.iter().sum::<f64>() / self.temporal.len() as f64;
        if temporal_mean > 5.0 {
            triggered.push("unusual_temporal_pattern".to_string());
        }
        // behavioral[2] = distinct protocols
        if self.behavioral[2] > 3.0 {
            triggered.push("multiple_protocols".to_string());
        }
        // packet[7] = window-size standard deviation
        if self.packet[7] > 2.0 {
            triggered.push("variable_window_size".to_string());
        }
        // statistical[0] = packet-size entropy
        if self.statistical[0] > 3.0 {
            triggered.push("high_entropy".to_string());
        }
        triggered
    }
}

/// Sliding-history feature extractor.
pub struct FeatureExtractor {
    window_size: usize,
    history: Mutex<VecDeque<TrafficEvent>>,
}

impl FeatureExtractor {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            history: Mutex::new(VecDeque::with_capacity(window_size)),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        Self::new(crate::config::get().detection.feature_history)
    }

    /// Fold new events into the history and extract the feature groups.
    pub fn extract(&self, events: &[TrafficEvent]) -> FeatureSet {
        let snapshot: Vec<TrafficEvent> = {
            let mut history = self.history.lock().expect("traffic history lock poisoned");
            for event in events {
                history.push_back(event.clone());
                while history.len() > self.window_size {
                    history.pop_front();
                }
            }
            if history.len() < 10 {
                return FeatureSet::empty();
            }
            history.iter().cloned().collect()
        };

        FeatureSet {
            temporal: temporal_features(&snapshot),
            behavioral: behavioral_features(&snapshot),
            packet: packet_features(&snapshot),
            statistical: statistical_features(&snapshot),
            network: network_features(&snapshot),
        }
    }

    /// Events currently retained.
    pub fn history_len(&self) -> usize {
        self.history.lock().expect("traffic history lock poisoned").len()
    }
}

/// Inter-arrival statistics plus event count.
fn temporal_features(events: &[TrafficEvent]) -> [f64; 5] {
    let timestamps: Vec<f64> = events
        .iter()
        .map(|e| e.timestamp.timestamp_millis() as f64 / 1_000.0)
        .collect();
    let inter: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    if inter.is_empty() {
        return [0.0, 0.0, 0.0, 0.0, events.len() as f64];
    }
    [
        mean(&inter),
        std_dev(&inter),
        inter.iter().copied().fold(f64::INFINITY, f64::min),
        inter.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        events.len() as f64,
    ]
}

/// Distinct destinations, ports, protocols, and port variety.
fn behavioral_features(events: &[TrafficEvent]) -> [f64; 5] {
    let unique_ips: HashSet<&str> = events.iter().map(|e| e.destination_ip.as_str()).collect();
    let unique_ports: HashSet<u16> = events.iter().map(|e| e.port).collect();
    let unique_protocols: HashSet<&str> = events.iter().map(|e| e.protocol.as_str()).collect();
    let port_variety = unique_ports.len() as f64 / events.len().max(1) as f64;
    [
        unique_ips.len() as f64,
        unique_ports.len() as f64,
        unique_protocols.len() as f64,
        port_variety,
        events.len() as f64,
    ]
}

/// Packet size, TTL, and window-size moments.
fn packet_features(events: &[TrafficEvent]) -> [f64; 8] {
    let sizes: Vec<f64> = events.iter().map(|e| e.packet_size as f64).collect();
    let ttls: Vec<f64> = events.iter().map(|e| e.ttl as f64).collect();
    let windows: Vec<f64> = events.iter().map(|e| e.window_size as f64).collect();
    [
        mean(&sizes),
        std_dev(&sizes),
        sizes.iter().copied().fold(f64::INFINITY, f64::min),
        sizes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean(&ttls),
        std_dev(&ttls),
        mean(&windows),
        std_dev(&windows),
    ]
}

/// Distribution shape of packet sizes: entropy, skewness, kurtosis,
/// variance, and quartiles.
fn statistical_features(events: &[TrafficEvent]) -> [f64; 6] {
    if events.len() < 5 {
        return [0.0; 6];
    }
    let sizes: Vec<f64> = events.iter().map(|e| e.packet_size as f64).collect();

    let mut counts: HashMap<u32, usize> = HashMap::new();
    for event in events {
        *counts.entry(event.packet_size).or_insert(0) += 1;
    }
    let n = sizes.len() as f64;
    let entropy: f64 = -counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            p * (p + 1e-10).log2()
        })
        .sum::<f64>();

    let m = mean(&sizes);
    let s = std_dev(&sizes);
    let skewness = sizes
        .iter()
        .map(|&x| ((x - m) / (s + 1e-10)).powi(3))
        .sum::<f64>()
        / n;
    let kurtosis = sizes
        .iter()
        .map(|&x| ((x - m) / (s + 1e-10)).powi(4))
        .sum::<f64>()
        / n
        - 3.0;

    let mut sorted = sizes.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite packet sizes"));
    let q1 = sorted[(sorted.len() as f64 * 0.25) as usize];
    let q3 = sorted[(sorted.len() as f64 * 0.75) as usize];

    [entropy, skewness, kurtosis, s * s, q3, q1]
}

/// Flow repetition and endpoint fan-out.
fn network_features(events: &[TrafficEvent]) -> [f64; 5] {
    let sources: HashSet<&str> = events.iter().map(|e| e.source_ip.as_str()).collect();
    let destinations: HashSet<&str> = events.iter().map(|e| e.destination_ip.as_str()).collect();

    let mut flows: HashMap<(&str, &str), usize> = HashMap::new();
    for event in events {
        *flows
            .entry((event.source_ip.as_str(), event.destination_ip.as_str()))
            .or_insert(0) += 1;
    }
    let max_repeat = flows.values().copied().max().unwrap_or(1);

    [
        sources.len() as f64,
        destinations.len() as f64,
        max_repeat as f64,
        flows.len() as f64,
        events.len() as f64,
    ]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
