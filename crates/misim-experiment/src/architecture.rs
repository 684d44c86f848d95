//! The architecture description: what the user's architecture file
//! deserializes into.
//!
//! These types are plain data with serde derives; file parsing itself
//! happens outside this crate. The runner turns a description into the
//! engine's service graph.

use serde::{Deserialize, Serialize};

/// A whole architecture: services plus network characteristics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchitectureDescription {
    pub services: Vec<ServiceDescription>,
    #[serde(default)]
    pub network: NetworkDescription,
}

/// Network latency and timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDescription {
    /// Latency for pairs without an override, and for traffic crossing
    /// the architecture boundary. Seconds.
    #[serde(default)]
    pub default_latency: f64,
    /// Round-trip timeout for every request send; `None` disables.
    #[serde(default)]
    pub default_timeout: Option<f64>,
    #[serde(default)]
    pub latencies: Vec<LatencyDescription>,
}

impl Default for NetworkDescription {
    fn default() -> Self {
        Self {
            default_latency: 0.0,
            default_timeout: None,
            latencies: Vec::new(),
        }
    }
}

/// Latency override for one directed service pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyDescription {
    pub from: String,
    pub to: String,
    pub latency: f64,
}

/// One microservice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub name: String,
    /// CPU work units per second, per instance.
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    /// Initial instance count.
    #[serde(default = "default_instances")]
    pub instances: usize,
    #[serde(default)]
    pub patterns: Vec<PatternDescription>,
    pub operations: Vec<OperationDescription>,
}

fn default_capacity() -> f64 {
    1.0
}

fn default_instances() -> usize {
    1
}

/// One endpoint of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDescription {
    pub name: String,
    pub demand: f64,
    #[serde(default)]
    pub dependencies: Vec<DependencyDescription>,
}

/// A declared call to another service's operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDescription {
    pub service: String,
    pub operation: String,
    #[serde(default = "default_probability")]
    pub probability: f64,
}

fn default_probability() -> f64 {
    1.0
}

/// Resilience pattern configuration, instance- or service-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternDescription {
    /// Instance-scoped: retry failed dependency calls.
    Retry {
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_base_interval")]
        base_interval: f64,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
        #[serde(default)]
        jitter: f64,
    },
    /// Instance-scoped: one breaker per downstream service.
    CircuitBreaker {
        #[serde(default = "default_threshold")]
        failure_rate_threshold: f64,
        #[serde(default = "default_window")]
        window_size: usize,
        #[serde(default)]
        minimum_calls: Option<usize>,
        #[serde(default = "default_open_duration")]
        open_duration: f64,
    },
    /// Service-scoped: how arriving requests pick an instance.
    LoadBalancer { strategy: String },
    /// Service-scoped: periodic scaling on relative work demand.
    Autoscaler {
        #[serde(default = "default_period")]
        period: f64,
        #[serde(default = "default_instances")]
        min: usize,
        #[serde(default = "default_max")]
        max: usize,
        #[serde(default = "default_low_watermark")]
        low_watermark: f64,
        #[serde(default = "default_high_watermark")]
        high_watermark: f64,
        #[serde(default)]
        cooldown: f64,
    },
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_interval() -> f64 {
    1.0
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_threshold() -> f64 {
    0.5
}

fn default_window() -> usize {
    10
}

fn default_open_duration() -> f64 {
    5.0
}

fn default_period() -> f64 {
    1.0
}

fn default_max() -> usize {
    10
}

fn default_low_watermark() -> f64 {
    0.25
}

fn default_high_watermark() -> f64 {
    0.75
}
