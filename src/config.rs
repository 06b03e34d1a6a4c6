use reqwest::Url;
use std::{str::FromStr, time::Duration};
use thiserror::Error;

use crate::{gemini, registry, simulation, task_api};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
}

/// How pending jobs reach a terminal state in this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Simulated,
    Upstream,
}

impl FromStr for StrategyKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulation" => Ok(StrategyKind::Simulated),
            "upstream" => Ok(StrategyKind::Upstream),
            other => Err(format!("expected 'simulated' or 'upstream', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub strategy: StrategyKind,
    pub simulation_delay: Duration,
    pub registry_capacity: usize,
    pub placeholder_base: Url,
    pub gemini_base: String,
    pub gemini_image_model: String,
    pub gemini_text_model: String,
    pub task_api_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            strategy: StrategyKind::Simulated,
            simulation_delay: simulation::DEFAULT_DELAY,
            registry_capacity: registry::DEFAULT_CAPACITY,
            placeholder_base: Url::parse(simulation::DEFAULT_PLACEHOLDER_BASE)
                .unwrap_or_else(|_| unreachable!("default placeholder base is a valid URL")),
            gemini_base: gemini::DEFAULT_BASE_URL.to_string(),
            gemini_image_model: gemini::DEFAULT_IMAGE_MODEL.to_string(),
            gemini_text_model: gemini::DEFAULT_TEXT_MODEL.to_string(),
            task_api_base: task_api::DEFAULT_BASE_URL.to_string(),
        }
    }
}

fn parse<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            var,
            value: v.clone(),
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep defaults.
    /// API keys are not read here; providers look them up per call.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let delay_ms = parse("SIMULATION_DELAY_MS", lookup("SIMULATION_DELAY_MS"), defaults.simulation_delay.as_millis() as u64)?;
        let registry_capacity = parse("JOB_REGISTRY_CAPACITY", lookup("JOB_REGISTRY_CAPACITY"), defaults.registry_capacity)?;
        if registry_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "JOB_REGISTRY_CAPACITY",
                value: "0".into(),
                reason: "capacity must be at least 1".into(),
            });
        }
        Ok(Self {
            port: parse("PORT", lookup("PORT"), defaults.port)?,
            strategy: parse("JOB_STRATEGY", lookup("JOB_STRATEGY"), defaults.strategy)?,
            simulation_delay: Duration::from_millis(delay_ms),
            registry_capacity,
            placeholder_base: parse("PLACEHOLDER_BASE", lookup("PLACEHOLDER_BASE"), defaults.placeholder_base)?,
            gemini_base: lookup("GEMINI_API_BASE").unwrap_or(defaults.gemini_base),
            gemini_image_model: lookup("GEMINI_IMAGE_MODEL").unwrap_or(defaults.gemini_image_model),
            gemini_text_model: lookup("GEMINI_TEXT_MODEL").unwrap_or(defaults.gemini_text_model),
            task_api_base: lookup("TASK_API_BASE").unwrap_or(defaults.task_api_base),
        })
    }
}
