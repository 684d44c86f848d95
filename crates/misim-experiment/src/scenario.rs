//! ATAM-style scenario descriptions.
//!
//! A scenario names an artifact (the service under test), a component
//! (one operation, or `ALL ENDPOINTS`), and a stimulus string holding
//! `LOAD` and faultload clauses. This module parses the stimulus
//! grammar:
//!
//! ```text
//! LOAD [~]<profile>
//! KILL|START|RESTART [service] [n] @time
//! DELAY baseline[+-stddev] ~duration @time
//! ```
//!
//! one clause per line. `~` before a profile means the load repeats.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ExperimentError;
use crate::load::ArrivalDistribution;

/// A scenario as delivered by the out-of-scope parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDescription {
    #[serde(default)]
    pub seed: u64,
    pub duration: f64,
    #[serde(default)]
    pub report_base_directory: Option<PathBuf>,
    /// The service the scenario exercises.
    pub artifact: String,
    /// One operation name, or `ALL ENDPOINTS` for every operation of
    /// the artifact.
    pub component: String,
    /// `LOAD` and faultload clauses, one per line.
    pub stimulus: String,
    /// Profiles the stimulus references by name, already read from
    /// their model files.
    #[serde(default)]
    pub profiles: BTreeMap<String, Vec<(f64, f64)>>,
    #[serde(default)]
    pub distribution: ArrivalDistribution,
}

/// A parsed `LOAD` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusLoad {
    pub profile: String,
    pub repeating: bool,
}

/// A parsed faultload clause. A missing service means the scenario's
/// artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum Faultload {
    Kill {
        service: Option<String>,
        count: usize,
        at: f64,
    },
    Start {
        service: Option<String>,
        count: usize,
        at: f64,
    },
    Restart {
        service: Option<String>,
        count: usize,
        at: f64,
    },
    Delay {
        baseline: f64,
        stddev: f64,
        duration: f64,
        at: f64,
    },
}

/// Everything a stimulus string said.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStimulus {
    pub loads: Vec<StimulusLoad>,
    pub faults: Vec<Faultload>,
}

/// Parses a stimulus string, one clause per non-empty line.
pub fn parse_stimulus(stimulus: &str) -> Result<ParsedStimulus, ExperimentError> {
    let mut parsed = ParsedStimulus::default();
    for line in stimulus.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens[0].to_ascii_uppercase().as_str() {
            "LOAD" => parsed.loads.push(parse_load(line, &tokens)?),
            "KILL" | "START" | "RESTART" => parsed.faults.push(parse_lifecycle(line, &tokens)?),
            "DELAY" => parsed.faults.push(parse_delay(line, &tokens)?),
            other => {
                return Err(parse_error(line, format!("unknown clause `{other}`")));
            }
        }
    }
    Ok(parsed)
}

fn parse_error(clause: &str, message: impl Into<String>) -> ExperimentError {
    ExperimentError::ScenarioParse {
        clause: clause.to_string(),
        message: message.into(),
    }
}

fn parse_load(line: &str, tokens: &[&str]) -> Result<StimulusLoad, ExperimentError> {
    let [_, profile] = tokens else {
        return Err(parse_error(line, "expected `LOAD [~]<profile>`"));
    };
    let (profile, repeating) = match profile.strip_prefix('~') {
        Some(rest) => (rest, true),
        None => (*profile, false),
    };
    if profile.is_empty() {
        return Err(parse_error(line, "empty profile name"));
    }
    Ok(StimulusLoad {
        profile: profile.to_string(),
        repeating,
    })
}

/// `KILL|START|RESTART [service] [n] @time`
fn parse_lifecycle(line: &str, tokens: &[&str]) -> Result<Faultload, ExperimentError> {
    let mut service = None;
    let mut count = 1usize;
    let mut at = None;
    for token in &tokens[1..] {
        if let Some(time) = token.strip_prefix('@') {
            at = Some(parse_f64(line, time)?);
        } else if let Ok(n) = token.parse::<usize>() {
            count = n;
        } else {
            service = Some(token.to_string());
        }
    }
    let at = at.ok_or_else(|| parse_error(line, "missing `@time`"))?;
    Ok(match tokens[0].to_ascii_uppercase().as_str() {
        "KILL" => Faultload::Kill { service, count, at },
        "START" => Faultload::Start { service, count, at },
        _ => Faultload::Restart { service, count, at },
    })
}

/// `DELAY baseline[+-stddev] ~duration @time`
fn parse_delay(line: &str, tokens: &[&str]) -> Result<Faultload, ExperimentError> {
    let [_, spread, duration, at] = tokens else {
        return Err(parse_error(line, "expected `DELAY base[+-stddev] ~dur @time`"));
    };
    let (baseline, stddev) = match spread.split_once("+-") {
        Some((base, dev)) => (parse_f64(line, base)?, parse_f64(line, dev)?),
        None => (parse_f64(line, spread)?, 0.0),
    };
    let duration = duration
        .strip_prefix('~')
        .ok_or_else(|| parse_error(line, "duration must be `~<seconds>`"))
        .and_then(|d| parse_f64(line, d))?;
    let at = at
        .strip_prefix('@')
        .ok_or_else(|| parse_error(line, "missing `@time`"))
        .and_then(|t| parse_f64(line, t))?;
    Ok(Faultload::Delay {
        baseline,
        stddev,
        duration,
        at,
    })
}

fn parse_f64(line: &str, token: &str) -> Result<f64, ExperimentError> {
    token
        .parse::<f64>()
        .map_err(|_| parse_error(line, format!("`{token}` is not a number")))
}

impl ScenarioDescription {
    /// The marker expanding to every operation of the artifact.
    pub const ALL_ENDPOINTS: &'static str = "ALL ENDPOINTS";

    pub fn targets_all_endpoints(&self) -> bool {
        self.component.eq_ignore_ascii_case(Self::ALL_ENDPOINTS)
    }
}
