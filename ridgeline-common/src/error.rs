//! Error types for the ridgeline routing toolkit
//!
//! Errors are split by how a caller reacts to them: configuration problems are
//! fatal at startup, point resolution failures are reported per endpoint, and
//! search failures distinguish a policy limit from a graph property.

use std::fmt;
use std::io;
use std::path::PathBuf;

use strsim::{jaro_winkler, normalized_levenshtein};

/// Result alias used throughout the toolkit
pub type Result<T, E = RouteError> = std::result::Result<T, E>;

/// Problems in the engine configuration or in persisted preparations.
///
/// All of these abort startup or preparation; none are retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("profile '{name}' does not exist{}", did_you_mean(.suggestion))]
    UnknownProfile {
        name: String,
        suggestion: Option<String>,
    },

    #[error("profile '{profile}' uses vehicle '{vehicle}' which is not encoded in the graph{}", did_you_mean(.suggestion))]
    UnknownVehicle {
        profile: String,
        vehicle: String,
        suggestion: Option<String>,
    },

    #[error("duplicate {kind} entry for profile '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("profile '{profile}' requests turn costs but vehicle '{vehicle}' was encoded without turn cost support")]
    TurnCostsUnsupported { profile: String, vehicle: String },

    #[error("LM profile '{profile}' reuses '{preparation_profile}', which is not prepared itself{}", chain_hint(.chained))]
    InvalidLmReuse {
        profile: String,
        preparation_profile: String,
        chained: bool,
    },

    #[error("LM profile '{profile}' cannot reuse '{preparation_profile}': {reason}")]
    IncompatibleLmReuse {
        profile: String,
        preparation_profile: String,
        reason: String,
    },

    #[error("{kind} preparation of '{profile}' already exists in storage and doesn't match configuration ({detail}); remove {path} to prepare again")]
    StalePreparation {
        kind: &'static str,
        profile: String,
        detail: String,
        path: PathBuf,
    },

    #[error("invalid value for '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("weighting '{weighting}' cannot be evaluated on this graph: {reason}")]
    WeightingUnavailable { weighting: String, reason: String },

    #[error("storage directory {path} is locked by another preparation")]
    LockHeld { path: PathBuf },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

fn chain_hint(chained: &bool) -> &'static str {
    if *chained {
        " (reuse cannot be chained)"
    } else {
        ""
    }
}

/// Why a single coordinate could not be mapped onto the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointFailureReason {
    /// The location index holds no elements at all
    EmptyIndex,
    /// Nothing accepted by the edge filter within the search rings
    NoMatch,
    /// Latitude or longitude outside the valid range
    InvalidCoordinate,
}

impl fmt::Display for PointFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointFailureReason::EmptyIndex => write!(f, "location index is empty"),
            PointFailureReason::NoMatch => write!(f, "no matching point"),
            PointFailureReason::InvalidCoordinate => write!(f, "invalid coordinate"),
        }
    }
}

/// One unresolved request point
#[derive(Debug, Clone, PartialEq)]
pub struct PointFailure {
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
    pub reason: PointFailureReason,
}

impl fmt::Display for PointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "point {} ({:.6},{:.6}): {}",
            self.index, self.lat, self.lon, self.reason
        )
    }
}

/// Main error type for routing operations
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("cannot resolve {}", join_failures(.failures))]
    PointResolution { failures: Vec<PointFailure> },

    #[error("search limit exceeded: visited {visited} nodes, limit is {limit}")]
    SearchLimit { visited: usize, limit: usize },

    #[error("no path found between point {from} and point {to}")]
    NoPath { from: usize, to: usize },

    #[error("internal consistency failure in profile '{profile}': {detail}")]
    InternalConsistency { profile: String, detail: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid graph input: {0}")]
    GraphInput(String),

    #[error("corrupt storage file {path}: {detail}")]
    Storage { path: PathBuf, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn join_failures(failures: &[PointFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RouteError {
    /// Whether the error must stop startup or preparation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RouteError::Configuration(_)
                | RouteError::Storage { .. }
                | RouteError::InternalConsistency { .. }
                | RouteError::Io(_)
        )
    }

    pub fn storage(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        RouteError::Storage {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Suggest the closest known name for a misspelled one.
///
/// Scores are 70% Jaro-Winkler plus 30% normalized Levenshtein on the lowercase
/// names; candidates below 0.7 are not suggested. An exact case-insensitive
/// match yields no suggestion.
pub fn suggest_name<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let input_lower = input.to_lowercase();
    let mut best: Option<(&str, f64)> = None;

    for candidate in candidates {
        let candidate_lower = candidate.to_lowercase();
        if candidate_lower == input_lower {
            return None;
        }

        let score = jaro_winkler(&input_lower, &candidate_lower) * 0.7
            + normalized_levenshtein(&input_lower, &candidate_lower) * 0.3;
        if score >= 0.7 && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    best.map(|(name, _)| name.to_string())
}
