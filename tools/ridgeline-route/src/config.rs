//! Engine configuration - routing profiles and preparation parameters
//!
//! Loaded from TOML. Every section has defaults so a file only needs to list
//! its profiles. `check_profiles_consistency` must pass before any preparation
//! runs; all of its failures are fatal configuration errors.

use std::path::Path;

use ridgeline_common::{suggest_name, ConfigError};
use serde::{Deserialize, Serialize};

use crate::formats::crc;
use crate::graph::EncodingManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightingKind {
    /// Travel time in seconds
    Fastest,
    /// Distance in meters
    Shortest,
}

impl WeightingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WeightingKind::Fastest => "fastest",
            WeightingKind::Shortest => "shortest",
        }
    }
}

fn default_u_turn_costs() -> f64 {
    40.0
}

/// A named routing profile: vehicle plus weighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: String,
    pub vehicle: String,
    #[serde(default = "default_weighting")]
    pub weighting: WeightingKind,
    #[serde(default)]
    pub turn_costs: bool,
    /// Cost of turning back onto the same edge (edge-based profiles only)
    #[serde(default = "default_u_turn_costs")]
    pub u_turn_costs: f64,
    /// Hourly slowdown factors (24 values, each >= 1) applied when a request
    /// carries a departure time
    #[serde(default)]
    pub hourly_factors: Option<Vec<f64>>,
}

fn default_weighting() -> WeightingKind {
    WeightingKind::Fastest
}

impl ProfileConfig {
    pub fn new(name: impl Into<String>, vehicle: impl Into<String>, weighting: WeightingKind) -> Self {
        Self {
            name: name.into(),
            vehicle: vehicle.into(),
            weighting,
            turn_costs: false,
            u_turn_costs: default_u_turn_costs(),
            hourly_factors: None,
        }
    }

    pub fn with_turn_costs(mut self, u_turn_costs: f64) -> Self {
        self.turn_costs = true;
        self.u_turn_costs = u_turn_costs;
        self
    }

    /// Version stamp: CRC-64 of the canonical JSON form of this profile
    pub fn version(&self) -> Result<u64, ConfigError> {
        let json = serde_json::to_vec(self).map_err(|e| ConfigError::InvalidParameter {
            key: format!("profiles.{}", self.name),
            reason: e.to_string(),
        })?;
        Ok(crc::checksum(&json))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChProfileConfig {
    pub profile: String,
}

/// Contraction tuning; the priority is a weighted sum of these terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChParams {
    pub edge_difference_weight: f64,
    pub original_edges_weight: f64,
    pub contracted_neighbors_weight: f64,
    pub level_weight: f64,
    /// Settled-node limit of one witness search
    pub witness_max_settled: usize,
    /// Recompute all priorities after this percentage of nodes; 0 disables
    pub periodic_updates: u32,
    pub lazy_updates: bool,
    pub neighbor_updates: bool,
    pub threads: Option<usize>,
}

impl Default for ChParams {
    fn default() -> Self {
        Self {
            edge_difference_weight: 10.0,
            original_edges_weight: 50.0,
            contracted_neighbors_weight: 1.0,
            level_weight: 1.0,
            witness_max_settled: 500,
            periodic_updates: 20,
            lazy_updates: true,
            neighbor_updates: true,
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChSection {
    pub profiles: Vec<ChProfileConfig>,
    pub params: ChParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LmProfileConfig {
    pub profile: String,
    /// Reuse the landmarks prepared for this profile instead of preparing again
    #[serde(default)]
    pub preparation_profile: Option<String>,
    /// Upper bound of any shortest-path weight; sets the quantization factor
    #[serde(default)]
    pub maximum_weight: Option<f64>,
}

pub const ACTIVE_LANDMARKS_DEFAULT: usize = 8;
pub const MAX_LANDMARKS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LmSection {
    pub profiles: Vec<LmProfileConfig>,
    pub landmarks: usize,
    /// Defaults to min(8, landmarks)
    pub active_landmarks: Option<usize>,
    /// Subnetworks with fewer nodes get no landmarks
    pub min_subnetwork_size: usize,
    /// Seed for picking the start node of the farthest-first selection
    pub random_seed: u64,
    pub threads: Option<usize>,
}

impl Default for LmSection {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            landmarks: 16,
            active_landmarks: None,
            min_subnetwork_size: 2,
            random_seed: 0,
            threads: None,
        }
    }
}

impl LmSection {
    pub fn active_landmarks(&self) -> usize {
        self.active_landmarks
            .unwrap_or_else(|| ACTIVE_LANDMARKS_DEFAULT.min(self.landmarks))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Visited-node budget per search; unlimited when absent
    pub max_visited_nodes: Option<usize>,
    pub ch_disabling_allowed: bool,
    pub lm_disabling_allowed: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_visited_nodes: None,
            ch_disabling_allowed: true,
            lm_disabling_allowed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Minimum cell width in meters
    pub resolution_m: f64,
    /// A cell holding more entries than this is split
    pub max_entries_per_cell: usize,
    /// Number of expanding search rings before giving up
    pub max_region_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            resolution_m: 300.0,
            max_entries_per_cell: 16,
            max_region_search: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub profiles: Vec<ProfileConfig>,
    pub ch: ChSection,
    pub lm: LmSection,
    pub router: RouterConfig,
    pub index: IndexConfig,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::InvalidParameter {
            key: "config".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidParameter {
            key: "config".to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn profile(&self, name: &str) -> Result<&ProfileConfig, ConfigError> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| self.unknown_profile(name))
    }

    pub fn unknown_profile(&self, name: &str) -> ConfigError {
        ConfigError::UnknownProfile {
            name: name.to_string(),
            suggestion: suggest_name(name, self.profiles.iter().map(|p| p.name.as_str())),
        }
    }

    pub fn lm_profile(&self, name: &str) -> Option<&LmProfileConfig> {
        self.lm.profiles.iter().find(|p| p.profile == name)
    }

    /// Version stamp of a landmark preparation: the profile version plus every
    /// parameter that shapes the tables. `active_landmarks` and `threads` only
    /// affect queries and run time, so they are left out.
    pub fn lm_version(&self, lm: &LmProfileConfig) -> Result<u64, ConfigError> {
        let profile = self.profile(&lm.profile)?;
        let key = (
            profile.version()?,
            self.lm.landmarks,
            self.lm.min_subnetwork_size,
            self.lm.random_seed,
            lm.maximum_weight,
        );
        let json = serde_json::to_vec(&key).map_err(|e| ConfigError::InvalidParameter {
            key: format!("lm.profiles.{}", lm.profile),
            reason: e.to_string(),
        })?;
        Ok(crc::checksum(&json))
    }

    pub fn has_ch(&self, name: &str) -> bool {
        self.ch.profiles.iter().any(|p| p.profile == name)
    }

    /// Validate profiles and preparation references against the graph encoding
    pub fn check_profiles_consistency(&self, encoding: &EncodingManager) -> Result<(), ConfigError> {
        for (i, profile) in self.profiles.iter().enumerate() {
            if self.profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::Duplicate {
                    kind: "profile",
                    name: profile.name.clone(),
                });
            }
            let slot = encoding.slot(&profile.name, &profile.vehicle)?;
            if profile.turn_costs && !encoding.vehicle(slot).turn_costs {
                return Err(ConfigError::TurnCostsUnsupported {
                    profile: profile.name.clone(),
                    vehicle: profile.vehicle.clone(),
                });
            }
            if profile.u_turn_costs.is_nan() || profile.u_turn_costs < 0.0 {
                return Err(invalid(
                    format!("profiles.{}.u_turn_costs", profile.name),
                    "must be a non-negative number",
                ));
            }
            if let Some(factors) = &profile.hourly_factors {
                if factors.len() != 24 || factors.iter().any(|f| !f.is_finite() || *f < 1.0) {
                    return Err(invalid(
                        format!("profiles.{}.hourly_factors", profile.name),
                        "expected 24 finite factors, each at least 1",
                    ));
                }
            }
        }

        for (i, ch) in self.ch.profiles.iter().enumerate() {
            self.profile(&ch.profile)?;
            if self.ch.profiles[..i].iter().any(|p| p.profile == ch.profile) {
                return Err(ConfigError::Duplicate {
                    kind: "CH",
                    name: ch.profile.clone(),
                });
            }
        }

        if self.lm.landmarks == 0 || self.lm.landmarks > MAX_LANDMARKS {
            return Err(invalid(
                "lm.landmarks".to_string(),
                &format!("must be between 1 and {MAX_LANDMARKS}"),
            ));
        }
        let active = self.lm.active_landmarks();
        if active == 0 || active > self.lm.landmarks {
            return Err(invalid(
                "lm.active_landmarks".to_string(),
                &format!(
                    "{active} active landmarks requested but only {} landmarks are prepared",
                    self.lm.landmarks
                ),
            ));
        }

        for (i, lm) in self.lm.profiles.iter().enumerate() {
            let profile = self.profile(&lm.profile)?;
            if self.lm.profiles[..i].iter().any(|p| p.profile == lm.profile) {
                return Err(ConfigError::Duplicate {
                    kind: "LM",
                    name: lm.profile.clone(),
                });
            }
            if let Some(max) = lm.maximum_weight {
                if !max.is_finite() || max <= 0.0 {
                    return Err(invalid(
                        format!("lm.profiles.{}.maximum_weight", lm.profile),
                        "must be a positive number",
                    ));
                }
            }
            let Some(prep_name) = &lm.preparation_profile else {
                continue;
            };
            let Some(prep) = self.lm_profile(prep_name) else {
                self.profile(prep_name)?;
                return Err(ConfigError::InvalidLmReuse {
                    profile: lm.profile.clone(),
                    preparation_profile: prep_name.clone(),
                    chained: false,
                });
            };
            if prep.preparation_profile.is_some() {
                return Err(ConfigError::InvalidLmReuse {
                    profile: lm.profile.clone(),
                    preparation_profile: prep_name.clone(),
                    chained: true,
                });
            }
            let prep_profile = self.profile(prep_name)?;
            check_lm_reuse(profile, prep_profile)?;
        }

        if !(self.index.resolution_m.is_finite() && self.index.resolution_m > 0.0) {
            return Err(invalid("index.resolution_m".to_string(), "must be positive"));
        }
        if self.index.max_entries_per_cell == 0 || self.index.max_region_search == 0 {
            return Err(invalid(
                "index".to_string(),
                "max_entries_per_cell and max_region_search must be positive",
            ));
        }
        Ok(())
    }
}

/// Landmark distances can be shared only when both profiles see the same
/// turn-cost-free edge weights
fn check_lm_reuse(profile: &ProfileConfig, prep: &ProfileConfig) -> Result<(), ConfigError> {
    let reason = if profile.vehicle != prep.vehicle {
        Some(format!(
            "vehicle '{}' differs from '{}'",
            profile.vehicle, prep.vehicle
        ))
    } else if profile.weighting != prep.weighting {
        Some(format!(
            "weighting '{}' differs from '{}'",
            profile.weighting.as_str(),
            prep.weighting.as_str()
        ))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ConfigError::IncompatibleLmReuse {
            profile: profile.name.clone(),
            preparation_profile: prep.name.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

fn invalid(key: String, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VehicleEncoding;

    fn encoding() -> EncodingManager {
        EncodingManager::new(vec![
            VehicleEncoding::new("car", 140).with_turn_costs(),
            VehicleEncoding::new("bike", 30),
        ])
        .unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::from_toml_str(
            r#"
            [[profiles]]
            name = "car"
            vehicle = "car"
            turn_costs = true

            [[profiles]]
            name = "car_short"
            vehicle = "car"
            weighting = "shortest"

            [[profiles]]
            name = "car_no_turns"
            vehicle = "car"

            [[profiles]]
            name = "bike"
            vehicle = "bike"

            [ch]
            profiles = [{ profile = "car" }]

            [lm]
            landmarks = 4
            profiles = [
                { profile = "car" },
                { profile = "car_no_turns", preparation_profile = "car" },
            ]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_and_parsing() {
        let cfg = config();
        assert_eq!(cfg.profiles.len(), 4);
        assert_eq!(cfg.lm.active_landmarks(), 4);
        assert_eq!(cfg.index.resolution_m, 300.0);
        assert_eq!(cfg.ch.params.witness_max_settled, 500);
        assert!(cfg.router.max_visited_nodes.is_none());
        cfg.check_profiles_consistency(&encoding()).unwrap();
    }

    #[test]
    fn test_lm_version_tracks_table_parameters() {
        let cfg = config();
        let lm = cfg.lm.profiles[0].clone();
        let base = cfg.lm_version(&lm).unwrap();

        let mut changed = cfg.clone();
        changed.lm.active_landmarks = Some(2);
        changed.lm.threads = Some(3);
        assert_eq!(changed.lm_version(&lm).unwrap(), base);

        let edits: [fn(&mut EngineConfig); 4] = [
            |c: &mut EngineConfig| c.lm.landmarks = 2,
            |c: &mut EngineConfig| c.lm.random_seed = 7,
            |c: &mut EngineConfig| c.lm.min_subnetwork_size = 10,
            |c: &mut EngineConfig| c.profiles[0].u_turn_costs = 1.0,
        ];
        for edit in edits {
            let mut changed = cfg.clone();
            edit(&mut changed);
            assert_ne!(changed.lm_version(&lm).unwrap(), base);
        }
        let capped = LmProfileConfig {
            maximum_weight: Some(3600.0),
            ..lm.clone()
        };
        assert_ne!(cfg.lm_version(&capped).unwrap(), base);
    }

    #[test]
    fn test_unknown_vehicle() {
        let mut cfg = config();
        cfg.profiles[3].vehicle = "bik".to_string();
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVehicle { .. }));
    }

    #[test]
    fn test_turn_costs_unsupported() {
        let mut cfg = config();
        cfg.profiles[3].turn_costs = true;
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert!(matches!(err, ConfigError::TurnCostsUnsupported { .. }));
    }

    #[test]
    fn test_duplicate_ch_profile() {
        let mut cfg = config();
        cfg.ch.profiles.push(ChProfileConfig {
            profile: "car".to_string(),
        });
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Duplicate {
                kind: "CH",
                name: "car".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_ch_profile_suggests() {
        let mut cfg = config();
        cfg.ch.profiles[0].profile = "bkie".to_string();
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownProfile { ref suggestion, .. } if suggestion.as_deref() == Some("bike")
        ));
    }

    #[test]
    fn test_lm_reuse_chain_rejected() {
        let mut cfg = config();
        cfg.lm.profiles.push(LmProfileConfig {
            profile: "car_short".to_string(),
            preparation_profile: Some("car_no_turns".to_string()),
            maximum_weight: None,
        });
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLmReuse { chained: true, .. }));
    }

    #[test]
    fn test_lm_reuse_of_unprepared_profile_rejected() {
        let mut cfg = config();
        cfg.lm.profiles[1].preparation_profile = Some("bike".to_string());
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLmReuse { chained: false, .. }));
    }

    #[test]
    fn test_lm_reuse_with_other_weighting_rejected() {
        let mut cfg = config();
        cfg.lm.profiles[1].profile = "car_short".to_string();
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert!(matches!(err, ConfigError::IncompatibleLmReuse { .. }));
    }

    #[test]
    fn test_too_many_active_landmarks() {
        let mut cfg = config();
        cfg.lm.active_landmarks = Some(5);
        let err = cfg.check_profiles_consistency(&encoding()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { ref key, .. } if key == "lm.active_landmarks"));
    }

    #[test]
    fn test_profile_version_tracks_changes() {
        let cfg = config();
        let mut changed = cfg.profiles[0].clone();
        assert_eq!(changed.version().unwrap(), cfg.profiles[0].version().unwrap());
        changed.u_turn_costs = 10.0;
        assert_ne!(changed.version().unwrap(), cfg.profiles[0].version().unwrap());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = EngineConfig::from_toml_str("[router]\nmax_visited = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { .. }));
    }
}
