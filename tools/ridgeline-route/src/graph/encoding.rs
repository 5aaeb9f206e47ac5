//! Edge flag encoding - per-vehicle access and speed bits packed into a u64
//!
//! Layout: up to four vehicles, 16 bits each, starting at bit 0.
//! Within a vehicle slot:
//! - bit 0: forward access (base → adj)
//! - bit 1: backward access (adj → base)
//! - bits 2..10: speed in km/h (0..=255)
//! - bits 10..16: reserved

use ridgeline_common::{suggest_name, ConfigError};
use serde::{Deserialize, Serialize};

pub const MAX_VEHICLES: usize = 4;
const SLOT_BITS: u32 = 16;
const FWD_BIT: u64 = 1;
const BWD_BIT: u64 = 1 << 1;
const SPEED_SHIFT: u32 = 2;
const SPEED_MASK: u64 = 0xFF;

/// One vehicle's encoded values as declared at import time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleEncoding {
    pub name: String,
    /// Upper bound for any stored speed of this vehicle (km/h)
    pub max_speed_kmh: u8,
    /// Whether turn costs were recorded for this vehicle
    #[serde(default)]
    pub turn_costs: bool,
}

impl VehicleEncoding {
    pub fn new(name: impl Into<String>, max_speed_kmh: u8) -> Self {
        Self {
            name: name.into(),
            max_speed_kmh,
            turn_costs: false,
        }
    }

    pub fn with_turn_costs(mut self) -> Self {
        self.turn_costs = true;
        self
    }
}

/// Index of a vehicle within the flag layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VehicleSlot(u8);

impl VehicleSlot {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn shift(self) -> u32 {
        self.0 as u32 * SLOT_BITS
    }
}

/// Opaque edge payload, interpreted through an [`EncodingManager`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EdgeFlags(pub u64);

impl EdgeFlags {
    pub const EMPTY: EdgeFlags = EdgeFlags(0);

    pub fn with_access(self, slot: VehicleSlot, forward: bool, backward: bool) -> Self {
        let mut bits = self.0 & !((FWD_BIT | BWD_BIT) << slot.shift());
        if forward {
            bits |= FWD_BIT << slot.shift();
        }
        if backward {
            bits |= BWD_BIT << slot.shift();
        }
        EdgeFlags(bits)
    }

    pub fn with_speed(self, slot: VehicleSlot, kmh: u8) -> Self {
        let shift = slot.shift() + SPEED_SHIFT;
        let bits = (self.0 & !(SPEED_MASK << shift)) | ((kmh as u64) << shift);
        EdgeFlags(bits)
    }

    /// Access in the requested direction; `reverse` means adj → base
    pub fn access(self, slot: VehicleSlot, reverse: bool) -> bool {
        let bit = if reverse { BWD_BIT } else { FWD_BIT };
        self.0 & (bit << slot.shift()) != 0
    }

    pub fn speed_kmh(self, slot: VehicleSlot) -> u8 {
        ((self.0 >> (slot.shift() + SPEED_SHIFT)) & SPEED_MASK) as u8
    }
}

/// Immutable registry of the vehicles encoded in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingManager {
    vehicles: Vec<VehicleEncoding>,
}

impl EncodingManager {
    pub fn new(vehicles: Vec<VehicleEncoding>) -> Result<Self, ConfigError> {
        if vehicles.is_empty() || vehicles.len() > MAX_VEHICLES {
            return Err(ConfigError::InvalidParameter {
                key: "graph.vehicles".to_string(),
                reason: format!(
                    "between 1 and {MAX_VEHICLES} vehicles are supported, got {}",
                    vehicles.len()
                ),
            });
        }
        for (i, v) in vehicles.iter().enumerate() {
            if vehicles[..i].iter().any(|other| other.name == v.name) {
                return Err(ConfigError::Duplicate {
                    kind: "vehicle",
                    name: v.name.clone(),
                });
            }
        }
        Ok(Self { vehicles })
    }

    pub fn vehicles(&self) -> &[VehicleEncoding] {
        &self.vehicles
    }

    pub fn has_vehicle(&self, name: &str) -> bool {
        self.vehicles.iter().any(|v| v.name == name)
    }

    /// Look up the slot of a vehicle. `profile` is only used for the error.
    pub fn slot(&self, profile: &str, vehicle: &str) -> Result<VehicleSlot, ConfigError> {
        self.vehicles
            .iter()
            .position(|v| v.name == vehicle)
            .map(|i| VehicleSlot(i as u8))
            .ok_or_else(|| ConfigError::UnknownVehicle {
                profile: profile.to_string(),
                vehicle: vehicle.to_string(),
                suggestion: suggest_name(vehicle, self.vehicles.iter().map(|v| v.name.as_str())),
            })
    }

    pub fn vehicle(&self, slot: VehicleSlot) -> &VehicleEncoding {
        &self.vehicles[slot.index()]
    }

    /// Build flags for one vehicle, clamping the speed to the vehicle maximum
    pub fn encode(
        &self,
        flags: EdgeFlags,
        slot: VehicleSlot,
        forward: bool,
        backward: bool,
        speed_kmh: f64,
    ) -> EdgeFlags {
        let max = self.vehicle(slot).max_speed_kmh as f64;
        let speed = speed_kmh.round().clamp(0.0, max) as u8;
        flags.with_access(slot, forward, backward).with_speed(slot, speed)
    }
}
