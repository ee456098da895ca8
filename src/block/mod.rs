use serde::{Deserialize, Serialize};
use std::fmt;


/// Baseline temperature: cooling decays toward it and unset temperatures read as it
pub const AMBIENT_TEMPERATURE: f64 = 20.0;

/// Block temperature as stored
///
/// `Unset` is a valid persisted state (no temperature written yet) and is
/// normalized to [`AMBIENT_TEMPERATURE`] wherever the value is read. A
/// measured `0.0` is a real temperature and is never treated as unset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Temperature {
    Measured(f64),
    #[default]
    Unset,
}

impl Temperature {
    /// Effective value, ambient when unset
    pub fn value(self) -> f64 {
        match self {
            Temperature::Measured(t) => t,
            Temperature::Unset => AMBIENT_TEMPERATURE,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Temperature::Unset)
    }
}

impl From<Option<f64>> for Temperature {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(t) => Temperature::Measured(t),
            None => Temperature::Unset,
        }
    }
}

impl From<Temperature> for Option<f64> {
    fn from(value: Temperature) -> Self {
        match value {
            Temperature::Measured(t) => Some(t),
            Temperature::Unset => None,
        }
    }
}

/// A positioned, sized entity carrying a load metric and a temperature
///
/// Geometry is not validated: zero or negative extents are stored as given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Opaque identifier assigned by whoever created the block
    pub id: String,

    /// Top-left corner
    pub x: f64,
    pub y: f64,

    pub width: f64,
    pub height: f64,

    /// Load metric, nominally 0..=100 (not enforced)
    pub dynamic_load: f64,

    #[serde(default, skip_serializing_if = "Temperature::is_unset")]
    pub temperature: Temperature,
}

impl Block {
    /// Center point of the block's rectangle
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Partial block payload for upsert-merge
///
/// Only fields that are present are written. An edit that omits
/// `temperature` leaves any simulated value in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_load: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl BlockPatch {
    /// Patch carrying only an id (no fields to merge)
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Validate the patch before it reaches the store
    ///
    /// Ids must be non-empty; numeric fields must be finite since the store
    /// cannot persist NaN or infinities.
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.id.trim().is_empty() {
            return Err(PatchError::EmptyId);
        }

        let fields = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
            ("dynamicLoad", self.dynamic_load),
            ("temperature", self.temperature),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(PatchError::NonFinite(name));
                }
            }
        }

        Ok(())
    }
}

impl From<Block> for BlockPatch {
    fn from(block: Block) -> Self {
        Self {
            id: block.id,
            x: Some(block.x),
            y: Some(block.y),
            width: Some(block.width),
            height: Some(block.height),
            dynamic_load: Some(block.dynamic_load),
            temperature: block.temperature.into(),
        }
    }
}

/// Patch validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    EmptyId,
    NonFinite(&'static str),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::EmptyId => write!(f, "block id is required"),
            PatchError::NonFinite(field) => write!(f, "field '{}' must be a finite number", field),
        }
    }
}

impl std::error::Error for PatchError {}
