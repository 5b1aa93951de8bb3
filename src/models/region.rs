use serde::{Deserialize, Serialize};

/// A connected patch of changed pixels between the before and after frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Changed pixel count, not the bounding box area.
    pub area: u32,
    /// Mean absolute luminance difference over the region's pixels (0-255).
    pub mean_difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Scratch,
    Dent,
    PaintDamage,
    Unknown,
}

impl DamageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageType::Scratch => "scratch",
            DamageType::Dent => "dent",
            DamageType::PaintDamage => "paint_damage",
            DamageType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAssessment {
    pub region: DamageRegion,
    pub damage_type: DamageType,
    pub confidence: f64,
}
