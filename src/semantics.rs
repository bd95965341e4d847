//! Semantic labels for the LIDC ordinal characteristics.
//!
//! Every characteristic is scored on a closed integer scale, with 0 meaning
//! "not applicable". Each scale value has a fixed label; codes outside the
//! scale are rejected rather than mapped to a fallback.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label used for the sentinel code 0.
pub const NOT_APPLICABLE: &str = "NA";

const SUBTLETY: [&str; 5] = [
    "Extremely Subtle",
    "Moderately Subtle",
    "Fairly Subtle",
    "Moderately Obvious",
    "Obvious",
];

const INTERNAL_STRUCTURE: [&str; 4] = ["Soft Tissue", "Fluid", "Fat", "Air"];

const CALCIFICATION: [&str; 6] = [
    "Popcorn",
    "Laminated",
    "Solid",
    "Non-central",
    "Central",
    "Absent",
];

const SPHERICITY: [&str; 5] = ["Linear", "Ovoid/Linear", "Ovoid", "Ovoid/Round", "Round"];

const MARGIN: [&str; 5] = [
    "Poorly Defined",
    "Near Poorly Defined",
    "Medium Margin",
    "Near Sharp",
    "Sharp",
];

const LOBULATION: [&str; 5] = [
    "No Lobulation",
    "Nearly No Lobulation",
    "Medium Lobulation",
    "Near Marked Lobulation",
    "Marked Lobulation",
];

const SPICULATION: [&str; 5] = [
    "No Spiculation",
    "Nearly No Spiculation",
    "Medium Spiculation",
    "Near Marked Spiculation",
    "Marked Spiculation",
];

const TEXTURE: [&str; 5] = [
    "Non-Solid/GGO",
    "Non-Solid/Mixed",
    "Part Solid/Mixed",
    "Solid/Mixed",
    "Solid",
];

const MALIGNANCY: [&str; 5] = [
    "Highly Unlikely",
    "Moderately Unlikely",
    "Indeterminate",
    "Moderately Suspicious",
    "Highly Suspicious",
];

/// One of the nine ordinal characteristics a reader scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Characteristic {
    Subtlety,
    InternalStructure,
    Calcification,
    Sphericity,
    Margin,
    Lobulation,
    Spiculation,
    Texture,
    Malignancy,
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Characteristic::Subtlety => write!(f, "Subtlety"),
            Characteristic::InternalStructure => write!(f, "Internal structure"),
            Characteristic::Calcification => write!(f, "Calcification"),
            Characteristic::Sphericity => write!(f, "Sphericity"),
            Characteristic::Margin => write!(f, "Margin"),
            Characteristic::Lobulation => write!(f, "Lobulation"),
            Characteristic::Spiculation => write!(f, "Spiculation"),
            Characteristic::Texture => write!(f, "Texture"),
            Characteristic::Malignancy => write!(f, "Malignancy"),
        }
    }
}

impl Characteristic {
    /// All characteristics in table column order.
    pub const ALL: [Characteristic; 9] = [
        Characteristic::Subtlety,
        Characteristic::InternalStructure,
        Characteristic::Calcification,
        Characteristic::Sphericity,
        Characteristic::Margin,
        Characteristic::Lobulation,
        Characteristic::Spiculation,
        Characteristic::Texture,
        Characteristic::Malignancy,
    ];

    fn scale(self) -> &'static [&'static str] {
        match self {
            Characteristic::Subtlety => &SUBTLETY,
            Characteristic::InternalStructure => &INTERNAL_STRUCTURE,
            Characteristic::Calcification => &CALCIFICATION,
            Characteristic::Sphericity => &SPHERICITY,
            Characteristic::Margin => &MARGIN,
            Characteristic::Lobulation => &LOBULATION,
            Characteristic::Spiculation => &SPICULATION,
            Characteristic::Texture => &TEXTURE,
            Characteristic::Malignancy => &MALIGNANCY,
        }
    }

    /// Highest valid code on this characteristic's scale.
    pub fn max_code(self) -> u8 {
        self.scale().len() as u8
    }

    /// Returns the semantic label for `code`.
    ///
    /// Code 0 maps to [`NOT_APPLICABLE`]. Any code above the scale is an
    /// [`Error::OutOfRangeScore`].
    pub fn label(self, code: u8) -> Result<&'static str> {
        if code == 0 {
            return Ok(NOT_APPLICABLE);
        }

        if code > self.max_code() {
            return Err(Error::OutOfRangeScore {
                characteristic: self,
                code,
            });
        }

        Ok(self.scale()[usize::from(code) - 1])
    }
}

/// Returns `"<code>-<label>"`, the form written to the tables.
pub fn describe(code: u8, lookup: fn(u8) -> Result<&'static str>) -> Result<String> {
    Ok(format!("{}-{}", code, lookup(code)?))
}

pub fn subtlety(code: u8) -> Result<&'static str> {
    Characteristic::Subtlety.label(code)
}

pub fn internal_structure(code: u8) -> Result<&'static str> {
    Characteristic::InternalStructure.label(code)
}

pub fn calcification(code: u8) -> Result<&'static str> {
    Characteristic::Calcification.label(code)
}

pub fn sphericity(code: u8) -> Result<&'static str> {
    Characteristic::Sphericity.label(code)
}

pub fn margin(code: u8) -> Result<&'static str> {
    Characteristic::Margin.label(code)
}

pub fn lobulation(code: u8) -> Result<&'static str> {
    Characteristic::Lobulation.label(code)
}

pub fn spiculation(code: u8) -> Result<&'static str> {
    Characteristic::Spiculation.label(code)
}

pub fn texture(code: u8) -> Result<&'static str> {
    Characteristic::Texture.label(code)
}

pub fn malignancy(code: u8) -> Result<&'static str> {
    Characteristic::Malignancy.label(code)
}
