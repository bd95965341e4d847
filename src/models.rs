//! Data models for the annotation and nodule tables.
//!
//! Records are flat so that field order is the column order of the
//! delimited files they are persisted to.

use crate::error::Result;
use crate::semantics::{self, describe, Characteristic};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnosis derived from a malignancy score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Diagnosis {
    Benign,
    Malignant,
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnosis::Benign => write!(f, "Benign"),
            Diagnosis::Malignant => write!(f, "Malignant"),
        }
    }
}

impl Diagnosis {
    /// Malignancy scores above this are diagnosed malignant.
    pub const MALIGNANT_ABOVE: u8 = 3;

    /// Diagnosis for a reader's malignancy score.
    pub fn from_malignancy(score: u8) -> Self {
        if score > Self::MALIGNANT_ABOVE {
            Diagnosis::Malignant
        } else {
            Diagnosis::Benign
        }
    }
}

/// How a nodule candidate is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoduleClassification {
    /// Clustered nodule of at least 3mm.
    Nodule,
    /// Candidate on a patient known to carry a non-nodule designation.
    NonNodule,
    /// Placeholder for a scan with only sub-threshold findings.
    SmallNodule,
}

impl fmt::Display for NoduleClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoduleClassification::Nodule => write!(f, "nodule"),
            NoduleClassification::NonNodule => write!(f, "non_nodule"),
            NoduleClassification::SmallNodule => write!(f, "small_nodule"),
        }
    }
}

/// Nodule diameter; sub-threshold placeholders carry no measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Diameter {
    Measured(f64),
    Subthreshold,
}

impl Diameter {
    /// Table representation of a sub-threshold diameter.
    pub const SUBTHRESHOLD: &'static str = "<3mm";

    pub fn value(&self) -> Option<f64> {
        match self {
            Diameter::Measured(mm) => Some(*mm),
            Diameter::Subthreshold => None,
        }
    }
}

impl fmt::Display for Diameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diameter::Measured(mm) => write!(f, "{}", mm),
            Diameter::Subthreshold => write!(f, "{}", Self::SUBTHRESHOLD),
        }
    }
}

impl From<Diameter> for String {
    fn from(diameter: Diameter) -> Self {
        diameter.to_string()
    }
}

impl TryFrom<String> for Diameter {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed == Self::SUBTHRESHOLD {
            return Ok(Diameter::Subthreshold);
        }
        trimmed
            .parse::<f64>()
            .map(Diameter::Measured)
            .map_err(|e| format!("invalid diameter '{}': {}", value, e))
    }
}

/// The nine ordinal characteristic scores of one reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub subtlety: u8,
    pub internal_structure: u8,
    pub calcification: u8,
    pub sphericity: u8,
    pub margin: u8,
    pub lobulation: u8,
    pub spiculation: u8,
    pub texture: u8,
    pub malignancy: u8,
}

impl Scores {
    pub fn get(&self, characteristic: Characteristic) -> u8 {
        match characteristic {
            Characteristic::Subtlety => self.subtlety,
            Characteristic::InternalStructure => self.internal_structure,
            Characteristic::Calcification => self.calcification,
            Characteristic::Sphericity => self.sphericity,
            Characteristic::Margin => self.margin,
            Characteristic::Lobulation => self.lobulation,
            Characteristic::Spiculation => self.spiculation,
            Characteristic::Texture => self.texture,
            Characteristic::Malignancy => self.malignancy,
        }
    }

    pub fn set(&mut self, characteristic: Characteristic, code: u8) {
        let slot = match characteristic {
            Characteristic::Subtlety => &mut self.subtlety,
            Characteristic::InternalStructure => &mut self.internal_structure,
            Characteristic::Calcification => &mut self.calcification,
            Characteristic::Sphericity => &mut self.sphericity,
            Characteristic::Margin => &mut self.margin,
            Characteristic::Lobulation => &mut self.lobulation,
            Characteristic::Spiculation => &mut self.spiculation,
            Characteristic::Texture => &mut self.texture,
            Characteristic::Malignancy => &mut self.malignancy,
        };
        *slot = code;
    }

    /// Renders every score as `"<code>-<label>"`, failing on the first code
    /// outside its scale.
    pub fn describe(&self) -> Result<Descriptions> {
        Ok(Descriptions {
            subtlety: describe(self.subtlety, semantics::subtlety)?,
            internal_structure: describe(self.internal_structure, semantics::internal_structure)?,
            calcification: describe(self.calcification, semantics::calcification)?,
            sphericity: describe(self.sphericity, semantics::sphericity)?,
            margin: describe(self.margin, semantics::margin)?,
            lobulation: describe(self.lobulation, semantics::lobulation)?,
            spiculation: describe(self.spiculation, semantics::spiculation)?,
            texture: describe(self.texture, semantics::texture)?,
            malignancy: describe(self.malignancy, semantics::malignancy)?,
        })
    }
}

/// Semantic decoration of a [`Scores`] value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptions {
    pub subtlety: String,
    pub internal_structure: String,
    pub calcification: String,
    pub sphericity: String,
    pub margin: String,
    pub lobulation: String,
    pub spiculation: String,
    pub texture: String,
    pub malignancy: String,
}

/// Physical acquisition parameters of the scan an annotation belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanGeometry {
    pub slice_thickness: Option<f64>,
    pub slice_spacing: Option<f64>,
    pub pixel_spacing: Option<f64>,
}

/// One reader's scoring of one nodule candidate on one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub patient_id: String,
    pub scan_id: u32,
    pub nodule_classification: NoduleClassification,
    pub nodule_id: String,
    /// 1-based position of the reading within its nodule; 0 for placeholders.
    pub annotation_no: u32,
    pub annotation_id: Option<u32>,
    pub n_readers: u32,
    pub subtlety: u8,
    #[serde(rename = "internalStructure")]
    pub internal_structure: u8,
    pub calcification: u8,
    pub sphericity: u8,
    pub margin: u8,
    pub lobulation: u8,
    pub spiculation: u8,
    pub texture: u8,
    pub malignancy: u8,
    #[serde(rename = "Subtlety")]
    pub subtlety_label: String,
    #[serde(rename = "InternalStructure")]
    pub internal_structure_label: String,
    #[serde(rename = "Calcification")]
    pub calcification_label: String,
    #[serde(rename = "Sphericity")]
    pub sphericity_label: String,
    #[serde(rename = "Margin")]
    pub margin_label: String,
    #[serde(rename = "Lobulation")]
    pub lobulation_label: String,
    #[serde(rename = "Spiculation")]
    pub spiculation_label: String,
    #[serde(rename = "Texture")]
    pub texture_label: String,
    #[serde(rename = "Malignancy")]
    pub malignancy_label: String,
    pub diameter: Diameter,
    pub volume: Option<f64>,
    pub surface_area: Option<f64>,
    pub diagnosis: Diagnosis,
    pub slice_thickness: Option<f64>,
    pub slice_spacing: Option<f64>,
    pub pixel_spacing: Option<f64>,
}

impl AnnotationRecord {
    /// The record's ordinal scores.
    pub fn scores(&self) -> Scores {
        Scores {
            subtlety: self.subtlety,
            internal_structure: self.internal_structure,
            calcification: self.calcification,
            sphericity: self.sphericity,
            margin: self.margin,
            lobulation: self.lobulation,
            spiculation: self.spiculation,
            texture: self.texture,
            malignancy: self.malignancy,
        }
    }

    /// Grouping key of the nodule this reading belongs to.
    pub fn nodule_key(&self) -> NoduleKey {
        NoduleKey {
            patient_id: self.patient_id.clone(),
            scan_id: self.scan_id,
            nodule_id: self.nodule_id.clone(),
            classification: self.nodule_classification,
        }
    }
}

/// Identity shared by every reading of one nodule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoduleKey {
    pub patient_id: String,
    pub scan_id: u32,
    pub nodule_id: String,
    pub classification: NoduleClassification,
}

/// Consensus record reduced from all readings of one nodule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoduleRecord {
    pub patient_id: String,
    pub scan_id: u32,
    pub nodule_classification: NoduleClassification,
    pub nodule_id: String,
    pub n_readers: u32,
    pub subtlety: u8,
    #[serde(rename = "internalStructure")]
    pub internal_structure: u8,
    pub calcification: u8,
    pub sphericity: u8,
    pub margin: u8,
    pub lobulation: u8,
    pub spiculation: u8,
    pub texture: u8,
    pub malignancy: u8,
    #[serde(rename = "Subtlety")]
    pub subtlety_label: String,
    #[serde(rename = "InternalStructure")]
    pub internal_structure_label: String,
    #[serde(rename = "Calcification")]
    pub calcification_label: String,
    #[serde(rename = "Sphericity")]
    pub sphericity_label: String,
    #[serde(rename = "Margin")]
    pub margin_label: String,
    #[serde(rename = "Lobulation")]
    pub lobulation_label: String,
    #[serde(rename = "Spiculation")]
    pub spiculation_label: String,
    #[serde(rename = "Texture")]
    pub texture_label: String,
    #[serde(rename = "Malignancy")]
    pub malignancy_label: String,
    pub diameter: Diameter,
    pub volume: Option<f64>,
    pub surface_area: Option<f64>,
    pub diagnosis: Diagnosis,
}

/// Per-patient nodule counts joined with scan metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub patient_id: String,
    pub total_nodules: u32,
    pub n_nodules_lt_3mm: u32,
    pub n_nodules_ge_3mm: u32,
    pub n_non_nodules_ge_3mm: u32,
    pub n_nodules_benign: u32,
    pub n_nodules_malignant: u32,
    pub filepath: Option<String>,
    pub n_images: Option<u32>,
    pub total_file_size: Option<String>,
}

/// One row of the collection's scan metadata table.
///
/// Only the columns used for the case table are read; the rest are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    #[serde(rename = "Subject ID")]
    pub subject_id: String,
    #[serde(rename = "Modality", default)]
    pub modality: Option<String>,
    #[serde(rename = "File Location", default)]
    pub file_location: Option<String>,
    #[serde(rename = "Number of Images", default)]
    pub number_of_images: Option<u32>,
    #[serde(rename = "File Size", default)]
    pub file_size: Option<String>,
}

impl ScanMetadata {
    pub fn is_ct(&self) -> bool {
        self.modality
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("CT"))
            .unwrap_or(false)
    }
}
