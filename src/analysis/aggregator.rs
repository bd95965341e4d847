//! Nodule aggregation.
//!
//! Groups per-reader annotation records by nodule and reduces each group to
//! one consensus [`NoduleRecord`]:
//!
//! - subtlety, margin, lobulation, spiculation, malignancy: ceiling of the median
//! - internal structure, calcification, sphericity, texture: most frequent value
//! - diameter, volume, surface area: arithmetic mean
//! - diagnosis: most frequent value
//!
//! Most-frequent-value ties go to the lowest value (`Benign` before
//! `Malignant`), so the result never depends on row order.

use crate::error::Result;
use crate::models::{
    AnnotationRecord, Diagnosis, Diameter, NoduleClassification, NoduleKey, NoduleRecord, Scores,
};
use crate::semantics::Characteristic;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// How a characteristic is reduced across readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Ceiling of the median.
    MedianCeil,
    /// Most frequent value, lowest value on ties.
    Mode,
}

impl Reduction {
    pub fn for_characteristic(characteristic: Characteristic) -> Self {
        match characteristic {
            Characteristic::Subtlety
            | Characteristic::Margin
            | Characteristic::Lobulation
            | Characteristic::Spiculation
            | Characteristic::Malignancy => Reduction::MedianCeil,
            Characteristic::InternalStructure
            | Characteristic::Calcification
            | Characteristic::Sphericity
            | Characteristic::Texture => Reduction::Mode,
        }
    }

    pub fn apply(self, values: &[u8]) -> u8 {
        let reduced = match self {
            Reduction::MedianCeil => median_ceil(values),
            Reduction::Mode => mode(values),
        };
        reduced.unwrap_or_default()
    }
}

/// Group annotation records by nodule key, in key order.
pub fn group_by_nodule(
    annotations: &[AnnotationRecord],
) -> BTreeMap<NoduleKey, Vec<&AnnotationRecord>> {
    let mut grouped: BTreeMap<NoduleKey, Vec<&AnnotationRecord>> = BTreeMap::new();

    for annotation in annotations {
        grouped
            .entry(annotation.nodule_key())
            .or_default()
            .push(annotation);
    }

    grouped
}

/// Reduce the annotation table to one consensus record per nodule.
pub fn aggregate(annotations: &[AnnotationRecord]) -> Result<Vec<NoduleRecord>> {
    let grouped = group_by_nodule(annotations);
    debug!(
        "Aggregating {} annotations into {} nodules",
        annotations.len(),
        grouped.len()
    );

    let nodules = grouped
        .into_iter()
        .map(|(key, group)| reduce(key, &group))
        .collect::<Result<Vec<_>>>()?;

    info!("Built {} consensus nodule records", nodules.len());
    Ok(nodules)
}

/// Reduce one nodule's readings to its consensus record.
pub fn reduce(key: NoduleKey, group: &[&AnnotationRecord]) -> Result<NoduleRecord> {
    let mut scores = Scores::default();
    for characteristic in Characteristic::ALL {
        let values: Vec<u8> = group
            .iter()
            .map(|a| a.scores().get(characteristic))
            .collect();
        scores.set(
            characteristic,
            Reduction::for_characteristic(characteristic).apply(&values),
        );
    }

    let labels = scores.describe()?;
    let diagnoses: Vec<Diagnosis> = group.iter().map(|a| a.diagnosis).collect();

    Ok(NoduleRecord {
        patient_id: key.patient_id,
        scan_id: key.scan_id,
        nodule_classification: key.classification,
        nodule_id: key.nodule_id,
        n_readers: group.len() as u32,
        subtlety: scores.subtlety,
        internal_structure: scores.internal_structure,
        calcification: scores.calcification,
        sphericity: scores.sphericity,
        margin: scores.margin,
        lobulation: scores.lobulation,
        spiculation: scores.spiculation,
        texture: scores.texture,
        malignancy: scores.malignancy,
        subtlety_label: labels.subtlety,
        internal_structure_label: labels.internal_structure,
        calcification_label: labels.calcification,
        sphericity_label: labels.sphericity,
        margin_label: labels.margin,
        lobulation_label: labels.lobulation,
        spiculation_label: labels.spiculation,
        texture_label: labels.texture,
        malignancy_label: labels.malignancy,
        diameter: mean_diameter(group),
        volume: mean_of(group.iter().map(|a| a.volume)),
        surface_area: mean_of(group.iter().map(|a| a.surface_area)),
        diagnosis: mode(&diagnoses).unwrap_or(Diagnosis::Benign),
    })
}

/// Split consensus records by classification.
pub fn partition_by_classification(
    nodules: Vec<NoduleRecord>,
) -> BTreeMap<NoduleClassification, Vec<NoduleRecord>> {
    let mut grouped: BTreeMap<NoduleClassification, Vec<NoduleRecord>> = BTreeMap::new();

    for nodule in nodules {
        grouped
            .entry(nodule.nodule_classification)
            .or_default()
            .push(nodule);
    }

    grouped
}

/// Ceiling of the median; `None` for an empty slice.
pub fn median_ceil(values: &[u8]) -> Option<u8> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        let sum = u16::from(sorted[mid - 1]) + u16::from(sorted[mid]);
        Some(((sum + 1) / 2) as u8)
    }
}

/// Most frequent value, lowest value on ties; `None` for an empty slice.
pub fn mode<T: Ord + Copy>(values: &[T]) -> Option<T> {
    let mut counts: BTreeMap<T, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(*value).or_default() += 1;
    }

    // Ascending iteration keeps the first (lowest) value among equal counts.
    let mut best: Option<(T, usize)> = None;
    for (value, count) in counts {
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((value, count)),
        }
    }

    best.map(|(value, _)| value)
}

/// Arithmetic mean of the present values; `None` when none are present.
pub fn mean_of(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn mean_diameter(group: &[&AnnotationRecord]) -> Diameter {
    let measured: Option<Vec<f64>> = group.iter().map(|a| a.diameter.value()).collect();

    match measured {
        Some(values) if !values.is_empty() => mean_of(values.into_iter().map(Some))
            .map(Diameter::Measured)
            .unwrap_or(Diameter::Subthreshold),
        _ => Diameter::Subthreshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extractor::tests::sample_source;
    use crate::analysis::extractor::{AnnotationExtractor, ExtractionOptions};
    use crate::source::PatientFilter;
    use std::collections::HashSet;

    fn annotation(nodule_id: &str, malignancy: u8, diameter: f64) -> AnnotationRecord {
        let scores = Scores {
            subtlety: 3,
            internal_structure: 1,
            calcification: 6,
            sphericity: 3,
            margin: 3,
            lobulation: 1,
            spiculation: 1,
            texture: 5,
            malignancy,
        };
        let labels = scores.describe().unwrap();
        AnnotationRecord {
            patient_id: "LIDC-IDRI-0001".to_string(),
            scan_id: 1,
            nodule_classification: NoduleClassification::Nodule,
            nodule_id: nodule_id.to_string(),
            annotation_no: 1,
            annotation_id: Some(1),
            n_readers: 1,
            subtlety: scores.subtlety,
            internal_structure: scores.internal_structure,
            calcification: scores.calcification,
            sphericity: scores.sphericity,
            margin: scores.margin,
            lobulation: scores.lobulation,
            spiculation: scores.spiculation,
            texture: scores.texture,
            malignancy: scores.malignancy,
            subtlety_label: labels.subtlety,
            internal_structure_label: labels.internal_structure,
            calcification_label: labels.calcification,
            sphericity_label: labels.sphericity,
            margin_label: labels.margin,
            lobulation_label: labels.lobulation,
            spiculation_label: labels.spiculation,
            texture_label: labels.texture,
            malignancy_label: labels.malignancy,
            diameter: Diameter::Measured(diameter),
            volume: Some(diameter * 2.0),
            surface_area: None,
            diagnosis: Diagnosis::from_malignancy(malignancy),
            slice_thickness: None,
            slice_spacing: None,
            pixel_spacing: None,
        }
    }

    #[test]
    fn test_median_ceil() {
        assert_eq!(median_ceil(&[2, 3]), Some(3));
        assert_eq!(median_ceil(&[3, 1, 2]), Some(2));
        assert_eq!(median_ceil(&[1, 2, 4, 5]), Some(3));
        assert_eq!(median_ceil(&[4, 4]), Some(4));
        assert_eq!(median_ceil(&[0, 0]), Some(0));
        assert_eq!(median_ceil(&[]), None);
    }

    #[test]
    fn test_mode_prefers_lowest_on_ties() {
        assert_eq!(mode(&[3, 5, 5]), Some(5));
        assert_eq!(mode(&[5, 3]), Some(3));
        assert_eq!(mode(&[6, 4, 6, 4, 1]), Some(4));
        assert_eq!(mode::<u8>(&[]), None);
        assert_eq!(
            mode(&[Diagnosis::Malignant, Diagnosis::Benign]),
            Some(Diagnosis::Benign)
        );
    }

    #[test]
    fn test_diagnosis_majority() {
        let diagnoses = [Diagnosis::Benign, Diagnosis::Benign, Diagnosis::Malignant];
        assert_eq!(mode(&diagnoses), Some(Diagnosis::Benign));
    }

    #[test]
    fn test_mean_of() {
        assert_eq!(mean_of([Some(4.0), Some(6.0)]), Some(5.0));
        assert_eq!(mean_of([Some(4.0), None]), Some(4.0));
        assert_eq!(mean_of([None, None]), None);
    }

    #[test]
    fn test_reduce_group() {
        let rows = vec![annotation("n1", 2, 4.0), annotation("n1", 3, 6.0)];
        let nodules = aggregate(&rows).unwrap();

        assert_eq!(nodules.len(), 1);
        let nodule = &nodules[0];
        assert_eq!(nodule.n_readers, 2);
        assert_eq!(nodule.malignancy, 3);
        assert_eq!(nodule.malignancy_label, "3-Indeterminate");
        assert_eq!(nodule.diameter, Diameter::Measured(5.0));
        assert_eq!(nodule.volume, Some(10.0));
        assert_eq!(nodule.surface_area, None);
        assert_eq!(nodule.diagnosis, Diagnosis::Benign);
        assert_eq!(nodule.calcification_label, "6-Absent");
    }

    #[test]
    fn test_all_sentinel_group_reduces_to_zero() {
        let mut a = annotation("n1", 0, 4.0);
        let mut b = annotation("n1", 0, 4.0);
        a.texture = 0;
        b.texture = 0;
        let nodules = aggregate(&[a, b]).unwrap();

        assert_eq!(nodules[0].malignancy, 0);
        assert_eq!(nodules[0].malignancy_label, "0-NA");
        assert_eq!(nodules[0].texture, 0);
    }

    #[test]
    fn test_reader_count_matches_group_size() {
        let source = sample_source();
        let cases = HashSet::new();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());
        let annotations = extractor
            .extract(&PatientFilter::default())
            .unwrap()
            .annotations;
        let nodules = aggregate(&annotations).unwrap();

        assert_eq!(nodules.len(), 4);
        for nodule in &nodules {
            let count = annotations
                .iter()
                .filter(|a| {
                    a.patient_id == nodule.patient_id
                        && a.scan_id == nodule.scan_id
                        && a.nodule_id == nodule.nodule_id
                })
                .count();
            assert_eq!(nodule.n_readers as usize, count);
        }

        let large = nodules
            .iter()
            .find(|n| n.nodule_id == "LIDC-IDRI-0001_2")
            .unwrap();
        assert_eq!(large.malignancy, 5);
        assert_eq!(large.diameter, Diameter::Measured(20.0));
        assert_eq!(large.diagnosis, Diagnosis::Malignant);
    }

    #[test]
    fn test_small_nodule_keeps_subthreshold_diameter() {
        let source = sample_source();
        let cases = HashSet::new();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());
        let annotations = extractor
            .extract(&PatientFilter::default())
            .unwrap()
            .annotations;
        let nodules = aggregate(&annotations).unwrap();

        let small = nodules
            .iter()
            .find(|n| n.nodule_classification == NoduleClassification::SmallNodule)
            .unwrap();
        assert_eq!(small.diameter, Diameter::Subthreshold);
        assert_eq!(small.volume, None);
        assert_eq!(small.malignancy, 1);
        assert_eq!(small.diagnosis, Diagnosis::Benign);
    }

    #[test]
    fn test_partition_by_classification() {
        let mut rows = vec![annotation("n1", 2, 4.0), annotation("n2", 4, 8.0)];
        rows[1].nodule_classification = NoduleClassification::NonNodule;
        let parts = partition_by_classification(aggregate(&rows).unwrap());

        assert_eq!(parts[&NoduleClassification::Nodule].len(), 1);
        assert_eq!(parts[&NoduleClassification::NonNodule].len(), 1);
        assert!(!parts.contains_key(&NoduleClassification::SmallNodule));
    }
}
