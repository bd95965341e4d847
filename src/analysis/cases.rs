//! Case-level summary: one row per patient.

use crate::models::{CaseRecord, Diagnosis, NoduleClassification, NoduleRecord, ScanMetadata};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Count each patient's consensus nodules and attach the patient's CT series
/// metadata when available.
pub fn build_cases(nodules: &[NoduleRecord], metadata: &[ScanMetadata]) -> Vec<CaseRecord> {
    let series = ct_series_by_subject(metadata);
    let mut cases: BTreeMap<&str, CaseRecord> = BTreeMap::new();

    for nodule in nodules {
        let case = cases
            .entry(nodule.patient_id.as_str())
            .or_insert_with(|| CaseRecord {
                patient_id: nodule.patient_id.clone(),
                ..CaseRecord::default()
            });

        case.total_nodules += 1;
        match nodule.nodule_classification {
            NoduleClassification::SmallNodule => case.n_nodules_lt_3mm += 1,
            NoduleClassification::NonNodule => case.n_non_nodules_ge_3mm += 1,
            NoduleClassification::Nodule => {
                case.n_nodules_ge_3mm += 1;
                match nodule.diagnosis {
                    Diagnosis::Benign => case.n_nodules_benign += 1,
                    Diagnosis::Malignant => case.n_nodules_malignant += 1,
                }
            }
        }
    }

    for case in cases.values_mut() {
        if let Some(row) = series.get(case.patient_id.as_str()) {
            case.filepath = row.file_location.clone();
            case.n_images = row.number_of_images;
            case.total_file_size = row.file_size.clone();
        } else {
            debug!("No scan metadata for {}", case.patient_id);
        }
    }

    cases.into_values().collect()
}

/// First CT row per subject, falling back to the subject's first row.
fn ct_series_by_subject(metadata: &[ScanMetadata]) -> HashMap<&str, &ScanMetadata> {
    let mut series: HashMap<&str, &ScanMetadata> = HashMap::new();

    for row in metadata {
        series
            .entry(row.subject_id.as_str())
            .and_modify(|current| {
                if !current.is_ct() && row.is_ct() {
                    *current = row;
                }
            })
            .or_insert(row);
    }

    series
}
