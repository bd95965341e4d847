//! Annotation extraction.
//!
//! Walks the scans selected by a [`PatientFilter`], clusters each scan's
//! annotations through the [`ScanSource`] and emits one
//! [`AnnotationRecord`] per (nodule, reader) pair.

use crate::error::Result;
use crate::models::{AnnotationRecord, Diagnosis, Diameter, NoduleClassification, Scores};
use crate::source::{NoduleGroup, PatientFilter, ReaderAnnotation, Scan, ScanSource};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use tracing::{debug, info};

/// Malignancy code recorded for sub-threshold placeholders.
const SMALL_NODULE_MALIGNANCY: u8 = 1;

/// Switches controlling which candidates are recorded.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionOptions {
    /// Record a placeholder for scans with no clustered nodules.
    pub include_small_nodules: bool,
    /// Record nodules of patients on the non-nodule reference list.
    pub include_non_nodules: bool,
    /// Show a progress bar while scans are processed.
    pub show_progress: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            include_small_nodules: true,
            include_non_nodules: true,
            show_progress: false,
        }
    }
}

/// Output of one extraction run.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub annotations: Vec<AnnotationRecord>,
    pub scans_processed: usize,
}

/// Builds the annotation table from a scan source.
pub struct AnnotationExtractor<'a, S: ScanSource + ?Sized> {
    source: &'a S,
    non_nodule_cases: &'a HashSet<String>,
    options: ExtractionOptions,
}

impl<'a, S: ScanSource + ?Sized> AnnotationExtractor<'a, S> {
    pub fn new(
        source: &'a S,
        non_nodule_cases: &'a HashSet<String>,
        options: ExtractionOptions,
    ) -> Self {
        Self {
            source,
            non_nodule_cases,
            options,
        }
    }

    /// Extract annotation records for every scan passing `filter`.
    pub fn extract(&self, filter: &PatientFilter) -> Result<Extraction> {
        if !filter.included().is_empty() {
            info!("Restricted to {} patients", filter.included().len());
        }
        for (patient_id, reason) in filter.excluded() {
            debug!("Excluding {}: {}", patient_id, reason);
        }

        let scans = self.source.query(filter)?;
        info!("Extracting annotations from {} scans", scans.len());

        let progress = self.progress_bar(scans.len() as u64);
        let mut extraction = Extraction::default();

        for scan in &scans {
            progress.set_message(format!("Processing patient {}", scan.patient_id));
            debug!("Processing patient {} (scan {})", scan.patient_id, scan.id);

            let nodules = self.source.cluster_annotations(scan)?;
            if nodules.is_empty() {
                if self.options.include_small_nodules {
                    extraction.annotations.push(small_nodule_annotation(scan)?);
                } else {
                    debug!("Scan {} has no nodules; skipped", scan.id);
                }
            } else {
                self.nodule_annotations(scan, &nodules, &mut extraction.annotations)?;
            }

            extraction.scans_processed += 1;
            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            "Extracted {} annotations from {} scans",
            extraction.annotations.len(),
            extraction.scans_processed
        );

        Ok(extraction)
    }

    fn nodule_annotations(
        &self,
        scan: &Scan,
        nodules: &[NoduleGroup],
        out: &mut Vec<AnnotationRecord>,
    ) -> Result<()> {
        let classification = self.classify(&scan.patient_id);
        let non_nodule = classification == NoduleClassification::NonNodule;
        if non_nodule && !self.options.include_non_nodules {
            debug!(
                "Patient {} is a non-nodule case; {} nodules skipped",
                scan.patient_id,
                nodules.len()
            );
            return Ok(());
        }

        for (nodule_no, nodule) in nodules.iter().enumerate() {
            let nodule_id = nodule_id(&scan.patient_id, nodule_no + 1);

            for (annotation_no, annotation) in nodule.iter().enumerate() {
                out.push(reader_annotation(
                    scan,
                    &nodule_id,
                    classification,
                    annotation_no as u32 + 1,
                    nodule.len() as u32,
                    annotation,
                )?);
            }
        }

        Ok(())
    }

    fn classify(&self, patient_id: &str) -> NoduleClassification {
        if self.non_nodule_cases.contains(patient_id) {
            NoduleClassification::NonNodule
        } else {
            NoduleClassification::Nodule
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

/// Nodule identifier: patient id and 1-based nodule number.
pub fn nodule_id(patient_id: &str, nodule_no: usize) -> String {
    format!("{}_{}", patient_id, nodule_no)
}

/// Diagnosis for a reading; non-nodules are always benign.
pub fn diagnose(classification: NoduleClassification, malignancy: u8) -> Diagnosis {
    match classification {
        NoduleClassification::NonNodule => Diagnosis::Benign,
        _ => Diagnosis::from_malignancy(malignancy),
    }
}

fn reader_annotation(
    scan: &Scan,
    nodule_id: &str,
    classification: NoduleClassification,
    annotation_no: u32,
    n_readers: u32,
    annotation: &ReaderAnnotation,
) -> Result<AnnotationRecord> {
    let scores = annotation.scores();
    let mut record = annotation_record(
        scan,
        nodule_id.to_string(),
        classification,
        scores,
        Diameter::Measured(annotation.diameter),
        diagnose(classification, scores.malignancy),
    )?;

    record.annotation_no = annotation_no;
    record.annotation_id = Some(annotation.id);
    record.n_readers = n_readers;
    record.volume = Some(annotation.volume);
    record.surface_area = Some(annotation.surface_area);
    Ok(record)
}

/// Placeholder for a scan whose findings are all under 3mm.
fn small_nodule_annotation(scan: &Scan) -> Result<AnnotationRecord> {
    let scores = Scores {
        malignancy: SMALL_NODULE_MALIGNANCY,
        ..Scores::default()
    };

    annotation_record(
        scan,
        nodule_id(&scan.patient_id, 0),
        NoduleClassification::SmallNodule,
        scores,
        Diameter::Subthreshold,
        Diagnosis::Benign,
    )
}

fn annotation_record(
    scan: &Scan,
    nodule_id: String,
    classification: NoduleClassification,
    scores: Scores,
    diameter: Diameter,
    diagnosis: Diagnosis,
) -> Result<AnnotationRecord> {
    let labels = scores.describe()?;
    let geometry = scan.geometry();

    Ok(AnnotationRecord {
        patient_id: scan.patient_id.clone(),
        scan_id: scan.id,
        nodule_classification: classification,
        nodule_id,
        annotation_no: 0,
        annotation_id: None,
        n_readers: 0,
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
        diameter,
        volume: None,
        surface_area: None,
        diagnosis,
        slice_thickness: geometry.slice_thickness,
        slice_spacing: geometry.slice_spacing,
        pixel_spacing: geometry.pixel_spacing,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::source::directory::{DirectoryScanSource, ScanExport};
    use std::collections::BTreeMap;

    pub(crate) fn reading(id: u32, malignancy: u8, diameter: f64) -> ReaderAnnotation {
        ReaderAnnotation {
            id,
            subtlety: 4,
            internal_structure: 1,
            calcification: 6,
            sphericity: 4,
            margin: 4,
            lobulation: 2,
            spiculation: 1,
            texture: 5,
            malignancy,
            diameter,
            volume: diameter * 100.0,
            surface_area: diameter * 10.0,
        }
    }

    pub(crate) fn export(id: u32, patient: &str, nodules: Vec<NoduleGroup>) -> ScanExport {
        ScanExport {
            scan: Scan {
                id,
                patient_id: patient.to_string(),
                slice_thickness: Some(2.5),
                slice_spacing: Some(2.5),
                pixel_spacing: Some(0.7),
            },
            nodules,
        }
    }

    pub(crate) fn sample_source() -> DirectoryScanSource {
        DirectoryScanSource::from_exports(vec![
            export(
                1,
                "LIDC-IDRI-0001",
                vec![
                    vec![reading(10, 2, 4.0), reading(11, 3, 6.0)],
                    vec![
                        reading(12, 5, 20.0),
                        reading(13, 4, 22.0),
                        reading(14, 5, 18.0),
                    ],
                ],
            ),
            export(2, "LIDC-IDRI-0002", Vec::new()),
            export(3, "LIDC-IDRI-0003", vec![vec![reading(30, 5, 9.0)]]),
        ])
    }

    fn non_nodules() -> HashSet<String> {
        ["LIDC-IDRI-0003".to_string()].into_iter().collect()
    }

    #[test]
    fn test_one_record_per_reader() {
        let source = sample_source();
        let cases = non_nodules();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());
        let extraction = extractor.extract(&PatientFilter::default()).unwrap();

        assert_eq!(extraction.scans_processed, 3);
        // 5 readings on patient 1, a placeholder for 2, one non-nodule on 3.
        assert_eq!(extraction.annotations.len(), 7);

        let first = &extraction.annotations[0];
        assert_eq!(first.nodule_id, "LIDC-IDRI-0001_1");
        assert_eq!(first.annotation_no, 1);
        assert_eq!(first.annotation_id, Some(10));
        assert_eq!(first.n_readers, 2);
        assert_eq!(first.malignancy_label, "2-Moderately Unlikely");
        assert_eq!(first.calcification_label, "6-Absent");
        assert_eq!(first.diameter, Diameter::Measured(4.0));
        assert_eq!(first.slice_thickness, Some(2.5));

        let second_nodule: Vec<_> = extraction
            .annotations
            .iter()
            .filter(|a| a.nodule_id == "LIDC-IDRI-0001_2")
            .collect();
        assert_eq!(second_nodule.len(), 3);
        assert!(second_nodule.iter().all(|a| a.n_readers == 3));
        assert_eq!(second_nodule[2].annotation_no, 3);
    }

    #[test]
    fn test_diagnosis_from_malignancy() {
        let source = sample_source();
        let cases = HashSet::new();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());
        let extraction = extractor.extract(&PatientFilter::default()).unwrap();

        let by_id: BTreeMap<_, _> = extraction
            .annotations
            .iter()
            .filter_map(|a| a.annotation_id.map(|id| (id, a.diagnosis)))
            .collect();
        assert_eq!(by_id[&11], Diagnosis::Benign);
        assert_eq!(by_id[&13], Diagnosis::Malignant);
        assert_eq!(by_id[&30], Diagnosis::Malignant);
    }

    #[test]
    fn test_non_nodule_is_benign() {
        let source = sample_source();
        let cases = non_nodules();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());
        let extraction = extractor.extract(&PatientFilter::default()).unwrap();

        let non_nodule: Vec<_> = extraction
            .annotations
            .iter()
            .filter(|a| a.patient_id == "LIDC-IDRI-0003")
            .collect();
        assert_eq!(non_nodule.len(), 1);
        assert_eq!(
            non_nodule[0].nodule_classification,
            NoduleClassification::NonNodule
        );
        assert_eq!(non_nodule[0].malignancy, 5);
        assert_eq!(non_nodule[0].diagnosis, Diagnosis::Benign);
    }

    #[test]
    fn test_non_nodules_can_be_excluded() {
        let source = sample_source();
        let cases = non_nodules();
        let options = ExtractionOptions {
            include_non_nodules: false,
            ..ExtractionOptions::default()
        };
        let extractor = AnnotationExtractor::new(&source, &cases, options);
        let extraction = extractor.extract(&PatientFilter::default()).unwrap();

        assert_eq!(extraction.scans_processed, 3);
        assert!(extraction
            .annotations
            .iter()
            .all(|a| a.nodule_classification != NoduleClassification::NonNodule));
    }

    #[test]
    fn test_small_nodule_placeholder() {
        let source = sample_source();
        let cases = HashSet::new();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());
        let filter = PatientFilter::new(vec!["LIDC-IDRI-0002".to_string()], BTreeMap::new());
        let extraction = extractor.extract(&filter).unwrap();

        assert_eq!(extraction.annotations.len(), 1);
        let placeholder = &extraction.annotations[0];
        assert_eq!(
            placeholder.nodule_classification,
            NoduleClassification::SmallNodule
        );
        assert_eq!(placeholder.nodule_id, "LIDC-IDRI-0002_0");
        assert_eq!(placeholder.malignancy, 1);
        assert_eq!(placeholder.malignancy_label, "1-Highly Unlikely");
        assert_eq!(placeholder.subtlety_label, "0-NA");
        assert_eq!(placeholder.diameter, Diameter::Subthreshold);
        assert_eq!(placeholder.diagnosis, Diagnosis::Benign);
        assert_eq!(placeholder.annotation_id, None);
        assert_eq!(placeholder.volume, None);
    }

    #[test]
    fn test_small_nodules_can_be_excluded() {
        let source = sample_source();
        let cases = HashSet::new();
        let options = ExtractionOptions {
            include_small_nodules: false,
            ..ExtractionOptions::default()
        };
        let extractor = AnnotationExtractor::new(&source, &cases, options);
        let filter = PatientFilter::new(vec!["LIDC-IDRI-0002".to_string()], BTreeMap::new());
        let extraction = extractor.extract(&filter).unwrap();

        assert_eq!(extraction.scans_processed, 1);
        assert!(extraction.annotations.is_empty());
    }

    #[test]
    fn test_filter_composition() {
        let source = sample_source();
        let cases = HashSet::new();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());

        let mut exclude = BTreeMap::new();
        exclude.insert("LIDC-IDRI-0002".to_string(), "reason".to_string());
        let filter = PatientFilter::new(vec!["LIDC-IDRI-0001".to_string()], exclude);
        let extraction = extractor.extract(&filter).unwrap();

        assert_eq!(extraction.scans_processed, 1);
        assert!(extraction
            .annotations
            .iter()
            .all(|a| a.patient_id == "LIDC-IDRI-0001"));
    }

    #[test]
    fn test_out_of_range_score_aborts() {
        let mut bad = reading(40, 3, 5.0);
        bad.internal_structure = 5;
        let source =
            DirectoryScanSource::from_exports(vec![export(4, "LIDC-IDRI-0004", vec![vec![bad]])]);
        let cases = HashSet::new();
        let extractor = AnnotationExtractor::new(&source, &cases, ExtractionOptions::default());

        let result = extractor.extract(&PatientFilter::default());
        assert!(matches!(
            result,
            Err(Error::OutOfRangeScore { code: 5, .. })
        ));
    }

    #[test]
    fn test_diagnose() {
        assert_eq!(
            diagnose(NoduleClassification::Nodule, 4),
            Diagnosis::Malignant
        );
        assert_eq!(
            diagnose(NoduleClassification::NonNodule, 5),
            Diagnosis::Benign
        );
        assert_eq!(
            diagnose(NoduleClassification::Nodule, 3),
            Diagnosis::Benign
        );
    }
}
