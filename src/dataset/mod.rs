//! Dataset building.
//!
//! [`DatasetBuilder`] runs the whole pipeline: reference data, annotation
//! extraction, consensus aggregation and the case summary. Every table is
//! written only after all of them have been computed, so a failed build
//! leaves the previous tables in place.

pub mod reference;
pub mod tables;

use crate::analysis::{
    aggregate, build_cases, partition_by_classification, AnnotationExtractor, ExtractionOptions,
};
use crate::config::{Config, TablePaths};
use crate::error::Result;
use crate::models::{AnnotationRecord, CaseRecord, NoduleClassification, NoduleRecord};
use crate::source::{PatientFilter, ScanSource};
use std::time::Instant;
use tables::{exists, read_table, stage_table};
use tracing::{debug, info};

/// In-memory copy of every output table.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub annotations: Vec<AnnotationRecord>,
    pub nodules: Vec<NoduleRecord>,
    pub non_nodules: Vec<NoduleRecord>,
    pub small_nodules: Vec<NoduleRecord>,
    pub cases: Vec<CaseRecord>,
    /// Scans walked by the extractor; zero when loaded from disk.
    pub scans_processed: usize,
    /// True when the tables were reloaded instead of rebuilt.
    pub from_cache: bool,
    /// Wall-clock time of the build or load, in seconds.
    pub duration_seconds: f64,
}

impl Dataset {
    /// Total consensus records across the three nodule tables.
    pub fn consensus_count(&self) -> usize {
        self.nodules.len() + self.non_nodules.len() + self.small_nodules.len()
    }

    /// Row counts of the output tables, in the order of `TablePaths::outputs`.
    pub fn row_counts(&self) -> [usize; 5] {
        [
            self.annotations.len(),
            self.nodules.len(),
            self.non_nodules.len(),
            self.small_nodules.len(),
            self.cases.len(),
        ]
    }
}

/// Builds, or reloads, the annotation, nodule and case tables.
pub struct DatasetBuilder {
    paths: TablePaths,
    filter: PatientFilter,
    options: ExtractionOptions,
    use_existing: bool,
}

impl DatasetBuilder {
    /// Builder for the tables described by `config`.
    pub fn new(config: &Config, use_existing: bool) -> Self {
        Self {
            paths: config.table_paths(),
            filter: PatientFilter::new(
                config.patients.include.clone(),
                config.patients.exclude.clone(),
            ),
            options: ExtractionOptions {
                include_small_nodules: config.features.include_small_nodules,
                include_non_nodules: config.features.include_non_nodules,
                show_progress: config.general.progress,
            },
            use_existing,
        }
    }

    pub fn paths(&self) -> &TablePaths {
        &self.paths
    }

    /// True when reuse is requested and every output table is on disk.
    pub fn can_reuse(&self) -> bool {
        self.use_existing && self.paths.outputs().iter().all(|path| exists(path))
    }

    /// Load the tables from disk when allowed, otherwise rebuild them.
    pub fn build<S: ScanSource + ?Sized>(&self, source: &S) -> Result<Dataset> {
        if self.can_reuse() {
            return self.load();
        }
        if self.use_existing {
            info!("Not all tables exist; rebuilding");
        }
        self.rebuild(source)
    }

    /// Read every output table from disk.
    pub fn load(&self) -> Result<Dataset> {
        let start = Instant::now();
        info!("Loading existing tables");

        let dataset = Dataset {
            annotations: read_table(&self.paths.annotations)?,
            nodules: read_table(&self.paths.nodules)?,
            non_nodules: read_table(&self.paths.non_nodules)?,
            small_nodules: read_table(&self.paths.small_nodules)?,
            cases: read_table(&self.paths.cases)?,
            scans_processed: 0,
            from_cache: true,
            duration_seconds: start.elapsed().as_secs_f64(),
        };

        debug!(
            "Loaded {} annotations and {} consensus records",
            dataset.annotations.len(),
            dataset.consensus_count()
        );
        Ok(dataset)
    }

    /// Extract, aggregate and summarise from `source`, then write all tables.
    pub fn rebuild<S: ScanSource + ?Sized>(&self, source: &S) -> Result<Dataset> {
        let start = Instant::now();

        let non_nodule_cases = reference::load_non_nodule_cases(&self.paths.non_nodule_cases)?;
        let metadata = reference::load_scan_metadata(&self.paths.metadata)?;

        let extractor = AnnotationExtractor::new(source, &non_nodule_cases, self.options);
        let extraction = extractor.extract(&self.filter)?;

        info!("Aggregating annotations into consensus nodules");
        let consensus = aggregate(&extraction.annotations)?;
        let cases = build_cases(&consensus, &metadata);

        let mut by_class = partition_by_classification(consensus);
        let mut take = |class: NoduleClassification| by_class.remove(&class).unwrap_or_default();

        let dataset = Dataset {
            nodules: take(NoduleClassification::Nodule),
            non_nodules: take(NoduleClassification::NonNodule),
            small_nodules: take(NoduleClassification::SmallNodule),
            annotations: extraction.annotations,
            cases,
            scans_processed: extraction.scans_processed,
            from_cache: false,
            duration_seconds: 0.0,
        };

        self.write(&dataset)?;

        Ok(Dataset {
            duration_seconds: start.elapsed().as_secs_f64(),
            ..dataset
        })
    }

    /// Every table is staged before any is replaced.
    fn write(&self, dataset: &Dataset) -> Result<()> {
        let paths = &self.paths;
        let staged = [
            stage_table(&paths.annotations, &dataset.annotations)?,
            stage_table(&paths.nodules, &dataset.nodules)?,
            stage_table(&paths.non_nodules, &dataset.non_nodules)?,
            stage_table(&paths.small_nodules, &dataset.small_nodules)?,
            stage_table(&paths.cases, &dataset.cases)?,
        ];
        for table in staged {
            table.persist()?;
        }

        info!(
            "Wrote annotation table to {} and nodule tables to {}",
            paths.annotations.display(),
            paths.nodules.parent().unwrap_or(&paths.nodules).display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extractor::tests::sample_source;
    use crate::error::Error;
    use crate::models::Diagnosis;
    use crate::source::DirectoryScanSource;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.folders.reference = dir.path().join("reference");
        config.folders.interim = dir.path().join("interim");
        config.folders.final_data = dir.path().join("final");
        config.general.progress = false;
        config
    }

    fn write_reference(config: &Config) {
        let paths = config.table_paths();
        std::fs::create_dir_all(&config.folders.reference).unwrap();
        std::fs::write(&paths.non_nodule_cases, "patient_id\nLIDC-IDRI-0003\n").unwrap();
        std::fs::write(
            &paths.metadata,
            "Subject ID,Modality,File Location,Number of Images,File Size\n\
             LIDC-IDRI-0001,CT,./LIDC-IDRI/LIDC-IDRI-0001/ct,133,70.03 MB\n",
        )
        .unwrap();
    }

    #[test]
    fn test_rebuild_writes_all_tables() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        write_reference(&config);

        let builder = DatasetBuilder::new(&config, false);
        let dataset = builder.build(&sample_source()).unwrap();

        assert!(!dataset.from_cache);
        assert_eq!(dataset.scans_processed, 3);
        assert_eq!(dataset.annotations.len(), 7);
        assert_eq!(dataset.nodules.len(), 2);
        assert_eq!(dataset.non_nodules.len(), 1);
        assert_eq!(dataset.small_nodules.len(), 1);
        assert_eq!(dataset.cases.len(), 3);
        assert_eq!(dataset.cases[0].n_images, Some(133));
        assert_eq!(dataset.row_counts(), [7, 2, 1, 1, 3]);

        for path in builder.paths().outputs() {
            assert!(path.is_file(), "{} missing", path.display());
        }
    }

    #[test]
    fn test_reuse_loads_tables_from_disk() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        write_reference(&config);

        let built = DatasetBuilder::new(&config, false)
            .build(&sample_source())
            .unwrap();

        // An empty source would produce empty tables if it were consulted.
        let empty = DirectoryScanSource::default();
        let builder = DatasetBuilder::new(&config, true);
        assert!(builder.can_reuse());

        let loaded = builder.build(&empty).unwrap();
        assert!(loaded.from_cache);
        assert_eq!(loaded.annotations, built.annotations);
        assert_eq!(loaded.nodules, built.nodules);
        assert_eq!(loaded.small_nodules, built.small_nodules);
        assert_eq!(loaded.cases, built.cases);
    }

    #[test]
    fn test_reuse_rebuilds_when_a_table_is_missing() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        write_reference(&config);

        let builder = DatasetBuilder::new(&config, true);
        builder.build(&sample_source()).unwrap();
        std::fs::remove_file(&builder.paths().cases).unwrap();
        assert!(!builder.can_reuse());

        let rebuilt = builder.build(&sample_source()).unwrap();
        assert!(!rebuilt.from_cache);
        assert!(builder.paths().cases.is_file());
    }

    #[test]
    fn test_filters_and_toggles() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.features.include_small_nodules = false;
        config.features.include_non_nodules = false;
        config
            .patients
            .exclude
            .insert("LIDC-IDRI-0001".to_string(), "test".to_string());
        write_reference(&config);

        let dataset = DatasetBuilder::new(&config, false)
            .build(&sample_source())
            .unwrap();

        assert_eq!(dataset.scans_processed, 2);
        assert!(dataset.annotations.is_empty());
        assert_eq!(dataset.consensus_count(), 0);
        assert!(dataset.cases.is_empty());

        let paths = config.table_paths();
        let text = std::fs::read_to_string(&paths.nodules).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("patient_id,scan_id,"));
    }

    #[test]
    fn test_missing_reference_leaves_tables_untouched() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        let result = DatasetBuilder::new(&config, false).build(&sample_source());
        assert!(matches!(result, Err(Error::MissingInputFile { .. })));
        assert!(!config.table_paths().annotations.exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_tables() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        write_reference(&config);

        let built = DatasetBuilder::new(&config, false)
            .build(&sample_source())
            .unwrap();
        let paths = config.table_paths();
        let annotations = std::fs::read_to_string(&paths.annotations).unwrap();

        // The case table cannot be staged: its parent is a regular file.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut broken = config.clone();
        broken.files.cases = Some(blocker.join("cases.csv"));
        broken
            .patients
            .exclude
            .insert("LIDC-IDRI-0001".to_string(), "test".to_string());

        let result = DatasetBuilder::new(&broken, false).build(&sample_source());
        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(&paths.annotations).unwrap(),
            annotations
        );

        let loaded: Vec<NoduleRecord> = read_table(&paths.nodules).unwrap();
        assert_eq!(loaded, built.nodules);
        for folder in [&config.folders.interim, &config.folders.final_data] {
            for entry in std::fs::read_dir(folder).unwrap() {
                let name = entry.unwrap().file_name();
                assert!(name.to_string_lossy().ends_with(".csv"), "{:?}", name);
            }
        }
    }

    #[test]
    fn test_consensus_diagnoses() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        write_reference(&config);

        let dataset = DatasetBuilder::new(&config, false)
            .build(&sample_source())
            .unwrap();

        let diagnoses: Vec<Diagnosis> = dataset.nodules.iter().map(|n| n.diagnosis).collect();
        assert_eq!(diagnoses, vec![Diagnosis::Benign, Diagnosis::Malignant]);
        assert_eq!(dataset.non_nodules[0].diagnosis, Diagnosis::Benign);
    }
}
