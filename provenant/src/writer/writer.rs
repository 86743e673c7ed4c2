//! The deterministic artifact writer.

use super::atomic::publish_atomic;
use super::canonical::canonical_value;
use super::hashing::{dataset_digest, row_digest};
use super::metadata::{ArtifactMetadata, StageTiming};
use super::quality::QualityReport;
use super::sort::sort_batch;
use crate::batch::RecordBatch;
use crate::config::{HashAlgorithm, WriterConfig};
use crate::errors::{Result, WriteError};
use std::path::{Path, PathBuf};

/// The three paths one write publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Primary tabular dataset.
    pub dataset: PathBuf,
    /// Quality-control sidecar.
    pub quality: PathBuf,
    /// Lineage metadata document.
    pub metadata: PathBuf,
}

impl Destination {
    /// Conventional artifact paths inside one directory.
    #[must_use]
    pub fn in_dir(dir: &Path, stem: &str) -> Self {
        Self {
            dataset: dir.join(format!("{stem}.tsv")),
            quality: dir.join(format!("{stem}.quality.json")),
            metadata: dir.join(format!("{stem}.meta.json")),
        }
    }
}

/// Run-scoped lineage the orchestrator hands to the writer for the metadata
/// document. `run_id` and `generated_at` vary per run and are excluded from
/// the row hash.
#[derive(Debug, Clone)]
pub struct RunLineage {
    /// Identifier of the producing run.
    pub run_id: String,
    /// Pipeline name.
    pub pipeline: String,
    /// Fingerprint of the resolved configuration.
    pub config_fingerprint: String,
    /// The upstream release/version token.
    pub source_version: String,
    /// Whether the batch passed validation cleanly.
    pub schema_valid: bool,
    /// Stage timings recorded before the write began.
    pub stage_durations: Vec<StageTiming>,
    /// Wall-clock generation timestamp, UTC.
    pub generated_at: String,
}

/// The writer's output contract. Created once per successful write, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Published dataset path.
    pub dataset_path: PathBuf,
    /// Published quality-report path.
    pub quality_path: PathBuf,
    /// Published metadata path.
    pub metadata_path: PathBuf,
    /// Rows published.
    pub row_count: usize,
    /// Dataset digest over full canonical rows.
    pub hash_row: String,
    /// Dataset digest over business-key columns only.
    pub hash_business_key: String,
}

/// Turns a validated batch into a reproducible, hashable, atomically
/// published artifact set.
///
/// Re-running with identical input and identical configuration reproduces
/// identical bytes at every output path.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    config: WriterConfig,
}

impl ArtifactWriter {
    /// Creates a writer with the given settings.
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    /// The writer's settings.
    #[must_use]
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Sorts, canonicalizes, hashes and publishes a batch.
    pub fn write(
        &self,
        batch: &RecordBatch,
        destination: &Destination,
        lineage: &RunLineage,
    ) -> Result<WriteResult> {
        for column in self
            .config
            .business_key
            .iter()
            .chain(self.config.effective_sort_by())
        {
            if !batch.columns.contains(column) {
                return Err(WriteError::MissingColumn {
                    column: column.clone(),
                }
                .into());
            }
        }

        let mut sorted = batch.clone();
        sort_batch(
            &mut sorted,
            &self.config.effective_sort_by().to_vec(),
            self.config.null_order,
        );

        // Canonical cell grid in declared column order.
        let grid: Vec<Vec<String>> = sorted
            .rows
            .iter()
            .map(|row| {
                sorted
                    .columns
                    .iter()
                    .map(|c| canonical_value(row.get_or_null(c), &self.config))
                    .collect()
            })
            .collect();

        let algorithm = self.config.hash_algorithm;
        let hashed_columns: Vec<usize> = sorted
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !self.config.hash_exclude.contains(name))
            .map(|(i, _)| i)
            .collect();
        let key_columns: Vec<usize> = self
            .config
            .business_key
            .iter()
            .filter_map(|name| sorted.column_index(name))
            .collect();

        let row_hashes: Vec<String> = grid
            .iter()
            .map(|cells| {
                let fields: Vec<&str> = hashed_columns
                    .iter()
                    .map(|&i| cells[i].as_str())
                    .collect();
                row_digest(algorithm, &fields)
            })
            .collect();
        let key_hashes: Vec<String> = grid
            .iter()
            .map(|cells| {
                let fields: Vec<&str> = key_columns.iter().map(|&i| cells[i].as_str()).collect();
                row_digest(algorithm, &fields)
            })
            .collect();

        let hash_row = dataset_digest(algorithm, &row_hashes);
        let hash_business_key = dataset_digest(algorithm, &key_hashes);

        let mut dataset_bytes = Vec::new();
        dataset_bytes.extend_from_slice(sorted.columns.join("\t").as_bytes());
        dataset_bytes.push(b'\n');
        for cells in &grid {
            dataset_bytes.extend_from_slice(cells.join("\t").as_bytes());
            dataset_bytes.push(b'\n');
        }
        publish_atomic(&destination.dataset, &dataset_bytes)?;

        let quality = QualityReport::build(&sorted, &self.config);
        publish_atomic(
            &destination.quality,
            &quality.to_canonical_bytes().map_err(WriteError::Serialize)?,
        )?;

        let metadata = ArtifactMetadata {
            run_id: lineage.run_id.clone(),
            pipeline: lineage.pipeline.clone(),
            config_fingerprint: lineage.config_fingerprint.clone(),
            source_version: lineage.source_version.clone(),
            schema_id: sorted.schema_id.clone(),
            schema_version: sorted.schema_version.clone(),
            schema_valid: lineage.schema_valid,
            row_count: sorted.len(),
            hash_algorithm: match algorithm {
                HashAlgorithm::Sha256 => "sha256".to_string(),
                HashAlgorithm::Sha512 => "sha512".to_string(),
            },
            hash_row: hash_row.clone(),
            hash_business_key: hash_business_key.clone(),
            stage_durations: lineage.stage_durations.clone(),
            generated_at: lineage.generated_at.clone(),
        };
        publish_atomic(
            &destination.metadata,
            &metadata
                .to_canonical_bytes()
                .map_err(WriteError::Serialize)?,
        )?;

        Ok(WriteResult {
            dataset_path: destination.dataset.clone(),
            quality_path: destination.quality.clone(),
            metadata_path: destination.metadata.clone(),
            row_count: sorted.len(),
            hash_row,
            hash_business_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Record, Value};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn writer() -> ArtifactWriter {
        ArtifactWriter::new(WriterConfig {
            business_key: vec!["accession".to_string()],
            hash_exclude: vec!["run_id".to_string(), "generated_at".to_string()],
            ..WriterConfig::default()
        })
    }

    fn lineage() -> RunLineage {
        RunLineage {
            run_id: "run-1".to_string(),
            pipeline: "uniprot-proteins".to_string(),
            config_fingerprint: "fp".to_string(),
            source_version: "2025_04".to_string(),
            schema_valid: true,
            stage_durations: vec![StageTiming {
                stage: "extract".to_string(),
                duration_ms: 10,
            }],
            generated_at: "2025-04-02T00:00:00Z".to_string(),
        }
    }

    fn batch(order: &[&str]) -> RecordBatch {
        let mut batch = RecordBatch::new(
            "proteins",
            "2.1.0",
            vec![
                "accession".to_string(),
                "gene".to_string(),
                "mass".to_string(),
            ],
        );
        for accession in order {
            batch.push(
                Record::new()
                    .with("accession", *accession)
                    .with("gene", format!("  gene-{accession} "))
                    .with("mass", 1.234_567_89),
            );
        }
        batch
    }

    #[test]
    fn write_publishes_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Destination::in_dir(dir.path(), "proteins");

        let result = writer().write(&batch(&["P2", "P1"]), &dest, &lineage()).unwrap();

        assert_eq!(result.row_count, 2);
        assert!(dest.dataset.exists());
        assert!(dest.quality.exists());
        assert!(dest.metadata.exists());

        let text = fs::read_to_string(&dest.dataset).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "accession\tgene\tmass");
        // Sorted by business key and canonicalized.
        assert_eq!(lines[1], "P1\tgene-P1\t1.234568");
        assert_eq!(lines[2], "P2\tgene-P2\t1.234568");
    }

    #[test]
    fn identical_input_reproduces_identical_bytes() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let dest_a = Destination::in_dir(dir_a.path(), "proteins");
        let dest_b = Destination::in_dir(dir_b.path(), "proteins");

        let a = writer().write(&batch(&["P3", "P1", "P2"]), &dest_a, &lineage()).unwrap();
        let b = writer().write(&batch(&["P3", "P1", "P2"]), &dest_b, &lineage()).unwrap();

        assert_eq!(a.hash_row, b.hash_row);
        assert_eq!(a.hash_business_key, b.hash_business_key);
        assert_eq!(
            fs::read(&dest_a.dataset).unwrap(),
            fs::read(&dest_b.dataset).unwrap()
        );
        assert_eq!(
            fs::read(&dest_a.quality).unwrap(),
            fs::read(&dest_b.quality).unwrap()
        );
        assert_eq!(
            fs::read(&dest_a.metadata).unwrap(),
            fs::read(&dest_b.metadata).unwrap()
        );
    }

    #[test]
    fn producer_row_order_does_not_leak_into_artifacts() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let dest_a = Destination::in_dir(dir_a.path(), "proteins");
        let dest_b = Destination::in_dir(dir_b.path(), "proteins");

        writer().write(&batch(&["P3", "P1", "P2"]), &dest_a, &lineage()).unwrap();
        writer().write(&batch(&["P1", "P2", "P3"]), &dest_b, &lineage()).unwrap();

        assert_eq!(
            fs::read(&dest_a.dataset).unwrap(),
            fs::read(&dest_b.dataset).unwrap()
        );
    }

    #[test]
    fn excluded_provenance_columns_do_not_affect_row_hash() {
        let make = |run_marker: &str| {
            let mut b = RecordBatch::new(
                "proteins",
                "2.1.0",
                vec!["accession".to_string(), "run_id".to_string()],
            );
            b.push(
                Record::new()
                    .with("accession", "P1")
                    .with("run_id", run_marker),
            );
            b
        };

        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = writer()
            .write(
                &make("run-a"),
                &Destination::in_dir(dir_a.path(), "p"),
                &lineage(),
            )
            .unwrap();
        let b = writer()
            .write(
                &make("run-b"),
                &Destination::in_dir(dir_b.path(), "p"),
                &lineage(),
            )
            .unwrap();

        // The datasets differ, the row hash does not.
        assert_eq!(a.hash_row, b.hash_row);
        assert_ne!(
            fs::read(dir_a.path().join("p.tsv")).unwrap(),
            fs::read(dir_b.path().join("p.tsv")).unwrap()
        );
    }

    #[test]
    fn missing_business_key_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Destination::in_dir(dir.path(), "p");
        let mut b = RecordBatch::new("proteins", "2.1.0", vec!["gene".to_string()]);
        b.push(Record::new().with("gene", "INS"));

        let err = writer().write(&b, &dest, &lineage()).unwrap_err();
        assert!(err.to_string().contains("accession"));
        assert!(!dest.dataset.exists());
    }

    #[test]
    fn null_sentinel_is_uniform_across_file() {
        let config = WriterConfig {
            business_key: vec!["accession".to_string()],
            null_sentinel: "NA".to_string(),
            ..WriterConfig::default()
        };
        let writer = ArtifactWriter::new(config);

        let mut b = RecordBatch::new(
            "proteins",
            "2.1.0",
            vec!["accession".to_string(), "gene".to_string()],
        );
        b.push(Record::new().with("accession", "P1").with("gene", Value::Null));

        let dir = tempfile::tempdir().unwrap();
        let dest = Destination::in_dir(dir.path(), "p");
        writer.write(&b, &dest, &lineage()).unwrap();

        let text = fs::read_to_string(&dest.dataset).unwrap();
        assert!(text.contains("P1\tNA"));
    }
}
