//! Dataset export: batched JSONL plus dataset metadata files.
//!
//! Accepted samples land in `data_dpo.jsonl` (numbered `data_dpo_00001.jsonl`
//! etc. when they span more than one batch), rejected samples go to
//! `invalid_samples.jsonl` with their reasons for debugging, and run-level
//! statistics go to `generation_stats.json`. A `dataset_info.json` entry
//! describes the sharegpt column mapping for downstream training tooling.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use crate::engine::ProgressSnapshot;
use crate::error::ExportError;
use crate::sample::CandidateSample;

const DATA_FILE_STEM: &str = "data_dpo";

/// One exported training record in sharegpt layout.
#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    system: &'a str,
    tools: &'a str,
    messages: &'a [crate::gateway::Message],
    chosen: &'a str,
    rejected: &'a str,
}

impl<'a> ExportRecord<'a> {
    fn from_sample(sample: &'a CandidateSample) -> Self {
        Self {
            system: &sample.system,
            tools: &sample.tools,
            messages: &sample.conversations,
            chosen: &sample.chosen,
            rejected: &sample.rejected,
        }
    }
}

/// Writes accepted and rejected samples to an output directory.
pub struct JsonlExporter {
    output_dir: PathBuf,
    batch_size: usize,
}

impl JsonlExporter {
    /// Create an exporter targeting `output_dir`, creating it if needed.
    pub fn new(output_dir: impl Into<PathBuf>, batch_size: usize) -> Result<Self, ExportError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            batch_size: batch_size.max(1),
        })
    }

    /// Export accepted samples in batches. Returns the paths written.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::NoSamples`] when the list is empty, so callers
    /// never mistake a silently empty export for a successful one.
    pub fn export_samples(&self, samples: &[&CandidateSample]) -> Result<Vec<PathBuf>, ExportError> {
        if samples.is_empty() {
            return Err(ExportError::NoSamples);
        }

        let batches: Vec<&[&CandidateSample]> = samples.chunks(self.batch_size).collect();
        let mut paths = Vec::with_capacity(batches.len());

        for (i, batch) in batches.iter().enumerate() {
            let file_name = if batches.len() > 1 {
                format!("{}_{:05}.jsonl", DATA_FILE_STEM, i + 1)
            } else {
                format!("{}.jsonl", DATA_FILE_STEM)
            };
            let path = self.output_dir.join(file_name);

            let file = File::create(&path)?;
            let mut writer = BufWriter::new(file);
            for sample in *batch {
                let record = ExportRecord::from_sample(sample);
                serde_json::to_writer(&mut writer, &record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;

            tracing::info!(count = batch.len(), path = %path.display(), "Exported sample batch");
            paths.push(path);
        }

        Ok(paths)
    }

    /// Export rejected samples with their reasons. Writes nothing and
    /// returns `None` when there are no rejected samples.
    pub fn export_invalid_samples(
        &self,
        samples: &[(&CandidateSample, &[String])],
    ) -> Result<Option<PathBuf>, ExportError> {
        if samples.is_empty() {
            return Ok(None);
        }

        let path = self.output_dir.join("invalid_samples.jsonl");
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);

        for (sample, reasons) in samples {
            let record = json!({
                "task_id": sample.task_id,
                "system": sample.system,
                "tools": sample.tools,
                "messages": sample.conversations,
                "chosen": sample.chosen,
                "rejected": sample.rejected,
                "reasons": reasons,
            });
            serde_json::to_writer(&mut writer, &record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        tracing::info!(count = samples.len(), path = %path.display(), "Exported invalid samples");
        Ok(Some(path))
    }

    /// Write run statistics derived from the final progress snapshot.
    pub fn export_statistics(&self, snapshot: &ProgressSnapshot) -> Result<PathBuf, ExportError> {
        let path = self.output_dir.join("generation_stats.json");
        let stats = json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "total_tasks": snapshot.total,
            "completed": snapshot.completed,
            "failed": snapshot.failed,
            "valid_samples": snapshot.succeeded_valid,
            "invalid_samples": snapshot.succeeded_invalid,
            "single_turn": snapshot.single_turn,
            "multi_turn": snapshot.multi_turn,
            "elapsed_secs": snapshot.elapsed_secs,
            "tasks_per_sec": snapshot.rate,
            "validation_success_rate": snapshot.validation_success_rate,
            "recent_errors": snapshot.recent_errors,
        });

        fs::write(&path, serde_json::to_string_pretty(&stats)?)?;
        tracing::info!(path = %path.display(), "Exported generation statistics");
        Ok(path)
    }

    /// Write the `dataset_info.json` entry describing the sharegpt layout.
    pub fn export_dataset_info(&self, dataset_name: &str) -> Result<PathBuf, ExportError> {
        let info = json!({
            dataset_name: {
                "file_name": format!("{}.jsonl", DATA_FILE_STEM),
                "ranking": true,
                "formatting": "sharegpt",
                "columns": {
                    "system": "system",
                    "tools": "tools",
                    "messages": "messages",
                    "chosen": "chosen",
                    "rejected": "rejected",
                },
                "metadata": {
                    "generated_at": chrono::Utc::now().to_rfc3339(),
                },
            }
        });

        let path = self.output_dir.join("dataset_info.json");
        fs::write(&path, serde_json::to_string_pretty(&info)?)?;
        tracing::info!(path = %path.display(), "Exported dataset info");
        Ok(path)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Message;
    use crate::tasks::TaskKind;

    fn sample(n: usize) -> CandidateSample {
        CandidateSample {
            task_id: format!("task-{}", n),
            kind: TaskKind::SingleTurn,
            system: "You are a helpful assistant.".to_string(),
            tools: "[]".to_string(),
            conversations: vec![Message::user(format!("query {}", n))],
            chosen: format!("chosen {}", n),
            rejected: format!("rejected {}", n),
            scores: None,
        }
    }

    #[test]
    fn test_single_batch_uses_plain_filename() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonlExporter::new(dir.path(), 100).unwrap();

        let samples = vec![sample(1), sample(2)];
        let refs: Vec<&CandidateSample> = samples.iter().collect();
        let paths = exporter.export_samples(&refs).unwrap();

        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("data_dpo.jsonl"));

        let text = fs::read_to_string(&paths[0]).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["chosen"], "chosen 1");
        assert_eq!(first["messages"][0]["role"], "user");
    }

    #[test]
    fn test_multiple_batches_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonlExporter::new(dir.path(), 2).unwrap();

        let samples: Vec<CandidateSample> = (0..5).map(sample).collect();
        let refs: Vec<&CandidateSample> = samples.iter().collect();
        let paths = exporter.export_samples(&refs).unwrap();

        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("data_dpo_00001.jsonl"));
        assert!(paths[2].ends_with("data_dpo_00003.jsonl"));

        let last = fs::read_to_string(&paths[2]).unwrap();
        assert_eq!(last.lines().count(), 1);
    }

    #[test]
    fn test_empty_export_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonlExporter::new(dir.path(), 10).unwrap();
        assert!(matches!(
            exporter.export_samples(&[]),
            Err(ExportError::NoSamples)
        ));
    }

    #[test]
    fn test_invalid_samples_carry_reasons() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonlExporter::new(dir.path(), 10).unwrap();

        let s = sample(1);
        let reasons = vec!["chosen and rejected responses are identical".to_string()];
        let path = exporter
            .export_invalid_samples(&[(&s, reasons.as_slice())])
            .unwrap()
            .expect("path written");

        let text = fs::read_to_string(path).unwrap();
        let record: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(record["reasons"][0], reasons[0]);
        assert_eq!(record["task_id"], "task-1");
    }

    #[test]
    fn test_no_invalid_samples_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonlExporter::new(dir.path(), 10).unwrap();
        assert!(exporter.export_invalid_samples(&[]).unwrap().is_none());
        assert!(!dir.path().join("invalid_samples.jsonl").exists());
    }

    #[test]
    fn test_dataset_info_layout() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonlExporter::new(dir.path(), 10).unwrap();

        let path = exporter.export_dataset_info("tool_dpo_dataset").unwrap();
        let info: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        let entry = &info["tool_dpo_dataset"];
        assert_eq!(entry["formatting"], "sharegpt");
        assert_eq!(entry["ranking"], true);
        assert_eq!(entry["columns"]["chosen"], "chosen");
    }
}
