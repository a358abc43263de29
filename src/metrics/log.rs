//! Append-only metrics log
//!
//! One JSON object per episode, holding only the quantities selected by
//! `sim.record_values`. Records are kept in memory and, when a path is
//! configured, appended to a JSON-lines file that is flushed at every episode
//! boundary.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::RecordValue;
use crate::modes::EpisodeReport;
use crate::sim::SpeciesPair;

/// Metrics of one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub episode: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<SpeciesPair<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<SpeciesPair<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<usize>,
}

impl MetricsRecord {
    /// Pick the selected values out of an episode report
    pub fn from_report(report: &EpisodeReport, values: &[RecordValue]) -> Self {
        let wants = |value: RecordValue| values.contains(&value);
        Self {
            episode: report.episode,
            generation: wants(RecordValue::Generation).then_some(report.generation),
            reward: wants(RecordValue::Reward).then_some(report.rewards),
            population: wants(RecordValue::Population).then_some(report.populations),
            steps: wants(RecordValue::Steps).then_some(report.steps),
        }
    }
}

pub struct MetricsLog {
    records: Vec<MetricsRecord>,
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl MetricsLog {
    /// Log kept in memory only
    pub fn in_memory() -> Self {
        Self {
            records: Vec::new(),
            writer: None,
            path: None,
        }
    }

    /// Log that also appends to a JSON-lines file
    ///
    /// Creates parent directories if they don't exist. Existing content is kept,
    /// so a resumed run continues the same file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open metrics log {:?}", path))?;

        Ok(Self {
            records: Vec::new(),
            writer: Some(BufWriter::new(file)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Append one record and flush it to disk
    pub fn append(&mut self, record: MetricsRecord) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            let line = serde_json::to_string(&record).context("Failed to serialize metrics record")?;
            writeln!(writer, "{}", line)
                .and_then(|_| writer.flush())
                .with_context(|| format!("Failed to write metrics log {:?}", self.path))?;
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[MetricsRecord] {
        &self.records
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Read back a JSON-lines metrics file
pub fn read_records(path: &Path) -> Result<Vec<MetricsRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics log {:?}", path))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("Failed to parse metrics record"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::Termination;
    use tempfile::TempDir;

    fn report(episode: usize) -> EpisodeReport {
        EpisodeReport {
            episode,
            steps: 12,
            rewards: SpeciesPair::new(1.5, -0.5),
            populations: SpeciesPair::new(3, 9),
            generation: 4,
            births: 1,
            deaths: 2,
            termination: Termination::StepLimit,
            checkpoint_due: false,
        }
    }

    #[test]
    fn test_record_selection() {
        let record = MetricsRecord::from_report(
            &report(2),
            &[RecordValue::Generation, RecordValue::Reward],
        );
        assert_eq!(record.episode, 2);
        assert_eq!(record.generation, Some(4));
        assert_eq!(record.reward, Some(SpeciesPair::new(1.5, -0.5)));
        assert_eq!(record.population, None);
        assert_eq!(record.steps, None);

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("population"));
    }

    #[test]
    fn test_in_memory_log() {
        let mut log = MetricsLog::in_memory();
        log.append(MetricsRecord::from_report(&report(0), &[RecordValue::Steps]))
            .unwrap();
        assert_eq!(log.records().len(), 1);
        assert_eq!(log.records()[0].steps, Some(12));
        assert!(log.path().is_none());
    }

    #[test]
    fn test_file_log_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("metrics.jsonl");
        let values = [RecordValue::Generation, RecordValue::Population];

        {
            let mut log = MetricsLog::open(&path).unwrap();
            log.append(MetricsRecord::from_report(&report(0), &values)).unwrap();
            log.append(MetricsRecord::from_report(&report(1), &values)).unwrap();
        }
        {
            // Reopening continues the file
            let mut log = MetricsLog::open(&path).unwrap();
            log.append(MetricsRecord::from_report(&report(2), &values)).unwrap();
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].episode, 2);
        assert_eq!(records[0].population, Some(SpeciesPair::new(3, 9)));
    }
}
