use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::facts::FactMap;

/// One batch of monitoring data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSnapshot {
    /// Live metrics for contingency triggers.
    pub metrics: IndexMap<String, f64>,
    /// KPI samples, appended in order per name.
    pub kpis: IndexMap<String, Vec<f64>>,
    /// Failure keys to count once each.
    pub failures: Vec<String>,
    /// Environment facts for scenario matching.
    pub environment: FactMap,
}

impl MetricSnapshot {
    /// Whether the snapshot carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
            && self.kpis.is_empty()
            && self.failures.is_empty()
            && self.environment.is_empty()
    }
}

/// Monitoring collaborator that supplies metric snapshots.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetches the next snapshot.
    async fn fetch(&self) -> Result<MetricSnapshot>;
}

/// Fixed snapshot, for tests and bridging.
pub struct InMemoryMetricSource {
    snapshot: MetricSnapshot,
}

impl InMemoryMetricSource {
    /// Creates source.
    #[must_use]
    pub const fn new(snapshot: MetricSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl MetricSource for InMemoryMetricSource {
    async fn fetch(&self) -> Result<MetricSnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Reads a snapshot from a JSON document.
pub struct FileMetricSource {
    path: PathBuf,
}

impl FileMetricSource {
    /// Creates source from path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MetricSource for FileMetricSource {
    async fn fetch(&self) -> Result<MetricSnapshot> {
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading metrics {}", self.path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing metrics {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn in_memory_returns_snapshot() {
        let mut snapshot = MetricSnapshot::default();
        snapshot.metrics.insert("cpu".into(), 91.0);
        let source = InMemoryMetricSource::new(snapshot.clone());
        assert_eq!(source.fetch().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn file_source_reads_partial_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(
            &path,
            concat!(
                r#"{"metrics":{"cpu":97.5},"kpis":{"revenue":[10,12]},"#,
                r#""environment":{"market":"bull"}}"#,
            ),
        )
        .unwrap();
        let snapshot = FileMetricSource::new(&path).fetch().await.unwrap();
        assert!((snapshot.metrics["cpu"] - 97.5).abs() < 1e-12);
        assert_eq!(snapshot.kpis["revenue"], [10.0, 12.0]);
        assert!(snapshot.failures.is_empty());
        assert!(!snapshot.is_empty());
    }

    #[tokio::test]
    async fn file_source_reports_missing_file() {
        let dir = tempdir().unwrap();
        let err = FileMetricSource::new(dir.path().join("none.json")).fetch().await.unwrap_err();
        assert!(format!("{err:#}").contains("none.json"));
    }
}
