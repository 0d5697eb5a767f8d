use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::curator::{CurationStats, HandRecord, TakeReport};
use super::manifest::{Split, TakeRef};
use super::sample::{materialize, HandSample};
use super::store::ImageStore;
use crate::config::CurationConfig;

/// take単位の集計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeSummary {
    pub take: TakeRef,
    pub stats: CurationStats,
}

/// 入力ファイル不足で丸ごと飛ばしたtake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeSkip {
    pub take: TakeRef,
    pub reason: String,
}

/// 採用された手インスタンスの一覧
///
/// 構築後は変更しない。サンプルは [`CurationIndex::materialize`] で毎回作る。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationIndex {
    pub split: Split,
    pub records: Vec<HandRecord>,
    pub takes: Vec<TakeSummary>,
    pub skipped_takes: Vec<TakeSkip>,
}

impl CurationIndex {
    pub fn new(split: Split) -> Self {
        Self {
            split,
            records: Vec::new(),
            takes: Vec::new(),
            skipped_takes: Vec::new(),
        }
    }

    pub fn push_take(&mut self, report: TakeReport) {
        self.takes.push(TakeSummary::from(&report));
        self.records.extend(report.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&HandRecord> {
        self.records.get(idx)
    }

    /// 全takeの合計
    pub fn stats(&self) -> CurationStats {
        let mut total = CurationStats::default();
        for summary in &self.takes {
            total.merge(&summary.stats);
        }
        total
    }

    /// idx番目のサンプルを画像から作る
    pub fn materialize(&self, idx: usize, images: &dyn ImageStore, config: &CurationConfig) -> Result<HandSample> {
        let record = self
            .get(idx)
            .with_context(|| format!("Sample index {} out of range ({} samples)", idx, self.len()))?;
        materialize(record, images, config, self.split)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write index {}", path.display()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read index {}", path.display()))?;
        let index: CurationIndex = serde_json::from_str(&content)?;
        Ok(index)
    }
}
