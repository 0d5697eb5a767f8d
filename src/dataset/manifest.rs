use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// データセットのスプリット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    /// スプリットCSV上の表記
    pub fn csv_label(&self) -> &'static str {
        match self {
            Split::Train => "TRAIN",
            Split::Val => "VAL",
            Split::Test => "TEST",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// takes.json の1エントリ（他のフィールドは無視）
#[derive(Debug, Clone, Deserialize)]
pub struct TakeEntry {
    pub take_uid: String,
    pub root_dir: String,
}

/// 処理対象のtake
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TakeRef {
    pub uid: String,
    /// 画像ディレクトリ名 (= takes.json の root_dir)
    pub name: String,
}

pub fn load_takes<P: AsRef<Path>>(path: P) -> Result<Vec<TakeEntry>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read takes manifest {}", path.display()))?;
    let takes: Vec<TakeEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse takes manifest {}", path.display()))?;
    Ok(takes)
}

/// スプリットCSVから指定スプリットの take_uid を取り出す
///
/// ヘッダに `take_uid` と `split` 列が必要。列は名前で引く。
pub fn parse_split_csv(content: &str, split: Split) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers().context("Failed to read split CSV header")?.clone();
    if headers.is_empty() {
        bail!("Split CSV is empty");
    }
    let find = |name: &str| {
        headers
            .iter()
            .position(|c| c == name)
            .with_context(|| format!("Split CSV has no `{}` column", name))
    };
    let uid_col = find("take_uid")?;
    let split_col = find("split")?;

    let mut uids = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Split CSV row {} is malformed", i + 1))?;
        let (uid, label) = match (record.get(uid_col), record.get(split_col)) {
            (Some(u), Some(s)) => (u, s),
            _ => bail!("Split CSV row {} has {} fields", i + 1, record.len()),
        };
        if label == split.csv_label() {
            uids.push(uid.to_string());
        }
    }
    Ok(uids)
}

pub fn load_split_uids<P: AsRef<Path>>(path: P, split: Split) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read split file {}", path.display()))?;
    parse_split_csv(&content, split)
}

/// アノテーションディレクトリにある `<take_uid>.json` の uid 一覧（ソート済み）
pub fn local_annotation_uids<P: AsRef<Path>>(dir: P) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let mut uids = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to list annotation dir {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            uids.push(stem.to_string());
        }
    }
    uids.sort();
    Ok(uids)
}

/// ローカルにアノテーションがあり、かつスプリットに属するtakeを解決
pub fn resolve_takes(takes: &[TakeEntry], split_uids: &[String], local_uids: &[String]) -> Vec<TakeRef> {
    let names: HashMap<&str, &str> = takes
        .iter()
        .map(|t| (t.take_uid.as_str(), t.root_dir.as_str()))
        .collect();
    let in_split: HashSet<&str> = split_uids.iter().map(String::as_str).collect();

    local_uids
        .iter()
        .filter(|uid| in_split.contains(uid.as_str()))
        .filter_map(|uid| match names.get(uid.as_str()) {
            Some(name) => Some(TakeRef { uid: uid.clone(), name: name.to_string() }),
            None => {
                log::warn!("take {} is not listed in takes manifest. Skipped", uid);
                None
            }
        })
        .collect()
}
