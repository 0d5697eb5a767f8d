use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::Split;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub curation: CurationConfig,
}

/// データセットのディレクトリ構成
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatasetConfig {
    /// データセットルート
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// アノテーション種別 ("manual" / "auto")
    #[serde(default = "default_anno_type")]
    pub anno_type: String,
    /// 対象スプリット
    #[serde(default)]
    pub split: Split,
    /// take一覧 (ルートからの相対パス)
    #[serde(default = "default_takes_file")]
    pub takes_file: PathBuf,
    /// スプリットCSV (ルートからの相対パス)
    #[serde(default = "default_split_file")]
    pub split_file: PathBuf,
    /// 手の3Dアノテーション (anno_type が末尾に付く)
    #[serde(default = "default_hand_anno_dir")]
    pub hand_anno_dir: PathBuf,
    /// カメラポーズJSON
    #[serde(default = "default_camera_pose_dir")]
    pub camera_pose_dir: PathBuf,
    /// 歪み補正済み画像 (anno_type が末尾に付く)
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
    /// キャプチャごとの遮蔽マスク画像 (`<capture>.png`)
    #[serde(default = "default_mask_dir")]
    pub mask_dir: PathBuf,
}

fn default_root() -> PathBuf { PathBuf::from(".") }
fn default_anno_type() -> String { "manual".to_string() }
fn default_takes_file() -> PathBuf { PathBuf::from("takes.json") }
fn default_split_file() -> PathBuf { PathBuf::from("annotations/egoexo_split_latest_train_val_test.csv") }
fn default_hand_anno_dir() -> PathBuf { PathBuf::from("annotations/ego_pose/hand") }
fn default_camera_pose_dir() -> PathBuf { PathBuf::from("annotations/ego_pose/hand/camera_pose") }
fn default_image_dir() -> PathBuf { PathBuf::from("aria_undistorted_images") }
fn default_mask_dir() -> PathBuf { PathBuf::from("aria_masks") }

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            anno_type: default_anno_type(),
            split: Split::default(),
            takes_file: default_takes_file(),
            split_file: default_split_file(),
            hand_anno_dir: default_hand_anno_dir(),
            camera_pose_dir: default_camera_pose_dir(),
            image_dir: default_image_dir(),
            mask_dir: default_mask_dir(),
        }
    }
}

impl DatasetConfig {
    pub fn takes_path(&self) -> PathBuf {
        self.root.join(&self.takes_file)
    }

    pub fn split_path(&self) -> PathBuf {
        self.root.join(&self.split_file)
    }

    pub fn annotation_dir(&self) -> PathBuf {
        self.root.join(&self.hand_anno_dir).join(&self.anno_type)
    }

    pub fn pose_dir(&self) -> PathBuf {
        self.root.join(&self.camera_pose_dir)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(&self.image_dir).join(&self.anno_type)
    }

    pub fn masks_dir(&self) -> PathBuf {
        self.root.join(&self.mask_dir)
    }
}

/// サンプル生成の幾何パラメータ
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CurationConfig {
    /// 抽出ビュー（回転後の保存画像）の幅
    #[serde(default = "default_extracted_width")]
    pub extracted_width: u32,
    /// 抽出ビューの高さ
    #[serde(default = "default_extracted_height")]
    pub extracted_height: u32,
    /// 歪み補正済み画像（回転前）の高さ。回転の基準
    #[serde(default = "default_source_height")]
    pub source_height: u32,
    /// 採用に必要な有効キーポイント数（手首を除く）
    #[serde(default = "default_valid_kpts_threshold")]
    pub valid_kpts_threshold: usize,
    /// BBoxのパディング（ピクセル）
    #[serde(default = "default_bbox_padding")]
    pub bbox_padding: f64,
    /// スケール正規化用のピクセル標準偏差
    #[serde(default = "default_pixel_std")]
    pub pixel_std: f64,
    /// アフィン変換後の画像サイズ [W, H]
    #[serde(default = "default_image_size")]
    pub image_size: [u32; 2],
    /// ヒートマップサイズ [W, H]
    #[serde(default = "default_heatmap_size")]
    pub heatmap_size: [u32; 2],
    /// ガウシアンの標準偏差（ヒートマップ格子単位）
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

fn default_extracted_width() -> u32 { 512 }
fn default_extracted_height() -> u32 { 512 }
fn default_source_height() -> u32 { 512 }
fn default_valid_kpts_threshold() -> usize { 10 }
fn default_bbox_padding() -> f64 { 20.0 }
fn default_pixel_std() -> f64 { 200.0 }
fn default_image_size() -> [u32; 2] { [224, 224] }
fn default_heatmap_size() -> [u32; 2] { [56, 56] }
fn default_sigma() -> f64 { 2.0 }

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            extracted_width: default_extracted_width(),
            extracted_height: default_extracted_height(),
            source_height: default_source_height(),
            valid_kpts_threshold: default_valid_kpts_threshold(),
            bbox_padding: default_bbox_padding(),
            pixel_std: default_pixel_std(),
            image_size: default_image_size(),
            heatmap_size: default_heatmap_size(),
            sigma: default_sigma(),
        }
    }
}

impl CurationConfig {
    pub fn image_size(&self) -> (u32, u32) {
        (self.image_size[0], self.image_size[1])
    }

    pub fn heatmap_size(&self) -> (u32, u32) {
        (self.heatmap_size[0], self.heatmap_size[1])
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// ファイルが無ければデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("failed to load {}: {:#}. Using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_aria_setup() {
        let cfg = CurationConfig::default();
        assert_eq!(cfg.extracted_width, 512);
        assert_eq!(cfg.source_height, 512);
        assert_eq!(cfg.valid_kpts_threshold, 10);
        assert_eq!(cfg.image_size(), (224, 224));
        assert_eq!(cfg.heatmap_size(), (56, 56));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [dataset]
            root = "/data/egoexo"
            split = "val"

            [curation]
            valid_kpts_threshold = 8
            sigma = 3.0
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dataset.split, Split::Val);
        assert_eq!(config.dataset.anno_type, "manual");
        assert_eq!(
            config.dataset.annotation_dir(),
            PathBuf::from("/data/egoexo/annotations/ego_pose/hand/manual")
        );
        assert_eq!(config.curation.valid_kpts_threshold, 8);
        assert_eq!(config.curation.sigma, 3.0);
        assert_eq!(config.curation.bbox_padding, 20.0);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/egohand.toml");
        assert_eq!(config.curation.pixel_std, 200.0);
    }
}
