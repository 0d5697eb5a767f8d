use anyhow::{bail, Context, Result};
use image::{imageops, GrayImage};
use std::path::Path;

/// 抽出ビューの遮蔽マスク（0 = センサー範囲外 / ケラレ）
///
/// キャプチャ単位で一度だけ構築し、全ワーカーが参照で読み取り専用に使う。
#[derive(Debug, Clone, PartialEq)]
pub struct OcclusionMask {
    width: u32,
    height: u32,
    visible: Vec<bool>,
}

impl OcclusionMask {
    /// 全ピクセル可視
    pub fn all_visible(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            visible: vec![true; width as usize * height as usize],
        }
    }

    /// 抽出ビュー向きのグレースケール画像から構築（非ゼロ = 可視）
    pub fn from_luma(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let visible = image.pixels().map(|p| p.0[0] != 0).collect();
        Self { width, height, visible }
    }

    /// センサー生画像向きのマスクを時計回りに90°回転して構築
    pub fn from_sensor_luma(image: &GrayImage) -> Self {
        Self::from_luma(&imageops::rotate90(image))
    }

    /// マスク画像を読み込み、期待する抽出ビューのサイズと照合
    pub fn load<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("Failed to read occlusion mask {}", path.display()))?
            .to_luma8();
        let mask = if image.dimensions() == (width, height) {
            Self::from_luma(&image)
        } else if image.dimensions() == (height, width) {
            // 未回転のまま保存されたマスク
            Self::from_sensor_luma(&image)
        } else {
            bail!(
                "Occlusion mask {} is {}x{}, expected {}x{}",
                path.display(),
                image.width(),
                image.height(),
                width,
                height
            );
        };
        Ok(mask)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `[0, width) × [0, height)` に入っているか。NaNは範囲外
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && x < self.width as f64 && y >= 0.0 && y < self.height as f64
    }

    /// 整数ピクセルの可視判定。範囲外は不可視
    pub fn is_visible(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.visible[y as usize * self.width as usize + x as usize]
    }

    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|&&v| v).count()
    }
}

/// take名からキャプチャ名を得る（末尾の `_<n>` を除去）
pub fn capture_name(take_name: &str) -> &str {
    match take_name.rfind('_') {
        Some(pos) => &take_name[..pos],
        None => take_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_from_luma() {
        let mut img = GrayImage::from_pixel(4, 3, Luma([255]));
        img.put_pixel(1, 2, Luma([0]));
        let mask = OcclusionMask::from_luma(&img);
        assert_eq!(mask.width(), 4);
        assert_eq!(mask.height(), 3);
        assert!(!mask.is_visible(1, 2));
        assert!(mask.is_visible(2, 1));
        assert_eq!(mask.visible_count(), 11);
    }

    #[test]
    fn test_sensor_mask_rotated_clockwise() {
        // センサー向き 3x2 の (0, 0) は回転後 (H-1-0, 0) = (1, 0)
        let mut img = GrayImage::from_pixel(3, 2, Luma([1]));
        img.put_pixel(0, 0, Luma([0]));
        let mask = OcclusionMask::from_sensor_luma(&img);
        assert_eq!((mask.width(), mask.height()), (2, 3));
        assert!(!mask.is_visible(1, 0));
        assert!(mask.is_visible(0, 0));
    }

    #[test]
    fn test_contains_bounds() {
        let mask = OcclusionMask::all_visible(512, 512);
        assert!(mask.contains(0.0, 0.0));
        assert!(mask.contains(511.9, 511.9));
        assert!(!mask.contains(512.0, 10.0));
        assert!(!mask.contains(-0.1, 10.0));
        assert!(!mask.contains(f64::NAN, 10.0));
    }

    #[test]
    fn test_capture_name() {
        assert_eq!(capture_name("georgiatech_cooking_14_02_2"), "georgiatech_cooking_14_02");
        assert_eq!(capture_name("plain"), "plain");
    }

    #[test]
    fn test_load_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        GrayImage::from_pixel(8, 8, Luma([255])).save(&path).unwrap();
        assert!(OcclusionMask::load(&path, 8, 8).is_ok());
        assert!(OcclusionMask::load(&path, 16, 16).is_err());
    }
}
