use anyhow::Result;
use image::RgbImage;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3};
use std::path::PathBuf;

use super::curator::HandRecord;
use super::manifest::Split;
use super::store::ImageStore;
use crate::config::CurationConfig;
use crate::hand::{
    bbox_from_keypoints, generate_heatmaps, get_affine_transform, AffineTransform, BBox, HandSide,
    HeatmapTarget, JointIndex, JointSet2, JointSet3, ValidityMask,
};

/// メートル → ミリメートル
const M_TO_MM: f64 = 1000.0;

/// 学習ローダーに渡す1サンプル
#[derive(Debug, Clone)]
pub struct HandSample {
    pub image_path: PathBuf,
    pub take_name: String,
    pub frame_index: u64,
    pub hand: HandSide,
    /// アフィン変換後の画像
    pub crop: RgbImage,
    /// クロップ画像上の2D関節（無効関節は欠損）
    pub joints_2d: JointSet2,
    /// 手首基準のカメラ座標3D関節 [mm]（無効関節は欠損）
    pub joints_3d: JointSet3,
    /// カメラ座標の手首位置 [mm]
    pub wrist: Vector3<f64>,
    /// クロップ画像上のBBox（抽出ビューの範囲でクリップ。testスプリットではNone）
    pub bbox: Option<BBox>,
    pub valid: ValidityMask,
    pub intrinsic: Matrix3<f64>,
    pub transform: AffineTransform,
    pub target: HeatmapTarget,
}

impl HandSample {
    /// クロップ画像を [3, H, W] の 0.0〜1.0 テンソルに変換
    pub fn crop_tensor(&self) -> Array3<f32> {
        let (w, h) = self.crop.dimensions();
        Array3::from_shape_fn((3, h as usize, w as usize), |(c, y, x)| {
            self.crop.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        })
    }

    /// 手首基準3D関節を [21, 3] に並べる（欠損は NaN）
    pub fn offsets_array(&self) -> Array2<f32> {
        let mut out = Array2::from_elem((JointIndex::COUNT, 3), f32::NAN);
        for (j, joint) in self.joints_3d.iter().enumerate() {
            if let Some(p) = joint {
                for k in 0..3 {
                    out[[j, k]] = p[k] as f32;
                }
            }
        }
        out
    }
}

/// 手首基準の3D関節 [mm] と手首位置 [mm]
///
/// 欠損関節は原点として差分を取り、最後に無効関節を欠損に戻す。
pub fn wrist_relative_mm(joints_3d: &JointSet3, valid: &ValidityMask) -> (JointSet3, Vector3<f64>) {
    let wrist = joints_3d.get(JointIndex::Wrist).unwrap_or_else(Vector3::zeros) * M_TO_MM;
    let offsets = joints_3d.map(|p| p * M_TO_MM - wrist).retain(valid);
    (offsets, wrist)
}

/// インデックスのレコードから画像を読み込んでサンプルを作る
///
/// レコードは変更しない。同じ入力からは常に同じ出力になる。
pub fn materialize(
    record: &HandRecord,
    images: &dyn ImageStore,
    config: &CurationConfig,
    split: Split,
) -> Result<HandSample> {
    let image = images.load_rgb(&record.image_path)?;
    let output_size = config.image_size();

    let transform = get_affine_transform(&record.center_scale, 0.0, output_size, config.pixel_std, false);
    let crop = transform.apply_to_image(&image, output_size);
    let joints_2d = transform.apply_to_points(&record.joints_2d);

    let (joints_3d, wrist) = wrist_relative_mm(&record.joints_3d, &record.valid);

    let bbox = match split {
        Split::Test => None,
        _ => bbox_from_keypoints(
            &joints_2d.retain(&record.valid),
            config.extracted_width,
            config.extracted_height,
            config.bbox_padding,
        ),
    };

    let target = generate_heatmaps(
        &joints_2d,
        &record.valid,
        output_size,
        config.heatmap_size(),
        config.sigma,
    );

    Ok(HandSample {
        image_path: record.image_path.clone(),
        take_name: record.take_name.clone(),
        frame_index: record.frame_index,
        hand: record.hand,
        crop,
        joints_2d,
        joints_3d,
        wrist,
        bbox,
        valid: record.valid,
        intrinsic: record.camera.intrinsic,
        transform,
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrist_relative_mm() {
        let mut joints = JointSet3::empty();
        joints.set(JointIndex::Wrist, Some(Vector3::new(0.1, 0.2, 0.5)));
        joints.set(JointIndex::Index1, Some(Vector3::new(0.12, 0.2, 0.5)));
        joints.set(JointIndex::Ring3, Some(Vector3::new(0.3, 0.3, 0.3)));
        let mut valid = ValidityMask::all_invalid();
        valid.set(JointIndex::Index1, true);

        let (offsets, wrist) = wrist_relative_mm(&joints, &valid);
        assert!((wrist - Vector3::new(100.0, 200.0, 500.0)).norm() < 1e-9);
        let index = offsets.get(JointIndex::Index1).unwrap();
        assert!((index - Vector3::new(20.0, 0.0, 0.0)).norm() < 1e-9);
        // 手首自体が無効なら手首の差分も欠損
        assert!(offsets.get(JointIndex::Wrist).is_none());
        assert!(offsets.get(JointIndex::Ring3).is_none());
        assert_eq!(offsets.present_count(), 1);
    }

    #[test]
    fn test_wrist_offset_zero_when_valid() {
        let mut joints = JointSet3::empty();
        joints.set(JointIndex::Wrist, Some(Vector3::new(0.1, 0.2, 0.5)));
        let mut valid = ValidityMask::all_invalid();
        valid.set(JointIndex::Wrist, true);
        let (offsets, _) = wrist_relative_mm(&joints, &valid);
        assert_eq!(offsets.get(JointIndex::Wrist), Some(Vector3::zeros()));
    }
}
