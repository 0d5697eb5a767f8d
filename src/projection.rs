use nalgebra::{Matrix3, Matrix3x4, Point2};
use serde::{Deserialize, Serialize};

use crate::hand::{JointSet2, JointSet3};

/// フレームごとのカメラパラメータ（内部 K と外部 [R|t]）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub intrinsic: Matrix3<f64>,
    pub extrinsic: Matrix3x4<f64>,
}

impl CameraPose {
    pub fn new(intrinsic: Matrix3<f64>, extrinsic: Matrix3x4<f64>) -> Self {
        Self { intrinsic, extrinsic }
    }

    /// 行優先のJSON配列から構築
    pub fn from_rows(intrinsic: &[[f64; 3]; 3], extrinsic: &[[f64; 4]; 3]) -> Self {
        let k = Matrix3::from_fn(|r, c| intrinsic[r][c]);
        let rt = Matrix3x4::from_fn(|r, c| extrinsic[r][c]);
        Self::new(k, rt)
    }

    /// ワールド → 抽出ビュー2Dまでを一括で行う
    pub fn project_to_extracted(&self, world: &JointSet3, source_height: u32) -> (JointSet3, JointSet2) {
        let cam = world_to_camera(world, &self.extrinsic);
        let original = camera_to_image(&cam, &self.intrinsic);
        (cam, original_to_extracted(&original, source_height))
    }
}

/// ワールド座標 → カメラ座標 (`[R|t] · [X 1]ᵀ`)
pub fn world_to_camera(points: &JointSet3, extrinsic: &Matrix3x4<f64>) -> JointSet3 {
    points.map(|p| extrinsic * p.push(1.0))
}

/// カメラ座標 → センサー生画像平面
///
/// 奥行きゼロのチェックはしない。上流データの退化はそのまま伝播する。
pub fn camera_to_image(points: &JointSet3, intrinsic: &Matrix3<f64>) -> JointSet2 {
    points.map(|p| {
        let q = intrinsic * p;
        Point2::new(q.x / q.z, q.y / q.z)
    })
}

/// センサー生画像（横向き）→ 保存されている抽出ビュー（90°回転）
///
/// `new_x = H - y - 1`, `new_y = x`
pub fn original_to_extracted(points: &JointSet2, source_height: u32) -> JointSet2 {
    let h = source_height as f64;
    points.map(|p| Point2::new(h - p.y - 1.0, p.x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::OcclusionMask;
    use crate::hand::{check_joint, validate_keypoints, JointIndex};
    use nalgebra::Vector3;

    fn single(joint: JointIndex, p: Vector3<f64>) -> JointSet3 {
        let mut set = JointSet3::empty();
        set.set(joint, Some(p));
        set
    }

    #[test]
    fn test_world_to_camera_translation() {
        let extrinsic = Matrix3x4::new(
            1.0, 0.0, 0.0, 0.5,
            0.0, 1.0, 0.0, -0.25,
            0.0, 0.0, 1.0, 2.0,
        );
        let world = single(JointIndex::Wrist, Vector3::new(1.0, 1.0, 1.0));
        let cam = world_to_camera(&world, &extrinsic);
        let wrist = cam.get(JointIndex::Wrist).unwrap();
        assert!((wrist - Vector3::new(1.5, 0.75, 3.0)).norm() < 1e-12);
    }

    #[test]
    fn test_camera_to_image_pinhole() {
        let k = Matrix3::new(150.0, 0.0, 255.5, 0.0, 150.0, 255.5, 0.0, 0.0, 1.0);
        let cam = single(JointIndex::Index2, Vector3::new(0.2, -0.1, 0.5));
        let img = camera_to_image(&cam, &k);
        let p = img.get(JointIndex::Index2).unwrap();
        // u = 150 * 0.2 / 0.5 + 255.5 = 315.5, v = 150 * -0.1 / 0.5 + 255.5 = 225.5
        assert!((p.x - 315.5).abs() < 1e-9);
        assert!((p.y - 225.5).abs() < 1e-9);
    }

    #[test]
    fn test_absence_propagates_through_projection() {
        let pose = CameraPose::new(Matrix3::identity(), Matrix3x4::identity());
        let world = single(JointIndex::Thumb3, Vector3::new(0.1, 0.2, 1.0));
        let (cam, extracted) = pose.project_to_extracted(&world, 1408);
        for joint in JointIndex::ALL {
            let expected = joint == JointIndex::Thumb3;
            assert_eq!(cam.get(joint).is_some(), expected);
            assert_eq!(extracted.get(joint).is_some(), expected);
        }
    }

    #[test]
    fn test_rotation_to_extracted_view() {
        let mut pts = JointSet2::empty();
        pts.set(JointIndex::Wrist, Some(Point2::new(10.0, 20.0)));
        let out = original_to_extracted(&pts, 1408);
        let p = out.get(JointIndex::Wrist).unwrap();
        assert_eq!(p.x, 1408.0 - 20.0 - 1.0);
        assert_eq!(p.y, 10.0);
        assert_eq!(out.get(JointIndex::Pinky1), None);
    }

    #[test]
    fn test_identity_camera_end_to_end() {
        let pose = CameraPose::from_rows(
            &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]],
        );
        let world = single(JointIndex::Wrist, Vector3::new(0.0, 0.0, 5.0));
        let (cam, extracted) = pose.project_to_extracted(&world, 1408);
        assert_eq!(cam.get(JointIndex::Wrist), Some(Vector3::new(0.0, 0.0, 5.0)));
        assert_eq!(extracted.get(JointIndex::Wrist), Some(Point2::new(1407.0, 0.0)));

        // 512x512 の抽出ビューでは範囲外で無効
        let mask = OcclusionMask::all_visible(512, 512);
        let check = check_joint(extracted.get(JointIndex::Wrist), &mask);
        assert!(check.out_of_bounds);
        assert_eq!(check.probe, Point2::origin());
        let (cleaned, valid) = validate_keypoints(&extracted, &mask);
        assert!(!valid.is_valid(JointIndex::Wrist));
        assert_eq!(cleaned.get(JointIndex::Wrist), None);
        assert_eq!(valid.count(), 0);
    }
}
