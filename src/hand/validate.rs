use nalgebra::Point2;

use super::joint::{JointIndex, JointSet2, ValidityMask};
use crate::calibration::OcclusionMask;

/// 関節ごとの判定結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointCheck {
    /// 遮蔽判定に使った座標（欠損・範囲外なら原点）
    pub probe: Point2<f64>,
    pub missing: bool,
    pub out_of_bounds: bool,
    pub occluded: bool,
}

impl JointCheck {
    pub fn is_valid(&self) -> bool {
        !(self.missing || self.out_of_bounds || self.occluded)
    }
}

/// 抽出ビュー上の1関節を判定
///
/// 欠損 → 範囲外 → 遮蔽 の順。欠損・範囲外の点は原点に置き換えてから
/// 次の判定に回す（遮蔽判定は置き換え後のピクセルを引く）。
pub fn check_joint(point: Option<Point2<f64>>, mask: &OcclusionMask) -> JointCheck {
    let (mut probe, missing) = match point {
        Some(p) => (p, false),
        None => (Point2::origin(), true),
    };

    let out_of_bounds = !mask.contains(probe.x, probe.y);
    if out_of_bounds {
        probe = Point2::origin();
    }

    // 範囲内なので切り捨てでピクセル化
    let occluded = !mask.is_visible(probe.x as u32, probe.y as u32);

    JointCheck { probe, missing, out_of_bounds, occluded }
}

/// 抽出ビューの2D関節を検証し、無効関節を欠損にした点列と有効フラグを返す
///
/// 出力の欠損パターンと有効フラグは常に一致する。
pub fn validate_keypoints(points: &JointSet2, mask: &OcclusionMask) -> (JointSet2, ValidityMask) {
    let mut cleaned = JointSet2::empty();
    let mut valid = ValidityMask::all_invalid();

    for joint in JointIndex::ALL {
        let point = points.get(joint);
        if check_joint(point, mask).is_valid() {
            cleaned.set(joint, point);
            valid.set(joint, true);
        }
    }

    (cleaned, valid)
}

/// 手首を除いた有効関節数が閾値以上か
pub fn meets_threshold(valid: &ValidityMask, threshold: usize) -> bool {
    valid.count_excluding_wrist() >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn mask_with_hole(w: u32, h: u32, hole: (u32, u32)) -> OcclusionMask {
        let mut img = GrayImage::from_pixel(w, h, Luma([255]));
        img.put_pixel(hole.0, hole.1, Luma([0]));
        OcclusionMask::from_luma(&img)
    }

    #[test]
    fn test_valid_point_kept() {
        let mask = OcclusionMask::all_visible(512, 512);
        let mut pts = JointSet2::empty();
        pts.set(JointIndex::Index1, Some(Point2::new(100.5, 200.25)));
        let (cleaned, valid) = validate_keypoints(&pts, &mask);
        assert!(valid.is_valid(JointIndex::Index1));
        assert_eq!(cleaned.get(JointIndex::Index1), Some(Point2::new(100.5, 200.25)));
        assert_eq!(valid.count(), 1);
    }

    #[test]
    fn test_out_of_bounds_invalid() {
        let mask = OcclusionMask::all_visible(512, 512);
        let mut pts = JointSet2::empty();
        pts.set(JointIndex::Thumb1, Some(Point2::new(512.0, 10.0)));
        pts.set(JointIndex::Thumb2, Some(Point2::new(10.0, -1.0)));
        let (cleaned, valid) = validate_keypoints(&pts, &mask);
        assert_eq!(valid.count(), 0);
        assert_eq!(cleaned.present_count(), 0);
    }

    #[test]
    fn test_occluded_invalid() {
        let mask = mask_with_hole(64, 64, (10, 20));
        let mut pts = JointSet2::empty();
        pts.set(JointIndex::Ring1, Some(Point2::new(10.7, 20.9)));
        pts.set(JointIndex::Ring2, Some(Point2::new(11.0, 20.0)));
        let (cleaned, valid) = validate_keypoints(&pts, &mask);
        assert!(!valid.is_valid(JointIndex::Ring1));
        assert!(valid.is_valid(JointIndex::Ring2));
        assert_eq!(cleaned.get(JointIndex::Ring1), None);
    }

    #[test]
    fn test_precedence_probes_zeroed_pixel() {
        // 範囲外の点は原点で遮蔽判定される
        let mask = mask_with_hole(64, 64, (0, 0));
        let check = check_joint(Some(Point2::new(500.0, 500.0)), &mask);
        assert!(!check.missing);
        assert!(check.out_of_bounds);
        assert!(check.occluded);
        assert_eq!(check.probe, Point2::origin());

        let check = check_joint(None, &mask);
        assert!(check.missing);
        assert!(!check.out_of_bounds);
        assert!(check.occluded);
        assert!(!check.is_valid());
    }

    #[test]
    fn test_nan_point_is_out_of_bounds() {
        let mask = OcclusionMask::all_visible(64, 64);
        let check = check_joint(Some(Point2::new(f64::NAN, 3.0)), &mask);
        assert!(check.out_of_bounds);
        assert!(!check.is_valid());
    }

    #[test]
    fn test_threshold_ignores_wrist() {
        let mut valid = ValidityMask::all_invalid();
        valid.set(JointIndex::Wrist, true);
        for joint in &JointIndex::ALL[1..10] {
            valid.set(*joint, true);
        }
        assert!(!meets_threshold(&valid, 10));
        valid.set(JointIndex::Pinky4, true);
        assert!(meets_threshold(&valid, 10));
    }
}
