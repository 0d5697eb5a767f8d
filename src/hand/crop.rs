use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use super::joint::JointSet2;

/// BBox → スケールの拡張率
pub const SCALE_MARGIN: f64 = 1.25;

/// BBox（ピクセル座標, x1 <= x2, y1 <= y2）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> Point2<f64> {
        Point2::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn contains(&self, p: &Point2<f64>) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }
}

/// 中心 + スケール（pixel_std 単位の幅・高さ）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterScale {
    pub center: Point2<f64>,
    pub scale: Vector2<f64>,
}

/// 存在する関節の min/max を囲む最小のBBox。関節が1つも無ければNone
pub fn tight_bbox(points: &JointSet2) -> Option<BBox> {
    let mut present = points.iter().flatten();
    let first = present.next()?;
    let init = BBox { x1: first.x, y1: first.y, x2: first.x, y2: first.y };

    Some(present.fold(init, |b, p| BBox {
        x1: b.x1.min(p.x),
        y1: b.y1.min(p.y),
        x2: b.x2.max(p.x),
        y2: b.y2.max(p.y),
    }))
}

/// 有効関節からBBoxを推定
///
/// - 存在する関節の min/max
/// - 各辺を `padding` ピクセル拡張
/// - `[0, W-1] × [0, H-1]` にクリップ
pub fn bbox_from_keypoints(points: &JointSet2, width: u32, height: u32, padding: f64) -> Option<BBox> {
    let tight = tight_bbox(points)?;
    let max_x = width.saturating_sub(1) as f64;
    let max_y = height.saturating_sub(1) as f64;

    Some(BBox {
        x1: (tight.x1 - padding).clamp(0.0, max_x),
        y1: (tight.y1 - padding).clamp(0.0, max_y),
        x2: (tight.x2 + padding).clamp(0.0, max_x),
        y2: (tight.y2 + padding).clamp(0.0, max_y),
    })
}

/// BBox → 中心 + スケール
///
/// - アスペクト比 (W/H) に合わせて短い方を伸ばす（長い方は縮めない）
/// - `pixel_std` で正規化
/// - 1.25倍に拡張
pub fn bbox_to_center_scale(bbox: &BBox, width: u32, height: u32, pixel_std: f64) -> CenterScale {
    let aspect_ratio = width as f64 / height as f64;
    let mut w = bbox.width();
    let mut h = bbox.height();

    if w > aspect_ratio * h {
        h = w / aspect_ratio;
    } else if w < aspect_ratio * h {
        w = h * aspect_ratio;
    }

    CenterScale {
        center: bbox.center(),
        scale: Vector2::new(w / pixel_std, h / pixel_std) * SCALE_MARGIN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::JointIndex;

    fn points(list: &[(JointIndex, f64, f64)]) -> JointSet2 {
        let mut set = JointSet2::empty();
        for &(j, x, y) in list {
            set.set(j, Some(Point2::new(x, y)));
        }
        set
    }

    #[test]
    fn test_bbox_from_keypoints_basic() {
        let pts = points(&[
            (JointIndex::Wrist, 100.0, 150.0),
            (JointIndex::Index4, 180.0, 90.0),
            (JointIndex::Pinky2, 140.0, 200.0),
        ]);
        let tight = tight_bbox(&pts).unwrap();
        assert_eq!(tight, BBox { x1: 100.0, y1: 90.0, x2: 180.0, y2: 200.0 });

        let bbox = bbox_from_keypoints(&pts, 512, 512, 20.0).unwrap();
        assert_eq!(bbox, BBox { x1: 80.0, y1: 70.0, x2: 200.0, y2: 220.0 });
        for p in pts.iter().flatten() {
            assert!(bbox.contains(p));
        }
    }

    #[test]
    fn test_bbox_clipped_to_image() {
        let pts = points(&[(JointIndex::Thumb1, 5.0, 500.0), (JointIndex::Thumb2, 30.0, 510.0)]);
        let bbox = bbox_from_keypoints(&pts, 512, 512, 20.0).unwrap();
        assert_eq!(bbox.x1, 0.0);
        assert_eq!(bbox.y2, 511.0);
        assert!(bbox.x1 <= bbox.x2 && bbox.x2 < 512.0);
        assert!(bbox.y1 <= bbox.y2 && bbox.y2 < 512.0);
    }

    #[test]
    fn test_bbox_empty_set() {
        assert!(bbox_from_keypoints(&JointSet2::empty(), 512, 512, 20.0).is_none());
    }

    #[test]
    fn test_center_scale_square_box() {
        let bbox = BBox { x1: 100.0, y1: 100.0, x2: 300.0, y2: 300.0 };
        let cs = bbox_to_center_scale(&bbox, 512, 512, 200.0);
        assert_eq!(cs.center, Point2::new(200.0, 200.0));
        assert!((cs.scale.x - 1.25).abs() < 1e-12);
        assert!((cs.scale.y - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_center_scale_grows_short_side() {
        // 横長 → 高さを増やす
        let bbox = BBox { x1: 0.0, y1: 0.0, x2: 100.0, y2: 40.0 };
        let cs = bbox_to_center_scale(&bbox, 512, 512, 200.0);
        assert!((cs.scale.x - 0.625).abs() < 1e-12);
        assert!((cs.scale.y - 0.625).abs() < 1e-12);
        assert_eq!(cs.center, Point2::new(50.0, 20.0));

        // 縦長, 4:3 ターゲット → 幅を増やす
        let bbox = BBox { x1: 0.0, y1: 0.0, x2: 30.0, y2: 120.0 };
        let cs = bbox_to_center_scale(&bbox, 400, 300, 100.0);
        assert!((cs.scale.x / cs.scale.y - 4.0 / 3.0).abs() < 1e-12);
        assert!((cs.scale.y - 1.2 * 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_center_scale_aspect_already_matched() {
        let bbox = BBox { x1: 10.0, y1: 20.0, x2: 90.0, y2: 80.0 };
        let cs = bbox_to_center_scale(&bbox, 640, 480, 200.0);
        assert!((cs.scale.x - 80.0 / 200.0 * 1.25).abs() < 1e-12);
        assert!((cs.scale.y - 60.0 / 200.0 * 1.25).abs() < 1e-12);
        assert_eq!(cs.center, bbox.center());
    }
}
