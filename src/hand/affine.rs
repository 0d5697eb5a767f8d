use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::{Matrix3, Point2, Vector2};
use serde::{Deserialize, Serialize};

use super::crop::CenterScale;
use super::joint::JointSet2;

/// 2Dアフィン変換（同次座標 3x3, 最終行は [0, 0, 1]）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub matrix: Matrix3<f64>,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self { matrix: Matrix3::identity() }
    }

    /// 3点対応から一意のアフィン変換を解く
    ///
    /// 3点が同一直線上なら解が無いので、全要素NaNの行列を返す。
    pub fn from_triangles(src: &[Point2<f64>; 3], dst: &[Point2<f64>; 3]) -> Self {
        let s = Matrix3::from_fn(|r, c| match c {
            0 => src[r].x,
            1 => src[r].y,
            _ => 1.0,
        });

        let solve = |axis: usize| {
            let rhs = nalgebra::Vector3::from_fn(|r, _| dst[r][axis]);
            s.lu().solve(&rhs)
        };

        match (solve(0), solve(1)) {
            (Some(row_x), Some(row_y)) => Self {
                matrix: Matrix3::new(
                    row_x[0], row_x[1], row_x[2],
                    row_y[0], row_y[1], row_y[2],
                    0.0, 0.0, 1.0,
                ),
            },
            _ => Self { matrix: Matrix3::from_element(f64::NAN) },
        }
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    pub fn apply_point(&self, p: &Point2<f64>) -> Point2<f64> {
        let q = self.matrix * p.to_homogeneous();
        Point2::new(q.x, q.y)
    }

    /// 関節列に適用。欠損は欠損のまま
    pub fn apply_to_points(&self, points: &JointSet2) -> JointSet2 {
        points.map(|p| self.apply_point(&p))
    }

    /// 画像をバイリニア補間で `output_size` (W, H) にワープ
    ///
    /// 入力外の画素は黒。変換が退化している場合は全面黒。
    pub fn apply_to_image(&self, image: &RgbImage, output_size: (u32, u32)) -> RgbImage {
        let mut out = RgbImage::new(output_size.0, output_size.1);
        if self.matrix.iter().any(|v| !v.is_finite()) {
            return out;
        }
        let m = self.matrix.cast::<f32>();
        let flat = [
            m[(0, 0)], m[(0, 1)], m[(0, 2)],
            m[(1, 0)], m[(1, 1)], m[(1, 2)],
            m[(2, 0)], m[(2, 1)], m[(2, 2)],
        ];
        if let Some(projection) = Projection::from_matrix(flat) {
            warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
        }
        out
    }
}

/// 方向ベクトルを `rot_rad` だけ回転
fn rotate_dir(v: Vector2<f64>, rot_rad: f64) -> Vector2<f64> {
    let (sn, cs) = rot_rad.sin_cos();
    Vector2::new(v.x * cs - v.y * sn, v.x * sn + v.y * cs)
}

/// `b` から `a - b` を90°回した位置にある3点目
fn third_point(a: &Point2<f64>, b: &Point2<f64>) -> Point2<f64> {
    let d = a - b;
    b + Vector2::new(-d.y, d.x)
}

/// 中心+スケールの領域を `output_size` (W, H) の画像へ写す相似変換
///
/// - `rotation_deg`: 回転（度）。サンプル生成では常に0
/// - `pixel_std`: スケールの単位ピクセル
/// - `inverse`: true なら出力画像 → 元画像 の変換
pub fn get_affine_transform(
    cs: &CenterScale,
    rotation_deg: f64,
    output_size: (u32, u32),
    pixel_std: f64,
    inverse: bool,
) -> AffineTransform {
    let src_w = cs.scale.x * pixel_std;
    let dst_w = output_size.0 as f64;
    let dst_h = output_size.1 as f64;

    let src_dir = rotate_dir(Vector2::new(0.0, src_w * -0.5), rotation_deg.to_radians());
    let dst_dir = Vector2::new(0.0, dst_w * -0.5);

    let src0 = cs.center;
    let src1 = src0 + src_dir;
    let dst0 = Point2::new(dst_w * 0.5, dst_h * 0.5);
    let dst1 = dst0 + dst_dir;

    let src = [src0, src1, third_point(&src0, &src1)];
    let dst = [dst0, dst1, third_point(&dst0, &dst1)];

    if inverse {
        AffineTransform::from_triangles(&dst, &src)
    } else {
        AffineTransform::from_triangles(&src, &dst)
    }
}
