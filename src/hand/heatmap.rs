use ndarray::{Array1, Array3};

use super::joint::{JointIndex, JointSet2, ValidityMask};

/// 関節ごとのガウシアンヒートマップと重み
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapTarget {
    /// [関節, H, W]
    pub heatmaps: Array3<f32>,
    /// 1 = 学習に使う, 0 = 無視
    pub weights: Array1<f32>,
}

/// クロップ画像上の関節からヒートマップを生成
///
/// - `image_size`, `heatmap_size`: (W, H)
/// - 正規化なしのガウシアン（中心値 1.0）を半径 `3σ` で打ち切って書き込む
/// - 打ち切り窓がグリッドと交差しない関節は重み0
pub fn generate_heatmaps(
    points: &JointSet2,
    valid: &ValidityMask,
    image_size: (u32, u32),
    heatmap_size: (u32, u32),
    sigma: f64,
) -> HeatmapTarget {
    let (hm_w, hm_h) = (heatmap_size.0 as i64, heatmap_size.1 as i64);
    let mut heatmaps = Array3::<f32>::zeros((JointIndex::COUNT, hm_h as usize, hm_w as usize));
    let mut weights = Array1::<f32>::zeros(JointIndex::COUNT);

    let stride_x = image_size.0 as f64 / heatmap_size.0 as f64;
    let stride_y = image_size.1 as f64 / heatmap_size.1 as f64;
    let tmp_size = sigma * 3.0;
    // ガウシアン窓内の中心位置
    let center = ((2.0 * tmp_size + 1.0) / 2.0).floor();
    let two_sigma_sq = 2.0 * sigma * sigma;

    for joint in JointIndex::ALL {
        let j = joint.index();
        let point = match (valid.is_valid(joint), points.get(joint)) {
            (true, Some(p)) => p,
            _ => continue,
        };
        weights[j] = 1.0;

        let mu_x = (point.x / stride_x + 0.5) as i64;
        let mu_y = (point.y / stride_y + 0.5) as i64;
        let ul = ((mu_x as f64 - tmp_size) as i64, (mu_y as f64 - tmp_size) as i64);
        let br = ((mu_x as f64 + tmp_size + 1.0) as i64, (mu_y as f64 + tmp_size + 1.0) as i64);

        if ul.0 >= hm_w || ul.1 >= hm_h || br.0 < 0 || br.1 < 0 {
            weights[j] = 0.0;
            continue;
        }

        let mut map = heatmaps.index_axis_mut(ndarray::Axis(0), j);
        for y in ul.1.max(0)..br.1.min(hm_h) {
            let gy = (y - ul.1) as f64 - center;
            for x in ul.0.max(0)..br.0.min(hm_w) {
                let gx = (x - ul.0) as f64 - center;
                map[[y as usize, x as usize]] = (-(gx * gx + gy * gy) / two_sigma_sq).exp() as f32;
            }
        }
    }

    HeatmapTarget { heatmaps, weights }
}
