use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::index::{CurationIndex, TakeSkip, TakeSummary};
use super::manifest::{self, Split, TakeRef};
use super::store::{AnnotationStore, CameraPoses, FsImageStore, ImageStore, PoseStore, TakeAnnotation};
use crate::calibration::{capture_name, OcclusionMask};
use crate::config::{Config, CurationConfig};
use crate::hand::{
    bbox_from_keypoints, bbox_to_center_scale, meets_threshold, validate_keypoints, BBox, CenterScale,
    HandSide, JointIndex, JointSet2, JointSet3, ValidityMask,
};
use crate::projection::CameraPose;

/// 手インスタンスを採用しなかった理由（いずれもエラーではない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// フレームに3Dアノテーションが無い
    AnnotationMissing,
    /// フレームのカメラポーズが無い
    PoseMissing,
    /// ワールド座標の手首が欠損
    WristMissing,
    /// 有効キーポイント不足
    InsufficientValidKeypoints { valid: usize, required: usize },
}

/// 1手分の幾何計算の結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandGeometry {
    /// 抽出ビュー上の2D関節（無効関節は欠損）
    pub joints_2d: JointSet2,
    /// カメラ座標の3D関節（無効関節は欠損。手首は常に元の値）
    pub joints_3d: JointSet3,
    pub valid: ValidityMask,
    pub bbox: BBox,
    pub center_scale: CenterScale,
    pub camera: CameraPose,
}

/// 1手をワールド座標から抽出ビューのBBoxまで処理する
///
/// 手首は採否カウントから除外し、カメラ座標の値は判定結果に関わらず保持する。
pub fn curate_hand(
    world: &JointSet3,
    pose: &CameraPose,
    mask: &OcclusionMask,
    config: &CurationConfig,
) -> Result<HandGeometry, SkipReason> {
    if world.get(JointIndex::Wrist).is_none() {
        return Err(SkipReason::WristMissing);
    }

    let (cam, extracted) = pose.project_to_extracted(world, config.source_height);
    let (joints_2d, valid) = validate_keypoints(&extracted, mask);

    if !meets_threshold(&valid, config.valid_kpts_threshold) {
        return Err(SkipReason::InsufficientValidKeypoints {
            valid: valid.count_excluding_wrist(),
            required: config.valid_kpts_threshold,
        });
    }

    let mut joints_3d = cam.retain(&valid);
    joints_3d.set(JointIndex::Wrist, cam.get(JointIndex::Wrist));

    let width = config.extracted_width;
    let height = config.extracted_height;
    let bbox = bbox_from_keypoints(&joints_2d, width, height, config.bbox_padding).ok_or(
        SkipReason::InsufficientValidKeypoints { valid: 0, required: config.valid_kpts_threshold },
    )?;
    let center_scale = bbox_to_center_scale(&bbox, width, height, config.pixel_std);

    Ok(HandGeometry { joints_2d, joints_3d, valid, bbox, center_scale, camera: *pose })
}

/// インデックスの1レコード。クロップは読み出し時に毎回作り直す
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandRecord {
    pub take_name: String,
    pub take_uid: String,
    pub frame_index: u64,
    pub hand: HandSide,
    pub image_path: PathBuf,
    pub joints_2d: JointSet2,
    pub joints_3d: JointSet3,
    pub valid: ValidityMask,
    pub bbox: BBox,
    pub center_scale: CenterScale,
    pub camera: CameraPose,
}

/// 採否の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationStats {
    pub accepted: usize,
    pub annotation_missing: usize,
    pub pose_missing: usize,
    pub wrist_missing: usize,
    pub insufficient_keypoints: usize,
}

impl CurationStats {
    pub fn record_skip(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::AnnotationMissing => self.annotation_missing += 1,
            SkipReason::PoseMissing => self.pose_missing += 1,
            SkipReason::WristMissing => self.wrist_missing += 1,
            SkipReason::InsufficientValidKeypoints { .. } => self.insufficient_keypoints += 1,
        }
    }

    pub fn merge(&mut self, other: &CurationStats) {
        self.accepted += other.accepted;
        self.annotation_missing += other.annotation_missing;
        self.pose_missing += other.pose_missing;
        self.wrist_missing += other.wrist_missing;
        self.insufficient_keypoints += other.insufficient_keypoints;
    }

    pub fn skipped(&self) -> usize {
        self.annotation_missing + self.pose_missing + self.wrist_missing + self.insufficient_keypoints
    }
}

/// 1take分の入力
pub struct TakeInputs<'a> {
    pub take: &'a TakeRef,
    pub annotations: &'a dyn AnnotationStore,
    pub poses: &'a dyn PoseStore,
    pub mask: &'a OcclusionMask,
    pub images: &'a dyn ImageStore,
}

/// 1take分の結果
#[derive(Debug, Clone)]
pub struct TakeReport {
    pub take: TakeRef,
    pub records: Vec<HandRecord>,
    pub stats: CurationStats,
}

type HandOutcome = (u64, HandSide, Result<HandGeometry, SkipReason>);

fn curate_frame(inputs: &TakeInputs<'_>, frame: u64, config: &CurationConfig) -> Vec<HandOutcome> {
    let joints = inputs.annotations.joints_for_frame(frame);
    let pose = inputs.poses.pose_for_frame(frame);

    HandSide::ORDER
        .iter()
        .map(|&side| {
            let outcome = match (&joints, &pose) {
                (None, _) => Err(SkipReason::AnnotationMissing),
                (_, None) => Err(SkipReason::PoseMissing),
                (Some(joints), Some(pose)) => curate_hand(joints.get(side), pose, inputs.mask, config),
            };
            (frame, side, outcome)
        })
        .collect()
}

/// take内の全 (フレーム, 手) を処理。フレームは並列に処理し、順序は保持する
pub fn curate_take(inputs: &TakeInputs<'_>, config: &CurationConfig) -> TakeReport {
    let frames = inputs.annotations.frame_indices();
    let outcomes: Vec<Vec<HandOutcome>> = frames
        .par_iter()
        .map(|&frame| curate_frame(inputs, frame, config))
        .collect();

    let mut stats = CurationStats::default();
    let mut records = Vec::new();
    for (frame, side, outcome) in outcomes.into_iter().flatten() {
        match outcome {
            Ok(geometry) => {
                stats.accepted += 1;
                records.push(HandRecord {
                    take_name: inputs.take.name.clone(),
                    take_uid: inputs.take.uid.clone(),
                    frame_index: frame,
                    hand: side,
                    image_path: inputs.images.image_path(&inputs.take.name, frame),
                    joints_2d: geometry.joints_2d,
                    joints_3d: geometry.joints_3d,
                    valid: geometry.valid,
                    bbox: geometry.bbox,
                    center_scale: geometry.center_scale,
                    camera: geometry.camera,
                });
            }
            Err(reason) => {
                log::debug!("{} frame {} {}: skipped ({:?})", inputs.take.name, frame, side.as_str(), reason);
                stats.record_skip(&reason);
            }
        }
    }

    TakeReport { take: inputs.take.clone(), records, stats }
}

/// データセット全体のインデックス構築
pub struct SampleCurator {
    config: Config,
}

impl SampleCurator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn split(&self) -> Split {
        self.config.dataset.split
    }

    pub fn image_store(&self) -> FsImageStore {
        FsImageStore::new(self.config.dataset.images_dir())
    }

    /// スプリットに属するローカルのtake一覧
    pub fn resolve_takes(&self) -> Result<Vec<TakeRef>> {
        let ds = &self.config.dataset;
        let takes = manifest::load_takes(ds.takes_path())?;
        let split_uids = manifest::load_split_uids(ds.split_path(), ds.split)?;
        let local_uids = manifest::local_annotation_uids(ds.annotation_dir())?;
        let resolved = manifest::resolve_takes(&takes, &split_uids, &local_uids);
        log::info!(
            "Number of {} takes for {} data: {}, found local {} takes",
            ds.split,
            ds.anno_type,
            split_uids.len(),
            resolved.len()
        );
        Ok(resolved)
    }

    /// 全takeを並列に処理してインデックスを作る
    ///
    /// take単位の入力欠損は警告してスキップし、他のtakeは処理を続ける。
    pub fn build_index(&self) -> Result<CurationIndex> {
        let takes = self.resolve_takes()?;
        let images = self.image_store();

        let results: Vec<Result<TakeReport, TakeSkip>> =
            takes.par_iter().map(|take| self.process_take(take, &images)).collect();

        let mut index = CurationIndex::new(self.split());
        for result in results {
            match result {
                Ok(report) => {
                    log::info!(
                        "{}: {} hands accepted, {} skipped",
                        report.take.name,
                        report.stats.accepted,
                        report.stats.skipped()
                    );
                    index.push_take(report);
                }
                Err(skip) => index.skipped_takes.push(skip),
            }
        }
        Ok(index)
    }

    fn process_take(&self, take: &TakeRef, images: &FsImageStore) -> Result<TakeReport, TakeSkip> {
        let ds = &self.config.dataset;
        let cfg = &self.config.curation;
        let anno_path = ds.annotation_dir().join(format!("{}.json", take.uid));
        let pose_path = ds.pose_dir().join(format!("{}.json", take.uid));
        let img_dir = images.take_dir(&take.name);

        let skip = |reason: String| {
            log::warn!("{} misses necessary files ({}). Skipped for now.", take.name, reason);
            TakeSkip { take: take.clone(), reason }
        };

        for path in [&anno_path, &pose_path, &img_dir] {
            if !path.exists() {
                return Err(skip(format!("{} not found", path.display())));
            }
        }

        let annotations = TakeAnnotation::load(&anno_path).map_err(|e| skip(format!("{:#}", e)))?;
        let poses = CameraPoses::load(&pose_path).map_err(|e| skip(format!("{:#}", e)))?;

        if annotations.is_empty() || annotations.len() > poses.frame_count() {
            log::info!(
                "{}: {} annotated frames vs {} camera poses. No samples taken",
                take.name,
                annotations.len(),
                poses.frame_count()
            );
            return Ok(TakeReport { take: take.clone(), records: Vec::new(), stats: CurationStats::default() });
        }

        let mask_path = ds.masks_dir().join(format!("{}.png", capture_name(&take.name)));
        let mask = OcclusionMask::load(&mask_path, cfg.extracted_width, cfg.extracted_height)
            .map_err(|e| skip(format!("{:#}", e)))?;
        if mask.visible_count() == 0 {
            log::warn!("{}: occlusion mask {} has no visible pixel", take.name, mask_path.display());
        }

        let inputs = TakeInputs {
            take,
            annotations: &annotations,
            poses: &poses,
            mask: &mask,
            images,
        };
        Ok(curate_take(&inputs, cfg))
    }
}

impl From<&TakeReport> for TakeSummary {
    fn from(report: &TakeReport) -> Self {
        TakeSummary { take: report.take.clone(), stats: report.stats }
    }
}
