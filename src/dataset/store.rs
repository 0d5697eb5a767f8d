use anyhow::{Context, Result};
use image::RgbImage;
use nalgebra::Vector3;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::hand::{HandSide, JointIndex, JointSet3};
use crate::projection::CameraPose;

/// 1フレーム分の両手3D関節（ワールド座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameJoints {
    pub right: JointSet3,
    pub left: JointSet3,
}

impl FrameJoints {
    pub fn get(&self, side: HandSide) -> &JointSet3 {
        match side {
            HandSide::Right => &self.right,
            HandSide::Left => &self.left,
        }
    }
}

/// take単位のアノテーション
pub trait AnnotationStore: Send + Sync {
    /// アノテーションのあるフレーム番号（昇順）
    fn frame_indices(&self) -> Vec<u64>;
    /// 3Dアノテーションが無いフレームはNone
    fn joints_for_frame(&self, frame: u64) -> Option<FrameJoints>;
}

/// take単位のカメラポーズ
pub trait PoseStore: Send + Sync {
    fn pose_for_frame(&self, frame: u64) -> Option<CameraPose>;
    fn frame_count(&self) -> usize;
}

/// 抽出ビュー画像の所在とデコード
pub trait ImageStore: Send + Sync {
    fn image_path(&self, take_name: &str, frame: u64) -> PathBuf;
    fn load_rgb(&self, path: &Path) -> Result<RgbImage>;
}

// --- アノテーションJSON ---

#[derive(Debug, Deserialize)]
struct RawPoint3 {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFrameEntry {
    #[serde(rename = "annotation3D")]
    annotation_3d: Option<HashMap<String, RawPoint3>>,
}

/// `{ "<frame>": [ { "annotation3D": { "<side>_<finger>_<n>": {x, y, z} } } ] }`
#[derive(Debug, Clone, Default)]
pub struct TakeAnnotation {
    frames: BTreeMap<u64, Option<FrameJoints>>,
}

fn parse_frame_index(key: &str) -> Result<u64> {
    key.trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid frame index `{}`", key))
}

fn hand_joints(anno: &HashMap<String, RawPoint3>, side: HandSide) -> JointSet3 {
    let mut joints = JointSet3::empty();
    for joint in JointIndex::ALL {
        let point = anno.get(&joint.annotation_key(side)).and_then(|p| match (p.x, p.y, p.z) {
            (Some(x), Some(y), Some(z)) => Some(Vector3::new(x, y, z)),
            _ => None,
        });
        joints.set(joint, point);
    }
    joints
}

impl TakeAnnotation {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, Option<Vec<RawFrameEntry>>> = serde_json::from_str(content)?;
        let mut frames = BTreeMap::new();
        for (key, entries) in raw {
            let joints = entries
                .as_ref()
                .and_then(|e| e.first())
                .and_then(|e| e.annotation_3d.as_ref())
                .filter(|anno| !anno.is_empty())
                .map(|anno| FrameJoints {
                    right: hand_joints(anno, HandSide::Right),
                    left: hand_joints(anno, HandSide::Left),
                });
            frames.insert(parse_frame_index(&key)?, joints);
        }
        Ok(Self { frames })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read annotation {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse annotation {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl AnnotationStore for TakeAnnotation {
    fn frame_indices(&self) -> Vec<u64> {
        self.frames.keys().copied().collect()
    }

    fn joints_for_frame(&self, frame: u64) -> Option<FrameJoints> {
        self.frames.get(&frame).copied().flatten()
    }
}

// --- カメラポーズJSON ---

#[derive(Debug, Deserialize)]
struct RawCamera {
    camera_intrinsics: Option<[[f64; 3]; 3]>,
    camera_extrinsics: Option<[[f64; 4]; 3]>,
}

/// `{ "<frame>": { "<camera>": { camera_intrinsics, camera_extrinsics } } }`
///
/// 名前に `aria` を含む最初のカメラ（ファイル上の記述順）を使う。
#[derive(Debug, Clone, Default)]
pub struct CameraPoses {
    frames: BTreeMap<u64, Option<CameraPose>>,
}

impl CameraPoses {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, serde_json::Map<String, serde_json::Value>> = serde_json::from_str(content)?;
        let mut frames = BTreeMap::new();
        for (key, cameras) in raw {
            let pose = cameras
                .iter()
                .find(|(name, _)| name.contains("aria"))
                .and_then(|(_, value)| RawCamera::deserialize(value).ok())
                .and_then(|cam| match (cam.camera_intrinsics, cam.camera_extrinsics) {
                    (Some(k), Some(rt)) => Some(CameraPose::from_rows(&k, &rt)),
                    _ => None,
                });
            frames.insert(parse_frame_index(&key)?, pose);
        }
        Ok(Self { frames })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read camera pose {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse camera pose {}", path.display()))
    }
}

impl PoseStore for CameraPoses {
    fn pose_for_frame(&self, frame: u64) -> Option<CameraPose> {
        self.frames.get(&frame).copied().flatten()
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

// --- 画像 ---

/// `<root>/<take_name>/<frame:06>.jpg`
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn take_dir(&self, take_name: &str) -> PathBuf {
        self.root.join(take_name)
    }
}

impl ImageStore for FsImageStore {
    fn image_path(&self, take_name: &str, frame: u64) -> PathBuf {
        self.take_dir(take_name).join(format!("{:06}.jpg", frame))
    }

    fn load_rgb(&self, path: &Path) -> Result<RgbImage> {
        let image = image::open(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        Ok(image.to_rgb8())
    }
}
