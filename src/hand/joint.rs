use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

/// 手の左右。アノテーション上の並びは右手 → 左手
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandSide {
    Right,
    Left,
}

impl HandSide {
    pub const ORDER: [HandSide; 2] = [HandSide::Right, HandSide::Left];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandSide::Right => "right",
            HandSide::Left => "left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ORDER: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }
}

/// 片手21関節のインデックス（手首 → 親指1..4 → 人差し指 → 中指 → 薬指 → 小指）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum JointIndex {
    Wrist = 0,
    Thumb1 = 1,
    Thumb2 = 2,
    Thumb3 = 3,
    Thumb4 = 4,
    Index1 = 5,
    Index2 = 6,
    Index3 = 7,
    Index4 = 8,
    Middle1 = 9,
    Middle2 = 10,
    Middle3 = 11,
    Middle4 = 12,
    Ring1 = 13,
    Ring2 = 14,
    Ring3 = 15,
    Ring4 = 16,
    Pinky1 = 17,
    Pinky2 = 18,
    Pinky3 = 19,
    Pinky4 = 20,
}

impl JointIndex {
    pub const COUNT: usize = 21;
    /// 指1本あたりの関節数
    pub const JOINTS_PER_FINGER: usize = 4;

    pub const ALL: [JointIndex; JointIndex::COUNT] = [
        JointIndex::Wrist,
        JointIndex::Thumb1,
        JointIndex::Thumb2,
        JointIndex::Thumb3,
        JointIndex::Thumb4,
        JointIndex::Index1,
        JointIndex::Index2,
        JointIndex::Index3,
        JointIndex::Index4,
        JointIndex::Middle1,
        JointIndex::Middle2,
        JointIndex::Middle3,
        JointIndex::Middle4,
        JointIndex::Ring1,
        JointIndex::Ring2,
        JointIndex::Ring3,
        JointIndex::Ring4,
        JointIndex::Pinky1,
        JointIndex::Pinky2,
        JointIndex::Pinky3,
        JointIndex::Pinky4,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// 手首ならNone
    pub fn finger(self) -> Option<Finger> {
        match self {
            JointIndex::Wrist => None,
            j => Some(Finger::ORDER[(j.index() - 1) / Self::JOINTS_PER_FINGER]),
        }
    }

    /// 指内の関節番号 (1..=4)。手首ならNone
    pub fn finger_joint(self) -> Option<usize> {
        match self {
            JointIndex::Wrist => None,
            j => Some((j.index() - 1) % Self::JOINTS_PER_FINGER + 1),
        }
    }

    /// アノテーションJSONのキー (`right_wrist`, `left_index_3` など)
    pub fn annotation_key(self, side: HandSide) -> String {
        match (self.finger(), self.finger_joint()) {
            (Some(finger), Some(n)) => format!("{}_{}_{}", side.as_str(), finger.as_str(), n),
            _ => format!("{}_wrist", side.as_str()),
        }
    }
}

/// 片手21関節。各関節は欠損しうる (None)
///
/// 全ステージが位置で関節を参照するので、並びは常に [`JointIndex`] の順。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointSet<P: Copy> {
    joints: [Option<P>; JointIndex::COUNT],
}

/// ワールド/カメラ空間の3D関節
pub type JointSet3 = JointSet<Vector3<f64>>;
/// 画像座標の2D関節
pub type JointSet2 = JointSet<Point2<f64>>;

impl<P: Copy> JointSet<P> {
    pub fn new(joints: [Option<P>; JointIndex::COUNT]) -> Self {
        Self { joints }
    }

    /// 全関節欠損
    pub fn empty() -> Self {
        Self { joints: [None; JointIndex::COUNT] }
    }

    pub fn get(&self, index: JointIndex) -> Option<P> {
        self.joints[index.index()]
    }

    pub fn set(&mut self, index: JointIndex, value: Option<P>) {
        self.joints[index.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Option<P>> + '_ {
        self.joints.iter()
    }

    pub fn as_array(&self) -> &[Option<P>; JointIndex::COUNT] {
        &self.joints
    }

    /// 存在する関節数
    pub fn present_count(&self) -> usize {
        self.joints.iter().filter(|j| j.is_some()).count()
    }

    /// 関節ごとに変換。欠損は欠損のまま
    pub fn map<Q: Copy, F: Fn(P) -> Q>(&self, f: F) -> JointSet<Q> {
        let mut out = [None; JointIndex::COUNT];
        for (dst, src) in out.iter_mut().zip(self.joints.iter()) {
            *dst = src.map(&f);
        }
        JointSet::new(out)
    }

    /// `keep` が false の関節を欠損にする
    pub fn retain(&self, keep: &ValidityMask) -> Self {
        let mut out = *self;
        for joint in JointIndex::ALL {
            if !keep.is_valid(joint) {
                out.set(joint, None);
            }
        }
        out
    }
}

/// 関節ごとの有効フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityMask {
    flags: [bool; JointIndex::COUNT],
}

impl ValidityMask {
    pub fn new(flags: [bool; JointIndex::COUNT]) -> Self {
        Self { flags }
    }

    pub fn all_invalid() -> Self {
        Self { flags: [false; JointIndex::COUNT] }
    }

    pub fn is_valid(&self, index: JointIndex) -> bool {
        self.flags[index.index()]
    }

    pub fn set(&mut self, index: JointIndex, valid: bool) {
        self.flags[index.index()] = valid;
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&v| v).count()
    }

    /// 手首以外の有効関節数（採否判定用）
    pub fn count_excluding_wrist(&self) -> usize {
        self.flags[1..].iter().filter(|&&v| v).count()
    }

    pub fn as_array(&self) -> &[bool; JointIndex::COUNT] {
        &self.flags
    }
}
