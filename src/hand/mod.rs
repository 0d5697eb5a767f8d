pub mod affine;
pub mod crop;
pub mod heatmap;
pub mod joint;
pub mod validate;

pub use affine::{get_affine_transform, AffineTransform};
pub use crop::{bbox_from_keypoints, bbox_to_center_scale, tight_bbox, BBox, CenterScale};
pub use heatmap::{generate_heatmaps, HeatmapTarget};
pub use joint::{Finger, HandSide, JointIndex, JointSet, JointSet2, JointSet3, ValidityMask};
pub use validate::{check_joint, meets_threshold, validate_keypoints, JointCheck};
