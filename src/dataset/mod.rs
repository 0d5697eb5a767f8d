pub mod curator;
pub mod index;
pub mod manifest;
pub mod sample;
pub mod store;

pub use curator::{
    curate_hand, curate_take, CurationStats, HandGeometry, HandRecord, SampleCurator, SkipReason, TakeInputs,
    TakeReport,
};
pub use index::{CurationIndex, TakeSkip, TakeSummary};
pub use manifest::{Split, TakeEntry, TakeRef};
pub use sample::{materialize, HandSample};
pub use store::{AnnotationStore, CameraPoses, FrameJoints, FsImageStore, ImageStore, PoseStore, TakeAnnotation};
