pub mod asset;
pub mod result;

pub use asset::{AssetSource, ImageAsset};
pub use result::{
    BoundingBox, Detection, DetectionResult, Instance, LabelEntry, PersonInference, Retouch,
};
