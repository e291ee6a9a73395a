//! 照片模块
//!
//! 照片表访问、变更监听、本地选择与批量上传结果

pub mod api;
pub mod listener;
pub mod models;
pub mod types;
pub mod uploader;

// 重新导出主要类型和函数
pub use api::PhotoApi;
pub use listener::{EmptyPhotoListener, PhotoListener};
pub use models::{NewPhoto, Photo};
pub use types::{UploadOutcome, UploadReport, UploadStage};
pub use uploader::{LocalImage, PhotoUploader, Preview};
