pub mod access;
pub mod archive;
pub mod backend;
pub mod client;
pub mod db;
pub mod error;
pub mod event;
pub mod photo;
pub mod realtime;
pub mod serialization;
pub mod session;
pub mod storage;
pub mod types;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出入场校验与错误类型
pub use access::{AccessForm, AccessMode, Credentials, Identity};
pub use error::{GalleryError, GalleryResult};
