pub mod gallery;

// 重新导出常用类型和函数，方便外部使用
pub use gallery::{
    access::{AccessForm, AccessMode, Credentials, Identity},
    archive::ArchiveReport,
    backend::{GalleryBackend, RemoteBackend},
    client::{ClientConfig, EventPhotosClient},
    error::{GalleryError, GalleryResult},
    event::{Event, EventListener},
    photo::{LocalImage, Photo, PhotoListener, PhotoUploader, UploadOutcome, UploadReport},
    session::{Role, Session},
    views::{Dashboard, GuestGrid, Header},
};
