//! 批量上传结果

use crate::gallery::error::{GalleryError, GalleryResult};
use crate::gallery::photo::models::Photo;

/// 失败发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    /// 上传到对象存储
    Storage,
    /// 写入照片表
    Insert,
}

/// 单个文件的上传结果
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Uploaded(Photo),
    Failed {
        file_name: String,
        stage: UploadStage,
        /// 已写入存储但未入库的对象路径（孤儿对象，不会被清理）
        stored_path: Option<String>,
        error: String,
    },
    /// 前面的文件失败后未再尝试
    Skipped { file_name: String },
}

/// 一批文件的逐项结果，顺序与输入一致
///
/// 第一次失败后立即停止，剩余文件标记为 [`UploadOutcome::Skipped`]。
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o, UploadOutcome::Uploaded(_)))
    }

    pub fn uploaded(&self) -> Vec<&Photo> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                UploadOutcome::Uploaded(photo) => Some(photo),
                _ => None,
            })
            .collect()
    }

    pub fn failure(&self) -> Option<&UploadOutcome> {
        self.outcomes
            .iter()
            .find(|o| matches!(o, UploadOutcome::Failed { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, UploadOutcome::Skipped { .. }))
            .count()
    }

    pub fn orphaned_paths(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                UploadOutcome::Failed {
                    stored_path: Some(path),
                    ..
                } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    /// 整批是否成功；有失败时转换为面向用户的错误
    pub fn ensure_success(&self) -> GalleryResult<()> {
        match self.failure() {
            Some(UploadOutcome::Failed {
                file_name, error, ..
            }) => Err(GalleryError::backend(
                "Failed to upload photos",
                anyhow::anyhow!("{}: {}", file_name, error),
            )),
            _ => Ok(()),
        }
    }
}
