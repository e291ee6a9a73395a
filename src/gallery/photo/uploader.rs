//! 照片选择器
//!
//! 维护待上传的本地图片与预览，提交时把文件整体交给客户端的上传流程。
//! 除接受列表外不做大小、数量或内容校验。

use crate::gallery::serialization::{
    content_type_for_extension, data_uri, extension_for_content_type, file_extension,
    ACCEPTED_IMAGE_EXTENSIONS,
};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// 本地图片文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LocalImage {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// 从磁盘读取图片，MIME 类型由扩展名推断
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("读取文件失败: {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("无效的文件名: {}", path.display()))?
            .to_string();
        let content_type = file_extension(&file_name)
            .map(|ext| content_type_for_extension(&ext))
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self::new(file_name, content_type, bytes))
    }

    /// 存储路径使用的扩展名：优先取文件名，其次由 MIME 类型推断
    pub fn extension(&self) -> String {
        file_extension(&self.file_name)
            .or_else(|| extension_for_content_type(&self.content_type).map(str::to_string))
            .unwrap_or_else(|| "bin".to_string())
    }
}

/// 本地预览
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub file_name: String,
    pub data_uri: String,
}

#[derive(Debug, Default)]
pub struct PhotoUploader {
    selected: Vec<LocalImage>,
    previews: Vec<Preview>,
}

impl PhotoUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否在接受列表内（JPEG / PNG）
    pub fn accepts(file: &LocalImage) -> bool {
        let by_extension = file_extension(&file.file_name)
            .map(|ext| ACCEPTED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        by_extension || matches!(file.content_type.as_str(), "image/jpeg" | "image/png")
    }

    /// 选择一批文件，替换之前的选择（旧预览一并释放），返回被接受的数量
    pub fn select(&mut self, files: Vec<LocalImage>) -> usize {
        let (accepted, rejected): (Vec<_>, Vec<_>) = files.into_iter().partition(Self::accepts);
        for file in &rejected {
            debug!("[Uploader] 忽略不支持的文件: {}", file.file_name);
        }

        self.previews = accepted
            .iter()
            .map(|file| Preview {
                file_name: file.file_name.clone(),
                data_uri: data_uri(&file.content_type, &file.bytes),
            })
            .collect();
        self.selected = accepted;
        self.selected.len()
    }

    pub fn selected(&self) -> &[LocalImage] {
        &self.selected
    }

    pub fn previews(&self) -> &[Preview] {
        &self.previews
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// 提交按钮文案；没有选择文件时不显示按钮
    pub fn upload_label(&self) -> Option<String> {
        match self.selected.len() {
            0 => None,
            1 => Some("Upload 1 Photo".to_string()),
            n => Some(format!("Upload {} Photos", n)),
        }
    }

    pub fn clear(&mut self) {
        self.previews.clear();
        self.selected.clear();
    }

    /// 取出全部待上传文件并释放预览
    pub fn take(&mut self) -> Vec<LocalImage> {
        self.previews.clear();
        std::mem::take(&mut self.selected)
    }
}
