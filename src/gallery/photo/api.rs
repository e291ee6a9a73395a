//! 照片表 HTTP API 客户端

use crate::gallery::photo::models::{NewPhoto, Photo};
use crate::gallery::types::{expect_single_row, handle_http_response};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// 照片相关的 HTTP API 客户端
#[derive(Clone)]
pub struct PhotoApi {
    client: reqwest::Client,
    rest_url: String,
}

impl PhotoApi {
    /// `client` 应该已经在外部配置好 apikey / Authorization 默认请求头
    pub fn new(client: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            client,
            rest_url: format!("{}/rest/v1/photos", api_base_url.trim_end_matches('/')),
        }
    }

    /// 获取活动下的全部照片（按创建时间倒序）
    pub async fn list_by_event(&self, event_id: &str) -> Result<Vec<Photo>> {
        info!("[PhotoAPI] 📡 请求活动照片列表, event: {}", event_id);
        debug!("[PhotoAPI]   请求URL: {}", self.rest_url);

        let response = self
            .client
            .get(&self.rest_url)
            .query(&[
                ("select", "*".to_string()),
                ("event_id", format!("eq.{}", event_id)),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await
            .context("请求失败")?;

        let photos: Vec<Photo> = handle_http_response(response, "活动照片列表").await?;
        info!("[PhotoAPI] ✅ 活动照片列表响应，照片数: {}", photos.len());
        Ok(photos)
    }

    /// 插入一行照片记录
    pub async fn insert(&self, photo: &NewPhoto) -> Result<Photo> {
        debug!("[PhotoAPI] 📡 插入照片记录: {}", photo.id);
        let response = self
            .client
            .post(&self.rest_url)
            .header("Prefer", "return=representation")
            .json(photo)
            .send()
            .await
            .context("请求失败")?;

        let rows: Vec<Photo> = handle_http_response(response, "插入照片").await?;
        expect_single_row(rows, "插入照片")?
            .ok_or_else(|| anyhow::anyhow!("插入照片响应中缺少数据行"))
    }
}
