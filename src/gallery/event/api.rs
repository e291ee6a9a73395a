//! 活动表 HTTP API 客户端
//!
//! 负责 `events` 表的增查改请求

use crate::gallery::event::models::{Event, NewEvent};
use crate::gallery::types::{expect_single_row, handle_empty_response, handle_http_response};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// 活动相关的 HTTP API 客户端
#[derive(Clone)]
pub struct EventApi {
    client: reqwest::Client,
    rest_url: String,
}

impl EventApi {
    /// 创建新的活动 API 客户端
    ///
    /// `client` 应该已经在外部配置好 apikey / Authorization 默认请求头
    pub fn new(client: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            client,
            rest_url: format!("{}/rest/v1/events", api_base_url.trim_end_matches('/')),
        }
    }

    /// 新建活动，返回后端生成 id 后的完整行
    pub async fn create_event(&self, new_event: &NewEvent) -> Result<Event> {
        info!("[EventAPI] 📡 创建活动: {}", new_event.name);
        debug!("[EventAPI]   请求URL: {}", self.rest_url);

        let response = self
            .client
            .post(&self.rest_url)
            .header("Prefer", "return=representation")
            .json(new_event)
            .send()
            .await
            .context("请求失败")?;

        let rows: Vec<Event> = handle_http_response(response, "创建活动").await?;
        let event = expect_single_row(rows, "创建活动")?
            .ok_or_else(|| anyhow::anyhow!("创建活动响应中缺少数据行"))?;

        info!("[EventAPI] ✅ 活动创建成功，id: {}", event.id);
        Ok(event)
    }

    /// 按公开邀请码查询活动
    pub async fn find_by_code(&self, code: &str) -> Result<Option<Event>> {
        debug!("[EventAPI] 📡 按邀请码查询活动: {}", code);
        let response = self
            .client
            .get(&self.rest_url)
            .query(&[("select", "*".to_string()), ("code", format!("eq.{}", code))])
            .send()
            .await
            .context("请求失败")?;

        let rows: Vec<Event> = handle_http_response(response, "按邀请码查询活动").await?;
        expect_single_row(rows, "按邀请码查询活动")
    }

    /// 按 id 查询活动
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Event>> {
        debug!("[EventAPI] 📡 按 id 查询活动: {}", id);
        let response = self
            .client
            .get(&self.rest_url)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))])
            .send()
            .await
            .context("请求失败")?;

        let rows: Vec<Event> = handle_http_response(response, "按 id 查询活动").await?;
        expect_single_row(rows, "按 id 查询活动")
    }

    /// 更新活动封面地址
    pub async fn update_cover_image(&self, id: &str, cover_url: &str) -> Result<()> {
        info!("[EventAPI] 📡 更新活动封面, id: {}", id);
        let response = self
            .client
            .patch(&self.rest_url)
            .query(&[("id", format!("eq.{}", id))])
            .json(&serde_json::json!({ "cover_image": cover_url }))
            .send()
            .await
            .context("请求失败")?;

        handle_empty_response(response, "更新活动封面").await
    }
}
