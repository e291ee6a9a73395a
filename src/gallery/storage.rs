//! 对象存储 HTTP API 客户端
//!
//! 上传（可选覆盖）、公开地址拼接以及按地址读取原始字节

use crate::gallery::types::handle_empty_response;
use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, error, info};

/// 下载得到的对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedObject {
    pub bytes: Vec<u8>,
    /// 响应头中的 Content-Type，缺失时为 None
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct StorageApi {
    client: reqwest::Client,
    storage_url: String,
}

impl StorageApi {
    /// `client` 应该已经在外部配置好 apikey / Authorization 默认请求头
    pub fn new(client: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            client,
            storage_url: format!("{}/storage/v1", api_base_url.trim_end_matches('/')),
        }
    }

    /// 上传对象；`upsert` 为 true 时覆盖同名对象
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        let url = format!("{}/object/{}/{}", self.storage_url, bucket, path);
        info!(
            "[Storage] 📤 上传对象: {}/{} ({} 字节, upsert={})",
            bucket,
            path,
            bytes.len(),
            upsert
        );
        debug!("[Storage]   请求URL: {}", url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes)
            .send()
            .await
            .context("请求失败")?;

        handle_empty_response(response, "上传对象").await
    }

    /// 公开访问地址（不发请求）
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.storage_url, bucket, path)
    }

    /// 按地址读取对象字节
    pub async fn fetch(&self, url: &str) -> Result<FetchedObject> {
        debug!("[Storage] 📥 下载对象: {}", url);
        let response = self.client.get(url).send().await.context("请求失败")?;

        let status = response.status();
        if !status.is_success() {
            error!("[Storage] 下载对象失败，HTTP状态: {}, url: {}", status, url);
            return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, url));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.context("读取响应 body 失败")?;
        Ok(FetchedObject {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
