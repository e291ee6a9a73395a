use serde::Deserialize;
use tracing::{debug, error};

/// 后端统一错误体
///
/// 表接口（PostgREST）返回 `code/message/details/hint`，
/// 存储接口返回 `statusCode/error/message`，这里合并为一个结构体，缺失字段为 None。
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("code={}", code));
        }
        if let Some(err) = &self.error {
            parts.push(err.clone());
        }
        if let Some(msg) = &self.message {
            parts.push(msg.clone());
        }
        if let Some(details) = &self.details {
            parts.push(format!("details={}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("hint={}", hint));
        }
        parts.join(", ")
    }
}

/// 读取响应 body，非 2xx 时转换为错误
async fn read_body(response: reqwest::Response, operation_name: &str) -> anyhow::Result<Vec<u8>> {
    use anyhow::Context;

    let status = response.status();
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        let detail = serde_json::from_slice::<ApiErrorBody>(&body_bytes)
            .map(|b| b.describe())
            .unwrap_or_else(|_| body_str.to_string());
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, detail
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, detail));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);
    Ok(body_bytes.to_vec())
}

/// 通用 HTTP 响应处理函数：检查状态码并把 body 反序列化为 `T`
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    let body_bytes = read_body(response, operation_name).await?;
    serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name,
            e,
            String::from_utf8_lossy(&body_bytes)
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })
}

/// 只关心成功与否的响应（PATCH / 上传等）
pub async fn handle_empty_response(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<()> {
    read_body(response, operation_name).await.map(|_| ())
}

/// 单行查询：0 行为 None，多于 1 行为错误
pub fn expect_single_row<T>(mut rows: Vec<T>, operation_name: &str) -> anyhow::Result<Option<T>> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        n => Err(anyhow::anyhow!("{}期望单行结果，实际返回 {} 行", operation_name, n)),
    }
}
