use thiserror::Error;

/// 客户端统一错误类型
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("网络请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("服务器返回错误 ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("数据流错误: {0}")]
    Stream(String),
    #[error("无效输入: {0}")]
    InvalidInput(String),
    #[error("配置错误: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message() {
        let err = ReaderError::Status {
            status: 404,
            message: "Book not found".to_string(),
        };
        assert_eq!(err.to_string(), "服务器返回错误 (404): Book not found");
    }

    #[test]
    fn test_json_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ReaderError = parse.unwrap_err().into();
        assert!(matches!(err, ReaderError::Json(_)));
    }
}
