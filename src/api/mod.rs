use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub mod client;
#[cfg(test)]
pub(crate) mod test_server;

pub use client::LibraryClient;

/// 服务器错误响应体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /bookmark` 的响应；未登录时服务器只返回 message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookmarkResponse {
    #[serde(default)]
    pub chapter_index: Option<usize>,
    #[serde(default)]
    pub position: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskRequest {
    pub context: String,
    pub question: String,
    pub chapter_sentences: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefineRequest {
    pub word: String,
    pub context: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefineResponse {
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslateRequest {
    pub text: String,
    pub context: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateResponse {
    pub translation: String,
}

/// 选区工具的后端请求
#[derive(Debug, Clone, PartialEq)]
pub enum AssistRequest {
    Ask(AskRequest),
    Define(DefineRequest),
    Translate(TranslateRequest),
}

/// 书库网格中的一本书
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub filename: String,
    #[serde(default)]
    pub cover: Option<String>,
}

/// 书库筛选条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryFilters {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub tags: Vec<String>,
}

impl LibraryFilters {
    /// 查询参数，空条件省略，标签以逗号拼接
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        for (key, value) in [
            ("title", &self.title),
            ("author", &self.author),
            ("genre", &self.genre),
        ] {
            let value = value.trim();
            if !value.is_empty() {
                query.push((key, value.to_string()));
            }
        }

        let tags: Vec<&str> = self
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            query.push(("tags", tags.join(",")));
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.to_query().is_empty()
    }
}

/// `GET /book_metadata` 的响应
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookDetails {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub filename: String,
    #[serde(default)]
    pub cover: Option<String>,
}

impl BookDetails {
    /// 入库时间，格式 `%Y-%m-%d %H:%M:%S`
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        self.created_at
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
    }
}

/// `POST /book_metadata` 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataUpdate {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub tags: Vec<String>,
}

/// `POST /upload_book` 的响应
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadedBook {
    pub filename: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub cover_path: Option<String>,
}

/// `POST /upload_book_metadata` 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewBookMetadata {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub original_filename: String,
    pub new_filename: String,
    pub cover_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverResponse {
    pub new_cover: String,
}

/// 登录成功的响应
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub username: String,
    #[serde(default)]
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_query_omits_empty() {
        let filters = LibraryFilters {
            title: " dune ".to_string(),
            author: String::new(),
            genre: "  ".to_string(),
            tags: vec!["Finished".to_string(), " ".to_string(), "scifi".to_string()],
        };
        assert_eq!(
            filters.to_query(),
            vec![("title", "dune".to_string()), ("tags", "Finished,scifi".to_string())]
        );
        assert!(LibraryFilters::default().is_empty());
    }

    #[test]
    fn test_book_details_created_at() {
        let details: BookDetails = serde_json::from_str(
            r#"{"title":"T","author":"A","genre":null,"created_at":"2024-03-01 08:30:00","tags":[],"filename":"t.epub","cover":"abc"}"#,
        )
        .unwrap();
        let created = details.created_at().unwrap();
        assert_eq!(created.format("%Y/%m/%d").to_string(), "2024/03/01");
    }

    #[test]
    fn test_ask_request_shape() {
        let body = serde_json::to_value(AskRequest {
            context: "ctx".to_string(),
            question: "why".to_string(),
            chapter_sentences: vec!["One.".to_string()],
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"context": "ctx", "question": "why", "chapter_sentences": ["One."]})
        );
    }

    #[test]
    fn test_bookmark_response_message_only() {
        let resp: BookmarkResponse =
            serde_json::from_str(r#"{"message":"Authentication required."}"#).unwrap();
        assert_eq!(resp.chapter_index, None);
    }
}
