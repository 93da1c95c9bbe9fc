use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::*;
use crate::error::{ReaderError, Result};
use crate::reader::types::Bookmark;

/// 书库服务器客户端
///
/// 所有后端协作方（书签、流式加载、选区工具、书库、上传、登录）都通过它访问；
/// 会话 Cookie 保存在客户端内部
#[derive(Clone)]
pub struct LibraryClient {
    http: Client,
    base_url: Url,
}

impl LibraryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ReaderError::Config(format!("无效的服务器地址 {}: {}", base_url, e)))?;
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// 拼接路径，每个片段单独做百分号编码
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ReaderError::Config(format!("服务器地址不能作为基础路径: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// 非 2xx 响应转换为错误，优先使用服务器返回的 error 字段
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body
            .error
            .or(body.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

        Err(ReaderError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = Self::check(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T> {
        let response = Self::check(self.http.post(url).json(body).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn post_json_unit<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<()> {
        Self::check(self.http.post(url).json(body).send().await?).await?;
        Ok(())
    }

    // ===== 阅读器 =====

    /// 打开 `/load_book` 数据流，调用方逐块读取响应体
    pub async fn open_book_stream(&self, filename: &str) -> Result<Response> {
        let url = self.endpoint(&["load_book", filename])?;
        debug!("打开书籍数据流: {}", url);
        Self::check(self.http.get(url).send().await?).await
    }

    /// 读取书签；未登录或没有书签时返回 None
    pub async fn get_bookmark(&self, filename: &str) -> Result<Option<Bookmark>> {
        let resp: BookmarkResponse = self.get_json(self.endpoint(&["bookmark", filename])?).await?;
        Ok(resp.chapter_index.map(|chapter_index| Bookmark {
            chapter_index,
            position: resp.position.unwrap_or(0.0),
        }))
    }

    pub async fn save_bookmark(&self, filename: &str, bookmark: &Bookmark) -> Result<()> {
        self.post_json_unit(self.endpoint(&["bookmark", filename])?, bookmark)
            .await
    }

    /// 标记书籍已读完（服务器端幂等）
    pub async fn tag_finished(&self, filename: &str) -> Result<()> {
        let url = self.endpoint(&["tag_finished", filename])?;
        Self::check(self.http.post(url).send().await?).await?;
        Ok(())
    }

    pub async fn ask_question(&self, request: &AskRequest) -> Result<String> {
        let resp: AskResponse = self
            .post_json(self.endpoint(&["ask_question"])?, request)
            .await?;
        Ok(resp.answer)
    }

    pub async fn define_word(&self, request: &DefineRequest) -> Result<String> {
        let resp: DefineResponse = self
            .post_json(self.endpoint(&["define_word"])?, request)
            .await?;
        Ok(resp.definition)
    }

    pub async fn translate_text(&self, request: &TranslateRequest) -> Result<String> {
        let resp: TranslateResponse = self
            .post_json(self.endpoint(&["translate_text"])?, request)
            .await?;
        Ok(resp.translation)
    }

    /// 按请求类型分派选区工具请求
    pub async fn assist(&self, request: &AssistRequest) -> Result<String> {
        match request {
            AssistRequest::Ask(req) => self.ask_question(req).await,
            AssistRequest::Define(req) => self.define_word(req).await,
            AssistRequest::Translate(req) => self.translate_text(req).await,
        }
    }

    // ===== 书库 =====

    pub async fn load_more(&self, offset: usize, filters: &LibraryFilters) -> Result<Vec<LibraryEntry>> {
        let mut url = self.endpoint(&["load_more", &offset.to_string()])?;
        let query = filters.to_query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        self.get_json(url).await
    }

    pub fn download_url(&self, filename: &str) -> Result<String> {
        Ok(self.endpoint(&["download", filename])?.to_string())
    }

    pub async fn book_metadata(&self, filename: &str) -> Result<BookDetails> {
        self.get_json(self.endpoint(&["book_metadata", filename])?)
            .await
    }

    pub async fn update_metadata(&self, filename: &str, update: &MetadataUpdate) -> Result<()> {
        self.post_json_unit(self.endpoint(&["book_metadata", filename])?, update)
            .await
    }

    /// 上传新封面，返回服务器确认后的 base64 封面
    pub async fn update_cover(&self, filename: &str, cover_name: &str, cover: Vec<u8>) -> Result<String> {
        let form = Form::new()
            .part("cover", Part::bytes(cover).file_name(cover_name.to_string()))
            .text("filename", filename.to_string());
        let url = self.endpoint(&["update_cover"])?;
        let response = Self::check(self.http.post(url).multipart(form).send().await?).await?;
        let resp: CoverResponse = response.json().await?;
        Ok(resp.new_cover)
    }

    pub async fn upload_book(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedBook> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/epub+zip")?;
        let form = Form::new().part("file", part);
        let url = self.endpoint(&["upload_book"])?;
        let response = Self::check(self.http.post(url).multipart(form).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn upload_book_metadata(&self, metadata: &NewBookMetadata) -> Result<()> {
        self.post_json_unit(self.endpoint(&["upload_book_metadata"])?, metadata)
            .await
    }

    // ===== 登录 =====

    pub async fn login(&self, username: &str, password: &str, remember: bool) -> Result<LoginResponse> {
        let mut fields = vec![("username", username), ("password", password)];
        if remember {
            fields.push(("remember", "on"));
        }
        let url = self.endpoint(&["auth", "login"])?;
        let response = Self::check(self.http.post(url).form(&fields).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn logout(&self) -> Result<()> {
        let url = self.endpoint(&["auth", "logout"])?;
        Self::check(self.http.get(url).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_server::{Reply, TestServer};

    #[tokio::test]
    async fn test_bookmark_round_trip_requests() {
        let server = TestServer::start(vec![
            ("GET", "/bookmark/my%20book.epub", Reply::Json(200, r#"{"chapter_index":3,"position":0.4}"#.to_string())),
            ("POST", "/bookmark/my%20book.epub", Reply::Json(200, r#"{"message":"ok"}"#.to_string())),
        ])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();

        let bookmark = client.get_bookmark("my book.epub").await.unwrap().unwrap();
        assert_eq!(bookmark, Bookmark { chapter_index: 3, position: 0.4 });

        client
            .save_bookmark("my book.epub", &Bookmark { chapter_index: 1, position: 0.5 })
            .await
            .unwrap();
        let posts: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .collect();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].json(), serde_json::json!({"chapter_index": 1, "position": 0.5}));
    }

    #[tokio::test]
    async fn test_bookmark_absent_when_anonymous() {
        let server = TestServer::start(vec![(
            "GET",
            "/bookmark/a.epub",
            Reply::Json(200, r#"{"message":"Authentication required."}"#.to_string()),
        )])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();
        assert_eq!(client.get_bookmark("a.epub").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_body_surfaces_message() {
        let server = TestServer::start(vec![(
            "POST",
            "/tag_finished/a.epub",
            Reply::Json(401, r#"{"error":"Authentication required"}"#.to_string()),
        )])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();

        match client.tag_finished("a.epub").await {
            Err(ReaderError::Status { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Authentication required");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_assist_dispatch() {
        let server = TestServer::start(vec![
            ("POST", "/ask_question", Reply::Json(200, r#"{"answer":"42"}"#.to_string())),
            ("POST", "/define_word", Reply::Json(200, r#"{"definition":"a word"}"#.to_string())),
            ("POST", "/translate_text", Reply::Json(200, r#"{"translation":"hola"}"#.to_string())),
        ])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();

        let answer = client
            .assist(&AssistRequest::Ask(AskRequest {
                context: "c".to_string(),
                question: "q".to_string(),
                chapter_sentences: vec!["s".to_string()],
            }))
            .await
            .unwrap();
        assert_eq!(answer, "42");

        let definition = client
            .assist(&AssistRequest::Define(DefineRequest {
                word: "w".to_string(),
                context: "c".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(definition, "a word");

        let translation = client
            .assist(&AssistRequest::Translate(TranslateRequest {
                text: "hello".to_string(),
                context: "c".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(translation, "hola");
        assert_eq!(
            server.requests_to("/define_word")[0].json(),
            serde_json::json!({"word": "w", "context": "c"})
        );
    }

    #[tokio::test]
    async fn test_load_more_query() {
        let server = TestServer::start(vec![(
            "GET",
            "/load_more/10",
            Reply::Json(200, r#"[{"filename":"a.epub","cover":"AAA"}]"#.to_string()),
        )])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();
        let filters = LibraryFilters {
            title: "war and peace".to_string(),
            tags: vec!["In Progress".to_string()],
            ..Default::default()
        };

        let entries = client.load_more(10, &filters).await.unwrap();
        assert_eq!(entries[0].filename, "a.epub");
        let target = &server.requests()[0].target;
        assert_eq!(target, "/load_more/10?title=war+and+peace&tags=In+Progress");
    }

    #[tokio::test]
    async fn test_upload_uses_multipart_file_field() {
        let server = TestServer::start(vec![(
            "POST",
            "/upload_book",
            Reply::Json(
                200,
                r#"{"filename":"n.epub","title":"N","author":"M","cover":null,"cover_path":"cover.jpg"}"#.to_string(),
            ),
        )])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();

        let uploaded = client.upload_book("n.epub", b"PK\x03\x04".to_vec()).await.unwrap();
        assert_eq!(uploaded.cover_path.as_deref(), Some("cover.jpg"));
        let body = server.requests()[0].body_text();
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("filename=\"n.epub\""));
    }

    #[tokio::test]
    async fn test_login_failure_message() {
        let server = TestServer::start(vec![(
            "POST",
            "/auth/login",
            Reply::Json(401, r#"{"error":"Invalid username or password"}"#.to_string()),
        )])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();

        let err = client.login("me", "bad", false).await.unwrap_err();
        assert!(err.to_string().contains("Invalid username or password"));
        assert!(server.requests()[0].body_text().contains("username=me"));
    }

    #[test]
    fn test_download_url_encodes_filename() {
        let client = LibraryClient::new("http://localhost:5000").unwrap();
        assert_eq!(
            client.download_url("a b.epub").unwrap(),
            "http://localhost:5000/download/a%20b.epub"
        );
    }
}
