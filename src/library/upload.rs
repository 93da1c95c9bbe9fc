use std::path::Path;

use log::info;

use crate::api::{LibraryClient, NewBookMetadata, UploadedBook};
use crate::error::{ReaderError, Result};

/// 上传前检查扩展名和文件大小
pub fn validate_upload(file_name: &str, size: u64, max_bytes: u64) -> Result<()> {
    if !file_name.to_ascii_lowercase().ends_with(".epub") {
        return Err(ReaderError::InvalidInput(
            "Invalid file type. Only EPUB files are allowed.".to_string(),
        ));
    }
    if size > max_bytes {
        return Err(ReaderError::InvalidInput(format!(
            "File size exceeds the maximum limit of {} MB.",
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// 上传后预填的书籍信息表单
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub original_filename: String,
    pub new_filename: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub cover: Option<String>,
    pub cover_path: Option<String>,
}

impl From<UploadedBook> for UploadForm {
    fn from(book: UploadedBook) -> Self {
        Self {
            new_filename: book.filename.clone(),
            original_filename: book.filename,
            title: book.title,
            author: book.author,
            genre: String::new(),
            cover: book.cover,
            cover_path: book.cover_path,
        }
    }
}

impl UploadForm {
    /// 生成保存请求，新文件名不能为空
    pub fn to_metadata(&self) -> Result<NewBookMetadata> {
        let new_filename = self.new_filename.trim();
        if new_filename.is_empty() {
            return Err(ReaderError::InvalidInput("Missing new filename".to_string()));
        }
        Ok(NewBookMetadata {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            genre: self.genre.trim().to_string(),
            original_filename: self.original_filename.clone(),
            new_filename: new_filename.to_string(),
            cover_path: self.cover_path.clone(),
        })
    }

    pub async fn save(&self, client: &LibraryClient) -> Result<()> {
        let metadata = self.to_metadata()?;
        client.upload_book_metadata(&metadata).await?;
        info!("新书已入库: {}", metadata.new_filename);
        Ok(())
    }
}

/// 上传本地 EPUB 文件
///
/// # 参数
/// * `path` - 本地文件路径
/// * `max_bytes` - 文件大小上限
///
/// # 返回
/// 服务器解析出的书籍信息，用于填写入库表单
pub async fn upload_file(client: &LibraryClient, path: &Path, max_bytes: u64) -> Result<UploadForm> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ReaderError::InvalidInput(format!("无效的文件路径: {}", path.display())))?
        .to_string();

    let size = tokio::fs::metadata(path).await?.len();
    validate_upload(&file_name, size, max_bytes)?;

    let bytes = tokio::fs::read(path).await?;
    info!("上传 {} ({} 字节)", file_name, bytes.len());
    let uploaded = client.upload_book(&file_name, bytes).await?;
    Ok(UploadForm::from(uploaded))
}
