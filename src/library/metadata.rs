use log::{info, warn};

use super::auth::Viewer;
use super::tags::TagInput;
use crate::api::{BookDetails, LibraryClient, MetadataUpdate};
use crate::error::{ReaderError, Result};

/// 待上传的新封面
#[derive(Debug, Clone, PartialEq)]
pub struct StagedCover {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// 元数据面板中的一个字段
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataField {
    pub label: &'static str,
    pub id: &'static str,
    pub value: String,
    pub editable: bool,
}

impl MetadataField {
    /// 管理员渲染为输入框，其他人渲染为只读文本
    pub fn render(&self) -> String {
        let value = html_escape::encode_double_quoted_attribute(&self.value);
        let control = if self.editable {
            format!("<input type=\"text\" value=\"{}\" id=\"{}\">", value, self.id)
        } else {
            format!("<span class=\"metadata-value\" id=\"{}\">{}</span>", self.id, value)
        };
        format!(
            "<div class=\"metadata-field\"><strong>{}:</strong>{}</div>",
            self.label, control
        )
    }
}

/// 书籍元数据面板
///
/// 只有管理员可以修改标题、作者、分类和封面；登录用户可以编辑标签并保存
pub struct MetadataForm {
    filename: String,
    title: String,
    author: String,
    genre: String,
    created_at: Option<String>,
    tags: TagInput,
    cover: Option<String>,
    staged_cover: Option<StagedCover>,
    viewer: Viewer,
}

impl MetadataForm {
    pub fn new(details: BookDetails, viewer: Viewer) -> Self {
        let created_at = details
            .created_at()
            .map(|dt| dt.format("%Y-%m-%d").to_string());
        Self {
            filename: details.filename,
            title: details.title,
            author: details.author,
            genre: details.genre.unwrap_or_default(),
            created_at,
            tags: TagInput::new(&details.tags),
            cover: details.cover,
            staged_cover: None,
            viewer,
        }
    }

    /// 从服务器加载
    pub async fn load(client: &LibraryClient, filename: &str, viewer: Viewer) -> Result<Self> {
        let details = client.book_metadata(filename).await?;
        Ok(Self::new(details, viewer))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn cover(&self) -> Option<&str> {
        self.cover.as_deref()
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    pub fn tags(&self) -> &TagInput {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagInput {
        &mut self.tags
    }

    pub fn can_edit_fields(&self) -> bool {
        self.viewer.is_admin()
    }

    pub fn can_change_cover(&self) -> bool {
        self.viewer.is_admin()
    }

    pub fn can_save(&self) -> bool {
        self.viewer.authenticated
    }

    pub fn fields(&self) -> Vec<MetadataField> {
        let editable = self.can_edit_fields();
        vec![
            MetadataField {
                label: "Title",
                id: "metadata-title",
                value: self.title.clone(),
                editable,
            },
            MetadataField {
                label: "Author",
                id: "metadata-author",
                value: self.author.clone(),
                editable,
            },
            MetadataField {
                label: "Genre",
                id: "metadata-genre",
                value: self.genre.clone(),
                editable,
            },
        ]
    }

    /// 非管理员的修改被忽略
    pub fn set_title(&mut self, title: &str) -> bool {
        self.edit(|form| form.title = title.to_string())
    }

    pub fn set_author(&mut self, author: &str) -> bool {
        self.edit(|form| form.author = author.to_string())
    }

    pub fn set_genre(&mut self, genre: &str) -> bool {
        self.edit(|form| form.genre = genre.to_string())
    }

    pub fn stage_cover(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        if !self.can_change_cover() {
            return Err(ReaderError::InvalidInput("only administrators can change covers".to_string()));
        }
        self.staged_cover = Some(StagedCover {
            file_name: file_name.to_string(),
            bytes,
        });
        Ok(())
    }

    pub fn has_staged_cover(&self) -> bool {
        self.staged_cover.is_some()
    }

    fn edit(&mut self, apply: impl FnOnce(&mut Self)) -> bool {
        if !self.can_edit_fields() {
            return false;
        }
        apply(self);
        true
    }

    pub fn to_update(&self) -> MetadataUpdate {
        MetadataUpdate {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            genre: self.genre.trim().to_string(),
            tags: self.tags.tags().to_vec(),
        }
    }

    /// 保存：先上传新封面，封面失败时不保存元数据
    pub async fn save(&mut self, client: &LibraryClient) -> Result<()> {
        if !self.can_save() {
            return Err(ReaderError::InvalidInput("Authentication required".to_string()));
        }

        if let Some(staged) = self.staged_cover.clone() {
            match client
                .update_cover(&self.filename, &staged.file_name, staged.bytes)
                .await
            {
                Ok(new_cover) => {
                    self.cover = Some(new_cover);
                    self.staged_cover = None;
                }
                Err(e) => {
                    warn!("更新封面失败 {}: {}", self.filename, e);
                    return Err(e);
                }
            }
        }

        client
            .update_metadata(&self.filename, &self.to_update())
            .await?;
        info!("元数据已保存: {}", self.filename);
        Ok(())
    }
}
