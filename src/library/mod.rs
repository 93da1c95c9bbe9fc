// 书库页面：网格浏览、筛选标签、元数据面板、上传、登录

pub mod auth;
pub mod browser;
pub mod metadata;
pub mod tags;
pub mod upload;

pub use auth::{AuthSession, Role, Viewer};
pub use browser::{LibraryBrowser, PageOutcome, PageScroll};
pub use metadata::MetadataForm;
pub use tags::{TagInput, TagKey, TagStyle};
pub use upload::UploadForm;
