// 书库客户端：流式阅读器、书库浏览与本地偏好

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod preferences;
pub mod reader;

pub use api::LibraryClient;
pub use config::{CliArgs, Command, ReaderConfig};
pub use error::{ReaderError, Result};
pub use preferences::{PreferenceStore, Preferences};
