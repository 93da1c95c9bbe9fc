use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::error::{ReaderError, Result};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const PREFERENCES_DB: &str = "preferences.db";

#[derive(Parser, Debug)]
#[command(name = "library-reader")]
#[command(about = "Browse the e-book library and read books streamed from the server")]
pub struct CliArgs {
    /// Base URL of the library server
    #[arg(long, env = "READER_BASE_URL")]
    pub base_url: Option<String>,

    /// Directory holding local preferences
    #[arg(long, env = "READER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log in with this username before running the command
    #[arg(short, long, env = "READER_USERNAME")]
    pub username: Option<String>,

    /// Password for --username
    #[arg(short, long, env = "READER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Stream a book and print its table of contents and current chapter
    Read {
        filename: String,
        /// Jump to this chapter once it has arrived
        #[arg(long)]
        chapter: Option<usize>,
    },
    /// List one page of the library grid
    Library {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        /// Comma separated tag filter
        #[arg(long)]
        tags: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Show the saved reading position for one book
    Bookmark { filename: String },
    /// Show metadata for one book
    Metadata { filename: String },
    /// Upload an EPUB file
    Upload { path: PathBuf },
    /// Adjust the reader font size by DELTA pixels
    Font {
        #[arg(allow_hyphen_values = true)]
        delta: i32,
    },
    /// Toggle dark mode
    DarkMode,
}

/// 客户端运行配置
///
/// 包含服务器地址、本地数据目录以及阅读器的各项阈值
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    /// 书签保存去抖间隔
    pub bookmark_debounce: Duration,
    /// 书库筛选输入去抖间隔
    pub filter_debounce: Duration,
    /// 每次加载的书籍数量
    pub page_size: usize,
    /// 向下滚动超过该距离后隐藏顶部控制栏
    pub hide_controls_after: f64,
    /// 距离顶部小于该距离时显示控制栏
    pub show_controls_within: f64,
    /// 书库无限滚动的触底距离
    pub load_more_margin: f64,
    /// "思考中" 动画间隔
    pub thinking_interval: Duration,
    /// 回答超过该长度时展开面板
    pub expand_threshold: usize,
    /// 选区工具面板尺寸
    pub panel_width: f64,
    pub panel_height: f64,
    /// 上传文件大小上限（字节）
    pub max_upload_bytes: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::from("."),
            bookmark_debounce: Duration::from_millis(1000),
            filter_debounce: Duration::from_millis(300),
            page_size: 10,
            hide_controls_after: 100.0,
            show_controls_within: 50.0,
            load_more_margin: 100.0,
            thinking_interval: Duration::from_millis(400),
            expand_threshold: 300,
            panel_width: 320.0,
            panel_height: 240.0,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ReaderConfig {
    /// 从命令行参数构建配置，未指定的数据目录回退到系统应用目录
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let data_dir = match &args.data_dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("dev", "library", "library-reader")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| ReaderError::Config("无法确定数据目录".to_string()))?,
        };

        let base_url = args
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self::with_base_url(base_url, data_dir)
    }

    pub fn with_base_url(base_url: impl Into<String>, data_dir: PathBuf) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ReaderError::Config(format!("无效的服务器地址: {}", base_url)));
        }

        Ok(Self {
            base_url,
            data_dir,
            ..Self::default()
        })
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_DB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(base_url: Option<&str>, data_dir: Option<&str>) -> CliArgs {
        CliArgs {
            base_url: base_url.map(String::from),
            data_dir: data_dir.map(PathBuf::from),
            username: None,
            password: None,
            command: Command::DarkMode,
        }
    }

    #[test]
    fn test_defaults() {
        let config = ReaderConfig::from_args(&make_args(None, Some("/tmp/reader"))).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.bookmark_debounce, Duration::from_millis(1000));
        assert_eq!(config.page_size, 10);
        assert_eq!(config.preferences_path(), PathBuf::from("/tmp/reader/preferences.db"));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let config =
            ReaderConfig::from_args(&make_args(Some("https://books.example/"), Some("."))).unwrap();
        assert_eq!(config.base_url, "https://books.example");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ReaderConfig::from_args(&make_args(Some("ftp://books"), Some(".")));
        assert!(matches!(result, Err(ReaderError::Config(_))));
    }

    #[test]
    fn test_parse_subcommand() {
        let args = CliArgs::parse_from(["library-reader", "font", "-4"]);
        assert_eq!(args.command, Command::Font { delta: -4 });

        let args = CliArgs::parse_from(["library-reader", "read", "book.epub", "--chapter", "3"]);
        assert_eq!(
            args.command,
            Command::Read {
                filename: "book.epub".to_string(),
                chapter: Some(3)
            }
        );

        let args = CliArgs::parse_from(["library-reader", "bookmark", "book.epub"]);
        assert_eq!(
            args.command,
            Command::Bookmark {
                filename: "book.epub".to_string()
            }
        );
    }
}
