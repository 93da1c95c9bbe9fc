// 流式阅读器
//
// 数据流 -> 接收器 -> 会话 -> 控制器 -> 效果 -> 宿主界面

pub mod bookmark;
pub mod controller;
pub mod ingestor;
pub mod renderer;
pub mod runtime;
pub mod selection;
pub mod session;
pub mod text_index;
pub mod types;

pub use controller::{Effect, ReaderController, ReaderEvent};
pub use ingestor::{IngestEvent, StreamIngestor};
pub use runtime::{ReaderRuntime, ReaderView, RuntimeMessage};
pub use session::{ScrollState, Session};
pub use types::{Book, Bookmark, Chapter, StreamRecord};
