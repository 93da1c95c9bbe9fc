use std::time::Duration;

use super::session::Session;
use super::types::Bookmark;

/// 书签同步器
///
/// 将连续的滚动/导航事件合并为每个去抖周期至多一次保存：
/// 没有待保存任务时安排一次，触发时按当时的会话状态计算书签，然后清除标记
pub struct BookmarkSync {
    delay: Duration,
    pending: bool,
    last_sent: Option<Bookmark>,
}

impl BookmarkSync {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: false,
            last_sent: None,
        }
    }

    /// 记录一次保存请求
    ///
    /// # 返回
    /// 新安排了定时器时返回延迟；已有待保存任务时返回 None
    pub fn request_save(&mut self) -> Option<Duration> {
        if self.pending {
            return None;
        }
        self.pending = true;
        Some(self.delay)
    }

    /// 定时器到期，生成要发送的书签
    pub fn fire(&mut self, session: &Session) -> Option<Bookmark> {
        if !self.pending {
            return None;
        }
        self.pending = false;

        if !session.has_metadata() {
            return None;
        }

        let bookmark = Bookmark {
            chapter_index: session.current_index(),
            position: session.scroll().bookmark_fraction(),
        };
        self.last_sent = Some(bookmark);
        Some(bookmark)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn last_sent(&self) -> Option<Bookmark> {
        self.last_sent
    }
}
