use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db;
use crate::error::Result;

pub const MIN_FONT_SIZE: u32 = 12;
pub const MAX_FONT_SIZE: u32 = 24;
pub const DEFAULT_FONT_SIZE: u32 = 16;

const FONT_SIZE_KEY: &str = "readerFontSize";
const DARK_MODE_KEY: &str = "darkMode";

/// 将字号限制在允许范围内
pub fn clamp_font_size(size: i64) -> u32 {
    size.clamp(MIN_FONT_SIZE as i64, MAX_FONT_SIZE as i64) as u32
}

/// 本地键值存储
///
/// 对应浏览器中的 localStorage，与具体书籍无关
pub struct PreferenceStore {
    conn: Connection,
}

impl PreferenceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            conn: db::init_db(path)?,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: db::init_memory_db()?,
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![key, value],
        )?;
        Ok(())
    }
}

/// 阅读偏好：字号与夜间模式
pub struct Preferences {
    store: PreferenceStore,
    font_size: u32,
    dark_mode: bool,
}

impl Preferences {
    /// 从存储中加载偏好，缺失或无法解析的值使用默认值
    pub fn load(store: PreferenceStore) -> Result<Self> {
        let font_size = store
            .get(FONT_SIZE_KEY)?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
            .map(clamp_font_size)
            .unwrap_or(DEFAULT_FONT_SIZE);

        let dark_mode = store.get(DARK_MODE_KEY)?.as_deref() == Some("enabled");

        Ok(Self {
            store,
            font_size,
            dark_mode,
        })
    }

    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    /// 调整字号并持久化，返回调整后的字号
    pub fn adjust_font_size(&mut self, delta: i32) -> Result<u32> {
        self.set_font_size(self.font_size as i64 + delta as i64)
    }

    pub fn set_font_size(&mut self, size: i64) -> Result<u32> {
        self.font_size = clamp_font_size(size);
        self.store
            .set(FONT_SIZE_KEY, &self.font_size.to_string())?;
        Ok(self.font_size)
    }

    /// 切换夜间模式并持久化，返回切换后的状态
    pub fn toggle_dark_mode(&mut self) -> Result<bool> {
        self.dark_mode = !self.dark_mode;
        let value = if self.dark_mode { "enabled" } else { "disabled" };
        self.store.set(DARK_MODE_KEY, value)?;
        Ok(self.dark_mode)
    }

    /// 夜间模式按钮图标
    pub fn dark_mode_icon(&self) -> &'static str {
        if self.dark_mode {
            "fa-circle"
        } else {
            "fa-moon"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_on_empty_store() {
        let prefs = Preferences::load(PreferenceStore::in_memory().unwrap()).unwrap();
        assert_eq!(prefs.font_size(), DEFAULT_FONT_SIZE);
        assert!(!prefs.dark_mode());
        assert_eq!(prefs.dark_mode_icon(), "fa-moon");
    }

    #[test]
    fn test_font_size_clamps_at_max() {
        let mut prefs = Preferences::load(PreferenceStore::in_memory().unwrap()).unwrap();
        for _ in 0..7 {
            prefs.adjust_font_size(4).unwrap();
        }
        assert_eq!(prefs.font_size(), 24);
    }

    #[test]
    fn test_font_size_clamps_at_min() {
        let mut prefs = Preferences::load(PreferenceStore::in_memory().unwrap()).unwrap();
        assert_eq!(prefs.adjust_font_size(-100).unwrap(), 12);
    }

    #[test]
    fn test_garbage_font_size_falls_back() {
        let store = PreferenceStore::in_memory().unwrap();
        store.set("readerFontSize", "abc").unwrap();
        let prefs = Preferences::load(store).unwrap();
        assert_eq!(prefs.font_size(), 16);
    }

    #[test]
    fn test_persisted_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.db");

        {
            let mut prefs = Preferences::load(PreferenceStore::open(&path).unwrap()).unwrap();
            prefs.adjust_font_size(2).unwrap();
            assert!(prefs.toggle_dark_mode().unwrap());
        }

        let prefs = Preferences::load(PreferenceStore::open(&path).unwrap()).unwrap();
        assert_eq!(prefs.font_size(), 18);
        assert!(prefs.dark_mode());
        assert_eq!(prefs.dark_mode_icon(), "fa-circle");
    }

    #[test]
    fn test_toggle_writes_disabled() {
        let store = PreferenceStore::in_memory().unwrap();
        store.set("darkMode", "enabled").unwrap();
        let mut prefs = Preferences::load(store).unwrap();
        assert!(!prefs.toggle_dark_mode().unwrap());
        assert_eq!(prefs.store.get("darkMode").unwrap().as_deref(), Some("disabled"));
    }
}
