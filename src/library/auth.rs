use log::info;

use crate::api::{LibraryClient, LoginResponse};
use crate::error::{ReaderError, Result};

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    User,
    Admin,
}

impl Role {
    pub fn parse(role: &str) -> Self {
        if role.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

/// 当前访问者的权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub authenticated: bool,
    pub role: Role,
}

impl Viewer {
    pub fn guest() -> Self {
        Self {
            authenticated: false,
            role: Role::Guest,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.authenticated && self.role == Role::Admin
    }
}

/// 登录状态
///
/// Cookie 由 HTTP 客户端保存，这里只记录用户信息和登录框中的错误提示
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    user: Option<LoginResponse>,
    error: Option<String>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    /// 登录框中显示的错误
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn viewer(&self) -> Viewer {
        match &self.user {
            Some(user) => Viewer {
                authenticated: true,
                role: Role::parse(&user.role),
            },
            None => Viewer::guest(),
        }
    }

    /// 登录；服务器拒绝时把错误信息保存在登录框中
    pub async fn login(&mut self, client: &LibraryClient, username: &str, password: &str, remember: bool) -> Result<()> {
        self.error = None;
        if username.trim().is_empty() || password.is_empty() {
            let message = "Username and password are required".to_string();
            self.error = Some(message.clone());
            return Err(ReaderError::InvalidInput(message));
        }

        match client.login(username.trim(), password, remember).await {
            Ok(user) => {
                info!("已登录: {} ({})", user.username, user.role);
                self.user = Some(user);
                Ok(())
            }
            Err(e) => {
                self.error = Some(match &e {
                    ReaderError::Status { message, .. } => message.clone(),
                    other => other.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn logout(&mut self, client: &LibraryClient) -> Result<()> {
        client.logout().await?;
        self.user = None;
        self.error = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_server::{Reply, TestServer};

    #[tokio::test]
    async fn test_login_success_sets_viewer() {
        let server = TestServer::start(vec![
            (
                "POST",
                "/auth/login",
                Reply::Json(200, r#"{"success":true,"username":"ada","role":"admin"}"#.to_string()),
            ),
            ("GET", "/auth/logout", Reply::Json(200, "{}".to_string())),
        ])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();
        let mut auth = AuthSession::new();

        auth.login(&client, "ada", "secret", true).await.unwrap();
        assert_eq!(auth.username(), Some("ada"));
        assert!(auth.viewer().is_admin());
        assert!(server.requests()[0].body_text().contains("remember=on"));

        auth.logout(&client).await.unwrap();
        assert_eq!(auth.viewer(), Viewer::guest());
    }

    #[tokio::test]
    async fn test_login_failure_shown_inline() {
        let server = TestServer::start(vec![(
            "POST",
            "/auth/login",
            Reply::Json(401, r#"{"error":"Invalid username or password"}"#.to_string()),
        )])
        .await;
        let client = LibraryClient::new(&server.base_url).unwrap();
        let mut auth = AuthSession::new();

        assert!(auth.login(&client, "ada", "wrong", false).await.is_err());
        assert_eq!(auth.error(), Some("Invalid username or password"));
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected_locally() {
        let client = LibraryClient::new("http://127.0.0.1:9").unwrap();
        let mut auth = AuthSession::new();
        let err = auth.login(&client, " ", "x", false).await.unwrap_err();
        assert!(matches!(err, ReaderError::InvalidInput(_)));
        assert!(auth.error().is_some());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("Admin"), Role::Admin);
        assert_eq!(Role::parse("reader"), Role::User);
    }
}
