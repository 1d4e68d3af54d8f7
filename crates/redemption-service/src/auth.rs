//! 调用者身份
//!
//! 令牌签发与校验由上游网关负责，网关通过请求头把已认证的用户身份传给本服务：
//!
//! - `x-user-id`: 用户 ID（必填）
//! - `x-user-role`: 值为 `admin` 时拥有后台管理权限

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::RedemptionError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

const ADMIN_ROLE: &str = "admin";

/// 当前调用者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub is_admin: bool,
}

impl Caller {
    /// 后台接口要求管理员身份
    pub fn require_admin(&self) -> Result<(), RedemptionError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(RedemptionError::Forbidden)
        }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = RedemptionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RedemptionError::Unauthorized(format!("缺少 {} 请求头", USER_ID_HEADER)))?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE));

        Ok(Caller {
            user_id: user_id.to_string(),
            is_admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<Caller, RedemptionError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_user_and_role() {
        let caller = extract(
            Request::builder()
                .header(USER_ID_HEADER, "u1")
                .header(USER_ROLE_HEADER, "Admin"),
        )
        .await
        .unwrap();

        assert_eq!(caller.user_id, "u1");
        assert!(caller.is_admin);
        assert!(caller.require_admin().is_ok());
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        assert!(matches!(
            extract(Request::builder()).await,
            Err(RedemptionError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(Request::builder().header(USER_ID_HEADER, "  ")).await,
            Err(RedemptionError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_regular_user_is_not_admin() {
        let caller = extract(Request::builder().header(USER_ID_HEADER, "u1"))
            .await
            .unwrap();
        assert!(matches!(
            caller.require_admin(),
            Err(RedemptionError::Forbidden)
        ));
    }
}
