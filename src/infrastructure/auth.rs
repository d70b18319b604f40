use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Bearer令牌中的声明
/// 身份由外部签发，核心只校验不铸造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户ID
    pub sub: String,
    /// 过期时间
    pub exp: i64,
    /// 签发时间
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// 令牌校验器，只做校验，签发在身份提供方
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
        }
    }

    /// 校验Bearer令牌并返回声明
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

/// 从请求中提取Bearer令牌
/// 顺序：Authorization头 -> token查询参数
pub fn extract_bearer(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let header_token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    match header_token {
        Some(t) => Some(t.to_string()),
        None => query_token.map(|t| t.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    /// 测试用签发：生产侧只校验，铸造留给身份提供方
    fn mint(secret: &str, user_id: &str, ttl_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + ttl_secs,
            iat: now,
            full_name: None,
            age: None,
            date_of_birth: None,
            roles: None,
            permissions: None,
            family_ids: None,
            parent_id: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_roundtrip() {
        let verifier = TokenVerifier::new("test-secret");
        let claims = verifier.verify(&mint("test-secret", "u1", 3600)).unwrap();
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let verifier = TokenVerifier::new("other-secret");
        assert!(verifier.verify(&mint("test-secret", "u1", 3600)).is_err());
    }

    #[test]
    fn test_verify_rejects_expired() {
        let verifier = TokenVerifier::new("test-secret");
        assert!(verifier.verify(&mint("test-secret", "u1", -3600)).is_err());
    }

    #[test]
    fn test_extract_bearer_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(
            extract_bearer(&headers, Some("def")),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_bearer(&HeaderMap::new(), Some("def")),
            Some("def".to_string())
        );
        assert_eq!(extract_bearer(&HeaderMap::new(), None), None);
    }
}
