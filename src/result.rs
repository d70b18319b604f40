use serde::Serialize;

/// REST统一响应壳
/// code为0表示成功；失败时code取HTTP状态码或业务错误码，msg携带说明
#[derive(Serialize)]
pub struct ApiEnvelope<T> {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            msg: None,
            data: Some(data),
        }
    }

    pub fn fail(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shapes() {
        let ok = serde_json::to_value(ApiEnvelope::ok(vec!["fA"])).unwrap();
        assert_eq!(ok["code"], 0);
        assert_eq!(ok["data"][0], "fA");
        assert!(ok.get("msg").is_none());

        let fail = serde_json::to_value(ApiEnvelope::<()>::fail(403, "拒绝访问")).unwrap();
        assert_eq!(fail["code"], 403);
        assert_eq!(fail["msg"], "拒绝访问");
        assert!(fail.get("data").is_none());
    }
}
