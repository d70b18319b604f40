use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub redis_url: String,
    pub jwt_secret: String,
    pub cache_enabled: bool,
    pub repository_url: Option<String>,
    pub repository_anon_key: Option<String>,
    pub repository_service_key: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
}

/// 把"30s"/"5m"/"2h"/"1d"这类带单位的时长解析成秒
/// 纯数字按秒处理
fn parse_duration_secs(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();

    // 数字前缀与单位后缀在首个非数字字符处分开
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, suffix) = raw.split_at(split);

    let value = digits
        .parse::<u64>()
        .map_err(|_| format!("时长数值不正确: {:?}", raw))?;

    let scale = match suffix {
        "" | "s" | "S" => 1,
        "m" | "M" => 60,
        "h" | "H" => 3600,
        "d" | "D" => 86400,
        _ => return Err(format!("不认识的时长单位: {:?}", suffix)),
    };

    Ok(value * scale)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        // 缓存开关：只有字面量"false"才关闭缓存读写
        let cache_enabled = env::var("CACHE_ENABLED")
            .map(|v| v != "false")
            .unwrap_or(true);

        // 解析速率限制窗口时间
        let rate_limit_window_secs = match env::var("RATE_LIMIT_WINDOW") {
            Ok(val) => parse_duration_secs(&val).unwrap_or(60), // 默认60秒
            Err(_) => 60,
        };

        Config {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "your-secret-key".to_string()),
            cache_enabled,
            repository_url: env::var("REPOSITORY_URL").ok(),
            repository_anon_key: env::var("REPOSITORY_ANON_KEY").ok(),
            repository_service_key: env::var("REPOSITORY_SERVICE_KEY").ok(),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
            rate_limit_window_secs,
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// 服务监听地址
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_secs() {
        assert_eq!(parse_duration_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_secs("2h").unwrap(), 7200);
        assert_eq!(parse_duration_secs("1d").unwrap(), 86400);
        assert_eq!(parse_duration_secs("45").unwrap(), 45);
        assert_eq!(parse_duration_secs(" 90s ").unwrap(), 90);
        assert!(parse_duration_secs("").is_err());
        assert!(parse_duration_secs("3w").is_err());
        assert!(parse_duration_secs("10ms").is_err());
        assert!(parse_duration_secs("s").is_err());
    }
}
