//! 计数器 key 规则

use crate::types::{LimitPeriod, ProviderName};

/// 限流计数器 key：`<server-name>:<api_key_id>:<provider>:<period>`
#[must_use]
pub fn rate_limit_key(
    server_name: &str,
    api_key_id: &str,
    provider: ProviderName,
    period: LimitPeriod,
) -> String {
    format!(
        "{}:{}:{}:{}",
        server_name,
        api_key_id,
        provider.as_str(),
        period.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = rate_limit_key("gw", "abc123", ProviderName::OpenAi, LimitPeriod::Daily);
        assert_eq!(key, "gw:abc123:openai:daily");
    }
}
