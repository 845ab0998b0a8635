//! # Scope 规则
//!
//! scope 即「允许访问的路径形态」，三种：`*` 通配、精确路径、
//! 前缀通配 `/xxx/*`（同时放行 `/xxx` 本身与其任意子路径）。

use crate::types::{SCOPE_ALL, SCOPE_MCP_SERVER};

/// 规范化路径：折叠重复斜线、解析 `.` 与 `..`，保证前导 `/`
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut cleaned = String::from("/");
    cleaned.push_str(&segments.join("/"));
    cleaned
}

/// 规范化 scope：`*` 保持原样，其余按路径清洗
#[must_use]
pub fn normalize_scope(scope: &str) -> String {
    if scope == SCOPE_ALL {
        return scope.to_string();
    }
    clean_path(scope)
}

/// 单条 scope 匹配：
/// 1. `*` 全放行
/// 2. 完全相等
/// 3. 前缀通配 `/xxx/*` 放行 `/xxx` 与 `/xxx/...`
#[must_use]
pub fn scope_match(allow: &str, required: &str) -> bool {
    if allow == SCOPE_ALL {
        return true;
    }
    if allow == required {
        return true;
    }
    if let Some(base) = allow.strip_suffix("/*") {
        return required == base || required.starts_with(&format!("{base}/"));
    }
    false
}

/// 授权列表中任意一条命中即放行
#[must_use]
pub fn is_scope_allowed(allowed: &[String], required: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    let required = normalize_scope(required);
    allowed
        .iter()
        .any(|allow| scope_match(&normalize_scope(allow), &required))
}

/// 由请求路径推导所需 scope：
/// - `/mcp-server/...` 整棵子树共用 `/mcp-server/*`
/// - `/proxy/<version>/<provider>/<rest>` 需要字面后缀 `/<rest>`
/// - 其余路径保守地要求 `*`
#[must_use]
pub fn required_scope_from_path(url_path: &str) -> String {
    let cleaned = clean_path(url_path);

    if cleaned.starts_with("/mcp-server/") {
        return SCOPE_MCP_SERVER.to_string();
    }

    if cleaned.starts_with("/proxy/") {
        // 形如 /proxy/v1/openai/chat/completions，剥去前三段取剩余路径
        let parts: Vec<&str> = cleaned.split('/').collect();
        if parts.len() >= 5 {
            return format!("/{}", parts[4..].join("/"));
        }
    }

    SCOPE_ALL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_accepts_everything() {
        assert!(scope_match("*", "/chat/completions"));
        assert!(scope_match("*", "/anything"));
    }

    #[test]
    fn prefix_wildcard_law() {
        assert!(scope_match("/a/*", "/a"));
        assert!(scope_match("/a/*", "/a/b"));
        assert!(!scope_match("/a/*", "/ab"));
    }

    #[test]
    fn exact_match_law() {
        assert!(scope_match("/a", "/a"));
        assert!(!scope_match("/a", "/b"));
    }

    #[test]
    fn allowed_list_requires_any_hit() {
        let scopes = vec!["/chat/completions".to_string()];
        assert!(is_scope_allowed(&scopes, "/chat/completions"));
        assert!(!is_scope_allowed(&scopes, "/images/generations"));
        assert!(!is_scope_allowed(&[], "/chat/completions"));
    }

    #[test]
    fn required_scope_derivation() {
        assert_eq!(
            required_scope_from_path("/mcp-server/v1/openai/chat/completions"),
            "/mcp-server/*"
        );
        assert_eq!(
            required_scope_from_path("/proxy/v1/openai/chat/completions"),
            "/chat/completions"
        );
        assert_eq!(
            required_scope_from_path("/proxy/v1/openai/images/generations"),
            "/images/generations"
        );
        assert_eq!(required_scope_from_path("/health/liveness"), "*");
    }

    #[test]
    fn normalization_strips_duplicate_slashes() {
        assert_eq!(normalize_scope("//chat//completions"), "/chat/completions");
        assert_eq!(normalize_scope("chat/completions"), "/chat/completions");
        assert_eq!(normalize_scope("*"), "*");
    }
}
