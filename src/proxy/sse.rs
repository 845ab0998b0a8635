//! # SSE 统一解析
//!
//! 从 event-stream 文本还原 `{id, object, created, model, content, usage}`。
//! 兼容两种方言：Chat Completions 的无名 `data:` 帧（`data: [DONE]` 终止），
//! 与 Responses API 的 `event: <name>` + `data:` 事件块。
//! 解析器是一次性的纯函数：透传侧先把侧录缓冲收完，EOF 后调用一次。

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::codec::Decoder;

use super::decompress::decompress_preview;
use axum::http::HeaderMap;

/// 预览内容截断上限（Unicode code point）
pub const PREVIEW_MAX_RUNES: usize = 4000;

/// 五个独立计数器，同时覆盖 prompt/completion 与 input/output 两种口径
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseUsage {
    #[serde(skip_serializing_if = "is_zero")]
    pub prompt_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub completion_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub input_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_tokens: u64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// 合并规则：后到的字段仅在非零时覆盖先前值
#[must_use]
pub fn merge_usage(dst: Option<SseUsage>, src: &SseUsage) -> Option<SseUsage> {
    let mut merged = dst.unwrap_or_default();
    if src.prompt_tokens != 0 {
        merged.prompt_tokens = src.prompt_tokens;
    }
    if src.completion_tokens != 0 {
        merged.completion_tokens = src.completion_tokens;
    }
    if src.input_tokens != 0 {
        merged.input_tokens = src.input_tokens;
    }
    if src.output_tokens != 0 {
        merged.output_tokens = src.output_tokens;
    }
    if src.total_tokens != 0 {
        merged.total_tokens = src.total_tokens;
    }
    Some(merged)
}

/// 统一解析结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct SseParseResult {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<SseUsage>,
}

impl SseParseResult {
    /// 预览是否完全为空（用于非流式回退处理）
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.model.is_empty() && self.content.is_empty()
            && self.usage.is_none()
    }
}

// ---------- 帧层 ----------

/// 一个完整的 SSE 事件块：事件名（可缺省）与合并后的 data 文本
#[derive(Debug, Clone, Default)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// 行级帧解码器。多行 `data:` 以 `\n` 合并；空行结束事件块；
/// 容错：`event:` 行出现在未闭合的 data 之后时先冲出前一块。
#[derive(Debug, Default)]
pub struct SseFrameCodec {
    event: Option<String>,
    data: String,
    has_any: bool,
}

impl SseFrameCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn flush(&mut self) -> Option<SseFrame> {
        if !self.has_any {
            return None;
        }
        let frame = SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data),
        };
        self.has_any = false;
        Some(frame)
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.flush();
        }
        // 注释行
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let mut v = &line[idx + 1..];
                if let Some(stripped) = v.strip_prefix(' ') {
                    v = stripped;
                }
                (&line[..idx], v)
            }
            None => (line, ""),
        };

        match field {
            "data" => {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_any = true;
                None
            }
            "event" => {
                let pending = if self.data.is_empty() {
                    None
                } else {
                    self.flush()
                };
                self.event = Some(value.to_string());
                self.has_any = true;
                pending
            }
            // id / retry 对预览无用
            _ => None,
        }
    }

    fn take_one_line(src: &mut BytesMut) -> io::Result<Option<String>> {
        let Some(pos) = src.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let mut line_bytes = src.split_to(pos + 1);
        if line_bytes.ends_with(b"\n") {
            line_bytes.truncate(line_bytes.len() - 1);
        }
        if line_bytes.ends_with(b"\r") {
            line_bytes.truncate(line_bytes.len() - 1);
        }
        String::from_utf8(line_bytes.to_vec())
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Decoder for SseFrameCodec {
    type Item = SseFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        while let Some(line) = Self::take_one_line(src)? {
            if let Some(frame) = self.process_line(&line) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        if !src.is_empty() {
            let mut last = String::from_utf8(src.split_to(src.len()).to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if last.ends_with('\n') {
                last.pop();
            }
            if last.ends_with('\r') {
                last.pop();
            }
            if let Some(frame) = self.process_line(&last) {
                return Ok(Some(frame));
            }
        }
        Ok(self.flush())
    }
}

// ---------- 方言层 ----------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatChunk {
    id: String,
    object: String,
    created: i64,
    model: String,
    choices: Vec<ChunkChoice>,
    usage: Option<SseUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OutputTextDelta {
    delta: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OutputTextDone {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseCompleted {
    response: ResponseChunk,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseChunk {
    id: String,
    object: String,
    created: i64,
    created_at: i64,
    model: String,
    usage: Option<SseUsage>,
}

struct ParseState {
    result: SseParseResult,
    content: String,
    usage: Option<SseUsage>,
    seen_meta: bool,
    done: bool,
}

impl ParseState {
    fn new() -> Self {
        Self {
            result: SseParseResult::default(),
            content: String::new(),
            usage: None,
            seen_meta: false,
            done: false,
        }
    }

    fn dispatch(&mut self, frame: &SseFrame) {
        let data = frame.data.trim();
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        match frame.event.as_deref() {
            // 无 event → Chat Completions 方言
            None => {
                let Ok(chunk) = serde_json::from_str::<ChatChunk>(data) else {
                    return;
                };
                if !self.seen_meta && (!chunk.id.is_empty() || !chunk.model.is_empty()) {
                    self.result.id = chunk.id;
                    self.result.object = chunk.object;
                    self.result.created = chunk.created;
                    self.result.model = chunk.model;
                    self.seen_meta = true;
                }
                for choice in &chunk.choices {
                    if let Some(content) = &choice.delta.content {
                        self.content.push_str(content);
                    }
                }
                if let Some(usage) = &chunk.usage {
                    self.usage = merge_usage(self.usage, usage);
                }
            }
            Some("response.output_text.delta") => {
                if let Ok(delta) = serde_json::from_str::<OutputTextDelta>(data) {
                    self.content.push_str(&delta.delta);
                }
            }
            Some("response.output_text.done") => {
                // 仅在前面没累积到增量时采用 done 里的完整文本
                if self.content.is_empty() {
                    if let Ok(done) = serde_json::from_str::<OutputTextDone>(data) {
                        self.content.push_str(&done.text);
                    }
                }
            }
            Some("response.completed") => {
                let Ok(completed) = serde_json::from_str::<ResponseCompleted>(data) else {
                    return;
                };
                let response = completed.response;
                if !self.seen_meta && (!response.id.is_empty() || !response.model.is_empty()) {
                    self.result.id = response.id;
                    self.result.object = response.object;
                    self.result.created = if response.created_at != 0 {
                        response.created_at
                    } else {
                        response.created
                    };
                    self.result.model = response.model;
                    self.seen_meta = true;
                }
                if let Some(usage) = &response.usage {
                    self.usage = merge_usage(self.usage, usage);
                }
            }
            Some(_) => {}
        }
    }

    fn finish(mut self) -> SseParseResult {
        self.result.content = self.content;
        self.result.usage = self.usage;
        self.result
    }
}

/// 对完整的 event-stream 文本做一次性解析
#[must_use]
pub fn parse_sse_unified(raw: &str) -> SseParseResult {
    let mut codec = SseFrameCodec::new();
    let mut buffer = BytesMut::from(raw.as_bytes());
    let mut state = ParseState::new();

    while !state.done {
        match codec.decode(&mut buffer) {
            Ok(Some(frame)) => state.dispatch(&frame),
            Ok(None) => break,
            Err(_) => return state.finish(),
        }
    }
    while !state.done {
        match codec.decode_eof(&mut buffer) {
            Ok(Some(frame)) => state.dispatch(&frame),
            _ => break,
        }
    }

    state.finish()
}

/// 截断前 n 个 code point，避免切坏 UTF-8；截断时追加省略号
#[must_use]
pub fn safe_truncate_runes(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    match s.char_indices().nth(n) {
        Some((idx, _)) => {
            let mut truncated = s[..idx].to_string();
            truncated.push('…');
            truncated
        }
        None => s.to_string(),
    }
}

/// 预览管线：解码（必要时解压）→ 解析 → 截断
#[must_use]
pub fn body_preview(raw: &[u8], headers: &HeaderMap) -> SseParseResult {
    let decoded = decompress_preview(raw, headers);
    let text = String::from_utf8_lossy(&decoded);
    let mut result = parse_sse_unified(&text);
    result.content = safe_truncate_runes(&result.content, PREVIEW_MAX_RUNES);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_dialect_accumulates_deltas() {
        let raw = concat!(
            "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"created\":100,",
            "\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
            "data: [DONE]\n"
        );
        let result = parse_sse_unified(raw);
        assert_eq!(result.content, "AB");
        assert_eq!(result.id, "c1");
        assert_eq!(result.model, "m");
        assert!(result.usage.is_none());
    }

    #[test]
    fn responses_dialect_with_usage() {
        let raw = concat!(
            "event: response.output_text.delta\n",
            "data: {\"delta\":\"A\"}\n\n",
            "event: response.output_text.delta\n",
            "data: {\"delta\":\"B\"}\n\n",
            "event: response.completed\n",
            "data: {\"response\":{\"id\":\"r1\",\"object\":\"response\",\"created_at\":200,",
            "\"model\":\"m2\",\"usage\":{\"total_tokens\":7}}}\n\n"
        );
        let result = parse_sse_unified(raw);
        assert_eq!(result.content, "AB");
        assert_eq!(result.model, "m2");
        assert_eq!(result.created, 200);
        assert_eq!(result.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn output_text_done_is_fallback_only() {
        let raw = concat!(
            "event: response.output_text.done\n",
            "data: {\"text\":\"full text\"}\n\n"
        );
        assert_eq!(parse_sse_unified(raw).content, "full text");

        let raw_with_delta = concat!(
            "event: response.output_text.delta\n",
            "data: {\"delta\":\"partial\"}\n\n",
            "event: response.output_text.done\n",
            "data: {\"text\":\"full text\"}\n\n"
        );
        assert_eq!(parse_sse_unified(raw_with_delta).content, "partial");
    }

    #[test]
    fn usage_in_final_chat_frame() {
        let raw = concat!(
            "data: {\"id\":\"c2\",\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":5,",
            "\"total_tokens\":8}}\n\n",
            "data: [DONE]\n"
        );
        let usage = parse_sse_unified(raw).usage.unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 8);
    }

    #[test]
    fn merge_prefers_non_zero_fields() {
        let first = SseUsage {
            prompt_tokens: 3,
            total_tokens: 8,
            ..SseUsage::default()
        };
        let second = SseUsage {
            completion_tokens: 5,
            total_tokens: 0,
            ..SseUsage::default()
        };
        let merged = merge_usage(merge_usage(None, &first), &second).unwrap();
        assert_eq!(merged.prompt_tokens, 3);
        assert_eq!(merged.completion_tokens, 5);
        assert_eq!(merged.total_tokens, 8);
    }

    #[test]
    fn multiline_data_joined_before_parse() {
        let raw = concat!(
            "data: {\"id\":\"c3\",\"model\":\"m\",\n",
            "data: \"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n"
        );
        let result = parse_sse_unified(raw);
        assert_eq!(result.content, "hi");
    }

    #[test]
    fn truncation_is_codepoint_safe() {
        let content = "號".repeat(4100);
        let truncated = safe_truncate_runes(&content, PREVIEW_MAX_RUNES);
        assert_eq!(truncated.chars().count(), PREVIEW_MAX_RUNES + 1);
        assert!(truncated.ends_with('…'));
        assert_eq!(safe_truncate_runes("short", PREVIEW_MAX_RUNES), "short");
    }

    #[test]
    fn plain_json_body_parses_as_empty_stream() {
        let result = parse_sse_unified("{\"not\":\"sse\"}");
        assert!(result.is_empty());
    }
}
