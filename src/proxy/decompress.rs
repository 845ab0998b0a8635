//! # 预览内容解码
//!
//! 仅服务于预览解析（用量提取），不影响透传给客户端的原始字节。
//! 任何解码失败都回退为原始字节，绝不产生对客户端可见的错误。

use std::io::Read;

use axum::http::{header, HeaderMap};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() > 2 && bytes[..2] == GZIP_MAGIC
}

fn is_zlib(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x78 && matches!(bytes[1], 0x01 | 0x9c | 0xda)
}

fn is_zstd(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == ZSTD_MAGIC
}

fn gunzip(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

fn inflate_zlib(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

fn unzstd(bytes: &[u8]) -> Option<Vec<u8>> {
    zstd::stream::decode_all(bytes).ok()
}

fn unbrotli(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = brotli_decompressor::Decompressor::new(bytes, 4096);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

/// 依 `Content-Encoding` 解码；标头缺失或不识别时按 magic bytes 猜测，
/// 猜不中或解码失败则原样返回
#[must_use]
pub fn decompress_preview(raw: &[u8], headers: &HeaderMap) -> Vec<u8> {
    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            // 多重编码取第一个
            v.split(',').next().unwrap_or("").trim().to_ascii_lowercase()
        })
        .unwrap_or_default();

    let decoded = match encoding.as_str() {
        "gzip" => gunzip(raw),
        "deflate" => inflate_zlib(raw),
        "zstd" => unzstd(raw),
        "br" => unbrotli(raw),
        _ => {
            if is_gzip(raw) {
                gunzip(raw)
            } else if is_zlib(raw) {
                inflate_zlib(raw)
            } else if is_zstd(raw) {
                unzstd(raw)
            } else {
                None
            }
        }
    };

    decoded.unwrap_or_else(|| raw.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip_bytes(input: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn decodes_by_header() {
        let body = gzip_bytes(b"{\"ok\":true}");
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
        assert_eq!(decompress_preview(&body, &headers), b"{\"ok\":true}");
    }

    #[test]
    fn sniffs_gzip_magic_without_header() {
        let body = gzip_bytes(b"hello stream");
        let headers = HeaderMap::new();
        assert_eq!(decompress_preview(&body, &headers), b"hello stream");
    }

    #[test]
    fn zstd_round_trip() {
        let body = zstd::stream::encode_all(&b"usage preview"[..], 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, "zstd".parse().unwrap());
        assert_eq!(decompress_preview(&body, &headers), b"usage preview");
    }

    #[test]
    fn broken_payload_falls_back_to_raw() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
        let garbage = b"\x1f\x8bnot really gzip";
        assert_eq!(decompress_preview(garbage, &headers), garbage.to_vec());
    }

    #[test]
    fn plain_text_passes_through() {
        let headers = HeaderMap::new();
        assert_eq!(decompress_preview(b"plain", &headers), b"plain");
    }
}
