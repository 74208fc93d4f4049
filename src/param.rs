// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了 `microserver` 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 状态码及其原因短语（Reason Phrase）。
//! - 文件后缀到 MIME 类型的映射表。
//! - HTTP 方法与连接状态的强类型枚举。
//!
//! 所有查找表只在首次访问时构建一次，运行期间不再修改。

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use lazy_static::lazy_static;

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// 始终被收集的请求头，Basic 认证依赖它
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// 未指定时使用的响应 `Content-Type`
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// multipart 字段未声明类型时使用的 MIME 类型
pub const DEFAULT_PART_TYPE: &str = "text/plain";

/// 无法识别后缀时使用的 MIME 类型
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// `.gz` 文件对应的 MIME 类型
pub const GZIP_MIME: &str = "application/x-gzip";

/// 目录请求以 `/` 结尾时追加的默认文件名
pub const INDEX_FILE: &str = "index.htm";

// 可通过配置覆盖的默认值
pub const HTTP_MAX_DATA_WAIT: u64 = 5000;
pub const HTTP_MAX_POST_WAIT: u64 = 5000;
pub const HTTP_MAX_SEND_WAIT: u64 = 5000;
pub const HTTP_MAX_CLOSE_WAIT: u64 = 2000;
pub const HTTP_READ_TIMEOUT: u64 = 1000;
pub const HTTP_UPLOAD_BUFLEN: usize = 2048;
pub const HTTP_DOWNLOAD_UNIT_SIZE: usize = 1460;
pub const MAX_POST_ARGS: usize = 32;

lazy_static! {
    /// 状态码与原因短语映射表，未收录的状态码对应空字符串。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");

        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(203, "Non-Authoritative Information");
        map.insert(204, "No Content");
        map.insert(205, "Reset Content");
        map.insert(206, "Partial Content");

        map.insert(300, "Multiple Choices");
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(305, "Use Proxy");
        map.insert(307, "Temporary Redirect");

        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(402, "Payment Required");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(407, "Proxy Authentication Required");
        map.insert(408, "Request Time-out");
        map.insert(409, "Conflict");
        map.insert(410, "Gone");
        map.insert(411, "Length Required");
        map.insert(412, "Precondition Failed");
        map.insert(413, "Request Entity Too Large");
        map.insert(414, "Request-URI Too Large");
        map.insert(415, "Unsupported Media Type");
        map.insert(416, "Requested range not satisfiable");
        map.insert(417, "Expectation Failed");

        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Time-out");
        map.insert(505, "HTTP Version not supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表，供静态文件处理器设置 `Content-Type`。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("html", "text/html");
        map.insert("htm", "text/html");
        map.insert("css", "text/css");
        map.insert("txt", "text/plain");
        map.insert("js", "application/javascript");
        map.insert("json", "application/json");
        map.insert("png", "image/png");
        map.insert("gif", "image/gif");
        map.insert("jpg", "image/jpeg");
        map.insert("ico", "image/x-icon");
        map.insert("svg", "image/svg+xml");
        map.insert("ttf", "application/x-font-ttf");
        map.insert("otf", "application/x-font-opentype");
        map.insert("woff", "application/font-woff");
        map.insert("woff2", "application/font-woff2");
        map.insert("eot", "application/vnd.ms-fontobject");
        map.insert("sfnt", "application/font-sfnt");
        map.insert("xml", "text/xml");
        map.insert("pdf", "application/pdf");
        map.insert("zip", "application/zip");
        map.insert("gz", GZIP_MIME);
        map.insert("appcache", "text/cache-manifest");
        map
    };
}

/// 查询状态码对应的原因短语。
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("")
}

/// 根据路径后缀推断 MIME 类型。
pub fn content_type_for(path: &str) -> &'static str {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| MIME_TYPES.get(ext).copied())
        .unwrap_or(FALLBACK_MIME)
}

/// 标准 HTTP 请求方法
///
/// `Any` 只用于注册处理器，表示不限制方法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Any,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    /// 按大小写敏感的方式匹配请求行中的方法名，无法识别时返回 `None`。
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(HttpMethod::Get),
            "HEAD" => Some(HttpMethod::Head),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// 该方法的请求是否可能携带请求体
    pub fn has_body(&self) -> bool {
        matches!(
            self,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete
        )
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpMethod::Any => write!(f, "ANY"),
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Head => write!(f, "HEAD"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Options => write!(f, "OPTIONS"),
        }
    }
}

/// 当前连接所处的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// 空闲，等待新的连接
    None,
    /// 已接受连接，等待请求数据
    WaitRead,
    /// 响应已发送，等待客户端关闭
    WaitClose,
}
