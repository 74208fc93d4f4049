// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! 该模块保存当前请求解析出的全部状态，并提供与传输层无关的纯解析函数：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本）。
//! 2. 查询字符串与表单请求体的参数解析。
//! 3. 请求头的拆分与 `Content-Type` 分类。
//!
//! 参数与请求头都按出现顺序保存，允许重复键，按名称查找时返回第一个匹配项。

use lazy_static::lazy_static;
use log::{error, warn};
use regex::Regex;

use crate::{exception::Exception, param::*, util::url_decode};

/// 一个键值对，用于参数和请求头。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Argument {
    pub key: String,
    pub value: String,
}

impl Argument {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// 当前请求的元数据。
///
/// 每个请求开始解析时调用 `reset`，只有通过 `collect_headers` 预先登记的请求头会被保留，
/// `Authorization` 总是排在第一位。
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpMethod,
    uri: String,
    version: u8,
    args: Vec<Argument>,
    headers: Vec<Argument>,
    host: String,
    dropped_args: usize,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Self {
            method: HttpMethod::Any,
            uri: String::new(),
            version: 0,
            args: Vec::new(),
            headers: vec![Argument::new(AUTHORIZATION_HEADER, "")],
            host: String::new(),
            dropped_args: 0,
        }
    }

    /// 清空上一请求的状态，保留已登记的请求头名称。
    pub(crate) fn reset(&mut self) {
        self.method = HttpMethod::Any;
        self.uri.clear();
        self.version = 0;
        self.args.clear();
        self.host.clear();
        self.dropped_args = 0;
        for header in self.headers.iter_mut() {
            header.value.clear();
        }
    }

    /// 重新登记需要收集的请求头。
    pub(crate) fn collect_headers<S: AsRef<str>>(&mut self, names: &[S]) {
        self.headers.clear();
        self.headers.push(Argument::new(AUTHORIZATION_HEADER, ""));
        for name in names {
            self.add_header_key(name.as_ref());
        }
    }

    /// 追加一个需要收集的请求头，已存在时忽略。
    pub(crate) fn add_header_key(&mut self, name: &str) {
        if !self.headers.iter().any(|h| h.key.eq_ignore_ascii_case(name)) {
            self.headers.push(Argument::new(name, ""));
        }
    }

    /// 若请求头已登记则保存其值，返回是否保存。
    pub(crate) fn collect_header(&mut self, name: &str, value: &str) -> bool {
        match self
            .headers
            .iter_mut()
            .find(|h| h.key.eq_ignore_ascii_case(name))
        {
            Some(header) => {
                header.value = value.to_string();
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_line(&mut self, line: &RequestLine) {
        self.method = line.method;
        self.uri = line.uri.clone();
        self.version = line.version;
    }

    pub(crate) fn set_host(&mut self, host: &str) {
        self.host = host.to_string();
    }

    pub(crate) fn set_args(&mut self, args: Vec<Argument>) {
        self.args = args;
    }

    pub(crate) fn push_arg(&mut self, key: &str, value: &str) {
        self.args.push(Argument::new(key, value));
    }

    pub(crate) fn take_args(&mut self) -> Vec<Argument> {
        std::mem::take(&mut self.args)
    }

    pub(crate) fn add_dropped_args(&mut self, count: usize) {
        self.dropped_args += count;
    }

    pub(crate) fn clear_uri(&mut self) {
        self.uri.clear();
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// 不含查询字符串的路径
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// HTTP 次版本号，`HTTP/1.1` 对应 1
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// 因超出参数上限而被丢弃的参数个数
    pub fn dropped_args(&self) -> usize {
        self.dropped_args
    }

    /// 按名称查找参数，返回第一个匹配项的值，不存在时为空字符串。
    pub fn arg(&self, name: &str) -> &str {
        self.args
            .iter()
            .find(|a| a.key == name)
            .map(|a| a.value.as_str())
            .unwrap_or("")
    }

    pub fn arg_at(&self, index: usize) -> &str {
        self.args.get(index).map(|a| a.value.as_str()).unwrap_or("")
    }

    pub fn arg_name(&self, index: usize) -> &str {
        self.args.get(index).map(|a| a.key.as_str()).unwrap_or("")
    }

    pub fn args(&self) -> usize {
        self.args.len()
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.args.iter().any(|a| a.key == name)
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.args
    }

    /// 按名称（大小写不敏感）查找已收集的请求头。
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .unwrap_or("")
    }

    pub fn header_at(&self, index: usize) -> &str {
        self.headers.get(index).map(|h| h.value.as_str()).unwrap_or("")
    }

    pub fn header_name(&self, index: usize) -> &str {
        self.headers.get(index).map(|h| h.key.as_str()).unwrap_or("")
    }

    /// 已登记的请求头个数（含 `Authorization`）
    pub fn headers(&self) -> usize {
        self.headers.len()
    }

    /// 请求头已登记且本次请求中带有非空值
    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|h| h.key.eq_ignore_ascii_case(name) && !h.value.is_empty())
    }
}

/// 请求行的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: HttpMethod,
    pub uri: String,
    /// 未解码的查询字符串
    pub query: String,
    pub version: u8,
}

/// 解析形如 `GET /path?query HTTP/1.1` 的请求行。
///
/// 方法名大小写敏感，无法识别的方法按 GET 处理；缺少任一空格时返回
/// `Exception::MalformedRequestLine`。
pub fn parse_request_line(line: &str, id: u128) -> Result<RequestLine, Exception> {
    let (method_str, rest) = match line.split_once(' ') {
        Some(parts) => parts,
        None => {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, line);
            return Err(Exception::MalformedRequestLine);
        }
    };
    let (target, version_str) = match rest.split_once(' ') {
        Some(parts) => parts,
        None => {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, line);
            return Err(Exception::MalformedRequestLine);
        }
    };

    let method = match HttpMethod::from_token(method_str) {
        Some(m) => m,
        None => {
            warn!("[ID{}]无法识别的HTTP请求方法：{}，按GET处理", id, method_str);
            HttpMethod::Get
        }
    };

    let (uri, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.to_string(), String::new()),
    };

    Ok(RequestLine {
        method,
        uri,
        query,
        version: parse_minor_version(version_str),
    })
}

/// 取 `HTTP/1.` 之后的数字作为次版本号，无法解析时为 0。
fn parse_minor_version(version: &str) -> u8 {
    let digits: String = version
        .get(7..)
        .unwrap_or("")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// 解析 `key=value` 形式的参数串。
///
/// `&` 与 `;` 都是分隔符，空片段被跳过；每个片段以第一个 `=` 切分键值，没有 `=` 时值为空。
/// 键和值分别进行一次 URL 解码，结果保持原有顺序。
pub fn parse_arguments(data: &str) -> Vec<Argument> {
    data.split(['&', ';'])
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            if key.is_empty() {
                return None;
            }
            Some(Argument {
                key: url_decode(key),
                value: url_decode(value),
            })
        })
        .collect()
}

/// 以第一个 `:` 拆分请求头，值去掉首尾空白；没有 `:` 时返回 `None`。
pub fn split_header(line: &str) -> Option<(&str, &str)> {
    line.split_once(':')
        .map(|(name, value)| (name.trim(), value.trim()))
}

/// 请求体的解析方式，由 `Content-Type` 决定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// 整个请求体作为 `plain` 参数保存
    Plain,
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// `multipart/*`，携带去掉引号的边界字符串
    Multipart(String),
}

lazy_static! {
    static ref BOUNDARY: Regex = Regex::new(r"=(.*)$").unwrap();
}

impl BodyKind {
    pub fn from_content_type(value: &str) -> Self {
        if value.starts_with("application/x-www-form-urlencoded") {
            BodyKind::UrlEncoded
        } else if value.starts_with("multipart/") {
            let boundary = BOUNDARY
                .captures(value)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().replace('"', ""))
                .unwrap_or_default();
            BodyKind::Multipart(boundary)
        } else {
            BodyKind::Plain
        }
    }
}
