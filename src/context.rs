// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求上下文
//!
//! `Context` 持有当前连接、时钟、配置以及正在处理的请求与响应状态。
//! 处理器通过它读取参数与请求头，并调用 `send` / `send_header` / `send_content`
//! 写出响应；解析器通过它带超时地从连接读取数据。

use log::{debug, trace};

use crate::{
    config::Config,
    exception::Exception,
    fs::File,
    param::*,
    request::Request,
    response::{chunk_prefix, ContentLength, Response, LAST_CHUNK},
    transport::{Client, Clock},
    util::{basic_auth_token, format_file_size},
};

pub struct Context {
    client: Option<Box<dyn Client>>,
    clock: Box<dyn Clock>,
    config: Config,
    request: Request,
    response: Response,
    id: u128,
}

impl Context {
    pub fn new(clock: Box<dyn Clock>, config: Config) -> Self {
        let mut request = Request::new();
        request.collect_headers(config.collect_headers());
        Self {
            client: None,
            clock,
            config,
            request,
            response: Response::new(),
            id: 0,
        }
    }

    pub(crate) fn attach(&mut self, client: Box<dyn Client>, id: u128) {
        self.client = Some(client);
        self.id = id;
    }

    /// 关闭并丢弃当前连接
    pub(crate) fn detach(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.stop();
        }
    }

    pub(crate) fn has_client(&self) -> bool {
        self.client.is_some()
    }

    pub(crate) fn client_connected(&mut self) -> bool {
        self.client.as_mut().map_or(false, |c| c.connected())
    }

    pub(crate) fn client_available(&mut self) -> usize {
        self.client.as_mut().map_or(0, |c| c.available())
    }

    pub(crate) fn set_client_timeout(&mut self, timeout_ms: u64) {
        if let Some(client) = self.client.as_mut() {
            client.set_timeout(timeout_ms);
        }
    }

    pub(crate) fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub(crate) fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub(crate) fn pause(&self) {
        self.clock.pause();
    }

    pub fn millis(&self) -> u64 {
        self.clock.millis()
    }

    /// 当前连接的编号，与日志中的 `[ID…]` 一致
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}

// --- 带超时的读取 ---

impl Context {
    /// 轮询直到有数据可读、连接断开或超时，等待期间让出控制权。
    pub(crate) fn wait_available(&mut self, timeout_ms: u64) -> bool {
        let start = self.clock.millis();
        loop {
            let client = match self.client.as_mut() {
                Some(c) => c,
                None => return false,
            };
            if client.available() > 0 {
                return true;
            }
            if !client.connected() {
                return false;
            }
            if self.clock.millis().saturating_sub(start) >= timeout_ms {
                return false;
            }
            self.clock.pause();
        }
    }

    pub(crate) fn timed_read(&mut self, timeout_ms: u64) -> Option<u8> {
        if !self.wait_available(timeout_ms) {
            return None;
        }
        self.client.as_mut().and_then(|c| c.read())
    }

    /// 读取一行，不含行尾的 CR LF。
    pub(crate) fn read_line(&mut self, timeout_ms: u64) -> Result<String, Exception> {
        let mut line = Vec::new();
        loop {
            match self.timed_read(timeout_ms) {
                Some(b'\r') => break,
                Some(b) => line.push(b),
                None => return Err(Exception::ReadTimeout),
            }
        }
        loop {
            match self.timed_read(timeout_ms) {
                Some(b'\n') => break,
                Some(_) => continue,
                None => return Err(Exception::ReadTimeout),
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// 最多读取 `max_len` 字节；每一批数据的等待时间都不超过 `timeout_ms`。
    /// `max_len` 来自客户端声明的长度，缓冲区随实际到达的数据增长。
    pub(crate) fn read_bytes_with_timeout(&mut self, max_len: usize, timeout_ms: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(max_len.min(self.config.download_unit_size()));
        while data.len() < max_len {
            if !self.wait_available(timeout_ms) {
                break;
            }
            let client = match self.client.as_mut() {
                Some(c) => c,
                None => break,
            };
            let avail = client.available().min(max_len - data.len());
            for _ in 0..avail {
                match client.read() {
                    Some(b) => data.push(b),
                    None => break,
                }
            }
        }
        trace!("[ID{}]读取请求体{}/{}字节", self.id, data.len(), max_len);
        data
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> usize {
        match self.client.as_mut() {
            Some(client) => client.write(data),
            None => 0,
        }
    }
}

// --- 参数与请求头 ---

impl Context {
    pub fn arg(&self, name: &str) -> &str {
        self.request.arg(name)
    }

    pub fn arg_at(&self, index: usize) -> &str {
        self.request.arg_at(index)
    }

    pub fn arg_name(&self, index: usize) -> &str {
        self.request.arg_name(index)
    }

    pub fn args(&self) -> usize {
        self.request.args()
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.request.has_arg(name)
    }

    pub fn header(&self, name: &str) -> &str {
        self.request.header(name)
    }

    pub fn header_at(&self, index: usize) -> &str {
        self.request.header_at(index)
    }

    pub fn header_name(&self, index: usize) -> &str {
        self.request.header_name(index)
    }

    pub fn headers(&self) -> usize {
        self.request.headers()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.request.has_header(name)
    }

    pub fn host_header(&self) -> &str {
        self.request.host()
    }

    pub fn uri(&self) -> &str {
        self.request.uri()
    }

    pub fn method(&self) -> HttpMethod {
        self.request.method()
    }

    pub fn version(&self) -> u8 {
        self.request.version()
    }

    /// 本次请求因超出参数上限而丢弃的参数个数
    pub fn dropped_args(&self) -> usize {
        self.request.dropped_args()
    }
}

// --- 响应写出 ---

impl Context {
    pub fn send_header(&mut self, name: &str, value: &str) {
        self.response.add_header(name, value, false);
    }

    pub fn send_header_first(&mut self, name: &str, value: &str) {
        self.response.add_header(name, value, true);
    }

    pub fn set_content_length(&mut self, length: ContentLength) {
        self.response.set_content_length(length);
    }

    /// 发送状态行、响应头与响应体。`content_type` 为空时使用 `text/html`。
    pub fn send<C: AsRef<[u8]>>(&mut self, code: u16, content_type: &str, content: C) {
        let content = content.as_ref();
        let header =
            self.response
                .prepare_header(self.request.version(), code, content_type, content.len());
        debug!(
            "[ID{}]发送响应：{} {}，长度{}",
            self.id,
            code,
            reason_phrase(code),
            content.len()
        );
        self.write(header.as_bytes());
        if !content.is_empty() {
            self.send_content(content);
        }
    }

    /// 只发送状态码，响应体为空
    pub fn send_status(&mut self, code: u16) {
        self.send(code, "", b"");
    }

    /// 发送一段响应体。分块模式下每次调用写出一个完整的数据块，空内容写出终止块。
    pub fn send_content<C: AsRef<[u8]>>(&mut self, content: C) {
        let content = content.as_ref();
        if self.response.is_chunked() {
            if content.is_empty() {
                self.write(LAST_CHUNK);
                self.response.end_chunked();
                return;
            }
            self.write(chunk_prefix(content.len()).as_bytes());
            self.write(content);
            self.write(CRLF.as_bytes());
        } else {
            self.write(content);
        }
    }

    /// 发送只读存储中的内容，按下载单元大小分段写出。
    pub fn send_static(&mut self, code: u16, content_type: &str, content: &'static [u8]) {
        let header =
            self.response
                .prepare_header(self.request.version(), code, content_type, content.len());
        self.write(header.as_bytes());
        if !content.is_empty() {
            self.send_content_static(content);
        }
    }

    pub fn send_content_static(&mut self, content: &'static [u8]) {
        let chunked = self.response.is_chunked();
        if chunked {
            if content.is_empty() {
                self.send_content(content);
                return;
            }
            self.write(chunk_prefix(content.len()).as_bytes());
        }
        for piece in content.chunks(self.config.download_unit_size()) {
            if self.write(piece) < piece.len() {
                debug!("[ID{}]写出静态内容时连接中断", self.id);
                break;
            }
        }
        if chunked {
            self.write(CRLF.as_bytes());
        }
    }

    /// 以已知长度发送文件。`.gz` 文件在类型不是 gzip 或二进制流时附加 `Content-Encoding: gzip`，
    /// HEAD 请求只发送响应头。返回写出的文件字节数。
    pub fn stream_file(&mut self, file: &mut dyn File, content_type: &str) -> usize {
        self.set_content_length(ContentLength::Known(file.size()));
        if file.name().ends_with(".gz") && content_type != GZIP_MIME && content_type != FALLBACK_MIME {
            self.send_header("Content-Encoding", "gzip");
        }
        self.send(200, content_type, b"");
        if self.request.method() == HttpMethod::Head {
            return 0;
        }

        let mut buffer = vec![0u8; self.config.download_unit_size()];
        let mut sent = 0;
        loop {
            let n = file.read(&mut buffer);
            if n == 0 {
                break;
            }
            let written = self.write(&buffer[..n]);
            sent += written;
            if written < n {
                debug!("[ID{}]发送文件{}时连接中断", self.id, file.name());
                break;
            }
        }
        debug!(
            "[ID{}]文件{}发送完毕，共{}",
            self.id,
            file.name(),
            format_file_size(sent as u64)
        );
        sent
    }

    /// 校验 `Authorization: Basic …` 请求头是否与给定的用户名和密码一致。
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        if !self.request.has_header(AUTHORIZATION_HEADER) {
            return false;
        }
        match self.request.header(AUTHORIZATION_HEADER).strip_prefix("Basic ") {
            Some(credentials) => credentials == basic_auth_token(username, password),
            None => false,
        }
    }

    /// 要求客户端进行 Basic 认证
    pub fn request_authentication(&mut self) {
        self.send_header("WWW-Authenticate", "Basic realm=\"Login Required\"");
        self.send_status(401);
    }

    /// 分块模式下补发终止块
    pub(crate) fn finalize_response(&mut self) {
        if self.response.is_chunked() {
            self.write(LAST_CHUNK);
            self.response.end_chunked();
        }
    }
}
