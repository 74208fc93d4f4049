use crate::param::*;

/// 响应体长度的声明方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLength {
    /// 未设置，使用即将发送的内容长度
    NotSet,
    /// 长度未知，HTTP/1.1 客户端将使用分块传输
    Unknown,
    /// 显式设置的长度
    Known(usize),
}

/// 响应头累加器与分块状态。
#[derive(Debug, Clone)]
pub struct Response {
    headers: String,
    content_length: ContentLength,
    chunked: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            headers: String::new(),
            content_length: ContentLength::NotSet,
            chunked: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.headers.clear();
        self.content_length = ContentLength::NotSet;
        self.chunked = false;
    }

    /// 追加一行响应头，`first` 为真时插入到已排队的响应头之前。
    pub fn add_header(&mut self, name: &str, value: &str, first: bool) {
        let line = format!("{}: {}{}", name, value, CRLF);
        if first {
            self.headers.insert_str(0, &line);
        } else {
            self.headers.push_str(&line);
        }
    }

    pub fn set_content_length(&mut self, length: ContentLength) {
        self.content_length = length;
    }

    pub fn content_length(&self) -> ContentLength {
        self.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub(crate) fn end_chunked(&mut self) {
        self.chunked = false;
    }

    /// 组装状态行与响应头，并清空排队的响应头。
    ///
    /// 顺序为：状态行、`Content-Type`、长度或分块相关的响应头、排队的响应头、
    /// `Connection: close`、空行。
    pub fn prepare_header(
        &mut self,
        version: u8,
        code: u16,
        content_type: &str,
        content_length: usize,
    ) -> String {
        let content_type = if content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };
        let mut header = format!("HTTP/1.{} {} {}{}", version, code, reason_phrase(code), CRLF);
        header.push_str(&format!("Content-Type: {}{}", content_type, CRLF));
        match self.content_length {
            ContentLength::NotSet => {
                header.push_str(&format!("Content-Length: {}{}", content_length, CRLF));
            }
            ContentLength::Known(length) => {
                header.push_str(&format!("Content-Length: {}{}", length, CRLF));
            }
            ContentLength::Unknown if version > 0 => {
                self.chunked = true;
                header.push_str("Accept-Ranges: none\r\n");
                header.push_str("Transfer-Encoding: chunked\r\n");
            }
            ContentLength::Unknown => {}
        }
        header.push_str(&self.headers);
        header.push_str("Connection: close\r\n");
        header.push_str(CRLF);
        self.headers.clear();
        header
    }
}

/// 分块传输中一个数据块的前缀：十六进制长度加 CRLF。
pub fn chunk_prefix(length: usize) -> String {
    format!("{:x}{}", length, CRLF)
}

/// 终止分块传输的零长度块
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";
