// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 文件上传的缓冲状态。
//!
//! multipart 解析器逐字节写入固定容量的缓冲区，缓冲区写满时整体交给上传回调，
//! 随后清零 `current_size` 并累加到 `total_size`。

/// 上传事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// 文件部分开始，尚未写入任何字节
    Start,
    /// 缓冲区中有一批数据
    Write,
    /// 文件部分结束
    End,
    /// 客户端在上传途中断开
    Aborted,
}

#[derive(Debug, Clone)]
pub struct Upload {
    status: UploadStatus,
    name: String,
    filename: String,
    content_type: String,
    total_size: usize,
    current_size: usize,
    content_length: usize,
    buf: Box<[u8]>,
}

impl Upload {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            status: UploadStatus::Start,
            name: String::new(),
            filename: String::new(),
            content_type: String::new(),
            total_size: 0,
            current_size: 0,
            content_length: 0,
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
        }
    }

    pub(crate) fn begin(&mut self, name: &str, filename: &str, content_type: &str, content_length: usize) {
        self.status = UploadStatus::Start;
        self.name = name.to_string();
        self.filename = filename.to_string();
        self.content_type = content_type.to_string();
        self.total_size = 0;
        self.current_size = 0;
        self.content_length = content_length;
    }

    pub(crate) fn set_status(&mut self, status: UploadStatus) {
        self.status = status;
    }

    /// 写入一个字节；缓冲区已满时先以 `Write` 事件调用 `flush`。
    pub(crate) fn write_byte<F: FnMut(&Upload)>(&mut self, byte: u8, mut flush: F) {
        if self.current_size == self.buf.len() {
            self.status = UploadStatus::Write;
            flush(self);
            self.total_size += self.current_size;
            self.current_size = 0;
        }
        self.buf[self.current_size] = byte;
        self.current_size += 1;
    }

    /// 交出缓冲区中剩余的数据并进入 `End` 状态。
    pub(crate) fn finish<F: FnMut(&Upload)>(&mut self, mut emit: F) {
        if self.current_size > 0 {
            self.status = UploadStatus::Write;
            emit(self);
        }
        self.total_size += self.current_size;
        self.current_size = 0;
        self.status = UploadStatus::End;
        emit(self);
    }
}

impl Upload {
    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// 表单字段名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// 已经交给回调的字节总数，不含当前缓冲区
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// 整个请求体声明的长度
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// 当前缓冲区中的有效数据
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.current_size]
    }
}
