// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求处理器
//!
//! 服务器按注册顺序保存处理器，第一个 `can_handle` 返回真的处理器负责该请求。
//! 内置两种实现：
//! 1. [`FunctionHandler`]：包装用户回调，按精确路径或 `/*` 前缀匹配。
//! 2. [`StaticHandler`]：从 [`Filesystem`] 提供静态文件，支持 ETag 条件请求。

use std::cell::RefCell;
use std::rc::Rc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use sha1::{Digest, Sha1};

use crate::{
    cache::EtagCache,
    context::Context,
    fs::{File, Filesystem},
    param::*,
    upload::Upload,
};

/// 处理请求的回调
pub type HandlerFn = Box<dyn FnMut(&mut Context)>;
/// 接收上传事件的回调，可被多个处理器共享
pub type UploadFn = Rc<RefCell<dyn FnMut(&Context, &Upload)>>;

pub trait RequestHandler {
    fn can_handle(&self, method: HttpMethod, uri: &str) -> bool;

    fn can_upload(&self, _uri: &str) -> bool {
        false
    }

    /// 处理请求，返回是否已发送响应
    fn handle(&mut self, ctx: &mut Context, method: HttpMethod, uri: &str) -> bool;

    fn upload(&mut self, _ctx: &Context, _uri: &str, _upload: &Upload) {}
}

pub struct FunctionHandler {
    handler: HandlerFn,
    upload: Option<UploadFn>,
    uri: String,
    method: HttpMethod,
}

impl FunctionHandler {
    pub fn new(uri: &str, method: HttpMethod, handler: HandlerFn, upload: Option<UploadFn>) -> Self {
        Self {
            handler,
            upload,
            uri: uri.to_string(),
            method,
        }
    }
}

impl RequestHandler for FunctionHandler {
    fn can_handle(&self, method: HttpMethod, uri: &str) -> bool {
        if self.method != HttpMethod::Any && self.method != method {
            return false;
        }
        if uri == self.uri {
            return true;
        }
        match self.uri.strip_suffix("/*") {
            Some(prefix) => uri.starts_with(prefix),
            None => false,
        }
    }

    fn can_upload(&self, uri: &str) -> bool {
        self.upload.is_some() && self.can_handle(HttpMethod::Post, uri)
    }

    fn handle(&mut self, ctx: &mut Context, method: HttpMethod, uri: &str) -> bool {
        if !self.can_handle(method, uri) {
            return false;
        }
        (self.handler)(ctx);
        true
    }

    fn upload(&mut self, ctx: &Context, uri: &str, upload: &Upload) {
        if !self.can_upload(uri) {
            return;
        }
        if let Some(callback) = self.upload.as_ref() {
            let mut callback = callback.borrow_mut();
            (&mut *callback)(ctx, upload);
        }
    }
}

/// 静态文件处理器。
///
/// `path` 是文件时只响应与 `uri` 完全相同的请求；是目录时响应以 `uri` 开头的请求，
/// 以 `/` 结尾的请求先补上 `index.htm`，再把 `uri` 之后的部分拼接到 `path` 之后。
/// 请求的文件不存在但存在同名 `.gz` 文件时发送压缩文件。
pub struct StaticHandler {
    fs: Box<dyn Filesystem>,
    uri: String,
    path: String,
    cache_header: Option<String>,
    is_file: bool,
    base_uri_len: usize,
    etags: EtagCache,
}

impl StaticHandler {
    pub fn new(
        fs: Box<dyn Filesystem>,
        path: &str,
        uri: &str,
        cache_header: Option<&str>,
        etag_cache_size: usize,
    ) -> Self {
        let is_file = fs.exists(path) && !fs.is_dir(path);
        debug!(
            "注册静态文件处理器：{} -> {}（{}）",
            uri,
            path,
            if is_file { "文件" } else { "目录" }
        );
        Self {
            fs,
            uri: uri.to_string(),
            path: path.to_string(),
            cache_header: cache_header.map(str::to_string),
            is_file,
            base_uri_len: uri.len(),
            etags: EtagCache::from_capacity(etag_cache_size),
        }
    }

    fn resolve(&self, uri: &str) -> String {
        if self.is_file {
            return self.path.clone();
        }
        let mut requested = uri.to_string();
        if requested.ends_with('/') {
            requested.push_str(INDEX_FILE);
        }
        format!("{}{}", self.path, requested.get(self.base_uri_len..).unwrap_or(""))
    }

    /// 计算文件的 ETag：SHA-1 摘要的 base64 编码，带双引号。
    fn etag_for(&mut self, path: &str, modified: Option<std::time::SystemTime>, size: usize) -> Option<String> {
        if let Some(etag) = self.etags.find(path, modified, size).map(str::to_string) {
            return Some(etag);
        }
        let mut file = self.fs.open(path)?;
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 512];
        loop {
            let n = file.read(&mut buf);
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let etag = format!("\"{}\"", STANDARD.encode(hasher.finalize()));
        self.etags.push(path, etag.clone(), modified, size);
        Some(etag)
    }
}

impl RequestHandler for StaticHandler {
    fn can_handle(&self, method: HttpMethod, uri: &str) -> bool {
        if method != HttpMethod::Get && method != HttpMethod::Head {
            return false;
        }
        if self.is_file {
            uri == self.uri
        } else {
            uri.starts_with(&self.uri)
        }
    }

    fn handle(&mut self, ctx: &mut Context, method: HttpMethod, uri: &str) -> bool {
        if !self.can_handle(method, uri) {
            return false;
        }

        let mut path = self.resolve(uri);
        let content_type = content_type_for(&path);
        if !self.fs.exists(&path) {
            let compressed = format!("{}.gz", path);
            if self.fs.exists(&compressed) {
                path = compressed;
            }
        }

        let mut file: Box<dyn File> = match self.fs.open(&path) {
            Some(f) => f,
            None => {
                debug!("[ID{}]静态文件不存在：{}", ctx.id(), path);
                return false;
            }
        };

        let etag = self.etag_for(&path, file.modified(), file.size());
        match etag {
            Some(ref etag) => {
                if ctx.header("If-None-Match") == etag.as_str() {
                    debug!("[ID{}]{}未修改", ctx.id(), path);
                    ctx.send_status(304);
                    return true;
                }
            }
            None => warn!("[ID{}]无法计算{}的ETag", ctx.id(), path),
        }

        if let Some(cache_header) = self.cache_header.as_deref() {
            ctx.send_header("Cache-Control", cache_header);
        }
        if let Some(etag) = etag {
            ctx.send_header("ETag", &etag);
        }
        ctx.stream_file(file.as_mut(), content_type);
        true
    }
}
