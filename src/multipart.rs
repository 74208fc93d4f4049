// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # multipart/form-data 解析
//!
//! 普通字段整体缓存为参数；文件字段逐字节写入 [`Upload`] 缓冲区，
//! 通过上传回调分批交出，不会把整个文件留在内存里。
//!
//! 文件内容中的边界检测以 CR 为触发点：读到 CR 后按 `\r\n--{boundary}` 逐字节比对，
//! 一旦不匹配，只把 CR 写入上传缓冲区，其余已读字节退回并重新扫描。

use std::collections::VecDeque;

use lazy_static::lazy_static;
use log::{debug, trace, warn};
use regex::Regex;

use crate::{
    context::Context,
    exception::Exception,
    param::DEFAULT_PART_TYPE,
    request::Argument,
    upload::{Upload, UploadStatus},
};

/// 上传回调：每个上传事件调用一次
pub type UploadSink<'a> = dyn FnMut(&Context, &Upload) + 'a;

lazy_static! {
    // 带引号的值读到闭合引号为止，可以包含 `;`
    static ref PART_NAME: Regex = Regex::new(r#"\bname=(?:"([^"]*)"|([^";]*))"#).unwrap();
    static ref PART_FILENAME: Regex = Regex::new(r#"\bfilename=(?:"([^"]*)"|([^";]*))"#).unwrap();
}

/// 取出 Content-Disposition 中某个属性的值
fn disposition_value(pattern: &Regex, line: &str) -> Option<String> {
    let captures = pattern.captures(line)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
}

/// 带退回缓冲的字节读取器
struct Scanner {
    pending: VecDeque<u8>,
    timeout_ms: u64,
}

impl Scanner {
    fn next(&mut self, ctx: &mut Context) -> Option<u8> {
        match self.pending.pop_front() {
            Some(b) => Some(b),
            None => ctx.timed_read(self.timeout_ms),
        }
    }

    /// 把字节退回到待读队列的最前面，保持原有顺序
    fn unread(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.pending.push_front(b);
        }
    }

    fn read_line(&mut self, ctx: &mut Context) -> Result<String, Exception> {
        let mut line = Vec::new();
        loop {
            match self.next(ctx) {
                Some(b'\r') => break,
                Some(b) => line.push(b),
                None => return Err(Exception::ReadTimeout),
            }
        }
        loop {
            match self.next(ctx) {
                Some(b'\n') => break,
                Some(_) => continue,
                None => return Err(Exception::ReadTimeout),
            }
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

/// 解析 multipart 请求体。
///
/// 成功时当前请求的参数被替换为“表单字段 + 原查询参数”，总数不超过 `max_post_args`，
/// 超出的参数被丢弃并计入 `dropped_args`。
pub(crate) fn parse_form(
    ctx: &mut Context,
    boundary: &str,
    content_length: usize,
    sink: &mut UploadSink<'_>,
) -> Result<(), Exception> {
    let id = ctx.id();
    debug!("[ID{}]解析multipart请求体，边界：{}，长度：{}", id, boundary, content_length);

    let mut scanner = Scanner {
        pending: VecDeque::new(),
        timeout_ms: ctx.config().read_timeout_ms(),
    };
    let start = format!("--{}", boundary);
    let terminal = format!("--{}--", boundary);

    let mut line = String::new();
    for _ in 0..3 {
        line = scanner.read_line(ctx)?;
        if !line.is_empty() {
            break;
        }
    }
    if line != start {
        warn!("[ID{}]multipart请求体的首行与边界不符：{}", id, line);
        return Err(Exception::BoundaryMismatch);
    }

    let max_args = ctx.config().max_post_args();
    let mut fields: Vec<Argument> = Vec::new();
    let mut dropped = 0;
    let mut upload = Upload::with_capacity(ctx.config().upload_buffer_size());

    loop {
        let line = scanner.read_line(ctx)?;
        if !starts_with_ignore_case(&line, "Content-Disposition") {
            continue;
        }
        let name = match disposition_value(&PART_NAME, &line) {
            Some(name) => name,
            None => continue,
        };
        let filename = disposition_value(&PART_FILENAME, &line);

        let mut part_type = DEFAULT_PART_TYPE.to_string();
        let next = scanner.read_line(ctx)?;
        if starts_with_ignore_case(&next, "Content-Type") {
            if let Some((_, value)) = next.split_once(':') {
                part_type = value.trim().to_string();
            }
            scanner.read_line(ctx)?;
        }

        match filename {
            None => {
                let mut value = String::new();
                let last = loop {
                    let body_line = scanner.read_line(ctx)?;
                    if body_line.starts_with(&start) {
                        break body_line;
                    }
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(&body_line);
                };
                debug!("[ID{}]表单字段：{}={}", id, name, value);
                if fields.len() < max_args {
                    fields.push(Argument { key: name, value });
                } else {
                    dropped += 1;
                }
                if last == terminal {
                    break;
                }
            }
            Some(mut filename) => {
                if filename == "blob" && ctx.has_arg("filename") {
                    filename = ctx.arg("filename").to_string();
                }
                upload.begin(&name, &filename, &part_type, content_length);
                debug!("[ID{}]开始接收文件：{}，类型：{}", id, filename, part_type);
                sink(&*ctx, &upload);

                upload.set_status(UploadStatus::Write);
                scanner.timeout_ms = ctx.config().post_wait_ms();
                let found = scan_file(ctx, &mut scanner, boundary, &mut upload, sink);
                scanner.timeout_ms = ctx.config().read_timeout_ms();
                if !found {
                    warn!("[ID{}]文件{}上传中断", id, upload.filename());
                    upload.set_status(UploadStatus::Aborted);
                    sink(&*ctx, &upload);
                    return Err(Exception::UploadAborted);
                }

                upload.finish(|u| sink(&*ctx, u));
                debug!(
                    "[ID{}]文件{}接收完毕，共{}字节",
                    id,
                    upload.filename(),
                    upload.total_size()
                );

                let rest = scanner.read_line(ctx)?;
                if rest == "--" {
                    break;
                }
            }
        }
    }

    let query_args = ctx.request_mut().take_args();
    for arg in query_args {
        if fields.len() < max_args {
            fields.push(arg);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!("[ID{}]参数个数超过上限{}，丢弃了{}个参数", id, max_args, dropped);
        ctx.request_mut().add_dropped_args(dropped);
    }
    ctx.request_mut().set_args(fields);
    debug!("[ID{}]multipart请求体解析完成", id);
    Ok(())
}

/// 把文件内容写入上传缓冲区，直到遇到 `\r\n--{boundary}`。
/// 连接断开或超时返回 `false`。
fn scan_file(
    ctx: &mut Context,
    scanner: &mut Scanner,
    boundary: &str,
    upload: &mut Upload,
    sink: &mut UploadSink<'_>,
) -> bool {
    let mut marker = b"\r\n--".to_vec();
    marker.extend_from_slice(boundary.as_bytes());
    let mut window = Vec::with_capacity(marker.len());

    loop {
        let byte = match scanner.next(ctx) {
            Some(b) => b,
            None => return false,
        };
        if byte != b'\r' {
            upload.write_byte(byte, |u| sink(&*ctx, u));
            continue;
        }

        window.clear();
        window.push(byte);
        while window.len() < marker.len() {
            let b = match scanner.next(ctx) {
                Some(b) => b,
                None => return false,
            };
            window.push(b);
            if b != marker[window.len() - 1] {
                break;
            }
        }
        if window == marker {
            return true;
        }

        trace!("[ID{}]疑似边界不匹配，退回{}字节", ctx.id(), window.len() - 1);
        upload.write_byte(b'\r', |u| sink(&*ctx, u));
        scanner.unread(&window[1..]);
    }
}
