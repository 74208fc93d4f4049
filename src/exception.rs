// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在单个连接的生命周期中可能出现的失败情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖请求行解析、超时、请求体不完整、multipart 边界与上传中断，以及配置文件读取失败。
//! - **单点决策**：解析器只负责返回 `Err`，由连接状态机统一决定丢弃连接，错误不会上抛给处理器。
//! - **可记录**：通过实现 `std::fmt::Display`，错误信息可以直接写入日志。

use std::fmt;

/// 请求处理过程中发生的异常类型。
///
/// 该枚举作为 `Result` 的 `Err` 部分返回。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 请求行中缺少分隔方法、目标与版本的空格。
    MalformedRequestLine,
    /// 在限定时间内没有读到完整的一行。
    ReadTimeout,
    /// `Content-Length` 声明的请求体在等待时间内没有全部到达。
    IncompleteBody,
    /// multipart 请求体的第一行与 `--{boundary}` 不一致。
    BoundaryMismatch,
    /// 文件上传过程中客户端断开或超时。
    UploadAborted,
    /// 配置文件不存在或无法读取。
    ConfigFileUnreadable,
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRequestLine => write!(f, "Malformed HTTP request line"),
            ReadTimeout => write!(f, "Timed out while reading a line"),
            IncompleteBody => write!(f, "Request body shorter than Content-Length"),
            BoundaryMismatch => write!(f, "Multipart body does not start with its boundary"),
            UploadAborted => write!(f, "Client went away during file upload"),
            ConfigFileUnreadable => write!(f, "Couldn't read the configuration file"),
        }
    }
}
