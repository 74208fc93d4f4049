// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求解析
//!
//! 从当前连接读取请求行、请求头和请求体，把结果写入 [`Context`] 中的请求状态，
//! 并选出负责该请求的处理器。

use log::{debug, info, trace, warn};

use crate::{
    context::Context,
    exception::Exception,
    handler::RequestHandler,
    multipart::parse_form,
    request::{parse_arguments, parse_request_line, split_header, BodyKind},
    upload::Upload,
};

/// 解析一个完整的请求。
///
/// 成功时返回第一个能处理该请求的处理器下标，没有匹配的处理器时为 `None`。
/// 任何错误都意味着该连接应当被丢弃。
pub(crate) fn parse_request(
    ctx: &mut Context,
    handlers: &mut [Box<dyn RequestHandler>],
) -> Result<Option<usize>, Exception> {
    let id = ctx.id();
    let read_timeout = ctx.config().read_timeout_ms();
    let line = ctx.read_line(read_timeout)?;

    ctx.request_mut().reset();
    ctx.response_mut().reset();

    let request_line = parse_request_line(&line, id)?;
    ctx.request_mut().set_line(&request_line);
    info!(
        "[ID{}]{} {} HTTP/1.{}",
        id, request_line.method, request_line.uri, request_line.version
    );

    let method = request_line.method;
    let selected = handlers
        .iter()
        .position(|h| h.can_handle(method, &request_line.uri));

    let mut content_type = String::new();
    let mut content_length = 0usize;
    loop {
        let header_line = ctx.read_line(read_timeout)?;
        if header_line.is_empty() {
            break;
        }
        let (name, value) = match split_header(&header_line) {
            Some(parts) => parts,
            None => {
                debug!("[ID{}]忽略格式不正确的请求头：{}", id, header_line);
                continue;
            }
        };
        trace!("[ID{}]请求头 {}: {}", id, name, value);
        ctx.request_mut().collect_header(name, value);

        if name.eq_ignore_ascii_case("Content-Type") {
            content_type = value.to_string();
        } else if name.eq_ignore_ascii_case("Content-Length") {
            content_length = value.parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("Host") {
            ctx.request_mut().set_host(value);
        }
    }

    if method.has_body() {
        match BodyKind::from_content_type(&content_type) {
            BodyKind::Multipart(boundary) => {
                ctx.request_mut()
                    .set_args(parse_arguments(&request_line.query));
                let uri = request_line.uri.clone();
                let mut target = match selected {
                    Some(i) => handlers.get_mut(i).filter(|h| h.can_upload(&uri)),
                    None => None,
                };
                let mut sink = |c: &Context, upload: &Upload| {
                    if let Some(handler) = target.as_mut() {
                        handler.upload(c, &uri, upload);
                    }
                };
                parse_form(ctx, &boundary, content_length, &mut sink)?;
            }
            kind => {
                let post_wait = ctx.config().post_wait_ms();
                let body = ctx.read_bytes_with_timeout(content_length, post_wait);
                if body.len() < content_length {
                    warn!(
                        "[ID{}]请求体不完整：声明{}字节，只收到{}字节",
                        id,
                        content_length,
                        body.len()
                    );
                    return Err(Exception::IncompleteBody);
                }
                let body = String::from_utf8_lossy(&body).into_owned();
                if kind == BodyKind::UrlEncoded {
                    let mut search = request_line.query.clone();
                    if !search.is_empty() && !body.is_empty() {
                        search.push('&');
                    }
                    search.push_str(&body);
                    ctx.request_mut().set_args(parse_arguments(&search));
                } else {
                    ctx.request_mut()
                        .set_args(parse_arguments(&request_line.query));
                    if content_length > 0 {
                        ctx.request_mut().push_arg("plain", &body);
                    }
                }
            }
        }
    } else {
        ctx.request_mut()
            .set_args(parse_arguments(&request_line.query));
    }

    debug!(
        "[ID{}]请求解析完成，参数{}个，处理器：{:?}",
        id,
        ctx.args(),
        selected
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handler::FunctionHandler;
    use crate::param::HttpMethod;
    use crate::transport::memory::{pair, ManualClock, MemoryPeer};

    fn context() -> (Context, MemoryPeer) {
        let config = Config::parse("collect_headers = [\"User-Agent\"]");
        let mut ctx = Context::new(Box::new(ManualClock::new()), config);
        let (client, peer) = pair();
        ctx.attach(Box::new(client), 11);
        (ctx, peer)
    }

    fn handlers() -> Vec<Box<dyn RequestHandler>> {
        vec![
            Box::new(FunctionHandler::new("/form", HttpMethod::Post, Box::new(|_: &mut Context| {}), None)),
            Box::new(FunctionHandler::new("/api/*", HttpMethod::Any, Box::new(|_: &mut Context| {}), None)),
        ]
    }

    #[test]
    fn test_get_with_query_and_headers() {
        let (mut ctx, peer) = context();
        peer.send(
            b"GET /api/items?page=2&sort=name%20asc HTTP/1.1\r\n\
              Host: device.local\r\n\
              user-agent: curl/8.0\r\n\
              X-Ignored: yes\r\n\
              bogus line\r\n\
              \r\n",
        );
        let selected = parse_request(&mut ctx, &mut handlers()).unwrap();
        assert_eq!(selected, Some(1));
        assert_eq!(ctx.method(), HttpMethod::Get);
        assert_eq!(ctx.uri(), "/api/items");
        assert_eq!(ctx.version(), 1);
        assert_eq!(ctx.host_header(), "device.local");
        assert_eq!(ctx.header("User-Agent"), "curl/8.0");
        assert_eq!(ctx.header("X-Ignored"), "");
        assert_eq!(ctx.args(), 2);
        assert_eq!(ctx.arg("sort"), "name asc");
    }

    #[test]
    fn test_urlencoded_body_is_merged_after_query() {
        let (mut ctx, peer) = context();
        peer.send(
            b"POST /form?a=1 HTTP/1.1\r\n\
              Content-Type: application/x-www-form-urlencoded\r\n\
              Content-Length: 15\r\n\
              \r\n\
              b=2&c=hello+you",
        );
        let selected = parse_request(&mut ctx, &mut handlers()).unwrap();
        assert_eq!(selected, Some(0));
        assert_eq!(ctx.args(), 3);
        assert_eq!(ctx.arg_name(0), "a");
        assert_eq!(ctx.arg("b"), "2");
        assert_eq!(ctx.arg("c"), "hello you");
        assert!(!ctx.has_arg("plain"));
    }

    #[test]
    fn test_plain_body() {
        let (mut ctx, peer) = context();
        peer.send(
            b"PUT /api/thing?x=1 HTTP/1.1\r\n\
              Content-Type: application/json\r\n\
              Content-Length: 13\r\n\
              \r\n\
              {\"on\": true}\n",
        );
        parse_request(&mut ctx, &mut handlers()).unwrap();
        assert_eq!(ctx.args(), 2);
        assert_eq!(ctx.arg("x"), "1");
        assert_eq!(ctx.arg("plain"), "{\"on\": true}\n");
    }

    #[test]
    fn test_empty_plain_body_adds_no_argument() {
        let (mut ctx, peer) = context();
        peer.send(b"DELETE /api/thing HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        parse_request(&mut ctx, &mut handlers()).unwrap();
        assert_eq!(ctx.args(), 0);
    }

    #[test]
    fn test_short_body_fails() {
        let (mut ctx, peer) = context();
        peer.send(
            b"POST /form HTTP/1.1\r\n\
              Content-Type: application/x-www-form-urlencoded\r\n\
              Content-Length: 10\r\n\
              \r\n\
              a=1",
        );
        peer.close();
        assert_eq!(
            parse_request(&mut ctx, &mut handlers()),
            Err(Exception::IncompleteBody)
        );
    }

    #[test]
    fn test_malformed_request_line_fails() {
        let (mut ctx, peer) = context();
        peer.send(b"NONSENSE\r\n\r\n");
        assert_eq!(
            parse_request(&mut ctx, &mut handlers()),
            Err(Exception::MalformedRequestLine)
        );
    }

    #[test]
    fn test_no_matching_handler() {
        let (mut ctx, peer) = context();
        peer.send(b"GET /nowhere HTTP/1.0\r\n\r\n");
        assert_eq!(parse_request(&mut ctx, &mut handlers()), Ok(None));
        assert_eq!(ctx.version(), 0);
    }

    #[test]
    fn test_state_is_reset_between_requests() {
        let (mut ctx, peer) = context();
        peer.send(b"GET /api/a?k=v HTTP/1.1\r\nUser-Agent: one\r\n\r\n");
        parse_request(&mut ctx, &mut handlers()).unwrap();
        assert_eq!(ctx.header("User-Agent"), "one");

        peer.send(b"GET /api/b HTTP/1.1\r\n\r\n");
        parse_request(&mut ctx, &mut handlers()).unwrap();
        assert_eq!(ctx.uri(), "/api/b");
        assert_eq!(ctx.args(), 0);
        assert_eq!(ctx.header("User-Agent"), "");
    }
}
