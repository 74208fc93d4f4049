// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器
//!
//! `Server` 一次只服务一个连接。调用方在主循环中反复调用 [`Server::handle_client`]，
//! 每次调用推进一步连接状态机：
//!
//! ```text
//! None --accept--> WaitRead --解析并处理--> WaitClose --对端关闭或超时--> None
//! ```
//!
//! `WaitRead` 阶段超过 `data_wait_ms` 仍无数据，或 `WaitClose` 阶段超过 `close_wait_ms`，
//! 连接都会被直接关闭；解析失败同样直接关闭连接，不向处理器报告。

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::{
    config::Config,
    context::Context,
    fs::Filesystem,
    handler::{FunctionHandler, HandlerFn, RequestHandler, StaticHandler, UploadFn},
    param::*,
    parser::parse_request,
    transport::{Clock, Listener},
    upload::Upload,
};

const IF_NONE_MATCH: &str = "If-None-Match";

pub struct Server<L: Listener> {
    listener: L,
    handlers: Vec<Box<dyn RequestHandler>>,
    current_handler: Option<usize>,
    not_found: Option<HandlerFn>,
    file_upload: Option<UploadFn>,
    ctx: Context,
    status: ClientStatus,
    status_change: u64,
    next_id: u128,
    serves_static: bool,
}

impl<L: Listener> Server<L> {
    pub fn new<C: Clock + 'static>(listener: L, clock: C, config: Config) -> Self {
        Self {
            listener,
            handlers: Vec::new(),
            current_handler: None,
            not_found: None,
            file_upload: None,
            ctx: Context::new(Box::new(clock), config),
            status: ClientStatus::None,
            status_change: 0,
            next_id: 0,
            serves_static: false,
        }
    }

    /// 注册不限方法的处理函数
    pub fn on<F>(&mut self, uri: &str, handler: F)
    where
        F: FnMut(&mut Context) + 'static,
    {
        self.on_method(uri, HttpMethod::Any, handler);
    }

    pub fn on_method<F>(&mut self, uri: &str, method: HttpMethod, handler: F)
    where
        F: FnMut(&mut Context) + 'static,
    {
        let upload = self.file_upload.clone();
        self.handlers.push(Box::new(FunctionHandler::new(
            uri,
            method,
            Box::new(handler),
            upload,
        )));
    }

    /// 注册处理函数以及该路径专用的上传回调
    pub fn on_with_upload<F, U>(&mut self, uri: &str, method: HttpMethod, handler: F, upload: U)
    where
        F: FnMut(&mut Context) + 'static,
        U: FnMut(&Context, &Upload) + 'static,
    {
        let upload: UploadFn = Rc::new(RefCell::new(upload));
        self.handlers.push(Box::new(FunctionHandler::new(
            uri,
            method,
            Box::new(handler),
            Some(upload),
        )));
    }

    pub fn add_handler(&mut self, handler: Box<dyn RequestHandler>) {
        self.handlers.push(handler);
    }

    /// 以 `uri` 提供 `fs` 中 `path` 处的文件或目录
    pub fn serve_static<F>(&mut self, uri: &str, fs: F, path: &str, cache_header: Option<&str>)
    where
        F: Filesystem + 'static,
    {
        let etag_cache_size = self.ctx.config().etag_cache_size();
        self.handlers.push(Box::new(StaticHandler::new(
            Box::new(fs),
            path,
            uri,
            cache_header,
            etag_cache_size,
        )));
        self.serves_static = true;
        self.ctx.request_mut().add_header_key(IF_NONE_MATCH);
    }

    pub fn on_not_found<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Context) + 'static,
    {
        self.not_found = Some(Box::new(handler));
    }

    /// 设置默认上传回调，之后通过 `on` / `on_method` 注册的处理函数都会使用它
    pub fn on_file_upload<U>(&mut self, upload: U)
    where
        U: FnMut(&Context, &Upload) + 'static,
    {
        let upload: UploadFn = Rc::new(RefCell::new(upload));
        self.file_upload = Some(upload);
    }

    /// 重新登记需要收集的请求头
    pub fn collect_headers(&mut self, names: &[&str]) {
        self.ctx.request_mut().collect_headers(names);
        if self.serves_static {
            self.ctx.request_mut().add_header_key(IF_NONE_MATCH);
        }
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// 关闭当前连接并回到空闲状态
    pub fn close(&mut self) {
        if self.ctx.has_client() {
            info!("[ID{}]关闭连接", self.ctx.id());
        }
        self.ctx.detach();
        self.status = ClientStatus::None;
        self.current_handler = None;
    }

    pub fn stop(&mut self) {
        self.close();
    }

    /// 推进一次连接状态机
    pub fn handle_client(&mut self) {
        if self.status == ClientStatus::None {
            let client = match self.listener.accept() {
                Some(c) => c,
                None => return,
            };
            self.next_id += 1;
            self.ctx.attach(Box::new(client), self.next_id);
            self.status = ClientStatus::WaitRead;
            self.status_change = self.ctx.millis();
            info!("[ID{}]新连接，等待请求数据", self.next_id);
        }

        let id = self.ctx.id();
        let mut keep_client = false;
        let mut call_yield = false;

        if self.ctx.client_connected() || self.ctx.client_available() > 0 {
            match self.status {
                ClientStatus::None => {}
                ClientStatus::WaitRead => {
                    if self.ctx.client_available() > 0 {
                        match parse_request(&mut self.ctx, &mut self.handlers) {
                            Ok(handler) => {
                                self.current_handler = handler;
                                let send_wait = self.ctx.config().send_wait_ms();
                                self.ctx.set_client_timeout(send_wait);
                                self.handle_request();
                                if self.ctx.client_connected() {
                                    self.status = ClientStatus::WaitClose;
                                    self.status_change = self.ctx.millis();
                                    keep_client = true;
                                }
                            }
                            Err(e) => {
                                warn!("[ID{}]请求解析失败，断开连接：{}", id, e);
                            }
                        }
                    } else {
                        let elapsed = self.ctx.millis().saturating_sub(self.status_change);
                        if elapsed <= self.ctx.config().data_wait_ms() {
                            keep_client = true;
                        } else {
                            info!("[ID{}]等待请求数据超时", id);
                        }
                        call_yield = true;
                    }
                }
                ClientStatus::WaitClose => {
                    let elapsed = self.ctx.millis().saturating_sub(self.status_change);
                    if elapsed <= self.ctx.config().close_wait_ms() {
                        keep_client = true;
                        call_yield = true;
                    } else {
                        info!("[ID{}]等待客户端关闭超时", id);
                    }
                }
            }
        }

        if !keep_client {
            info!("[ID{}]连接结束", id);
            self.ctx.detach();
            self.status = ClientStatus::None;
            self.current_handler = None;
        }

        if call_yield {
            self.ctx.pause();
        }
    }

    fn handle_request(&mut self) {
        let method = self.ctx.method();
        let uri = self.ctx.uri().to_string();

        let mut handled = match self.current_handler {
            Some(i) => self.handlers[i].handle(&mut self.ctx, method, &uri),
            None => false,
        };
        if !handled {
            if let Some(not_found) = self.not_found.as_mut() {
                not_found(&mut self.ctx);
                handled = true;
            }
        }
        if !handled {
            debug!("[ID{}]没有处理器响应{}", self.ctx.id(), uri);
            self.ctx
                .send(404, "text/html", format!("Not found: {}", uri));
        }
        self.ctx.finalize_response();
        self.ctx.request_mut().clear_uri();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{listener, ManualClock, MemoryConnector, MemoryListener};

    fn server() -> (Server<MemoryListener>, MemoryConnector, ManualClock) {
        let (listener, connector) = listener();
        let clock = ManualClock::new();
        let server = Server::new(listener, clock.clone(), Config::new());
        (server, connector, clock)
    }

    #[test]
    fn test_idle_without_connection() {
        let (mut server, _connector, _) = server();
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::None);
    }

    #[test]
    fn test_first_match_wins() {
        let (mut server, connector, _) = server();
        server.on("/a", |ctx: &mut Context| ctx.send(200, "text/plain", "first"));
        server.on("/a", |ctx: &mut Context| ctx.send(200, "text/plain", "second"));

        let peer = connector.connect();
        peer.send(b"GET /a HTTP/1.1\r\n\r\n");
        server.handle_client();
        assert!(peer.output_string().ends_with("first"));
        assert_eq!(server.status(), ClientStatus::WaitClose);
    }

    #[test]
    fn test_declining_handler_falls_back_to_not_found_handler() {
        let (mut server, connector, _) = server();
        server.on_not_found(|ctx: &mut Context| {
            let body = format!("custom {}", ctx.uri());
            ctx.send(404, "text/plain", body);
        });

        let peer = connector.connect();
        peer.send(b"GET /nothing HTTP/1.1\r\n\r\n");
        server.handle_client();
        let output = peer.output_string();
        assert!(output.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(output.ends_with("custom /nothing"));
    }

    #[test]
    fn test_parse_failure_drops_connection() {
        let (mut server, connector, _) = server();
        let peer = connector.connect();
        peer.send(b"BROKEN\r\n");
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::None);
        assert!(peer.is_stopped());
        assert!(peer.output().is_empty());
    }

    #[test]
    fn test_one_connection_at_a_time() {
        let (mut server, connector, _) = server();
        server.on("/", |ctx: &mut Context| ctx.send(200, "text/plain", "ok"));
        let first = connector.connect();
        let second = connector.connect();

        server.handle_client();
        assert_eq!(server.status(), ClientStatus::WaitRead);
        first.send(b"GET / HTTP/1.1\r\n\r\n");
        second.send(b"GET / HTTP/1.1\r\n\r\n");
        server.handle_client();
        assert!(first.output_string().ends_with("ok"));
        assert!(second.output().is_empty());

        first.close();
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::None);
        server.handle_client();
        assert!(second.output_string().ends_with("ok"));
    }

    /// 只响应 `/custom` 的处理器，记录自己被调用的次数
    struct Tagged {
        tag: &'static str,
        calls: Rc<RefCell<Vec<&'static str>>>,
    }

    impl RequestHandler for Tagged {
        fn can_handle(&self, method: HttpMethod, uri: &str) -> bool {
            method == HttpMethod::Get && uri == "/custom"
        }

        fn handle(&mut self, ctx: &mut Context, _method: HttpMethod, _uri: &str) -> bool {
            self.calls.borrow_mut().push(self.tag);
            ctx.send(200, "text/plain", self.tag);
            true
        }
    }

    #[test]
    fn test_add_handler_keeps_insertion_order() {
        let (mut server, connector, _) = server();
        let calls = Rc::new(RefCell::new(Vec::new()));
        server.add_handler(Box::new(Tagged { tag: "custom-first", calls: Rc::clone(&calls) }));
        server.on("/custom", |ctx: &mut Context| ctx.send(200, "text/plain", "function"));
        server.add_handler(Box::new(Tagged { tag: "custom-last", calls: Rc::clone(&calls) }));

        let peer = connector.connect();
        peer.send(b"GET /custom HTTP/1.1\r\n\r\n");
        server.handle_client();
        assert!(peer.output_string().ends_with("custom-first"));
        assert_eq!(*calls.borrow(), vec!["custom-first"]);

        // POST 跳过两个自定义处理器，落到函数处理器
        peer.close();
        server.handle_client();
        let peer = connector.connect();
        peer.send(b"POST /custom HTTP/1.1\r\n\r\n");
        server.handle_client();
        assert!(peer.output_string().ends_with("function"));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_collect_headers_keeps_if_none_match_for_static() {
        let (mut server, _connector, _) = server();
        server.serve_static("/", crate::fs::StdFilesystem::new("."), "/", None);
        server.collect_headers(&["Accept"]);
        let request = server.context().request();
        assert_eq!(request.header_name(0), "Authorization");
        assert_eq!(request.header_name(1), "Accept");
        assert_eq!(request.header_name(2), IF_NONE_MATCH);
    }

    #[test]
    fn test_close_resets_state() {
        let (mut server, connector, _) = server();
        let peer = connector.connect();
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::WaitRead);
        server.close();
        assert_eq!(server.status(), ClientStatus::None);
        assert!(peer.is_stopped());
    }
}
