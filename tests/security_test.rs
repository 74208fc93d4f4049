// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 异常输入回归测试
    //!
    //! 模拟畸形或恶意的客户端行为，验证服务器会丢弃连接而不是挂起或泄露数据：
    //! - 畸形请求行与慢速连接
    //! - 声明长度与实际请求体不符
    //! - 上传途中断开
    //! - 文件内容中伪造的边界
    //! - 参数数量上限
    //! - 路径遍历

    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::rc::Rc;

    use microserver::transport::memory::{listener, ManualClock, MemoryConnector, MemoryListener};
    use microserver::{
        ClientStatus, Clock, Config, Context, HttpMethod, Server, StdFilesystem, Upload, UploadStatus,
    };
    use tempfile::tempdir;

    fn setup(config: Config) -> (Server<MemoryListener>, MemoryConnector, ManualClock) {
        let (listener, connector) = listener();
        let clock = ManualClock::new();
        let server = Server::new(listener, clock.clone(), config);
        (server, connector, clock)
    }

    fn multipart_request(path: &str, boundary: &str, body: &[u8]) -> Vec<u8> {
        let mut request = format!(
            "POST {} HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=\"{}\"\r\nContent-Length: {}\r\n\r\n",
            path,
            boundary,
            body.len()
        )
        .into_bytes();
        request.extend_from_slice(body);
        request
    }

    #[test]
    fn test_malformed_request_line_drops_connection() {
        let (mut server, connector, _) = setup(Config::new());
        let invoked = Rc::new(Cell::new(false));
        {
            let invoked = Rc::clone(&invoked);
            server.on_not_found(move |_: &mut Context| invoked.set(true));
        }

        let peer = connector.connect();
        peer.send(b"GET_WITHOUT_SPACES\r\n\r\n");
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::None);
        assert!(peer.is_stopped());
        assert!(peer.output().is_empty());
        assert!(!invoked.get());
    }

    #[test]
    fn test_slow_request_line_times_out() {
        let (mut server, connector, clock) = setup(Config::new());
        let peer = connector.connect();
        peer.send(b"GET / HT");
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::None);
        assert!(peer.is_stopped());
        assert!(clock.millis() >= 1000);
    }

    #[test]
    fn test_incomplete_body_is_rejected() {
        let (mut server, connector, _) = setup(Config::new());
        let invoked = Rc::new(Cell::new(false));
        {
            let invoked = Rc::clone(&invoked);
            server.on("/form", move |ctx: &mut Context| {
                invoked.set(true);
                ctx.send(200, "text/plain", "ok");
            });
        }

        let peer = connector.connect();
        peer.send(
            b"POST /form HTTP/1.1\r\n\
              Content-Type: application/x-www-form-urlencoded\r\n\
              Content-Length: 10\r\n\
              \r\n\
              a=1",
        );
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::None);
        assert!(peer.output().is_empty());
        assert!(peer.is_stopped());
        assert!(!invoked.get());
    }

    #[test]
    fn test_huge_content_length_is_not_preallocated() {
        let (mut server, connector, _) = setup(Config::new());
        let invoked = Rc::new(Cell::new(false));
        {
            let invoked = Rc::clone(&invoked);
            server.on("/p", move |ctx: &mut Context| {
                invoked.set(true);
                ctx.send(200, "text/plain", "ok");
            });
        }

        let peer = connector.connect();
        peer.send(
            b"POST /p HTTP/1.1\r\n\
              Content-Type: text/plain\r\n\
              Content-Length: 18446744073709551615\r\n\
              \r\n\
              abc",
        );
        peer.close();
        server.handle_client();
        assert_eq!(server.status(), ClientStatus::None);
        assert!(peer.is_stopped());
        assert!(peer.output().is_empty());
        assert!(!invoked.get());
    }

    #[test]
    fn test_upload_aborted_when_client_disconnects() {
        let (mut server, connector, _) = setup(Config::new());
        let statuses: Rc<RefCell<Vec<UploadStatus>>> = Rc::new(RefCell::new(Vec::new()));
        let invoked = Rc::new(Cell::new(false));
        {
            let statuses = Rc::clone(&statuses);
            let invoked = Rc::clone(&invoked);
            server.on_with_upload(
                "/upload",
                HttpMethod::Post,
                move |_: &mut Context| invoked.set(true),
                move |_: &Context, upload: &Upload| statuses.borrow_mut().push(upload.status()),
            );
        }

        let body: &[u8] = b"--B\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.bin\"\r\n\r\n0123456789";
        let mut request = multipart_request("/upload", "B", body);
        // 声明的长度比实际发送的多，客户端随后断开
        request.truncate(request.len() - 4);
        let peer = connector.connect();
        peer.send(&request);
        peer.close();
        server.handle_client();

        assert_eq!(*statuses.borrow(), vec![UploadStatus::Start, UploadStatus::Aborted]);
        assert!(!invoked.get());
        assert!(peer.output().is_empty());
        assert_eq!(server.status(), ClientStatus::None);
    }

    #[test]
    fn test_forged_boundaries_inside_file_content() {
        let (mut server, connector, _) = setup(Config::new());
        let received: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        {
            let received = Rc::clone(&received);
            server.on_with_upload(
                "/upload",
                HttpMethod::Post,
                |ctx: &mut Context| ctx.send(200, "text/plain", "stored"),
                move |_: &Context, upload: &Upload| {
                    if upload.status() == UploadStatus::Write {
                        received.borrow_mut().extend_from_slice(upload.data());
                    }
                },
            );
        }

        let boundary = "----BOUNDARY42";
        let content: &[u8] =
            b"\r\n------BOUND\r\n-\r\r\n--\r\n----BOUNDARY4\r\n----BOUNDARY4X\x00\xff\r";
        let mut body = Vec::new();
        body.extend_from_slice(
            b"------BOUNDARY42\r\n\
              Content-Disposition: form-data; name=\"file\"; filename=\"evil.bin\"\r\n\
              Content-Type: application/octet-stream\r\n\
              \r\n",
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n------BOUNDARY42--\r\n");

        let peer = connector.connect();
        peer.send(&multipart_request("/upload", boundary, &body));
        server.handle_client();

        assert!(peer.output_string().ends_with("stored"));
        assert_eq!(*received.borrow(), content);
    }

    #[test]
    fn test_boundary_mismatch_drops_connection() {
        let (mut server, connector, _) = setup(Config::new());
        server.on("/upload", |ctx: &mut Context| ctx.send(200, "text/plain", "ok"));
        let peer = connector.connect();
        peer.send(&multipart_request("/upload", "right", b"--wrong\r\n\r\n"));
        server.handle_client();
        assert!(peer.output().is_empty());
        assert_eq!(server.status(), ClientStatus::None);
    }

    #[test]
    fn test_argument_limit_truncates() {
        let (mut server, connector, _) = setup(Config::parse("max_post_args = 3"));
        server.on("/form", |ctx: &mut Context| {
            let names: Vec<&str> = (0..ctx.args()).map(|i| ctx.arg_name(i)).collect();
            let body = format!("{} dropped={}", names.join(","), ctx.dropped_args());
            ctx.send(200, "text/plain", body);
        });

        let body = b"--L\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n\
                     --L\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n\
                     --L\r\nContent-Disposition: form-data; name=\"c\"\r\n\r\n3\r\n--L--\r\n";
        let peer = connector.connect();
        peer.send(&multipart_request("/form?q1=x&q2=y", "L", body));
        server.handle_client();
        assert!(peer.output_string().ends_with("a,b,c dropped=2"));
    }

    #[test]
    fn test_path_traversal_is_not_served() {
        let dir = tempdir().unwrap();
        let www = dir.path().join("www");
        fs::create_dir(&www).unwrap();
        fs::write(www.join("public.txt"), b"public").unwrap();
        fs::write(dir.path().join("secret.txt"), b"top secret").unwrap();

        let (mut server, connector, _) = setup(Config::new());
        server.serve_static("/", StdFilesystem::new(&www), "/", None);

        for target in ["/../secret.txt", "/./../secret.txt", "/public.txt/../../secret.txt"] {
            let peer = connector.connect();
            peer.send(format!("GET {} HTTP/1.1\r\n\r\n", target).as_bytes());
            server.handle_client();
            let output = peer.output_string();
            assert!(output.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", target);
            assert!(!output.contains("top secret"));
            peer.close();
            server.handle_client();
        }

        let peer = connector.connect();
        peer.send(b"GET /public.txt HTTP/1.1\r\n\r\n");
        server.handle_client();
        assert!(peer.output_string().ends_with("public"));
    }

    #[test]
    fn test_encoded_crlf_in_arguments_stays_in_value() {
        let (mut server, connector, _) = setup(Config::new());
        server.on("/echo", |ctx: &mut Context| {
            let value = ctx.arg("v").to_string();
            ctx.send(200, "text/plain", value);
        });
        let peer = connector.connect();
        peer.send(b"GET /echo?v=a%0D%0AX-Injected:%201 HTTP/1.1\r\n\r\n");
        server.handle_client();
        let output = peer.output_string();
        assert!(output.contains("Content-Length: 16\r\n"));
        assert!(output.ends_with("\r\n\r\na\r\nX-Injected: 1"));
    }
}
