// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 示例服务器
//!
//! 在 TCP 上运行 `microserver`，注册一组演示用的处理器：
//! - `/`：编译期内嵌的首页
//! - `/hello`：读取查询参数
//! - `/args`：以 JSON 回显全部参数
//! - `/upload`：把 multipart 上传的文件保存到 `www_root`
//! - `/stream`：分块传输
//! - `/secret`：Basic 认证
//! - `/static/`：`www_root` 下的静态文件
//!
//! 标准输入上提供一个简单的管理控制台（`stop`、`help`）。

use std::{
    fs,
    io::{self, BufRead, Write},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};
use serde_json::json;

use microserver::{
    util::format_file_size, ClientStatus, Config, Context, ContentLength, HttpMethod, Server,
    StdFilesystem, SystemClock, TcpServer, Upload, UploadStatus,
};

static INDEX_PAGE: &[u8] = b"<!DOCTYPE html>
<html>
<head><meta charset=\"utf-8\"><title>microserver</title></head>
<body>
<h1>microserver</h1>
<ul>
<li><a href=\"/hello?name=World\">/hello</a></li>
<li><a href=\"/args?a=1&b=2\">/args</a></li>
<li><a href=\"/stream\">/stream</a></li>
<li><a href=\"/secret\">/secret</a></li>
</ul>
<form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">
<input type=\"file\" name=\"file\"><input type=\"submit\" value=\"Upload\">
</form>
</body>
</html>
";

fn main() {
    // 1. 日志
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 配置
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => {
            info!("配置文件已载入");
            config
        }
        Err(e) => {
            error!("{}，使用默认配置", e);
            Config::new()
        }
    };
    let root = PathBuf::from(config.www_root());
    info!("www root: {}", root.display());

    // 3. 监听
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    let socket = SocketAddr::from(SocketAddrV4::new(address, config.port()));
    let listener = match TcpServer::bind(socket) {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定地址：{}，错误：{}", socket, e);
            return;
        }
    };
    info!("服务端将在{}上监听Socket连接", socket);

    // 4. 处理器
    let mut server = Server::new(listener, SystemClock::new(), config.clone());
    register_handlers(&mut server, &root);

    // 5. 管理控制台
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || console(shutdown));
    }

    // 6. 主循环
    while !shutdown.load(Ordering::SeqCst) {
        server.handle_client();
        if server.status() == ClientStatus::None {
            thread::sleep(Duration::from_millis(1));
        }
    }
    server.stop();
    info!("服务器已停止");
}

fn register_handlers(server: &mut Server<TcpServer>, root: &Path) {
    server.on_method("/", HttpMethod::Get, |ctx: &mut Context| {
        ctx.send_static(200, "text/html", INDEX_PAGE);
    });

    server.on("/hello", |ctx: &mut Context| {
        let name = match ctx.has_arg("name") {
            true => ctx.arg("name").to_string(),
            false => "World".to_string(),
        };
        ctx.send(200, "text/plain", format!("Hi {}", name));
    });

    server.on("/args", |ctx: &mut Context| {
        let args: Vec<serde_json::Value> = (0..ctx.args())
            .map(|i| json!({ "name": ctx.arg_name(i), "value": ctx.arg_at(i) }))
            .collect();
        let body = json!({
            "method": ctx.method().to_string(),
            "uri": ctx.uri(),
            "host": ctx.host_header(),
            "args": args,
            "dropped": ctx.dropped_args(),
        });
        ctx.send(200, "application/json", body.to_string());
    });

    let upload_root = root.to_path_buf();
    let mut target: Option<fs::File> = None;
    server.on_with_upload(
        "/upload",
        HttpMethod::Post,
        |ctx: &mut Context| ctx.send(200, "text/plain", "upload finished"),
        move |ctx: &Context, upload: &Upload| match upload.status() {
            UploadStatus::Start => {
                let name = match Path::new(upload.filename()).file_name() {
                    Some(name) => name.to_owned(),
                    None => {
                        warn!("[ID{}]上传的文件名无效：{}", ctx.id(), upload.filename());
                        return;
                    }
                };
                let path = upload_root.join(name);
                target = match fs::File::create(&path) {
                    Ok(f) => Some(f),
                    Err(e) => {
                        error!("[ID{}]无法创建文件{}：{}", ctx.id(), path.display(), e);
                        None
                    }
                };
            }
            UploadStatus::Write => {
                if let Some(file) = target.as_mut() {
                    if let Err(e) = file.write_all(upload.data()) {
                        error!("[ID{}]写入上传文件失败：{}", ctx.id(), e);
                        target = None;
                    }
                }
            }
            UploadStatus::End => {
                target = None;
                info!(
                    "[ID{}]文件{}上传完成，共{}",
                    ctx.id(),
                    upload.filename(),
                    format_file_size(upload.total_size() as u64)
                );
            }
            UploadStatus::Aborted => {
                target = None;
                warn!("[ID{}]文件{}上传中断", ctx.id(), upload.filename());
            }
        },
    );

    server.on("/stream", |ctx: &mut Context| {
        ctx.set_content_length(ContentLength::Unknown);
        ctx.send(200, "text/plain", "");
        for i in 1..=5 {
            ctx.send_content(format!("chunk {}\n", i));
        }
        ctx.send_content("");
    });

    server.on("/secret", |ctx: &mut Context| {
        if !ctx.authenticate("admin", "admin") {
            debug!("[ID{}]认证失败", ctx.id());
            ctx.request_authentication();
            return;
        }
        ctx.send(200, "text/plain", "welcome");
    });

    server.serve_static("/static/", StdFilesystem::new(root), "/", Some("max-age=3600"));
}

/// 管理控制台，运行在独立线程中
fn console(shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = match line {
            Ok(input) => input,
            Err(_) => break,
        };
        match input.trim() {
            "stop" => {
                shutdown.store(true, Ordering::SeqCst);
                println!("停机指令已激活，服务器将在当前轮询结束后关闭...");
                break;
            }
            "help" => {
                println!("== microserver Help ==");
                println!("stop   - 发出停机信号");
                println!("help   - 显示此帮助信息");
                println!("======================");
            }
            "" => {}
            cmd => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}
