// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 传输层抽象
//!
//! 服务器只通过三个 trait 接触外部世界：
//! - [`Listener`]：每次轮询最多交出一个就绪连接；
//! - [`Client`]：面向连接的字节流，所有读操作都是非阻塞的；
//! - [`Clock`]：单调毫秒时钟，以及等待期间让出控制权的协作式钩子。
//!
//! 本模块提供基于 `std::net` 的实现，以及用于测试和主机侧模拟的内存实现 [`memory`]。

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};

/// 单个客户端连接。
pub trait Client {
    /// 当前无需等待即可读取的字节数
    fn available(&mut self) -> usize;
    /// 读取一个字节，没有可读数据时返回 `None`
    fn read(&mut self) -> Option<u8>;
    /// 写出数据，返回实际写出的字节数
    fn write(&mut self, data: &[u8]) -> usize;
    /// 对端是否仍保持连接
    fn connected(&mut self) -> bool;
    /// 设置后续写操作的超时时间
    fn set_timeout(&mut self, _timeout_ms: u64) {}
    /// 关闭连接
    fn stop(&mut self);
}

/// 监听器，轮询时最多返回一个新连接。
pub trait Listener {
    type Client: Client + 'static;

    fn accept(&mut self) -> Option<Self::Client>;
}

/// 单调时钟与协作式让出点。
pub trait Clock {
    fn millis(&self) -> u64;
    /// 在等待数据的轮询循环中调用，让其他协作任务得以运行
    fn pause(&self);
}

/// 基于 `Instant` 的系统时钟，`pause` 休眠 1 毫秒。
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn pause(&self) {
        thread::sleep(Duration::from_millis(1));
    }
}

/// 非阻塞的 TCP 监听器
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for TcpServer {
    type Client = TcpClient;

    fn accept(&mut self) -> Option<TcpClient> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                info!("新的连接：{}", addr);
                match TcpClient::new(stream) {
                    Ok(client) => Some(client),
                    Err(e) => {
                        error!("无法初始化来自{}的连接：{}", addr, e);
                        None
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                error!("接受连接时遇到错误：{}", e);
                None
            }
        }
    }
}

/// 基于 `TcpStream` 的客户端。
///
/// 读取通过非阻塞探测填充内部缓冲区，写入是阻塞的，受 `set_timeout` 限制。
/// 对端关闭写方向（半关闭）后仍可继续写出响应，只有写入出错才停止写入。
pub struct TcpClient {
    stream: TcpStream,
    buffer: VecDeque<u8>,
    /// 对端仍可能发送数据
    readable: bool,
    writable: bool,
}

impl TcpClient {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            buffer: VecDeque::new(),
            readable: true,
            writable: true,
        })
    }

    fn fill(&mut self) {
        if !self.readable {
            return;
        }
        if self.stream.set_nonblocking(true).is_err() {
            self.readable = false;
            self.writable = false;
            return;
        }
        let mut chunk = [0u8; 1460];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("对端已关闭写方向");
                    self.readable = false;
                    break;
                }
                Ok(n) => self.buffer.extend(&chunk[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("读取TCPStream时遇到错误: {}", e);
                    self.readable = false;
                    break;
                }
            }
        }
        if self.stream.set_nonblocking(false).is_err() {
            self.writable = false;
        }
    }
}

impl Client for TcpClient {
    fn available(&mut self) -> usize {
        self.fill();
        self.buffer.len()
    }

    fn read(&mut self) -> Option<u8> {
        if self.buffer.is_empty() {
            self.fill();
        }
        self.buffer.pop_front()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if !self.writable {
            return 0;
        }
        match self.stream.write_all(data) {
            Ok(()) => data.len(),
            Err(e) => {
                debug!("写入TCPStream时遇到错误: {}", e);
                self.writable = false;
                0
            }
        }
    }

    fn connected(&mut self) -> bool {
        if self.buffer.is_empty() {
            self.fill();
        }
        self.readable && self.writable
    }

    fn set_timeout(&mut self, timeout_ms: u64) {
        let timeout = Duration::from_millis(timeout_ms.max(1));
        if let Err(e) = self.stream.set_write_timeout(Some(timeout)) {
            debug!("无法设置写超时：{}", e);
        }
    }

    fn stop(&mut self) {
        let _ = self.stream.flush();
        let _ = self.stream.shutdown(Shutdown::Both);
        self.readable = false;
        self.writable = false;
        self.buffer.clear();
    }
}

/// 内存传输层：测试与主机侧模拟使用的连接、监听器和手动时钟。
pub mod memory {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::{Client, Clock, Listener};

    #[derive(Default)]
    struct Pipe {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
        peer_open: bool,
        stopped: bool,
    }

    /// 服务器一侧看到的连接
    pub struct MemoryClient {
        pipe: Rc<RefCell<Pipe>>,
    }

    /// 测试代码持有的对端
    #[derive(Clone)]
    pub struct MemoryPeer {
        pipe: Rc<RefCell<Pipe>>,
    }

    /// 创建一对相连的客户端与对端。
    pub fn pair() -> (MemoryClient, MemoryPeer) {
        let pipe = Rc::new(RefCell::new(Pipe {
            peer_open: true,
            ..Pipe::default()
        }));
        (
            MemoryClient { pipe: Rc::clone(&pipe) },
            MemoryPeer { pipe },
        )
    }

    impl MemoryPeer {
        /// 向服务器发送数据
        pub fn send(&self, data: &[u8]) {
            self.pipe.borrow_mut().inbound.extend(data);
        }

        /// 对端关闭连接，已发送但未读取的数据仍可被读取
        pub fn close(&self) {
            self.pipe.borrow_mut().peer_open = false;
        }

        /// 服务器至今写出的全部数据
        pub fn output(&self) -> Vec<u8> {
            self.pipe.borrow().outbound.clone()
        }

        pub fn output_string(&self) -> String {
            String::from_utf8_lossy(&self.pipe.borrow().outbound).into_owned()
        }

        /// 服务器是否已经关闭了这个连接
        pub fn is_stopped(&self) -> bool {
            self.pipe.borrow().stopped
        }

        /// 服务器尚未读取的字节数
        pub fn unread(&self) -> usize {
            self.pipe.borrow().inbound.len()
        }
    }

    impl Client for MemoryClient {
        fn available(&mut self) -> usize {
            let pipe = self.pipe.borrow();
            if pipe.stopped {
                0
            } else {
                pipe.inbound.len()
            }
        }

        fn read(&mut self) -> Option<u8> {
            let mut pipe = self.pipe.borrow_mut();
            if pipe.stopped {
                return None;
            }
            pipe.inbound.pop_front()
        }

        fn write(&mut self, data: &[u8]) -> usize {
            let mut pipe = self.pipe.borrow_mut();
            if pipe.stopped {
                return 0;
            }
            pipe.outbound.extend_from_slice(data);
            data.len()
        }

        fn connected(&mut self) -> bool {
            let pipe = self.pipe.borrow();
            pipe.peer_open && !pipe.stopped
        }

        fn stop(&mut self) {
            self.pipe.borrow_mut().stopped = true;
        }
    }

    /// 内存监听器，连接由 [`MemoryConnector`] 排队送入
    pub struct MemoryListener {
        pending: Rc<RefCell<VecDeque<MemoryClient>>>,
    }

    #[derive(Clone)]
    pub struct MemoryConnector {
        pending: Rc<RefCell<VecDeque<MemoryClient>>>,
    }

    /// 创建监听器及向其发起连接的句柄。
    pub fn listener() -> (MemoryListener, MemoryConnector) {
        let pending = Rc::new(RefCell::new(VecDeque::new()));
        (
            MemoryListener {
                pending: Rc::clone(&pending),
            },
            MemoryConnector { pending },
        )
    }

    impl MemoryConnector {
        pub fn connect(&self) -> MemoryPeer {
            let (client, peer) = pair();
            self.pending.borrow_mut().push_back(client);
            peer
        }
    }

    impl Listener for MemoryListener {
        type Client = MemoryClient;

        fn accept(&mut self) -> Option<MemoryClient> {
            self.pending.borrow_mut().pop_front()
        }
    }

    /// 手动推进的时钟，每次 `pause` 前进固定步长，超时因此可以被确定性地触发。
    #[derive(Clone)]
    pub struct ManualClock {
        now: Rc<Cell<u64>>,
        step: u64,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self::with_step(1)
        }

        pub fn with_step(step: u64) -> Self {
            Self {
                now: Rc::new(Cell::new(0)),
                step,
            }
        }

        pub fn advance(&self, ms: u64) {
            self.now.set(self.now.get() + ms);
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn millis(&self) -> u64 {
            self.now.get()
        }

        fn pause(&self) {
            self.advance(self.step);
        }
    }
}
