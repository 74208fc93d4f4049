// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 静态文件处理器使用的文件系统抽象。

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use log::debug;

/// 一个已打开、可顺序读取的文件。
pub trait File {
    /// 打开时使用的路径
    fn name(&self) -> &str;
    fn size(&self) -> usize;
    /// 读取到 `buf`，返回读取的字节数，0 表示已读完
    fn read(&mut self, buf: &mut [u8]) -> usize;
    fn modified(&self) -> Option<SystemTime>;
}

#[cfg_attr(test, mockall::automock)]
pub trait Filesystem {
    fn exists(&self, path: &str) -> bool;
    fn is_dir(&self, path: &str) -> bool;
    fn open(&self, path: &str) -> Option<Box<dyn File>>;
}

/// 以某个目录为根的本地文件系统，拒绝包含 `..` 的路径。
#[derive(Debug, Clone)]
pub struct StdFilesystem {
    root: PathBuf,
}

impl StdFilesystem {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            debug!("拒绝越界路径：{}", path);
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl Filesystem for StdFilesystem {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map_or(false, |p| p.exists())
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map_or(false, |p| p.is_dir())
    }

    fn open(&self, path: &str) -> Option<Box<dyn File>> {
        let full_path = self.resolve(path)?;
        let metadata = fs::metadata(&full_path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let file = match fs::File::open(&full_path) {
            Ok(f) => f,
            Err(e) => {
                debug!("无法打开文件{}：{}", full_path.display(), e);
                return None;
            }
        };
        Some(Box::new(StdFile {
            name: path.to_string(),
            file,
            size: metadata.len() as usize,
            modified: metadata.modified().ok(),
        }))
    }
}

struct StdFile {
    name: String,
    file: fs::File,
    size: usize,
    modified: Option<SystemTime>,
}

impl File for StdFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.file.read(buf).unwrap_or(0)
    }

    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

/// 内存中的文件，用于测试或把编译期内嵌的资源交给 `stream_file`。
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    data: Vec<u8>,
    pos: usize,
    modified: Option<SystemTime>,
}

impl MemoryFile {
    pub fn new(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            pos: 0,
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }
}

impl File for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}
