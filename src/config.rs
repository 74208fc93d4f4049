use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::exception::Exception;
use crate::param::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    port: u16,
    local: bool,
    www_root: String,
    data_wait_ms: u64,
    post_wait_ms: u64,
    send_wait_ms: u64,
    close_wait_ms: u64,
    read_timeout_ms: u64,
    upload_buffer_size: usize,
    max_post_args: usize,
    download_unit_size: usize,
    etag_cache_size: usize,
    collect_headers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: 80,
            local: true,
            www_root: ".".to_string(),
            data_wait_ms: HTTP_MAX_DATA_WAIT,
            post_wait_ms: HTTP_MAX_POST_WAIT,
            send_wait_ms: HTTP_MAX_SEND_WAIT,
            close_wait_ms: HTTP_MAX_CLOSE_WAIT,
            read_timeout_ms: HTTP_READ_TIMEOUT,
            upload_buffer_size: HTTP_UPLOAD_BUFLEN,
            max_post_args: MAX_POST_ARGS,
            download_unit_size: HTTP_DOWNLOAD_UNIT_SIZE,
            etag_cache_size: 5,
            collect_headers: Vec::new(),
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                error!("无法打开配置文件{}：{}", filename, e);
                return Err(Exception::ConfigFileUnreadable);
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件{}时出错：{}", filename, e);
            return Err(Exception::ConfigFileUnreadable);
        }
        Ok(Self::parse(&str_val))
    }

    /// 从 TOML 文本构建配置，缺失的字段取默认值。
    pub fn parse(text: &str) -> Self {
        let mut raw_config: Config = match toml::from_str(text) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        if raw_config.upload_buffer_size == 0 {
            warn!("upload_buffer_size被设置为0，上传缓冲区不能为空，因此该值将被改为{}。", HTTP_UPLOAD_BUFLEN);
            raw_config.upload_buffer_size = HTTP_UPLOAD_BUFLEN;
        }
        if raw_config.max_post_args == 0 {
            warn!("max_post_args被设置为0，这会丢弃全部表单参数，因此该值将被改为{}。", MAX_POST_ARGS);
            raw_config.max_post_args = MAX_POST_ARGS;
        }
        if raw_config.download_unit_size == 0 {
            warn!("download_unit_size被设置为0，因此该值将被改为{}。", HTTP_DOWNLOAD_UNIT_SIZE);
            raw_config.download_unit_size = HTTP_DOWNLOAD_UNIT_SIZE;
        }
        if raw_config.etag_cache_size == 0 {
            warn!("etag_cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为5。");
            raw_config.etag_cache_size = 5;
        }
        raw_config
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn data_wait_ms(&self) -> u64 {
        self.data_wait_ms
    }

    pub fn post_wait_ms(&self) -> u64 {
        self.post_wait_ms
    }

    pub fn send_wait_ms(&self) -> u64 {
        self.send_wait_ms
    }

    pub fn close_wait_ms(&self) -> u64 {
        self.close_wait_ms
    }

    pub fn read_timeout_ms(&self) -> u64 {
        self.read_timeout_ms
    }

    pub fn upload_buffer_size(&self) -> usize {
        self.upload_buffer_size
    }

    pub fn max_post_args(&self) -> usize {
        self.max_post_args
    }

    pub fn download_unit_size(&self) -> usize {
        self.download_unit_size
    }

    pub fn etag_cache_size(&self) -> usize {
        self.etag_cache_size
    }

    pub fn collect_headers(&self) -> &[String] {
        &self.collect_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.data_wait_ms(), 5000);
        assert_eq!(config.post_wait_ms(), 5000);
        assert_eq!(config.send_wait_ms(), 5000);
        assert_eq!(config.close_wait_ms(), 2000);
        assert_eq!(config.upload_buffer_size(), 2048);
        assert_eq!(config.max_post_args(), 32);
        assert_eq!(config.download_unit_size(), 1460);
        assert!(config.collect_headers().is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::parse("port = 8080\nclose_wait_ms = 100\n");
        assert_eq!(config.port(), 8080);
        assert_eq!(config.close_wait_ms(), 100);
        assert_eq!(config.data_wait_ms(), 5000);
        assert_eq!(config.www_root(), ".");
    }

    #[test]
    fn test_zero_values_are_fixed_up() {
        let config = Config::parse("upload_buffer_size = 0\nmax_post_args = 0\netag_cache_size = 0\n");
        assert_eq!(config.upload_buffer_size(), 2048);
        assert_eq!(config.max_post_args(), 32);
        assert_eq!(config.etag_cache_size(), 5);
    }

    #[test]
    fn test_invalid_toml_falls_back() {
        let config = Config::parse("port = \"not a number\"");
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "www_root = \"/srv/www\"").unwrap();
        writeln!(file, "collect_headers = [\"User-Agent\", \"Cookie\"]").unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.www_root(), "/srv/www");
        assert_eq!(config.collect_headers(), ["User-Agent", "Cookie"]);
    }

    #[test]
    fn test_from_toml_missing_file() {
        let result = Config::from_toml("/definitely/not/here.toml");
        assert_eq!(result, Err(Exception::ConfigFileUnreadable));
    }
}
