use base64::{engine::general_purpose, Engine as _};

/// 解码 URL 编码的文本：`+` 视为空格，`%XX` 还原为对应字节。
///
/// 不完整的 `%` 转义原样保留，解码后的非法 UTF-8 序列按替换字符处理。
pub fn url_decode(text: &str) -> String {
    let spaced = text.replace('+', " ");
    let decoded = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&decoded).into_owned()
}

/// URL 编码：保留字母、数字与 `-._~`，其余字节一律写成大写十六进制的 `%XX`。
pub fn url_encode(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

/// 计算 Basic 认证所期望的凭据：`base64(username:password)`。
pub fn basic_auth_token(username: &str, password: &str) -> String {
    general_purpose::STANDARD.encode(format!("{}:{}", username, password))
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}
