use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fs;
use std::path::Path;

use crate::error::{HelperError, Result};

/// `data:<mime>;base64,<payload>` 形式的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    uri: String,
    payload_start: usize,
}

impl ImageData {
    pub fn from_data_uri(uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        if !uri.starts_with("data:") {
            return Err(HelperError::InvalidImage("缺少 data: 前缀".to_string()));
        }
        let comma = uri
            .find(',')
            .ok_or_else(|| HelperError::InvalidImage("缺少 base64 数据".to_string()))?;
        if !uri[..comma].ends_with(";base64") {
            return Err(HelperError::InvalidImage("只支持 base64 编码的图片".to_string()));
        }
        if comma + 1 == uri.len() {
            return Err(HelperError::InvalidImage("图片数据为空".to_string()));
        }
        Ok(Self {
            uri,
            payload_start: comma + 1,
        })
    }

    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(HelperError::InvalidImage("图片数据为空".to_string()));
        }
        Self::from_data_uri(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
    }

    /// 读取本地图片，MIME 类型按扩展名推断
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            HelperError::InvalidImage(format!("读取图片失败 {}: {}", path.display(), e))
        })?;
        let mime = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            _ => "image/jpeg",
        };
        Self::from_bytes(mime, &bytes)
    }

    /// 完整的 data URI，供接受图片 URL 的接口使用
    pub fn as_data_uri(&self) -> &str {
        &self.uri
    }

    /// 去掉前缀后的 base64 数据
    pub fn payload(&self) -> &str {
        &self.uri[self.payload_start..]
    }

    pub fn mime(&self) -> &str {
        let header = &self.uri["data:".len()..self.payload_start - 1];
        header.trim_end_matches(";base64")
    }
}
