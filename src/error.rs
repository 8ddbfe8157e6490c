//! 作业助手的错误类型

use thiserror::Error;

use crate::settings::ProviderKind;

pub type Result<T> = std::result::Result<T, HelperError>;

/// 流水线各阶段可能出现的错误
///
/// 模型输出格式异常不在此列：那种情况由 [`crate::normalize`] 降级处理，不会向上抛出。
#[derive(Error, Debug)]
pub enum HelperError {
    /// 服务商必填字段缺失，在发起任何网络请求之前返回
    #[error("请先完成{}的配置（缺少 {field}）", .provider.display_name())]
    CredentialMissing {
        provider: ProviderKind,
        field: &'static str,
    },

    /// 两步鉴权中换取 access_token 失败
    #[error("获取{}access_token失败: {message}", .provider.display_name())]
    TokenExchangeFailed {
        provider: ProviderKind,
        message: String,
    },

    #[error("OCR识别失败: {message}")]
    RecognitionFailed {
        provider: ProviderKind,
        message: String,
    },

    #[error("AI生成失败: {message}")]
    GenerationFailed {
        provider: ProviderKind,
        message: String,
    },

    /// 识别调用成功，但没有得到任何文字
    #[error("未能识别到有效的作业内容，请确保图片清晰")]
    EmptyRecognition,

    #[error("图片数据无效: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl HelperError {
    /// 出错的服务商（与服务商无关的错误返回 `None`）
    pub fn provider(&self) -> Option<ProviderKind> {
        match self {
            Self::CredentialMissing { provider, .. }
            | Self::TokenExchangeFailed { provider, .. }
            | Self::RecognitionFailed { provider, .. }
            | Self::GenerationFailed { provider, .. } => Some(*provider),
            Self::EmptyRecognition | Self::InvalidImage(_) | Self::Storage(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_missing_message_names_provider() {
        let err = HelperError::CredentialMissing {
            provider: ProviderKind::Baidu,
            field: "apiKey",
        };
        let msg = err.to_string();
        assert!(msg.contains("百度"), "错误信息应该包含服务商名称: {}", msg);
        assert!(msg.contains("apiKey"), "错误信息应该包含缺失字段: {}", msg);
        assert_eq!(err.provider(), Some(ProviderKind::Baidu));
    }

    #[test]
    fn test_vendor_message_passed_through() {
        let err = HelperError::RecognitionFailed {
            provider: ProviderKind::Tencent,
            message: "The image is too large".to_string(),
        };
        assert_eq!(err.to_string(), "OCR识别失败: The image is too large");
        assert_eq!(HelperError::EmptyRecognition.provider(), None);
    }
}
