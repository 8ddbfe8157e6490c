//! 服务商配置：各家凭证、当前启用的服务商以及纠错开关
//!
//! 配置以 JSON 形式保存在 [`KeyValueStore`] 中。加载时会把已保存的（可能不完整的）配置
//! 逐层合并到完整的默认值之上，新增的服务商段落不会因为旧配置里缺失而变成空对象。

use phf::phf_map;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::mem;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{HelperError, Result};
use crate::storage::KeyValueStore;

pub const CONFIG_KEY: &str = "homework_config";

static PROVIDER_IDS: phf::Map<&'static str, ProviderKind> = phf_map! {
    "aliyun" => ProviderKind::Aliyun,
    "baidu" => ProviderKind::Baidu,
    "tencent" => ProviderKind::Tencent,
    "openai" => ProviderKind::OpenAi,
    "zhipu" => ProviderKind::Zhipu,
};

static DISPLAY_NAMES: phf::Map<&'static str, &'static str> = phf_map! {
    "aliyun" => "阿里云",
    "baidu" => "百度",
    "tencent" => "腾讯云",
    "openai" => "OpenAI",
    "zhipu" => "智谱AI",
};

/// 服务商标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ProviderKind {
    Aliyun,
    Baidu,
    Tencent,
    OpenAi,
    Zhipu,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Aliyun,
        ProviderKind::Baidu,
        ProviderKind::Tencent,
        ProviderKind::OpenAi,
        ProviderKind::Zhipu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Aliyun => "aliyun",
            ProviderKind::Baidu => "baidu",
            ProviderKind::Tencent => "tencent",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Zhipu => "zhipu",
        }
    }

    pub fn display_name(self) -> &'static str {
        DISPLAY_NAMES.get(self.as_str()).copied().unwrap_or("未知服务商")
    }

    /// 发起请求前必须非空的凭证字段
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Aliyun => &["accessKeyId", "accessKeySecret"],
            ProviderKind::Baidu => &["apiKey", "secretKey"],
            ProviderKind::Tencent => &["secretId", "secretKey"],
            ProviderKind::OpenAi | ProviderKind::Zhipu => &["apiKey"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PROVIDER_IDS
            .get(s.trim().to_lowercase().as_str())
            .copied()
            .ok_or_else(|| format!("未知的服务商: {}", s))
    }
}

// 已保存配置里的未知服务商回落到阿里云
impl From<String> for ProviderKind {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("未知的服务商 '{}'，使用阿里云", value);
            ProviderKind::Aliyun
        })
    }
}

/// 单个服务商的凭证字段，字段名随服务商而不同
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderCredentials(Map<String, Value>);

impl ProviderCredentials {
    /// 读取字段，空字符串视为缺失
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.0.insert(field.to_string(), Value::String(value.into()));
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 读取必填字段，缺失时返回 `CredentialMissing`
    pub fn require(&self, provider: ProviderKind, field: &'static str) -> Result<&str> {
        self.get(field)
            .ok_or(HelperError::CredentialMissing { provider, field })
    }
}

/// 完整配置快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub ai_provider: ProviderKind,
    pub enable_correction: bool,
    pub aliyun: ProviderCredentials,
    pub baidu: ProviderCredentials,
    pub tencent: ProviderCredentials,
    pub openai: ProviderCredentials,
    pub zhipu: ProviderCredentials,
}

impl Settings {
    pub fn credentials(&self, provider: ProviderKind) -> &ProviderCredentials {
        match provider {
            ProviderKind::Aliyun => &self.aliyun,
            ProviderKind::Baidu => &self.baidu,
            ProviderKind::Tencent => &self.tencent,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Zhipu => &self.zhipu,
        }
    }

    pub fn credentials_mut(&mut self, provider: ProviderKind) -> &mut ProviderCredentials {
        match provider {
            ProviderKind::Aliyun => &mut self.aliyun,
            ProviderKind::Baidu => &mut self.baidu,
            ProviderKind::Tencent => &mut self.tencent,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Zhipu => &mut self.zhipu,
        }
    }

    pub fn active_credentials(&self) -> &ProviderCredentials {
        self.credentials(self.ai_provider)
    }

    /// 第一个缺失的必填字段
    pub fn missing_field(&self, provider: ProviderKind) -> Option<&'static str> {
        let creds = self.credentials(provider);
        provider
            .required_fields()
            .iter()
            .copied()
            .find(|field| creds.get(field).is_none())
    }

    pub fn is_complete(&self, provider: ProviderKind) -> bool {
        self.missing_field(provider).is_none()
    }

    /// 校验当前服务商的配置是否完整
    pub fn validate(&self) -> Result<()> {
        ensure_complete(self, self.ai_provider)
    }
}

/// 服务商凭证不完整时返回 `CredentialMissing`
pub fn ensure_complete(settings: &Settings, provider: ProviderKind) -> Result<()> {
    match settings.missing_field(provider) {
        Some(field) => Err(HelperError::CredentialMissing { provider, field }),
        None => Ok(()),
    }
}

impl Default for Settings {
    fn default() -> Self {
        // default_value() 由字面量构造，结构一定能反序列化
        serde_json::from_value(default_value()).unwrap_or_else(|e| {
            unreachable!("默认配置结构错误: {}", e)
        })
    }
}

fn default_value() -> Value {
    json!({
        "aiProvider": "aliyun",
        "enableCorrection": true,
        "aliyun": {
            "accessKeyId": "",
            "accessKeySecret": "",
            "region": "cn-hangzhou"
        },
        "baidu": {
            "apiKey": "",
            "secretKey": ""
        },
        "tencent": {
            "secretId": "",
            "secretKey": "",
            "region": "ap-guangzhou"
        },
        "openai": {
            "apiKey": "",
            "baseURL": "https://api.openai.com/v1",
            "model": "gpt-4-vision-preview"
        },
        "zhipu": {
            "apiKey": "",
            "baseURL": "https://open.bigmodel.cn/api/paas/v4",
            "model": "glm-4",
            "visionModel": "glm-4v"
        }
    })
}

/// 把 `overlay` 逐层合并进 `base`：对象按键递归，其余值只有类型与默认值一致时才覆盖
///
/// 类型不一致的值（例如 `"enableCorrection": "yes"`、`"zhipu": null`）保留默认值，
/// 避免一个坏字段让整份配置反序列化失败、连同其它服务商的密钥一起丢掉。
fn deep_merge(base: &mut Value, overlay: Value, path: &str) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let child = if path.is_empty() { key.clone() } else { format!("{}.{}", path, key) };
                match base_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value, &child),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) if mem::discriminant(&*slot) == mem::discriminant(&value) => *slot = value,
        (_, value) => warn!("配置字段 {} 类型不正确（{}），使用默认值", path, value),
    }
}

/// 从已保存的 JSON 文本恢复配置，无法解析时回落到默认值
pub fn merge_saved(saved: &str) -> Settings {
    let overlay: Value = match serde_json::from_str(saved) {
        Ok(v) => v,
        Err(e) => {
            error!("解析配置失败: {}", e);
            return Settings::default();
        }
    };

    let mut merged = default_value();
    deep_merge(&mut merged, overlay, "");

    serde_json::from_value(merged).unwrap_or_else(|e| {
        error!("配置结构不正确，使用默认配置: {}", e);
        Settings::default()
    })
}

/// 配置的读取与保存
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Settings> {
        match self.store.get(CONFIG_KEY)? {
            Some(saved) => {
                debug!("已读取保存的配置 ({} 字节)", saved.len());
                Ok(merge_saved(&saved))
            }
            None => Ok(Settings::default()),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let raw = serde_json::to_string(settings).map_err(anyhow::Error::from)?;
        self.store.set(CONFIG_KEY, &raw)?;
        Ok(())
    }

    /// 恢复默认配置并保存
    pub fn reset(&self) -> Result<Settings> {
        let settings = Settings::default();
        self.save(&settings)?;
        Ok(settings)
    }
}
