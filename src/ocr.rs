use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::image::ImageData;
use crate::settings::{Settings, ensure_complete};
use crate::transport::HttpTransport;
use crate::vendor::VendorRegistry;

/// 按当前服务商识别图片中的文字
#[derive(Clone)]
pub struct OcrService {
    registry: Arc<VendorRegistry>,
    transport: Arc<dyn HttpTransport>,
}

impl OcrService {
    pub fn new(registry: Arc<VendorRegistry>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// 返回按行拼接的识别文字；服务商没有识别出内容时返回空字符串，由调用方判断
    pub async fn recognize(&self, settings: &Settings, image: &ImageData) -> Result<String> {
        let provider = settings.ai_provider;
        ensure_complete(settings, provider)?;

        let vendor = self.registry.vendor(provider);
        debug!("OCR 图片类型 {}，数据 {} 字节", image.mime(), image.payload().len());
        let text = vendor
            .recognize(settings.credentials(provider), self.transport.as_ref(), image)
            .await?;
        info!("{} 识别完成，共 {} 行", provider.display_name(), text.lines().count());
        Ok(text)
    }
}
