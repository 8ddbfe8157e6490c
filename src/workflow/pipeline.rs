use std::future::Future;
use tokio::time::{Duration, timeout};
use tracing::{error, info, warn};

use crate::error::{HelperError, Result};
use crate::history::{HistoryRecord, HistoryStore};
use crate::image::ImageData;
use crate::ocr::OcrService;
use crate::settings::{ProviderKind, Settings};
use crate::solver::Solver;
use crate::vendor::Stage;

const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_SOLVE_TIMEOUT: Duration = Duration::from_secs(120);

/// 一次完整的分析：识别 -> 解题 -> 保存历史
#[derive(Clone)]
pub struct Pipeline {
    ocr: OcrService,
    solver: Solver,
    history: HistoryStore,
    ocr_timeout: Duration,
    solve_timeout: Duration,
}

async fn with_deadline<T>(
    limit: Duration,
    stage: Stage,
    provider: ProviderKind,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("⏱️ {} 请求超时（{} 秒）", provider.display_name(), limit.as_secs_f32());
            Err(stage.failure(provider, format!("请求超时（{} 秒）", limit.as_secs_f32())))
        }
    }
}

impl Pipeline {
    pub fn new(ocr: OcrService, solver: Solver, history: HistoryStore) -> Self {
        Self {
            ocr,
            solver,
            history,
            ocr_timeout: DEFAULT_OCR_TIMEOUT,
            solve_timeout: DEFAULT_SOLVE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, ocr_timeout: Duration, solve_timeout: Duration) -> Self {
        self.ocr_timeout = ocr_timeout;
        self.solve_timeout = solve_timeout;
        self
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn analyze(
        &self,
        settings: &Settings,
        image: ImageData,
        user_answer: Option<&str>,
    ) -> Result<HistoryRecord> {
        settings.validate()?;
        let provider = settings.ai_provider;
        let user_answer = user_answer.map(str::trim).filter(|a| !a.is_empty());

        info!("🔍 开始识别图片（{}）...", provider.display_name());
        let text = with_deadline(
            self.ocr_timeout,
            Stage::Recognize,
            provider,
            self.ocr.recognize(settings, &image),
        )
        .await?;
        if text.trim().is_empty() {
            warn!("图片中没有识别到文字");
            return Err(HelperError::EmptyRecognition);
        }

        info!("🧠 开始解题...");
        let answers = with_deadline(
            self.solve_timeout,
            Stage::Generate,
            provider,
            self.solver.generate(settings, &text, user_answer),
        )
        .await?;

        let record = HistoryRecord::new(&image, &text, answers);
        if let Err(e) = self.history.insert(record.clone()) {
            error!("保存历史记录失败: {}", e);
        }
        info!("✅ 分析完成，共 {} 道题", record.question_count);
        Ok(record)
    }
}
