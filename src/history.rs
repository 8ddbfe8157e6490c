//! 历史记录：最新的记录在前，最多保留 [`MAX_RECORDS`] 条

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::image::ImageData;
use crate::model::AnswerSet;
use crate::storage::KeyValueStore;
use crate::utils::text::truncate_chars;

pub const HISTORY_KEY: &str = "homework_history";
pub const MAX_RECORDS: usize = 100;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// 原图的 data URI
    pub image: String,
    #[serde(alias = "ocrResult")]
    pub extracted_text: String,
    #[serde(alias = "aiResult")]
    pub answer_set: AnswerSet,
    #[serde(default)]
    pub question_count: usize,
}

impl HistoryRecord {
    pub fn new(image: &ImageData, extracted_text: &str, answer_set: AnswerSet) -> Self {
        let timestamp = Utc::now();
        // 毫秒时间戳加随机后缀，同一毫秒内的记录也不会重复
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}-{}", timestamp.timestamp_millis(), &suffix[..8]),
            timestamp,
            image: image.as_data_uri().to_string(),
            extracted_text: extracted_text.to_string(),
            question_count: answer_set.len(),
            answer_set,
        }
    }

    /// 列表中显示的预览：第一道题的题目
    pub fn preview_text(&self) -> String {
        match self.answer_set.questions.first() {
            Some(first) => truncate_chars(&first.question, PREVIEW_CHARS),
            None => "无法识别题目内容".to_string(),
        }
    }
}

/// 相对时间：刚刚 / N分钟前 / N小时前 / N天前，超过一周显示本地日期
pub fn format_relative(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_relative_in(timestamp, now, &Local)
}

fn format_relative_in<Tz: TimeZone>(timestamp: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let diff = now.signed_duration_since(timestamp);
    if diff.num_hours() < 1 {
        let minutes = diff.num_minutes();
        return if minutes < 1 {
            "刚刚".to_string()
        } else {
            format!("{}分钟前", minutes)
        };
    }
    if diff.num_days() < 1 {
        return format!("{}小时前", diff.num_hours());
    }
    if diff.num_days() < 7 {
        return format!("{}天前", diff.num_days());
    }
    timestamp.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

/// 历史记录的读写，每次修改后整体保存
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// 全部记录，最新的在前；保存的内容损坏时返回空列表
    pub fn all(&self) -> Result<Vec<HistoryRecord>> {
        let Some(saved) = self.store.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&saved) {
            Ok(records) => Ok(records),
            Err(e) => {
                error!("解析历史记录失败: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn save_all(&self, records: &[HistoryRecord]) -> Result<()> {
        let raw = serde_json::to_string(records).map_err(anyhow::Error::from)?;
        self.store.set(HISTORY_KEY, &raw)?;
        Ok(())
    }

    /// 插入到最前面，超出上限时丢弃最旧的记录
    pub fn insert(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.all()?;
        records.insert(0, record);
        if records.len() > MAX_RECORDS {
            debug!("历史记录超过 {} 条，丢弃 {} 条最旧记录", MAX_RECORDS, records.len() - MAX_RECORDS);
            records.truncate(MAX_RECORDS);
        }
        self.save_all(&records)
    }

    pub fn add(&self, image: &ImageData, extracted_text: &str, answer_set: AnswerSet) -> Result<HistoryRecord> {
        let record = HistoryRecord::new(image, extracted_text, answer_set);
        self.insert(record.clone())?;
        info!("已保存历史记录 {}", record.id);
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<HistoryRecord>> {
        Ok(self.all()?.into_iter().find(|r| r.id == id))
    }

    /// 删除单条记录，返回是否存在
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.all()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save_all(&records)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(HISTORY_KEY)?;
        Ok(())
    }
}
