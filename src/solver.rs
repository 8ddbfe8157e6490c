//! 解题：构造提示词，调用当前服务商的对话接口，再交给 [`crate::normalize`] 归一化

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{AnswerSet, Correction, ErrorDetail};
use crate::normalize::{NormalizeOutcome, extract_json_object, normalize_detailed};
use crate::settings::{Settings, ensure_complete};
use crate::transport::HttpTransport;
use crate::vendor::{ChatPrompt, VendorRegistry};

const SYSTEM_PROMPT_HEAD: &str = r#"你是一个专业的作业辅导AI助手。请按照以下JSON格式输出答案，不要输出任何其他内容："#;

const ANSWER_SCHEMA: &str = r#"{
  "questions": [
    {
      "number": "题目序号",
      "question": "题目内容",
      "solutionSteps": ["解题步骤1", "解题步骤2", ...],
      "finalAnswer": "最终答案",
      "knowledgePoints": ["知识点1", "知识点2", ...]
    }
  ]
}"#;

const ANSWER_SCHEMA_WITH_CORRECTION: &str = r#"{
  "questions": [
    {
      "number": "题目序号",
      "question": "题目内容",
      "solutionSteps": ["解题步骤1", "解题步骤2", ...],
      "finalAnswer": "最终答案",
      "knowledgePoints": ["知识点1", "知识点2", ...],
      "correction": {
        "userAnswer": "用户答案",
        "isCorrect": true,
        "errors": [
          { "position": "错误位置", "userValue": "用户的值", "correctValue": "正确的值", "explanation": "错误原因" }
        ]
      }
    }
  ]
}"#;

const BASE_RULES: [&str; 7] = [
    "识别每个题目，按顺序编号",
    "提供详细的解题步骤",
    "给出正确的最终答案",
    "列出本题考察的知识点",
    "确保输出的JSON格式正确，可以被JSON.parse()解析",
    "对于数学题，用标准数学符号",
    "对于选择题，说明每个选项的正误原因",
];

const CORRECTION_RULE: &str = "用户提供了答案，需要分析其正确性，并在correction字段中标注错误位置";

const CORRECTION_SYSTEM_PROMPT: &str = "你是一个严谨的作业批改助手，只输出JSON，不要输出任何其他内容。";
const FALLBACK_POSITION: &str = "整体";
const FALLBACK_EXPLANATION: &str = "无法进行详细纠错，请参考正确答案";

/// 解题用的系统提示词；只有提供了用户答案时才要求模型判断对错
pub fn system_prompt(with_user_answer: bool) -> String {
    let schema = if with_user_answer {
        ANSWER_SCHEMA_WITH_CORRECTION
    } else {
        ANSWER_SCHEMA
    };
    let mut rules: Vec<&str> = BASE_RULES.to_vec();
    if with_user_answer {
        rules.push(CORRECTION_RULE);
    }
    let rules = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {}", i + 1, rule))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n{}\n\n要求：\n{}", SYSTEM_PROMPT_HEAD, schema, rules)
}

/// 解题提示词：系统指令 + 识别出的题目（以及用户答案）
pub fn build_solve_prompt(question_text: &str, user_answer: Option<&str>) -> ChatPrompt {
    let user_answer = user_answer.filter(|a| !a.trim().is_empty());
    let task = format!(
        "请解答以下作业题目，并提供详细的解题步骤和知识点：\n\n{}\n\n请严格按照指定的JSON格式输出答案。",
        question_text
    );
    let user = match user_answer {
        Some(answer) => format!("{}\n\n用户答案：\n{}", task, answer),
        None => task,
    };
    ChatPrompt {
        system: system_prompt(user_answer.is_some()),
        user,
    }
}

/// 让模型比对用户答案和正确答案的提示词
pub fn build_correction_prompt(question: &str, user_answer: &str, correct_answer: &str) -> ChatPrompt {
    let user = format!(
        r#"请分析以下题目和用户答案，指出用户答案中的错误：

题目：{}

用户答案：{}

正确答案：{}

请返回JSON格式：
{{
  "isCorrect": true/false,
  "errors": [
    {{
      "position": "错误位置描述",
      "userValue": "用户的错误值",
      "correctValue": "正确值",
      "explanation": "错误原因说明"
    }}
  ]
}}"#,
        question, user_answer, correct_answer
    );
    ChatPrompt {
        system: CORRECTION_SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// 模型批改的返回结构
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelVerdict {
    is_correct: bool,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

/// 解析模型的批改结果；结构不对时返回 `None`
fn parse_verdict(raw: &str, user_answer: &str) -> Option<Correction> {
    let candidate = extract_json_object(raw)?;
    let verdict: ModelVerdict = serde_json::from_str(candidate)
        .map_err(|e| warn!("解析批改结果失败: {}", e))
        .ok()?;
    // 答对时不保留错误列表
    let errors = if verdict.is_correct {
        Vec::new()
    } else {
        verdict.errors
    };
    Some(Correction {
        user_answer: user_answer.to_string(),
        is_correct: verdict.is_correct,
        errors,
    })
}

fn fallback_correction(user_answer: &str, correct_answer: &str) -> Correction {
    Correction {
        user_answer: user_answer.to_string(),
        is_correct: false,
        errors: vec![ErrorDetail {
            position: FALLBACK_POSITION.to_string(),
            user_value: user_answer.to_string(),
            correct_value: correct_answer.to_string(),
            explanation: Some(FALLBACK_EXPLANATION.to_string()),
        }],
    }
}

/// 按当前服务商解题
#[derive(Clone)]
pub struct Solver {
    registry: Arc<VendorRegistry>,
    transport: Arc<dyn HttpTransport>,
}

impl Solver {
    pub fn new(registry: Arc<VendorRegistry>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    async fn ask(&self, settings: &Settings, prompt: &ChatPrompt) -> Result<String> {
        let provider = settings.ai_provider;
        ensure_complete(settings, provider)?;
        let vendor = self.registry.vendor(provider);
        debug!("提示词长度: 系统 {} 字，用户 {} 字", prompt.system.chars().count(), prompt.user.chars().count());
        vendor
            .complete(settings.credentials(provider), self.transport.as_ref(), prompt)
            .await
    }

    /// 解答题目并归一化为 [`AnswerSet`]，结果至少包含一道题
    pub async fn generate(
        &self,
        settings: &Settings,
        question_text: &str,
        user_answer: Option<&str>,
    ) -> Result<AnswerSet> {
        let prompt = build_solve_prompt(question_text, user_answer);
        let raw = self.ask(settings, &prompt).await?;

        let (answers, outcome) = normalize_detailed(&raw, user_answer, settings.enable_correction);
        match outcome {
            NormalizeOutcome::Parsed => info!("✅ 解题完成，共 {} 道题", answers.len()),
            NormalizeOutcome::Degraded(reason) => {
                warn!("⚠️ 模型输出无法解析 ({:?})，返回降级结果", reason)
            }
        }
        Ok(answers)
    }

    /// 让模型逐项比对用户答案；任何失败都返回指向正确答案的通用纠错结果
    pub async fn smart_correct(
        &self,
        settings: &Settings,
        question: &str,
        user_answer: &str,
        correct_answer: &str,
    ) -> Correction {
        let prompt = build_correction_prompt(question, user_answer, correct_answer);
        match self.ask(settings, &prompt).await {
            Ok(raw) => parse_verdict(&raw, user_answer).unwrap_or_else(|| {
                warn!("智能纠错结果无法解析，返回通用结果");
                fallback_correction(user_answer, correct_answer)
            }),
            Err(e) => {
                warn!("智能纠错失败: {}", e);
                fallback_correction(user_answer, correct_answer)
            }
        }
    }
}
