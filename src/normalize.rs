//! 模型输出的归一化与答案比对
//!
//! 模型的回复是自由文本，其中可能夹着一段 JSON。这里负责把它变成 [`AnswerSet`]：
//! 能解析就用解析结果，不能解析就返回只含一道占位题目的降级结果，绝不返回错误。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{AnswerSet, Correction, ErrorDetail, Question};
use crate::utils::text::truncate_chars;

/// 降级结果中的答案占位
pub const ANSWER_UNAVAILABLE: &str = "无法生成答案";
/// 答案比对不一致时的错误位置
pub const POSITION_ANSWER_INCORRECT: &str = "答案错误";

const NO_JSON_HINT: &str = "AI无法解析题目，请检查图片清晰度";
const MALFORMED_JSON_HINT: &str = "AI响应格式异常，请稍后重试";
const NO_JSON_PREVIEW_CHARS: usize = 100;
const MALFORMED_JSON_PREVIEW_CHARS: usize = 200;

static IGNORED_IN_ANSWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s,，.。;；:：()（）]").expect("答案比对正则无效"));

/// 降级原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// 文本中找不到 `{...}`
    NoJson,
    /// 找到了但解析失败，或者没有任何可用的题目
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeOutcome {
    Parsed,
    Degraded(DegradeReason),
}

/// 取第一个 `{` 到最后一个 `}` 之间的内容
///
/// 这是贪婪匹配：模型输出多个 JSON 对象，或者说明文字里带花括号时，可能截出无效内容。
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// 去掉空白和中英文标点后忽略大小写比较
pub fn check_answer(correct_answer: &str, user_answer: &str) -> bool {
    normalize_answer(correct_answer) == normalize_answer(user_answer)
}

fn normalize_answer(answer: &str) -> String {
    IGNORED_IN_ANSWER.replace_all(answer, "").to_lowercase()
}

/// 把模型输出归一化为解题结果
pub fn normalize(raw: &str, user_answer: Option<&str>, correction_enabled: bool) -> AnswerSet {
    normalize_detailed(raw, user_answer, correction_enabled).0
}

pub fn normalize_detailed(
    raw: &str,
    user_answer: Option<&str>,
    correction_enabled: bool,
) -> (AnswerSet, NormalizeOutcome) {
    let Some(candidate) = extract_json_object(raw) else {
        warn!("模型输出中没有 JSON，使用降级结果");
        return degraded(raw, DegradeReason::NoJson);
    };

    let mut answers = match serde_json::from_str::<AnswerSet>(candidate) {
        Ok(answers) if !answers.is_empty() => answers,
        Ok(_) => {
            warn!("模型输出的 JSON 中没有题目，使用降级结果");
            return degraded(raw, DegradeReason::Malformed);
        }
        Err(e) => {
            warn!("解析模型输出失败: {}，使用降级结果", e);
            return degraded(raw, DegradeReason::Malformed);
        }
    };
    debug!("解析到 {} 道题目", answers.len());

    if correction_enabled {
        if let Some(user_answer) = user_answer.map(str::trim).filter(|a| !a.is_empty()) {
            add_correction(&mut answers, user_answer);
        }
    }

    (answers, NormalizeOutcome::Parsed)
}

/// 用简单的文本比对给每道题附上纠错结果
///
/// 只比较最终答案的字面是否一致，不做语义判断。
pub fn add_correction(answers: &mut AnswerSet, user_answer: &str) {
    for question in answers
        .questions
        .iter_mut()
        .filter(|q| !q.final_answer.is_empty())
    {
        question.correction = Some(compare_answer(&question.final_answer, user_answer));
    }
}

fn compare_answer(final_answer: &str, user_answer: &str) -> Correction {
    let is_correct = check_answer(final_answer, user_answer);
    let errors = if is_correct {
        Vec::new()
    } else {
        vec![ErrorDetail {
            position: POSITION_ANSWER_INCORRECT.to_string(),
            user_value: user_answer.to_string(),
            correct_value: final_answer.to_string(),
            explanation: None,
        }]
    };
    Correction {
        user_answer: user_answer.to_string(),
        is_correct,
        errors,
    }
}

fn degraded(raw: &str, reason: DegradeReason) -> (AnswerSet, NormalizeOutcome) {
    let (preview_chars, hint) = match reason {
        DegradeReason::NoJson => (NO_JSON_PREVIEW_CHARS, NO_JSON_HINT),
        DegradeReason::Malformed => (MALFORMED_JSON_PREVIEW_CHARS, MALFORMED_JSON_HINT),
    };
    let answers = AnswerSet {
        questions: vec![Question {
            number: "1".to_string(),
            question: truncate_chars(raw, preview_chars),
            solution_steps: vec![hint.to_string()],
            final_answer: ANSWER_UNAVAILABLE.to_string(),
            knowledge_points: Vec::new(),
            correction: None,
        }],
    };
    (answers, NormalizeOutcome::Degraded(reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VENDOR_REPLY: &str = r#"{"questions":[{"number":"1","question":"What is 2+2?","solutionSteps":["Add 2 and 2"],"finalAnswer":"4","knowledgePoints":["addition"]}]}"#;

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("前言 {\"a\":1} 后记"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("```json\n{\"a\":{\"b\":2}}\n```"), Some("{\"a\":{\"b\":2}}"));
        assert_eq!(extract_json_object("没有 JSON"), None);
        assert_eq!(extract_json_object("} 反了 {"), None);
        // 贪婪匹配会把两个对象连同中间的文字一起截出
        assert_eq!(extract_json_object("{\"a\":1} 和 {\"b\":2}"), Some("{\"a\":1} 和 {\"b\":2}"));
    }

    #[test]
    fn test_check_answer_ignores_spacing_punctuation_and_case() {
        assert!(check_answer("x = 5, y = 3", "x=5,y=3"));
        assert!(check_answer("（A）", "a"));
        assert!(check_answer("答：x＝2。", "答x＝2"), "全角句号和冒号应该被忽略");
        assert!(!check_answer("5", "six"));
        assert!(!check_answer("x=5", "x=6"));
    }

    #[test]
    fn test_parsed_without_user_answer_has_no_correction() {
        let (answers, outcome) = normalize_detailed(VENDOR_REPLY, None, true);
        assert_eq!(outcome, NormalizeOutcome::Parsed);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers.questions[0].final_answer, "4");
        assert!(answers.questions[0].correction.is_none());
    }

    #[test]
    fn test_correct_user_answer() {
        let answers = normalize(VENDOR_REPLY, Some("4"), true);
        let correction = answers.questions[0].correction.as_ref().expect("应该有纠错结果");
        assert!(correction.is_correct);
        assert!(correction.errors.is_empty());
        assert_eq!(correction.user_answer, "4");
    }

    #[test]
    fn test_wrong_user_answer() {
        let answers = normalize(VENDOR_REPLY, Some("five"), true);
        let correction = answers.questions[0].correction.as_ref().expect("应该有纠错结果");
        assert!(!correction.is_correct);
        assert_eq!(correction.errors.len(), 1);
        assert_eq!(correction.errors[0].correct_value, "4");
        assert_eq!(correction.errors[0].user_value, "five");
        assert_eq!(correction.errors[0].position, POSITION_ANSWER_INCORRECT);
    }

    #[test]
    fn test_correction_disabled_or_empty_answer() {
        let answers = normalize(VENDOR_REPLY, Some("five"), false);
        assert!(answers.questions[0].correction.is_none(), "关闭纠错时不应该比对");
        let answers = normalize(VENDOR_REPLY, Some(""), true);
        assert!(answers.questions[0].correction.is_none(), "空答案不应该比对");
    }

    #[test]
    fn test_blank_answer_is_not_graded() {
        let answers = normalize(VENDOR_REPLY, Some("  \n "), true);
        assert!(answers.questions[0].correction.is_none(), "只有空白的答案不应该比对");

        let answers = normalize(VENDOR_REPLY, Some(" 4 "), true);
        let correction = answers.questions[0].correction.as_ref().unwrap();
        assert!(correction.is_correct);
        assert_eq!(correction.user_answer, "4");
    }

    #[test]
    fn test_loosely_shaped_reply_is_still_parsed() {
        let raw = r#"{"questions":[{"number":"1","solutionSteps":"Add 2 and 2","finalAnswer":"4"}]}"#;
        let (answers, outcome) = normalize_detailed(raw, Some("4"), true);
        assert_eq!(outcome, NormalizeOutcome::Parsed, "字段形状不规范不应该降级");
        let q = &answers.questions[0];
        assert_eq!(q.final_answer, "4");
        assert_eq!(q.solution_steps, vec!["Add 2 and 2"]);
        assert!(q.correction.as_ref().unwrap().is_correct);

        let raw = r#"{"questions":[{"number":1,"finalAnswer":["x=1","y=2"],"knowledgePoints":"方程组"}]}"#;
        let (answers, outcome) = normalize_detailed(raw, Some("x=1，y=2"), true);
        assert_eq!(outcome, NormalizeOutcome::Parsed);
        let q = &answers.questions[0];
        assert_eq!(q.final_answer, "x=1, y=2");
        assert_eq!(q.knowledge_points, vec!["方程组"]);
        assert!(q.correction.as_ref().unwrap().is_correct, "多个答案拼接后应该能比对");
    }

    #[test]
    fn test_questions_without_final_answer_are_not_corrected() {
        let raw = r#"{"questions":[{"number":"1","finalAnswer":""},{"number":"2","finalAnswer":"7"}]}"#;
        let answers = normalize(raw, Some("7"), true);
        assert!(answers.questions[0].correction.is_none());
        assert!(answers.questions[1].correction.as_ref().unwrap().is_correct);
    }

    #[test]
    fn test_idempotent_on_canonical_input() {
        let first = normalize(VENDOR_REPLY, None, true);
        let serialized = serde_json::to_string(&first).unwrap();
        let second = normalize(&serialized, None, true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_prose_degrades_to_sentinel() {
        let (answers, outcome) = normalize_detailed("Sorry, I cannot process this image", None, true);
        assert_eq!(outcome, NormalizeOutcome::Degraded(DegradeReason::NoJson));
        assert_eq!(answers.len(), 1);
        let q = &answers.questions[0];
        assert_eq!(q.final_answer, ANSWER_UNAVAILABLE);
        assert_eq!(q.question, "Sorry, I cannot process this image");
        assert_eq!(q.solution_steps, vec![NO_JSON_HINT.to_string()]);
        assert!(q.knowledge_points.is_empty());
    }

    #[test]
    fn test_malformed_json_preview_is_truncated() {
        let raw = format!("{{\"questions\": [ {}", "题".repeat(300)) + "}";
        let (answers, outcome) = normalize_detailed(&raw, None, true);
        assert_eq!(outcome, NormalizeOutcome::Degraded(DegradeReason::Malformed));
        let preview = &answers.questions[0].question;
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), MALFORMED_JSON_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_never_fails_on_arbitrary_input() {
        let inputs = [
            "",
            "   ",
            "纯文字说明，没有任何结构",
            "{",
            "}",
            "{\"questions\": [",
            "{\"questions\": []}",
            "{}",
            "{\"questions\": \"none\"}",
            "{\"a\": {\"b\": {\"c\": {\"questions\": [{\"number\": 1}]}}}}",
            "[1, 2, 3]",
            "{\"questions\":[{\"number\":\"1\"}]} 另外 {\"questions\":[]}",
            "{\"questions\":[{\"solutionSteps\": \"not a list\"}]}",
        ];
        for input in inputs {
            let answers = normalize(input, Some("4"), true);
            assert!(!answers.is_empty(), "输入 {:?} 应该至少返回一道题", input);
        }
    }
}
