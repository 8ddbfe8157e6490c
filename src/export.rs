use std::fmt::Write;

use crate::model::{AnswerSet, Question};

/// 把解答导出为 Markdown 文本
pub fn to_markdown(answers: &AnswerSet) -> String {
    let mut out = String::from("# 作业解题答案\n");
    if answers.is_empty() {
        out.push_str("\n没有可导出的题目\n");
        return out;
    }
    for question in &answers.questions {
        out.push('\n');
        write_question(&mut out, question);
    }
    out
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() { placeholder } else { value }
}

fn write_question(out: &mut String, q: &Question) {
    // 写入 String 不会失败
    let _ = writeln!(out, "## 第 {} 题\n", or_placeholder(&q.number, "?"));
    let _ = writeln!(out, "{}\n", or_placeholder(&q.question, "题目内容"));

    out.push_str("### 一、解题思路\n\n");
    if q.solution_steps.is_empty() {
        out.push_str("无详细解题步骤\n");
    } else {
        for (idx, step) in q.solution_steps.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", idx + 1, step);
        }
    }

    let _ = writeln!(out, "\n### 二、完整答案\n\n{}", or_placeholder(&q.final_answer, "答案"));

    if let Some(correction) = q.correction.as_ref() {
        out.push_str("\n### 答案纠错\n\n");
        let _ = writeln!(out, "你的答案: {}", or_placeholder(&correction.user_answer, "未提供"));
        if correction.is_correct {
            out.push_str("\n✓ 回答正确\n");
        } else {
            for error in &correction.errors {
                let _ = write!(out, "\n- 错误: {} - 应为 {}", error.position, error.correct_value);
                if let Some(explanation) = error.explanation.as_deref().filter(|e| !e.is_empty()) {
                    let _ = write!(out, "（{}）", explanation);
                }
            }
            out.push('\n');
        }
    }

    if !q.knowledge_points.is_empty() {
        out.push_str("\n### 三、考察知识点\n\n");
        let _ = writeln!(out, "{}", q.knowledge_points.join("、"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Correction, ErrorDetail};

    fn question() -> Question {
        Question {
            number: "1".to_string(),
            question: "What is 2+2?".to_string(),
            solution_steps: vec!["2 加 2".to_string(), "等于 4".to_string()],
            final_answer: "4".to_string(),
            knowledge_points: vec!["加法".to_string(), "整数".to_string()],
            correction: None,
        }
    }

    #[test]
    fn test_markdown_sections() {
        let markdown = to_markdown(&AnswerSet { questions: vec![question()] });
        assert!(markdown.starts_with("# 作业解题答案\n"));
        assert!(markdown.contains("## 第 1 题\n\nWhat is 2+2?\n"));
        assert!(markdown.contains("1. 2 加 2\n2. 等于 4\n"));
        assert!(markdown.contains("### 二、完整答案\n\n4\n"));
        assert!(markdown.contains("加法、整数"));
        assert!(!markdown.contains("答案纠错"), "没有批改信息时不输出纠错部分");
    }

    #[test]
    fn test_markdown_correction_block() {
        let mut q = question();
        q.correction = Some(Correction {
            user_answer: "five".to_string(),
            is_correct: false,
            errors: vec![ErrorDetail {
                position: "答案错误".to_string(),
                user_value: "five".to_string(),
                correct_value: "4".to_string(),
                explanation: Some("2+2=4".to_string()),
            }],
        });
        let markdown = to_markdown(&AnswerSet { questions: vec![q] });
        assert!(markdown.contains("你的答案: five"));
        assert!(markdown.contains("- 错误: 答案错误 - 应为 4（2+2=4）"));
    }

    #[test]
    fn test_markdown_placeholders() {
        let q = Question { number: "1".to_string(), ..Default::default() };
        let markdown = to_markdown(&AnswerSet { questions: vec![q] });
        assert!(markdown.contains("题目内容"));
        assert!(markdown.contains("无详细解题步骤"));
        assert!(!markdown.contains("三、考察知识点"));

        assert!(to_markdown(&AnswerSet::default()).contains("没有可导出的题目"));
    }
}
