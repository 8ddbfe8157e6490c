use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// 解题结果：按题目顺序排列的题目列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerSet {
    #[serde(default, deserialize_with = "deserialize_questions")]
    pub questions: Vec<Question>,
}

impl AnswerSet {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// 模型返回的字段都可能缺失，缺失时取空值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// 显示用的题号，不一定是数字，也不保证唯一
    #[serde(default, deserialize_with = "deserialize_label")]
    pub number: String,
    #[serde(default, deserialize_with = "deserialize_label")]
    pub question: String,
    #[serde(default, deserialize_with = "deserialize_text_list")]
    pub solution_steps: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_label")]
    pub final_answer: String,
    #[serde(default, deserialize_with = "deserialize_text_list")]
    pub knowledge_points: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_correction", skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    #[serde(default)]
    pub user_answer: String,
    #[serde(default)]
    pub is_correct: bool,
    /// 答对时为空
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub position: String,
    #[serde(default, deserialize_with = "deserialize_label")]
    pub user_value: String,
    #[serde(default, deserialize_with = "deserialize_label")]
    pub correct_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// 标量转成字符串，null、数组、对象返回 `None`
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// 逐题解析，形状不对的题目跳过，不影响其余题目
fn deserialize_questions<'de, D>(deserializer: D) -> Result<Vec<Question>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items
        .into_iter()
        .filter_map(|item| {
            serde_json::from_value(item)
                .map_err(|e| debug!("跳过无法解析的题目: {}", e))
                .ok()
        })
        .collect())
}

// 步骤、知识点应该是字符串数组；单个字符串当作只有一项，非标量的元素跳过
fn deserialize_text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items
        .iter()
        .filter_map(scalar_text)
        .filter(|s| !s.trim().is_empty())
        .collect())
}

// 纠错结构不对时当作没有纠错信息
fn deserialize_correction<'de, D>(deserializer: D) -> Result<Option<Correction>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value)
        .map_err(|e| debug!("忽略无法解析的纠错信息: {}", e))
        .ok())
}

// 模型经常把题号、答案写成数字或数组，这里统一转成字符串，null 和对象视为空
fn deserialize_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{IgnoredAny, MapAccess, SeqAccess, Visitor};
    use std::fmt;

    struct LabelVisitor;

    impl<'de> Visitor<'de> for LabelVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string, number, boolean, array or null")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(String::new())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(String::new())
        }

        // ["x=1", "y=2"] -> "x=1, y=2"
        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut parts = Vec::new();
            while let Some(item) = seq.next_element::<Value>()? {
                if let Some(text) = scalar_text(&item).filter(|t| !t.is_empty()) {
                    parts.push(text);
                }
            }
            Ok(parts.join(", "))
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(LabelVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let set: AnswerSet = serde_json::from_str(r#"{"questions":[{"question":"1+1=?"}]}"#).unwrap();
        let q = &set.questions[0];
        assert_eq!(q.question, "1+1=?");
        assert_eq!(q.number, "");
        assert!(q.solution_steps.is_empty());
        assert!(q.correction.is_none());
    }

    #[test]
    fn test_numeric_labels_are_stringified() {
        let set: AnswerSet = serde_json::from_str(
            r#"{"questions":[{"number":2,"question":"x","finalAnswer":4.5,"knowledgePoints":[]},{"number":null}]}"#,
        )
        .unwrap();
        assert_eq!(set.questions[0].number, "2");
        assert_eq!(set.questions[0].final_answer, "4.5");
        assert_eq!(set.questions[1].number, "");
    }

    #[test]
    fn test_loosely_shaped_fields_are_kept() {
        let set: AnswerSet = serde_json::from_str(
            r#"{"questions":[
                {"number":"1","solutionSteps":"Add 2 and 2","finalAnswer":["x=1","y=2"],"knowledgePoints":["加法",3,{"k":"v"},""]},
                {"number":{"n":2},"question":"q2","correction":"正确"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(set.len(), 2, "形状不规范的题目也应该保留");

        let first = &set.questions[0];
        assert_eq!(first.solution_steps, vec!["Add 2 and 2"], "单个字符串应该当作一个步骤");
        assert_eq!(first.final_answer, "x=1, y=2");
        assert_eq!(first.knowledge_points, vec!["加法", "3"]);

        let second = &set.questions[1];
        assert_eq!(second.number, "");
        assert_eq!(second.question, "q2");
        assert!(second.correction.is_none(), "无法解析的纠错信息应该被忽略");
    }

    #[test]
    fn test_unparsable_question_is_skipped() {
        let set: AnswerSet =
            serde_json::from_str(r#"{"questions":["只是一段文字",{"number":"2","finalAnswer":"4"}]}"#).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.questions[0].number, "2");
    }

    #[test]
    fn test_serialize_uses_camel_case_and_skips_empty_correction() {
        let q = Question {
            number: "1".to_string(),
            final_answer: "4".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(value["finalAnswer"], "4");
        assert!(value.get("correction").is_none(), "没有纠错信息时不应该输出 correction 字段");
    }
}
