//! 输入校验
//!
//! 在调用领域逻辑之前，对类型化的请求结构做一次完整校验，收集所有字段错误而不是遇到第一个就返回。
//! 字段级规则由 validator derive 声明，跨字段规则（如开始时间不晚于结束时间）通过 `InputSchema` 补充。

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::error::{RedemptionError, Result};

/// 字段错误集合：字段名（camelCase） -> 错误信息列表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(to_camel_case(field))
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, list) in errors.field_errors() {
            for error in list {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| error.code.to_string());
                out.add(&field, message);
            }
        }
        out
    }
}

/// 跨字段校验规则
pub trait InputSchema: Validate {
    fn check_schema(&self, _errors: &mut FieldErrors) {}
}

/// 校验输入，返回全部字段错误
pub fn validate_input<T: InputSchema>(input: &T) -> Result<()> {
    let mut errors = FieldErrors::new();
    if let Err(e) = input.validate() {
        errors.merge(FieldErrors::from(e));
    }
    input.check_schema(&mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RedemptionError::Validation(errors))
    }
}

fn to_camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "名称不能为空"))]
        name: String,
        #[validate(range(min = 1, message = "数量必须大于 0"))]
        max_total: i32,
        low: i32,
        high: i32,
    }

    impl InputSchema for Sample {
        fn check_schema(&self, errors: &mut FieldErrors) {
            if self.low > self.high {
                errors.add("high", "high 不能小于 low");
            }
        }
    }

    #[test]
    fn test_collects_all_violations() {
        let input = Sample {
            name: String::new(),
            max_total: 0,
            low: 5,
            high: 1,
        };

        match validate_input(&input) {
            Err(RedemptionError::Validation(errors)) => {
                assert_eq!(errors.len(), 3);
                assert_eq!(errors.get("name").unwrap(), ["名称不能为空"]);
                assert_eq!(errors.get("maxTotal").unwrap(), ["数量必须大于 0"]);
                assert!(errors.get("high").is_some());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_input_passes() {
        let input = Sample {
            name: "ok".to_string(),
            max_total: 1,
            low: 1,
            high: 1,
        };
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn test_field_and_schema_errors_share_a_field() {
        let input = Sample {
            name: "ok".to_string(),
            max_total: 1,
            low: 1,
            high: 0,
        };
        let mut errors = FieldErrors::new();
        errors.add("high", "已有错误");
        input.check_schema(&mut errors);

        let mut merged = FieldErrors::new();
        merged.add("name", "名称不能为空");
        merged.merge(errors);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("high").unwrap(), ["已有错误", "high 不能小于 low"]);
    }

    #[test]
    fn test_camel_case_field_names() {
        assert_eq!(to_camel_case("max_each_redeem"), "maxEachRedeem");
        assert_eq!(to_camel_case("title"), "title");
        assert_eq!(to_camel_case("_private"), "private");
    }

    #[test]
    fn test_display_and_serialize() {
        let mut errors = FieldErrors::new();
        errors.add("points", "不能为负");
        errors.add("points", "必须为整数");

        assert_eq!(errors.to_string(), "points: 不能为负, 必须为整数");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["points"][1], "必须为整数");
    }
}
