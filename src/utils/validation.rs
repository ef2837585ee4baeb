use crate::utils::error::{AutoHostsError, Result};
use cron::Schedule;
use std::str::FromStr;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(AutoHostsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(AutoHostsError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(AutoHostsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(AutoHostsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(AutoHostsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_minimum(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(AutoHostsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AutoHostsError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

fn cron_error(expression: &str, reason: impl Into<String>) -> AutoHostsError {
    AutoHostsError::InvalidCronError {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn day_number(expression: &str, token: &str) -> Result<usize> {
    match token.parse::<usize>() {
        Ok(day) if day <= 7 => Ok(day % 7),
        _ => Err(cron_error(
            expression,
            format!("day of week '{}' must be between 0 and 7", token),
        )),
    }
}

/// 標準 cron 的星期是 0-7（0 與 7 都是週日），`cron` crate 則是 1-7 從週日開始。
/// 數字一律展開成英文縮寫，名稱保持原樣。
fn translate_day_of_week(expression: &str, field: &str) -> Result<String> {
    let mut days: Vec<&str> = Vec::new();

    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            days.push(item);
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => match step.parse::<usize>() {
                Ok(step) if step > 0 => (range, step),
                _ => return Err(cron_error(expression, format!("invalid step in '{}'", item))),
            },
            None => (item, 1),
        };

        let (start, end) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((a, b)) => (day_number(expression, a)?, day_number(expression, b)?),
                // `5/2` 表示從 5 開始到週六
                None if item.contains('/') => (day_number(expression, range)?, 6),
                None => {
                    let day = day_number(expression, range)?;
                    (day, day)
                }
            },
        };

        // `1-7` 的 7 是週日，放在範圍尾端
        let end = if end == 0 && start > 0 { 7 } else { end };
        if start > end {
            return Err(cron_error(expression, format!("day range '{}' is reversed", item)));
        }

        for day in (start..=end).step_by(step) {
            let name = DAY_NAMES[day % 7];
            if !days.contains(&name) {
                days.push(name);
            }
        }
    }

    Ok(days.join(","))
}

/// 解析 5 欄位 cron（分 時 日 月 週）。`cron` crate 需要秒欄位，所以補上 `0`。
pub fn parse_cron_expression(expression: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(cron_error(
            expression,
            format!("expected 5 fields, found {}", fields.len()),
        ));
    }

    let day_of_week = translate_day_of_week(expression, fields[4])?;
    let normalized = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    );
    Schedule::from_str(&normalized).map_err(|e| cron_error(expression, e.to_string()))
}
