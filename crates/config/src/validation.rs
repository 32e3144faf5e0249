use crate::{ConfigError, ConfigResult};

/// 配置校验
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// 规划占位用户，不允许作为操作用户
const RESERVED_USER_ID: &str = "planning_user";

pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// 闭区间 [min, max]
    pub fn validate_range(value: u64, min: u64, max: u64, field_name: &str) -> ConfigResult<()> {
        if value < min || value > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be between {min} and {max}, got {value}"
            )));
        }
        Ok(())
    }

    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        Self::validate_range(timeout_seconds, 1, 3600, field_name)
    }

    pub fn validate_count(count: usize, field_name: &str) -> ConfigResult<()> {
        Self::validate_range(count as u64, 1, 10_000, field_name)
    }

    pub fn validate_sqlite_url(url: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(url, field_name)?;
        if !url.starts_with("sqlite:") {
            return Err(ConfigError::Validation(format!(
                "{field_name} must start with sqlite:"
            )));
        }
        Ok(())
    }

    /// 用户ID不能为空，也不能是规划占位用户
    pub fn validate_user_id(user_id: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(user_id, field_name)?;
        if user_id == RESERVED_USER_ID {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be the reserved user {RESERVED_USER_ID}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("x", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_range_is_inclusive() {
        assert!(ValidationUtils::validate_range(1, 1, 5, "n").is_ok());
        assert!(ValidationUtils::validate_range(5, 1, 5, "n").is_ok());
        assert!(ValidationUtils::validate_range(6, 1, 5, "n").is_err());
        assert!(ValidationUtils::validate_count(0, "n").is_err());
        assert!(ValidationUtils::validate_count(10_001, "n").is_err());
        assert!(ValidationUtils::validate_timeout_seconds(3601, "t").is_err());
    }

    #[test]
    fn test_validate_sqlite_url() {
        assert!(ValidationUtils::validate_sqlite_url("sqlite::memory:", "url").is_ok());
        assert!(ValidationUtils::validate_sqlite_url("sqlite://a.db", "url").is_ok());
        assert!(ValidationUtils::validate_sqlite_url("postgres://x", "url").is_err());
        assert!(ValidationUtils::validate_sqlite_url("", "url").is_err());
    }

    #[test]
    fn test_validate_user_id_rejects_placeholder() {
        assert!(ValidationUtils::validate_user_id("admin", "user").is_ok());
        assert!(ValidationUtils::validate_user_id("planning_user", "user").is_err());
        let err = ValidationUtils::validate_user_id("", "user").unwrap_err();
        assert!(err.to_string().contains("user"));
    }
}
