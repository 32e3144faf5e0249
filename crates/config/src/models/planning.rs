use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 计划执行相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// 执行委派操作时使用的用户
    pub acting_user_id: String,
    /// 读取任务摘要时每页的任务数
    pub summary_page_size: u32,
    /// 查询任务时默认的分页大小
    pub default_page_size: u32,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            acting_user_id: "task_assigning_admin".to_string(),
            summary_page_size: 1000,
            default_page_size: 10,
        }
    }
}

impl ConfigValidator for PlanningConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_user_id(&self.acting_user_id, "planning.acting_user_id")?;
        ValidationUtils::validate_count(
            self.summary_page_size as usize,
            "planning.summary_page_size",
        )?;
        ValidationUtils::validate_count(
            self.default_page_size as usize,
            "planning.default_page_size",
        )?;
        Ok(())
    }
}
