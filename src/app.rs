use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use task_assigning_application::{ExecutePlanningResult, PlanningCommand, PlanningExecutor};
use task_assigning_config::AppConfig;
use task_assigning_domain::{
    ChainSolution, FindTasksQuery, PlanningItem, Resource, SolutionBuilder, TaskData,
    TaskInputVariablesReadMode, TaskQueryService, TaskStatus, UnitOfWorkFactory,
    PLANNING_USER_ENTITY_ID,
};
use task_assigning_infrastructure::{DatabaseManager, SqliteTaskQueryHelper, SqliteUnitOfWorkFactory};
use tracing::{info, warn};

/// 主应用程序：把配置、数据库与计划执行器组装在一起
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    query_service: Arc<SqliteTaskQueryHelper>,
    uow_factory: Arc<SqliteUnitOfWorkFactory>,
    executor: PlanningExecutor,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序，数据库: {}", config.database.url);

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("执行数据库迁移失败")?;

        let query_service = database.task_query_service();
        let uow_factory = database.unit_of_work_factory();
        let executor = PlanningExecutor::new(
            query_service.clone(),
            uow_factory.clone(),
            config.planning.summary_page_size,
        );

        Ok(Self {
            config,
            database,
            query_service,
            uow_factory,
            executor,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn import_tasks(&self, tasks: &[TaskData]) -> Result<usize> {
        let repository = self.database.task_repository();
        for task in tasks {
            repository
                .save(task)
                .await
                .with_context(|| format!("导入任务 {} 失败", task.task_id))?;
        }
        info!("已导入 {} 个任务", tasks.len());
        Ok(tasks.len())
    }

    pub async fn import_tasks_from_file(&self, path: &Path) -> Result<usize> {
        let tasks: Vec<TaskData> = read_json_file(path)?;
        self.import_tasks(&tasks).await
    }

    pub async fn list_tasks(
        &self,
        statuses: &[TaskStatus],
        page: u32,
        with_inputs: bool,
    ) -> Result<Vec<TaskData>> {
        let mode = if with_inputs {
            TaskInputVariablesReadMode::ReadForAll
        } else {
            TaskInputVariablesReadMode::DontRead
        };
        let query = FindTasksQuery::new(self.config.planning.default_page_size)
            .with_statuses(statuses)
            .with_page(page)
            .with_input_variables_mode(mode);
        self.query_service
            .find_tasks(&query)
            .await
            .context("查询任务失败")
    }

    /// 逐页读取全部活跃任务
    pub async fn load_active_tasks(&self) -> Result<Vec<TaskData>> {
        let page_size = self.config.planning.default_page_size;
        let mut tasks = Vec::new();
        let mut page = 0;
        loop {
            let query = FindTasksQuery::new(page_size)
                .with_statuses(&TaskStatus::ACTIVE)
                .with_page(page)
                .with_input_variables_mode(
                    TaskInputVariablesReadMode::ReadForActiveTasksWithNoPlanningEntity,
                );
            let batch = self
                .query_service
                .find_tasks(&query)
                .await
                .context("读取活跃任务失败")?;
            let done = batch.len() < page_size as usize;
            tasks.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(tasks)
    }

    pub async fn build_solution(&self) -> Result<ChainSolution> {
        let tasks = self.load_active_tasks().await?;
        let resources = known_resources(&tasks);
        SolutionBuilder::new()
            .with_resources(resources)
            .with_tasks(tasks)
            .build()
            .context("构建分配链失败")
    }

    pub async fn save_decision(
        &self,
        task_id: i64,
        assigned_user: &str,
        index: i32,
        published: bool,
    ) -> Result<()> {
        self.run_command(PlanningCommand::SaveDecision {
            task_id,
            assigned_user: assigned_user.to_string(),
            index,
            published,
        })
        .await
    }

    pub async fn delete_decision(&self, task_id: i64) -> Result<()> {
        self.run_command(PlanningCommand::DeleteDecision { task_id })
            .await
    }

    /// 以配置中的操作用户身份委派任务
    pub async fn delegate(
        &self,
        task_id: i64,
        target_user: &str,
        index: i32,
        published: bool,
    ) -> Result<()> {
        self.run_command(PlanningCommand::DelegateAndSave {
            task_id,
            acting_user: self.config.planning.acting_user_id.clone(),
            target_user: target_user.to_string(),
            index,
            published,
        })
        .await
    }

    pub async fn execute_plan(&self, items: &[PlanningItem]) -> ExecutePlanningResult {
        self.executor
            .execute_planning(items, &self.config.planning.acting_user_id)
            .await
    }

    pub async fn execute_plan_from_file(&self, path: &Path) -> Result<ExecutePlanningResult> {
        let items: Vec<PlanningItem> = read_json_file(path)?;
        Ok(self.execute_plan(&items).await)
    }

    pub async fn close(&self) {
        self.database.close().await;
    }

    async fn run_command(&self, command: PlanningCommand) -> Result<()> {
        let uow = self.uow_factory.begin().await.context("开启工作单元失败")?;
        match command.execute(&*uow).await {
            Ok(()) => {
                uow.commit().await.context("提交工作单元失败")?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!("回滚工作单元失败: {}", rollback_err);
                }
                Err(anyhow::Error::new(e)
                    .context(format!("执行命令失败: 任务 {}", command.task_id())))
            }
        }
    }
}

/// 以文本形式展示每个资源的链
pub fn render_chains(solution: &ChainSolution) -> String {
    let mut out = String::new();
    for (key, resource) in solution.resources() {
        let _ = write!(out, "{} (ID: {})", resource.entity_id(), resource.id());
        if resource.is_immutable() {
            out.push_str(" [占位]");
        }
        out.push('\n');

        for task_key in solution.chain_of(key) {
            let task = solution.task(task_key);
            let _ = writeln!(
                out,
                "  #{:<6} {:<24} {:<10} 开始 {:>3} 结束 {:>3}{}{}",
                task.id(),
                task.name(),
                task.status().as_str(),
                solution.start_time(task_key).unwrap_or(0),
                solution.end_time(task_key).unwrap_or(0),
                if task.is_pinned() { " 固定" } else { "" },
                if task.is_published() { " 已发布" } else { "" },
            );
        }
    }

    let unassigned = solution.unassigned_tasks().count();
    if unassigned > 0 {
        let _ = writeln!(out, "未分配: {} 个任务", unassigned);
    }
    out
}

/// 任务的实际所有者与决策中出现过的用户，ID 按用户名顺序从 1 开始
pub fn known_resources(tasks: &[TaskData]) -> Vec<Resource> {
    let users: BTreeSet<&str> = tasks
        .iter()
        .flat_map(|task| {
            let decided = task.planning_task.as_ref().map(|p| p.assigned_user.as_str());
            task.actual_owner.as_deref().into_iter().chain(decided)
        })
        .filter(|user| !user.is_empty() && *user != PLANNING_USER_ENTITY_ID)
        .collect();

    users
        .into_iter()
        .zip(1..)
        .map(|(user, id)| Resource::new(id, user))
        .collect()
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取文件失败: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("解析JSON失败: {}", path.display()))
}
