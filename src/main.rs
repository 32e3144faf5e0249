use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use task_assigning::{render_chains, Application};
use task_assigning_config::AppConfig;
use task_assigning_domain::TaskStatus;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const STATUS_VALUES: [&str; 10] = [
    "Created",
    "Ready",
    "Reserved",
    "InProgress",
    "Suspended",
    "Completed",
    "Failed",
    "Error",
    "Exited",
    "Obsolete",
];

fn build_cli() -> Command {
    let task_id = || {
        Arg::new("task-id")
            .value_name("TASK_ID")
            .help("任务ID")
            .required(true)
            .value_parser(value_parser!(i64))
    };
    let user = || {
        Arg::new("user")
            .value_name("USER")
            .help("用户ID")
            .required(true)
    };
    let index = || {
        Arg::new("index")
            .long("index")
            .value_name("N")
            .help("任务在用户链中的位置")
            .default_value("0")
            .value_parser(value_parser!(i32))
    };
    let published = || {
        Arg::new("published")
            .long("published")
            .help("决策已发布给用户")
            .action(ArgAction::SetTrue)
    };

    Command::new("task-assigning")
        .version("1.0.0")
        .about("任务分配链模型与分配决策同步服务")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，默认取配置文件中的值")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，默认取配置文件中的值")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(Command::new("migrate").about("创建数据库表"))
        .subcommand(Command::new("show-config").about("输出生效的配置"))
        .subcommand(
            Command::new("import-tasks").about("从JSON文件导入任务记录").arg(
                Arg::new("file")
                    .value_name("FILE")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        )
        .subcommand(
            Command::new("list-tasks")
                .about("分页列出任务")
                .arg(
                    Arg::new("status")
                        .short('s')
                        .long("status")
                        .value_name("STATUS")
                        .help("按状态过滤，可重复")
                        .action(ArgAction::Append)
                        .value_parser(STATUS_VALUES),
                )
                .arg(
                    Arg::new("page")
                        .long("page")
                        .value_name("N")
                        .default_value("0")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("with-inputs")
                        .long("with-inputs")
                        .help("同时读取任务输入变量")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("show-chains").about("由当前任务与决策构建分配链并展示"))
        .subcommand(
            Command::new("save-decision")
                .about("保存分配决策")
                .arg(task_id())
                .arg(user())
                .arg(index())
                .arg(published()),
        )
        .subcommand(
            Command::new("delete-decision")
                .about("删除分配决策")
                .arg(task_id()),
        )
        .subcommand(
            Command::new("delegate")
                .about("委派任务并保存分配决策")
                .arg(task_id())
                .arg(user())
                .arg(index())
                .arg(published()),
        )
        .subcommand(
            Command::new("execute-plan").about("执行JSON文件中的计划").arg(
                Arg::new("file")
                    .value_name("FILE")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path).context("加载配置失败")?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.logging.level.to_string());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.logging.format.to_string());
    init_logging(&log_level, &log_format)?;

    match matches.subcommand() {
        Some(("show-config", _)) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Some((name, sub_matches)) => {
            let app = Application::new(config).await?;
            let result = run_subcommand(&app, name, sub_matches).await;
            app.close().await;
            result
        }
        None => Err(anyhow::anyhow!("缺少子命令")),
    }
}

async fn run_subcommand(app: &Application, name: &str, matches: &ArgMatches) -> Result<()> {
    match name {
        "migrate" => {
            info!("数据库迁移完成");
        }
        "import-tasks" => {
            let file = required::<PathBuf>(matches, "file")?;
            let count = app.import_tasks_from_file(file).await?;
            println!("已导入 {count} 个任务");
        }
        "list-tasks" => {
            let statuses = matches
                .get_many::<String>("status")
                .unwrap_or_default()
                .map(|s| s.parse::<TaskStatus>().map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()?;
            let page = *required::<u32>(matches, "page")?;
            let tasks = app
                .list_tasks(&statuses, page, matches.get_flag("with-inputs"))
                .await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        "show-chains" => {
            let solution = app.build_solution().await?;
            print!("{}", render_chains(&solution));
        }
        "save-decision" => {
            let task_id = *required::<i64>(matches, "task-id")?;
            let user = required::<String>(matches, "user")?;
            let index = *required::<i32>(matches, "index")?;
            app.save_decision(task_id, user, index, matches.get_flag("published"))
                .await?;
            println!("已保存任务 {task_id} 的分配决策");
        }
        "delete-decision" => {
            let task_id = *required::<i64>(matches, "task-id")?;
            app.delete_decision(task_id).await?;
            println!("已删除任务 {task_id} 的分配决策");
        }
        "delegate" => {
            let task_id = *required::<i64>(matches, "task-id")?;
            let user = required::<String>(matches, "user")?;
            let index = *required::<i32>(matches, "index")?;
            app.delegate(task_id, user, index, matches.get_flag("published"))
                .await?;
            println!("已将任务 {task_id} 委派给 {user}");
        }
        "execute-plan" => {
            let file = required::<PathBuf>(matches, "file")?;
            let result = app.execute_plan_from_file(file).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.has_error() {
                return Err(anyhow::anyhow!(
                    "计划执行失败: {}",
                    result.error_message.unwrap_or_default()
                ));
            }
        }
        other => return Err(anyhow::anyhow!("不支持的子命令: {other}")),
    }
    Ok(())
}

fn required<'a, T: Clone + Send + Sync + 'static>(
    matches: &'a ArgMatches,
    name: &str,
) -> Result<&'a T> {
    matches
        .get_one::<T>(name)
        .with_context(|| format!("缺少参数: {name}"))
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_parse_delegate_arguments() {
        let matches = build_cli()
            .try_get_matches_from([
                "task-assigning",
                "--log-level",
                "debug",
                "delegate",
                "42",
                "alice",
                "--index",
                "3",
                "--published",
            ])
            .unwrap();

        assert_eq!(
            matches.get_one::<String>("log-level").map(String::as_str),
            Some("debug")
        );
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "delegate");
        assert_eq!(*sub.get_one::<i64>("task-id").unwrap(), 42);
        assert_eq!(sub.get_one::<String>("user").unwrap(), "alice");
        assert_eq!(*sub.get_one::<i32>("index").unwrap(), 3);
        assert!(sub.get_flag("published"));
    }

    #[test]
    fn test_list_tasks_rejects_unknown_status() {
        let result = build_cli().try_get_matches_from([
            "task-assigning",
            "list-tasks",
            "--status",
            "Running",
        ]);
        assert!(result.is_err());
    }
}
