// main.rs — 程序入口
// 负责初始化日志与异步运行时、解析命令行参数、分发子命令

mod cli;

// 初始化多语言支持，嵌入 locales 目录下的所有翻译
rust_i18n::i18n!("locales");

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, ConfigAction, FetchArgs};
use rust_i18n::t;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wallfetch::config::{AppConfig, Overrides};
use wallfetch::download::Downloader;
use wallfetch::orchestrator::{Orchestrator, RunRequest, RunSummary};
use wallfetch::shutdown::{ShutdownCoordinator, SharedShutdown};
use wallfetch::source::{DEFAULT_USER_AGENT, SourceKind, build_source};

/// 被 Ctrl+C 中断时的退出码
const EXIT_INTERRUPTED: i32 = 130;

/// 初始化日志：RUST_LOG 优先，其次配置中的 log_level；`-v` 强制 debug
/// LOG_FORMAT=json 时输出 JSON 行
fn init_tracing(verbose: bool, log_level: &str) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let filter = if verbose {
        EnvFilter::new("wallfetch=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("wallfetch={log_level}")))
    };

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// `#[tokio::main]` 宏将 async main 转换为同步 main + tokio 运行时
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 自动检测系统语言并设置
    let locale = std::env::var("LANG").unwrap_or_else(|_| "en".to_string());
    if locale.starts_with("zh") {
        rust_i18n::set_locale("zh-CN");
    } else {
        rust_i18n::set_locale("en");
    }

    let cli = Cli::parse();

    // 配置加载失败时也先把日志建起来，再返回错误
    let config = AppConfig::load(cli.config.as_deref());
    let log_level = config.as_ref().map(|c| c.log_level.as_str()).unwrap_or("info");
    init_tracing(cli.verbose, log_level);
    let mut config = config?;

    match &cli.command {
        Commands::Fetch(args) => {
            let shutdown = ShutdownCoordinator::shared();
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Ctrl+C received, cancelling downloads");
                        shutdown.request_shutdown();
                    }
                }
            });

            let code = handle_fetch(&config, args, shutdown).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Sources => handle_sources(&config),

        Commands::Config { action } => handle_config(&mut config, action)?,

        Commands::Completions { shell } => {
            generate(
                *shell,
                &mut Cli::command(),
                "wallfetch",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// 返回进程退出码
async fn handle_fetch(
    config: &AppConfig,
    args: &FetchArgs,
    shutdown: SharedShutdown,
) -> Result<i32, Box<dyn std::error::Error>> {
    let mut kinds: Vec<SourceKind> = Vec::new();
    let requested = if args.sources.is_empty() {
        &config.sources
    } else {
        &args.sources
    };
    for kind in requested {
        if !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }

    // 一个 Key 不可能同时属于多个站点
    let api_key = match (&args.api_key, kinds.len()) {
        (Some(_), n) if n > 1 => {
            warn!("--api-key ignored because more than one source was selected");
            None
        }
        (key, _) => key.clone(),
    };

    let overrides = Overrides {
        download_dir: args.output.clone(),
        rate_limit: args.rate_limit,
        max_concurrent: args.max_concurrent,
        timeout: args.timeout,
        api_key,
    };

    let mut search = config.search_options()?;
    if args.query.is_some() {
        search.query = args.query.clone();
    }
    if args.category.is_some() {
        search.category = args.category.clone();
    }
    if args.resolution.is_some() {
        search.resolution = args.resolution.clone();
    }
    if let Some(orientation) = args.orientation {
        search.orientation = orientation;
    }

    let request = RunRequest {
        download_dir: config.download_dir_with(&overrides),
        search,
        pages: args.pages.unwrap_or(config.search_defaults.pages).max(1),
        limit: args.limit.or(config.search_defaults.limit),
    };

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
        .build()?;

    let mut orchestrator = Orchestrator::new(Some(shutdown.clone()));
    for kind in kinds {
        let plan = config.plan_source(kind, &overrides)?;
        let source = build_source(kind, client.clone(), plan.settings.clone());
        let downloader = Downloader::new(client.clone(), plan.max_concurrent)
            .with_timeout(plan.settings.timeout)
            .with_rate_limiter(source.rate_limiter())
            .with_shutdown(shutdown.clone());
        orchestrator.add_source(source, downloader);
    }

    println!(
        "{}",
        t!(
            "fetch_start",
            sources => orchestrator.source_names().join(", "),
            dir => request.download_dir.display()
        )
    );

    let summary = orchestrator.run(&request).await;
    print_summary(&summary);

    if shutdown.is_shutdown_requested() {
        println!("{}", t!("interrupted"));
        return Ok(EXIT_INTERRUPTED);
    }

    let nothing_worked =
        summary.succeeded() == 0 && (summary.failed() > 0 || !summary.failed_sources().is_empty());
    Ok(if nothing_worked { 1 } else { 0 })
}

fn print_summary(summary: &RunSummary) {
    for (source, error) in summary.failed_sources() {
        println!("{}", t!("source_failed", source => source, error => error));
    }

    for path in summary.paths() {
        println!("{}", t!("save_path", path => path.display()));
    }

    let failures = summary.failures();
    if !failures.is_empty() {
        println!("{}", t!("failures_title", count => failures.len()));
        for (title, reason) in failures {
            println!("  {title}: {reason}");
        }
    }

    println!(
        "{}",
        t!(
            "fetch_done",
            downloaded => summary.downloaded(),
            skipped => summary.skipped(),
            failed => summary.failed()
        )
    );
}

fn handle_sources(config: &AppConfig) {
    println!("{}", t!("sources_title"));
    println!("{}", "-".repeat(30));
    for kind in SourceKind::ALL {
        let status = if config.credential(kind).is_some() {
            t!("credential_set")
        } else if kind.requires_credential() {
            t!("credential_missing", env => kind.credential_env())
        } else {
            t!("credential_optional", env => kind.credential_env())
        };
        println!(
            "{}",
            t!(
                "source_line",
                name => kind.name(),
                interval => kind.default_rate_limit().as_secs_f64(),
                concurrency => kind.default_max_concurrent(),
                status => status
            )
        );
    }
}

fn handle_config(
    config: &mut AppConfig,
    action: &ConfigAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            println!("{}", t!("config_title"));
            println!(
                "{}",
                t!("config_path", path => config.config_path.display())
            );
            println!(
                "{}",
                t!("config_download_dir", path => config.download_dir.display())
            );
            let sources: Vec<&str> = config.sources.iter().map(|k| k.name()).collect();
            println!("{}", t!("config_sources", sources => sources.join(", ")));
            println!(
                "{}",
                t!("config_timeout", secs => config.timeout.as_secs())
            );
            println!("{}", t!("config_search_defaults"));
            let defaults = &config.search_defaults;
            let query_str = defaults.query.as_deref().unwrap_or("None");
            println!("{}", t!("config_query", query => query_str));
            let res_str = defaults.resolution.as_deref().unwrap_or("None");
            println!("{}", t!("config_res", res => res_str));
            println!(
                "{}",
                t!("config_sorting", sorting => defaults.sorting)
            );
        }
        ConfigAction::Schema => {
            println!("{}", AppConfig::get_schema());
        }
        ConfigAction::Dump => {
            println!("{}", config.to_toml());
        }
        ConfigAction::Set { key, value } => {
            if let Err(e) = config.set(key, value) {
                return Err(t!("config_error_set", key => key, error => e).into());
            }
            println!("{}", t!("config_updated", key => key, value => value));
        }
    }
    Ok(())
}
