use anyhow::Context;
use autohosts::config::cli::{
    Cli, Command, HostsCommand, ScheduleCommand, SourcesCommand, TimeoutCommand,
};
use autohosts::domain::model::SourceUpdate;
use autohosts::domain::ports::{SettingsStore, SourceRegistry};
use autohosts::utils::error::{AutoHostsError, ErrorCategory};
use autohosts::utils::logger;
use autohosts::{AppConfig, AutoHosts, Result};
use clap::Parser;
use serde::Serialize;
use std::time::Duration;

const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI args: {:?}", cli);

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let app = AutoHosts::from_config(&config).context("failed to initialize autohosts")?;

    if let Err(e) = run(&app, cli.command).await {
        tracing::error!("❌ {} (Category: {:?}, Kind: {:?})", e, e.category(), e.kind());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(exit_code(&e));
    }

    Ok(())
}

fn exit_code(error: &AutoHostsError) -> i32 {
    match error.category() {
        ErrorCategory::Validation => 2,
        ErrorCategory::Process => 1,
        ErrorCategory::Fetch => 3,
        ErrorCategory::Persistence => 4,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(app: &AutoHosts, command: Command) -> Result<()> {
    match command {
        Command::Serve => serve(app).await,
        Command::Sync { timeout_ms } => {
            let report = app.orchestrator.fetch_now(timeout_ms).await?;
            println!("✅ {}", report.message);
            Ok(())
        }
        Command::Status => print_json(&app.supervisor.status().await),
        Command::Start => {
            let pid = app.supervisor.start().await?;
            println!("✅ DNSMasq started (pid {})", pid);
            Ok(())
        }
        Command::Stop => {
            let outcome = app.supervisor.stop().await?;
            println!("✅ {}", outcome.message());
            Ok(())
        }
        Command::Restart => {
            let pid = app.supervisor.restart().await?;
            println!("✅ DNSMasq restarted (pid {})", pid);
            Ok(())
        }
        Command::Logs => {
            print!("{}", app.supervisor.logs().await);
            Ok(())
        }
        Command::Hosts(command) => hosts(app, command).await,
        Command::Schedule(ScheduleCommand::Show) => {
            println!("{}", app.current_settings().await.cron_expression);
            Ok(())
        }
        Command::Schedule(ScheduleCommand::Set { expression }) => {
            // 只寫入設定；執行中的 serve 會自己重新載入
            app.settings.set_cron_expression(&expression).await?;
            println!("✅ Schedule set to {}", expression.trim());
            Ok(())
        }
        Command::Timeout(TimeoutCommand::Show) => {
            println!("{}", app.current_settings().await.fetch_timeout_ms);
            Ok(())
        }
        Command::Timeout(TimeoutCommand::Set { timeout_ms }) => {
            app.settings.set_fetch_timeout_ms(timeout_ms).await?;
            println!("✅ Fetch timeout set to {} ms", timeout_ms);
            Ok(())
        }
        Command::Sources(command) => sources(app, command).await,
    }
}

async fn serve(app: &AutoHosts) -> Result<()> {
    let expression = app.start_schedule().await?;
    tracing::info!("🚀 autohosts serving, hosts fetch schedule: {}", expression);

    let mut poll = tokio::time::interval(SETTINGS_POLL_INTERVAL);
    poll.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = poll.tick() => {
                if let Err(e) = app.reload_schedule().await {
                    tracing::warn!("⚠️ Keeping current schedule: {}", e);
                }
            }
        }
    }

    tracing::info!("🛑 Shutting down");
    app.shutdown().await;
    Ok(())
}

async fn hosts(app: &AutoHosts, command: HostsCommand) -> Result<()> {
    match command {
        HostsCommand::Show => {
            print!("{}", app.hosts_content().await);
            Ok(())
        }
        HostsCommand::Stats => print_json(&app.hosts_stats().await),
        HostsCommand::Path { new_path: None } => {
            println!("{}", app.hosts_path().await.display());
            Ok(())
        }
        HostsCommand::Path {
            new_path: Some(path),
        } => {
            let stored = app.set_hosts_path(&path).await?;
            println!("✅ Hosts file path set to {}", stored.display());
            Ok(())
        }
    }
}

async fn sources(app: &AutoHosts, command: SourcesCommand) -> Result<()> {
    match command {
        SourcesCommand::List => print_json(&app.registry.list_all().await),
        SourcesCommand::Add { url, name } => {
            print_json(&app.registry.add(&url, name.as_deref()).await?)
        }
        SourcesCommand::Update(args) => {
            let update = SourceUpdate {
                url: args.url,
                name: args.name,
                enabled: args.enabled,
            };
            print_json(&app.registry.update(&args.id, update).await?)
        }
        SourcesCommand::Remove { id } => {
            let removed = app.registry.remove(&id).await?;
            println!("✅ Removed {}", removed.url);
            Ok(())
        }
        SourcesCommand::Toggle { id } => print_json(&app.registry.toggle(&id).await?),
    }
}
