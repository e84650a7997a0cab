//! Ping Bot 主程序入口

use anyhow::{Context, Result};
use clap::Parser;
use ping_bot::cli::args::{Args, Commands};
use ping_bot::cli::commands::{
    Command, RunCommand, SendOnceCommand, ValidateCommand, VersionCommand,
};
use ping_bot::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig {
        level: args.log_level.clone().into(),
        file_path: args.log_file.clone(),
        json_format: args.json_logs,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Ping Bot v{} 启动", ping_bot::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match args.command() {
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::SendOnce { .. } => Box::new(SendOnceCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await
}
