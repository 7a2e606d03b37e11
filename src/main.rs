//! IQIDE 命令行入口
//!
//! - `iqide exec "restart nginx"`：确定性路径
//! - `iqide exec --agentic "refactor the parser module"`：编排引擎
//! - `iqide approve <session> --yes|--no`：对挂起的操作提交审批
//! - `iqide repl`：交互模式（`:agentic` / `:hardcoded` 切换，`:approve` / `:reject` 审批）

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use iqide::agent::{build_command_center, load_config_or_default};
use iqide::{CommandCenter, RoutingMode};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "iqide", version, about = "IQIDE Command Center")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 以 JSON 输出完整响应
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行一条请求
    Exec {
        /// 请求文本
        text: Vec<String>,
        /// 使用编排引擎（默认走确定性路径）
        #[arg(long)]
        agentic: bool,
        /// 会话 ID（不填则新建）
        #[arg(long)]
        session: Option<String>,
    },
    /// 对挂起的操作提交审批
    Approve {
        session: String,
        #[arg(long, conflicts_with = "no", required_unless_present = "no")]
        yes: bool,
        #[arg(long)]
        no: bool,
    },
    /// 列出确定性路径支持的动作
    Actions,
    /// 列出已注册的工具
    Tools,
    /// 交互模式
    Repl {
        #[arg(long)]
        agentic: bool,
    },
}

fn print_response<T: Serialize>(json: bool, success: bool, message: &str, session_id: &str, full: &T) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(full).context("Failed to serialize response")?);
    } else {
        println!("{}", message);
        if !success {
            eprintln!("(session: {})", session_id);
        }
    }
    Ok(())
}

async fn repl(center: &CommandCenter, agentic: bool, json: bool) -> anyhow::Result<()> {
    let mut mode = if agentic {
        RoutingMode::Agentic
    } else {
        RoutingMode::Hardcoded
    };
    let mut session_id: Option<String> = None;
    let stdin = std::io::stdin();

    println!("IQIDE Command Center ({} mode). Type :help for commands.", mode.as_str());
    loop {
        print!("iqide> ");
        std::io::stdout().flush().context("stdout")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("stdin")? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":exit" | "exit" | "quit" => break,
            ":help" => {
                println!(":agentic | :hardcoded   switch routing mode");
                println!(":approve | :reject      decide on a pending operation");
                println!(":session                show the current session id");
                println!(":quit                   leave");
            }
            ":agentic" => mode = RoutingMode::Agentic,
            ":hardcoded" => mode = RoutingMode::Hardcoded,
            ":session" => println!("{}", session_id.as_deref().unwrap_or("(none)")),
            ":approve" | ":reject" => {
                let Some(id) = session_id.as_deref() else {
                    println!("No session yet.");
                    continue;
                };
                let resp = center.approve(id, line == ":approve").await;
                print_response(json, resp.success, &resp.message, &resp.session_id, &resp)?;
            }
            request => {
                let resp = center.execute(session_id.as_deref(), request, mode).await;
                session_id = Some(resp.session_id.clone());
                print_response(json, resp.success, &resp.message, &resp.session_id, &resp)?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    iqide::observability::init_stderr();

    let cli = Cli::parse();
    let cfg = load_config_or_default(cli.config.clone());
    let center = build_command_center(cfg).context("Failed to build command center")?;

    match cli.command {
        Commands::Exec { text, agentic, session } => {
            let request = text.join(" ");
            let mode = if agentic {
                RoutingMode::Agentic
            } else {
                RoutingMode::Hardcoded
            };
            let resp = center.execute(session.as_deref(), &request, mode).await;
            print_response(cli.json, resp.success, &resp.message, &resp.session_id, &resp)?;
            if !resp.success {
                std::process::exit(1);
            }
        }
        Commands::Approve { session, yes, no } => {
            let approved = yes && !no;
            let resp = center.approve(&session, approved).await;
            print_response(cli.json, resp.success, &resp.message, &resp.session_id, &resp)?;
            if !resp.success {
                std::process::exit(1);
            }
        }
        Commands::Actions => {
            for action in center.supported_actions() {
                println!("{}", action);
            }
        }
        Commands::Tools => {
            for tool in center.available_tools() {
                println!("{}", tool);
            }
        }
        Commands::Repl { agentic } => repl(&center, agentic, cli.json).await?,
    }

    Ok(())
}
