//! `watch` mode: poll for blocking applications and print every change.

use anyhow::{Context, Result};
use clap::Args;
use deploykit_core::process::{ProcessDefinition, ProcessToClose};
use deploykit_core::{CallerContext, RunningProcessService};
use std::io::Write;
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Process to watch, as `name` or `name=description`; repeatable
    #[arg(long = "process", value_name = "NAME[=DESCRIPTION]", required = true, value_parser = parse_definition)]
    processes: Vec<ProcessDefinition>,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Stop after this many intervals (runs until Ctrl+C when omitted)
    #[arg(long)]
    polls: Option<u32>,
}

fn parse_definition(value: &str) -> std::result::Result<ProcessDefinition, String> {
    let definition = match value.split_once('=') {
        Some((name, description)) => {
            ProcessDefinition::new(name).and_then(|d| d.with_description(description))
        }
        None => ProcessDefinition::new(value),
    };
    definition.map_err(|e| e.to_string())
}

pub async fn run(args: WatchArgs) -> Result<()> {
    let interval = Duration::from_millis(args.interval_ms);
    let service = RunningProcessService::new(args.processes, interval, CallerContext::current())
        .context("invalid watch configuration")?;
    let mut feed = service.subscribe();
    service.start()?;

    let deadline = args.polls.map(|polls| interval * polls);
    let stop_after = async {
        match deadline {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_after);

    loop {
        tokio::select! {
            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = feed.borrow_and_update().clone();
                print_list(&list)?;
            }
            _ = &mut stop_after => {
                info!("Watch finished after {:?}", deadline.unwrap_or_default());
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    service.stop()?;
    Ok(())
}

fn print_list(list: &[ProcessToClose]) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if list.is_empty() {
        writeln!(out, "No matching processes are running.")?;
    } else {
        for process in list {
            writeln!(
                out,
                "{}\t{}\t{}",
                process.description,
                process.name,
                process.path.display()
            )?;
        }
    }
    writeln!(out, "--")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_definition() {
        let definition = parse_definition("winword=Microsoft Word").unwrap();
        assert_eq!(definition.name(), "winword");
        assert_eq!(definition.description(), Some("Microsoft Word"));

        let definition = parse_definition("C:\\Tools\\app.exe").unwrap();
        assert!(definition.is_path());
        assert_eq!(definition.description(), None);

        assert!(parse_definition("=Nameless").is_err());
        assert!(parse_definition("excel=").is_err());
    }
}
