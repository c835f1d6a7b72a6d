use std::io::Write;

use clap::{CommandFactory, Parser};
use futures::StreamExt;
use rc2docker::{
    cli::{styles::AnsiStyles, Rc2DockerArgs, Rc2DockerSubcommand},
    config::ManagerConfig,
    manager::DockerManager,
    transport::{LogEntry, LogStream},
    utils::env,
    DockerResult,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> DockerResult<()> {
    dotenvy::dotenv().ok();

    let args = Rc2DockerArgs::parse();

    // `RUST_LOG` wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "rc2docker=debug" } else { "rc2docker=info" })
    });
    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let Some(subcommand) = args.subcommand else {
        Rc2DockerArgs::command().print_help()?;
        return Ok(());
    };

    let config = ManagerConfig::builder()
        .endpoint(env::get_docker_host()?)
        .monitor_events(matches!(subcommand, Rc2DockerSubcommand::Events))
        .build();
    let manager = DockerManager::new(config)?;

    match &subcommand {
        Rc2DockerSubcommand::Version => {
            let version = manager.api().load_version().await?;
            println!("{version}");
        }
        Rc2DockerSubcommand::Init => {
            let necessary = manager.initialize(args.refresh).await?;
            println!("{}", manager.state().to_string().valid());
            if necessary {
                println!("images need to be pulled, run `{}`", "rc2docker pull".literal());
            }
        }
        Rc2DockerSubcommand::Status => {
            manager.initialize(args.refresh).await?;
            print_status(&manager);
        }
        Rc2DockerSubcommand::Pull => {
            manager.initialize(args.refresh).await?;
            pull(&manager).await?;
        }
        Rc2DockerSubcommand::Outdated => {
            manager.initialize(args.refresh).await?;
            for record in manager.outdated_containers() {
                println!("{} uses image {}", record.kind(), short_id(&record.image_id()));
            }
        }
        Rc2DockerSubcommand::RemoveOutdated => {
            manager.initialize(args.refresh).await?;
            for kind in manager.remove_outdated_containers().await? {
                println!("removed {}", kind.to_string().literal());
            }
        }
        Rc2DockerSubcommand::Logs { kind, follow } => {
            manager.initialize(args.refresh).await?;
            if *follow {
                let mut entries = manager.stream_log(*kind).await?;
                while let Some(entry) = entries.next().await {
                    print_log_entry(&entry?)?;
                }
            } else {
                for entry in manager.fetch_log(*kind).await? {
                    print_log_entry(&entry)?;
                }
            }
        }
        Rc2DockerSubcommand::Events => {
            let mut changes = manager.subscribe_changes();
            manager.initialize(args.refresh).await?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    change = changes.recv() => match change {
                        Ok(change) => println!(
                            "{}: {} -> {}",
                            change.kind.to_string().header(),
                            change.old_state,
                            change.new_state
                        ),
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!("missed {missed} container changes")
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        }
        Rc2DockerSubcommand::Backup { path } => {
            manager.initialize(args.refresh).await?;
            let written = manager.backup_database(path).await?;
            println!("wrote {written} bytes to {}", path.display());
        }
        lifecycle => {
            manager.initialize(args.refresh).await?;
            perform(&manager, lifecycle).await?;
        }
    }

    manager.shutdown();
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn perform(manager: &DockerManager, subcommand: &Rc2DockerSubcommand) -> DockerResult<()> {
    let Some((operation, kinds)) = subcommand.operation() else {
        return Ok(());
    };

    let kinds = (!kinds.is_empty()).then_some(kinds);
    tracing::trace!("performing {operation}: kinds={kinds:?}");
    manager.perform_all(operation, kinds).await?;

    if matches!(subcommand, Rc2DockerSubcommand::Start { wait: true, .. }) {
        manager.wait_until_running(None).await?;
        manager.wait_until_db_running().await?;
    }
    Ok(())
}

fn print_status(manager: &DockerManager) {
    if let Some(version) = manager.version() {
        println!("{} {version}", "engine:".header());
    }
    if let Some(info) = manager.image_info() {
        println!("{} version {}", "manifest:".header(), info.get_version());
    }
    if let Some(error) = manager.last_manifest_error() {
        println!("{} {error}", "manifest fetch failed:".invalid());
    }

    for record in manager.containers() {
        let state = record.state();
        let state = if state.exists() {
            state.to_string().valid()
        } else {
            state.to_string().invalid()
        };
        println!(
            "{:<10} {:<14} {}",
            record.kind().to_string(),
            state,
            short_id(&record.id())
        );
    }

    if manager.pull_is_necessary() {
        println!("images need to be pulled, run `{}`", "rc2docker pull".literal());
    }
}

async fn pull(manager: &DockerManager) -> DockerResult<()> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    if manager.pull_is_necessary() {
        manager
            .pull_images(cancel, |progress| {
                eprint!(
                    "\r{} ({}/{}) {:>5.1}%",
                    progress.get_image(),
                    progress.get_index() + 1,
                    progress.get_count(),
                    progress.fraction() * 100.0
                );
            })
            .await?;
        eprintln!();
    }

    for kind in manager.prepare_containers().await? {
        println!("created {}", kind.to_string().literal());
    }
    Ok(())
}

fn print_log_entry(entry: &LogEntry) -> DockerResult<()> {
    match entry.stream {
        LogStream::Stdout => std::io::stdout().write_all(&entry.data)?,
        LogStream::Stderr => std::io::stderr().write_all(&entry.data)?,
    }
    Ok(())
}

fn short_id(id: &str) -> &str {
    id.strip_prefix("sha256:").unwrap_or(id).get(..12).unwrap_or(id)
}
