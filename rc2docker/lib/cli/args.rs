use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    cli::styles,
    models::{ContainerKind, ContainerOperation},
};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `rc2docker` provisions and controls the Rc2 service containers on the local docker engine
#[derive(Debug, Parser)]
#[command(name = "rc2docker", author, version, styles=styles::styles())]
pub struct Rc2DockerArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<Rc2DockerSubcommand>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Always fetch the image manifest, ignoring the update interval
    #[arg(long, global = true)]
    pub refresh: bool,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Rc2DockerSubcommand {
    /// Show the docker engine version
    #[command(name = "version")]
    Version,

    /// Initialize and report whether images need to be pulled
    #[command(name = "init")]
    Init,

    /// Show the state of the service containers
    #[command(name = "status")]
    Status,

    /// Pull the images the manifest requires and create missing containers
    #[command(name = "pull")]
    Pull,

    /// Start containers
    #[command(name = "start")]
    Start {
        /// Containers to start (all if omitted)
        #[arg(value_name = "KIND")]
        kinds: Vec<ContainerKind>,

        /// Wait until the containers and the database are up
        #[arg(short, long)]
        wait: bool,
    },

    /// Stop containers
    #[command(name = "stop")]
    Stop {
        /// Containers to stop (all if omitted)
        #[arg(value_name = "KIND")]
        kinds: Vec<ContainerKind>,
    },

    /// Pause containers
    #[command(name = "pause")]
    Pause {
        /// Containers to pause (all if omitted)
        #[arg(value_name = "KIND")]
        kinds: Vec<ContainerKind>,
    },

    /// Resume paused containers
    #[command(name = "resume")]
    Resume {
        /// Containers to resume (all if omitted)
        #[arg(value_name = "KIND")]
        kinds: Vec<ContainerKind>,
    },

    /// Restart containers
    #[command(name = "restart")]
    Restart {
        /// Containers to restart (all if omitted)
        #[arg(value_name = "KIND")]
        kinds: Vec<ContainerKind>,
    },

    /// List containers whose image is older than the manifest's
    #[command(name = "outdated")]
    Outdated,

    /// Stop and remove the outdated containers
    #[command(name = "remove-outdated")]
    RemoveOutdated,

    /// Print a container's log
    #[command(name = "logs")]
    Logs {
        /// The container
        #[arg(value_name = "KIND")]
        kind: ContainerKind,

        /// Keep following the log
        #[arg(short, long)]
        follow: bool,
    },

    /// Print container state changes as they happen
    #[command(name = "events")]
    Events,

    /// Dump the database to a file
    #[command(name = "backup")]
    Backup {
        /// Where to write the dump
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl Rc2DockerSubcommand {
    /// The lifecycle operation and target kinds, for the subcommands that map to one.
    pub fn operation(&self) -> Option<(ContainerOperation, &[ContainerKind])> {
        match self {
            Self::Start { kinds, .. } => Some((ContainerOperation::Start, kinds.as_slice())),
            Self::Stop { kinds } => Some((ContainerOperation::Stop, kinds.as_slice())),
            Self::Pause { kinds } => Some((ContainerOperation::Pause, kinds.as_slice())),
            Self::Resume { kinds } => Some((ContainerOperation::Resume, kinds.as_slice())),
            Self::Restart { kinds } => Some((ContainerOperation::Restart, kinds.as_slice())),
            _ => None,
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_operation_with_kinds() -> anyhow::Result<()> {
        let args = Rc2DockerArgs::try_parse_from(["rc2docker", "stop", "dbserver", "compute"])?;
        let subcommand = args.subcommand.expect("subcommand");
        let (operation, kinds) = subcommand.operation().expect("operation");

        assert_eq!(operation, ContainerOperation::Stop);
        assert_eq!(kinds, &[ContainerKind::Database, ContainerKind::Compute]);
        Ok(())
    }

    #[test]
    fn test_args_reject_unknown_kind() {
        assert!(Rc2DockerArgs::try_parse_from(["rc2docker", "start", "webserver"]).is_err());
    }

    #[test]
    fn test_args_logs_follow() -> anyhow::Result<()> {
        let args = Rc2DockerArgs::try_parse_from(["rc2docker", "-v", "logs", "appserver", "-f"])?;
        assert!(args.verbose);
        assert!(matches!(
            args.subcommand,
            Some(Rc2DockerSubcommand::Logs {
                kind: ContainerKind::AppServer,
                follow: true
            })
        ));
        Ok(())
    }
}
