use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use facegate_core::tokens::spawn_sweeper;
use tracing::info;

use crate::cli::{OutputMode, SweepArgs, TokenArgs, TokensArgs};
use crate::commands::{CommandHandler, EXIT_INVALID_TOKEN};
use crate::config::{PolicyOverrides, Runtime};
use crate::errors::AppResult;
use crate::output::{render_logout, render_sweep, render_tokens, render_validation};

#[derive(Debug, Clone)]
pub enum TokenCommand {
    Validate(TokenArgs),
    Logout(TokenArgs),
    List(TokensArgs),
    Sweep(SweepArgs),
}

pub struct TokensHandler {
    command: TokenCommand,
    config_path: Option<PathBuf>,
}

impl TokensHandler {
    pub fn new(command: TokenCommand, config_path: Option<PathBuf>) -> Self {
        Self {
            command,
            config_path,
        }
    }

    pub fn command(&self) -> &TokenCommand {
        &self.command
    }
}

impl CommandHandler for TokensHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let runtime = Runtime::open(self.config_path.as_deref(), &PolicyOverrides::default())?;
        let coordinator = &runtime.coordinator;

        match &self.command {
            TokenCommand::Validate(args) => {
                let info = coordinator.validate_token(&args.token)?;
                render_validation(info.as_ref(), mode)?;
                Ok(if info.is_some() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(EXIT_INVALID_TOKEN)
                })
            }
            TokenCommand::Logout(args) => {
                let revoked = coordinator.logout(&args.token)?;
                render_logout(revoked, mode)?;
                Ok(if revoked {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(EXIT_INVALID_TOKEN)
                })
            }
            TokenCommand::List(args) => {
                let tokens = coordinator.list_active_tokens(&args.identity)?;
                render_tokens(&args.identity, &tokens, mode)?;
                Ok(ExitCode::SUCCESS)
            }
            TokenCommand::Sweep(args) => {
                let count = coordinator.sweep_expired_tokens()?;
                render_sweep(count, mode)?;
                if args.watch {
                    let interval = args
                        .interval_secs
                        .map(|secs| Duration::from_secs(secs.max(1)))
                        .unwrap_or(runtime.config.sweep_interval);
                    let _handle = spawn_sweeper(Arc::clone(coordinator.ledger()), interval)?;
                    info!(
                        interval_secs = interval.as_secs(),
                        "watching for expired tokens; interrupt to stop"
                    );
                    loop {
                        thread::park();
                    }
                }
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
