use std::any::Any;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use facegate_core::faces::FeatureFileExtractor;

use crate::cli::{OutputMode, RankArgs, RecognizeArgs, VerifyArgs};
use crate::commands::{decision_exit_code, CommandHandler};
use crate::config::{PolicyOverrides, Runtime};
use crate::errors::{AppError, AppResult};
use crate::output::{render_decision, render_rank};

#[derive(Debug, Clone)]
pub enum AuthCommand {
    Recognize(RecognizeArgs),
    Verify(VerifyArgs),
    Rank(RankArgs),
}

impl AuthCommand {
    fn overrides(&self) -> PolicyOverrides {
        match self {
            AuthCommand::Recognize(args) => PolicyOverrides {
                recognition_threshold: args.threshold,
                token_ttl_secs: args.ttl_secs,
                ..PolicyOverrides::default()
            },
            AuthCommand::Verify(args) => PolicyOverrides {
                verification_threshold: args.threshold,
                token_ttl_secs: args.ttl_secs,
                ..PolicyOverrides::default()
            },
            AuthCommand::Rank(args) => PolicyOverrides {
                candidate_limit: args.limit,
                ..PolicyOverrides::default()
            },
        }
    }
}

pub struct AuthHandler {
    command: AuthCommand,
    config_path: Option<PathBuf>,
}

impl AuthHandler {
    pub fn new(command: AuthCommand, config_path: Option<PathBuf>) -> Self {
        Self {
            command,
            config_path,
        }
    }

    pub fn command(&self) -> &AuthCommand {
        &self.command
    }
}

impl CommandHandler for AuthHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let runtime = Runtime::open(self.config_path.as_deref(), &self.command.overrides())?;
        let coordinator = &runtime.coordinator;

        match &self.command {
            AuthCommand::Recognize(args) => {
                let (extractor, capture) = read_capture(&args.features)?;
                let decision = coordinator.recognize_image(&extractor, &capture)?;
                render_decision(&decision, mode)?;
                Ok(decision_exit_code(&decision))
            }
            AuthCommand::Verify(args) => {
                let (extractor, capture) = read_capture(&args.features)?;
                let decision = coordinator.verify_image(&extractor, &args.identity, &capture)?;
                render_decision(&decision, mode)?;
                Ok(decision_exit_code(&decision))
            }
            AuthCommand::Rank(args) => {
                let query = FeatureFileExtractor::embed_path(&args.features)?;
                let candidates = coordinator.rank(&query)?;
                render_rank(&candidates, mode)?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Raw capture bytes plus an extractor that reports errors against `path`.
fn read_capture(path: &Path) -> AppResult<(FeatureFileExtractor, Vec<u8>)> {
    let capture = fs::read(path).map_err(|source| AppError::FeatureRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((FeatureFileExtractor::new(path), capture))
}
