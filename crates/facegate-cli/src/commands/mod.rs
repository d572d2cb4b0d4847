use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use facegate_core::AuthDecision;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod auth;
mod enroll;
mod tokens;

pub use auth::{AuthCommand, AuthHandler};
pub use enroll::{EnrollCommand, EnrollHandler};
pub use tokens::{TokenCommand, TokensHandler};

/// Low confidence or nothing enrolled.
pub const EXIT_REJECTED: u8 = 10;
pub const EXIT_IDENTITY_MISMATCH: u8 = 11;
pub const EXIT_INVALID_TOKEN: u8 = 12;

pub fn decision_exit_code(decision: &AuthDecision) -> ExitCode {
    match decision {
        AuthDecision::Accepted { .. } => ExitCode::SUCCESS,
        AuthDecision::RejectedLowConfidence { .. } | AuthDecision::RejectedNoEnrollment { .. } => {
            ExitCode::from(EXIT_REJECTED)
        }
        AuthDecision::RejectedIdentityMismatch { .. } => ExitCode::from(EXIT_IDENTITY_MISMATCH),
    }
}

/// Builds the handler for `command`, reading configuration from
/// `config_path` when given.
pub fn handler_for(command: Commands, config_path: Option<PathBuf>) -> Box<dyn CommandHandler> {
    match command {
        Commands::Enroll(args) => Box::new(EnrollHandler::new(EnrollCommand::Enroll(args), config_path)),
        Commands::Remove(args) => Box::new(EnrollHandler::new(EnrollCommand::Remove(args), config_path)),
        Commands::Info => Box::new(EnrollHandler::new(EnrollCommand::Info, config_path)),
        Commands::Recognize(args) => {
            Box::new(AuthHandler::new(AuthCommand::Recognize(args), config_path))
        }
        Commands::Verify(args) => Box::new(AuthHandler::new(AuthCommand::Verify(args), config_path)),
        Commands::Rank(args) => Box::new(AuthHandler::new(AuthCommand::Rank(args), config_path)),
        Commands::Validate(args) => {
            Box::new(TokensHandler::new(TokenCommand::Validate(args), config_path))
        }
        Commands::Logout(args) => Box::new(TokensHandler::new(TokenCommand::Logout(args), config_path)),
        Commands::Tokens(args) => Box::new(TokensHandler::new(TokenCommand::List(args), config_path)),
        Commands::Sweep(args) => Box::new(TokensHandler::new(TokenCommand::Sweep(args), config_path)),
    }
}

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        handler_for(command, None)
    }
}
