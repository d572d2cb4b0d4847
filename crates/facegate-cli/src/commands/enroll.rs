use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use facegate_core::faces::{
    enroll_identity, remove_identity, EnrollmentMode, EnrollmentRequest, FeatureFile,
};

use crate::cli::{EnrollArgs, OutputMode, RemoveArgs};
use crate::commands::CommandHandler;
use crate::config::{PolicyOverrides, Runtime};
use crate::errors::AppResult;
use crate::output::{render_enroll, render_info, render_remove};

#[derive(Debug, Clone)]
pub enum EnrollCommand {
    Enroll(EnrollArgs),
    Remove(RemoveArgs),
    Info,
}

pub struct EnrollHandler {
    command: EnrollCommand,
    config_path: Option<PathBuf>,
}

impl EnrollHandler {
    pub fn new(command: EnrollCommand, config_path: Option<PathBuf>) -> Self {
        Self {
            command,
            config_path,
        }
    }

    pub fn command(&self) -> &EnrollCommand {
        &self.command
    }
}

impl CommandHandler for EnrollHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let runtime = Runtime::open(self.config_path.as_deref(), &PolicyOverrides::default())?;
        let store = runtime.coordinator.store();

        match &self.command {
            EnrollCommand::Enroll(args) => {
                let file = FeatureFile::load(&args.features)?;
                let vectors = file.embeddings(&args.features)?;
                let request = EnrollmentRequest {
                    identity: args.identity.clone(),
                    vectors,
                    source_tag: Some(
                        args.source
                            .clone()
                            .unwrap_or_else(|| args.features.display().to_string()),
                    ),
                    mode: if args.replace {
                        EnrollmentMode::Replace
                    } else {
                        EnrollmentMode::Append
                    },
                };
                let outcome = enroll_identity(request, store, &runtime.enrollments)?;
                render_enroll(&outcome, mode)?;
            }
            EnrollCommand::Remove(args) => {
                let outcome = remove_identity(&args.identity, store, &runtime.enrollments)?;
                render_remove(&outcome, mode)?;
            }
            EnrollCommand::Info => {
                render_info(&runtime.coordinator.store_info(), mode)?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
