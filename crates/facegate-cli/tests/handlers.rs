use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use facegate_cli::cli::{
    EnrollArgs, OutputMode, RankArgs, RecognizeArgs, RemoveArgs, SweepArgs, TokenArgs,
    TokensArgs, VerifyArgs,
};
use facegate_cli::commands::{
    AuthCommand, AuthHandler, CommandHandler, EnrollCommand, EnrollHandler, TokenCommand,
    TokensHandler, EXIT_IDENTITY_MISMATCH, EXIT_INVALID_TOKEN, EXIT_REJECTED,
};
use facegate_cli::config::{PolicyOverrides, Runtime};
use facegate_core::AppError;
use tempfile::TempDir;

struct Workspace {
    tmp: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("facegate.toml");
        fs::write(
            &config,
            format!(
                "enrollment_store_path = \"{}\"\n\
                 token_store_path = \"{}\"\n\
                 store_key_env = \"FACEGATE_CLI_TEST_KEY_UNSET\"\n\
                 token_ttl_secs = 3600\n",
                tmp.path().join("enrollments.json").display(),
                tmp.path().join("tokens.json").display(),
            ),
        )
        .unwrap();
        Self { tmp, config }
    }

    fn features(&self, name: &str, embeddings: &[&[f64]]) -> PathBuf {
        let faces: Vec<_> = embeddings
            .iter()
            .map(|embedding| serde_json::json!({ "embedding": embedding }))
            .collect();
        let path = self.tmp.path().join(name);
        fs::write(&path, serde_json::json!({ "faces": faces }).to_string()).unwrap();
        path
    }

    fn config(&self) -> Option<PathBuf> {
        Some(self.config.clone())
    }

    fn enroll(&self, identity: &str, features: &Path) -> ExitCode {
        EnrollHandler::new(
            EnrollCommand::Enroll(EnrollArgs {
                identity: identity.into(),
                features: features.to_path_buf(),
                source: None,
                replace: false,
            }),
            self.config(),
        )
        .execute(OutputMode::Json, false)
        .unwrap()
    }

    fn runtime(&self) -> Runtime {
        Runtime::open(Some(&self.config), &PolicyOverrides::default()).unwrap()
    }

    fn tokens(&self, command: TokenCommand) -> ExitCode {
        TokensHandler::new(command, self.config())
            .execute(OutputMode::Json, false)
            .unwrap()
    }
}

fn recognize(workspace: &Workspace, features: &Path) -> ExitCode {
    AuthHandler::new(
        AuthCommand::Recognize(RecognizeArgs {
            features: features.to_path_buf(),
            threshold: None,
            ttl_secs: None,
        }),
        workspace.config(),
    )
    .execute(OutputMode::Json, false)
    .unwrap()
}

#[test]
fn enroll_recognize_validate_logout() {
    let ws = Workspace::new();
    let alice = ws.features("alice.json", &[&[1.0, 0.0, 0.0]]);
    let bob = ws.features("bob.json", &[&[0.0, 1.0, 0.0]]);
    assert_eq!(ws.enroll("alice", &alice), ExitCode::SUCCESS);
    assert_eq!(ws.enroll("bob", &bob), ExitCode::SUCCESS);

    let stats = ws.runtime().coordinator.store_info();
    assert_eq!(stats.identities, 2);
    assert_eq!(stats.dimension, Some(3));

    assert_eq!(recognize(&ws, &alice), ExitCode::SUCCESS);

    let tokens = ws.runtime().coordinator.list_active_tokens("alice").unwrap();
    assert_eq!(tokens.len(), 1);
    let token = tokens[0].token_id.clone();

    let validate = || {
        ws.tokens(TokenCommand::Validate(TokenArgs {
            token: token.clone(),
        }))
    };
    assert_eq!(validate(), ExitCode::SUCCESS);

    let logout = || {
        ws.tokens(TokenCommand::Logout(TokenArgs {
            token: token.clone(),
        }))
    };
    assert_eq!(logout(), ExitCode::SUCCESS);
    assert_eq!(logout(), ExitCode::from(EXIT_INVALID_TOKEN));
    assert_eq!(validate(), ExitCode::from(EXIT_INVALID_TOKEN));

    assert_eq!(
        ws.tokens(TokenCommand::List(TokensArgs {
            identity: "alice".into()
        })),
        ExitCode::SUCCESS
    );
    assert_eq!(
        ws.tokens(TokenCommand::Sweep(SweepArgs {
            watch: false,
            interval_secs: None
        })),
        ExitCode::SUCCESS
    );
}

#[test]
fn rejections_map_to_distinct_exit_codes() {
    let ws = Workspace::new();
    let alice = ws.features("alice.json", &[&[1.0, 0.0, 0.0]]);
    let bob = ws.features("bob.json", &[&[0.0, 1.0, 0.0]]);
    let noise = ws.features("noise.json", &[&[1.0, 1.0, 1.0]]);

    assert_eq!(recognize(&ws, &alice), ExitCode::from(EXIT_REJECTED));

    ws.enroll("alice", &alice);
    ws.enroll("bob", &bob);
    assert_eq!(recognize(&ws, &noise), ExitCode::from(EXIT_REJECTED));

    let mismatch = AuthHandler::new(
        AuthCommand::Verify(VerifyArgs {
            identity: "bob".into(),
            features: alice.clone(),
            threshold: None,
            ttl_secs: None,
        }),
        ws.config(),
    )
    .execute(OutputMode::Human, false)
    .unwrap();
    assert_eq!(mismatch, ExitCode::from(EXIT_IDENTITY_MISMATCH));

    let rank = AuthHandler::new(
        AuthCommand::Rank(RankArgs {
            features: noise,
            limit: Some(1),
        }),
        ws.config(),
    )
    .execute(OutputMode::Human, false)
    .unwrap();
    assert_eq!(rank, ExitCode::SUCCESS);

    assert!(ws
        .runtime()
        .coordinator
        .list_active_tokens("alice")
        .unwrap()
        .is_empty());
}

#[test]
fn removal_is_idempotent_and_persisted() {
    let ws = Workspace::new();
    let alice = ws.features("alice.json", &[&[1.0, 0.0, 0.0], &[0.9, 0.1, 0.0]]);
    ws.enroll("alice", &alice);
    assert_eq!(ws.runtime().coordinator.store_info().total_entries, 2);

    let remove = || {
        EnrollHandler::new(
            EnrollCommand::Remove(RemoveArgs {
                identity: "alice".into(),
            }),
            ws.config(),
        )
        .execute(OutputMode::Human, false)
        .unwrap()
    };
    assert_eq!(remove(), ExitCode::SUCCESS);
    assert_eq!(remove(), ExitCode::SUCCESS);
    assert_eq!(ws.runtime().coordinator.store_info().total_entries, 0);
}

#[test]
fn feature_file_without_faces_is_an_input_error() {
    let ws = Workspace::new();
    let empty = ws.features("empty.json", &[]);

    let err = AuthHandler::new(
        AuthCommand::Recognize(RecognizeArgs {
            features: empty,
            threshold: None,
            ttl_secs: None,
        }),
        ws.config(),
    )
    .execute(OutputMode::Json, false)
    .unwrap_err();
    match &err {
        AppError::NoFaceDetected { .. } => assert_eq!(err.exit_code(), ExitCode::from(2)),
        other => panic!("unexpected error: {:?}", other),
    }
}
