//! Credential discovery failures and dangerous-directory guards.
//!
//! These tests redirect HOME to a scratch directory so the host's real
//! agent credentials cannot leak in; they run in one process with env
//! mutations kept inside each test's setup.

mod common;

use std::sync::Mutex;

use common::{Fixture, sample_project, test_options};
use taskbox::errors::{Sentinel, is_sentinel};
use taskbox::manager::CreateOutcome;

/// Serializes tests that mutate process-global environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn with_clean_home<F: FnOnce()>(f: F) {
    let _guard = ENV_LOCK.lock().unwrap();
    let fake_home = tempfile::tempdir().unwrap();
    let old_home = std::env::var("HOME").ok();
    // SAFETY: guarded by ENV_LOCK; no other thread in this binary reads
    // these variables concurrently.
    unsafe {
        std::env::set_var("HOME", fake_home.path());
        std::env::remove_var("ANTHROPIC_API_KEY");
        std::env::remove_var("ANTHROPIC_BASE_URL");
    }
    taskbox::auth::set_keychain_reader(|_| None);

    f();

    if let Some(home) = old_home {
        unsafe { std::env::set_var("HOME", home) };
    }
}

#[test]
fn create_without_credentials_fails_and_leaves_nothing() {
    with_clean_home(|| {
        let fx = Fixture::new();
        let project = sample_project();
        let mut manager = fx.manager();

        let mut opts = test_options("s1", project.path());
        opts.agent = "claude".to_string();
        let err = manager.create(opts).unwrap_err();

        assert!(is_sentinel(&err, Sentinel::MissingApiKey));
        let text = format!("{err:#}");
        assert!(text.contains(".credentials.json"), "got: {text}");
        assert!(text.contains("ANTHROPIC_API_KEY"), "got: {text}");
        assert!(!fx.paths.sandbox_dir("s1").exists());
    });
}

#[test]
fn auth_hint_env_var_satisfies_discovery() {
    with_clean_home(|| {
        // SAFETY: inside ENV_LOCK via with_clean_home.
        unsafe { std::env::set_var("ANTHROPIC_BASE_URL", "https://proxy.example.com") };

        let fx = Fixture::new();
        let project = sample_project();
        let mut manager = fx.manager();

        let mut opts = test_options("s1", project.path());
        opts.agent = "claude".to_string();
        let outcome = manager.create(opts).unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));

        unsafe { std::env::remove_var("ANTHROPIC_BASE_URL") };
    });
}

#[test]
fn localhost_hint_rejected_for_containerized_backend() {
    with_clean_home(|| {
        // SAFETY: inside ENV_LOCK via with_clean_home.
        unsafe { std::env::set_var("ANTHROPIC_BASE_URL", "http://localhost:4000/v1") };

        let fx = Fixture::new();
        let project = sample_project();
        let mut manager = fx.manager();

        let mut opts = test_options("s1", project.path());
        opts.agent = "claude".to_string();
        let err = manager.create(opts).unwrap_err();
        assert!(err.to_string().contains("host.docker.internal"));
        assert!(!fx.paths.sandbox_dir("s1").exists());

        unsafe { std::env::remove_var("ANTHROPIC_BASE_URL") };
    });
}

#[test]
fn dangerous_workdir_requires_force() {
    with_clean_home(|| {
        let home = home::home_dir().unwrap();
        std::fs::create_dir_all(&home).unwrap();

        let fx = Fixture::new();
        let mut manager = fx.manager();

        // Without :force the home directory is rejected.
        let mut opts = test_options("s1", &home);
        opts.workdir_arg = home.to_string_lossy().into_owned();
        let err = manager.create(opts).unwrap_err();
        assert_eq!(taskbox::errors::exit_code(&err), 2);
        assert!(err.to_string().contains("protected"));

        // With :rw:force it goes through (answering the prompts yes).
        let mut manager = fx.manager_with_input("y\n");
        let mut opts = test_options("s2", &home);
        opts.workdir_arg = format!("{}:rw:force", home.display());
        opts.yes = false;
        let outcome = manager.create(opts).unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));
    });
}

#[test]
fn keychain_fallback_counts_as_auth_file() {
    with_clean_home(|| {
        taskbox::auth::set_keychain_reader(|service| {
            (service == "Claude Code-credentials").then(|| "{\"token\": \"t\"}".to_string())
        });

        let fx = Fixture::new();
        let project = sample_project();
        let mut manager = fx.manager();

        let mut opts = test_options("s1", project.path());
        opts.agent = "claude".to_string();
        let outcome = manager.create(opts).unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));

        // The credential was seeded from the keychain.
        let sandbox = taskbox::paths::SandboxPaths::new(&fx.paths, "s1");
        let seeded = sandbox.agent_state_dir().join(".credentials.json");
        assert!(seeded.exists());
        assert_eq!(
            std::fs::read_to_string(seeded).unwrap(),
            "{\"token\": \"t\"}"
        );

        taskbox::auth::set_keychain_reader(|_| None);
    });
}
