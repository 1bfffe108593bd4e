#![allow(clippy::unwrap_used, clippy::expect_used)]

use correos::{EmptyNameHandling, MediatorConfig, RegistrationPolicy, WorkerPoolConfig};
use std::io::Write;
use std::sync::Mutex;

// These tests are affected by global env vars. Use a mutex to serialize access.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn clean_env() {
    for key in [
        "CORREOS_REGISTRATION_POLICY",
        "CORREOS_EMPTY_NAME_HANDLING",
        "CORREOS_WORKERS",
        "CORREOS_STACK_SIZE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_load_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "registration_policy: all\n\
         empty_name_handling: assign_method_name\n\
         workers:\n  num_workers: 3"
    )
    .unwrap();

    let config = MediatorConfig::load(file.path()).unwrap();
    assert_eq!(config.registration_policy, RegistrationPolicy::All);
    assert_eq!(config.empty_name_handling, EmptyNameHandling::AssignMethodName);
    assert_eq!(config.workers.num_workers, 3);
    assert_eq!(config.workers.stack_size, WorkerPoolConfig::default().stack_size);
}

#[test]
fn test_load_missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = MediatorConfig::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("absent.yaml"));
}

#[test]
fn test_load_rejects_invalid_yaml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "empty_name_handling: [not, a, variant]").unwrap();
    assert!(MediatorConfig::load(file.path()).is_err());
}

#[test]
fn test_from_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clean_env();

    std::env::set_var("CORREOS_REGISTRATION_POLICY", "all");
    std::env::set_var("CORREOS_EMPTY_NAME_HANDLING", "skip");
    std::env::set_var("CORREOS_WORKERS", "6");
    let config = MediatorConfig::from_env();
    assert_eq!(config.registration_policy, RegistrationPolicy::All);
    assert_eq!(config.empty_name_handling, EmptyNameHandling::Skip);
    assert_eq!(config.workers.num_workers, 6);

    clean_env();
}

#[test]
fn test_from_env_falls_back_to_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clean_env();

    std::env::set_var("CORREOS_REGISTRATION_POLICY", "everything");
    std::env::set_var("CORREOS_EMPTY_NAME_HANDLING", "guess");
    assert_eq!(MediatorConfig::from_env(), MediatorConfig::default());

    clean_env();
}
