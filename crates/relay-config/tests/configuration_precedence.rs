//! Integration tests for configuration precedence across sources.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use relay_config::{Config, LogFormat};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    overrides: Vec<(&'static str, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self {
            temp_dir: TempDir::new().expect("create temp dir"),
            overrides: Vec::new(),
            _guard: guard,
        }
    }

    fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join("relay.toml");
        fs::write(&path, contents).expect("write configuration");
        path
    }

    fn set_env(&mut self, key: &'static str, value: impl AsRef<OsStr>) {
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe on the 2024 edition; `Drop` restores
        // the previous values.
        unsafe { std::env::set_var(key, value) };
        self.overrides.push((key, previous));
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        while let Some((key, previous)) = self.overrides.pop() {
            match previous {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

fn args(extra: &[&OsStr]) -> Vec<OsString> {
    let mut args = vec![OsString::from("relay")];
    args.extend(extra.iter().map(|arg| arg.to_os_string()));
    args
}

#[rstest]
fn file_values_are_loaded(harness: Harness) {
    let path = harness.write_config(
        "service_name = \"from-file\"\nsecret_key = \"s3cret\"\nlog_format = \"compact\"\n",
    );
    let config = Config::load_from_iter(args(&[
        OsStr::new("--config-path"),
        path.as_os_str(),
    ]))
    .expect("configuration loads");

    assert_eq!(config.service_name(), "from-file");
    assert_eq!(config.secret_key(), b"s3cret");
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[rstest]
fn environment_overrides_file(mut harness: Harness) {
    let path = harness.write_config("service_name = \"from-file\"\n");
    harness.set_env("RELAY_SERVICE_NAME", "from-env");

    let config = Config::load_from_iter(args(&[
        OsStr::new("--config-path"),
        path.as_os_str(),
    ]))
    .expect("configuration loads");

    assert_eq!(config.service_name(), "from-env");
}

#[rstest]
fn cli_overrides_environment(mut harness: Harness) {
    harness.set_env("RELAY_SERVICE_NAME", "from-env");

    let config = Config::load_from_iter(args(&[
        OsStr::new("--service-name"),
        OsStr::new("from-cli"),
    ]))
    .expect("configuration loads");

    assert_eq!(config.service_name(), "from-cli");
}

#[rstest]
fn malformed_file_is_reported(harness: Harness) {
    let path = harness.write_config("service_name = [unterminated\n");

    let error = Config::load_from_iter(args(&[
        OsStr::new("--config-path"),
        path.as_os_str(),
    ]))
    .expect_err("loading must fail");

    assert!(!error.to_string().is_empty());
}
