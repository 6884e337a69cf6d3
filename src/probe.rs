use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use crate::config::ConnectionSpec;

/// Readiness-check executable, resolved via PATH.
pub const PG_ISREADY: &str = "pg_isready";

/// Fixed pause between probe attempts.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Raised when the polling loop exhausts its timeout without a
/// successful probe.
#[derive(Debug, Error)]
#[error("Unable to connect to the database. Exit code: {exit_code} - Message: {status}")]
pub struct DatabaseConnectionError {
    pub exit_code: i32,
    pub status: String,
}

/// Poll the readiness probe until it succeeds or the overall timeout
/// elapses.
///
/// Each attempt passes the overall timeout as the probe's own `-t`
/// argument rather than the remaining budget, so a single slow call can
/// consume the whole budget.
pub async fn wait_for_database(spec: &ConnectionSpec, probe: &str) -> Result<()> {
    let start = Instant::now();

    let mut status = String::new();
    let mut exit_code = 0;

    while start.elapsed() < spec.timeout {
        let output = Command::new(probe)
            .args([
                "-h",
                &spec.host,
                "-p",
                &spec.port.to_string(),
                "-U",
                &spec.user,
                "-t",
                &spec.timeout.as_secs().to_string(),
            ])
            .output()
            .await?;

        status = String::from_utf8_lossy(&output.stdout).trim().to_string();
        // A probe killed by a signal has no exit code; treat it as a failure.
        exit_code = output.status.code().unwrap_or(-1);

        info!("{status}");

        if exit_code == 0 {
            break;
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }

    if exit_code != 0 {
        return Err(DatabaseConnectionError { exit_code, status }.into());
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn spec(timeout: Duration) -> ConnectionSpec {
        ConnectionSpec {
            host: "localhost".to_string(),
            port: 5432,
            user: "odoo".to_string(),
            timeout,
            log_level: "info".to_string(),
        }
    }

    fn write_probe_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("probe.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_immediate_success_does_not_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let probe = write_probe_script(dir.path(), "echo 'accepting connections'; exit 0");

        let start = Instant::now();
        let result = wait_for_database(&spec(Duration::from_secs(30)), probe.to_str().unwrap()).await;

        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = dir.path().join("attempts");
        let probe = write_probe_script(
            dir.path(),
            &format!(
                "echo attempt >> {attempts}\n\
                 if [ \"$(wc -l < {attempts})\" -ge 3 ]; then\n\
                 \techo 'accepting connections'\n\
                 \texit 0\n\
                 fi\n\
                 echo 'no response'\n\
                 exit 2",
                attempts = attempts.display()
            ),
        );

        let start = Instant::now();
        let result = wait_for_database(&spec(Duration::from_secs(30)), probe.to_str().unwrap()).await;

        assert!(result.is_ok());
        let recorded = std::fs::read_to_string(&attempts).unwrap();
        assert_eq!(recorded.lines().count(), 3);
        // two failed attempts, one second of sleep after each
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_times_out_with_last_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let probe = write_probe_script(dir.path(), "echo 'no response'; exit 2");

        let start = Instant::now();
        let result = wait_for_database(&spec(Duration::from_secs(2)), probe.to_str().unwrap()).await;

        let err = result.unwrap_err();
        let err = err.downcast_ref::<DatabaseConnectionError>().unwrap();
        assert_eq!(err.exit_code, 2);
        assert_eq!(err.status, "no response");
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_timeout_succeeds_without_probing() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = dir.path().join("attempts");
        let probe = write_probe_script(
            dir.path(),
            &format!("echo attempt >> {}; exit 2", attempts.display()),
        );

        let result = wait_for_database(&spec(Duration::ZERO), probe.to_str().unwrap()).await;

        assert!(result.is_ok());
        assert!(!attempts.exists());
    }

    #[tokio::test]
    async fn test_missing_probe_binary_is_an_io_error() {
        let result = wait_for_database(
            &spec(Duration::from_secs(2)),
            "/nonexistent/pg_isready",
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<DatabaseConnectionError>().is_none());
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }
}
