//! The `solc` toolchain: on-demand installation and `--standard-json` invocation.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::{
    Toolchain,
    standard_json::{StandardJsonInput, StandardJsonOutput},
};
use crate::{
    cache::FileLock,
    error::{EngineError, Result},
};

/// Where official compiler builds are published.
pub const SOLC_BINARIES_URL: &str = "https://binaries.soliditylang.org";

/// Timeout for downloading the build list and a compiler binary.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Build list published for each platform (`<platform>/list.json`).
#[derive(Debug, Deserialize)]
struct BuildList {
    builds: Vec<BuildInfo>,
}

#[derive(Debug, Deserialize)]
struct BuildInfo {
    path: String,
    version: String,
    #[serde(default)]
    prerelease: Option<String>,
    sha256: String,
}

/// The Solidity compiler, installed per version under `install_dir`.
#[derive(Debug, Clone)]
pub struct Solc {
    install_dir: PathBuf,
    binary_override: Option<PathBuf>,
    client: reqwest::Client,
}

impl Solc {
    /// Create a toolchain that installs compilers into `install_dir`.
    ///
    /// If `binary_override` is set, that binary is used for every version and
    /// nothing is ever installed.
    pub fn new(install_dir: impl Into<PathBuf>, binary_override: Option<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Toolchain(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            install_dir: install_dir.into(),
            binary_override,
            client,
        })
    }

    /// Path of the binary used for `version`.
    pub fn binary_path(&self, version: &str) -> PathBuf {
        match &self.binary_override {
            Some(binary) => binary.clone(),
            None => self.install_dir.join(binary_name(version)),
        }
    }

    async fn install(&self, version: &str) -> Result<()> {
        std::fs::create_dir_all(&self.install_dir).map_err(|e| {
            EngineError::Toolchain(format!(
                "failed to create {}: {}",
                self.install_dir.display(),
                e
            ))
        })?;

        // Serialize installers across processes; the winner's binary is reused.
        let lock_path = self.install_dir.join(".install.lock");
        let _lock = tokio::task::spawn_blocking(move || FileLock::acquire(lock_path))
            .await
            .map_err(|e| EngineError::Toolchain(format!("install lock task failed: {}", e)))??;

        let target = self.binary_path(version);
        if target.exists() {
            return Ok(());
        }

        let platform = platform()?;
        tracing::info!(version, platform, "Installing solc...");

        let list: BuildList = self
            .fetch(&format!("{}/{}/list.json", SOLC_BINARIES_URL, platform))
            .await
            .and_then(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| {
                    EngineError::Toolchain(format!("failed to parse solc build list: {}", e))
                })
            })?;

        let build = list
            .builds
            .iter()
            .find(|b| b.version == version && b.prerelease.is_none())
            .ok_or_else(|| {
                EngineError::Toolchain(format!(
                    "solc {} is not published for {}",
                    version, platform
                ))
            })?;

        let binary = self
            .fetch(&format!("{}/{}/{}", SOLC_BINARIES_URL, platform, build.path))
            .await?;

        verify_sha256(&binary, &build.sha256)?;
        write_executable(&target, &binary)?;

        tracing::info!(version, path = %target.display(), "solc installed");
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let download = || async {
            let response = self.client.get(url).send().await?.error_for_status()?;
            response.bytes().await.map(|b| b.to_vec())
        };

        download
            .retry(ExponentialBuilder::default().with_max_times(3))
            .notify(|err, after| {
                tracing::debug!(url, error = %err, ?after, "Download failed, retrying...");
            })
            .await
            .map_err(|e| EngineError::Toolchain(format!("failed to download {}: {}", url, e)))
    }
}

impl Toolchain for Solc {
    async fn ensure_installed(&self, version: &str) -> Result<()> {
        let binary = self.binary_path(version);

        if self.binary_override.is_some() {
            if binary.exists() {
                return Ok(());
            }
            return Err(EngineError::Toolchain(format!(
                "configured solc binary not found: {}",
                binary.display()
            )));
        }

        if binary.exists() {
            tracing::trace!(version, "solc already installed");
            return Ok(());
        }

        self.install(version).await
    }

    async fn compile(
        &self,
        version: &str,
        input: &StandardJsonInput,
        base_path: Option<&Path>,
    ) -> Result<StandardJsonOutput> {
        let binary = self.binary_path(version);
        let input = serde_json::to_vec(input)
            .map_err(|e| EngineError::Toolchain(format!("failed to serialize input: {}", e)))?;

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.arg("--standard-json");
        if let Some(base_path) = base_path {
            cmd.arg("--base-path")
                .arg(base_path)
                .arg("--allow-paths")
                .arg(base_path);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Toolchain(format!("failed to run {}: {}", binary.display(), e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| EngineError::Toolchain(format!("failed to write solc input: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Toolchain(format!("failed to wait for solc: {}", e)))?;

        if !output.status.success() && output.stdout.is_empty() {
            return Err(EngineError::Toolchain(format!(
                "solc exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Toolchain(format!("failed to parse solc output: {}", e)))
    }
}

fn binary_name(version: &str) -> String {
    if cfg!(windows) {
        format!("solc-{}.exe", version)
    } else {
        format!("solc-{}", version)
    }
}

/// Platform directory name on the binaries server.
fn platform() -> Result<&'static str> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => Ok("linux-amd64"),
        ("macos", _) => Ok("macosx-amd64"),
        ("windows", "x86_64") => Ok("windows-amd64"),
        (os, arch) => Err(EngineError::Toolchain(format!(
            "no prebuilt solc for {}-{}; set compiler.solc_path instead",
            os, arch
        ))),
    }
}

fn verify_sha256(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(bytes));
    let expected = expected.trim_start_matches("0x").to_lowercase();

    if actual != expected {
        return Err(EngineError::Toolchain(format!(
            "checksum mismatch for downloaded solc: expected {}, got {}",
            expected, actual
        )));
    }
    Ok(())
}

fn write_executable(target: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = target.with_extension("download");
    let io_err = |e: std::io::Error| {
        EngineError::Toolchain(format!("failed to write {}: {}", target.display(), e))
    };

    std::fs::write(&tmp, bytes).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755)).map_err(io_err)?;
    }

    std::fs::rename(&tmp, target).map_err(io_err)
}
