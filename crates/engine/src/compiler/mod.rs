//! Solidity compilation with fingerprint-keyed caching.

mod remappings;
mod solc;
pub mod standard_json;

use std::{
    future::Future,
    path::{Path, PathBuf},
};

pub use remappings::detect_remappings;
pub use solc::{SOLC_BINARIES_URL, Solc};
pub use standard_json::{Diagnostic, StandardJsonInput, StandardJsonOutput};

use crate::{
    artifact::ArtifactBundle,
    cache::FingerprintCache,
    error::{EngineError, Result},
    fingerprint::CompilationRequest,
};

/// File name given to raw source text passed without a path.
pub const INLINE_SOURCE_NAME: &str = "Contract.sol";

/// An external compiler that speaks the standard-JSON protocol.
pub trait Toolchain: Send + Sync {
    /// Make `version` available, installing it if needed. Idempotent.
    fn ensure_installed(&self, version: &str) -> impl Future<Output = Result<()>> + Send;

    /// Run the compiler on a structured input.
    fn compile(
        &self,
        version: &str,
        input: &StandardJsonInput,
        base_path: Option<&Path>,
    ) -> impl Future<Output = Result<StandardJsonOutput>> + Send;
}

/// What the caller handed us to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    /// A `.sol` file on disk.
    File(PathBuf),
    /// Raw Solidity source text.
    Inline(String),
}

impl SourceInput {
    /// Treat `input` as a file if it names an existing `.sol` file, otherwise
    /// as raw source.
    pub fn detect(input: &str) -> Self {
        let path = Path::new(input);
        if path.extension().is_some_and(|ext| ext == "sol") && path.is_file() {
            Self::File(path.to_path_buf())
        } else {
            Self::Inline(input.to_string())
        }
    }
}

/// Compiles requests through a [`Toolchain`], reusing cached bundles.
#[derive(Debug, Clone)]
pub struct CompilerAdapter<T = Solc> {
    toolchain: T,
    cache: FingerprintCache,
}

impl<T: Toolchain> CompilerAdapter<T> {
    pub fn new(toolchain: T, cache: FingerprintCache) -> Self {
        Self { toolchain, cache }
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    /// Compile a request, returning the cached bundle when one exists.
    ///
    /// With `force_refresh` the compiler always runs and the cache entry is
    /// replaced. Fatal diagnostics fail with [`EngineError::Compilation`] and
    /// leave the cache untouched.
    pub async fn compile(
        &self,
        request: &CompilationRequest,
        force_refresh: bool,
    ) -> Result<ArtifactBundle> {
        self.toolchain.ensure_installed(&request.version).await?;

        let fingerprint = request.fingerprint();

        if !force_refresh {
            if let Some(bundle) = self.cache.get(&fingerprint)? {
                tracing::debug!(%fingerprint, "Compilation cache hit");
                return Ok(bundle);
            }
        }

        // Concurrent compiles of the same request wait here for the first one.
        let _lock = self.cache.lock().await?;

        if !force_refresh {
            if let Some(bundle) = self.cache.get(&fingerprint)? {
                tracing::debug!(%fingerprint, "Compilation cache filled while waiting");
                return Ok(bundle);
            }
        }

        tracing::info!(
            %fingerprint,
            version = %request.version,
            sources = request.sources.len(),
            "Compiling..."
        );

        let input = StandardJsonInput::from_request(request);
        let output = self
            .toolchain
            .compile(&request.version, &input, request.base_path.as_deref())
            .await?;

        output.check_diagnostics()?;
        let bundle = output.into_bundle()?;

        self.cache.put(&fingerprint, &bundle)?;

        tracing::info!(
            %fingerprint,
            contracts = ?bundle.names().collect::<Vec<_>>(),
            "Compilation complete"
        );

        Ok(bundle)
    }

    /// Compile a single file from disk.
    ///
    /// The file's directory becomes the base path. Without explicit
    /// remappings, an `@openzeppelin` install nearby is mapped automatically.
    pub async fn compile_file(
        &self,
        path: &Path,
        version: &str,
        remappings: Option<Vec<String>>,
        force_refresh: bool,
    ) -> Result<ArtifactBundle> {
        let path = path.canonicalize().map_err(|e| {
            EngineError::Toolchain(format!("Solidity file not found: {}: {}", path.display(), e))
        })?;

        let content = std::fs::read_to_string(&path).map_err(|e| {
            EngineError::Toolchain(format!("failed to read {}: {}", path.display(), e))
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| INLINE_SOURCE_NAME.to_string());

        let remappings = remappings.unwrap_or_else(|| detect_remappings(&path));

        let mut request = CompilationRequest::new(version)
            .source(name, content)
            .remappings(remappings);
        if let Some(parent) = path.parent() {
            request = request.base_path(parent);
        }

        self.compile(&request, force_refresh).await
    }

    /// Compile either a file or raw source text.
    pub async fn compile_input(
        &self,
        input: &SourceInput,
        version: &str,
        force_refresh: bool,
    ) -> Result<ArtifactBundle> {
        match input {
            SourceInput::File(path) => self.compile_file(path, version, None, force_refresh).await,
            SourceInput::Inline(source) => {
                let request = CompilationRequest::new(version).source(INLINE_SOURCE_NAME, source);
                self.compile(&request, force_refresh).await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use tempdir::TempDir;

    pub(crate) const COUNTER_SOURCE: &str = r#"
        // SPDX-License-Identifier: MIT
        pragma solidity ^0.8.24;
        contract Counter { uint256 public count; function increment() external { count += 1; } }
    "#;

    /// Toolchain double that counts invocations and replays a fixed output.
    pub(crate) struct MockToolchain {
        pub(crate) compiles: AtomicUsize,
        pub(crate) installs: AtomicUsize,
        pub(crate) output: serde_json::Value,
        pub(crate) last_base_path: Mutex<Option<PathBuf>>,
        /// Simulated compile time.
        pub(crate) delay: Duration,
    }

    impl MockToolchain {
        pub(crate) fn new(output: serde_json::Value) -> Self {
            Self {
                compiles: AtomicUsize::new(0),
                installs: AtomicUsize::new(0),
                output,
                last_base_path: Mutex::new(None),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn counter() -> Self {
            Self::new(serde_json::json!({
                "contracts": {
                    "A.sol": {
                        "Counter": {
                            "abi": [{"type": "function", "name": "increment", "inputs": [], "outputs": [], "stateMutability": "nonpayable"}],
                            "evm": { "bytecode": { "object": "6080604052348015600e575f80fd5b50" } }
                        }
                    }
                }
            }))
        }

        pub(crate) fn compiles(&self) -> usize {
            self.compiles.load(Ordering::SeqCst)
        }
    }

    impl Toolchain for MockToolchain {
        async fn ensure_installed(&self, _version: &str) -> Result<()> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn compile(
            &self,
            _version: &str,
            _input: &StandardJsonInput,
            base_path: Option<&Path>,
        ) -> Result<StandardJsonOutput> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            *self.last_base_path.lock().unwrap() = base_path.map(Path::to_path_buf);
            Ok(serde_json::from_value(self.output.clone()).unwrap())
        }
    }

    fn adapter(temp_dir: &TempDir, toolchain: MockToolchain) -> CompilerAdapter<MockToolchain> {
        let cache = FingerprintCache::open(temp_dir.path().join("cache")).unwrap();
        CompilerAdapter::new(toolchain, cache)
    }

    fn counter_request() -> CompilationRequest {
        CompilationRequest::new("0.8.24").source("A.sol", COUNTER_SOURCE)
    }

    #[tokio::test]
    async fn test_second_compile_hits_cache() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let compiler = adapter(&temp_dir, MockToolchain::counter());

        let first = compiler.compile(&counter_request(), false).await.unwrap();
        let second = compiler.compile(&counter_request(), false).await.unwrap();

        assert_eq!(compiler.toolchain().compiles(), 1, "Toolchain should run once");
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap(),
            "Cached bundle should be byte-identical"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_identical_compiles_run_toolchain_once() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let compiler = adapter(
            &temp_dir,
            MockToolchain::counter().with_delay(Duration::from_millis(300)),
        );
        let request = counter_request();

        let (first, second) = tokio::join!(
            compiler.compile(&request, false),
            compiler.compile(&request, false)
        );

        assert_eq!(compiler.toolchain().compiles(), 1, "Second caller should wait for the first");
        assert_eq!(first.unwrap(), second.unwrap());
    }

    #[tokio::test]
    async fn test_force_refresh_always_compiles() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let compiler = adapter(&temp_dir, MockToolchain::counter());

        compiler.compile(&counter_request(), false).await.unwrap();
        compiler.compile(&counter_request(), true).await.unwrap();
        compiler.compile(&counter_request(), true).await.unwrap();

        assert_eq!(compiler.toolchain().compiles(), 3);
    }

    #[tokio::test]
    async fn test_bundle_shape() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let compiler = adapter(&temp_dir, MockToolchain::counter());

        let bundle = compiler.compile(&counter_request(), false).await.unwrap();

        assert_eq!(bundle.len(), 1);
        let counter = bundle.get("Counter").unwrap();
        assert!(counter.bytecode.starts_with("0x6080"));
        assert!(!counter.abi.as_array().unwrap().is_empty());
        assert_eq!(counter.source_file, "A.sol");
    }

    #[tokio::test]
    async fn test_compilation_error_is_not_cached() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let compiler = adapter(
            &temp_dir,
            MockToolchain::new(serde_json::json!({
                "errors": [{
                    "severity": "error",
                    "message": "Expected ';' but got '}'",
                    "formattedMessage": "ParserError: Expected ';' but got '}'\n --> A.sol:3:1:"
                }]
            })),
        );
        let request = counter_request();

        let err = compiler.compile(&request, false).await.unwrap_err();

        assert!(matches!(err, EngineError::Compilation { .. }));
        assert!(err.to_string().contains("A.sol:3:1"));
        assert!(compiler.cache().get(&request.fingerprint()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_checked_on_every_call() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let compiler = adapter(&temp_dir, MockToolchain::counter());

        compiler.compile(&counter_request(), false).await.unwrap();
        compiler.compile(&counter_request(), false).await.unwrap();

        assert_eq!(compiler.toolchain().installs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_compile_file_sets_base_path() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let source_path = temp_dir.path().join("Counter.sol");
        std::fs::write(&source_path, COUNTER_SOURCE).unwrap();
        let compiler = adapter(&temp_dir, MockToolchain::counter());

        compiler
            .compile_input(
                &SourceInput::detect(source_path.to_str().unwrap()),
                "0.8.24",
                false,
            )
            .await
            .unwrap();

        let base_path = compiler.toolchain().last_base_path.lock().unwrap().clone();
        assert_eq!(base_path, Some(temp_dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_source_input_detection() {
        let temp_dir = TempDir::new("soldeploy-compiler").expect("Failed to create temp dir");
        let source_path = temp_dir.path().join("Counter.sol");
        std::fs::write(&source_path, COUNTER_SOURCE).unwrap();

        assert_eq!(
            SourceInput::detect(source_path.to_str().unwrap()),
            SourceInput::File(source_path.clone())
        );
        assert!(matches!(
            SourceInput::detect(COUNTER_SOURCE),
            SourceInput::Inline(_)
        ));
        assert!(matches!(
            SourceInput::detect("/does/not/exist.sol"),
            SourceInput::Inline(_)
        ));
    }
}
