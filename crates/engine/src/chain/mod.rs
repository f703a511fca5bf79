//! Lifecycle of the disposable local node.
//!
//! One [`EphemeralChain`] owns at most one node process. Callers share it
//! through an `Arc`; a `reset` by one caller stops the node under every other
//! holder, and their next `ensure_ready` starts a fresh one.

mod accounts;
mod cmd;

use std::{
    collections::VecDeque,
    fmt,
    net::TcpListener,
    process::Stdio,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_core::primitives::Address;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::Mutex,
    task::JoinHandle,
};

pub use accounts::{DEV_ACCOUNT_COUNT, DEV_MNEMONIC, DevAccounts};
pub use cmd::NodeCmdBuilder;

use crate::{
    config::ChainConfig,
    credential::Credential,
    error::{EngineError, Result},
    rpc::{EthApi, HttpRpc, JsonRpc},
};

/// Lines of node output kept for error reports.
const OUTPUT_TAIL_LINES: usize = 50;

/// Per-request timeout of the readiness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for the output readers after the node exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of the node process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChainProcessState {
    #[default]
    Stopped,
    Starting,
    Ready,
}

/// A running node and the handle to talk to it.
struct RunningNode {
    child: Child,
    rpc: HttpRpc,
    output: OutputTail,
}

/// Owner of the ephemeral node.
pub struct EphemeralChain {
    config: ChainConfig,
    accounts: DevAccounts,
    /// Held for the whole of a launch or teardown.
    node: Mutex<Option<RunningNode>>,
    /// Readable while `node` is locked.
    state: StdMutex<ChainProcessState>,
    launches: AtomicUsize,
}

impl fmt::Debug for EphemeralChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralChain")
            .field("program", &self.config.program)
            .field("port", &self.config.port)
            .field("launches", &self.launch_count())
            .finish_non_exhaustive()
    }
}

impl EphemeralChain {
    /// Create a manager. Nothing is launched until [`Self::ensure_ready`].
    pub fn new(config: ChainConfig) -> Result<Self> {
        Ok(Self {
            config,
            accounts: DevAccounts::derive(DEV_ACCOUNT_COUNT)?,
            node: Mutex::new(None),
            state: StdMutex::new(ChainProcessState::Stopped),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Current lifecycle state. Does not wait for a launch in progress.
    pub fn state(&self) -> ChainProcessState {
        self.state.lock().map(|state| *state).unwrap_or_default()
    }

    fn set_state(&self, state: ChainProcessState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Number of node processes launched so far.
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Address of dev account `index`.
    pub fn account(&self, index: usize) -> Result<Address> {
        self.accounts.address(index)
    }

    /// Private key of dev account `index`.
    pub fn private_key(&self, index: usize) -> Result<Credential> {
        self.accounts.private_key(index)
    }

    /// Return the endpoint of the running node, launching one if needed.
    ///
    /// Concurrent callers wait for the same launch; while the node is ready
    /// this returns immediately.
    pub async fn ensure_ready(&self) -> Result<HttpRpc> {
        let mut slot = self.node.lock().await;

        if let Some(node) = slot.as_mut() {
            match node.child.try_wait() {
                Ok(None) => return Ok(node.rpc.clone()),
                Ok(Some(status)) => {
                    tracing::warn!(%status, "Ephemeral chain exited unexpectedly, restarting...");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to poll ephemeral chain, restarting...");
                }
            }
        }
        if let Some(stale) = slot.take() {
            terminate(stale.child, self.config.shutdown_grace()).await;
        }

        self.set_state(ChainProcessState::Starting);
        match self.launch().await {
            Ok(node) => {
                let rpc = node.rpc.clone();
                *slot = Some(node);
                self.set_state(ChainProcessState::Ready);
                Ok(rpc)
            }
            Err(e) => {
                self.set_state(ChainProcessState::Stopped);
                Err(e)
            }
        }
    }

    /// Stop the node: SIGTERM, then SIGKILL once the grace period elapses.
    pub async fn teardown(&self) {
        let mut slot = self.node.lock().await;

        if let Some(node) = slot.take() {
            tracing::info!(url = %node.rpc.url(), "Stopping ephemeral chain...");
            terminate(node.child, self.config.shutdown_grace()).await;
        }
        self.set_state(ChainProcessState::Stopped);
    }

    /// Stop the node and forget it; the next `ensure_ready` launches afresh.
    pub async fn reset(&self) {
        self.teardown().await;
        tracing::debug!("Ephemeral chain reset");
    }

    async fn launch(&self) -> Result<RunningNode> {
        let url = self.config.endpoint()?;
        let rpc = HttpRpc::with_timeout(url.clone(), PROBE_TIMEOUT)
            .map_err(|e| EngineError::chain_start(e.to_string(), ""))?;

        // Another node on the port would answer the probe in place of ours.
        ensure_port_free(&self.config.host, self.config.port)?;

        let args = NodeCmdBuilder::new(self.config.chain_id)
            .host(&self.config.host)
            .port(self.config.port)
            .accounts(self.accounts.len())
            .mnemonic(DEV_MNEMONIC)
            .extra_args(self.config.extra_args.iter().cloned())
            .build();

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::info!(
            program = %self.config.program.display(),
            %url,
            chain_id = self.config.chain_id,
            "Starting ephemeral chain..."
        );

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::chain_start(
                format!("failed to launch {}: {}", self.config.program.display(), e),
                "",
            )
        })?;
        self.launches.fetch_add(1, Ordering::SeqCst);

        let mut output = OutputTail::capture(&mut child);
        let eth = EthApi::new(&rpc);

        for attempt in 1..=self.config.startup_attempts {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let output = output.drain().await;
                    return Err(EngineError::chain_start(
                        format!("node exited before becoming reachable ({})", status),
                        output,
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to poll ephemeral chain process");
                }
            }

            let probe = eth.block_number().await;
            match probe {
                Ok(_) => {
                    if let Ok(Some(status)) = child.try_wait() {
                        let output = output.drain().await;
                        return Err(EngineError::chain_start(
                            format!("node exited before becoming reachable ({})", status),
                            output,
                        ));
                    }
                    if let Err(e) = verify_chain_id(&eth, self.config.chain_id).await {
                        let tail = output.snapshot();
                        terminate(child, self.config.shutdown_grace()).await;
                        return Err(EngineError::chain_start(e, tail));
                    }

                    tracing::info!(%url, attempt, "Ephemeral chain ready");
                    return Ok(RunningNode { child, rpc, output });
                }
                Err(e) => {
                    tracing::trace!(attempt, error = %e, "Ephemeral chain not reachable yet");
                }
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }

        let tail = output.snapshot();
        terminate(child, self.config.shutdown_grace()).await;
        Err(EngineError::chain_start(
            format!(
                "node not reachable at {} after {} attempts",
                url, self.config.startup_attempts
            ),
            tail,
        ))
    }
}

impl Drop for EphemeralChain {
    fn drop(&mut self) {
        if let Some(mut node) = self.node.get_mut().take() {
            tracing::warn!("Ephemeral chain still running on drop, killing it");
            #[cfg(unix)]
            if let Some(pid) = node.child.id() {
                let _ = std::process::Command::new("kill")
                    .args(["-KILL", "--", &format!("-{}", pid)])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
            }
            let _ = node.child.start_kill();
        }
    }
}

/// Fail if something is already listening on `host:port`.
fn ensure_port_free(host: &str, port: u16) -> Result<()> {
    match TcpListener::bind((host, port)) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Err(EngineError::chain_start(
            format!("port {} on {} is already in use", port, host),
            "",
        )),
        Err(e) => Err(EngineError::chain_start(
            format!("cannot bind {}:{}: {}", host, port, e),
            "",
        )),
    }
}

/// Check that the endpoint is the node we configured.
async fn verify_chain_id<R: JsonRpc>(eth: &EthApi<'_, R>, expected: u64) -> Result<(), String> {
    match eth.chain_id().await {
        Ok(chain_id) if chain_id == expected => Ok(()),
        Ok(chain_id) => Err(format!(
            "endpoint reports chain id {}, expected {}",
            chain_id, expected
        )),
        Err(e) => Err(format!("failed to query chain id: {}", e)),
    }
}

/// Stop a node process and everything it spawned.
async fn terminate(mut child: Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    signal_group(&child, "TERM").await;

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(%status, "Ephemeral chain exited"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for ephemeral chain"),
        Err(_) => {
            tracing::warn!(?grace, "Ephemeral chain ignored SIGTERM, killing it");
            signal_group(&child, "KILL").await;
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill ephemeral chain");
            }
        }
    }
}

/// Signal the process group led by `child`.
#[cfg(unix)]
async fn signal_group(child: &Child, signal: &str) {
    let Some(pid) = child.id() else {
        return;
    };

    let result = Command::new("kill")
        .arg(format!("-{}", signal))
        .arg("--")
        .arg(format!("-{}", pid))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::warn!(pid, signal, error = %e, "Failed to signal ephemeral chain");
    }
}

#[cfg(not(unix))]
async fn signal_group(_child: &Child, _signal: &str) {}

/// Rolling buffer of the node's stdout and stderr.
struct OutputTail {
    lines: Arc<StdMutex<VecDeque<String>>>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputTail {
    fn capture(child: &mut Child) -> Self {
        let lines = Arc::new(StdMutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        let mut readers = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_lines(stdout, lines.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_lines(stderr, lines.clone())));
        }

        Self { lines, readers }
    }

    /// Wait (briefly) for the pipes to close, then return everything captured.
    async fn drain(&mut self) -> String {
        for reader in self.readers.drain(..) {
            let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await;
        }
        self.snapshot()
    }

    fn snapshot(&self) -> String {
        match self.lines.lock() {
            Ok(lines) => lines.iter().cloned().collect::<Vec<_>>().join("\n"),
            Err(_) => String::new(),
        }
    }
}

impl Drop for OutputTail {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

async fn read_lines(pipe: impl AsyncRead + Unpin, lines: Arc<StdMutex<VecDeque<String>>>) {
    let mut reader = BufReader::new(pipe).lines();

    while let Ok(Some(line)) = reader.next_line().await {
        tracing::trace!(target: "soldeploy::node", "{}", line);
        if let Ok(mut lines) = lines.lock() {
            if lines.len() == OUTPUT_TAIL_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }
}
