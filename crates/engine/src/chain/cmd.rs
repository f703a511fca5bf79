//! Command-line builder for the ephemeral node.

/// Builder for the node's arguments (anvil-compatible flags).
#[derive(Debug, Clone)]
pub struct NodeCmdBuilder {
    host: String,
    port: u16,
    chain_id: u64,
    accounts: usize,
    mnemonic: Option<String>,
    silent: bool,
    extra_args: Vec<String>,
}

impl NodeCmdBuilder {
    /// Create a new builder for a node serving `chain_id`.
    pub fn new(chain_id: u64) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8546,
            chain_id,
            accounts: 10,
            mnemonic: None,
            silent: true,
            extra_args: Vec::new(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Number of funded accounts to create at genesis.
    pub fn accounts(mut self, accounts: usize) -> Self {
        self.accounts = accounts;
        self
    }

    /// Derive the funded accounts from this mnemonic.
    pub fn mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.mnemonic = Some(mnemonic.into());
        self
    }

    /// Suppress the startup banner (it lists every dev private key).
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the command as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec![
            "--host".to_string(),
            self.host,
            "--port".to_string(),
            self.port.to_string(),
            "--chain-id".to_string(),
            self.chain_id.to_string(),
            "--accounts".to_string(),
            self.accounts.to_string(),
        ];

        if let Some(mnemonic) = self.mnemonic {
            cmd.push("--mnemonic".to_string());
            cmd.push(mnemonic);
        }

        if self.silent {
            cmd.push("--silent".to_string());
        }

        cmd.extend(self.extra_args);

        cmd
    }
}
