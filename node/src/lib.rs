use alloy_primitives::{Address, FixedBytes};
use clap::Parser;
use dotenv::dotenv;
use eth1_mock_common::{
    chain::{ChainState, History},
    config,
    deposit::{build_deposits, DepositRecord},
    file_storage::{self, DepositCache},
    keys::KeyFile,
    Error as ChainError,
};
use jsonrpsee::{
    server::{Server, ServerHandle},
    RpcModule,
};
use rpc::{Eth1Server, RpcServer};
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod rpc;
pub mod ws;

/// Largest request body either listener accepts.
pub const MAX_REQUEST_BODY_SIZE: u32 = 512 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub host: String,
    pub http_port: u16,
    pub ws_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Shape of the mock chain.
pub struct ChainConfig {
    /// Seconds between two mock blocks.
    pub block_time: u64,
    /// Deposits already included at startup.
    pub genesis_deposits: usize,
    /// Head block number at startup.
    pub start_block: u64,
    /// Seconds between two blocks of the synthetic history.
    pub history_block_time: u64,
    pub chain_id: u64,
    pub deposit_contract: Address,
    /// Amount of every deposit, in gwei.
    pub deposit_amount: u64,
    pub fork_version: FixedBytes<4>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// The configuration for the eth1 mock node.
pub struct Config {
    pub rpc: RpcConfig,
    pub chain: ChainConfig,
    pub deposits: file_storage::Config,
}

impl Config {
    /// Applies the command line overrides.
    pub fn apply(&mut self, args: &Args) {
        if let Some(keys_file) = &args.keys_file {
            self.deposits.set_keys_file(Some(keys_file.clone()));
        }
        if let Some(genesis_deposits) = args.genesis_deposits {
            self.chain.genesis_deposits = genesis_deposits;
        }
        if let Some(block_time) = args.block_time {
            self.chain.block_time = block_time;
        }
        if let Some(host) = &args.host {
            self.rpc.host = host.clone();
        }
        if let Some(http_port) = args.http_port {
            self.rpc.http_port = http_port;
        }
        if let Some(ws_port) = args.ws_port {
            self.rpc.ws_port = ws_port;
        }
    }
}

/// Mock eth1 node for validator client testing
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// TOML config file, instead of the one in the user config dir
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Unencrypted validator keys to build deposits from
    #[arg(long)]
    pub keys_file: Option<PathBuf>,
    /// Number of deposits included at startup
    #[arg(long)]
    pub genesis_deposits: Option<usize>,
    /// Seconds between two blocks
    #[arg(long)]
    pub block_time: Option<u64>,
    #[arg(long)]
    pub http_port: Option<u16>,
    #[arg(long)]
    pub ws_port: Option<u16>,
    #[arg(long)]
    pub host: Option<String>,
    /// Re-sign the deposits even if a cache exists
    #[arg(long)]
    pub invalidate_cache: bool,
    /// Don't read deposit triggers from stdin
    #[arg(long)]
    pub no_trigger: bool,
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// Loads the signed deposits from the cache, or signs them from the key file and
/// refreshes the cache.
pub fn load_deposits(
    config: &Config, invalidate_cache: bool,
) -> Result<Vec<DepositRecord>, ChainError> {
    let cache = DepositCache::new(&config.deposits);
    if !invalidate_cache {
        if let Some(deposits) = cache.load()? {
            return Ok(deposits);
        }
    }

    let path = config
        .deposits
        .keys_file()
        .as_ref()
        .ok_or_else(|| ChainError::KeyFile("no keys file configured".to_string()))?;
    let keys = KeyFile::load(path)?.keys;
    info!(count = keys.len(), "signing deposits");
    let deposits =
        build_deposits(&keys, config.chain.deposit_amount, config.chain.fork_version.0)?;
    cache.store(&deposits)?;
    Ok(deposits)
}

/// Addresses and handles of the two listeners.
pub struct Servers {
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    http: ServerHandle,
    ws_stop: watch::Sender<bool>,
    ws: JoinHandle<std::io::Result<()>>,
}

impl Servers {
    pub async fn stop(self) {
        let _ = self.http.stop();
        let _ = self.ws_stop.send(true);
        self.http.stopped().await;
        match self.ws.await {
            Ok(Err(e)) => error!("WebSocket listener error: {e}"),
            Err(e) => error!("WebSocket listener task failed: {e}"),
            Ok(Ok(())) => {},
        }
    }
}

/// Mints a block every `block_time`, including whatever deposits are queued.
pub fn spawn_block_producer(chain: Arc<Mutex<ChainState>>, block_time: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let mut chain = chain.lock().await;
            match chain.advance_block(unix_now()) {
                Ok(header) => info!(
                    number = header.number(),
                    hash = %header.hash(),
                    ready = chain.ready_count(),
                    "new block"
                ),
                Err(e) => error!("Block advance error: {e}"),
            }
        }
    })
}

/// Reads deposit counts from stdin, one per line, and queues them for the next block.
pub fn spawn_trigger(chain: Arc<Mutex<ChainState>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Enter the number of deposits to send in the next block");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Stdin error: {e}");
                    break;
                },
            };
            let n = match line.trim().parse::<usize>() {
                Ok(n) => n,
                Err(e) => {
                    warn!("Invalid deposit count {:?}: {e}", line.trim());
                    continue;
                },
            };
            let mut chain = chain.lock().await;
            match chain.trigger_deposits(n) {
                Ok(()) => info!(
                    queued = chain.queued_count(),
                    available = chain.available(),
                    "deposits queued for the next block"
                ),
                Err(e) => error!("Trigger rejected: {e}"),
            }
        }
    })
}

/// The eth1 mock node. It owns the chain state and the JsonRPC module serving it.
pub struct Node {
    config: Config,
    args: Args,
    chain: Arc<Mutex<ChainState>>,
    rpc: RpcModule<Eth1Server>,
}

impl Node {
    /// Initialize the node:
    /// - Load the config from config.toml, apply the CLI overrides
    /// - Load or sign the deposits
    /// - Build the mock chain and the JsonRPC module
    pub async fn init(args: Args) -> Result<Self, Box<dyn Error>> {
        dotenv().ok();
        let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).try_init();

        let mut config: Config = match &args.config {
            Some(path) => config::Loader::load_path(path)?,
            None => {
                let config_loader = config::Loader::new("eth1-mock-node")?;
                config_loader.load_or_create(include_str!("../config.toml"))?
            },
        };
        config.apply(&args);

        let deposits = load_deposits(&config, args.invalidate_cache)?;
        Ok(Self::new(config, args, deposits)?)
    }

    /// Builds the node around an already loaded deposit corpus.
    pub fn new(
        config: Config, args: Args, deposits: Vec<DepositRecord>,
    ) -> Result<Self, ChainError> {
        let history = History {
            head: config.chain.start_block,
            block_time: config.chain.history_block_time,
            now: unix_now(),
        };
        let total = deposits.len();
        let chain = ChainState::new(
            deposits,
            config.chain.genesis_deposits,
            history,
            config.chain.deposit_contract,
        )?;
        info!(
            total,
            genesis = config.chain.genesis_deposits,
            head = history.head,
            "mock chain ready"
        );

        let chain = Arc::new(Mutex::new(chain));
        let server = Eth1Server::new(
            chain.clone(),
            config.chain.chain_id,
            Duration::from_secs(config.chain.block_time),
        );
        let rpc = server.into_rpc();
        Ok(Self { config, args, chain, rpc })
    }

    pub fn chain(&self) -> Arc<Mutex<ChainState>> {
        self.chain.clone()
    }

    /// Starts the HTTP-only and WebSocket-only listeners over the same module.
    pub async fn serve(&self) -> Result<Servers, Box<dyn Error>> {
        let host = self.config.rpc.host.as_str();
        let http = Server::builder()
            .max_request_body_size(MAX_REQUEST_BODY_SIZE)
            .http_only()
            .build((host, self.config.rpc.http_port))
            .await?;
        let http_addr = http.local_addr()?;

        let listener = TcpListener::bind((host, self.config.rpc.ws_port)).await?;
        let ws_addr = listener.local_addr()?;
        let (ws_stop, mut stopped) = watch::channel(false);
        let router = ws::router(self.rpc.clone().into(), ws_stop.subscribe());
        let ws_task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stopped.changed().await;
                })
                .await
        });
        info!("HTTP listening on {http_addr}, WebSocket listening on {ws_addr}");

        Ok(Servers { http_addr, ws_addr, http: http.start(self.rpc.clone()), ws_stop, ws: ws_task })
    }

    /// Run the node:
    /// - Serve HTTP and WebSocket
    /// - Advance the chain every block time
    /// - Read deposit triggers from stdin
    /// - Stop on ctrl-c
    pub async fn run(&self) -> Result<(), Box<dyn Error>> {
        let servers = self.serve().await?;
        let producer = spawn_block_producer(
            self.chain.clone(),
            Duration::from_secs(self.config.chain.block_time),
        );
        let trigger = (!self.args.no_trigger).then(|| spawn_trigger(self.chain.clone()));

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        producer.abort();
        if let Some(trigger) = trigger {
            trigger.abort();
        }
        servers.stop().await;
        Ok(())
    }
}
