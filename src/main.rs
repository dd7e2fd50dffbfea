//! eth-facade command line.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI args + config.toml
//!        │
//!        ▼
//!   ┌──────────┐     ┌──────────────────┐     ┌─────────────┐
//!   │  Facade  │────▶│ AlloyConnection  │────▶│ JSON-RPC    │
//!   │          │     │ (HTTP + failover │     │ node(s)     │
//!   │          │     │  + optional WS)  │     └─────────────┘
//!   └────┬─────┘     └──────────────────┘
//!        │
//!        ├── wallet / codec / events / contract
//!        │
//!   ┌────┴─────┐     ┌──────────────────┐
//!   │SmsSender │────▶│ SMS gateway      │
//!   │ + audit  │     └──────────────────┘
//!   └──────────┘
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::utils::format_ether;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use clap::{Parser, Subcommand};

use eth_facade::chain::contract::{format_value, ContractMethod};
use eth_facade::chain::{
    parse_address, AlloyConnection, BlockTag, DecodedEvent, Facade, GasPolicy, LogFilter,
    TransferIntent, Wallet,
};
use eth_facade::chain::events::TRANSFER_SIGNATURE_HASH;
use eth_facade::config::{load_config, FacadeConfig};
use eth_facade::lifecycle::{signals::cancel_on_ctrl_c, CancelHandle};
use eth_facade::observability::{logging::init_logging, metrics::init_metrics};
use eth_facade::sms::SmsSender;

#[derive(Parser)]
#[command(name = "eth-facade")]
#[command(about = "Query and transact on an EVM chain", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Native balance of an address
    Balance {
        #[arg(value_parser = address_arg)]
        address: Address,
        #[arg(long, default_value = "latest")]
        block: BlockTag,
    },
    /// Report whether an address holds contract code
    Classify {
        #[arg(value_parser = address_arg)]
        address: Address,
    },
    /// Block header summary
    Block {
        #[arg(default_value = "latest")]
        block: BlockTag,
    },
    /// Transactions included in a block
    Txs {
        #[arg(default_value = "latest")]
        block: BlockTag,
    },
    /// Read-only contract call, e.g. `call 0x.. "balanceOf(address) returns (uint256)" 0x..`
    Call {
        #[arg(value_parser = address_arg)]
        contract: Address,
        signature: String,
        args: Vec<String>,
    },
    /// ERC-20 metadata, and a holder's balance when given
    Token {
        #[arg(value_parser = address_arg)]
        token: Address,
        #[arg(long, value_parser = address_arg)]
        holder: Option<Address>,
    },
    /// Historical logs of a contract
    Logs {
        #[arg(value_parser = address_arg)]
        address: Address,
        #[arg(long)]
        from: Option<BlockTag>,
        #[arg(long)]
        to: Option<BlockTag>,
        /// Only ERC-20 Transfer events
        #[arg(long)]
        transfers: bool,
    },
    /// Stream live logs of a contract until Ctrl-C
    Watch {
        #[arg(value_parser = address_arg)]
        address: Address,
    },
    /// Send wei from the key in ETH_FACADE_PRIVATE_KEY
    Send {
        #[arg(value_parser = address_arg)]
        to: Address,
        /// Amount in wei
        value: U256,
        /// Hex calldata
        #[arg(long)]
        data: Option<String>,
        /// Legacy gas price in wei; node estimates when omitted
        #[arg(long)]
        gas_price: Option<u128>,
        #[arg(long, default_value_t = 21_000)]
        gas_limit: u64,
        /// Wait for the receipt
        #[arg(long)]
        wait: bool,
    },
    /// Mined, pending, or dropped
    Status { hash: TxHash },
    /// Network encoding of a known transaction
    Raw { hash: TxHash },
    /// Decode raw transaction hex
    Decode { raw: String },
    /// Generate a new private key
    NewWallet,
    /// Send a templated SMS
    Sms {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        template: String,
        /// Template variable as key=value; repeatable
        #[arg(long = "param", value_parser = key_value_arg)]
        params: Vec<(String, String)>,
    },
}

fn address_arg(text: &str) -> Result<Address, String> {
    parse_address(text).map_err(|e| e.to_string())
}

fn key_value_arg(text: &str) -> Result<(String, String), String> {
    text.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", text))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FacadeConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("eth-facade v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::NewWallet => {
            let wallet = Wallet::random();
            println!("address:     {}", wallet.address());
            println!("private key: {}", wallet.private_key_hex());
            return Ok(());
        }
        Commands::Decode { raw } => {
            let bytes = alloy::primitives::hex::decode(raw.trim())?;
            let tx = eth_facade::chain::codec::decode_transaction(&bytes)?;
            print_signed(&tx)?;
            return Ok(());
        }
        Commands::Sms {
            phone,
            template,
            params,
        } => {
            let sender = SmsSender::from_config(&config.sms)?;
            let params: BTreeMap<String, String> = params.into_iter().collect();
            let outcome = sender.send(&phone, &template, &params).await?;
            println!("sent: request_id={} biz_id={}", outcome.request_id, outcome.biz_id);
            return Ok(());
        }
        command => run_chain_command(&config, command).await?,
    }

    Ok(())
}

async fn run_chain_command(
    config: &FacadeConfig,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    let conn = AlloyConnection::connect(config.chain.clone()).await?;
    if !conn.is_healthy().await {
        tracing::warn!(rpc_url = %config.chain.rpc_url, "Node is not answering; commands will fail");
    }
    let facade = Facade::new(Arc::new(conn)).with_receipt_config(config.receipts.clone());

    let cancel = CancelHandle::new();
    cancel_on_ctrl_c(cancel.clone());

    match command {
        Commands::Balance { address, block } => {
            let balance = facade.get_balance(address, block).await?;
            println!("{} wei ({} ETH)", balance, format_ether(balance));
        }
        Commands::Classify { address } => {
            let kind = facade.classify_address(address).await?;
            println!("{:?}", kind);
        }
        Commands::Block { block } => {
            let summary = facade.get_block(block).await?;
            println!("number:       {}", summary.number);
            println!("hash:         {}", summary.hash);
            println!("timestamp:    {}", summary.timestamp);
            println!("difficulty:   {}", summary.difficulty);
            println!("transactions: {}", summary.transactions.len());
        }
        Commands::Txs { block } => {
            for tx in facade.block_transactions(block).await? {
                println!(
                    "{} from={} to={} value={} gas={} gas_price={} nonce={}",
                    tx.hash,
                    tx.from,
                    tx.to.map(|a| a.to_string()).unwrap_or_else(|| "<create>".into()),
                    tx.value,
                    tx.gas_limit,
                    tx.gas_price,
                    tx.nonce
                );
            }
        }
        Commands::Call {
            contract,
            signature,
            args,
        } => {
            let method = ContractMethod::parse(&signature)?;
            let values = method.coerce_args(&args)?;
            for value in facade.call_method(contract, &method, &values).await? {
                println!("{}", format_value(&value));
            }
        }
        Commands::Token { token, holder } => {
            let metadata = facade.token_metadata(token).await?;
            println!("name:     {}", metadata.name);
            println!("symbol:   {}", metadata.symbol);
            println!("decimals: {}", metadata.decimals);
            if let Some(holder) = holder {
                println!("balance:  {}", facade.token_balance(token, holder).await?);
            }
        }
        Commands::Logs {
            address,
            from,
            to,
            transfers,
        } => {
            let mut filter = LogFilter::new().address(address);
            if let Some(from) = from {
                filter = filter.from_block(from);
            }
            if let Some(to) = to {
                filter = filter.to_block(to);
            }
            if transfers {
                filter = filter.event_signature(TRANSFER_SIGNATURE_HASH);
            }

            let logs = facade.fetch_logs(&filter).await?;
            for (log, decoded) in logs.iter().zip(facade.decode_logs(&logs)) {
                print_log(log.block_number, log.log_index, decoded);
            }
        }
        Commands::Watch { address } => {
            let filter = LogFilter::new().address(address);
            let mut subscription = facade.subscribe_logs(&filter, cancel.token()).await?;
            loop {
                match subscription.next().await {
                    Ok(log) => {
                        let decoded = facade.decode_logs(std::slice::from_ref(&log));
                        for result in decoded {
                            print_log(log.block_number, log.log_index, result);
                        }
                    }
                    Err(eth_facade::FacadeError::Cancelled) => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Commands::Send {
            to,
            value,
            data,
            gas_price,
            gas_limit,
            wait,
        } => {
            let wallet = Wallet::from_env()?;
            let payload = match data {
                Some(hex) => Bytes::from(alloy::primitives::hex::decode(hex.trim())?),
                None => Bytes::new(),
            };
            let gas_policy = match gas_price {
                Some(gas_price) => GasPolicy::Fixed {
                    gas_price,
                    gas_limit,
                },
                None => GasPolicy::Estimate,
            };

            let request = facade
                .build_transaction(TransferIntent {
                    chain_id: facade.chain_id().await?,
                    from: wallet.address(),
                    to: Some(to),
                    value,
                    payload,
                    gas_policy,
                })
                .await?;
            let signed = facade.sign_transaction(&request, &wallet).await?;
            let hash = facade.submit_transaction(&signed).await?;
            println!("submitted: {}", hash);

            if wait {
                let receipt = facade.await_receipt_default(hash, cancel.token()).await?;
                println!(
                    "mined in block {:?}: {} (gas used {})",
                    receipt.block_number,
                    if receipt.success { "success" } else { "reverted" },
                    receipt.gas_used
                );
            }
        }
        Commands::Status { hash } => {
            println!("{:?}", facade.transaction_status(hash).await?);
        }
        Commands::Raw { hash } => {
            let raw = facade.raw_transaction(hash).await?;
            println!("0x{}", alloy::primitives::hex::encode(&raw));
        }
        Commands::NewWallet | Commands::Decode { .. } | Commands::Sms { .. } => {}
    }

    Ok(())
}

fn print_log(
    block: u64,
    index: u64,
    decoded: eth_facade::FacadeResult<DecodedEvent>,
) {
    match decoded {
        Ok(DecodedEvent::Transfer(t)) => {
            println!("[{}:{}] Transfer {} -> {} : {}", block, index, t.from, t.to, t.value)
        }
        Ok(DecodedEvent::Approval(a)) => println!(
            "[{}:{}] Approval {} -> {} : {}",
            block, index, a.owner, a.spender, a.value
        ),
        Ok(DecodedEvent::Generic { name, values }) => {
            let rendered: Vec<String> = values.iter().map(format_value).collect();
            println!("[{}:{}] {}({})", block, index, name, rendered.join(", "))
        }
        Err(e) => println!("[{}:{}] undecoded: {}", block, index, e),
    }
}

fn print_signed(
    tx: &eth_facade::chain::types::SignedTransaction,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("hash:      {}", tx.hash());
    println!("from:      {}", tx.recover_sender()?);
    println!(
        "to:        {}",
        tx.to().map(|a| a.to_string()).unwrap_or_else(|| "<create>".into())
    );
    println!("nonce:     {}", tx.nonce());
    println!("value:     {}", tx.value());
    println!("gas limit: {}", tx.gas_limit());
    println!("chain id:  {:?}", tx.chain_id());
    println!("input:     0x{}", alloy::primitives::hex::encode(tx.input()));
    Ok(())
}
