use std::path::PathBuf;

use alloy_primitives::{eip191_hash_message, Address, B256};
use clap::{Args, Parser, Subcommand};
use mega_aa::{
    test_utils::SimpleAccountFactory, EntryPoint, EntryPointConfig, UserOperation,
    VerifyingPaymaster, WorldState,
};
use tracing::{debug, info};

use crate::{load_config, load_json, parse_user_op, CliError, LogArgs, Result};

/// Command line helpers for the mega-aa entry point.
#[derive(Parser, Debug)]
#[command(infer_subcommands = true, version = "0.1")]
pub struct MainCmd {
    /// Logging configuration
    #[command(flatten)]
    pub log_args: LogArgs,

    /// Entry point configuration
    #[command(flatten)]
    pub config_args: ConfigArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the mega-aa CLI.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the request id of a user operation
    RequestId(OpArgs),
    /// Compute the hash a verifying paymaster signer approves
    PaymasterHash(PaymasterHashArgs),
    /// Compute the counterfactual address of a sample account
    SenderAddress(SenderAddressArgs),
}

/// Entry point configuration: a JSON file, overridden by flags.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Entry point configuration file (JSON, camelCase keys)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Entry point address
    #[arg(long = "entry-point", global = true)]
    pub entry_point: Option<Address>,

    /// Chain id
    #[arg(long = "chain-id", global = true, env = "MEGA_AA_CHAIN_ID")]
    pub chain_id: Option<u64>,
}

impl ConfigArgs {
    /// Resolves the configuration: defaults, then the file, then flags.
    pub fn resolve(&self) -> Result<EntryPointConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => EntryPointConfig::default(),
        };
        if let Some(address) = self.entry_point {
            config = config.with_address(address);
        }
        if let Some(chain_id) = self.chain_id {
            config = config.with_chain_id(chain_id);
        }
        Ok(config)
    }
}

/// A user operation given inline or as a file.
#[derive(Args, Debug, Clone)]
pub struct OpArgs {
    /// User operation as JSON. Missing fields default to zero.
    #[arg(long = "op", conflicts_with = "op_file")]
    pub op: Option<String>,

    /// File containing the user operation as JSON. Use - for stdin.
    #[arg(long = "op.file", visible_aliases = ["op-file"])]
    pub op_file: Option<PathBuf>,
}

impl OpArgs {
    /// Loads the user operation.
    pub fn load(&self) -> Result<UserOperation> {
        parse_user_op(load_json(self.op.as_deref(), self.op_file.as_deref())?)
    }
}

/// Arguments of `paymaster-hash`.
#[derive(Args, Debug, Clone)]
pub struct PaymasterHashArgs {
    /// The user operation
    #[command(flatten)]
    pub op: OpArgs,

    /// Address of the verifying paymaster. Defaults to the paymaster of the operation.
    #[arg(long)]
    pub paymaster: Option<Address>,

    /// Expiry of the sponsorship. Zero means no expiry.
    #[arg(long = "valid-until", default_value_t = 0)]
    pub valid_until: u64,

    /// Start of the sponsorship.
    #[arg(long = "valid-after", default_value_t = 0)]
    pub valid_after: u64,
}

/// Arguments of `sender-address`.
#[derive(Args, Debug, Clone)]
pub struct SenderAddressArgs {
    /// Owner of the account
    #[arg(long)]
    pub owner: Address,

    /// Address of the account factory
    #[arg(long)]
    pub factory: Address,

    /// CREATE2 salt
    #[arg(long, default_value_t = B256::ZERO)]
    pub salt: B256,
}

impl MainCmd {
    /// Execute the command.
    pub fn run(&self) -> Result<()> {
        self.log_args.init()?;
        let config = self.config_args.resolve()?;
        debug!(?config, "Resolved entry point configuration");
        let output = match &self.command {
            Command::RequestId(args) => request_id(&config, &args.load()?).to_string(),
            Command::PaymasterHash(args) => paymaster_hash(&config, args)?,
            Command::SenderAddress(args) => sender_address(&config, args)?.to_string(),
        };
        println!("{output}");
        Ok(())
    }
}

/// The request id of `op` under `config`.
pub fn request_id(config: &EntryPointConfig, op: &UserOperation) -> B256 {
    let entry_point = EntryPoint::new(*config, WorldState::default());
    let request_id = entry_point.get_request_id(op);
    info!(sender = %op.sender, %request_id, "Computed request id");
    request_id
}

/// The verifying paymaster hash and the EIP-191 digest its signer signs, one per line.
pub fn paymaster_hash(config: &EntryPointConfig, args: &PaymasterHashArgs) -> Result<String> {
    let op = args.op.load()?;
    let paymaster = args.paymaster.unwrap_or(op.paymaster);
    if paymaster.is_zero() {
        return Err(CliError::InvalidInput(
            "no paymaster: pass --paymaster or set it in the operation".to_string(),
        ));
    }
    let hash = VerifyingPaymaster::get_hash(
        &op,
        config.chain_id,
        paymaster,
        args.valid_until,
        args.valid_after,
    );
    info!(%paymaster, %hash, "Computed paymaster hash");
    Ok(format!("{hash}\n{}", eip191_hash_message(hash)))
}

/// The address the sample account factory at `args.factory` deploys for `args.owner`.
pub fn sender_address(config: &EntryPointConfig, args: &SenderAddressArgs) -> Result<Address> {
    let entry_point = EntryPoint::new(*config, WorldState::default());
    let init_code = SimpleAccountFactory::init_code(args.factory, args.owner);
    let sender = entry_point
        .get_sender_address(&init_code, args.salt)
        .ok_or_else(|| CliError::InvalidInput("init code without factory".to_string()))?;
    info!(owner = %args.owner, factory = %args.factory, %sender, "Computed sender address");
    Ok(sender)
}
