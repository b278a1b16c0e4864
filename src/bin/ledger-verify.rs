#![forbid(unsafe_code)]
use clap::{Parser, Subcommand};
use ledgerchain::blockchain::{AsOf, Blockchain, ValidationWindow};
use ledgerchain::config::{load_config, Config};
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about = "Replays and validates a ledger from files", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "ledger.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Adds every block through validation and prints the resulting head
    Verify,
    /// Prints the balance of an account
    Balance {
        account: String,
        /// Block number to resolve at; the head when omitted
        #[arg(long)]
        at: Option<u64>,
    },
}

fn init_logging(config: &Config) {
    let level = config.log.level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn load_chain(config: &Config) -> Result<Blockchain, Box<dyn std::error::Error>> {
    let mut chain = Blockchain::new(config.load_genesis()?)?;
    // Rejections are logged by the chain.
    for block in config.load_blocks()? {
        chain.add_block(block)?;
    }

    if config.chain.validate_on_load {
        let validated = chain.validate(ValidationWindow::all())?;
        info!(validated, "Chain validated");
    }
    Ok(chain)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config);

    let chain = load_chain(&config)?;

    match cli.command.unwrap_or(Commands::Verify) {
        Commands::Verify => {
            match chain.head_block()? {
                Some(head) => println!(
                    "Head: block {} ({}) at {}",
                    head.block_number, head.block_identifier, head.timestamp
                ),
                None => println!("Head: no blocks, next block is {}", chain.next_block_number()?),
            }
            for account in chain.known_accounts()? {
                println!("{}: {}", account, chain.account_balance(&account, AsOf::Head)?);
            }
        }
        Commands::Balance { account, at } => {
            let at = at.map(AsOf::Block).unwrap_or(AsOf::Head);
            println!("{}", chain.account_balance(&account, at)?);
        }
    }

    Ok(())
}
