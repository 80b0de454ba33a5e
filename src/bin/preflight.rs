use solana_program::pubkey::Pubkey;
use std::str::FromStr;

use swarms_settlement::domain::commission::{calculate_commission, validate_commission_calculation};
use swarms_settlement::domain::settlement::lamports_to_sol;
use swarms_settlement::infra::config;
use swarms_settlement::solana::Ledger;
use swarms_settlement::WalletCipher;

const SAMPLE_AMOUNTS: [f64; 6] = [0.001, 0.1, 1.0, 10.0, 100.0, 999.0];

#[derive(Default)]
struct Report {
    failures: usize,
    warnings: usize,
}

impl Report {
    fn pass(&self, msg: impl AsRef<str>) {
        println!("  PASS     {}", msg.as_ref());
    }

    fn fail(&mut self, msg: impl AsRef<str>) {
        self.failures += 1;
        println!("  FAIL     {}", msg.as_ref());
    }

    fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings += 1;
        println!("  WARNING  {}", msg.as_ref());
    }
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight [-- --check-rpc]\n\
         \n\
         Requires env vars:\n\
           SOLANA_RPC_URL, SWARMS_TOKEN_ADDRESS, DAO_TREASURY_ADDRESS, WALLET_ENCRYPTION_KEY\n\
         Optional:\n\
           DATABASE_URL, COMMISSION_NOTIFICATION_EMAIL, SMTP_HOST, SMTP_USER, SMTP_PASS\n"
    );
    std::process::exit(2);
}

fn check_address(report: &mut Report, name: &str) {
    match config::optional(name) {
        Some(raw) => match Pubkey::from_str(raw.trim()) {
            Ok(pk) => report.pass(format!("{} = {}", name, pk)),
            Err(_) => report.fail(format!("{} is not a valid Solana address", name)),
        },
        None => report.fail(format!("{} is not set", name)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }
    let check_rpc = args.iter().any(|a| a == "--check-rpc");

    let mut report = Report::default();

    println!("> Environment:");
    match config::optional("SOLANA_RPC_URL") {
        Some(url) => report.pass(format!("SOLANA_RPC_URL = {}", url)),
        None => report.fail("SOLANA_RPC_URL is not set"),
    }
    check_address(&mut report, "SWARMS_TOKEN_ADDRESS");
    check_address(&mut report, "DAO_TREASURY_ADDRESS");
    match config::optional("WALLET_ENCRYPTION_KEY") {
        Some(key) => match WalletCipher::from_base64_key(&key) {
            Ok(_) => report.pass("WALLET_ENCRYPTION_KEY is a 32-byte key"),
            Err(e) => report.fail(format!("WALLET_ENCRYPTION_KEY: {}", e)),
        },
        None => report.fail("WALLET_ENCRYPTION_KEY is not set"),
    }
    match config::optional("DATABASE_URL") {
        Some(_) => report.pass("DATABASE_URL is set"),
        None => report.warn("DATABASE_URL is not set; the server will use the in-memory store"),
    }
    match config::optional("COMMISSION_NOTIFICATION_EMAIL") {
        Some(email) => report.pass(format!("COMMISSION_NOTIFICATION_EMAIL = {}", email)),
        None => report.warn("COMMISSION_NOTIFICATION_EMAIL is not set; commission reports are not mailed"),
    }
    for name in ["SMTP_HOST", "SMTP_USER", "SMTP_PASS"] {
        if config::optional(name).is_none() {
            report.warn(format!("{} is not set", name));
        }
    }

    println!("> Commission math:");
    for amount in SAMPLE_AMOUNTS {
        let c = calculate_commission(amount);
        if validate_commission_calculation(amount, c.platform_fee, c.seller_amount) {
            report.pass(format!(
                "{} SOL -> fee {} + seller {}",
                amount, c.platform_fee, c.seller_amount
            ));
        } else {
            report.fail(format!("{} SOL does not split cleanly", amount));
        }
    }

    if check_rpc {
        println!("> RPC:");
        match config::optional("SOLANA_RPC_URL") {
            Some(url) => {
                let ledger = swarms_settlement::solana::RpcLedger::new(url);
                match ledger.client().get_version().await {
                    Ok(v) => report.pass(format!("RPC version {}", v.solana_core)),
                    Err(e) => report.fail(format!("RPC unreachable: {}", e)),
                }
                let treasury = config::optional("DAO_TREASURY_ADDRESS")
                    .and_then(|raw| Pubkey::from_str(raw.trim()).ok());
                if let Some(treasury) = treasury {
                    match ledger.balance(&treasury).await {
                        Ok(lamports) => report.pass(format!(
                            "treasury balance {:.6} SOL",
                            lamports_to_sol(lamports)
                        )),
                        Err(e) => report.warn(format!("could not read treasury balance: {}", e)),
                    }
                }
            }
            None => report.fail("cannot reach RPC without SOLANA_RPC_URL"),
        }
    }

    println!(
        "> Preflight finished: {} failure(s), {} warning(s)",
        report.failures, report.warnings
    );
    if report.failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
