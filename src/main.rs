//! SimpleBank - single transfer runner
//!
//! ```text
//! simplebank [--env dev] [--migrate] --from 1 --to 2 --amount 200 \
//!            --currency USD --reference REF1
//! ```
//!
//! Prints the committed transfer as JSON on stdout. Ctrl-C before commit
//! rolls the transfer back.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use simplebank::config::AppConfig;
use simplebank::db::Database;
use simplebank::store::{PgBackend, RandomReference, Store, TransferTxParams};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn require_arg(name: &str) -> Result<String> {
    get_arg(name).with_context(|| format!("missing required argument {} <value>", name))
}

fn has_flag(name: &str) -> bool {
    std::env::args().any(|a| a == name)
}

fn get_env() -> String {
    get_arg("--env")
        .or_else(|| get_arg("-e"))
        .unwrap_or_else(|| "dev".to_string())
}

fn transfer_params_from_args() -> Result<TransferTxParams> {
    Ok(TransferTxParams {
        source_account_id: require_arg("--from")?
            .parse()
            .context("--from must be an integer account id")?,
        destination_account_id: require_arg("--to")?
            .parse()
            .context("--to must be an integer account id")?,
        amount: require_arg("--amount")?
            .parse()
            .context("--amount must be an integer in the smallest currency unit")?,
        currency: require_arg("--currency")?,
        reference: require_arg("--reference")?,
    })
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = simplebank::logging::init_logging(&app_config);

    tracing::info!("Starting SimpleBank in {} mode", env);

    let db = Database::connect(&app_config.postgres)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("Database health check failed")?;

    if has_flag("--migrate") {
        db.migrate().await.context("Failed to apply migrations")?;
        if get_arg("--from").is_none() {
            return Ok(());
        }
    }

    let params = transfer_params_from_args()?;

    let store = Store::with_reference_generator(
        PgBackend::new(db.pool().clone()),
        Arc::new(RandomReference::new(app_config.transfer.reference_length)),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling transfer");
            on_signal.cancel();
        }
    });

    match store.transfer_tx(&cancel, params).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Transfer failed");
            if e.is_validation() {
                bail!("invalid transfer request: {}", e);
            }
            if e.is_lock_contention() {
                bail!("transfer aborted on lock contention, resubmit: {}", e);
            }
            bail!("transfer failed: {}", e);
        }
    }
}
