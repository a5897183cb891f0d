//! flashcard-db - command line access to the flashcard database.

use clap::Parser;
use flashcard_db::config::{Command, Config};
use flashcard_db::db::{PoolRegistry, RetryingExecutor};
use flashcard_db::models::{CardUpdate, NewCard, Query};
use flashcard_db::store::CardStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr so stdout carries only results.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Command, store: &CardStore) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Query { sql, params } => {
            let result = store
                .executor()
                .query(&Query::new(sql).with_values(params))
                .await?;
            print_json(&result)
        }
        Command::Execute { sql, params } => {
            let affected = store
                .executor()
                .execute(&Query::new(sql).with_values(params))
                .await?;
            print_json(&serde_json::json!({ "rows_affected": affected }))
        }
        Command::CardSets => print_json(&store.list_card_sets().await?),
        Command::CardSet { id } => match store.get_card_set(id).await? {
            Some(set) => print_json(&set),
            None => Err(format!("Card set {} does not exist", id).into()),
        },
        Command::CreateCardSet { name } => {
            store.create_card_set(&name).await?;
            info!(card_set = %name, "Card set created");
            Ok(())
        }
        Command::Cards { card_set_id } => print_json(&store.list_cards(card_set_id).await?),
        Command::AddCard {
            card_set_id,
            front,
            back,
        } => {
            store
                .create_card(&NewCard::new(card_set_id, front, back))
                .await?;
            Ok(())
        }
        Command::UpdateCard { id, front, back } => {
            let affected = store.update_card(&CardUpdate { id, front, back }).await?;
            print_json(&serde_json::json!({ "rows_affected": affected }))
        }
        Command::DeleteCard { id } => {
            let affected = store.delete_card(id).await?;
            print_json(&serde_json::json!({ "rows_affected": affected }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let connection = config.connection_config()?;
    let policy = config.retry_policy()?;

    info!(
        db_type = %connection.db_type(),
        database = %connection.database(),
        max_retries = policy.max_retries(),
        "Starting flashcard-db v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = Arc::new(PoolRegistry::with_close_timeout(
        config.close_timeout_duration(),
    ));
    let executor = RetryingExecutor::new(Arc::clone(&registry), connection, policy);
    let store = CardStore::new(executor);

    let result = run(config.command.clone(), &store).await;

    if let Err(e) = registry.close_all().await {
        error!(error = %e, "Failed to close connection pools");
    }

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
