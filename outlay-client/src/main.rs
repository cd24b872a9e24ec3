//! Outlay command-line entry point.

use clap::{Parser, Subcommand};
use outlay_client::config::ClientConfig;
use outlay_client::notifications::Notification;
use outlay_client::upload::LocalFile;
use outlay_client::{telemetry, ClientError, ClientResult, ExpenseClient};
use outlay_core::{ExpenseDraft, ExpenseId};
use outlay_sync::Freshness;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "outlay", version, about = "Track expenses and their receipts")]
struct Cli {
    /// Client configuration file.
    #[arg(long, env = "OUTLAY_CONFIG", value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// List expenses.
    List,
    /// Show one expense.
    Show { id: ExpenseId },
    /// Create an expense.
    Add { title: String, amount: f64 },
    /// Delete an expense.
    Delete { id: ExpenseId },
    /// Upload a receipt and attach it to an expense.
    Attach { id: ExpenseId, path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<ExitCode, ClientError> {
    let cli = Cli::parse();

    let config = ClientConfig::load_from(&cli.config)?;
    telemetry::init_tracing(&config.log)?;
    let client = ExpenseClient::connect(&config)?;

    match run(&client, cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            eprintln!("{}", Notification::from(&err).message);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(client: &ExpenseClient, command: Command) -> ClientResult<()> {
    match command {
        Command::List => {
            let list = client.expenses().list(Freshness::consistent()).await?;
            for expense in &list.value().expenses {
                println!(
                    "{}\t{}\t{:.2}\t{}",
                    expense.id,
                    expense.title,
                    expense.amount,
                    expense.file_reference.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Show { id } => {
            let expense = client
                .expenses()
                .get(id, Freshness::consistent())
                .await?
                .into_value()
                .ok_or(ClientError::NotFound(id))?;
            println!("id:      {}", expense.id);
            println!("title:   {}", expense.title);
            println!("amount:  {:.2}", expense.amount);
            println!(
                "receipt: {}",
                expense.file_reference.as_deref().unwrap_or("none")
            );
        }
        Command::Add { title, amount } => {
            let expense = client
                .expenses()
                .create(&ExpenseDraft::new(title, amount))
                .await?;
            println!("Created expense {}", expense.id);
        }
        Command::Delete { id } => {
            client.expenses().delete(id).await?;
            println!("Deleted expense {}", id);
        }
        Command::Attach { id, path } => {
            let file = LocalFile::from_path(&path).await?;
            let receipt = client.uploads().upload(id, Some(file)).await?;
            println!(
                "Attached {} to expense {}",
                receipt.object_key, receipt.expense_id
            );
        }
    }
    Ok(())
}
