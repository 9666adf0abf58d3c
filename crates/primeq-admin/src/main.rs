use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use primeq_client::{load_settings, publish_json, ConnectionManager, MqSettings, OpenMode};
use primeq_core::{is_probably_prime, parse_value, ResultRecord, WorkRecord, DEFAULT_ROUNDS};
use serde::Deserialize;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pq-admin")]
#[command(about = "Prime offload admin CLI", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Connection name, host(port)
    #[arg(long, env = "PQ_CONNECTION")]
    connection: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish one work record
    Submit {
        /// Record id
        #[arg(long)]
        id: u64,

        /// Decimal value to test
        #[arg(long)]
        value: String,

        /// Target queue
        #[arg(short, long, default_value = "DEV.QUEUE.1")]
        queue: String,
    },

    /// Take result records off a queue
    Drain {
        /// Queue to drain
        #[arg(short, long, default_value = "DEV.QUEUE.2")]
        queue: String,

        /// Maximum number of messages
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Wait per message in milliseconds
        #[arg(long, default_value = "1000")]
        wait_ms: u64,
    },

    /// Publish a batch of random work records
    Seed {
        /// Number of records
        #[arg(short, long, default_value = "10")]
        count: u64,

        /// Id of the first record
        #[arg(long, default_value = "1")]
        first_id: u64,

        /// Maximum digits per value
        #[arg(long, default_value = "20")]
        max_digits: usize,

        /// Target queue
        #[arg(short, long, default_value = "DEV.QUEUE.1")]
        queue: String,
    },

    /// Test a value locally without the broker
    Check {
        value: String,

        /// Miller-Rabin rounds
        #[arg(short, long, default_value_t = DEFAULT_ROUNDS)]
        rounds: u32,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdminConfig {
    mq: MqSettings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config: AdminConfig = load_settings(args.config.as_deref())?;
    if let Some(connection) = args.connection {
        config.mq.connection = connection;
    }

    match args.command {
        Commands::Submit { id, value, queue } => {
            parse_value(&value)?;
            let record = WorkRecord::new(id, value);

            let manager = ConnectionManager::from_settings(&config.mq)?.with_client_name("pq-admin");
            let session = manager.connect().await?;
            let mut handle = session.open(&queue, OpenMode::Output).await?;
            let message_id = publish_json(&handle, &record).await?;
            handle.close().await?;
            session.disconnect().await?;

            match args.format {
                Format::Json => println!(
                    "{}",
                    serde_json::json!({ "message_id": message_id, "queue": queue, "record": record })
                ),
                Format::Table => println!("Record {} submitted to {} as {}", record.id, queue, message_id),
            }
        }

        Commands::Drain { queue, limit, wait_ms } => {
            let manager = ConnectionManager::from_settings(&config.mq)?.with_client_name("pq-admin");
            let session = manager.connect().await?;
            let mut handle = session.open(&queue, OpenMode::Input).await?;

            let mut drained = Vec::new();
            while drained.len() < limit {
                match handle.receive(Duration::from_millis(wait_ms)).await? {
                    Some(envelope) => drained.push(envelope.payload),
                    None => break,
                }
            }
            handle.close().await?;
            session.disconnect().await?;

            match args.format {
                Format::Json => {
                    let values: Vec<serde_json::Value> = drained
                        .iter()
                        .map(|payload| {
                            serde_json::from_slice(payload).unwrap_or_else(|_| {
                                serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&values)?);
                }
                Format::Table => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["ID", "Value", "Prime"]);
                    for payload in &drained {
                        match ResultRecord::from_payload(payload) {
                            Ok(result) => {
                                table.add_row(vec![
                                    result.id.to_string(),
                                    result.value,
                                    result.prime.to_string(),
                                ]);
                            }
                            Err(_) => {
                                table.add_row(vec![
                                    "-".to_string(),
                                    String::from_utf8_lossy(payload).into_owned(),
                                    "-".to_string(),
                                ]);
                            }
                        }
                    }
                    println!("{table}");
                    println!("{} messages drained from {}", drained.len(), queue);
                }
            }
        }

        Commands::Seed { count, first_id, max_digits, queue } => {
            let records = seed_records(first_id, count, max_digits)?;

            let manager = ConnectionManager::from_settings(&config.mq)?.with_client_name("pq-admin");
            let session = manager.connect().await?;
            let mut handle = session.open(&queue, OpenMode::Output).await?;
            for record in &records {
                publish_json(&handle, record).await?;
            }
            handle.close().await?;
            session.disconnect().await?;

            match args.format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                Format::Table => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["ID", "Value"]);
                    for record in &records {
                        table.add_row(vec![record.id.to_string(), record.value.clone()]);
                    }
                    println!("{table}");
                    println!("{} records published to {}", records.len(), queue);
                }
            }
        }

        Commands::Check { value, rounds } => {
            anyhow::ensure!(rounds > 0, "rounds must be at least 1");
            let n = parse_value(&value)?;
            let prime = is_probably_prime(&n, rounds);

            match args.format {
                Format::Json => println!(
                    "{}",
                    serde_json::json!({ "value": value, "rounds": rounds, "prime": prime })
                ),
                Format::Table => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Field", "Value"]);
                    table.add_row(vec!["Value", value.as_str()]);
                    table.add_row(vec!["Digits", &value.len().to_string()]);
                    table.add_row(vec!["Rounds", &rounds.to_string()]);
                    table.add_row(vec!["Probably prime", &prime.to_string()]);
                    println!("{table}");
                }
            }
        }
    }

    Ok(())
}

/// Random records with ids `first_id..first_id + count`
fn seed_records(first_id: u64, count: u64, max_digits: usize) -> anyhow::Result<Vec<WorkRecord>> {
    anyhow::ensure!(max_digits > 0, "max-digits must be at least 1");
    let end = first_id.checked_add(count).ok_or_else(|| {
        anyhow::anyhow!("{} records starting at id {} overflow the id range", count, first_id)
    })?;

    let mut rng = rand::thread_rng();
    Ok((first_id..end)
        .map(|id| WorkRecord::random(id, max_digits, &mut rng))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check() {
        let args = Args::try_parse_from(["pq-admin", "-f", "json", "check", "561", "-r", "20"]).unwrap();
        assert_eq!(args.format, Format::Json);
        match args.command {
            Commands::Check { value, rounds } => {
                assert_eq!(value, "561");
                assert_eq!(rounds, 20);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_drain_defaults() {
        let args = Args::try_parse_from(["pq-admin", "drain"]).unwrap();
        match args.command {
            Commands::Drain { queue, limit, wait_ms } => {
                assert_eq!(queue, "DEV.QUEUE.2");
                assert_eq!(limit, 10);
                assert_eq!(wait_ms, 1000);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_seed_records_ids() {
        let records = seed_records(7, 3, 5).unwrap();
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
        assert!(records.iter().all(|r| r.value.len() <= 5));
    }

    #[test]
    fn test_seed_records_rejects_overflow() {
        let err = seed_records(u64::MAX, 2, 5).unwrap_err();
        assert!(err.to_string().contains("overflow"));
        assert!(seed_records(1, 1, 0).is_err());
    }
}
