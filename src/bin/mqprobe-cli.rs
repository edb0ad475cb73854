//! CLI for mqprobe.
//!
//! Sends test messages (optionally run through the transform pipeline)
//! and consumes destinations in the foreground, against the brokers
//! configured in mqprobe.toml.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use mqprobe::broker::{create_connection, BrokerKind, ConnectionExt};
use mqprobe::config::{load_config, BrokerConfig, Config};
use mqprobe::logging::init_logging;
use mqprobe::plugin::builtin::{builtin_batch_transforms, builtin_transforms, SendMore};
use mqprobe::plugin::{BatchTransform, Pipeline, TransformArgs};
use mqprobe::{Destination, Message};

/// Command-line interface for mqprobe.
#[derive(Debug, Parser)]
#[command(
    name = "mqprobe-cli",
    version,
    about = "mqprobe CLI: send and consume test messages on RabbitMQ-like and Kafka-like brokers"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "mqprobe.toml")]
    pub config: PathBuf,

    /// Broker to talk to
    #[arg(short, long, default_value = "rabbit")]
    pub broker: BrokerKind,

    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one message (or several, with --count)
    Send {
        /// Queue name destination
        #[arg(short, long)]
        queue: Option<String>,
        /// Topic/exchange destination (requires --key)
        #[arg(short, long)]
        topic: Option<String>,
        /// Routing key for --topic
        #[arg(short, long)]
        key: Option<String>,
        /// Transforms to apply, in order (see `transforms`)
        #[arg(short = 'x', long = "transform")]
        transforms: Vec<String>,
        /// Transform arguments as name=value pairs
        #[arg(short, long = "arg")]
        args: Vec<String>,
        /// Send the message this many times
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Message payload (enclose in quotes for spaces)
        message: String,
    },

    /// Consume a destination, printing messages until Ctrl-C
    Consume {
        /// Queue name destination
        #[arg(short, long)]
        queue: Option<String>,
        /// Topic/exchange destination (requires --key)
        #[arg(short, long)]
        topic: Option<String>,
        /// Routing key for --topic
        #[arg(short, long)]
        key: Option<String>,
        /// Perform a single fetch and exit
        #[arg(long)]
        once: bool,
    },

    /// List the built-in transforms
    Transforms,
}

fn broker_config(config: &Config, kind: BrokerKind) -> BrokerConfig {
    match kind {
        BrokerKind::Rabbit => config.rabbit.clone(),
        BrokerKind::Kafka => config.kafka.clone(),
    }
}

fn parse_transform_args(pairs: &[String]) -> anyhow::Result<TransformArgs> {
    let mut args = TransformArgs::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("transform argument \"{pair}\" is not name=value"))?;
        args.insert(name.to_string(), value.to_string());
    }
    Ok(args)
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Ok(load_config(path)?)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_or_default(&cli.config)?;

    match cli.command {
        Command::Send {
            queue,
            topic,
            key,
            transforms,
            args,
            count,
            message,
        } => {
            let destination =
                Destination::resolve(queue.as_deref(), topic.as_deref(), key.as_deref())?;
            let pipeline = Pipeline::resolve(&transforms, &builtin_transforms())?;
            let transform_args = parse_transform_args(&args)?;

            let body = pipeline.apply_all(&message, &transform_args)?;

            // --count fans the message out through the batch transform.
            let mut batch_args = TransformArgs::new();
            batch_args.insert("count".into(), count.to_string());
            let mut bodies = Vec::with_capacity(count as usize);
            SendMore.run(&body, &batch_args, &mut |m| {
                bodies.push(m);
                Ok(())
            })?;

            let conn = create_connection(
                cli.broker,
                Arc::new(broker_config(&config, cli.broker)),
                config.retry,
            )?;
            let mut producer = conn.create_producer();
            for body in &bodies {
                producer.produce(&Message::from(body.clone()), &destination).await?;
            }
            info!("sent {count} message(s) to {destination}");
            conn.disconnect().await?;
        }

        Command::Consume {
            queue,
            topic,
            key,
            once,
        } => {
            let destination =
                Destination::resolve(queue.as_deref(), topic.as_deref(), key.as_deref())?;
            let conn = create_connection(
                cli.broker,
                Arc::new(broker_config(&config, cli.broker)),
                config.retry,
            )?;
            conn.connect().await?;
            let consumer = conn.create_consumer();

            let stop = if once {
                None
            } else {
                let token = CancellationToken::new();
                let signal = token.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        signal.cancel();
                    }
                });
                info!("consuming {destination}; press Ctrl-C to stop");
                Some(token)
            };

            consumer
                .consume(
                    &destination,
                    |body| {
                        println!("{}", String::from_utf8_lossy(&body));
                        Ok(())
                    },
                    stop,
                )
                .await?;
            conn.disconnect().await?;
        }

        Command::Transforms => {
            for transform in builtin_transforms() {
                let params = transform.parameters();
                if params.is_empty() {
                    println!("{}", transform.name());
                } else {
                    println!("{}  (args: {})", transform.name(), params.join(", "));
                }
            }
            for batch in builtin_batch_transforms() {
                println!("{}  (batch, args: {})", batch.name(), batch.parameters().join(", "));
            }
        }
    }

    Ok(())
}
