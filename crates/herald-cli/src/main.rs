use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use herald_core::channels::{
    EmailChannel, EmailMessage, LogTransport, MailTransport, SmsChannel, SmsMessage, SmsTransport,
};
use herald_core::domain::{Channel, ChannelError, EmailPayload, SmsPayload};
use herald_core::{AppBuilder, Config};

#[derive(Debug, Parser)]
#[command(name = "herald", about = "Queue a notification and deliver it in the background")]
struct Cli {
    /// Make the transport fail this many sends before succeeding.
    #[arg(long, global = true, default_value_t = 0)]
    fail_first: u32,

    /// Give up waiting for a terminal status after this many seconds.
    #[arg(long, global = true, default_value_t = 120)]
    wait_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a plain-text email.
    Email {
        /// Recipient address; repeat for several.
        #[arg(long, required = true)]
        to: Vec<String>,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },
    /// Send an SMS.
    Sms {
        #[arg(long)]
        to: String,
        #[arg(long)]
        body: String,
    },
}

/// Logging transport that fails its first `remaining` sends.
struct FlakyTransport {
    inner: LogTransport,
    remaining: AtomicU32,
}

impl FlakyTransport {
    fn new(failures: u32) -> Self {
        Self {
            inner: LogTransport,
            remaining: AtomicU32::new(failures),
        }
    }

    fn take_failure(&self) -> Option<u32> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
    }
}

#[async_trait]
impl MailTransport for FlakyTransport {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), ChannelError> {
        if let Some(left) = self.take_failure() {
            return Err(ChannelError::unreachable(format!(
                "simulated outage ({left} left)"
            )));
        }
        MailTransport::deliver(&self.inner, message).await
    }
}

#[async_trait]
impl SmsTransport for FlakyTransport {
    async fn deliver(&self, message: &SmsMessage) -> Result<(), ChannelError> {
        if let Some(left) = self.take_failure() {
            return Err(ChannelError::unreachable(format!(
                "simulated outage ({left} left)"
            )));
        }
        SmsTransport::deliver(&self.inner, message).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("herald_core=info,herald_cli=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading HERALD_* configuration")?;

    let transport = Arc::new(FlakyTransport::new(cli.fail_first));
    let app = AppBuilder::new(config.clone())
        .register(EmailChannel::new(config.email_from.clone(), transport.clone()))?
        .register(SmsChannel::new(config.sms_from.clone(), transport))?
        .expect_channels(&Channel::ALL)
        .build()?;

    let pool = app.spawn_workers();
    let dispatcher = app.dispatcher();

    let task_id = match cli.command {
        Command::Email { to, subject, body } => {
            dispatcher
                .submit_email(EmailPayload::plain(to, subject, body))
                .await?
        }
        Command::Sms { to, body } => dispatcher.submit_sms(SmsPayload::new(to, body)).await?,
    };
    tracing::info!(task_id = %task_id, "Waiting for delivery");

    let waited = tokio::select! {
        waited = dispatcher.wait_for(
            task_id,
            Duration::from_millis(50),
            Duration::from_secs(cli.wait_secs),
        ) => Some(waited),
        _ = tokio::signal::ctrl_c() => None,
    };

    pool.shutdown_and_join().await;

    match waited {
        Some(waited) => {
            waited?;
        }
        None => tracing::warn!(task_id = %task_id, "Interrupted before delivery finished"),
    }

    let report = dispatcher.report(task_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.delivered() {
        std::process::exit(1);
    }
    Ok(())
}
