mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use contact_sync_client::config::{AirtableConfig, checked_table_from_env, numbered_tables_from_env};
use contact_sync_client::{
    AirtableClient, GitHubClient, RetryingTransport, SendGridClient, SheetColumnLedger,
    SheetExmailQueue, SheetRecordStore, SheetsClient,
};
use contact_sync_core::batch::DEFAULT_WINDOW_SIZE;
use contact_sync_core::consent::{NEWSLETTER_GROUP_ID, exmail_flag_field, standardize_emails};
use contact_sync_core::{
    ConsentSyncService, CredentialPool, CredentialRotator, EnrichmentDriver, EnrichmentResolver,
    ExmailProcessor, ExmailTable, RetryPolicy, StandardizeTarget, TracingBatchReporter,
    UnsubscribeImporter, UnsubscribeProfile,
};

#[derive(Parser)]
#[command(
    name = "contact-sync",
    version,
    about = "Contact enrichment and consent sync across GitHub, Google Sheets, Airtable and SendGrid"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SendGridArgs {
    /// SendGrid API key
    #[arg(long, env = "SENDGRID_API_KEY", hide_env_values = true)]
    sendgrid_api_key: String,

    /// Suppression group to sync with
    #[arg(long, default_value_t = NEWSLETTER_GROUP_ID)]
    group_id: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    Newsletter,
    Personalized,
}

impl ProfileArg {
    fn profile(self) -> UnsubscribeProfile {
        match self {
            ProfileArg::Newsletter => UnsubscribeProfile::Newsletter,
            ProfileArg::Personalized => UnsubscribeProfile::Personalized,
        }
    }

    fn default_ledger_sheet(self) -> &'static str {
        match self {
            ProfileArg::Newsletter => "Sheet1",
            ProfileArg::Personalized => "PersonalizedUnsub",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Find contact emails for pending profile rows and write them back
    Enrich {
        /// Comma-separated GitHub API keys
        #[arg(long, env = "MY_GITHUB_API_KEYS", hide_env_values = true)]
        github_keys: String,

        /// OAuth access token for the Sheets API
        #[arg(long, env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
        sheets_token: String,

        /// Spreadsheet holding the source and enrichment worksheets
        #[arg(long, env = "ENRICH_SPREADSHEET_ID")]
        spreadsheet_id: String,

        /// Worksheet with pending profile rows
        #[arg(long, default_value = "Sheet1")]
        source_sheet: String,

        /// Worksheet receiving found emails
        #[arg(long, default_value = "Sheet2")]
        target_sheet: String,

        /// Records processed between two writes
        #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
        window_size: usize,

        /// Write a per-record CSV report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Add recently revoked directory contacts to the suppression group
    SuppressRevoked {
        #[command(flatten)]
        sendgrid: SendGridArgs,
    },

    /// Lift suppressions for contacts that recently gave consent and upsert them
    Resubscribe {
        #[command(flatten)]
        sendgrid: SendGridArgs,
    },

    /// Upsert contacts whose main email changed in the last day
    UpsertRecent {
        /// SendGrid API key
        #[arg(long, env = "SENDGRID_API_KEY", hide_env_values = true)]
        sendgrid_api_key: String,
    },

    /// Mirror a suppression group into the directory and its ledger sheet
    ImportUnsubscribes {
        /// Which unsubscribe flow to mirror
        #[arg(long, value_enum, default_value = "newsletter")]
        profile: ProfileArg,

        /// SendGrid API key
        #[arg(long, env = "SENDGRID_API_KEY", hide_env_values = true)]
        sendgrid_api_key: String,

        /// Override the profile's suppression group
        #[arg(long)]
        group_id: Option<u64>,

        /// OAuth access token for the Sheets API
        #[arg(long, env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
        sheets_token: String,

        /// Spreadsheet holding the ledger worksheet
        #[arg(long, env = "UNSUBSCRIBE_SPREADSHEET_ID")]
        spreadsheet_id: String,

        /// Ledger worksheet (defaults per profile)
        #[arg(long)]
        ledger_sheet: Option<String>,
    },

    /// Strip +aliases from emails in every AIRTABLE_BASE_ID_<n> table
    Standardize {
        /// Airtable API key
        #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
        airtable_api_key: String,
    },

    /// Prefix queued directory emails with '#' and log them in the checked table
    Exmail {
        /// Airtable API key
        #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
        airtable_api_key: String,

        /// OAuth access token for the Sheets API
        #[arg(long, env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
        sheets_token: String,

        /// Spreadsheet holding the exmailing worksheet
        #[arg(long, env = "EXMAILING_SPREADSHEET_ID")]
        spreadsheet_id: String,

        /// Worksheet with queued record ids
        #[arg(long, default_value = "Exmailing")]
        queue_sheet: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("contact_sync=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let transport =
        RetryingTransport::new(RetryPolicy::default()).context("Failed to create HTTP client")?;

    match cli.command {
        Commands::Enrich {
            github_keys,
            sheets_token,
            spreadsheet_id,
            source_sheet,
            target_sheet,
            window_size,
            report,
        } => {
            let sheets = SheetsClient::new(transport.clone(), &sheets_token, &spreadsheet_id);
            let store = SheetRecordStore::new(sheets).with_sheets(&source_sheet, &target_sheet);
            cmd_enrich(
                transport,
                &github_keys,
                &store,
                window_size,
                report.as_deref(),
            )
            .await?;
        }
        Commands::SuppressRevoked { sendgrid } => {
            let service = consent_service(transport, &sendgrid)?;
            let summary = service
                .sync_revoked_consent(Utc::now())
                .await
                .context("Revoked-consent sync failed")?;
            println!(
                "Revoked: {}, newly suppressed: {}",
                summary.revoked,
                summary.added.len()
            );
        }
        Commands::Resubscribe { sendgrid } => {
            let service = consent_service(transport, &sendgrid)?;
            let summary = service
                .sync_given_consent(Utc::now())
                .await
                .context("Given-consent sync failed")?;
            println!(
                "Given: {}, unsuppressed: {}, upserted: {}",
                summary.given,
                summary.removed.len(),
                summary.upserted
            );
        }
        Commands::UpsertRecent { sendgrid_api_key } => {
            let config = AirtableConfig::from_env()?;
            let directory = AirtableClient::new(transport.clone(), &config.api_key).table(config.table);
            let service =
                ConsentSyncService::new(directory, SendGridClient::new(transport, &sendgrid_api_key));
            let summary = service
                .sync_recent_emails(Utc::now())
                .await
                .context("Recent-email sync failed")?;
            println!("Upserted: {}", summary.upserted);
        }
        Commands::ImportUnsubscribes {
            profile,
            sendgrid_api_key,
            group_id,
            sheets_token,
            spreadsheet_id,
            ledger_sheet,
        } => {
            let config = AirtableConfig::from_env()?;
            let directory = AirtableClient::new(transport.clone(), &config.api_key).table(config.table);
            let sheets = SheetsClient::new(transport.clone(), &sheets_token, &spreadsheet_id);
            let ledger_sheet = ledger_sheet.unwrap_or_else(|| profile.default_ledger_sheet().to_string());
            let ledger = SheetColumnLedger::new(sheets, &ledger_sheet);

            let mut importer = UnsubscribeImporter::new(
                directory,
                SendGridClient::new(transport, &sendgrid_api_key),
                ledger,
                profile.profile(),
            );
            if let Some(group_id) = group_id {
                importer = importer.with_group_id(group_id);
            }

            let summary = importer
                .run(Utc::now().date_naive())
                .await
                .context("Unsubscribe import failed")?;
            println!(
                "Missing from ledger: {}, updated: {}, unmatched: {}, failed: {}",
                summary.missing,
                summary.updated.len(),
                summary.unmatched.len(),
                summary.failed.len()
            );
        }
        Commands::Standardize { airtable_api_key } => {
            let client = AirtableClient::new(transport, &airtable_api_key);
            let targets: Vec<_> = numbered_tables_from_env()?
                .into_iter()
                .map(|t| StandardizeTarget {
                    label: t.table.label(),
                    directory: client.table(t.table),
                    email_field: t.email_field,
                })
                .collect();

            let summary = standardize_emails(&targets).await;
            println!(
                "Found: {}, updated: {}, failed tables: {}",
                summary.found,
                summary.updated,
                summary.failed_tables.len()
            );
        }
        Commands::Exmail {
            airtable_api_key,
            sheets_token,
            spreadsheet_id,
            queue_sheet,
        } => {
            let client = AirtableClient::new(transport.clone(), &airtable_api_key);
            let tables: Vec<_> = numbered_tables_from_env()?
                .into_iter()
                .filter(|t| exmail_flag_field(t.index).is_some())
                .map(|t| ExmailTable {
                    index: t.index,
                    label: t.table.label(),
                    directory: client.table(t.table),
                })
                .collect();
            let checked = client.table(checked_table_from_env()?);
            let sheets = SheetsClient::new(transport, &sheets_token, &spreadsheet_id);
            let queue = SheetExmailQueue::new(sheets, &queue_sheet);

            let summary = ExmailProcessor::new(tables, checked, queue)
                .run()
                .await
                .context("Exmailing run failed")?;
            println!(
                "Processed: {}, propagated: {}, not found: {}, no email: {}, failed: {}, unchecked: {}",
                summary.processed,
                summary.propagated,
                summary.not_found.len(),
                summary.missing_email.len(),
                summary.failed.len(),
                summary.unchecked.len()
            );
        }
    }

    Ok(())
}

fn consent_service(
    transport: RetryingTransport,
    sendgrid: &SendGridArgs,
) -> Result<ConsentSyncService<contact_sync_client::AirtableTable, SendGridClient>> {
    let config = AirtableConfig::from_env()?;
    let directory = AirtableClient::new(transport.clone(), &config.api_key).table(config.table);
    let suppressions = SendGridClient::new(transport, &sendgrid.sendgrid_api_key);
    Ok(ConsentSyncService::new(directory, suppressions).with_group_id(sendgrid.group_id))
}

async fn cmd_enrich(
    transport: RetryingTransport,
    github_keys: &str,
    store: &SheetRecordStore,
    window_size: usize,
    report_path: Option<&std::path::Path>,
) -> Result<()> {
    let pool = CredentialPool::from_list(github_keys).context("Invalid MY_GITHUB_API_KEYS")?;
    tracing::info!(keys = pool.len(), "Loaded GitHub API keys");

    let resolver = EnrichmentResolver::new(GitHubClient::new(transport), CredentialRotator::new(pool));
    let mut driver = EnrichmentDriver::new(resolver).with_window_size(window_size);

    let report = driver
        .run(store, store, &TracingBatchReporter)
        .await
        .context("Enrichment run failed")?;

    if let Some(path) = report_path {
        report::write_report(path, &report)?;
        tracing::info!(path = %path.display(), "Wrote run report");
    }

    println!(
        "Run {}: enriched {}, not found {}, skipped {}, failed {}",
        report.run_id,
        report.enriched(),
        report.not_found(),
        report.skipped(),
        report.failed()
    );

    Ok(())
}
