pub mod batch;
pub mod consent;
pub mod credentials;
pub mod email;
pub mod enrich;
pub mod error;
pub mod models;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use batch::{BatchEvent, BatchReporter, EnrichmentDriver, TracingBatchReporter};
pub use consent::{
    ConsentSyncService, ExmailProcessor, ExmailTable, StandardizeTarget, UnsubscribeImporter,
    UnsubscribeProfile,
};
pub use credentials::{CredentialPool, CredentialRotator};
pub use enrich::EnrichmentResolver;
pub use error::AppError;
pub use models::{
    ContactRecord, EnrichmentRow, ExmailRequest, RunReport, SourceRecord, StagedBatch,
};
pub use retry::RetryPolicy;
pub use traits::{
    ContactDirectory, ExmailQueue, ProfileApi, ProfileBio, QuotaProbe, RecordSource, ResultSink,
    SuppressionService, UnsubscribeLedger,
};
