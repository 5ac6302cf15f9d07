// loanlens - multi-provider loan document extraction with privacy masking
pub mod config;
pub mod extraction;
pub mod masking;
pub mod pipeline;
pub mod types;

pub use config::PipelineConfig;
pub use masking::{DataMasker, MaskOutcome, MaskingManifest};
pub use pipeline::{ExtractionRecord, LoanDocumentPipeline, ProcessedDocument, Summarizer};
pub use types::{LoanlensError, MaskLevel, ProviderId, Result};

/// Log to stderr, filtered by `RUST_LOG` (defaults to `warn`).
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
