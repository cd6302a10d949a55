//! CUPS spooling through `lp`
//!
//! Each job is written to a temporary file and submitted as a raw job.
//! The file is removed when the job returns, whether `lp` succeeded or not.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::command::{CommandRunner, args};
use crate::error::{PrintError, PrintResult};

/// Outcome of a chunked submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub total: usize,
    pub failed: usize,
    /// Spooler messages for the failed chunks, in chunk order
    pub errors: Vec<String>,
}

impl ChunkReport {
    pub fn delivered(&self) -> usize {
        self.total - self.failed
    }

    /// `PartialChunkFailure` when some chunks were lost
    pub fn partial_failure(&self) -> Option<PrintError> {
        (self.failed > 0).then_some(PrintError::PartialChunkFailure {
            failed: self.failed,
            total: self.total,
        })
    }
}

/// Submits raw jobs to CUPS queues
#[derive(Clone)]
pub struct CupsSpooler {
    runner: Arc<dyn CommandRunner>,
    spool_timeout: Duration,
    query_timeout: Duration,
}

impl CupsSpooler {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            spool_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeouts(mut self, spool: Duration, query: Duration) -> Self {
        self.spool_timeout = spool;
        self.query_timeout = query;
        self
    }

    /// Whether `queue` is known to the local CUPS server
    ///
    /// A missing `lpstat` counts as "no such queue".
    #[instrument(skip(self))]
    pub async fn queue_exists(&self, queue: &str) -> bool {
        match self
            .runner
            .run("lpstat", &args(&["-p", queue]), self.query_timeout)
            .await
        {
            Ok(out) => out.success,
            Err(e) => {
                debug!(error = %e, "lpstat unavailable");
                false
            }
        }
    }

    /// Submit one raw job
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    pub async fn submit(&self, queue: &str, data: &[u8]) -> PrintResult<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(data)?;
        file.flush()?;

        let path = file.path().to_string_lossy().into_owned();
        let out = self
            .runner
            .run(
                "lp",
                &args(&["-d", queue, "-o", "raw", &path]),
                self.spool_timeout,
            )
            .await
            .map_err(|e| PrintError::SpoolFailure(e.to_string()))?;

        if out.success {
            info!(job = %out.stdout.trim(), "Job spooled");
            Ok(())
        } else {
            Err(PrintError::SpoolFailure(out.stderr))
        }
    }

    /// Submit `chunks` as separate jobs, pausing `delay` between them
    ///
    /// Every chunk is attempted even after a failure. Fails only when no
    /// chunk was accepted.
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn submit_chunked(
        &self,
        queue: &str,
        chunks: &[Vec<u8>],
        delay: Duration,
    ) -> PrintResult<ChunkReport> {
        let mut report = ChunkReport {
            total: chunks.len(),
            ..Default::default()
        };

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = self.submit(queue, chunk).await {
                warn!(chunk = i + 1, total = chunks.len(), error = %e, "Chunk failed");
                report.failed += 1;
                report.errors.push(e.to_string());
            }
        }

        if report.total > 0 && report.failed == report.total {
            return Err(PrintError::SpoolFailure(format!(
                "all {} chunk(s) failed: {}",
                report.total,
                report.errors.join("; ")
            )));
        }

        info!(
            delivered = report.delivered(),
            total = report.total,
            "Chunked job spooled"
        );
        Ok(report)
    }
}
