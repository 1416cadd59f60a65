//! Append-only JSON-lines writer fed through an unbounded channel.
//!
//! Callers hand records to [`JsonLinesWriter::send`] and never wait on disk.
//! A background task owns the file and flushes after every drained batch, so
//! senders living as long as the process do not hold records back. Write
//! errors are logged and the record is lost.

use std::path::PathBuf;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct JsonLinesWriter<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> JsonLinesWriter<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Spawn the writer task for `path`.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>, label: &'static str) -> Option<Self> {
        let path = path.into();
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(label, path = ?path, "No runtime available, file output disabled");
                return None;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        handle.spawn(async move {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await;
            let mut file = match file {
                Ok(f) => f,
                Err(e) => {
                    tracing::error!(label, path = ?path, error = %e, "Failed to open output file");
                    while rx.recv().await.is_some() {}
                    return;
                }
            };

            while let Some(record) = rx.recv().await {
                write_record(&mut file, &record, label).await;
                while let Ok(record) = rx.try_recv() {
                    write_record(&mut file, &record, label).await;
                }
                if let Err(e) = file.flush().await {
                    tracing::error!(label, error = %e, "Flush error");
                }
            }
        });

        Some(Self { tx })
    }

    /// Queue a record. Dropped silently after shutdown.
    pub fn send(&self, record: T) {
        let _ = self.tx.send(record);
    }
}

async fn write_record<T: Serialize>(file: &mut tokio::fs::File, record: &T, label: &'static str) {
    match serde_json::to_string(record) {
        Ok(mut line) => {
            line.push('\n');
            if let Err(e) = file.write_all(line.as_bytes()).await {
                tracing::error!(label, error = %e, "Write error");
            }
        }
        Err(e) => tracing::warn!(label, error = %e, "Serialisation error"),
    }
}
