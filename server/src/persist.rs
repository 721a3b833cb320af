//! The Persistence Spooler: a single writer task owning a `;`-delimited CSV
//! file, fed by an unbounded FIFO so producers never block on disk I/O.
//! Grounded on `original_source/persistence/persistence.go` (the revision
//! with prefix/participant/pass rotation) and on the teacher's `CleanerTask`
//! task-lifecycle idiom (`log/src/tasks/cleaner.rs`): a struct spawned via
//! an associated function, driven by `tokio::select!`, cancelled on `Drop`.

use broker_std::errors::PersistError;
use chrono::Utc;
use log::{error, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PersistConfig {
    pub enabled: bool,
    pub folder: PathBuf,
    pub prefix: String,
}

#[derive(Debug, Default, Clone)]
struct Naming {
    prefix: String,
    participant: Option<u32>,
    pass: Option<u32>,
}

impl Naming {
    fn filename(&self) -> String {
        let mut parts = vec![self.prefix.clone()];
        if let Some(participant) = self.participant {
            parts.push(participant.to_string());
            parts.push(match self.pass {
                Some(pass) => pass.to_string(),
                None => "pre".to_string(),
            });
        }
        parts.push(Utc::now().format("%Y%m%d-%H%M%S").to_string());
        format!("{}.csv", parts.join("_"))
    }
}

enum Msg {
    Entry(String, Vec<u8>),
    Rotate(Naming),
    Close(oneshot::Sender<()>),
}

/// Handle held by the rest of the broker; cheap to clone.
#[derive(Clone)]
pub struct Spooler {
    tx: Option<mpsc::UnboundedSender<Msg>>,
    naming: Arc<Mutex<Naming>>,
    folder: PathBuf,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    token: CancellationToken,
}

impl Spooler {
    /// If persistence is disabled, `AddEntry` becomes a no-op and the
    /// writer task never starts.
    pub fn start(config: PersistConfig) -> Self {
        let naming = Naming {
            prefix: config.prefix,
            participant: None,
            pass: None,
        };

        if !config.enabled {
            return Self {
                tx: None,
                naming: Arc::new(Mutex::new(naming)),
                folder: config.folder,
                handle: Arc::new(Mutex::new(None)),
                token: CancellationToken::new(),
            };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let folder = config.folder;

        let handle = tokio::spawn(writer_task(folder.clone(), naming.clone(), rx, token.clone()));

        Self {
            tx: Some(tx),
            naming: Arc::new(Mutex::new(naming)),
            folder,
            handle: Arc::new(Mutex::new(Some(handle))),
            token,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Enqueues a record; a no-op when persistence is disabled.
    pub fn add_entry(&self, id: &str, bytes: &[u8]) {
        if let Some(tx) = &self.tx {
            if tx.send(Msg::Entry(id.to_string(), bytes.to_vec())).is_err() {
                warn!("persistence writer task is gone, dropping record for {id}");
            }
        }
    }

    pub async fn set_prefix(&self, prefix: String) {
        self.rotate(|n| n.prefix = prefix).await;
    }

    pub async fn set_participant(&self, participant: u32) {
        self.rotate(|n| n.participant = Some(participant)).await;
    }

    pub async fn set_pass(&self, pass: u32) {
        self.rotate(|n| n.pass = Some(pass)).await;
    }

    async fn rotate(&self, mutate: impl FnOnce(&mut Naming)) {
        let Some(tx) = &self.tx else { return };
        let naming = {
            let mut naming = self.naming.lock().await;
            mutate(&mut naming);
            naming.clone()
        };
        let _ = tx.send(Msg::Rotate(naming));
    }

    /// Drains and flushes the queue before returning.
    pub async fn close(&self) {
        let Some(tx) = &self.tx else { return };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Msg::Close(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        self.token.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn writer_task(
    folder: PathBuf,
    initial: Naming,
    mut rx: mpsc::UnboundedReceiver<Msg>,
    token: CancellationToken,
) {
    let mut writer = open_writer(&folder, &initial);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            msg = rx.recv() => {
                match msg {
                    Some(Msg::Entry(id, bytes)) => {
                        if let Some(w) = writer.as_mut() {
                            if let Err(e) = write_record(w, &id, &bytes) {
                                error!("persistence write failed: {e}");
                            }
                        }
                    }
                    Some(Msg::Rotate(naming)) => {
                        writer = open_writer(&folder, &naming);
                    }
                    Some(Msg::Close(done)) => {
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

fn open_writer(folder: &PathBuf, naming: &Naming) -> Option<csv::Writer<std::fs::File>> {
    let path = folder.join(naming.filename());
    match csv::WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(&path)
    {
        Ok(writer) => Some(writer),
        Err(e) => {
            error!(
                "{}",
                PersistError::OpenFile {
                    path: path.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                }
            );
            None
        }
    }
}

fn write_record(writer: &mut csv::Writer<std::fs::File>, id: &str, bytes: &[u8]) -> csv::Result<()> {
    writer.write_record([id, &String::from_utf8_lossy(bytes)])?;
    writer.flush()?;
    Ok(())
}
