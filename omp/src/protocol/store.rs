use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::trade::Trade;
use crate::config::MAX_TRADE_RECORD_SIZE;
use crate::error::{OmpError, OmpResult};
use crate::util::{cbor_from_limited_reader, cbor_to_vec};

const TRADE_FILE_EXTENSION: &str = "cbor";

/// Trades by id, optionally mirrored to one CBOR file per trade so a party
/// can pick up where it left off after a restart.
#[derive(Clone)]
pub struct TradeStore {
    trades: Arc<RwLock<HashMap<String, Trade>>>,
    dir: Option<PathBuf>,
}

impl TradeStore {
    /// Store that lives in memory only.
    pub fn new() -> Self {
        Self {
            trades: Arc::new(RwLock::new(HashMap::new())),
            dir: None,
        }
    }

    /// Store backed by `dir`, loading every trade already saved there.
    pub async fn open(dir: impl Into<PathBuf>) -> OmpResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;

        let mut trades = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TRADE_FILE_EXTENSION) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(|e| io_err(&path, e))?;
            match cbor_from_limited_reader::<Trade>(&bytes, MAX_TRADE_RECORD_SIZE) {
                Ok(trade) => {
                    trades.insert(trade.id.clone(), trade);
                }
                Err(e) => warn!("Skipping unreadable trade file {}: {}", path.display(), e),
            }
        }
        debug!("Loaded {} trades from {}", trades.len(), dir.display());
        Ok(Self {
            trades: Arc::new(RwLock::new(trades)),
            dir: Some(dir),
        })
    }

    /// Insert or replace `trade`, writing it through to disk if backed.
    pub async fn save(&self, trade: &Trade) -> OmpResult<()> {
        if let Some(dir) = &self.dir {
            let bytes = cbor_to_vec(trade)?;
            if bytes.len() > MAX_TRADE_RECORD_SIZE {
                return Err(OmpError::Serialization(format!(
                    "trade {} is {} bytes (max {})",
                    trade.id,
                    bytes.len(),
                    MAX_TRADE_RECORD_SIZE
                )));
            }
            let path = dir.join(file_name(&trade.id));
            let tmp = path.with_extension("tmp");
            tokio::fs::write(&tmp, &bytes)
                .await
                .map_err(|e| io_err(&tmp, e))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|e| io_err(&path, e))?;
        }
        self.trades
            .write()
            .await
            .insert(trade.id.clone(), trade.clone());
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Trade> {
        self.trades.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> OmpResult<Option<Trade>> {
        if let Some(dir) = &self.dir {
            let path = dir.join(file_name(id));
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path, e)),
            }
        }
        Ok(self.trades.write().await.remove(id))
    }

    /// Ids of all stored trades, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.trades.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for TradeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// File name for a trade id; anything outside `[A-Za-z0-9_-]` is hex-escaped.
fn file_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len());
    for c in id.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            name.push(c);
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                name.push_str(&format!("%{b:02x}"));
            }
        }
    }
    format!("{name}.{TRADE_FILE_EXTENSION}")
}

fn io_err(path: &Path, e: std::io::Error) -> OmpError {
    OmpError::Other(anyhow::anyhow!("{}: {}", path.display(), e))
}
