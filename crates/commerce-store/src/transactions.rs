use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::{StoreLayout, TransactionJournalEntry, TransactionMetadata, TransactionStatus};

static TXID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Reads `path`, treating a missing file as `None`.
fn read_if_present(path: &Path, what: &str) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {what}: {}", path.display())),
    }
}

/// Claims the store for `txid`. Fails if any other operation holds it.
pub fn set_active_transaction(layout: &StoreLayout, txid: &str) -> Result<PathBuf> {
    let path = layout.transaction_active_path();
    let dir = layout.transactions_dir();
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let claim = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path);
    let mut marker = match claim {
        Ok(marker) => marker,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(match read_active_transaction(layout).ok().flatten() {
                Some(holder) => anyhow!("store is locked by transaction {holder}"),
                None => anyhow!("store is locked (marker {})", path.display()),
            });
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to create store lock: {}", path.display()));
        }
    };

    writeln!(marker, "{txid}")
        .and_then(|()| marker.flush())
        .with_context(|| format!("failed to record lock holder in {}", path.display()))?;
    Ok(path)
}

pub fn read_active_transaction(layout: &StoreLayout) -> Result<Option<String>> {
    let raw = read_if_present(&layout.transaction_active_path(), "store lock")?;
    Ok(raw
        .map(|raw| raw.trim().to_string())
        .filter(|txid| !txid.is_empty()))
}

pub fn clear_active_transaction(layout: &StoreLayout) -> Result<()> {
    let path = layout.transaction_active_path();
    remove_file_if_exists(&path)
        .with_context(|| format!("failed to release store lock: {}", path.display()))
}

pub fn write_transaction_metadata(
    layout: &StoreLayout,
    metadata: &TransactionMetadata,
) -> Result<PathBuf> {
    let path = layout.transaction_metadata_path(&metadata.txid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(metadata).with_context(|| {
        format!(
            "failed to serialize transaction metadata for '{}'",
            metadata.txid
        )
    })?;
    fs::write(&path, content).with_context(|| {
        format!(
            "failed to write transaction metadata file: {}",
            path.display()
        )
    })?;
    Ok(path)
}

pub fn read_transaction_metadata(
    layout: &StoreLayout,
    txid: &str,
) -> Result<Option<TransactionMetadata>> {
    let path = layout.transaction_metadata_path(txid);
    read_if_present(&path, "transaction metadata")?
        .map(|raw| {
            serde_json::from_str(&raw).with_context(|| {
                format!("invalid transaction metadata: {}", path.display())
            })
        })
        .transpose()
}

pub fn update_transaction_status(
    layout: &StoreLayout,
    txid: &str,
    status: TransactionStatus,
) -> Result<()> {
    let mut metadata = read_transaction_metadata(layout, txid)?
        .ok_or_else(|| anyhow!("transaction metadata not found for '{txid}'"))?;
    metadata.status = status;
    write_transaction_metadata(layout, &metadata)?;
    debug!(txid, status = status.as_str(), "transaction status updated");
    Ok(())
}

pub fn append_transaction_journal_entry(
    layout: &StoreLayout,
    txid: &str,
    entry: &TransactionJournalEntry,
) -> Result<PathBuf> {
    let path = layout.transaction_journal_path(txid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let line = serde_json::to_string(entry)
        .with_context(|| format!("failed to serialize journal entry for '{txid}'"))?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open transaction journal: {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append transaction journal: {}", path.display()))?;
    file.write_all(b"\n").with_context(|| {
        format!(
            "failed to append transaction journal newline: {}",
            path.display()
        )
    })?;
    file.flush()
        .with_context(|| format!("failed to flush transaction journal: {}", path.display()))?;
    Ok(path)
}

pub fn read_transaction_journal(
    layout: &StoreLayout,
    txid: &str,
) -> Result<Vec<TransactionJournalEntry>> {
    let path = layout.transaction_journal_path(txid);
    let Some(raw) = read_if_present(&path, "transaction journal")? else {
        return Ok(Vec::new());
    };

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(line_no, line)| {
            serde_json::from_str(line).with_context(|| {
                format!(
                    "invalid transaction journal line {} in {}",
                    line_no + 1,
                    path.display()
                )
            })
        })
        .collect()
}

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}

fn begin_transaction(
    layout: &StoreLayout,
    operation: &str,
    schema_fingerprint: Option<&str>,
    started_at_unix: u64,
) -> Result<TransactionMetadata> {
    let sequence = TXID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let txid = format!("tx-{started_at_unix}-{}-{sequence}", std::process::id());
    let metadata = TransactionMetadata {
        version: 1,
        txid,
        operation: operation.to_string(),
        status: TransactionStatus::Planning,
        started_at_unix,
        schema_fingerprint: schema_fingerprint.map(ToOwned::to_owned),
    };

    write_transaction_metadata(layout, &metadata)?;
    if let Err(err) = set_active_transaction(layout, &metadata.txid) {
        let _ = remove_file_if_exists(&layout.transaction_metadata_path(&metadata.txid));
        return Err(err);
    }

    Ok(metadata)
}

/// Runs `run` as one journaled operation holding the active-transaction
/// marker. The marker serializes install and upgrade runs across processes.
///
/// When `run` fails, the status becomes `failed` and the marker stays for
/// repair, unless `run` already recorded a terminal status itself (for
/// example `rolled_back` after the schema scope was undone), in which case
/// the marker is released.
pub fn execute_with_transaction<T, F>(
    layout: &StoreLayout,
    operation: &str,
    schema_fingerprint: Option<&str>,
    run: F,
) -> Result<T>
where
    F: FnOnce(&TransactionMetadata) -> Result<T>,
{
    let started_at_unix = current_unix_timestamp()?;
    let tx = begin_transaction(layout, operation, schema_fingerprint, started_at_unix)?;

    let run_result = (|| -> Result<T> {
        update_transaction_status(layout, &tx.txid, TransactionStatus::Applying)?;
        let value = run(&tx)?;
        update_transaction_status(layout, &tx.txid, TransactionStatus::Committed)?;
        clear_active_transaction(layout)?;
        Ok(value)
    })();

    match run_result {
        Ok(value) => Ok(value),
        Err(err) => {
            let current_status = read_transaction_metadata(layout, &tx.txid)
                .ok()
                .flatten()
                .map(|metadata| metadata.status);
            match current_status {
                Some(status) if status.is_terminal() => {
                    let _ = clear_active_transaction(layout);
                }
                Some(TransactionStatus::Failed) => {}
                _ => {
                    warn!(txid = tx.txid.as_str(), "transaction failed; marker retained");
                    let _ = update_transaction_status(layout, &tx.txid, TransactionStatus::Failed);
                }
            }
            Err(err)
        }
    }
}
