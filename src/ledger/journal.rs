//! Ledger journal - transfer audit log
//!
//! Records every committed transfer as one CSV line for complete
//! auditability. The journal is append-only and written after the
//! balances have been updated.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::TransferReceipt;

/// Writes transfer receipts to a CSV file
pub struct JournalWriter {
    file: Mutex<File>,
    entry_count: AtomicU64,
}

impl JournalWriter {
    /// Create a new journal at the given path
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut file = File::create(path)?;
        // Header: barter_id,from,to,amount,from_after,to_after,at
        writeln!(file, "barter_id,from,to,amount,from_after,to_after,at")?;

        Ok(JournalWriter {
            file: Mutex::new(file),
            entry_count: AtomicU64::new(0),
        })
    }

    /// Append a single receipt
    pub fn write_entry(&self, receipt: &TransferReceipt) -> std::io::Result<()> {
        let mut file = self.file.lock().expect("journal lock poisoned");
        writeln!(
            file,
            "{},{},{},{},{},{},{}",
            receipt.barter_id,
            receipt.from,
            receipt.to,
            receipt.amount,
            receipt.from_after,
            receipt.to_after,
            receipt.at
        )?;
        self.entry_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Total number of entries written
    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }
}
