//! Opt-in secret logging for inspecting captured traffic.
//!
//! The shape follows the NSS key log format: one line per secret,
//! `LABEL <session> <secret>` with both values hex encoded. The session is
//! the dialing side's public key exchange value, so the lines written by the
//! two ends of one handshake are identical.
//!
//! Never enable this outside a debugging session; anyone holding the log can
//! decrypt the connection.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Labels written by [`SecureKey`](crate::SecureKey).
pub mod label {
    /// Record key for traffic from the dialer to the acceptor
    pub const OUTBOUND_TRAFFIC: &str = "PEERLINK_OUTBOUND_TRAFFIC_SECRET";
    /// Record key for traffic from the acceptor to the dialer
    pub const INBOUND_TRAFFIC: &str = "PEERLINK_INBOUND_TRAFFIC_SECRET";
    /// The challenge both identities sign
    pub const CHALLENGE: &str = "PEERLINK_SIGNATURE_CHALLENGE";
}

/// Sink for handshake secrets.
pub trait KeyLog: Send + Sync + fmt::Debug {
    /// Record `secret` under `label` for the handshake identified by `session`.
    fn log(&self, label: &str, session: &[u8], secret: &[u8]);
}

/// Appends key log lines to a file.
pub struct KeyLogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl KeyLogFile {
    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Where lines are written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyLog for KeyLogFile {
    fn log(&self, label: &str, session: &[u8], secret: &[u8]) {
        let line = format!("{label} {} {}\n", hex::encode(session), hex::encode(secret));
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        // A failed write only loses debugging output.
        let _ = file.write_all(line.as_bytes());
    }
}

impl fmt::Debug for KeyLogFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLogFile").field("path", &self.path).finish()
    }
}

/// Keeps logged secrets in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyLog {
    lines: Mutex<Vec<(String, Vec<u8>, Vec<u8>)>>,
}

impl MemoryKeyLog {
    /// Everything logged so far as `(label, session, secret)`.
    #[must_use]
    pub fn lines(&self) -> Vec<(String, Vec<u8>, Vec<u8>)> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }
}

impl KeyLog for MemoryKeyLog {
    fn log(&self, label: &str, session: &[u8], secret: &[u8]) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((label.to_owned(), session.to_vec(), secret.to_vec()));
        }
    }
}
