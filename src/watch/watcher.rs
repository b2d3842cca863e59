//! Watcher thread: notify + debounce, signal main when the config file settles.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{BionetError, Result};

/// Collapses a burst of file events into one notification once the file
/// has been quiet for `window`.
#[derive(Debug)]
pub(crate) struct Debouncer {
    window: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: None,
        }
    }

    pub(crate) fn note(&mut self, at: Instant) {
        self.last_event = Some(at);
    }

    /// True once per burst, after the window has elapsed since its last event.
    pub(crate) fn take_ready(&mut self, now: Instant) -> bool {
        match self.last_event {
            Some(at) if now.duration_since(at) >= self.window => {
                self.last_event = None;
                true
            }
            _ => false,
        }
    }
}

/// Watch `file` and send `()` on `tx` after each debounced burst of changes.
///
/// The parent directory is watched rather than the file itself so that
/// editors replacing the file on save are still seen. Returns when the
/// receiver is dropped or the watcher fails.
pub fn run_watcher_thread(file: &Path, debounce_ms: u64, tx: UnboundedSender<()>) -> Result<()> {
    let file_name: OsString = file
        .file_name()
        .ok_or_else(|| BionetError::Config(format!("not a file path: {}", file.display())))?
        .to_os_string();
    let dir: PathBuf = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let window = Duration::from_millis(debounce_ms);

    let (event_tx, event_rx) = mpsc::channel::<()>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(ev) = res {
            if ev.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                let _ = event_tx.send(());
            }
        }
    })
    .map_err(|e| BionetError::Config(e.to_string()))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| BionetError::Config(e.to_string()))?;
    log::info!("Watching {} for strategy changes", file.display());

    let mut debouncer = Debouncer::new(window);
    loop {
        match event_rx.recv_timeout(window) {
            Ok(()) => debouncer.note(Instant::now()),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    return Ok(());
                }
                if debouncer.take_ready(Instant::now()) && tx.send(()).is_err() {
                    return Ok(());
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_fires_once_after_quiet_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        assert!(!debouncer.take_ready(start));

        debouncer.note(start);
        debouncer.note(start + Duration::from_millis(50));
        assert!(!debouncer.take_ready(start + Duration::from_millis(120)));
        assert!(debouncer.take_ready(start + Duration::from_millis(150)));
        assert!(!debouncer.take_ready(start + Duration::from_millis(400)));
    }
}
