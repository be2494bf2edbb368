use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Strip line framing; the payload itself is passed through untouched.
fn payload(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn forward<R: BufRead>(reader: R, tx: &mpsc::Sender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                debug!(event = %payload(&line), "button event");
                if tx.blocking_send(payload(&line).to_string()).is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(error = %e, "failed to read button events");
                return;
            }
        }
    }
    info!("button event source closed");
}

/// Read button events, one per line, from `source` (stdin when `None`).
///
/// Reads happen on a detached thread so a pending read never holds up
/// process exit.
pub fn spawn_reader(source: Option<PathBuf>, tx: mpsc::Sender<String>) -> io::Result<()> {
    thread::Builder::new()
        .name("button-events".to_string())
        .spawn(move || match source {
            None => forward(io::stdin().lock(), &tx),
            Some(path) => match File::open(&path) {
                Ok(file) => forward(BufReader::new(file), &tx),
                Err(e) => error!(path = %path.display(), error = %e, "cannot open event source"),
            },
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_strips_carriage_return_only() {
        assert_eq!(payload("user_long\r"), "user_long");
        assert_eq!(payload(" user_long"), " user_long");
    }

    #[test]
    fn test_forward_sends_each_line() {
        let (tx, mut rx) = mpsc::channel(4);
        forward(&b"user\nuser_long\r\n"[..], &tx);
        drop(tx);
        assert_eq!(rx.try_recv().ok().as_deref(), Some("user"));
        assert_eq!(rx.try_recv().ok().as_deref(), Some("user_long"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_source_is_forwarded_then_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        std::fs::write(&path, "user_long\n").unwrap();
        let (tx, mut rx) = mpsc::channel(1);

        spawn_reader(Some(path), tx).unwrap();

        assert_eq!(rx.blocking_recv().as_deref(), Some("user_long"));
        assert_eq!(rx.blocking_recv(), None);
    }
}
