//! Newline-delimited JSON feed of raw changes on stdin.
//!
//! Lets an external watcher process drive the daemon:
//! `{"kind":"node_created","path":"/lodestar/S/providers/a","data":"tri://..."}`
//!
//! Note: tokio reads stdin on a blocking thread, so runtime shutdown can wait
//! for the next line or EOF.

use lodestar_registry::ChangeSink;
use lodestar_remoting::RawChange;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Parse one feed line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<serde_json::Result<RawChange>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Forward stdin lines into `sink` until EOF or the bridge closes.
pub async fn stdin_feed(sink: ChangeSink) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin feed reached EOF");
                return;
            }
            Err(e) => {
                warn!("stdin feed read error: {}", e);
                return;
            }
        };

        match parse_line(&line) {
            None => continue,
            Some(Ok(change)) => {
                if sink.send(change).await.is_err() {
                    debug!("watch bridge closed; stopping stdin feed");
                    return;
                }
            }
            Some(Err(e)) => warn!("ignoring malformed feed line: {}", e),
        }
    }
}
