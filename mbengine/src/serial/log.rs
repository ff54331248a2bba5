use std::fmt::Write;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

const SEPARATOR: &str = "-------------------------------------------------";
const BYTES_PER_LINE: usize = 16;

/// Appends a hex dump of failed exchanges to a file
#[derive(Clone, Debug, Default)]
pub(crate) struct DiagnosticLog {
    path: Option<PathBuf>,
}

impl DiagnosticLog {
    pub(crate) fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Append one failure record, errors writing the file are traced and swallowed
    pub(crate) async fn record(&self, reason: &str, sent: &[u8], received: &[u8]) {
        let path = match &self.path {
            Some(path) => path,
            None => return,
        };

        let entry = format_entry(reason, chrono::Local::now(), sent, received);

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(err) = result {
            tracing::warn!("unable to write diagnostic log {}: {}", path.display(), err);
        }
    }
}

fn format_entry<Tz>(
    reason: &str,
    time: chrono::DateTime<Tz>,
    sent: &[u8],
    received: &[u8],
) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut entry = String::new();
    // writing into a String cannot fail
    let _ = writeln!(entry, "{SEPARATOR}");
    let _ = writeln!(
        entry,
        "Failure ({}) at {}",
        reason,
        time.format("%a %b %e %H:%M:%S %Y")
    );
    dump(&mut entry, "Send", sent);
    if received.is_empty() {
        entry.push_str("Recv: No response\n");
    } else {
        dump(&mut entry, "Recv", received);
    }
    entry
}

fn dump(entry: &mut String, prefix: &str, bytes: &[u8]) {
    for (line, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(entry, "{}: {:04X}", prefix, line * BYTES_PER_LINE);
        for byte in chunk {
            let _ = write!(entry, " {byte:02X}");
        }
        entry.push('\n');
    }
}
