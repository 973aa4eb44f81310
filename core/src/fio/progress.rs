//! In-place console rendering of fio's live status

use std::io::{self, Write};

use tokio::sync::mpsc;

/// Cursor up one line, then clear it
pub const ERASE_PREVIOUS_LINE: &str = "\x1b[1A\x1b[2K";

/// Where live benchmark output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressTarget {
    /// Overwrite the previous console line for every status update
    #[default]
    Console,
    /// Drop live output; it is still captured in the outcome
    Silent,
}

/// Render each received line over the previous one
///
/// Each line is written as erase sequence, line, newline and flushed
/// immediately. Returns the number of lines rendered once the sender side is
/// dropped.
pub async fn render_progress<W: Write>(
    mut lines: mpsc::Receiver<String>,
    mut out: W,
) -> io::Result<usize> {
    let mut rendered = 0;
    while let Some(line) = lines.recv().await {
        writeln!(out, "{}{}", ERASE_PREVIOUS_LINE, line)?;
        out.flush()?;
        rendered += 1;
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_line_replaces_the_previous() {
        let (tx, rx) = mpsc::channel(4);
        let render = tokio::spawn(async move {
            let mut buf = Vec::new();
            let count = render_progress(rx, &mut buf).await.unwrap();
            (count, buf)
        });

        tx.send("Jobs: 1 (f=1): [w(1)][10.0%]".to_string()).await.unwrap();
        tx.send("Jobs: 1 (f=1): [w(1)][20.0%]".to_string()).await.unwrap();
        drop(tx);

        let (count, buf) = render.await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "\x1b[1A\x1b[2KJobs: 1 (f=1): [w(1)][10.0%]\n\
             \x1b[1A\x1b[2KJobs: 1 (f=1): [w(1)][20.0%]\n"
        );
    }

    #[tokio::test]
    async fn test_no_lines_writes_nothing() {
        let (tx, rx) = mpsc::channel::<String>(1);
        drop(tx);

        let mut buf = Vec::new();
        assert_eq!(render_progress(rx, &mut buf).await.unwrap(), 0);
        assert!(buf.is_empty());
    }
}
