//! Interactive displacement prompt on the terminal.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::Prompter;

/// Writes the question to stdout and reads one line from stdin.
///
/// If the caller gives up waiting, the pending read is abandoned; a line typed
/// afterwards is consumed by the runtime's blocking reader and discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioPrompter;

impl StdioPrompter {
    /// Creates a terminal prompter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Prompter for StdioPrompter {
    async fn ask(&self, question: &str) -> io::Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }

        Ok(Some(line.trim().to_owned()))
    }
}
