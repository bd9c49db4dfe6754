//! Shell-command header probe
//!
//! Runs a command (by default `curl -sI`) that prints response headers and
//! reads `Last-Modified`, falling back to `Date`, from its output.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{FetchRecord, HandlerContext, SourceHandler};
use crate::models::{Method, SourceDescriptor};
use crate::parser::DateParser;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};
use crate::utils::shell_quote;

/// Command used when a source configures none
pub const DEFAULT_COMMAND: &str = "curl -sI";

/// Runs a header-printing command and parses its output
pub struct HeaderProbeCliHandler {
    source: Arc<SourceDescriptor>,
    parser: DateParser,
    retry: RetryConfig,
    timeout_secs: u64,
    record: FetchRecord,
}

impl HeaderProbeCliHandler {
    pub fn new(source: Arc<SourceDescriptor>, context: &HandlerContext) -> Self {
        Self {
            source,
            parser: context.parser,
            retry: context.settings.retry_config(),
            timeout_secs: context.settings.http.timeout,
            record: FetchRecord::default(),
        }
    }

    /// Full shell command line for this source
    ///
    /// `{url}` in the template is replaced by the quoted URL; without a
    /// placeholder the quoted URL is appended.
    pub fn command_line(&self) -> String {
        let template = self
            .source
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COMMAND);
        let url = shell_quote(&self.source.data_url);

        if template.contains("{url}") {
            template.replace("{url}", &url)
        } else {
            format!("{template} {url}")
        }
    }

    async fn run_once(&self, command_line: &str) -> Result<String, FetchError> {
        let mut command = shell_command(command_line);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), command.output())
            .await
            .map_err(|_| FetchError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            return Err(FetchError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Simple commands replace the shell via `exec`, so dropping the child on
/// timeout kills the command itself rather than only its parent shell.
#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    if is_simple_command(command_line) {
        command.arg("-c").arg(format!("exec {command_line}"));
    } else {
        command.arg("-c").arg(command_line);
    }
    command
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}

/// A single command with no unquoted lists, pipes, subshells or leading
/// variable assignments
#[cfg_attr(not(unix), allow(dead_code))]
fn is_simple_command(command_line: &str) -> bool {
    let first_word = command_line.split_whitespace().next().unwrap_or_default();
    if first_word.is_empty() || first_word == "exec" || first_word.contains('=') {
        return false;
    }

    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in command_line.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (None | Some('"'), '\\') => escaped = true,
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ';' | '&' | '|' | '\n' | '(' | ')' | '`' | '{' | '}') => return false,
            _ => {}
        }
    }
    quote.is_none()
}

/// First value of a header in raw `Name: value` lines, case-insensitive
pub fn header_value<'a>(output: &'a str, name: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
            .filter(|v| !v.is_empty())
    })
}

#[async_trait]
impl SourceHandler for HeaderProbeCliHandler {
    fn method(&self) -> Method {
        Method::Cli
    }

    async fn fetch(&mut self) -> Option<DateTime<Utc>> {
        self.record.reset();

        if self.source.data_url.is_empty() {
            let id = self.source.id.clone();
            self.record.fail(&id, "no data_url configured");
            return None;
        }

        let command_line = self.command_line();
        debug!(source = %self.source.id, command = %command_line, "Running header probe");

        let this: &Self = self;
        let output = with_retry_if(
            &this.retry,
            |_| this.run_once(&command_line),
            FetchError::is_recoverable,
        )
        .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                let id = self.source.id.clone();
                self.record.fail(&id, e);
                return None;
            }
        };

        let found = ["last-modified", "date"].into_iter().find_map(|name| {
            let raw = header_value(&output, name)?;
            self.parser.parse(raw).map(|ts| (ts, raw.to_string()))
        });

        self.record.content = Some(output.clone());
        match found {
            Some((timestamp, raw)) => {
                self.record.raw_value = Some(raw);
                Some(timestamp)
            }
            None => {
                warn!(source = %self.source.id, "No Last-Modified or Date in command output");
                None
            }
        }
    }

    fn raw_value(&self) -> Option<&str> {
        self.record.raw_value.as_deref()
    }

    fn content(&self) -> Option<&str> {
        self.record.content.as_deref()
    }

    fn last_error(&self) -> Option<&str> {
        self.record.last_error.as_deref()
    }
}
