//! Control-port reply framing
//!
//! Every reply line starts with a three digit status followed by a
//! separator: `-` (more lines follow), `+` (a data block follows, ended by a
//! lone `.`), or space (final line).

use crate::error::ControlError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Status code of asynchronous event lines, which are skipped
pub const ASYNC_EVENT: u16 = 650;

/// Longest reply line accepted, CRLF included
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Coarse classification of a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    SyntaxError,
    Unauthorized,
    OperationFailed,
    Other,
}

impl StatusClass {
    pub fn of(code: u16) -> Self {
        match code {
            200..=299 => Self::Success,
            510..=513 => Self::SyntaxError,
            514 | 515 => Self::Unauthorized,
            451 | 550..=555 => Self::OperationFailed,
            _ => Self::Other,
        }
    }
}

/// One reply line, with its data block when the separator was `+`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    pub status: u16,
    pub text: String,
    pub data: Option<Vec<String>>,
}

/// Complete reply to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status of the final line
    pub status: u16,
    pub lines: Vec<ReplyLine>,
}

impl Reply {
    pub fn class(&self) -> StatusClass {
        StatusClass::of(self.status)
    }

    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }

    /// Text of the final line
    pub fn message(&self) -> &str {
        self.lines.last().map(|l| l.text.as_str()).unwrap_or("")
    }

    /// All line texts joined, for error messages
    pub fn joined_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Value of the first `KEY=value` line
    ///
    /// Data-block lines return their block joined with newlines.
    pub fn value(&self, key: &str) -> Option<String> {
        self.lines.iter().find_map(|line| {
            let rest = line.text.strip_prefix(key)?.strip_prefix('=')?;
            match &line.data {
                Some(data) => Some(data.join("\n")),
                None => Some(rest.to_string()),
            }
        })
    }

    /// Convert a failure status into `CommandRejected`
    pub fn into_result(self) -> Result<Self, ControlError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ControlError::CommandRejected {
                code: self.status,
                message: self.joined_text(),
            })
        }
    }
}

enum Separator {
    Mid,
    Data,
    End,
}

/// Split a raw reply line into status, separator and text
fn parse_line(raw: &str) -> Result<(u16, Separator, String), ControlError> {
    let bytes = raw.as_bytes();
    if bytes.len() < 4 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(ControlError::protocol(format!(
            "malformed reply line: {:?}",
            raw
        )));
    }

    let status: u16 = raw[..3]
        .parse()
        .map_err(|_| ControlError::protocol(format!("bad status code in {:?}", raw)))?;

    let sep = match bytes[3] {
        b'-' => Separator::Mid,
        b'+' => Separator::Data,
        b' ' => Separator::End,
        other => {
            return Err(ControlError::protocol(format!(
                "unknown reply separator {:?} in {:?}",
                other as char, raw
            )))
        },
    };

    Ok((status, sep, raw[4..].to_string()))
}

/// Read one line, stripping CRLF; EOF is a connection error
async fn read_raw_line<R>(reader: &mut R) -> Result<String, ControlError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| ControlError::connection(format!("read failed: {}", e)))?;

    if n == MAX_LINE_LEN && buf.last() != Some(&b'\n') {
        return Err(ControlError::protocol(format!(
            "reply line longer than {} bytes",
            MAX_LINE_LEN
        )));
    }
    if n == 0 || buf.last() != Some(&b'\n') {
        return Err(ControlError::connection("daemon closed the control connection"));
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    String::from_utf8(buf).map_err(|_| ControlError::protocol("reply is not valid UTF-8"))
}

/// Read one complete reply, skipping asynchronous events
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply, ControlError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();

    loop {
        let raw = read_raw_line(reader).await?;
        let (status, sep, text) = parse_line(&raw)?;

        let data = match sep {
            Separator::Data => Some(read_data_block(reader).await?),
            _ => None,
        };

        if status == ASYNC_EVENT {
            continue;
        }

        let is_end = matches!(sep, Separator::End);
        lines.push(ReplyLine { status, text, data });

        if is_end {
            return Ok(Reply { status, lines });
        }
    }
}

async fn read_data_block<R>(reader: &mut R) -> Result<Vec<String>, ControlError>
where
    R: AsyncBufRead + Unpin,
{
    let mut data = Vec::new();
    loop {
        let line = read_raw_line(reader).await?;
        if line == "." {
            return Ok(data);
        }
        let unstuffed = line.strip_prefix('.').filter(|l| l.starts_with('.'));
        data.push(unstuffed.unwrap_or(&line).to_string());
    }
}

/// Dot-stuff a multi-line command body and append the terminator
pub fn encode_data_block(body: &str) -> String {
    let mut out = String::new();
    for line in body.lines() {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}

/// Parse `KEY=value KEY="quoted value"` pairs from a reply line
pub fn parse_key_values(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            // bare word
            match rest.find(' ') {
                Some(sp) => {
                    rest = rest[sp..].trim_start();
                    continue;
                },
                None => break,
            }
        };
        if let Some(sp) = rest.find(' ') {
            if sp < eq {
                rest = rest[sp..].trim_start();
                continue;
            }
        }

        let key = rest[..eq].to_string();
        let after = &rest[eq + 1..];

        if let Some(quoted) = after.strip_prefix('"') {
            let (value, consumed) = unquote(quoted);
            pairs.push((key, value));
            rest = quoted[consumed..].trim_start();
        } else {
            let end = after.find(' ').unwrap_or(after.len());
            pairs.push((key, after[..end].to_string()));
            rest = after[end..].trim_start();
        }
    }

    pairs
}

/// Decode a quoted string body (after the opening quote)
///
/// Returns the value and the number of bytes consumed including the closing
/// quote.
fn unquote(s: &str) -> (String, usize) {
    let mut value = String::new();
    let mut chars = s.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (value, i + 1),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, other)) => value.push(other),
                None => return (value, s.len()),
            },
            other => value.push(other),
        }
    }

    (value, s.len())
}
