//! ErrorResponse and NoticeResponse bodies.
//!
//! Both messages share one layout: a sequence of `(code: u8, text: cstring)`
//! pairs terminated by a zero code. Unknown codes are skipped so that newer
//! servers can add fields without breaking the client.

use std::fmt;

use bytes::Buf;

use crate::codec::{read_cstring, read_cstring_into};
use crate::error::ProtocolError;

/// Severity reported by the server (non-localized).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Severity {
    /// `ERROR`
    Error,
    /// `FATAL`
    Fatal,
    /// `PANIC`
    Panic,
    /// `WARNING`
    Warning,
    /// `NOTICE`
    Notice,
    /// `DEBUG`
    Debug,
    /// `INFO`
    Info,
    /// `LOG`
    Log,
    /// Any other value.
    Unknown,
}

impl Severity {
    /// Parse a severity string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "ERROR" => Self::Error,
            "FATAL" => Self::Fatal,
            "PANIC" => Self::Panic,
            "WARNING" => Self::Warning,
            "NOTICE" => Self::Notice,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "LOG" => Self::Log,
            _ => Self::Unknown,
        }
    }
}

/// Fields of an ErrorResponse or NoticeResponse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorNotice {
    /// `S`: localized severity.
    pub localized_severity: String,
    /// `V`: severity, never localized.
    pub severity: String,
    /// `C`: SQLSTATE code.
    pub code: String,
    /// `M`: primary message.
    pub message: String,
    /// `D`: detail.
    pub detail: Option<String>,
    /// `H`: hint.
    pub hint: Option<String>,
    /// `P`: cursor position into the original query.
    pub position: Option<u32>,
    /// `p`: position into an internally generated query.
    pub internal_position: Option<u32>,
    /// `q`: internally generated query text.
    pub internal_query: Option<String>,
    /// `W`: context (call stack traceback).
    pub where_: Option<String>,
    /// `s`: schema name.
    pub schema: Option<String>,
    /// `t`: table name.
    pub table: Option<String>,
    /// `c`: column name.
    pub column: Option<String>,
    /// `d`: data type name.
    pub data_type: Option<String>,
    /// `n`: constraint name.
    pub constraint: Option<String>,
    /// `F`: source file.
    pub file: Option<String>,
    /// `L`: source line.
    pub line: Option<u32>,
    /// `R`: source routine.
    pub routine: Option<String>,
}

/// SQLSTATE codes for administrator shutdown and crash recovery.
const SHUTDOWN_CODES: [&str; 4] = ["57P01", "57P02", "57P03", "57P04"];

/// SQLSTATE classes that leave the session unusable.
const UNRECOVERABLE_CLASSES: [&str; 5] = ["08", "53", "58", "F0", "XX"];

impl ErrorNotice {
    /// Decode from a message body, overwriting every field.
    ///
    /// The required string fields keep their allocations across calls;
    /// optional fields absent from `src` are reset to `None`.
    pub fn decode(&mut self, src: &mut impl Buf) -> Result<(), ProtocolError> {
        self.clear();
        loop {
            if !src.has_remaining() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let code = src.get_u8();
            if code == 0 {
                return Ok(());
            }
            match code {
                b'S' => read_cstring_into(src, &mut self.localized_severity)?,
                b'V' => read_cstring_into(src, &mut self.severity)?,
                b'C' => read_cstring_into(src, &mut self.code)?,
                b'M' => read_cstring_into(src, &mut self.message)?,
                b'D' => read_optional(src, &mut self.detail)?,
                b'H' => read_optional(src, &mut self.hint)?,
                b'P' => self.position = read_cstring(src)?.parse().ok(),
                b'p' => self.internal_position = read_cstring(src)?.parse().ok(),
                b'q' => read_optional(src, &mut self.internal_query)?,
                b'W' => read_optional(src, &mut self.where_)?,
                b's' => read_optional(src, &mut self.schema)?,
                b't' => read_optional(src, &mut self.table)?,
                b'c' => read_optional(src, &mut self.column)?,
                b'd' => read_optional(src, &mut self.data_type)?,
                b'n' => read_optional(src, &mut self.constraint)?,
                b'F' => read_optional(src, &mut self.file)?,
                b'L' => self.line = read_cstring(src)?.parse().ok(),
                b'R' => read_optional(src, &mut self.routine)?,
                _ => {
                    read_cstring(src)?;
                }
            }
        }
    }

    fn clear(&mut self) {
        self.localized_severity.clear();
        self.severity.clear();
        self.code.clear();
        self.message.clear();
        self.detail = None;
        self.hint = None;
        self.position = None;
        self.internal_position = None;
        self.internal_query = None;
        self.where_ = None;
        self.schema = None;
        self.table = None;
        self.column = None;
        self.data_type = None;
        self.constraint = None;
        self.file = None;
        self.line = None;
        self.routine = None;
    }

    /// Parsed severity, falling back to the localized field on old servers.
    #[must_use]
    pub fn severity(&self) -> Severity {
        if self.severity.is_empty() {
            Severity::parse(&self.localized_severity)
        } else {
            Severity::parse(&self.severity)
        }
    }

    /// Two-character SQLSTATE class.
    #[must_use]
    pub fn class(&self) -> &str {
        self.code.get(..2).unwrap_or("")
    }

    /// Check if the session cannot continue after this error.
    ///
    /// True for FATAL/PANIC severities, administrator shutdown codes, and
    /// the connection, resource, system and internal error classes.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self.severity(), Severity::Fatal | Severity::Panic)
            || SHUTDOWN_CODES.contains(&self.code.as_str())
            || UNRECOVERABLE_CLASSES.contains(&self.class())
    }
}

fn read_optional(src: &mut impl Buf, slot: &mut Option<String>) -> Result<(), ProtocolError> {
    read_cstring_into(src, slot.get_or_insert_with(String::new))
}

impl fmt::Display for ErrorNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.severity.is_empty() {
            &self.localized_severity
        } else {
            &self.severity
        };
        write!(f, "{severity}: {} (SQLSTATE {})", self.message, self.code)
    }
}
