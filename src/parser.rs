//! Parses request lines of the ingestion line protocol.
use std::fmt;

use crate::types::job::{Identifier, JobId};
use crate::types::priority::Priority;
use crate::types::protocol::{IngestCommand, IngestResponse};
use crate::types::serialisable::WireSerialisable;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParsingError {
    BadFormat,
    UnknownCommand,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::BadFormat => "bad format",
            Self::UnknownCommand => "unknown command",
        })
    }
}

impl std::error::Error for ParsingError {}

impl From<ParsingError> for IngestResponse {
    fn from(value: ParsingError) -> Self {
        match value {
            ParsingError::BadFormat => IngestResponse::BadFormat,
            ParsingError::UnknownCommand => IngestResponse::UnknownCommand,
        }
    }
}

impl WireSerialisable for ParsingError {
    fn serialise_wire(&self) -> Vec<u8> {
        IngestResponse::from(*self).serialise_wire()
    }
}

/// A minimal zero-copy tokenizer over one request line. Tokens are separated
/// by exactly one space.
struct ParseState<'a> {
    from: &'a [u8],
}

impl ParseState<'_> {
    fn is_done(&self) -> bool {
        self.from.is_empty()
    }

    /// Asserts there's no more input, returning `result` if so and a
    /// `BadFormat` error otherwise.
    fn expect_done_and<R>(&self, result: R) -> Result<R, ParsingError> {
        if self.is_done() {
            Ok(result)
        } else {
            Err(ParsingError::BadFormat)
        }
    }

    /// Consumes a token of non-zero length.
    fn expect_next_token(&mut self) -> Result<&[u8], ParsingError> {
        match self.next_token() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ParsingError::BadFormat),
        }
    }

    /// Consumes a space then a signed decimal integer, rejecting overflow.
    fn expect_next_identifier(&mut self) -> Result<Identifier, ParsingError> {
        self.expect_space()?;

        let token = self.expect_next_token()?;
        let (negative, digits) = match token {
            [b'-', rest @ ..] => (true, rest),
            _ => (false, token),
        };

        if digits.is_empty() {
            return Err(ParsingError::BadFormat);
        }

        // Accumulating towards the sign lets i64::MIN parse.
        let mut r: Identifier = 0;
        for c in digits {
            let d = match c {
                b'0'..=b'9' => (c - b'0') as Identifier,
                _ => return Err(ParsingError::BadFormat),
            };

            r = r.checked_mul(10).ok_or(ParsingError::BadFormat)?;
            r = if negative {
                r.checked_sub(d)
            } else {
                r.checked_add(d)
            }
            .ok_or(ParsingError::BadFormat)?;
        }

        Ok(r)
    }

    /// Consumes a space then a priority name if one comes next, leaving the
    /// input untouched otherwise. Priority names never look like
    /// identifiers, so the two can't be confused.
    fn next_priority(&mut self) -> Option<Priority> {
        let from = self.from;

        if self.expect_space().is_ok() {
            if let Ok(token) = self.expect_next_token() {
                let priority = std::str::from_utf8(token)
                    .ok()
                    .and_then(|s| s.parse().ok());
                if priority.is_some() {
                    return priority;
                }
            }
        }

        self.from = from;
        None
    }

    /// Consumes a space then a job id.
    fn expect_next_job_id(&mut self) -> Result<JobId, ParsingError> {
        self.expect_space()?;

        let token = self.expect_next_token()?;
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ParsingError::BadFormat)
    }

    fn expect_space(&mut self) -> Result<(), ParsingError> {
        let from = self.from;
        match from {
            [b' ', rest @ ..] => {
                self.from = rest;
                Ok(())
            },
            _ => Err(ParsingError::BadFormat),
        }
    }

    /// Consumes up to the next space or the end of input. Returns None at the
    /// end of input, and an empty token on consecutive spaces.
    fn next_token(&mut self) -> Option<&[u8]> {
        if self.is_done() {
            return None;
        }

        let idx = self
            .from
            .iter()
            .position(|c| *c == b' ')
            .unwrap_or(self.from.len());

        let (token, rest) = self.from.split_at(idx);
        self.from = rest;

        Some(token)
    }
}

impl<'a> From<&'a [u8]> for ParseState<'a> {
    fn from(from: &'a [u8]) -> Self {
        ParseState { from }
    }
}

impl TryFrom<&[u8]> for IngestCommand {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        use IngestCommand::*;

        let mut ps: ParseState = value.into();

        let cmd = match ps.expect_next_token()? {
            b"stats" => Stats,
            b"quit" => Quit,

            b"status" => Status {
                job_id: ps.expect_next_job_id()?,
            },

            b"submit" => {
                let priority = ps.next_priority().unwrap_or_default();
                let mut identifiers = Vec::new();
                while !ps.is_done() {
                    identifiers.push(ps.expect_next_identifier()?);
                }

                Submit {
                    priority,
                    identifiers,
                }
            },

            _ => return Err(ParsingError::UnknownCommand),
        };

        ps.expect_done_and(cmd)
    }
}
