//! Fixed-width 80-byte header records and their tokenizer.

use std::borrow::Cow;
use std::io::{Read, Write};

use super::MtzError;
use crate::model::RECORD_LEN;

/// Write `text` as one space-padded record.
pub fn write_record<W: Write>(mut writer: W, text: &str) -> Result<(), MtzError> {
    let bytes = text.as_bytes();
    if bytes.len() > RECORD_LEN {
        return Err(MtzError::RecordOverflow(text.to_owned()));
    }
    let mut record = [b' '; RECORD_LEN];
    record[..bytes.len()].copy_from_slice(bytes);
    writer.write_all(&record)?;
    Ok(())
}

/// Read one record, padding included.
pub fn read_record<R: Read>(mut reader: R) -> Result<String, MtzError> {
    let mut record = [0u8; RECORD_LEN];
    reader
        .read_exact(&mut record)
        .map_err(|_| MtzError::Truncated("header record"))?;
    Ok(String::from_utf8_lossy(&record).into_owned())
}

/// The record's keyword, cut to its first four characters and upper-cased.
/// Readers match on this form, so `COLUMN` and `COLU` are the same record.
pub fn keyword(record: &str) -> String {
    split_leading(record).0.chars().take(4).collect::<String>().to_ascii_uppercase()
}

/// First whitespace-delimited token and the trimmed remainder.
pub fn split_leading(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim()),
        None     => (text.trim_end(), ""),
    }
}

/// Split on whitespace, honouring single- and double-quoted tokens.
///
/// A quoted token ends at its closing quote followed by whitespace or the
/// end of the line, so embedded quotes survive.
pub fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let delimiter = rest.chars().next().filter(|&c| c == '\'' || c == '"');
        if let Some(q) = delimiter {
            let quoted = &rest[1..];
            let end = quoted
                .char_indices()
                .find(|&(i, c)| {
                    c == q && quoted[i + 1..].chars().next().map_or(true, char::is_whitespace)
                })
                .map(|(i, _)| i);
            match end {
                Some(i) => {
                    out.push(quoted[..i].to_owned());
                    rest = quoted[i + 1..].trim_start();
                }
                None => {
                    out.push(quoted.to_owned());
                    rest = "";
                }
            }
        } else {
            let (token, tail) = split_leading(rest);
            out.push(token.to_owned());
            rest = tail;
        }
    }
    out
}

/// Quote `text` when it would not survive [`tokens`] bare.
///
/// Single quotes are preferred; text holding a `'` followed by whitespace
/// is double-quoted instead.  Text that closes both forms early keeps its
/// characters except that those single quotes become backquotes.
pub fn quote(text: &str) -> Cow<'_, str> {
    let bare = !text.is_empty()
        && !text.starts_with(['\'', '"'])
        && !text.contains(char::is_whitespace);
    if bare {
        Cow::Borrowed(text)
    } else if !closes_early(text, '\'') {
        Cow::Owned(format!("'{text}'"))
    } else if !closes_early(text, '"') {
        Cow::Owned(format!("\"{text}\""))
    } else {
        let mut safe = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            let closes = c == '\'' && chars.peek().is_some_and(|n| n.is_whitespace());
            safe.push(if closes { '`' } else { c });
        }
        Cow::Owned(format!("'{safe}'"))
    }
}

/// `true` if `q` followed by whitespace occurs inside `text`.
fn closes_early(text: &str, q: char) -> bool {
    text.char_indices()
        .any(|(i, c)| c == q && text[i + c.len_utf8()..].starts_with(char::is_whitespace))
}
