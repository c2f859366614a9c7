//! Comma-separated records with `"` quoting, kept positional.
//!
//! Input is expected with `\n` line ends. The `csv` reader drops empty lines;
//! they are restored here as records with no cells so blank rows survive a
//! round trip.

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, WriterBuilder};

use crate::encoding::Newline;

/// Parse failure, with the 1-based line where the record started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        Self {
            line: err.position().map_or(0, |pos| pos.line() as usize),
            message: err.to_string(),
        }
    }
}

fn leading_newlines(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|&&b| b == b'\n').count()
}

fn trailing_newlines(bytes: &[u8]) -> usize {
    bytes.iter().rev().take_while(|&&b| b == b'\n').count()
}

/// Parse every record. A quote opens a quoted field only at the start of a
/// field; an unterminated quoted field runs to the end of input.
pub fn parse_records(text: &str) -> Result<Vec<Vec<String>>, ParseError> {
    let bytes = text.as_bytes();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_reader(bytes);

    let mut records = Vec::new();
    let mut record = StringRecord::new();
    loop {
        let start = reader.position().byte() as usize;
        let more = reader.read_record(&mut record)?;
        let end = reader.position().byte() as usize;
        let consumed = &bytes[start..end.min(bytes.len())];

        if !more {
            // only empty lines are left
            records.extend(std::iter::repeat_with(Vec::new).take(leading_newlines(consumed)));
            break;
        }

        // skipped empty lines sit around the record's own terminator
        let before = leading_newlines(consumed);
        let after = trailing_newlines(consumed).saturating_sub(1);
        records.extend(std::iter::repeat_with(Vec::new).take(before));
        records.push(record.iter().map(str::to_string).collect());
        records.extend(std::iter::repeat_with(Vec::new).take(after));
    }

    Ok(records)
}

/// Serialize records with minimal quoting, each ended by `newline`.
///
/// A record with no cells becomes an empty line; a record of one empty cell
/// is written as `""` so it reads back as a cell.
pub fn write_records(records: &[Vec<String>], newline: Newline) -> Result<String, csv::Error> {
    let terminator = match newline {
        Newline::Lf => Terminator::Any(b'\n'),
        Newline::Crlf => Terminator::CRLF,
    };
    let mut builder = WriterBuilder::new();
    builder
        .flexible(true)
        .quote_style(QuoteStyle::Necessary)
        .terminator(terminator);
    let mut writer = builder.from_writer(Vec::new());

    for record in records {
        if record.is_empty() {
            writer.flush()?;
            let mut bytes = writer
                .into_inner()
                .map_err(|err| csv::Error::from(err.into_error()))?;
            bytes.extend_from_slice(newline.as_str().as_bytes());
            writer = builder.from_writer(bytes);
        } else {
            writer.write_record(record)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
