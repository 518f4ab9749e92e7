use crate::domain::model::InteractionRecord;
use std::collections::BTreeMap;
use std::io::Read;
use thiserror::Error;

/// Minimum column count for a MITAB 2.5 row.
const MIN_COLUMNS: usize = 15;

const COL_ID_A: usize = 0;
const COL_ID_B: usize = 1;
const COL_ALT_ID_A: usize = 2;
const COL_ALT_ID_B: usize = 3;
const COL_ALIASES_A: usize = 4;
const COL_ALIASES_B: usize = 5;
const COL_DETECTION_METHOD: usize = 6;
const COL_FIRST_AUTHOR: usize = 7;
const COL_PUBLICATION: usize = 8;
const COL_TAXON_A: usize = 9;
const COL_TAXON_B: usize = 10;
const COL_INTERACTION_TYPE: usize = 11;
const COL_SOURCE_DB: usize = 12;
const COL_INTERACTION_ID: usize = 13;
const COL_CONFIDENCE: usize = 14;

#[derive(Error, Debug)]
pub enum MitabError {
    #[error("record has {found} columns, expected at least {MIN_COLUMNS}")]
    TooFewColumns { found: usize },

    #[error("record is missing an interactor identifier in column {column}")]
    MissingInteractor { column: usize },

    #[error("response is not MITAB data: {reason}")]
    NotMitab { reason: String },

    #[error("unreadable record stream: {0}")]
    Stream(#[from] csv::Error),
}

impl MitabError {
    /// Terminal errors end the record sequence; non-terminal ones mean
    /// "skip this record and continue".
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotMitab { .. } | Self::Stream(_))
    }
}

/// Lazy, forward-only, single-pass reader over a MITAB byte stream.
///
/// Each item is one record or one error. A malformed record yields an error
/// item and parsing continues with the next line; a structurally broken
/// stream yields one terminal error and then the sequence ends.
pub struct MitabReader<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    source_tag: String,
    done: bool,
}

impl<R: Read> MitabReader<R> {
    pub fn new(reader: R, source_tag: impl Into<String>) -> Self {
        // MITAB has no quoting convention; embedded double quotes are data.
        let inner = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .comment(Some(b'#'))
            .from_reader(reader);
        Self {
            records: inner.into_records(),
            source_tag: source_tag.into(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for MitabReader<R> {
    type Item = Result<InteractionRecord, MitabError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.records.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(MitabError::Stream(e)));
                }
                Some(Ok(row)) => {
                    let fields: Vec<&str> = row.iter().collect();
                    // Blank lines come through as a single empty field.
                    if fields.iter().all(|f| f.trim().is_empty()) {
                        continue;
                    }
                    let result = record_from_fields(&fields, &self.source_tag);
                    if let Err(e) = &result {
                        if e.is_terminal() {
                            self.done = true;
                        }
                    }
                    return Some(result);
                }
            }
        }
    }
}

/// Parses one MITAB line. Used by the streaming fetch path, which splits
/// lines itself so it can check cancellation between records.
pub fn parse_line(line: &str, source_tag: &str) -> Result<InteractionRecord, MitabError> {
    let fields: Vec<&str> = line.split('\t').collect();
    record_from_fields(&fields, source_tag)
}

fn record_from_fields(
    fields: &[&str],
    source_tag: &str,
) -> Result<InteractionRecord, MitabError> {
    if let Some(first) = fields.first() {
        // HTML/XML error pages are a structural failure, not a bad record.
        if first.trim_start().starts_with('<') {
            return Err(MitabError::NotMitab {
                reason: "markup payload where tab-separated records were expected".to_string(),
            });
        }
    }

    if fields.len() < MIN_COLUMNS {
        return Err(MitabError::TooFewColumns {
            found: fields.len(),
        });
    }

    let interactor_a = primary_identifier(fields[COL_ID_A])
        .ok_or(MitabError::MissingInteractor { column: COL_ID_A })?;
    let interactor_b = primary_identifier(fields[COL_ID_B])
        .ok_or(MitabError::MissingInteractor { column: COL_ID_B })?;

    let mut attributes = BTreeMap::new();
    let mut put = |key: &str, column: usize| {
        let value = fields[column].trim();
        if !value.is_empty() && value != "-" {
            attributes.insert(key.to_string(), value.to_string());
        }
    };
    put("alt ids A", COL_ALT_ID_A);
    put("alt ids B", COL_ALT_ID_B);
    put("aliases A", COL_ALIASES_A);
    put("aliases B", COL_ALIASES_B);
    put("detection method", COL_DETECTION_METHOD);
    put("first author", COL_FIRST_AUTHOR);
    put("publication", COL_PUBLICATION);
    put("taxon A", COL_TAXON_A);
    put("taxon B", COL_TAXON_B);
    put("source database", COL_SOURCE_DB);
    put("interaction ids", COL_INTERACTION_ID);
    put("confidence", COL_CONFIDENCE);

    Ok(InteractionRecord {
        interactor_a,
        interactor_b,
        interaction_type: human_readable(fields[COL_INTERACTION_TYPE]),
        source_service: source_tag.to_string(),
        attributes,
    })
}

/// First entry of a pipe-separated identifier column, kept as `db:id`.
fn primary_identifier(field: &str) -> Option<String> {
    let first = field.split('|').next()?.trim();
    if first.is_empty() || first == "-" {
        return None;
    }
    Some(first.to_string())
}

/// Controlled-vocabulary columns look like `psi-mi:"MI:0407"(direct interaction)`;
/// the parenthesized label is the readable part.
fn human_readable(field: &str) -> String {
    let first = field.split('|').next().unwrap_or(field).trim();
    if let (Some(open), Some(close)) = (first.find('('), first.rfind(')')) {
        if open < close {
            return first[open + 1..close].to_string();
        }
    }
    first.to_string()
}
