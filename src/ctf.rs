//! Reader for the CNTK text format (CTF) used by the ATIS slot-tagging files.
//!
//! Each line carries an optional sequence id followed by `|`-separated fields:
//!
//! ```text
//! 19  |S0 178:1 |# BOS      |S1 14:1 |# flight  |S2 128:1 |# O
//! 19  |S0 770:1 |# show                         |S2 128:1 |# O
//! ```
//!
//! Consecutive lines with the same id belong to one sequence. Fields named
//! `#` are comments. Values are either sparse `index:value` pairs or dense
//! floats.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::{Result, TaggerError};

#[derive(Debug, Clone, PartialEq)]
pub enum CtfValues {
    Sparse(Vec<(u32, f32)>),
    Dense(Vec<f32>),
}

impl CtfValues {
    /// The hot index of a one-hot sparse sample.
    pub fn one_hot_index(&self) -> Option<u32> {
        match self {
            CtfValues::Sparse(entries) if entries.len() == 1 => Some(entries[0].0),
            _ => None,
        }
    }
}

/// All samples of one sequence, keyed by field name, in line order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CtfSequence {
    pub id: Option<String>,
    pub fields: HashMap<String, Vec<CtfValues>>,
}

impl CtfSequence {
    pub fn field(&self, name: &str) -> &[CtfValues] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

struct ParsedLine {
    id: Option<String>,
    fields: Vec<(String, CtfValues)>,
}

fn parse_line(line: &str, line_no: usize) -> Result<ParsedLine> {
    let err = |message: String| TaggerError::Ctf {
        line: line_no,
        message,
    };
    let mut parts = line.split('|');
    let id = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let Some(id) = &id {
        if id.contains(char::is_whitespace) {
            return Err(err(format!("sequence id '{}' contains whitespace", id)));
        }
    }

    let mut fields = Vec::new();
    for part in parts {
        let mut tokens = part.split_whitespace();
        let name = match tokens.next() {
            Some(name) => name,
            None => return Err(err("empty field name after '|'".to_string())),
        };
        if name.starts_with('#') {
            continue;
        }
        let values: Vec<&str> = tokens.collect();
        let parsed = if values.iter().any(|v| v.contains(':')) {
            let mut entries = Vec::with_capacity(values.len());
            for v in values {
                let (index, value) = v
                    .split_once(':')
                    .ok_or_else(|| err(format!("field '{}' mixes sparse and dense values", name)))?;
                let index = index
                    .parse::<u32>()
                    .map_err(|e| err(format!("bad index '{}' in field '{}': {}", index, name, e)))?;
                let value = value
                    .parse::<f32>()
                    .map_err(|e| err(format!("bad value '{}' in field '{}': {}", value, name, e)))?;
                entries.push((index, value));
            }
            CtfValues::Sparse(entries)
        } else {
            let dense = values
                .iter()
                .map(|v| {
                    v.parse::<f32>()
                        .map_err(|e| err(format!("bad value '{}' in field '{}': {}", v, name, e)))
                })
                .collect::<Result<Vec<f32>>>()?;
            CtfValues::Dense(dense)
        };
        fields.push((name.to_string(), parsed));
    }
    Ok(ParsedLine { id, fields })
}

/// Iterator over the sequences of a CTF stream.
pub struct CtfReader<R> {
    lines: Lines<R>,
    line_no: usize,
    pending: Option<ParsedLine>,
}

impl<R: BufRead> CtfReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            pending: None,
        }
    }

    fn next_line(&mut self) -> Option<Result<ParsedLine>> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_line(&line, self.line_no));
        }
    }
}

impl CtfReader<BufReader<File>> {
    pub fn open(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(TaggerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("CTF file not found at: {}", path),
            )));
        }
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Iterator for CtfReader<R> {
    type Item = Result<CtfSequence>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = match self.pending.take() {
            Some(line) => line,
            None => match self.next_line()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            },
        };

        let mut sequence = CtfSequence {
            id: first.id.clone(),
            fields: HashMap::new(),
        };
        let absorb = |line: ParsedLine, sequence: &mut CtfSequence| {
            for (name, values) in line.fields {
                sequence.fields.entry(name).or_default().push(values);
            }
        };
        absorb(first, &mut sequence);

        // Lines without an id are sequences of their own.
        if sequence.id.is_none() {
            return Some(Ok(sequence));
        }
        loop {
            match self.next_line() {
                None => break,
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(line)) => {
                    if line.id == sequence.id {
                        absorb(line, &mut sequence);
                    } else {
                        self.pending = Some(line);
                        break;
                    }
                }
            }
        }
        Some(Ok(sequence))
    }
}

/// Which CTF fields hold the query words, the intent and the slot labels.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AtisStreams {
    pub query: String,
    pub intent: String,
    pub slots: String,
}

impl Default for AtisStreams {
    fn default() -> Self {
        Self {
            query: "S0".to_string(),
            intent: "S1".to_string(),
            slots: "S2".to_string(),
        }
    }
}

/// One labelled ATIS query.
#[derive(Debug, Clone, PartialEq)]
pub struct AtisSample {
    pub id: Option<String>,
    pub tokens: Vec<u32>,
    pub labels: Vec<u32>,
    pub intent: Option<u32>,
}

impl AtisSample {
    pub fn from_sequence(sequence: &CtfSequence, streams: &AtisStreams) -> Result<Self> {
        let describe = || sequence.id.clone().unwrap_or_else(|| "<no id>".to_string());
        let one_hot = |field: &str| -> Result<Vec<u32>> {
            sequence
                .field(field)
                .iter()
                .map(|v| {
                    v.one_hot_index().ok_or_else(|| {
                        TaggerError::InvalidConfig(format!(
                            "sequence {}: field '{}' is not one-hot",
                            describe(),
                            field
                        ))
                    })
                })
                .collect()
        };

        let tokens = one_hot(&streams.query)?;
        let labels = one_hot(&streams.slots)?;
        if tokens.len() != labels.len() {
            return Err(TaggerError::mismatch(
                format!("sequence {} slot labels", describe()),
                tokens.len(),
                labels.len(),
            ));
        }
        let intent = sequence
            .field(&streams.intent)
            .first()
            .and_then(CtfValues::one_hot_index);

        Ok(Self {
            id: sequence.id.clone(),
            tokens,
            labels,
            intent,
        })
    }
}

/// Reads every labelled query of an ATIS CTF file.
pub fn load_atis(path: &str, streams: &AtisStreams) -> Result<Vec<AtisSample>> {
    let samples = CtfReader::open(path)?
        .map(|seq| seq.and_then(|s| AtisSample::from_sequence(&s, streams)))
        .collect::<Result<Vec<_>>>()?;
    log::info!("read {} sequences from {}", samples.len(), path);
    Ok(samples)
}
