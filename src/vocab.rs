use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Result, TaggerError};

pub const BOS: &str = "BOS";
pub const EOS: &str = "EOS";

/// Word list where the line number is the id (`query.wl`, `slots.wl`).
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashMap<String, u32>,
    fallback: Option<u32>,
}

impl Vocabulary {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            // First occurrence wins on duplicates.
            index.entry(word.clone()).or_insert(i as u32);
        }
        Self {
            words,
            index,
            fallback: None,
        }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let words = reader
            .lines()
            .map(|line| line.map(|l| l.trim_end().to_string()))
            .collect::<std::io::Result<Vec<String>>>()?;
        Ok(Self::from_words(words))
    }

    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(TaggerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("word list not found at: {}", path),
            )));
        }
        let vocab = Self::from_reader(BufReader::new(File::open(path)?))?;
        log::info!("loaded {} entries from {}", vocab.len(), path);
        Ok(vocab)
    }

    /// Words missing from the list encode as `word` instead of failing.
    pub fn with_fallback(mut self, word: &str) -> Result<Self> {
        let id = self
            .index_of(word)
            .ok_or_else(|| TaggerError::UnknownWord(word.to_string()))?;
        self.fallback = Some(id);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn index_of(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied()
    }

    pub fn word(&self, id: u32) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    /// Lower-cases and splits `sentence` on whitespace, wrapping it in
    /// `BOS`/`EOS` when the list contains them. Returns the words alongside
    /// their ids.
    pub fn encode_sentence(&self, sentence: &str) -> Result<(Vec<String>, Vec<u32>)> {
        let mut words: Vec<String> = sentence
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if self.index_of(BOS).is_some() {
            words.insert(0, BOS.to_string());
        }
        if self.index_of(EOS).is_some() {
            words.push(EOS.to_string());
        }

        let ids = words
            .iter()
            .map(|w| match (self.index_of(w), self.fallback) {
                (Some(id), _) => Ok(id),
                (None, Some(fallback)) => {
                    log::warn!("'{}' not in vocabulary, using fallback", w);
                    Ok(fallback)
                }
                (None, None) => Err(TaggerError::UnknownWord(w.clone())),
            })
            .collect::<Result<Vec<u32>>>()?;
        Ok((words, ids))
    }

    /// Maps ids back to words; unknown ids render as `<id>`.
    pub fn decode(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .map(|&id| {
                self.word(id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("<{}>", id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn query_vocab() -> Vocabulary {
        Vocabulary::from_reader(Cursor::new("BOS\nEOS\nshow\nflights\nto\nboston\n")).unwrap()
    }

    #[test]
    fn line_number_is_id() {
        let v = query_vocab();
        assert_eq!(v.len(), 6);
        assert_eq!(v.index_of("flights"), Some(3));
        assert_eq!(v.word(5), Some("boston"));
        assert_eq!(v.word(6), None);
    }

    #[test]
    fn encode_wraps_with_markers() {
        let (words, ids) = query_vocab().encode_sentence("Show flights to BOSTON").unwrap();
        assert_eq!(words, vec!["BOS", "show", "flights", "to", "boston", "EOS"]);
        assert_eq!(ids, vec![0, 2, 3, 4, 5, 1]);
    }

    #[test]
    fn unknown_word_fails_without_fallback() {
        let err = query_vocab().encode_sentence("show trains").unwrap_err();
        assert!(matches!(err, TaggerError::UnknownWord(w) if w == "trains"));
    }

    #[test]
    fn unknown_word_uses_fallback() {
        let v = query_vocab().with_fallback("to").unwrap();
        let (_, ids) = v.encode_sentence("show trains").unwrap();
        assert_eq!(ids, vec![0, 2, 4, 1]);
        assert!(query_vocab().with_fallback("<unk>").is_err());
    }

    #[test]
    fn no_markers_when_absent() {
        let v = Vocabulary::from_words(["show", "flights"]);
        let (words, ids) = v.encode_sentence("Flights").unwrap();
        assert_eq!(words, vec!["flights"]);
        assert_eq!(ids, vec![1]);

        let slots = Vocabulary::from_words(["O", "B-toloc.city_name"]);
        assert_eq!(slots.decode(&[1, 0, 7]), vec!["B-toloc.city_name", "O", "<7>"]);
    }
}
