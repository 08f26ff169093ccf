// 📚 Character Library - Curated naming characters as data
// Loaded once from CSV (built-in table embedded at compile time, or a
// replacement file), then filtered in memory.

use crate::bazi::Element;
use crate::naming::Gender;
use crate::page::{self, Page};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

const BUILTIN_CSV: &str = include_str!("../data/characters.csv");

pub const DEFAULT_PAGE_SIZE: usize = 15;

// ============================================================================
// ENTRY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderTendency {
    Male,
    Female,
    Neutral,
}

impl GenderTendency {
    /// Neutral characters suit either gender
    pub fn suits(&self, gender: Gender) -> bool {
        matches!(
            (self, gender),
            (GenderTendency::Neutral, _)
                | (GenderTendency::Male, Gender::Male)
                | (GenderTendency::Female, Gender::Female)
        )
    }

    /// Search filter: male/female include neutral characters, neutral matches only neutral
    pub fn matches_filter(&self, filter: GenderTendency) -> bool {
        *self == filter || (*self == GenderTendency::Neutral && filter != GenderTendency::Neutral)
    }
}

/// Raw CSV row; styles are `|`-separated
#[derive(Debug, Deserialize)]
struct CharacterRecord {
    char: String,
    pinyin: String,
    strokes: u32,
    wuxing: Element,
    radical: String,
    meaning: String,
    gender: GenderTendency,
    styles: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterEntry {
    pub char: String,
    pub pinyin: String,
    pub strokes: u32,
    pub wuxing: Element,
    pub radical: String,
    pub meaning: String,
    pub gender: GenderTendency,
    pub styles: Vec<String>,
}

impl From<CharacterRecord> for CharacterEntry {
    fn from(record: CharacterRecord) -> Self {
        CharacterEntry {
            char: record.char,
            pinyin: record.pinyin,
            strokes: record.strokes,
            wuxing: record.wuxing,
            radical: record.radical,
            meaning: record.meaning,
            gender: record.gender,
            styles: record
                .styles
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

impl CharacterEntry {
    pub fn has_style(&self, style: &str) -> bool {
        self.styles.iter().any(|s| s == style)
    }
}

// ============================================================================
// QUERY
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryQuery {
    /// Case-insensitive substring of the pinyin
    pub pinyin: Option<String>,
    pub radical: Option<String>,
    /// 金木水火土 or metal/wood/water/fire/earth
    pub wuxing: Option<String>,
    /// male, female or neutral
    pub gender: Option<GenderTendency>,
    pub style: Option<String>,
    pub min_strokes: Option<u32>,
    pub max_strokes: Option<u32>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl LibraryQuery {
    fn matches(&self, entry: &CharacterEntry) -> bool {
        if let Some(pinyin) = &self.pinyin {
            if !entry.pinyin.to_lowercase().contains(&pinyin.to_lowercase()) {
                return false;
            }
        }
        if let Some(radical) = &self.radical {
            if &entry.radical != radical {
                return false;
            }
        }
        if let Some(wuxing) = &self.wuxing {
            // Unknown labels match nothing rather than everything
            if Element::from_label(wuxing) != Some(entry.wuxing) {
                return false;
            }
        }
        if let Some(gender) = self.gender {
            if !entry.gender.matches_filter(gender) {
                return false;
            }
        }
        if let Some(style) = &self.style {
            if !entry.has_style(style) {
                return false;
            }
        }
        if let Some(min) = self.min_strokes {
            if entry.strokes < min {
                return false;
            }
        }
        if let Some(max) = self.max_strokes {
            if entry.strokes > max {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// LIBRARY
// ============================================================================

pub struct CharacterLibrary {
    entries: Vec<CharacterEntry>,
}

impl CharacterLibrary {
    /// The embedded table, parsed on first use
    pub fn builtin() -> Result<&'static CharacterLibrary> {
        static BUILTIN: OnceLock<std::result::Result<CharacterLibrary, String>> = OnceLock::new();

        BUILTIN
            .get_or_init(|| CharacterLibrary::from_reader(BUILTIN_CSV.as_bytes()).map_err(|e| format!("{:#}", e)))
            .as_ref()
            .map_err(|e| anyhow!("built-in character library is corrupt: {}", e))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Failed to open character library: {:?}", path.as_ref()))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut entries = Vec::new();

        for result in rdr.deserialize() {
            let record: CharacterRecord = result.context("Failed to deserialize character entry")?;
            entries.push(record.into());
        }

        Ok(CharacterLibrary { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CharacterEntry] {
        &self.entries
    }

    pub fn lookup(&self, ch: &str) -> Option<&CharacterEntry> {
        self.entries.iter().find(|e| e.char == ch)
    }

    /// All matches, in table order
    pub fn filter(&self, query: &LibraryQuery) -> Vec<&CharacterEntry> {
        self.entries.iter().filter(|e| query.matches(e)).collect()
    }

    pub fn search(&self, query: &LibraryQuery) -> Page<CharacterEntry> {
        let (page_no, size) = page::normalize(query.page, query.page_size, DEFAULT_PAGE_SIZE);
        let matched = self.filter(query);
        let total = matched.len();

        let records = matched
            .into_iter()
            .skip(page::offset(page_no, size))
            .take(size)
            .cloned()
            .collect();

        Page::new(records, total, page_no, size)
    }

    /// Characters carrying any of `elements`, style-tagged entries first
    pub fn suggest(
        &self,
        elements: &[Element],
        gender: Gender,
        style_tag: &str,
        limit: usize,
    ) -> Vec<&CharacterEntry> {
        let mut picked: Vec<&CharacterEntry> = self
            .entries
            .iter()
            .filter(|e| elements.contains(&e.wuxing) && e.gender.suits(gender))
            .collect();

        // Stable: table order is kept inside each group
        picked.sort_by_key(|e| !e.has_style(style_tag));
        picked.truncate(limit);
        picked
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> &'static CharacterLibrary {
        CharacterLibrary::builtin().unwrap()
    }

    #[test]
    fn test_builtin_loads() {
        let lib = library();
        assert!(lib.len() >= 60);

        let rui = lib.lookup("瑞").unwrap();
        assert_eq!(rui.wuxing, Element::Metal);
        assert_eq!(rui.strokes, 13);
        assert_eq!(rui.styles, vec!["classical", "modern"]);
    }

    #[test]
    fn test_filter_by_wuxing_and_gender() {
        let query = LibraryQuery {
            wuxing: Some("木".to_string()),
            gender: Some(GenderTendency::Female),
            ..Default::default()
        };

        let found = library().filter(&query);
        assert!(!found.is_empty());
        for entry in found {
            assert_eq!(entry.wuxing, Element::Wood);
            assert_ne!(entry.gender, GenderTendency::Male);
        }
    }

    #[test]
    fn test_filter_neutral_only() {
        let query: LibraryQuery = serde_json::from_str(r#"{"gender":"neutral"}"#).unwrap();
        let found = library().filter(&query);
        assert!(!found.is_empty());
        assert!(found.iter().all(|e| e.gender == GenderTendency::Neutral));

        let male = library().filter(&LibraryQuery {
            gender: Some(GenderTendency::Male),
            ..Default::default()
        });
        assert!(male.len() > found.len());
        assert!(male.iter().any(|e| e.gender == GenderTendency::Neutral));
        assert!(male.iter().all(|e| e.gender != GenderTendency::Female));
    }

    #[test]
    fn test_english_wuxing_label() {
        let by_symbol = library().filter(&LibraryQuery {
            wuxing: Some("水".into()),
            ..Default::default()
        });
        let by_name = library().filter(&LibraryQuery {
            wuxing: Some("water".into()),
            ..Default::default()
        });
        assert_eq!(by_symbol, by_name);

        let unknown = library().filter(&LibraryQuery {
            wuxing: Some("风".into()),
            ..Default::default()
        });
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_pinyin_and_strokes() {
        let query = LibraryQuery {
            pinyin: Some("RUì".to_string()),
            max_strokes: Some(12),
            ..Default::default()
        };
        let found: Vec<&str> = library()
            .filter(&query)
            .into_iter()
            .map(|e| e.char.as_str())
            .collect();
        assert_eq!(found, vec!["锐"]);
    }

    #[test]
    fn test_search_pagination() {
        let query = LibraryQuery {
            page: Some(2),
            page_size: Some(10),
            ..Default::default()
        };
        let page = library().search(&query);

        assert_eq!(page.page, 2);
        assert_eq!(page.records.len(), 10);
        assert_eq!(page.total, library().len());
        assert!(page.has_more);
        assert_eq!(page.records[0], library().entries()[10]);
    }

    #[test]
    fn test_suggest_prefers_style() {
        let picks = library().suggest(&[Element::Metal], Gender::Female, "poetic", 3);
        assert_eq!(picks.len(), 3);
        assert!(picks[0].has_style("poetic"));
        for entry in &picks {
            assert_eq!(entry.wuxing, Element::Metal);
            assert!(entry.gender.suits(Gender::Female));
        }
    }

    #[test]
    fn test_from_reader_rejects_bad_rows() {
        let csv = "char,pinyin,strokes,wuxing,radical,meaning,gender,styles\n甲,jiǎ,many,木,田,,neutral,\n";
        assert!(CharacterLibrary::from_reader(csv.as_bytes()).is_err());
    }
}
