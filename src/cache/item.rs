//! Question records and the keys that identify their pools.
//!
//! An [`Item`] is one generated multiple-choice question. Items are grouped
//! into pools by [`Key`] (`category × difficulty`), which is the unit the
//! cache tiers and the prefetcher work on.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Difficulty assigned to every conceptual question (it has no tiers).
pub const CONCEPTUAL_DIFFICULTY: u8 = 3;

/// Valid difficulty range for generated questions.
pub const DIFFICULTY_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("question prompt is empty")]
    EmptyPrompt,

    #[error("question needs at least 2 options, got {0}")]
    TooFewOptions(usize),

    #[error("duplicate option: {0:?}")]
    DuplicateOption(String),

    #[error("difficulty {0} outside 1..=5")]
    InvalidDifficulty(u8),

    #[error("correct answer {0:?} matches no option")]
    UnresolvableAnswer(String),

    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    #[error("malformed key: {0:?}")]
    MalformedKey(String),
}

/// Complexity class a question is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "P")]
    P,
    #[serde(rename = "NP")]
    Np,
    #[serde(rename = "NP-Complete")]
    NpComplete,
    #[serde(rename = "NP-Hard")]
    NpHard,
    /// Synthetic category for general theory questions.
    #[serde(rename = "Conceptual")]
    Conceptual,
}

impl Category {
    /// All categories, in menu order.
    pub const ALL: [Category; 5] = [
        Category::P,
        Category::Np,
        Category::NpComplete,
        Category::NpHard,
        Category::Conceptual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::P => "P",
            Category::Np => "NP",
            Category::NpComplete => "NP-Complete",
            Category::NpHard => "NP-Hard",
            Category::Conceptual => "Conceptual",
        }
    }

    /// Whether questions in this category are tiered by difficulty.
    pub fn has_difficulty_tiers(&self) -> bool {
        !matches!(self, Category::Conceptual)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ItemError::UnknownCategory(s.to_string()))
    }
}

/// Identifies one cacheable question pool.
///
/// Serialized as `"<category>_<difficulty>"`, e.g. `"NP-Complete_3"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key {
    category: Category,
    difficulty: u8,
}

impl Key {
    /// Build a key. Conceptual keys always carry [`CONCEPTUAL_DIFFICULTY`];
    /// other difficulties are clamped into [`DIFFICULTY_RANGE`].
    pub fn new(category: Category, difficulty: u8) -> Self {
        let difficulty = if category.has_difficulty_tiers() {
            difficulty.clamp(*DIFFICULTY_RANGE.start(), *DIFFICULTY_RANGE.end())
        } else {
            CONCEPTUAL_DIFFICULTY
        };
        Self {
            category,
            difficulty,
        }
    }

    /// The single key of the conceptual pool.
    pub fn conceptual() -> Self {
        Self::new(Category::Conceptual, CONCEPTUAL_DIFFICULTY)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.category, self.difficulty)
    }
}

impl FromStr for Key {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, difficulty) = s
            .rsplit_once('_')
            .ok_or_else(|| ItemError::MalformedKey(s.to_string()))?;
        let category = category.parse::<Category>()?;
        let difficulty = difficulty
            .parse::<u8>()
            .map_err(|_| ItemError::MalformedKey(s.to_string()))?;
        if !DIFFICULTY_RANGE.contains(&difficulty) {
            return Err(ItemError::InvalidDifficulty(difficulty));
        }
        Ok(Key::new(category, difficulty))
    }
}

impl TryFrom<String> for Key {
    type Error = ItemError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

/// Resolve a correct-answer designation against an option list.
///
/// Tries, in order: exact option text, a 1-based option number, a 0-based
/// index. Returns `None` when nothing matches; callers treat that as an
/// answer no choice can satisfy.
pub fn resolve_answer(options: &[String], correct_answer: &str) -> Option<usize> {
    if let Some(pos) = options.iter().position(|o| o == correct_answer) {
        return Some(pos);
    }

    let n: i64 = correct_answer.trim().parse().ok()?;
    let len = options.len() as i64;
    if (1..=len).contains(&n) {
        return Some((n - 1) as usize);
    }
    if (0..len).contains(&n) {
        return Some(n as usize);
    }
    None
}

/// One generated question. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ItemRecord", into = "ItemRecord")]
pub struct Item {
    prompt: String,
    options: Vec<String>,
    correct_answer: String,
    explanation: String,
    category: Category,
    difficulty: u8,
}

impl Item {
    /// Validate and build an item.
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        explanation: impl Into<String>,
        category: Category,
        difficulty: u8,
    ) -> Result<Self, ItemError> {
        let prompt = prompt.into();
        let correct_answer = correct_answer.into();

        if prompt.trim().is_empty() {
            return Err(ItemError::EmptyPrompt);
        }
        if options.len() < 2 {
            return Err(ItemError::TooFewOptions(options.len()));
        }
        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(option.as_str()) {
                return Err(ItemError::DuplicateOption(option.clone()));
            }
        }
        if !DIFFICULTY_RANGE.contains(&difficulty) {
            return Err(ItemError::InvalidDifficulty(difficulty));
        }
        if resolve_answer(&options, &correct_answer).is_none() {
            return Err(ItemError::UnresolvableAnswer(correct_answer));
        }

        let difficulty = if category.has_difficulty_tiers() {
            difficulty
        } else {
            CONCEPTUAL_DIFFICULTY
        };

        Ok(Self {
            prompt,
            options,
            correct_answer,
            explanation: explanation.into(),
            category,
            difficulty,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// The pool this item belongs to.
    pub fn key(&self) -> Key {
        Key::new(self.category, self.difficulty)
    }

    /// Index of the correct option, if the designation resolves.
    pub fn resolve_answer(&self) -> Option<usize> {
        resolve_answer(&self.options, &self.correct_answer)
    }

    /// Whether the 0-based `choice` is the correct option.
    pub fn is_correct(&self, choice: usize) -> bool {
        self.resolve_answer() == Some(choice)
    }

    /// Text of the correct option, falling back to the raw designation.
    pub fn correct_text(&self) -> &str {
        self.resolve_answer()
            .and_then(|i| self.options.get(i))
            .map(String::as_str)
            .unwrap_or(&self.correct_answer)
    }
}

/// Correct answers sometimes arrive as bare numbers instead of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum AnswerField {
    Text(String),
    Number(i64),
}

impl AnswerField {
    pub(crate) fn into_string(self) -> String {
        match self {
            AnswerField::Text(s) => s,
            AnswerField::Number(n) => n.to_string(),
        }
    }
}

/// On-disk shape of an [`Item`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    question: String,
    options: Vec<String>,
    correct_answer: AnswerField,
    explanation: String,
    #[serde(alias = "complexity_class")]
    category: Category,
    difficulty: u8,
}

impl TryFrom<ItemRecord> for Item {
    type Error = ItemError;

    fn try_from(record: ItemRecord) -> Result<Self, Self::Error> {
        Item::new(
            record.question,
            record.options,
            record.correct_answer.into_string(),
            record.explanation,
            record.category,
            record.difficulty,
        )
    }
}

impl From<Item> for ItemRecord {
    fn from(item: Item) -> Self {
        Self {
            question: item.prompt,
            options: item.options,
            correct_answer: AnswerField::Text(item.correct_answer),
            explanation: item.explanation,
            category: item.category,
            difficulty: item.difficulty,
        }
    }
}
