// Safety policy for free-form queries

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use tabula_core::config::{MatchMode, QueryConfig, DEFAULT_BLOCKED_KEYWORDS};
use tabula_core::QueryValidationError;

pub trait QueryValidator: Send + Sync {
    fn validate(&self, query: &str) -> Result<(), QueryValidationError>;
}

/// Block-list policy over keywords.
///
/// In `Substring` mode any occurrence of a blocked keyword in the uppercased
/// text rejects the query, including inside literals and longer words
/// (`updated_at` trips `UPDATE`). `Token` mode only looks at unquoted words.
/// Keywords are checked in list order and the first hit is reported.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    keywords: Vec<String>,
    mode: MatchMode,
}

impl KeywordPolicy {
    pub fn new<I, S>(keywords: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_uppercase())
                .filter(|k| !k.is_empty())
                .collect(),
            mode,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(&config.blocked_keywords, config.match_mode)
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    fn reject(message: String, query: &str) -> QueryValidationError {
        QueryValidationError {
            message,
            query: query.to_string(),
        }
    }

    fn check_substring(&self, query: &str) -> Result<(), QueryValidationError> {
        let upper = query.to_uppercase();
        match self.keywords.iter().find(|k| upper.contains(k.as_str())) {
            Some(keyword) => Err(Self::reject(
                format!("Query contains forbidden keyword: {}", keyword),
                query,
            )),
            None => Ok(()),
        }
    }

    fn check_tokens(&self, query: &str) -> Result<(), QueryValidationError> {
        let dialect = PostgreSqlDialect {};
        let tokens = Tokenizer::new(&dialect, query)
            .tokenize()
            .map_err(|e| Self::reject(format!("Query could not be tokenized: {}", e), query))?;

        let words: Vec<String> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
                _ => None,
            })
            .collect();

        match self.keywords.iter().find(|k| words.iter().any(|w| w == *k)) {
            Some(keyword) => Err(Self::reject(
                format!("Query contains forbidden keyword: {}", keyword),
                query,
            )),
            None => Ok(()),
        }
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_KEYWORDS, MatchMode::Substring)
    }
}

impl QueryValidator for KeywordPolicy {
    fn validate(&self, query: &str) -> Result<(), QueryValidationError> {
        if query.trim().is_empty() {
            return Err(Self::reject("Query is empty".to_string(), query));
        }
        match self.mode {
            MatchMode::Substring => self.check_substring(query),
            MatchMode::Token => self.check_tokens(query),
        }
    }
}
