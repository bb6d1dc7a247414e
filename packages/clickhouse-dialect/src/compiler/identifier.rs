//! Identifier quoting.

use std::collections::HashSet;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

static RESERVED_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "all",
        "analyse",
        "analyze",
        "and",
        "any",
        "array",
        "as",
        "asc",
        "asymmetric",
        "authorization",
        "between",
        "binary",
        "both",
        "case",
        "cast",
        "check",
        "collate",
        "column",
        "constraint",
        "create",
        "cross",
        "current_date",
        "current_role",
        "current_time",
        "current_timestamp",
        "current_user",
        "default",
        "deferrable",
        "desc",
        "distinct",
        "do",
        "else",
        "end",
        "except",
        "false",
        "for",
        "foreign",
        "freeze",
        "from",
        "full",
        "grant",
        "group",
        "having",
        "ilike",
        "in",
        "index",
        "initially",
        "inner",
        "intersect",
        "into",
        "is",
        "isnull",
        "join",
        "leading",
        "left",
        "like",
        "limit",
        "localtime",
        "localtimestamp",
        "natural",
        "new",
        "not",
        "notnull",
        "null",
        "off",
        "offset",
        "old",
        "on",
        "only",
        "or",
        "order",
        "outer",
        "overlaps",
        "placing",
        "primary",
        "references",
        "right",
        "select",
        "session_user",
        "set",
        "similar",
        "some",
        "symmetric",
        "table",
        "then",
        "to",
        "trailing",
        "true",
        "union",
        "unique",
        "user",
        "using",
        "verbose",
        "when",
        "where",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierQuote {
    Backtick,
    #[default]
    DoubleQuote,
}

impl IdentifierQuote {
    pub fn char(&self) -> char {
        match self {
            IdentifierQuote::Backtick => '`',
            IdentifierQuote::DoubleQuote => '"',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentifierPreparer {
    quote: IdentifierQuote,
}

impl IdentifierPreparer {
    pub fn new(quote: IdentifierQuote) -> Self {
        Self { quote }
    }

    pub fn is_reserved(word: &str) -> bool {
        RESERVED_WORDS.contains(word.to_lowercase().as_str())
    }

    /// Bare identifiers are `[A-Za-z_][A-Za-z0-9_$]*` and not reserved. Case
    /// alone never forces quoting.
    pub fn requires_quotes(&self, name: &str) -> bool {
        let Some(first) = name.chars().next() else {
            return true;
        };
        Self::is_reserved(name)
            || first.is_ascii_digit()
            || first == '$'
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    }

    /// Doubles the quote character and `%`.
    pub fn escape(&self, name: &str) -> String {
        let quote = self.quote.char();
        let mut escaped = String::with_capacity(name.len());
        for c in name.chars() {
            if c == quote {
                escaped.push(quote);
            } else if c == '%' {
                escaped.push('%');
            }
            escaped.push(c);
        }
        escaped
    }

    pub fn quote(&self, name: &str) -> String {
        if self.requires_quotes(name) {
            let quote = self.quote.char();
            format!("{quote}{}{quote}", self.escape(name))
        } else {
            name.to_string()
        }
    }

    pub fn format_table(&self, name: &str, schema: Option<&str>) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(name)),
            None => self.quote(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_identifiers() {
        let preparer = IdentifierPreparer::default();
        assert_eq!(preparer.quote("my_table"), "my_table");
        assert_eq!(preparer.quote("date"), "date");
        assert_eq!(preparer.quote("CamelCase"), "CamelCase");
    }

    #[test]
    fn test_reserved_words_are_quoted() {
        let preparer = IdentifierPreparer::new(IdentifierQuote::Backtick);
        assert_eq!(preparer.quote("index"), "`index`");
        assert_eq!(preparer.quote("order"), "`order`");
        assert_eq!(preparer.quote("SELECT"), "`SELECT`");
    }

    #[test]
    fn test_escaping() {
        let preparer = IdentifierPreparer::new(IdentifierQuote::Backtick);
        assert_eq!(preparer.quote("a`b"), "`a``b`");
        assert_eq!(preparer.quote("100%"), "`100%%`");
        assert_eq!(preparer.quote("1abc"), "`1abc`");
        assert_eq!(preparer.quote(".inner.v"), "`.inner.v`");

        let preparer = IdentifierPreparer::new(IdentifierQuote::DoubleQuote);
        assert_eq!(preparer.quote("with space"), "\"with space\"");
        assert_eq!(preparer.quote("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_format_table() {
        let preparer = IdentifierPreparer::default();
        assert_eq!(preparer.format_table("t", Some("db")), "db.t");
        assert_eq!(preparer.format_table("t", None), "t");
    }
}
