//! 递归下降的 glob 解析器，输出正则表达式
//!
//! ```text
//! pattern  := heading? element* trailing?
//! heading  := "/"
//! trailing := "/"              (最后一个 token，仅匹配目录)
//! element  := text | escaped | "/" | "**" | "*" | "?" | class
//! ```

use super::lexer::{Lexer, Token};
use crate::error::{Result, SyncError};

/// 非锚定模式的前缀，可匹配任意路径后缀
const SUFFIX_PREFIX: &str = "^(?:.*/)?";
const ROOT_PREFIX: &str = "^/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    pub regex: String,
    /// 从根开始匹配，而不是任意路径后缀
    pub anchored: bool,
    pub folder_only: bool,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at_last(&self) -> bool {
        self.pos + 1 == self.tokens.len()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn parse(mut self) -> CompiledPattern {
        let anchored = self.heading();
        let mut body = String::new();
        let mut folder_only = false;

        while self.peek().is_some() {
            if self.trailing() {
                folder_only = true;
                break;
            }
            self.element(&mut body);
        }

        let prefix = if anchored { ROOT_PREFIX } else { SUFFIX_PREFIX };
        CompiledPattern {
            regex: format!("{}{}$", prefix, body),
            anchored,
            folder_only,
        }
    }

    fn heading(&mut self) -> bool {
        if self.peek() == Some(&Token::Slash) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn trailing(&mut self) -> bool {
        if self.at_last() && self.peek() == Some(&Token::Slash) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn element(&mut self, out: &mut String) {
        match self.advance() {
            Some(Token::Text(text)) => out.push_str(&regex::escape(&text)),
            Some(Token::Escaped(c)) => out.push_str(&regex::escape(&c.to_string())),
            Some(Token::Slash) => out.push('/'),
            Some(Token::MatchAll) => out.push_str(".*"),
            Some(Token::MatchMultiple) => out.push_str("[^/]*"),
            Some(Token::MatchOne) => out.push_str("[^/]"),
            Some(Token::CharClass(class)) => out.push_str(&class),
            None => {}
        }
    }
}

/// 将 glob 编译为正则表达式
pub fn compile(pattern: &str) -> Result<CompiledPattern> {
    if pattern.is_empty() {
        return Err(SyncError::pattern(pattern, "empty pattern"));
    }
    let tokens = Lexer::new(pattern).tokenize()?;
    Ok(Parser::new(tokens).parse())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_match() {
        let compiled = compile("*.txt").unwrap();
        assert_eq!(compiled.regex, "^(?:.*/)?[^/]*\\.txt$");
        assert!(!compiled.anchored);
        assert!(!compiled.folder_only);
    }

    #[test]
    fn test_anchored_folder_only() {
        let compiled = compile("/build/").unwrap();
        assert_eq!(compiled.regex, "^/build$");
        assert!(compiled.anchored);
        assert!(compiled.folder_only);
    }

    #[test]
    fn test_deep_match_and_class() {
        let compiled = compile("src/**/[ab]?.rs").unwrap();
        assert_eq!(compiled.regex, "^(?:.*/)?src/.*/[ab][^/]\\.rs$");
    }

    #[test]
    fn test_escaped_wildcard() {
        let compiled = compile("a\\*b").unwrap();
        assert_eq!(compiled.regex, "^(?:.*/)?a\\*b$");
    }

    #[test]
    fn test_root_pattern() {
        let compiled = compile("/").unwrap();
        assert_eq!(compiled.regex, "^/$");
        assert!(compiled.anchored);
        assert!(!compiled.folder_only);
    }

    #[test]
    fn test_errors() {
        assert!(compile("").is_err());
        assert!(compile("a[b").is_err());
    }
}
