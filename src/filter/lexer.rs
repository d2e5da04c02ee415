//! Glob 模式词法分析

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 连续的普通字符
    Text(String),
    /// `\c`
    Escaped(char),
    /// `/`
    Slash,
    /// `**`
    MatchAll,
    /// `*`
    MatchMultiple,
    /// `?`
    MatchOne,
    /// `[...]`，包含方括号
    CharClass(String),
}

const SPECIAL: &[char] = &['\\', '/', '*', '?', '['];

pub struct Lexer<'a> {
    pattern: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(pattern: &'a str) -> Self {
        Self {
            pattern,
            chars: pattern.chars().collect(),
            pos: 0,
        }
    }

    /// 对整个模式进行分词
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        let c = match self.bump() {
            Some(c) => c,
            None => return Ok(None),
        };

        let token = match c {
            '\\' => match self.bump() {
                Some(escaped) => Token::Escaped(escaped),
                // 末尾单独的反斜杠按字面处理
                None => Token::Text("\\".to_string()),
            },
            '/' => Token::Slash,
            '*' => {
                if self.peek() == Some('*') {
                    self.pos += 1;
                    Token::MatchAll
                } else {
                    Token::MatchMultiple
                }
            }
            '?' => Token::MatchOne,
            '[' => self.char_class()?,
            _ => {
                let mut text = String::from(c);
                while let Some(next) = self.peek() {
                    if SPECIAL.contains(&next) {
                        break;
                    }
                    text.push(next);
                    self.pos += 1;
                }
                Token::Text(text)
            }
        };

        Ok(Some(token))
    }

    /// 读取 `[` 之后的字符类。第一个成员按原样读取，
    /// 因此 `[]a]` 包含 `]` 和 `a`
    fn char_class(&mut self) -> Result<Token> {
        let mut class = String::from('[');
        match self.bump() {
            Some(first) => {
                class.push(first);
                if first == '\\' {
                    class.push(self.bump().ok_or_else(|| self.unterminated())?);
                }
            }
            None => return Err(self.unterminated()),
        }

        loop {
            let c = self.bump().ok_or_else(|| self.unterminated())?;
            class.push(c);
            match c {
                '\\' => class.push(self.bump().ok_or_else(|| self.unterminated())?),
                ']' => return Ok(Token::CharClass(class)),
                _ => {}
            }
        }
    }

    fn unterminated(&self) -> SyncError {
        SyncError::pattern(self.pattern, "unterminated character class")
    }
}
