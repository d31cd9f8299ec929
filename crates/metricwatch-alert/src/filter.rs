//! Syntax check for user-typed KQL filter expressions.
//!
//! Only the syntax is checked; field names and values are not resolved.
//!
//! ```text
//! query      = or_query
//! or_query   = and_query ("or" and_query)*
//! and_query  = not_query ("and" not_query)*
//! not_query  = "not" not_query | sub_query
//! sub_query  = "(" or_query ")" | field ":" "{" or_query "}"
//!            | field range_op value | field ":" values | value
//! values     = "(" value_list ")" | value
//! value_list = value_and ("or" value_and)*
//! value_and  = value_not ("and" value_not)*
//! value_not  = "not" value_not | values
//! value      = quoted | word+
//! ```

/// Position is a byte offset into the query text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid filter query at position {position}: {message}")]
pub struct FilterSyntaxError {
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Range,
    And,
    Or,
    Not,
    Word,
    Quoted,
    Eof,
}

impl Token {
    fn describe(&self) -> &'static str {
        match self {
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::Colon => "':'",
            Token::Range => "range operator",
            Token::And => "'and'",
            Token::Or => "'or'",
            Token::Not => "'not'",
            Token::Word => "value",
            Token::Quoted => "quoted string",
            Token::Eof => "end of query",
        }
    }
}

type Spanned = (Token, usize);

/// Checks that `query` is a well-formed KQL expression.
///
/// A blank query is valid and matches everything.
///
/// # Examples
///
/// ```
/// use metricwatch_alert::filter::validate;
///
/// assert!(validate("host.name: web-* and not cloud.region: \"eu-west-1\"").is_ok());
/// assert!(validate("system.load.1 >= 2").is_ok());
/// assert!(validate("host.name:").is_err());
/// assert!(validate("(host.name: a").is_err());
/// ```
pub fn validate(query: &str) -> Result<(), FilterSyntaxError> {
    let tokens = tokenize(query)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.peek() == &Token::Eof {
        return Ok(());
    }
    parser.or_query()?;
    parser.expect(Token::Eof)
}

fn tokenize(query: &str) -> Result<Vec<Spanned>, FilterSyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = query.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '{' | '}' | ':' => {
                chars.next();
                let token = match ch {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    _ => Token::Colon,
                };
                tokens.push((token, start));
            }
            '<' | '>' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '='))) {
                    chars.next();
                }
                tokens.push((Token::Range, start));
            }
            '"' => {
                chars.next();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if chars.next().is_none() {
                                break;
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Err(FilterSyntaxError {
                        position: start,
                        message: "unterminated quoted string".to_string(),
                    });
                }
                tokens.push((Token::Quoted, start));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() || "(){}:<>\"".contains(c) {
                        break;
                    }
                    chars.next();
                    if c == '\\' {
                        match chars.next() {
                            Some((_, escaped)) => word.push(escaped),
                            None => {
                                return Err(FilterSyntaxError {
                                    position: i,
                                    message: "dangling escape character".to_string(),
                                })
                            }
                        }
                    } else {
                        word.push(c);
                    }
                }
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Word,
                };
                tokens.push((token, start));
            }
        }
    }

    tokens.push((Token::Eof, query.len()));
    Ok(tokens)
}

/// Deepest allowed nesting of parentheses and braces.
const MAX_NESTING: usize = 256;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i].0
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error(&self, expected: &str) -> FilterSyntaxError {
        let (token, position) = &self.tokens[self.pos];
        FilterSyntaxError {
            position: *position,
            message: format!("expected {expected} but found {}", token.describe()),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), FilterSyntaxError> {
        if self.peek() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.error(token.describe()))
        }
    }

    /// Consumes the opening token and parses `inner` up to `close`.
    fn nested(
        &mut self,
        close: Token,
        inner: fn(&mut Self) -> Result<(), FilterSyntaxError>,
    ) -> Result<(), FilterSyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(FilterSyntaxError {
                position: self.tokens[self.pos].1,
                message: "query nested too deeply".to_string(),
            });
        }
        self.advance();
        self.depth += 1;
        let result = inner(self).and_then(|()| self.expect(close));
        self.depth -= 1;
        result
    }

    fn or_query(&mut self) -> Result<(), FilterSyntaxError> {
        self.and_query()?;
        while self.peek() == &Token::Or {
            self.advance();
            self.and_query()?;
        }
        Ok(())
    }

    fn and_query(&mut self) -> Result<(), FilterSyntaxError> {
        self.not_query()?;
        while self.peek() == &Token::And {
            self.advance();
            self.not_query()?;
        }
        Ok(())
    }

    fn not_query(&mut self) -> Result<(), FilterSyntaxError> {
        while self.peek() == &Token::Not {
            self.advance();
        }
        self.sub_query()
    }

    fn sub_query(&mut self) -> Result<(), FilterSyntaxError> {
        match self.peek().clone() {
            Token::LParen => self.nested(Token::RParen, Self::or_query),
            Token::Word | Token::Quoted => match self.peek_at(1).clone() {
                Token::Colon => {
                    self.advance();
                    self.advance();
                    if self.peek() == &Token::LBrace {
                        self.nested(Token::RBrace, Self::or_query)
                    } else {
                        self.values()
                    }
                }
                Token::Range => {
                    self.advance();
                    self.advance();
                    self.value()
                }
                _ => self.value(),
            },
            _ => Err(self.error("field or value")),
        }
    }

    fn values(&mut self) -> Result<(), FilterSyntaxError> {
        if self.peek() == &Token::LParen {
            return self.nested(Token::RParen, Self::value_list);
        }
        self.value()
    }

    fn value_list(&mut self) -> Result<(), FilterSyntaxError> {
        self.value_and()?;
        while self.peek() == &Token::Or {
            self.advance();
            self.value_and()?;
        }
        Ok(())
    }

    fn value_and(&mut self) -> Result<(), FilterSyntaxError> {
        self.value_not()?;
        while self.peek() == &Token::And {
            self.advance();
            self.value_not()?;
        }
        Ok(())
    }

    fn value_not(&mut self) -> Result<(), FilterSyntaxError> {
        while self.peek() == &Token::Not {
            self.advance();
        }
        self.values()
    }

    fn value(&mut self) -> Result<(), FilterSyntaxError> {
        match self.peek().clone() {
            Token::Quoted => {
                self.advance();
                Ok(())
            }
            Token::Word => {
                // Consecutive words form a single multi-term value.
                while self.peek() == &Token::Word {
                    self.advance();
                }
                Ok(())
            }
            _ => Err(self.error("value")),
        }
    }
}
