use anyhow::{bail, Context, Result};

use super::{CmpOp, Literal, ValueFilter};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Cmp(CmpOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Str(_) => f.write_str("string literal"),
            Token::Int(v) => write!(f, "'{}'", v),
            Token::Float(v) => write!(f, "'{}'", v),
            Token::Cmp(op) => write!(f, "'{}'", op),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

fn scan(input: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '[' | ']' | ',' => {
                chars.next();
                tokens.push((
                    pos,
                    match c {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        _ => Token::Comma,
                    },
                ));
            }
            '=' | '!' => {
                chars.next();
                match chars.next_if(|(_, c)| *c == '=') {
                    Some(_) if c == '=' => tokens.push((pos, Token::Cmp(CmpOp::Eq))),
                    Some(_) => tokens.push((pos, Token::Cmp(CmpOp::Ne))),
                    None => bail!("expected '{}=' at position {}", c, pos),
                }
            }
            '<' | '>' => {
                chars.next();
                let strict = chars.next_if(|(_, c)| *c == '=').is_none();
                let op = match (c, strict) {
                    ('<', true) => CmpOp::Lt,
                    ('<', false) => CmpOp::Le,
                    ('>', true) => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                tokens.push((pos, Token::Cmp(op)));
            }
            quote @ ('\'' | '"') => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, c)) if c == quote => break,
                        Some((_, c)) => text.push(c),
                        None => bail!("unterminated string literal starting at position {}", pos),
                    }
                }
                tokens.push((pos, Token::Str(text)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                tokens.push((pos, scan_number(pos, &mut chars)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some((_, c)) =
                    chars.next_if(|(_, c)| c.is_alphanumeric() || *c == '_')
                {
                    name.push(c);
                }
                tokens.push((pos, Token::Ident(name)));
            }
            c => bail!("unexpected character '{}' at position {}", c, pos),
        }
    }
    Ok(tokens)
}

fn scan_number(
    pos: usize,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<Token> {
    let mut text = String::new();
    if let Some((_, c)) = chars.next_if(|(_, c)| *c == '-') {
        text.push(c);
    }
    let mut is_float = false;
    while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_digit() || *c == '.') {
        is_float |= c == '.';
        text.push(c);
    }
    if let Some((_, e)) = chars.next_if(|(_, c)| *c == 'e' || *c == 'E') {
        is_float = true;
        text.push(e);
        if let Some((_, sign)) = chars.next_if(|(_, c)| *c == '+' || *c == '-') {
            text.push(sign);
        }
        while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_digit()) {
            text.push(c);
        }
    }
    let number = if is_float {
        Token::Float(
            text.parse()
                .with_context(|| format!("invalid number '{}' at position {}", text, pos))?,
        )
    } else {
        Token::Int(
            text.parse()
                .with_context(|| format!("invalid number '{}' at position {}", text, pos))?,
        )
    };
    Ok(number)
}

pub(super) fn parse(input: &str) -> Result<ValueFilter> {
    let tokens = scan(input)?;
    if tokens.is_empty() {
        bail!("empty filter expression");
    }
    let mut parser = Parser { tokens, at: 0 };
    let filter = parser.or_expr()?;
    if let Some((pos, token)) = parser.peek() {
        bail!("unexpected {} after end of expression at position {}", token, pos);
    }
    Ok(filter)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    at: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.at)
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.at).cloned();
        if token.is_some() {
            self.at += 1;
        }
        token
    }

    fn keyword(&self) -> Option<&str> {
        match self.peek() {
            Some((_, Token::Ident(word))) => Some(word.as_str()),
            _ => None,
        }
    }

    fn or_expr(&mut self) -> Result<ValueFilter> {
        let mut lhs = self.and_expr()?;
        while self.keyword() == Some("or") {
            self.at += 1;
            let rhs = self.and_expr()?;
            lhs = ValueFilter::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<ValueFilter> {
        let mut lhs = self.unary_expr()?;
        while self.keyword() == Some("and") {
            self.at += 1;
            let rhs = self.unary_expr()?;
            lhs = ValueFilter::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<ValueFilter> {
        match self.peek() {
            Some((_, Token::Ident(word))) if word == "not" => {
                self.at += 1;
                Ok(ValueFilter::Not(Box::new(self.unary_expr()?)))
            }
            Some((_, Token::LParen)) => {
                self.at += 1;
                let inner = self.or_expr()?;
                match self.advance() {
                    Some((_, Token::RParen)) => Ok(inner),
                    Some((pos, token)) => bail!("expected ')' at position {}, found {}", pos, token),
                    None => bail!("expected ')' before end of expression"),
                }
            }
            _ => self.comparison(),
        }
    }

    fn comparison(&mut self) -> Result<ValueFilter> {
        let column = match self.advance() {
            Some((_, Token::Ident(name)))
                if !matches!(name.as_str(), "and" | "or" | "not" | "in") =>
            {
                name
            }
            Some((pos, token)) => {
                bail!("expected a column name at position {}, found {}", pos, token)
            }
            None => bail!("expected a column name before end of expression"),
        };
        match self.advance() {
            Some((_, Token::Cmp(op))) => {
                let value = self.literal()?;
                Ok(ValueFilter::Cmp { column, op, value })
            }
            Some((_, Token::Ident(word))) if word == "in" => {
                let values = self.literal_list()?;
                Ok(ValueFilter::In { column, values })
            }
            Some((pos, token)) => bail!(
                "expected a comparison operator or 'in' at position {}, found {}",
                pos,
                token
            ),
            None => bail!("expected a comparison operator before end of expression"),
        }
    }

    fn literal_list(&mut self) -> Result<Vec<Literal>> {
        match self.advance() {
            Some((_, Token::LBracket)) => {}
            Some((pos, token)) => bail!("expected '[' at position {}, found {}", pos, token),
            None => bail!("expected '[' before end of expression"),
        }
        let mut values = vec![self.literal()?];
        loop {
            match self.advance() {
                Some((_, Token::Comma)) => values.push(self.literal()?),
                Some((_, Token::RBracket)) => return Ok(values),
                Some((pos, token)) => {
                    bail!("expected ',' or ']' at position {}, found {}", pos, token)
                }
                None => bail!("expected ']' before end of expression"),
            }
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.advance() {
            Some((_, Token::Str(text))) => Ok(Literal::Str(text)),
            Some((_, Token::Int(v))) => Ok(Literal::Int(v)),
            Some((_, Token::Float(v))) => Ok(Literal::Float(v)),
            Some((_, Token::Ident(word))) if word == "True" || word == "true" => {
                Ok(Literal::Bool(true))
            }
            Some((_, Token::Ident(word))) if word == "False" || word == "false" => {
                Ok(Literal::Bool(false))
            }
            Some((pos, token)) => bail!("expected a literal at position {}, found {}", pos, token),
            None => bail!("expected a literal before end of expression"),
        }
    }
}
