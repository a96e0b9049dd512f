use super::lexer::{tokenize, Token, TokenType};
use super::{CompareOp, Filter};
use crate::core::document::ValueType;
use serde_json::Value;

/// Parse the textual filter language into a [`Filter`] AST.
///
/// Grammar, loosest binding first: `or`, `and`, then a single condition:
/// `field exists`, `field not exists`, `field type array`,
/// `field is value`, `field is not value`, `field < value`, `>`, `<=`,
/// `>=`, parenthesized groups, `not (...)`. A bare trailing field is
/// shorthand for `field is true`.
pub fn parse_filter(input: &str) -> Result<Filter, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    parser.parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(&mut self) -> Result<Filter, String> {
        if self.tokens.is_empty() || self.check(TokenType::Eof) {
            return Err("empty filter".to_string());
        }
        let filter = self.or_expr()?;
        if !self.check(TokenType::Eof) {
            return Err(format!(
                "unexpected {} at position {}",
                self.current().token_type,
                self.current().pos
            ));
        }
        Ok(filter)
    }

    fn or_expr(&mut self) -> Result<Filter, String> {
        let mut filters = vec![self.and_expr()?];

        while self.match_token(&[TokenType::Or]) {
            filters.push(self.and_expr()?);
        }

        if filters.len() == 1 {
            Ok(filters.pop().expect("non-empty"))
        } else {
            Ok(Filter::Or { filters })
        }
    }

    fn and_expr(&mut self) -> Result<Filter, String> {
        let mut filters = vec![self.condition()?];

        while self.match_token(&[TokenType::And]) {
            filters.push(self.condition()?);
        }

        if filters.len() == 1 {
            Ok(filters.pop().expect("non-empty"))
        } else {
            Ok(Filter::And { filters })
        }
    }

    fn condition(&mut self) -> Result<Filter, String> {
        if self.match_token(&[TokenType::LParen]) {
            let filter = self.or_expr()?;
            if !self.match_token(&[TokenType::RParen]) {
                return Err(format!("expected ')' at position {}", self.current().pos));
            }
            return Ok(filter);
        }

        if self.match_token(&[TokenType::Not]) {
            let filter = self.condition()?;
            return Ok(Filter::Not {
                filter: Box::new(filter),
            });
        }

        let path = self.parse_path()?;

        if self.match_token(&[TokenType::Exists]) {
            return Ok(Filter::Exists { path });
        }

        if self.check(TokenType::Not) && self.peek_type(1) == Some(TokenType::Exists) {
            self.advance();
            self.advance();
            return Ok(Filter::Not {
                filter: Box::new(Filter::Exists { path }),
            });
        }

        if self.match_token(&[TokenType::Type]) {
            if !self.check(TokenType::Ident) {
                return Err(format!(
                    "expected type name at position {}",
                    self.current().pos
                ));
            }
            let name = self.advance().value.clone();
            let kind = ValueType::from_name(&name)
                .ok_or_else(|| format!("unknown type '{}' (null, bool, number, string, array, object)", name))?;
            return Ok(Filter::IsType { path, kind });
        }

        let cmp = if self.match_token(&[TokenType::Gt]) {
            CompareOp::Gt
        } else if self.match_token(&[TokenType::Gte]) {
            CompareOp::Gte
        } else if self.match_token(&[TokenType::Lt]) {
            CompareOp::Lt
        } else if self.match_token(&[TokenType::Lte]) {
            CompareOp::Lte
        } else if self.match_token(&[TokenType::Is]) {
            if self.match_token(&[TokenType::Not]) {
                CompareOp::Ne
            } else {
                CompareOp::Eq
            }
        } else {
            if self.is_at_end()
                || self.check(TokenType::And)
                || self.check(TokenType::Or)
                || self.check(TokenType::RParen)
            {
                // bare field shorthand: `active` means `active is true`
                return Ok(Filter::Compare {
                    path,
                    cmp: CompareOp::Eq,
                    value: Value::Bool(true),
                });
            }
            return Err(format!(
                "expected comparison operator at position {}",
                self.current().pos
            ));
        };

        let value = self.parse_value()?;

        Ok(Filter::Compare { path, cmp, value })
    }

    fn parse_path(&mut self) -> Result<String, String> {
        if !self.check(TokenType::Ident) {
            return Err(format!(
                "expected field name at position {}, got {}",
                self.current().pos,
                self.current().token_type
            ));
        }
        let mut path = self.advance().value.clone();

        while self.match_token(&[TokenType::Dot]) {
            if !self.check(TokenType::Ident) {
                return Err(format!(
                    "expected field name after '.' at position {}",
                    self.current().pos
                ));
            }
            path.push('.');
            path.push_str(&self.advance().value);
        }

        Ok(path)
    }

    fn parse_value(&mut self) -> Result<Value, String> {
        if self.match_token(&[TokenType::Number]) {
            let text = &self.previous().value;
            let parsed = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number: {}", text))?;
            let number = serde_json::Number::from_f64(parsed)
                .ok_or_else(|| format!("invalid number (NaN or Infinity not supported): {}", text))?;
            return Ok(Value::Number(number));
        }

        if self.match_token(&[TokenType::String]) || self.match_token(&[TokenType::Ident]) {
            return Ok(Value::String(self.previous().value.clone()));
        }

        if self.match_token(&[TokenType::True]) {
            return Ok(Value::Bool(true));
        }

        if self.match_token(&[TokenType::False]) {
            return Ok(Value::Bool(false));
        }

        if self.match_token(&[TokenType::Null]) {
            return Ok(Value::Null);
        }

        if self.match_token(&[TokenType::LBracket]) {
            let mut items = Vec::new();
            while !self.check(TokenType::RBracket) {
                items.push(self.parse_value()?);
                if !self.match_token(&[TokenType::Comma]) {
                    break;
                }
            }
            if !self.match_token(&[TokenType::RBracket]) {
                return Err(format!("expected ']' at position {}", self.current().pos));
            }
            return Ok(Value::Array(items));
        }

        Err(format!("expected value at position {}", self.current().pos))
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos - 1]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    fn peek_type(&self, offset: usize) -> Option<TokenType> {
        self.tokens.get(self.pos + offset).map(|t| t.token_type)
    }

    fn match_token(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(*token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn is_at_end(&self) -> bool {
        self.check(TokenType::Eof)
    }
}
