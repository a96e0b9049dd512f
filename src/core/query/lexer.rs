use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Eof,
    Illegal,

    Ident,
    String,
    Number,
    True,
    False,
    Null,

    Gt,
    Gte,
    Lt,
    Lte,
    Is,

    And,
    Or,
    Not,

    Exists,
    Type,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            TokenType::Eof => "EOF",
            TokenType::Illegal => "ILLEGAL",
            TokenType::Ident => "IDENT",
            TokenType::String => "STRING",
            TokenType::Number => "NUMBER",
            TokenType::True => "TRUE",
            TokenType::False => "FALSE",
            TokenType::Null => "NULL",
            TokenType::Gt => ">",
            TokenType::Gte => ">=",
            TokenType::Lt => "<",
            TokenType::Lte => "<=",
            TokenType::Is => "IS",
            TokenType::And => "AND",
            TokenType::Or => "OR",
            TokenType::Not => "NOT",
            TokenType::Exists => "EXISTS",
            TokenType::Type => "TYPE",
            TokenType::LParen => "(",
            TokenType::RParen => ")",
            TokenType::LBracket => "[",
            TokenType::RBracket => "]",
            TokenType::Comma => ",",
            TokenType::Dot => ".",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub pos: usize,
}

impl Token {
    fn new(token_type: TokenType, value: String, pos: usize) -> Self {
        Self {
            token_type,
            value,
            pos,
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    ch: char,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Self {
            input: input.chars().collect(),
            pos: 0,
            ch: '\0',
        };
        lexer.read_char();
        lexer
    }

    fn read_char(&mut self) {
        self.ch = self.input.get(self.pos).copied().unwrap_or('\0');
        self.pos += 1;
    }

    fn peek_char(&self) -> char {
        self.input.get(self.pos).copied().unwrap_or('\0')
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let token_pos = self.pos.saturating_sub(1);

        match self.ch {
            '\0' => Token::new(TokenType::Eof, String::new(), token_pos),
            '(' | ')' | '[' | ']' | ',' | '.' => {
                let token_type = match self.ch {
                    '(' => TokenType::LParen,
                    ')' => TokenType::RParen,
                    '[' => TokenType::LBracket,
                    ']' => TokenType::RBracket,
                    ',' => TokenType::Comma,
                    _ => TokenType::Dot,
                };
                let tok = Token::new(token_type, self.ch.to_string(), token_pos);
                self.read_char();
                tok
            }
            '>' | '<' => {
                let base = self.ch;
                if self.peek_char() == '=' {
                    self.read_char();
                    self.read_char();
                    if base == '>' {
                        Token::new(TokenType::Gte, ">=".to_string(), token_pos)
                    } else {
                        Token::new(TokenType::Lte, "<=".to_string(), token_pos)
                    }
                } else {
                    self.read_char();
                    if base == '>' {
                        Token::new(TokenType::Gt, ">".to_string(), token_pos)
                    } else {
                        Token::new(TokenType::Lt, "<".to_string(), token_pos)
                    }
                }
            }
            '"' | '\'' => {
                let value = self.read_string();
                Token::new(TokenType::String, value, token_pos)
            }
            '-' if is_digit(self.peek_char()) => {
                self.read_char();
                let digits = self.read_number();
                Token::new(TokenType::Number, format!("-{}", digits), token_pos)
            }
            _ => {
                if is_letter(self.ch) || self.ch == '_' {
                    let value = self.read_identifier();
                    let token_type = lookup_keyword(&value);
                    Token::new(token_type, value, token_pos)
                } else if is_digit(self.ch) {
                    let value = self.read_number();
                    Token::new(TokenType::Number, value, token_pos)
                } else {
                    let tok = Token::new(TokenType::Illegal, self.ch.to_string(), token_pos);
                    self.read_char();
                    tok
                }
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.ch.is_whitespace() {
            self.read_char();
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos - 1;
        while is_letter(self.ch) || is_digit(self.ch) || self.ch == '_' {
            self.read_char();
        }
        self.input[start..self.pos - 1].iter().collect()
    }

    fn read_number(&mut self) -> String {
        let start = self.pos - 1;
        while is_digit(self.ch) {
            self.read_char();
        }

        if self.ch == '.' && is_digit(self.peek_char()) {
            self.read_char();
            while is_digit(self.ch) {
                self.read_char();
            }
        }

        self.input[start..self.pos - 1].iter().collect()
    }

    fn read_string(&mut self) -> String {
        let quote = self.ch;
        self.read_char();
        let start = self.pos - 1;

        while self.ch != quote && self.ch != '\0' {
            self.read_char();
        }

        let value: String = self.input[start..self.pos - 1].iter().collect();
        self.read_char();
        value
    }
}

fn lookup_keyword(ident: &str) -> TokenType {
    match ident.to_lowercase().as_str() {
        "and" => TokenType::And,
        "or" => TokenType::Or,
        "not" => TokenType::Not,
        "is" => TokenType::Is,
        "exists" => TokenType::Exists,
        "type" => TokenType::Type,
        "true" => TokenType::True,
        "false" => TokenType::False,
        "null" => TokenType::Null,
        _ => TokenType::Ident,
    }
}

fn is_letter(ch: char) -> bool {
    ch.is_alphabetic()
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();

    loop {
        let token = lexer.next_token();
        if token.token_type == TokenType::Illegal {
            return Err(format!(
                "illegal token at position {}: {}",
                token.pos, token.value
            ));
        }
        let is_eof = token.token_type == TokenType::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_comparison() {
        let tokens = tokenize("price >= 4.0").unwrap();
        let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::Ident,
                TokenType::Gte,
                TokenType::Number,
                TokenType::Eof
            ]
        );
        assert_eq!(tokens[2].value, "4.0");
    }

    #[test]
    fn test_tokenize_quoted_strings() {
        let tokens = tokenize("category is \"Electronics\" or category is 'Books'").unwrap();
        assert_eq!(tokens[2].token_type, TokenType::String);
        assert_eq!(tokens[2].value, "Electronics");
        assert_eq!(tokens[6].value, "Books");
    }

    #[test]
    fn test_tokenize_negative_number() {
        let tokens = tokenize("delta > -2.5").unwrap();
        assert_eq!(tokens[2].token_type, TokenType::Number);
        assert_eq!(tokens[2].value, "-2.5");
    }

    #[test]
    fn test_tokenize_keywords_and_brackets() {
        let tokens = tokenize("reviews exists and reviews type array and reviews is not []").unwrap();
        let types: Vec<TokenType> = tokens.iter().map(|t| t.token_type).collect();
        assert_eq!(
            types,
            vec![
                TokenType::Ident,
                TokenType::Exists,
                TokenType::And,
                TokenType::Ident,
                TokenType::Type,
                TokenType::Ident,
                TokenType::And,
                TokenType::Ident,
                TokenType::Is,
                TokenType::Not,
                TokenType::LBracket,
                TokenType::RBracket,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_illegal_character() {
        assert!(tokenize("price @ 10").is_err());
    }
}
