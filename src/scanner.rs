//! Lexical analysis: a byte cursor over the source with one token of
//! lookahead.
//!
//! Unlike a batch tokenizer, the scanner is an incremental cursor: the parser
//! reads `tok`/`text`/`lineno` and pulls the next token with `advance`. The
//! scanner keeps a single byte of lookahead, which is all the grammar's
//! two-byte punctuators (`:=`, `<=`, `>=`) require.

use crate::error::{CompileError, CompileResult};
use crate::token::Token;

/// End-of-Transmission (Ctrl+D). Ends the input in addition to running off
/// the end of the source.
const EOT: u8 = 0x04;

pub struct Scanner<'a> {
  input: &'a [u8],
  pos: usize,
  look: u8,
  /// Current token.
  pub tok: Token,
  /// Unencoded spelling of the current token.
  pub text: String,
  /// 1-based line of the lookahead position.
  pub lineno: u32,
}

impl<'a> Scanner<'a> {
  pub fn new(input: &'a [u8]) -> Self {
    let mut scan = Scanner {
      input,
      pos: 0,
      look: 0,
      tok: Token::Null,
      text: String::new(),
      lineno: 1,
    };
    scan.get_char();
    scan
  }

  /// Pull the next byte into the lookahead. Consuming a newline advances the
  /// line counter, so `lineno` is always the line of the lookahead.
  fn get_char(&mut self) {
    if self.look == b'\n' {
      self.lineno += 1;
    }
    self.look = match self.input.get(self.pos) {
      Some(&b) => {
        self.pos += 1;
        b
      }
      None => EOT,
    };
  }

  fn skip_white(&mut self) {
    loop {
      match self.look {
        b' ' | b'\t' | b'\n' | b'\r' => self.get_char(),
        b'{' => self.skip_comment(),
        _ => break,
      }
    }
  }

  /// Skip a `{ ... }` comment field. A `{` inside a comment opens another
  /// nesting level; end of input terminates the comment.
  fn skip_comment(&mut self) {
    self.get_char();
    loop {
      match self.look {
        EOT => return,
        b'}' => {
          self.get_char();
          return;
        }
        b'{' => self.skip_comment(),
        _ => self.get_char(),
      }
    }
  }

  fn scan_ident(&mut self) {
    self.text.clear();
    while self.look.is_ascii_alphanumeric() {
      self.text.push(self.look as char);
      self.get_char();
    }
    self.tok = Token::lookup(&self.text);
  }

  fn scan_number(&mut self) {
    self.text.clear();
    while self.look.is_ascii_digit() {
      self.text.push(self.look as char);
      self.get_char();
    }
    self.tok = Token::Number;
  }

  fn set(&mut self, tok: Token) {
    self.tok = tok;
    self.text.clear();
    self.text.push_str(tok.as_str());
  }

  fn single(byte: u8) -> Option<Token> {
    match byte {
      b'.' => Some(Token::Period),
      b',' => Some(Token::Comma),
      b';' => Some(Token::Semicolon),
      b'!' => Some(Token::Send),
      b'?' => Some(Token::Recv),
      b'(' => Some(Token::Lparen),
      b')' => Some(Token::Rparen),
      b'=' => Some(Token::Eql),
      b'#' => Some(Token::Neq),
      b'*' => Some(Token::Times),
      b'/' => Some(Token::Div),
      b'+' => Some(Token::Plus),
      b'-' => Some(Token::Minus),
      _ => None,
    }
  }

  /// If the lookahead is `expect`, consume it and take `long`, otherwise
  /// take `short`.
  fn follow(&mut self, expect: u8, long: Token, short: Token) -> Token {
    if self.look == expect {
      self.get_char();
      long
    } else {
      short
    }
  }

  /// Scan the next token into the cursor.
  pub fn advance(&mut self) -> CompileResult<()> {
    self.skip_white();
    if self.look == EOT {
      self.set(Token::Eof);
      return Ok(());
    }
    if self.look.is_ascii_alphabetic() {
      self.scan_ident();
      return Ok(());
    }
    if self.look.is_ascii_digit() {
      self.scan_number();
      return Ok(());
    }
    if let Some(tok) = Self::single(self.look) {
      self.set(tok);
      self.get_char();
      return Ok(());
    }
    match self.look {
      b':' => {
        self.get_char();
        if self.look != b'=' {
          return Err(CompileError::IllegalCharacter {
            lineno: self.lineno,
            ch: ':',
          });
        }
        self.get_char();
        self.set(Token::Becomes);
      }
      b'<' => {
        self.get_char();
        let tok = self.follow(b'=', Token::Leq, Token::Lss);
        self.set(tok);
      }
      b'>' => {
        self.get_char();
        let tok = self.follow(b'=', Token::Geq, Token::Grt);
        self.set(tok);
      }
      other => {
        return Err(CompileError::IllegalCharacter {
          lineno: self.lineno,
          ch: other as char,
        });
      }
    }
    Ok(())
  }
}
