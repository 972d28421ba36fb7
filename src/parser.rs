//! Recursive-descent parser producing the program AST.
//!
//! The parser owns all syntactic knowledge: one function per grammar
//! production, strict left-to-right with a single token of lookahead.
//! Operator precedence is encoded by the production ladder — a leading sign
//! wraps the whole first term, `*`/`/` bind inside `term`, `+`/`-` fold
//! left-to-right at the `expression` level. Name resolution is deferred to
//! the code generator; the parser only builds structure.

use crate::ast::{
  BinOp, Block, Cond, ConstDecl, Expr, Ident, Number, ProcDecl, Program, RelOp,
  Sign, Stmt,
};
use crate::error::{CompileError, CompileResult};
use crate::scanner::Scanner;
use crate::token::Token;

/// Parse a whole program: `block "."`.
pub fn parse(source: &[u8], name: &str) -> CompileResult<Program> {
  let mut parser = Parser::new(source)?;
  let main = parser.block()?;
  parser.match_tok(Token::Period)?;
  Ok(Program {
    name: name.to_string(),
    main,
  })
}

/// Parse a lone expression. This is the fixture the expression round-trip
/// tests drive; it insists on consuming the whole input.
pub fn parse_expression(source: &[u8]) -> CompileResult<Expr> {
  let mut parser = Parser::new(source)?;
  let x = parser.expression()?;
  parser.match_tok(Token::Eof)?;
  Ok(x)
}

struct Parser<'a> {
  scan: Scanner<'a>,
}

impl<'a> Parser<'a> {
  fn new(source: &'a [u8]) -> CompileResult<Self> {
    let mut scan = Scanner::new(source);
    scan.advance()?;
    Ok(Parser { scan })
  }

  /// Consume the expected token or fail with the standard diagnostic.
  fn match_tok(&mut self, want: Token) -> CompileResult<()> {
    if self.scan.tok == want {
      self.scan.advance()
    } else {
      Err(self.expected(want.as_str()))
    }
  }

  fn expected(&self, want: &str) -> CompileError {
    CompileError::UnexpectedToken {
      lineno: self.scan.lineno,
      got: self.scan.text.clone(),
      want: want.to_string(),
    }
  }

  fn ident(&mut self) -> CompileResult<Ident> {
    if self.scan.tok != Token::Ident {
      return Err(self.expected("identifier"));
    }
    let ident = Ident {
      name: self.scan.text.clone(),
      line: self.scan.lineno,
    };
    self.scan.advance()?;
    Ok(ident)
  }

  fn number(&mut self) -> CompileResult<Number> {
    if self.scan.tok != Token::Number {
      return Err(self.expected("number"));
    }
    let number = Number {
      value: self.scan.text.clone(),
      line: self.scan.lineno,
    };
    self.scan.advance()?;
    Ok(number)
  }

  // ----- Declarations -----

  fn block(&mut self) -> CompileResult<Block> {
    let mut consts = Vec::new();
    if self.scan.tok == Token::Const {
      self.match_tok(Token::Const)?;
      consts.push(self.const_decl()?);
      while self.scan.tok == Token::Comma {
        self.match_tok(Token::Comma)?;
        consts.push(self.const_decl()?);
      }
      self.match_tok(Token::Semicolon)?;
    }

    let mut vars = Vec::new();
    if self.scan.tok == Token::Var {
      self.match_tok(Token::Var)?;
      vars.push(self.ident()?);
      while self.scan.tok == Token::Comma {
        self.match_tok(Token::Comma)?;
        vars.push(self.ident()?);
      }
      self.match_tok(Token::Semicolon)?;
    }

    let mut procs = Vec::new();
    while self.scan.tok == Token::Procedure {
      self.match_tok(Token::Procedure)?;
      let name = self.ident()?;
      self.match_tok(Token::Semicolon)?;
      let block = self.block()?;
      self.match_tok(Token::Semicolon)?;
      procs.push(ProcDecl { name, block });
    }

    let body = self.statement()?;
    Ok(Block {
      consts,
      vars,
      procs,
      body,
    })
  }

  fn const_decl(&mut self) -> CompileResult<ConstDecl> {
    let name = self.ident()?;
    self.match_tok(Token::Eql)?;
    let value = self.number()?;
    Ok(ConstDecl { name, value })
  }

  // ----- Statements -----

  /// Parse a statement. The production is optional everywhere it appears,
  /// so a token that opens no statement yields `None` and is left for the
  /// caller.
  fn statement(&mut self) -> CompileResult<Option<Stmt>> {
    let stmt = match self.scan.tok {
      Token::Ident => {
        let lhs = self.ident()?;
        self.match_tok(Token::Becomes)?;
        let rhs = self.expression()?;
        Stmt::Assign { lhs, rhs }
      }
      Token::Call => {
        self.match_tok(Token::Call)?;
        Stmt::Call {
          proc: self.ident()?,
        }
      }
      Token::Begin => {
        self.match_tok(Token::Begin)?;
        let mut list = Vec::new();
        if let Some(stmt) = self.statement()? {
          list.push(stmt);
        }
        while self.scan.tok == Token::Semicolon {
          self.match_tok(Token::Semicolon)?;
          if let Some(stmt) = self.statement()? {
            list.push(stmt);
          }
        }
        self.match_tok(Token::End)?;
        Stmt::Begin { list }
      }
      Token::If => {
        self.match_tok(Token::If)?;
        let cond = self.condition()?;
        self.match_tok(Token::Then)?;
        let body = self.statement()?.map(Box::new);
        Stmt::If { cond, body }
      }
      Token::While => {
        self.match_tok(Token::While)?;
        let cond = self.condition()?;
        self.match_tok(Token::Do)?;
        let body = self.statement()?.map(Box::new);
        Stmt::While { cond, body }
      }
      Token::Send => {
        self.match_tok(Token::Send)?;
        Stmt::Send {
          x: self.expression()?,
        }
      }
      Token::Recv => {
        self.match_tok(Token::Recv)?;
        Stmt::Receive {
          name: self.ident()?,
        }
      }
      _ => return Ok(None),
    };
    Ok(Some(stmt))
  }

  // ----- Conditions -----

  fn condition(&mut self) -> CompileResult<Cond> {
    if self.scan.tok == Token::Odd {
      self.match_tok(Token::Odd)?;
      return Ok(Cond::Odd {
        x: self.expression()?,
      });
    }
    let x = self.expression()?;
    let op = match self.scan.tok {
      Token::Eql => RelOp::Eql,
      Token::Neq => RelOp::Neq,
      Token::Lss => RelOp::Lss,
      Token::Leq => RelOp::Leq,
      Token::Grt => RelOp::Grt,
      Token::Geq => RelOp::Geq,
      _ => return Err(self.expected("relation")),
    };
    self.scan.advance()?;
    let y = self.expression()?;
    Ok(Cond::Rel { x, op, y })
  }

  // ----- Expressions -----

  fn expression(&mut self) -> CompileResult<Expr> {
    let sign = match self.scan.tok {
      Token::Plus => {
        self.scan.advance()?;
        Some(Sign::Plus)
      }
      Token::Minus => {
        self.scan.advance()?;
        Some(Sign::Minus)
      }
      _ => None,
    };
    let mut node = self.term()?;
    if let Some(op) = sign {
      node = Expr::unary(op, node);
    }
    while self.scan.tok.is_addop() {
      let op = if self.scan.tok == Token::Plus {
        BinOp::Add
      } else {
        BinOp::Sub
      };
      self.scan.advance()?;
      let rhs = self.term()?;
      node = Expr::binary(op, node, rhs);
    }
    Ok(node)
  }

  fn term(&mut self) -> CompileResult<Expr> {
    let mut node = self.factor()?;
    while self.scan.tok.is_mulop() {
      let op = if self.scan.tok == Token::Times {
        BinOp::Mul
      } else {
        BinOp::Div
      };
      self.scan.advance()?;
      let rhs = self.factor()?;
      node = Expr::binary(op, node, rhs);
    }
    Ok(node)
  }

  fn factor(&mut self) -> CompileResult<Expr> {
    match self.scan.tok {
      Token::Lparen => {
        self.match_tok(Token::Lparen)?;
        let x = self.expression()?;
        self.match_tok(Token::Rparen)?;
        Ok(x)
      }
      Token::Number => Ok(Expr::Number(self.number()?)),
      Token::Ident => Ok(Expr::Ident(self.ident()?)),
      _ => Err(self.expected("expression")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  /// Interpret an expression tree against an identifier environment.
  fn eval(x: &Expr, env: &HashMap<&str, i32>) -> i32 {
    match x {
      Expr::Ident(ident) => env[ident.name.as_str()],
      Expr::Number(number) => number.value.parse().unwrap(),
      Expr::Unary { op, x } => match op {
        Sign::Plus => eval(x, env),
        Sign::Minus => -eval(x, env),
      },
      Expr::Binary { op, x, y } => {
        let a = eval(x, env);
        let b = eval(y, env);
        match op {
          BinOp::Add => a + b,
          BinOp::Sub => a - b,
          BinOp::Mul => a * b,
          BinOp::Div => a / b,
        }
      }
    }
  }

  #[test]
  fn expressions_evaluate_like_left_folds() {
    let cases: &[(&str, &[(&str, i32)], i32)] = &[
      ("10", &[], 10),
      ("x", &[("x", 5)], 5),
      ("(y)", &[("y", 1)], 1),
      ("(((z)))", &[("z", 1)], 1),
      ("-7", &[], -7),
      ("+3 * (-7)", &[], -21),
      ("3 * 5", &[], 15),
      ("(10 / x) * 4", &[("x", 5)], 8),
      ("1 + 2", &[], 3),
      ("9 - (5 + 3)", &[], 1),
      ("z * (x / 2) - (y + 3)", &[("z", 9), ("x", 6), ("y", 4)], 20),
    ];
    for (src, bindings, want) in cases {
      let env: HashMap<&str, i32> = bindings.iter().copied().collect();
      let x = parse_expression(src.as_bytes())
        .unwrap_or_else(|err| panic!("{src:?}: {err}"));
      assert_eq!(eval(&x, &env), *want, "input {src:?}");
    }
  }

  #[test]
  fn equal_precedence_folds_left() {
    // 8 - 3 - 2 must parse as (8 - 3) - 2.
    let x = parse_expression(b"8 - 3 - 2").unwrap();
    assert_eq!(eval(&x, &HashMap::new()), 3);
    // 16 / 4 / 2 must parse as (16 / 4) / 2.
    let x = parse_expression(b"16 / 4 / 2").unwrap();
    assert_eq!(eval(&x, &HashMap::new()), 2);
  }

  #[test]
  fn multiplication_binds_tighter_than_addition() {
    let x = parse_expression(b"1 + 2 * 3 - 4").unwrap();
    assert_eq!(eval(&x, &HashMap::new()), 3);
  }

  #[test]
  fn empty_program_parses() {
    let program = parse(b".", "t").unwrap();
    assert!(program.main.consts.is_empty());
    assert!(program.main.vars.is_empty());
    assert!(program.main.procs.is_empty());
    assert!(program.main.body.is_none());
  }

  #[test]
  fn declarations_fill_the_block() {
    let src = b"CONST a = 1, b = 2; VAR x, y, z; PROCEDURE P; ; CALL P .";
    let program = parse(src, "t").unwrap();
    let main = &program.main;
    assert_eq!(main.consts.len(), 2);
    assert_eq!(main.consts[1].name.name, "b");
    assert_eq!(main.consts[1].value.value, "2");
    assert_eq!(
      main.vars.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
      ["x", "y", "z"]
    );
    assert_eq!(main.procs.len(), 1);
    assert_eq!(main.procs[0].name.name, "P");
    assert!(main.procs[0].block.body.is_none());
    assert!(matches!(main.body, Some(Stmt::Call { .. })));
  }

  #[test]
  fn begin_drops_empty_statements() {
    let program = parse(b"BEGIN ; ; END .", "t").unwrap();
    match program.main.body {
      Some(Stmt::Begin { ref list }) => assert!(list.is_empty()),
      ref other => panic!("unexpected body {other:?}"),
    }
  }

  #[test]
  fn begin_allows_trailing_semicolon() {
    let src = b"VAR x; BEGIN x := 1; END .";
    let program = parse(src, "t").unwrap();
    match program.main.body {
      Some(Stmt::Begin { ref list }) => assert_eq!(list.len(), 1),
      ref other => panic!("unexpected body {other:?}"),
    }
  }

  #[test]
  fn nested_procedures_nest_blocks() {
    let src = b"PROCEDURE P; PROCEDURE Q; ; ; CALL P .";
    let program = parse(src, "t").unwrap();
    let p = &program.main.procs[0];
    assert_eq!(p.name.name, "P");
    assert_eq!(p.block.procs.len(), 1);
    assert_eq!(p.block.procs[0].name.name, "Q");
  }

  #[test]
  fn missing_period_is_reported() {
    let err = parse(b"VAR x; x := 1", "t").unwrap_err();
    assert_eq!(err.to_string(), "error:1:unexpected EOF, expecting .");
  }

  #[test]
  fn missing_then_is_reported() {
    let err = parse(b"IF 1 = 1 DO x := 1 .", "t").unwrap_err();
    assert_eq!(err.to_string(), "error:1:unexpected DO, expecting THEN");
  }

  #[test]
  fn condition_requires_a_relation() {
    let err = parse(b"IF 1 THEN ! 1 .", "t").unwrap_err();
    assert_eq!(err.to_string(), "error:1:unexpected THEN, expecting relation");
  }

  #[test]
  fn factor_requires_an_expression_opener() {
    let err = parse(b"! * 2 .", "t").unwrap_err();
    assert_eq!(err.to_string(), "error:1:unexpected *, expecting expression");
  }

  #[test]
  fn assignment_requires_becomes() {
    let err = parse(b"VAR x;\nx = 1 .", "t").unwrap_err();
    assert_eq!(err.to_string(), "error:2:unexpected =, expecting :=");
  }

  #[test]
  fn lone_expression_must_consume_all_input() {
    let err = parse_expression(b"1 + 2 .").unwrap_err();
    assert_eq!(err.to_string(), "error:1:unexpected ., expecting EOF");
  }

  #[test]
  fn numbers_keep_their_spelling() {
    let x = parse_expression(b"007").unwrap();
    match x {
      Expr::Number(n) => assert_eq!(n.value, "007"),
      other => panic!("unexpected node {other:?}"),
    }
  }

  #[test]
  fn identifiers_record_their_line() {
    let program = parse(b"VAR x;\n\nx := 1 .", "t").unwrap();
    match program.main.body {
      Some(Stmt::Assign { ref lhs, .. }) => {
        assert_eq!(lhs.name, "x");
        assert_eq!(lhs.line, 3);
      }
      ref other => panic!("unexpected body {other:?}"),
    }
  }
}
