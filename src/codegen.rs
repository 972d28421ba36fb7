//! Code generation: walk the AST and emit i386/NASM assembly text.
//!
//! The target model is a single-accumulator machine: `EAX` holds the current
//! expression value, temporaries go through the x86 stack, `EBP` is the frame
//! pointer, and every activation record carries a static link at `[EBP + 8]`
//! pointing at the lexical parent's frame. Name resolution and the kind
//! checks happen here, during the walk — the symbol table is built as blocks
//! are entered, so declaration errors carry the right source lines.
//!
//! The runtime supplies `SCANN`, `PRINTN`, `NEWLINE`, `EXIT` and the data
//! words `TRUE` (-1) and `FALSE` (0).

use crate::ast::{BinOp, Block, Cond, Expr, Program, RelOp, Sign, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::symtab::{ObjKind, SymTab};

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut gen = Gen::new();
  gen.header(&program.name);
  gen.prolog();
  gen.gen_main(&program.main)?;
  gen.epilog();
  Ok(gen.out)
}

const PROLOG: &str = "\nsection .text\nstart:                  ; tell linker entry point\n\n\t; call main program\n\tCALL MAIN\n\n\t; exit to operating system\n\tCALL EXIT\n\n; compiled code starts here\n;\n\n";

const EPILOG: &str = "\n; compiled code ends here\n;\n\n";

struct Gen {
  out: String,
  labelno: u32,
  /// Lexical level of the block being generated; 0 for MAIN.
  level: i32,
  symtab: SymTab,
}

impl Gen {
  fn new() -> Gen {
    Gen {
      out: String::new(),
      labelno: 0,
      level: 0,
      symtab: SymTab::new(),
    }
  }

  // ----- Emission helpers -----

  fn writeln(&mut self, s: &str) {
    self.out.push_str(s);
    self.out.push('\n');
  }

  /// Emit one instruction with the standard tab indentation.
  fn emitln(&mut self, s: &str) {
    self.out.push('\t');
    self.writeln(s);
  }

  fn new_label(&mut self) -> String {
    let label = format!("L{}", self.labelno);
    self.labelno += 1;
    label
  }

  fn post_label(&mut self, label: &str) {
    self.out.push_str(label);
    self.writeln(":");
  }

  fn header(&mut self, name: &str) {
    self.writeln(&format!("; program: \"{name}\""));
    self.out.push_str(
      ";\n; asm:   nasm\n; os:    darwin\n; arch:  386\n;\n\nglobal  start           ; must be declared for linker (ld)\n\n",
    );
  }

  fn prolog(&mut self) {
    self.out.push_str(PROLOG);
  }

  fn epilog(&mut self) {
    self.out.push_str(EPILOG);
  }

  // ----- Blocks and declarations -----

  fn gen_main(&mut self, block: &Block) -> CompileResult<()> {
    self.level = 0;
    self.gen_block("MAIN", block)?;
    self.alloc_static();
    Ok(())
  }

  /// Declare a block's names, emit its nested procedures, then its own
  /// body. Procedures come out before the enclosing block's code so every
  /// label is defined in a single pass.
  fn gen_block(&mut self, name: &str, block: &Block) -> CompileResult<()> {
    for decl in &block.consts {
      let ix =
        self
          .symtab
          .declare(&decl.name.name, ObjKind::Const, decl.name.line)?;
      let obj = self.symtab.obj_mut(ix);
      obj.level = self.level;
      obj.value = decl.value.value.clone();
    }
    for (slot, var) in block.vars.iter().enumerate() {
      let ix = self.symtab.declare(&var.name, ObjKind::Var, var.line)?;
      let obj = self.symtab.obj_mut(ix);
      obj.level = self.level;
      obj.pos = slot as i32 + 1;
    }
    for decl in &block.procs {
      self.level += 1;
      let ix =
        self
          .symtab
          .declare(&decl.name.name, ObjKind::Proc, decl.name.line)?;
      self.symtab.obj_mut(ix).level = self.level;
      self.symtab.open_scope();
      self.gen_block(&decl.name.name, &decl.block)?;
      let first = self.symtab.top_first();
      self.symtab.obj_mut(ix).dsc = first;
      self.symtab.close_scope();
      self.level -= 1;
    }

    // MAIN's variables live in __data, not on its frame.
    let nvar = if self.level == 0 { 0 } else { block.vars.len() };
    self.proc_prolog(name, nvar);
    if let Some(stmt) = &block.body {
      self.gen_stmt(stmt)?;
    }
    self.proc_epilog();
    Ok(())
  }

  fn proc_prolog(&mut self, name: &str, nvar: usize) {
    self.post_label(name);
    self.emitln("PUSH EBP");
    self.emitln("MOV EBP, ESP");
    self.emitln(&format!("SUB ESP, {}", 4 * nvar));
    self.out.push('\n');
  }

  fn proc_epilog(&mut self) {
    self.out.push('\n');
    self.emitln("MOV ESP, EBP");
    self.emitln("POP EBP");
    self.emitln("RET");
    self.out.push('\n');
  }

  /// Emit the universe's VAR objects as zero-initialized statics.
  fn alloc_static(&mut self) {
    self.out.push('\n');
    self.out.push('\n');
    self.writeln("section .data");
    let mut lines = Vec::new();
    let mut walk = self.symtab.first(self.symtab.universe());
    while let Some(ix) = walk {
      let obj = self.symtab.obj(ix);
      if obj.kind == ObjKind::Var {
        lines.push(format!("_{}: dd 0", obj.name));
      }
      walk = self.symtab.next_of(ix);
    }
    for line in lines {
      self.writeln(&line);
    }
  }

  // ----- Statements -----

  fn gen_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Assign { lhs, rhs } => {
        let ix = self.symtab.lookup(&lhs.name, lhs.line)?;
        self.gen_expr(rhs)?;
        let obj = self.symtab.obj(ix);
        if obj.kind != ObjKind::Var {
          return Err(CompileError::CannotAssign {
            lineno: lhs.line,
            name: obj.name.clone(),
            kind: obj.kind.to_string(),
          });
        }
        self.store_variable(ix);
      }

      Stmt::Call { proc } => {
        let ix = self.symtab.lookup(&proc.name, proc.line)?;
        let obj = self.symtab.obj(ix);
        if obj.kind != ObjKind::Proc {
          return Err(CompileError::CannotCall {
            lineno: proc.line,
            name: obj.name.clone(),
            kind: obj.kind.to_string(),
          });
        }
        self.call(ix);
      }

      Stmt::Begin { list } => {
        for stmt in list {
          self.gen_stmt(stmt)?;
        }
      }

      Stmt::If { cond, body } => {
        let l1 = self.new_label();
        self.gen_cond(cond)?;
        self.branch_false(&l1);
        if let Some(stmt) = body {
          self.gen_stmt(stmt)?;
        }
        self.post_label(&l1);
      }

      Stmt::While { cond, body } => {
        let l1 = self.new_label();
        let l2 = self.new_label();
        self.post_label(&l1);
        self.gen_cond(cond)?;
        self.branch_false(&l2);
        if let Some(stmt) = body {
          self.gen_stmt(stmt)?;
        }
        self.branch(&l1);
        self.post_label(&l2);
      }

      Stmt::Send { x } => {
        self.gen_expr(x)?;
        self.emitln("CALL PRINTN");
        self.emitln("CALL NEWLINE");
      }

      Stmt::Receive { name } => {
        self.emitln("CALL SCANN");
        let ix = self.symtab.lookup(&name.name, name.line)?;
        let obj = self.symtab.obj(ix);
        if obj.kind != ObjKind::Var {
          return Err(CompileError::CannotReceive {
            lineno: name.line,
            name: obj.name.clone(),
            kind: obj.kind.to_string(),
          });
        }
        self.store_variable(ix);
      }
    }
    Ok(())
  }

  // ----- Conditions -----

  /// Conditions leave EAX holding TRUE (-1) or FALSE (0).
  fn gen_cond(&mut self, cond: &Cond) -> CompileResult<()> {
    match cond {
      Cond::Odd { x } => {
        self.gen_expr(x)?;
        self.emitln("TEST EAX, 1");
        self.emitln("CMOVPO EAX, [TRUE]");
        self.emitln("CMOVPE EAX, [FALSE]");
      }
      Cond::Rel { x, op, y } => {
        self.gen_expr(x)?;
        self.emitln("PUSH EAX");
        self.gen_expr(y)?;
        self.emitln("POP EDX");
        self.emitln("CMP EDX, EAX");
        let (if_true, if_false) = match op {
          RelOp::Eql => ("CMOVE  EAX, [TRUE]", "CMOVNE EAX, [FALSE]"),
          RelOp::Neq => ("CMOVNE EAX, [TRUE]", "CMOVE  EAX, [FALSE]"),
          RelOp::Lss => ("CMOVL  EAX, [TRUE]", "CMOVGE EAX, [FALSE]"),
          RelOp::Leq => ("CMOVLE EAX, [TRUE]", "CMOVG  EAX, [FALSE]"),
          RelOp::Grt => ("CMOVG  EAX, [TRUE]", "CMOVLE EAX, [FALSE]"),
          RelOp::Geq => ("CMOVGE EAX, [TRUE]", "CMOVL  EAX, [FALSE]"),
        };
        self.emitln(if_true);
        self.emitln(if_false);
      }
    }
    Ok(())
  }

  fn branch(&mut self, label: &str) {
    self.emitln(&format!("JMP {label}"));
  }

  fn branch_false(&mut self, label: &str) {
    self.emitln("TEST EAX, -1");
    self.emitln(&format!("JE {label}"));
  }

  // ----- Expressions -----

  fn gen_expr(&mut self, x: &Expr) -> CompileResult<()> {
    match x {
      Expr::Number(number) => {
        let value = number.value.clone();
        self.load_constant(&value);
      }

      Expr::Ident(ident) => {
        let ix = self.symtab.lookup(&ident.name, ident.line)?;
        let obj = self.symtab.obj(ix);
        match obj.kind {
          ObjKind::Var => self.load_variable(ix),
          ObjKind::Const => {
            let value = obj.value.clone();
            self.load_constant(&value);
          }
          _ => {
            return Err(CompileError::NotAnOperand {
              lineno: ident.line,
              name: obj.name.clone(),
              kind: obj.kind.to_string(),
            });
          }
        }
      }

      Expr::Unary { op, x } => {
        self.gen_expr(x)?;
        if *op == Sign::Minus {
          self.emitln("NEG EAX");
        }
      }

      Expr::Binary { op, x, y } => {
        self.gen_expr(x)?;
        self.emitln("PUSH EAX");
        self.gen_expr(y)?;
        match op {
          BinOp::Add => {
            self.emitln("POP EDX");
            self.emitln("ADD EAX, EDX");
          }
          BinOp::Sub => {
            // The stack holds the left operand, so subtract the other way
            // around and flip the sign.
            self.emitln("POP EDX");
            self.emitln("SUB EAX, EDX");
            self.emitln("NEG EAX");
          }
          BinOp::Mul => {
            self.emitln("POP ECX");
            self.emitln("IMUL ECX");
          }
          BinOp::Div => {
            self.emitln("MOV ECX, EAX");
            self.emitln("POP EAX");
            self.emitln("XOR EDX, EDX");
            self.emitln("IDIV ECX");
          }
        }
      }
    }
    Ok(())
  }

  fn load_constant(&mut self, number: &str) {
    self.emitln(&format!("MOV EAX, {number}"));
  }

  // ----- Variable access and calls -----

  /// Load EAX from a static, local or non-local variable.
  fn load_variable(&mut self, ix: usize) {
    let obj = self.symtab.obj(ix);
    let (lev, offset, name) = (obj.level, 4 * obj.pos, obj.name.clone());
    if lev == 0 {
      self.emitln(&format!("MOV EAX, [_{name}]"));
    } else if lev == self.level {
      self.emitln(&format!("MOV EAX, [EBP - {offset}]"));
    } else {
      self.walk(self.level - lev);
      self.emitln(&format!("MOV EAX, [EBX - {offset}]"));
    }
  }

  /// Store EAX into a static, local or non-local variable.
  fn store_variable(&mut self, ix: usize) {
    let obj = self.symtab.obj(ix);
    let (lev, offset, name) = (obj.level, 4 * obj.pos, obj.name.clone());
    if lev == 0 {
      self.emitln(&format!("MOV [_{name}], EAX"));
    } else if lev == self.level {
      self.emitln(&format!("MOV [EBP - {offset}], EAX"));
    } else {
      self.walk(self.level - lev);
      self.emitln(&format!("MOV [EBX - {offset}], EAX"));
    }
  }

  /// Follow the static-link chain `n` frames up, leaving the target frame
  /// pointer in EBX.
  fn walk(&mut self, n: i32) {
    self.emitln("MOV EBX, [EBP + 8]");
    for _ in 1..n {
      self.emitln("MOV EBX, [EBX + 8]");
    }
  }

  /// Pass the callee's static link as the last argument, call, and reclaim
  /// the slot.
  fn call(&mut self, ix: usize) {
    let obj = self.symtab.obj(ix);
    let (lev, name) = (obj.level, obj.name.clone());
    if lev == self.level + 1 {
      // Direct child: our own frame is its lexical parent.
      self.emitln("PUSH EBP");
    } else if lev == self.level {
      // Peer (or self): forward our static link.
      self.emitln("PUSH dword [EBP + 8]");
    } else {
      // Ancestor or ancestor's sibling: walk up to the frame of the
      // callee's lexical parent.
      self.walk(self.level - lev);
      self.emitln("PUSH dword [EBX + 8]");
    }
    self.emitln(&format!("CALL {name}"));
    self.emitln("ADD ESP, 4");
  }
}
