//! Diagnostics shared by the compilation pipeline.
//!
//! The compiler is fail-fast: the first error aborts the run. Every fatal
//! condition renders as a single line of the form `error:<lineno>:<message>`,
//! which the driver writes to stderr before exiting with status 1.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum CompileError {
  #[snafu(display("error:{lineno}:illegal character '{ch}'"))]
  IllegalCharacter { lineno: u32, ch: char },

  #[snafu(display("error:{lineno}:unexpected {got}, expecting {want}"))]
  UnexpectedToken {
    lineno: u32,
    got: String,
    want: String,
  },

  #[snafu(display("error:{lineno}:duplicate identifier {name}"))]
  DuplicateIdentifier { lineno: u32, name: String },

  #[snafu(display("error:{lineno}:undefined identifier {name}"))]
  UndefinedIdentifier { lineno: u32, name: String },

  #[snafu(display("error:{lineno}:cannot assign to {name} (kind {kind})"))]
  CannotAssign {
    lineno: u32,
    name: String,
    kind: String,
  },

  #[snafu(display("error:{lineno}:cannot receive into {name} (kind {kind})"))]
  CannotReceive {
    lineno: u32,
    name: String,
    kind: String,
  },

  #[snafu(display("error:{lineno}:cannot call non-procedure {name} (kind {kind})"))]
  CannotCall {
    lineno: u32,
    name: String,
    kind: String,
  },

  #[snafu(display("error:{lineno}:cannot use {name} (kind {kind}) in expression"))]
  NotAnOperand {
    lineno: u32,
    name: String,
    kind: String,
  },
}

impl CompileError {
  /// Line number the diagnostic points at.
  pub fn lineno(&self) -> u32 {
    match self {
      CompileError::IllegalCharacter { lineno, .. }
      | CompileError::UnexpectedToken { lineno, .. }
      | CompileError::DuplicateIdentifier { lineno, .. }
      | CompileError::UndefinedIdentifier { lineno, .. }
      | CompileError::CannotAssign { lineno, .. }
      | CompileError::CannotReceive { lineno, .. }
      | CompileError::CannotCall { lineno, .. }
      | CompileError::NotAnOperand { lineno, .. } => *lineno,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_single_diagnostic_line() {
    let err = CompileError::DuplicateIdentifier {
      lineno: 3,
      name: "a".into(),
    };
    assert_eq!(err.to_string(), "error:3:duplicate identifier a");

    let err = CompileError::UnexpectedToken {
      lineno: 12,
      got: "END".into(),
      want: ";".into(),
    };
    assert_eq!(err.to_string(), "error:12:unexpected END, expecting ;");

    let err = CompileError::IllegalCharacter { lineno: 1, ch: '$' };
    assert_eq!(err.to_string(), "error:1:illegal character '$'");
  }

  #[test]
  fn exposes_line_number() {
    let err = CompileError::UndefinedIdentifier {
      lineno: 7,
      name: "x".into(),
    };
    assert_eq!(err.lineno(), 7);
  }
}
