//! A C99 compiler core: semantic analysis and x86-64 code emission.
//!
//! The crate covers the two middle stages of a small C compiler. The
//! [`analyze`] pass takes a parsed translation unit (an [`Ast`] produced by
//! an external parser), decorates every expression with a type, binds every
//! declaration to a symbol, evaluates constant expressions and initializer
//! layouts, and enforces the ISO C constraint catalog, accumulating
//! [`AnalysisError`]s rather than aborting. The backend
//! ([`build_asm::generate`] plus [`AsmFile::write_to`]) lowers a
//! machine-independent instruction stream ([`Air`]) into AT&T-syntax
//! assembly text for the System V x86-64 ABI.
//!
//! The stages in between — the preprocessor and parser in front, the AIR
//! producer in the middle, the assembler and linker behind — are external
//! collaborators. When analysis reports any non-warning error, the later
//! stages must not run.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::match_same_arms, clippy::module_name_repetitions,
  clippy::cast_sign_loss, clippy::cast_possible_wrap,
  clippy::wildcard_imports, clippy::missing_errors_doc,
  clippy::missing_panics_doc, clippy::must_use_candidate,
  clippy::enum_glob_use, clippy::too_many_lines)]

pub mod types;
pub mod symtab;
pub mod constexpr;
pub mod init;
pub mod analyze;
pub mod arch;
pub mod build_asm;
pub mod codegen;

use std::fmt;
use std::io;

pub use analyze::{analyze, Analysis};
pub use build_asm::{generate, AsmFile, LowerErr};
pub use types::air::Air;
pub use types::ast::Ast;
pub use types::ty::{CType, TypeTable};
pub use types::Span;
use symtab::{Namespace, ScopeId, Symbol, SymbolTable};
use types::ty::{Member, RecordKind, TyKind};

/// The diagnostic taxonomy. The message carries the detail; the kind is
/// what tooling dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  /// An operand, argument or initializer type violates a constraint.
  TypeMismatch,
  /// A lookup miss in the required name space.
  Undeclared,
  /// A duplicate declaration with an incompatible type, or a duplicate
  /// label within a function.
  Redeclaration,
  /// Any other ISO C constraint breach (storage-class misuse, bad
  /// function-definition shape, bitfield width out of range, flexible
  /// array member misplacement, ...).
  Constraint,
  /// An expression that must be foldable was not.
  ConstantRequired,
  /// An initializer list would write past the target object.
  OutOfBounds,
  /// A recognized but unsupported construct (VLAs, `long double`,
  /// bitfield storage, K&R declarators).
  Unsupported,
  /// An internal invariant failed; the pass aborts at this point.
  Internal,
}

/// One diagnostic from the analysis pass.
#[derive(Clone, Debug)]
pub struct AnalysisError {
  /// The source row the diagnostic points at.
  pub row: u32,
  /// The source column the diagnostic points at.
  pub col: u32,
  /// The diagnostic kind.
  pub kind: ErrorKind,
  /// The human-readable message.
  pub message: String,
  /// Whether this is a warning rather than an error.
  pub warning: bool,
}

impl AnalysisError {
  /// An error at the given source position.
  #[must_use] pub fn at(span: Span, kind: ErrorKind, message: impl Into<String>) -> Self {
    AnalysisError {
      row: span.row, col: span.col, kind,
      message: message.into(), warning: false,
    }
  }

  /// A warning at the given source position.
  #[must_use] pub fn warning(span: Span, message: impl Into<String>) -> Self {
    AnalysisError {
      row: span.row, col: span.col, kind: ErrorKind::Constraint,
      message: message.into(), warning: true,
    }
  }
}

impl fmt::Display for AnalysisError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}:{}] {}", self.row, self.col, self.message)
  }
}

/// Count the diagnostics in a list, optionally including warnings.
#[must_use] pub fn error_count(errors: &[AnalysisError], include_warnings: bool) -> usize {
  errors.iter().filter(|e| include_warnings || !e.warning).count()
}

/// Report every diagnostic through the logging facade.
pub fn dump_errors(errors: &[AnalysisError]) {
  for e in errors {
    if e.warning {
      log::warn!("[{}:{}] {}", e.row, e.col, e.message);
    } else {
      log::error!("[{}:{}] {}", e.row, e.col, e.message);
    }
  }
}

/// Install the runtime prelude into a fresh type table and symbol table:
/// the `__ecc_va_list` structure that the varargs intrinsics check their
/// first argument against.
pub fn install_prelude(tt: &mut TypeTable, st: &mut SymbolTable) {
  let void_ptr = CType::new(TyKind::Void).pointer_to();
  let rec = tt.declare_record(RecordKind::Struct, Some("__ecc_va_list".into()));
  tt.records[rec].members = Some(vec![
    Member { name: "gp_offset".into(), ty: TyKind::UInt.into(), bit_width: None },
    Member { name: "fp_offset".into(), ty: TyKind::UInt.into(), bit_width: None },
    Member { name: "overflow_arg_area".into(), ty: void_ptr.clone(), bit_width: None },
    Member { name: "reg_save_area".into(), ty: void_ptr, bit_width: None },
  ]);
  st.add(Symbol::new("__ecc_va_list", CType::new(TyKind::Struct(rec)),
    Namespace::Tag, None, ScopeId::FILE));
}

/// Analyze a translation unit against a fresh prelude-initialized
/// environment.
#[must_use] pub fn analyze_unit(ast: &Ast, root: types::ast::NodeId) -> Analysis {
  let mut tt = TypeTable::default();
  let mut st = SymbolTable::new();
  install_prelude(&mut tt, &mut st);
  analyze(ast, root, tt, st)
}

/// A backend failure: either lowering hit an internal invariant, or the
/// output sink failed.
#[derive(Debug)]
pub enum EmitError {
  /// Lowering failed.
  Lower(LowerErr),
  /// Writing the assembly text failed.
  Io(io::Error),
}

impl fmt::Display for EmitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EmitError::Lower(e) => e.fmt(f),
      EmitError::Io(e) => e.fmt(f),
    }
  }
}

impl std::error::Error for EmitError {}

impl From<LowerErr> for EmitError {
  fn from(e: LowerErr) -> Self { EmitError::Lower(e) }
}

impl From<io::Error> for EmitError {
  fn from(e: io::Error) -> Self { EmitError::Io(e) }
}

/// Lower an AIR unit and write the resulting assembly text.
pub fn emit_assembly(air: &Air, ast: &Ast, tt: &TypeTable, st: &mut SymbolTable,
    w: &mut impl io::Write) -> Result<(), EmitError> {
  let file = generate(air, ast, tt, st)?;
  file.write_to(w)?;
  Ok(())
}
