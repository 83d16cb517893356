//! The machine-independent intermediate representation ("AIR") consumed by
//! the backend.
//!
//! AIR is three-address code over operands that carry their C types. By the
//! time the backend sees it, registers have been localized onto physical
//! x86-64 registers, modulo ops have been rewritten as divisions, and the
//! marker opcodes (`Blip`, `Phi`, the varargs trio, sequence points) are
//! inert. Instructions are owned by their containing routine and live until
//! the backend has consumed them.

use arrayvec::ArrayVec;
use crate::arch::PReg;
use crate::symtab::{Reloc, SymId};
use crate::types::ty::CType;

/// An AIR opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AirOp {
  /// Load a value: `ops[0] <- ops[1]`.
  Load,
  /// Store a value: `ops[0] <- ops[1]` (same lowering as [`Load`](Self::Load)).
  Assign,
  /// Load the address of `ops[1]` into `ops[0]`.
  LoadAddr,
  /// Call `ops[1]`; `ops[0]` receives the result (register-allocated by the
  /// producer).
  FuncCall,
  /// No operation.
  Nop,
  /// Bring a variable into existence so it gets a stack slot.
  Declare,
  /// Return from the routine.
  Return,
  /// `ops[0] <- ops[1] + ops[2]`
  Add,
  /// `ops[0] <- ops[1] - ops[2]`
  Subtract,
  /// `ops[0] <- ops[1] * ops[2]`
  Multiply,
  /// `ops[0] <- ops[1] / ops[2]`
  Divide,
  /// Remainder; rewritten to [`Divide`](Self::Divide) before the backend.
  Modulo,
  /// `ops[0] <- ops[1] & ops[2]`
  And,
  /// `ops[0] <- ops[1] ^ ops[2]`
  Xor,
  /// `ops[0] <- ops[1] | ops[2]`
  Or,
  /// `ops[0] <- ops[1] << ops[2]`
  ShiftLeft,
  /// `ops[0] <- ops[1] >> ops[2]` (logical)
  ShiftRight,
  /// `ops[0] <- ops[1] >> ops[2]` (arithmetic)
  SignedShiftRight,
  /// In-place `ops[0] += ops[1]`.
  DirectAdd,
  /// In-place `ops[0] -= ops[1]`.
  DirectSubtract,
  /// In-place `ops[0] *= ops[1]`.
  DirectMultiply,
  /// In-place `ops[0] /= ops[1]`.
  DirectDivide,
  /// In-place remainder; rewritten before the backend.
  DirectModulo,
  /// In-place `ops[0] &= ops[1]`.
  DirectAnd,
  /// In-place `ops[0] ^= ops[1]`.
  DirectXor,
  /// In-place `ops[0] |= ops[1]`.
  DirectOr,
  /// In-place `ops[0] <<= ops[1]`.
  DirectShiftLeft,
  /// In-place `ops[0] >>= ops[1]` (logical).
  DirectShiftRight,
  /// In-place `ops[0] >>= ops[1]` (arithmetic).
  DirectSignedShiftRight,
  /// `ops[0] <- -ops[1]`
  Negate,
  /// `ops[0] <- !ops[1]`
  Not,
  /// `ops[0] <- +ops[1]` (a plain move)
  Posate,
  /// `ops[0] <- ~ops[1]`
  Complement,
  /// `ops[0] <- ops[1] <= ops[2]`
  LessEqual,
  /// `ops[0] <- ops[1] < ops[2]`
  Less,
  /// `ops[0] <- ops[1] >= ops[2]`
  GreaterEqual,
  /// `ops[0] <- ops[1] > ops[2]`
  Greater,
  /// `ops[0] <- ops[1] == ops[2]`
  Equal,
  /// `ops[0] <- ops[1] != ops[2]`
  Inequal,
  /// Sign-extend `ops[1]` into `ops[0]`.
  Sext,
  /// Zero-extend `ops[1]` into `ops[0]`.
  Zext,
  /// `float` to `double`.
  S2D,
  /// `double` to `float`.
  D2S,
  /// `float` to signed integer.
  S2Si,
  /// `double` to signed integer.
  D2Si,
  /// Signed integer to `float`.
  Si2S,
  /// Signed integer to `double`.
  Si2D,
  /// `float` to unsigned integer.
  S2Ui,
  /// `double` to unsigned integer.
  D2Ui,
  /// Unsigned integer to `float`.
  Ui2S,
  /// Unsigned integer to `double`.
  Ui2D,
  /// Jump to `ops[0]` if `ops[1]` is zero.
  Jz,
  /// Jump to `ops[0]` if `ops[1]` is nonzero.
  Jnz,
  /// Unconditional jump to `ops[0]`.
  Jmp,
  /// Bind the label `ops[0]` here.
  Label,
  /// Push `ops[0]` onto the stack.
  Push,
  /// `rep stosb` fill; registers are set up by preceding instructions.
  Memset,
  /// A raw system call; argument registers are set up by preceding
  /// instructions.
  LSyscall,
  /// Marker: a register came into existence (no code).
  DeclareRegister,
  /// Marker used by earlier passes (no code).
  Blip,
  /// SSA join; deleted before the backend.
  Phi,
  /// Varargs access; rewritten before the backend.
  VaArg,
  /// Varargs setup; rewritten before the backend.
  VaStart,
  /// Varargs teardown; rewritten before the backend.
  VaEnd,
  /// A sequence point marker (no code).
  SequencePoint,
}

/// The payload of an AIR operand.
#[derive(Clone, Debug, PartialEq)]
pub enum AirOperandKind {
  /// A (localized) register.
  Reg(PReg),
  /// A memory location through a register: `disp(base, index, scale)`.
  IndirectReg {
    /// The base register.
    base: PReg,
    /// The optional index register.
    index: Option<PReg>,
    /// The index scale factor.
    scale: i64,
    /// The byte displacement.
    disp: i64,
  },
  /// A symbol's own location.
  Sym(SymId),
  /// A memory location at a byte offset from a symbol.
  IndirectSym {
    /// The symbol.
    sym: SymId,
    /// The byte displacement.
    disp: i64,
  },
  /// An integer immediate.
  ImmInt(u64),
  /// A floating constant; localized to rodata symbols before the backend,
  /// so reaching the backend with one is an internal error.
  FloatConst(f64),
  /// An intra-routine label `.L<disambiguator><id>`.
  Label {
    /// The label family character.
    disambiguator: char,
    /// The label number.
    id: u64,
  },
  /// A type operand (used by markers only).
  Type,
}

/// An AIR operand: a payload plus the C type it represents.
#[derive(Clone, Debug, PartialEq)]
pub struct AirOperand {
  /// The operand payload.
  pub kind: AirOperandKind,
  /// The C type of the value this operand names.
  pub ty: CType,
}

impl AirOperand {
  /// An operand of the given kind and type.
  #[must_use] pub fn new(kind: AirOperandKind, ty: CType) -> Self { Self { kind, ty } }

  /// A register operand.
  #[must_use] pub fn reg(r: PReg, ty: CType) -> Self {
    Self::new(AirOperandKind::Reg(r), ty)
  }

  /// A symbol operand.
  #[must_use] pub fn sym(sym: SymId, ty: CType) -> Self {
    Self::new(AirOperandKind::Sym(sym), ty)
  }

  /// An integer immediate operand.
  #[must_use] pub fn imm(v: u64, ty: CType) -> Self {
    Self::new(AirOperandKind::ImmInt(v), ty)
  }

  /// A label operand.
  #[must_use] pub fn label(disambiguator: char, id: u64, ty: CType) -> Self {
    Self::new(AirOperandKind::Label { disambiguator, id }, ty)
  }
}

/// One AIR instruction: an opcode, up to three operands, and the C type of
/// the result.
#[derive(Clone, Debug)]
pub struct AirInsn {
  /// The opcode.
  pub op: AirOp,
  /// The operands; `ops[0]` is the destination where one exists.
  pub ops: ArrayVec<AirOperand, 3>,
  /// The result type.
  pub ty: CType,
}

impl AirInsn {
  /// An instruction with no operands.
  #[must_use] pub fn new(op: AirOp, ty: CType) -> Self {
    Self { op, ops: ArrayVec::new(), ty }
  }

  /// An instruction with the given operands.
  #[must_use] pub fn with_ops(op: AirOp, ty: CType,
      ops: impl IntoIterator<Item = AirOperand>) -> Self {
    Self { op, ops: ops.into_iter().collect(), ty }
  }
}

/// One routine in AIR form.
#[derive(Clone, Debug)]
pub struct AirRoutine {
  /// The routine's symbol.
  pub sym: SymId,
  /// The instruction stream.
  pub insns: Vec<AirInsn>,
  /// Whether the routine takes variadic arguments; the backend reserves
  /// and fills the System V register save area when set.
  pub uses_varargs: bool,
}

/// One static data object in AIR form.
#[derive(Clone, Debug)]
pub struct AirData {
  /// The object's symbol.
  pub sym: SymId,
  /// The initializer image.
  pub bytes: Vec<u8>,
  /// Relocations into the image.
  pub relocs: Vec<Reloc>,
  /// Whether the object belongs in `.rodata`.
  pub readonly: bool,
}

/// A whole translation unit in AIR form: the backend's input.
#[derive(Clone, Debug, Default)]
pub struct Air {
  /// The routines, in emission order.
  pub routines: Vec<AirRoutine>,
  /// Writable data objects.
  pub data: Vec<AirData>,
  /// Read-only data objects.
  pub rodata: Vec<AirData>,
}
