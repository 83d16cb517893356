//! The x86-64 model: registers, operand and instruction representations,
//! and AT&T-syntax printing.
//!
//! Instruction printing follows the System V assembler conventions: integer
//! ALU and move instructions take a `b`/`w`/`l`/`q` size suffix, while SSE
//! instructions, `lea`, jumps, `call`, `leave`, `ret`, `nop`, the `setcc`
//! family and `syscall` do not. Registers print under their size-specific
//! names, with per-operand size overrides for the extension and conversion
//! instructions.

use std::fmt::{self, Display, Write as _};
use std::str::FromStr;
use bitflags::bitflags;
use itertools::Itertools;
use crate::types::ty::CType;

/// A physical x86-64 register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum PReg {
  Rax, Rbx, Rcx, Rdx, Rsi, Rdi, Rbp, Rsp,
  R8, R9, R10, R11, R12, R13, R14, R15,
  Xmm0, Xmm1, Xmm2, Xmm3, Xmm4, Xmm5, Xmm6, Xmm7,
}

/// All registers, in encoding order.
pub const ALL_REGS: [PReg; 24] = [
  PReg::Rax, PReg::Rbx, PReg::Rcx, PReg::Rdx, PReg::Rsi, PReg::Rdi,
  PReg::Rbp, PReg::Rsp, PReg::R8, PReg::R9, PReg::R10, PReg::R11,
  PReg::R12, PReg::R13, PReg::R14, PReg::R15,
  PReg::Xmm0, PReg::Xmm1, PReg::Xmm2, PReg::Xmm3, PReg::Xmm4, PReg::Xmm5,
  PReg::Xmm6, PReg::Xmm7,
];

const BYTE_NAMES: [&str; 16] = [
  "al", "bl", "cl", "dl", "sil", "dil", "bpl", "spl",
  "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b", "r15b",
];
const WORD_NAMES: [&str; 16] = [
  "ax", "bx", "cx", "dx", "si", "di", "bp", "sp",
  "r8w", "r9w", "r10w", "r11w", "r12w", "r13w", "r14w", "r15w",
];
const DWORD_NAMES: [&str; 16] = [
  "eax", "ebx", "ecx", "edx", "esi", "edi", "ebp", "esp",
  "r8d", "r9d", "r10d", "r11d", "r12d", "r13d", "r14d", "r15d",
];
const QWORD_NAMES: [&str; 16] = [
  "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp",
  "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];
const SSE_NAMES: [&str; 8] = [
  "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7",
];

impl PReg {
  /// Whether this is a general-purpose integer register.
  #[must_use] pub fn is_integer(self) -> bool { (self as usize) < 16 }

  /// Whether this is an SSE register.
  #[must_use] pub fn is_sse(self) -> bool { !self.is_integer() }

  /// The register's name at the given operand size (without the `%`).
  #[must_use] pub fn name(self, size: OpSize) -> &'static str {
    let i = self as usize;
    if self.is_sse() { return SSE_NAMES[i - 16] }
    match size {
      OpSize::Byte => BYTE_NAMES[i],
      OpSize::Word => WORD_NAMES[i],
      OpSize::Dword => DWORD_NAMES[i],
      OpSize::Qword => QWORD_NAMES[i],
    }
  }

  /// Look a register up by any of its size names.
  #[must_use] pub fn from_name(name: &str) -> Option<(PReg, OpSize)> {
    for (i, n) in SSE_NAMES.iter().enumerate() {
      if *n == name { return Some((ALL_REGS[i + 16], OpSize::Qword)) }
    }
    for (names, size) in [
      (&QWORD_NAMES, OpSize::Qword), (&DWORD_NAMES, OpSize::Dword),
      (&WORD_NAMES, OpSize::Word), (&BYTE_NAMES, OpSize::Byte),
    ] {
      if let Some(i) = names.iter().position(|n| *n == name) {
        return Some((ALL_REGS[i], size))
      }
    }
    None
  }
}

bitflags! {
  /// Which callee-saved registers a routine writes; the prologue pushes and
  /// the epilogue pops exactly this set.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
  pub struct Nonvolatiles: u16 {
    /// `%rbx`
    const RBX = 1;
    /// `%r12`
    const R12 = 2;
    /// `%r13`
    const R13 = 4;
    /// `%r14`
    const R14 = 8;
    /// `%r15`
    const R15 = 16;
  }
}

/// The nonvolatile registers in push order, with their flags.
pub const NONVOLATILE_REGS: [(Nonvolatiles, PReg); 5] = [
  (Nonvolatiles::RBX, PReg::Rbx),
  (Nonvolatiles::R12, PReg::R12),
  (Nonvolatiles::R13, PReg::R13),
  (Nonvolatiles::R14, PReg::R14),
  (Nonvolatiles::R15, PReg::R15),
];

impl Nonvolatiles {
  /// The flag for a register, if it is callee-saved (besides `%rbp`).
  #[must_use] pub fn of(reg: PReg) -> Option<Nonvolatiles> {
    NONVOLATILE_REGS.iter().find(|(_, r)| *r == reg).map(|(f, _)| *f)
  }
}

/// An operand size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpSize {
  /// 1 byte, suffix `b`.
  Byte,
  /// 2 bytes, suffix `w`.
  Word,
  /// 4 bytes, suffix `l`.
  Dword,
  /// 8 bytes, suffix `q`.
  Qword,
}

impl OpSize {
  /// The instruction suffix character.
  #[must_use] pub fn suffix(self) -> char {
    match self {
      OpSize::Byte => 'b',
      OpSize::Word => 'w',
      OpSize::Dword => 'l',
      OpSize::Qword => 'q',
    }
  }

  /// The operand size of a C type, by its storage size. Aggregates and
  /// anything else larger than 8 bytes are manipulated through pointers
  /// and use the full width.
  #[must_use] pub fn of_type(ty: &CType, tt: &crate::types::ty::TypeTable) -> OpSize {
    match ty.size(tt) {
      Some(1) => OpSize::Byte,
      Some(2) => OpSize::Word,
      Some(4) => OpSize::Dword,
      _ => OpSize::Qword,
    }
  }
}

/// Which operands an instruction kind writes.
pub const WRITES_OP1: u8 = 0x01;
/// See [`WRITES_OP1`].
pub const WRITES_OP2: u8 = 0x02;

/// An x86 instruction mnemonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum InstKind {
  Label, Leave, Ret, Nop, Syscall, Call,
  Jmp, Je, Jne, Jnb, Js,
  Sete, Setne, Setle, Setl, Setge, Setg, Seta, Setnb, Setp, Setnp,
  Push, Neg,
  Mov, Movss, Movsd, Movsx, Movzx, Lea,
  And, Or, Cmp, Not,
  Add, Addss, Addsd, Sub, Subss, Subsd,
  Mul, Imul, Mulss, Mulsd, Div, Idiv, Divss, Divsd,
  Xor, Xorps, Xorpd,
  Cvtsd2ss, Cvtss2sd, Cvtsi2ss, Cvtsi2sd, Cvttss2si, Cvttsd2si,
  Comiss, Comisd, Ucomiss, Ucomisd,
  Test, Ptest, RepStosb,
  Shl, Shr, Sar, Ror,
}

impl InstKind {
  /// Whether the mnemonic takes a size suffix when printed. Integer
  /// ALU/move instructions and the int↔SSE conversions do; SSE arithmetic,
  /// `lea`, control flow, `setcc` and the no-operand instructions do not.
  #[must_use] pub fn uses_suffix(self) -> bool {
    use InstKind::*;
    matches!(self,
      Push | Neg | Mov | And | Or | Cmp | Not | Add | Sub | Mul | Imul |
      Div | Idiv | Xor | Shl | Shr | Sar | Ror | Test |
      Cvttss2si | Cvttsd2si | Cvtsi2ss | Cvtsi2sd)
  }

  /// The write mask of the mnemonic: which of its operands it modifies.
  #[must_use] pub fn writes(self) -> u8 {
    use InstKind::*;
    match self {
      Label | Call | Push | Leave | Ret | Jmp | Je | Jne | Jnb | Js |
      Cmp | Comiss | Comisd | Ucomiss | Ucomisd | Nop | Test | Ptest |
      RepStosb | Syscall => 0,
      Sete | Setne | Setle | Setl | Setge | Setg | Seta | Setnb | Setp |
      Setnp | Not | Neg | Mul => WRITES_OP1,
      Lea | And | Or | Xor | Mov | Movzx | Movsx | Add | Sub | Imul |
      Div | Idiv | Shl | Shr | Sar | Ror | Movss | Movsd | Addss | Addsd |
      Subss | Subsd | Mulss | Mulsd | Divss | Divsd | Xorps | Xorpd |
      Cvtsd2ss | Cvtss2sd | Cvtsi2ss | Cvtsi2sd | Cvttss2si | Cvttsd2si =>
        WRITES_OP2,
    }
  }

  /// The bare mnemonic text.
  #[must_use] pub fn mnemonic(self) -> &'static str {
    use InstKind::*;
    match self {
      Label => "", Leave => "leave", Ret => "ret", Nop => "nop",
      Syscall => "syscall", Call => "call",
      Jmp => "jmp", Je => "je", Jne => "jne", Jnb => "jnb", Js => "js",
      Sete => "sete", Setne => "setne", Setle => "setle", Setl => "setl",
      Setge => "setge", Setg => "setg", Seta => "seta", Setnb => "setnb",
      Setp => "setp", Setnp => "setnp",
      Push => "push", Neg => "neg",
      Mov => "mov", Movss => "movss", Movsd => "movsd", Movsx => "movsx",
      Movzx => "movzx", Lea => "lea",
      And => "and", Or => "or", Cmp => "cmp", Not => "not",
      Add => "add", Addss => "addss", Addsd => "addsd",
      Sub => "sub", Subss => "subss", Subsd => "subsd",
      Mul => "mul", Imul => "imul", Mulss => "mulss", Mulsd => "mulsd",
      Div => "div", Idiv => "idiv", Divss => "divss", Divsd => "divsd",
      Xor => "xor", Xorps => "xorps", Xorpd => "xorpd",
      Cvtsd2ss => "cvtsd2ss", Cvtss2sd => "cvtss2sd",
      Cvtsi2ss => "cvtsi2ss", Cvtsi2sd => "cvtsi2sd",
      Cvttss2si => "cvttss2si", Cvttsd2si => "cvttsd2si",
      Comiss => "comiss", Comisd => "comisd",
      Ucomiss => "ucomiss", Ucomisd => "ucomisd",
      Test => "test", Ptest => "ptest", RepStosb => "rep stosb",
      Shl => "shl", Shr => "shr", Sar => "sar", Ror => "ror",
    }
  }
}

/// The payload of an x86 operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperandKind {
  /// A register.
  Reg(PReg),
  /// An indirect call target: `*%reg`.
  PtrReg(PReg),
  /// Memory at `offset(%reg)`.
  Deref {
    /// The address register.
    reg: PReg,
    /// The byte displacement.
    offset: i64,
  },
  /// Memory at `offset(%base, %index, scale)`.
  Indexed {
    /// The base register, if any.
    base: Option<PReg>,
    /// The index register, if any.
    index: Option<PReg>,
    /// The scale factor.
    scale: i64,
    /// The byte displacement.
    offset: i64,
  },
  /// A bare label (jump targets and label definitions).
  Lbl(String),
  /// A RIP-relative label reference: `label±offset(%rip)`.
  LblRef {
    /// The label name.
    label: String,
    /// The byte offset.
    offset: i64,
  },
  /// An immediate: `$value`.
  Imm(u64),
}

/// An x86 operand: a payload plus an optional per-operand size override,
/// used by extensions and conversions whose two operands print at
/// different sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operand {
  /// The operand payload.
  pub kind: OperandKind,
  /// A size override; when absent the instruction's size applies.
  pub size: Option<OpSize>,
}

impl Operand {
  /// An operand with no size override.
  #[must_use] pub fn new(kind: OperandKind) -> Self { Self { kind, size: None } }

  /// A register operand.
  #[must_use] pub fn reg(r: PReg) -> Self { Self::new(OperandKind::Reg(r)) }

  /// An indirect call-target operand.
  #[must_use] pub fn ptr_reg(r: PReg) -> Self { Self::new(OperandKind::PtrReg(r)) }

  /// A `offset(%reg)` memory operand.
  #[must_use] pub fn deref(reg: PReg, offset: i64) -> Self {
    Self::new(OperandKind::Deref { reg, offset })
  }

  /// A scaled-index memory operand.
  #[must_use] pub fn indexed(base: Option<PReg>, index: Option<PReg>, scale: i64,
      offset: i64) -> Self {
    Self::new(OperandKind::Indexed { base, index, scale, offset })
  }

  /// A bare label operand.
  #[must_use] pub fn label(l: impl Into<String>) -> Self {
    Self::new(OperandKind::Lbl(l.into()))
  }

  /// A RIP-relative label reference.
  #[must_use] pub fn label_ref(l: impl Into<String>, offset: i64) -> Self {
    Self::new(OperandKind::LblRef { label: l.into(), offset })
  }

  /// An immediate operand.
  #[must_use] pub fn imm(v: u64) -> Self { Self::new(OperandKind::Imm(v)) }

  /// Give the operand an explicit size.
  #[must_use] pub fn sized(mut self, size: OpSize) -> Self {
    self.size = Some(size);
    self
  }

  /// Render the operand at the given default size.
  pub fn write(&self, size: OpSize, f: &mut impl fmt::Write) -> fmt::Result {
    let size = self.size.unwrap_or(size);
    match &self.kind {
      OperandKind::Reg(r) => write!(f, "%{}", r.name(size)),
      OperandKind::PtrReg(r) => write!(f, "*%{}", r.name(size)),
      OperandKind::Deref { reg, offset } => {
        if *offset != 0 { write!(f, "{offset}")? }
        write!(f, "(%{})", reg.name(OpSize::Qword))
      }
      OperandKind::Indexed { base, index, scale, offset } => {
        if *offset != 0 { write!(f, "{offset}")? }
        f.write_char('(')?;
        if let Some(b) = base { write!(f, "%{}", b.name(OpSize::Qword))? }
        f.write_str(", ")?;
        if let Some(i) = index { write!(f, "%{}", i.name(OpSize::Qword))? }
        write!(f, ", {scale})")
      }
      OperandKind::Lbl(l) => f.write_str(l),
      OperandKind::LblRef { label, offset } => {
        if *offset > 0 {
          write!(f, "{label}+{offset}(%rip)")
        } else if *offset < 0 {
          write!(f, "{label}-{}(%rip)", offset.unsigned_abs())
        } else {
          write!(f, "{label}(%rip)")
        }
      }
      OperandKind::Imm(v) => write!(f, "${v}"),
    }
  }
}

impl Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.write(OpSize::Qword, f)
  }
}

/// The error returned by [`Operand::from_str`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOperandError(String);

impl Display for ParseOperandError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "unparseable operand: {}", self.0)
  }
}

impl std::error::Error for ParseOperandError {}

impl FromStr for Operand {
  type Err = ParseOperandError;

  /// Parse an operand back from its printed form, insensitive to
  /// whitespace. The inverse of [`Operand::write`] up to the size override
  /// (registers parse with the size their name implies).
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let err = || ParseOperandError(s.clone());
    let reg = |name: &str| PReg::from_name(name).ok_or_else(err);
    if let Some(v) = s.strip_prefix('$') {
      return Ok(Operand::imm(v.parse().map_err(|_| err())?))
    }
    if let Some(name) = s.strip_prefix("*%") {
      let (r, sz) = reg(name)?;
      return Ok(Operand::ptr_reg(r).sized(sz))
    }
    if let Some(name) = s.strip_prefix('%') {
      let (r, sz) = reg(name)?;
      return Ok(Operand::reg(r).sized(sz))
    }
    if let Some(open) = s.find('(') {
      let close = s.rfind(')').ok_or_else(err)?;
      let (head, inner) = (&s[..open], &s[open + 1..close]);
      if inner == "%rip" {
        // label, label+off, label-off
        if let Some(plus) = head.rfind('+') {
          let off: i64 = head[plus + 1..].parse().map_err(|_| err())?;
          return Ok(Operand::label_ref(&head[..plus], off))
        }
        if let Some(minus) = head.rfind('-').filter(|&i| i > 0) {
          let off: i64 = head[minus + 1..].parse().map_err(|_| err())?;
          return Ok(Operand::label_ref(&head[..minus], -off))
        }
        return Ok(Operand::label_ref(head, 0))
      }
      let offset: i64 = if head.is_empty() { 0 } else {
        head.parse().map_err(|_| err())?
      };
      let parts: Vec<&str> = inner.split(',').collect();
      return match parts.as_slice() {
        [r] => {
          let (r, _) = reg(r.strip_prefix('%').ok_or_else(err)?)?;
          Ok(Operand::deref(r, offset))
        }
        [b, i, scale] => {
          let parse_reg = |x: &str| -> Result<Option<PReg>, ParseOperandError> {
            if x.is_empty() { return Ok(None) }
            Ok(Some(reg(x.strip_prefix('%').ok_or_else(err)?)?.0))
          };
          Ok(Operand::indexed(parse_reg(b)?, parse_reg(i)?,
            scale.parse().map_err(|_| err())?, offset))
        }
        _ => Err(err()),
      }
    }
    if s.is_empty() { return Err(err()) }
    Ok(Operand::label(s))
  }
}

/// One x86 instruction.
#[derive(Clone, Debug)]
pub struct Inst {
  /// The mnemonic.
  pub kind: InstKind,
  /// The instruction's operand size (drives the suffix and default
  /// register names).
  pub size: OpSize,
  /// The first operand (the AT&T source for two-operand forms).
  pub op1: Option<Operand>,
  /// The second operand (the AT&T destination for two-operand forms).
  pub op2: Option<Operand>,
}

impl Inst {
  /// A bare instruction.
  #[must_use] pub fn new(kind: InstKind) -> Self {
    Inst { kind, size: OpSize::Qword, op1: None, op2: None }
  }

  /// Set the size.
  #[must_use] pub fn sized(mut self, size: OpSize) -> Self {
    self.size = size;
    self
  }

  /// Set the first operand.
  #[must_use] pub fn one(mut self, op: Operand) -> Self {
    self.op1 = Some(op);
    self
  }

  /// Set both operands (AT&T order: source, destination).
  #[must_use] pub fn two(mut self, src: Operand, dst: Operand) -> Self {
    self.op1 = Some(src);
    self.op2 = Some(dst);
    self
  }

  /// `xorq %r, %r`: the idiomatic register clear.
  #[must_use] pub fn clear(reg: PReg) -> Self {
    Inst::new(InstKind::Xor).two(Operand::reg(reg), Operand::reg(reg))
  }

  /// The registers this instruction writes.
  pub fn written_regs(&self) -> impl Iterator<Item = PReg> + '_ {
    let writes = self.kind.writes();
    [(&self.op1, WRITES_OP1), (&self.op2, WRITES_OP2)].into_iter()
      .filter_map(move |(op, bit)| match op {
        Some(Operand { kind: OperandKind::Reg(r), .. }) if writes & bit != 0 =>
          Some(*r),
        _ => None,
      })
  }
}

impl Display for Inst {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    const INDENT: &str = "    ";
    use InstKind::*;
    if self.kind == Label {
      if let Some(Operand { kind: OperandKind::Lbl(l), .. }) = &self.op1 {
        return write!(f, "{l}:")
      }
      return Ok(())
    }
    write!(f, "{INDENT}{}", self.kind.mnemonic())?;
    if self.kind.uses_suffix() {
      f.write_char(self.size.suffix())?;
    }
    match self.kind {
      Leave | Ret | Nop | Syscall | RepStosb => Ok(()),
      Call | Jmp | Je | Jne | Jnb | Js => {
        f.write_char(' ')?;
        self.op1.as_ref().expect("jump target").write(OpSize::Qword, f)
      }
      Sete | Setne | Setle | Setl | Setge | Setg | Seta | Setnb | Setp | Setnp => {
        f.write_char(' ')?;
        self.op1.as_ref().expect("setcc target").write(OpSize::Byte, f)
      }
      Shl | Shr | Sar | Ror => {
        // the count prints at byte size (an immediate or %cl)
        f.write_char(' ')?;
        self.op1.as_ref().expect("shift count").write(OpSize::Byte, f)?;
        f.write_str(", ")?;
        self.op2.as_ref().expect("shift target").write(self.size, f)
      }
      _ => {
        if self.op1.is_none() && self.op2.is_none() { return Ok(()) }
        f.write_char(' ')?;
        let ops = [&self.op1, &self.op2].into_iter().flatten();
        write!(f, "{}", ops.format_with(", ", |op, g| {
          let mut s = String::new();
          op.write(self.size, &mut s).expect("string write");
          g(&s)
        }))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn register_names_by_size() {
    assert_eq!(PReg::Rax.name(OpSize::Byte), "al");
    assert_eq!(PReg::Rax.name(OpSize::Dword), "eax");
    assert_eq!(PReg::R12.name(OpSize::Word), "r12w");
    assert_eq!(PReg::Xmm3.name(OpSize::Qword), "xmm3");
    assert!(PReg::R15.is_integer());
    assert!(PReg::Xmm0.is_sse());
  }

  #[test]
  fn operand_printing_round_trips() {
    let ops = [
      Operand::reg(PReg::Rax).sized(OpSize::Qword),
      Operand::reg(PReg::Rcx).sized(OpSize::Dword),
      Operand::ptr_reg(PReg::Rbx).sized(OpSize::Qword),
      Operand::deref(PReg::Rbp, -24),
      Operand::deref(PReg::Rsp, 0),
      Operand::indexed(Some(PReg::Rax), Some(PReg::Rdx), 8, 16),
      Operand::indexed(None, Some(PReg::Rdx), 4, -4),
      Operand::label(".LGEN3"),
      Operand::label_ref("x", 0),
      Operand::label_ref("x", 8),
      Operand::label_ref("x", -8),
      Operand::imm(42),
    ];
    for op in ops {
      let mut s = String::new();
      op.write(op.size.unwrap_or(OpSize::Qword), &mut s).unwrap();
      let parsed: Operand = s.parse().unwrap_or_else(|e| panic!("{s}: {e}"));
      assert_eq!(parsed.kind, op.kind, "round-trip failed for {s}");
      let spaced = s.replace(',', " , ");
      let parsed: Operand = spaced.parse().unwrap();
      assert_eq!(parsed.kind, op.kind, "whitespace-insensitivity failed for {s}");
    }
  }

  #[test]
  fn suffix_and_operand_order() {
    let i = Inst::new(InstKind::Add).sized(OpSize::Dword)
      .two(Operand::imm(1), Operand::reg(PReg::Rax));
    assert_eq!(i.to_string(), "    addl $1, %eax");
    let i = Inst::new(InstKind::Movsd).sized(OpSize::Qword)
      .two(Operand::deref(PReg::Rbp, -8), Operand::reg(PReg::Xmm0));
    assert_eq!(i.to_string(), "    movsd -8(%rbp), %xmm0");
    let i = Inst::new(InstKind::Jmp).one(Operand::label(".LR1"));
    assert_eq!(i.to_string(), "    jmp .LR1");
    let i = Inst::new(InstKind::Sete).one(Operand::reg(PReg::Rax));
    assert_eq!(i.to_string(), "    sete %al");
    let i = Inst::new(InstKind::Shl).sized(OpSize::Qword)
      .two(Operand::imm(1), Operand::reg(PReg::Rax));
    assert_eq!(i.to_string(), "    shlq $1, %rax");
    let i = Inst::new(InstKind::Movsx).sized(OpSize::Dword)
      .two(Operand::reg(PReg::Rax).sized(OpSize::Word), Operand::reg(PReg::Rax));
    assert_eq!(i.to_string(), "    movsx %ax, %eax");
    let i = Inst::new(InstKind::Lea).sized(OpSize::Qword)
      .two(Operand::deref(PReg::Rbp, -16), Operand::reg(PReg::Rdi));
    assert_eq!(i.to_string(), "    lea -16(%rbp), %rdi");
  }

  #[test]
  fn written_registers() {
    let i = Inst::new(InstKind::Mov).sized(OpSize::Qword)
      .two(Operand::reg(PReg::Rax), Operand::reg(PReg::R12));
    assert_eq!(i.written_regs().collect::<Vec<_>>(), vec![PReg::R12]);
    let i = Inst::new(InstKind::Cmp).sized(OpSize::Qword)
      .two(Operand::imm(0), Operand::reg(PReg::Rbx));
    assert_eq!(i.written_regs().count(), 0);
    let i = Inst::new(InstKind::Neg).sized(OpSize::Qword)
      .one(Operand::reg(PReg::R13));
    assert_eq!(i.written_regs().collect::<Vec<_>>(), vec![PReg::R13]);
  }
}
