//! The translation pass from AIR to x86-64 assembly form.
//!
//! Most AIR opcodes have a short fixed recipe; the interesting cases are
//! the two-operand binary form with its trivial-move elision, unsigned
//! multiplication and division through the implicit `%rax`, IEEE-754-aware
//! SSE equality, and the branchful conversions between unsigned 64-bit
//! integers and SSE floats, which lean on lazily created read-only helper
//! constants.
//!
//! Stack slots are assigned here: the first use of an automatic-storage
//! symbol claims the next slot below `%rbp`, aligned down to the object's
//! alignment; the routine records the running total for its prologue.

use byteorder::{ByteOrder, LE};
use log::trace;

use crate::arch::{Inst, InstKind, Nonvolatiles, OpSize, Operand, PReg};
use crate::symtab::{DefState, Linkage, Namespace, ScopeId, StorageDuration,
  Symbol, SymId, SymbolTable};
use crate::types::air::{Air, AirData, AirInsn, AirOp, AirOperand, AirOperandKind,
  AirRoutine};
use crate::types::ast::Ast;
use crate::types::ty::{ArrayLen, CType, TyKind, TypeTable};

/// An internal invariant failure during lowering. These are never produced
/// by bad user input; the AIR producer guarantees the shapes this pass
/// relies on, so a violation aborts the pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LowerErr {
  /// An operand had a kind the instruction cannot accept.
  BadOperand(&'static str),
  /// An instruction's type has no lowering (long double, complex).
  UnsupportedType(&'static str),
}

impl std::fmt::Display for LowerErr {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      LowerErr::BadOperand(what) => write!(f, "invalid operand in {what}"),
      LowerErr::UnsupportedType(what) => write!(f, "unsupported operand type in {what}"),
    }
  }
}

impl std::error::Error for LowerErr {}

/// A relocation in an emitted data object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitAddress {
  /// The byte position of the pointer-sized field within the data.
  pub location: u64,
  /// The label whose address the field holds.
  pub label: String,
}

/// One object in `.data` or `.rodata`.
#[derive(Clone, Debug)]
pub struct AsmData {
  /// The emission label.
  pub label: String,
  /// The `.align` argument.
  pub alignment: u64,
  /// The image bytes.
  pub bytes: Vec<u8>,
  /// Relocated positions within the image, ordered by location.
  pub addresses: Vec<InitAddress>,
  /// Whether the object belongs in `.rodata`.
  pub readonly: bool,
}

/// One routine in assembly form.
#[derive(Clone, Debug)]
pub struct AsmRoutine {
  /// The routine's number, used by its shared epilogue label `.LR<id>`.
  pub id: u64,
  /// Whether to emit `.globl`.
  pub global: bool,
  /// The emission label.
  pub label: String,
  /// The instruction stream (without prologue or epilogue).
  pub insns: Vec<Inst>,
  /// The callee-saved registers the body writes; filled by the writer's
  /// scan.
  pub used_nonvolatiles: Nonvolatiles,
  /// The running stack allocation, growing negative.
  pub stackalloc: i64,
  /// Whether to emit the variadic register save area.
  pub uses_varargs: bool,
}

/// A complete assembly file, ready to print.
#[derive(Clone, Debug, Default)]
pub struct AsmFile {
  /// `.data` objects.
  pub data: Vec<AsmData>,
  /// `.rodata` objects.
  pub rodata: Vec<AsmData>,
  /// `.text` routines.
  pub routines: Vec<AsmRoutine>,
}

struct Lowerer<'a> {
  ast: &'a Ast,
  tt: &'a TypeTable,
  st: &'a mut SymbolTable,
  file: AsmFile,
  next_label: u64,
  next_routine_id: u64,
  sse32_zero_checker: Option<SymId>,
  sse64_zero_checker: Option<SymId>,
  sse32_i64_limit: Option<SymId>,
  sse64_i64_limit: Option<SymId>,
}

/// Lower a whole AIR unit to assembly form. Stack offsets are recorded on
/// the symbols as a side effect; the helper rodata constants the recipes
/// need are created on first use and live for the whole file.
pub fn generate(air: &Air, ast: &Ast, tt: &TypeTable, st: &mut SymbolTable)
    -> Result<AsmFile, LowerErr> {
  let mut lw = Lowerer {
    ast, tt, st,
    file: AsmFile::default(),
    next_label: 0,
    next_routine_id: 0,
    sse32_zero_checker: None,
    sse64_zero_checker: None,
    sse32_i64_limit: None,
    sse64_i64_limit: None,
  };
  for routine in &air.routines {
    let r = lw.routine(routine)?;
    lw.file.routines.push(r);
  }
  for data in &air.data {
    let d = lw.data(data);
    lw.file.data.push(d);
  }
  for rodata in &air.rodata {
    let d = lw.data(rodata);
    lw.file.rodata.push(d);
  }
  Ok(lw.file)
}

impl Lowerer<'_> {
  fn fresh_label(&mut self) -> String {
    self.next_label += 1;
    format!(".LGEN{}", self.next_label)
  }

  fn size_of(&self, ty: &CType) -> OpSize { OpSize::of_type(ty, self.tt) }

  /// Map an AIR operand onto an x86 operand, assigning a stack slot to an
  /// automatic symbol on its first use.
  fn operand(&mut self, aop: &AirOperand, routine: &mut AsmRoutine)
      -> Result<Operand, LowerErr> {
    Ok(match &aop.kind {
      AirOperandKind::Reg(r) => Operand::reg(*r),
      AirOperandKind::IndirectReg { base, index, scale, disp } => {
        if index.is_some() || *scale != 1 {
          Operand::indexed(Some(*base), *index, *scale, *disp)
        } else {
          Operand::deref(*base, *disp)
        }
      }
      AirOperandKind::ImmInt(v) => Operand::imm(*v),
      AirOperandKind::Sym(sym) => self.sym_operand(*sym, 0, routine),
      AirOperandKind::IndirectSym { sym, disp } =>
        self.sym_operand(*sym, *disp, routine),
      AirOperandKind::Label { disambiguator, id } =>
        Operand::label(format!(".L{disambiguator}{id}")),
      AirOperandKind::FloatConst(_) =>
        return Err(LowerErr::BadOperand("floating constant not localized")),
      AirOperandKind::Type =>
        return Err(LowerErr::BadOperand("type operand in instruction")),
    })
  }

  fn sym_operand(&mut self, sym: SymId, disp: i64, routine: &mut AsmRoutine)
      -> Operand {
    if self.st[sym].storage == StorageDuration::Static ||
        matches!(self.st[sym].ty.kind, TyKind::Function(_)) {
      return Operand::label_ref(self.st.emission_name(sym, self.ast), disp)
    }
    if let Some(off) = self.st[sym].stack_offset {
      return Operand::deref(PReg::Rbp, off + disp)
    }
    let size = self.st[sym].ty.size(self.tt).unwrap_or(8) as i64;
    let alignment = self.st[sym].ty.alignment(self.tt).unwrap_or(8).max(1) as i64;
    let mut off = routine.stackalloc - size;
    off -= off.rem_euclid(alignment);
    self.st[sym].stack_offset = Some(off);
    routine.stackalloc = off;
    trace!("{} gets stack slot {}", self.st[sym].name, off);
    Operand::deref(PReg::Rbp, off + disp)
  }

  // -------------------------------------------------------- helper constants

  /// The 16-byte mask that zeroes the sign bit of a float/double under
  /// `ptest`, created and registered in rodata on first use.
  fn sse_zero_checker(&mut self, is_float: bool) -> String {
    let cached = if is_float { self.sse32_zero_checker } else { self.sse64_zero_checker };
    if let Some(sym) = cached {
      return self.st.emission_name(sym, self.ast)
    }
    let name = if is_float { "__sse32_zero_checker" } else { "__sse64_zero_checker" };
    let mut sym = Symbol::new(name,
      CType::new(TyKind::UChar).array_of(ArrayLen::Fixed(16)),
      Namespace::Ordinary, None, ScopeId::FILE);
    sym.storage = StorageDuration::Static;
    sym.state = DefState::Defined;
    let id = self.st.add(sym);
    if is_float { self.sse32_zero_checker = Some(id) }
    else { self.sse64_zero_checker = Some(id) }

    let mut bytes = vec![0u8; 16];
    LE::write_u64(&mut bytes,
      if is_float { 0x7FFF_FFFF } else { 0x7FFF_FFFF_FFFF_FFFF });
    self.file.rodata.push(AsmData {
      label: name.to_owned(),
      alignment: 16,
      bytes,
      addresses: vec![],
      readonly: true,
    });
    name.to_owned()
  }

  /// The constant `9223372036854775808.0` as a float or double, created and
  /// registered in rodata on first use. The unsigned-64 conversion recipes
  /// pivot on it.
  fn sse_i64_limit(&mut self, is_float: bool) -> String {
    let cached = if is_float { self.sse32_i64_limit } else { self.sse64_i64_limit };
    if let Some(sym) = cached {
      return self.st.emission_name(sym, self.ast)
    }
    let name = if is_float { "__sse32_i64_limit" } else { "__sse64_i64_limit" };
    let ty = CType::new(if is_float { TyKind::Float } else { TyKind::Double });
    let mut sym = Symbol::new(name, ty, Namespace::Ordinary, None, ScopeId::FILE);
    sym.storage = StorageDuration::Static;
    sym.state = DefState::Defined;
    let id = self.st.add(sym);
    if is_float { self.sse32_i64_limit = Some(id) }
    else { self.sse64_i64_limit = Some(id) }

    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let (alignment, bytes) = if is_float {
      #[allow(clippy::cast_possible_truncation)]
      let v = LIMIT as f32;
      (4, v.to_le_bytes().to_vec())
    } else {
      (8, LIMIT.to_le_bytes().to_vec())
    };
    self.file.rodata.push(AsmData {
      label: name.to_owned(),
      alignment,
      bytes,
      addresses: vec![],
      readonly: true,
    });
    name.to_owned()
  }

  // ---------------------------------------------------------------- routines

  fn routine(&mut self, ar: &AirRoutine) -> Result<AsmRoutine, LowerErr> {
    self.next_routine_id += 1;
    let mut routine = AsmRoutine {
      id: self.next_routine_id,
      global: self.st[ar.sym].linkage == Linkage::External,
      label: self.st.emission_name(ar.sym, self.ast),
      insns: vec![],
      used_nonvolatiles: Nonvolatiles::empty(),
      stackalloc: 0,
      uses_varargs: ar.uses_varargs,
    };
    if ar.uses_varargs {
      // the System V register save area
      routine.stackalloc -= 176;
    }
    for (i, insn) in ar.insns.iter().enumerate() {
      if i == 0 && insn.op == AirOp::Nop { continue }
      let mut out = vec![];
      self.insn(insn, &mut routine, &mut out)?;
      routine.insns.append(&mut out);
    }
    Ok(routine)
  }

  #[allow(clippy::too_many_lines)]
  fn insn(&mut self, ai: &AirInsn, routine: &mut AsmRoutine, out: &mut Vec<Inst>)
      -> Result<(), LowerErr> {
    match ai.op {
      AirOp::Load | AirOp::Assign => self.gen_load(ai, routine, out),
      AirOp::LoadAddr => {
        let src = self.operand(&ai.ops[1], routine)?;
        let dst = self.operand(&ai.ops[0], routine)?;
        out.push(Inst::new(InstKind::Lea).sized(OpSize::Qword).two(src, dst));
        Ok(())
      }
      AirOp::FuncCall => {
        let target = match &ai.ops[1].kind {
          AirOperandKind::Reg(r) => Operand::ptr_reg(*r),
          AirOperandKind::Sym(sym) =>
            Operand::label(self.st[*sym].name.clone()),
          _ => return Err(LowerErr::BadOperand("function call target")),
        };
        out.push(Inst::new(InstKind::Call).sized(OpSize::Qword).one(target));
        Ok(())
      }
      AirOp::Nop => {
        out.push(Inst::new(InstKind::Nop));
        Ok(())
      }
      AirOp::Declare => {
        // just letting the code generator know that the variable exists
        self.operand(&ai.ops[0], routine)?;
        Ok(())
      }
      AirOp::Return => {
        out.push(Inst::new(InstKind::Jmp)
          .one(Operand::label(format!(".LR{}", routine.id))));
        Ok(())
      }
      AirOp::Add | AirOp::Subtract | AirOp::And | AirOp::Xor | AirOp::Or |
      AirOp::ShiftLeft | AirOp::ShiftRight | AirOp::SignedShiftRight =>
        self.gen_binary(ai, routine, out),
      AirOp::Multiply => self.gen_multiply(ai, routine, out),
      AirOp::Divide => self.gen_divide(ai, routine, out),
      AirOp::DirectAdd | AirOp::DirectSubtract | AirOp::DirectAnd |
      AirOp::DirectXor | AirOp::DirectOr | AirOp::DirectShiftLeft |
      AirOp::DirectShiftRight | AirOp::DirectSignedShiftRight =>
        self.gen_direct_binary(ai, routine, out),
      AirOp::DirectMultiply => self.gen_direct_multiply(ai, routine, out),
      AirOp::DirectDivide => self.gen_direct_divide(ai, routine, out),
      AirOp::Negate => self.gen_negate(ai, routine, out),
      AirOp::Not => self.gen_not(ai, routine, out),
      AirOp::Posate => self.gen_posate(ai, routine, out),
      AirOp::Complement => self.gen_complement(ai, routine, out),
      AirOp::Jz | AirOp::Jnz => self.gen_conditional_jump(ai, routine, out),
      AirOp::Jmp => {
        let target = self.operand(&ai.ops[0], routine)?;
        out.push(Inst::new(InstKind::Jmp).one(target));
        Ok(())
      }
      AirOp::Label => {
        let label = self.operand(&ai.ops[0], routine)?;
        out.push(Inst::new(InstKind::Label).one(label));
        Ok(())
      }
      AirOp::Push => {
        let op = self.operand(&ai.ops[0], routine)?;
        out.push(Inst::new(InstKind::Push).sized(OpSize::Qword).one(op));
        Ok(())
      }
      AirOp::LessEqual | AirOp::Less | AirOp::GreaterEqual | AirOp::Greater =>
        self.gen_relational(ai, routine, out),
      AirOp::Equal | AirOp::Inequal => {
        if ai.ops[1].ty.is_sse_floating() {
          self.gen_sse_equality(ai, routine, out)
        } else if ai.ops[1].ty.is_integer() ||
            matches!(ai.ops[1].ty.kind, TyKind::Pointer(_)) {
          self.gen_relational(ai, routine, out)
        } else {
          Err(LowerErr::UnsupportedType("equality operator"))
        }
      }
      AirOp::Sext | AirOp::Zext => self.gen_extension(ai, routine, out),
      AirOp::S2D => self.gen_cvt(ai, routine, out, InstKind::Cvtss2sd),
      AirOp::D2S => self.gen_cvt(ai, routine, out, InstKind::Cvtsd2ss),
      AirOp::S2Si | AirOp::D2Si => self.gen_sse2signed(ai, routine, out),
      AirOp::Si2S | AirOp::Si2D => self.gen_signed2sse(ai, routine, out),
      AirOp::S2Ui | AirOp::D2Ui => self.gen_sse2unsigned(ai, routine, out),
      AirOp::Ui2S | AirOp::Ui2D => self.gen_unsigned2sse(ai, routine, out),
      AirOp::Memset => {
        out.push(Inst::new(InstKind::RepStosb));
        Ok(())
      }
      AirOp::LSyscall => {
        out.push(Inst::new(InstKind::Syscall));
        Ok(())
      }
      // symbolic for earlier stages; modulo and the varargs ops are
      // rewritten before this pass, phis are deleted
      AirOp::Modulo | AirOp::DirectModulo | AirOp::DeclareRegister |
      AirOp::Blip | AirOp::Phi | AirOp::VaArg | AirOp::VaStart |
      AirOp::VaEnd | AirOp::SequencePoint => Ok(()),
    }
  }

  fn mov_kind(&self, ty: &CType) -> Result<InstKind, LowerErr> {
    Ok(match &ty.kind {
      TyKind::Float => InstKind::Movss,
      TyKind::Double => InstKind::Movsd,
      _ if ty.is_integer() || matches!(ty.kind, TyKind::Pointer(_)) => InstKind::Mov,
      _ => return Err(LowerErr::UnsupportedType("move")),
    })
  }

  fn gen_load(&mut self, ai: &AirInsn, routine: &mut AsmRoutine, out: &mut Vec<Inst>)
      -> Result<(), LowerErr> {
    let kind = self.mov_kind(&ai.ty)?;
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(self.size_of(&ai.ty)).two(src, dst));
    Ok(())
  }

  fn int_binop_kind(op: AirOp, signed: bool) -> Result<InstKind, LowerErr> {
    Ok(match op {
      AirOp::Add | AirOp::DirectAdd => InstKind::Add,
      AirOp::Subtract | AirOp::DirectSubtract => InstKind::Sub,
      AirOp::Multiply | AirOp::DirectMultiply if signed => InstKind::Imul,
      AirOp::And | AirOp::DirectAnd => InstKind::And,
      AirOp::Xor | AirOp::DirectXor => InstKind::Xor,
      AirOp::Or | AirOp::DirectOr => InstKind::Or,
      AirOp::ShiftLeft | AirOp::DirectShiftLeft => InstKind::Shl,
      AirOp::ShiftRight | AirOp::DirectShiftRight => InstKind::Shr,
      AirOp::SignedShiftRight | AirOp::DirectSignedShiftRight => InstKind::Sar,
      _ => return Err(LowerErr::UnsupportedType("binary operator")),
    })
  }

  fn sse_binop_kind(op: AirOp, is_float: bool) -> Result<InstKind, LowerErr> {
    Ok(match (op, is_float) {
      (AirOp::Add | AirOp::DirectAdd, true) => InstKind::Addss,
      (AirOp::Add | AirOp::DirectAdd, false) => InstKind::Addsd,
      (AirOp::Subtract | AirOp::DirectSubtract, true) => InstKind::Subss,
      (AirOp::Subtract | AirOp::DirectSubtract, false) => InstKind::Subsd,
      (AirOp::Multiply | AirOp::DirectMultiply, true) => InstKind::Mulss,
      (AirOp::Multiply | AirOp::DirectMultiply, false) => InstKind::Mulsd,
      (AirOp::Xor, true) => InstKind::Xorps,
      (AirOp::Xor, false) => InstKind::Xorpd,
      _ => return Err(LowerErr::UnsupportedType("SSE binary operator")),
    })
  }

  fn binop_kind(&self, op: AirOp, ty: &CType) -> Result<InstKind, LowerErr> {
    match &ty.kind {
      TyKind::Float => Self::sse_binop_kind(op, true),
      TyKind::Double => Self::sse_binop_kind(op, false),
      _ if ty.is_signed_integer() || matches!(ty.kind, TyKind::Char) =>
        Self::int_binop_kind(op, true),
      _ if ty.is_unsigned_integer() || matches!(ty.kind, TyKind::Pointer(_)) =>
        Self::int_binop_kind(op, false),
      _ => Err(LowerErr::UnsupportedType("binary operator")),
    }
  }

  /// Two-operand binary form: `op src2, src1` then `mov src1, dst`, the
  /// move elided when source and destination coincide.
  fn gen_binary(&mut self, ai: &AirInsn, routine: &mut AsmRoutine, out: &mut Vec<Inst>)
      -> Result<(), LowerErr> {
    let kind = self.binop_kind(ai.op, &ai.ty)?;
    let size = self.size_of(&ai.ty);
    let src2 = self.operand(&ai.ops[2], routine)?;
    let src1 = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(size).two(src2, src1.clone()));
    if src1 != dst {
      let mov = self.mov_kind(&ai.ty)?;
      out.push(Inst::new(mov).sized(size).two(src1, dst));
    }
    Ok(())
  }

  fn gen_direct_binary(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let kind = self.binop_kind(ai.op, &ai.ty)?;
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(self.size_of(&ai.ty)).two(src, dst));
    Ok(())
  }

  /// Unsigned multiplication goes through the one-operand `mul` with the
  /// implicit `%rax`; everything else is the ordinary binary form.
  fn gen_multiply(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    if !ai.ty.is_unsigned_integer() && !matches!(ai.ty.kind, TyKind::Pointer(_)) {
      return self.gen_binary(ai, routine, out)
    }
    let size = self.size_of(&ai.ty);
    let src = self.operand(&ai.ops[2], routine)?;
    out.push(Inst::new(InstKind::Mul).sized(size).one(src));
    let mov_src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(InstKind::Mov).sized(size).two(mov_src, dst));
    Ok(())
  }

  fn gen_direct_multiply(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    if !ai.ty.is_unsigned_integer() && !matches!(ai.ty.kind, TyKind::Pointer(_)) {
      return self.gen_direct_binary(ai, routine, out)
    }
    let src = self.operand(&ai.ops[1], routine)?;
    out.push(Inst::new(InstKind::Mul).sized(self.size_of(&ai.ty)).one(src));
    Ok(())
  }

  fn gen_divide(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let size = self.size_of(&ai.ty);
    match &ai.ty.kind {
      TyKind::Float | TyKind::Double => {
        let is_float = ai.ty.kind == TyKind::Float;
        let src2 = self.operand(&ai.ops[2], routine)?;
        let src1 = self.operand(&ai.ops[1], routine)?;
        let dst = self.operand(&ai.ops[0], routine)?;
        out.push(Inst::new(if is_float { InstKind::Divss } else { InstKind::Divsd })
          .sized(size).two(src2, src1.clone()));
        if src1 != dst {
          out.push(Inst::new(if is_float { InstKind::Movss } else { InstKind::Movsd })
            .sized(size).two(src1, dst));
        }
        Ok(())
      }
      _ if ai.ty.is_integer() => {
        // quotient lands in the implicit %rax, which the producer has
        // already arranged to be ops[0]
        let kind = if ai.ty.is_signed_integer() { InstKind::Idiv } else { InstKind::Div };
        let src = self.operand(&ai.ops[2], routine)?;
        out.push(Inst::new(kind).sized(size).one(src));
        Ok(())
      }
      _ => Err(LowerErr::UnsupportedType("division")),
    }
  }

  fn gen_direct_divide(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let size = self.size_of(&ai.ty);
    match &ai.ty.kind {
      TyKind::Float | TyKind::Double => {
        let is_float = ai.ty.kind == TyKind::Float;
        let src = self.operand(&ai.ops[1], routine)?;
        let dst = self.operand(&ai.ops[0], routine)?;
        out.push(Inst::new(if is_float { InstKind::Divss } else { InstKind::Divsd })
          .sized(size).two(src, dst));
        Ok(())
      }
      _ if ai.ty.is_integer() => {
        let kind = if ai.ty.is_signed_integer() { InstKind::Idiv } else { InstKind::Div };
        let src = self.operand(&ai.ops[1], routine)?;
        out.push(Inst::new(kind).sized(size).one(src));
        Ok(())
      }
      _ => Err(LowerErr::UnsupportedType("division")),
    }
  }

  fn gen_negate(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    if !ai.ty.is_integer() {
      // SSE negations are rewritten as sign-bit xors before this pass
      return Err(LowerErr::UnsupportedType("negation"))
    }
    let size = self.size_of(&ai.ty);
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(InstKind::Neg).sized(size).one(src.clone()));
    if src != dst {
      out.push(Inst::new(InstKind::Mov).sized(size).two(src, dst));
    }
    Ok(())
  }

  /// Logical NOT: compare against zero (`cmp $0` for integers, `ptest`
  /// against the sign-bit mask for SSE), then `sete`.
  fn gen_not(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let opt = ai.ops[1].ty.clone();
    let size = self.size_of(&opt);
    if opt.is_integer() || matches!(opt.kind, TyKind::Pointer(_)) {
      let op = self.operand(&ai.ops[1], routine)?;
      out.push(Inst::new(InstKind::Cmp).sized(size).two(Operand::imm(0), op));
    } else if opt.is_sse_floating() {
      let checker = self.sse_zero_checker(opt.kind == TyKind::Float);
      let op = self.operand(&ai.ops[1], routine)?;
      out.push(Inst::new(InstKind::Ptest).sized(size)
        .two(Operand::label_ref(checker, 0), op));
    } else {
      return Err(LowerErr::UnsupportedType("logical not"))
    }
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(InstKind::Sete).sized(OpSize::Byte).one(dst));
    Ok(())
  }

  fn gen_posate(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let kind = self.mov_kind(&ai.ty)?;
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(self.size_of(&ai.ty)).two(src, dst));
    Ok(())
  }

  fn gen_complement(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let size = self.size_of(&ai.ty);
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(InstKind::Not).sized(size).one(src.clone()));
    if src != dst {
      out.push(Inst::new(InstKind::Mov).sized(size).two(src, dst));
    }
    Ok(())
  }

  fn gen_conditional_jump(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let jump = if ai.op == AirOp::Jz { InstKind::Je } else { InstKind::Jne };
    if ai.ty.is_integer() {
      let op = self.operand(&ai.ops[1], routine)?;
      out.push(Inst::new(InstKind::Cmp).sized(self.size_of(&ai.ty))
        .two(Operand::imm(0), op));
    } else if ai.ty.is_sse_floating() {
      let checker = self.sse_zero_checker(ai.ty.kind == TyKind::Float);
      let op = self.operand(&ai.ops[1], routine)?;
      out.push(Inst::new(InstKind::Ptest).sized(self.size_of(&ai.ty))
        .two(Operand::label_ref(checker, 0), op));
    } else {
      return Err(LowerErr::UnsupportedType("conditional jump"))
    }
    let target = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(jump).one(target));
    Ok(())
  }

  /// Relational operators and integer equality: one compare, one `setcc`.
  /// SSE `<` and `<=` flip the comparison so the unsigned-style `seta` and
  /// `setnb` conditions apply.
  fn gen_relational(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let opt = ai.ops[1].ty.clone();
    let sse = opt.is_sse_floating();
    let set = match ai.op {
      AirOp::LessEqual | AirOp::GreaterEqual if sse => InstKind::Setnb,
      AirOp::Less | AirOp::Greater if sse => InstKind::Seta,
      AirOp::LessEqual => InstKind::Setle,
      AirOp::Less => InstKind::Setl,
      AirOp::GreaterEqual => InstKind::Setge,
      AirOp::Greater => InstKind::Setg,
      AirOp::Equal => InstKind::Sete,
      AirOp::Inequal => InstKind::Setne,
      _ => return Err(LowerErr::UnsupportedType("relational operator")),
    };
    let cmp = if opt.is_integer() || matches!(opt.kind, TyKind::Pointer(_)) {
      InstKind::Cmp
    } else if sse {
      if opt.kind == TyKind::Float { InstKind::Comiss } else { InstKind::Comisd }
    } else {
      return Err(LowerErr::UnsupportedType("relational operator"))
    };
    let flip = sse && matches!(ai.op, AirOp::LessEqual | AirOp::Less);
    let (a, b) = if flip { (1, 2) } else { (2, 1) };
    let op1 = self.operand(&ai.ops[a], routine)?;
    let op2 = self.operand(&ai.ops[b], routine)?;
    out.push(Inst::new(cmp).sized(self.size_of(&ai.ty)).two(op1, op2));
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(set).sized(OpSize::Byte).one(dst));
    Ok(())
  }

  /// SSE equality has to treat NaN (the unordered result) correctly: two
  /// `ucomi` compares, one capturing the parity flag and one the zero
  /// flag; the result is their conjunction.
  fn gen_sse_equality(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let eq = ai.op == AirOp::Equal;
    let opt = ai.ops[1].ty.clone();
    let ucomi = if opt.kind == TyKind::Float { InstKind::Ucomiss }
      else { InstKind::Ucomisd };
    let size = self.size_of(&opt);

    let src2 = self.operand(&ai.ops[2], routine)?;
    let src1 = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(ucomi).sized(size).two(src2.clone(), src1.clone()));
    out.push(Inst::new(if eq { InstKind::Setnp } else { InstKind::Setp })
      .sized(OpSize::Byte).one(dst.clone()));
    out.push(Inst::new(ucomi).sized(size).two(src2, src1));
    let label = self.fresh_label();
    out.push(Inst::new(InstKind::Je).one(Operand::label(label.clone())));
    out.push(Inst::new(InstKind::Mov).sized(self.size_of(&ai.ty))
      .two(Operand::imm(u64::from(!eq)), dst));
    out.push(Inst::new(InstKind::Label).one(Operand::label(label)));
    Ok(())
  }

  /// Sign/zero extension, elided when the sizes coincide and for the
  /// implicit 32→64-bit zero extension.
  fn gen_extension(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let src_size = self.size_of(&ai.ops[1].ty);
    let dst_size = self.size_of(&ai.ty);
    if src_size == dst_size { return Ok(()) }
    if ai.op == AirOp::Zext && src_size == OpSize::Dword && dst_size == OpSize::Qword {
      return Ok(())
    }
    let kind = if ai.op == AirOp::Sext { InstKind::Movsx } else { InstKind::Movzx };
    let src = self.operand(&ai.ops[1], routine)?.sized(src_size);
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(dst_size).two(src, dst));
    Ok(())
  }

  fn gen_cvt(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>, kind: InstKind) -> Result<(), LowerErr> {
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(self.size_of(&ai.ty)).two(src, dst));
    Ok(())
  }

  fn gen_sse2signed(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let opt = ai.ops[1].ty.clone();
    let kind = if opt.kind == TyKind::Float { InstKind::Cvttss2si }
      else { InstKind::Cvttsd2si };
    let size = self.size_of(&ai.ty).max(OpSize::Dword);
    let src = self.operand(&ai.ops[1], routine)?.sized(self.size_of(&opt));
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(size).two(src, dst));
    Ok(())
  }

  fn gen_signed2sse(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let opt = ai.ops[1].ty.clone();
    // sub-int sources go through a sign extension first
    if opt.rank() < CType::new(TyKind::Int).rank() {
      let src = self.operand(&ai.ops[1], routine)?.sized(self.size_of(&opt));
      let dst = self.operand(&ai.ops[1], routine)?;
      out.push(Inst::new(InstKind::Movsx).sized(OpSize::Dword).two(src, dst));
    }
    let kind = if ai.ty.kind == TyKind::Float { InstKind::Cvtsi2ss }
      else { InstKind::Cvtsi2sd };
    let size = self.size_of(&opt).max(OpSize::Dword);
    let src = self.operand(&ai.ops[1], routine)?.sized(size);
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(size).two(src, dst));
    Ok(())
  }

  fn gen_sse2unsigned(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let size = self.size_of(&ai.ty);
    if size == OpSize::Qword {
      return self.gen_sse2u64(ai, routine, out)
    }
    let opt = ai.ops[1].ty.clone();
    let kind = if opt.kind == TyKind::Float { InstKind::Cvttss2si }
      else { InstKind::Cvttsd2si };
    // a 32-bit unsigned result needs the 64-bit conversion to avoid
    // truncating values above INT_MAX
    let size = if size == OpSize::Dword { OpSize::Qword } else { OpSize::Dword };
    let src = self.operand(&ai.ops[1], routine)?.sized(self.size_of(&opt));
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(size).two(src, dst));
    Ok(())
  }

  /// Unsigned 64-bit from float/double: values below 2^63 convert
  /// directly; values at or above subtract 2^63, convert, then rebuild the
  /// high bit with a shift/or/rotate of the two's-complement image.
  fn gen_sse2u64(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let opt = ai.ops[1].ty.clone();
    let is_float = opt.kind == TyKind::Float;
    let limit = self.sse_i64_limit(is_float);
    let opt_size = self.size_of(&opt);
    let cvt = if is_float { InstKind::Cvttss2si } else { InstKind::Cvttsd2si };
    let sub = if is_float { InstKind::Subss } else { InstKind::Subsd };
    let comi = if is_float { InstKind::Comiss } else { InstKind::Comisd };

    let gte_label = self.fresh_label();
    let after_label = self.fresh_label();
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;

    out.push(Inst::new(comi).sized(opt_size)
      .two(Operand::label_ref(limit.clone(), 0), src.clone()));
    out.push(Inst::new(InstKind::Jnb).one(Operand::label(gte_label.clone())));
    out.push(Inst::new(cvt).sized(OpSize::Qword)
      .two(src.clone().sized(opt_size), dst.clone()));
    out.push(Inst::new(InstKind::Jmp).one(Operand::label(after_label.clone())));
    out.push(Inst::new(InstKind::Label).one(Operand::label(gte_label)));
    out.push(Inst::new(sub).sized(opt_size)
      .two(Operand::label_ref(limit, 0), src.clone()));
    out.push(Inst::new(cvt).sized(OpSize::Qword)
      .two(src.sized(opt_size), dst.clone()));
    out.push(Inst::new(InstKind::Shl).sized(OpSize::Qword)
      .two(Operand::imm(1), dst.clone()));
    out.push(Inst::new(InstKind::Or).sized(OpSize::Byte)
      .two(Operand::imm(1), dst.clone()));
    out.push(Inst::new(InstKind::Ror).sized(OpSize::Qword)
      .two(Operand::imm(1), dst));
    out.push(Inst::new(InstKind::Label).one(Operand::label(after_label)));
    Ok(())
  }

  fn gen_unsigned2sse(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let opt = ai.ops[1].ty.clone();
    if self.size_of(&opt) == OpSize::Qword {
      return self.gen_u642sse(ai, routine, out)
    }
    // sub-int sources go through a zero extension first
    if opt.rank() < CType::new(TyKind::Int).rank() {
      let src = self.operand(&ai.ops[1], routine)?.sized(self.size_of(&opt));
      let dst = self.operand(&ai.ops[1], routine)?;
      out.push(Inst::new(InstKind::Movzx).sized(OpSize::Dword).two(src, dst));
    }
    let kind = if ai.ty.kind == TyKind::Float { InstKind::Cvtsi2ss }
      else { InstKind::Cvtsi2sd };
    let src = self.operand(&ai.ops[1], routine)?.sized(OpSize::Qword);
    let dst = self.operand(&ai.ops[0], routine)?;
    out.push(Inst::new(kind).sized(OpSize::Qword).two(src, dst));
    Ok(())
  }

  /// Float/double from unsigned 64-bit: clear the destination, test the
  /// sign; a clear sign bit converts directly, a set one halves the value
  /// (shift pair), converts, then adds 2^63 back.
  fn gen_u642sse(&mut self, ai: &AirInsn, routine: &mut AsmRoutine,
      out: &mut Vec<Inst>) -> Result<(), LowerErr> {
    let is_float = ai.ty.kind == TyKind::Float;
    let size = self.size_of(&ai.ty);
    let opt = ai.ops[1].ty.clone();
    let limit = self.sse_i64_limit(is_float);
    let cvt = if is_float { InstKind::Cvtsi2ss } else { InstKind::Cvtsi2sd };
    let add = if is_float { InstKind::Addss } else { InstKind::Addsd };

    let gte_label = self.fresh_label();
    let after_label = self.fresh_label();
    let src = self.operand(&ai.ops[1], routine)?;
    let dst = self.operand(&ai.ops[0], routine)?;

    out.push(Inst::new(if is_float { InstKind::Xorps } else { InstKind::Xorpd })
      .sized(size).two(dst.clone(), dst.clone()));
    out.push(Inst::new(InstKind::Test).sized(OpSize::Qword)
      .two(src.clone(), src.clone()));
    out.push(Inst::new(InstKind::Js).one(Operand::label(gte_label.clone())));
    out.push(Inst::new(cvt).sized(OpSize::Qword).two(src.clone(), dst.clone()));
    out.push(Inst::new(InstKind::Jmp).one(Operand::label(after_label.clone())));
    out.push(Inst::new(InstKind::Label).one(Operand::label(gte_label)));
    out.push(Inst::new(InstKind::Shl).sized(OpSize::Qword)
      .two(Operand::imm(1), src.clone()));
    out.push(Inst::new(InstKind::Shr).sized(OpSize::Qword)
      .two(Operand::imm(1), src.clone()));
    out.push(Inst::new(cvt).sized(OpSize::Qword).two(src, dst.clone()));
    out.push(Inst::new(add).sized(self.size_of(&opt))
      .two(Operand::label_ref(limit, 0), dst));
    out.push(Inst::new(InstKind::Label).one(Operand::label(after_label)));
    Ok(())
  }

  // -------------------------------------------------------------------- data

  fn data(&mut self, ad: &AirData) -> AsmData {
    let sy = &self.st[ad.sym];
    let alignment = sy.ty.alignment(self.tt).unwrap_or(1);
    let mut addresses: Vec<InitAddress> = ad.relocs.iter().map(|r| InitAddress {
      location: r.offset,
      label: self.st.emission_name(r.target, self.ast),
    }).collect();
    addresses.sort_by_key(|a| a.location);
    AsmData {
      label: self.st.emission_name(ad.sym, self.ast),
      alignment,
      bytes: ad.bytes.clone(),
      addresses,
      readonly: ad.readonly,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Span;
  use crate::types::ast::NodeKind;

  fn setup() -> (Ast, TypeTable, SymbolTable) {
    let mut ast = Ast::new();
    ast.add(NodeKind::TranslationUnit(vec![]), Span::default());
    (ast, TypeTable::default(), SymbolTable::new())
  }

  fn auto_sym(st: &mut SymbolTable, name: &str, ty: CType) -> SymId {
    let mut sym = Symbol::new(name, ty, Namespace::Ordinary, None, ScopeId::FILE);
    sym.storage = StorageDuration::Automatic;
    st.add(sym)
  }

  fn fn_sym(st: &mut SymbolTable, name: &str) -> SymId {
    use crate::types::ty::FnType;
    let fnty = TyKind::Function(Box::new(FnType {
      ret: TyKind::Int.into(), params: Some(vec![]), variadic: false, inline: false,
    }));
    let mut sym = Symbol::new(name, fnty.into(), Namespace::Ordinary, None,
      ScopeId::FILE);
    sym.linkage = Linkage::External;
    st.add(sym)
  }

  #[test]
  fn binary_op_elides_trivial_move() {
    let (ast, tt, mut st) = setup();
    let f = fn_sym(&mut st, "f");
    let int: CType = TyKind::Int.into();
    let air = Air {
      routines: vec![AirRoutine {
        sym: f,
        insns: vec![AirInsn::with_ops(AirOp::Add, int.clone(), [
          AirOperand::reg(PReg::Rax, int.clone()),
          AirOperand::reg(PReg::Rax, int.clone()),
          AirOperand::reg(PReg::Rcx, int.clone()),
        ])],
        uses_varargs: false,
      }],
      ..Air::default()
    };
    let file = generate(&air, &ast, &tt, &mut st).unwrap();
    let insns = &file.routines[0].insns;
    assert_eq!(insns.len(), 1);
    assert_eq!(insns[0].to_string(), "    addl %ecx, %eax");
  }

  #[test]
  fn stack_slots_align_downward() {
    let (ast, tt, mut st) = setup();
    let f = fn_sym(&mut st, "f");
    let c = auto_sym(&mut st, "c", TyKind::Char.into());
    let d = auto_sym(&mut st, "d", TyKind::Double.into());
    let int: CType = TyKind::Int.into();
    let dbl: CType = TyKind::Double.into();
    let air = Air {
      routines: vec![AirRoutine {
        sym: f,
        insns: vec![
          AirInsn::with_ops(AirOp::Load, TyKind::Char.into(), [
            AirOperand::reg(PReg::Rax, int.clone()),
            AirOperand::sym(c, TyKind::Char.into()),
          ]),
          AirInsn::with_ops(AirOp::Load, dbl.clone(), [
            AirOperand::reg(PReg::Xmm0, dbl.clone()),
            AirOperand::sym(d, dbl.clone()),
          ]),
        ],
        uses_varargs: false,
      }],
      ..Air::default()
    };
    let file = generate(&air, &ast, &tt, &mut st).unwrap();
    assert_eq!(st[c].stack_offset, Some(-1));
    assert_eq!(st[d].stack_offset, Some(-16));
    assert_eq!(file.routines[0].stackalloc, -16);
    assert_eq!(file.routines[0].insns[0].to_string(), "    movb -1(%rbp), %al");
    assert_eq!(file.routines[0].insns[1].to_string(), "    movsd -16(%rbp), %xmm0");
  }

  #[test]
  fn sse2u64_emits_branchful_sequence() {
    let (ast, tt, mut st) = setup();
    let f = fn_sym(&mut st, "f");
    let dbl: CType = TyKind::Double.into();
    let ul: CType = TyKind::ULong.into();
    let air = Air {
      routines: vec![AirRoutine {
        sym: f,
        insns: vec![AirInsn::with_ops(AirOp::D2Ui, ul.clone(), [
          AirOperand::reg(PReg::Rax, ul.clone()),
          AirOperand::reg(PReg::Xmm0, dbl.clone()),
        ])],
        uses_varargs: false,
      }],
      ..Air::default()
    };
    let file = generate(&air, &ast, &tt, &mut st).unwrap();
    let text: Vec<String> =
      file.routines[0].insns.iter().map(ToString::to_string).collect();
    assert_eq!(text, vec![
      "    comisd __sse64_i64_limit(%rip), %xmm0",
      "    jnb .LGEN1",
      "    cvttsd2siq %xmm0, %rax",
      "    jmp .LGEN2",
      ".LGEN1:",
      "    subsd __sse64_i64_limit(%rip), %xmm0",
      "    cvttsd2siq %xmm0, %rax",
      "    shlq $1, %rax",
      "    orb $1, %al",
      "    rorq $1, %rax",
      ".LGEN2:",
    ]);
    assert_eq!(file.rodata.len(), 1);
    assert_eq!(file.rodata[0].label, "__sse64_i64_limit");
    assert_eq!(file.rodata[0].bytes[..],
      9_223_372_036_854_775_808.0_f64.to_le_bytes()[..]);
  }

  #[test]
  fn sse_not_creates_zero_checker_once() {
    let (ast, tt, mut st) = setup();
    let f = fn_sym(&mut st, "f");
    let dbl: CType = TyKind::Double.into();
    let int: CType = TyKind::Int.into();
    let not = AirInsn::with_ops(AirOp::Not, int.clone(), [
      AirOperand::reg(PReg::Rax, int.clone()),
      AirOperand::reg(PReg::Xmm0, dbl.clone()),
    ]);
    let air = Air {
      routines: vec![AirRoutine {
        sym: f,
        insns: vec![not.clone(), not],
        uses_varargs: false,
      }],
      ..Air::default()
    };
    let file = generate(&air, &ast, &tt, &mut st).unwrap();
    assert_eq!(file.rodata.len(), 1, "checker registered once");
    assert_eq!(file.rodata[0].label, "__sse64_zero_checker");
    assert_eq!(file.rodata[0].alignment, 16);
    assert_eq!(file.rodata[0].bytes[..8], 0x7FFF_FFFF_FFFF_FFFFu64.to_le_bytes()[..]);
    let text: Vec<String> =
      file.routines[0].insns.iter().map(ToString::to_string).collect();
    assert_eq!(text[0], "    ptest __sse64_zero_checker(%rip), %xmm0");
    assert_eq!(text[1], "    sete %al");
  }
}
