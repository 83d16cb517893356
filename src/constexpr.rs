//! The constant-expression evaluator.
//!
//! Folds the operators ISO C marks as constant-foldable over three result
//! shapes: integer constants, arithmetic (floating) constants, and address
//! constants (a static-storage symbol plus a byte offset). Every failure
//! carries a precise reason; callers turn that into one diagnostic and a
//! poison type.
//!
//! Unsigned arithmetic wraps at the target width; signed overflow is a
//! failure, not a wrap.

use hashbrown::HashMap;
use crate::symtab::{StorageDuration, SymId, SymbolTable};
use crate::types::ast::{Ast, BinOp, NodeId, NodeKind, UnOp};
use crate::types::ty::{CType, Quals, TyKind, TypeTable};

/// Why evaluation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailReason {
  /// The expression contains a construct that is not constant-foldable
  /// (function call, assignment, reference to an automatic object, ...).
  NotConstant,
  /// A signed integer operation overflowed its type.
  SignedOverflow,
  /// Integer division or remainder by zero.
  DivisionByZero,
  /// An operand had a shape or type the operator cannot fold.
  BadOperand,
  /// The construct is recognized but unsupported (e.g. `long double`
  /// arithmetic).
  Unsupported,
}

impl std::fmt::Display for FailReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      FailReason::NotConstant => "expression is not constant",
      FailReason::SignedOverflow => "signed overflow in constant expression",
      FailReason::DivisionByZero => "division by zero in constant expression",
      FailReason::BadOperand => "invalid operand in constant expression",
      FailReason::Unsupported => "unsupported construct in constant expression",
    })
  }
}

/// An evaluation failure: the reason and the node it arose at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstFailure {
  /// The failure reason.
  pub reason: FailReason,
  /// The node evaluation stopped at.
  pub at: NodeId,
}

/// A successfully folded constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
  /// An integer constant: the value image (two's complement, truncated to
  /// the type's width) and its type.
  Int {
    /// The value, zero-extended from the type's width.
    image: u64,
    /// The constant's type.
    ty: CType,
  },
  /// A floating constant and its type.
  Arith {
    /// The value. `float` constants are stored at `f64` precision and
    /// rounded when the byte image is taken.
    value: f64,
    /// The constant's type.
    ty: CType,
  },
  /// An address constant: a static-storage symbol plus a byte offset.
  Addr {
    /// The symbol whose address is taken.
    sym: SymId,
    /// The byte offset from the symbol.
    offset: u64,
    /// Whether the offset is negated.
    negative: bool,
  },
}

/// The result of constant evaluation.
pub type ConstResult = Result<ConstValue, ConstFailure>;

fn mask(width: u64) -> u64 {
  if width >= 8 { u64::MAX } else { (1 << (8 * width)) - 1 }
}

fn sign_extend(image: u64, width: u64) -> i64 {
  if width >= 8 { return image as i64 }
  if width == 0 { return 0 }
  let shift = 64 - 8 * u32::try_from(width).expect("width fits");
  ((image << shift) as i64) >> shift
}

impl ConstValue {
  /// An `int`-typed constant.
  #[must_use] pub fn int(v: i64) -> Self {
    ConstValue::Int { image: v as u64 & mask(4), ty: TyKind::Int.into() }
  }

  /// The constant's type; address constants have no arithmetic type.
  #[must_use] pub fn ty(&self) -> Option<&CType> {
    match self {
      ConstValue::Int { ty, .. } | ConstValue::Arith { ty, .. } => Some(ty),
      ConstValue::Addr { .. } => None,
    }
  }

  /// The value as a signed 64-bit integer, sign-extended from the type's
  /// width.
  #[must_use] pub fn as_i64(&self) -> i64 {
    match self {
      ConstValue::Int { image, ty } =>
        if ty.is_signed_integer() { sign_extend(*image, ty.int_width()) }
        else { *image as i64 },
      #[allow(clippy::cast_possible_truncation)]
      ConstValue::Arith { value, .. } => *value as i64,
      ConstValue::Addr { .. } => 0,
    }
  }

  /// The value as an unsigned 64-bit integer, zero-extended from the
  /// type's width.
  #[must_use] pub fn as_u64(&self) -> u64 {
    match self {
      ConstValue::Int { image, .. } => *image,
      #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
      ConstValue::Arith { value, .. } => *value as u64,
      ConstValue::Addr { .. } => 0,
    }
  }

  /// Whether this is an integer or floating constant equal to zero.
  #[must_use] pub fn is_zero(&self) -> bool {
    match self {
      ConstValue::Int { image, .. } => *image == 0,
      ConstValue::Arith { value, .. } => *value == 0.0,
      ConstValue::Addr { .. } => false,
    }
  }

  /// Coerce the constant to another arithmetic class, truncating,
  /// extending or rounding as the classes dictate.
  #[must_use] pub fn convert_class(&self, to: &CType) -> ConstValue {
    let to = to.unqualified();
    match self {
      ConstValue::Int { image, ty } => {
        if to.is_floating() {
          let v = if ty.is_signed_integer() {
            sign_extend(*image, ty.int_width()) as f64
          } else {
            *image as f64
          };
          ConstValue::Arith { value: v, ty: to }
        } else {
          let v = if ty.is_signed_integer() {
            sign_extend(*image, ty.int_width()) as u64
          } else {
            *image
          };
          ConstValue::Int { image: v & mask(to.int_width()), ty: to }
        }
      }
      ConstValue::Arith { value, ty: _ } => {
        if to.is_floating() {
          let value = if to.kind == TyKind::Float { f64::from(*value as f32) } else { *value };
          ConstValue::Arith { value, ty: to }
        } else {
          #[allow(clippy::cast_possible_truncation)]
          let v = *value as i64;
          ConstValue::Int { image: v as u64 & mask(to.int_width()), ty: to }
        }
      }
      ConstValue::Addr { .. } => self.clone(),
    }
  }

  /// The little-endian byte image of the constant at its own type's width.
  #[must_use] pub fn bytes(&self, tt: &TypeTable) -> Vec<u8> {
    use byteorder::{ByteOrder, LE};
    match self {
      ConstValue::Int { image, ty } => {
        let mut buf = [0u8; 8];
        LE::write_u64(&mut buf, *image);
        buf[..usize::try_from(ty.size(tt).unwrap_or(8)).expect("size fits")].to_vec()
      }
      ConstValue::Arith { value, ty } => {
        if ty.kind == TyKind::Float {
          #[allow(clippy::cast_possible_truncation)]
          let bits = (*value as f32).to_bits();
          bits.to_le_bytes().to_vec()
        } else {
          value.to_bits().to_le_bytes().to_vec()
        }
      }
      ConstValue::Addr { offset, negative, .. } => {
        let v = if *negative { (*offset as i64).wrapping_neg() } else { *offset as i64 };
        v.to_le_bytes().to_vec()
      }
    }
  }
}

/// The evaluation context: the tree, the interned types, the symbol table
/// and the analyzer's decoration tables built so far.
pub struct ConstEval<'a> {
  /// The syntax tree.
  pub ast: &'a Ast,
  /// The record/enum arena.
  pub tt: &'a TypeTable,
  /// The symbol table.
  pub st: &'a SymbolTable,
  /// Expression decorations (every child of an evaluated node is already
  /// decorated when evaluation runs).
  pub types: &'a HashMap<NodeId, CType>,
  /// The denoted types of `TypeName` nodes.
  pub type_names: &'a HashMap<NodeId, CType>,
  /// Resolved identifier references.
  pub resolved: &'a HashMap<NodeId, SymId>,
  /// Values of enumeration constants.
  pub enum_values: &'a HashMap<SymId, i64>,
}

impl ConstEval<'_> {
  fn fail(&self, at: NodeId, reason: FailReason) -> ConstFailure {
    ConstFailure { reason, at }
  }

  fn expr_ty(&self, id: NodeId) -> CType {
    self.types.get(&id).cloned().unwrap_or_else(CType::error)
  }

  /// Evaluate any constant expression: integer, arithmetic or address.
  pub fn evaluate(&self, id: NodeId) -> ConstResult {
    match &self.ast[id].kind {
      NodeKind::IntConstant(v, ty) =>
        Ok(ConstValue::Int { image: v & mask(ty.int_width()), ty: ty.unqualified() }),
      NodeKind::FloatConstant(v, ty) => {
        if ty.kind == TyKind::LongDouble {
          return Err(self.fail(id, FailReason::Unsupported))
        }
        Ok(ConstValue::Arith { value: *v, ty: ty.unqualified() })
      }
      NodeKind::StringLiteral { .. } => {
        let sym = self.st.get_by_syntax(id).ok_or(self.fail(id, FailReason::NotConstant))?;
        Ok(ConstValue::Addr { sym, offset: 0, negative: false })
      }
      NodeKind::PrimaryIdentifier(_) => {
        let sym = *self.resolved.get(&id).ok_or(self.fail(id, FailReason::NotConstant))?;
        if let Some(&v) = self.enum_values.get(&sym) {
          return Ok(ConstValue::int(v))
        }
        // a static array or function designator decays to an address constant
        let sy = &self.st[sym];
        let decays = matches!(sy.ty.kind, TyKind::Array(..) | TyKind::Function(_));
        if decays && (sy.storage == StorageDuration::Static ||
            matches!(sy.ty.kind, TyKind::Function(_))) {
          return Ok(ConstValue::Addr { sym, offset: 0, negative: false })
        }
        Err(self.fail(id, FailReason::NotConstant))
      }
      NodeKind::Unary(op, operand) => self.eval_unary(id, *op, *operand),
      NodeKind::Binary(op, lhs, rhs) => self.eval_binary(id, *op, *lhs, *rhs),
      NodeKind::Conditional { cond, then, els } => {
        let c = self.evaluate(*cond)?;
        self.evaluate(if c.is_zero() { *els } else { *then })
      }
      NodeKind::Cast { type_name, operand } => {
        let to = self.type_names.get(type_name)
          .ok_or(self.fail(id, FailReason::BadOperand))?;
        if to.kind == TyKind::LongDouble {
          return Err(self.fail(id, FailReason::Unsupported))
        }
        let v = self.evaluate(*operand)?;
        match (&v, &to.kind) {
          (_, k) if CType::new(k.clone()).is_arithmetic() => match v {
            ConstValue::Addr { .. } => Err(self.fail(id, FailReason::BadOperand)),
            _ => Ok(v.convert_class(to)),
          },
          (ConstValue::Addr { .. }, TyKind::Pointer(_)) => Ok(v),
          (ConstValue::Int { .. }, TyKind::Pointer(_)) =>
            // keep the integer image; pointer-typed integer constants only
            // survive as null pointer constants or reinterpreted addresses
            Ok(v),
          _ => Err(self.fail(id, FailReason::BadOperand)),
        }
      }
      NodeKind::SizeofExpr(operand) => {
        let ty = self.expr_ty(*operand);
        let size = ty.size(self.tt).ok_or(self.fail(id, FailReason::BadOperand))?;
        Ok(ConstValue::Int { image: size, ty: CType::size_t() })
      }
      NodeKind::SizeofType(tn) => {
        let ty = self.type_names.get(tn).ok_or(self.fail(id, FailReason::BadOperand))?;
        let size = ty.size(self.tt).ok_or(self.fail(id, FailReason::BadOperand))?;
        Ok(ConstValue::Int { image: size, ty: CType::size_t() })
      }
      _ => Err(self.fail(id, FailReason::NotConstant)),
    }
  }

  /// Evaluate an expression that must fold to an integer constant.
  pub fn evaluate_integer(&self, id: NodeId) -> ConstResult {
    match self.evaluate(id)? {
      v @ ConstValue::Int { .. } => Ok(v),
      _ => Err(self.fail(id, FailReason::BadOperand)),
    }
  }

  fn eval_unary(&self, id: NodeId, op: UnOp, operand: NodeId) -> ConstResult {
    match op {
      UnOp::Reference => self.eval_address(operand),
      UnOp::Plus | UnOp::Minus | UnOp::Complement => {
        let v = self.evaluate(operand)?;
        let ty = self.expr_ty(id);
        match v {
          ConstValue::Arith { value, .. } => {
            if op == UnOp::Complement {
              return Err(self.fail(id, FailReason::BadOperand))
            }
            let value = if op == UnOp::Minus { -value } else { value };
            Ok(ConstValue::Arith { value, ty: ty.unqualified() })
          }
          ConstValue::Int { .. } => {
            let ty = if ty.is_error() { v.ty().expect("int has a type").clone() } else { ty };
            let v = v.convert_class(&ty);
            let x = v.as_i64();
            let folded = match op {
              UnOp::Plus => x,
              UnOp::Minus => x.checked_neg()
                .ok_or(self.fail(id, FailReason::SignedOverflow))?,
              _ => !x,
            };
            self.fit(id, folded, &ty)
          }
          ConstValue::Addr { sym, offset, negative } => match op {
            // negating an address constant flips the offset sign
            UnOp::Minus => Ok(ConstValue::Addr { sym, offset, negative: !negative }),
            _ => Err(self.fail(id, FailReason::BadOperand)),
          },
        }
      }
      UnOp::Not => {
        let v = self.evaluate(operand)?;
        Ok(ConstValue::int(i64::from(v.is_zero())))
      }
      UnOp::Dereference => Err(self.fail(id, FailReason::NotConstant)),
      UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec =>
        Err(self.fail(id, FailReason::NotConstant)),
    }
  }

  /// Fold the address of an lvalue with static storage: a designator, a
  /// constant subscript, a member access, or a dereference of an address
  /// constant.
  fn eval_address(&self, id: NodeId) -> ConstResult {
    match &self.ast[id].kind {
      NodeKind::PrimaryIdentifier(_) => {
        let sym = *self.resolved.get(&id).ok_or(self.fail(id, FailReason::NotConstant))?;
        let sy = &self.st[sym];
        if sy.storage == StorageDuration::Static || matches!(sy.ty.kind, TyKind::Function(_)) {
          Ok(ConstValue::Addr { sym, offset: 0, negative: false })
        } else {
          Err(self.fail(id, FailReason::NotConstant))
        }
      }
      NodeKind::StringLiteral { .. } => self.evaluate(id),
      NodeKind::Subscript { array, index } => {
        let base = self.eval_address(*array).or_else(|_| self.evaluate(*array))?;
        let idx = self.evaluate_integer(*index)?;
        let elem_size = self.expr_ty(id).size(self.tt)
          .ok_or(self.fail(id, FailReason::BadOperand))?;
        match base {
          ConstValue::Addr { sym, offset, negative: false } => Ok(ConstValue::Addr {
            sym,
            offset: offset.wrapping_add(idx.as_i64().wrapping_mul(elem_size as i64) as u64),
            negative: false,
          }),
          _ => Err(self.fail(id, FailReason::BadOperand)),
        }
      }
      NodeKind::Member { lhs, name } => {
        let base = self.eval_address(*lhs)?;
        let lhs_ty = self.expr_ty(*lhs);
        let (TyKind::Struct(rec) | TyKind::Union(rec)) = lhs_ty.kind else {
          return Err(self.fail(id, FailReason::BadOperand))
        };
        let (_, off) = self.tt.member_info(rec, name)
          .ok_or(self.fail(id, FailReason::BadOperand))?;
        match base {
          ConstValue::Addr { sym, offset, negative: false } =>
            Ok(ConstValue::Addr { sym, offset: offset.wrapping_add(off), negative: false }),
          _ => Err(self.fail(id, FailReason::BadOperand)),
        }
      }
      NodeKind::Unary(UnOp::Dereference, p) => self.evaluate(*p),
      _ => Err(self.fail(id, FailReason::NotConstant)),
    }
  }

  fn fit(&self, at: NodeId, value: i64, ty: &CType) -> ConstResult {
    let width = ty.int_width();
    if ty.is_signed_integer() {
      let lo = if width >= 8 { i64::MIN } else { -(1_i64 << (8 * width - 1)) };
      let hi = if width >= 8 { i64::MAX } else { (1_i64 << (8 * width - 1)) - 1 };
      if value < lo || value > hi {
        return Err(self.fail(at, FailReason::SignedOverflow))
      }
    }
    Ok(ConstValue::Int { image: value as u64 & mask(width), ty: ty.unqualified() })
  }

  #[allow(clippy::too_many_lines)]
  fn eval_binary(&self, id: NodeId, op: BinOp, lhs: NodeId, rhs: NodeId) -> ConstResult {
    // logical operators short-circuit: the untaken side need not be constant
    if let BinOp::LogAnd | BinOp::LogOr = op {
      let l = self.evaluate(lhs)?;
      let decided = match op {
        BinOp::LogAnd => l.is_zero().then_some(0),
        _ => (!l.is_zero()).then_some(1),
      };
      if let Some(v) = decided { return Ok(ConstValue::int(v)) }
      let r = self.evaluate(rhs)?;
      return Ok(ConstValue::int(i64::from(!r.is_zero())))
    }

    let l = self.evaluate(lhs)?;
    let r = self.evaluate(rhs)?;

    // address constant plus or minus an integer constant
    if let (BinOp::Add | BinOp::Sub, ConstValue::Addr { .. }) = (op, &l) {
      return self.addr_offset(id, lhs, l, r, op == BinOp::Sub)
    }
    if let (BinOp::Add, ConstValue::Addr { .. }) = (op, &r) {
      return self.addr_offset(id, rhs, r, l, false)
    }

    let lty = l.ty().ok_or(self.fail(id, FailReason::BadOperand))?.clone();
    let rty = r.ty().ok_or(self.fail(id, FailReason::BadOperand))?.clone();

    if lty.is_floating() || rty.is_floating() {
      let common = lty.usual_arithmetic_conversions(&rty);
      if common.kind == TyKind::LongDouble {
        return Err(self.fail(id, FailReason::Unsupported))
      }
      let (ConstValue::Arith { value: a, .. }, ConstValue::Arith { value: b, .. }) =
          (l.convert_class(&common), r.convert_class(&common)) else {
        return Err(self.fail(id, FailReason::BadOperand))
      };
      let arith = |v: f64| Ok(ConstValue::Arith { value: v, ty: common.clone() });
      let cmp = |b: bool| Ok(ConstValue::int(i64::from(b)));
      return match op {
        BinOp::Add => arith(a + b),
        BinOp::Sub => arith(a - b),
        BinOp::Mul => arith(a * b),
        BinOp::Div => arith(a / b),
        BinOp::Lt => cmp(a < b),
        BinOp::Gt => cmp(a > b),
        BinOp::Le => cmp(a <= b),
        BinOp::Ge => cmp(a >= b),
        BinOp::Eq => cmp(a == b),
        BinOp::Ne => cmp(a != b),
        _ => Err(self.fail(id, FailReason::BadOperand)),
      }
    }

    // shifts take the promoted left operand's type, everything else the
    // usual arithmetic conversions
    let common = match op {
      BinOp::Shl | BinOp::Shr => lty.integer_promotions(),
      _ => lty.usual_arithmetic_conversions(&rty),
    };
    let lc = l.convert_class(&common);
    let rc = if let BinOp::Shl | BinOp::Shr = op { r.clone() } else { r.convert_class(&common) };
    let width = common.int_width();

    if let BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne = op {
      let res = if common.is_signed_integer() {
        let (a, b) = (lc.as_i64(), rc.as_i64());
        match op {
          BinOp::Lt => a < b, BinOp::Gt => a > b, BinOp::Le => a <= b,
          BinOp::Ge => a >= b, BinOp::Eq => a == b, _ => a != b,
        }
      } else {
        let (a, b) = (lc.as_u64(), rc.as_u64());
        match op {
          BinOp::Lt => a < b, BinOp::Gt => a > b, BinOp::Le => a <= b,
          BinOp::Ge => a >= b, BinOp::Eq => a == b, _ => a != b,
        }
      };
      return Ok(ConstValue::int(i64::from(res)))
    }

    if common.is_signed_integer() {
      let (a, b) = (lc.as_i64(), rc.as_i64());
      let folded = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div | BinOp::Mod => {
          if b == 0 { return Err(self.fail(id, FailReason::DivisionByZero)) }
          if op == BinOp::Div { a.checked_div(b) } else { a.checked_rem(b) }
        }
        BinOp::BitAnd => Some(a & b),
        BinOp::BitOr => Some(a | b),
        BinOp::BitXor => Some(a ^ b),
        BinOp::Shl => {
          let sh = u32::try_from(rc.as_u64()).ok()
            .filter(|&s| u64::from(s) < 8 * width)
            .ok_or(self.fail(id, FailReason::BadOperand))?;
          a.checked_shl(sh)
        }
        BinOp::Shr => {
          let sh = u32::try_from(rc.as_u64()).ok()
            .filter(|&s| u64::from(s) < 8 * width)
            .ok_or(self.fail(id, FailReason::BadOperand))?;
          Some(a >> sh)
        }
        _ => None,
      };
      let v = folded.ok_or(self.fail(id, FailReason::SignedOverflow))?;
      self.fit(id, v, &common)
    } else {
      let (a, b) = (lc.as_u64(), rc.as_u64());
      let folded = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Mod => {
          if b == 0 { return Err(self.fail(id, FailReason::DivisionByZero)) }
          if op == BinOp::Div { a / b } else { a % b }
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl | BinOp::Shr => {
          let sh = rc.as_u64();
          if sh >= 8 * width { return Err(self.fail(id, FailReason::BadOperand)) }
          if op == BinOp::Shl { a << sh } else { a >> sh }
        }
        _ => return Err(self.fail(id, FailReason::BadOperand)),
      };
      Ok(ConstValue::Int { image: folded & mask(width), ty: common })
    }
  }

  /// `&x ± n` scaled by the pointed-to type's size.
  fn addr_offset(&self, id: NodeId, ptr_node: NodeId, addr: ConstValue,
      delta: ConstValue, negate: bool) -> ConstResult {
    let ConstValue::Addr { sym, offset, negative } = addr else { unreachable!() };
    let ConstValue::Int { .. } = delta else {
      return Err(self.fail(id, FailReason::BadOperand))
    };
    let pointee_size = self.expr_ty(ptr_node).pointee()
      .and_then(|t| t.size(self.tt))
      .ok_or(self.fail(id, FailReason::BadOperand))?;
    let mut step = delta.as_i64().wrapping_mul(pointee_size as i64);
    if negate { step = step.wrapping_neg() }
    Ok(ConstValue::Addr {
      sym,
      offset: offset.wrapping_add(step as u64),
      negative,
    })
  }
}

/// Recognize a null pointer constant (ISO 6.3.2.3 (3)): an integer
/// constant expression with value zero, or such an expression cast to an
/// unqualified `void *`.
#[must_use] pub fn is_null_ptr_constant(cx: &ConstEval<'_>, mut id: NodeId) -> bool {
  if let NodeKind::Cast { type_name, operand } = &cx.ast[id].kind {
    let NodeKind::TypeName { specifiers, declarator } = &cx.ast[*type_name].kind else {
      return false
    };
    let void_only = specifiers.len() == 1 &&
      matches!(cx.ast[specifiers[0]].kind,
        NodeKind::BasicTypeSpecifier(crate::types::ast::Bts::Void));
    if !void_only { return false }
    let Some(declr) = declarator else { return false };
    let NodeKind::PointerDeclarator { quals, inner } = &cx.ast[*declr].kind else {
      return false
    };
    if *quals != Quals::empty() { return false }
    if !matches!(cx.ast[*inner].kind, NodeKind::AbstractBase) { return false }
    id = *operand;
  }
  matches!(cx.evaluate_integer(id), Ok(v) if v.is_zero())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Span;
  use crate::types::ast::Bts;

  struct Fixture {
    ast: Ast,
    tt: TypeTable,
    st: SymbolTable,
    types: HashMap<NodeId, CType>,
    type_names: HashMap<NodeId, CType>,
    resolved: HashMap<NodeId, SymId>,
    enum_values: HashMap<SymId, i64>,
  }

  impl Fixture {
    fn new() -> Self {
      Fixture {
        ast: Ast::new(), tt: TypeTable::default(), st: SymbolTable::new(),
        types: HashMap::new(), type_names: HashMap::new(),
        resolved: HashMap::new(), enum_values: HashMap::new(),
      }
    }

    fn int(&mut self, v: i64) -> NodeId {
      self.ast.add(NodeKind::IntConstant(v as u64, TyKind::Int.into()), Span::default())
    }

    fn bin(&mut self, op: BinOp, l: NodeId, r: NodeId) -> NodeId {
      self.ast.add(NodeKind::Binary(op, l, r), Span::default())
    }

    fn cx(&self) -> ConstEval<'_> {
      ConstEval {
        ast: &self.ast, tt: &self.tt, st: &self.st, types: &self.types,
        type_names: &self.type_names, resolved: &self.resolved,
        enum_values: &self.enum_values,
      }
    }
  }

  #[test]
  fn folds_arithmetic() {
    let mut fx = Fixture::new();
    let (two, three, four) = (fx.int(2), fx.int(3), fx.int(4));
    let mul = fx.bin(BinOp::Mul, three, four);
    let add = fx.bin(BinOp::Add, two, mul);
    let v = fx.cx().evaluate(add).unwrap();
    assert_eq!(v.as_i64(), 14);
    assert_eq!(v.ty().unwrap().kind, TyKind::Int);
  }

  #[test]
  fn evaluation_is_idempotent() {
    let mut fx = Fixture::new();
    let (a, b) = (fx.int(-7), fx.int(3));
    let div = fx.bin(BinOp::Div, a, b);
    let cx = fx.cx();
    let v1 = cx.evaluate(div).unwrap();
    let v2 = cx.evaluate(div).unwrap();
    assert_eq!(v1, v2);
    assert_eq!(v1.bytes(&fx.tt), v2.bytes(&fx.tt));
    assert_eq!(v1.as_i64(), -2);
  }

  #[test]
  fn signed_overflow_is_a_failure_unsigned_wraps() {
    let mut fx = Fixture::new();
    let max = fx.ast.add(
      NodeKind::IntConstant(i32::MAX as u64, TyKind::Int.into()), Span::default());
    let one = fx.int(1);
    let over = fx.bin(BinOp::Add, max, one);
    assert_eq!(fx.cx().evaluate(over).unwrap_err().reason, FailReason::SignedOverflow);

    let umax = fx.ast.add(
      NodeKind::IntConstant(u32::MAX.into(), TyKind::UInt.into()), Span::default());
    let one = fx.int(1);
    let wrap = fx.bin(BinOp::Add, umax, one);
    assert_eq!(fx.cx().evaluate(wrap).unwrap().as_u64(), 0);
  }

  #[test]
  fn division_by_zero_is_reported() {
    let mut fx = Fixture::new();
    let (a, z) = (fx.int(5), fx.int(0));
    let div = fx.bin(BinOp::Div, a, z);
    assert_eq!(fx.cx().evaluate(div).unwrap_err().reason, FailReason::DivisionByZero);
  }

  #[test]
  fn null_pointer_constants() {
    let mut fx = Fixture::new();
    // 0
    let zero = fx.int(0);
    // (1 - 1)
    let (one_a, one_b) = (fx.int(1), fx.int(1));
    let sub = fx.bin(BinOp::Sub, one_a, one_b);
    // (void*)0
    let void_spec = fx.ast.add(NodeKind::BasicTypeSpecifier(Bts::Void), Span::default());
    let base = fx.ast.add(NodeKind::AbstractBase, Span::default());
    let ptr = fx.ast.add(
      NodeKind::PointerDeclarator { quals: Quals::empty(), inner: base }, Span::default());
    let tn = fx.ast.add(
      NodeKind::TypeName { specifiers: vec![void_spec], declarator: Some(ptr) },
      Span::default());
    let z2 = fx.int(0);
    let cast = fx.ast.add(NodeKind::Cast { type_name: tn, operand: z2 }, Span::default());
    // (void*)1
    let o2 = fx.int(1);
    let cast_one = fx.ast.add(NodeKind::Cast { type_name: tn, operand: o2 }, Span::default());
    // 0.0
    let fzero = fx.ast.add(
      NodeKind::FloatConstant(0.0, TyKind::Double.into()), Span::default());

    let cx = fx.cx();
    assert!(is_null_ptr_constant(&cx, zero));
    assert!(is_null_ptr_constant(&cx, sub));
    assert!(is_null_ptr_constant(&cx, cast));
    assert!(!is_null_ptr_constant(&cx, cast_one));
    assert!(!is_null_ptr_constant(&cx, fzero));
  }

  #[test]
  fn convert_class_round_trips_widths() {
    let v = ConstValue::Int { image: 0xFFFF_FFFF_FFFF_FF85, ty: TyKind::Long.into() };
    let c = v.convert_class(&TyKind::Char.into());
    assert_eq!(c.as_i64(), -123);
    let u = c.convert_class(&TyKind::UInt.into());
    assert_eq!(u.as_u64(), 0xFFFF_FF85);
    let f = u.convert_class(&TyKind::Double.into());
    assert_eq!(f.as_i64(), 0xFFFF_FF85);
  }
}
