//! The C type system: type values, record/enum interning, size and
//! alignment, conversions, compatibility and composition.
//!
//! Types are value-like and explicitly cloned. Structs, unions and enums are
//! interned in a [`TypeTable`] and referenced by handle, so a member whose
//! type points back at its enclosing record is just a handle cycle rather
//! than an ownership cycle.

use bitflags::bitflags;
use super::{mk_id, IdxVec};
use super::ast::NodeId;

bitflags! {
  /// The type qualifier set attached to every type.
  #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
  pub struct Quals: u8 {
    /// The `const` qualifier.
    const CONST = 1;
    /// The `volatile` qualifier.
    const VOLATILE = 2;
    /// The `restrict` qualifier.
    const RESTRICT = 4;
  }
}

mk_id! {
  /// A handle to a struct or union declaration in a [`TypeTable`].
  RecordId,
  /// A handle to an enum declaration in a [`TypeTable`].
  EnumId,
}

/// Whether a record is a struct or a union.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
  /// A `struct`: members at increasing offsets.
  Struct,
  /// A `union`: members all at offset zero.
  Union,
}

/// One member of a struct or union.
#[derive(Clone, Debug)]
pub struct Member {
  /// The member name. Anonymous bitfield members have an empty name.
  pub name: String,
  /// The member type.
  pub ty: CType,
  /// The declared bitfield width, if this member is a bitfield.
  /// Bitfield storage layout is unsupported; widths are only
  /// constraint-checked.
  pub bit_width: Option<u32>,
}

/// An interned struct or union declaration.
#[derive(Clone, Debug)]
pub struct Record {
  /// Struct or union.
  pub kind: RecordKind,
  /// The declared tag, if any.
  pub tag: Option<String>,
  /// The members, or `None` while the record is incomplete.
  pub members: Option<Vec<Member>>,
}

/// An interned enum declaration.
#[derive(Clone, Debug)]
pub struct EnumDef {
  /// The declared tag, if any.
  pub tag: Option<String>,
  /// The enumeration constants in declaration order, with their values.
  pub constants: Vec<(String, i64)>,
}

/// The arena of record and enum declarations for one translation unit.
#[derive(Debug, Default)]
pub struct TypeTable {
  /// Struct/union declarations.
  pub records: IdxVec<RecordId, Record>,
  /// Enum declarations.
  pub enums: IdxVec<EnumId, EnumDef>,
}

impl TypeTable {
  /// Intern a new, initially incomplete record.
  pub fn declare_record(&mut self, kind: RecordKind, tag: Option<String>) -> RecordId {
    self.records.push(Record { kind, tag, members: None })
  }

  /// Intern a new enum declaration.
  pub fn declare_enum(&mut self, tag: Option<String>) -> EnumId {
    self.enums.push(EnumDef { tag, constants: vec![] })
  }

  /// Find a member by name. Returns the member index and its byte offset
  /// within the record.
  #[must_use] pub fn member_info(&self, id: RecordId, name: &str) -> Option<(usize, u64)> {
    let rec = &self.records[id];
    let members = rec.members.as_deref()?;
    let idx = members.iter().position(|m| m.name == name)?;
    Some((idx, self.member_offset(id, idx)))
  }

  /// The byte offset of member `idx` within the record.
  #[must_use] pub fn member_offset(&self, id: RecordId, idx: usize) -> u64 {
    let rec = &self.records[id];
    if rec.kind == RecordKind::Union { return 0 }
    let members = rec.members.as_deref().expect("offset of incomplete record member");
    let mut off = 0;
    for m in &members[..idx] {
      let align = m.ty.alignment(self).unwrap_or(1);
      off = align_up(off, align) + m.ty.size(self).unwrap_or(0);
    }
    align_up(off, members[idx].ty.alignment(self).unwrap_or(1))
  }
}

fn align_up(n: u64, align: u64) -> u64 {
  if align == 0 { return n }
  n.div_ceil(align) * align
}

/// The length of an array type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayLen {
  /// A known constant length.
  Fixed(u64),
  /// An array of unspecified length (`[]`), incomplete until an
  /// initializer fixes it.
  Unspecified,
  /// A length given by a non-constant expression. This is what a VLA
  /// declarator parses to; the analyzer rejects it as unsupported.
  Expr(NodeId),
}

/// A function type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnType {
  /// The return type.
  pub ret: CType,
  /// The parameter types, or `None` for a declarator without a prototype
  /// (K&R style, rejected by the analyzer).
  pub params: Option<Vec<CType>>,
  /// Whether the parameter list ends in `...`.
  pub variadic: bool,
  /// Whether the function was declared `inline`.
  pub inline: bool,
}

/// The class of a C type, with class-dependent payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TyKind {
  /// `void`.
  Void,
  /// `_Bool`.
  Bool,
  /// Plain `char`, a distinct type from both `signed char` and
  /// `unsigned char`.
  Char,
  /// `signed char`.
  SChar,
  /// `unsigned char`.
  UChar,
  /// `short`.
  Short,
  /// `unsigned short`.
  UShort,
  /// `int`.
  Int,
  /// `unsigned int`.
  UInt,
  /// `long`.
  Long,
  /// `unsigned long`.
  ULong,
  /// `long long`.
  LongLong,
  /// `unsigned long long`.
  ULongLong,
  /// `float`.
  Float,
  /// `double`.
  Double,
  /// `long double` (parsed, rejected as unsupported).
  LongDouble,
  /// A pointer to the given type.
  Pointer(Box<CType>),
  /// An array of the given element type and length.
  Array(Box<CType>, ArrayLen),
  /// A function type.
  Function(Box<FnType>),
  /// A struct, by handle.
  Struct(RecordId),
  /// A union, by handle.
  Union(RecordId),
  /// An enumeration, by handle.
  Enum(EnumId),
  /// The type of a statement label.
  Label,
  /// The poison type: produced when decoration fails, silently absorbed by
  /// every operator so one bad subexpression does not cascade.
  Error,
}

/// A C type: a class plus qualifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CType {
  /// The type class.
  pub kind: TyKind,
  /// The qualifier set.
  pub quals: Quals,
}

impl From<TyKind> for CType {
  fn from(kind: TyKind) -> Self { Self { kind, quals: Quals::empty() } }
}

impl CType {
  /// An unqualified type of the given class.
  #[must_use] pub fn new(kind: TyKind) -> Self { kind.into() }

  /// The poison type.
  #[must_use] pub fn error() -> Self { TyKind::Error.into() }

  /// A pointer to `self`. The pointer itself is unqualified.
  #[must_use] pub fn pointer_to(self) -> Self { TyKind::Pointer(Box::new(self)).into() }

  /// An array of `self` with the given length.
  #[must_use] pub fn array_of(self, len: ArrayLen) -> Self {
    TyKind::Array(Box::new(self), len).into()
  }

  /// `size_t` on this target.
  #[must_use] pub fn size_t() -> Self { TyKind::ULong.into() }

  /// `ptrdiff_t` on this target.
  #[must_use] pub fn ptrdiff_t() -> Self { TyKind::Long.into() }

  /// `wchar_t` on this target.
  #[must_use] pub fn wchar_t() -> Self { TyKind::Int.into() }

  /// A copy of `self` with no qualifiers.
  #[must_use] pub fn unqualified(&self) -> Self {
    Self { kind: self.kind.clone(), quals: Quals::empty() }
  }

  /// Whether this is the poison type.
  #[must_use] pub fn is_error(&self) -> bool { matches!(self.kind, TyKind::Error) }

  /// Whether this is an integer type (including `_Bool`, plain `char` and
  /// enumerations).
  #[must_use] pub fn is_integer(&self) -> bool {
    matches!(self.kind,
      TyKind::Bool | TyKind::Char | TyKind::SChar | TyKind::UChar |
      TyKind::Short | TyKind::UShort | TyKind::Int | TyKind::UInt |
      TyKind::Long | TyKind::ULong | TyKind::LongLong | TyKind::ULongLong |
      TyKind::Enum(_))
  }

  /// Whether this is a signed integer type. Plain `char` is signed on this
  /// target; enumerations count as signed `int`.
  #[must_use] pub fn is_signed_integer(&self) -> bool {
    matches!(self.kind,
      TyKind::Char | TyKind::SChar | TyKind::Short | TyKind::Int |
      TyKind::Long | TyKind::LongLong | TyKind::Enum(_))
  }

  /// Whether this is an unsigned integer type.
  #[must_use] pub fn is_unsigned_integer(&self) -> bool {
    matches!(self.kind,
      TyKind::Bool | TyKind::UChar | TyKind::UShort | TyKind::UInt |
      TyKind::ULong | TyKind::ULongLong)
  }

  /// Whether this is one of the three character types.
  #[must_use] pub fn is_character(&self) -> bool {
    matches!(self.kind, TyKind::Char | TyKind::SChar | TyKind::UChar)
  }

  /// Whether this is a floating type.
  #[must_use] pub fn is_floating(&self) -> bool {
    matches!(self.kind, TyKind::Float | TyKind::Double | TyKind::LongDouble)
  }

  /// Whether this is a floating type carried in SSE registers
  /// (`float` or `double`; `long double` is not).
  #[must_use] pub fn is_sse_floating(&self) -> bool {
    matches!(self.kind, TyKind::Float | TyKind::Double)
  }

  /// Whether this is an arithmetic type.
  #[must_use] pub fn is_arithmetic(&self) -> bool {
    self.is_integer() || self.is_floating()
  }

  /// Whether this is a real type. With `_Complex` unsupported this
  /// coincides with the arithmetic types.
  #[must_use] pub fn is_real(&self) -> bool { self.is_arithmetic() }

  /// Whether this is a scalar type (arithmetic or pointer).
  #[must_use] pub fn is_scalar(&self) -> bool {
    self.is_arithmetic() || matches!(self.kind, TyKind::Pointer(_))
  }

  /// Whether this is a complete type: its size is known.
  #[must_use] pub fn is_complete(&self, tt: &TypeTable) -> bool {
    match &self.kind {
      TyKind::Void | TyKind::Error | TyKind::Label => false,
      TyKind::Array(elem, len) =>
        matches!(len, ArrayLen::Fixed(_)) && elem.is_complete(tt),
      TyKind::Struct(id) | TyKind::Union(id) => tt.records[*id].members.is_some(),
      TyKind::Function(_) => false,
      _ => true,
    }
  }

  /// Whether this is a complete object type: `sizeof` is defined for it.
  /// Function types are never object types.
  #[must_use] pub fn is_object(&self, tt: &TypeTable) -> bool {
    !matches!(self.kind, TyKind::Function(_)) && self.is_complete(tt)
  }

  /// Whether this array type's length is a non-constant expression.
  #[must_use] pub fn is_vla(&self) -> bool {
    matches!(&self.kind, TyKind::Array(_, ArrayLen::Expr(_)))
  }

  /// The known array length, if this is an array of fixed length.
  #[must_use] pub fn array_length(&self) -> Option<u64> {
    match &self.kind {
      TyKind::Array(_, ArrayLen::Fixed(n)) => Some(*n),
      _ => None,
    }
  }

  /// Whether this is a function type declared `inline`.
  #[must_use] pub fn is_inline_function(&self) -> bool {
    matches!(&self.kind, TyKind::Function(f) if f.inline)
  }

  /// Whether this struct/union type ends in a flexible array member.
  #[must_use] pub fn has_flexible_array_member(&self, tt: &TypeTable) -> bool {
    let (TyKind::Struct(id) | TyKind::Union(id)) = self.kind else { return false };
    let Some(members) = tt.records[id].members.as_deref() else { return false };
    members.last().is_some_and(|m|
      matches!(m.ty.kind, TyKind::Array(_, ArrayLen::Unspecified)))
  }

  /// The size of the type in bytes, if it is complete.
  #[must_use] pub fn size(&self, tt: &TypeTable) -> Option<u64> {
    Some(match &self.kind {
      TyKind::Bool | TyKind::Char | TyKind::SChar | TyKind::UChar => 1,
      TyKind::Short | TyKind::UShort => 2,
      TyKind::Int | TyKind::UInt | TyKind::Float | TyKind::Enum(_) => 4,
      TyKind::Long | TyKind::ULong | TyKind::LongLong | TyKind::ULongLong |
      TyKind::Double | TyKind::Pointer(_) => 8,
      TyKind::LongDouble => 16,
      TyKind::Array(elem, ArrayLen::Fixed(n)) => elem.size(tt)?.checked_mul(*n)?,
      TyKind::Struct(id) => {
        let members = tt.records[*id].members.as_deref()?;
        let mut off = 0;
        for m in members {
          let align = m.ty.alignment(tt)?;
          off = align_up(off, align) + m.ty.size(tt).unwrap_or(0);
        }
        align_up(off, self.alignment(tt)?)
      }
      TyKind::Union(id) => {
        let members = tt.records[*id].members.as_deref()?;
        let size = members.iter().map(|m| m.ty.size(tt).unwrap_or(0)).max().unwrap_or(0);
        align_up(size, self.alignment(tt)?)
      }
      TyKind::Void | TyKind::Function(_) | TyKind::Label | TyKind::Error |
      TyKind::Array(..) => return None,
    })
  }

  /// The alignment of the type in bytes, if it is complete.
  #[must_use] pub fn alignment(&self, tt: &TypeTable) -> Option<u64> {
    Some(match &self.kind {
      TyKind::Array(elem, _) => elem.alignment(tt)?,
      TyKind::Struct(id) | TyKind::Union(id) => {
        let members = tt.records[*id].members.as_deref()?;
        members.iter().filter_map(|m| m.ty.alignment(tt)).max().unwrap_or(1)
      }
      _ => self.size(tt)?,
    })
  }

  /// The integer conversion rank per ISO 6.3.1.1. Defined for integer
  /// types only.
  #[must_use] pub fn rank(&self) -> u8 {
    match self.kind {
      TyKind::Bool => 1,
      TyKind::Char | TyKind::SChar | TyKind::UChar => 2,
      TyKind::Short | TyKind::UShort => 3,
      TyKind::Int | TyKind::UInt | TyKind::Enum(_) => 4,
      TyKind::Long | TyKind::ULong => 5,
      TyKind::LongLong | TyKind::ULongLong => 6,
      _ => 0,
    }
  }

  /// The integer promotions per ISO 6.3.1.1 (2). Types of rank below `int`
  /// promote to `int` (every such type's values fit in `int` on this
  /// target); enumerations promote to `int`; everything else passes
  /// through unqualified.
  #[must_use] pub fn integer_promotions(&self) -> CType {
    if self.is_integer() && self.rank() <= CType::new(TyKind::Int).rank() {
      TyKind::Int.into()
    } else {
      self.unqualified()
    }
  }

  /// The storage width in bytes of an integer class. Zero for
  /// non-integer types.
  #[must_use] pub fn int_width(&self) -> u64 {
    match self.kind {
      TyKind::Bool | TyKind::Char | TyKind::SChar | TyKind::UChar => 1,
      TyKind::Short | TyKind::UShort => 2,
      TyKind::Int | TyKind::UInt | TyKind::Enum(_) => 4,
      TyKind::Long | TyKind::ULong | TyKind::LongLong | TyKind::ULongLong => 8,
      _ => 0,
    }
  }

  /// The unsigned counterpart of a signed integer class.
  fn to_unsigned(&self) -> CType {
    match self.kind {
      TyKind::Char | TyKind::SChar => TyKind::UChar.into(),
      TyKind::Short => TyKind::UShort.into(),
      TyKind::Int | TyKind::Enum(_) => TyKind::UInt.into(),
      TyKind::Long => TyKind::ULong.into(),
      TyKind::LongLong => TyKind::ULongLong.into(),
      _ => self.unqualified(),
    }
  }

  /// The usual arithmetic conversions per ISO 6.3.1.8: pick the common
  /// type of a binary arithmetic operator's operands. Both inputs must be
  /// arithmetic.
  #[must_use] pub fn usual_arithmetic_conversions(&self, other: &CType) -> CType {
    for k in [TyKind::LongDouble, TyKind::Double, TyKind::Float] {
      if self.kind == k || other.kind == k { return k.into() }
    }
    let a = self.integer_promotions();
    let b = other.integer_promotions();
    if a.kind == b.kind { return a }
    match (a.is_signed_integer(), b.is_signed_integer()) {
      (true, true) | (false, false) =>
        if a.rank() >= b.rank() { a } else { b },
      (signed_a, _) => {
        let (s, u) = if signed_a { (a, b) } else { (b, a) };
        if u.rank() >= s.rank() {
          u
        } else if s.int_width() > u.int_width() {
          // the signed type can represent every value of the unsigned type
          s
        } else {
          s.to_unsigned()
        }
      }
    }
  }

  /// Type compatibility per ISO 6.2.7. Reflexive, symmetric and
  /// qualifier-sensitive.
  #[must_use] pub fn compatible(&self, other: &CType, tt: &TypeTable) -> bool {
    if self.quals != other.quals { return false }
    match (&self.kind, &other.kind) {
      (TyKind::Pointer(a), TyKind::Pointer(b)) => a.compatible(b, tt),
      (TyKind::Array(a, la), TyKind::Array(b, lb)) => {
        if !a.compatible(b, tt) { return false }
        match (la, lb) {
          (ArrayLen::Fixed(m), ArrayLen::Fixed(n)) => m == n,
          _ => true,
        }
      }
      (TyKind::Function(f), TyKind::Function(g)) => {
        if !f.ret.compatible(&g.ret, tt) { return false }
        match (&f.params, &g.params) {
          (Some(ps), Some(qs)) =>
            f.variadic == g.variadic && ps.len() == qs.len() &&
            ps.iter().zip(qs).all(|(p, q)| p.unqualified().compatible(&q.unqualified(), tt)),
          _ => true,
        }
      }
      (TyKind::Struct(a), TyKind::Struct(b)) |
      (TyKind::Union(a), TyKind::Union(b)) => a == b,
      (TyKind::Enum(a), TyKind::Enum(b)) => a == b,
      (a, b) => a == b,
    }
  }

  /// Compatibility after stripping the outermost qualifiers of both types.
  #[must_use] pub fn compatible_ignoring_qualifiers(&self, other: &CType, tt: &TypeTable) -> bool {
    self.unqualified().compatible(&other.unqualified(), tt)
  }

  /// The composite type of two compatible types per ISO 6.2.7 (3):
  /// preserves all completeness and size information from both.
  #[must_use] pub fn compose(&self, other: &CType, tt: &TypeTable) -> CType {
    debug_assert!(self.compatible(other, tt), "composing incompatible types");
    let kind = match (&self.kind, &other.kind) {
      (TyKind::Pointer(a), TyKind::Pointer(b)) =>
        TyKind::Pointer(Box::new(a.compose(b, tt))),
      (TyKind::Array(a, la), TyKind::Array(b, lb)) => {
        let len = match (la, lb) {
          (ArrayLen::Fixed(n), _) | (_, ArrayLen::Fixed(n)) => ArrayLen::Fixed(*n),
          (la, _) => la.clone(),
        };
        TyKind::Array(Box::new(a.compose(b, tt)), len)
      }
      (TyKind::Function(f), TyKind::Function(g)) => {
        let params = match (&f.params, &g.params) {
          (Some(ps), Some(qs)) =>
            Some(ps.iter().zip(qs).map(|(p, q)| p.compose(q, tt)).collect()),
          (Some(ps), None) | (None, Some(ps)) => Some(ps.clone()),
          (None, None) => None,
        };
        TyKind::Function(Box::new(FnType {
          ret: f.ret.compose(&g.ret, tt),
          params,
          variadic: f.variadic,
          inline: f.inline || g.inline,
        }))
      }
      (kind, _) => kind.clone(),
    };
    CType { kind, quals: self.quals }
  }

  /// The decayed form of this type when it appears as an expression:
  /// arrays become pointers to their element type, functions become
  /// pointers to themselves. The *decision* of whether decay applies (it
  /// is suppressed under `sizeof`, address-of, and string literals
  /// initializing arrays) is centralized in the analyzer; this just
  /// performs the conversion.
  #[must_use] pub fn decayed(&self) -> CType {
    match &self.kind {
      TyKind::Array(elem, _) => elem.as_ref().clone().pointer_to(),
      TyKind::Function(_) => self.unqualified().pointer_to(),
      _ => self.clone(),
    }
  }

  /// The pointee of a pointer type, the element of an array type, or the
  /// referent of a function type.
  #[must_use] pub fn pointee(&self) -> Option<&CType> {
    match &self.kind {
      TyKind::Pointer(t) | TyKind::Array(t, _) => Some(t),
      _ => None,
    }
  }

  /// The function type behind this type, looking through one pointer.
  #[must_use] pub fn as_function(&self) -> Option<&FnType> {
    match &self.kind {
      TyKind::Function(f) => Some(f),
      TyKind::Pointer(p) => match &p.kind {
        TyKind::Function(f) => Some(f),
        _ => None,
      },
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn samples(tt: &mut TypeTable) -> Vec<CType> {
    let rec = tt.declare_record(RecordKind::Struct, Some("s".into()));
    tt.records[rec].members = Some(vec![
      Member { name: "a".into(), ty: TyKind::Int.into(), bit_width: None },
      Member { name: "b".into(), ty: TyKind::Double.into(), bit_width: None },
    ]);
    let mut out: Vec<CType> = [
      TyKind::Void, TyKind::Bool, TyKind::Char, TyKind::SChar, TyKind::UChar,
      TyKind::Short, TyKind::UShort, TyKind::Int, TyKind::UInt, TyKind::Long,
      TyKind::ULong, TyKind::LongLong, TyKind::ULongLong, TyKind::Float,
      TyKind::Double, TyKind::Struct(rec),
    ].map(CType::new).into();
    out.push(CType::new(TyKind::Int).pointer_to());
    out.push(CType::new(TyKind::Char).pointer_to().pointer_to());
    out.push(CType::new(TyKind::Int).array_of(ArrayLen::Fixed(4)));
    out.push(CType::new(TyKind::Int).array_of(ArrayLen::Unspecified));
    let mut cst = CType::new(TyKind::Char);
    cst.quals = Quals::CONST;
    out.push(cst.pointer_to());
    out
  }

  #[test]
  fn compatibility_is_symmetric_and_reflexive() {
    let mut tt = TypeTable::default();
    let tys = samples(&mut tt);
    for t in &tys {
      assert!(t.compatible(t, &tt), "{t:?} not self-compatible");
      for u in &tys {
        assert_eq!(t.compatible(u, &tt), u.compatible(t, &tt),
          "asymmetry between {t:?} and {u:?}");
      }
    }
  }

  #[test]
  fn usual_arithmetic_conversions_commute_in_rank() {
    let mut tt = TypeTable::default();
    let tys: Vec<_> = samples(&mut tt).into_iter().filter(CType::is_arithmetic).collect();
    for t in &tys {
      for u in &tys {
        let a = t.usual_arithmetic_conversions(u);
        let b = u.usual_arithmetic_conversions(t);
        assert_eq!(a.rank(), b.rank(), "{t:?} vs {u:?}");
        assert_eq!(a.kind, b.kind, "{t:?} vs {u:?}");
      }
    }
  }

  #[test]
  fn alignment_divides_size() {
    let mut tt = TypeTable::default();
    for t in samples(&mut tt) {
      if let (Some(size), Some(align)) = (t.size(&tt), t.alignment(&tt)) {
        assert_eq!(size % align, 0, "{t:?}");
      }
    }
  }

  #[test]
  fn array_size_is_length_times_element_size() {
    let tt = TypeTable::default();
    let arr = CType::new(TyKind::Short).array_of(ArrayLen::Fixed(7));
    assert_eq!(arr.size(&tt), Some(14));
    assert!(!CType::new(TyKind::Short).array_of(ArrayLen::Unspecified).is_complete(&tt));
  }

  #[test]
  fn unsigned_wins_rank_ties() {
    let int: CType = TyKind::Int.into();
    let uint: CType = TyKind::UInt.into();
    let long: CType = TyKind::Long.into();
    let ulonglong: CType = TyKind::ULongLong.into();
    assert_eq!(int.usual_arithmetic_conversions(&uint).kind, TyKind::UInt);
    // signed long can represent every unsigned int value on LP64
    assert_eq!(long.usual_arithmetic_conversions(&uint).kind, TyKind::Long);
    assert_eq!(long.usual_arithmetic_conversions(&ulonglong).kind, TyKind::ULongLong);
    assert_eq!(CType::new(TyKind::Char).integer_promotions().kind, TyKind::Int);
    assert_eq!(CType::new(TyKind::Bool).integer_promotions().kind, TyKind::Int);
  }

  #[test]
  fn struct_layout() {
    let mut tt = TypeTable::default();
    let TyKind::Struct(id) = samples(&mut tt).remove(15).kind else { unreachable!() };
    let ty = CType::new(TyKind::Struct(id));
    assert_eq!(ty.size(&tt), Some(16));
    assert_eq!(ty.alignment(&tt), Some(8));
    assert_eq!(tt.member_info(id, "b"), Some((1, 8)));
    assert_eq!(tt.member_info(id, "nope"), None);
  }
}
