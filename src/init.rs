//! The initializer elaborator.
//!
//! Walks an initializer list and its target type in parallel, maintaining a
//! container-type stack and an element-index stack. Each scalar initializer
//! is tagged with its target type and its byte offset within the enclosing
//! object; designators reset the stacks and descend from the outermost
//! object. Writing past the object is reported once and later writes in
//! that list are suppressed. When the outermost object is an array of
//! unspecified length, the walk records the running maximum element index
//! instead of failing, and the caller fixes the array length from it.
//!
//! A second, pure pass folds each tagged leaf to its constant value and
//! produces the static image writes and relocations for the symbol.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use crate::constexpr::{ConstEval, ConstValue};
use crate::symtab::SymId;
use crate::types::ast::{NodeId, NodeKind};
use crate::types::ty::{ArrayLen, CType, TyKind, TypeTable};
use crate::{AnalysisError, ErrorKind};

/// The elaborator's output decorations.
#[derive(Debug, Default)]
pub struct InitTables {
  /// Byte offset of each initializer within its elaboration's object.
  /// `-1` marks the initializer that would write past the object.
  pub offsets: HashMap<NodeId, i64>,
  /// Target type of each scalar (or string-literal) leaf initializer.
  pub targets: HashMap<NodeId, CType>,
  /// Lists that have already been elaborated.
  pub done: HashSet<NodeId>,
}

/// A single write produced by static-image emission.
#[derive(Debug, PartialEq)]
pub enum ImageWrite {
  /// Copy these bytes at this image offset.
  Bytes(u64, Vec<u8>),
  /// A pointer-sized relocation at this image offset: `&target + addend`.
  /// The addend is also written in place.
  Reloc(u64, SymId, i64),
}

fn element_count(tt: &TypeTable, ct: &CType) -> Option<i64> {
  match &ct.kind {
    TyKind::Union(_) => Some(1),
    TyKind::Struct(id) =>
      Some(tt.records[*id].members.as_ref().map_or(0, Vec::len) as i64),
    TyKind::Array(_, ArrayLen::Fixed(n)) => Some(*n as i64),
    TyKind::Array(_, _) => None,
    _ => Some(0),
  }
}

fn element_type(tt: &TypeTable, ct: &CType, ei: u64) -> Option<CType> {
  match &ct.kind {
    TyKind::Array(elem, _) => Some(elem.as_ref().clone()),
    TyKind::Struct(id) | TyKind::Union(id) =>
      tt.records[*id].members.as_ref()?
        .get(usize::try_from(ei).ok()?)
        .map(|m| m.ty.clone()),
    _ => None,
  }
}

fn is_char_array(ct: &CType) -> bool {
  matches!(&ct.kind, TyKind::Array(elem, _) if elem.is_character())
}

fn is_wchar_array(ct: &CType, tt: &TypeTable) -> bool {
  matches!(&ct.kind, TyKind::Array(elem, _)
    if elem.compatible_ignoring_qualifiers(&CType::wchar_t(), tt))
}

/// Whether a string literal node can begin initializing this array type
/// directly, without braces around it.
fn string_initializes(cx: &ConstEval<'_>, et: &CType, init: NodeId) -> bool {
  if let NodeKind::StringLiteral { reg, wide } = &cx.ast[init].kind {
    (reg.is_some() && is_char_array(et)) || (wide.is_some() && is_wchar_array(et, cx.tt))
  } else {
    false
  }
}

/// Elaborate one initializer list against a target type.
///
/// Returns the finalized element count when the target is an array of
/// unspecified length.
pub fn elaborate_list(cx: &ConstEval<'_>, out: &mut InitTables,
    errors: &mut Vec<AnalysisError>, list: NodeId, ct: &CType) -> Option<u64> {
  if !out.done.insert(list) { return None }
  let NodeKind::InitializerList { designations, initializers } = &cx.ast[list].kind else {
    return None
  };

  let mut cot_stack: SmallVec<[CType; 8]> = SmallVec::new();
  let mut idx_stack: SmallVec<[u64; 8]> = SmallVec::new();
  cot_stack.push(ct.clone());
  idx_stack.push(0);

  let mut offset: i64 = 0;
  let mut max_len: u64 = 1;

  for (i, (&init, desig)) in initializers.iter().zip(designations).enumerate() {
    let mut init = init;

    if let Some(desig) = desig {
      offset = 0;
      cot_stack.clear();
      idx_stack.clear();
      let NodeKind::Designation(designators) = &cx.ast[*desig].kind else { continue };
      let mut nav = ct.clone();
      for &dr in designators {
        cot_stack.push(nav.clone());
        match &cx.ast[dr].kind {
          NodeKind::MemberDesignator(name) => {
            let (TyKind::Struct(rec) | TyKind::Union(rec)) = nav.kind else {
              errors.push(AnalysisError::at(cx.ast[dr].span, ErrorKind::Constraint,
                "struct initialization designators may not be used to initialize \
                 non-struct and non-union types"));
              return None
            };
            let Some((midx, soffset)) = cx.tt.member_info(rec, name) else {
              errors.push(AnalysisError::at(cx.ast[dr].span, ErrorKind::Constraint,
                "struct initialization designators must specify a valid member of \
                 the struct or union it is initializing"));
              return None
            };
            idx_stack.push(midx as u64);
            offset += soffset as i64;
            nav = cx.tt.records[rec].members.as_ref().expect("member exists")[midx].ty.clone();
          }
          NodeKind::IndexDesignator(expr) => {
            let TyKind::Array(elem, _) = &nav.kind else {
              errors.push(AnalysisError::at(cx.ast[dr].span, ErrorKind::Constraint,
                "array initialization designators may not be used to initialize \
                 non-array types"));
              return None
            };
            let elem = elem.as_ref().clone();
            let Ok(ce) = cx.evaluate_integer(*expr) else {
              errors.push(AnalysisError::at(cx.ast[dr].span,
                ErrorKind::ConstantRequired,
                "array initialization designators must have a constant expression \
                 for its index"));
              return None
            };
            let value = ce.convert_class(&TyKind::LongLong.into()).as_i64();
            if value < 0 {
              errors.push(AnalysisError::at(cx.ast[dr].span, ErrorKind::Constraint,
                "array initialization designators must have a non-negative index"));
              return None
            }
            idx_stack.push(value as u64);
            offset += elem.size(cx.tt).unwrap_or(0) as i64 * value;
            nav = elem;
          }
          _ => {}
        }
      }
    }

    let Some(cot) = cot_stack.last().cloned() else {
      out.offsets.insert(init, -1);
      errors.push(AnalysisError::at(cx.ast[init].span, ErrorKind::OutOfBounds,
        "this initializer and any after it would write outside the object \
         being initialized"));
      break
    };
    let ei = *idx_stack.last().expect("index stack tracks container stack");

    let Some(mut et) = element_type(cx.tt, &cot, ei)
        .or_else(|| (!matches!(cot.kind,
          TyKind::Struct(_) | TyKind::Union(_) | TyKind::Array(..)))
          .then(|| cot.clone())) else {
      out.offsets.insert(init, -1);
      errors.push(AnalysisError::at(cx.ast[init].span, ErrorKind::OutOfBounds,
        "this initializer and any after it would write outside the object \
         being initialized"));
      break
    };

    if !et.is_object(cx.tt) &&
        !(matches!(et.kind, TyKind::Array(..)) && !et.is_vla()) {
      errors.push(AnalysisError::at(cx.ast[init].span, ErrorKind::TypeMismatch,
        "initialization target must be an object type or an array of unknown \
         size that is not variable-length"));
      return None
    }

    let alignment = et.alignment(cx.tt).unwrap_or(1) as i64;
    offset += (alignment - offset.rem_euclid(alignment)) % alignment;
    out.offsets.insert(init, offset);

    // braces may be elided around a scalar, or around a string literal
    // initializing a char/wchar array
    let mut enclosed = false;
    if let NodeKind::InitializerList { initializers: inner, .. } = &cx.ast[init].kind {
      if inner.len() == 1 {
        let single = inner[0];
        let unwrap = (et.is_scalar() &&
            !matches!(cx.ast[single].kind, NodeKind::InitializerList { .. })) ||
          string_initializes(cx, &et, single);
        if unwrap {
          init = single;
          out.offsets.insert(init, offset);
          enclosed = true;
        }
      }
    }

    if matches!(cx.ast[init].kind, NodeKind::InitializerList { .. }) && !enclosed {
      elaborate_list(cx, out, errors, init, &et);
    } else {
      // descend through nested aggregates to the scalar this initializer
      // actually targets, unless a string literal takes over an array
      while matches!(et.kind,
          TyKind::Struct(_) | TyKind::Union(_) | TyKind::Array(..)) {
        if string_initializes(cx, &et, init) { break }
        cot_stack.push(et.clone());
        idx_stack.push(0);
        let Some(inner) = element_type(cx.tt, &et, 0) else { break };
        et = inner;
      }
      out.targets.insert(init, et.clone());
    }

    offset += et.size(cx.tt).unwrap_or(0) as i64;

    // advance: bump the top index, popping containers that are exhausted
    loop {
      let Some(top) = idx_stack.last_mut() else { break };
      *top += 1;
      let ei = *top;
      let cot = cot_stack.last().expect("container stack tracks index stack");
      match element_count(cx.tt, cot) {
        None => {
          // incomplete outermost array: track the running maximum
          if cot_stack.len() == 1 { max_len = max_len.max(ei) }
          break
        }
        Some(count) if (ei as i64) >= count => {
          cot_stack.pop();
          idx_stack.pop();
          if cot_stack.is_empty() { break }
        }
        Some(_) => {
          if i + 1 == initializers.len() && cot_stack.len() > 1 { max_len += 1 }
          break
        }
      }
    }
  }

  if matches!(&ct.kind, TyKind::Array(_, ArrayLen::Unspecified)) {
    return Some(max_len)
  }
  None
}

/// Fold every tagged leaf under `init` and produce the image writes for a
/// static-storage symbol. `base` is the byte offset of this initializer's
/// object within the symbol's image.
pub fn emit_static(cx: &ConstEval<'_>, out: &InitTables,
    errors: &mut Vec<AnalysisError>, init: NodeId, base: u64,
    writes: &mut Vec<ImageWrite>) {
  if let NodeKind::StringLiteral { reg, wide } = &cx.ast[init].kind {
    if out.targets.get(&init).is_some_and(|t| matches!(t.kind, TyKind::Array(..))) {
      let bytes = match (reg, wide) {
        (Some(reg), _) => reg.clone(),
        (None, Some(wide)) =>
          wide.iter().flat_map(|c| c.to_le_bytes()).collect(),
        (None, None) => vec![],
      };
      writes.push(ImageWrite::Bytes(base, bytes));
      return
    }
  }

  if let NodeKind::InitializerList { initializers, .. } = &cx.ast[init].kind {
    for &sub in initializers {
      match out.offsets.get(&sub) {
        Some(&off) if off >= 0 => emit_static(cx, out, errors, sub, base + off as u64, writes),
        _ => {}
      }
    }
    return
  }

  match cx.evaluate(init) {
    Ok(v @ (ConstValue::Int { .. } | ConstValue::Arith { .. })) => {
      // a leaf may carry a narrower target type than the expression's own
      let v = match out.targets.get(&init) {
        Some(t) if t.is_arithmetic() => v.convert_class(t),
        _ => v,
      };
      writes.push(ImageWrite::Bytes(base, v.bytes(cx.tt)));
    }
    Ok(ConstValue::Addr { sym, offset, negative }) => {
      let addend = if negative { -(offset as i64) } else { offset as i64 };
      writes.push(ImageWrite::Reloc(base, sym, addend));
    }
    Err(e) => {
      errors.push(AnalysisError::at(cx.ast[init].span, ErrorKind::ConstantRequired,
        format!("in static initialization: {}", e.reason)));
    }
  }
}

/// Apply image writes to a symbol's zero-filled image, returning the
/// relocation list.
#[must_use] pub fn apply_writes(data: &mut [u8], writes: Vec<ImageWrite>)
    -> Vec<crate::symtab::Reloc> {
  let mut relocs = vec![];
  for w in writes {
    match w {
      ImageWrite::Bytes(off, bytes) => {
        let off = usize::try_from(off).expect("image offset fits");
        let end = (off + bytes.len()).min(data.len());
        if off <= data.len() {
          data[off..end].copy_from_slice(&bytes[..end - off]);
        }
      }
      ImageWrite::Reloc(off, target, addend) => {
        let uoff = usize::try_from(off).expect("image offset fits");
        if uoff + 8 <= data.len() {
          data[uoff..uoff + 8].copy_from_slice(&addend.to_le_bytes());
        }
        relocs.push(crate::symtab::Reloc { offset: off, target, addend });
      }
    }
  }
  relocs
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symtab::SymbolTable;
  use crate::types::Span;
  use crate::types::ast::Ast;
  use crate::types::ty::{Member, RecordKind};

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

    fn cx(&self) -> ConstEval<'_> {
      ConstEval {
        ast: &self.ast, tt: &self.tt, st: &self.st, types: &self.types,
        type_names: &self.type_names, resolved: &self.resolved,
        enum_values: &self.enum_values,
      }
    }

    fn int(&mut self, v: i64) -> NodeId {
      self.ast.add(NodeKind::IntConstant(v as u64, TyKind::Int.into()), Span::default())
    }
  }

  fn int_pair_struct(tt: &mut TypeTable) -> CType {
    let rec = tt.declare_record(RecordKind::Struct, None);
    tt.records[rec].members = Some(vec![
      Member { name: "a".into(), ty: TyKind::Int.into(), bit_width: None },
      Member { name: "b".into(), ty: TyKind::Int.into(), bit_width: None },
    ]);
    TyKind::Struct(rec).into()
  }

  #[test]
  fn designator_initializes_second_member() {
    // struct {int a; int b;} p = {.b=7};
    let mut fx = Fixture::new();
    let ty = int_pair_struct(&mut fx.tt);
    let seven = fx.int(7);
    let desigr = fx.ast.add(NodeKind::MemberDesignator("b".into()), Span::default());
    let desig = fx.ast.add(NodeKind::Designation(vec![desigr]), Span::default());
    let list = fx.ast.add(NodeKind::InitializerList {
      designations: vec![Some(desig)],
      initializers: vec![seven],
    }, Span::default());

    let mut out = InitTables::default();
    let mut errors = vec![];
    elaborate_list(&fx.cx(), &mut out, &mut errors, list, &ty);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(out.offsets[&seven], 4);
    assert_eq!(out.targets[&seven].kind, TyKind::Int);

    let mut writes = vec![];
    emit_static(&fx.cx(), &out, &mut errors, list, 0, &mut writes);
    let mut image = vec![0u8; 8];
    let relocs = apply_writes(&mut image, writes);
    assert!(relocs.is_empty());
    assert_eq!(image, hex::decode("0000000007000000").unwrap());
  }

  #[test]
  fn offsets_are_monotone_within_a_list() {
    // struct pairs[2] initialized flat: {1, 2, 3, 4}
    let mut fx = Fixture::new();
    let elem = int_pair_struct(&mut fx.tt);
    let ty = elem.array_of(ArrayLen::Fixed(2));
    let inits: Vec<_> = (1..=4).map(|v| fx.int(v)).collect();
    let list = fx.ast.add(NodeKind::InitializerList {
      designations: vec![None; 4],
      initializers: inits.clone(),
    }, Span::default());

    let mut out = InitTables::default();
    let mut errors = vec![];
    elaborate_list(&fx.cx(), &mut out, &mut errors, list, &ty);
    assert!(errors.is_empty(), "{errors:?}");
    let offsets: Vec<_> = inits.iter().map(|i| out.offsets[i]).collect();
    assert_eq!(offsets, vec![0, 4, 8, 12]);
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
  }

  #[test]
  fn unspecified_length_tracks_running_maximum() {
    // int a[] = {1, 2, 3}
    let mut fx = Fixture::new();
    let ty = CType::new(TyKind::Int).array_of(ArrayLen::Unspecified);
    let inits: Vec<_> = (1..=3).map(|v| fx.int(v)).collect();
    let list = fx.ast.add(NodeKind::InitializerList {
      designations: vec![None; 3],
      initializers: inits,
    }, Span::default());
    let mut out = InitTables::default();
    let mut errors = vec![];
    let len = elaborate_list(&fx.cx(), &mut out, &mut errors, list, &ty);
    assert_eq!(len, Some(3));
  }

  #[test]
  fn excess_initializer_reports_once_and_suppresses() {
    // int a[1] = {1, 2, 3}
    let mut fx = Fixture::new();
    let ty = CType::new(TyKind::Int).array_of(ArrayLen::Fixed(1));
    let inits: Vec<_> = (1..=3).map(|v| fx.int(v)).collect();
    let list = fx.ast.add(NodeKind::InitializerList {
      designations: vec![None; 3],
      initializers: inits.clone(),
    }, Span::default());
    let mut out = InitTables::default();
    let mut errors = vec![];
    elaborate_list(&fx.cx(), &mut out, &mut errors, list, &ty);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::OutOfBounds);
    assert_eq!(out.offsets[&inits[1]], -1);
    assert!(!out.offsets.contains_key(&inits[2]));

    let mut writes = vec![];
    emit_static(&fx.cx(), &out, &mut errors, list, 0, &mut writes);
    assert_eq!(writes, vec![ImageWrite::Bytes(0, vec![1, 0, 0, 0])]);
  }
}
