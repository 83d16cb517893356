//! The scoped, namespaced symbol table.
//!
//! A symbol binds a name in one of the four C name spaces to a type, a
//! declaring syntax node, a storage duration and a linkage. The table is a
//! multimap: every declaration appends, in insertion order, and lookup
//! walks scopes outward. Static-storage symbols additionally carry their
//! initializer image and relocation list, which the backend turns into
//! data directives.

use hashbrown::HashMap;
use crate::types::{mk_id, Idx, IdxVec};
use crate::types::ast::{Ast, NodeId, NodeKind};
use crate::types::ty::{CType, RecordId, TypeTable};

mk_id! {
  /// A handle to a [`Symbol`].
  SymId,
  /// A handle to a [`Scope`].
  ScopeId,
}

impl ScopeId {
  /// The file scope, always the first scope created.
  pub const FILE: ScopeId = ScopeId(0);
}

/// The C name spaces (ISO 6.2.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
  /// Ordinary identifiers: objects, functions, typedef names, enumeration
  /// constants.
  Ordinary,
  /// Statement labels.
  Label,
  /// Struct, union and enum tags.
  Tag,
  /// Members of the given struct or union.
  Member(RecordId),
}

/// Storage duration (ISO 6.2.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageDuration {
  /// Lives for the whole execution; has a static image.
  Static,
  /// Lives for the enclosing block's execution; gets a stack slot.
  Automatic,
  /// Allocated storage (not produced by declarations).
  Allocated,
  /// No storage at all (functions, typedef names, enumeration constants,
  /// labels).
  None,
}

/// Linkage (ISO 6.2.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
  /// Visible to the linker across translation units.
  External,
  /// Visible within this translation unit only.
  Internal,
  /// Not visible outside its scope.
  None,
}

/// The definition state of a symbol within the translation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefState {
  /// Declared, no definition seen.
  Declared,
  /// A file-scope object declaration without an initializer: becomes a
  /// definition at end of translation unit unless a real one appears.
  Tentative,
  /// Defined.
  Defined,
}

/// A relocation entry in a symbol's static image: the pointer-sized field
/// at `offset` holds `&target + addend`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reloc {
  /// The byte offset of the field within the image.
  pub offset: u64,
  /// The symbol whose address is taken.
  pub target: SymId,
  /// The byte addend.
  pub addend: i64,
}

/// One symbol.
#[derive(Clone, Debug)]
pub struct Symbol {
  /// The bound name.
  pub name: String,
  /// The symbol's type.
  pub ty: CType,
  /// The name space the symbol lives in.
  pub ns: Namespace,
  /// The syntax node that introduced the symbol, if any (helper symbols
  /// created by the backend have none).
  pub declarer: Option<NodeId>,
  /// The scope the symbol was declared in.
  pub scope: ScopeId,
  /// The storage duration.
  pub storage: StorageDuration,
  /// The linkage.
  pub linkage: Linkage,
  /// The definition state.
  pub state: DefState,
  /// The static-initializer image, for static-storage symbols.
  pub data: Option<Vec<u8>>,
  /// Relocations into [`data`](Self::data).
  pub relocs: Vec<Reloc>,
  /// The stack offset from `%rbp`, assigned lazily by the backend on
  /// first use.
  pub stack_offset: Option<i64>,
}

impl Symbol {
  /// A fresh symbol with no storage, no linkage and no definition.
  #[must_use] pub fn new(name: impl Into<String>, ty: CType, ns: Namespace,
      declarer: Option<NodeId>, scope: ScopeId) -> Self {
    Symbol {
      name: name.into(), ty, ns, declarer, scope,
      storage: StorageDuration::None,
      linkage: Linkage::None,
      state: DefState::Declared,
      data: None,
      relocs: vec![],
      stack_offset: None,
    }
  }
}

/// What kind of region a scope covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
  /// The translation unit.
  File,
  /// A function definition (labels live here).
  Function(NodeId),
  /// A block or a function prototype.
  Block(NodeId),
}

/// One scope in the scope tree.
#[derive(Clone, Copy, Debug)]
pub struct Scope {
  /// The enclosing scope, `None` for the file scope.
  pub parent: Option<ScopeId>,
  /// The region kind.
  pub kind: ScopeKind,
}

/// The symbol table for one translation unit.
#[derive(Debug)]
pub struct SymbolTable {
  /// The scope tree.
  pub scopes: IdxVec<ScopeId, Scope>,
  /// The symbol arena.
  pub syms: IdxVec<SymId, Symbol>,
  names: HashMap<(String, Namespace), Vec<SymId>>,
  by_declarer: HashMap<NodeId, SymId>,
}

impl Default for SymbolTable {
  fn default() -> Self { Self::new() }
}

impl std::ops::Index<SymId> for SymbolTable {
  type Output = Symbol;
  fn index(&self, i: SymId) -> &Symbol { &self.syms[i] }
}

impl std::ops::IndexMut<SymId> for SymbolTable {
  fn index_mut(&mut self, i: SymId) -> &mut Symbol { &mut self.syms[i] }
}

impl SymbolTable {
  /// A table containing only the file scope.
  #[must_use] pub fn new() -> Self {
    let mut scopes = IdxVec::new();
    scopes.push(Scope { parent: None, kind: ScopeKind::File });
    SymbolTable { scopes, syms: IdxVec::new(), names: HashMap::new(),
      by_declarer: HashMap::new() }
  }

  /// Open a scope under `parent`.
  pub fn open_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
    self.scopes.push(Scope { parent: Some(parent), kind })
  }

  /// Whether `scope` is a block (or prototype) scope rather than the file
  /// scope.
  #[must_use] pub fn scope_is_block(&self, scope: ScopeId) -> bool {
    !matches!(self.scopes[scope].kind, ScopeKind::File)
  }

  /// The nearest enclosing function-definition scope, if any.
  #[must_use] pub fn enclosing_function(&self, mut scope: ScopeId) -> Option<NodeId> {
    loop {
      match self.scopes[scope].kind {
        ScopeKind::Function(f) => return Some(f),
        _ => scope = self.scopes[scope].parent?,
      }
    }
  }

  /// Append a symbol. Symbols with the same name and name space accumulate
  /// in insertion order.
  pub fn add(&mut self, sym: Symbol) -> SymId {
    let key = (sym.name.clone(), sym.ns);
    let declarer = sym.declarer;
    let id = self.syms.push(sym);
    self.names.entry(key).or_default().push(id);
    if let Some(d) = declarer { self.by_declarer.insert(d, id); }
    id
  }

  /// All symbols bound to `(name, ns)`, in insertion order.
  #[must_use] pub fn all(&self, name: &str, ns: Namespace) -> &[SymId] {
    self.names.get(&(name.to_owned(), ns)).map_or(&[], Vec::as_slice)
  }

  /// Look a name up from `scope`, walking outward. The most recent
  /// declaration in the innermost scope that has one wins.
  #[must_use] pub fn lookup(&self, name: &str, ns: Namespace, from: ScopeId) -> Option<SymId> {
    let candidates = self.all(name, ns);
    let mut scope = Some(from);
    while let Some(s) = scope {
      if let Some(&id) = candidates.iter().rev().find(|&&id| self.syms[id].scope == s) {
        return Some(id)
      }
      scope = self.scopes[s].parent;
    }
    None
  }

  /// The symbols bound to `(name, ns)` directly in `scope`, in insertion
  /// order. The analyzer uses this for redeclaration checks; a symbol is
  /// "first in its scope" when it heads this list.
  #[must_use] pub fn in_scope(&self, name: &str, ns: Namespace, scope: ScopeId) -> Vec<SymId> {
    self.all(name, ns).iter().copied()
      .filter(|&id| self.syms[id].scope == scope)
      .collect()
  }

  /// The symbol a declarator identifier (or literal node) introduced.
  #[must_use] pub fn get_by_syntax(&self, node: NodeId) -> Option<SymId> {
    self.by_declarer.get(&node).copied()
  }

  /// Find a symbol by name, name space and a predicate on its type. Used
  /// to locate built-in helpers such as the `__ecc_va_list` struct
  /// installed by the runtime prelude.
  #[must_use] pub fn get_by_classes(&self, name: &str, ns: Namespace,
      pred: impl Fn(&CType) -> bool) -> Option<SymId> {
    self.all(name, ns).iter().copied().find(|&id| pred(&self.syms[id].ty))
  }

  /// Derive the linkage of a freshly declared identifier (ISO 6.2.2).
  #[must_use] pub fn derive_linkage(&self, at_file_scope: bool, scs: Option<super::types::ast::Scs>,
      is_function: bool, prior: Option<Linkage>) -> Linkage {
    use super::types::ast::Scs;
    match scs {
      Some(Scs::Static) if at_file_scope => Linkage::Internal,
      Some(Scs::Extern) => match prior {
        Some(lk @ (Linkage::External | Linkage::Internal)) => lk,
        _ => Linkage::External,
      },
      Some(Scs::Typedef) => Linkage::None,
      _ if is_function => match prior {
        Some(lk @ (Linkage::External | Linkage::Internal)) => lk,
        _ => Linkage::External,
      },
      _ if at_file_scope => Linkage::External,
      _ => Linkage::None,
    }
  }

  /// Derive the storage duration of a freshly declared object (ISO 6.2.4).
  #[must_use] pub fn derive_storage(&self, at_file_scope: bool,
      scs: Option<super::types::ast::Scs>, is_object: bool) -> StorageDuration {
    use super::types::ast::Scs;
    if !is_object { return StorageDuration::None }
    match scs {
      Some(Scs::Static | Scs::Extern) => StorageDuration::Static,
      Some(Scs::Typedef) => StorageDuration::None,
      _ if at_file_scope => StorageDuration::Static,
      _ => StorageDuration::Automatic,
    }
  }

  /// Merge linkage when a declaration redeclares a visible compatible
  /// symbol: `internal` sticks (a later `extern` re-declaration inherits
  /// it).
  #[must_use] pub fn merge_linkage(prior: Linkage, new: Linkage) -> Linkage {
    match (prior, new) {
      (Linkage::Internal, _) | (_, Linkage::Internal) => Linkage::Internal,
      (Linkage::External, _) | (_, Linkage::External) => Linkage::External,
      _ => Linkage::None,
    }
  }

  /// Whether the backend must emit this symbol under a disambiguated
  /// label: block-scope statics collide across functions unless renamed.
  /// Synthesized literal symbols already have unit-unique names.
  #[must_use] pub fn requires_disambiguation(&self, id: SymId, ast: &Ast) -> bool {
    let sy = &self.syms[id];
    if sy.storage != StorageDuration::Static { return false }
    if !self.scope_is_block(sy.scope) { return false }
    let Some(declarer) = sy.declarer else { return true };
    !matches!(ast[declarer].kind,
      NodeKind::StringLiteral { .. } | NodeKind::CompoundLiteral { .. } |
      NodeKind::FloatConstant(..))
  }

  /// The label the backend uses for a static-storage symbol.
  #[must_use] pub fn emission_name(&self, id: SymId, ast: &Ast) -> String {
    if self.requires_disambiguation(id, ast) {
      format!("{}.{}", self.syms[id].name, id.into_usize())
    } else {
      self.syms[id].name.clone()
    }
  }

  /// End-of-translation-unit promotion: every tentative definition whose
  /// type is complete becomes a real definition with a zero-filled image.
  pub fn promote_tentatives(&mut self, tt: &TypeTable) {
    for sy in self.syms.iter_mut() {
      if sy.state == DefState::Tentative {
        if let Some(size) = sy.ty.size(tt) {
          if sy.data.is_none() {
            sy.data = Some(vec![0; usize::try_from(size).expect("object too large")]);
          }
          sy.state = DefState::Defined;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Span;
  use crate::types::ty::TyKind;

  #[test]
  fn lookup_walks_outward_and_prefers_inner() {
    let mut st = SymbolTable::new();
    let outer = st.add(Symbol::new("x", TyKind::Int.into(), Namespace::Ordinary,
      None, ScopeId::FILE));
    let block = st.open_scope(ScopeId::FILE, ScopeKind::Block(NodeId(0)));
    let inner = st.add(Symbol::new("x", TyKind::Double.into(), Namespace::Ordinary,
      None, block));
    assert_eq!(st.lookup("x", Namespace::Ordinary, block), Some(inner));
    assert_eq!(st.lookup("x", Namespace::Ordinary, ScopeId::FILE), Some(outer));
    assert_eq!(st.lookup("x", Namespace::Label, block), None);
    assert_eq!(st.lookup("y", Namespace::Ordinary, block), None);
  }

  #[test]
  fn in_scope_preserves_insertion_order() {
    let mut st = SymbolTable::new();
    let a = st.add(Symbol::new("f", TyKind::Int.into(), Namespace::Ordinary,
      None, ScopeId::FILE));
    let b = st.add(Symbol::new("f", TyKind::Int.into(), Namespace::Ordinary,
      None, ScopeId::FILE));
    assert_eq!(st.in_scope("f", Namespace::Ordinary, ScopeId::FILE), vec![a, b]);
  }

  #[test]
  fn tentative_promotion_fills_zero_image() {
    let mut st = SymbolTable::new();
    let tt = TypeTable::default();
    let id = st.add(Symbol::new("t", TyKind::Int.into(), Namespace::Ordinary,
      None, ScopeId::FILE));
    st[id].storage = StorageDuration::Static;
    st[id].state = DefState::Tentative;
    st.promote_tentatives(&tt);
    assert_eq!(st[id].state, DefState::Defined);
    assert_eq!(st[id].data.as_deref(), Some(&[0u8; 4][..]));
  }

  #[test]
  fn block_scope_statics_get_disambiguated_labels() {
    let mut st = SymbolTable::new();
    let mut ast = Ast::new();
    let declarer = ast.add(NodeKind::DeclaratorIdentifier("counter".into()), Span::default());
    let block = st.open_scope(ScopeId::FILE, ScopeKind::Block(NodeId(0)));
    let id = st.add(Symbol::new("counter", TyKind::Int.into(), Namespace::Ordinary,
      Some(declarer), block));
    st[id].storage = StorageDuration::Static;
    assert!(st.requires_disambiguation(id, &ast));
    assert_eq!(st.emission_name(id, &ast), format!("counter.{}", id.into_usize()));
    let file = st.add(Symbol::new("global", TyKind::Int.into(), Namespace::Ordinary,
      None, ScopeId::FILE));
    st[file].storage = StorageDuration::Static;
    assert_eq!(st.emission_name(file, &ast), "global");
  }
}
