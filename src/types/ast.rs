//! The parsed-syntax-tree data model handed to the analyzer.
//!
//! Nodes are interned in an [`Ast`] arena and referenced by [`NodeId`]
//! handles, so links back up the tree (and from symbols to their declaring
//! nodes) are plain indices. The parser that produces this tree is an
//! external collaborator; tests build trees by hand through [`Ast::add`].

use smallvec::SmallVec;
use super::{mk_id, IdxVec, Span};
use super::ty::{CType, Quals, RecordKind};

mk_id! {
  /// A handle to a node in an [`Ast`].
  NodeId,
}

/// A storage class specifier keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scs {
  /// `typedef`
  Typedef,
  /// `extern`
  Extern,
  /// `static`
  Static,
  /// `auto`
  Auto,
  /// `register`
  Register,
}

impl Scs {
  /// The keyword, for diagnostics.
  #[must_use] pub fn name(self) -> &'static str {
    match self {
      Scs::Typedef => "typedef",
      Scs::Extern => "extern",
      Scs::Static => "static",
      Scs::Auto => "auto",
      Scs::Register => "register",
    }
  }
}

/// A basic type specifier keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Bts {
  Void, Char, Short, Int, Long, Float, Double, Signed, Unsigned, Bool,
}

/// A binary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinOp {
  Mul, Div, Mod, Add, Sub, Shl, Shr,
  Lt, Gt, Le, Ge, Eq, Ne,
  BitAnd, BitXor, BitOr, LogAnd, LogOr,
}

/// An assignment operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AssignOp {
  Assign, MulAssign, DivAssign, ModAssign, AddAssign, SubAssign,
  ShlAssign, ShrAssign, AndAssign, XorAssign, OrAssign,
}

/// A unary operator appearing in [`NodeKind::Unary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
  /// `&x`
  Reference,
  /// `*x`
  Dereference,
  /// `+x`
  Plus,
  /// `-x`
  Minus,
  /// `~x`
  Complement,
  /// `!x`
  Not,
  /// `++x`
  PreInc,
  /// `--x`
  PreDec,
  /// `x++`
  PostInc,
  /// `x--`
  PostDec,
}

/// The label attached to a labeled statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Label {
  /// `name:` — the node is the declaring identifier.
  Named(NodeId),
  /// `case expr:`
  Case(NodeId),
  /// `default:`
  Default,
}

/// The tagged variant of a syntax node.
#[derive(Clone, Debug)]
pub enum NodeKind {
  /// The root: a list of declarations and function definitions.
  TranslationUnit(Vec<NodeId>),
  /// A function definition: declaration specifiers, declarator, K&R-style
  /// declaration list (rejected if nonempty with a parameter list), body.
  FunctionDefinition {
    /// The declaration specifiers.
    specifiers: Vec<NodeId>,
    /// The function declarator.
    declarator: NodeId,
    /// K&R parameter declarations between declarator and body.
    knr_declarations: Vec<NodeId>,
    /// The compound-statement body.
    body: NodeId,
  },
  /// A declaration: specifiers plus init declarators.
  Declaration {
    /// The declaration specifiers.
    specifiers: Vec<NodeId>,
    /// The init declarators.
    init_declarators: Vec<NodeId>,
  },
  /// One declarator with an optional initializer.
  InitDeclarator {
    /// The declarator.
    declarator: NodeId,
    /// The initializer, if present.
    initializer: Option<NodeId>,
  },
  /// A parameter declaration inside a function declarator.
  ParameterDeclaration {
    /// The declaration specifiers.
    specifiers: Vec<NodeId>,
    /// The declarator (possibly abstract), if present.
    declarator: Option<NodeId>,
  },
  /// A `type-name` as used by casts, `sizeof`, compound literals and
  /// `va_arg`.
  TypeName {
    /// The specifier-qualifier list.
    specifiers: Vec<NodeId>,
    /// The abstract declarator, if present.
    declarator: Option<NodeId>,
  },

  /// A storage class specifier.
  StorageClassSpecifier(Scs),
  /// A basic type specifier keyword.
  BasicTypeSpecifier(Bts),
  /// A reference to a typedef name.
  TypedefName(String),
  /// A type qualifier.
  TypeQualifier(Quals),
  /// The `inline` function specifier.
  FunctionSpecifier,
  /// A struct or union specifier, complete (with declarations) or not.
  StructUnionSpecifier {
    /// Struct or union.
    kind: RecordKind,
    /// The tag identifier node, if named.
    tag: Option<NodeId>,
    /// The member declarations, if this specifier completes the type.
    declarations: Option<Vec<NodeId>>,
  },
  /// One member declaration inside a struct/union specifier.
  StructDeclaration {
    /// The specifier-qualifier list.
    specifiers: Vec<NodeId>,
    /// The struct declarators.
    declarators: Vec<NodeId>,
  },
  /// One struct declarator, possibly a bitfield.
  StructDeclarator {
    /// The declarator; absent for anonymous bitfields.
    declarator: Option<NodeId>,
    /// The bitfield width expression, if any.
    bits: Option<NodeId>,
  },
  /// An enum specifier.
  EnumSpecifier {
    /// The tag identifier node, if named.
    tag: Option<NodeId>,
    /// The enumerators, if this specifier completes the type.
    enumerators: Option<Vec<NodeId>>,
  },
  /// One enumerator.
  Enumerator {
    /// The declaring identifier.
    id: NodeId,
    /// The value expression, if given.
    value: Option<NodeId>,
  },

  /// An identifier in a declarator position: it declares a symbol.
  DeclaratorIdentifier(String),
  /// The empty bottom of an abstract declarator chain.
  AbstractBase,
  /// A pointer declarator layer: `* quals inner`.
  PointerDeclarator {
    /// Qualifiers attached to this pointer layer.
    quals: Quals,
    /// The wrapped declarator.
    inner: NodeId,
  },
  /// An array declarator layer.
  ArrayDeclarator {
    /// The wrapped declarator.
    inner: NodeId,
    /// The length expression, absent for `[]`.
    length: Option<NodeId>,
  },
  /// A function declarator layer.
  FunctionDeclarator {
    /// The wrapped declarator.
    inner: NodeId,
    /// The parameter declarations; `None` for a K&R declarator without a
    /// prototype.
    params: Option<Vec<NodeId>>,
    /// Whether the parameter list ends in `...`.
    variadic: bool,
    /// The K&R identifier list, if any.
    knr_identifiers: Vec<NodeId>,
  },

  /// A brace-enclosed initializer list with optional designations.
  /// `designations` is parallel to `initializers`.
  InitializerList {
    /// Per-initializer designation node, if one was written.
    designations: Vec<Option<NodeId>>,
    /// The initializers.
    initializers: Vec<NodeId>,
  },
  /// A designation: a nonempty list of designators.
  Designation(Vec<NodeId>),
  /// A `.member` designator.
  MemberDesignator(String),
  /// A `[index]` designator.
  IndexDesignator(NodeId),

  /// An integer constant, with its value image and its C type as
  /// determined from the literal's suffix and magnitude.
  IntConstant(u64, CType),
  /// A floating constant with its C type.
  FloatConstant(f64, CType),
  /// A string literal: the bytes of a regular literal (including the
  /// terminating NUL), or the code units of a wide literal.
  StringLiteral {
    /// The bytes of a regular string literal.
    reg: Option<Vec<u8>>,
    /// The elements of a wide string literal.
    wide: Option<Vec<i32>>,
  },
  /// An identifier in expression position.
  PrimaryIdentifier(String),
  /// `array[index]`
  Subscript {
    /// The (nominal) array operand.
    array: NodeId,
    /// The (nominal) index operand.
    index: NodeId,
  },
  /// A function call.
  FunctionCall {
    /// The called expression.
    callee: NodeId,
    /// The arguments.
    args: Vec<NodeId>,
  },
  /// A call to a compiler intrinsic, recognized by name.
  IntrinsicCall {
    /// The intrinsic name, e.g. `__ecc_va_arg`.
    name: String,
    /// The arguments; `va_arg`'s second argument is a [`NodeKind::TypeName`].
    args: Vec<NodeId>,
  },
  /// `lhs.member`
  Member {
    /// The aggregate operand.
    lhs: NodeId,
    /// The member name.
    name: String,
  },
  /// `lhs->member`
  DerefMember {
    /// The pointer operand.
    lhs: NodeId,
    /// The member name.
    name: String,
  },
  /// `(type){ init, ... }`
  CompoundLiteral {
    /// The type name.
    type_name: NodeId,
    /// The initializer list.
    init: NodeId,
  },
  /// A unary operator application.
  Unary(UnOp, NodeId),
  /// `sizeof expr`
  SizeofExpr(NodeId),
  /// `sizeof (type)`
  SizeofType(NodeId),
  /// `(type) expr`
  Cast {
    /// The target type name.
    type_name: NodeId,
    /// The operand.
    operand: NodeId,
  },
  /// A binary operator application.
  Binary(BinOp, NodeId, NodeId),
  /// `cond ? then : els`
  Conditional {
    /// The controlling expression.
    cond: NodeId,
    /// The second operand.
    then: NodeId,
    /// The third operand.
    els: NodeId,
  },
  /// An assignment, simple or compound.
  Assignment(AssignOp, NodeId, NodeId),
  /// A comma expression: the type is the last operand's.
  Comma(Vec<NodeId>),

  /// `{ ... }` — a block, opening a scope.
  CompoundStatement(Vec<NodeId>),
  /// An expression statement, possibly empty.
  ExpressionStatement(Option<NodeId>),
  /// A labeled statement.
  LabeledStatement {
    /// The label.
    label: Label,
    /// The labeled body.
    body: NodeId,
  },
  /// An `if` statement.
  If {
    /// The controlling expression.
    cond: NodeId,
    /// The then branch.
    then: NodeId,
    /// The else branch, if present.
    els: Option<NodeId>,
  },
  /// A `switch` statement.
  Switch {
    /// The controlling expression.
    cond: NodeId,
    /// The body.
    body: NodeId,
  },
  /// A `while` loop.
  While {
    /// The controlling expression.
    cond: NodeId,
    /// The body.
    body: NodeId,
  },
  /// A `do`/`while` loop.
  DoWhile {
    /// The body.
    body: NodeId,
    /// The controlling expression.
    cond: NodeId,
  },
  /// A `for` loop.
  For {
    /// The init clause: a declaration or an expression.
    init: Option<NodeId>,
    /// The controlling expression.
    cond: Option<NodeId>,
    /// The step expression.
    step: Option<NodeId>,
    /// The body.
    body: NodeId,
  },
  /// `goto label;`
  Goto(NodeId),
  /// `continue;`
  Continue,
  /// `break;`
  Break,
  /// `return expr?;`
  Return(Option<NodeId>),
}

/// One syntax node.
#[derive(Clone, Debug)]
pub struct Node {
  /// The node variant.
  pub kind: NodeKind,
  /// The source position, for diagnostics.
  pub span: Span,
  /// The enclosing node; `None` only for the translation unit.
  pub parent: Option<NodeId>,
}

/// The syntax tree arena for one translation unit.
#[derive(Debug, Default)]
pub struct Ast {
  /// The interned nodes.
  pub nodes: IdxVec<NodeId, Node>,
}

impl std::ops::Index<NodeId> for Ast {
  type Output = Node;
  fn index(&self, i: NodeId) -> &Node { &self.nodes[i] }
}

impl std::ops::IndexMut<NodeId> for Ast {
  fn index_mut(&mut self, i: NodeId) -> &mut Node { &mut self.nodes[i] }
}

impl Ast {
  /// Construct an empty tree.
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Intern a node. Parent links are established afterwards by
  /// [`link_parents`](Self::link_parents).
  pub fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
    self.nodes.push(Node { kind, span, parent: None })
  }

  /// Collect the direct children of a node, in source order.
  #[must_use] pub fn children(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
    let mut out = SmallVec::new();
    macro_rules! push {
      ($($e:expr),*) => {{ $(out.push($e);)* }}
    }
    match &self[id].kind {
      NodeKind::TranslationUnit(items) |
      NodeKind::Comma(items) |
      NodeKind::CompoundStatement(items) |
      NodeKind::Designation(items) => out.extend(items.iter().copied()),
      NodeKind::FunctionDefinition { specifiers, declarator, knr_declarations, body } => {
        out.extend(specifiers.iter().copied());
        push!(*declarator);
        out.extend(knr_declarations.iter().copied());
        push!(*body);
      }
      NodeKind::Declaration { specifiers, init_declarators } => {
        out.extend(specifiers.iter().copied());
        out.extend(init_declarators.iter().copied());
      }
      NodeKind::InitDeclarator { declarator, initializer } => {
        push!(*declarator);
        out.extend(*initializer);
      }
      NodeKind::ParameterDeclaration { specifiers, declarator } |
      NodeKind::TypeName { specifiers, declarator } => {
        out.extend(specifiers.iter().copied());
        out.extend(*declarator);
      }
      NodeKind::StructUnionSpecifier { tag, declarations, .. } => {
        out.extend(*tag);
        if let Some(ds) = declarations { out.extend(ds.iter().copied()) }
      }
      NodeKind::StructDeclaration { specifiers, declarators } => {
        out.extend(specifiers.iter().copied());
        out.extend(declarators.iter().copied());
      }
      NodeKind::StructDeclarator { declarator, bits } => {
        out.extend(*declarator);
        out.extend(*bits);
      }
      NodeKind::EnumSpecifier { tag, enumerators } => {
        out.extend(*tag);
        if let Some(es) = enumerators { out.extend(es.iter().copied()) }
      }
      NodeKind::Enumerator { id, value } => {
        push!(*id);
        out.extend(*value);
      }
      NodeKind::PointerDeclarator { inner, .. } => push!(*inner),
      NodeKind::ArrayDeclarator { inner, length } => {
        push!(*inner);
        out.extend(*length);
      }
      NodeKind::FunctionDeclarator { inner, params, knr_identifiers, .. } => {
        push!(*inner);
        if let Some(ps) = params { out.extend(ps.iter().copied()) }
        out.extend(knr_identifiers.iter().copied());
      }
      NodeKind::InitializerList { designations, initializers } => {
        for (d, i) in designations.iter().zip(initializers) {
          out.extend(*d);
          push!(*i);
        }
      }
      NodeKind::IndexDesignator(e) | NodeKind::SizeofExpr(e) |
      NodeKind::SizeofType(e) | NodeKind::Unary(_, e) | NodeKind::Goto(e) |
      NodeKind::ExpressionStatement(Some(e)) | NodeKind::Return(Some(e)) =>
        push!(*e),
      NodeKind::Subscript { array, index } => push!(*array, *index),
      NodeKind::FunctionCall { callee, args } => {
        push!(*callee);
        out.extend(args.iter().copied());
      }
      NodeKind::IntrinsicCall { args, .. } => out.extend(args.iter().copied()),
      NodeKind::Member { lhs, .. } | NodeKind::DerefMember { lhs, .. } => push!(*lhs),
      NodeKind::CompoundLiteral { type_name, init } => push!(*type_name, *init),
      NodeKind::Cast { type_name, operand } => push!(*type_name, *operand),
      NodeKind::Binary(_, a, b) | NodeKind::Assignment(_, a, b) => push!(*a, *b),
      NodeKind::Conditional { cond, then, els } => push!(*cond, *then, *els),
      NodeKind::LabeledStatement { label, body } => {
        match label {
          Label::Named(l) | Label::Case(l) => push!(*l),
          Label::Default => {}
        }
        push!(*body);
      }
      NodeKind::If { cond, then, els } => {
        push!(*cond, *then);
        out.extend(*els);
      }
      NodeKind::Switch { cond, body } | NodeKind::While { cond, body } =>
        push!(*cond, *body),
      NodeKind::DoWhile { body, cond } => push!(*body, *cond),
      NodeKind::For { init, cond, step, body } => {
        out.extend(*init);
        out.extend(*cond);
        out.extend(*step);
        push!(*body);
      }
      NodeKind::StorageClassSpecifier(_) | NodeKind::BasicTypeSpecifier(_) |
      NodeKind::TypedefName(_) | NodeKind::TypeQualifier(_) |
      NodeKind::FunctionSpecifier | NodeKind::DeclaratorIdentifier(_) |
      NodeKind::AbstractBase | NodeKind::MemberDesignator(_) |
      NodeKind::IntConstant(..) | NodeKind::FloatConstant(..) |
      NodeKind::StringLiteral { .. } | NodeKind::PrimaryIdentifier(_) |
      NodeKind::ExpressionStatement(None) | NodeKind::Return(None) |
      NodeKind::Continue | NodeKind::Break => {}
    }
    out
  }

  /// Establish parent links for the subtree rooted at `root`.
  pub fn link_parents(&mut self, root: NodeId) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
      for child in self.children(id) {
        self[child].parent = Some(id);
        stack.push(child);
      }
    }
  }

  /// Walk the subtree rooted at `root` in preorder.
  pub fn walk(&self, root: NodeId, f: &mut impl FnMut(NodeId)) {
    f(root);
    for child in self.children(root) {
      self.walk(child, f);
    }
  }

  /// Find the nearest enclosing node (starting from `id`'s parent)
  /// satisfying `pred`.
  #[must_use] pub fn enclosing(&self, id: NodeId, mut pred: impl FnMut(&NodeKind) -> bool)
      -> Option<NodeId> {
    let mut cur = self[id].parent;
    while let Some(p) = cur {
      if pred(&self[p].kind) { return Some(p) }
      cur = self[p].parent;
    }
    None
  }

  /// Descend through declarator layers to the declaring identifier, if the
  /// declarator is not abstract.
  #[must_use] pub fn declarator_identifier(&self, mut id: NodeId) -> Option<NodeId> {
    loop {
      match &self[id].kind {
        NodeKind::DeclaratorIdentifier(_) => return Some(id),
        NodeKind::AbstractBase => return None,
        NodeKind::PointerDeclarator { inner, .. } |
        NodeKind::ArrayDeclarator { inner, .. } |
        NodeKind::FunctionDeclarator { inner, .. } => id = *inner,
        _ => return None,
      }
    }
  }

  /// The name of the declaring identifier of a declarator, if any.
  #[must_use] pub fn declarator_name(&self, id: NodeId) -> Option<&str> {
    match &self[self.declarator_identifier(id)?].kind {
      NodeKind::DeclaratorIdentifier(name) => Some(name),
      _ => None,
    }
  }

  /// Whether the node is an expression kind.
  #[must_use] pub fn is_expression(&self, id: NodeId) -> bool {
    matches!(&self[id].kind,
      NodeKind::IntConstant(..) | NodeKind::FloatConstant(..) |
      NodeKind::StringLiteral { .. } | NodeKind::PrimaryIdentifier(_) |
      NodeKind::Subscript { .. } | NodeKind::FunctionCall { .. } |
      NodeKind::IntrinsicCall { .. } | NodeKind::Member { .. } |
      NodeKind::DerefMember { .. } | NodeKind::CompoundLiteral { .. } |
      NodeKind::Unary(..) | NodeKind::SizeofExpr(_) | NodeKind::SizeofType(_) |
      NodeKind::Cast { .. } | NodeKind::Binary(..) | NodeKind::Conditional { .. } |
      NodeKind::Assignment(..) | NodeKind::Comma(_))
  }
}
