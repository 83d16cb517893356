//! The semantic analyzer.
//!
//! A post-order traversal over the syntax tree that decorates every
//! expression with a type, binds every declaration to a symbol, evaluates
//! enumerators and initializers, and enforces the ISO C constraint catalog.
//! Constraint violations append one diagnostic each and poison the
//! offending expression's type with [`TyKind::Error`]; the poison is
//! silently absorbed by every operator so a single bad subexpression never
//! cascades, and no error aborts the pass.

use hashbrown::HashMap;
use if_chain::if_chain;
use log::debug;
use smallvec::SmallVec;

use crate::constexpr::{is_null_ptr_constant, ConstEval};
use crate::init::{self, InitTables};
use crate::symtab::{
  DefState, Linkage, Namespace, ScopeId, ScopeKind, StorageDuration, SymId, Symbol,
  SymbolTable,
};
use crate::types::ast::{
  AssignOp, Ast, BinOp, Bts, Label, NodeId, NodeKind, Scs, UnOp,
};
use crate::types::ty::{
  ArrayLen, CType, FnType, Member, Quals, RecordKind, TyKind, TypeTable,
};
use crate::types::Span;
use crate::{AnalysisError, ErrorKind};

/// The decorations and tables produced by one run of the analyzer.
#[derive(Debug)]
pub struct Analysis {
  /// The record/enum arena, completed.
  pub tt: TypeTable,
  /// The symbol table, with static images and relocations filled in.
  pub st: SymbolTable,
  /// The type of every expression node.
  pub types: HashMap<NodeId, CType>,
  /// The denoted type of every `TypeName` node.
  pub type_names: HashMap<NodeId, CType>,
  /// The symbol every identifier reference resolved to.
  pub resolved: HashMap<NodeId, SymId>,
  /// The value of every enumeration constant.
  pub enum_values: HashMap<SymId, i64>,
  /// Initializer offsets and target types.
  pub init: InitTables,
  /// The controller-converted value of every `case` label.
  pub case_values: HashMap<NodeId, u64>,
  /// The unit-unique id of every labeled statement.
  pub label_uids: HashMap<NodeId, u64>,
  /// The diagnostics, in discovery order.
  pub errors: Vec<AnalysisError>,
}

impl Analysis {
  /// Whether any non-warning diagnostics were produced. When true,
  /// downstream stages must not run.
  #[must_use] pub fn has_errors(&self) -> bool {
    self.errors.iter().any(|e| !e.warning)
  }
}

/// The shared read-mostly state the constant evaluator borrows.
#[derive(Debug, Default)]
struct Ctx {
  tt: TypeTable,
  st: SymbolTable,
  types: HashMap<NodeId, CType>,
  type_names: HashMap<NodeId, CType>,
  resolved: HashMap<NodeId, SymId>,
  enum_values: HashMap<SymId, i64>,
}

impl Ctx {
  fn eval<'a>(&'a self, ast: &'a Ast) -> ConstEval<'a> {
    ConstEval {
      ast,
      tt: &self.tt,
      st: &self.st,
      types: &self.types,
      type_names: &self.type_names,
      resolved: &self.resolved,
      enum_values: &self.enum_values,
    }
  }
}

struct Analyzer<'a> {
  ast: &'a Ast,
  cx: Ctx,
  init: InitTables,
  errors: Vec<AnalysisError>,
  case_values: HashMap<NodeId, u64>,
  label_uids: HashMap<NodeId, u64>,
  scope: ScopeId,
  next_compound_literal: u64,
  next_string_literal: u64,
  next_floating_constant: u64,
  next_label_uid: u64,
  pending_gotos: Vec<(NodeId, ScopeId)>,
}

fn has_inline_specifier(ast: &Ast, specifiers: &[NodeId]) -> bool {
  specifiers.iter().any(|&s| matches!(ast[s].kind, NodeKind::FunctionSpecifier))
}

/// Analyze a translation unit. `tt` and `st` arrive holding the runtime
/// prelude (notably the `__ecc_va_list` struct) and leave holding the
/// unit's complete tables.
#[must_use] pub fn analyze(ast: &Ast, root: NodeId, tt: TypeTable, st: SymbolTable) -> Analysis {
  let mut az = Analyzer {
    ast,
    cx: Ctx { tt, st, ..Ctx::default() },
    init: InitTables::default(),
    errors: vec![],
    case_values: HashMap::new(),
    label_uids: HashMap::new(),
    scope: ScopeId::FILE,
    next_compound_literal: 0,
    next_string_literal: 0,
    next_floating_constant: 0,
    next_label_uid: 0,
    pending_gotos: vec![],
  };
  az.node(root);
  az.cx.st.promote_tentatives(&az.cx.tt);
  debug!("analysis finished: {} diagnostics", az.errors.len());
  Analysis {
    tt: az.cx.tt,
    st: az.cx.st,
    types: az.cx.types,
    type_names: az.cx.type_names,
    resolved: az.cx.resolved,
    enum_values: az.cx.enum_values,
    init: az.init,
    case_values: az.case_values,
    label_uids: az.label_uids,
    errors: az.errors,
  }
}

impl<'a> Analyzer<'a> {
  fn error(&mut self, at: NodeId, kind: ErrorKind, msg: impl Into<String>) {
    self.errors.push(AnalysisError::at(self.ast[at].span, kind, msg));
  }

  fn warning(&mut self, at: NodeId, msg: impl Into<String>) {
    self.errors.push(AnalysisError::warning(self.ast[at].span, msg));
  }

  fn set_ty(&mut self, id: NodeId, ty: CType) {
    self.cx.types.insert(id, ty);
  }

  fn ty(&self, id: NodeId) -> CType {
    self.cx.types.get(&id).cloned().unwrap_or_else(CType::error)
  }

  /// Poison propagation: if any already-decorated operand is the error
  /// type, the node silently becomes the error type too.
  fn poisoned(&mut self, id: NodeId, operands: &[NodeId]) -> bool {
    if operands.iter().any(|&o| self.ty(o).is_error()) {
      self.set_ty(id, CType::error());
      true
    } else {
      false
    }
  }

  fn in_scope<R>(&mut self, kind: ScopeKind, f: impl FnOnce(&mut Self) -> R) -> R {
    let saved = self.scope;
    self.scope = self.cx.st.open_scope(saved, kind);
    let r = f(self);
    self.scope = saved;
    r
  }

  // ---------------------------------------------------------------- traversal

  fn node(&mut self, id: NodeId) {
    let kind = self.ast[id].kind.clone();
    match kind {
      NodeKind::TranslationUnit(items) => {
        for item in items { self.node(item) }
      }
      NodeKind::FunctionDefinition { .. } => self.function_definition(id),
      NodeKind::Declaration { specifiers, init_declarators } =>
        self.declaration(id, &specifiers, &init_declarators),
      NodeKind::CompoundStatement(items) =>
        self.in_scope(ScopeKind::Block(id), |az| {
          for item in items { az.node(item) }
        }),
      NodeKind::For { init, cond, step, body } =>
        self.in_scope(ScopeKind::Block(id), |az| {
          if let Some(i) = init { az.node(i) }
          if let Some(c) = cond { az.node(c) }
          if let Some(s) = step { az.node(s) }
          az.node(body);
          az.iteration_statement(id, cond, init);
        }),
      NodeKind::ExpressionStatement(e) => {
        if let Some(e) = e { self.node(e) }
      }
      NodeKind::LabeledStatement { ref label, body } => {
        self.next_label_uid += 1;
        self.label_uids.insert(id, self.next_label_uid);
        if let Label::Named(l) = label { self.declare_label(*l) }
        if let Label::Case(e) = label { self.node(*e) }
        self.node(body);
        self.labeled_statement(id, label);
      }
      NodeKind::If { cond, then, els } => {
        self.node(cond);
        self.node(then);
        if let Some(e) = els { self.node(e) }
        if !self.ty(cond).is_scalar() && !self.ty(cond).is_error() {
          self.error(cond, ErrorKind::TypeMismatch,
            "controlling expression of an if statement must be of scalar type");
        }
      }
      NodeKind::Switch { cond, body } => {
        self.node(cond);
        self.node(body);
        self.switch_statement(id, cond, body);
      }
      NodeKind::While { cond, body } => {
        self.node(cond);
        self.node(body);
        self.iteration_statement(id, Some(cond), None);
      }
      NodeKind::DoWhile { body, cond } => {
        self.node(body);
        self.node(cond);
        self.iteration_statement(id, Some(cond), None);
      }
      NodeKind::Goto(label) => self.pending_gotos.push((label, self.scope)),
      NodeKind::Continue => {
        if self.ast.enclosing(id, |k| matches!(k,
            NodeKind::For { .. } | NodeKind::While { .. } | NodeKind::DoWhile { .. }))
            .is_none() {
          self.error(id, ErrorKind::Constraint,
            "continue statements are only allowed within loops");
        }
      }
      NodeKind::Break => {
        if self.ast.enclosing(id, |k| matches!(k,
            NodeKind::For { .. } | NodeKind::While { .. } | NodeKind::DoWhile { .. } |
            NodeKind::Switch { .. }))
            .is_none() {
          self.error(id, ErrorKind::Constraint,
            "break statements are only allowed within loops and switch statements");
        }
      }
      NodeKind::Return(e) => {
        if let Some(e) = e { self.node(e) }
        self.return_statement(id, e);
      }
      NodeKind::CompoundLiteral { type_name, init } => {
        self.node(type_name);
        self.compound_literal_before(id, type_name);
        self.node(init);
        self.compound_literal_after(id, init);
      }
      NodeKind::TypeName { ref specifiers, declarator } => {
        let ty = self.build_type(id, specifiers, declarator);
        self.cx.type_names.insert(id, ty);
      }
      NodeKind::InitializerList { .. } | NodeKind::Designation(_) |
      NodeKind::MemberDesignator(_) | NodeKind::IndexDesignator(_) => {
        // initializer contents and designator index expressions are
        // decorated here; the elaborator folds them later
        for c in self.ast.children(id) {
          let descend = self.ast.is_expression(c) || matches!(self.ast[c].kind,
            NodeKind::InitializerList { .. } | NodeKind::Designation(_) |
            NodeKind::MemberDesignator(_) | NodeKind::IndexDesignator(_));
          if descend { self.node(c) }
        }
      }
      _ => {
        for c in self.ast.children(id) { self.node(c) }
        self.decorate(id);
      }
    }
  }

  /// Post-order decoration of expression nodes.
  fn decorate(&mut self, id: NodeId) {
    let kind = self.ast[id].kind.clone();
    match kind {
      NodeKind::IntConstant(_, ty) => self.set_ty(id, ty),
      NodeKind::FloatConstant(..) => self.floating_constant(id),
      NodeKind::StringLiteral { .. } => self.string_literal(id),
      NodeKind::PrimaryIdentifier(name) => self.identifier(id, &name),
      NodeKind::Subscript { array, index } => self.subscript(id, array, index),
      NodeKind::FunctionCall { callee, args } => self.function_call(id, callee, &args),
      NodeKind::IntrinsicCall { name, args } => self.intrinsic_call(id, &name, &args),
      NodeKind::Member { lhs, name } => self.member(id, lhs, &name, false),
      NodeKind::DerefMember { lhs, name } => self.member(id, lhs, &name, true),
      NodeKind::Unary(op, operand) => self.unary(id, op, operand),
      NodeKind::SizeofExpr(operand) => self.sizeof_expr(id, Some(operand), None),
      NodeKind::SizeofType(tn) => self.sizeof_expr(id, None, Some(tn)),
      NodeKind::Cast { type_name, operand } => self.cast(id, type_name, operand),
      NodeKind::Binary(op, lhs, rhs) => self.binary(id, op, lhs, rhs),
      NodeKind::Conditional { cond, then, els } => self.conditional(id, cond, then, els),
      NodeKind::Assignment(op, lhs, rhs) => self.assignment(id, op, lhs, rhs),
      NodeKind::Comma(exprs) => {
        let last = *exprs.last().expect("comma expression has operands");
        let ty = self.ty(last);
        self.set_ty(id, ty);
      }
      NodeKind::StorageClassSpecifier(Scs::Register) =>
        self.warning(id,
          "the 'register' storage class will not prioritize an object to remain \
           in a register"),
      _ => {}
    }
  }

  // ------------------------------------------------------------- expressions

  /// The expression type of a designator of type `ty`: arrays decay to
  /// pointers and function designators to function pointers, except under
  /// `sizeof`, address-of, or when a string literal initializes an array.
  fn expression_type(&mut self, ty: &CType, id: NodeId) -> CType {
    let Some(parent) = self.ast[id].parent else { return ty.clone() };
    let array_unconverted = matches!(self.ast[parent].kind,
        NodeKind::SizeofExpr(_) | NodeKind::Unary(UnOp::Reference, _)) ||
      self.string_literal_initializes_array(id);
    let function_unconverted = matches!(self.ast[parent].kind,
      NodeKind::SizeofExpr(_) | NodeKind::Unary(UnOp::Reference, _));
    match &ty.kind {
      TyKind::Array(..) if !array_unconverted => ty.decayed(),
      TyKind::Function(_) if !function_unconverted => ty.decayed(),
      _ => ty.clone(),
    }
  }

  /// Whether this string literal is the whole initializer of an array
  /// object, which suppresses its decay to a pointer.
  fn string_literal_initializes_array(&mut self, id: NodeId) -> bool {
    if !matches!(self.ast[id].kind, NodeKind::StringLiteral { .. }) { return false }
    let Some(ideclr) = self.ast.enclosing(id,
      |k| matches!(k, NodeKind::InitDeclarator { .. })) else { return false };
    let NodeKind::InitDeclarator { declarator, initializer } = &self.ast[ideclr].kind
      else { return false };
    let Some(init) = *initializer else { return false };
    let Some(target) = self.ast.declarator_identifier(*declarator)
      .and_then(|d| self.cx.st.get_by_syntax(d)) else { return false };
    let target_ty = self.cx.st[target].ty.clone();

    // directly, or as the sole element of a braced list
    let parent = self.ast[id].parent;
    if parent == Some(ideclr) ||
        (parent == Some(init) && if_chain! {
          if let NodeKind::InitializerList { initializers, .. } = &self.ast[init].kind;
          if initializers.len() == 1;
          then { true } else { false }
        }) {
      if let TyKind::Array(elem, _) = &target_ty.kind {
        if elem.is_scalar() { return true }
      }
      return false
    }

    // nested: consult the elaborated target type of this leaf
    if matches!(self.ast[init].kind, NodeKind::InitializerList { .. }) {
      let cx = self.cx.eval(self.ast);
      init::elaborate_list(&cx, &mut self.init, &mut self.errors, init, &target_ty);
      if let Some(t) = self.init.targets.get(&id) {
        if let TyKind::Array(elem, _) = &t.kind {
          return elem.is_scalar()
        }
      }
    }
    false
  }

  /// Whether the expression designates an object.
  fn is_lvalue(&self, id: NodeId) -> bool {
    match &self.ast[id].kind {
      NodeKind::PrimaryIdentifier(_) =>
        !matches!(self.ty(id).kind, TyKind::Function(_)),
      NodeKind::Subscript { .. } | NodeKind::Member { .. } |
      NodeKind::DerefMember { .. } | NodeKind::CompoundLiteral { .. } |
      NodeKind::StringLiteral { .. } | NodeKind::Unary(UnOp::Dereference, _) => true,
      _ => false,
    }
  }

  /// Whether the expression appears where an object (not its value) is
  /// required; lvalues keep their qualifiers only here.
  fn in_lvalue_context(&self, id: NodeId) -> bool {
    let Some(parent) = self.ast[id].parent else { return false };
    match &self.ast[parent].kind {
      NodeKind::Assignment(_, lhs, _) => *lhs == id,
      NodeKind::Member { lhs, .. } => *lhs == id,
      NodeKind::Unary(UnOp::Reference | UnOp::PreInc | UnOp::PreDec |
        UnOp::PostInc | UnOp::PostDec, _) => true,
      _ => false,
    }
  }

  fn strip_rvalue_quals(&mut self, id: NodeId) {
    if !self.in_lvalue_context(id) {
      if let Some(ty) = self.cx.types.get_mut(&id) {
        ty.quals = Quals::empty();
      }
    }
  }

  fn is_modifiable_lvalue(&self, id: NodeId) -> bool {
    if !self.is_lvalue(id) { return false }
    let ty = self.ty(id);
    if matches!(ty.kind, TyKind::Array(..)) { return false }
    if !ty.is_complete(&self.cx.tt) && !ty.is_error() { return false }
    !ty.quals.contains(Quals::CONST)
  }

  /// The six-condition assignability relation of ISO 6.5.16.1 (1).
  fn can_assign(&mut self, tlhs: &CType, trhs: &CType, rhs: NodeId) -> bool {
    if tlhs.is_error() || trhs.is_error() { return true }
    let tt = &self.cx.tt;
    // condition 1: both arithmetic
    if tlhs.is_arithmetic() && trhs.is_arithmetic() { return true }
    // condition 2: compatible struct/union, qualifiers aside
    if matches!(tlhs.kind, TyKind::Struct(_) | TyKind::Union(_)) &&
        tlhs.compatible_ignoring_qualifiers(trhs, tt) {
      return true
    }
    if let (TyKind::Pointer(lp), TyKind::Pointer(rp)) = (&tlhs.kind, &trhs.kind) {
      let superset = lp.quals.contains(rp.quals);
      // condition 3: pointers to compatible types, lhs quals a superset
      if lp.compatible_ignoring_qualifiers(rp, tt) && superset { return true }
      // condition 4: one side is (object or incomplete)*, the other void*
      let obj_or_incomplete =
        |t: &CType| t.is_object(tt) || !t.is_complete(tt);
      if obj_or_incomplete(lp) && matches!(rp.kind, TyKind::Void) && superset {
        return true
      }
      if obj_or_incomplete(rp) && matches!(lp.kind, TyKind::Void) && superset {
        return true
      }
    }
    // condition 5: null pointer constant into any pointer
    if matches!(tlhs.kind, TyKind::Pointer(_)) {
      let cx = self.cx.eval(self.ast);
      if is_null_ptr_constant(&cx, rhs) { return true }
    }
    // condition 6: any pointer into _Bool
    matches!(tlhs.kind, TyKind::Bool) && matches!(trhs.kind, TyKind::Pointer(_))
  }

  fn subscript(&mut self, id: NodeId, array: NodeId, index: NodeId) {
    if self.poisoned(id, &[array, index]) { return }
    // ISO 6.5.2.1 (1): one operand a pointer (or array), the other integer;
    // either order is accepted
    let (mut arr, mut idx) = (array, index);
    let is_ptr = |t: &CType| matches!(t.kind, TyKind::Pointer(_) | TyKind::Array(..));
    let mut pass = true;
    if is_ptr(&self.ty(index)) {
      (arr, idx) = (index, array);
    } else if !is_ptr(&self.ty(array)) {
      self.error(id, ErrorKind::TypeMismatch,
        "subscript can only be applied to array and pointer types");
      pass = false;
    }
    if pass && !self.ty(idx).is_integer() {
      self.error(id, ErrorKind::TypeMismatch,
        "subscript index expression can only be of integer type");
      pass = false;
    }
    if pass {
      let elem = self.ty(arr).pointee().cloned().unwrap_or_else(CType::error);
      let ty = self.expression_type(&elem, id);
      self.set_ty(id, ty);
      self.strip_rvalue_quals(id);
    } else {
      self.set_ty(id, CType::error());
    }
  }

  fn function_call(&mut self, id: NodeId, callee: NodeId, args: &[NodeId]) {
    let called = self.ty(callee);
    if called.is_error() {
      self.set_ty(id, CType::error());
      return
    }
    let mut pass = true;
    let Some(fnty) = called.as_function().cloned() else {
      self.error(id, ErrorKind::TypeMismatch,
        "calling expression in function call must be of function or function \
         pointer type");
      self.set_ty(id, CType::error());
      return
    };
    let ret_ok = matches!(fnty.ret.kind, TyKind::Void) ||
      (fnty.ret.is_object(&self.cx.tt) && !matches!(fnty.ret.kind, TyKind::Array(..)));
    if !ret_ok {
      self.error(id, ErrorKind::TypeMismatch,
        "function to be called must have a return type of void or an object type \
         besides an array type");
      pass = false;
    }

    if pass {
      if let Some(params) = &fnty.params {
        if fnty.variadic && args.len() < params.len() {
          self.error(id, ErrorKind::TypeMismatch, format!(
            "function to be called expected {} or more argument(s), got {}",
            params.len(), args.len()));
        } else if !fnty.variadic && params.len() != args.len() {
          self.error(id, ErrorKind::TypeMismatch, format!(
            "function to be called expected {} argument(s), got {}",
            params.len(), args.len()));
          pass = false;
        } else {
          for (i, (&arg, param)) in args.iter().zip(params).enumerate() {
            let unqualified = param.unqualified();
            let arg_ty = self.ty(arg);
            if !self.can_assign(&unqualified, &arg_ty, arg) {
              self.error(arg, ErrorKind::TypeMismatch, format!(
                "invalid type for argument {} of this function call", i + 1));
              pass = false;
            }
          }
        }
      }
    }

    for &arg in args {
      let t = self.ty(arg);
      if !t.is_object(&self.cx.tt) && !t.is_error() {
        self.error(arg, ErrorKind::TypeMismatch,
          "argument in function call needs to be of object type");
        pass = false;
      }
    }

    if pass {
      let ty = if fnty.ret.is_object(&self.cx.tt) { fnty.ret.clone() }
        else { TyKind::Void.into() };
      self.set_ty(id, ty);
    } else {
      self.set_ty(id, CType::error());
    }
  }

  fn member(&mut self, id: NodeId, lhs: NodeId, name: &str, through_pointer: bool) {
    if self.poisoned(id, &[lhs]) { return }
    let lhs_ty = self.ty(lhs);
    let target = if through_pointer {
      match &lhs_ty.kind {
        TyKind::Pointer(p) => Some(p.as_ref().clone()),
        _ => None,
      }
    } else {
      Some(lhs_ty.clone())
    };
    let rec = target.as_ref().and_then(|t| match t.kind {
      TyKind::Struct(r) | TyKind::Union(r) => Some((r, t.quals)),
      _ => None,
    });
    let Some((rec, agg_quals)) = rec else {
      self.error(id, ErrorKind::TypeMismatch, if through_pointer {
        "left hand side of dereferencing member access expression must be of \
         struct/union type"
      } else {
        "left hand side of member access expression must be of struct/union type"
      });
      self.set_ty(id, CType::error());
      return
    };
    let Some((idx, _)) = self.cx.tt.member_info(rec, name) else {
      self.error(id, ErrorKind::Undeclared,
        format!("struct/union has no such member '{name}'"));
      self.set_ty(id, CType::error());
      return
    };
    let mty = self.cx.tt.records[rec].members.as_ref().expect("complete")[idx].ty.clone();
    let mut ty = self.expression_type(&mty, id);
    // the member inherits the aggregate's qualifiers
    ty.quals |= agg_quals;
    self.set_ty(id, ty);
    self.strip_rvalue_quals(id);
  }

  fn unary(&mut self, id: NodeId, op: UnOp, operand: NodeId) {
    if self.poisoned(id, &[operand]) { return }
    let otype = self.ty(operand);
    match op {
      UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
        let pass = self.is_modifiable_lvalue(operand) &&
          (otype.is_real() || matches!(otype.kind, TyKind::Pointer(_)));
        if pass {
          let ty = self.expression_type(&otype, id);
          self.set_ty(id, ty);
        } else {
          self.error(id, ErrorKind::TypeMismatch,
            "invalid operand to increment/decrement operator");
          self.set_ty(id, CType::error());
        }
      }
      UnOp::Dereference => {
        if let TyKind::Pointer(p) = &otype.kind {
          let p = p.as_ref().clone();
          let ty = self.expression_type(&p, id);
          self.set_ty(id, ty);
          self.strip_rvalue_quals(id);
        } else {
          self.error(id, ErrorKind::TypeMismatch,
            "dereference operand must be of pointer type");
          self.set_ty(id, CType::error());
        }
      }
      UnOp::Reference => self.reference(id, operand, &otype),
      UnOp::Plus | UnOp::Minus => {
        if otype.is_arithmetic() {
          self.set_ty(id, otype.integer_promotions());
        } else {
          self.error(id, ErrorKind::TypeMismatch,
            "plus/minus operand must be of arithmetic type");
          self.set_ty(id, CType::error());
        }
      }
      UnOp::Complement => {
        if otype.is_integer() {
          self.set_ty(id, otype.integer_promotions());
        } else {
          self.error(id, ErrorKind::TypeMismatch,
            "complement operand must be of integer type");
          self.set_ty(id, CType::error());
        }
      }
      UnOp::Not => {
        if otype.is_scalar() {
          self.set_ty(id, TyKind::Int.into());
        } else {
          self.error(id, ErrorKind::TypeMismatch,
            "not ('!') operand must be of scalar type");
          self.set_ty(id, CType::error());
        }
      }
    }
  }

  fn reference(&mut self, id: NodeId, operand: NodeId, otype: &CType) {
    // ISO 6.5.3.2 (1): function designators, results of [] and unary *,
    // and lvalues that are neither bitfields nor register objects
    let mut context: Option<&str> = None;
    let pass = if matches!(otype.kind, TyKind::Function(_)) ||
        matches!(self.ast[operand].kind,
          NodeKind::Subscript { .. } | NodeKind::Unary(UnOp::Dereference, _)) {
      true
    } else if self.is_lvalue(operand) {
      if self.member_is_bitfield(operand) {
        context = Some("cannot request address of a bitfield");
        false
      } else if self.register_object_addr_requested(operand) {
        context = Some("cannot request address of an object declared with the \
          'register' storage class specifier");
        false
      } else {
        true
      }
    } else {
      false
    };

    if pass {
      self.set_ty(id, otype.clone().pointer_to());
    } else {
      let msg = match context {
        Some(c) => format!("invalid operand to address-of operator: {c}"),
        None => "invalid operand to address-of operator".into(),
      };
      self.error(id, ErrorKind::TypeMismatch, msg);
      self.set_ty(id, CType::error());
    }
  }

  /// Whether a member-access expression resolves to a bitfield member.
  fn member_is_bitfield(&self, id: NodeId) -> bool {
    let (NodeKind::Member { lhs, name } | NodeKind::DerefMember { lhs, name }) =
      &self.ast[id].kind else { return false };
    let lhs_ty = self.ty(*lhs);
    let target = match (&self.ast[id].kind, &lhs_ty.kind) {
      (NodeKind::DerefMember { .. }, TyKind::Pointer(p)) => p.as_ref().clone(),
      _ => lhs_ty.clone(),
    };
    let (TyKind::Struct(rec) | TyKind::Union(rec)) = target.kind else { return false };
    self.cx.tt.records[rec].members.as_ref()
      .and_then(|ms| ms.iter().find(|m| m.name == *name))
      .is_some_and(|m| m.bit_width.is_some())
  }

  /// Bounded sub-traversal: does the operand contain an lvalue use of an
  /// object declared `register`?
  fn register_object_addr_requested(&mut self, expr: NodeId) -> bool {
    let mut found = false;
    let mut ids = vec![];
    self.ast.walk(expr, &mut |n| {
      if matches!(self.ast[n].kind, NodeKind::PrimaryIdentifier(_)) { ids.push(n) }
    });
    for n in ids {
      if_chain! {
        if let Some(&sym) = self.cx.resolved.get(&n);
        if self.symbol_declared_register(sym);
        if self.is_lvalue(n);
        then { found = true }
      }
    }
    found
  }

  fn symbol_declared_register(&self, sym: SymId) -> bool {
    let Some(declarer) = self.cx.st[sym].declarer else { return false };
    let Some(decl) = self.ast.enclosing(declarer, |k| matches!(k,
      NodeKind::Declaration { .. } | NodeKind::ParameterDeclaration { .. })) else {
      return false
    };
    let (NodeKind::Declaration { specifiers, .. } |
         NodeKind::ParameterDeclaration { specifiers, .. }) = &self.ast[decl].kind else {
      return false
    };
    specifiers.iter().any(|&s| matches!(self.ast[s].kind,
      NodeKind::StorageClassSpecifier(Scs::Register)))
  }

  fn sizeof_expr(&mut self, id: NodeId, operand: Option<NodeId>, tn: Option<NodeId>) {
    let otype = match (operand, tn) {
      (Some(op), _) => self.ty(op),
      (_, Some(tn)) =>
        self.cx.type_names.get(&tn).cloned().unwrap_or_else(CType::error),
      _ => CType::error(),
    };
    if otype.is_error() {
      self.set_ty(id, CType::error());
      return
    }
    let mut pass = true;
    if matches!(otype.kind, TyKind::Function(_)) {
      self.error(id, ErrorKind::TypeMismatch, "sizeof operand cannot be of function type");
      pass = false;
    }
    if !otype.is_complete(&self.cx.tt) && !matches!(otype.kind, TyKind::Function(_)) {
      self.error(id, ErrorKind::TypeMismatch, "sizeof operand cannot be of incomplete type");
      pass = false;
    }
    if operand.is_some_and(|op| self.member_is_bitfield(op)) {
      self.error(id, ErrorKind::TypeMismatch, "sizeof operand cannot be a bitfield member");
      pass = false;
    }
    self.set_ty(id, if pass { CType::size_t() } else { CType::error() });
  }

  fn cast(&mut self, id: NodeId, type_name: NodeId, operand: NodeId) {
    if self.poisoned(id, &[operand]) { return }
    let Some(ct) = self.cx.type_names.get(&type_name).cloned() else {
      self.set_ty(id, CType::error());
      return
    };
    if ct.is_error() {
      self.set_ty(id, ct);
      return
    }
    if !matches!(ct.kind, TyKind::Void) && !ct.is_scalar() {
      self.error(id, ErrorKind::TypeMismatch,
        "type name of cast expression must be of scalar type");
      self.set_ty(id, CType::error());
    } else {
      self.set_ty(id, ct);
    }
  }

  fn binary(&mut self, id: NodeId, op: BinOp, lhs: NodeId, rhs: NodeId) {
    if self.poisoned(id, &[lhs, rhs]) { return }
    let tl = self.ty(lhs);
    let tr = self.ty(rhs);
    let tt = &self.cx.tt;
    match op {
      BinOp::Mul | BinOp::Div => {
        if tl.is_arithmetic() && tr.is_arithmetic() {
          self.set_ty(id, tl.usual_arithmetic_conversions(&tr));
        } else {
          let side = if tl.is_arithmetic() { "right" } else { "left" };
          self.error(id, ErrorKind::TypeMismatch, format!(
            "{side} hand side of multiplication/division expression must have an \
             arithmetic type"));
          self.set_ty(id, CType::error());
        }
      }
      BinOp::Mod => {
        if tl.is_integer() && tr.is_integer() {
          self.set_ty(id, tl.usual_arithmetic_conversions(&tr));
        } else {
          let side = if tl.is_integer() { "right" } else { "left" };
          self.error(id, ErrorKind::TypeMismatch, format!(
            "{side} hand side of modular expression must have an integer type"));
          self.set_ty(id, CType::error());
        }
      }
      BinOp::Add => {
        let obj_ptr =
          |t: &CType| matches!(&t.kind, TyKind::Pointer(p) if p.is_object(tt));
        let ct = if tl.is_arithmetic() && tr.is_arithmetic() {
          Some(tl.usual_arithmetic_conversions(&tr))
        } else if tl.is_integer() && obj_ptr(&tr) {
          Some(tr.clone())
        } else if tr.is_integer() && obj_ptr(&tl) {
          Some(tl.clone())
        } else {
          None
        };
        match ct {
          Some(ct) => self.set_ty(id, ct),
          None => {
            self.error(id, ErrorKind::TypeMismatch, "invalid operands of addition expression");
            self.set_ty(id, CType::error());
          }
        }
      }
      BinOp::Sub => {
        let obj_ptr =
          |t: &CType| matches!(&t.kind, TyKind::Pointer(p) if p.is_object(tt));
        let compatible_ptrs = match (&tl.kind, &tr.kind) {
          (TyKind::Pointer(lp), TyKind::Pointer(rp)) =>
            lp.is_object(tt) && rp.is_object(tt) &&
            lp.compatible_ignoring_qualifiers(rp, tt),
          _ => false,
        };
        let ct = if tl.is_arithmetic() && tr.is_arithmetic() {
          Some(tl.usual_arithmetic_conversions(&tr))
        } else if obj_ptr(&tl) && tr.is_integer() {
          Some(tl.clone())
        } else if compatible_ptrs {
          Some(CType::ptrdiff_t())
        } else {
          None
        };
        match ct {
          Some(ct) => self.set_ty(id, ct),
          None => {
            self.error(id, ErrorKind::TypeMismatch,
              "invalid operands of subtraction expression");
            self.set_ty(id, CType::error());
          }
        }
      }
      BinOp::Shl | BinOp::Shr => {
        if tl.is_integer() && tr.is_integer() {
          self.set_ty(id, tl.integer_promotions());
        } else {
          let side = if tl.is_integer() { "right" } else { "left" };
          self.error(id, ErrorKind::TypeMismatch, format!(
            "{side} hand side of shift expression must have an integer type"));
          self.set_ty(id, CType::error());
        }
      }
      BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
        let both_real = tl.is_real() && tr.is_real();
        let both_ptr = if_chain! {
          if let (TyKind::Pointer(lp), TyKind::Pointer(rp)) = (&tl.kind, &tr.kind);
          if lp.compatible_ignoring_qualifiers(rp, tt);
          then {
            (lp.is_object(tt) && rp.is_object(tt)) ||
            (!lp.is_complete(tt) && !rp.is_complete(tt))
          } else { false }
        };
        if both_real || both_ptr {
          self.set_ty(id, TyKind::Int.into());
        } else {
          self.error(id, ErrorKind::TypeMismatch,
            "invalid operands of relational expression");
          self.set_ty(id, CType::error());
        }
      }
      BinOp::Eq | BinOp::Ne => self.equality(id, lhs, rhs, &tl, &tr),
      BinOp::BitAnd | BinOp::BitXor | BinOp::BitOr => {
        if tl.is_integer() && tr.is_integer() {
          self.set_ty(id, tl.usual_arithmetic_conversions(&tr));
        } else {
          let side = if tl.is_integer() { "right" } else { "left" };
          self.error(id, ErrorKind::TypeMismatch, format!(
            "{side} hand side of bitwise expression must have an integer type"));
          self.set_ty(id, CType::error());
        }
      }
      BinOp::LogAnd | BinOp::LogOr => {
        if tl.is_scalar() && tr.is_scalar() {
          self.set_ty(id, TyKind::Int.into());
        } else {
          let side = if tl.is_scalar() { "right" } else { "left" };
          self.error(id, ErrorKind::TypeMismatch, format!(
            "{side} hand side of logical expression must have a scalar type"));
          self.set_ty(id, CType::error());
        }
      }
    }
  }

  fn equality(&mut self, id: NodeId, lhs: NodeId, rhs: NodeId, tl: &CType, tr: &CType) {
    let tt = &self.cx.tt;
    let obj_or_incomplete = |t: &CType| t.is_object(tt) || !t.is_complete(tt);
    let mut pass = tl.is_arithmetic() && tr.is_arithmetic();
    if !pass {
      if let (TyKind::Pointer(lp), TyKind::Pointer(rp)) = (&tl.kind, &tr.kind) {
        pass = lp.compatible_ignoring_qualifiers(rp, tt) ||
          (obj_or_incomplete(lp) && matches!(rp.kind, TyKind::Void)) ||
          (obj_or_incomplete(rp) && matches!(lp.kind, TyKind::Void));
      }
    }
    if !pass && matches!(tl.kind, TyKind::Pointer(_)) {
      let cx = self.cx.eval(self.ast);
      pass = is_null_ptr_constant(&cx, rhs);
    }
    if !pass && matches!(tr.kind, TyKind::Pointer(_)) {
      let cx = self.cx.eval(self.ast);
      pass = is_null_ptr_constant(&cx, lhs);
    }
    if pass {
      self.set_ty(id, TyKind::Int.into());
    } else {
      self.error(id, ErrorKind::TypeMismatch, "invalid operands of equality expression");
      self.set_ty(id, CType::error());
    }
  }

  fn is_npc(&self, e: NodeId) -> bool {
    let cx = self.cx.eval(self.ast);
    is_null_ptr_constant(&cx, e)
  }

  /// `ptr-to-(object|incomplete) : void*` — the result is a qualified
  /// `void *`.
  fn void_ptr_side(&self, a: &CType, b: &CType) -> Option<CType> {
    let tt = &self.cx.tt;
    if_chain! {
      if let TyKind::Pointer(ap) = &a.kind;
      if ap.is_object(tt) || !ap.is_complete(tt);
      if let TyKind::Pointer(bp) = &b.kind;
      if matches!(bp.kind, TyKind::Void);
      then {
        let mut pointee = CType::new(TyKind::Void);
        pointee.quals = ap.quals | bp.quals;
        Some(pointee.pointer_to())
      } else { None }
    }
  }

  /// The composite type of the second and third operands of `?:`
  /// (ISO 6.5.15 (5)/(6)), or `None` if the operands are invalid.
  fn conditional_type(&self, then: NodeId, els: NodeId, t2: &CType, t3: &CType)
      -> Option<CType> {
    let tt = &self.cx.tt;
    if t2.is_arithmetic() && t3.is_arithmetic() {
      return Some(t2.usual_arithmetic_conversions(t3))
    }
    if matches!(t2.kind, TyKind::Struct(_) | TyKind::Union(_)) &&
        matches!(t3.kind, TyKind::Struct(_) | TyKind::Union(_)) &&
        t2.compatible(t3, tt) {
      return Some(t2.clone())
    }
    if matches!(t2.kind, TyKind::Void) && matches!(t3.kind, TyKind::Void) {
      return Some(TyKind::Void.into())
    }
    if let (TyKind::Pointer(lp), TyKind::Pointer(rp)) = (&t2.kind, &t3.kind) {
      if lp.compatible_ignoring_qualifiers(rp, tt) {
        // composite pointee with merged qualifiers
        let mut pointee = lp.unqualified().compose(&rp.unqualified(), tt);
        pointee.quals = lp.quals | rp.quals;
        return Some(pointee.pointer_to())
      }
    }
    if matches!(t2.kind, TyKind::Pointer(_)) && self.is_npc(els) {
      let lp = t2.pointee().expect("pointer");
      let mut pointee = lp.clone();
      pointee.quals = lp.quals | t3.pointee().map_or(Quals::empty(), |p| p.quals);
      return Some(pointee.pointer_to())
    }
    if matches!(t3.kind, TyKind::Pointer(_)) && self.is_npc(then) {
      let rp = t3.pointee().expect("pointer");
      let mut pointee = rp.clone();
      pointee.quals = rp.quals | t2.pointee().map_or(Quals::empty(), |p| p.quals);
      return Some(pointee.pointer_to())
    }
    self.void_ptr_side(t2, t3).or_else(|| self.void_ptr_side(t3, t2))
  }

  fn conditional(&mut self, id: NodeId, cond: NodeId, then: NodeId, els: NodeId) {
    if self.poisoned(id, &[cond, then, els]) { return }
    let mut ft: Option<CType> = None;
    if !self.ty(cond).is_scalar() {
      self.error(id, ErrorKind::TypeMismatch,
        "condition of a conditional expression must have a scalar type");
      ft = Some(CType::error());
    }
    let t2 = self.ty(then);
    let t3 = self.ty(els);
    let result = self.conditional_type(then, els, &t2, &t3);
    match ft.or(result) {
      Some(ty) => self.set_ty(id, ty),
      None => {
        self.error(id, ErrorKind::TypeMismatch,
          "invalid operands of conditional expression");
        self.set_ty(id, CType::error());
      }
    }
  }

  fn assignment(&mut self, id: NodeId, op: AssignOp, lhs: NodeId, rhs: NodeId) {
    if self.poisoned(id, &[lhs, rhs]) { return }
    let mut ft: Option<CType> = None;
    if !self.is_modifiable_lvalue(lhs) {
      self.error(id, ErrorKind::TypeMismatch,
        "left-hand side of assignment expression must be a modifiable lvalue");
      ft = Some(CType::error());
    }
    // ISO 6.5.16 (3): the result has the lhs type, unqualified
    let ty = ft.unwrap_or_else(|| self.ty(lhs).unqualified());
    self.set_ty(id, ty);

    let tl = self.ty(lhs);
    let tr = self.ty(rhs);
    let pass = match op {
      AssignOp::Assign => self.can_assign(&tl, &tr, rhs),
      AssignOp::AddAssign | AssignOp::SubAssign => {
        (matches!(&tl.kind, TyKind::Pointer(p) if p.is_object(&self.cx.tt)) &&
          tr.is_integer()) ||
        (tl.is_arithmetic() && tr.is_arithmetic())
      }
      AssignOp::MulAssign | AssignOp::DivAssign =>
        tl.is_arithmetic() && tr.is_arithmetic(),
      AssignOp::ModAssign | AssignOp::ShlAssign | AssignOp::ShrAssign |
      AssignOp::AndAssign | AssignOp::XorAssign | AssignOp::OrAssign =>
        tl.is_integer() && tr.is_integer(),
    };
    if !pass {
      let msg = if op == AssignOp::Assign { "simple assignment operation is invalid" }
        else { "compound assignment operation has invalid operands" };
      self.error(id, ErrorKind::TypeMismatch, msg);
      self.set_ty(id, CType::error());
    }
  }

  // ------------------------------------------------- identifiers and symbols

  fn identifier(&mut self, id: NodeId, name: &str) {
    let Some(sym) = self.cx.st.lookup(name, Namespace::Ordinary, self.scope) else {
      self.error(id, ErrorKind::Undeclared,
        format!("symbol '{name}' is not defined in the given context"));
      self.set_ty(id, CType::error());
      return
    };
    self.cx.resolved.insert(id, sym);

    // ISO 6.7.4 (3): an inline function body may not reference an
    // identifier with internal linkage
    if_chain! {
      if self.cx.st[sym].linkage == Linkage::Internal;
      if let Some(fdef) = self.enclosing_function_symbol(id);
      if self.cx.st[fdef].ty.is_inline_function();
      then {
        self.error(id, ErrorKind::Constraint,
          "an inline function may not contain a reference to an identifier \
           declared with internal linkage");
      }
    }

    let sym_ty = self.cx.st[sym].ty.clone();
    let ty = self.expression_type(&sym_ty, id);
    self.set_ty(id, ty);
    self.strip_rvalue_quals(id);
  }

  fn enclosing_function_symbol(&self, id: NodeId) -> Option<SymId> {
    let fdef = self.ast.enclosing(id,
      |k| matches!(k, NodeKind::FunctionDefinition { .. }))?;
    let NodeKind::FunctionDefinition { declarator, .. } = &self.ast[fdef].kind else {
      return None
    };
    self.ast.declarator_identifier(*declarator)
      .and_then(|d| self.cx.st.get_by_syntax(d))
  }

  // ------------------------------------------------------------ declarations

  fn declaration(&mut self, id: NodeId, specifiers: &[NodeId], init_declarators: &[NodeId]) {
    for &s in specifiers { self.specifier(s) }
    let base = self.base_type(id, specifiers);

    // ISO 6.7 (2): something must be declared
    if init_declarators.is_empty() {
      let declares_tag = specifiers.iter().any(|&s| matches!(&self.ast[s].kind,
        NodeKind::StructUnionSpecifier { tag: Some(_), .. } |
        NodeKind::EnumSpecifier { tag: Some(_), .. } |
        NodeKind::EnumSpecifier { enumerators: Some(_), .. }));
      if !declares_tag {
        self.error(id, ErrorKind::Constraint,
          "a declaration must declare an identifier, struct/union/enum tag, or an \
           enumeration constant");
      }
    }

    self.one_storage_class(id, specifiers);
    self.no_auto_register_at_file_scope(id, specifiers);

    for &ideclr in init_declarators {
      let NodeKind::InitDeclarator { declarator, initializer } =
        self.ast[ideclr].kind.clone() else { continue };
      self.declare(id, specifiers, &base, declarator, initializer, false);
      if let Some(init) = initializer {
        self.node(init);
        self.init_declarator(ideclr, declarator, init);
      }
    }
  }

  fn one_storage_class(&mut self, id: NodeId, specifiers: &[NodeId]) {
    let count = specifiers.iter().filter(|&&s| matches!(self.ast[s].kind,
      NodeKind::StorageClassSpecifier(_))).count();
    if count > 1 {
      self.error(id, ErrorKind::Constraint,
        "only one storage class specifier allowed in declaration");
    }
  }

  fn no_auto_register_at_file_scope(&mut self, _id: NodeId, specifiers: &[NodeId]) {
    if self.scope != ScopeId::FILE { return }
    for &s in specifiers {
      if let NodeKind::StorageClassSpecifier(scs @ (Scs::Auto | Scs::Register)) =
          self.ast[s].kind {
        self.error(s, ErrorKind::Constraint,
          format!("'{}' not allowed in external declaration", scs.name()));
      }
    }
  }

  fn storage_class(&self, specifiers: &[NodeId]) -> Option<Scs> {
    specifiers.iter().find_map(|&s| match self.ast[s].kind {
      NodeKind::StorageClassSpecifier(scs) => Some(scs),
      _ => None,
    })
  }

  /// Create the symbol for one declarator and run the declaring-identifier
  /// constraint checks.
  #[allow(clippy::too_many_lines)]
  fn declare(&mut self, decl: NodeId, specifiers: &[NodeId], base: &CType,
      declarator: NodeId, initializer: Option<NodeId>, is_definition: bool)
      -> Option<SymId> {
    self.declarator_checks(declarator);
    let mut ty = self.declarator_type(declarator, base.clone());
    if let TyKind::Function(f) = &mut ty.kind {
      f.inline = has_inline_specifier(self.ast, specifiers);
    }
    let Some(ident) = self.ast.declarator_identifier(declarator) else { return None };
    let NodeKind::DeclaratorIdentifier(name) = self.ast[ident].kind.clone() else {
      return None
    };

    let scs = self.storage_class(specifiers);
    let at_file_scope = self.scope == ScopeId::FILE;
    let is_function = matches!(ty.kind, TyKind::Function(_));
    let prior = self.cx.st.lookup(&name, Namespace::Ordinary, self.scope)
      .map(|s| self.cx.st[s].linkage);
    let linkage = self.cx.st.derive_linkage(at_file_scope, scs, is_function, prior);
    let storage = self.cx.st.derive_storage(at_file_scope, scs,
      !is_function && scs != Some(Scs::Typedef));

    let mut sym = Symbol::new(name.clone(), ty.clone(), Namespace::Ordinary,
      Some(ident), self.scope);
    sym.linkage = linkage;
    sym.storage = storage;
    sym.state = if is_definition || initializer.is_some() {
      DefState::Defined
    } else if at_file_scope && !is_function && scs != Some(Scs::Extern) &&
        scs != Some(Scs::Typedef) && storage == StorageDuration::Static {
      DefState::Tentative
    } else {
      DefState::Declared
    };
    let tentative = sym.state == DefState::Tentative;
    let sy = self.cx.st.add(sym);

    // declaring-identifier constraint checks
    let siblings = self.cx.st.in_scope(&name, Namespace::Ordinary, self.scope);

    // ISO 6.7.4 (3)/(4): inline function constraints
    if_chain! {
      if let Some(fsym) = self.enclosing_function_symbol(ident);
      if fsym != sy;
      if self.cx.st[fsym].ty.is_inline_function();
      if storage == StorageDuration::Static;
      if !ty.quals.contains(Quals::CONST);
      then {
        self.error(ident, ErrorKind::Constraint,
          "an inline function may not declare a non-const identifier with static \
           storage duration");
      }
    }
    if is_function && name == "main" && ty.is_inline_function() {
      self.error(ident, ErrorKind::Constraint,
        "'main' should not have the 'inline' function specifier");
    }

    // ISO 6.7.2.1 (2): arrays of flexible-array-member structs
    if matches!(ty.kind, TyKind::Array(..)) {
      let mut et = &ty;
      while let TyKind::Array(inner, _) = &et.kind { et = inner }
      if et.has_flexible_array_member(&self.cx.tt) {
        self.error(ident, ErrorKind::Constraint,
          "an array may not have elements of a struct or union type that has a \
           flexible array member");
      }
    }

    // ISO 6.7 (3): no-linkage identifiers declared once per scope
    if !matches!(ty.kind, TyKind::Struct(_) | TyKind::Union(_) | TyKind::Enum(_)) &&
        linkage == Linkage::None && siblings.len() > 1 && scs != Some(Scs::Typedef) {
      self.error(ident, ErrorKind::Redeclaration,
        "symbol with no linkage may not be declared twice with the same scope and \
         namespace");
    }

    // ISO 6.7.8 (5): linkage identifiers may not be initialized at block scope
    if matches!(linkage, Linkage::External | Linkage::Internal) &&
        initializer.is_some() && self.cx.st.scope_is_block(self.scope) {
      self.error(ident, ErrorKind::Constraint,
        "symbol declared with external or internal linkage at block scope may not \
         be initialized");
    }

    // ISO 6.7.1 (5): block-scope function declarations carry only extern
    if self.cx.st.scope_is_block(self.scope) && is_function &&
        scs.is_some() && scs != Some(Scs::Extern) {
      self.error(ident, ErrorKind::Constraint,
        "function declarations at block scope may only have the 'extern' storage \
         class specifier");
    }

    // ISO 6.9.2 (3): tentative definitions with internal linkage must be complete
    if tentative && scs == Some(Scs::Static) && !ty.is_complete(&self.cx.tt) {
      self.error(ident, ErrorKind::Constraint,
        "tentative definitions with internal linkage may not have an incomplete \
         type");
    }

    // ISO 6.7 (4): all declarations in a scope must be compatible
    let _ = decl;
    for &x in &siblings {
      for &y in &siblings {
        if x == y { continue }
        let (tx, ty_) = (self.cx.st[x].ty.clone(), self.cx.st[y].ty.clone());
        if !tx.compatible_ignoring_qualifiers(&ty_, &self.cx.tt) {
          self.error(ident, ErrorKind::Redeclaration, format!(
            "another declaration of '{name}' in this scope does not have a \
             compatible type"));
          return Some(sy)
        }
      }
    }
    Some(sy)
  }

  /// Per-declarator structural checks that do not depend on the built type.
  fn declarator_checks(&mut self, declarator: NodeId) {
    let mut cur = declarator;
    loop {
      match self.ast[cur].kind.clone() {
        NodeKind::ArrayDeclarator { inner, length } => {
          if let Some(len) = length { self.array_length_check(cur, len) }
          cur = inner;
        }
        NodeKind::FunctionDeclarator { inner, ref params, ref knr_identifiers, .. } => {
          if params.is_none() {
            self.error(cur, ErrorKind::Unsupported,
              "functions without prototypes are not supported yet");
          }
          let in_definition = self.ast.enclosing(cur, |k| matches!(k,
              NodeKind::FunctionDefinition { .. })).is_some();
          if !in_definition && !knr_identifiers.is_empty() {
            self.error(cur, ErrorKind::Constraint,
              "function declarations which are not definitions must have an empty \
               identifier list");
          }
          if let Some(params) = params {
            for &p in params { self.parameter_declaration_check(p) }
          }
          cur = inner;
        }
        NodeKind::PointerDeclarator { inner, .. } => cur = inner,
        _ => break,
      }
    }
  }

  fn array_length_check(&mut self, declr: NodeId, len: NodeId) {
    self.node(len);
    let lty = self.ty(len);
    if lty.is_error() { return }
    if !lty.is_integer() {
      self.error(declr, ErrorKind::TypeMismatch,
        "array length expression must have an integer type");
      return
    }
    let cx = self.cx.eval(self.ast);
    match cx.evaluate_integer(len) {
      Err(_) => self.error(declr, ErrorKind::Unsupported,
        "variable-length arrays are not supported yet"),
      Ok(v) => {
        if v.convert_class(&TyKind::LongLong.into()).as_i64() <= 0 {
          self.error(declr, ErrorKind::Constraint,
            "constant array length must be greater than zero");
        }
      }
    }
  }

  fn parameter_declaration_check(&mut self, p: NodeId) {
    let NodeKind::ParameterDeclaration { specifiers, .. } = &self.ast[p].kind else {
      return
    };
    let bad = specifiers.iter().any(|&s| matches!(self.ast[s].kind,
      NodeKind::StorageClassSpecifier(scs) if scs != Scs::Register));
    if bad {
      self.error(p, ErrorKind::Constraint,
        "only the 'register' storage class specifier may appear in a parameter \
         declaration");
    }
  }

  /// Build the declared type by unwinding declarator layers onto a base
  /// type: outer layers transform the base before inner layers see it.
  fn declarator_type(&mut self, declarator: NodeId, base: CType) -> CType {
    match self.ast[declarator].kind.clone() {
      NodeKind::DeclaratorIdentifier(_) | NodeKind::AbstractBase => base,
      NodeKind::PointerDeclarator { quals, inner } => {
        let mut ptr = base.pointer_to();
        ptr.quals = quals;
        self.declarator_type(inner, ptr)
      }
      NodeKind::ArrayDeclarator { inner, length } => {
        let len = match length {
          None => ArrayLen::Unspecified,
          Some(len) => {
            let cx = self.cx.eval(self.ast);
            match cx.evaluate_integer(len) {
              Ok(v) => {
                let n = v.convert_class(&TyKind::LongLong.into()).as_i64();
                if n > 0 { ArrayLen::Fixed(n as u64) } else { ArrayLen::Expr(len) }
              }
              Err(_) => ArrayLen::Expr(len),
            }
          }
        };
        self.declarator_type(inner, base.array_of(len))
      }
      NodeKind::FunctionDeclarator { inner, params, variadic, .. } => {
        let params = params.map(|ps| self.parameter_types(&ps));
        let fnty = FnType { ret: base, params, variadic, inline: false };
        self.declarator_type(inner, TyKind::Function(Box::new(fnty)).into())
      }
      _ => base,
    }
  }

  /// Build parameter types, applying the ISO 6.7.5.3 adjustments: arrays
  /// decay to pointers, functions to function pointers, and a lone `void`
  /// parameter means an empty list.
  fn parameter_types(&mut self, params: &[NodeId]) -> Vec<CType> {
    if params.len() == 1 {
      if let NodeKind::ParameterDeclaration { specifiers, declarator } =
          &self.ast[params[0]].kind {
        let void_only = declarator.is_none() && specifiers.len() == 1 &&
          matches!(self.ast[specifiers[0]].kind,
            NodeKind::BasicTypeSpecifier(Bts::Void));
        if void_only { return vec![] }
      }
    }
    params.iter().filter_map(|&p| {
      let NodeKind::ParameterDeclaration { specifiers, declarator } =
        self.ast[p].kind.clone() else { return None };
      for &s in &specifiers { self.specifier(s) }
      let base = self.base_type(p, &specifiers);
      let ty = match declarator {
        Some(d) => self.declarator_type(d, base),
        None => base,
      };
      Some(match &ty.kind {
        TyKind::Array(..) | TyKind::Function(_) => ty.decayed(),
        _ => ty,
      })
    }).collect()
  }

  fn init_declarator(&mut self, ideclr: NodeId, declarator: NodeId, init: NodeId) {
    let Some(ident) = self.ast.declarator_identifier(declarator) else { return };
    let Some(sy) = self.cx.st.get_by_syntax(ident) else { return };
    let sym_ty = self.cx.st[sy].ty.clone();

    if !sym_ty.is_object(&self.cx.tt) &&
        !(matches!(sym_ty.kind, TyKind::Array(..)) && !sym_ty.is_vla()) {
      self.error(ideclr, ErrorKind::TypeMismatch, format!(
        "initialization target '{}' must be an object type or an array of unknown \
         size that is not variable-length", self.cx.st[sy].name));
      return
    }

    // unwrap a single-element brace around a scalar or a string literal
    let mut leaf = init;
    if_chain! {
      if let NodeKind::InitializerList { initializers, .. } = &self.ast[init].kind;
      if initializers.len() == 1;
      then {
        let inner = initializers[0];
        let scalar_unwrap = sym_ty.is_scalar() &&
          !matches!(self.ast[inner].kind, NodeKind::InitializerList { .. }) &&
          self.ty(inner).is_scalar();
        let string_unwrap = if_chain! {
          if let NodeKind::StringLiteral { reg, wide } = &self.ast[inner].kind;
          if let TyKind::Array(elem, _) = &sym_ty.kind;
          then {
            (reg.is_some() && elem.is_character()) ||
            (wide.is_some() &&
              elem.compatible_ignoring_qualifiers(&CType::wchar_t(), &self.cx.tt))
          } else { false }
        };
        if scalar_unwrap || string_unwrap { leaf = inner }
      }
    }

    if matches!(self.ast[leaf].kind, NodeKind::InitializerList { .. }) {
      let cx = self.cx.eval(self.ast);
      let fixed = init::elaborate_list(&cx, &mut self.init, &mut self.errors,
        leaf, &sym_ty);
      if let Some(n) = fixed {
        if let TyKind::Array(elem, ArrayLen::Unspecified) = &sym_ty.kind {
          self.cx.st[sy].ty = elem.as_ref().clone().array_of(ArrayLen::Fixed(n));
        }
      }
    } else {
      self.init.targets.insert(leaf, sym_ty.clone());
      self.init.offsets.insert(leaf, 0);
      // a string literal fixes an unspecified array length to its own
      if_chain! {
        if matches!(self.ast[leaf].kind, NodeKind::StringLiteral { .. });
        if matches!(sym_ty.kind, TyKind::Array(_, ArrayLen::Unspecified));
        if let Some(strsy) = self.cx.st.get_by_syntax(leaf);
        if let Some(n) = self.cx.st[strsy].ty.array_length();
        if let TyKind::Array(elem, _) = &sym_ty.kind;
        then {
          self.cx.st[sy].ty = elem.as_ref().clone().array_of(ArrayLen::Fixed(n));
        }
      }
    }

    self.check_initializations(leaf);

    match self.cx.st[sy].storage {
      StorageDuration::Static => self.emit_static_image(sy, leaf),
      StorageDuration::Automatic => self.lower_automatic_initializer(sy, leaf),
      _ => {}
    }
  }

  /// Check each scalar leaf of an initializer against its target type with
  /// the assignability relation.
  fn check_initializations(&mut self, init: NodeId) {
    if let NodeKind::InitializerList { initializers, .. } = self.ast[init].kind.clone() {
      for sub in initializers { self.check_initializations(sub) }
      return
    }
    let Some(target) = self.init.targets.get(&init).cloned() else { return };
    let value_ty = self.ty(init);
    if target.is_scalar() && !value_ty.is_error() &&
        !self.can_assign(&target, &value_ty, init) {
      self.error(init, ErrorKind::TypeMismatch, "invalid initialization");
    }
  }

  fn emit_static_image(&mut self, sy: SymId, init: NodeId) {
    let Some(size) = self.cx.st[sy].ty.size(&self.cx.tt) else { return };
    let mut writes = vec![];
    {
      let cx = self.cx.eval(self.ast);
      init::emit_static(&cx, &self.init, &mut self.errors, init, 0, &mut writes);
    }
    let mut data = vec![0u8; usize::try_from(size).expect("object too large")];
    let relocs = init::apply_writes(&mut data, writes);
    let sym = &mut self.cx.st[sy];
    sym.data = Some(data);
    sym.relocs = relocs;
  }

  /// Automatic initializers are constraint-checked here but lowered by the
  /// AIR producer.
  fn lower_automatic_initializer(&mut self, _sy: SymId, _init: NodeId) {}

  // -------------------------------------------------------------- specifiers

  /// Specifier side effects that are independent of type building.
  /// Struct/union/enum specifiers are interned once, by
  /// [`base_type`](Self::base_type).
  fn specifier(&mut self, s: NodeId) {
    if matches!(self.ast[s].kind, NodeKind::StorageClassSpecifier(Scs::Register)) {
      self.decorate(s);
    }
  }

  /// The type denoted by a specifier list plus an optional (abstract)
  /// declarator, as used by type names.
  fn build_type(&mut self, at: NodeId, specifiers: &[NodeId],
      declarator: Option<NodeId>) -> CType {
    for &s in specifiers { self.specifier(s) }
    let base = self.base_type(at, specifiers);
    match declarator {
      Some(d) => self.declarator_type(d, base),
      None => base,
    }
  }

  /// Build the base type denoted by a specifier list.
  fn base_type(&mut self, at: NodeId, specifiers: &[NodeId]) -> CType {
    let mut quals = Quals::empty();
    let mut inline = false;
    let mut bts: SmallVec<[Bts; 4]> = SmallVec::new();
    let mut composite: Option<CType> = None;
    for &s in specifiers {
      match self.ast[s].kind.clone() {
        NodeKind::TypeQualifier(q) => quals |= q,
        NodeKind::FunctionSpecifier => inline = true,
        NodeKind::BasicTypeSpecifier(b) => bts.push(b),
        NodeKind::StructUnionSpecifier { kind, tag, declarations } =>
          composite = Some(self.struct_union_specifier(s, kind, tag,
            declarations.as_deref())),
        NodeKind::EnumSpecifier { tag, enumerators } =>
          composite = Some(self.enum_specifier(s, tag, enumerators.as_deref())),
        NodeKind::TypedefName(name) => {
          composite = match self.cx.st.lookup(&name, Namespace::Ordinary, self.scope) {
            Some(sym) => Some(self.cx.st[sym].ty.clone()),
            None => {
              self.error(s, ErrorKind::Undeclared,
                format!("symbol '{name}' is not defined in the given context"));
              Some(CType::error())
            }
          }
        }
        _ => {}
      }
    }
    let _ = inline; // `inline` attaches to the function type in the caller
    let mut ty = match composite {
      Some(ty) => ty,
      None => self.basic_combination(at, &bts),
    };
    ty.quals |= quals;
    ty
  }

  fn basic_combination(&mut self, at: NodeId, bts: &[Bts]) -> CType {
    use Bts::*;
    let count = |b: Bts| bts.iter().filter(|&&x| x == b).count();
    let (signed, unsigned) = (count(Signed), count(Unsigned));
    let longs = count(Long);
    let kind = if bts.is_empty() {
      TyKind::Int
    } else if count(Void) == 1 && bts.len() == 1 {
      TyKind::Void
    } else if count(Bool) == 1 && bts.len() == 1 {
      TyKind::Bool
    } else if count(Char) == 1 {
      if unsigned == 1 { TyKind::UChar }
      else if signed == 1 { TyKind::SChar }
      else { TyKind::Char }
    } else if count(Short) == 1 {
      if unsigned == 1 { TyKind::UShort } else { TyKind::Short }
    } else if count(Float) == 1 {
      TyKind::Float
    } else if count(Double) == 1 {
      if longs == 1 { TyKind::LongDouble } else { TyKind::Double }
    } else if longs >= 2 {
      if unsigned == 1 { TyKind::ULongLong } else { TyKind::LongLong }
    } else if longs == 1 {
      if unsigned == 1 { TyKind::ULong } else { TyKind::Long }
    } else if unsigned == 1 {
      TyKind::UInt
    } else if signed == 1 || count(Int) >= 1 {
      TyKind::Int
    } else {
      self.error(at, ErrorKind::Constraint, "invalid type specifier combination");
      TyKind::Error
    };
    if kind == TyKind::LongDouble {
      self.error(at, ErrorKind::Unsupported,
        "long double is not supported yet");
    }
    kind.into()
  }

  fn struct_union_specifier(&mut self, s: NodeId, kind: RecordKind,
      tag: Option<NodeId>, declarations: Option<&[NodeId]>) -> CType {
    let tag_name = tag.and_then(|t| match &self.ast[t].kind {
      NodeKind::DeclaratorIdentifier(n) | NodeKind::PrimaryIdentifier(n) =>
        Some(n.clone()),
      _ => None,
    });

    let mk = |k: RecordKind, r| if k == RecordKind::Struct { TyKind::Struct(r) }
      else { TyKind::Union(r) };

    // resolve or declare the tag
    let rec = if let Some(name) = &tag_name {
      let existing = self.cx.st.lookup(name, Namespace::Tag, self.scope)
        .and_then(|sym| match self.cx.st[sym].ty.kind {
          TyKind::Struct(r) | TyKind::Union(r) => Some(r),
          _ => None,
        });
      match existing {
        // a complete specifier at the same scope re-opens only an
        // incomplete record; otherwise it declares afresh
        Some(r) if declarations.is_none() ||
          self.cx.tt.records[r].members.is_none() => r,
        _ => {
          let r = self.cx.tt.declare_record(kind, Some(name.clone()));
          let sym = Symbol::new(name.clone(), CType::new(mk(kind, r)),
            Namespace::Tag, tag, self.scope);
          self.cx.st.add(sym);
          r
        }
      }
    } else {
      self.cx.tt.declare_record(kind, None)
    };

    if let Some(declarations) = declarations {
      self.complete_record(s, rec, declarations);
    }
    CType::new(mk(kind, rec))
  }

  /// Process the member declarations of a complete struct/union specifier
  /// and run the 6.7.2.1 constraint checks.
  #[allow(clippy::too_many_lines)]
  fn complete_record(&mut self, s: NodeId, rec: crate::types::ty::RecordId,
      declarations: &[NodeId]) {
    let mut members: Vec<Member> = vec![];
    let total: usize = declarations.iter().map(|&d| match &self.ast[d].kind {
      NodeKind::StructDeclaration { declarators, .. } => declarators.len(),
      _ => 0,
    }).sum();

    for (di, &sdecl) in declarations.iter().enumerate() {
      let NodeKind::StructDeclaration { specifiers, declarators } =
        self.ast[sdecl].kind.clone() else { continue };
      for &spec in &specifiers { self.specifier(spec) }
      let base = self.base_type(sdecl, &specifiers);
      for (si, &sdeclr) in declarators.iter().enumerate() {
        let NodeKind::StructDeclarator { declarator, bits } =
          self.ast[sdeclr].kind.clone() else { continue };
        let mty = match declarator {
          Some(d) => {
            self.declarator_checks(d);
            self.declarator_type(d, base.clone())
          }
          None => base.clone(),
        };

        if let Some(bits) = bits {
          self.node(bits);
          self.error(bits, ErrorKind::Unsupported,
            "struct and union bitfields are not supported yet");
          // widths are constraint-checked, but bitfield members get no
          // storage layout
          self.bitfield_width(sdeclr, &mty, bits, declarator);
          continue
        }

        if mty.is_error() { continue }

        if mty.has_flexible_array_member(&self.cx.tt) {
          self.error(sdeclr, ErrorKind::Constraint,
            "member with a struct or union type may not have a flexible array \
             member");
          continue
        }
        if matches!(mty.kind, TyKind::Function(_)) {
          self.error(sdeclr, ErrorKind::Constraint,
            "struct or union members may not have a function type");
          continue
        }

        // handle-equality check for a member of the enclosing record type
        let self_referential = matches!(mty.kind,
          TyKind::Struct(r) | TyKind::Union(r) if r == rec);
        let complete = mty.is_complete(&self.cx.tt) && !self_referential;
        let flexible = !complete && matches!(mty.kind, TyKind::Array(..)) &&
          di + 1 == declarations.len() && si + 1 == declarators.len();
        if !complete && !flexible {
          if matches!(mty.kind, TyKind::Array(..)) {
            self.error(sdeclr, ErrorKind::Constraint,
              "flexible array members are only allowed at the end of a struct or \
               union");
          } else {
            self.error(sdeclr, ErrorKind::Constraint,
              "incomplete types are not allowed within structs and unions");
          }
        }
        if flexible && self.ast.enclosing(s, |k| matches!(k,
            NodeKind::StructUnionSpecifier { .. })).is_some() {
          self.error(sdeclr, ErrorKind::Constraint,
            "flexible array members are not permitted at the end of nested structs \
             and unions");
        }
        if flexible && total == 1 {
          self.error(sdeclr, ErrorKind::Constraint,
            "flexible array members cannot be a part of an otherwise empty struct \
             or union");
        }

        let name = declarator
          .and_then(|d| self.ast.declarator_name(d))
          .unwrap_or_default()
          .to_owned();
        if let Some(d) = declarator {
          if let Some(ident) = self.ast.declarator_identifier(d) {
            let sym = Symbol::new(name.clone(), mty.clone(), Namespace::Member(rec),
              Some(ident), self.scope);
            self.cx.st.add(sym);
          }
        }
        members.push(Member { name, ty: mty, bit_width: None });
      }
    }
    self.cx.tt.records[rec].members = Some(members);
  }

  fn bitfield_width(&mut self, sdeclr: NodeId, mty: &CType, bits: NodeId,
      declarator: Option<NodeId>) -> Option<u32> {
    if !matches!(mty.kind, TyKind::Bool | TyKind::Int | TyKind::UInt) {
      self.error(sdeclr, ErrorKind::Constraint,
        "bitfield must have a type of bool, int, or unsigned int");
      return None
    }
    let cx = self.cx.eval(self.ast);
    let Ok(v) = cx.evaluate_integer(bits) else {
      self.error(bits, ErrorKind::ConstantRequired,
        "bitfield width must be an integer constant expression");
      return None
    };
    let width = v.convert_class(&TyKind::LongLong.into()).as_i64();
    if width < 0 {
      self.error(bits, ErrorKind::Constraint, "bitfield width must be nonnegative");
      return None
    }
    let max = mty.size(&self.cx.tt).unwrap_or(0) * 8;
    if width as u64 > max {
      self.error(bits, ErrorKind::Constraint,
        "bitfield width must not exceed the typical width of its declaring type");
      return None
    }
    if width == 0 && declarator.is_some() {
      self.error(bits, ErrorKind::Constraint,
        "zero-width bitfields may not declare an identifier");
      return None
    }
    u32::try_from(width).ok()
  }

  fn enum_specifier(&mut self, _s: NodeId, tag: Option<NodeId>,
      enumerators: Option<&[NodeId]>) -> CType {
    let tag_name = tag.and_then(|t| match &self.ast[t].kind {
      NodeKind::DeclaratorIdentifier(n) | NodeKind::PrimaryIdentifier(n) =>
        Some(n.clone()),
      _ => None,
    });
    let eid = if let Some(name) = &tag_name {
      let existing = self.cx.st.lookup(name, Namespace::Tag, self.scope)
        .and_then(|sym| match self.cx.st[sym].ty.kind {
          TyKind::Enum(e) => Some(e),
          _ => None,
        });
      match existing {
        Some(e) if enumerators.is_none() => e,
        _ => {
          let e = self.cx.tt.declare_enum(Some(name.clone()));
          let sym = Symbol::new(name.clone(), CType::new(TyKind::Enum(e)),
            Namespace::Tag, tag, self.scope);
          self.cx.st.add(sym);
          e
        }
      }
    } else {
      self.cx.tt.declare_enum(None)
    };

    if let Some(enumerators) = enumerators {
      let mut last_explicit: Option<(i64, usize)> = None;
      for (idx, &er) in enumerators.iter().enumerate() {
        let NodeKind::Enumerator { id: ident, value } = self.ast[er].kind.clone()
          else { continue };
        let NodeKind::DeclaratorIdentifier(name) = self.ast[ident].kind.clone()
          else { continue };

        let v = if let Some(value) = value {
          self.node(value);
          let cx = self.cx.eval(self.ast);
          match cx.evaluate_integer(value) {
            Err(_) => {
              self.error(value, ErrorKind::ConstantRequired,
                "enumeration constant value must be specified by an integer \
                 constant expression");
              continue
            }
            Ok(v) => {
              let n = v.convert_class(&TyKind::LongLong.into()).as_i64();
              if !(-0x8000_0000..=0x7FFF_FFFF).contains(&n) {
                self.error(value, ErrorKind::Constraint,
                  "enumeration constant value must be representable by type 'int'");
                continue
              }
              last_explicit = Some((n, idx));
              n
            }
          }
        } else {
          match last_explicit {
            None => idx as i64,
            Some((v, at)) => {
              let n = v + (idx - at) as i64;
              if !(-0x8000_0000..=0x7FFF_FFFF).contains(&n) {
                self.error(er, ErrorKind::Constraint,
                  "enumeration constant value must be representable by type 'int'");
                continue
              }
              n
            }
          }
        };

        let sym = Symbol::new(name.clone(), CType::new(TyKind::Enum(eid)),
          Namespace::Ordinary, Some(ident), self.scope);
        let sy = self.cx.st.add(sym);
        self.cx.enum_values.insert(sy, v);
        self.cx.tt.enums[eid].constants.push((name, v));
      }
    }
    CType::new(TyKind::Enum(eid))
  }

  // ---------------------------------------------------- function definitions

  #[allow(clippy::too_many_lines)]
  fn function_definition(&mut self, id: NodeId) {
    let NodeKind::FunctionDefinition { specifiers, declarator, knr_declarations, body } =
      self.ast[id].kind.clone() else { return };

    for &s in &specifiers { self.specifier(s) }
    let base = self.base_type(id, &specifiers);
    let inline = has_inline_specifier(self.ast, &specifiers);

    self.declarator_checks(declarator);
    let mut ty = self.declarator_type(declarator, base);
    if let TyKind::Function(f) = &mut ty.kind { f.inline = inline }

    // ISO 6.9 (2): no auto/register at file scope
    self.no_auto_register_at_file_scope(id, &specifiers);

    // ISO 6.9.1 (4): at most one storage class, and only extern/static
    let scs_list: Vec<Scs> = specifiers.iter().filter_map(|&s| match self.ast[s].kind {
      NodeKind::StorageClassSpecifier(scs) => Some(scs),
      _ => None,
    }).collect();
    if scs_list.len() > 1 {
      self.error(id, ErrorKind::Constraint,
        "function definition should not have more than one storage class specifier");
    }
    if scs_list.len() == 1 && !matches!(scs_list[0], Scs::Extern | Scs::Static) {
      self.error(id, ErrorKind::Constraint,
        "'static' and 'extern' are the only allowed storage class specifiers for \
         function definitions");
    }

    let Some(ident) = self.ast.declarator_identifier(declarator) else { return };
    let NodeKind::DeclaratorIdentifier(name) = self.ast[ident].kind.clone() else {
      return
    };

    // ISO 6.9.1 (2)
    if !matches!(ty.kind, TyKind::Function(_)) {
      self.error(id, ErrorKind::Constraint,
        "declarator of function must be of function type");
    }
    // ISO 6.9.1 (3)
    if let TyKind::Function(f) = &ty.kind {
      let ret = &f.ret;
      let ok = matches!(ret.kind, TyKind::Void) ||
        (ret.is_object(&self.cx.tt) && !matches!(ret.kind, TyKind::Array(..)));
      if !ok {
        self.error(id, ErrorKind::Constraint,
          "function may only have a void or object (other than array) return type");
      }
    }

    let scs = scs_list.first().copied();
    let prior = self.cx.st.lookup(&name, Namespace::Ordinary, ScopeId::FILE)
      .map(|s| self.cx.st[s].linkage);
    let linkage = self.cx.st.derive_linkage(true, scs, true, prior);
    let mut sym = Symbol::new(name.clone(), ty.clone(), Namespace::Ordinary,
      Some(ident), ScopeId::FILE);
    sym.linkage = linkage;
    sym.state = DefState::Defined;
    let fsy = self.cx.st.add(sym);

    if name == "main" {
      self.check_main_definition(id, &ty);
      if ty.is_inline_function() {
        self.error(ident, ErrorKind::Constraint,
          "'main' should not have the 'inline' function specifier");
      }
    }

    // ISO 6.9.1 (5)/(6): parameter and declaration-list shape
    if let NodeKind::FunctionDeclarator { params, knr_identifiers, .. } =
        self.ast[declarator].kind.clone() {
      if params.is_some() && !knr_declarations.is_empty() {
        self.error(id, ErrorKind::Constraint,
          "declaration list in function definition not allowed if there is a \
           parameter list");
      }
      if let Some(params) = &params {
        let void_only = params.len() == 1 && if_chain! {
          if let NodeKind::ParameterDeclaration { specifiers, declarator: None } =
            &self.ast[params[0]].kind;
          if specifiers.len() == 1;
          if matches!(self.ast[specifiers[0]].kind,
            NodeKind::BasicTypeSpecifier(Bts::Void));
          then { true } else { false }
        };
        if !void_only {
          for &p in params {
            let NodeKind::ParameterDeclaration { declarator: pd, .. } =
              &self.ast[p].kind else { continue };
            if pd.and_then(|d| self.ast.declarator_identifier(d)).is_none() {
              self.error(id, ErrorKind::Constraint,
                "all parameters in a function definition must have identifiers");
              break
            }
          }
        }
      }
      if !knr_identifiers.is_empty() {
        self.knr_declaration_list(id, &knr_identifiers, &knr_declarations);
      }
    }

    // parameters live in the function's scope, shared with the body
    let saved_gotos = std::mem::take(&mut self.pending_gotos);
    self.in_scope(ScopeKind::Function(id), |az| {
      if let NodeKind::FunctionDeclarator { params: Some(params), .. } =
          az.ast[declarator].kind.clone() {
        let fn_params: Vec<CType> = match &az.cx.st[fsy].ty.kind {
          TyKind::Function(f) => f.params.clone().unwrap_or_default(),
          _ => vec![],
        };
        for (i, &p) in params.iter().enumerate() {
          let NodeKind::ParameterDeclaration { declarator: pd, .. } =
            az.ast[p].kind.clone() else { continue };
          let Some(pident) = pd.and_then(|d| az.ast.declarator_identifier(d)) else {
            continue
          };
          let NodeKind::DeclaratorIdentifier(pname) = az.ast[pident].kind.clone()
            else { continue };
          let pty = fn_params.get(i).cloned().unwrap_or_else(CType::error);
          let mut sym = Symbol::new(pname, pty, Namespace::Ordinary,
            Some(pident), az.scope);
          sym.storage = StorageDuration::Automatic;
          az.cx.st.add(sym);
        }
      }
      if let NodeKind::CompoundStatement(items) = az.ast[body].kind.clone() {
        for item in items { az.node(item) }
      } else {
        az.node(body);
      }
      az.resolve_gotos(id);
    });
    self.pending_gotos = saved_gotos;
  }

  fn resolve_gotos(&mut self, _fdef: NodeId) {
    for (label, scope) in std::mem::take(&mut self.pending_gotos) {
      let (NodeKind::PrimaryIdentifier(name) | NodeKind::DeclaratorIdentifier(name)) =
        self.ast[label].kind.clone() else { continue };
      if self.cx.st.lookup(&name, Namespace::Label, scope).is_none() {
        self.error(label, ErrorKind::Undeclared,
          format!("label '{name}' is not defined in this function"));
      }
    }
  }

  fn knr_declaration_list(&mut self, id: NodeId, knr_identifiers: &[NodeId],
      knr_declarations: &[NodeId]) {
    let names: Vec<String> = knr_identifiers.iter().filter_map(|&n|
      match &self.ast[n].kind {
        NodeKind::DeclaratorIdentifier(s) | NodeKind::PrimaryIdentifier(s) =>
          Some(s.clone()),
        _ => None,
      }).collect();
    let mut found = 0usize;
    for &decl in knr_declarations {
      let NodeKind::Declaration { specifiers, init_declarators } =
        self.ast[decl].kind.clone() else { continue };
      for &s in &specifiers {
        if matches!(self.ast[s].kind,
            NodeKind::StorageClassSpecifier(scs) if scs != Scs::Register) {
          self.error(s, ErrorKind::Constraint,
            "declarations in the function declaration list may only have the \
             storage class specifier 'register'");
        }
      }
      if init_declarators.is_empty() {
        self.error(decl, ErrorKind::Constraint,
          "declarations in the function declaration list must include at least one \
           declarator");
        continue
      }
      for &ideclr in &init_declarators {
        let NodeKind::InitDeclarator { declarator, initializer } =
          self.ast[ideclr].kind.clone() else { continue };
        if let Some(init) = initializer {
          self.error(init, ErrorKind::Constraint,
            "declarations in the function declaration list cannot have initializers");
        }
        match self.ast.declarator_name(declarator) {
          Some(n) if names.iter().any(|x| x == n) => found += 1,
          Some(n) => self.error(id, ErrorKind::Constraint, format!(
            "declaration of '{n}' does not have a corresponding identifier in the \
             identifier list")),
          None => {}
        }
      }
    }
    if found != names.len() {
      self.error(id, ErrorKind::Constraint,
        "each identifier must have exactly one declaration in the declaration list");
    }
  }

  /// `main` must be `int main(void)`, `int main(int, char**)` (or
  /// `char *argv[]`), or prototype-less.
  fn check_main_definition(&mut self, id: NodeId, ty: &CType) {
    let TyKind::Function(f) = &ty.kind else { return };
    if !matches!(f.ret.kind, TyKind::Int) {
      self.error(id, ErrorKind::Constraint, "'main' should have an int return type");
    }
    let good = match &f.params {
      None => true,
      Some(ps) if ps.is_empty() => true,
      Some(ps) if ps.len() == 2 => {
        matches!(ps[0].kind, TyKind::Int) && if_chain! {
          if let TyKind::Pointer(p1) | TyKind::Array(p1, _) = &ps[1].kind;
          if let TyKind::Pointer(p2) = &p1.kind;
          then { matches!(p2.kind, TyKind::Char) } else { false }
        }
      }
      _ => false,
    };
    if !good {
      self.error(id, ErrorKind::Constraint,
        "the function prototype for 'main', if any, should be either 'int main(void)' \
         or 'int main(int argc, char *argv[])'");
    }
  }

  // --------------------------------------------------------------- statements

  fn declare_label(&mut self, ident: NodeId) {
    let NodeKind::DeclaratorIdentifier(name) = self.ast[ident].kind.clone() else {
      return
    };
    let Some(fdef) = self.ast.enclosing(ident,
      |k| matches!(k, NodeKind::FunctionDefinition { .. })) else { return };
    // labels bind in the function scope
    let mut scope = self.scope;
    loop {
      match self.cx.st.scopes[scope].kind {
        ScopeKind::Function(_) => break,
        _ => match self.cx.st.scopes[scope].parent {
          Some(p) => scope = p,
          None => break,
        },
      }
    }
    let mut sym = Symbol::new(name.clone(), CType::new(TyKind::Label),
      Namespace::Label, Some(ident), scope);
    sym.storage = StorageDuration::None;
    self.cx.st.add(sym);
    let siblings = self.cx.st.in_scope(&name, Namespace::Label, scope);
    if siblings.len() > 1 {
      let fname = if_chain! {
        if let NodeKind::FunctionDefinition { declarator, .. } = &self.ast[fdef].kind;
        if let Some(n) = self.ast.declarator_name(*declarator);
        then { n.to_owned() } else { String::new() }
      };
      self.error(ident, ErrorKind::Redeclaration,
        format!("duplicate label name '{name}' in function '{fname}'"));
    }
  }

  fn labeled_statement(&mut self, id: NodeId, label: &Label) {
    // ISO 6.8.1 (2): case/default only inside a switch
    if matches!(label, Label::Case(_) | Label::Default) &&
        self.ast.enclosing(id, |k| matches!(k, NodeKind::Switch { .. })).is_none() {
      self.error(id, ErrorKind::Constraint,
        "case and default labels may only exist within a switch statement");
    }
  }

  fn iteration_statement(&mut self, _id: NodeId, cond: Option<NodeId>,
      init: Option<NodeId>) {
    if let Some(init) = init {
      if let NodeKind::Declaration { specifiers, .. } = &self.ast[init].kind {
        let bad = specifiers.iter().any(|&s| matches!(self.ast[s].kind,
          NodeKind::StorageClassSpecifier(scs)
            if scs != Scs::Auto && scs != Scs::Register));
        if bad {
          self.error(init, ErrorKind::Constraint,
            "for loop initializing declaration may only have storage class \
             specifiers of 'auto' or 'register'");
        }
      }
    }
    if let Some(cond) = cond {
      let t = self.ty(cond);
      if !t.is_scalar() && !t.is_error() {
        self.error(cond, ErrorKind::TypeMismatch,
          "controlling expression of a loop must be of scalar type");
      }
    }
  }

  /// The switch-body sub-traversal: collect this switch's case labels
  /// (skipping nested switches), fold and convert their values, and report
  /// duplicates and multiple defaults.
  fn switch_statement(&mut self, id: NodeId, cond: NodeId, body: NodeId) {
    self.warning(id, "switch statements are not checked for identifiers with \
      variably-modified types, use with your own risk");
    let cond_ty = self.ty(cond);
    if cond_ty.is_error() { return }
    if !cond_ty.is_integer() {
      self.error(cond, ErrorKind::TypeMismatch,
        "controlling expression of a switch statement must be of integer type");
      return
    }
    let promoted = cond_ty.integer_promotions();

    let mut labels = vec![];
    collect_switch_labels(self.ast, body, id, &mut labels);

    let mut seen: Vec<(u64, Span)> = vec![];
    let mut default_seen = false;
    for lstmt in labels {
      let NodeKind::LabeledStatement { label, .. } = self.ast[lstmt].kind.clone()
        else { continue };
      match label {
        Label::Case(expr) => {
          let cx = self.cx.eval(self.ast);
          let value = match cx.evaluate_integer(expr) {
            Err(_) => {
              self.error(lstmt, ErrorKind::ConstantRequired,
                "case statement must have a constant expression");
              continue
            }
            Ok(v) => v.convert_class(&promoted).as_u64(),
          };
          self.case_values.insert(lstmt, value);
          if let Some((_, prior)) = seen.iter().find(|(v, _)| *v == value) {
            let row = prior.row;
            self.error(lstmt, ErrorKind::Constraint, format!(
              "duplicate case value {value} in switch statement (case on line {row} \
               has an expression with the same value)"));
          } else {
            seen.push((value, self.ast[lstmt].span));
          }
        }
        Label::Default => {
          if default_seen {
            self.error(lstmt, ErrorKind::Constraint,
              "multiple default cases are not allowed within a switch statement");
          }
          default_seen = true;
        }
        Label::Named(_) => {}
      }
    }
  }

  fn return_statement(&mut self, id: NodeId, expr: Option<NodeId>) {
    let Some(fsy) = self.enclosing_function_symbol(id) else { return };
    let TyKind::Function(f) = &self.cx.st[fsy].ty.kind else { return };
    let void_ret = matches!(f.ret.kind, TyKind::Void);
    if void_ret && expr.is_some() {
      self.error(id, ErrorKind::TypeMismatch,
        "return values are not allowed for return statements if their function has \
         a void return type");
    }
    if !void_ret && expr.is_none() {
      self.error(id, ErrorKind::TypeMismatch,
        "return values are required for return statements if their function has a \
         non-void return type");
    }
  }

  // ------------------------------------------ literals and synthesized symbols

  fn string_literal(&mut self, id: NodeId) {
    let NodeKind::StringLiteral { reg, wide } = self.ast[id].kind.clone() else { return };
    let (ty, data) = match (&reg, &wide) {
      (Some(bytes), _) => (
        CType::new(TyKind::Char).array_of(ArrayLen::Fixed(bytes.len() as u64)),
        bytes.clone(),
      ),
      (None, Some(units)) => (
        CType::wchar_t().array_of(ArrayLen::Fixed(units.len() as u64)),
        units.iter().flat_map(|c| c.to_le_bytes()).collect(),
      ),
      (None, None) => (CType::error(), vec![]),
    };
    let name = format!("__sl{}", self.next_string_literal);
    self.next_string_literal += 1;
    let mut sym = Symbol::new(name, ty.clone(), Namespace::Ordinary, Some(id),
      self.scope);
    sym.storage = StorageDuration::Static;
    sym.state = DefState::Defined;
    sym.data = Some(data);
    self.cx.st.add(sym);
    let expr_ty = self.expression_type(&ty, id);
    self.set_ty(id, expr_ty);
    self.strip_rvalue_quals(id);
  }

  fn floating_constant(&mut self, id: NodeId) {
    let NodeKind::FloatConstant(value, ty) = self.ast[id].kind.clone() else { return };
    if ty.kind == TyKind::LongDouble {
      self.error(id, ErrorKind::Unsupported,
        "long double literals and complex numbers are not supported yet");
      self.set_ty(id, CType::error());
      return
    }
    let name = format!("__fc{}", self.next_floating_constant);
    self.next_floating_constant += 1;
    let mut sym = Symbol::new(name, ty.clone(), Namespace::Ordinary, Some(id),
      self.scope);
    sym.storage = StorageDuration::Static;
    sym.state = DefState::Defined;
    sym.data = Some(if ty.kind == TyKind::Float {
      #[allow(clippy::cast_possible_truncation)]
      let v = value as f32;
      v.to_le_bytes().to_vec()
    } else {
      value.to_le_bytes().to_vec()
    });
    self.cx.st.add(sym);
    self.set_ty(id, ty);
  }

  fn compound_literal_before(&mut self, id: NodeId, type_name: NodeId) {
    let ty = self.cx.type_names.get(&type_name).cloned().unwrap_or_else(CType::error);
    let name = format!("__cl{}", self.next_compound_literal);
    self.next_compound_literal += 1;
    let mut sym = Symbol::new(name, ty.clone(), Namespace::Ordinary, Some(id),
      self.scope);
    sym.storage = if self.cx.st.scope_is_block(self.scope) {
      StorageDuration::Automatic
    } else {
      StorageDuration::Static
    };
    sym.state = DefState::Defined;
    self.cx.st.add(sym);
    if ty.is_error() {
      self.set_ty(id, ty);
      return
    }
    let expr_ty = self.expression_type(&ty, id);
    self.set_ty(id, expr_ty);
    self.strip_rvalue_quals(id);
  }

  fn compound_literal_after(&mut self, id: NodeId, init: NodeId) {
    let Some(sy) = self.cx.st.get_by_syntax(id) else { return };
    let ty = self.cx.st[sy].ty.clone();
    if ty.is_error() { return }
    let mut pass = true;
    if !ty.is_object(&self.cx.tt) &&
        !(matches!(ty.kind, TyKind::Array(..)) && !ty.is_vla()) {
      self.error(id, ErrorKind::Constraint,
        "compound literals may not have a variable-length array type");
      pass = false;
    }

    if matches!(self.ast[init].kind, NodeKind::InitializerList { .. }) {
      let cx = self.cx.eval(self.ast);
      let fixed = init::elaborate_list(&cx, &mut self.init, &mut self.errors,
        init, &ty);
      if let Some(n) = fixed {
        if let TyKind::Array(elem, ArrayLen::Unspecified) = &ty.kind {
          self.cx.st[sy].ty = elem.as_ref().clone().array_of(ArrayLen::Fixed(n));
        }
      }
    }
    self.check_initializations(init);

    if self.cx.st[sy].storage == StorageDuration::Static {
      self.emit_static_image(sy, init);
    } else {
      self.lower_automatic_initializer(sy, init);
    }

    if !pass {
      self.set_ty(id, CType::error());
    }
  }

  // --------------------------------------------------------------- intrinsics

  fn intrinsic_call(&mut self, id: NodeId, name: &str, args: &[NodeId]) {
    match name {
      "__ecc_va_arg" => self.va_arg_call(id, args),
      "__ecc_va_start" => self.va_list_call(id, args, 2, "va_start"),
      "__ecc_va_end" => self.va_list_call(id, args, 1, "va_end"),
      "__ecc_lsys_open" => {
        let mut fname = CType::new(TyKind::Char);
        fname.quals = Quals::CONST;
        let tmpl = [fname.pointer_to(), TyKind::Int.into(), TyKind::UInt.into()];
        if self.check_intrinsic_args(id, args, &tmpl) {
          self.set_ty(id, TyKind::Int.into());
        }
      }
      "__ecc_lsys_close" => {
        if self.check_intrinsic_args(id, args, &[TyKind::Int.into()]) {
          self.set_ty(id, TyKind::Int.into());
        }
      }
      "__ecc_lsys_read" => {
        let buf = CType::new(TyKind::Char).pointer_to();
        let tmpl = [TyKind::Int.into(), buf, CType::size_t()];
        if self.check_intrinsic_args(id, args, &tmpl) {
          self.set_ty(id, TyKind::Long.into());
        }
      }
      _ => {
        self.error(id, ErrorKind::Unsupported,
          format!("unsupported intrinsic function '{name}' invoked"));
        self.set_ty(id, CType::error());
      }
    }
  }

  fn va_list_type(&mut self, id: NodeId, what: &str) -> Option<CType> {
    let found = self.cx.st.get_by_classes("__ecc_va_list", Namespace::Tag,
      |t| matches!(t.kind, TyKind::Struct(_)));
    match found {
      Some(sym) => Some(self.cx.st[sym].ty.clone()),
      None => {
        self.error(id, ErrorKind::Undeclared,
          format!("cannot find va_list declaration for {what} invocation"));
        self.set_ty(id, CType::error());
        None
      }
    }
  }

  fn va_arg_call(&mut self, id: NodeId, args: &[NodeId]) {
    if args.len() != 2 {
      self.error(id, ErrorKind::TypeMismatch,
        "va_arg invocation requires two arguments: a va_list and a type for the \
         argument returned");
      self.set_ty(id, CType::error());
      return
    }
    let Some(va_list) = self.va_list_type(id, "va_arg") else { return };
    let ap_ty = self.ty(args[0]);
    if !ap_ty.compatible_ignoring_qualifiers(&va_list, &self.cx.tt) {
      self.error(id, ErrorKind::TypeMismatch,
        "first parameter of va_arg invocation must be a va_list");
      self.set_ty(id, CType::error());
      return
    }
    let Some(ty) = self.cx.type_names.get(&args[1]).cloned() else {
      self.error(id, ErrorKind::TypeMismatch,
        "second parameter of va_arg invocation must be a type name");
      self.set_ty(id, CType::error());
      return
    };
    if ty.is_error() {
      self.set_ty(id, ty);
      return
    }
    if matches!(ty.kind,
        TyKind::Struct(_) | TyKind::Union(_) | TyKind::LongDouble) {
      self.error(id, ErrorKind::Unsupported,
        "this type is not yet supported by va_arg");
      self.set_ty(id, CType::error());
      return
    }
    self.set_ty(id, ty);
  }

  fn va_list_call(&mut self, id: NodeId, args: &[NodeId], arity: usize, what: &str) {
    if args.len() != arity {
      let msg = if arity == 2 {
        "va_start invocation requires two arguments: a va_list and the last \
         non-variadic parameter of this function"
      } else {
        "va_end invocation requires one argument: a va_list"
      };
      self.error(id, ErrorKind::TypeMismatch, msg);
      self.set_ty(id, CType::error());
      return
    }
    let Some(va_list) = self.va_list_type(id, what) else { return };
    let ap_ty = self.ty(args[0]);
    if !ap_ty.compatible_ignoring_qualifiers(&va_list, &self.cx.tt) {
      self.error(id, ErrorKind::TypeMismatch,
        format!("first parameter of {what} invocation must be a va_list"));
      self.set_ty(id, CType::error());
      return
    }
    self.set_ty(id, TyKind::Void.into());
  }

  fn check_intrinsic_args(&mut self, id: NodeId, args: &[NodeId],
      template: &[CType]) -> bool {
    for (i, param) in template.iter().enumerate() {
      let Some(&arg) = args.get(i) else {
        self.error(id, ErrorKind::TypeMismatch, format!(
          "invocation requires only {} argument{}", args.len(),
          if args.len() == 1 { "" } else { "s" }));
        self.set_ty(id, CType::error());
        return false
      };
      let arg_ty = self.ty(arg);
      if !self.can_assign(param, &arg_ty, arg) {
        self.error(arg, ErrorKind::TypeMismatch, format!(
          "argument {} of invocation has an incompatible type with parameter {}",
          i + 1, i + 1));
        self.set_ty(id, CType::error());
        return false
      }
    }
    true
  }
}

/// Collect the labeled statements belonging to `switch_node`, skipping the
/// bodies of nested switches so an inner switch's cases never join the
/// outer's duplicate set.
fn collect_switch_labels(ast: &Ast, node: NodeId, switch_node: NodeId,
    out: &mut Vec<NodeId>) {
  if node != switch_node && matches!(ast[node].kind, NodeKind::Switch { .. }) {
    return
  }
  if matches!(ast[node].kind, NodeKind::LabeledStatement { .. }) {
    out.push(node);
  }
  for c in ast.children(node) {
    collect_switch_labels(ast, c, switch_node, out);
  }
}
