//! End-to-end scenarios: hand-built syntax trees through analysis, and AIR
//! through the backend to assembly text.

use std::io::Read;

use rcc::analyze_unit;
use rcc::arch::PReg;
use rcc::symtab::{Namespace, ScopeId};
use rcc::types::air::{Air, AirData, AirInsn, AirOp, AirOperand, AirRoutine};
use rcc::types::ast::{Ast, BinOp, Label, NodeId, NodeKind, Scs, UnOp};
use rcc::types::ty::TyKind;
use rcc::types::Span;
use rcc::{CType, ErrorKind};

struct B {
  ast: Ast,
  row: u32,
}

impl B {
  fn new() -> Self {
    B { ast: Ast::new(), row: 0 }
  }

  fn n(&mut self, kind: NodeKind) -> NodeId {
    self.row += 1;
    self.ast.add(kind, Span::new(self.row, 1))
  }

  fn int(&mut self, v: i64) -> NodeId {
    self.n(NodeKind::IntConstant(v as u64, TyKind::Int.into()))
  }

  fn ident(&mut self, name: &str) -> NodeId {
    self.n(NodeKind::DeclaratorIdentifier(name.into()))
  }

  fn int_spec(&mut self) -> NodeId {
    self.n(NodeKind::BasicTypeSpecifier(rcc::types::ast::Bts::Int))
  }

  fn decl(&mut self, specifiers: Vec<NodeId>, declarator: NodeId,
      initializer: Option<NodeId>) -> NodeId {
    let ideclr = self.n(NodeKind::InitDeclarator { declarator, initializer });
    self.n(NodeKind::Declaration { specifiers, init_declarators: vec![ideclr] })
  }

  fn unit(&mut self, items: Vec<NodeId>) -> NodeId {
    let root = self.n(NodeKind::TranslationUnit(items));
    self.ast.link_parents(root);
    root
  }
}

#[test]
fn static_scalar_initializer_folds_to_image() {
  // int x = 2 + 3 * 4;
  let mut b = B::new();
  let spec = b.int_spec();
  let x = b.ident("x");
  let (two, three, four) = (b.int(2), b.int(3), b.int(4));
  let mul = b.n(NodeKind::Binary(BinOp::Mul, three, four));
  let add = b.n(NodeKind::Binary(BinOp::Add, two, mul));
  let decl = b.decl(vec![spec], x, Some(add));
  let root = b.unit(vec![decl]);

  let analysis = analyze_unit(&b.ast, root);
  assert!(!analysis.has_errors(), "{:?}", analysis.errors);
  let sym = analysis.st.lookup("x", Namespace::Ordinary, ScopeId::FILE).unwrap();
  assert_eq!(analysis.st[sym].data.as_deref(),
    Some(&hex::decode("0e000000").unwrap()[..]));
}

#[test]
fn string_literal_completes_array_length() {
  // char s[] = "ab";
  let mut b = B::new();
  let spec = b.n(NodeKind::BasicTypeSpecifier(rcc::types::ast::Bts::Char));
  let s = b.ident("s");
  let arr = b.n(NodeKind::ArrayDeclarator { inner: s, length: None });
  let lit = b.n(NodeKind::StringLiteral {
    reg: Some(b"ab\0".to_vec()),
    wide: None,
  });
  let decl = b.decl(vec![spec], arr, Some(lit));
  let root = b.unit(vec![decl]);

  let analysis = analyze_unit(&b.ast, root);
  assert!(!analysis.has_errors(), "{:?}", analysis.errors);
  let sym = analysis.st.lookup("s", Namespace::Ordinary, ScopeId::FILE).unwrap();
  assert_eq!(analysis.st[sym].ty.array_length(), Some(3));
  assert_eq!(analysis.st[sym].data.as_deref(), Some(&[0x61, 0x62, 0x00][..]));
}

#[test]
fn designated_member_initializer_lays_out_image() {
  // struct {int a; int b;} p = {.b=7};
  let mut b = B::new();
  let a_spec = b.int_spec();
  let a_id = b.ident("a");
  let a_declr = b.n(NodeKind::StructDeclarator { declarator: Some(a_id), bits: None });
  let a_decl = b.n(NodeKind::StructDeclaration {
    specifiers: vec![a_spec], declarators: vec![a_declr],
  });
  let b_spec = b.int_spec();
  let b_id = b.ident("b");
  let b_declr = b.n(NodeKind::StructDeclarator { declarator: Some(b_id), bits: None });
  let b_decl = b.n(NodeKind::StructDeclaration {
    specifiers: vec![b_spec], declarators: vec![b_declr],
  });
  let sus = b.n(NodeKind::StructUnionSpecifier {
    kind: rcc::types::ty::RecordKind::Struct,
    tag: None,
    declarations: Some(vec![a_decl, b_decl]),
  });
  let p = b.ident("p");
  let seven = b.int(7);
  let desigr = b.n(NodeKind::MemberDesignator("b".into()));
  let desig = b.n(NodeKind::Designation(vec![desigr]));
  let list = b.n(NodeKind::InitializerList {
    designations: vec![Some(desig)],
    initializers: vec![seven],
  });
  let decl = b.decl(vec![sus], p, Some(list));
  let root = b.unit(vec![decl]);

  let analysis = analyze_unit(&b.ast, root);
  assert!(!analysis.has_errors(), "{:?}", analysis.errors);
  let sym = analysis.st.lookup("p", Namespace::Ordinary, ScopeId::FILE).unwrap();
  assert_eq!(analysis.st[sym].data.as_deref(),
    Some(&hex::decode("0000000007000000").unwrap()[..]));
}

#[test]
fn address_constant_with_offset_relocates() {
  // int x; int *p = &x + 2;
  let mut b = B::new();
  let x_spec = b.int_spec();
  let x = b.ident("x");
  let x_decl = b.decl(vec![x_spec], x, None);

  let p_spec = b.int_spec();
  let p = b.ident("p");
  let p_declr = b.n(NodeKind::PointerDeclarator {
    quals: rcc::types::ty::Quals::empty(), inner: p,
  });
  let x_ref = b.n(NodeKind::PrimaryIdentifier("x".into()));
  let addr = b.n(NodeKind::Unary(UnOp::Reference, x_ref));
  let two = b.int(2);
  let sum = b.n(NodeKind::Binary(BinOp::Add, addr, two));
  let p_decl = b.decl(vec![p_spec], p_declr, Some(sum));
  let root = b.unit(vec![x_decl, p_decl]);

  let analysis = analyze_unit(&b.ast, root);
  assert!(!analysis.has_errors(), "{:?}", analysis.errors);
  let xsym = analysis.st.lookup("x", Namespace::Ordinary, ScopeId::FILE).unwrap();
  let psym = analysis.st.lookup("p", Namespace::Ordinary, ScopeId::FILE).unwrap();
  let psy = &analysis.st[psym];
  assert_eq!(psy.relocs.len(), 1);
  assert_eq!(psy.relocs[0].offset, 0);
  assert_eq!(psy.relocs[0].target, xsym);
  assert_eq!(psy.relocs[0].addend, 8);
  assert_eq!(psy.data.as_deref(),
    Some(&hex::decode("0800000000000000").unwrap()[..]));
}

#[test]
fn duplicate_case_values_are_a_constraint_violation() {
  // int i; int main(void) { switch(i){case 1: ; case 1: ;} }
  let mut b = B::new();
  let i_spec = b.int_spec();
  let i = b.ident("i");
  let i_decl = b.decl(vec![i_spec], i, None);

  let main_spec = b.int_spec();
  let main_id = b.ident("main");
  let void_spec = b.n(NodeKind::BasicTypeSpecifier(rcc::types::ast::Bts::Void));
  let void_param = b.n(NodeKind::ParameterDeclaration {
    specifiers: vec![void_spec], declarator: None,
  });
  let fdeclr = b.n(NodeKind::FunctionDeclarator {
    inner: main_id,
    params: Some(vec![void_param]),
    variadic: false,
    knr_identifiers: vec![],
  });

  let cond = b.n(NodeKind::PrimaryIdentifier("i".into()));
  let empty1 = b.n(NodeKind::ExpressionStatement(None));
  let case1_expr = b.int(1);
  let case1 = b.n(NodeKind::LabeledStatement {
    label: Label::Case(case1_expr), body: empty1,
  });
  let empty2 = b.n(NodeKind::ExpressionStatement(None));
  let case2_expr = b.int(1);
  let case2 = b.n(NodeKind::LabeledStatement {
    label: Label::Case(case2_expr), body: empty2,
  });
  let swbody = b.n(NodeKind::CompoundStatement(vec![case1, case2]));
  let sw = b.n(NodeKind::Switch { cond, body: swbody });
  let body = b.n(NodeKind::CompoundStatement(vec![sw]));
  let fdef = b.n(NodeKind::FunctionDefinition {
    specifiers: vec![main_spec],
    declarator: fdeclr,
    knr_declarations: vec![],
    body,
  });
  let root = b.unit(vec![i_decl, fdef]);

  let analysis = analyze_unit(&b.ast, root);
  let dup: Vec<_> = analysis.errors.iter()
    .filter(|e| !e.warning && e.kind == ErrorKind::Constraint &&
      e.message.contains("duplicate case value 1"))
    .collect();
  assert_eq!(dup.len(), 1, "{:?}", analysis.errors);
}

#[test]
fn register_at_file_scope_is_rejected() {
  // register int r;
  let mut b = B::new();
  let reg = b.n(NodeKind::StorageClassSpecifier(Scs::Register));
  let spec = b.int_spec();
  let r = b.ident("r");
  let decl = b.decl(vec![reg, spec], r, None);
  let root = b.unit(vec![decl]);

  let analysis = analyze_unit(&b.ast, root);
  assert!(analysis.errors.iter().any(|e| !e.warning &&
    e.message.contains("'register' not allowed in external declaration")),
    "{:?}", analysis.errors);
}

#[test]
fn undeclared_identifier_poisons_without_cascading() {
  // int y = nope + 1; — one diagnostic, not two
  let mut b = B::new();
  let spec = b.int_spec();
  let y = b.ident("y");
  let nope = b.n(NodeKind::PrimaryIdentifier("nope".into()));
  let one = b.int(1);
  let sum = b.n(NodeKind::Binary(BinOp::Add, nope, one));
  let decl = b.decl(vec![spec], y, Some(sum));
  let root = b.unit(vec![decl]);

  let analysis = analyze_unit(&b.ast, root);
  let hard: Vec<_> = analysis.errors.iter()
    .filter(|e| !e.warning && e.kind == ErrorKind::Undeclared).collect();
  assert_eq!(hard.len(), 1, "{:?}", analysis.errors);
  assert!(analysis.errors.iter()
    .filter(|e| !e.warning)
    .all(|e| e.kind == ErrorKind::Undeclared || e.kind == ErrorKind::ConstantRequired),
    "no cascade expected: {:?}", analysis.errors);
}

#[test]
fn whole_file_emission() {
  // a data object with a relocation plus a routine that rounds its stack
  // and shares one epilogue label
  let mut b = B::new();
  let x_spec = b.int_spec();
  let x = b.ident("x");
  let five = b.int(5);
  let x_decl = b.decl(vec![x_spec], x, Some(five));
  let root = b.unit(vec![x_decl]);
  let analysis = analyze_unit(&b.ast, root);
  assert!(!analysis.has_errors(), "{:?}", analysis.errors);
  let mut st = analysis.st;
  let tt = analysis.tt;
  let xsym = st.lookup("x", Namespace::Ordinary, ScopeId::FILE).unwrap();

  // int f(void) { return x; } in pre-lowered form
  let fnty = TyKind::Function(Box::new(rcc::types::ty::FnType {
    ret: TyKind::Int.into(), params: Some(vec![]), variadic: false, inline: false,
  }));
  let mut fsy = rcc::symtab::Symbol::new("f", fnty.into(), Namespace::Ordinary,
    None, ScopeId::FILE);
  fsy.linkage = rcc::symtab::Linkage::External;
  let f = st.add(fsy);

  let int: CType = TyKind::Int.into();
  let air = Air {
    routines: vec![AirRoutine {
      sym: f,
      insns: vec![
        AirInsn::with_ops(AirOp::Load, int.clone(), [
          AirOperand::reg(PReg::Rax, int.clone()),
          AirOperand::sym(xsym, int.clone()),
        ]),
        AirInsn::new(AirOp::Return, int.clone()),
      ],
      uses_varargs: false,
    }],
    data: vec![AirData {
      sym: xsym,
      bytes: st[xsym].data.clone().unwrap(),
      relocs: vec![],
      readonly: false,
    }],
    rodata: vec![],
  };

  let mut tmp = tempfile::NamedTempFile::new().unwrap();
  rcc::emit_assembly(&air, &b.ast, &tt, &mut st, &mut tmp).unwrap();
  let mut text = String::new();
  tmp.reopen().unwrap().read_to_string(&mut text).unwrap();

  let expected = "    .data\n\
                  \x20   .align 4\n\
                  x:\n\
                  \x20   .long 0x5\n\
                  \x20   .text\n\
                  \x20   .globl f\n\
                  f:\n\
                  \x20   pushq %rbp\n\
                  \x20   movq %rsp, %rbp\n\
                  \x20   movl x(%rip), %eax\n\
                  \x20   leave\n\
                  \x20   ret\n";
  assert_eq!(text, expected);
}
