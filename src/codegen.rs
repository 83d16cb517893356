//! Assembly text emission: turn an [`AsmFile`] into AT&T-syntax assembly
//! suitable for a system assembler.
//!
//! Routines get the System V frame: `pushq %rbp; movq %rsp, %rbp`, a stack
//! allocation rounded up to 16 bytes, pushes for exactly the callee-saved
//! registers the body writes, and (for variadic routines) the 176-byte
//! register save area. `Return` instructions arrive as jumps to the shared
//! label `.LR<id>`, which is placed just before the pops; a return that
//! already falls through to it is elided.

use std::io::{self, Write};
use byteorder::{ByteOrder, LE};
use log::debug;

use crate::arch::{InstKind, Nonvolatiles, OpSize, OperandKind, NONVOLATILE_REGS};
use crate::build_asm::{AsmData, AsmFile, AsmRoutine};

impl AsmFile {
  /// Write the whole file: `.data`, then `.rodata`, then `.text`.
  pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
    if !self.data.is_empty() {
      writeln!(w, "    .data")?;
      for data in &self.data {
        write_data(data, w)?;
      }
    }
    if !self.rodata.is_empty() {
      writeln!(w, "    .section .rodata")?;
      for rodata in &self.rodata {
        write_data(rodata, w)?;
      }
    }
    if !self.routines.is_empty() {
      writeln!(w, "    .text")?;
      for routine in &self.routines {
        write_routine(routine, w)?;
      }
    }
    Ok(())
  }
}

/// Emit one data object: alignment, label, then the image — relocations as
/// `.quad label±offset`, the rest greedily chunked into the largest
/// directives that fit.
fn write_data(data: &AsmData, out: &mut impl Write) -> io::Result<()> {
  writeln!(out, "    .align {}", data.alignment)?;
  writeln!(out, "{}:", data.label)?;
  let mut i = 0usize;
  let mut next_reloc = 0usize;
  while i < data.bytes.len() {
    if let Some(ia) = data.addresses.get(next_reloc) {
      if ia.location as usize == i {
        next_reloc += 1;
        let offset = LE::read_i64(&data.bytes[i..i + 8]);
        if offset > 0 {
          writeln!(out, "    .quad {}+{}", ia.label, offset)?;
        } else if offset < 0 {
          writeln!(out, "    .quad {}-{}", ia.label, offset.unsigned_abs())?;
        } else {
          writeln!(out, "    .quad {}", ia.label)?;
        }
        i += 8;
        continue
      }
    }
    let rest = data.bytes.len() - i;
    if rest >= 8 {
      writeln!(out, "    .quad 0x{:X}", LE::read_u64(&data.bytes[i..i + 8]))?;
      i += 8;
    } else if rest >= 4 {
      writeln!(out, "    .long 0x{:X}", LE::read_u32(&data.bytes[i..i + 4]))?;
      i += 4;
    } else if rest >= 2 {
      writeln!(out, "    .word 0x{:X}", LE::read_u16(&data.bytes[i..i + 2]))?;
      i += 2;
    } else {
      writeln!(out, "    .byte 0x{:X}", data.bytes[i])?;
      i += 1;
    }
  }
  Ok(())
}

/// The System V register save area for variadic routines: the six integer
/// argument registers, then the eight XMM argument registers, at fixed
/// offsets in the reserved 176 bytes below `%rbp`.
fn write_varargs_setup(out: &mut impl Write) -> io::Result<()> {
  writeln!(out, "    movq %r9, -8(%rbp)")?;
  writeln!(out, "    movq %r8, -16(%rbp)")?;
  writeln!(out, "    movq %rcx, -24(%rbp)")?;
  writeln!(out, "    movq %rdx, -32(%rbp)")?;
  writeln!(out, "    movq %rsi, -40(%rbp)")?;
  writeln!(out, "    movq %rdi, -48(%rbp)")?;
  for (i, xmm) in (0..8).rev().enumerate() {
    writeln!(out, "    movaps %xmm{xmm}, {}(%rbp)", -64 - 16 * i as i64)?;
  }
  Ok(())
}

/// Scan a routine body for writes to callee-saved registers. The prologue
/// pushes and the epilogue pops exactly this set.
#[must_use] pub fn find_used_nonvolatiles(routine: &AsmRoutine) -> Nonvolatiles {
  let mut used = Nonvolatiles::empty();
  for insn in &routine.insns {
    for reg in insn.written_regs() {
      if let Some(flag) = Nonvolatiles::of(reg) {
        used |= flag;
      }
    }
  }
  used
}

fn write_routine(routine: &AsmRoutine, out: &mut impl Write) -> io::Result<()> {
  let used = find_used_nonvolatiles(routine);
  debug!("routine {}: nonvolatiles {used:?}, stackalloc {}",
    routine.label, routine.stackalloc);
  if routine.global {
    writeln!(out, "    .globl {}", routine.label)?;
  }
  writeln!(out, "{}:", routine.label)?;
  writeln!(out, "    pushq %rbp")?;
  writeln!(out, "    movq %rsp, %rbp")?;
  if routine.stackalloc != 0 {
    let v = routine.stackalloc.unsigned_abs();
    writeln!(out, "    subq ${}, %rsp", v + (16 - v % 16) % 16)?;
  }
  for (flag, reg) in NONVOLATILE_REGS {
    if used.contains(flag) {
      writeln!(out, "    pushq %{}", reg.name(OpSize::Qword))?;
    }
  }
  if routine.uses_varargs {
    write_varargs_setup(out)?;
  }

  let mut epilogue_jumps = 0usize;
  for (i, insn) in routine.insns.iter().enumerate() {
    let to_epilogue = insn.kind == InstKind::Jmp &&
      matches!(&insn.op1, Some(op) if matches!(&op.kind,
        OperandKind::Lbl(l) if l.to_ascii_uppercase().starts_with(".LR")));
    if to_epilogue {
      // a return that falls through to the epilogue needs no jump
      if i + 1 == routine.insns.len() { continue }
      epilogue_jumps += 1;
    }
    writeln!(out, "{insn}")?;
  }
  if epilogue_jumps > 0 {
    writeln!(out, ".LR{}:", routine.id)?;
  }
  for (flag, reg) in NONVOLATILE_REGS.iter().rev() {
    if used.contains(*flag) {
      writeln!(out, "    popq %{}", reg.name(OpSize::Qword))?;
    }
  }
  writeln!(out, "    leave")?;
  writeln!(out, "    ret")?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::arch::{Inst, Operand, PReg};
  use crate::build_asm::InitAddress;

  fn render(file: &AsmFile) -> String {
    let mut buf = vec![];
    file.write_to(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
  }

  fn routine(insns: Vec<Inst>) -> AsmRoutine {
    AsmRoutine {
      id: 1,
      global: true,
      label: "f".into(),
      insns,
      used_nonvolatiles: Nonvolatiles::empty(),
      stackalloc: 0,
      uses_varargs: false,
    }
  }

  #[test]
  fn nonvolatile_pushes_match_pops_and_written_set() {
    let insns = vec![
      Inst::new(InstKind::Mov).sized(OpSize::Qword)
        .two(Operand::reg(PReg::Rax), Operand::reg(PReg::R13)),
      Inst::new(InstKind::Add).sized(OpSize::Qword)
        .two(Operand::imm(1), Operand::reg(PReg::Rbx)),
      // reads don't count
      Inst::new(InstKind::Cmp).sized(OpSize::Qword)
        .two(Operand::imm(0), Operand::reg(PReg::R14)),
    ];
    let r = routine(insns);
    assert_eq!(find_used_nonvolatiles(&r), Nonvolatiles::RBX | Nonvolatiles::R13);
    let text = render(&AsmFile { routines: vec![r], ..AsmFile::default() });
    let pushes: Vec<&str> = text.lines()
      .filter(|l| l.trim_start().starts_with("pushq") && !l.contains("rbp"))
      .collect();
    let pops: Vec<&str> = text.lines()
      .filter(|l| l.trim_start().starts_with("popq"))
      .collect();
    assert_eq!(pushes, vec!["    pushq %rbx", "    pushq %r13"]);
    assert_eq!(pops, vec!["    popq %r13", "    popq %rbx"]);
  }

  #[test]
  fn prologue_rounds_stack_to_sixteen() {
    let mut r = routine(vec![]);
    r.stackalloc = -10;
    let text = render(&AsmFile { routines: vec![r], ..AsmFile::default() });
    assert!(text.contains("    subq $16, %rsp"), "{text}");
  }

  #[test]
  fn trailing_return_falls_through_to_epilogue() {
    let jmp = Inst::new(InstKind::Jmp).one(Operand::label(".LR1"));
    let r = routine(vec![jmp.clone(), Inst::new(InstKind::Nop), jmp]);
    let text = render(&AsmFile { routines: vec![r], ..AsmFile::default() });
    assert_eq!(text.matches("jmp .LR1").count(), 1, "{text}");
    assert!(text.contains(".LR1:"), "{text}");
    let r2 = AsmRoutine { id: 2, ..routine(vec![
      Inst::new(InstKind::Jmp).one(Operand::label(".LR2"))]) };
    let text = render(&AsmFile { routines: vec![r2], ..AsmFile::default() });
    assert!(!text.contains("jmp .LR2"), "{text}");
    assert!(!text.contains(".LR2:"), "{text}");
  }

  #[test]
  fn varargs_routine_reserves_save_area() {
    let mut r = routine(vec![]);
    r.uses_varargs = true;
    r.stackalloc = -176;
    let text = render(&AsmFile { routines: vec![r], ..AsmFile::default() });
    assert!(text.contains("    subq $176, %rsp"), "{text}");
    assert!(text.contains("    movq %rdi, -48(%rbp)"), "{text}");
    assert!(text.contains("    movaps %xmm7, -64(%rbp)"), "{text}");
    assert!(text.contains("    movaps %xmm0, -176(%rbp)"), "{text}");
  }

  #[test]
  fn data_emission_chunks_and_relocates() {
    // int *p = &x + 2; with sizeof(int) == 4: .quad x+8
    let mut bytes = vec![0u8; 8];
    bytes[0] = 8;
    let p = AsmData {
      label: "p".into(),
      alignment: 8,
      bytes,
      addresses: vec![InitAddress { location: 0, label: "x".into() }],
      readonly: false,
    };
    // char s[] = "ab";
    let s = AsmData {
      label: "s".into(),
      alignment: 1,
      bytes: vec![0x61, 0x62, 0x00],
      addresses: vec![],
      readonly: false,
    };
    let text = render(&AsmFile { data: vec![p, s], ..AsmFile::default() });
    let expected = "    .data\n\
                    \x20   .align 8\n\
                    p:\n\
                    \x20   .quad x+8\n\
                    \x20   .align 1\n\
                    s:\n\
                    \x20   .word 0x6261\n\
                    \x20   .byte 0x0\n";
    assert_eq!(text, expected);
  }
}
