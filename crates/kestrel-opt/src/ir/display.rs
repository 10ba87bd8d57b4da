//! Pretty-printing for the graph IR
//!
//! Display implementations for debugging and dump output.

use std::fmt;

use super::graph::{Block, FrameConstantKind, Graph, Opcode, Operation, OpIndex};

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph ({} blocks, {} ops) {{", self.block_count(), self.op_count())?;
        for block in self.blocks() {
            write_block(f, self, block)?;
        }
        writeln!(f, "}}")
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, graph: &Graph, block: &Block) -> fmt::Result {
    writeln!(f, "  {}:", block.index)?;
    if !block.predecessors.is_empty() {
        write!(f, "    ; preds:")?;
        for pred in &block.predecessors {
            write!(f, " {}", pred)?;
        }
        writeln!(f)?;
    }
    for &op_index in &block.ops {
        let op = graph.get(op_index);
        write!(f, "    ")?;
        if !op.is_control() {
            write!(f, "{} = ", op_index)?;
        }
        writeln!(f, "{}", op)?;
    }
    Ok(())
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mnemonic(&self.opcode))?;
        match &self.opcode {
            Opcode::Parameter { index } => write!(f, " #{}", index)?,
            Opcode::Word32Constant { value } => write!(f, " {}", value)?,
            Opcode::Word64Constant { value } => write!(f, " {}", value)?,
            Opcode::Float64Constant { value } => write!(f, " {}", value)?,
            Opcode::FrameConstant { kind } => match kind {
                FrameConstantKind::FramePointer => write!(f, " fp")?,
                FrameConstantKind::ParentFramePointer => write!(f, " parent-fp")?,
            },
            Opcode::Load { offset } | Opcode::Store { offset } => write!(f, " [{}]", offset)?,
            Opcode::Call { callee } => write!(f, " @{}", callee)?,
            Opcode::Projection { index } => write!(f, " #{}", index)?,
            Opcode::Goto { target } => write!(f, " {}", target)?,
            Opcode::Branch { if_true, if_false } => write!(f, " {}, {}", if_true, if_false)?,
            Opcode::Switch { cases, default } => {
                for (value, target) in cases {
                    write!(f, " {}->{}", value, target)?;
                }
                write!(f, " default->{}", default)?;
            }
            _ => {}
        }
        let mut sep = if matches!(
            self.opcode,
            Opcode::Word32Constant { .. }
                | Opcode::Word64Constant { .. }
                | Opcode::Float64Constant { .. }
                | Opcode::Parameter { .. }
                | Opcode::FrameConstant { .. }
        ) {
            ", "
        } else {
            " "
        };
        for input in &self.inputs {
            write!(f, "{}{}", sep, input)?;
            sep = ", ";
        }
        if let Some(rep) = self.rep {
            if matches!(self.opcode, Opcode::Phi) {
                write!(f, " : {}", rep)?;
            }
        }
        Ok(())
    }
}

fn mnemonic(opcode: &Opcode) -> &'static str {
    match opcode {
        Opcode::Parameter { .. } => "parameter",
        Opcode::Word32Constant { .. } => "const.w32",
        Opcode::Word64Constant { .. } => "const.w64",
        Opcode::Float64Constant { .. } => "const.f64",
        Opcode::FrameConstant { .. } => "frame-const",
        Opcode::StackPointerGreaterThan => "sp.gt",
        Opcode::Word32Add => "word32.add",
        Opcode::Word32Sub => "word32.sub",
        Opcode::Word32Mul => "word32.mul",
        Opcode::Word32Equal => "word32.eq",
        Opcode::Word32LessThan => "word32.lt",
        Opcode::Float64Add => "float64.add",
        Opcode::Float64Mul => "float64.mul",
        Opcode::Load { .. } => "load",
        Opcode::Store { .. } => "store",
        Opcode::Call { .. } => "call",
        Opcode::Deoptimize => "deopt",
        Opcode::FrameState { .. } => "frame-state",
        Opcode::Tuple => "tuple",
        Opcode::Projection { .. } => "projection",
        Opcode::Select => "select",
        Opcode::Phi => "phi",
        Opcode::Goto { .. } => "goto",
        Opcode::Branch { .. } => "branch",
        Opcode::Switch { .. } => "switch",
        Opcode::Return => "return",
        Opcode::Unreachable => "unreachable",
    }
}
