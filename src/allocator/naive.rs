// 朴素分配:不做活跃分析也不着色,每个符号变量都住在内存里
// 每次使用前装入暂存寄存器,每次定义后立刻存回去
// 作为其他策略的正确性基线

use std::collections::HashMap;

use crate::ir::frame::FrameLayout;
use crate::ir::operand::{Operand, Var, SCRATCH_REGS};
use crate::ir::{Ir, IrStream};
use crate::utility::ObjPtr;

pub fn allocate(stream: &mut IrStream) -> Vec<ObjPtr<Ir>> {
    let mut out: Vec<ObjPtr<Ir>> = Vec::new();
    let mut layout: Option<ObjPtr<FrameLayout>> = None;
    for inst in stream.insts.clone() {
        match inst.as_ref() {
            Ir::Label(_) | Ir::Goto(_) => {
                out.push(inst);
                continue;
            }
            Ir::Prologue(l) => {
                layout = Some(*l);
                out.push(inst);
                continue;
            }
            _ => {}
        }
        let layout = layout
            .unwrap_or_else(|| panic!("Error: instruction `{}` before function prologue", inst));

        let mut scratch_n = 0;
        let mut scratch_of: HashMap<ObjPtr<Var>, ObjPtr<Var>> = HashMap::new();
        for var in inst.uses() {
            if var.is_physic() {
                continue;
            }
            let reg = SCRATCH_REGS
                .get(scratch_n)
                .copied()
                .unwrap_or_else(|| panic!("Error: too many operands in `{}`", inst));
            scratch_n += 1;
            let reg_var = stream.pool.reg_var(reg);
            let load = if layout.is_argument(&var.name) {
                Ir::LoadArg {
                    dst: Operand::Var(reg_var),
                    offset: layout.argument_offset(&var.name),
                }
            } else {
                Ir::LoadTemp {
                    dst: Operand::Var(reg_var),
                    offset: layout.as_mut().temporary_offset(&var.name),
                }
            };
            out.push(stream.pool.put_inst(load));
            inst.as_mut().replace_uses(var, reg_var);
            scratch_of.insert(var, reg_var);
            layout.as_mut().note_used_reg(reg);
        }

        match inst.def() {
            Some(def) if !def.is_physic() => {
                let reg_var = match scratch_of.get(&def) {
                    Some(reg_var) => *reg_var,
                    None => {
                        let reg = SCRATCH_REGS
                            .get(scratch_n)
                            .copied()
                            .unwrap_or_else(|| panic!("Error: too many operands in `{}`", inst));
                        layout.as_mut().note_used_reg(reg);
                        stream.pool.reg_var(reg)
                    }
                };
                inst.as_mut().replace_def(def, reg_var);
                out.push(inst);
                let store = if layout.is_argument(&def.name) {
                    Ir::StoreArg {
                        src: Operand::Var(reg_var),
                        offset: layout.argument_offset(&def.name),
                    }
                } else {
                    Ir::StoreTemp {
                        src: Operand::Var(reg_var),
                        offset: layout.as_mut().temporary_offset(&def.name),
                    }
                };
                out.push(stream.pool.put_inst(store));
            }
            _ => out.push(inst),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::text::{parse_ir, write_ir};

    #[test]
    fn test_every_access_goes_through_memory() {
        let mut stream = parse_ir("assign, t1, 5\nadd, t2, t1, 1\nreturn, t2, ,\n");
        let out = allocate(&mut stream);
        let text = write_ir(&out);
        let want = "\
prologue, main
assign, $t8, 5
store_temp, $t8, 0
load_temp, $t8, 0
add, $t9, $t8, 1
store_temp, $t9, 1
load_temp, $t8, 1
return, $t8, ,
";
        assert_eq!(text, want);
    }

    #[test]
    fn test_argument_slots() {
        let mut stream = parse_ir("prologue, f, x\nadd, x, x, 1\nreturn, x, ,\n");
        let out = allocate(&mut stream);
        let text = write_ir(&out);
        // 参数走参数区,读改写回同一个槽
        let want = "\
prologue, f, x
load_arg, $t8, 0
add, $t8, $t8, 1
store_arg, $t8, 0
load_arg, $t8, 0
return, $t8, ,
";
        assert_eq!(text, want);
    }
}
