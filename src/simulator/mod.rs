// 指令流解释器,测试用:对拍符号流和分配后的流,最终结果必须一致
// 数组按 基址+下标 落在一块平坦内存上,所以分配前后都能跑

use std::collections::HashMap;

use crate::ir::frame::FrameLayout;
use crate::ir::operand::{Operand, Var};
use crate::ir::{BinOp, CmpOp, Ir};
use crate::utility::ObjPtr;

const STEP_LIMIT: usize = 100_000;

struct Machine {
    regs: [i32; 32],
    vars: HashMap<ObjPtr<Var>, i32>,
    arg_mem: HashMap<i32, i32>,
    temp_mem: HashMap<i32, i32>,
    mem: HashMap<i32, i32>,
    layout: Option<ObjPtr<FrameLayout>>,
    args: Vec<i32>,
}

/// 执行一段指令流直到return或者流结束,返回return带出的值
pub fn run(insts: &[ObjPtr<Ir>], args: &[i32]) -> Option<i32> {
    let mut labels: HashMap<String, usize> = HashMap::new();
    for (i, inst) in insts.iter().enumerate() {
        if let Ir::Label(label) = inst.as_ref() {
            labels.insert(label.0.clone(), i);
        }
    }

    let mut m = Machine {
        regs: [0; 32],
        vars: HashMap::new(),
        arg_mem: HashMap::new(),
        temp_mem: HashMap::new(),
        mem: HashMap::new(),
        layout: None,
        args: args.to_vec(),
    };

    let mut pc = 0;
    let mut steps = 0;
    while pc < insts.len() {
        steps += 1;
        if steps > STEP_LIMIT {
            panic!("simulator exceeded {} steps", STEP_LIMIT);
        }
        match insts[pc].as_ref() {
            Ir::Label(_) => {}
            Ir::Prologue(layout) => {
                m.layout = Some(*layout);
                for i in 0..m.args.len() {
                    m.arg_mem.insert(i as i32, m.args[i]);
                }
            }
            Ir::Assign { dst, src } => {
                let val = m.value(src);
                m.write(dst, val);
            }
            Ir::Bin { op, dst, lhs, rhs } => {
                let l = m.value(lhs);
                let r = m.value(rhs);
                let val = match op {
                    BinOp::Add => l.wrapping_add(r),
                    BinOp::Sub => l.wrapping_sub(r),
                    BinOp::Mult => l.wrapping_mul(r),
                    BinOp::Div => l / r,
                    BinOp::And => l & r,
                    BinOp::Or => l | r,
                };
                m.write(dst, val);
            }
            Ir::Goto(label) => {
                pc = labels[&label.0];
                continue;
            }
            Ir::Branch {
                op,
                lhs,
                rhs,
                target,
            } => {
                let l = m.value(lhs);
                let r = m.value(rhs);
                let taken = match op {
                    CmpOp::Eq => l == r,
                    CmpOp::Ne => l != r,
                    CmpOp::Lt => l < r,
                    CmpOp::Gt => l > r,
                    CmpOp::Ge => l >= r,
                    CmpOp::Le => l <= r,
                };
                if taken {
                    pc = labels[&target.0];
                    continue;
                }
            }
            Ir::Ret { val } => {
                return val.as_ref().map(|v| m.value(v));
            }
            Ir::Call { .. } => panic!("call is not supported by the simulator"),
            Ir::ArrayLoad { dst, arr, idx } => {
                let addr = m.value(arr) + m.value(idx);
                let val = *m.mem.get(&addr).unwrap_or(&0);
                m.write(dst, val);
            }
            Ir::ArrayStore { arr, idx, val } => {
                let addr = m.value(arr) + m.value(idx);
                let val = m.value(val);
                m.mem.insert(addr, val);
            }
            Ir::IntToFloat { src, dst } => {
                let val = m.value(src);
                m.write(dst, val);
            }
            Ir::LoadArg { dst, offset } => {
                let val = *m.arg_mem.get(offset).unwrap_or(&0);
                m.write(dst, val);
            }
            Ir::StoreArg { src, offset } => {
                let val = m.value(src);
                m.arg_mem.insert(*offset, val);
            }
            Ir::LoadTemp { dst, offset } => {
                let val = *m.temp_mem.get(offset).unwrap_or(&0);
                m.write(dst, val);
            }
            Ir::StoreTemp { src, offset } => {
                let val = m.value(src);
                m.temp_mem.insert(*offset, val);
            }
        }
        pc += 1;
    }
    None
}

impl Machine {
    fn value(&self, op: &Operand) -> i32 {
        match op {
            Operand::IImm(imm) => imm.get_data(),
            Operand::FImm(imm) => imm.get_data() as i32,
            Operand::Var(var) => self.read(*var),
        }
    }

    fn read(&self, var: ObjPtr<Var>) -> i32 {
        if let Some(reg) = var.get_reg() {
            return self.regs[reg.get_id() as usize];
        }
        if let Some(val) = self.vars.get(&var) {
            return *val;
        }
        // 没写过的命名参数从参数区取初值
        if let Some(layout) = self.layout {
            if layout.is_argument(&var.name) {
                let offset = layout.argument_offset(&var.name) as usize;
                if offset < self.args.len() {
                    return self.args[offset];
                }
            }
        }
        panic!("simulator: read of unset variable {}", var.name);
    }

    fn write(&mut self, dst: &Operand, val: i32) {
        match dst {
            Operand::Var(var) => match var.get_reg() {
                Some(reg) => self.regs[reg.get_id() as usize] = val,
                None => {
                    self.vars.insert(*var, val);
                }
            },
            _ => panic!("simulator: write to non-variable operand"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::text::parse_ir;

    #[test]
    fn test_symbolic_loop() {
        let stream = parse_ir(
            "prologue, main\nassign, t1, 0\nassign, t2, 1\nloop:\nadd, t1, t1, t2\nadd, t2, t2, 1\nbrleq, t2, 5, loop\nreturn, t1, ,\n",
        );
        assert_eq!(run(&stream.insts, &[]), Some(15));
    }

    #[test]
    fn test_arguments() {
        let stream = parse_ir("prologue, f, x, y\nsub, t1, x, y\nreturn, t1, ,\n");
        assert_eq!(run(&stream.insts, &[10, 4]), Some(6));
    }

    #[test]
    fn test_array_round_trip() {
        let stream = parse_ir(
            "prologue, main\nassign, t1, 100\narray_store, t1, 3, 42\narray_load, t2, t1, 3\nreturn, t2, ,\n",
        );
        assert_eq!(run(&stream.insts, &[]), Some(42));
    }

    #[test]
    fn test_registers_and_stack_ops() {
        let stream = parse_ir(
            "prologue, main\nassign, $t0, 9\nstore_temp, $t0, 0\nassign, $t0, 0\nload_temp, $t1, 0\nreturn, $t1, ,\n",
        );
        assert_eq!(run(&stream.insts, &[]), Some(9));
    }
}
