use std::fmt::Display;

use crate::utility::{ObjPool, ObjPtr};

pub mod frame;
pub mod operand;
pub mod text;

use frame::FrameLayout;
use operand::{Operand, Reg, Var, VarKind, VarPool};

/// 二元运算符,文本形式与IROC中间代码保持一致
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    And,
    Or,
}

impl BinOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mult => "mult",
            BinOp::Div => "div",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

/// 条件跳转的比较运算符
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Ge,
    Le,
}

impl CmpOp {
    pub fn name(&self) -> &'static str {
        match self {
            CmpOp::Eq => "breq",
            CmpOp::Ne => "brneq",
            CmpOp::Lt => "brlt",
            CmpOp::Gt => "brgt",
            CmpOp::Ge => "brgeq",
            CmpOp::Le => "brleq",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(pub String);

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 中间代码指令,固定的封闭集合,按变体模式匹配来分发def/use行为
/// 每条指令至多定义一个变量,读取零或多个变量
#[derive(Debug)]
pub enum Ir {
    /// 跳转目标,自身不产生代码
    Label(Label),
    /// 函数头,携带该函数的内存布局信息
    Prologue(ObjPtr<FrameLayout>),
    Assign {
        dst: Operand,
        src: Operand,
    },
    Bin {
        op: BinOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    Goto(Label),
    Branch {
        op: CmpOp,
        lhs: Operand,
        rhs: Operand,
        target: Label,
    },
    Ret {
        val: Option<Operand>,
    },
    Call {
        dst: Option<Operand>,
        func: String,
        args: Vec<Operand>,
    },
    ArrayLoad {
        dst: Operand,
        arr: Operand,
        idx: Operand,
    },
    ArrayStore {
        arr: Operand,
        idx: Operand,
        val: Operand,
    },
    IntToFloat {
        src: Operand,
        dst: Operand,
    },
    /// 从参数区装入,寄存器分配插入的访存指令
    LoadArg {
        dst: Operand,
        offset: i32,
    },
    StoreArg {
        src: Operand,
        offset: i32,
    },
    /// 从临时变量区装入
    LoadTemp {
        dst: Operand,
        offset: i32,
    },
    StoreTemp {
        src: Operand,
        offset: i32,
    },
}

impl Ir {
    /// 该指令写入的变量,没有则为None
    pub fn def(&self) -> Option<ObjPtr<Var>> {
        match self {
            Ir::Assign { dst, .. }
            | Ir::Bin { dst, .. }
            | Ir::ArrayLoad { dst, .. }
            | Ir::IntToFloat { dst, .. }
            | Ir::LoadArg { dst, .. }
            | Ir::LoadTemp { dst, .. } => dst.get_var(),
            Ir::Call { dst, .. } => dst.as_ref().and_then(|d| d.get_var()),
            _ => None,
        }
    }

    /// 该指令读取的所有变量,按操作数顺序,去重
    pub fn uses(&self) -> Vec<ObjPtr<Var>> {
        let mut out: Vec<ObjPtr<Var>> = Vec::new();
        let mut push = |op: &Operand| {
            if let Some(var) = op.get_var() {
                if !out.contains(&var) {
                    out.push(var);
                }
            }
        };
        match self {
            Ir::Assign { src, .. } | Ir::IntToFloat { src, .. } => push(src),
            Ir::Bin { lhs, rhs, .. } | Ir::Branch { lhs, rhs, .. } => {
                push(lhs);
                push(rhs);
            }
            Ir::Ret { val } => {
                if let Some(val) = val {
                    push(val);
                }
            }
            Ir::Call { args, .. } => {
                for arg in args {
                    push(arg);
                }
            }
            Ir::ArrayLoad { arr, idx, .. } => {
                push(arr);
                push(idx);
            }
            Ir::ArrayStore { arr, idx, val } => {
                push(val);
                push(arr);
                push(idx);
            }
            Ir::StoreArg { src, .. } | Ir::StoreTemp { src, .. } => push(src),
            Ir::Label(_) | Ir::Goto(_) | Ir::Prologue(_) => {}
            Ir::LoadArg { .. } | Ir::LoadTemp { .. } => {}
        }
        out
    }

    /// 把被读取的符号变量原地改写为物理寄存器变量
    pub fn replace_uses(&mut self, old: ObjPtr<Var>, new: ObjPtr<Var>) {
        let swap = |op: &mut Operand| {
            if op.get_var() == Some(old) {
                *op = Operand::Var(new);
            }
        };
        match self {
            Ir::Assign { src, .. } | Ir::IntToFloat { src, .. } => swap(src),
            Ir::Bin { lhs, rhs, .. } | Ir::Branch { lhs, rhs, .. } => {
                swap(lhs);
                swap(rhs);
            }
            Ir::Ret { val } => {
                if let Some(val) = val {
                    swap(val);
                }
            }
            Ir::Call { args, .. } => {
                for arg in args {
                    swap(arg);
                }
            }
            Ir::ArrayLoad { arr, idx, .. } => {
                swap(arr);
                swap(idx);
            }
            Ir::ArrayStore { arr, idx, val } => {
                swap(val);
                swap(arr);
                swap(idx);
            }
            Ir::StoreArg { src, .. } | Ir::StoreTemp { src, .. } => swap(src),
            _ => {}
        }
    }

    /// 把被定义的符号变量原地改写为物理寄存器变量
    pub fn replace_def(&mut self, old: ObjPtr<Var>, new: ObjPtr<Var>) {
        match self {
            Ir::Assign { dst, .. }
            | Ir::Bin { dst, .. }
            | Ir::ArrayLoad { dst, .. }
            | Ir::IntToFloat { dst, .. }
            | Ir::LoadArg { dst, .. }
            | Ir::LoadTemp { dst, .. } => {
                if dst.get_var() == Some(old) {
                    *dst = Operand::Var(new);
                }
            }
            Ir::Call { dst, .. } => {
                if let Some(d) = dst {
                    if d.get_var() == Some(old) {
                        *d = Operand::Var(new);
                    }
                }
            }
            _ => {}
        }
    }

    /// 是否是基本块的终结指令
    pub fn is_jump(&self) -> bool {
        matches!(self, Ir::Goto(_) | Ir::Branch { .. } | Ir::Ret { .. })
    }

    pub fn get_label(&self) -> Option<&Label> {
        match self {
            Ir::Label(label) => Some(label),
            _ => None,
        }
    }

    /// 条件跳转与无条件跳转的目标
    pub fn jump_target(&self) -> Option<&Label> {
        match self {
            Ir::Goto(label) => Some(label),
            Ir::Branch { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl Display for Ir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ir::Label(label) => write!(f, "{}:", label),
            Ir::Prologue(layout) => {
                write!(f, "prologue, {}", layout.label)?;
                for arg in layout.arguments.iter() {
                    write!(f, ", {}", arg)?;
                }
                Ok(())
            }
            Ir::Assign { dst, src } => write!(f, "assign, {}, {}", dst, src),
            Ir::Bin { op, dst, lhs, rhs } => {
                write!(f, "{}, {}, {}, {}", op.name(), dst, lhs, rhs)
            }
            Ir::Goto(label) => write!(f, "goto, {}", label),
            Ir::Branch {
                op,
                lhs,
                rhs,
                target,
            } => write!(f, "{}, {}, {}, {}", op.name(), lhs, rhs, target),
            Ir::Ret { val } => match val {
                Some(val) => write!(f, "return, {}, ,", val),
                None => write!(f, "return, , ,"),
            },
            Ir::Call { dst, func, args } => {
                match dst {
                    Some(dst) => write!(f, "callr, {}, {}", dst, func)?,
                    None => write!(f, "call, {}", func)?,
                }
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                Ok(())
            }
            Ir::ArrayLoad { dst, arr, idx } => {
                write!(f, "array_load, {}, {}, {}", dst, arr, idx)
            }
            Ir::ArrayStore { arr, idx, val } => {
                write!(f, "array_store, {}, {}, {}", arr, idx, val)
            }
            Ir::IntToFloat { src, dst } => write!(f, "intToFloat, {}, {}", src, dst),
            Ir::LoadArg { dst, offset } => write!(f, "load_arg, {}, {}", dst, offset),
            Ir::StoreArg { src, offset } => write!(f, "store_arg, {}, {}", src, offset),
            Ir::LoadTemp { dst, offset } => write!(f, "load_temp, {}, {}", dst, offset),
            Ir::StoreTemp { src, offset } => write!(f, "store_temp, {}, {}", src, offset),
        }
    }
}

/// 一次编译过程的指令与变量的内存池
pub struct IrPool {
    insts: ObjPool<Ir>,
    pub vars: VarPool,
    layouts: ObjPool<FrameLayout>,
}

impl IrPool {
    pub fn new() -> IrPool {
        IrPool {
            insts: ObjPool::new(),
            vars: VarPool::new(),
            layouts: ObjPool::new(),
        }
    }

    pub fn put_inst(&mut self, inst: Ir) -> ObjPtr<Ir> {
        self.insts.put(inst)
    }

    pub fn put_layout(&mut self, layout: FrameLayout) -> ObjPtr<FrameLayout> {
        self.layouts.put(layout)
    }

    pub fn put_var(&mut self, name: &str, kind: VarKind) -> ObjPtr<Var> {
        self.vars.put(name, kind)
    }

    pub fn reg_var(&mut self, reg: Reg) -> ObjPtr<Var> {
        self.vars.reg_var(reg)
    }
}

/// 扁平的指令流以及承载它的内存池
pub struct IrStream {
    pub insts: Vec<ObjPtr<Ir>>,
    pub pool: IrPool,
}

impl IrStream {
    pub fn new() -> IrStream {
        IrStream {
            insts: Vec::new(),
            pool: IrPool::new(),
        }
    }
}
