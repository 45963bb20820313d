use std::collections::HashMap;
use std::fmt::Display;

use lazy_static::lazy_static;

use crate::utility::{ObjPool, ObjPtr};

pub const REG_COUNT: i32 = 32;
/// 可着色寄存器队列的最大长度($t0-$t7)
pub const PALETTE_MAX: i32 = 8;
pub const ARG_REG_COUNT: usize = 4;

lazy_static! {
    /// MIPS寄存器名表,下标即寄存器编号
    pub static ref REG_NAMES: Vec<&'static str> = vec![
        "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5",
        "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1",
        "gp", "sp", "fp", "ra",
    ];
    /// 着色可用的寄存器($t0..$t7),调色板取其前K个
    pub static ref PALETTE: Vec<Reg> = (8..=15).map(Reg::new).collect();
    /// spill与naive翻译使用的保留暂存寄存器,不参与着色
    pub static ref SCRATCH_REGS: Vec<Reg> = vec![Reg::new(24), Reg::new(25), Reg::new(3)];
    /// 函数参数寄存器$a0..$a3
    pub static ref ARG_REGS: Vec<Reg> = (4..=7).map(Reg::new).collect();
    /// 由名字到寄存器编号的反查表
    pub static ref REG_IDS: HashMap<&'static str, i32> = REG_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, i as i32))
        .collect();
}

#[derive(Clone, Copy, PartialEq, Hash, Eq, Debug)]
pub struct Reg {
    id: i32,
}

impl Reg {
    pub fn new(id: i32) -> Self {
        debug_assert!(id >= 0 && id < REG_COUNT, "{id}");
        Self { id }
    }

    pub fn get_id(&self) -> i32 {
        self.id
    }

    /// 返回函数调用返回值寄存器$v0
    pub fn v0() -> Reg {
        Reg::new(2)
    }

    /// 调色板中前k个寄存器
    pub fn palette(k: i32) -> Vec<Reg> {
        PALETTE[..k as usize].to_vec()
    }
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", REG_NAMES[self.id as usize])
    }
}

#[derive(Clone, Copy, PartialEq, Hash, Eq, Debug)]
pub struct IImm {
    data: i32,
}

impl IImm {
    pub fn new(data: i32) -> Self {
        Self { data }
    }
    pub fn get_data(&self) -> i32 {
        self.data
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct FImm {
    data: f32,
}

impl FImm {
    pub fn new(data: f32) -> Self {
        Self { data }
    }
    pub fn get_data(&self) -> f32 {
        self.data
    }
}

/// 变量的种类:命名变量(参数或者局部变量),临时变量,已经固定的物理寄存器
#[derive(Clone, Copy, PartialEq, Hash, Eq, Debug)]
pub enum VarKind {
    Named,
    Temp,
    Reg(Reg),
}

/// 符号变量,身份由内存池的分配决定而不是由名字决定
/// (不同作用域下同名的变量是不同的实体)
#[derive(Debug)]
pub struct Var {
    id: u32,
    pub name: String,
    pub kind: VarKind,
}

impl Var {
    /// 池内分配序号,用来做确定性的排序,不参与身份比较
    pub fn get_id(&self) -> u32 {
        self.id
    }

    pub fn is_physic(&self) -> bool {
        matches!(self.kind, VarKind::Reg(_))
    }

    pub fn get_reg(&self) -> Option<Reg> {
        match self.kind {
            VarKind::Reg(reg) => Some(reg),
            _ => None,
        }
    }

    pub fn is_named(&self) -> bool {
        self.kind == VarKind::Named
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            VarKind::Reg(reg) => write!(f, "{}", reg),
            _ => write!(f, "{}", self.name),
        }
    }
}

/// 变量池,负责变量的分配以及物理寄存器变量的复用
/// 一次编译过程持有一个变量池,寄存器分配过程中新产生的物理寄存器变量也从这里取
pub struct VarPool {
    pool: ObjPool<Var>,
    next_id: u32,
    reg_vars: HashMap<i32, ObjPtr<Var>>,
}

impl VarPool {
    pub fn new() -> VarPool {
        VarPool {
            pool: ObjPool::new(),
            next_id: 0,
            reg_vars: HashMap::new(),
        }
    }

    pub fn put(&mut self, name: &str, kind: VarKind) -> ObjPtr<Var> {
        let id = self.next_id;
        self.next_id += 1;
        self.pool.put(Var {
            id,
            name: name.to_string(),
            kind,
        })
    }

    /// 同一个物理寄存器总是返回同一个变量实体,保证冲突图上的身份判断成立
    pub fn reg_var(&mut self, reg: Reg) -> ObjPtr<Var> {
        if let Some(var) = self.reg_vars.get(&reg.get_id()) {
            return *var;
        }
        let id = self.next_id;
        self.next_id += 1;
        let var = self.pool.put(Var {
            id,
            name: format!("${}", REG_NAMES[reg.get_id() as usize]),
            kind: VarKind::Reg(reg),
        });
        self.reg_vars.insert(reg.get_id(), var);
        var
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Operand {
    Var(ObjPtr<Var>),
    IImm(IImm),
    FImm(FImm),
}

impl Operand {
    pub fn get_var(&self) -> Option<ObjPtr<Var>> {
        match self {
            Operand::Var(var) => Some(*var),
            _ => None,
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Var(var) => write!(f, "{}", var),
            Operand::IImm(imm) => write!(f, "{}", imm.get_data()),
            Operand::FImm(imm) => write!(f, "{}", imm.get_data()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reg_names() {
        assert_eq!(Reg::new(8).to_string(), "$t0");
        assert_eq!(Reg::new(24).to_string(), "$t8");
        assert_eq!(Reg::v0().to_string(), "$v0");
        assert_eq!(*REG_IDS.get("sp").unwrap(), 29);
    }

    #[test]
    fn test_var_identity() {
        let mut pool = VarPool::new();
        let a = pool.put("x", VarKind::Named);
        let b = pool.put("x", VarKind::Named);
        assert_ne!(a, b);
        let t8 = pool.reg_var(Reg::new(24));
        assert_eq!(t8, pool.reg_var(Reg::new(24)));
        assert!(t8.is_physic());
    }
}
