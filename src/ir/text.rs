use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::utility::ObjPtr;

use super::frame::FrameLayout;
use super::operand::{FImm, IImm, Operand, Var, VarKind, REG_IDS};
use super::{BinOp, CmpOp, Ir, IrStream, Label};

lazy_static! {
    static ref LABEL_RE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*):$").unwrap();
    static ref TEMP_RE: Regex = Regex::new(r"^t\d+$").unwrap();
    static ref INT_RE: Regex = Regex::new(r"^-?\d+$").unwrap();
    static ref FLOAT_RE: Regex = Regex::new(r"^-?\d+\.\d+$").unwrap();
    static ref REG_RE: Regex = Regex::new(r"^\$([a-z]+\d*)$").unwrap();
}

/// 把IROC文本读入为指令流,一行一条指令,形如 op, x, y, z
/// 标号行形如 name:
/// 这个读入器只服务于命令行驱动和测试,不是源语言的语法分析
pub fn parse_ir(text: &str) -> IrStream {
    let mut parser = Parser {
        stream: IrStream::new(),
        scope: HashMap::new(),
        layout: None,
    };
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        parser.parse_line(line);
    }
    // 没有函数头的流补一个隐式的main函数头,保证每个函数都有布局记录
    if parser.layout.is_none() {
        let layout = parser
            .stream
            .pool
            .put_layout(FrameLayout::new("main", Vec::new()));
        let prologue = parser.stream.pool.put_inst(Ir::Prologue(layout));
        parser.stream.insts.insert(0, prologue);
    }
    parser.stream
}

/// 把指令流写回IROC文本
pub fn write_ir(insts: &[ObjPtr<Ir>]) -> String {
    let mut out = String::new();
    for inst in insts {
        out.push_str(&inst.to_string());
        out.push('\n');
    }
    out
}

struct Parser {
    stream: IrStream,
    /// 当前函数作用域内按名字驻留的变量
    scope: HashMap<String, ObjPtr<Var>>,
    layout: Option<ObjPtr<FrameLayout>>,
}

impl Parser {
    fn parse_line(&mut self, line: &str) {
        if let Some(cap) = LABEL_RE.captures(line) {
            let inst = Ir::Label(Label(cap[1].to_string()));
            let inst = self.stream.pool.put_inst(inst);
            self.stream.insts.push(inst);
            return;
        }

        let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();
        let op = fields[0];
        let inst = match op {
            "prologue" => {
                let name = fields[1];
                let args: Vec<String> = fields[2..]
                    .iter()
                    .filter(|f| !f.is_empty())
                    .map(|f| f.to_string())
                    .collect();
                let mut layout = FrameLayout::new(name, args);
                layout.build_argument_map();
                let layout = self.stream.pool.put_layout(layout);
                // 新函数,重开作用域
                self.scope.clear();
                self.layout = Some(layout);
                Ir::Prologue(layout)
            }
            "assign" => Ir::Assign {
                dst: self.operand(fields[1]),
                src: self.operand(fields[2]),
            },
            "add" | "sub" | "mult" | "div" | "and" | "or" => {
                let bin_op = match op {
                    "add" => BinOp::Add,
                    "sub" => BinOp::Sub,
                    "mult" => BinOp::Mult,
                    "div" => BinOp::Div,
                    "and" => BinOp::And,
                    _ => BinOp::Or,
                };
                Ir::Bin {
                    op: bin_op,
                    dst: self.operand(fields[1]),
                    lhs: self.operand(fields[2]),
                    rhs: self.operand(fields[3]),
                }
            }
            "goto" => Ir::Goto(Label(fields[1].to_string())),
            "breq" | "brneq" | "brlt" | "brgt" | "brgeq" | "brleq" => {
                let cmp_op = match op {
                    "breq" => CmpOp::Eq,
                    "brneq" => CmpOp::Ne,
                    "brlt" => CmpOp::Lt,
                    "brgt" => CmpOp::Gt,
                    "brgeq" => CmpOp::Ge,
                    _ => CmpOp::Le,
                };
                Ir::Branch {
                    op: cmp_op,
                    lhs: self.operand(fields[1]),
                    rhs: self.operand(fields[2]),
                    target: Label(fields[3].to_string()),
                }
            }
            "return" => {
                let val = fields.get(1).filter(|f| !f.is_empty());
                Ir::Ret {
                    val: val.map(|f| self.operand(f)),
                }
            }
            "call" => Ir::Call {
                dst: None,
                func: fields[1].to_string(),
                args: fields[2..]
                    .iter()
                    .filter(|f| !f.is_empty())
                    .map(|f| self.operand(f))
                    .collect(),
            },
            "callr" => Ir::Call {
                dst: Some(self.operand(fields[1])),
                func: fields[2].to_string(),
                args: fields[3..]
                    .iter()
                    .filter(|f| !f.is_empty())
                    .map(|f| self.operand(f))
                    .collect(),
            },
            "array_load" => Ir::ArrayLoad {
                dst: self.operand(fields[1]),
                arr: self.operand(fields[2]),
                idx: self.operand(fields[3]),
            },
            "array_store" => Ir::ArrayStore {
                arr: self.operand(fields[1]),
                idx: self.operand(fields[2]),
                val: self.operand(fields[3]),
            },
            "intToFloat" => Ir::IntToFloat {
                src: self.operand(fields[1]),
                dst: self.operand(fields[2]),
            },
            "load_arg" => Ir::LoadArg {
                dst: self.operand(fields[1]),
                offset: fields[2].parse().unwrap(),
            },
            "store_arg" => Ir::StoreArg {
                src: self.operand(fields[1]),
                offset: fields[2].parse().unwrap(),
            },
            "load_temp" => Ir::LoadTemp {
                dst: self.operand(fields[1]),
                offset: fields[2].parse().unwrap(),
            },
            "store_temp" => Ir::StoreTemp {
                src: self.operand(fields[1]),
                offset: fields[2].parse().unwrap(),
            },
            _ => panic!("Error: unknown ir op `{}` in line `{}`", op, line),
        };
        let inst = self.stream.pool.put_inst(inst);
        self.stream.insts.push(inst);
    }

    fn operand(&mut self, field: &str) -> Operand {
        if INT_RE.is_match(field) {
            return Operand::IImm(IImm::new(field.parse().unwrap()));
        }
        if FLOAT_RE.is_match(field) {
            return Operand::FImm(FImm::new(field.parse().unwrap()));
        }
        if let Some(cap) = REG_RE.captures(field) {
            let id = *REG_IDS
                .get(&cap[1])
                .unwrap_or_else(|| panic!("Error: unknown register `{}`", field));
            let reg = super::operand::Reg::new(id);
            return Operand::Var(self.stream.pool.reg_var(reg));
        }
        Operand::Var(self.var(field))
    }

    /// 作用域内同名变量驻留为同一个实体,跨函数不共享
    fn var(&mut self, name: &str) -> ObjPtr<Var> {
        if let Some(var) = self.scope.get(name) {
            return *var;
        }
        let is_arg = self
            .layout
            .map(|l| l.is_argument(name))
            .unwrap_or(false);
        let kind = if is_arg || !TEMP_RE.is_match(name) {
            VarKind::Named
        } else {
            VarKind::Temp
        };
        let var = self.stream.pool.put_var(name, kind);
        self.scope.insert(name.to_string(), var);
        var
    }
}
