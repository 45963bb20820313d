// 图着色寄存器分配, Chaitin式的simplify/spill/select三段
// 以单个基本块或者扩展基本块为着色单位,不做全函数范围的溢出代价迭代

use std::collections::{HashMap, HashSet};

use biheap::BiHeap;

use crate::config;
use crate::ir::frame::FrameLayout;
use crate::ir::operand::{Operand, Reg, Var, SCRATCH_REGS};
use crate::ir::{Ir, IrPool};
use crate::utility::ObjPtr;

use super::flowgraph::BB;
use super::interference::InterferenceGraph;
use super::live_range::LiveRanges;
use super::structs::{AllocStat, RegUsedStat};
use super::Regalloc;

/// 溢出候选,代价小的先出堆
/// 代价相同按池内序号,保证选择是确定性的
#[derive(Clone, Copy, PartialEq, Eq)]
struct OperItem {
    cost: i32,
    id: u32,
    var: ObjPtr<Var>,
}

impl PartialOrd for OperItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OperItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.cost, self.id).cmp(&(other.cost, other.id))
    }
}

pub struct Colorer {
    k: i32,
    dstr: HashMap<ObjPtr<Var>, Reg>,
    spillings: HashSet<ObjPtr<Var>>,
}

impl Colorer {
    pub fn new(k: i32) -> Colorer {
        Colorer {
            k,
            dstr: HashMap::new(),
            spillings: HashSet::new(),
        }
    }
}

impl Regalloc for Colorer {
    fn alloc(&mut self, blocks: &[ObjPtr<BB>]) -> AllocStat {
        debug_assert!(self.k > 0);
        let mut ig = InterferenceGraph::empty();
        for block in blocks {
            ig.add_ranges(&LiveRanges::new(block.as_ref()));
        }
        let costs = estimate_spill_cost(blocks);

        // 物理寄存器节点预着色,不参与simplify,只在select时约束邻居
        for var in ig.vars() {
            if let Some(reg) = var.get_reg() {
                self.dstr.insert(var, reg);
            }
        }

        // 溢出候选按使用频度进小大堆
        let mut heap: BiHeap<OperItem> = BiHeap::new();
        for var in ig.vars() {
            if !var.is_physic() {
                heap.push(OperItem {
                    cost: *costs.get(&var).unwrap_or(&0),
                    id: var.get_id(),
                    var,
                });
            }
        }

        // simplify:不断摘除度数小于k的节点压栈
        // 摘不动的时候按代价挑一个潜在溢出节点压栈,继续化简
        let mut work = ig.graph.clone();
        let mut stack: Vec<(ObjPtr<Var>, bool)> = Vec::new();
        loop {
            let mut nodes: Vec<ObjPtr<Var>> = work
                .keys()
                .filter(|var| !var.is_physic())
                .copied()
                .collect();
            nodes.sort_by_key(|var| var.get_id());
            if nodes.is_empty() {
                break;
            }
            let pick = nodes
                .iter()
                .copied()
                .find(|var| (work.get(var).unwrap().len() as i32) < self.k);
            match pick {
                Some(var) => {
                    stack.push((var, false));
                    remove_node(&mut work, var);
                }
                None => {
                    // 全部节点度数>=k,选潜在溢出
                    let cand = loop {
                        match heap.pop_min() {
                            Some(item) if work.contains_key(&item.var) => break item.var,
                            Some(_) => continue,
                            None => unreachable!("spill candidate heap drained"),
                        }
                    };
                    stack.push((cand, true));
                    remove_node(&mut work, cand);
                }
            }
        }

        // select:弹栈着色,取编号最小的空闲寄存器
        // 潜在溢出节点此刻也再试一次,实在无色可用才真正溢出
        while let Some((var, potential)) = stack.pop() {
            let mut used = RegUsedStat::new();
            for neighbor in ig.neighbors(var) {
                if let Some(reg) = self.dstr.get(&neighbor) {
                    used.use_reg(reg.get_id());
                }
            }
            match used.get_available_reg(self.k) {
                Some(reg) => {
                    self.dstr.insert(var, reg);
                }
                None => {
                    if potential {
                        self.spillings.insert(var);
                    } else {
                        unreachable!("node removed with degree < k must be colorable");
                    }
                }
            }
        }

        AllocStat {
            dstr: self.dstr.clone(),
            spillings: self.spillings.clone(),
        }
    }
}

fn remove_node(
    work: &mut HashMap<ObjPtr<Var>, HashSet<ObjPtr<Var>>>,
    var: ObjPtr<Var>,
) {
    work.remove(&var);
    for neighbors in work.values_mut() {
        neighbors.remove(&var);
    }
}

/// 估计溢出代价:出现在def或者use各记一次
/// 只有使用频度,没有嵌套深度加权
pub fn estimate_spill_cost(blocks: &[ObjPtr<BB>]) -> HashMap<ObjPtr<Var>, i32> {
    let mut out: HashMap<ObjPtr<Var>, i32> = HashMap::new();
    for block in blocks {
        for inst in block.insts.iter() {
            for var in inst.uses() {
                *out.entry(var).or_insert(0) += 1;
            }
            if let Some(def) = inst.def() {
                *out.entry(def).or_insert(0) += 1;
            }
        }
    }
    out
}

/// 用着色结果改写一个块,产出等价的只使用物理寄存器的指令序列
///
/// * 分到寄存器的符号变量原地替换
/// * 溢出变量每次使用前插入从栈槽到暂存寄存器的装载,每次定义后插入回存
/// * load_ins为真时在块入口把从前驱流入的着色变量从各自的内存家装入寄存器,
///   块出口把本块定义过且后继需要的着色变量存回内存家
///   (扩展基本块内部的成员不装载,值经共享的着色直接流过来)
pub fn rewrite_block(
    block: ObjPtr<BB>,
    stat: &AllocStat,
    layout: ObjPtr<FrameLayout>,
    pool: &mut IrPool,
    load_ins: bool,
) -> Vec<ObjPtr<Ir>> {
    let block_name = block.as_ref().to_string();
    let mut out: Vec<ObjPtr<Ir>> = Vec::new();

    let mut start = 0;
    if let Some(first) = block.insts.first() {
        if matches!(first.as_ref(), Ir::Prologue(_)) {
            out.push(*first);
            start = 1;
        }
    }

    if load_ins {
        let mut ins: Vec<ObjPtr<Var>> = block.defs_in.iter().copied().collect();
        ins.sort_by_key(|var| var.get_id());
        for var in ins {
            if var.is_physic() || stat.spillings.contains(&var) {
                continue;
            }
            let reg = *stat.dstr.get(&var).unwrap();
            let reg_var = pool.reg_var(reg);
            let load = load_home(var, reg_var, layout);
            out.push(pool.put_inst(load));
            layout.as_mut().note_used_reg(reg);
        }
    }

    // 出口回存要落在终结跳转之前
    let ends_with_jump = block
        .insts
        .last()
        .map(|inst| inst.is_jump())
        .unwrap_or(false);
    let body_end = if ends_with_jump {
        block.size() - 1
    } else {
        block.size()
    };

    for i in start..body_end {
        rewrite_inst(block.insts[i], stat, layout, pool, &block_name, &mut out);
    }

    let mut outs: Vec<ObjPtr<Var>> = block
        .defs_out
        .iter()
        .filter(|var| block.last_def.contains_key(*var))
        .copied()
        .collect();
    outs.sort_by_key(|var| var.get_id());
    for var in outs {
        if var.is_physic() || stat.spillings.contains(&var) {
            continue;
        }
        let reg = *stat.dstr.get(&var).unwrap();
        let reg_var = pool.reg_var(reg);
        let store = store_home(var, reg_var, layout);
        out.push(pool.put_inst(store));
        layout.as_mut().note_used_reg(reg);
    }

    if ends_with_jump {
        rewrite_inst(
            block.insts[block.size() - 1],
            stat,
            layout,
            pool,
            &block_name,
            &mut out,
        );
    }
    out
}

fn rewrite_inst(
    inst: ObjPtr<Ir>,
    stat: &AllocStat,
    layout: ObjPtr<FrameLayout>,
    pool: &mut IrPool,
    block_name: &str,
    out: &mut Vec<ObjPtr<Ir>>,
) {
    let mut scratch_n = 0;
    let mut scratch_of: HashMap<ObjPtr<Var>, ObjPtr<Var>> = HashMap::new();
    let take_scratch = |scratch_n: &mut usize, inst: ObjPtr<Ir>| {
        let reg = SCRATCH_REGS
            .get(*scratch_n)
            .copied()
            .unwrap_or_else(|| panic!("Error: too many spilled operands in `{}`", inst));
        *scratch_n += 1;
        reg
    };

    for var in inst.uses() {
        if var.is_physic() {
            continue;
        }
        if stat.spillings.contains(&var) {
            let reg = take_scratch(&mut scratch_n, inst);
            let reg_var = pool.reg_var(reg);
            out.push(pool.put_inst(load_home(var, reg_var, layout)));
            inst.as_mut().replace_uses(var, reg_var);
            scratch_of.insert(var, reg_var);
            layout.as_mut().note_used_reg(reg);
            config::record_spill(&layout.label, block_name, &format!("reload {}", var.name));
        } else {
            let reg = *stat.dstr.get(&var).unwrap();
            let reg_var = pool.reg_var(reg);
            inst.as_mut().replace_uses(var, reg_var);
            layout.as_mut().note_used_reg(reg);
        }
    }

    let def = inst.def();
    match def {
        Some(def) if !def.is_physic() && stat.spillings.contains(&def) => {
            // 定义与使用是同一个溢出变量时共用暂存寄存器
            let reg_var = match scratch_of.get(&def) {
                Some(reg_var) => *reg_var,
                None => {
                    let reg = take_scratch(&mut scratch_n, inst);
                    layout.as_mut().note_used_reg(reg);
                    pool.reg_var(reg)
                }
            };
            inst.as_mut().replace_def(def, reg_var);
            out.push(inst);
            out.push(pool.put_inst(store_home(def, reg_var, layout)));
            config::record_spill(&layout.label, block_name, &format!("spill {}", def.name));
        }
        Some(def) if !def.is_physic() => {
            let reg = *stat.dstr.get(&def).unwrap();
            inst.as_mut().replace_def(def, pool.reg_var(reg));
            layout.as_mut().note_used_reg(reg);
            out.push(inst);
        }
        _ => out.push(inst),
    }
}

/// 变量的内存家:参数在参数区,其余在临时区,溢出槽首次使用时扩展临时区
fn load_home(var: ObjPtr<Var>, reg_var: ObjPtr<Var>, layout: ObjPtr<FrameLayout>) -> Ir {
    if layout.is_argument(&var.name) {
        Ir::LoadArg {
            dst: Operand::Var(reg_var),
            offset: layout.argument_offset(&var.name),
        }
    } else {
        Ir::LoadTemp {
            dst: Operand::Var(reg_var),
            offset: layout.as_mut().temporary_offset(&var.name),
        }
    }
}

fn store_home(var: ObjPtr<Var>, reg_var: ObjPtr<Var>, layout: ObjPtr<FrameLayout>) -> Ir {
    if layout.is_argument(&var.name) {
        Ir::StoreArg {
            src: Operand::Var(reg_var),
            offset: layout.argument_offset(&var.name),
        }
    } else {
        Ir::StoreTemp {
            src: Operand::Var(reg_var),
            offset: layout.as_mut().temporary_offset(&var.name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allocator::flowgraph::flowgraph_gen;
    use crate::ir::text::parse_ir;

    /// 着色结果上不允许相邻节点同色
    fn assert_no_conflict(ig: &InterferenceGraph, stat: &AllocStat) {
        for var in ig.vars() {
            let reg = match stat.dstr.get(&var) {
                Some(reg) => reg,
                None => continue,
            };
            for neighbor in ig.neighbors(var) {
                if let Some(other) = stat.dstr.get(&neighbor) {
                    assert_ne!(reg, other, "{} vs {}", var.name, neighbor.name);
                }
            }
        }
    }

    #[test]
    fn test_straight_line_no_spill_with_two_regs() {
        let stream = parse_ir("assign, t1, 5\nadd, t2, t1, 1\nreturn, t2, ,\n");
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let mut colorer = Colorer::new(2);
        let stat = colorer.alloc(&[block]);
        assert!(stat.spillings.is_empty());
        let ig = InterferenceGraph::new(&LiveRanges::new(block.as_ref()));
        assert_no_conflict(&ig, &stat);
        // 两个度为1的节点,不同色
        let vars = ig.vars();
        assert_ne!(stat.dstr.get(&vars[0]), stat.dstr.get(&vars[1]));
    }

    #[test]
    fn test_forced_spill_exactly_one() {
        // a,b,c三个变量同时活跃,两个寄存器,恰好溢出一个
        let src = "\
assign, a, 1
assign, b, 2
assign, c, 3
add, a, a, b
add, a, a, c
return, a, ,
";
        let stream = parse_ir(src);
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let mut colorer = Colorer::new(2);
        let stat = colorer.alloc(&[block]);
        assert_eq!(stat.spillings.len(), 1);
        let spilled = stat.spillings.iter().next().unwrap();
        // 使用频度最低的b被选中溢出
        assert_eq!(spilled.name, "b");

        let mut pool = crate::ir::IrPool::new();
        let layout = flows[0].layout;
        let rewritten = rewrite_block(block, &stat, layout, &mut pool, true);
        let text: Vec<String> = rewritten.iter().map(|i| i.to_string()).collect();
        // 定义之后紧跟回存
        let def_at = text
            .iter()
            .position(|l| l.starts_with("assign, $t8, 2"))
            .unwrap();
        assert!(text[def_at + 1].starts_with("store_temp, $t8"));
        // 使用之前紧跟装载
        let use_at = text
            .iter()
            .position(|l| l.contains("add, ") && l.contains("$t8"))
            .unwrap();
        assert!(text[use_at - 1].starts_with("load_temp, $t8"));
        // 输出里不残留符号变量
        for line in text.iter() {
            assert!(!line.contains(" a"), "{}", line);
        }
    }

    #[test]
    fn test_no_adjacent_same_color_bigger_graph() {
        let src = "\
assign, a, 1
assign, b, 2
assign, c, 3
assign, d, 4
add, t1, a, b
add, t2, c, d
add, t3, t1, t2
add, t4, t3, a
return, t4, ,
";
        let stream = parse_ir(src);
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let mut ig = InterferenceGraph::empty();
        ig.add_ranges(&LiveRanges::new(block.as_ref()));
        let mut colorer = Colorer::new(4);
        let stat = colorer.alloc(&[block]);
        assert_no_conflict(&ig, &stat);
    }

    #[test]
    fn test_precolored_register_excluded() {
        // $t0被占用的区间内,与之重叠的符号变量不能拿到$t0
        // ($t0,t1,t2构成三角,$t0预着色,所以调色板至少要三个)
        let src = "\
assign, $t0, 7
assign, t1, 1
add, t2, t1, $t0
return, t2, ,
";
        let stream = parse_ir(src);
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let mut colorer = Colorer::new(3);
        let stat = colorer.alloc(&[block]);
        assert!(stat.spillings.is_empty());
        for (var, reg) in stat.dstr.iter() {
            if !var.is_physic() {
                assert_ne!(reg.get_id(), 8, "{} got $t0", var.name);
            }
        }
    }

    #[test]
    #[should_panic(expected = "too many spilled operands")]
    fn test_scratch_overflow() {
        // 人为把四个变量全标成溢出,一条四操作数的call塞不下三个暂存寄存器
        let src = "\
assign, a, 1
assign, b, 2
assign, c, 3
assign, d, 4
callr, t1, f, a, b, c, d
return, t1, ,
";
        let stream = parse_ir(src);
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let mut stat = AllocStat::new();
        for inst in block.insts.iter() {
            for var in inst.uses() {
                stat.spillings.insert(var);
            }
        }
        let mut pool = crate::ir::IrPool::new();
        rewrite_block(block, &stat, flows[0].layout, &mut pool, false);
    }
}
