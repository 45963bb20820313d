use std::collections::HashSet;

use crate::ir::frame::FrameLayout;
use crate::ir::operand::Var;
use crate::ir::Ir;
use crate::log;
use crate::utility::ObjPtr;

use super::flowgraph::{FlowGraph, BB};

/// 活跃分析
///
/// 跨块的递归拉取只负责块边界事实(defs_in/defs_out,流经变量整块保守放大,
/// 循环携带变量的标记);块内的后向不动点以边界事实为种子,给出按指令粒度的
/// 活跃表,活跃区间提取以不动点的结果为准
impl FlowGraph {
    pub fn calc_liveness(&self) {
        let mut orphans: Vec<(ObjPtr<BB>, Vec<ObjPtr<Var>>)> = Vec::new();
        for block in self.blocks.iter() {
            block.as_mut().init_liveness();
        }
        for block in self.blocks.iter() {
            let found = block.as_mut().scan_block(self.layout);
            if !found.is_empty() {
                orphans.push((*block, found));
            }
        }
        for (block, vars) in orphans {
            for var in vars {
                resolve_from_preds(block, var);
            }
        }
        for block in self.blocks.iter() {
            block.as_mut().calc_fixpoint();
            block.as_mut().seed_def_points();
        }

        log!("liveness of func {}:", self.label);
        for block in self.blocks.iter() {
            if block.size() == 0 {
                continue;
            }
            log!(
                "{}: in:{:?} out:{:?}",
                block.as_ref(),
                block.live[0].iter().map(|v| &v.name).collect::<Vec<_>>(),
                block.block_out().iter().map(|v| &v.name).collect::<Vec<_>>()
            );
        }
    }
}

impl BB {
    pub fn init_liveness(&mut self) {
        if self.live.is_empty() {
            for _ in 0..=self.size() {
                self.live.push(HashSet::new());
            }
        }
    }

    /// 块内前向扫描:记录每个变量最后的定义/使用位置,标记块内活跃范围
    /// 返回块内没有定义就被使用的变量,等待从前驱拉取
    pub fn scan_block(&mut self, layout: ObjPtr<FrameLayout>) -> Vec<ObjPtr<Var>> {
        if self.built_liveness {
            return Vec::new();
        }
        self.built_liveness = true;
        let mut orphans: Vec<ObjPtr<Var>> = Vec::new();
        for i in 0..self.size() {
            // 一条指令先读后写:use看到的是本指令之前的定义
            // (use与def同属一条指令时,use读的是上一轮的值,比如循环里的t = t + 1)
            for var in self.uses(i) {
                let start = match self.defined_at(var, layout) {
                    Some(d) => d + 1,
                    None => {
                        // 物理寄存器由机器上下文定义(比如调用约定),
                        // 不从前驱拉取,也不算未初始化
                        if !var.is_physic() {
                            if !orphans.contains(&var) && !self.defs_in.contains(&var) {
                                orphans.push(var);
                            }
                            self.defs_in.insert(var);
                        }
                        0
                    }
                };
                for j in start..=i {
                    self.live[j].insert(var);
                }
                self.last_use.insert(var, i);
            }
            if let Some(def) = self.def(i) {
                self.last_def.insert(def, i);
                self.last_use.insert(def, i);
            }
        }
        orphans
    }

    /// 变量在本块内的定义位置
    /// 函数参数由函数头在它所在的下标处定义
    fn defined_at(&self, var: ObjPtr<Var>, layout: ObjPtr<FrameLayout>) -> Option<usize> {
        if let Some(i) = self.last_def.get(&var) {
            return Some(*i);
        }
        if var.is_named() && layout.is_argument(&var.name) {
            for (i, inst) in self.insts.iter().enumerate() {
                if matches!(inst.as_ref(), Ir::Prologue(_)) {
                    return Some(i);
                }
            }
        }
        None
    }

    /// 后继需要本块提供var:把活跃范围从最后一次使用延长到块尾
    fn supply_to_end(&mut self, var: ObjPtr<Var>) {
        let from = self.last_use.get(&var).map(|i| i + 1).unwrap_or(0);
        for j in from..=self.size() {
            self.live[j].insert(var);
        }
        if self.size() > 0 {
            self.last_use.insert(var, self.size() - 1);
        }
        self.defs_out.insert(var);
    }

    /// 变量流经整个块(或者是循环携带变量):整块活跃
    fn live_whole_block(&mut self, var: ObjPtr<Var>) {
        for j in 0..=self.size() {
            self.live[j].insert(var);
        }
        if self.size() > 0 {
            self.last_use.insert(var, self.size() - 1);
        }
        self.defs_in.insert(var);
        self.defs_out.insert(var);
    }

    /// 块内后向不动点: in(i) = (out(i) − def(i)) ∪ use(i)
    /// 集合只增不减,至多size()趟收敛
    pub fn calc_fixpoint(&mut self) {
        loop {
            let mut changes = false;
            for i in (0..self.size()).rev() {
                let mut additions: HashSet<ObjPtr<Var>> = self.live[i + 1].clone();
                if let Some(def) = self.def(i) {
                    additions.remove(&def);
                }
                for var in self.uses(i) {
                    additions.insert(var);
                }
                if !additions.is_subset(&self.live[i]) {
                    changes = true;
                    self.live[i].extend(additions);
                }
            }
            if !changes {
                break;
            }
        }
    }

    /// 不动点收敛之后把每个定义点标进活跃表:活跃区间从定义它的指令开始
    /// (这让def与该处正活跃的变量发生冲突;死定义也占据它自己的一个点)
    /// 种子在不动点之后落表,不会被反向传播放大
    pub fn seed_def_points(&mut self) {
        for i in 0..self.size() {
            if let Some(def) = self.def(i) {
                self.live[i].insert(def);
            }
        }
    }
}

/// 把一个块内无定义就被使用的变量从前驱中拉取出来
///
/// 显式栈上的深度优先搜索,而不是递归:前驱链可能很长,而且图里有环
/// 命中在途标记说明走到了循环回边,变量是循环携带的,所在块整块活跃
/// 一条前驱链走到了既没有前驱也没有定义的块,说明IR在上游就坏了,直接中止
fn resolve_from_preds(start: ObjPtr<BB>, var: ObjPtr<Var>) {
    if start.in_edge.is_empty() {
        panic!("Error: {} is used without initialization", var.name);
    }
    start.as_mut().in_resolve = true;

    let mut visited: HashSet<ObjPtr<BB>> = HashSet::new();
    let mut stack: Vec<ObjPtr<BB>> = Vec::new();
    for pred in start.in_edge.iter().rev() {
        stack.push(*pred);
    }
    while let Some(block) = stack.pop() {
        if block.in_resolve {
            // 循环回边,查询的起点自己也要整块活跃
            block.as_mut().live_whole_block(var);
            continue;
        }
        if visited.contains(&block) {
            continue;
        }
        visited.insert(block);

        // 已经因为别的后继延长过了,常数时间回答
        if block.defs_out.contains(&var) {
            continue;
        }
        if block.has_definition(var) {
            block.as_mut().supply_to_end(var);
            continue;
        }
        if block.in_edge.is_empty() {
            panic!("Error: {} is used without initialization", var.name);
        }
        // 本块没有定义,整块保守放大,继续向前驱找
        block.as_mut().live_whole_block(var);
        for pred in block.in_edge.iter().rev() {
            stack.push(*pred);
        }
    }
    start.as_mut().in_resolve = false;
}

impl BB {
    /// 本块是否定义了var(包括函数头定义的参数)
    fn has_definition(&self, var: ObjPtr<Var>) -> bool {
        if self.last_def.contains_key(&var) {
            return true;
        }
        if var.is_named() {
            for inst in self.insts.iter() {
                if let Ir::Prologue(layout) = inst.as_ref() {
                    return layout.is_argument(&var.name);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allocator::flowgraph::flowgraph_gen;
    use crate::ir::text::parse_ir;

    fn names(set: &HashSet<ObjPtr<Var>>) -> Vec<String> {
        let mut out: Vec<String> = set.iter().map(|v| v.name.clone()).collect();
        out.sort();
        out
    }

    #[test]
    fn test_straight_line_liveness() {
        let stream = parse_ir("assign, t1, 5\nadd, t2, t1, 1\nreturn, t2, ,\n");
        let flows = flowgraph_gen(&stream.insts);
        let flow = &flows[0];
        flow.calc_liveness();
        let block = flow.blocks[1];
        // 指令: prologue, assign, add, return
        // t1在它的定义处开始活跃,到add处被最后一次使用
        assert_eq!(names(&block.live[1]), vec!["t1"]);
        assert_eq!(names(&block.live[2]), vec!["t1", "t2"]);
        assert_eq!(names(&block.live[3]), vec!["t2"]);
        // 出口活跃集合为空
        assert!(block.block_out().is_empty());
    }

    #[test]
    fn test_use_in_live_before_set() {
        // 活跃性可靠性: 每条指令读取的变量都出现在它之前的活跃集合里
        let stream = parse_ir(
            "prologue, main\nassign, t1, 1\nassign, t2, 2\nadd, t3, t1, t2\nmult, t4, t3, t1\nreturn, t4, ,\n",
        );
        let flows = flowgraph_gen(&stream.insts);
        let flow = &flows[0];
        flow.calc_liveness();
        for block in flow.blocks.iter() {
            for i in 0..block.size() {
                for var in block.uses(i) {
                    assert!(
                        block.live_in(i).contains(&var),
                        "use {} not live before inst {}",
                        var.name,
                        i
                    );
                }
            }
        }
    }

    #[test]
    fn test_cross_block_pull() {
        // t1在第一个块定义,跨过中间块在最后一个块使用
        let stream = parse_ir(
            "prologue, main\nassign, t1, 7\nassign, t2, 0\nmid:\nadd, t2, t2, 1\nlast:\nadd, t3, t2, t1\nreturn, t3, ,\n",
        );
        let flows = flowgraph_gen(&stream.insts);
        let flow = &flows[0];
        flow.calc_liveness();
        let head = flow.blocks[1];
        let mid = flow.blocks[2];
        let last = flow.blocks[3];
        // 提供者块延长到块尾
        assert!(head.block_out().iter().any(|v| v.name == "t1"));
        // 流经的块整块活跃
        for i in 0..=mid.size() {
            assert!(mid.live[i].iter().any(|v| v.name == "t1"));
        }
        // 使用的块从入口活跃到使用处
        assert!(last.live[0].iter().any(|v| v.name == "t1"));
        assert!(last.defs_in.iter().any(|v| v.name == "t1"));
    }

    #[test]
    fn test_loop_carried_liveness() {
        // 回边把循环携带变量放大到环上每个块的每条指令
        let stream = parse_ir(
            "prologue, main\nassign, t1, 10\nassign, t2, 0\nloop:\nadd, t2, t2, t1\nbrlt, t2, 100, loop\nreturn, t2, ,\n",
        );
        let flows = flowgraph_gen(&stream.insts);
        let flow = &flows[0];
        flow.calc_liveness();
        let body = flow.blocks[2];
        assert_eq!(body.label.as_ref().unwrap().0, "loop");
        // t1与t2在循环体每个程序点都活跃
        for i in 0..=body.size() {
            assert!(body.live[i].iter().any(|v| v.name == "t1"), "t1 at {}", i);
            assert!(body.live[i].iter().any(|v| v.name == "t2"), "t2 at {}", i);
        }
        // t2是循环携带变量,回边让它在块出口也活跃
        assert!(body.block_out().iter().any(|v| v.name == "t2"));
    }

    #[test]
    fn test_argument_defined_by_prologue() {
        let stream = parse_ir("prologue, f, x\nadd, t1, x, 1\nreturn, t1, ,\n");
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        // 参数由函数头定义,不会报未初始化
        let block = flows[0].blocks[1];
        assert!(block.live[1].iter().any(|v| v.name == "x"));
    }

    #[test]
    #[should_panic(expected = "is used without initialization")]
    fn test_use_without_init() {
        let stream = parse_ir("prologue, main\nadd, t1, t9, 1\nreturn, t1, ,\n");
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
    }
}
