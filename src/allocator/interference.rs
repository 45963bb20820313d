use std::collections::{HashMap, HashSet};

use crate::ir::operand::Var;
use crate::utility::ObjPtr;

use super::live_range::LiveRanges;

/// 冲突图:两个活跃区间在某个程序点重叠,它们之间就有一条无向边
/// 节点带着变量身份,物理寄存器变量也作为(预着色)节点参与,
/// 这样与之重叠的符号变量就不会被分到同一个寄存器
/// 每个块(或者扩展基本块)新建一张图,着色之后即丢弃
pub struct InterferenceGraph {
    pub graph: HashMap<ObjPtr<Var>, HashSet<ObjPtr<Var>>>,
}

impl InterferenceGraph {
    pub fn empty() -> InterferenceGraph {
        InterferenceGraph {
            graph: HashMap::new(),
        }
    }

    pub fn new(ranges: &LiveRanges) -> InterferenceGraph {
        let mut out = InterferenceGraph::empty();
        out.add_ranges(ranges);
        out
    }

    /// 把一个块的活跃区间并入图中,扩展基本块的成员共用一张图
    pub fn add_ranges(&mut self, ranges: &LiveRanges) {
        let vars = ranges.vars();
        for var in vars.iter() {
            self.graph.entry(*var).or_insert_with(HashSet::new);
        }
        for (n, a) in vars.iter().enumerate() {
            for b in vars[n + 1..].iter() {
                // 自冲突不存在,同一个变量的多个区间属于同一个节点
                if ranges.overlaps(*a, *b) {
                    self.graph.get_mut(a).unwrap().insert(*b);
                    self.graph.get_mut(b).unwrap().insert(*a);
                }
            }
        }
    }

    pub fn degree(&self, var: ObjPtr<Var>) -> usize {
        self.graph.get(&var).map(|n| n.len()).unwrap_or(0)
    }

    /// 按池内序号排序的邻接表
    pub fn neighbors(&self, var: ObjPtr<Var>) -> Vec<ObjPtr<Var>> {
        let mut out: Vec<ObjPtr<Var>> = match self.graph.get(&var) {
            Some(set) => set.iter().copied().collect(),
            None => Vec::new(),
        };
        out.sort_by_key(|v| v.get_id());
        out
    }

    pub fn vars(&self) -> Vec<ObjPtr<Var>> {
        let mut out: Vec<ObjPtr<Var>> = self.graph.keys().copied().collect();
        out.sort_by_key(|v| v.get_id());
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allocator::flowgraph::flowgraph_gen;
    use crate::allocator::live_range::LiveRanges;
    use crate::ir::text::parse_ir;

    #[test]
    fn test_straight_line_graph() {
        // t1与t2只在add一条指令处冲突,度各为1
        let stream = parse_ir("assign, t1, 5\nadd, t2, t1, 1\nreturn, t2, ,\n");
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let ranges = LiveRanges::new(block.as_ref());
        let ig = InterferenceGraph::new(&ranges);
        let vars = ig.vars();
        assert_eq!(vars.len(), 2);
        assert_eq!(ig.degree(vars[0]), 1);
        assert_eq!(ig.degree(vars[1]), 1);
        assert_eq!(ig.neighbors(vars[0]), vec![vars[1]]);
    }

    #[test]
    fn test_three_way_clique() {
        let stream = parse_ir(
            "assign, a, 1\nassign, b, 2\nassign, c, 3\nadd, a, a, b\nadd, a, a, c\nreturn, a, ,\n",
        );
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let ig = InterferenceGraph::new(&LiveRanges::new(block.as_ref()));
        // a,b,c两两同时活跃,构成三角
        for var in ig.vars() {
            assert_eq!(ig.degree(var), 2, "{}", var.name);
        }
    }

    #[test]
    fn test_physical_register_participates() {
        // 被调用约定固定在$t0上的变量与重叠的符号变量冲突
        let stream = parse_ir("assign, $t0, 1\nassign, t1, 2\nadd, t2, t1, $t0\nreturn, t2, ,\n");
        let flows = flowgraph_gen(&stream.insts);
        flows[0].calc_liveness();
        let block = flows[0].blocks[1];
        let ig = InterferenceGraph::new(&LiveRanges::new(block.as_ref()));
        let t0 = ig.vars().into_iter().find(|v| v.is_physic()).unwrap();
        let t1 = ig.vars().into_iter().find(|v| v.name == "t1").unwrap();
        assert!(ig.neighbors(t0).contains(&t1));
    }
}
