use std::collections::HashMap;

use crate::ir::operand::Var;
use crate::utility::ObjPtr;

use super::flowgraph::BB;

/// 一个块内每个变量的极大连续活跃区间
/// 区间下标对应活跃表的程序点,闭区间,相邻或者相接的区间已经合并
/// 一个变量被多次定义/使用时可能有多个互不相交的区间
pub struct LiveRanges {
    pub ranges: HashMap<ObjPtr<Var>, Vec<(usize, usize)>>,
}

impl LiveRanges {
    /// 要求块上已经算完活跃表
    pub fn new(block: &BB) -> LiveRanges {
        let mut ranges: HashMap<ObjPtr<Var>, Vec<(usize, usize)>> = HashMap::new();
        for i in 0..block.live.len() {
            for var in block.live[i].iter() {
                let intervals = ranges.entry(*var).or_insert_with(Vec::new);
                match intervals.last_mut() {
                    // 与上一个区间相接,直接延长
                    Some((_, end)) if *end + 1 == i => *end = i,
                    Some((_, end)) if *end >= i => {}
                    _ => intervals.push((i, i)),
                }
            }
        }
        LiveRanges { ranges }
    }

    /// 图里的所有变量,按池内序号排序保证确定性
    pub fn vars(&self) -> Vec<ObjPtr<Var>> {
        let mut out: Vec<ObjPtr<Var>> = self.ranges.keys().copied().collect();
        out.sort_by_key(|var| var.get_id());
        out
    }

    /// 两个变量是否在某个程序点同时活跃
    pub fn overlaps(&self, a: ObjPtr<Var>, b: ObjPtr<Var>) -> bool {
        let (ra, rb) = match (self.ranges.get(&a), self.ranges.get(&b)) {
            (Some(ra), Some(rb)) => (ra, rb),
            _ => return false,
        };
        for (s1, e1) in ra.iter() {
            for (s2, e2) in rb.iter() {
                if s1 <= e2 && s2 <= e1 {
                    return true;
                }
            }
        }
        false
    }
}
