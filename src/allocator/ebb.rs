// 扩展基本块:沿着单前驱边连起来的块树
// 树内共用一张冲突图和一次着色,接缝处的值留在寄存器里流动,
// 不像逐块分配那样在每个汇合点都经过内存

use std::collections::HashMap;

use crate::utility::ObjPtr;

use super::flowgraph::{FlowGraph, BB};

/// 根:前驱数不是1的块,或者唯一前驱是虚入口
pub fn is_ebb_root(flow: &FlowGraph, block: ObjPtr<BB>) -> bool {
    block.in_edge.len() != 1 || block.in_edge[0] == flow.entry
}

/// 把函数的真实块按扩展基本块分组
/// 组内成员按原始流顺序排,组按根的首次出现顺序排,保证结果是确定性的
pub fn ebb_groups(flow: &FlowGraph) -> Vec<Vec<ObjPtr<BB>>> {
    let real = &flow.blocks[1..flow.blocks.len() - 1];
    let mut root_of: HashMap<ObjPtr<BB>, ObjPtr<BB>> = HashMap::new();
    for block in real.iter() {
        find_root(flow, *block, &mut root_of);
    }

    let mut order: Vec<ObjPtr<BB>> = Vec::new();
    let mut groups: HashMap<ObjPtr<BB>, Vec<ObjPtr<BB>>> = HashMap::new();
    for block in real.iter() {
        let root = *root_of.get(block).unwrap();
        if !groups.contains_key(&root) {
            order.push(root);
            groups.insert(root, Vec::new());
        }
        groups.get_mut(&root).unwrap().push(*block);
    }
    order
        .into_iter()
        .map(|root| groups.remove(&root).unwrap())
        .collect()
}

/// 沿着唯一前驱链往上走到根,路径上的块全部记下来
/// 不可达的纯单前驱环走不到根,兜一圈回来的时候把起点当根处理
fn find_root(
    flow: &FlowGraph,
    block: ObjPtr<BB>,
    root_of: &mut HashMap<ObjPtr<BB>, ObjPtr<BB>>,
) -> ObjPtr<BB> {
    if let Some(root) = root_of.get(&block) {
        return *root;
    }
    let mut path: Vec<ObjPtr<BB>> = Vec::new();
    let mut cur = block;
    let root = loop {
        if let Some(root) = root_of.get(&cur) {
            break *root;
        }
        if is_ebb_root(flow, cur) || path.contains(&cur) {
            break cur;
        }
        path.push(cur);
        cur = cur.in_edge[0];
    };
    root_of.insert(root, root);
    for b in path {
        root_of.insert(b, root);
    }
    root_of.insert(block, root);
    root
}
