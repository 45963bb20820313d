use std::collections::{HashMap, HashSet};

use crate::ir::frame::FrameLayout;
use crate::ir::operand::Var;
use crate::ir::{Ir, Label};
use crate::utility::{ObjPool, ObjPtr};

/// 基本块:总是一起执行的一段指令
/// 控制流只能从第一条指令进入,从最后一条指令离开
/// 起始标号单独保存,不算在insts之内,重组输出的时候再发出
#[derive(Debug)]
pub struct BB {
    pub label: Option<Label>,
    /// 在原始指令流中的起始下标
    pub start_index: usize,
    pub insts: Vec<ObjPtr<Ir>>,

    pub in_edge: Vec<ObjPtr<BB>>,
    pub out_edge: Vec<ObjPtr<BB>>,

    /// 活跃表,长度为size()+1,live[i]是第i条指令之前的活跃集合
    pub live: Vec<HashSet<ObjPtr<Var>>>,
    pub last_def: HashMap<ObjPtr<Var>, usize>,
    pub last_use: HashMap<ObjPtr<Var>, usize>,
    /// 从前驱继承的变量定义
    pub defs_in: HashSet<ObjPtr<Var>>,
    /// 被后继使用的变量定义
    pub defs_out: HashSet<ObjPtr<Var>>,

    pub built_liveness: bool,
    /// 跨块查询的在途标记,用来发现循环回边
    pub in_resolve: bool,
}

impl BB {
    pub fn new(start_index: usize) -> BB {
        BB {
            label: None,
            start_index,
            insts: Vec::new(),
            in_edge: Vec::new(),
            out_edge: Vec::new(),
            live: Vec::new(),
            last_def: HashMap::new(),
            last_use: HashMap::new(),
            defs_in: HashSet::new(),
            defs_out: HashSet::new(),
            built_liveness: false,
            in_resolve: false,
        }
    }

    pub fn size(&self) -> usize {
        self.insts.len()
    }

    /// 第i条指令之前的活跃集合
    pub fn live_in(&self, i: usize) -> &HashSet<ObjPtr<Var>> {
        &self.live[i]
    }

    /// 第i条指令之后的活跃集合
    pub fn live_out(&self, i: usize) -> &HashSet<ObjPtr<Var>> {
        &self.live[i + 1]
    }

    /// 整个块的出口活跃集合
    pub fn block_out(&self) -> &HashSet<ObjPtr<Var>> {
        &self.live[self.size()]
    }

    pub fn def(&self, i: usize) -> Option<ObjPtr<Var>> {
        self.insts[i].def()
    }

    pub fn uses(&self, i: usize) -> Vec<ObjPtr<Var>> {
        self.insts[i].uses()
    }
}

impl std::fmt::Display for BB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.size() == 0 {
            write!(f, "BB[empty]")?;
        } else {
            write!(
                f,
                "BB[line {}-{}]",
                self.start_index,
                self.start_index + self.size() - 1
            )?;
        }
        match &self.label {
            Some(label) => write!(f, "{}", label),
            None => write!(f, "unnamed"),
        }
    }
}

/// 一个函数的控制流图,块由图自己的内存池持有
/// 前驱后继只是句柄关系,没有所有权,循环回边不会造成所有权环
pub struct FlowGraph {
    pub label: String,
    pub layout: ObjPtr<FrameLayout>,
    pub entry: ObjPtr<BB>,
    pub exit: ObjPtr<BB>,
    /// entry,真实块(按原始顺序),exit
    pub blocks: Vec<ObjPtr<BB>>,
    _pool: ObjPool<BB>,
}

/// 把扁平指令流按跳转/标号边界切成基本块并连边
/// 一个prologue开启一个函数,每个函数得到一张图
/// 任何指令流都能构造出合法的图,不存在失败路径
pub fn flowgraph_gen(insts: &[ObjPtr<Ir>]) -> Vec<FlowGraph> {
    let mut starts: Vec<usize> = Vec::new();
    for (i, inst) in insts.iter().enumerate() {
        if matches!(inst.as_ref(), Ir::Prologue(_)) {
            // 函数入口标号紧跟在函数头之前的话归入该函数
            if i > 0 && matches!(insts[i - 1].as_ref(), Ir::Label(_)) {
                starts.push(i - 1);
            } else {
                starts.push(i);
            }
        }
    }
    if starts.is_empty() {
        panic!("Error: instruction stream has no function prologue");
    }
    starts[0] = 0;

    let mut out = Vec::new();
    for (n, start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(insts.len());
        out.push(build_function(&insts[*start..end], *start));
    }
    out
}

fn build_function(insts: &[ObjPtr<Ir>], offset: usize) -> FlowGraph {
    let layout = insts
        .iter()
        .find_map(|inst| match inst.as_ref() {
            Ir::Prologue(layout) => Some(*layout),
            _ => None,
        })
        .unwrap_or_else(|| panic!("Error: function without prologue at line {}", offset));

    // 首指令,标号处,跳转的后一条指令都是首指令
    let mut leaders: HashSet<usize> = HashSet::new();
    leaders.insert(0);
    for (i, inst) in insts.iter().enumerate() {
        if matches!(inst.as_ref(), Ir::Label(_)) {
            leaders.insert(i);
        }
        if inst.is_jump() && i + 1 < insts.len() {
            leaders.insert(i + 1);
        }
    }
    let mut leaders: Vec<usize> = leaders.into_iter().collect();
    leaders.sort();

    let mut pool: ObjPool<BB> = ObjPool::new();
    let entry = pool.put(BB::new(offset));
    let exit = pool.put(BB::new(offset + insts.len()));

    let mut real: Vec<ObjPtr<BB>> = Vec::new();
    let mut label_map: HashMap<String, ObjPtr<BB>> = HashMap::new();
    for (n, lead) in leaders.iter().enumerate() {
        let end = leaders.get(n + 1).copied().unwrap_or(insts.len());
        let block = pool.put(BB::new(offset + lead));
        let mut body = *lead..end;
        if let Ir::Label(label) = insts[*lead].as_ref() {
            block.as_mut().label = Some(label.clone());
            label_map.insert(label.0.clone(), block);
            body.start += 1;
        }
        for i in body {
            block.as_mut().insts.push(insts[i]);
        }
        real.push(block);
    }

    let add_edge = |from: ObjPtr<BB>, to: ObjPtr<BB>| {
        from.as_mut().out_edge.push(to);
        to.as_mut().in_edge.push(from);
    };

    match real.first() {
        Some(first) => add_edge(entry, *first),
        None => add_edge(entry, exit),
    }
    for (n, block) in real.iter().enumerate() {
        let next = real.get(n + 1).copied().unwrap_or(exit);
        match block.insts.last().map(|inst| inst.as_ref()) {
            Some(Ir::Goto(target)) => {
                add_edge(*block, branch_target(&label_map, target));
            }
            Some(Ir::Branch { target, .. }) => {
                add_edge(*block, branch_target(&label_map, target));
                add_edge(*block, next);
            }
            Some(Ir::Ret { .. }) => add_edge(*block, exit),
            _ => add_edge(*block, next),
        }
    }

    let mut blocks = vec![entry];
    blocks.extend(real);
    blocks.push(exit);

    FlowGraph {
        label: layout.label.clone(),
        layout,
        entry,
        exit,
        blocks,
        _pool: pool,
    }
}

fn branch_target(label_map: &HashMap<String, ObjPtr<BB>>, target: &Label) -> ObjPtr<BB> {
    *label_map
        .get(&target.0)
        .unwrap_or_else(|| panic!("Error: jump to unknown label `{}`", target))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::text::parse_ir;

    #[test]
    fn test_straight_line_single_block() {
        let stream = parse_ir("assign, t1, 5\nadd, t2, t1, 1\nreturn, t2, ,\n");
        let flows = flowgraph_gen(&stream.insts);
        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        // entry + 一个真实块 + exit
        assert_eq!(flow.blocks.len(), 3);
        assert_eq!(flow.entry.size(), 0);
        assert_eq!(flow.exit.size(), 0);
        let block = flow.blocks[1];
        // prologue也算一条指令
        assert_eq!(block.size(), 4);
        assert_eq!(block.out_edge[0], flow.exit);
        assert_eq!(flow.entry.out_edge[0], block);
    }

    #[test]
    fn test_loop_back_edge() {
        let stream = parse_ir(
            "prologue, main\nassign, t1, 0\nloop:\nadd, t1, t1, 1\nbrlt, t1, 10, loop\nreturn, t1, ,\n",
        );
        let flows = flowgraph_gen(&stream.insts);
        let flow = &flows[0];
        // entry, [prologue;assign], loop体, return块, exit
        assert_eq!(flow.blocks.len(), 5);
        let head = flow.blocks[1];
        let body = flow.blocks[2];
        let tail = flow.blocks[3];
        assert_eq!(body.label.as_ref().unwrap().0, "loop");
        // 回边指向自己
        assert!(body.out_edge.contains(&body));
        assert!(body.in_edge.contains(&body));
        assert!(body.in_edge.contains(&head));
        assert!(body.out_edge.contains(&tail));
        assert_eq!(tail.out_edge[0], flow.exit);
    }

    #[test]
    fn test_two_functions() {
        let stream = parse_ir(
            "main:\nprologue, main\ncallr, t1, f, 3\nreturn, t1, ,\nf:\nprologue, f, x\nadd, t1, x, 1\nreturn, t1, ,\n",
        );
        let flows = flowgraph_gen(&stream.insts);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].label, "main");
        assert_eq!(flows[1].label, "f");
        // 每个函数作用域独立,同名t1互不相干
        assert_eq!(flows[0].blocks[1].label.as_ref().unwrap().0, "main");
        assert_eq!(flows[1].blocks[1].start_index, 4);
    }

    #[test]
    #[should_panic(expected = "unknown label")]
    fn test_goto_unknown_label() {
        let stream = parse_ir("goto, nowhere\n");
        flowgraph_gen(&stream.insts);
    }
}
