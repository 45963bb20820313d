use std::collections::{HashMap, LinkedList};
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::ir::operand::PALETTE_MAX;
use crate::log_file;

/// 寄存器分配策略,由配置选定而不是按输入形状推断
/// * naive: 所有变量都在内存里,正确性基线
/// * intrablock: 逐基本块做活跃分析与图着色
/// * global: 沿扩展基本块共享着色决策
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Strategy {
    Naive,
    IntraBlock,
    Global,
}

impl Strategy {
    /// 不认识的策略名是致命的配置错误,直接中止而不是悄悄给默认值
    pub fn from_str(name: &str) -> Strategy {
        match name {
            "naive" => Strategy::Naive,
            "intrablock" => Strategy::IntraBlock,
            "global" => Strategy::Global,
            _ => panic!("Error: unknown allocation strategy `{}`", name),
        }
    }
}

pub struct AllocConfig {
    pub strategy: Strategy,
    /// 调色板大小K,着色可用的物理寄存器个数
    pub reg_count: i32,
}

impl AllocConfig {
    pub fn new(strategy: Strategy, reg_count: i32) -> AllocConfig {
        if reg_count <= 0 || reg_count > PALETTE_MAX {
            panic!("Error: illegal palette size {}", reg_count);
        }
        AllocConfig {
            strategy,
            reg_count,
        }
    }
}

/// 记录需要保存打印的各种信息
/// 统计分配过程产生的各种属性,比如spill数量
/// 信息格式: {函数名}-{块名}-{信息}
struct ConfigInfo {
    src_path: Option<String>,
    file_infos: HashMap<String, LinkedList<String>>,
    times: HashMap<String, i32>,
}

impl ConfigInfo {
    fn new() -> ConfigInfo {
        ConfigInfo {
            src_path: None,
            file_infos: HashMap::new(),
            times: HashMap::new(),
        }
    }
}

lazy_static! {
    static ref CONFIG_INFO: Mutex<ConfigInfo> = Mutex::new(ConfigInfo::new());
}

pub fn set_file_path(path: &str) {
    CONFIG_INFO.lock().unwrap().src_path = Some(path.to_string());
}

pub fn get_file_path() -> Option<String> {
    CONFIG_INFO.lock().unwrap().src_path.clone()
}

/// 每发生一次spill调用一次
pub fn record_spill(func: &str, block: &str, msg: &str) {
    let path = "spill.txt";
    let kind = "spill";
    let mut info = CONFIG_INFO.lock().unwrap();
    let times = info.times.get(&kind.to_string()).unwrap_or(&0) + 1;
    info.times.insert(kind.to_string(), times);
    let msg = format!("{}-{} :{}", func, block, msg);
    info.file_infos
        .entry(path.to_string())
        .or_insert_with(LinkedList::new)
        .push_back(msg);
}

pub fn spill_times() -> i32 {
    *CONFIG_INFO
        .lock()
        .unwrap()
        .times
        .get("spill")
        .unwrap_or(&0)
}

/// 编译结束后把记录的属性打印出来
pub fn dump() {
    let info = CONFIG_INFO.lock().unwrap();
    for (file, infos) in info.file_infos.iter() {
        for msg in infos.iter() {
            log_file!(file, "{}", msg);
        }
    }
    if let Some(path) = info.src_path.as_ref() {
        log_file!("performance_eval.txt", "src_path:{}", path);
    }
    for (kind, times) in info.times.iter() {
        log_file!("performance_eval.txt", "{}\t:{} times", kind, times);
    }
}
