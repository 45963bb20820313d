use std::collections::HashMap;

use super::operand::Reg;

/// 记录一个函数在代码生成阶段需要的关键信息
/// 偏移量按首次出现的顺序从0开始递增,对固定的指令顺序是确定性的
#[derive(Debug)]
pub struct FrameLayout {
    pub label: String,
    pub arguments: Vec<String>,

    pub argument_offsets: HashMap<String, i32>,
    pub temporary_offsets: HashMap<String, i32>,
    pub used_reg_offsets: HashMap<Reg, i32>,

    argument_count: i32,
    temporary_count: i32,
    used_reg_count: i32,
}

impl FrameLayout {
    pub fn new(label: &str, arguments: Vec<String>) -> FrameLayout {
        FrameLayout {
            label: label.to_string(),
            arguments,
            argument_offsets: HashMap::new(),
            temporary_offsets: HashMap::new(),
            used_reg_offsets: HashMap::new(),
            argument_count: 0,
            temporary_count: 0,
            used_reg_count: 0,
        }
    }

    /// 按声明顺序给参数分配偏移
    pub fn build_argument_map(&mut self) {
        for arg in self.arguments.clone() {
            if !self.argument_offsets.contains_key(&arg) {
                self.argument_offsets.insert(arg, self.argument_count);
                self.argument_count += 1;
            }
        }
    }

    pub fn is_argument(&self, name: &str) -> bool {
        self.argument_offsets.contains_key(name)
    }

    pub fn argument_offset(&self, name: &str) -> i32 {
        *self.argument_offsets.get(name).unwrap()
    }

    /// 取得临时变量的栈槽,首次遇到时扩展临时区
    pub fn temporary_offset(&mut self, name: &str) -> i32 {
        if let Some(offset) = self.temporary_offsets.get(name) {
            return *offset;
        }
        let offset = self.temporary_count;
        self.temporary_offsets.insert(name.to_string(), offset);
        self.temporary_count += 1;
        offset
    }

    /// 记录函数内使用到的物理寄存器,供序言/尾声的保存恢复使用
    pub fn note_used_reg(&mut self, reg: Reg) {
        if !self.used_reg_offsets.contains_key(&reg) {
            self.used_reg_offsets.insert(reg, self.used_reg_count);
            self.used_reg_count += 1;
        }
    }

    pub fn temporary_count(&self) -> i32 {
        self.temporary_count
    }
}
