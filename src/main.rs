use tigerlib::allocator;
use tigerlib::config::{self, AllocConfig, Strategy};
use tigerlib::ir::text::{parse_ir, write_ir};

fn main() {
    run_main();
}

fn run_main() {
    // ---------------------测试代码---------------------
    #[cfg(debug_assertions)]
    {
        use std::env;
        env::set_var("RUST_BACKTRACE", "1");
        println!("debug mode");
    }
    // --------------------------------------------------
    use clap::{App, Arg};
    // 获取命令行解析
    let matches = App::new("tigerc")
        .arg(Arg::with_name("filename").required(true))
        .arg(Arg::with_name("alloc").short("a").takes_value(true))
        .arg(Arg::with_name("regs").short("k").takes_value(true))
        .arg(Arg::with_name("o").short("o").takes_value(true))
        .get_matches();

    // 获取文件名
    let filename = matches.value_of("filename").unwrap();
    config::set_file_path(filename);

    // 分配策略与调色板大小
    let strategy = Strategy::from_str(matches.value_of("alloc").unwrap_or("intrablock"));
    let regs = matches.value_of("regs").unwrap_or("8");
    let regs: i32 = regs
        .parse()
        .unwrap_or_else(|_| panic!("Error: illegal palette size {}", regs));
    // 输出文件名
    let output = matches.value_of("o").unwrap_or("testcase.ir");

    // 读取文件
    let file = std::fs::read_to_string(filename).unwrap();

    let mut stream = parse_ir(&file);

    let alloc_config = AllocConfig::new(strategy, regs);
    let out = allocator::allocate(&mut stream, &alloc_config);

    std::fs::write(output, write_ir(&out)).unwrap();

    // 编译结束后打印记录的属性
    config::dump();
}
