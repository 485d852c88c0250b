//! Minimal end-to-end usage: open a logger, get a sink, log a few lines.

use xtr::{Config, LogLevel, Logger, WriteTag};

fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "/tmp/xtr-demo-basic.log".to_string());

    let logger = Logger::open(&path, Config::default()).expect("open logger");
    let sink = logger.get_sink("main").expect("get_sink");

    sink.log(WriteTag::Blocking, LogLevel::Info, "basic.rs:11", "starting up");

    for i in 0..5u32 {
        sink.log_with(WriteTag::Blocking, LogLevel::Info, "basic.rs:14", move |buf| {
            buf.extend_from_slice(b"tick ");
            buf.extend_from_slice(i.to_string().as_bytes());
        });
    }

    sink.set_level(LogLevel::Debug);
    sink.log(WriteTag::Blocking, LogLevel::Debug, "basic.rs:21", "debug logging now enabled");

    sink.sync();
    println!("wrote log lines to {path}");
}
