//! Builds a tiny three-method application, instruments it, runs it, and
//! leaves per-thread trace files behind.
//!
//! Run:
//!   cargo run --example nested-calls
//! Then inspect:
//!   cat trace-out/thread_*.txt

use anyhow::Result;
use graft::config::TraceConfig;
use graft::engine::Transformer;
use graft::logger;
use graft::runtime::Runtime;
use graft_common::UnitBuilder;

fn main() -> Result<()> {
    env_logger::init();

    let config = TraceConfig::new(vec!["com.demo".to_string()]);
    logger::init(config.output_dir())?;

    let rt = Runtime::new(Transformer::from_config(&config));

    let app = UnitBuilder::new("com.demo.App")
        .method("main()", |m| {
            m.work(50)
                .call("com.demo.App.step()")
                .spawn("com.demo.App.background()")
                .work(20)
        })
        .method("step()", |m| m.work(80).call("com.demo.App.leaf()"))
        .method("leaf()", |m| m.work(10))
        .method("background()", |m| m.work(40))
        .build();

    rt.load("com.demo.App", &app.encode())?;
    rt.invoke("com.demo.App.main()")?;
    rt.join_spawned();

    println!("trace files written to ./trace-out");
    Ok(())
}
