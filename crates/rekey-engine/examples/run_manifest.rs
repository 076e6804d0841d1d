use std::path::PathBuf;

use rekey_engine::{RunOptions, run_manifest};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let manifest = args
        .next()
        .map(PathBuf::from)
        .ok_or("usage: run_manifest <MANIFEST> [OUT_DIR]")?;
    let options = RunOptions {
        out_dir: args.next().map(PathBuf::from),
        logger: None,
    };

    tracing_subscriber::fmt().with_target(false).init();
    let run = run_manifest(&manifest, None, &options)?;
    println!("{}", serde_json::to_string_pretty(&run.report)?);
    Ok(())
}
