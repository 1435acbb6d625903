// leakless: buffer lifecycle demonstrator

use std::io::{self, Write};

use log::{debug, info, warn};

use leakless::demo::corrected;
use leakless::memory::Allocator;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let alloc = Allocator::default();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Err(e) = corrected::run(&alloc, &mut out).and_then(|()| Ok(out.flush()?)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let stats = alloc.stats();
    info!(
        "{} allocations, {} releases, {} bytes allocated",
        stats.allocations, stats.releases, stats.bytes_allocated
    );
    if !stats.is_balanced() {
        warn!(
            "{} bytes in {} blocks still live at exit",
            stats.live_bytes, stats.live_blocks
        );
    }
    debug!("heap summary:\n{}", alloc.render_summary());
}
