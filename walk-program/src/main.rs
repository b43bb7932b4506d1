use fpwind::{Backtrace, UnwindConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let registry = tracing_subscriber::Registry::default().with(
        EnvFilter::builder()
            .with_default_directive(tracing::Level::INFO.into())
            .from_env()
            .unwrap(),
    );

    let tree_layer = tracing_tree::HierarchicalLayer::new(2)
        .with_targets(true)
        .with_bracketed_fields(true);

    registry.with(tree_layer).init();

    let config = match UnwindConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(2);
        }
    };

    match outer(&config, 3) {
        Ok(bt) => print!("{bt}"),
        Err(error) => {
            eprintln!("unwinding failed: {error}");
            std::process::exit(1);
        }
    }
}

#[inline(never)]
fn outer(config: &UnwindConfig, depth: u32) -> Result<Backtrace, Box<dyn std::error::Error>> {
    let bt = recurse(config, depth)?;
    std::hint::black_box(&bt);
    Ok(bt)
}

#[inline(never)]
fn recurse(config: &UnwindConfig, depth: u32) -> Result<Backtrace, Box<dyn std::error::Error>> {
    let bt = if depth == 0 {
        here(config)?
    } else {
        recurse(config, depth - 1)?
    };
    std::hint::black_box(depth);
    Ok(bt)
}

#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
#[inline(never)]
fn here(config: &UnwindConfig) -> Result<Backtrace, Box<dyn std::error::Error>> {
    use fpwind::{arch, DladdrResolver, ProcessMemory, Thread, ThreadId, Walker};

    let ctx = arch::capture_context();
    // The captured registers decide the convention; only the depth is
    // configurable here.
    let config = UnwindConfig {
        convention: ctx.convention(),
        ..*config
    };
    let memory = ProcessMemory::current();
    let walker = Walker::with_config(&memory, &config);
    let thread = Thread::new(ThreadId(std::process::id()), ctx);
    Ok(Backtrace::capture(&walker, &thread, &DladdrResolver)?)
}

#[cfg(not(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
)))]
fn here(_config: &UnwindConfig) -> Result<Backtrace, Box<dyn std::error::Error>> {
    Err("walk-program only knows how to capture registers on linux x86_64 and aarch64".into())
}
