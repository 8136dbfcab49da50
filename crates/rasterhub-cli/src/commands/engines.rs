//! Engines command: availability, default choice, backend binary and benchmarks.

use anyhow::{bail, Result};
use rasterhub_dispatch::discovery::{find_binary, searched_locations};
use rasterhub_dispatch::select::benchmark_settings;
use rasterhub_dispatch::{
    benchmark_engines, default_engine, default_pool, describe_available_engines,
    validate_engine_request,
};

use crate::cli::EnginesArgs;

pub fn run(args: &EnginesArgs) -> Result<()> {
    let pool = default_pool();
    let registry = pool.registry();

    if let Some(requested) = &args.check {
        let check = validate_engine_request(registry, requested);
        println!("{}", check.message);
        if !check.ok {
            bail!("engine '{requested}' cannot be used");
        }
        return Ok(());
    }

    println!("Rasterhub v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Engines:");
    for name in registry.names() {
        let mark = if registry.is_available(name) {
            "available"
        } else {
            "unavailable"
        };
        println!("  {name:<12} {mark}");
    }
    println!();
    match default_engine(registry) {
        Ok(name) => println!("Default: {name}"),
        Err(e) => println!("Default: none ({e})"),
    }
    println!("Available: {}", describe_available_engines(registry));
    match find_binary() {
        Some(path) => println!("Binary: {}", path.display()),
        None => println!("Binary: not found (searched {})", searched_locations().join("; ")),
    }

    if let Some(font) = &args.bench_font {
        println!();
        println!("Benchmark ({} iterations):", args.iterations);
        let settings = benchmark_settings(font);
        let results = benchmark_engines(pool, "Hamburgefonstiv", &settings, None, args.iterations)?;
        for result in results {
            println!("  {:<12} {:>9.3} ms", result.engine, result.per_iteration_ms());
        }
    }
    Ok(())
}
