//! `gatehook check` - load plugins and report, without serving

use anyhow::Result;

use gatehook_core::{Gateway, GatewayConfig};

pub async fn run(config: GatewayConfig) -> Result<()> {
    let gateway = Gateway::from_config(&config);
    let ready = gateway.load().await;
    let report = ready.report();

    println!();
    println!("  Manifest: {}", config.manifest.display());
    if let Some(error) = &report.manifest_error {
        println!("  ! {}", error);
    }
    println!("  Declared: {}", report.declared);
    println!();

    for entry in ready.all_entries() {
        let spec = entry.spec();
        println!(
            "  loaded    {:<24} -> {:<12} {}",
            spec.source_ref, spec.target, spec.description
        );
    }
    for spec in &report.disabled {
        println!("  disabled  {:<24} -> {}", spec.source_ref, spec.target);
    }
    for spec in &report.absent {
        println!("  missing   {:<24} -> {}", spec.source_ref, spec.target);
    }
    for failure in &report.failures {
        println!(
            "  failed    {:<24} -> {:<12} {}",
            failure.spec.source_ref, failure.spec.target, failure.error
        );
    }

    let init = gateway.dispatch_init().await;
    println!();
    println!(
        "  Target '{}': {} plugin(s), {} initialized, {} init failure(s)",
        init.target,
        init.plugins,
        init.initialized.len(),
        init.failures.len()
    );
    for failure in &init.failures {
        println!("    {}: {}", failure.plugin, failure.error);
    }
    println!();

    ready.ensure_healthy()?;
    if !init.failures.is_empty() {
        anyhow::bail!("{} plugin(s) failed to initialize", init.failures.len());
    }

    Ok(())
}
