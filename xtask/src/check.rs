use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

/// Target the streaming crates must keep building for.
const FIRMWARE_TARGET: &str = "thumbv7em-none-eabihf";

/// One `cargo` invocation and how much its failure matters.
struct Step {
    label: &'static str,
    args: &'static [&'static str],
    /// Failures are shown but do not fail the run.
    advisory: bool,
    hint: Option<&'static str>,
}

const STEPS: &[Step] = &[
    Step {
        label: "platform (no_std, defmt)",
        args: &[
            "check",
            "-p",
            "platform",
            "--target",
            FIRMWARE_TARGET,
            "--no-default-features",
            "--features",
            "defmt",
        ],
        advisory: false,
        hint: None,
    },
    Step {
        label: "playback (no_std, defmt)",
        args: &[
            "check",
            "-p",
            "playback",
            "--target",
            FIRMWARE_TARGET,
            "--no-default-features",
            "--features",
            "defmt",
        ],
        advisory: false,
        hint: None,
    },
    Step {
        label: "host build (std, tracing)",
        args: &["check", "-p", "playback", "--features", "std,tracing"],
        advisory: false,
        hint: None,
    },
    Step {
        label: "clippy",
        args: &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        advisory: true,
        hint: None,
    },
    Step {
        label: "formatting",
        args: &["fmt", "--all", "--check"],
        advisory: true,
        hint: Some("Run 'cargo fmt --all' to fix"),
    },
];

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking audio engine builds...".cyan().bold());
    println!();

    let total_start = Instant::now();
    for step in STEPS {
        run_step(step)?;
    }

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}

fn run_step(step: &Step) -> Result<()> {
    println!("{}", format!("  Checking {}...", step.label).cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(step.args)
        .output()
        .with_context(|| format!("Failed to run {}", step.label))?;

    if output.status.success() {
        println!(
            "{}",
            format!(
                "  ✓ {} passed in {:.2}s",
                step.label,
                start.elapsed().as_secs_f64()
            )
            .green()
        );
    } else if step.advisory {
        eprintln!("{}", format!("  ⚠ {} reported issues", step.label).yellow().bold());
        if let Some(hint) = step.hint {
            eprintln!("     {hint}");
        } else {
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        }
    } else {
        eprintln!("{}", format!("  ✗ {} failed", step.label).red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        anyhow::bail!("{} check failed", step.label);
    }
    println!();
    Ok(())
}
