//! Enhance command - run the selected model over a text file.

use std::path::Path;

use freewrite_ai::{EngineError, EnhancementResult};
use freewrite_passes::{Pass, PassStore};
use tracing::debug;
use uuid::Uuid;

use super::{engine, model_manager, pass_store};

pub(crate) async fn run(file: &Path, pass: Option<&str>, json: bool) -> miette::Result<()> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| miette::miette!("Failed to read {}: {}", file.display(), e))?;

    let pass = match pass {
        Some(query) => Some(resolve_pass(&pass_store()?, query)?),
        None => None,
    };

    let engine = engine(model_manager()?);

    // Ctrl-C cancels the running generation.
    let canceller = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling...");
                engine.cancel();
            }
        })
    };

    println!("Processing {}...", file.display());
    let outcome = match &pass {
        Some(pass) => engine
            .run_pass(pass, &text)
            .await
            .map(|output| print_pass(pass, &output, json)),
        None => engine
            .process_all_enhancements(&text)
            .await
            .map(|result| print_enhancements(&result, json)),
    };

    canceller.abort();
    engine.unload().await;

    match outcome {
        Ok(printed) => printed,
        Err(e) if e.is_cancelled() => {
            println!("Cancelled; no output.");
            Ok(())
        }
        Err(EngineError::ModelNotFound(reason)) => Err(miette::miette!(
            "No usable model ({}). Download one with: freewrite models pull <id>",
            reason
        )),
        Err(e) => Err(miette::miette!("Enhancement failed: {}", e)),
    }
}

/// Find a pass by id, falling back to a case-insensitive name match.
fn resolve_pass(store: &PassStore, query: &str) -> miette::Result<Pass> {
    let by_id = Uuid::parse_str(query).ok().and_then(|id| store.get(id));
    by_id
        .or_else(|| store.find_by_name(query))
        .cloned()
        .ok_or_else(|| miette::miette!("No pass named or with id '{}'", query))
}

fn print_pass(pass: &Pass, output: &str, json: bool) -> miette::Result<()> {
    if json {
        let value = serde_json::json!({
            "pass_id": pass.id,
            "pass": pass.name,
            "output": output,
        });
        println!("{}", to_pretty(&value)?);
    } else {
        println!();
        println!("== {} ==", pass.name);
        println!("{}", output);
    }
    Ok(())
}

fn print_enhancements(result: &EnhancementResult, json: bool) -> miette::Result<()> {
    if json {
        println!("{}", to_pretty(result)?);
        return Ok(());
    }

    debug!("{} key ideas", result.key_ideas.len());
    println!();
    println!("== Cleaned text ==");
    println!("{}", result.cleaned_text);
    println!();
    println!("== Summary ==");
    println!("{}", result.summary);
    println!();
    println!("== Key ideas ==");
    for idea in &result.key_ideas {
        println!("- {}", idea);
    }
    Ok(())
}

fn to_pretty<T: serde::Serialize + ?Sized>(value: &T) -> miette::Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| miette::miette!("Failed to serialize output: {}", e))
}
