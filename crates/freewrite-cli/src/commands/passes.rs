//! Prompt pass commands.

use freewrite_passes::PassKind;

use super::pass_store;

/// List built-in and custom passes with their indices.
pub(crate) fn list() -> miette::Result<()> {
    let store = pass_store()?;

    for (index, pass) in store.passes().iter().enumerate() {
        let kind = match pass.kind {
            PassKind::BuiltIn => "built-in",
            PassKind::Custom => "custom",
        };
        println!("{:>3}  {:<8}  {:<24} {}", index, kind, pass.name, pass.id);
    }

    println!();
    println!("Custom passes file: {}", store.path().display());
    Ok(())
}

pub(crate) fn add(name: &str, prompt: &str) -> miette::Result<()> {
    let mut store = pass_store()?;
    let pass = store
        .add(name, prompt)
        .map_err(|e| miette::miette!("Failed to add pass: {}", e))?;

    println!("Added '{}' ({})", pass.name, pass.id);
    Ok(())
}

pub(crate) fn rm(indices: &[usize]) -> miette::Result<()> {
    let mut store = pass_store()?;
    let removed = store
        .delete(indices)
        .map_err(|e| miette::miette!("Failed to delete passes: {}", e))?;

    for pass in removed {
        println!("Deleted '{}'", pass.name);
    }
    Ok(())
}
