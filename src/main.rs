use caffeinec::PackageCache;
use miette::{miette, IntoDiagnostic, Result};
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() -> Result<()> {
    let path = env::args()
        .nth(1)
        .ok_or_else(|| miette!("usage: caffeinec <file.cffc>"))?;
    let path = PathBuf::from(path);

    let unit = caffeinec::compile_file(&path, PackageCache::default())?;

    let output = format!("{}.ll", path.display());
    fs::write(&output, unit.module.to_string()).into_diagnostic()?;

    println!("wrote {}", output);
    for import in &unit.required_imports {
        println!("requires {}", import);
    }
    Ok(())
}
