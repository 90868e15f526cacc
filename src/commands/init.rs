use serde_json::json;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::Store;

pub fn run(store: &Store, format: Format) -> Result<()> {
    store.init()?;
    match format {
        Format::Json => output::print_json(&json!({ "database": store.path() }))?,
        _ => eprintln!("Initialized database at {}", store.path().display()),
    }
    Ok(())
}
