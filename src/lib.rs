pub mod format;
pub mod frontmatter;
pub mod measure;
pub mod migrate;
pub mod registry;
pub mod settings;
pub mod size;
pub mod sync;
pub mod vault;

use wasm_bindgen::prelude::*;

use migrate::discourse_node_migrations;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Validate a node title format, throwing the reason it is invalid
#[wasm_bindgen(js_name = "validateNodeFormat")]
pub fn validate_node_format(format: &str) -> Result<(), String> {
    format::validate_node_format(format).map_err(|e| e.to_string())
}

#[wasm_bindgen(js_name = "extractContentFromTitle")]
pub fn extract_content_from_title(format: &str, title: &str) -> String {
    format::extract_content_from_title(format, title)
}

/// Upgrade the discourse node shapes of a canvas snapshot to the latest
/// schema version
#[wasm_bindgen(js_name = "migrateCanvas")]
pub fn migrate_canvas(snapshot: &str) -> Result<String, String> {
    let (json, _report) = discourse_node_migrations()
        .migrate_snapshot_json(snapshot)
        .map_err(|e| e.to_string())?;
    Ok(json)
}
