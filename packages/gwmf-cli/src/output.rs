use std::io::Write;
use std::path::Path;

use serde::Serialize;

/// Write JSON to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), json)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: Serialize>(value: &T, compact: bool) -> Result<String, String> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    json.map_err(|e| format!("JSON serialization failed: {}", e))
}

/// Serialize and write in one step, reporting the destination unless quiet.
pub fn emit<T: Serialize>(
    value: &T,
    compact: bool,
    output_path: Option<&str>,
    quiet: bool,
) -> Result<(), String> {
    write_output(&to_json(value, compact)?, output_path)?;
    if let (Some(path), false) = (output_path, quiet) {
        eprintln!("Results written to {}", path);
    }
    Ok(())
}
