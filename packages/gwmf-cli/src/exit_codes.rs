use gwmf_rs::GwmfError;

pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;

/// Unreadable or malformed inputs are the caller's fault; everything else is a failed run.
pub fn for_error(error: &GwmfError) -> i32 {
    match error {
        GwmfError::IoError(_) | GwmfError::ParseError(_) => INPUT_ERROR,
        _ => EXECUTION_ERROR,
    }
}
