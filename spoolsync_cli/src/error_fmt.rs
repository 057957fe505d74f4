//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use spoolsync_core::{BuildError, EngineError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(ee) = err.downcast_ref::<EngineError>() {
        if let EngineError::ConflictingAssignment {
            serial,
            unit_id,
            slot_index,
        } = ee
        {
            return format!(
                "What happened: Slot {serial}/{unit_id}/{slot_index} already has an assignment in progress.\nLikely causes: A previous insert flow is still waiting for the printer.\nHow to fix: Wait for it to resolve, or cancel it first."
            );
        }
        return format!(
            "What happened: {ee}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config; the
    // alternate format includes the whole wrap chain.
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("hx711") || lower.contains("data-ready") {
        return "What happened: The load cell did not produce data within the configured timeout.\nLikely causes: Wrong DT/SCK pins, wiring/power issues, or timeout configured too low.\nHow to fix: Check [pins] in the config, verify 5V/GND, and raise hardware.sensor_read_timeout_ms.".to_string();
    }

    if lower.contains("tag bridge") {
        return "What happened: The tag-reader bridge is not responding on I2C.\nLikely causes: Bridge not powered, wrong bus, or firmware not flashed.\nHow to fix: Verify the I2C wiring and that the bridge answers at address 0x55.".to_string();
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,grams'.".to_string();
    }

    if lower.contains("must be") || lower.contains("unreasonably large") {
        return format!(
            "What happened: Configuration is invalid.\nDetail: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: conflicts are retryable (2), everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use spoolsync_core::EngineError;
    if matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ConflictingAssignment { .. })
    ) {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    use spoolsync_core::EngineError;

    let reason = match err.downcast_ref::<EngineError>() {
        Some(EngineError::ConflictingAssignment { .. }) => "ConflictingAssignment",
        Some(_) => "EngineError",
        None => "Error",
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
