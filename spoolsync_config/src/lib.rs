#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and load-cell calibration parsing for the spool sync stack.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and fits a linear raw→grams
//!   model from two or more reference points.
use serde::Deserialize;

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,grams
///
/// Example:
/// raw,grams
/// 842913,0.0
/// 1024913,100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub grams: f32,
}

/// Staging tracker knobs. The TTL is deliberately long (minutes-order) so a
/// user can carry a spool off the sensor briefly without losing the staged
/// state.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct StagingCfg {
    /// Seconds a staged tag survives continuous absence before auto-expiry.
    pub ttl_secs: u64,
    /// Seconds a manually cleared tag is blocked from immediate re-staging.
    pub block_secs: u64,
}

impl Default for StagingCfg {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            block_secs: 5,
        }
    }
}

/// Weight-sample filter knobs.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FilterCfg {
    /// Absolute tolerance in grams; consecutive samples within it count as settled.
    pub tolerance_g: f32,
    /// Minimum settle window in milliseconds before stability is declared.
    pub window_ms: u64,
    /// Sampling rate in Hz (paces the source pump).
    pub sample_rate_hz: u32,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            tolerance_g: 1.0,
            window_ms: 800,
            sample_rate_hz: 10,
        }
    }
}

/// Slot-assignment protocol knobs.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct AssignmentCfg {
    /// Seconds before an unconfirmed assignment resolves as timeout.
    pub timeout_secs: u64,
}

impl Default for AssignmentCfg {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// UI-side presentation timer knobs.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PresentationCfg {
    /// Grace period in milliseconds the last spool stays visible after
    /// staging clears.
    pub hold_ms: u64,
    /// Flicker shorter than this does not restart the hold countdown.
    pub debounce_ms: u64,
}

impl Default for PresentationCfg {
    fn default() -> Self {
        Self {
            hold_ms: 4000,
            debounce_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Timeouts {
    /// Per-read source timeout (ms). Also accepts alias "sensor_ms".
    #[serde(alias = "sensor_ms")]
    pub sample_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { sample_ms: 150 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for load-cell data-ready before failing a read
    pub sensor_read_timeout_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 150,
        }
    }
}

/// GPIO wiring for the load cell; only needed with the `hardware` feature.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub pins: Option<Pins>,
    #[serde(default)]
    pub staging: StagingCfg,
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default)]
    pub assignment: AssignmentCfg,
    #[serde(default)]
    pub presentation: PresentationCfg,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub hardware: Hardware,
    /// Optional persisted load-cell calibration; preferred over CSV at runtime.
    #[serde(default)]
    pub calibration: Option<PersistedCalibration>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PersistedCalibration {
    /// grams per count
    pub gain_g_per_count: f32,
    /// tare zero in raw counts
    pub zero_counts: i32,
    /// additive offset in grams (rarely needed; default 0.0)
    #[serde(default)]
    pub offset_g: f32,
}

impl From<PersistedCalibration> for Calibration {
    fn from(p: PersistedCalibration) -> Self {
        Calibration {
            zero_counts: p.zero_counts,
            gain_g_per_count: p.gain_g_per_count,
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Staging
        if self.staging.ttl_secs == 0 {
            eyre::bail!("staging.ttl_secs must be >= 1");
        }
        if self.staging.ttl_secs > 24 * 60 * 60 {
            eyre::bail!("staging.ttl_secs is unreasonably large (>24h)");
        }

        // Filter
        if !self.filter.tolerance_g.is_finite() || self.filter.tolerance_g <= 0.0 {
            eyre::bail!("filter.tolerance_g must be finite and > 0");
        }
        if self.filter.window_ms == 0 {
            eyre::bail!("filter.window_ms must be >= 1");
        }
        if self.filter.sample_rate_hz == 0 {
            eyre::bail!("filter.sample_rate_hz must be > 0");
        }

        // Assignment
        if self.assignment.timeout_secs == 0 {
            eyre::bail!("assignment.timeout_secs must be >= 1");
        }
        if self.assignment.timeout_secs > 60 * 60 {
            eyre::bail!("assignment.timeout_secs is unreasonably large (>1h)");
        }

        // Presentation
        if self.presentation.debounce_ms > self.presentation.hold_ms {
            eyre::bail!("presentation.debounce_ms must not exceed presentation.hold_ms");
        }

        // Timeouts
        if self.timeouts.sample_ms == 0 {
            eyre::bail!("timeouts.sample_ms must be >= 1");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }

        // Calibration
        if let Some(cal) = &self.calibration {
            if !cal.gain_g_per_count.is_finite() || cal.gain_g_per_count == 0.0 {
                eyre::bail!("calibration.gain_g_per_count must be finite and non-zero");
            }
            if !cal.offset_g.is_finite() {
                eyre::bail!("calibration.offset_g must be finite");
            }
        }

        Ok(())
    }
}

/// Linear load-cell calibration: grams = gain_g_per_count * (raw - zero_counts).
#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    pub zero_counts: i32,
    pub gain_g_per_count: f32,
}

impl Calibration {
    /// Fit grams = a*raw + b over the rows with ordinary least squares, then
    /// fold the intercept into a tare baseline: zero_counts = round(-b/a).
    pub fn from_rows(rows: Vec<CalibrationRow>) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        for i in 1..rows.len() {
            if rows[i].raw == rows[i - 1].raw {
                eyre::bail!(
                    "calibration rows have duplicate raw values at index {} and {}",
                    i - 1,
                    i
                );
            }
        }

        // OLS fit in f64 for numerical stability.
        let n = rows.len() as f64;
        let mean_x: f64 = rows.iter().map(|r| r.raw as f64).sum::<f64>() / n;
        let mean_y: f64 = rows.iter().map(|r| f64::from(r.grams)).sum::<f64>() / n;
        let mut sxx = 0.0f64;
        let mut sxy = 0.0f64;
        for r in &rows {
            let dx = r.raw as f64 - mean_x;
            let dy = f64::from(r.grams) - mean_y;
            sxx += dx * dx;
            sxy += dx * dy;
        }
        if !sxx.is_finite() || sxx == 0.0 {
            eyre::bail!("calibration cannot determine slope (degenerate raw variance)");
        }
        let a = sxy / sxx;
        if !a.is_finite() || a == 0.0 {
            eyre::bail!("calibration produced an unusable slope");
        }
        let b = mean_y - a * mean_x;

        let zero = -b / a;
        if !zero.is_finite() {
            eyre::bail!("calibration produced invalid tare baseline");
        }

        Ok(Calibration {
            zero_counts: zero.round() as i32,
            gain_g_per_count: a as f32,
        })
    }

    /// Convert a raw ADC count to grams.
    #[inline]
    pub fn to_grams(&self, raw: i32) -> f32 {
        self.gain_g_per_count * ((i64::from(raw) - i64::from(self.zero_counts)) as f32)
    }
}

impl TryFrom<Vec<CalibrationRow>> for Calibration {
    type Error = eyre::Report;
    fn try_from(rows: Vec<CalibrationRow>) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Calibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != ["raw", "grams"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,grams', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    Calibration::try_from(rows)
}
