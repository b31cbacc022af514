//! ALSA mixer control.
//!
//! The appliance drives a small closed set of mixer variants, selected once
//! at startup by probing the simple controls `amixer` reports. Each variant
//! maps the control panel's 0-100 scale through its own volume curve, so the
//! rest of the supervisor stays hardware-agnostic behind the [`Mixer`] trait.
//!
//! Failure to find any known control at startup is fatal: there is no useful
//! degraded mode for an audio appliance without audio output.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Errors from mixer operations.
#[derive(Debug, Error)]
pub enum MixerError {
    /// `amixer` could not be spawned or exited non-zero.
    #[error("amixer command failed: {0}")]
    Command(String),

    /// No known mixer control exists on this system.
    #[error("no usable mixer control: {0}")]
    Unavailable(String),

    /// `amixer` output did not contain a volume level.
    #[error("could not parse mixer output: {0}")]
    Parse(String),
}

/// Hardware-agnostic volume contract (0-100).
#[async_trait]
pub trait Mixer: Send + Sync {
    /// Name of the underlying control, for logging and status.
    fn control_name(&self) -> &str;

    /// Reads the current volume (0-100 on the control panel scale).
    async fn get_volume(&self) -> Result<u8, MixerError>;

    /// Sets the volume (0-100 on the control panel scale; higher values are
    /// clamped).
    async fn set_volume(&self, volume: u8) -> Result<(), MixerError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Volume Curves
// ─────────────────────────────────────────────────────────────────────────────

/// Mapping between the control panel scale and the raw control percentage.
///
/// DAC-backed `PCM` controls behave linearly. Amplifier controls like
/// `Master` and `Headphone` apply their gain in dB, so a linear panel scale
/// would cram all audible change into the top quarter; the tapered curve
/// spreads it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeCurve {
    /// Panel percent maps directly to control percent.
    Linear,
    /// Quadratic taper: panel percent `v` maps to `v²/100`.
    Tapered,
}

impl VolumeCurve {
    /// Converts a panel volume to the raw control percentage.
    fn to_raw(self, volume: u8) -> u8 {
        let volume = volume.min(100) as u32;
        match self {
            Self::Linear => volume as u8,
            Self::Tapered => ((volume * volume) / 100) as u8,
        }
    }

    /// Converts a raw control percentage back to the panel scale.
    fn to_panel(self, raw: u8) -> u8 {
        let raw = raw.min(100) as f64;
        match self {
            Self::Linear => raw as u8,
            Self::Tapered => (raw * 100.0).sqrt().round() as u8,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ALSA Mixer
// ─────────────────────────────────────────────────────────────────────────────

/// Known simple controls in probe order, each with its curve.
const KNOWN_CONTROLS: [(&str, VolumeCurve); 4] = [
    ("PCM", VolumeCurve::Linear),
    ("Digital", VolumeCurve::Linear),
    ("Master", VolumeCurve::Tapered),
    ("Headphone", VolumeCurve::Tapered),
];

/// Mixer variant driving one ALSA simple control through `amixer`.
pub struct AlsaMixer {
    control: String,
    curve: VolumeCurve,
}

impl AlsaMixer {
    /// Probes the system's simple controls and selects the first known one.
    ///
    /// Returns [`MixerError::Unavailable`] when none of the known controls
    /// exist; callers should treat this as fatal at startup.
    pub async fn detect() -> Result<Self, MixerError> {
        let listing = run_amixer(&["scontrols"]).await?;
        for (control, curve) in KNOWN_CONTROLS {
            if listing.contains(&format!("'{}'", control)) {
                log::info!(
                    "[Mixer] Using control '{}' with {:?} curve",
                    control,
                    curve
                );
                return Ok(Self {
                    control: control.to_string(),
                    curve,
                });
            }
        }
        Err(MixerError::Unavailable(format!(
            "none of {:?} found in amixer scontrols",
            KNOWN_CONTROLS.map(|(name, _)| name)
        )))
    }

    #[cfg(test)]
    fn with_control(control: &str, curve: VolumeCurve) -> Self {
        Self {
            control: control.to_string(),
            curve,
        }
    }
}

#[async_trait]
impl Mixer for AlsaMixer {
    fn control_name(&self) -> &str {
        &self.control
    }

    async fn get_volume(&self) -> Result<u8, MixerError> {
        let output = run_amixer(&["sget", &self.control]).await?;
        let raw = parse_volume_percent(&output)?;
        Ok(self.curve.to_panel(raw))
    }

    async fn set_volume(&self, volume: u8) -> Result<(), MixerError> {
        let raw = self.curve.to_raw(volume);
        let level = format!("{}%", raw);
        run_amixer(&["sset", &self.control, &level]).await?;
        log::debug!(
            "[Mixer] Set '{}' to {}% (raw {}%)",
            self.control,
            volume.min(100),
            raw
        );
        Ok(())
    }
}

/// Runs `amixer` with the given arguments and returns stdout.
async fn run_amixer(args: &[&str]) -> Result<String, MixerError> {
    let output = Command::new("amixer")
        .args(args)
        .output()
        .await
        .map_err(|e| MixerError::Command(format!("amixer {}: {}", args.join(" "), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MixerError::Command(format!(
            "amixer {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extracts the first `[NN%]` level from `amixer sget` output.
fn parse_volume_percent(output: &str) -> Result<u8, MixerError> {
    for segment in output.split('[') {
        if let Some(end) = segment.find("%]") {
            if let Ok(level) = segment[..end].trim().parse::<u8>() {
                return Ok(level.min(100));
            }
        }
    }
    Err(MixerError::Parse(format!(
        "no volume level in: {}",
        output.lines().last().unwrap_or_default()
    )))
}

// ─────────────────────────────────────────────────────────────────────────────
// Mono Downmix
// ─────────────────────────────────────────────────────────────────────────────

/// ALSA config routing both stereo channels to a single output at half gain.
const MONO_ASOUNDRC: &str = "\
pcm.mono {
    type route
    slave.pcm \"default\"
    ttable.0.0 0.5
    ttable.1.0 0.5
}

pcm.!default {
    type plug
    slave.pcm \"mono\"
}
";

/// Writes the mono downmix config (atomic write: temp file + rename).
///
/// Used for single-speaker installs where stereo separation would lose half
/// the mix.
pub fn write_mono_asoundrc(path: &Path) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, MONO_ASOUNDRC)?;
    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_curve_is_identity() {
        assert_eq!(VolumeCurve::Linear.to_raw(70), 70);
        assert_eq!(VolumeCurve::Linear.to_panel(70), 70);
    }

    #[test]
    fn tapered_curve_roundtrips() {
        for volume in [0u8, 10, 25, 50, 70, 100] {
            let raw = VolumeCurve::Tapered.to_raw(volume);
            let back = VolumeCurve::Tapered.to_panel(raw);
            assert!(
                back.abs_diff(volume) <= 3,
                "volume {} -> raw {} -> panel {}",
                volume,
                raw,
                back
            );
        }
    }

    #[test]
    fn curves_clamp_out_of_range_input() {
        assert_eq!(VolumeCurve::Linear.to_raw(150), 100);
        assert_eq!(VolumeCurve::Tapered.to_raw(150), 100);
    }

    #[test]
    fn parses_amixer_sget_output() {
        let output = "Simple mixer control 'PCM',0\n\
                      Capabilities: pvolume pswitch\n\
                      Playback channels: Front Left - Front Right\n\
                      Limits: Playback -10239 - 400\n\
                      Front Left: Playback 255 [70%] [-2.56dB] [on]\n\
                      Front Right: Playback 255 [70%] [-2.56dB] [on]\n";
        assert_eq!(parse_volume_percent(output).unwrap(), 70);
    }

    #[test]
    fn parse_rejects_output_without_level() {
        assert!(parse_volume_percent("amixer: Unable to find simple control").is_err());
    }

    #[test]
    fn tapered_mixer_reports_its_control() {
        let mixer = AlsaMixer::with_control("Master", VolumeCurve::Tapered);
        assert_eq!(mixer.control_name(), "Master");
    }

    #[test]
    fn mono_asoundrc_writes_route_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".asoundrc");
        write_mono_asoundrc(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("type route"));
        assert!(contents.contains("ttable.1.0 0.5"));
    }
}
