//! Encoder selection: probe hardware encoders once, cache for the process.
//!
//! Hardware encoders are tried in a fixed priority order. A candidate has
//! to be compiled into the local ffmpeg AND survive a one-frame test
//! encode; stderr phrases that definitively mean "no such device here"
//! skip the candidate, while any other failure of a compiled-in encoder
//! still counts as usable (driver quirks routinely fail the synthetic
//! test clip but succeed on real input). Software x264/x265 always works
//! as the last candidate.

use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use hudburn_common::error::{HudburnError, HudburnResult};

/// Output codec family requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
        }
    }
}

/// One encoder family ffmpeg may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfile {
    pub label: &'static str,
    pub h264: &'static str,
    pub h265: &'static str,
    pub hardware: bool,
}

pub const NVENC: EncoderProfile = EncoderProfile {
    label: "NVIDIA NVENC",
    h264: "h264_nvenc",
    h265: "hevc_nvenc",
    hardware: true,
};

pub const AMF: EncoderProfile = EncoderProfile {
    label: "AMD AMF",
    h264: "h264_amf",
    h265: "hevc_amf",
    hardware: true,
};

pub const QSV: EncoderProfile = EncoderProfile {
    label: "Intel QuickSync",
    h264: "h264_qsv",
    h265: "hevc_qsv",
    hardware: true,
};

pub const VAAPI: EncoderProfile = EncoderProfile {
    label: "VAAPI",
    h264: "h264_vaapi",
    h265: "hevc_vaapi",
    hardware: true,
};

pub const VIDEOTOOLBOX: EncoderProfile = EncoderProfile {
    label: "Apple VideoToolbox",
    h264: "h264_videotoolbox",
    h265: "hevc_videotoolbox",
    hardware: true,
};

pub const SOFTWARE: EncoderProfile = EncoderProfile {
    label: "Software x264/x265",
    h264: "libx264",
    h265: "libx265",
    hardware: false,
};

/// Probe priority. First usable candidate wins.
pub const HARDWARE_CANDIDATES: &[EncoderProfile] = &[NVENC, AMF, QSV, VAAPI, VIDEOTOOLBOX];

/// Test-encode wall-clock ceiling. Cold CUDA context creation alone can
/// take several seconds on some driver stacks.
const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// stderr fragments that definitively mean the device is absent, as
/// opposed to a transient or clip-specific failure.
const NO_DEVICE_PHRASES: &[&str] = &[
    "cannot load nvcuda",
    "cannot load libcuda",
    "no nvenc capable devices",
    "no capable devices found",
    "device creation failed",
    "failed to initialise vaapi connection",
    "no va display found",
    "error initializing an internal mfx session",
    "no device available for encoder",
    "hardware is lacking",
    "driver does not support",
];

impl EncoderProfile {
    pub fn encoder_name(&self, codec: VideoCodec) -> &'static str {
        match codec {
            VideoCodec::H264 => self.h264,
            VideoCodec::H265 => self.h265,
        }
    }

    /// Rate-control arguments for this encoder family.
    ///
    /// Hardware encoders do not speak CRF; each family gets the nearest
    /// equivalent. NVENC's CQ scale sits roughly 9 points above x264 CRF
    /// at matching visual quality.
    pub fn rate_control_args(&self, codec: VideoCodec, crf: u32, preset: &str) -> Vec<String> {
        let name = self.encoder_name(codec);
        match name {
            "h264_nvenc" | "hevc_nvenc" => vec![
                "-rc".into(),
                "vbr".into(),
                "-cq".into(),
                (crf + 9).to_string(),
                "-b:v".into(),
                "0".into(),
                "-preset".into(),
                "p5".into(),
            ],
            "h264_amf" | "hevc_amf" => vec![
                "-rc".into(),
                "cqp".into(),
                "-qp_i".into(),
                crf.to_string(),
                "-qp_p".into(),
                crf.to_string(),
                "-quality".into(),
                "quality".into(),
            ],
            "h264_qsv" | "hevc_qsv" => vec![
                "-global_quality".into(),
                crf.to_string(),
                "-preset".into(),
                preset.to_string(),
            ],
            "h264_vaapi" | "hevc_vaapi" => vec!["-qp".into(), crf.to_string()],
            "h264_videotoolbox" | "hevc_videotoolbox" => {
                vec!["-q:v".into(), "60".into()]
            }
            _ => vec![
                "-crf".into(),
                crf.to_string(),
                "-preset".into(),
                preset.to_string(),
            ],
        }
    }
}

/// Pick the encoder for this process, probing at most once.
///
/// The probe result is process-wide: repeat jobs reuse it. With
/// `prefer_hardware = false` the software profile is returned directly
/// (ffmpeg presence is still verified).
pub fn detect_encoder(codec: VideoCodec, prefer_hardware: bool) -> HudburnResult<EncoderProfile> {
    if !command_exists("ffmpeg") {
        return Err(HudburnError::no_encoder(
            "ffmpeg binary not found on PATH",
        ));
    }
    if !prefer_hardware {
        return Ok(SOFTWARE);
    }

    static PROBE: OnceLock<EncoderProfile> = OnceLock::new();
    let cached = *PROBE.get_or_init(|| {
        let started = Instant::now();
        let profile = run_probe(codec);
        tracing::info!(
            encoder = profile.label,
            hardware = profile.hardware,
            probe_secs = started.elapsed().as_secs_f64(),
            "Encoder selected"
        );
        profile
    });

    // The probe ran against whichever codec the first job asked for; a
    // later job may want the family's other codec, which the local ffmpeg
    // does not necessarily carry.
    Ok(verify_codec_available(cached, codec, compiled_encoders()))
}

/// Re-check a previously selected family against the requested codec.
///
/// Falls back to software when the family's encoder for this codec is
/// not compiled into ffmpeg. Software always passes.
fn verify_codec_available(
    profile: EncoderProfile,
    codec: VideoCodec,
    compiled: &[String],
) -> EncoderProfile {
    if !profile.hardware {
        return profile;
    }
    let name = profile.encoder_name(codec);
    if compiled.iter().any(|c| c == name) {
        profile
    } else {
        tracing::warn!(
            encoder = name,
            family = profile.label,
            "Selected family lacks this codec in the local ffmpeg, using software"
        );
        SOFTWARE
    }
}

fn run_probe(codec: VideoCodec) -> EncoderProfile {
    let compiled = compiled_encoders();

    for candidate in HARDWARE_CANDIDATES {
        let name = candidate.encoder_name(codec);
        if !compiled.iter().any(|c| c == name) {
            tracing::debug!(encoder = name, "Not compiled into ffmpeg, skipping");
            continue;
        }
        match test_encode(name) {
            ProbeOutcome::Usable => return *candidate,
            ProbeOutcome::NoDevice(phrase) => {
                tracing::debug!(encoder = name, phrase, "No device for encoder");
            }
            ProbeOutcome::TimedOut => {
                tracing::warn!(encoder = name, "Encoder probe timed out, skipping");
            }
        }
    }

    SOFTWARE
}

/// Encoder names ffmpeg was compiled with, from `ffmpeg -encoders`.
/// Listed once per process; the compiled set cannot change underneath us.
pub fn compiled_encoders() -> &'static [String] {
    static COMPILED: OnceLock<Vec<String>> = OnceLock::new();
    COMPILED.get_or_init(list_compiled_encoders)
}

fn list_compiled_encoders() -> Vec<String> {
    let output = match Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
    {
        Ok(output) => output,
        Err(_) => return Vec::new(),
    };

    // Listing lines look like " V....D h264_nvenc  NVIDIA NVENC ...".
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            if !flags.starts_with('V') {
                return None;
            }
            fields.next().map(str::to_string)
        })
        .collect()
}

enum ProbeOutcome {
    Usable,
    NoDevice(&'static str),
    TimedOut,
}

/// One-frame synthetic encode against a candidate encoder.
fn test_encode(encoder: &str) -> ProbeOutcome {
    let mut child = match Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-f",
            "lavfi",
            "-i",
            "color=black:s=256x256:d=0.1",
            "-frames:v",
            "1",
            "-c:v",
            encoder,
            "-f",
            "null",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(_) => return ProbeOutcome::NoDevice("failed to spawn ffmpeg"),
    };

    let deadline = Instant::now() + PROBE_TIMEOUT;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return ProbeOutcome::TimedOut;
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(100)),
            Err(_) => return ProbeOutcome::NoDevice("failed to wait on probe"),
        }
    };

    if status.success() {
        return ProbeOutcome::Usable;
    }

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        use std::io::Read;
        let _ = pipe.read_to_string(&mut stderr);
    }
    let lowered = stderr.to_ascii_lowercase();
    for phrase in NO_DEVICE_PHRASES {
        if lowered.contains(phrase) {
            return ProbeOutcome::NoDevice(phrase);
        }
    }

    // Compiled-in encoder failing for any other reason: treat as usable.
    tracing::debug!(
        encoder,
        "Probe encode failed without a device error, keeping candidate"
    );
    ProbeOutcome::Usable
}

/// Whether an ffmpeg binary is reachable on PATH.
pub fn ffmpeg_available() -> bool {
    command_exists("ffmpeg")
}

pub(crate) fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_priority_order() {
        let labels: Vec<_> = HARDWARE_CANDIDATES.iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            vec![
                "NVIDIA NVENC",
                "AMD AMF",
                "Intel QuickSync",
                "VAAPI",
                "Apple VideoToolbox",
            ]
        );
        assert!(!SOFTWARE.hardware);
    }

    #[test]
    fn test_codec_selects_encoder_name() {
        assert_eq!(NVENC.encoder_name(VideoCodec::H264), "h264_nvenc");
        assert_eq!(NVENC.encoder_name(VideoCodec::H265), "hevc_nvenc");
        assert_eq!(SOFTWARE.encoder_name(VideoCodec::H265), "libx265");
    }

    #[test]
    fn test_nvenc_maps_crf_to_cq_offset() {
        let args = NVENC.rate_control_args(VideoCodec::H264, 23, "medium");
        let cq_pos = args.iter().position(|a| a == "-cq").unwrap();
        assert_eq!(args[cq_pos + 1], "32");
    }

    #[test]
    fn test_software_uses_crf_and_preset() {
        let args = SOFTWARE.rate_control_args(VideoCodec::H264, 18, "slow");
        assert_eq!(args, vec!["-crf", "18", "-preset", "slow"]);
    }

    #[test]
    fn test_cached_family_recheck_per_codec() {
        let compiled = vec!["h264_nvenc".to_string(), "libx265".to_string()];

        // The family covers the requested codec: keep it.
        assert_eq!(
            verify_codec_available(NVENC, VideoCodec::H264, &compiled),
            NVENC
        );
        // Same family, other codec missing from this ffmpeg build: fall
        // back to software instead of handing ffmpeg an unknown encoder.
        assert_eq!(
            verify_codec_available(NVENC, VideoCodec::H265, &compiled),
            SOFTWARE
        );
        // Software needs no re-check.
        assert_eq!(
            verify_codec_available(SOFTWARE, VideoCodec::H265, &[]),
            SOFTWARE
        );
    }

    #[test]
    fn test_qsv_and_vaapi_arg_shapes() {
        let qsv = QSV.rate_control_args(VideoCodec::H265, 23, "fast");
        assert!(qsv.contains(&"-global_quality".to_string()));
        let vaapi = VAAPI.rate_control_args(VideoCodec::H264, 23, "fast");
        assert_eq!(vaapi, vec!["-qp", "23"]);
    }
}
