// Video profiles and container formats.
//
// The node carries a process-wide default profile set; every connection takes
// a deep copy before format propagation so the defaults stay format-less.

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

/// Container format of a segment or rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Format {
    /// No format decided yet. Entries in the default profile set stay in this
    /// state; connections resolve it from the push URL extension.
    #[default]
    None,
    MpegTs,
    Mp4,
}

impl Format {
    /// Map a URL file extension to a container format.
    /// Unrecognized extensions (including `.m3u8`) map to `None` and are
    /// rejected by the push handler.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            ".ts" | "ts" => Format::MpegTs,
            ".mp4" | "mp4" => Format::Mp4,
            _ => Format::None,
        }
    }

    /// File extension used in storage keys and multipart part names.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Mp4 => ".mp4",
            _ => ".ts",
        }
    }

    /// MIME type for binary rendition parts.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Mp4 => "video/mp4",
            _ => "video/mp2t",
        }
    }
}

/// Keyframe interval policy for a rendition.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Gop {
    /// Encoder default.
    #[default]
    Default,
    /// Fixed interval in seconds.
    Seconds(f64),
    /// Every frame is a keyframe.
    IntraOnly,
}

/// Parse a GOP field from a webhook response or a profile JSON file.
///
/// The literal `"intra"` selects intra-only output; any other non-empty value
/// must be a positive number of seconds.
pub fn parse_gop(raw: &str) -> IngestResult<Gop> {
    if raw.is_empty() {
        return Ok(Gop::Default);
    }
    if raw == "intra" {
        return Ok(Gop::IntraOnly);
    }
    let secs: f64 = raw
        .parse()
        .map_err(|_| IngestError::InvalidProfile(format!("cannot parse gop {raw}")))?;
    if secs <= 0.0 {
        return Err(IngestError::InvalidProfile(format!(
            "gop must be positive, got {raw}"
        )));
    }
    Ok(Gop::Seconds(secs))
}

/// One output video configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    pub fps: u32,
    pub fps_den: u32,
    /// Encoder profile, e.g. "H264Baseline". Empty means encoder default.
    pub profile: String,
    pub gop: Gop,
    pub format: Format,
}

impl VideoProfile {
    /// Resolution as the `WxH` string used in status output.
    #[must_use]
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

fn preset_profile(name: &str, width: u32, height: u32, bitrate: u32, fps: u32) -> VideoProfile {
    VideoProfile {
        name: name.to_string(),
        width,
        height,
        bitrate,
        fps,
        fps_den: 0,
        profile: String::new(),
        gop: Gop::Default,
        format: Format::None,
    }
}

/// Look up a built-in transcoding preset by name.
#[must_use]
pub fn preset(name: &str) -> Option<VideoProfile> {
    let p = match name {
        "P144p25fps16x9" => preset_profile(name, 256, 144, 400_000, 25),
        "P144p30fps16x9" => preset_profile(name, 256, 144, 400_000, 30),
        "P240p30fps16x9" => preset_profile(name, 426, 240, 600_000, 30),
        "P240p30fps4x3" => preset_profile(name, 320, 240, 600_000, 30),
        "P360p30fps16x9" => preset_profile(name, 640, 360, 1_200_000, 30),
        "P480p30fps16x9" => preset_profile(name, 854, 480, 1_600_000, 30),
        "P576p30fps16x9" => preset_profile(name, 1024, 576, 1_500_000, 30),
        "P720p25fps16x9" => preset_profile(name, 1280, 720, 2_400_000, 25),
        "P720p30fps16x9" => preset_profile(name, 1280, 720, 2_400_000, 30),
        "P720p60fps16x9" => preset_profile(name, 1280, 720, 3_600_000, 60),
        "P1080p30fps16x9" => preset_profile(name, 1920, 1080, 4_400_000, 30),
        "P1080p60fps16x9" => preset_profile(name, 1920, 1080, 6_600_000, 60),
        _ => return None,
    };
    Some(p)
}

/// Parse a comma-separated preset list, e.g. from `--transcoding-options`.
/// Unknown names are an error here (the operator typed them).
pub fn parse_preset_list(list: &str) -> IngestResult<Vec<VideoProfile>> {
    let mut out = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let p = preset(name)
            .ok_or_else(|| IngestError::InvalidProfile(format!("unknown preset {name}")))?;
        out.push(p);
    }
    Ok(out)
}

/// Profile descriptor as it appears on the wire: webhook `profiles` field and
/// the JSON transcoding-options file share this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileDescriptor {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub fps: u32,
    pub fps_den: u32,
    pub profile: String,
    pub gop: String,
}

impl ProfileDescriptor {
    pub fn into_video_profile(self) -> IngestResult<VideoProfile> {
        let gop = parse_gop(&self.gop)?;
        Ok(VideoProfile {
            name: self.name,
            width: self.width,
            height: self.height,
            bitrate: self.bitrate,
            fps: self.fps,
            fps_den: self.fps_den,
            profile: self.profile,
            gop,
            format: Format::None,
        })
    }
}

/// Parse a JSON array of profile descriptors (transcoding-options file).
pub fn profiles_from_json(raw: &str) -> IngestResult<Vec<VideoProfile>> {
    let descriptors: Vec<ProfileDescriptor> = serde_json::from_str(raw)
        .map_err(|e| IngestError::InvalidProfile(format!("cannot parse profiles: {e}")))?;
    descriptors
        .into_iter()
        .map(ProfileDescriptor::into_video_profile)
        .collect()
}

/// Merge webhook presets and explicit profiles into a connection profile
/// list, falling back to the node defaults, and propagate the URL-derived
/// container format onto every entry that has none.
///
/// The returned list is always a fresh copy; callers may mutate it freely
/// without touching the shared default set.
pub fn resolve_profiles(
    presets: &[String],
    explicit: &[VideoProfile],
    defaults: &[VideoProfile],
    format: Format,
) -> Vec<VideoProfile> {
    let mut out: Vec<VideoProfile> = if presets.is_empty() && explicit.is_empty() {
        defaults.to_vec()
    } else {
        let mut merged = Vec::with_capacity(presets.len() + explicit.len());
        for name in presets {
            match preset(name) {
                Some(p) => merged.push(p),
                None => tracing::warn!("Ignoring unknown preset {} from auth webhook", name),
            }
        }
        merged.extend(explicit.iter().cloned());
        merged
    };
    for p in &mut out {
        if p.format == Format::None {
            p.format = format;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_extension(".ts"), Format::MpegTs);
        assert_eq!(Format::from_extension(".mp4"), Format::Mp4);
        assert_eq!(Format::from_extension(".m3u8"), Format::None);
        assert_eq!(Format::from_extension(".flv"), Format::None);
        assert_eq!(Format::from_extension(""), Format::None);
    }

    #[test]
    fn test_parse_gop() {
        assert_eq!(parse_gop("").unwrap(), Gop::Default);
        assert_eq!(parse_gop("intra").unwrap(), Gop::IntraOnly);
        assert_eq!(parse_gop("2.5").unwrap(), Gop::Seconds(2.5));
        assert!(parse_gop("0").is_err());
        assert!(parse_gop("-1.0").is_err());
        assert!(parse_gop("potato").is_err());
    }

    #[test]
    fn test_preset_lookup() {
        let p = preset("P144p25fps16x9").unwrap();
        assert_eq!(p.width, 256);
        assert_eq!(p.height, 144);
        assert_eq!(p.fps, 25);
        assert_eq!(p.format, Format::None);
        assert!(preset("P9000p").is_none());
    }

    #[test]
    fn test_parse_preset_list() {
        let list = parse_preset_list("P240p30fps16x9, P720p30fps16x9").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].name, "P720p30fps16x9");
        assert!(parse_preset_list("P240p30fps16x9,bogus").is_err());
    }

    #[test]
    fn test_profiles_from_json() {
        let raw = r#"[{"name":"abc","width":320,"height":240,"bitrate":1000000,"fps":30,"gop":"intra"}]"#;
        let profiles = profiles_from_json(raw).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "abc");
        assert_eq!(profiles[0].gop, Gop::IntraOnly);

        let bad_gop = r#"[{"name":"abc","gop":"-2"}]"#;
        assert!(profiles_from_json(bad_gop).is_err());
    }

    #[test]
    fn test_resolve_profiles_defaults_untouched() {
        let defaults = vec![preset("P240p30fps16x9").unwrap()];
        let resolved = resolve_profiles(&[], &[], &defaults, Format::Mp4);
        assert_eq!(resolved[0].format, Format::Mp4);
        // The shared set keeps its format-less entries.
        assert_eq!(defaults[0].format, Format::None);
    }

    #[test]
    fn test_resolve_profiles_merges_webhook_sets() {
        let defaults = vec![preset("P240p30fps16x9").unwrap()];
        let explicit = vec![preset("P360p30fps16x9").unwrap()];
        let presets = vec!["P144p30fps16x9".to_string(), "nope".to_string()];
        let resolved = resolve_profiles(&presets, &explicit, &defaults, Format::MpegTs);
        // Unknown preset skipped, defaults not used.
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].name, "P144p30fps16x9");
        assert_eq!(resolved[1].name, "P360p30fps16x9");
        assert!(resolved.iter().all(|p| p.format == Format::MpegTs));
    }
}
