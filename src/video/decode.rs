//! Frame decoding through the `ffprobe` / `ffmpeg` command line tools.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use serde::Deserialize;
use tracing::debug;

use crate::{
    ml::{
        error::{MlError, MlResult},
        types::Frame,
    },
    video::{VideoSource, has_video_extension},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

/// A video file decoded on demand by `ffmpeg`.
#[derive(Debug)]
pub struct FfmpegVideo {
    path: PathBuf,
    info: VideoInfo,
}

impl FfmpegVideo {
    pub fn open(path: impl AsRef<Path>) -> MlResult<Self> {
        let path = path.as_ref();
        if !has_video_extension(path) {
            return Err(MlError::InvalidRequest(format!(
                "unsupported video extension: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(MlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("video file not found: {}", path.display()),
            )));
        }

        let info = probe_video(path)?;
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            frames = info.frame_count,
            "probed video"
        );
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }
}

impl VideoSource for FfmpegVideo {
    fn frame_count(&self) -> usize {
        self.info.frame_count
    }

    fn read_frames(&mut self, indices: &[usize]) -> MlResult<Vec<Frame>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        which::which("ffmpeg").map_err(|_| MlError::ToolNotFound("ffmpeg"))?;

        let output = Command::new("ffmpeg")
            .args(decode_args(&self.path, indices))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(MlError::Video(format!(
                "ffmpeg failed to decode '{}': {}",
                self.path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        split_raw_frames(&output.stdout, self.info.width, self.info.height, indices.len())
    }
}

pub fn probe_video(path: &Path) -> MlResult<VideoInfo> {
    which::which("ffprobe").map_err(|_| MlError::ToolNotFound("ffprobe"))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=width,height,nb_frames,nb_read_packets",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(MlError::Video(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MlResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| MlError::Video("no video stream found".to_string()))?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MlError::Video(
            "video stream reports zero dimensions".to_string(),
        ));
    }

    let frame_count = stream
        .nb_read_packets
        .as_deref()
        .or(stream.nb_frames.as_deref())
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        frame_count,
    })
}

/// Arguments decoding the frames at `indices` to rgb24 on stdout. Display
/// rotation is ignored so frames keep the probed coded size.
fn decode_args(path: &Path, indices: &[usize]) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.push("-vf".into());
    args.push(select_filter(indices).into());
    args.extend(
        [
            "-fps_mode",
            "passthrough",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args
}

/// `select` filter keeping exactly the frames at `indices`.
fn select_filter(indices: &[usize]) -> String {
    let terms = indices
        .iter()
        .map(|i| format!("eq(n\\,{i})"))
        .collect::<Vec<_>>()
        .join("+");
    format!("select={terms}")
}

fn split_raw_frames(raw: &[u8], width: u32, height: u32, limit: usize) -> MlResult<Vec<Frame>> {
    let frame_len = width as usize * height as usize * 3;
    if frame_len == 0 {
        return Err(MlError::Video("cannot split zero-sized frames".to_string()));
    }
    raw.chunks_exact(frame_len)
        .take(limit)
        .map(|chunk| Frame::from_rgb(width, height, chunk.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{ffi::OsString, path::Path};

    use super::{FfmpegVideo, decode_args, parse_probe_output, select_filter, split_raw_frames};
    use crate::ml::error::MlError;

    #[test]
    fn select_filter_escapes_commas() {
        assert_eq!(select_filter(&[0, 6, 12]), "select=eq(n\\,0)+eq(n\\,6)+eq(n\\,12)");
    }

    #[test]
    fn decoding_disables_autorotation_before_the_input() {
        let args = decode_args(Path::new("clip.mov"), &[0, 6]);
        let noautorotate = args.iter().position(|a| a == "-noautorotate").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();

        assert!(noautorotate < input);
        assert_eq!(args[input + 1], OsString::from("clip.mov"));
        assert!(args.iter().any(|a| a == "select=eq(n\\,0)+eq(n\\,6)"));
        assert!(args.iter().any(|a| a == "-fps_mode"));
        assert!(!args.iter().any(|a| a == "-vsync"));
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn probe_prefers_counted_packets() {
        let json = br#"{"streams":[{"width":640,"height":360,"nb_frames":"98","nb_read_packets":"100"}]}"#;
        let info = parse_probe_output(json).expect("probe output should parse");
        assert_eq!(info.width, 640);
        assert_eq!(info.height, 360);
        assert_eq!(info.frame_count, 100);
    }

    #[test]
    fn probe_without_stream_is_an_error() {
        assert!(parse_probe_output(br#"{"streams":[]}"#).is_err());
    }

    #[test]
    fn raw_frames_are_split_and_truncated() {
        let raw: Vec<u8> = (0..(2 * 2 * 3 * 3)).map(|v| v as u8).collect();
        let frames = split_raw_frames(&raw, 2, 2, 2).expect("split should succeed");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].pixels[0], 12);
    }

    #[test]
    fn open_rejects_unsupported_extension() {
        let err = FfmpegVideo::open("clip.mkv").unwrap_err();
        assert!(matches!(err, MlError::InvalidRequest(_)));
    }

    #[test]
    fn open_reports_missing_file_as_io_error() {
        let err = FfmpegVideo::open("/definitely/not/here.mp4").unwrap_err();
        assert!(matches!(err, MlError::Io(_)));
    }
}
