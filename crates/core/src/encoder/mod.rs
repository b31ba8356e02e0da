//! Video encoder collaborator and ordered codec selection.

use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{Frame, PreviewError, Result};

/// Rounds odd frame sizes up to the even dimensions yuv420p requires.
const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// An open encoder stream writing one container file.
pub trait VideoStream: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flushes pending data and closes the container.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Opens encoder streams. `open` fails when `codec` is not supported on this
/// host.
pub trait EncoderBackend {
    fn open(
        &self,
        path: &Path,
        codec: &str,
        fps: u32,
        frame_size: (u32, u32),
    ) -> Result<Box<dyn VideoStream>>;
}

/// Opens `path` with the first codec in `candidates` the backend accepts and
/// returns the stream together with the chosen codec.
pub fn try_open_in_order(
    backend: &dyn EncoderBackend,
    path: &Path,
    candidates: &[String],
    fps: u32,
    frame_size: (u32, u32),
) -> Result<(Box<dyn VideoStream>, String)> {
    for codec in candidates {
        match backend.open(path, codec, fps, frame_size) {
            Ok(stream) => return Ok((stream, codec.clone())),
            Err(err) => tracing::debug!(%codec, error = %err, "codec unavailable"),
        }
    }
    Err(PreviewError::NoSupportedCodec {
        tried: candidates.to_vec(),
    })
}

/// Encodes through an `ffmpeg` child process fed with raw RGB frames.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg_path: PathBuf,
}

impl FfmpegBackend {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Encodes one black frame with exactly the settings a recording would
    /// use and reports whether ffmpeg accepted it. A codec that is compiled
    /// in but cannot initialise for this size or rate fails here.
    pub fn can_encode(&self, codec: &str, fps: u32, frame_size: (u32, u32)) -> Result<bool> {
        let mut child = self
            .encode_command(codec, fps, frame_size)
            .args(["-frames:v", "1", "-f", "null", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        let (width, height) = frame_size;
        let blank = vec![0u8; width as usize * height as usize * 3];
        if let Some(mut stdin) = child.stdin.take() {
            // ffmpeg may reject the codec before reading its input.
            if let Err(err) = stdin.write_all(&blank) {
                tracing::debug!(%codec, error = %err, "test encode stopped reading");
            }
        }
        Ok(child.wait()?.success())
    }

    /// Shared by the test encode and the recording so both see the same
    /// input format, filter and codec settings.
    fn encode_command(&self, codec: &str, fps: u32, frame_size: (u32, u32)) -> Command {
        let (width, height) = frame_size;
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s:v")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(fps.to_string())
            .args(["-i", "-", "-an", "-vf", EVEN_PAD_FILTER])
            .arg("-c:v")
            .arg(codec)
            .args(["-pix_fmt", "yuv420p"]);
        command
    }

    fn spawn_error(&self, err: std::io::Error) -> PreviewError {
        if err.kind() == ErrorKind::NotFound {
            PreviewError::Encoder(format!("{} was not found", self.ffmpeg_path.display()))
        } else {
            PreviewError::Encoder(format!("failed to run {}: {err}", self.ffmpeg_path.display()))
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderBackend for FfmpegBackend {
    fn open(
        &self,
        path: &Path,
        codec: &str,
        fps: u32,
        frame_size: (u32, u32),
    ) -> Result<Box<dyn VideoStream>> {
        if !self.can_encode(codec, fps, frame_size)? {
            return Err(PreviewError::Encoder(format!(
                "codec `{codec}` rejected {}x{} at {fps} fps",
                frame_size.0, frame_size.1
            )));
        }

        let mut child = self
            .encode_command(codec, fps, frame_size)
            .args(["-f", "mp4"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PreviewError::Encoder("failed to capture ffmpeg stdin".into()));
        };

        Ok(Box::new(FfmpegStream {
            child,
            stdin: Some(stdin),
            frame_size,
        }))
    }
}

struct FfmpegStream {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_size: (u32, u32),
}

impl VideoStream for FfmpegStream {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.size() != self.frame_size {
            return Err(PreviewError::Encoder(format!(
                "frame is {:?}, stream expects {:?}",
                frame.size(),
                self.frame_size
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PreviewError::Encoder("stream already finished".into()))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // Closing stdin lets ffmpeg finalize the container. The child is
        // reaped even when the flush fails.
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };
        let status = self.child.wait()?;
        flushed?;
        if !status.success() {
            return Err(PreviewError::Encoder(format!("ffmpeg failed with {status}")));
        }
        Ok(())
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct PickyBackend {
        supported: &'static [&'static str],
        attempts: Arc<Mutex<Vec<String>>>,
    }

    struct NullStream;

    impl VideoStream for NullStream {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    impl EncoderBackend for PickyBackend {
        fn open(
            &self,
            _path: &Path,
            codec: &str,
            _fps: u32,
            _frame_size: (u32, u32),
        ) -> Result<Box<dyn VideoStream>> {
            self.attempts.lock().unwrap().push(codec.to_string());
            if self.supported.iter().any(|s| *s == codec) {
                Ok(Box::new(NullStream))
            } else {
                Err(PreviewError::Encoder(format!("no {codec}")))
            }
        }
    }

    fn candidates() -> Vec<String> {
        crate::config::default_codecs()
    }

    #[test]
    fn first_supported_codec_wins() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let backend = PickyBackend {
            supported: &["libopenh264", "mpeg4"],
            attempts: attempts.clone(),
        };

        let (_stream, codec) =
            try_open_in_order(&backend, Path::new("out.mp4"), &candidates(), 30, (64, 48)).unwrap();

        assert_eq!(codec, "libopenh264");
        assert_eq!(*attempts.lock().unwrap(), vec!["libx264", "libopenh264"]);
    }

    #[test]
    fn reports_every_tried_codec_when_none_open() {
        let backend = PickyBackend {
            supported: &[],
            attempts: Arc::new(Mutex::new(Vec::new())),
        };

        let err = try_open_in_order(&backend, Path::new("out.mp4"), &candidates(), 30, (64, 48))
            .err()
            .unwrap();
        match err {
            PreviewError::NoSupportedCodec { tried } => assert_eq!(tried, candidates()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_ffmpeg_binary_is_an_encoder_error() {
        let backend = FfmpegBackend::new("/nonexistent/ffmpeg-for-tests");
        let err = backend.can_encode("mpeg4", 30, (4, 4)).unwrap_err();
        assert!(matches!(err, PreviewError::Encoder(_)));
    }

    #[cfg(unix)]
    mod process {
        use std::fs;

        use super::*;
        use crate::fake_ffmpeg;

        /// Test encodes (output `-`) log the codec and fail for `reject`.
        /// Recordings dump their arguments and stdin, then exit with `code`.
        fn install(dir: &Path, reject: &str, code: i32) -> PathBuf {
            fake_ffmpeg::install(
                dir,
                &format!(
                    r#"dir=$(dirname "$0")
codec=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-c:v" ]; then codec="$arg"; fi
  prev="$arg"
done
if [ "$prev" = "-" ]; then
  echo "$codec" >> "$dir/tested"
  cat > /dev/null
  case " {reject} " in *" $codec "*) exit 1 ;; esac
  exit 0
fi
echo "$@" > "$dir/args"
cat > "$dir/stdin"
exit {code}"#
                ),
            )
        }

        fn odd_frame() -> Frame {
            Frame::from_raw(3, 2, (0..18).collect()).unwrap()
        }

        #[test]
        fn streams_raw_frames_to_a_padded_mp4() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfmpegBackend::new(install(dir.path(), "", 0));
            let output = dir.path().join("out.mp4");

            let mut stream = backend.open(&output, "mpeg4", 25, (3, 2)).unwrap();
            stream.write_frame(&odd_frame()).unwrap();
            stream.finish().unwrap();

            let args = fs::read_to_string(dir.path().join("args")).unwrap();
            assert!(args.contains(
                "-f rawvideo -pix_fmt rgb24 -s:v 3x2 -r 25 -i - -an \
                 -vf pad=ceil(iw/2)*2:ceil(ih/2)*2 -c:v mpeg4 -pix_fmt yuv420p -f mp4"
            ));
            assert!(args.trim_end().ends_with(&output.display().to_string()));
            assert_eq!(fs::read(dir.path().join("stdin")).unwrap(), odd_frame().as_raw());
        }

        #[test]
        fn failed_test_encode_moves_on_to_the_next_codec() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfmpegBackend::new(install(dir.path(), "libx264", 0));

            let (stream, codec) = try_open_in_order(
                &backend,
                &dir.path().join("out.mp4"),
                &candidates(),
                30,
                (1923, 480),
            )
            .unwrap();
            stream.finish().unwrap();

            assert_eq!(codec, "libopenh264");
            let tested = fs::read_to_string(dir.path().join("tested")).unwrap();
            assert_eq!(tested.lines().collect::<Vec<_>>(), vec!["libx264", "libopenh264"]);
        }

        #[test]
        fn finish_reports_a_failing_encoder() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfmpegBackend::new(install(dir.path(), "", 3));

            let output = dir.path().join("out.mp4");
            let mut stream = backend.open(&output, "mpeg4", 30, (3, 2)).unwrap();
            stream.write_frame(&odd_frame()).unwrap();
            let err = stream.finish().unwrap_err();

            assert!(matches!(err, PreviewError::Encoder(_)));
        }

        #[test]
        fn rejects_frames_of_another_size() {
            let dir = tempfile::tempdir().unwrap();
            let backend = FfmpegBackend::new(install(dir.path(), "", 0));

            let output = dir.path().join("out.mp4");
            let mut stream = backend.open(&output, "mpeg4", 30, (4, 2)).unwrap();
            assert!(stream.write_frame(&odd_frame()).is_err());
            stream.finish().unwrap();

            assert!(fs::read(dir.path().join("stdin")).unwrap().is_empty());
        }
    }
}
