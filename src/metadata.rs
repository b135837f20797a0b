use crate::model::TrackMetadata;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::Accessor;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];

/// Resolves display metadata for a file. Never fails: unreadable files get
/// the file-name fallbacks.
pub trait MetadataReader: Send {
    fn read(&self, path: &Path) -> TrackMetadata;
}

/// Reads embedded tags with lofty, probing the duration with symphonia when
/// the tag reader cannot report one.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagReader;

impl MetadataReader for TagReader {
    fn read(&self, path: &Path) -> TrackMetadata {
        let mut metadata = TrackMetadata::from_file_name(path);

        if let Ok(tagged) = lofty::read_from_path(path) {
            if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
                if let Some(title) = tag_text(tag.title()) {
                    metadata.title = title;
                }
                metadata.artist = tag_text(tag.artist());
                metadata.album = tag_text(tag.album());
            }
            metadata.duration = tagged.properties().duration();
        }

        if metadata.duration.is_zero() {
            metadata.duration = container_length(path).unwrap_or_default();
        }
        metadata
    }
}

pub fn is_valid_media(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Trimmed tag text; blank values count as missing.
fn tag_text(value: Option<Cow<'_, str>>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// Track length as the container reports it, for files whose tags carry
/// none.
fn container_length(path: &Path) -> Option<Duration> {
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }
    let stream = MediaSourceStream::new(
        Box::new(File::open(path).ok()?),
        MediaSourceStreamOptions::default(),
    );
    let probed = get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let params = &probed.format.default_track()?.codec_params;
    let frames = params.n_frames?;
    match (params.time_base, params.sample_rate) {
        (Some(time_base), _) => {
            let time = time_base.calc_time(frames);
            Some(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac))
        }
        (None, Some(rate)) if rate > 0 => {
            Some(Duration::from_secs_f64(frames as f64 / f64::from(rate)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fixtures::silent_wav;
    use crate::model::{UNKNOWN_ALBUM, UNKNOWN_ARTIST};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unreadable_file_gets_fallbacks() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("broken song.mp3");
        fs::write(&path, b"not audio").expect("write");

        let metadata = TagReader.read(&path);

        assert_eq!(metadata.title, "broken song");
        assert_eq!(metadata.artist_label(), UNKNOWN_ARTIST);
        assert_eq!(metadata.album_label(), UNKNOWN_ALBUM);
        assert_eq!(metadata.duration, Duration::ZERO);
    }

    #[test]
    fn missing_file_gets_fallbacks() {
        let metadata = TagReader.read(Path::new("does/not/exist.flac"));
        assert_eq!(metadata.title, "exist");
        assert_eq!(metadata.artist, None);
    }

    #[test]
    fn media_filter_is_case_insensitive() {
        assert!(is_valid_media(Path::new("a.MP3")));
        assert!(is_valid_media(Path::new("dir/b.flac")));
        assert!(!is_valid_media(Path::new("notes.txt")));
        assert!(!is_valid_media(Path::new("no_extension")));
    }

    #[test]
    fn tag_text_trims_and_drops_blank_values() {
        assert_eq!(
            tag_text(Some(Cow::Borrowed("  hello  "))),
            Some(String::from("hello"))
        );
        assert_eq!(tag_text(Some(Cow::Borrowed("   \t  "))), None);
        assert_eq!(tag_text(None), None);
    }

    #[test]
    fn container_length_comes_from_the_frame_count() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("second.wav");
        silent_wav(&path, 1_000);

        assert_eq!(container_length(&path), Some(Duration::from_secs(1)));
        assert_eq!(TagReader.read(&path).duration, Duration::from_secs(1));
    }
}
