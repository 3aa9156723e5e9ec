//! Rewriting of a playlist so that it references locally downloaded segments.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use m3u8_rs::MediaPlaylist;

use crate::error::{Error, Result};

/// Returns a copy of `original` keeping only the planned segments, each
/// pointing at its local file.
///
/// Playlist order is preserved, including repeated references to the same
/// segment. All other playlist and segment attributes are carried over.
///
/// # Errors
///
/// Returns [`Error::Playlist`] if a planned segment has no local path.
pub fn remap(
    original: &MediaPlaylist,
    planned: &[String],
    local_paths: &HashMap<String, PathBuf>,
) -> Result<MediaPlaylist> {
    let planned: HashSet<&str> = planned.iter().map(String::as_str).collect();
    let mut playlist = original.clone();
    playlist.segments = Vec::with_capacity(planned.len());

    for segment in original.segments.iter().filter(|s| planned.contains(s.uri.as_str())) {
        let path = local_paths
            .get(&segment.uri)
            .ok_or_else(|| Error::Playlist(format!("no local file for segment {}", segment.uri)))?;
        let mut segment = segment.clone();
        segment.uri = path.to_string_lossy().into_owned();
        playlist.segments.push(segment);
    }
    Ok(playlist)
}

/// Local files referenced by a remapped playlist, in playback order.
#[must_use]
pub fn manifest_paths(playlist: &MediaPlaylist) -> Vec<PathBuf> {
    playlist
        .segments
        .iter()
        .map(|s| PathBuf::from(&s.uri))
        .collect()
}

/// Serialises `playlist` to `path`.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub async fn write_manifest(playlist: &MediaPlaylist, path: &Path) -> Result<()> {
    let mut buf = Vec::new();
    playlist.write_to(&mut buf)?;
    tokio::fs::write(path, buf).await?;
    log::debug!("Wrote manifest {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::MediaSegment;

    fn media(uris: &[&str]) -> MediaPlaylist {
        MediaPlaylist {
            end_list: true,
            segments: uris
                .iter()
                .map(|uri| MediaSegment {
                    uri: (*uri).to_string(),
                    duration: 10.0,
                    ..MediaSegment::default()
                })
                .collect(),
            ..MediaPlaylist::default()
        }
    }

    fn paths(pairs: &[(&str, &str)]) -> HashMap<String, PathBuf> {
        pairs
            .iter()
            .map(|(id, p)| ((*id).to_string(), PathBuf::from(p)))
            .collect()
    }

    #[test]
    fn keeps_planned_segments_in_playlist_order() {
        let original = media(&["a.ts", "b.ts", "c.ts", "d.ts"]);
        // Planned order differs from playlist order on purpose.
        let planned = vec!["c.ts".to_string(), "b.ts".to_string()];
        let local = paths(&[("b.ts", "/w/00000.ts"), ("c.ts", "/w/00001.ts")]);

        let remapped = remap(&original, &planned, &local).unwrap();
        assert_eq!(
            manifest_paths(&remapped),
            vec![PathBuf::from("/w/00000.ts"), PathBuf::from("/w/00001.ts")]
        );
        assert!(remapped.end_list);
        assert_eq!(original.segments.len(), 4);
    }

    #[test]
    fn repeated_segments_point_at_one_file() {
        let original = media(&["a.ts", "b.ts", "a.ts"]);
        let planned = vec!["a.ts".to_string()];
        let local = paths(&[("a.ts", "/w/00000.ts")]);

        let remapped = remap(&original, &planned, &local).unwrap();
        assert_eq!(
            manifest_paths(&remapped),
            vec![PathBuf::from("/w/00000.ts"), PathBuf::from("/w/00000.ts")]
        );
    }

    #[test]
    fn missing_local_path_is_an_error() {
        let original = media(&["a.ts"]);
        let err = remap(&original, &["a.ts".to_string()], &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Playlist(_)));
    }

    #[test]
    fn remap_is_idempotent() {
        let original = media(&["a.ts", "b.ts", "c.ts"]);
        let planned = vec!["a.ts".to_string(), "c.ts".to_string()];
        let local = paths(&[("a.ts", "/w/00000.ts"), ("c.ts", "/w/00001.ts")]);

        let first = remap(&original, &planned, &local).unwrap();
        let second = remap(&original, &planned, &local).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn written_manifest_parses_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("playlist_downloaded.m3u8");
        let original = media(&["a.ts", "b.ts"]);
        let local = paths(&[("a.ts", "/w/00000.ts"), ("b.ts", "/w/00001.ts")]);
        let remapped = remap(&original, &["a.ts".into(), "b.ts".into()], &local).unwrap();

        write_manifest(&remapped, &path).await.unwrap();

        let text = std::fs::read(&path).unwrap();
        let parsed = m3u8_rs::parse_media_playlist_res(&text).unwrap();
        let uris: Vec<_> = parsed.segments.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["/w/00000.ts", "/w/00001.ts"]);
        assert!(parsed.end_list);
    }
}
