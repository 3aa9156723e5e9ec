//! Loading of HLS media playlists.

use std::path::{Path, PathBuf};

use m3u8_rs::{MasterPlaylist, MediaPlaylist, VariantStream};
use reqwest::Url;

use crate::error::{Error, Result};
use crate::planner::Segment;

/// A parsed media playlist together with the location it was loaded from.
#[derive(Debug, Clone)]
pub struct Playlist {
    url: Url,
    base_url: Url,
    text: String,
    media: MediaPlaylist,
}

impl Playlist {
    /// Parses the text of a media playlist loaded from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playlist`] if the text is not a media playlist.
    pub fn parse(url: Url, text: String) -> Result<Self> {
        let media = match m3u8_rs::parse_playlist_res(text.as_bytes()) {
            Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => media,
            Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => {
                return Err(Error::Playlist(format!(
                    "{url} is a master playlist, expected a media playlist"
                )));
            }
            Err(e) => return Err(Error::Playlist(format!("cannot parse {url}: {e}"))),
        };
        let base_url = base_url(&url)?;
        Ok(Self {
            url,
            base_url,
            text,
            media,
        })
    }

    /// Ordered segments as `(uri, duration)` pairs.
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        self.media
            .segments
            .iter()
            .map(|s| Segment::new(s.uri.clone(), f64::from(s.duration)))
            .collect()
    }

    /// Resolves a segment id against the playlist's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playlist`] if the id does not form a valid URL.
    pub fn segment_url(&self, id: &str) -> Result<Url> {
        self.base_url
            .join(id)
            .map_err(|e| Error::Playlist(format!("bad segment uri {id:?}: {e}")))
    }

    /// Total duration of all segments in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.media.segments.iter().map(|s| f64::from(s.duration)).sum()
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Raw playlist text as served.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn media(&self) -> &MediaPlaylist {
        &self.media
    }
}

/// Strips the last path component (and any query) from a playlist URL.
fn base_url(url: &Url) -> Result<Url> {
    url.join("./")
        .map_err(|e| Error::Playlist(format!("cannot derive base of {url}: {e}")))
}

/// Per-stream segment directory under `work_dir`, derived from the base URL.
///
/// Re-running a download of the same stream resolves to the same directory.
#[must_use]
pub fn cache_dir_for(work_dir: &Path, base_url: &Url) -> PathBuf {
    let mut dir = work_dir.to_path_buf();
    if let Some(host) = base_url.host_str() {
        dir.push(host);
    }
    if let Some(segments) = base_url.path_segments() {
        for part in segments.filter(|p| !p.is_empty() && *p != "." && *p != "..") {
            dir.push(part);
        }
    }
    dir
}

/// Picks the rendition to download from a master playlist: the first
/// non-I-frame variant that announces a resolution, else the first one.
#[must_use]
pub fn select_variant(master: &MasterPlaylist) -> Option<&VariantStream> {
    master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .min_by_key(|v| v.resolution.is_none())
}

/// Fetches playlists over HTTP.
#[derive(Debug, Clone)]
pub struct PlaylistClient {
    http: reqwest::Client,
}

impl PlaylistClient {
    #[must_use]
    pub const fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Loads the media playlist at `url`, following a master playlist to its
    /// source rendition.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails or no media playlist is found.
    pub async fn fetch(&self, url: &str) -> Result<Playlist> {
        let url = Url::parse(url).map_err(|e| Error::Playlist(format!("bad url {url:?}: {e}")))?;
        let text = self.get_text(&url).await?;

        let master = match m3u8_rs::parse_playlist_res(text.as_bytes()) {
            Ok(m3u8_rs::Playlist::MasterPlaylist(master)) => master,
            Ok(m3u8_rs::Playlist::MediaPlaylist(_)) => return Playlist::parse(url, text),
            Err(e) => return Err(Error::Playlist(format!("cannot parse {url}: {e}"))),
        };

        let variant = select_variant(&master)
            .ok_or_else(|| Error::Playlist(format!("{url} lists no renditions")))?;
        let media_url = url
            .join(&variant.uri)
            .map_err(|e| Error::Playlist(format!("bad variant uri {:?}: {e}", variant.uri)))?;
        log::info!("Following rendition {media_url}");

        let text = self.get_text(&media_url).await?;
        Playlist::parse(media_url, text)
    }

    async fn get_text(&self, url: &Url) -> Result<String> {
        log::debug!("Fetching playlist {url}");
        let response = self.http.get(url.clone()).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
