//! Domain models and queue payload shapes
//!
//! Wire names follow the public JSON contract (`group`, `song`, `releaseDate`,
//! `songId`); database columns use the snake_case field names.

use serde::{Deserialize, Serialize};

/// A song row. Owned by the relational store; created only by the ingestion
/// pipeline after enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Song {
    pub id: i64,
    #[serde(rename = "group")]
    pub group_name: String,
    #[serde(rename = "song")]
    pub song_name: String,
    #[serde(rename = "releaseDate")]
    pub release_date: String,
    pub link: String,
}

/// A verse of a song's lyrics. Ordered by insertion, created atomically with
/// the owning song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Verse {
    pub id: i64,
    #[serde(rename = "songId")]
    pub song_id: i64,
    pub text: String,
}

/// Enrichment result from the song-info API. Transient: consumed once to
/// populate a `Song` and derive its verses, then discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongDetail {
    #[serde(rename = "releaseDate")]
    pub release_date: String,
    pub text: String,
    pub link: String,
}

/// Payload of `add_song_queue` messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSongRequest {
    pub group: String,
    pub song: String,
}

/// Partial song update; absent fields leave the stored columns unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SongPatch {
    pub group: Option<String>,
    pub song: Option<String>,
    #[serde(rename = "releaseDate")]
    pub release_date: Option<String>,
    pub link: Option<String>,
}

/// Payload of `update_song_queue` messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSongRequest {
    #[serde(rename = "songId")]
    pub song_id: i64,
    pub song: SongPatch,
}

/// Payload of `delete_song_queue` messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSongRequest {
    #[serde(rename = "songId")]
    pub song_id: i64,
}

/// Cache key for one song's detail
pub fn song_key(id: i64) -> String {
    format!("song_{id}")
}

/// Cache key for a paginated song-text query
pub fn song_text_key(id: i64, page: i64, page_size: i64) -> String {
    format!("song_{id}_text_{page}_{page_size}")
}

/// Cache key for a paginated, filtered song-list query
pub fn songs_list_key(page: i64, page_size: i64, filters: &[String]) -> String {
    format!("songs_{}_{}_{}", page, page_size, filters.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        let req: UpdateSongRequest =
            serde_json::from_str(r#"{"songId": 3, "song": {"group": "Queen"}}"#).unwrap();
        assert_eq!(req.song_id, 3);
        assert_eq!(req.song.group.as_deref(), Some("Queen"));
        assert!(req.song.link.is_none());

        let detail: SongDetail = serde_json::from_str(r#"{"releaseDate": "1975-10-31"}"#).unwrap();
        assert_eq!(detail.release_date, "1975-10-31");
        assert_eq!(detail.text, "");
    }

    #[test]
    fn cache_keys_follow_convention() {
        assert_eq!(song_key(7), "song_7");
        assert_eq!(
            songs_list_key(1, 10, &["group_name=Queen".into(), "link=x".into()]),
            "songs_1_10_group_name=Queen_link=x"
        );
        assert_eq!(songs_list_key(2, 5, &[]), "songs_2_5_");
    }
}
