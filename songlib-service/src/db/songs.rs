//! Song persistence

use songlib_common::models::{Song, SongPatch};
use songlib_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use tracing::warn;

/// Columns the list-query filter syntax (`column=value`) may reference.
/// Wire-name aliases map onto their columns. Anything else is ignored with a
/// warning rather than interpolated into SQL.
const FILTER_COLUMNS: [(&str, &str); 6] = [
    ("group_name", "group_name"),
    ("group", "group_name"),
    ("song_name", "song_name"),
    ("song", "song_name"),
    ("release_date", "release_date"),
    ("link", "link"),
];

/// A song not yet persisted; the store assigns the id
#[derive(Debug, Clone)]
pub struct NewSong {
    pub group_name: String,
    pub song_name: String,
    pub release_date: String,
    pub link: String,
}

/// Insert a song and all of its verses in one transaction
///
/// Verse order follows slice order. Any failure rolls back the entire
/// transaction; a partially persisted song is never observable.
pub async fn insert_song_with_verses(
    pool: &SqlitePool,
    song: &NewSong,
    verses: &[String],
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        INSERT INTO songs (group_name, song_name, release_date, link)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&song.group_name)
    .bind(&song.song_name)
    .bind(&song.release_date)
    .bind(&song.link)
    .fetch_one(&mut *tx)
    .await?;
    let song_id: i64 = row.get("id");

    for verse in verses {
        super::verses::insert_verse(&mut tx, song_id, verse).await?;
    }

    tx.commit().await?;
    Ok(song_id)
}

/// Apply a partial update; absent patch fields leave columns unchanged
///
/// Fails with [`Error::NotFound`] when the song does not exist, so callers
/// can distinguish the logical failure from a transient one.
pub async fn update_song(pool: &SqlitePool, id: i64, patch: &SongPatch) -> Result<()> {
    let exists = sqlx::query("SELECT id FROM songs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("song {id}")));
    }

    sqlx::query(
        r#"
        UPDATE songs SET
            group_name = COALESCE(?, group_name),
            song_name = COALESCE(?, song_name),
            release_date = COALESCE(?, release_date),
            link = COALESCE(?, link),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&patch.group)
    .bind(&patch.song)
    .bind(&patch.release_date)
    .bind(&patch.link)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a song and its verses in one transaction
///
/// Verses go first so the path holds referential integrity even without
/// store-level cascade. Zero affected rows is not an error.
pub async fn delete_song(pool: &SqlitePool, id: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM verses WHERE song_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(result.rows_affected())
}

/// Paginated, filtered song listing. Pages are 1-based.
pub async fn list_songs(
    pool: &SqlitePool,
    page: i64,
    page_size: i64,
    filters: &[String],
) -> Result<Vec<Song>> {
    let page = page.max(1);
    let page_size = page_size.max(1);

    let mut sql =
        String::from("SELECT id, group_name, song_name, release_date, link FROM songs");
    let mut binds = Vec::new();
    let mut clauses = Vec::new();

    for filter in filters {
        match parse_filter(filter) {
            Some((column, value)) => {
                clauses.push(format!("{column} = ?"));
                binds.push(value);
            }
            None => warn!(filter = %filter, "ignoring unrecognized filter"),
        }
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, Song>(&sql);
    for value in &binds {
        query = query.bind(value);
    }
    let songs = query
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(pool)
        .await?;

    Ok(songs)
}

fn parse_filter(filter: &str) -> Option<(&'static str, String)> {
    let (name, value) = filter.split_once('=')?;
    let column = FILTER_COLUMNS
        .iter()
        .find(|(alias, _)| *alias == name.trim())?
        .1;
    Some((column, value.trim().to_string()))
}
