//! Verse persistence
//!
//! Verses are only ever written inside the owning song's transaction; reads
//! are paginated for the song-text endpoint.

use songlib_common::models::Verse;
use songlib_common::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Insert one verse within the owning song's transaction
pub async fn insert_verse(
    tx: &mut Transaction<'_, Sqlite>,
    song_id: i64,
    text: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO verses (song_id, text) VALUES (?, ?)")
        .bind(song_id)
        .bind(text)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Paginated verses for one song, in insertion (lyric) order. Pages are 1-based.
pub async fn list_verses(
    pool: &SqlitePool,
    song_id: i64,
    page: i64,
    page_size: i64,
) -> Result<Vec<Verse>> {
    let page = page.max(1);
    let page_size = page_size.max(1);

    let verses = sqlx::query_as::<_, Verse>(
        r#"
        SELECT id, song_id, text FROM verses
        WHERE song_id = ?
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(song_id)
    .bind(page_size)
    .bind((page - 1) * page_size)
    .fetch_all(pool)
    .await?;

    Ok(verses)
}
