use atrio_core::models::Listing;
use atrio_sync::{Page, PageCursor};
use serde::Deserialize;
use sqlx::PgPool;

use crate::subsystems::audit;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct NewListing {
    pub id: String,
    pub kind: String,
    pub price: i64,
    pub city: String,
    pub neighborhood: String,
    #[serde(default)]
    pub media: serde_json::Value,
}

pub async fn list(
    pool: &PgPool,
    city: Option<&str>,
    kind: Option<&str>,
    cursor: Option<&PageCursor>,
    limit: Option<u32>,
) -> Result<Page<Listing>, sqlx::Error> {
    let limit = limit
        .map(|l| (l as i64).clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);

    let rows = sqlx::query_as::<_, Listing>(
        r#"
        SELECT id, kind, price, city, neighborhood, media, created_at
        FROM listings
        WHERE ($1::text IS NULL OR city = $1)
          AND ($2::text IS NULL OR kind = $2)
          AND ($3::timestamptz IS NULL OR (created_at, id) < ($3, $4))
        ORDER BY created_at DESC, id DESC
        LIMIT $5
        "#,
    )
    .bind(city)
    .bind(kind)
    .bind(cursor.map(|c| c.ts))
    .bind(cursor.map(|c| c.id.as_str()).unwrap_or(""))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(Page::from_rows(rows, limit as usize, |l| {
        PageCursor::new(l.created_at, &l.id)
    }))
}

pub async fn create(pool: &PgPool, new: &NewListing, actor: &str) -> Result<Listing, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let listing = sqlx::query_as::<_, Listing>(
        r#"
        INSERT INTO listings (id, kind, price, city, neighborhood, media)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, kind, price, city, neighborhood, media, created_at
        "#,
    )
    .bind(&new.id)
    .bind(&new.kind)
    .bind(new.price)
    .bind(&new.city)
    .bind(&new.neighborhood)
    .bind(&new.media)
    .fetch_one(&mut *tx)
    .await?;

    audit::record(
        &mut *tx,
        actor,
        "listing.created",
        "listings",
        &listing.id,
        serde_json::json!({"kind": listing.kind, "price": listing.price}),
    )
    .await?;

    tx.commit().await?;
    Ok(listing)
}
